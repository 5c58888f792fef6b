use serde::{Deserialize, Deserializer, Serialize};

/// Movie summary as listed by the metadata service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub poster_path: String,
    #[serde(default)]
    pub release_date: String,
    #[serde(alias = "vote_average", default)]
    pub rating: f64,
    #[serde(default)]
    pub genre_ids: Vec<i64>,
    #[serde(default)]
    pub runtime: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieDetail {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub poster_path: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub backdrop_path: String,
    #[serde(default)]
    pub release_date: String,
    #[serde(alias = "vote_average", default)]
    pub rating: f64,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub runtime: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoviePage {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub results: Vec<Movie>,
    #[serde(default)]
    pub total_pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GenreList {
    #[serde(default)]
    pub genres: Vec<Genre>,
}

fn first_page() -> u32 {
    1
}

// The service sends null for missing artwork.
fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

fn null_as_zero<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    Ok(Option::<u32>::deserialize(d)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_artwork_becomes_empty_path() {
        let movie: Movie = serde_json::from_str(
            r#"{"id": 7, "title": "Heat", "poster_path": null, "vote_average": 8.3}"#,
        )
        .unwrap();
        assert_eq!(movie.poster_path, "");
        assert!(movie.genre_ids.is_empty());
        assert_eq!(movie.rating, 8.3);
    }
}
