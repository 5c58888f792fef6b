//! Seat grid layout used to seed a showtime's seat map.

use thiserror::Error;

pub const DEFAULT_ROWS: u8 = 10;
pub const DEFAULT_COLS: u8 = 10;

// Row labels are single letters.
const MAX_ROWS: u8 = 26;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("a seat map needs between 1 and 26 rows, got {0}")]
    Rows(u8),
    #[error("a seat map needs at least one column")]
    Columns,
}

/// Fixed R×C grid. Rows are lettered from `A`, columns numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatLayout {
    rows: u8,
    cols: u8,
}

impl Default for SeatLayout {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
        }
    }
}

impl SeatLayout {
    pub fn new(rows: u8, cols: u8) -> Result<Self, LayoutError> {
        if rows == 0 || rows > MAX_ROWS {
            return Err(LayoutError::Rows(rows));
        }
        if cols == 0 {
            return Err(LayoutError::Columns);
        }
        Ok(Self { rows, cols })
    }

    pub fn rows(&self) -> u8 {
        self.rows
    }

    pub fn cols(&self) -> u8 {
        self.cols
    }

    pub fn capacity(&self) -> usize {
        usize::from(self.rows) * usize::from(self.cols)
    }

    /// Every seat label, row by row: `A1, A2, ..., B1, ...`.
    pub fn seat_ids(&self) -> Vec<String> {
        (0..self.rows)
            .flat_map(|row| (0..self.cols).map(move |col| seat_label(row, col)))
            .collect()
    }
}

/// Label for a zero-based grid position, e.g. `(0, 0)` is `A1`.
pub fn seat_label(row: u8, col: u8) -> String {
    let letter = char::from(b'A' + row);
    format!("{}{}", letter, u32::from(col) + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_ten_by_ten() {
        let layout = SeatLayout::default();
        let ids = layout.seat_ids();

        assert_eq!(ids.len(), 100);
        assert_eq!(ids.first().map(String::as_str), Some("A1"));
        assert_eq!(ids.last().map(String::as_str), Some("J10"));
        assert!(ids.contains(&"E7".to_string()));
    }

    #[test]
    fn labels_are_unique() {
        let ids = SeatLayout::new(26, 12).unwrap().seat_ids();
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(ids.last().map(String::as_str), Some("Z12"));
    }

    #[test]
    fn rejects_degenerate_layouts() {
        assert_eq!(SeatLayout::new(0, 10), Err(LayoutError::Rows(0)));
        assert_eq!(SeatLayout::new(27, 10), Err(LayoutError::Rows(27)));
        assert_eq!(SeatLayout::new(5, 0), Err(LayoutError::Columns));
    }
}
