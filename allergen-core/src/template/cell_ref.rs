//! A1-style cell and column references

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Parse a cell reference like "C3" (optionally `$`-anchored) into (row, col) as 0-based indices
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    let cell_ref = cell_ref.trim();
    let cell_ref = cell_ref.strip_prefix('$').unwrap_or(cell_ref);
    let letters_end = cell_ref
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_alphabetic())
        .map(|(idx, _)| idx)?;
    let (col_part, row_part) = cell_ref.split_at(letters_end);

    let col = parse_column(col_part)?;
    let row_part = row_part.strip_prefix('$').unwrap_or(row_part);
    if row_part.is_empty() || !row_part.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    let row = row_part.parse::<u32>().ok()?;
    if row == 0 {
        return None;
    }

    Some((row - 1, col))
}

/// Parse column letters like "B" or "AA" into a 0-based column index
pub fn parse_column(letters: &str) -> Option<u32> {
    let letters = letters.trim();
    let letters = letters.strip_prefix('$').unwrap_or(letters);
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }

    let mut col = 0u32;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    Some(col - 1)
}

/// Convert a 0-based column index into letters ("A", "B", ..., "AA")
pub fn column_letters(col: u32) -> String {
    let mut n = col + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Format 0-based (row, col) as an A1 reference
pub fn cell_name(row: u32, col: u32) -> String {
    format!("{}{}", column_letters(col), row + 1)
}

/// A single cell position, 0-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl FromStr for CellRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_cell_ref(s)
            .map(|(row, col)| CellRef { row, col })
            .ok_or_else(|| format!("'{}' is not a cell reference", s))
    }
}

impl TryFrom<String> for CellRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CellRef> for String {
    fn from(value: CellRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", cell_name(self.row, self.col))
    }
}

/// A whole column, 0-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColumnRef(pub u32);

impl ColumnRef {
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl FromStr for ColumnRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_column(s)
            .map(ColumnRef)
            .ok_or_else(|| format!("'{}' is not a column reference", s))
    }
}

impl TryFrom<String> for ColumnRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnRef> for String {
    fn from(value: ColumnRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&column_letters(self.0))
    }
}
