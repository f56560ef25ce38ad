// 📏 Line Detector - finds every complete row, column and diagonal
//
// A card has exactly 12 candidate lines:
//   rows 0-4, columns 0-4, diagonal 0 (top-left → bottom-right)
//   and diagonal 1 (top-right → bottom-left)
//
// Detection always recomputes the full set from the grid. The free space is
// just a cell that starts out marked.

use crate::error::{BingoError, Result};
use crate::grid::{Grid, GRID_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Number of candidate lines on a 5×5 card
pub const LINE_COUNT: usize = 12;

// ============================================================================
// LINE KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Row,
    Column,
    Diagonal,
}

impl LineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineKind::Row => "row",
            LineKind::Column => "column",
            LineKind::Diagonal => "diagonal",
        }
    }

    /// Number of lines of this kind (valid indexes are `0..count`)
    pub fn count(&self) -> u8 {
        match self {
            LineKind::Row | LineKind::Column => GRID_SIZE as u8,
            LineKind::Diagonal => 2,
        }
    }
}

impl fmt::Display for LineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LineKind {
    type Err = BingoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "row" => Ok(LineKind::Row),
            "column" => Ok(LineKind::Column),
            "diagonal" => Ok(LineKind::Diagonal),
            other => Err(BingoError::validation(
                "type",
                format!("must be one of row, column, diagonal (got {:?})", other),
            )),
        }
    }
}

// ============================================================================
// LINE
// ============================================================================

/// A (type, index) descriptor. Only constructible with a type-specific
/// valid index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Line {
    #[serde(rename = "type")]
    kind: LineKind,
    index: u8,
}

impl Line {
    pub fn new(kind: LineKind, index: i64) -> Result<Self> {
        if index < 0 || index >= kind.count() as i64 {
            return Err(BingoError::validation(
                "index",
                format!(
                    "{} index must be between 0 and {} (got {})",
                    kind,
                    kind.count() - 1,
                    index
                ),
            ));
        }

        Ok(Line {
            kind,
            index: index as u8,
        })
    }

    /// Parse the `type`/`index` pair used on the wire and in the store
    pub fn parse(kind: &str, index: i64) -> Result<Self> {
        Line::new(kind.parse()?, index)
    }

    pub fn row(index: u8) -> Result<Self> {
        Line::new(LineKind::Row, index as i64)
    }

    pub fn column(index: u8) -> Result<Self> {
        Line::new(LineKind::Column, index as i64)
    }

    pub fn diagonal(index: u8) -> Result<Self> {
        Line::new(LineKind::Diagonal, index as i64)
    }

    pub fn kind(&self) -> LineKind {
        self.kind
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    /// All 12 candidate lines: rows, then columns, then diagonals
    pub fn all() -> impl Iterator<Item = Line> {
        [LineKind::Row, LineKind::Column, LineKind::Diagonal]
            .into_iter()
            .flat_map(|kind| (0..kind.count()).map(move |index| Line { kind, index }))
    }

    /// Grid positions (row * 5 + col) covered by this line
    pub fn positions(&self) -> [usize; GRID_SIZE] {
        let i = self.index as usize;
        let mut positions = [0; GRID_SIZE];

        for (step, slot) in positions.iter_mut().enumerate() {
            *slot = match (self.kind, i) {
                (LineKind::Row, _) => i * GRID_SIZE + step,
                (LineKind::Column, _) => step * GRID_SIZE + i,
                (LineKind::Diagonal, 0) => step * GRID_SIZE + step,
                (LineKind::Diagonal, _) => step * GRID_SIZE + (GRID_SIZE - 1 - step),
            };
        }

        positions
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.index)
    }
}

// Deserialization goes through `Line::new` so an out-of-range index is
// rejected at the boundary.
impl<'de> Deserialize<'de> for Line {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawLine {
            #[serde(rename = "type")]
            kind: LineKind,
            index: i64,
        }

        let raw = RawLine::deserialize(deserializer)?;
        Line::new(raw.kind, raw.index).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// DETECTION
// ============================================================================

/// Every line whose five cells are all marked
pub fn detect_lines(grid: &Grid) -> BTreeSet<Line> {
    Line::all()
        .filter(|line| line.positions().iter().all(|&p| grid.is_marked(p)))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
