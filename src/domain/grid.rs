//! The shared sequence grid: a fixed matrix of on/off cells.
//!
//! Row semantics (instrument grouping) are a client convention; this
//! engine only stores and toggles cells.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One grid cell.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    /// Whether this cell fires when the playhead crosses its column.
    pub activated: bool,

    /// Optional per-cell override (velocity, sample choice); opaque to
    /// the engine, relayed as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
}

/// Errors from grid mutations with client-supplied coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("Cell ({row}, {col}) outside {rows}x{steps} grid")]
    OutOfBounds {
        row: u32,
        col: u32,
        rows: u32,
        steps: u32,
    },

    #[error("Replacement grid is {rows}x{steps}, expected {expected_rows}x{expected_steps}")]
    DimensionMismatch {
        rows: u32,
        steps: u32,
        expected_rows: u32,
        expected_steps: u32,
    },
}

/// Fixed `total_rows x total_steps` matrix of cells.
///
/// Dimensions are set at construction and never change for the room's
/// lifetime; every mutation validates against them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceGrid {
    rows: Vec<Vec<Cell>>,
}

impl SequenceGrid {
    /// Create a blank grid of the given dimensions.
    pub fn blank(total_rows: u32, total_steps: u32) -> Self {
        Self {
            rows: (0..total_rows)
                .map(|_| vec![Cell::default(); total_steps as usize])
                .collect(),
        }
    }

    /// Number of rows.
    pub fn total_rows(&self) -> u32 {
        self.rows.len() as u32
    }

    /// Number of steps (columns). Zero-row grids report zero steps.
    pub fn total_steps(&self) -> u32 {
        self.rows.first().map(|r| r.len() as u32).unwrap_or(0)
    }

    /// Look up one cell.
    pub fn cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.rows.get(row as usize)?.get(col as usize)
    }

    /// Flip one cell's `activated` flag.
    ///
    /// # Errors
    ///
    /// `GridError::OutOfBounds` when the coordinates fall outside the grid.
    pub fn toggle(&mut self, row: u32, col: u32) -> Result<bool, GridError> {
        let rows = self.total_rows();
        let steps = self.total_steps();
        let cell = self
            .rows
            .get_mut(row as usize)
            .and_then(|r| r.get_mut(col as usize))
            .ok_or(GridError::OutOfBounds {
                row,
                col,
                rows,
                steps,
            })?;
        cell.activated = !cell.activated;
        Ok(cell.activated)
    }

    /// Replace the whole grid, keeping dimensions fixed.
    ///
    /// # Errors
    ///
    /// `GridError::DimensionMismatch` when the replacement does not match
    /// this grid's dimensions (including ragged rows).
    pub fn replace(&mut self, other: SequenceGrid) -> Result<(), GridError> {
        let expected_rows = self.total_rows();
        let expected_steps = self.total_steps();
        let ragged = other
            .rows
            .iter()
            .any(|r| r.len() as u32 != other.total_steps());
        if ragged
            || other.total_rows() != expected_rows
            || other.total_steps() != expected_steps
        {
            return Err(GridError::DimensionMismatch {
                rows: other.total_rows(),
                steps: other.total_steps(),
                expected_rows,
                expected_steps,
            });
        }
        self.rows = other.rows;
        Ok(())
    }

    /// Reset every cell's `activated` flag to false, dropping settings.
    pub fn clear(&mut self) {
        for row in &mut self.rows {
            for cell in row.iter_mut() {
                *cell = Cell::default();
            }
        }
    }

    /// All activated cells in one column (fired on a step transition).
    pub fn activated_in_column(&self, col: u32) -> Vec<u32> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                row.get(col as usize).map(|c| c.activated).unwrap_or(false)
            })
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Count of activated cells across the grid.
    pub fn activated_count(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|r| r.iter())
            .filter(|c| c.activated)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_grid_has_requested_dimensions() {
        let grid = SequenceGrid::blank(13, 16);
        assert_eq!(grid.total_rows(), 13);
        assert_eq!(grid.total_steps(), 16);
        assert_eq!(grid.activated_count(), 0);
    }

    #[test]
    fn toggle_flips_and_reports_new_state() {
        let mut grid = SequenceGrid::blank(13, 16);
        assert_eq!(grid.toggle(3, 7), Ok(true));
        assert!(grid.cell(3, 7).unwrap().activated);
        assert_eq!(grid.toggle(3, 7), Ok(false));
        assert!(!grid.cell(3, 7).unwrap().activated);
    }

    #[test]
    fn toggle_out_of_bounds_is_rejected() {
        let mut grid = SequenceGrid::blank(13, 16);
        assert!(matches!(
            grid.toggle(13, 0),
            Err(GridError::OutOfBounds { .. })
        ));
        assert!(matches!(
            grid.toggle(0, 16),
            Err(GridError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn replace_accepts_matching_dimensions() {
        let mut grid = SequenceGrid::blank(2, 4);
        let mut other = SequenceGrid::blank(2, 4);
        other.toggle(1, 2).unwrap();
        grid.replace(other).unwrap();
        assert!(grid.cell(1, 2).unwrap().activated);
    }

    #[test]
    fn replace_rejects_wrong_dimensions() {
        let mut grid = SequenceGrid::blank(2, 4);
        let other = SequenceGrid::blank(3, 4);
        assert!(matches!(
            grid.replace(other),
            Err(GridError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn replace_rejects_ragged_rows() {
        let mut grid = SequenceGrid::blank(2, 4);
        let ragged: SequenceGrid = serde_json::from_str(
            r#"[[{"activated":false},{"activated":false},{"activated":false},{"activated":false}],
                [{"activated":false}]]"#,
        )
        .unwrap();
        assert!(grid.replace(ragged).is_err());
    }

    #[test]
    fn clear_resets_every_cell() {
        let mut grid = SequenceGrid::blank(13, 16);
        grid.toggle(0, 0).unwrap();
        grid.toggle(5, 9).unwrap();
        grid.toggle(12, 15).unwrap();
        assert_eq!(grid.activated_count(), 3);
        grid.clear();
        assert_eq!(grid.activated_count(), 0);
    }

    #[test]
    fn activated_in_column_lists_rows() {
        let mut grid = SequenceGrid::blank(13, 16);
        grid.toggle(2, 9).unwrap();
        grid.toggle(11, 9).unwrap();
        grid.toggle(4, 8).unwrap();
        assert_eq!(grid.activated_in_column(9), vec![2, 11]);
        assert_eq!(grid.activated_in_column(0), Vec::<u32>::new());
    }

    #[test]
    fn cell_settings_survive_roundtrip() {
        let json = r#"{"activated":true,"settings":{"velocity":0.8}}"#;
        let cell: Cell = serde_json::from_str(json).unwrap();
        assert!(cell.activated);
        assert_eq!(cell.settings.as_ref().unwrap()["velocity"], 0.8);

        let back = serde_json::to_string(&cell).unwrap();
        assert!(back.contains("velocity"));
    }

    #[test]
    fn plain_cell_omits_settings_field() {
        let cell = Cell::default();
        let json = serde_json::to_string(&cell).unwrap();
        assert_eq!(json, r#"{"activated":false}"#);
    }
}
