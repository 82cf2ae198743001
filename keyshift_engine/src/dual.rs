// Dual-play composition: one chart becomes a two-player chart.
//
// The source matrix is processed twice, once per side, and the two results
// are concatenated horizontally: a C-key chart becomes a 2C-key chart whose
// right half starts at column C. Each side applies, in order and each only
// if enabled:
//
//   mirror -> density limit -> half removal
//
// Mirror and half removal work row by row and run on rayon's pool. The
// density limit (density.rs) decides rows in parallel too, using one forked
// RNG stream per row, so results do not depend on scheduling.
//
// Half removal clears whole columns, heads and bodies alike, so it cannot
// break a hold. Mirroring moves whole columns. Hold continuity therefore
// survives composition unchanged.

use keyshift_prng::ChartRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::density::limit_density;
use crate::error::{EngineError, Result};
use crate::matrix::{Cell, Grid, NoteMatrix};
use crate::project::MAX_COLUMNS;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Half {
    Left,
    Right,
}

/// What to do to one side of the dual-play chart.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SideOptions {
    pub mirror: bool,
    /// Cap every row of this side at this many notes.
    pub density_limit: Option<usize>,
    pub remove_half: Option<Half>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DualOptions {
    pub left: SideOptions,
    pub right: SideOptions,
}

impl Default for DualOptions {
    /// Plain chart on the left, its mirror image on the right.
    fn default() -> Self {
        DualOptions {
            left: SideOptions::default(),
            right: SideOptions {
                mirror: true,
                ..SideOptions::default()
            },
        }
    }
}

impl DualOptions {
    pub fn validate(&self, source_columns: usize) -> Result<()> {
        if source_columns == 0 || source_columns * 2 > MAX_COLUMNS {
            return Err(EngineError::InvalidColumnCount(source_columns * 2));
        }
        for (name, side) in [("left.density_limit", &self.left), ("right.density_limit", &self.right)] {
            if side.density_limit == Some(0) {
                return Err(EngineError::option(name, "must be at least 1"));
            }
        }
        Ok(())
    }
}

/// Reverse the column order of every row.
pub fn mirror(matrix: &NoteMatrix) -> NoteMatrix {
    let mut out = matrix.clone();
    let columns = out.columns().max(1);
    out.cells_mut()
        .par_chunks_mut(columns)
        .for_each(|row| row.reverse());
    out
}

/// Clear the left `C/2` or right `C/2` columns. With an odd column count
/// the middle column survives either way.
pub fn remove_half(matrix: &NoteMatrix, half: Half) -> NoteMatrix {
    let mut out = matrix.clone();
    let columns = out.columns();
    let width = columns / 2;
    let range = match half {
        Half::Left => 0..width,
        Half::Right => columns - width..columns,
    };
    out.cells_mut()
        .par_chunks_mut(columns.max(1))
        .for_each(|row| row[range.clone()].fill(Cell::Empty));
    out
}

/// Place `right` beside `left`. Both must have the same number of rows.
pub fn concatenate(left: &NoteMatrix, right: &NoteMatrix) -> Result<NoteMatrix> {
    if left.rows() != right.rows() {
        return Err(EngineError::RowCountMismatch {
            left: left.rows(),
            right: right.rows(),
        });
    }
    let split = left.columns();
    let columns = split + right.columns();
    let mut out = Grid::filled(left.rows(), columns, Cell::Empty);
    out.cells_mut()
        .par_chunks_mut(columns.max(1))
        .enumerate()
        .for_each(|(r, row)| {
            row[..split].copy_from_slice(left.row(r));
            row[split..].copy_from_slice(right.row(r));
        });
    Ok(out)
}

/// Apply one side's options to the source matrix.
pub fn compose_side(matrix: &NoteMatrix, side: &SideOptions, rng: &mut ChartRng) -> NoteMatrix {
    let mut out = if side.mirror {
        mirror(matrix)
    } else {
        matrix.clone()
    };
    if let Some(max_keys) = side.density_limit {
        out = limit_density(&out, max_keys, rng);
    }
    if let Some(half) = side.remove_half {
        out = remove_half(&out, half);
    }
    out
}

/// Build the two-sided chart: `[left side | right side]`.
pub fn compose(matrix: &NoteMatrix, options: &DualOptions, rng: &mut ChartRng) -> Result<NoteMatrix> {
    options.validate(matrix.columns())?;
    let left = compose_side(matrix, &options.left, rng);
    let right = compose_side(matrix, &options.right, rng);
    let out = concatenate(&left, &right)?;
    debug!(
        columns = out.columns(),
        heads = out.head_count(),
        "dual-play composition"
    );
    Ok(out)
}
