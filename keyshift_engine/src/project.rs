// Projection: note matrix back to note events.
//
// Every head cell becomes one event in its cell's column, starting at the
// row's time and copying `meta` from the source event it references. The
// end time is decided in this order:
//
// 1. a value in the hold-length grid (from hold.rs): `start + length`;
// 2. a source event that was a hold: the row after the head's body run,
//    which is the original end row unless a transform cut the hold short;
// 3. otherwise a tap: `end = start`.
//
// Because a column conversion can move a hold to a different column or
// truncate it, the end is read back from the grid rather than copied from
// the source event.
//
// `x` is recomputed from the output column count. Output is sorted by
// start time then column; building a matrix from the projection of a matrix
// gives the same matrix back.

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::hold::HoldLengthGrid;
use crate::matrix::{Cell, NoteMatrix, TimeAxis};
use crate::note::{NoteEvent, sort_canonical};

/// Widest supported chart (two 12-key sides in dual play).
pub const MAX_COLUMNS: usize = 24;

/// Width of the format-native playfield that `x` is measured on.
pub const PLAYFIELD_WIDTH: u32 = 512;

/// Column centres, indexed `[keys - 1][column]`. Unused slots are zero.
static CENTERS: [[u16; MAX_COLUMNS]; MAX_COLUMNS] = center_table();

const fn center_table() -> [[u16; MAX_COLUMNS]; MAX_COLUMNS] {
    let mut table = [[0u16; MAX_COLUMNS]; MAX_COLUMNS];
    let mut keys = 1;
    while keys <= MAX_COLUMNS {
        let mut column = 0;
        while column < keys {
            table[keys - 1][column] =
                ((2 * column as u32 + 1) * (PLAYFIELD_WIDTH / 2) / keys as u32) as u16;
            column += 1;
        }
        keys += 1;
    }
    table
}

/// Horizontal centre of `column` on a `keys`-key playfield:
/// `floor((2 * column + 1) * 256 / keys)`.
pub fn column_center_x(column: usize, keys: usize) -> Result<u16> {
    if keys == 0 || keys > MAX_COLUMNS {
        return Err(EngineError::InvalidColumnCount(keys));
    }
    if column >= keys {
        return Err(EngineError::option(
            "column",
            format!("{column} is outside a {keys}-key playfield"),
        ));
    }
    Ok(CENTERS[keys - 1][column])
}

/// Turn `matrix` back into events.
///
/// `events` is the list the matrix cells index into. `lengths`, if given,
/// must have the same rows as `matrix`.
pub fn project(
    matrix: &NoteMatrix,
    axis: &TimeAxis,
    events: &[NoteEvent],
    lengths: Option<&HoldLengthGrid>,
) -> Result<Vec<NoteEvent>> {
    let columns = matrix.columns();
    if columns == 0 || columns > MAX_COLUMNS {
        return Err(EngineError::InvalidColumnCount(columns));
    }
    match lengths {
        Some(l) if l.rows() != matrix.rows() => {
            return Err(EngineError::RowCountMismatch {
                left: matrix.rows(),
                right: l.rows(),
            });
        }
        _ => {}
    }

    let mut out = Vec::with_capacity(matrix.head_count());
    for r in 0..matrix.rows() {
        let start = axis.time(r);
        for c in 0..columns {
            let Cell::NoteRef(index) = matrix[(r, c)] else {
                continue;
            };
            let source = events.get(index).ok_or(EngineError::DanglingNoteRef {
                index,
                events: events.len(),
            })?;
            let new_length = lengths.and_then(|l| l[(r, c)]);
            let end_time = match new_length {
                Some(length) => start + length,
                None if source.is_hold() => {
                    let run = matrix.hold_run(r, c);
                    axis.times()
                        .get(r + run + 1)
                        .copied()
                        .unwrap_or(start + source.duration())
                }
                None => start,
            };
            out.push(NoteEvent {
                column: c,
                start_time: start,
                end_time,
                x: CENTERS[columns - 1][c],
                meta: source.meta.clone(),
            });
        }
    }
    sort_canonical(&mut out);
    debug!(events = out.len(), columns, "projected matrix");
    Ok(out)
}
