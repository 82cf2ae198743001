// Available time: how long each note head has before the next head in its
// column.
//
// For a head at `(r, c)` the available time is the gap to the next head in
// column `c`, or to the chart's last timestamp if there is none. Hold bodies
// are not heads, so a hold's available time runs through its own body to
// whatever comes next. Non-head cells are `None`.
//
// This grid is derived and disposable: hold.rs reads it to classify and
// size new holds, and nothing ever projects it back into events.

use rayon::prelude::*;

use crate::matrix::{Grid, NoteMatrix, TimeAxis};

pub type AvailableTimeGrid = Grid<Option<i64>>;

/// Compute the available-time grid for `matrix` on `axis`.
///
/// Columns are independent and are scanned in parallel.
pub fn compute(matrix: &NoteMatrix, axis: &TimeAxis) -> AvailableTimeGrid {
    debug_assert_eq!(matrix.rows(), axis.len());
    let rows = matrix.rows();
    let columns = matrix.columns();
    let Some(last) = axis.last() else {
        return Grid::filled(0, columns, None);
    };

    let per_column: Vec<Vec<Option<i64>>> = (0..columns)
        .into_par_iter()
        .map(|c| {
            let mut out = vec![None; rows];
            let mut next_head = last;
            for r in (0..rows).rev() {
                if matrix[(r, c)].is_head() {
                    let t = axis.time(r);
                    out[r] = Some(next_head - t);
                    next_head = t;
                }
            }
            out
        })
        .collect();

    let mut grid = Grid::filled(rows, columns, None);
    for (c, column) in per_column.into_iter().enumerate() {
        for (r, value) in column.into_iter().enumerate() {
            grid[(r, c)] = value;
        }
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::build;
    use crate::note::NoteEvent;

    #[test]
    fn lone_hold_runs_to_chart_end() {
        let events = vec![
            NoteEvent::hold(0, 0, 500),
            NoteEvent::tap(1, 200),
            NoteEvent::tap(2, 900),
        ];
        let (matrix, axis) = build(&events, 4).unwrap();
        let available = compute(&matrix, &axis);
        assert_eq!(available[(0, 0)], Some(900));
        assert_eq!(axis.last(), Some(900));
    }

    #[test]
    fn gap_to_next_head_in_same_column() {
        let events = vec![
            NoteEvent::tap(0, 0),
            NoteEvent::tap(0, 150),
            NoteEvent::tap(1, 100),
            NoteEvent::tap(0, 400),
        ];
        let (matrix, axis) = build(&events, 2).unwrap();
        let available = compute(&matrix, &axis);
        let row = |t| axis.row_of(t).unwrap();
        assert_eq!(available[(row(0), 0)], Some(150));
        assert_eq!(available[(row(150), 0)], Some(250));
        // Last head in the column: distance to chart end is zero.
        assert_eq!(available[(row(400), 0)], Some(0));
        assert_eq!(available[(row(100), 1)], Some(300));
        // Empty cells carry no value.
        assert_eq!(available[(row(0), 1)], None);
    }

    #[test]
    fn hold_bodies_are_not_heads() {
        let events = vec![NoteEvent::hold(0, 0, 300), NoteEvent::tap(1, 100)];
        let (matrix, axis) = build(&events, 2).unwrap();
        let available = compute(&matrix, &axis);
        assert_eq!(available[(1, 0)], None);
        assert_eq!(available[(0, 0)], Some(300));
    }

    #[test]
    fn empty_chart() {
        let (matrix, axis) = build(&[], 3).unwrap();
        let available = compute(&matrix, &axis);
        assert_eq!(available.rows(), 0);
        assert_eq!(available.columns(), 3);
    }
}
