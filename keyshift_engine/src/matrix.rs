// The note matrix: the central representation every transform works on.
//
// A chart is a 2D grid where rows are the distinct timestamps of the chart
// (the `TimeAxis`) and columns are key columns. Each cell is `Empty`, the
// head of a note (`NoteRef`, an index into the source event list), or the
// body of a hold note whose head is further up the same column.
//
// Rows are not evenly spaced in time. Row `r` sits at `axis.time(r)`, and
// every event's start and end time is on the axis, so a hold always has an
// exact end row even if no other note lands there.
//
// `Grid<T>` is the generic dense storage (flat `Vec<T>`, row-major). The
// same type carries the derived matrices: available time, hold lengths and
// the boolean classification grids of `hold.rs`.
//
// Hold continuity: below a hold head, every row up to but excluding the end
// row is `HoldBody` in that column, with nothing else interleaved. `build`
// establishes it and every transform in this crate preserves it.

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{EngineError, Result};
use crate::note::NoteEvent;
use crate::project::MAX_COLUMNS;

/// Column indices of one row. Rows never exceed `MAX_COLUMNS` columns.
pub type RowColumns = SmallVec<[usize; MAX_COLUMNS]>;

/// A single cell of a note matrix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Empty,
    /// Continuation of a hold note whose head is above in the same column.
    HoldBody,
    /// Head of a note: index into the source event list.
    NoteRef(usize),
}

impl Cell {
    pub fn is_empty(self) -> bool {
        self == Cell::Empty
    }

    pub fn is_head(self) -> bool {
        matches!(self, Cell::NoteRef(_))
    }

    pub fn note_index(self) -> Option<usize> {
        match self {
            Cell::NoteRef(i) => Some(i),
            _ => None,
        }
    }
}

/// Dense row-major 2D storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    cells: Vec<T>,
    rows: usize,
    columns: usize,
}

pub type NoteMatrix = Grid<Cell>;

impl<T: Clone> Grid<T> {
    /// Create a `rows × columns` grid with every cell set to `value`.
    pub fn filled(rows: usize, columns: usize, value: T) -> Self {
        Grid {
            cells: vec![value; rows * columns],
            rows,
            columns,
        }
    }
}

impl<T> Grid<T> {
    /// Build a grid from explicit rows. Panics if the rows are ragged.
    #[cfg(test)]
    pub(crate) fn from_rows(columns: usize, rows: Vec<Vec<T>>) -> Self {
        let row_count = rows.len();
        let mut cells = Vec::with_capacity(row_count * columns);
        for row in rows {
            assert_eq!(row.len(), columns, "from_rows: ragged row");
            cells.extend(row);
        }
        Grid {
            cells,
            rows: row_count,
            columns,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn row(&self, row: usize) -> &[T] {
        let start = row * self.columns;
        &self.cells[start..start + self.columns]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        let start = row * self.columns;
        &mut self.cells[start..start + self.columns]
    }

    /// Iterate rows top to bottom.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[T]> {
        // chunks(0) panics; a zero-column grid has no cells anyway.
        self.cells.chunks(self.columns.max(1))
    }

    /// Flat row-major cells, for rayon's `par_chunks_mut(columns)`.
    pub fn cells_mut(&mut self) -> &mut [T] {
        &mut self.cells
    }

    pub fn cells(&self) -> &[T] {
        &self.cells
    }
}

impl<T> Index<(usize, usize)> for Grid<T> {
    type Output = T;

    fn index(&self, (row, column): (usize, usize)) -> &T {
        debug_assert!(column < self.columns, "column {column} out of range");
        &self.cells[row * self.columns + column]
    }
}

impl<T> IndexMut<(usize, usize)> for Grid<T> {
    fn index_mut(&mut self, (row, column): (usize, usize)) -> &mut T {
        debug_assert!(column < self.columns, "column {column} out of range");
        &mut self.cells[row * self.columns + column]
    }
}

impl Grid<Cell> {
    /// Number of note heads in a row. Hold bodies do not count.
    pub fn heads_in_row(&self, row: usize) -> usize {
        self.row(row).iter().filter(|c| c.is_head()).count()
    }

    /// Columns holding a note head in `row`, ascending.
    pub fn head_columns(&self, row: usize) -> RowColumns {
        self.row(row)
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_head())
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of consecutive `HoldBody` cells directly below `(row, column)`.
    pub fn hold_run(&self, row: usize, column: usize) -> usize {
        (row + 1..self.rows)
            .take_while(|&r| self[(r, column)] == Cell::HoldBody)
            .count()
    }

    /// Remove the note headed at `(row, column)` together with its body.
    pub fn clear_note(&mut self, row: usize, column: usize) {
        let run = self.hold_run(row, column);
        for r in row..=row + run {
            self[(r, column)] = Cell::Empty;
        }
    }

    /// Total number of note heads.
    pub fn head_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_head()).count()
    }

    /// Compact text rendering for debugging: one line per row, `O` for a
    /// head, `|` for a hold body, `.` for empty.
    pub fn summary(&self, axis: &TimeAxis) -> String {
        let mut out = String::new();
        for (r, row) in self.iter_rows().enumerate() {
            out.push_str(&format!("{:>8} ", axis.time(r)));
            for cell in row {
                out.push(match cell {
                    Cell::Empty => '.',
                    Cell::HoldBody => '|',
                    Cell::NoteRef(_) => 'O',
                });
            }
            out.push('\n');
        }
        out
    }
}

/// Sorted distinct timestamps at which any note starts or ends.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeAxis {
    times: Vec<i64>,
}

impl TimeAxis {
    pub fn from_events(events: &[NoteEvent]) -> Self {
        let mut times: Vec<i64> = events
            .iter()
            .flat_map(|e| [e.start_time, e.end_time])
            .collect();
        times.sort_unstable();
        times.dedup();
        TimeAxis { times }
    }

    /// Build from already-known timestamps (sorted and deduplicated here).
    pub fn from_times(mut times: Vec<i64>) -> Self {
        times.sort_unstable();
        times.dedup();
        TimeAxis { times }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn time(&self, row: usize) -> i64 {
        self.times[row]
    }

    pub fn times(&self) -> &[i64] {
        &self.times
    }

    pub fn last(&self) -> Option<i64> {
        self.times.last().copied()
    }

    /// Row whose timestamp equals `time`, if any.
    pub fn row_of(&self, time: i64) -> Option<usize> {
        self.times.binary_search(&time).ok()
    }

    /// Time elapsed between `row - 1` and `row`; zero for the first row.
    pub fn step(&self, row: usize) -> i64 {
        if row == 0 {
            0
        } else {
            self.times[row] - self.times[row - 1]
        }
    }

    /// Row for a time known to be on the axis. Falls back to the insertion
    /// point, which callers only see if the axis was built from other events.
    fn row_of_known(&self, time: i64) -> usize {
        self.times.binary_search(&time).unwrap_or_else(|i| i)
    }
}

/// Build the note matrix and time axis for `events` on a `column_count`-key
/// grid.
///
/// Rejects out-of-range columns, negative durations and overlapping notes
/// before allocating anything. Zero events produce a zero-row matrix.
pub fn build(events: &[NoteEvent], column_count: usize) -> Result<(NoteMatrix, TimeAxis)> {
    if column_count == 0 || column_count > MAX_COLUMNS {
        return Err(EngineError::InvalidColumnCount(column_count));
    }
    for (index, event) in events.iter().enumerate() {
        if event.column >= column_count {
            return Err(EngineError::ColumnOutOfRange {
                index,
                column: event.column,
                columns: column_count,
            });
        }
        if event.end_time < event.start_time {
            return Err(EngineError::NegativeDuration {
                index,
                start_time: event.start_time,
                end_time: event.end_time,
            });
        }
    }

    let axis = TimeAxis::from_events(events);
    let mut matrix = Grid::filled(axis.len(), column_count, Cell::Empty);

    for (index, event) in events.iter().enumerate() {
        let head = axis.row_of_known(event.start_time);
        let end = axis.row_of_known(event.end_time);
        let overlap = |row: usize| EngineError::OverlappingNotes {
            index,
            column: event.column,
            time: axis.time(row),
        };

        if !matrix[(head, event.column)].is_empty() {
            return Err(overlap(head));
        }
        matrix[(head, event.column)] = Cell::NoteRef(index);

        for row in head + 1..end {
            if !matrix[(row, event.column)].is_empty() {
                return Err(overlap(row));
            }
            matrix[(row, event.column)] = Cell::HoldBody;
        }
    }

    Ok((matrix, axis))
}
