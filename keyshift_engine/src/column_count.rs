// Column-count conversion: rewrite a C-key chart as a T-key chart.
//
// Growing (T > C). For each of the `T - C` new columns two oscillators run
// over the chart: one picks which existing column to duplicate from
// (`source`, range `[0, C-1]`), the other picks where the new column is
// inserted into the row as it grows (`dest`, range `[0, C+k]` for the k-th
// new column). Both only move once per conversion window (one beat times
// `transform_speed`), so duplicated patterns drift across the playfield
// instead of flickering. Until the first window has elapsed the new column
// exists but stays empty.
//
// Each output row is built from the source row's heads. For every new
// column the row is shifted right at `dest` and the source head at
// `source` is copied into the gap, unless `dest` moved less than
// `change_guard` ms ago. That suppression keeps a freshly moved insertion
// point from producing a duplicate right next to the one it just left.
//
// Shrinking (T < C). One oscillator per removed column picks the slot to
// delete from the shrinking row. A head in the deleted slot moves to a
// random free slot of the same row, or is dropped if there is none.
//
// Holds. Source hold bodies are not copied cell by cell. Every head carries
// the length of its source body run, and the run is repainted below the
// head's new column. A duplicate that lands inside a repainted body is
// dropped. An original that lands inside another original's body moves to
// a random slot that is free and unheld, or else to one only an inserted
// copy occupies. Only an original that lands inside a copy's body, or
// finds no slot at all, cuts that hold short (the projector re-derives the
// end time from the grid).
//
// After the grid is built, inserted heads within `churn_guard` ms of a
// change of their column's `source` trace are removed, and the whole chart
// goes through weighted density reduction (density.rs).
//
// Everything random comes from the caller's `ChartRng`. Oscillators are
// seeded sequentially from it; their traces are then computed in parallel.

use std::cmp::Ordering;

use keyshift_prng::ChartRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use crate::density::{DensityPolicy, reduce_weighted};
use crate::error::{EngineError, Result};
use crate::matrix::{Cell, Grid, NoteMatrix, TimeAxis};
use crate::oscillator::Oscillator;
use crate::project::MAX_COLUMNS;

/// Options for column-count conversion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnCountOptions {
    /// Column count of the output chart.
    pub target_keys: usize,
    /// Densest row the output should approach (scales every row by
    /// `max_keys / target_keys`). Unset means `target_keys`, which keeps
    /// every row as dense as the conversion made it.
    pub max_keys: Option<usize>,
    /// Density reduction never takes a row below this many notes.
    pub min_keys: usize,
    /// Beats of chart time between oscillator moves.
    pub transform_speed: f64,
}

impl Default for ColumnCountOptions {
    fn default() -> Self {
        ColumnCountOptions {
            target_keys: 7,
            max_keys: None,
            min_keys: 1,
            transform_speed: 1.0,
        }
    }
}

impl ColumnCountOptions {
    /// The effective density ceiling.
    pub fn max_keys(&self) -> usize {
        self.max_keys.unwrap_or(self.target_keys)
    }

    /// Check the options against the chart before converting anything.
    pub fn validate(&self, source_columns: usize, beat_length: f64) -> Result<()> {
        if source_columns == 0 || source_columns > MAX_COLUMNS {
            return Err(EngineError::InvalidColumnCount(source_columns));
        }
        if self.target_keys == 0 || self.target_keys > MAX_COLUMNS {
            return Err(EngineError::InvalidColumnCount(self.target_keys));
        }
        if self.min_keys == 0 {
            return Err(EngineError::option("min_keys", "must be at least 1"));
        }
        let max_keys = self.max_keys();
        if self.min_keys > max_keys {
            return Err(EngineError::option(
                "min_keys",
                format!("{} exceeds max_keys {}", self.min_keys, max_keys),
            ));
        }
        if max_keys > self.target_keys {
            return Err(EngineError::option(
                "max_keys",
                format!("{} exceeds target_keys {}", max_keys, self.target_keys),
            ));
        }
        if !(self.transform_speed.is_finite() && self.transform_speed > 0.0) {
            return Err(EngineError::option("transform_speed", "must be positive"));
        }
        if !(beat_length.is_finite() && beat_length > 0.0) {
            return Err(EngineError::option("beat_length", "must be positive"));
        }
        Ok(())
    }
}

/// Time thresholds derived from the chart's beat length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConversionTiming {
    /// Chart time between oscillator moves.
    pub window: i64,
    /// Copies are suppressed this long after the insertion point moves.
    pub change_guard: i64,
    /// Inserted notes this close to a source-column change are removed.
    pub churn_guard: i64,
}

impl ConversionTiming {
    pub fn new(beat_length: f64, transform_speed: f64) -> Self {
        let window = ((beat_length * transform_speed).round() as i64).max(1);
        ConversionTiming {
            window,
            change_guard: ((beat_length / 4.0).round() as i64).min(window / 2),
            churn_guard: ((beat_length / 8.0).round() as i64).min(window / 2),
        }
    }
}

/// A head waiting to be placed in an output row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Pending {
    index: usize,
    /// Hold body length (rows) to repaint below the head.
    run: usize,
    /// Which new column produced this head; `None` for original notes.
    inserted_by: Option<usize>,
}

type WorkingRow = SmallVec<[Option<Pending>; MAX_COLUMNS]>;

/// Per-row oscillator values for one inserted column.
struct InsertTrace {
    source: Vec<Option<usize>>,
    dest: Vec<Option<usize>>,
}

/// Convert `matrix` to `options.target_keys` columns.
///
/// `options` must already have passed `validate`. The output has the same
/// row count (and therefore the same time axis) as the input.
pub fn convert(
    matrix: &NoteMatrix,
    axis: &TimeAxis,
    options: &ColumnCountOptions,
    beat_length: f64,
    rng: &mut ChartRng,
) -> Result<NoteMatrix> {
    options.validate(matrix.columns(), beat_length)?;
    debug_assert_eq!(matrix.rows(), axis.len());

    let source_columns = matrix.columns();
    let target = options.target_keys;
    let timing = ConversionTiming::new(beat_length, options.transform_speed);
    let runs = hold_runs(matrix);

    debug!(
        source_columns,
        target,
        rows = matrix.rows(),
        window = timing.window,
        "column conversion"
    );

    let converted = match target.cmp(&source_columns) {
        Ordering::Greater => grow(matrix, axis, &runs, target, &timing, rng),
        Ordering::Less => shrink(matrix, axis, &runs, target, &timing, rng),
        Ordering::Equal => matrix.clone(),
    };

    let policy = DensityPolicy {
        target_keys: target,
        max_keys: options.max_keys(),
        min_keys: options.min_keys,
    };
    Ok(reduce_weighted(&converted, &policy, rng))
}

/// For every cell, the number of consecutive `HoldBody` cells below it.
fn hold_runs(matrix: &NoteMatrix) -> Grid<usize> {
    let mut runs = Grid::filled(matrix.rows(), matrix.columns(), 0usize);
    for row in (0..matrix.rows().saturating_sub(1)).rev() {
        for c in 0..matrix.columns() {
            if matrix[(row + 1, c)] == Cell::HoldBody {
                runs[(row, c)] = runs[(row + 1, c)] + 1;
            }
        }
    }
    runs
}

/// The source row's heads, with their body lengths, as a working row.
fn originals(matrix: &NoteMatrix, runs: &Grid<usize>, row: usize) -> WorkingRow {
    matrix
        .row(row)
        .iter()
        .enumerate()
        .map(|(c, cell)| {
            cell.note_index().map(|index| Pending {
                index,
                run: runs[(row, c)],
                inserted_by: None,
            })
        })
        .collect()
}

/// Writes working rows into the output grid, repainting hold bodies.
struct RowPainter {
    out: NoteMatrix,
    /// `inserted_by` of every placed head, for the churn pass.
    origin: Grid<Option<usize>>,
    /// Remaining body rows to paint per output column.
    active: Vec<usize>,
    /// Whether the body being painted in a column belongs to an original.
    active_original: Vec<bool>,
}

impl RowPainter {
    fn new(rows: usize, columns: usize) -> Self {
        RowPainter {
            out: Grid::filled(rows, columns, Cell::Empty),
            origin: Grid::filled(rows, columns, None),
            active: vec![0; columns],
            active_original: vec![false; columns],
        }
    }

    /// Whether column `c` is still covered by a hold from an earlier row.
    fn is_held(&self, c: usize) -> bool {
        self.active[c] > 0
    }

    fn holds_original(&self, c: usize) -> bool {
        self.is_held(c) && self.active_original[c]
    }

    /// Move originals that landed on another original's hold body to a
    /// slot where they cut nothing short.
    ///
    /// Free, unheld slots come first. Failing that, the original takes a
    /// slot occupied or held by an inserted copy, which gets dropped or cut.
    /// Returns how many originals moved.
    fn make_room(&self, working: &mut WorkingRow, rng: &mut ChartRng) -> usize {
        let mut moved = 0;
        for c in 0..working.len() {
            let blocked = working[c].is_some_and(|p| p.inserted_by.is_none()) && self.holds_original(c);
            if !blocked {
                continue;
            }
            let mut free: SmallVec<[usize; MAX_COLUMNS]> = (0..working.len())
                .filter(|&f| working[f].is_none() && !self.is_held(f))
                .collect();
            if free.is_empty() {
                free = (0..working.len())
                    .filter(|&f| {
                        working[f].is_none_or(|q| q.inserted_by.is_some()) && !self.holds_original(f)
                    })
                    .collect();
            }
            if free.is_empty() {
                continue;
            }
            let to = free[rng.range_usize(0, free.len())];
            working[to] = working[c].take();
            moved += 1;
        }
        moved
    }

    fn paint(&mut self, row: usize, working: &WorkingRow) {
        for (c, slot) in working.iter().enumerate() {
            if self.active[c] > 0 {
                match slot {
                    Some(p) if p.inserted_by.is_none() => self.active[c] = 0,
                    _ => {
                        self.out[(row, c)] = Cell::HoldBody;
                        self.active[c] -= 1;
                        continue;
                    }
                }
            }
            if let Some(p) = slot {
                self.out[(row, c)] = Cell::NoteRef(p.index);
                self.origin[(row, c)] = p.inserted_by;
                self.active[c] = p.run;
                self.active_original[c] = p.inserted_by.is_none();
            }
        }
    }
}

fn grow(
    matrix: &NoteMatrix,
    axis: &TimeAxis,
    runs: &Grid<usize>,
    target: usize,
    timing: &ConversionTiming,
    rng: &mut ChartRng,
) -> NoteMatrix {
    let source_columns = matrix.columns();
    let turn = target - source_columns;

    let oscillators: Vec<(Oscillator, Oscillator)> = (0..turn)
        .map(|k| {
            let source = Oscillator::new(source_columns - 1, rng);
            let dest = Oscillator::new(source_columns + k, rng);
            (source, dest)
        })
        .collect();
    let traces: Vec<InsertTrace> = oscillators
        .into_par_iter()
        .map(|(source, dest)| InsertTrace {
            source: source.trace(axis, timing.window),
            dest: dest.trace(axis, timing.window),
        })
        .collect();

    insert_columns(matrix, axis, runs, &traces, timing, rng)
}

/// Build the grown grid from per-row `source`/`dest` traces, one per new
/// column, then remove churn around source changes.
fn insert_columns(
    matrix: &NoteMatrix,
    axis: &TimeAxis,
    runs: &Grid<usize>,
    traces: &[InsertTrace],
    timing: &ConversionTiming,
    rng: &mut ChartRng,
) -> NoteMatrix {
    let turn = traces.len();
    let mut painter = RowPainter::new(matrix.rows(), matrix.columns() + turn);
    let mut last_dest: Vec<Option<usize>> = vec![None; turn];
    let mut dest_moved_at: Vec<Option<i64>> = vec![None; turn];
    let mut suppressed = 0usize;
    let mut relocated = 0usize;

    for row in 0..matrix.rows() {
        let now = axis.time(row);
        let mut working = originals(matrix, runs, row);

        for (k, trace) in traces.iter().enumerate() {
            let dest = trace.dest[row];
            if dest != last_dest[k] {
                last_dest[k] = dest;
                dest_moved_at[k] = Some(now);
            }
            let settled = dest_moved_at[k].is_none_or(|t| now - t >= timing.change_guard);

            let slot = match (trace.source[row], dest) {
                (Some(from), Some(_)) => match matrix[(row, from)] {
                    Cell::NoteRef(index) if settled => Some(Pending {
                        index,
                        run: runs[(row, from)],
                        inserted_by: Some(k),
                    }),
                    Cell::NoteRef(_) => {
                        suppressed += 1;
                        None
                    }
                    _ => None,
                },
                _ => None,
            };
            let at = dest.unwrap_or(working.len()).min(working.len());
            working.insert(at, slot);
        }

        relocated += painter.make_room(&mut working, rng);
        painter.paint(row, &working);
    }

    let mut out = painter.out;
    let churned = remove_churn(&mut out, &painter.origin, axis, traces, timing.churn_guard);
    debug!(turn, suppressed, relocated, churned, "column insertion");
    out
}

/// Remove inserted heads that sit within `guard` ms of a change of their
/// column's source trace.
fn remove_churn(
    out: &mut NoteMatrix,
    origin: &Grid<Option<usize>>,
    axis: &TimeAxis,
    traces: &[InsertTrace],
    guard: i64,
) -> usize {
    if guard <= 0 {
        return 0;
    }
    let change_times: Vec<Vec<i64>> = traces
        .iter()
        .map(|trace| {
            (0..trace.source.len())
                .filter(|&r| {
                    if r == 0 {
                        trace.source[0].is_some()
                    } else {
                        trace.source[r] != trace.source[r - 1]
                    }
                })
                .map(|r| axis.time(r))
                .collect()
        })
        .collect();

    let mut removed = 0;
    for row in 0..out.rows() {
        let now = axis.time(row);
        for c in 0..out.columns() {
            let Some(k) = origin[(row, c)] else {
                continue;
            };
            if !out[(row, c)].is_head() {
                continue;
            }
            let times = &change_times[k];
            let nearest = times.partition_point(|&t| t < now);
            let close = |i: usize| times.get(i).is_some_and(|&t| (t - now).abs() < guard);
            if close(nearest) || (nearest > 0 && close(nearest - 1)) {
                out.clear_note(row, c);
                removed += 1;
            }
        }
    }
    removed
}

fn shrink(
    matrix: &NoteMatrix,
    axis: &TimeAxis,
    runs: &Grid<usize>,
    target: usize,
    timing: &ConversionTiming,
    rng: &mut ChartRng,
) -> NoteMatrix {
    let source_columns = matrix.columns();
    let remove = source_columns - target;

    let oscillators: Vec<Oscillator> = (0..remove)
        .map(|k| Oscillator::new(source_columns - 1 - k, rng))
        .collect();
    let traces: Vec<Vec<Option<usize>>> = oscillators
        .into_par_iter()
        .map(|osc| osc.trace(axis, timing.window))
        .collect();

    let mut painter = RowPainter::new(matrix.rows(), target);
    let mut dropped = 0usize;
    let mut relocated = 0usize;

    for row in 0..matrix.rows() {
        let mut working = originals(matrix, runs, row);
        let mut displaced: SmallVec<[Pending; MAX_COLUMNS]> = SmallVec::new();
        for trace in &traces {
            let last = working.len() - 1;
            let at = trace[row].unwrap_or(last).min(last);
            if let Some(p) = working.remove(at) {
                displaced.push(p);
            }
        }

        for pending in displaced {
            let free: SmallVec<[usize; MAX_COLUMNS]> = (0..working.len())
                .filter(|&c| working[c].is_none() && !painter.is_held(c))
                .collect();
            if free.is_empty() {
                dropped += 1;
                continue;
            }
            let c = free[rng.range_usize(0, free.len())];
            working[c] = Some(pending);
        }

        relocated += painter.make_room(&mut working, rng);
        painter.paint(row, &working);
    }

    debug!(remove, dropped, relocated, "column removal");
    painter.out
}
