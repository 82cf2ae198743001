// Per-row density control.
//
// Two policies for thinning out rows that carry too many simultaneous notes:
//
// - `reduce_weighted` (used after column conversion): each row keeps a
//   share of its heads proportional to `max_keys / target_keys`, never
//   fewer than `min_keys` (or all of them, if it had fewer to begin with).
//   Victim columns are drawn by roulette wheel with weight
//   `1 / (1 + times this column already lost a note)`, counted over the
//   whole chart, so deletions spread evenly across the playfield instead of
//   repeatedly hitting the same lane.
// - `limit_density` (used by the dual-play composer): rows above `max_keys`
//   heads lose uniformly chosen heads until exactly `max_keys` remain.
//   Decisions are made per row in parallel with row-forked RNG streams.
//
// Removing a head always removes its hold body with it, so hold continuity
// survives both passes.

use keyshift_prng::ChartRng;
use rayon::prelude::*;
use tracing::debug;

use crate::matrix::{NoteMatrix, RowColumns};

/// Parameters for `reduce_weighted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DensityPolicy {
    pub target_keys: usize,
    pub max_keys: usize,
    pub min_keys: usize,
}

impl DensityPolicy {
    /// How many of `heads` notes a row may keep.
    pub fn keep_count(&self, heads: usize) -> usize {
        if heads == 0 || self.target_keys == 0 {
            return heads;
        }
        let scaled = (heads * self.max_keys).div_ceil(self.target_keys);
        let floor = self.min_keys.min(heads);
        scaled.clamp(floor, self.max_keys.max(floor)).min(heads)
    }
}

/// Thin every row toward `policy`, spreading removals across columns.
pub fn reduce_weighted(matrix: &NoteMatrix, policy: &DensityPolicy, rng: &mut ChartRng) -> NoteMatrix {
    let mut out = matrix.clone();
    let mut removed_per_column = vec![0u32; matrix.columns()];
    let mut removed_total = 0usize;

    for row in 0..out.rows() {
        let mut heads = out.head_columns(row);
        let keep = policy.keep_count(heads.len());
        while heads.len() > keep {
            let weights: Vec<f64> = heads
                .iter()
                .map(|&c| 1.0 / (1.0 + removed_per_column[c] as f64))
                .collect();
            let Some(pick) = rng.choose_weighted(&weights) else {
                break;
            };
            let column = heads.remove(pick);
            out.clear_note(row, column);
            removed_per_column[column] += 1;
            removed_total += 1;
        }
    }

    debug!(removed = removed_total, ?removed_per_column, "weighted density reduction");
    out
}

/// Cap every row at `max_keys` heads, dropping uniformly chosen extras.
pub fn limit_density(matrix: &NoteMatrix, max_keys: usize, rng: &mut ChartRng) -> NoteMatrix {
    let streams = ChartRng::new(rng.next_u64());

    let removals: Vec<(usize, RowColumns)> = (0..matrix.rows())
        .into_par_iter()
        .filter_map(|row| {
            let mut heads = matrix.head_columns(row);
            if heads.len() <= max_keys {
                return None;
            }
            let mut row_rng = streams.fork(row as u64);
            row_rng.shuffle(&mut heads);
            heads.truncate(heads.len() - max_keys);
            Some((row, heads))
        })
        .collect();

    let mut out = matrix.clone();
    for (row, columns) in &removals {
        for &column in columns {
            out.clear_note(*row, column);
        }
    }
    debug!(rows_limited = removals.len(), max_keys, "density limit");
    out
}
