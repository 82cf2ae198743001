// Transform pipeline: chart in, chart out.
//
// A `Chart` is what the host application hands over after decoding a chart
// file: the key count, the beat length used by the time-based transforms,
// and the note events. `run` applies a list of `Transform` steps in order.
// Every step rebuilds the matrix from the previous step's events, runs one
// transform and projects back, so steps compose freely: a 4-key chart can
// be converted to 6 keys, then doubled to 12, then given holds.
//
// One `ChartRng` is created per run and threaded through every step.
// Same chart, same steps, same seed: same output.

use std::time::{SystemTime, UNIX_EPOCH};

use keyshift_prng::ChartRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::available;
use crate::column_count::{self, ColumnCountOptions};
use crate::dual::{self, DualOptions};
use crate::error::{EngineError, Result};
use crate::hold::{self, HoldOptions};
use crate::matrix::build;
use crate::note::NoteEvent;
use crate::project::project;

/// A decoded chart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    /// Key column count.
    pub keys: usize,
    /// Milliseconds per beat.
    pub beat_length: f64,
    pub events: Vec<NoteEvent>,
}

/// One pipeline step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transform", content = "options", rename_all = "snake_case")]
pub enum Transform {
    ColumnCount(ColumnCountOptions),
    DualPlay(DualOptions),
    HoldDuration(HoldOptions),
}

impl Transform {
    pub fn name(&self) -> &'static str {
        match self {
            Transform::ColumnCount(_) => "column_count",
            Transform::DualPlay(_) => "dual_play",
            Transform::HoldDuration(_) => "hold_duration",
        }
    }
}

/// The given seed, or one derived from the wall clock.
pub fn resolve_seed(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default()
    })
}

/// Apply `steps` to `chart` in order.
pub fn run(chart: &Chart, steps: &[Transform], seed: Option<u64>) -> Result<Chart> {
    if chart.events.is_empty() {
        return Err(EngineError::NoNotes);
    }
    let seed = resolve_seed(seed);
    let mut rng = ChartRng::new(seed);
    info!(
        seed,
        keys = chart.keys,
        events = chart.events.len(),
        steps = steps.len(),
        "running transform pipeline"
    );

    // Check the input even with no steps to apply.
    build(&chart.events, chart.keys)?;

    let mut current = chart.clone();
    for (i, step) in steps.iter().enumerate() {
        current = apply(&current, step, &mut rng)?;
        debug!(
            step = i,
            transform = step.name(),
            keys = current.keys,
            events = current.events.len(),
            "step done"
        );
    }

    info!(keys = current.keys, events = current.events.len(), "pipeline finished");
    Ok(current)
}

/// Apply a single transform to `chart`.
pub fn apply(chart: &Chart, step: &Transform, rng: &mut ChartRng) -> Result<Chart> {
    let (matrix, axis) = build(&chart.events, chart.keys)?;
    let (keys, events) = match step {
        Transform::ColumnCount(options) => {
            let converted = column_count::convert(&matrix, &axis, options, chart.beat_length, rng)?;
            (
                converted.columns(),
                project(&converted, &axis, &chart.events, None)?,
            )
        }
        Transform::DualPlay(options) => {
            let composed = dual::compose(&matrix, options, rng)?;
            (
                composed.columns(),
                project(&composed, &axis, &chart.events, None)?,
            )
        }
        Transform::HoldDuration(options) => {
            let room = available::compute(&matrix, &axis);
            let lengths = hold::transform(&matrix, &room, &chart.events, options, chart.beat_length, rng)?;
            (
                matrix.columns(),
                project(&matrix, &axis, &chart.events, Some(&lengths))?,
            )
        }
    };
    Ok(Chart {
        keys,
        beat_length: chart.beat_length,
        events,
    })
}
