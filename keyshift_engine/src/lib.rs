// Keyshift: seeded transforms for key-based rhythm game charts.
//
// A chart (a list of timed notes on C key columns) is turned into a note
// matrix, transformed, and projected back into notes. Transforms change the
// key count, compose a two-player chart, or rewrite hold durations. Every
// random choice comes from one seeded `ChartRng`, so a chart, a list of
// steps and a seed always give the same result.
//
// Architecture:
// - note.rs: `NoteEvent`, the input/output unit, and canonical ordering
// - matrix.rs: `Grid<T>`, the note matrix (`Cell`), `TimeAxis`, `build`
// - available.rs: per-head time until the next head in the same column
// - oscillator.rs: bounded bouncing index driving column choices over time
// - density.rs: weighted per-row reduction and the uniform density limit
// - column_count.rs: C-key to T-key conversion (grow and shrink)
// - dual.rs: dual-play composition (mirror, density limit, half removal)
// - hold.rs: hold classification, stratified selection, tail lengths
// - project.rs: matrix back to events, column centre coordinates
// - pipeline.rs: `Chart`, `Transform` steps and `run`
// - config.rs: JSON pipeline configuration
// - error.rs: `EngineError`
//
// The engine does no I/O of its own apart from `PipelineConfig::load`.
// Chart file formats are the host application's business.

pub mod available;
pub mod column_count;
pub mod config;
pub mod density;
pub mod dual;
pub mod error;
pub mod hold;
pub mod matrix;
pub mod note;
pub mod oscillator;
pub mod pipeline;
pub mod project;

pub use keyshift_prng as prng;

pub use error::{EngineError, Result};
pub use note::NoteEvent;
pub use pipeline::{Chart, Transform, run};
