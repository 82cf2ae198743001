// Note events: the engine's input and output unit.
//
// A `NoteEvent` is one timed note as decoded from a chart file by the host
// application. The engine reads only `column`, `start_time` and `end_time`;
// `x` is rewritten on projection and `meta` (hit sounds, sample names,
// whatever the format carries) rides along untouched.
//
// Events are identified by their index in the source list. Matrices store
// that index (`Cell::NoteRef`), never the event itself.

use serde::{Deserialize, Serialize};

/// One timed note. Times are integer milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// 0-based key column.
    pub column: usize,
    pub start_time: i64,
    /// Equal to `start_time` for a tap note.
    pub end_time: i64,
    /// Format-native horizontal coordinate (column centre on a 512-wide
    /// playfield). Recomputed from `column` whenever the engine emits events.
    #[serde(default)]
    pub x: u16,
    /// Opaque pass-through data.
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl NoteEvent {
    pub fn tap(column: usize, time: i64) -> Self {
        NoteEvent {
            column,
            start_time: time,
            end_time: time,
            x: 0,
            meta: serde_json::Value::Null,
        }
    }

    pub fn hold(column: usize, start_time: i64, end_time: i64) -> Self {
        NoteEvent {
            end_time,
            ..NoteEvent::tap(column, start_time)
        }
    }

    pub fn is_hold(&self) -> bool {
        self.end_time > self.start_time
    }

    pub fn duration(&self) -> i64 {
        self.end_time - self.start_time
    }
}

/// Sort events into canonical order: by start time, then column.
///
/// The sort is stable, so events sharing both keys keep their input order.
pub fn sort_canonical(events: &mut [NoteEvent]) {
    events.sort_by_key(|e| (e.start_time, e.column));
}
