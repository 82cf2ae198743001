// Hold-duration editing: turn taps into holds and re-length existing holds.
//
// Every head with room before the next head in its column (see
// available.rs) is a candidate. Candidates split into two classes by the
// time they have available:
//
// - long: more than the classifier's threshold,
// - short: everything else.
//
// Two classifier strategies exist and both are first-class:
// `BeatRelative` derives the threshold from the chart's beat length
// (default: two beats), `Static` uses a fixed millisecond threshold.
//
// Each class then goes through the same selection:
//
// 1. Percentage retention, stratified by row. With `N` candidates and
//    `K = round(N * pct / 100)` to keep, each row keeps
//    `floor(n_row * K / N)` of its own candidates, and the shortfall is
//    filled uniformly from everything not yet kept. Early and late rows get
//    their fair share instead of whichever end a global shuffle favours.
// 2. Per-row cap: rows keeping more than `per_row_limit` candidates are
//    shuffled and truncated.
// 3. Tail length: `min(available - margin, available * level)`. Lengths
//    that come out non-positive leave the note as it was.
//
// The two classes are disjoint by construction. When their length grids
// are merged, short wins anyway.
//
// Existing holds longer than `original_floor_ms` are only candidates when
// `include_originals` is set. Originals that are not retained keep their
// length.

use keyshift_prng::ChartRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::available::AvailableTimeGrid;
use crate::error::{EngineError, Result};
use crate::matrix::{Cell, Grid, NoteMatrix};
use crate::note::NoteEvent;

/// New hold length (ms) per head cell; `None` leaves the note unchanged.
pub type HoldLengthGrid = Grid<Option<i64>>;

/// How candidates are split into short and long.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum HoldClassifier {
    /// Long when available time exceeds `beats` beats of the chart.
    BeatRelative { beats: f64 },
    /// Long when available time exceeds a fixed threshold.
    Static { threshold_ms: i64 },
}

impl Default for HoldClassifier {
    fn default() -> Self {
        HoldClassifier::BeatRelative { beats: 2.0 }
    }
}

impl HoldClassifier {
    /// Available time (ms) above which a candidate counts as long.
    pub fn long_threshold(&self, beat_length: f64) -> f64 {
        match *self {
            HoldClassifier::BeatRelative { beats } => beats * beat_length,
            HoldClassifier::Static { threshold_ms } => threshold_ms as f64,
        }
    }
}

/// Selection and sizing settings for one class of candidates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassSettings {
    /// Share of candidates to turn into holds, 0–100.
    pub percentage: f64,
    /// At most this many holds of this class per row.
    pub per_row_limit: Option<usize>,
    /// Proportional tail length, in (0, 1].
    pub level: f64,
}

impl Default for ClassSettings {
    fn default() -> Self {
        ClassSettings {
            percentage: 50.0,
            per_row_limit: None,
            level: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoldOptions {
    pub classifier: HoldClassifier,
    pub short: ClassSettings,
    pub long: ClassSettings,
    /// Gap kept between a tail and whatever follows it.
    pub margin_ms: i64,
    /// Also re-length holds that already exist in the chart.
    pub include_originals: bool,
    /// Holds no longer than this are treated as taps.
    pub original_floor_ms: i64,
}

impl Default for HoldOptions {
    fn default() -> Self {
        HoldOptions {
            classifier: HoldClassifier::default(),
            short: ClassSettings::default(),
            long: ClassSettings {
                level: 0.75,
                ..ClassSettings::default()
            },
            margin_ms: 20,
            include_originals: false,
            original_floor_ms: 15,
        }
    }
}

impl HoldOptions {
    pub fn validate(&self, beat_length: f64) -> Result<()> {
        match self.classifier {
            HoldClassifier::BeatRelative { beats } => {
                if !(beats.is_finite() && beats > 0.0) {
                    return Err(EngineError::option("classifier.beats", "must be positive"));
                }
                if !(beat_length.is_finite() && beat_length > 0.0) {
                    return Err(EngineError::option("beat_length", "must be positive"));
                }
            }
            HoldClassifier::Static { threshold_ms } => {
                if threshold_ms < 0 {
                    return Err(EngineError::option("classifier.threshold_ms", "must not be negative"));
                }
            }
        }
        for (name, settings) in [("short", &self.short), ("long", &self.long)] {
            if !(0.0..=100.0).contains(&settings.percentage) {
                return Err(EngineError::option(name, "percentage must be within 0..=100"));
            }
            if !(settings.level > 0.0 && settings.level <= 1.0) {
                return Err(EngineError::option(name, "level must be within (0, 1]"));
            }
        }
        if self.margin_ms < 0 {
            return Err(EngineError::option("margin_ms", "must not be negative"));
        }
        if self.original_floor_ms < 0 {
            return Err(EngineError::option("original_floor_ms", "must not be negative"));
        }
        Ok(())
    }
}

/// `min(available - margin, available * level)`.
pub fn tail_length(available: i64, level: f64, margin_ms: i64) -> i64 {
    let proportional = (available as f64 * level).floor() as i64;
    (available - margin_ms).min(proportional)
}

/// Compute new hold lengths for `matrix`.
///
/// `events` is the list `matrix` refers into; `available` must come from
/// `available::compute` on the same matrix.
pub fn transform(
    matrix: &NoteMatrix,
    available: &AvailableTimeGrid,
    events: &[NoteEvent],
    options: &HoldOptions,
    beat_length: f64,
    rng: &mut ChartRng,
) -> Result<HoldLengthGrid> {
    options.validate(beat_length)?;
    let rows = matrix.rows();
    let columns = matrix.columns();
    let threshold = options.classifier.long_threshold(beat_length);

    let mut short_class = Grid::filled(rows, columns, false);
    let mut long_class = Grid::filled(rows, columns, false);
    for r in 0..rows {
        for c in 0..columns {
            let Cell::NoteRef(index) = matrix[(r, c)] else {
                continue;
            };
            let Some(event) = events.get(index) else {
                continue;
            };
            let Some(room) = available[(r, c)].filter(|&t| t > 0) else {
                continue;
            };
            if event.duration() > options.original_floor_ms && !options.include_originals {
                continue;
            }
            if room as f64 > threshold {
                long_class[(r, c)] = true;
            } else {
                short_class[(r, c)] = true;
            }
        }
    }

    let short_kept = select(&short_class, &options.short, rng);
    let long_kept = select(&long_class, &options.long, rng);
    let short = lengths(&short_kept, available, &options.short, options.margin_ms);
    let long = lengths(&long_kept, available, &options.long, options.margin_ms);

    debug!(
        short = count(&short),
        long = count(&long),
        threshold,
        "hold duration transform"
    );
    Ok(merge(&short, &long))
}

fn count(lengths: &HoldLengthGrid) -> usize {
    lengths.cells().iter().filter(|l| l.is_some()).count()
}

/// Stratified percentage retention followed by the per-row cap.
fn select(class: &Grid<bool>, settings: &ClassSettings, rng: &mut ChartRng) -> Grid<bool> {
    let mut kept = Grid::filled(class.rows(), class.columns(), false);
    let members: Vec<Vec<usize>> = class
        .iter_rows()
        .map(|row| (0..row.len()).filter(|&c| row[c]).collect())
        .collect();
    let total: usize = members.iter().map(Vec::len).sum();
    let wanted = ((total as f64 * settings.percentage / 100.0).round() as usize).min(total);
    if wanted == 0 {
        return kept;
    }

    let mut pool: Vec<(usize, usize)> = Vec::new();
    let mut taken = 0usize;
    for (r, row_members) in members.iter().enumerate() {
        let mut shuffled = row_members.clone();
        rng.shuffle(&mut shuffled);
        let share = row_members.len() * wanted / total;
        for (i, &c) in shuffled.iter().enumerate() {
            if i < share {
                kept[(r, c)] = true;
                taken += 1;
            } else {
                pool.push((r, c));
            }
        }
    }
    rng.shuffle(&mut pool);
    for &(r, c) in pool.iter().take(wanted - taken) {
        kept[(r, c)] = true;
    }

    if let Some(limit) = settings.per_row_limit {
        for r in 0..kept.rows() {
            let mut chosen: Vec<usize> = (0..kept.columns()).filter(|&c| kept[(r, c)]).collect();
            if chosen.len() <= limit {
                continue;
            }
            rng.shuffle(&mut chosen);
            for &c in &chosen[limit..] {
                kept[(r, c)] = false;
            }
        }
    }
    kept
}

fn lengths(
    kept: &Grid<bool>,
    available: &AvailableTimeGrid,
    settings: &ClassSettings,
    margin_ms: i64,
) -> HoldLengthGrid {
    let mut out = Grid::filled(kept.rows(), kept.columns(), None);
    for r in 0..kept.rows() {
        for c in 0..kept.columns() {
            if !kept[(r, c)] {
                continue;
            }
            if let Some(room) = available[(r, c)] {
                let length = tail_length(room, settings.level, margin_ms);
                if length > 0 {
                    out[(r, c)] = Some(length);
                }
            }
        }
    }
    out
}

/// Combine two length grids; `primary` wins where both have a value.
pub fn merge(primary: &HoldLengthGrid, secondary: &HoldLengthGrid) -> HoldLengthGrid {
    let mut out = secondary.clone();
    for r in 0..out.rows() {
        for c in 0..out.columns() {
            if let Some(length) = primary[(r, c)] {
                out[(r, c)] = Some(length);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::available;
    use crate::matrix::{TimeAxis, build};

    const BEAT: f64 = 500.0;

    fn setup(events: &[NoteEvent], columns: usize) -> (NoteMatrix, TimeAxis, AvailableTimeGrid) {
        let (matrix, axis) = build(events, columns).unwrap();
        let available = available::compute(&matrix, &axis);
        (matrix, axis, available)
    }

    fn everything(level: f64) -> ClassSettings {
        ClassSettings {
            percentage: 100.0,
            per_row_limit: None,
            level,
        }
    }

    fn nothing() -> ClassSettings {
        ClassSettings {
            percentage: 0.0,
            ..ClassSettings::default()
        }
    }

    /// Two-column chart: column 0 has a note every 250 ms (short room),
    /// column 1 a note every 2000 ms (long room).
    fn two_speed_chart() -> Vec<NoteEvent> {
        let mut events: Vec<NoteEvent> = (0..32).map(|i| NoteEvent::tap(0, i * 250)).collect();
        events.extend((0..5).map(|i| NoteEvent::tap(1, i * 2000)));
        events
    }

    #[test]
    fn tail_length_takes_the_smaller_bound() {
        assert_eq!(tail_length(1000, 0.5, 20), 500);
        assert_eq!(tail_length(100, 1.0, 20), 80);
        assert_eq!(tail_length(10, 1.0, 20), -10);
    }

    #[test]
    fn beat_relative_classification() {
        let (matrix, _, available) = setup(&two_speed_chart(), 2);
        let options = HoldOptions {
            short: everything(0.5),
            long: nothing(),
            ..HoldOptions::default()
        };
        let lengths = transform(&matrix, &available, &two_speed_chart(), &options, BEAT, &mut ChartRng::new(1)).unwrap();
        for r in 0..matrix.rows() {
            if matrix[(r, 1)].is_head() {
                assert_eq!(lengths[(r, 1)], None, "long candidate got a short length");
            }
        }
        // Every column 0 note has 250 ms of room, the last one up to chart end.
        let short_lengths: Vec<i64> = (0..matrix.rows()).filter_map(|r| lengths[(r, 0)]).collect();
        assert_eq!(short_lengths.len(), 32);
        assert!(short_lengths.iter().all(|&l| l == 125));
    }

    #[test]
    fn static_classifier_moves_the_boundary() {
        let events = two_speed_chart();
        let (matrix, _, available) = setup(&events, 2);
        // Threshold 100 ms: every candidate is long.
        let options = HoldOptions {
            classifier: HoldClassifier::Static { threshold_ms: 100 },
            short: nothing(),
            long: everything(1.0),
            ..HoldOptions::default()
        };
        let lengths = transform(&matrix, &available, &events, &options, BEAT, &mut ChartRng::new(1)).unwrap();
        assert_eq!(lengths[(0, 0)], Some(230));
        assert_eq!(lengths[(0, 1)], Some(1980));
    }

    #[test]
    fn stratified_selection_takes_from_every_row() {
        // 10 rows, two candidates each, keep half: every row keeps exactly one.
        // The trailing note gives the last row room of its own.
        let events: Vec<NoteEvent> = (0..10)
            .flat_map(|i| [NoteEvent::tap(0, i * 300), NoteEvent::tap(1, i * 300)])
            .chain([NoteEvent::tap(2, 3000)])
            .collect();
        let (matrix, _, available) = setup(&events, 3);
        let options = HoldOptions {
            short: ClassSettings {
                percentage: 50.0,
                ..everything(0.5)
            },
            long: nothing(),
            ..HoldOptions::default()
        };
        let lengths = transform(&matrix, &available, &events, &options, BEAT, &mut ChartRng::new(9)).unwrap();
        for r in 0..10 {
            let held = (0..2).filter(|&c| lengths[(r, c)].is_some()).count();
            assert_eq!(held, 1, "row {r}");
        }
    }

    #[test]
    fn per_row_cap_truncates() {
        let events: Vec<NoteEvent> = (0..8)
            .flat_map(|i| (0..4).map(move |c| NoteEvent::tap(c, i * 300)))
            .collect();
        let (matrix, _, available) = setup(&events, 4);
        let options = HoldOptions {
            short: ClassSettings {
                per_row_limit: Some(1),
                ..everything(0.5)
            },
            long: nothing(),
            ..HoldOptions::default()
        };
        let lengths = transform(&matrix, &available, &events, &options, BEAT, &mut ChartRng::new(2)).unwrap();
        for r in 0..7 {
            let held = (0..4).filter(|&c| lengths[(r, c)].is_some()).count();
            assert_eq!(held, 1, "row {r}");
        }
    }

    #[test]
    fn originals_are_left_alone_unless_included() {
        let events = vec![
            NoteEvent::hold(0, 0, 400),
            NoteEvent::tap(0, 1000),
            NoteEvent::tap(1, 0),
            NoteEvent::tap(1, 1000),
        ];
        let (matrix, _, available) = setup(&events, 2);
        let mut options = HoldOptions {
            short: everything(0.5),
            long: everything(0.5),
            ..HoldOptions::default()
        };
        let lengths = transform(&matrix, &available, &events, &options, BEAT, &mut ChartRng::new(3)).unwrap();
        assert_eq!(lengths[(0, 0)], None);
        assert_eq!(lengths[(0, 1)], Some(500));

        options.include_originals = true;
        let lengths = transform(&matrix, &available, &events, &options, BEAT, &mut ChartRng::new(3)).unwrap();
        assert_eq!(lengths[(0, 0)], Some(500));
    }

    #[test]
    fn deterministic_for_a_seed() {
        let events = two_speed_chart();
        let (matrix, _, available) = setup(&events, 2);
        let options = HoldOptions::default();
        let a = transform(&matrix, &available, &events, &options, BEAT, &mut ChartRng::new(77)).unwrap();
        let b = transform(&matrix, &available, &events, &options, BEAT, &mut ChartRng::new(77)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.rows(), matrix.rows());
    }

    #[test]
    fn merge_prefers_primary() {
        let primary = Grid::from_rows(2, vec![vec![Some(10), None]]);
        let secondary = Grid::from_rows(2, vec![vec![Some(99), Some(20)]]);
        assert_eq!(merge(&primary, &secondary), Grid::from_rows(2, vec![vec![Some(10), Some(20)]]));
    }

    #[test]
    fn validation() {
        let bad_level = HoldOptions {
            short: ClassSettings {
                level: 0.0,
                ..ClassSettings::default()
            },
            ..HoldOptions::default()
        };
        assert!(bad_level.validate(BEAT).is_err());
        let bad_pct = HoldOptions {
            long: ClassSettings {
                percentage: 120.0,
                ..ClassSettings::default()
            },
            ..HoldOptions::default()
        };
        assert!(bad_pct.validate(BEAT).is_err());
        assert!(HoldOptions::default().validate(0.0).is_err());
        let fixed = HoldOptions {
            classifier: HoldClassifier::Static { threshold_ms: 800 },
            ..HoldOptions::default()
        };
        assert!(fixed.validate(0.0).is_ok());
    }

    #[test]
    fn classifier_json_is_tagged() {
        let json = r#"{ "strategy": "static", "threshold_ms": 600 }"#;
        let classifier: HoldClassifier = serde_json::from_str(json).unwrap();
        assert_eq!(classifier, HoldClassifier::Static { threshold_ms: 600 });
        assert_eq!(classifier.long_threshold(123.0), 600.0);
        let beat = HoldClassifier::default();
        assert_eq!(beat.long_threshold(500.0), 1000.0);
    }
}
