// Oscillator: a slowly drifting bounded index.
//
// Column conversion needs to pick "which column" over and over as a chart
// plays. Drawing a fresh uniform index every time produces flicker: notes
// jump across the playfield from one beat to the next. The oscillator walks
// instead. It holds `current ∈ [0, max]` and a direction, steps by one, and
// bounces off either bound, so consecutive choices are neighbours.
//
// Only the starting value and starting direction are random (drawn once
// from the shared `ChartRng`). After that a trace is fully determined, which
// is what lets column_count.rs build traces for several new columns in
// parallel.

use keyshift_prng::ChartRng;

use crate::matrix::TimeAxis;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Bounded, direction-reversing integer sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Oscillator {
    current: usize,
    max: usize,
    direction: Direction,
}

impl Oscillator {
    /// Random start in `[0, max]`, random direction.
    pub fn new(max: usize, rng: &mut ChartRng) -> Self {
        let current = rng.range_usize_inclusive(0, max);
        let direction = if rng.random_bool(0.5) {
            Direction::Up
        } else {
            Direction::Down
        };
        Oscillator {
            current,
            max,
            direction,
        }
    }

    /// Fixed start, moving up. Mostly useful for tests.
    pub fn starting_at(current: usize, max: usize) -> Self {
        Oscillator {
            current: current.min(max),
            max,
            direction: Direction::Up,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Step once, reversing at the bounds, and return the new value.
    pub fn next_value(&mut self) -> usize {
        if self.max == 0 {
            return 0;
        }
        match self.direction {
            Direction::Up if self.current >= self.max => self.direction = Direction::Down,
            Direction::Down if self.current == 0 => self.direction = Direction::Up,
            _ => {}
        }
        match self.direction {
            Direction::Up => self.current += 1,
            Direction::Down => self.current -= 1,
        }
        self.current
    }

    /// Per-row values of this oscillator over `axis`.
    ///
    /// The oscillator only moves once `window` ms of chart time has
    /// accumulated since its last move; the accumulator then restarts from
    /// zero, so a long gap still counts as a single step. Rows before the
    /// first full window are `None`.
    pub fn trace(mut self, axis: &TimeAxis, window: i64) -> Vec<Option<usize>> {
        let window = window.max(1);
        let mut elapsed = 0i64;
        let mut value = None;
        let mut out = Vec::with_capacity(axis.len());
        for row in 0..axis.len() {
            elapsed += axis.step(row);
            if elapsed >= window {
                elapsed = 0;
                value = Some(match value {
                    None => self.current,
                    Some(_) => self.next_value(),
                });
            }
            out.push(value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounces_between_bounds() {
        let mut osc = Oscillator::starting_at(1, 3);
        let seq: Vec<usize> = (0..8).map(|_| osc.next_value()).collect();
        assert_eq!(seq, vec![2, 3, 2, 1, 0, 1, 2, 3]);
    }

    #[test]
    fn zero_range_stays_put() {
        let mut osc = Oscillator::starting_at(5, 0);
        assert_eq!(osc.current(), 0);
        for _ in 0..5 {
            assert_eq!(osc.next_value(), 0);
        }
    }

    #[test]
    fn random_start_is_in_range_and_seeded() {
        for seed in 0..200 {
            let a = Oscillator::new(4, &mut ChartRng::new(seed));
            let b = Oscillator::new(4, &mut ChartRng::new(seed));
            assert_eq!(a, b);
            assert!(a.current() <= a.max());
        }
    }

    #[test]
    fn never_leaves_range() {
        let mut rng = ChartRng::new(11);
        let mut osc = Oscillator::new(6, &mut rng);
        for _ in 0..100 {
            assert!(osc.next_value() <= 6);
        }
    }

    #[test]
    fn trace_waits_for_a_full_window() {
        let axis = TimeAxis::from_times(vec![0, 100, 200]);
        let trace = Oscillator::starting_at(2, 5).trace(&axis, 500);
        assert_eq!(trace, vec![None, None, None]);
    }

    #[test]
    fn trace_steps_once_per_window() {
        let axis = TimeAxis::from_times(vec![0, 100, 200, 300, 400, 1400]);
        let trace = Oscillator::starting_at(0, 3).trace(&axis, 200);
        // First full window at 200 reveals the start value; 400 steps once;
        // the 1000 ms gap still only counts as one step.
        assert_eq!(
            trace,
            vec![None, None, Some(0), Some(0), Some(1), Some(2)]
        );
    }
}
