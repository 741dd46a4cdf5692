//! Tempo and time-signature maps for a [`Composition`](crate) timeline:
//! sorted marker lists with a sentinel at tick 0, and
//! O(log N) tick↔second conversion by binary search.

use serde::{Deserialize, Serialize};

/// A tempo change: at `tick`, the composition adopts `micros_per_quarter`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoMarker {
    pub tick: u64,
    pub micros_per_quarter: u32,
}

impl TempoMarker {
    pub fn from_bpm(tick: u64, bpm: f64) -> Self {
        Self {
            tick,
            micros_per_quarter: (60_000_000.0 / bpm) as u32,
        }
    }

    pub fn bpm(&self) -> f64 {
        60_000_000.0 / self.micros_per_quarter as f64
    }
}

/// A time-signature change: at `tick`, the composition adopts `numerator`
/// over `denominator` (e.g. 3/4, 6/8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignatureMarker {
    pub tick: u64,
    pub numerator: u8,
    pub denominator: u8,
}

/// Sorted tempo and time-signature marker lists plus the resolution
/// (`ticks_per_quarter`) they're expressed in. Both lists always carry a
/// sentinel entry at tick 0 — the invariant names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoMap {
    ticks_per_quarter: u32,
    tempo: Vec<TempoMarker>,
    time_signature: Vec<TimeSignatureMarker>,
    /// `cumulative_seconds[i]` = seconds elapsed at `tempo[i].tick`, kept in
    /// lockstep with `tempo` so tick↔second conversion can binary-search it
    /// instead of re-walking every marker.
    cumulative_seconds: Vec<f64>,
}

impl TempoMap {
    /// A map with a single tempo of 120 BPM and a 4/4 signature, both
    /// sentineled at tick 0.
    pub fn new(ticks_per_quarter: u32) -> Self {
        let mut map = Self {
            ticks_per_quarter,
            tempo: vec![TempoMarker::from_bpm(0, 120.0)],
            time_signature: vec![TimeSignatureMarker {
                    tick: 0,
                    numerator: 4,
                    denominator: 4,
            }],
            cumulative_seconds: Vec::new(),
        };
        map.rebuild_cumulative_seconds();
        map
    }

    pub fn ticks_per_quarter(&self) -> u32 {
        self.ticks_per_quarter
    }

    /// Insert (or replace, if one already exists at this tick) a tempo
    /// marker, re-sorting to keep the list tick-ordered.
    pub fn set_tempo(&mut self, tick: u64, bpm: f64) {
        self.insert_sorted_tempo(TempoMarker::from_bpm(tick, bpm));
    }

    fn insert_sorted_tempo(&mut self, marker: TempoMarker) {
        match self.tempo.binary_search_by_key(&marker.tick, |m| m.tick) {
            Ok(idx) => self.tempo[idx] = marker,
            Err(idx) => self.tempo.insert(idx, marker),
        }
        self.rebuild_cumulative_seconds();
    }

    /// Recompute `cumulative_seconds` from scratch; called whenever `tempo`
    /// changes. O(N), but mutation is rare next to repeated conversions.
    fn rebuild_cumulative_seconds(&mut self) {
        self.cumulative_seconds.clear();
        self.cumulative_seconds.reserve(self.tempo.len());
        let mut seconds = 0.0;
        for i in 0..self.tempo.len() {
            self.cumulative_seconds.push(seconds);
            let marker = self.tempo[i];
            if let Some(next) = self.tempo.get(i + 1) {
                seconds += (next.tick - marker.tick) as f64 * self.one_tick_seconds(&marker);
            }
        }
    }

    pub fn set_time_signature(&mut self, tick: u64, numerator: u8, denominator: u8) {
        let marker = TimeSignatureMarker {
            tick,
            numerator,
            denominator,
        };
        match self
        .time_signature
        .binary_search_by_key(&tick, |m| m.tick)
        {
            Ok(idx) => self.time_signature[idx] = marker,
            Err(idx) => self.time_signature.insert(idx, marker),
        }
    }

    pub fn tempo_markers(&self) -> &[TempoMarker] {
        &self.tempo
    }

    pub fn time_signature_markers(&self) -> &[TimeSignatureMarker] {
        &self.time_signature
    }

    /// Index of the marker governing `tick` — the last one at or before it.
    fn governing_index(&self, tick: u64) -> usize {
        match self.tempo.binary_search_by_key(&tick, |m| m.tick) {
            Ok(idx) => idx,
            Err(0) => 0,
            Err(idx) => idx - 1,
        }
    }

    /// The tempo marker governing `tick` — the last marker at or before it.
    fn governing_tempo(&self, tick: u64) -> &TempoMarker {
        &self.tempo[self.governing_index(tick)]
    }

    /// Convert a tick position to seconds: binary-search `tempo` for the
    /// governing marker, then add the remainder under its tempo to the
    /// precomputed seconds at that marker's tick.
    pub fn tick_to_seconds(&self, tick: u64) -> f64 {
        let idx = self.governing_index(tick);
        let marker = &self.tempo[idx];
        self.cumulative_seconds[idx] + (tick - marker.tick) as f64 * self.one_tick_seconds(marker)
    }

    /// Convert seconds to the nearest tick: binary-search the precomputed
    /// cumulative-seconds array for the governing segment, then invert the
    /// linear tempo within it directly.
    pub fn seconds_to_tick(&self, seconds: f64) -> u64 {
        if seconds <= 0.0 {
            return 0;
        }
        let idx = match self
        .cumulative_seconds
        .binary_search_by(|s| s.partial_cmp(&seconds).expect("seconds is never NaN"))
        {
            Ok(idx) => idx,
            Err(0) => 0,
            Err(idx) => idx - 1,
        };
        let marker = &self.tempo[idx];
        let elapsed = seconds - self.cumulative_seconds[idx];
        let one_tick = self.one_tick_seconds(marker);
        let ticks_into_segment = if one_tick > 0.0 { (elapsed / one_tick).round() as u64 } else { 0 };
        marker.tick + ticks_into_segment
    }

    #[inline]
    fn one_tick_seconds(&self, marker: &TempoMarker) -> f64 {
        marker.micros_per_quarter as f64 / (self.ticks_per_quarter as f64 * 1_000_000.0)
    }

    /// Seconds for one tick under the tempo governing `tick` — used by
    /// callers converting a small window rather than an absolute position.
    pub fn seconds_per_tick_at(&self, tick: u64) -> f64 {
        self.one_tick_seconds(self.governing_tempo(tick))
    }
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::new(960)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn constant_tempo_is_linear() {
        let map = TempoMap::new(960);
        let one_beat_seconds = 60.0 / 120.0;
        assert_relative_eq!(map.tick_to_seconds(960), one_beat_seconds, epsilon = 1e-9);
        assert_relative_eq!(map.tick_to_seconds(1920), 2.0 * one_beat_seconds, epsilon = 1e-9);
    }

    #[test]
    fn tempo_change_mid_timeline_is_piecewise_linear() {
        let mut map = TempoMap::new(960);
        // From tick 1920 (second beat boundary) onward, tempo doubles.
        map.set_tempo(1920, 240.0);
        let first_two_beats = 2.0 * (60.0 / 120.0);
        let third_beat = 60.0 / 240.0;
        assert_relative_eq!(
            map.tick_to_seconds(2880),
            first_two_beats + third_beat,
            epsilon = 1e-9
        );
    }

    #[test]
    fn seconds_to_tick_round_trips() {
        let map = TempoMap::new(960);
        let seconds = map.tick_to_seconds(4800);
        let tick = map.seconds_to_tick(seconds);
        assert!((tick as i64 - 4800).abs() <= 1);
    }

    #[test]
    fn many_tempo_changes_still_convert_correctly() {
        let mut map = TempoMap::new(960);
        for i in 1..20u64 {
            map.set_tempo(i * 960, 100.0 + i as f64 * 5.0);
        }
        for i in 0..20u64 {
            let tick = i * 960;
            let seconds = map.tick_to_seconds(tick);
            let round_tripped = map.seconds_to_tick(seconds);
            assert!((round_tripped as i64 - tick as i64).abs() <= 1);
        }
    }

    #[test]
    fn markers_are_sorted_by_tick() {
        let mut map = TempoMap::new(960);
        map.set_tempo(5000, 90.0);
        map.set_tempo(2000, 140.0);
        let ticks: Vec<u64> = map.tempo_markers().iter().map(|m| m.tick).collect();
        let mut sorted = ticks.clone();
        sorted.sort_unstable();
        assert_eq!(ticks, sorted);
    }
}
