//! Pivots: price bands sustained by overlapping strokes
//!
//! A pivot opens on the first three consecutive strokes whose bands share a
//! strictly positive intersection. Each following stroke that still overlaps
//! narrows the band and becomes a leg. A stroke that misses the band ends the
//! pivot, unless `confirm_leave` is set: then one miss is only pending, an
//! overlap right after clears it, and a second consecutive miss closes the
//! pivot at its last overlapping stroke.

use tracing::debug;

use super::{bars::EquivalentBar, stroke::Stroke};
use crate::params::AnalysisConfig;

/// Both bounds must move more than this for the band to count as shifted
pub const MOVE_EPSILON: f64 = 1e-9;

/// Number of overlapping strokes that open a pivot
pub const SEED_STROKES: usize = 3;

// ============================================================
// PRICE BAND
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceBand {
    pub lower: f64,
    pub upper: f64,
}

impl PriceBand {
    #[inline]
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Range covered by a stroke's two end bars
    pub fn of_stroke(bars: &[EquivalentBar], stroke: &Stroke) -> Self {
        let (a, b) = (&bars[stroke.start], &bars[stroke.end]);
        Self::new(a.low.min(b.low), a.high.max(b.high))
    }

    /// Strict intersection; touching bands do not intersect
    pub fn intersect(&self, other: &PriceBand) -> Option<PriceBand> {
        let band = Self::new(self.lower.max(other.lower), self.upper.min(other.upper));
        (band.upper > band.lower).then_some(band)
    }

    /// Strictly between the bounds
    #[inline]
    pub fn contains(&self, price: f64) -> bool {
        self.lower < price && price < self.upper
    }
}

/// How the pivot's envelope sits relative to its opening band
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandMove {
    Up,
    Down,
    Flat,
}

impl BandMove {
    fn between(initial: &PriceBand, envelope: &PriceBand) -> Self {
        let lower_shift = envelope.lower - initial.lower;
        let upper_shift = envelope.upper - initial.upper;
        if lower_shift > MOVE_EPSILON && upper_shift > MOVE_EPSILON {
            BandMove::Up
        } else if lower_shift < -MOVE_EPSILON && upper_shift < -MOVE_EPSILON {
            BandMove::Down
        } else {
            BandMove::Flat
        }
    }
}

// ============================================================
// PIVOT
// ============================================================

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pivot {
    /// First stroke of the pivot (stroke index, inclusive)
    pub start_stroke: usize,
    /// Last overlapping stroke (stroke index, inclusive)
    pub end_stroke: usize,
    /// Final, narrowed band; `upper > lower` always
    pub band: PriceBand,
    /// `(start, end)` reduced indices of every overlapping stroke, in order
    pub legs: Vec<(usize, usize)>,
    pub movement: BandMove,
}

impl Pivot {
    /// Lowest low among leg starts and highest high among leg ends
    pub fn envelope(&self, bars: &[EquivalentBar]) -> PriceBand {
        let lower = self
            .legs
            .iter()
            .map(|&(start, _)| bars[start].low)
            .fold(f64::INFINITY, f64::min);
        let upper = self
            .legs
            .iter()
            .map(|&(_, end)| bars[end].high)
            .fold(f64::NEG_INFINITY, f64::max);
        PriceBand::new(lower, upper)
    }
}

fn seed_band(bars: &[EquivalentBar], seed: &[Stroke]) -> Option<PriceBand> {
    let (first, rest) = seed.split_first()?;
    rest.iter()
        .try_fold(PriceBand::of_stroke(bars, first), |band, stroke| {
            band.intersect(&PriceBand::of_stroke(bars, stroke))
        })
}

/// Build pivots over the stroke sequence.
pub fn build_pivots(bars: &[EquivalentBar], strokes: &[Stroke], config: &AnalysisConfig) -> Vec<Pivot> {
    let n = strokes.len();
    let mut pivots = Vec::new();
    let mut i = 0;

    while i + SEED_STROKES <= n {
        let Some(initial) = seed_band(bars, &strokes[i..i + SEED_STROKES]) else {
            i += 1;
            continue;
        };

        let mut band = initial;
        let mut end = i + SEED_STROKES - 1;
        let mut legs: Vec<(usize, usize)> = strokes[i..=end].iter().map(|s| (s.start, s.end)).collect();
        let mut pending_leave = false;

        for (k, stroke) in strokes.iter().enumerate().skip(end + 1) {
            match band.intersect(&PriceBand::of_stroke(bars, stroke)) {
                Some(narrowed) => {
                    pending_leave = false;
                    band = narrowed;
                    end = k;
                    legs.push((stroke.start, stroke.end));
                },
                None if config.confirm_leave && !pending_leave => pending_leave = true,
                None => break,
            }
        }

        let mut pivot = Pivot {
            start_stroke: i,
            end_stroke: end,
            band,
            legs,
            movement: BandMove::Flat,
        };
        pivot.movement = BandMove::between(&initial, &pivot.envelope(bars));
        pivots.push(pivot);

        i = if config.reuse_tail_bi { end } else { end + 1 };
    }

    debug!(
        strokes = n,
        pivots = pivots.len(),
        confirm_leave = config.confirm_leave,
        reuse_tail_bi = config.reuse_tail_bi,
        "pivots built"
    );
    pivots
}
