//! Strokes: directed moves between alternating turning points
//!
//! Candidates go through three normalization passes before pairing:
//!
//! 1. adjacency compression ([`compress_adjacent`])
//! 2. alternation: consecutive same-kind points collapse to the more extreme
//! 3. minimum span: kept points must be at least two reduced bars apart
//!
//! After normalization every consecutive pair alternates and is spaced by at
//! least two bars, so pairing yields one stroke per pair.

use tracing::{debug, error};

use super::{
    bars::EquivalentBar,
    fractal::{compress_adjacent, TurningPoint},
    helpers::{directional_delta, extreme_value, log_momentum, more_extreme},
};
use crate::{Direction, TurnKind};

/// Minimum index distance between the two ends of a stroke
pub const MIN_STROKE_SPAN: usize = 2;

/// A directed move between two turning points
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Stroke {
    pub start: usize,
    pub end: usize,
    pub direction: Direction,
}

impl Stroke {
    #[inline]
    pub const fn new(start: usize, end: usize, direction: Direction) -> Self {
        Self { start, end, direction }
    }

    #[inline]
    pub fn span(&self) -> usize {
        self.end - self.start
    }

    /// `delta / ln(span + 1)`; may be negative for a malformed stroke
    pub fn momentum(&self, bars: &[EquivalentBar]) -> f64 {
        let delta = directional_delta(bars, self.start, self.end, self.direction);
        log_momentum(delta, self.start, self.end)
    }

    #[inline]
    pub fn extreme(&self, bars: &[EquivalentBar]) -> f64 {
        extreme_value(bars, self.end, self.direction)
    }
}

/// Normalize raw candidates into an alternating, well-spaced sequence.
pub fn normalize(bars: &[EquivalentBar], candidates: &[TurningPoint]) -> Vec<TurningPoint> {
    let compressed = compress_adjacent(bars, candidates);

    let mut alternating: Vec<TurningPoint> = Vec::with_capacity(compressed.len());
    for point in compressed {
        match alternating.last_mut() {
            Some(last) if last.kind == point.kind => *last = more_extreme(bars, *last, point),
            _ => alternating.push(point),
        }
    }

    let mut spaced: Vec<TurningPoint> = Vec::with_capacity(alternating.len());
    for point in alternating {
        match spaced.last_mut() {
            Some(last) if point.index - last.index < MIN_STROKE_SPAN => {
                error!(
                    left = last.index,
                    right = point.index,
                    "adjacent turning points survived compression"
                );
                if last.kind == point.kind {
                    *last = more_extreme(bars, *last, point);
                }
            },
            _ => spaced.push(point),
        }
    }

    debug!(
        candidates = candidates.len(),
        normalized = spaced.len(),
        "turning points normalized"
    );
    spaced
}

/// Pair consecutive normalized points into strokes.
pub fn build_strokes(bars: &[EquivalentBar], points: &[TurningPoint]) -> Vec<Stroke> {
    let Some((&first, rest)) = points.split_first() else {
        return Vec::new();
    };

    let mut strokes = Vec::with_capacity(rest.len());
    let mut prev = first;
    for &cur in rest {
        if cur.index - prev.index < MIN_STROKE_SPAN {
            error!(start = prev.index, end = cur.index, "stroke shorter than minimum span skipped");
            continue;
        }
        match (prev.kind, cur.kind) {
            (TurnKind::Bottom, TurnKind::Top) => {
                strokes.push(Stroke::new(prev.index, cur.index, Direction::Up));
                prev = cur;
            },
            (TurnKind::Top, TurnKind::Bottom) => {
                strokes.push(Stroke::new(prev.index, cur.index, Direction::Down));
                prev = cur;
            },
            _ => {
                error!(left = prev.index, right = cur.index, "same-kind turning points reached pairing");
                prev = more_extreme(bars, prev, cur);
            },
        }
    }

    debug!(strokes = strokes.len(), "strokes built");
    strokes
}
