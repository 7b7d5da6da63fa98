//! Common helpers shared by the structure stages
//!
//! Tie-break and momentum rules live here so every stage resolves ties and
//! measures strength the same way.

use super::{bars::EquivalentBar, fractal::TurningPoint};
use crate::{Direction, TurnKind};

// ============================================================
// TIE-BREAKS
// ============================================================

/// Index of the first maximum in a 3-wide window
#[inline]
pub fn leftmost_max(values: [f64; 3]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Index of the first minimum in a 3-wide window
#[inline]
pub fn leftmost_min(values: [f64; 3]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v < values[best] {
            best = i;
        }
    }
    best
}

/// The more extreme of two turning points.
///
/// Tops compare high then low, bottoms compare low then high. A full tie, or
/// a pair of different kinds, keeps `a`; callers pass the left point as `a`.
pub fn more_extreme(bars: &[EquivalentBar], a: TurningPoint, b: TurningPoint) -> TurningPoint {
    if a.kind != b.kind {
        return a;
    }
    let (x, y) = (&bars[a.index], &bars[b.index]);
    let b_wins = match a.kind {
        TurnKind::Top => y.high > x.high || (y.high == x.high && y.low > x.low),
        TurnKind::Bottom => y.low < x.low || (y.low == x.low && y.high < x.high),
    };
    if b_wins {
        b
    } else {
        a
    }
}

// ============================================================
// MOMENTUM
// ============================================================

/// Signed price travel between two reduced bars in `direction`
#[inline]
pub fn directional_delta(bars: &[EquivalentBar], start: usize, end: usize, direction: Direction) -> f64 {
    match direction {
        Direction::Up => bars[end].high - bars[start].low,
        Direction::Down => bars[start].high - bars[end].low,
    }
}

/// `delta / ln(span + 1)` with the span floored at one bar
#[inline]
pub fn log_momentum(delta: f64, start: usize, end: usize) -> f64 {
    let span = end.saturating_sub(start).max(1) as f64;
    delta / (span + 1.0).ln()
}

/// The bound a move pushes: high of the end bar going up, low going down
#[inline]
pub fn extreme_value(bars: &[EquivalentBar], end: usize, direction: Direction) -> f64 {
    match direction {
        Direction::Up => bars[end].high,
        Direction::Down => bars[end].low,
    }
}

/// Strictly beyond `reference` in `direction`
#[inline]
pub fn is_new_extreme(value: f64, reference: f64, direction: Direction) -> bool {
    match direction {
        Direction::Up => value > reference,
        Direction::Down => value < reference,
    }
}
