//! Turning point (fractal) detection on the reduced series
//!
//! A top sits at the centre of a 3-bar window whose centre bar carries the
//! window's highest high *and* highest low; a bottom mirrors that with the
//! lowest low and lowest high. Ties resolve to the leftmost bar, so a centre
//! bar that only matches its left neighbour is not a turning point.

use tracing::debug;

use super::{
    bars::EquivalentBar,
    helpers::{leftmost_max, leftmost_min, more_extreme},
};
use crate::TurnKind;

/// A local extremum in the reduced series
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TurningPoint {
    /// Position in the reduced sequence
    pub index: usize,
    pub kind: TurnKind,
}

impl TurningPoint {
    #[inline]
    pub const fn new(index: usize, kind: TurnKind) -> Self {
        Self { index, kind }
    }
}

fn classify_window(bars: &[EquivalentBar], i: usize) -> Option<TurnKind> {
    let highs = [bars[i - 1].high, bars[i].high, bars[i + 1].high];
    let lows = [bars[i - 1].low, bars[i].low, bars[i + 1].low];

    let top = leftmost_max(highs) == 1 && leftmost_max(lows) == 1;
    let bottom = leftmost_min(lows) == 1 && leftmost_min(highs) == 1;

    match (top, bottom) {
        (true, false) => Some(TurnKind::Top),
        (false, true) => Some(TurnKind::Bottom),
        // flat triple or no extremum
        _ => None,
    }
}

/// Every interior index that forms a top or bottom, ascending.
pub fn detect_candidates(bars: &[EquivalentBar]) -> Vec<TurningPoint> {
    if bars.len() < 3 {
        return Vec::new();
    }

    let candidates: Vec<TurningPoint> = (1..bars.len() - 1)
        .filter_map(|i| classify_window(bars, i).map(|kind| TurningPoint::new(i, kind)))
        .collect();

    debug!(candidates = candidates.len(), "turning points detected");
    candidates
}

/// Collapse candidates one index apart until none remain.
///
/// Each pass walks the sequence pairwise: a same-kind pair keeps the more
/// extreme point, a mixed pair keeps the left one. Passes repeat to a fixed
/// point since a collapse can create a new adjacent pair.
pub fn compress_adjacent(bars: &[EquivalentBar], candidates: &[TurningPoint]) -> Vec<TurningPoint> {
    let mut out: Vec<TurningPoint> = candidates.to_vec();
    out.sort_by_key(|p| p.index);

    loop {
        let mut changed = false;
        let mut next = Vec::with_capacity(out.len());
        let mut i = 0;
        while i < out.len() {
            let a = out[i];
            match out.get(i + 1) {
                Some(&b) if b.index == a.index + 1 => {
                    next.push(more_extreme(bars, a, b));
                    changed = true;
                    i += 2;
                },
                _ => {
                    next.push(a);
                    i += 1;
                },
            }
        }
        out = next;
        if !changed {
            return out;
        }
    }
}
