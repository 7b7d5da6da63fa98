//! Bar reduction: merge contained and engulfing bars
//!
//! One left-to-right pass keeps a single "current" merged bar. An incoming
//! bar whose range is contained in, or engulfs, the current range is folded
//! into it; anything else starts a new bar. The merged bar always keeps its
//! leftmost source index.
//!
//! Finished bars are never revisited. A widened bar may therefore engulf its
//! left neighbour, but no output bar is ever contained in the bar before it.

use tracing::debug;

use crate::OHLCV;

/// A bar produced by merging one or more source bars
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EquivalentBar {
    pub high: f64,
    pub low: f64,
    /// First source bar folded into this one (representative index)
    pub source_start: usize,
    /// Last source bar folded into this one, inclusive
    pub source_end: usize,
}

impl EquivalentBar {
    #[inline]
    pub fn single(index: usize, high: f64, low: f64) -> Self {
        Self {
            high,
            low,
            source_start: index,
            source_end: index,
        }
    }

    #[inline]
    pub fn midpoint(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// True when the two ranges are nested either way (equal ranges count)
    #[inline]
    pub fn overlaps_fully(&self, high: f64, low: f64) -> bool {
        let contained = high <= self.high && low >= self.low;
        let engulfing = high >= self.high && low <= self.low;
        contained || engulfing
    }

    #[inline]
    fn absorb(&mut self, other: &EquivalentBar) {
        self.high = self.high.max(other.high);
        self.low = self.low.min(other.low);
        self.source_end = other.source_end;
    }
}

/// Reduce a bar series to equivalent bars.
pub fn reduce<T: OHLCV>(bars: &[T]) -> Vec<EquivalentBar> {
    let reduced = reduce_extents(bars.iter().map(|b| (b.high(), b.low())));
    debug!(input = bars.len(), reduced = reduced.len(), "bars reduced");
    reduced
}

/// Reduce raw `(high, low)` pairs; the index of each pair is its source index.
pub fn reduce_extents(extents: impl IntoIterator<Item = (f64, f64)>) -> Vec<EquivalentBar> {
    let mut out: Vec<EquivalentBar> = Vec::new();
    for (i, (high, low)) in extents.into_iter().enumerate() {
        let incoming = EquivalentBar::single(i, high, low);
        let nested = out.last().is_some_and(|cur| cur.overlaps_fully(high, low));
        if !nested {
            out.push(incoming);
        } else if let Some(cur) = out.last_mut() {
            cur.absorb(&incoming);
        }
    }
    out
}
