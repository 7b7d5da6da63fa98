//! Segments: runs of alternating strokes cut on divergence
//!
//! A segment seeds on three consecutive alternating strokes and takes the
//! direction of the first. It then extends one stroke at a time while
//! tracking a reference (extreme and momentum) of the last same-direction
//! stroke that set a new extreme:
//!
//! - two consecutive strokes sharing a direction end the segment *before*
//!   the breaking stroke
//! - a same-direction stroke that sets a strictly new extreme with strictly
//!   lower momentum than the reference ends the segment *including* it
//! - anything else is absorbed
//!
//! The next seed search starts on the stroke after the closing one, so
//! segments are contiguous and never share a stroke.

use tracing::{debug, error};

use super::{
    bars::EquivalentBar,
    helpers::{directional_delta, extreme_value, is_new_extreme, log_momentum},
    stroke::Stroke,
};
use crate::Direction;

/// Minimum number of strokes backing a segment
pub const MIN_SEGMENT_STROKES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Segment {
    /// Start of the first stroke (reduced index)
    pub start: usize,
    /// End of the last stroke (reduced index)
    pub end: usize,
    pub direction: Direction,
}

impl Segment {
    #[inline]
    pub const fn new(start: usize, end: usize, direction: Direction) -> Self {
        Self { start, end, direction }
    }

    /// Directional travel over `ln(span + 1)`, floored at zero
    pub fn momentum(&self, bars: &[EquivalentBar]) -> f64 {
        let delta = directional_delta(bars, self.start, self.end, self.direction);
        log_momentum(delta.max(0.0), self.start, self.end)
    }

    #[inline]
    pub fn extreme(&self, bars: &[EquivalentBar]) -> f64 {
        extreme_value(bars, self.end, self.direction)
    }

    /// New strict extreme versus `previous` with strictly lower momentum
    pub fn diverges_from(&self, previous: &Segment, bars: &[EquivalentBar]) -> bool {
        is_new_extreme(self.extreme(bars), previous.extreme(bars), self.direction)
            && self.momentum(bars) < previous.momentum(bars)
    }
}

/// Extreme and momentum of the last same-direction stroke that set a new
/// extreme inside the current segment
#[derive(Debug, Clone, Copy)]
struct Reference {
    extreme: f64,
    momentum: f64,
}

impl Reference {
    fn of(stroke: &Stroke, bars: &[EquivalentBar]) -> Self {
        Self {
            extreme: stroke.extreme(bars),
            momentum: stroke.momentum(bars),
        }
    }
}

#[inline]
fn alternates(a: &Stroke, b: &Stroke) -> bool {
    a.direction != b.direction
}

/// Index of the first and last stroke behind each segment.
pub fn segment_stroke_spans(bars: &[EquivalentBar], strokes: &[Stroke]) -> Vec<(usize, usize)> {
    let n = strokes.len();
    let mut spans = Vec::new();
    let mut i = 0;

    while i + MIN_SEGMENT_STROKES <= n {
        let (s0, s1, s2) = (&strokes[i], &strokes[i + 1], &strokes[i + 2]);
        if !(alternates(s0, s1) && alternates(s1, s2)) {
            i += 1;
            continue;
        }

        let direction = s0.direction;
        let mut reference = Reference::of(s0, bars);
        if is_new_extreme(s2.extreme(bars), reference.extreme, direction) {
            reference = Reference::of(s2, bars);
        }

        let mut last = i + 2;
        for k in i + MIN_SEGMENT_STROKES..n {
            let stroke = &strokes[k];
            if !alternates(&strokes[k - 1], stroke) {
                error!(stroke = k, "non-alternating strokes reached segment extension");
                break;
            }

            if stroke.direction == direction {
                let extreme = stroke.extreme(bars);
                if is_new_extreme(extreme, reference.extreme, direction) {
                    let momentum = stroke.momentum(bars);
                    if momentum < reference.momentum {
                        last = k;
                        break;
                    }
                    reference = Reference { extreme, momentum };
                }
            }
            last = k;
        }

        spans.push((i, last));
        i = last + 1;
    }

    spans
}

/// Build segments from strokes; fewer than three strokes yield none.
pub fn build_segments(bars: &[EquivalentBar], strokes: &[Stroke]) -> Vec<Segment> {
    let segments: Vec<Segment> = segment_stroke_spans(bars, strokes)
        .into_iter()
        .map(|(first, last)| {
            Segment::new(strokes[first].start, strokes[last].end, strokes[first].direction)
        })
        .collect();

    debug!(strokes = strokes.len(), segments = segments.len(), "segments built");
    segments
}

/// Nearest earlier segment with the same direction as `segments[k]`
pub fn previous_same_direction(segments: &[Segment], k: usize) -> Option<usize> {
    let direction = segments.get(k)?.direction;
    segments[..k].iter().rposition(|s| s.direction == direction)
}

/// Whether `segments[k]` diverges from its previous same-direction segment
pub fn diverges_at(bars: &[EquivalentBar], segments: &[Segment], k: usize) -> bool {
    previous_same_direction(segments, k)
        .is_some_and(|j| segments[k].diverges_from(&segments[j], bars))
}
