//! Property tests for structural invariants.
//!
//! Uses proptest to verify:
//! 1. Reduction: one forward pass, leftmost source index kept
//! 2. Leftmost tie-break on fully tied turning points
//! 3. Stroke spacing and alternation
//! 4. Segments backed by at least three strokes, with exact endpoints
//! 5. Pivot band positivity and non-expansion across legs
//! 6. Leave confirmation: one stray stroke never closes a pivot, two do

use chanlun::prelude::*;
use chanlun::structure::{
    bars::reduce_extents,
    fractal::{compress_adjacent, detect_candidates},
    helpers::more_extreme,
    pivot::build_pivots,
    segment::{build_segments, segment_stroke_spans},
    stroke::{build_strokes, normalize},
};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

/// Random walk of `(high, low)` pairs on a coarse price grid so ties occur
fn arb_extents() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((-4i32..=4, 1i32..=6), 3..160).prop_map(|steps| {
        let mut mid = 400i32;
        steps
            .into_iter()
            .map(|(step, half_range)| {
                mid = (mid + step).max(half_range + 1);
                let high = f64::from(mid + half_range) / 4.0;
                let low = f64::from(mid - half_range) / 4.0;
                (high, low)
            })
            .collect()
    })
}

fn arb_config() -> impl Strategy<Value = AnalysisConfig> {
    (any::<bool>(), any::<bool>()).prop_map(|(confirm_leave, reuse_tail_bi)| {
        AnalysisConfig::resolve(Mode::Precision, Some(confirm_leave), Some(reuse_tail_bi))
    })
}

/// Stages up to strokes
fn strokes_of(extents: &[(f64, f64)]) -> (Vec<EquivalentBar>, Vec<Stroke>) {
    let bars = reduce_extents(extents.iter().copied());
    let candidates = detect_candidates(&bars);
    let points = normalize(&bars, &candidates);
    let strokes = build_strokes(&bars, &points);
    (bars, strokes)
}

// ── 1. Reduction ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn reduction_compares_only_against_current_bar(extents in arb_extents()) {
        let reduced = reduce_extents(extents.iter().copied());

        for (k, bar) in reduced.iter().enumerate() {
            // every folded bar nests with the range merged so far
            let (mut high, mut low) = extents[bar.source_start];
            for &(h, l) in &extents[bar.source_start + 1..=bar.source_end] {
                let merged = EquivalentBar::single(bar.source_start, high, low);
                prop_assert!(merged.overlaps_fully(h, l));
                high = high.max(h);
                low = low.min(l);
            }
            prop_assert_eq!((bar.high, bar.low), (high, low));

            // the bar that opened this one did not nest with the finished left bar
            if k > 0 {
                let (h, l) = extents[bar.source_start];
                prop_assert!(!reduced[k - 1].overlaps_fully(h, l));
            }
        }
    }

    #[test]
    fn reduced_bar_never_sits_inside_its_left_neighbour(extents in arb_extents()) {
        let reduced = reduce_extents(extents.iter().copied());
        for pair in reduced.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(!(b.high <= a.high && b.low >= a.low));
        }
    }

    #[test]
    fn reduction_covers_every_source_bar(extents in arb_extents()) {
        let reduced = reduce_extents(extents.iter().copied());
        prop_assert_eq!(reduced[0].source_start, 0);
        prop_assert_eq!(reduced[reduced.len() - 1].source_end, extents.len() - 1);
        for pair in reduced.windows(2) {
            prop_assert_eq!(pair[1].source_start, pair[0].source_end + 1);
        }
    }
}

// ── 2. Tie-break ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn full_ties_keep_the_leftmost(
        high in 10.0..20.0_f64,
        width in 0.5..5.0_f64,
        len in 2usize..30,
        top in any::<bool>(),
    ) {
        let bars: Vec<EquivalentBar> =
            (0..len).map(|i| EquivalentBar::single(i, high, high - width)).collect();
        let kind = if top { TurnKind::Top } else { TurnKind::Bottom };

        for i in 0..len - 1 {
            let a = TurningPoint::new(i, kind);
            let b = TurningPoint::new(i + 1, kind);
            prop_assert_eq!(more_extreme(&bars, a, b), a);
            prop_assert_eq!(compress_adjacent(&bars, &[a, b]), vec![a]);
        }

        // a flat series never yields a turning point
        prop_assert!(detect_candidates(&bars).is_empty());
    }
}

// ── 3. Strokes ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn strokes_are_spaced_and_alternate(extents in arb_extents()) {
        let (_, strokes) = strokes_of(&extents);

        for stroke in &strokes {
            prop_assert!(stroke.end >= stroke.start + 2);
        }
        for pair in strokes.windows(2) {
            prop_assert_ne!(pair[0].direction, pair[1].direction);
            prop_assert_eq!(pair[0].end, pair[1].start);
        }
    }
}

// ── 4. Segments ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn segments_rest_on_three_strokes(extents in arb_extents()) {
        let (bars, strokes) = strokes_of(&extents);
        let spans = segment_stroke_spans(&bars, &strokes);
        let segments = build_segments(&bars, &strokes);

        prop_assert_eq!(spans.len(), segments.len());
        for (&(first, last), segment) in spans.iter().zip(&segments) {
            prop_assert!(last >= first + 2);
            prop_assert_eq!(segment.start, strokes[first].start);
            prop_assert_eq!(segment.end, strokes[last].end);
            prop_assert_eq!(segment.direction, strokes[first].direction);
        }
        for pair in spans.windows(2) {
            prop_assert!(pair[1].0 > pair[0].1);
        }
    }
}

// ── 5. Pivot bands ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn pivot_bands_are_positive_and_inside_every_leg(
        extents in arb_extents(),
        config in arb_config(),
    ) {
        let (bars, strokes) = strokes_of(&extents);
        let pivots = build_pivots(&bars, &strokes, &config);

        for pivot in &pivots {
            prop_assert!(pivot.band.upper > pivot.band.lower);
            prop_assert!(pivot.legs.len() >= 3);
            prop_assert!(pivot.end_stroke >= pivot.start_stroke + 2);
            for &(start, end) in &pivot.legs {
                let leg = PriceBand::new(
                    bars[start].low.min(bars[end].low),
                    bars[start].high.max(bars[end].high),
                );
                prop_assert!(pivot.band.lower >= leg.lower);
                prop_assert!(pivot.band.upper <= leg.upper);
            }
        }
        for pair in pivots.windows(2) {
            let step = if config.reuse_tail_bi { 0 } else { 1 };
            prop_assert!(pair[1].start_stroke >= pair[0].end_stroke + step);
        }
    }
}

// ── 6. Leave confirmation ────────────────────────────────────────────

/// Strokes whose bands are exactly the given `(low, high)` pairs
fn banded(bands: &[(f64, f64)]) -> (Vec<EquivalentBar>, Vec<Stroke>) {
    let mut bars = Vec::new();
    let mut strokes = Vec::new();
    for (k, &(low, high)) in bands.iter().enumerate() {
        let start = bars.len();
        bars.push(EquivalentBar::single(start, high, low));
        bars.push(EquivalentBar::single(start + 1, high, low));
        let direction = if k % 2 == 0 { Direction::Up } else { Direction::Down };
        strokes.push(Stroke::new(start, start + 1, direction));
    }
    (bars, strokes)
}

proptest! {
    #[test]
    fn single_exit_never_closes_with_confirmation(
        center in 10.0..100.0_f64,
        widths in prop::array::uniform3(1.0..3.0_f64),
        gap in 0.1..5.0_f64,
        above in any::<bool>(),
    ) {
        let seed: Vec<(f64, f64)> = widths.iter().map(|w| (center - w, center + w)).collect();
        let inner = widths.iter().copied().fold(f64::INFINITY, f64::min);
        let stray = if above {
            (center + inner + gap, center + inner + gap + 1.0)
        } else {
            (center - inner - gap - 1.0, center - inner - gap)
        };
        let back = (center - 0.5, center + 0.5);

        let confirm = AnalysisConfig::resolve(Mode::Precision, Some(true), Some(false));

        let mut bands = seed.clone();
        bands.extend([stray, back]);
        let (bars, strokes) = banded(&bands);
        let pivots = build_pivots(&bars, &strokes, &confirm);
        prop_assert_eq!(pivots[0].end_stroke, 4);
        prop_assert_eq!(pivots[0].legs.len(), 4);

        let mut bands = seed;
        bands.extend([stray, stray, back]);
        let (bars, strokes) = banded(&bands);
        let pivots = build_pivots(&bars, &strokes, &confirm);
        prop_assert_eq!(pivots[0].end_stroke, 2);
    }
}
