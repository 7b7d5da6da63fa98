//! Buy-strength scoring and action decision
//!
//! Five binary components are weighted into a buy strength:
//!
//! | Component | Weight | Condition |
//! |-----------|--------|-----------|
//! | A | 0.35 | price near the latest pivot's upper edge, or retesting it |
//! | B | 0.25 | last segment up after a down segment |
//! | C | 0.15 | last segment stronger than its previous same-direction segment by 2% |
//! | D | 0.15 | no divergence in the trend state |
//! | E | 0.10 | latest pivot has at least four legs |
//!
//! The action is then picked from the trend class, the score and the trend
//! confidence.

use chrono::NaiveDate;
use tracing::debug;

use crate::{
    structure::{
        bars::EquivalentBar,
        pivot::Pivot,
        segment::{previous_same_direction, Segment},
    },
    trend::{TrendClass, TrendState},
    Direction,
};

// ============================================================
// THRESHOLDS
// ============================================================

/// Half-width of the "near upper edge" band, relative to the edge
pub const UPPER_NEAR_PCT: f64 = 0.002;
/// Bars before the last one searched for a retest of the upper edge
pub const LOOKBACK_BARS: usize = 3;
/// Margin the last segment's momentum must clear for component C
pub const MOMENTUM_MARGIN: f64 = 0.02;
pub const BUY_THRESHOLD: f64 = 0.85;
/// Minimum trend confidence for a buy
pub const CONFIDENCE_GATE: f64 = 0.80;
/// Lower score bound for hold/watch; also the confidence gate for hold
pub const HOLD_THRESHOLD: f64 = 0.70;
/// Fall below the anchor that invalidates the entry
pub const INVALIDATION_FALL: f64 = 0.01;
/// Legs that make a pivot major-degree
pub const MAJOR_PIVOT_LEGS: usize = 4;

pub const WEIGHT_A: f64 = 0.35;
pub const WEIGHT_B: f64 = 0.25;
pub const WEIGHT_C: f64 = 0.15;
pub const WEIGHT_D: f64 = 0.15;
pub const WEIGHT_E: f64 = 0.10;

/// Smallest tolerance used around the upper edge
const MIN_TOLERANCE: f64 = 1e-9;

const FALLBACK_REASON: &str = "structure does not yet satisfy strong-buy conditions";

// ============================================================
// TYPES
// ============================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Hold,
    Watch,
    TakeProfit,
    Avoid,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Buy,
        Action::Hold,
        Action::Watch,
        Action::TakeProfit,
        Action::Avoid,
    ];
}

/// 0/1 flags on the wire
mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        f64::deserialize(deserializer).map(|v| v != 0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Components {
    #[serde(rename = "A", with = "flag")]
    pub a: bool,
    #[serde(rename = "B", with = "flag")]
    pub b: bool,
    #[serde(rename = "C", with = "flag")]
    pub c: bool,
    #[serde(rename = "D", with = "flag")]
    pub d: bool,
    #[serde(rename = "E", with = "flag")]
    pub e: bool,
}

impl Components {
    /// Weighted sum clamped to `[0, 1]`
    pub fn score(&self) -> f64 {
        let weighted = [
            (self.a, WEIGHT_A),
            (self.b, WEIGHT_B),
            (self.c, WEIGHT_C),
            (self.d, WEIGHT_D),
            (self.e, WEIGHT_E),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, w)| w)
        .sum::<f64>();
        weighted.clamp(0.0, 1.0)
    }
}

/// Condition under which the recommendation no longer holds
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Invalidation {
    pub rule: String,
    /// Reference price the rule is measured from
    pub anchor: Option<f64>,
    /// `anchor * (1 - 1%)`
    pub trigger: Option<f64>,
}

impl Invalidation {
    pub fn none() -> Self {
        Self {
            rule: "none".to_string(),
            anchor: None,
            trigger: None,
        }
    }

    fn below(anchor: f64, label: &str) -> Self {
        let trigger = anchor * (1.0 - INVALIDATION_FALL);
        Self {
            rule: format!(
                "break below {label} -{}% ({trigger:.3}) invalidates this entry",
                (INVALIDATION_FALL * 100.0).round()
            ),
            anchor: Some(anchor),
            trigger: Some(trigger),
        }
    }

    fn generic() -> Self {
        Self {
            rule: "break below most recent low -1% invalidates this entry".to_string(),
            anchor: None,
            trigger: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Recommendation {
    pub action: Action,
    /// Weighted component score rounded to 4 decimals
    pub buy_strength: f64,
    pub components: Components,
    pub rationale: Vec<String>,
    pub invalidation: Invalidation,
    /// Date of the bar the recommendation applies to; set by the report
    pub at_close_of: Option<NaiveDate>,
}

impl Recommendation {
    /// Recommendation reported when there is nothing to analyze
    pub fn neutral() -> Self {
        Self {
            action: Action::Avoid,
            buy_strength: 0.0,
            components: Components::default(),
            rationale: vec!["insufficient data".to_string()],
            invalidation: Invalidation::none(),
            at_close_of: None,
        }
    }
}

// ============================================================
// COMPONENTS
// ============================================================

/// Component A and its reason, if any
fn near_upper_edge(bars: &[EquivalentBar], pivot: Option<&Pivot>) -> Option<&'static str> {
    let upper = pivot?.band.upper;
    let last = bars.last()?;
    let tolerance = MIN_TOLERANCE.max(upper * UPPER_NEAR_PCT);
    let near = |price: f64| (upper - tolerance) <= price && price <= (upper + tolerance);

    if near(last.midpoint()) {
        return Some("near pivot upper edge, holding on retest");
    }

    let n = bars.len();
    if n < 2 || last.midpoint() < upper - tolerance {
        return None;
    }
    let from = n.saturating_sub(1 + LOOKBACK_BARS);
    bars[from..n - 1]
        .iter()
        .any(|bar| near(bar.midpoint()))
        .then_some("retest of upper edge confirmed after breakout")
}

fn direction_flip(segments: &[Segment]) -> bool {
    match segments {
        [.., prev, last] => last.direction == Direction::Up && prev.direction == Direction::Down,
        _ => false,
    }
}

fn momentum_improves(bars: &[EquivalentBar], segments: &[Segment]) -> bool {
    let Some(k) = segments.len().checked_sub(1) else {
        return false;
    };
    previous_same_direction(segments, k).is_some_and(|j| {
        segments[k].momentum(bars) > segments[j].momentum(bars) * (1.0 + MOMENTUM_MARGIN)
    })
}

fn invalidation(
    bars: &[EquivalentBar],
    segments: &[Segment],
    pivot: Option<&Pivot>,
    trend: &TrendState,
) -> Invalidation {
    match (trend.class, segments.last(), pivot) {
        (TrendClass::DownDivergenceConfirmed, Some(last), _) => {
            Invalidation::below(bars[last.end].low, "divergence-confirmation low")
        },
        (_, _, Some(pivot)) => Invalidation::below(pivot.band.upper, "pivot upper edge"),
        (_, Some(last), None) => {
            let anchor = match last.direction {
                Direction::Up => bars[last.start].low,
                Direction::Down => bars[last.start].high,
            };
            Invalidation::below(anchor, "reference level")
        },
        (_, None, None) => Invalidation::generic(),
    }
}

fn decide(class: TrendClass, score: f64, confidence: f64) -> Action {
    let buy_class = matches!(class, TrendClass::BreakoutUp | TrendClass::DownDivergenceConfirmed);
    let in_hold_band = (HOLD_THRESHOLD..BUY_THRESHOLD).contains(&score);

    if buy_class && score >= BUY_THRESHOLD && confidence >= CONFIDENCE_GATE {
        Action::Buy
    } else if class == TrendClass::BreakoutUp && in_hold_band && confidence >= HOLD_THRESHOLD {
        Action::Hold
    } else if class == TrendClass::UpDivergenceConfirmed {
        Action::TakeProfit
    } else if class == TrendClass::Oscillation && in_hold_band {
        Action::Watch
    } else {
        Action::Avoid
    }
}

// ============================================================
// ENGINE
// ============================================================

/// Score the last bar and decide an action.
pub fn recommend(
    bars: &[EquivalentBar],
    segments: &[Segment],
    pivots: &[Pivot],
    trend: &TrendState,
) -> Recommendation {
    let pivot = pivots.last();
    let reason_a = near_upper_edge(bars, pivot);

    let components = Components {
        a: reason_a.is_some(),
        b: direction_flip(segments),
        c: momentum_improves(bars, segments),
        d: !trend.class.is_divergence(),
        e: pivot.is_some_and(|p| p.legs.len() >= MAJOR_PIVOT_LEGS),
    };

    let mut rationale: Vec<String> = [
        components.b.then_some("turned from down to up, leaving segment established"),
        reason_a,
        components.c.then_some("current segment momentum exceeds the previous one"),
        components.d.then_some("no internal divergence signal"),
        components.e.then_some("based on a major-degree pivot"),
    ]
    .into_iter()
    .flatten()
    .map(String::from)
    .collect();
    if rationale.is_empty() {
        rationale.push(FALLBACK_REASON.to_string());
    }

    let score = components.score();
    let action = decide(trend.class, score, trend.confidence);

    debug!(?action, score, confidence = trend.confidence, "recommendation scored");

    Recommendation {
        action,
        buy_strength: (score * 10_000.0).round() / 10_000.0,
        components,
        rationale,
        invalidation: invalidation(bars, segments, pivot, trend),
        at_close_of: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::pivot::{BandMove, PriceBand};

    fn pivot(lower: f64, upper: f64, legs: usize) -> Pivot {
        Pivot {
            start_stroke: 0,
            end_stroke: legs - 1,
            band: PriceBand::new(lower, upper),
            legs: (0..legs).map(|i| (i, i + 1)).collect(),
            movement: BandMove::Flat,
        }
    }

    fn state(class: TrendClass, confidence: f64) -> TrendState {
        TrendState {
            class,
            confidence,
            risk: 1.0 - confidence,
            ..TrendState::neutral()
        }
    }

    #[test]
    fn test_score_weights() {
        let all = Components {
            a: true,
            b: true,
            c: true,
            d: true,
            e: true,
        };
        assert!((all.score() - 1.0).abs() < 1e-12);
        let ad = Components {
            a: true,
            d: true,
            ..Components::default()
        };
        assert!((ad.score() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_decision_table() {
        assert_eq!(decide(TrendClass::BreakoutUp, 0.9, 0.85), Action::Buy);
        assert_eq!(decide(TrendClass::DownDivergenceConfirmed, 0.85, 0.8), Action::Buy);
        assert_eq!(decide(TrendClass::BreakoutUp, 0.9, 0.75), Action::Avoid);
        assert_eq!(decide(TrendClass::BreakoutUp, 0.75, 0.7), Action::Hold);
        assert_eq!(decide(TrendClass::BreakoutUp, 0.75, 0.69), Action::Avoid);
        assert_eq!(decide(TrendClass::UpDivergenceConfirmed, 0.0, 0.0), Action::TakeProfit);
        assert_eq!(decide(TrendClass::Oscillation, 0.7, 0.1), Action::Watch);
        assert_eq!(decide(TrendClass::Oscillation, 0.85, 0.9), Action::Avoid);
        assert_eq!(decide(TrendClass::DownDivergencePending, 1.0, 1.0), Action::Avoid);
    }

    #[test]
    fn test_near_upper_edge() {
        let p = pivot(9.0, 11.0, 3);
        let bars = vec![EquivalentBar::single(0, 11.02, 10.98)];
        assert!(near_upper_edge(&bars, Some(&p)).is_some());
        assert!(near_upper_edge(&bars, None).is_none());
    }

    #[test]
    fn test_retest_within_lookback() {
        let p = pivot(9.0, 11.0, 3);
        let bars = vec![
            EquivalentBar::single(0, 9.0, 8.0),
            EquivalentBar::single(1, 11.1, 10.9),
            EquivalentBar::single(2, 12.0, 11.5),
            EquivalentBar::single(3, 12.5, 12.0),
        ];
        assert_eq!(
            near_upper_edge(&bars, Some(&p)),
            Some("retest of upper edge confirmed after breakout")
        );

        // retest too far back
        let mut far = vec![EquivalentBar::single(0, 11.1, 10.9)];
        far.extend((1..5).map(|i| EquivalentBar::single(i, 12.5, 12.0)));
        assert!(near_upper_edge(&far, Some(&p)).is_none());
    }

    #[test]
    fn test_rationale_order_and_fallback() {
        let bars = vec![EquivalentBar::single(0, 11.01, 10.99)];
        let rec = recommend(&bars, &[], &[pivot(9.0, 11.0, 4)], &state(TrendClass::Oscillation, 0.5));
        assert_eq!(
            rec.rationale,
            vec![
                "near pivot upper edge, holding on retest",
                "no internal divergence signal",
                "based on a major-degree pivot",
            ]
        );
        assert_eq!(rec.buy_strength, 0.6);

        let rec = recommend(&bars, &[], &[], &state(TrendClass::UpDivergencePending, 0.5));
        assert_eq!(rec.rationale, vec![FALLBACK_REASON]);
        assert_eq!(rec.buy_strength, 0.0);
        assert_eq!(rec.invalidation.rule, "break below most recent low -1% invalidates this entry");
    }

    #[test]
    fn test_invalidation_anchors() {
        let bars: Vec<EquivalentBar> = (0..6)
            .map(|i| EquivalentBar::single(i, 10.0 + i as f64, 9.0 + i as f64))
            .collect();
        let segments = [Segment::new(1, 5, Direction::Up)];

        let inv = invalidation(&bars, &segments, None, &state(TrendClass::Oscillation, 0.5));
        assert_eq!(inv.anchor, Some(10.0));

        let p = pivot(9.0, 12.0, 3);
        let inv = invalidation(&bars, &segments, Some(&p), &state(TrendClass::Oscillation, 0.5));
        assert_eq!(inv.anchor, Some(12.0));
        assert!(inv.rule.contains("11.880"));

        let inv = invalidation(&bars, &segments, Some(&p), &state(TrendClass::DownDivergenceConfirmed, 0.5));
        assert_eq!(inv.anchor, Some(14.0));
    }

    #[test]
    fn test_components_serialize_as_flags() {
        let c = Components {
            a: true,
            e: true,
            ..Components::default()
        };
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"{"A":1,"B":0,"C":0,"D":0,"E":1}"#);
        let back: Components = serde_json::from_str(r#"{"A":1.0,"B":0,"C":0,"D":0,"E":1}"#).unwrap();
        assert_eq!(back, c);
    }
}
