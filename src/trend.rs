//! Trend classification
//!
//! Exactly one of seven states is assigned, checked in priority order:
//!
//! 1. divergence confirmed: the second-to-last segment diverged from its
//!    previous same-direction segment and the last segment reversed
//! 2. divergence pending: the last segment diverges
//! 3. breakout in progress: price beyond the latest pivot band on the side the
//!    last segment points to
//! 4. oscillation otherwise
//!
//! Price position is the midpoint of the last reduced bar.

use std::fmt;

use tracing::debug;

use crate::{
    structure::{
        bars::EquivalentBar,
        pivot::Pivot,
        segment::{diverges_at, Segment},
    },
    Direction,
};

// ============================================================
// CONFIDENCE CONSTANTS
// ============================================================

/// Structural completeness without a pivot or with fewer than two segments
pub const STRUCTURE_SPARSE: f64 = 0.35;
/// Pivot present and at least two segments
pub const STRUCTURE_PARTIAL: f64 = 0.55;
/// Pivot present and at least three segments
pub const STRUCTURE_COMPLETE: f64 = 0.75;

pub const AGREEMENT_IN_BAND: f64 = 0.5;
pub const AGREEMENT_ALIGNED: f64 = 0.65;
pub const AGREEMENT_OPPOSED: f64 = 0.35;

pub const DIVERGENCE_PENALTY: f64 = 0.2;
pub const CONFLICT_PENALTY: f64 = 0.15;

/// Half-saturation point of the momentum compression `m / (m + k)`
pub const MOMENTUM_SOFTENING: f64 = 5.0;

/// Confidence reported when only price position is known
const POSITION_ONLY_CONFIDENCE: f64 = 0.6;
const NEUTRAL_CONFIDENCE: f64 = 0.5;

// ============================================================
// TYPES
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendClass {
    BreakoutUp,
    BreakoutDown,
    Oscillation,
    UpDivergencePending,
    DownDivergencePending,
    UpDivergenceConfirmed,
    DownDivergenceConfirmed,
}

impl TrendClass {
    pub fn as_str(self) -> &'static str {
        match self {
            TrendClass::BreakoutUp => "pivot breakout upward in progress",
            TrendClass::BreakoutDown => "pivot breakout downward in progress",
            TrendClass::Oscillation => "pivot oscillation, unbroken",
            TrendClass::UpDivergencePending => "upward divergence pending",
            TrendClass::DownDivergencePending => "downward divergence pending",
            TrendClass::UpDivergenceConfirmed => "upward divergence confirmed",
            TrendClass::DownDivergenceConfirmed => "downward divergence confirmed",
        }
    }

    #[inline]
    pub fn is_divergence(self) -> bool {
        matches!(
            self,
            TrendClass::UpDivergencePending
                | TrendClass::DownDivergencePending
                | TrendClass::UpDivergenceConfirmed
                | TrendClass::DownDivergenceConfirmed
        )
    }

    fn confirmed(direction: Direction) -> Self {
        match direction {
            Direction::Up => TrendClass::UpDivergenceConfirmed,
            Direction::Down => TrendClass::DownDivergenceConfirmed,
        }
    }

    fn pending(direction: Direction) -> Self {
        match direction {
            Direction::Up => TrendClass::UpDivergencePending,
            Direction::Down => TrendClass::DownDivergencePending,
        }
    }
}

impl fmt::Display for TrendClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrendState {
    pub class: TrendClass,
    /// Reasons behind the class, in the order they were established
    pub evidence: Vec<String>,
    /// Last segment momentum compressed into `[0, 1)`
    pub momentum: f64,
    pub risk: f64,
    pub confidence: f64,
    pub last_segment_index: Option<usize>,
    pub last_pivot_index: Option<usize>,
}

impl TrendState {
    /// State reported when there is nothing to analyze
    pub fn neutral() -> Self {
        Self {
            class: TrendClass::Oscillation,
            evidence: vec!["insufficient data, neutral default".to_string()],
            momentum: 0.0,
            risk: 1.0 - NEUTRAL_CONFIDENCE,
            confidence: NEUTRAL_CONFIDENCE,
            last_segment_index: None,
            last_pivot_index: None,
        }
    }

    /// Copy with `momentum`, `risk` and `confidence` rounded to 4 decimals
    pub fn rounded(&self) -> Self {
        let round4 = |v: f64| (v * 10_000.0).round() / 10_000.0;
        Self {
            momentum: round4(self.momentum),
            risk: round4(self.risk),
            confidence: round4(self.confidence),
            ..self.clone()
        }
    }
}

/// Where the current price sits against the latest pivot band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Inside,
    Above,
    Below,
    /// No pivot, no bars or a non-comparable price
    Unknown,
}

impl Position {
    fn locate(bars: &[EquivalentBar], pivot: Option<&Pivot>) -> Self {
        let (Some(pivot), Some(last)) = (pivot, bars.last()) else {
            return Position::Unknown;
        };
        let price = last.midpoint();
        let band = pivot.band;
        if band.contains(price) {
            Position::Inside
        } else if price >= band.upper {
            Position::Above
        } else if price <= band.lower {
            Position::Below
        } else {
            Position::Unknown
        }
    }
}

// ============================================================
// SCORING
// ============================================================

fn structural_completeness(has_pivot: bool, segments: usize) -> f64 {
    match (has_pivot, segments) {
        (true, n) if n >= 3 => STRUCTURE_COMPLETE,
        (true, 2) => STRUCTURE_PARTIAL,
        _ => STRUCTURE_SPARSE,
    }
}

fn confidence(
    has_pivot: bool,
    segments: usize,
    position: Position,
    aligned: bool,
    divergence: bool,
    conflict: bool,
) -> f64 {
    let agreement = match (position, aligned) {
        (Position::Inside, _) => AGREEMENT_IN_BAND,
        (_, true) => AGREEMENT_ALIGNED,
        (_, false) => AGREEMENT_OPPOSED,
    };

    let mut penalty = 0.0;
    if divergence {
        penalty += DIVERGENCE_PENALTY;
    }
    if conflict {
        penalty += CONFLICT_PENALTY;
    }

    (structural_completeness(has_pivot, segments) + agreement - penalty).clamp(0.0, 1.0)
}

/// `m / (m + 5)`, zero for non-positive momentum
pub fn compress_momentum(momentum: f64) -> f64 {
    if momentum > 0.0 {
        momentum / (momentum + MOMENTUM_SOFTENING)
    } else {
        0.0
    }
}

// ============================================================
// CLASSIFIER
// ============================================================

/// Classify the current trend state.
pub fn classify(bars: &[EquivalentBar], segments: &[Segment], pivots: &[Pivot]) -> TrendState {
    let last_pivot_index = pivots.len().checked_sub(1);
    let position = Position::locate(bars, pivots.last());

    let Some(last) = segments.last() else {
        let (class, evidence, confidence) = match position {
            Position::Above => (TrendClass::BreakoutUp, "price above pivot upper edge", POSITION_ONLY_CONFIDENCE),
            Position::Below => (TrendClass::BreakoutDown, "price below pivot lower edge", POSITION_ONLY_CONFIDENCE),
            _ => (
                TrendClass::Oscillation,
                "price inside pivot band or no valid segment",
                NEUTRAL_CONFIDENCE,
            ),
        };
        debug!(%class, "trend classified without segments");
        return TrendState {
            class,
            evidence: vec![evidence.to_string()],
            momentum: 0.0,
            risk: 0.5,
            confidence,
            last_segment_index: None,
            last_pivot_index,
        };
    };

    let k = segments.len() - 1;
    let penultimate_diverged = k > 0 && diverges_at(bars, segments, k - 1);
    let confirmed = penultimate_diverged && segments[k - 1].direction != last.direction;

    let mut evidence: Vec<String> = Vec::new();
    let mut conflict = false;

    let class = if confirmed {
        evidence.push("previous segment diverged and an opposite segment followed (confirmed)".into());
        TrendClass::confirmed(segments[k - 1].direction)
    } else if diverges_at(bars, segments, k) {
        evidence.push("last segment set a new extreme with weaker momentum (pending confirmation)".into());
        TrendClass::pending(last.direction)
    } else {
        match (position, last.direction) {
            (Position::Above, Direction::Up) => {
                evidence.push("price above pivot upper edge".into());
                evidence.push("last segment points up".into());
                TrendClass::BreakoutUp
            },
            (Position::Below, Direction::Down) => {
                evidence.push("price below pivot lower edge".into());
                evidence.push("last segment points down".into());
                TrendClass::BreakoutDown
            },
            (Position::Above, _) => {
                evidence.push("price above upper edge but last segment not up (conflict)".into());
                conflict = true;
                TrendClass::Oscillation
            },
            (Position::Below, _) => {
                evidence.push("price below lower edge but last segment not down (conflict)".into());
                conflict = true;
                TrendClass::Oscillation
            },
            _ => {
                evidence.push("structure incomplete or still inside pivot band".into());
                TrendClass::Oscillation
            },
        }
    };

    let aligned = matches!(class, TrendClass::BreakoutUp | TrendClass::BreakoutDown);
    let confidence = confidence(
        last_pivot_index.is_some(),
        segments.len(),
        position,
        aligned,
        class.is_divergence(),
        conflict,
    );

    debug!(%class, confidence, segments = segments.len(), "trend classified");

    TrendState {
        class,
        evidence,
        momentum: compress_momentum(last.momentum(bars)),
        risk: (1.0 - confidence).clamp(0.0, 1.0),
        confidence,
        last_segment_index: Some(k),
        last_pivot_index,
    }
}
