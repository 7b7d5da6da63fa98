//! Output contract
//!
//! [`AnalysisResult`] is what the serving and aggregation side consumes. Every
//! list field is always present (possibly empty) and every scalar has a
//! neutral value, so a placeholder result round-trips through any consumer.

use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    recommend::Recommendation,
    structure::{fractal::TurningPoint, pivot::Pivot, segment::Segment, stroke::Stroke},
    trend::TrendState,
    Analysis, AnalysisError, RULES_VERSION,
};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Meta {
    pub symbol: String,
    pub computed_at: DateTime<Utc>,
    /// Date of the last bar analyzed, after the cutoff
    pub last_bar_date: Option<NaiveDate>,
    /// Validation failure that replaced this result with a placeholder
    pub error: Option<String>,
}

impl Meta {
    fn now(symbol: &str, last_bar_date: Option<NaiveDate>) -> Self {
        Self {
            symbol: symbol.to_string(),
            computed_at: Utc::now(),
            last_bar_date,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnalysisResult {
    pub meta: Meta,
    pub rules_version: String,
    /// Raw detector candidates, before compression
    pub turning_points: Vec<TurningPoint>,
    pub strokes: Vec<Stroke>,
    pub segments: Vec<Segment>,
    pub pivots: Vec<Pivot>,
    pub trend: TrendState,
    pub recommendation: Recommendation,
}

impl AnalysisResult {
    /// `last_bar_date` is the date of the last reduced bar's leftmost source
    /// bar. Trend scalars are rounded to 4 decimals.
    pub fn from_analysis(symbol: &str, last_bar_date: NaiveDate, analysis: Analysis) -> Self {
        let mut recommendation = analysis.recommendation;
        recommendation.at_close_of = Some(last_bar_date);
        Self {
            meta: Meta::now(symbol, Some(last_bar_date)),
            rules_version: RULES_VERSION.to_string(),
            turning_points: analysis.turning_points,
            strokes: analysis.strokes,
            segments: analysis.segments,
            pivots: analysis.pivots,
            trend: analysis.trend.rounded(),
            recommendation,
        }
    }

    /// Neutral result for a series with no usable bars
    pub fn placeholder(symbol: &str) -> Self {
        Self {
            meta: Meta::now(symbol, None),
            rules_version: RULES_VERSION.to_string(),
            turning_points: Vec::new(),
            strokes: Vec::new(),
            segments: Vec::new(),
            pivots: Vec::new(),
            trend: TrendState::neutral(),
            recommendation: Recommendation::neutral(),
        }
    }

    /// Placeholder annotated with the error that prevented analysis
    pub fn failed(symbol: &str, error: &AnalysisError) -> Self {
        let mut result = Self::placeholder(symbol);
        result.meta.error = Some(error.to_string());
        result
    }

    #[inline]
    pub fn is_placeholder(&self) -> bool {
        self.meta.last_bar_date.is_none()
    }
}
