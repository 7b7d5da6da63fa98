//! # chanlun - structural price-action analysis
//!
//! Turns a daily OHLCV series into a layered structural reading of price
//! action and a scored, explainable recommendation for the last bar.
//!
//! The pipeline is strictly sequential and recomputed from scratch on every
//! call:
//!
//! 1. validate the series ([`series`])
//! 2. merge nested/engulfing bars ([`structure::bars`])
//! 3. detect turning points ([`structure::fractal`])
//! 4. build strokes ([`structure::stroke`])
//! 5. build segments ([`structure::segment`])
//! 6. build pivots ([`structure::pivot`])
//! 7. classify the trend state ([`trend`])
//! 8. score a recommendation ([`recommend`])
//!
//! ## Quick Start
//!
//! ```rust
//! use chanlun::prelude::*;
//!
//! let analyzer = AnalyzerBuilder::new()
//!     .mode(Mode::Precision)
//!     .build()
//!     .unwrap();
//!
//! let raw = RawSeries::new(
//!     vec!["Date", "Open", "High", "Low", "Close", "Volume"],
//!     vec![vec!["2024-01-02", "10.0", "10.5", "9.8", "10.2", "1200"]],
//! );
//! let result = analyzer.analyze_raw("600000", &raw).unwrap();
//! assert_eq!(result.recommendation.action, Action::Avoid);
//! ```

pub mod params;
pub mod recommend;
pub mod report;
pub mod series;
pub mod structure;
pub mod trend;

pub mod prelude {
    pub use crate::{
        // Batch
        analyze_parallel,
        // Configuration
        params::{parse_cutoff, AnalysisConfig, Mode},
        // Recommendation
        recommend::{Action, Components, Invalidation, Recommendation},
        // Output
        report::{AnalysisResult, Meta},
        // Input
        series::{PriceBar, RawSeries},
        // Structure
        structure::{
            bars::EquivalentBar,
            fractal::TurningPoint,
            pivot::{BandMove, Pivot, PriceBand},
            segment::Segment,
            stroke::Stroke,
        },
        // Trend
        trend::{TrendClass, TrendState},
        ActionBuckets,
        Analysis,
        // Errors
        AnalysisError,
        // Engine
        Analyzer,
        AnalyzerBuilder,
        Direction,
        OHLCVExt,
        Result,
        TurnKind,
        OHLCV,
        RULES_VERSION,
    };
}

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use params::{AnalysisConfig, Mode};
use recommend::{Action, Recommendation};
use report::AnalysisResult;
use series::{PriceBar, RawSeries};
use structure::{
    bars::EquivalentBar, fractal::TurningPoint, pivot::Pivot, segment::Segment, stroke::Stroke,
};
use trend::TrendState;

/// Version tag of the structural rules implemented by this crate.
pub const RULES_VERSION: &str = "v1.2.0";

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors raised while validating input or configuration.
///
/// The structure stages themselves never fail; every degenerate input has a
/// defined empty or neutral outcome.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("missing required columns: {missing:?}")]
    Schema { missing: Vec<String> },

    #[error("dates not strictly ascending at row {position}: {current} follows {previous}")]
    Order {
        position: usize,
        previous: NaiveDate,
        current: NaiveDate,
    },

    #[error("duplicate dates: {dates:?}")]
    Duplicate { dates: Vec<NaiveDate> },

    #[error("inconsistent OHLC at rows (0-based): {rows:?}")]
    Consistency { rows: Vec<usize> },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("read failed: {0}")]
    Io(String),
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    /// `(high + low) / 2`, the position proxy used by the trend and scoring stages
    #[inline]
    fn midpoint(&self) -> f64 {
        (self.high() + self.low()) / 2.0
    }

    /// `High >= max(Open, Close)`, `Low <= min(Open, Close)` and `High >= Low`
    fn is_consistent(&self) -> bool {
        let body_top = self.open().max(self.close());
        let body_bottom = self.open().min(self.close());
        self.high() >= body_top && self.low() <= body_bottom && self.high() >= self.low()
    }
}

impl<T: OHLCV> OHLCVExt for T {}

// ============================================================
// SHARED TYPES
// ============================================================

/// Direction of a stroke or segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// Kind of a turning point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnKind {
    Top,
    Bottom,
}

/// Every stage output of one pipeline run.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub reduced: Vec<EquivalentBar>,
    /// Raw detector candidates, before compression and normalization
    pub turning_points: Vec<TurningPoint>,
    pub strokes: Vec<Stroke>,
    pub segments: Vec<Segment>,
    pub pivots: Vec<Pivot>,
    pub trend: TrendState,
    pub recommendation: Recommendation,
}

// ============================================================
// ANALYZER
// ============================================================

/// Runs the full pipeline for one instrument at a time.
///
/// The analyzer holds nothing but its configuration, so one instance can be
/// shared across threads for batch work.
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: AnalysisConfig,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    // ===========================================
    // LOW-LEVEL: pure pipeline
    // ===========================================

    /// Run every structure stage over bars that already satisfy the input
    /// contract. Never fails; an empty slice yields empty collections and a
    /// neutral trend.
    pub fn run<T: OHLCV>(&self, bars: &[T]) -> Analysis {
        use structure::{fractal, pivot, segment, stroke};

        let reduced = structure::bars::reduce(bars);
        let turning_points = fractal::detect_candidates(&reduced);
        let points = stroke::normalize(&reduced, &turning_points);
        let strokes = stroke::build_strokes(&reduced, &points);
        let segments = segment::build_segments(&reduced, &strokes);
        let pivots = pivot::build_pivots(&reduced, &strokes, &self.config);
        let trend = trend::classify(&reduced, &segments, &pivots);
        let recommendation = recommend::recommend(&reduced, &segments, &pivots, &trend);

        debug!(
            bars = bars.len(),
            reduced = reduced.len(),
            turning_points = turning_points.len(),
            strokes = strokes.len(),
            segments = segments.len(),
            pivots = pivots.len(),
            trend = %trend.class,
            action = ?recommendation.action,
            "pipeline finished"
        );

        Analysis {
            reduced,
            turning_points,
            strokes,
            segments,
            pivots,
            trend,
            recommendation,
        }
    }

    // ===========================================
    // HIGH-LEVEL: validated input to output contract
    // ===========================================

    /// Validate typed bars, apply the configured cutoff and analyze.
    pub fn analyze_bars(&self, symbol: &str, bars: &[PriceBar]) -> Result<AnalysisResult> {
        let clean = series::validate_bars(bars.to_vec())?;
        Ok(self.analyze_clean(symbol, clean))
    }

    /// Validate untyped rows, apply the configured cutoff and analyze.
    pub fn analyze_raw(&self, symbol: &str, raw: &RawSeries) -> Result<AnalysisResult> {
        let clean = series::validate(raw)?;
        Ok(self.analyze_clean(symbol, clean))
    }

    fn analyze_clean(&self, symbol: &str, bars: Vec<PriceBar>) -> AnalysisResult {
        let bars = series::apply_cutoff(bars, self.config.cutoff);
        let analysis = self.run(&bars);
        // the last reduced bar is dated by its leftmost source bar
        let last_date = analysis
            .reduced
            .last()
            .and_then(|eq| bars.get(eq.source_start))
            .map(|b| b.date);
        let Some(last_date) = last_date else {
            debug!(symbol, "no usable bars, emitting placeholder");
            return AnalysisResult::placeholder(symbol);
        };
        AnalysisResult::from_analysis(symbol, last_date, analysis)
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating Analyzer instances
///
/// A mode preset supplies defaults for the pivot flags; explicit flags set on
/// the builder win over the preset regardless of call order.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerBuilder {
    mode: Mode,
    confirm_leave: Option<bool>,
    reuse_tail_bi: Option<bool>,
    cutoff: Option<NaiveDate>,
}

impl AnalyzerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the precision/recall preset
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Require two consecutive non-overlapping strokes before a pivot closes
    pub fn confirm_leave(mut self, enable: bool) -> Self {
        self.confirm_leave = Some(enable);
        self
    }

    /// Let the next pivot search start at the previous pivot's closing stroke
    pub fn reuse_tail_bi(mut self, enable: bool) -> Self {
        self.reuse_tail_bi = Some(enable);
        self
    }

    /// Exclude bars dated after `cutoff` (retrospective analysis)
    pub fn cutoff(mut self, cutoff: NaiveDate) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    /// Build the analyzer
    pub fn build(self) -> Result<Analyzer> {
        let mut config = AnalysisConfig::resolve(self.mode, self.confirm_leave, self.reuse_tail_bi);
        config.cutoff = self.cutoff;
        Analyzer::new(config)
    }
}

// ============================================================
// PARALLEL ANALYSIS
// ============================================================

use rayon::prelude::*;

/// Analyze many instruments in parallel.
///
/// A validation failure on one instrument is replaced by the neutral
/// placeholder carrying the error message; it never aborts the batch. Results
/// come back in input order.
pub fn analyze_parallel<'a, I>(analyzer: &Analyzer, instruments: I) -> Vec<AnalysisResult>
where
    I: IntoParallelIterator<Item = (&'a str, &'a RawSeries)>,
{
    let results: Vec<AnalysisResult> = instruments
        .into_par_iter()
        .map(|(symbol, raw)| {
            analyzer.analyze_raw(symbol, raw).unwrap_or_else(|error| {
                warn!(symbol, %error, "instrument failed validation");
                AnalysisResult::failed(symbol, &error)
            })
        })
        .collect();

    let failed = results.iter().filter(|r| r.meta.error.is_some()).count();
    info!(instruments = results.len(), failed, "batch analysis finished");

    results
}

// ============================================================
// AGGREGATION
// ============================================================

/// Results bucketed by action, each bucket ordered by buy strength
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ActionBuckets {
    pub buckets: BTreeMap<Action, Vec<String>>,
    pub buy_strength: BTreeMap<String, f64>,
}

impl ActionBuckets {
    /// Every action gets a bucket, possibly empty. Within a bucket symbols are
    /// sorted by buy strength descending, ties by symbol ascending.
    pub fn from_results(results: &[AnalysisResult]) -> Self {
        let mut scored: BTreeMap<Action, Vec<(&str, f64)>> =
            Action::ALL.iter().map(|&a| (a, Vec::new())).collect();
        let mut buy_strength = BTreeMap::new();

        for result in results {
            let rec = &result.recommendation;
            scored
                .entry(rec.action)
                .or_default()
                .push((result.meta.symbol.as_str(), rec.buy_strength));
            buy_strength.insert(result.meta.symbol.clone(), rec.buy_strength);
        }

        let buckets = scored
            .into_iter()
            .map(|(action, mut entries)| {
                entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
                let symbols = entries.into_iter().map(|(s, _)| s.to_string()).collect();
                (action, symbols)
            })
            .collect();

        Self {
            buckets,
            buy_strength,
        }
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn bar(day: u32, high: f64, low: f64) -> PriceBar {
        let mid = (high + low) / 2.0;
        PriceBar::new(date(day), mid, high, low, mid, 1000.0)
    }

    /// Zig-zag with enough swings for strokes, a segment and a pivot
    fn make_zigzag() -> Vec<PriceBar> {
        let path = [
            (10.0, 9.0),
            (11.0, 10.0),
            (12.0, 11.0),
            (11.0, 10.0),
            (10.0, 9.0),
            (11.0, 10.0),
            (12.5, 11.5),
            (11.5, 10.5),
            (10.5, 9.5),
            (11.5, 10.5),
            (13.0, 12.0),
            (12.0, 11.0),
            (11.0, 10.0),
            (12.0, 11.0),
        ];
        path.iter()
            .enumerate()
            .map(|(i, &(h, l))| bar(i as u32 + 1, h, l))
            .collect()
    }

    #[test]
    fn test_builder_defaults_to_precision() {
        let analyzer = AnalyzerBuilder::new().build().unwrap();
        assert!(analyzer.config().confirm_leave);
        assert!(!analyzer.config().reuse_tail_bi);
    }

    #[test]
    fn test_builder_explicit_flags_override_preset() {
        let analyzer = AnalyzerBuilder::new()
            .confirm_leave(true)
            .mode(Mode::Recall)
            .build()
            .unwrap();
        assert!(analyzer.config().confirm_leave);
        assert!(analyzer.config().reuse_tail_bi);
    }

    #[test]
    fn test_empty_bars_yield_placeholder() {
        let analyzer = AnalyzerBuilder::new().build().unwrap();
        let result = analyzer.analyze_bars("EMPTY", &[]).unwrap();
        assert!(result.meta.last_bar_date.is_none());
        assert!(result.strokes.is_empty());
        assert_eq!(result.recommendation.action, Action::Avoid);
    }

    #[test]
    fn test_cutoff_excludes_later_bars() {
        let analyzer = AnalyzerBuilder::new().cutoff(date(5)).build().unwrap();
        let result = analyzer.analyze_bars("CUT", &make_zigzag()).unwrap();
        assert_eq!(result.meta.last_bar_date, Some(date(5)));
    }

    #[test]
    fn test_last_bar_date_follows_merged_bar() {
        let mut bars = make_zigzag();
        // an inside bar on the last day folds into the bar before it
        bars.push(bar(15, 11.8, 11.2));
        let analyzer = AnalyzerBuilder::new().build().unwrap();
        let result = analyzer.analyze_bars("MERGED", &bars).unwrap();

        assert_eq!(result.meta.last_bar_date, Some(date(14)));
        assert_eq!(result.recommendation.at_close_of, Some(date(14)));
    }

    #[test]
    fn test_run_produces_alternating_strokes() {
        let analyzer = AnalyzerBuilder::new().build().unwrap();
        let analysis = analyzer.run(&make_zigzag());
        assert!(analysis.strokes.len() >= 3);
        for pair in analysis.strokes.windows(2) {
            assert_ne!(pair[0].direction, pair[1].direction);
        }
    }

    #[test]
    fn test_run_on_empty_slice() {
        let analyzer = AnalyzerBuilder::new().build().unwrap();
        let bars: Vec<PriceBar> = vec![];
        let analysis = analyzer.run(&bars);
        assert!(analysis.reduced.is_empty());
        assert!(analysis.pivots.is_empty());
        assert_eq!(analysis.recommendation.action, Action::Avoid);
    }

    #[test]
    fn test_parallel_substitutes_placeholder_on_failure() {
        let analyzer = AnalyzerBuilder::new().build().unwrap();
        let good = RawSeries::new(
            vec!["Date", "Open", "High", "Low", "Close", "Volume"],
            vec![vec!["2024-03-01", "10", "11", "9", "10", "100"]],
        );
        let bad = RawSeries::new(vec!["Date", "High", "Low"], Vec::<Vec<&str>>::new());

        let instruments: Vec<(&str, &RawSeries)> = vec![("GOOD", &good), ("BAD", &bad)];
        let results = analyze_parallel(&analyzer, instruments);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].meta.symbol, "GOOD");
        assert!(results[0].meta.error.is_none());
        assert_eq!(results[1].meta.symbol, "BAD");
        assert!(results[1].meta.error.as_deref().unwrap().contains("missing"));
    }

    #[test]
    fn test_action_buckets_sorted_descending() {
        let mut a = AnalysisResult::placeholder("AAA");
        a.recommendation.buy_strength = 0.4;
        let mut b = AnalysisResult::placeholder("BBB");
        b.recommendation.buy_strength = 0.6;
        let mut c = AnalysisResult::placeholder("CCC");
        c.recommendation.action = Action::Watch;
        c.recommendation.buy_strength = 0.75;

        let buckets = ActionBuckets::from_results(&[a, b, c]);
        assert_eq!(buckets.buckets.len(), Action::ALL.len());
        assert_eq!(buckets.buckets[&Action::Avoid], vec!["BBB", "AAA"]);
        assert_eq!(buckets.buckets[&Action::Watch], vec!["CCC"]);
        assert!(buckets.buckets[&Action::Buy].is_empty());
        assert_eq!(buckets.buy_strength["CCC"], 0.75);
    }

    #[test]
    fn test_ohlcv_ext() {
        let b = PriceBar::new(date(1), 10.0, 11.0, 9.0, 10.5, 1.0);
        assert_eq!(b.range(), 2.0);
        assert_eq!(b.midpoint(), 10.0);
        assert!(b.is_consistent());

        let broken = PriceBar::new(date(1), 10.0, 10.2, 9.0, 10.5, 1.0);
        assert!(!broken.is_consistent());
    }
}
