//! Input contract: typed price bars, untyped rows and their validation
//!
//! Validation runs in a fixed order and stops at the first failing step:
//!
//! 1. required columns present ([`AnalysisError::Schema`])
//! 2. rows coerced to typed bars; rows that fail coercion are dropped
//! 3. dates ascending in the order given ([`AnalysisError::Order`])
//! 4. no repeated dates ([`AnalysisError::Duplicate`])
//! 5. OHLC consistency per row ([`AnalysisError::Consistency`])
//! 6. no-trade days (`Volume <= 0`) filtered out
//!
//! Nothing is ever re-sorted silently.

use std::{io, path::Path};

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::{AnalysisError, OHLCVExt, Result, OHLCV};

pub const REQUIRED_COLUMNS: [&str; 6] = ["Date", "Open", "High", "Low", "Close", "Volume"];
pub const OPTIONAL_COLUMNS: [&str; 2] = ["Amount", "TurnoverRate"];

/// Provider header spellings mapped onto canonical column names
const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("日期", "Date"),
    ("开盘", "Open"),
    ("最高", "High"),
    ("最低", "Low"),
    ("收盘", "Close"),
    ("成交量", "Volume"),
    ("成交额", "Amount"),
    ("换手率", "TurnoverRate"),
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

// ============================================================
// PRICE BAR
// ============================================================

/// One validated daily bar
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub amount: Option<f64>,
    pub turnover_rate: Option<f64>,
}

impl PriceBar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
            amount: None,
            turnover_rate: None,
        }
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_turnover_rate(mut self, rate: f64) -> Self {
        self.turnover_rate = Some(rate);
        self
    }
}

impl OHLCV for PriceBar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        self.date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
    }
}

// ============================================================
// RAW ROWS
// ============================================================

/// Untyped rows as delivered by a data provider
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSeries {
    headers: Vec<String>,
    records: Vec<Vec<String>>,
}

impl RawSeries {
    pub fn new<H, R, C>(
        headers: impl IntoIterator<Item = H>,
        records: impl IntoIterator<Item = R>,
    ) -> Self
    where
        H: Into<String>,
        R: IntoIterator<Item = C>,
        C: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            records: records
                .into_iter()
                .map(|r| r.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    /// Read CSV with a header row
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        let rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        Self::from_csv(rdr)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| AnalysisError::Io(format!("{}: {e}", path.display())))?;
        Self::from_csv(rdr)
    }

    fn from_csv<R: io::Read>(mut rdr: csv::Reader<R>) -> Result<Self> {
        let headers = rdr
            .headers()
            .map_err(|e| AnalysisError::Io(e.to_string()))?
            .iter()
            .map(String::from)
            .collect();

        let mut records = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(|e| AnalysisError::Io(e.to_string()))?;
            records.push(record.iter().map(String::from).collect());
        }

        Ok(Self { headers, records })
    }

    #[inline]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================
// COLUMN RESOLUTION & COERCION
// ============================================================

fn canonical_name(header: &str) -> &str {
    let header = header.trim();
    if let Some((_, canonical)) = COLUMN_ALIASES.iter().find(|(alias, _)| *alias == header) {
        return *canonical;
    }
    REQUIRED_COLUMNS
        .iter()
        .chain(OPTIONAL_COLUMNS.iter())
        .find(|c| c.eq_ignore_ascii_case(header))
        .copied()
        .unwrap_or(header)
}

/// Positions of the known columns within a record
#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
    amount: Option<usize>,
    turnover_rate: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &[String]) -> Result<Self> {
        let names: Vec<&str> = headers.iter().map(|h| canonical_name(h)).collect();
        let position = |column: &str| names.iter().position(|n| *n == column);

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| position(c).is_none())
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(AnalysisError::Schema { missing });
        }

        let required = |column: &str| position(column).unwrap_or_default();
        Ok(Self {
            date: required("Date"),
            open: required("Open"),
            high: required("High"),
            low: required("Low"),
            close: required("Close"),
            volume: required("Volume"),
            amount: position("Amount"),
            turnover_rate: position("TurnoverRate"),
        })
    }

    fn coerce(&self, record: &[String]) -> Option<PriceBar> {
        let number = |pos: usize| parse_number(record.get(pos)?);
        Some(PriceBar {
            date: parse_date(record.get(self.date)?)?,
            open: number(self.open)?,
            high: number(self.high)?,
            low: number(self.low)?,
            close: number(self.close)?,
            volume: number(self.volume)?,
            amount: self.amount.and_then(number),
            turnover_rate: self.turnover_rate.and_then(number),
        })
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    // Timestamps such as "2024-03-01 00:00:00" keep only the date part
    let text = text.split_whitespace().next().unwrap_or(text);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

// ============================================================
// VALIDATION
// ============================================================

/// Validate untyped rows into a clean bar sequence.
pub fn validate(raw: &RawSeries) -> Result<Vec<PriceBar>> {
    let columns = ColumnMap::resolve(&raw.headers)?;

    let bars: Vec<PriceBar> = raw
        .records
        .iter()
        .filter_map(|record| columns.coerce(record))
        .collect();

    let dropped = raw.records.len() - bars.len();
    if dropped > 0 {
        debug!(dropped, "rows dropped during type coercion");
    }

    validate_bars(bars)
}

/// Validate already-typed bars (steps 3 to 6).
pub fn validate_bars(bars: Vec<PriceBar>) -> Result<Vec<PriceBar>> {
    check_order(&bars)?;
    check_duplicates(&bars)?;
    check_consistency(&bars)?;
    Ok(drop_no_trade_days(bars))
}

fn check_order(bars: &[PriceBar]) -> Result<()> {
    match bars
        .windows(2)
        .position(|pair| pair[1].date < pair[0].date)
    {
        Some(i) => Err(AnalysisError::Order {
            position: i + 1,
            previous: bars[i].date,
            current: bars[i + 1].date,
        }),
        None => Ok(()),
    }
}

/// Expects ascending input, so repeats are adjacent.
fn check_duplicates(bars: &[PriceBar]) -> Result<()> {
    let mut dates: Vec<NaiveDate> = bars
        .windows(2)
        .filter(|pair| pair[1].date == pair[0].date)
        .map(|pair| pair[1].date)
        .collect();
    dates.dedup();

    if dates.is_empty() {
        Ok(())
    } else {
        Err(AnalysisError::Duplicate { dates })
    }
}

fn check_consistency(bars: &[PriceBar]) -> Result<()> {
    let rows: Vec<usize> = bars
        .iter()
        .enumerate()
        .filter(|(_, bar)| !bar.is_consistent())
        .map(|(i, _)| i)
        .collect();

    if rows.is_empty() {
        Ok(())
    } else {
        Err(AnalysisError::Consistency { rows })
    }
}

fn drop_no_trade_days(mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    let before = bars.len();
    bars.retain(|bar| bar.volume > 0.0);
    let filtered = before - bars.len();
    if filtered > 0 {
        warn!(filtered, "no-trade days removed");
    }
    bars
}

/// Drop bars dated after `cutoff`.
pub fn apply_cutoff(mut bars: Vec<PriceBar>, cutoff: Option<NaiveDate>) -> Vec<PriceBar> {
    if let Some(cutoff) = cutoff {
        bars.retain(|bar| bar.date <= cutoff);
    }
    bars
}

// ============================================================
// TESTS
// ============================================================
