//! Analysis configuration
//!
//! Two flags steer pivot construction:
//! - `confirm_leave`: a pivot closes only after two consecutive
//!   non-overlapping strokes (one stray stroke is treated as a false exit)
//! - `reuse_tail_bi`: the next pivot search may start at the closing stroke of
//!   the previous pivot, so adjacent pivots can share a boundary stroke
//!
//! # Example
//!
//! ```rust
//! use chanlun::params::{AnalysisConfig, Mode};
//!
//! let recall = AnalysisConfig::from_mode("recall".parse::<Mode>().unwrap());
//! assert!(!recall.confirm_leave);
//! assert!(recall.reuse_tail_bi);
//! ```

use std::{fmt, str::FromStr};

use chrono::NaiveDate;

use crate::{AnalysisError, Result};

// ============================================================
// MODE PRESETS
// ============================================================

/// Named preset for the pivot flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
  /// Resist false exits, avoid over-splitting: confirm_leave=true, reuse_tail_bi=false
  #[default]
  Precision,
  /// Exit on first non-overlap, allow adjacent pivots: confirm_leave=false, reuse_tail_bi=true
  Recall,
}

impl Mode {
  pub fn as_str(self) -> &'static str {
    match self {
      Mode::Precision => "precision",
      Mode::Recall => "recall",
    }
  }
}

impl fmt::Display for Mode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Mode {
  type Err = AnalysisError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "precision" => Ok(Mode::Precision),
      "recall" => Ok(Mode::Recall),
      other => Err(AnalysisError::InvalidConfig(format!(
        "unknown mode {other:?} (expected \"precision\" or \"recall\")"
      ))),
    }
  }
}

// ============================================================
// CONFIG
// ============================================================

/// Configuration threaded through one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AnalysisConfig {
  pub confirm_leave: bool,
  pub reuse_tail_bi: bool,
  /// Bars dated after the cutoff are dropped before analysis
  pub cutoff: Option<NaiveDate>,
}

impl Default for AnalysisConfig {
  fn default() -> Self {
    Self::from_mode(Mode::default())
  }
}

impl AnalysisConfig {
  pub const fn from_mode(mode: Mode) -> Self {
    let (confirm_leave, reuse_tail_bi) = match mode {
      Mode::Precision => (true, false),
      Mode::Recall => (false, true),
    };
    Self { confirm_leave, reuse_tail_bi, cutoff: None }
  }

  /// Apply a preset, then let explicitly supplied flags override it
  pub fn resolve(mode: Mode, confirm_leave: Option<bool>, reuse_tail_bi: Option<bool>) -> Self {
    let preset = Self::from_mode(mode);
    Self {
      confirm_leave: confirm_leave.unwrap_or(preset.confirm_leave),
      reuse_tail_bi: reuse_tail_bi.unwrap_or(preset.reuse_tail_bi),
      cutoff: None,
    }
  }

  /// Every flag combination is meaningful; only the cutoff can be out of range.
  pub fn validate(&self) -> Result<()> {
    if let Some(cutoff) = self.cutoff {
      if cutoff == NaiveDate::MIN || cutoff == NaiveDate::MAX {
        return Err(AnalysisError::InvalidConfig(format!("cutoff {cutoff} is not a calendar date")));
      }
    }
    Ok(())
  }
}

/// Parse a strict `YYYY-MM-DD` cutoff date
pub fn parse_cutoff(text: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|e| {
    AnalysisError::InvalidConfig(format!("invalid cutoff date {text:?} (expected YYYY-MM-DD): {e}"))
  })
}

// ============================================================
// TESTS
// ============================================================
