// ⚙️ Run Configuration - JSON config for a disambiguation run
//
// One JSON file per run names the mode, the commission-date window, the
// input batches, and the output directory. Validation is strict: a config
// that would corrupt the registry (bad window, missing inputs) fails before
// any read or write happens.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// MODE
// ============================================================================

/// The three pipeline modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Disambiguate a full corpus against an empty registry, minting freely
    Baseline,
    /// Resolve new cases against a frozen registry; never mints
    Tagging,
    /// Extend the registry with a disjoint commission window; may mint/relabel
    Update,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Baseline => "baseline",
            Mode::Tagging => "tagging",
            Mode::Update => "update",
        }
    }

    pub fn can_mint(&self) -> bool {
        !matches!(self, Mode::Tagging)
    }
}

// ============================================================================
// COMMISSION WINDOW
// ============================================================================

/// Inclusive commission-date window scoping the ground-truth index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CommissionWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            bail!("commission window end {} precedes start {}", end, start);
        }
        Ok(CommissionWindow { start, end })
    }

    /// Two windows overlap when neither ends before the other starts.
    pub fn overlaps(&self, other: &CommissionWindow) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

// ============================================================================
// RUN CONFIG
// ============================================================================

/// Full configuration for one pipeline run, loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Pipeline mode: baseline, tagging, or update
    pub mode: Mode,

    /// Commission-date window for ground-truth scoping. Required for
    /// baseline and update; tagging inherits the registry's coverage.
    pub commission_window: Option<CommissionWindow>,

    /// CSV of extracted mentions (docket entries + header fields)
    pub mentions_path: PathBuf,

    /// CSV of party/counsel names per case (negative filter)
    pub parties_path: PathBuf,

    /// CSV of the biographical ground-truth table
    pub ground_truth_path: PathBuf,

    /// Output directory; receives the registry db, JEL snapshot, and SEL tree
    pub output_dir: PathBuf,

    /// Tagging only: drop ground-truth records terminated before this date
    #[serde(default)]
    pub active_period_cutoff: Option<NaiveDate>,

    /// When a passage attribution ties or finds no candidate, fall back to
    /// the case-header assigned judge instead of leaving it blank
    #[serde(default)]
    pub fallback_to_header: bool,
}

impl RunConfig {
    /// Load and validate a run config. Validation failures are fatal
    /// configuration conflicts; nothing has been read or written yet.
    pub fn load(path: &Path) -> Result<RunConfig> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: RunConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if matches!(self.mode, Mode::Baseline | Mode::Update) && self.commission_window.is_none() {
            bail!("{} mode requires a commission_window", self.mode.as_str());
        }
        for (label, p) in [
            ("mentions", &self.mentions_path),
            ("parties", &self.parties_path),
            ("ground_truth", &self.ground_truth_path),
        ] {
            if !p.exists() {
                bail!("{} input does not exist: {}", label, p.display());
            }
        }
        Ok(())
    }

    pub fn registry_db_path(&self) -> PathBuf {
        self.output_dir.join("registry.db")
    }

    pub fn jel_snapshot_path(&self) -> PathBuf {
        self.output_dir.join("JEL.jsonl")
    }

    pub fn sel_dir(&self) -> PathBuf {
        self.output_dir.join("SEL")
    }

    pub fn sel_flat_path(&self) -> PathBuf {
        self.output_dir.join("SEL.jsonl")
    }

    pub fn passages_path(&self) -> PathBuf {
        self.output_dir.join("passages.jsonl")
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_overlap() {
        let a = CommissionWindow::new(date(1900, 1, 1), date(2000, 12, 31)).unwrap();
        let b = CommissionWindow::new(date(2001, 1, 1), date(2010, 12, 31)).unwrap();
        let c = CommissionWindow::new(date(1995, 1, 1), date(2005, 12, 31)).unwrap();
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
        // shared boundary day counts as overlap
        let d = CommissionWindow::new(date(2000, 12, 31), date(2001, 6, 1)).unwrap();
        assert!(a.overlaps(&d));
    }

    #[test]
    fn test_window_rejects_inverted_range() {
        assert!(CommissionWindow::new(date(2010, 1, 1), date(2000, 1, 1)).is_err());
    }

    #[test]
    fn test_mode_minting() {
        assert!(Mode::Baseline.can_mint());
        assert!(Mode::Update.can_mint());
        assert!(!Mode::Tagging.can_mint());
    }

    #[test]
    fn test_mode_serde_lowercase() {
        let m: Mode = serde_json::from_str("\"baseline\"").unwrap();
        assert_eq!(m, Mode::Baseline);
        assert_eq!(serde_json::to_string(&Mode::Update).unwrap(), "\"update\"");
    }
}
