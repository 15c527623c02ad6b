// 🔗 Mention Lookup Builder (SEL) - One resolution row per mention
//
// The SEL is the per-mention side of the output: for every mention the
// pipeline processed there is exactly one row saying what the mention was,
// what it normalized to, which rule decided it, and which entity (if any)
// it resolved to. Unresolved and excluded mentions get rows too; a missing
// row would be indistinguishable from ingestion loss.
//
// Rows land in a flat run-level JSONL and, partitioned by case, under
// SEL_DIR/<court>/<yy>/<ucid>.jsonl. Duplicate appends are suppressed
// upstream by idempotency key.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::ingest::{Mention, SourceKind};
use crate::matcher::MatchRule;
use crate::normalize::PrefixCategory;

// ============================================================================
// RESOLUTION ROW
// ============================================================================

/// One SEL row: the full record of how a single mention was handled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub ucid: String,
    pub court: String,
    pub year: u16,
    pub source: SourceKind,
    pub ordinal: u32,

    /// Raw extracted span
    pub extracted_text: String,

    /// Normalized form; None when cleaning left nothing
    pub normalized: Option<String>,

    /// Honorific bucket of the pretext window
    pub prefix_category: PrefixCategory,

    /// Transfer verbiage present near the mention
    pub is_transfer: bool,

    /// Canonical name of the resolved entity
    pub resolved_name: Option<String>,

    /// Permanent entity id; None for unresolved or excluded mentions
    pub sjid: Option<String>,

    /// Which matcher rule decided this row
    pub rule: MatchRule,

    /// Mention named a party/counsel and was excluded from candidacy
    pub excluded: bool,

    /// SHA-256 over the mention identity fields
    pub idempotency_key: String,
}

/// Idempotency key for one mention: stable across re-runs of the same
/// input, distinct across mentions.
pub fn idempotency_key(mention: &Mention) -> String {
    let mut hasher = Sha256::new();
    hasher.update(mention.ucid.as_bytes());
    hasher.update([0xff]);
    hasher.update(format!("{:?}", mention.source).as_bytes());
    hasher.update([0xff]);
    hasher.update(mention.ordinal.to_le_bytes());
    hasher.update([0xff]);
    hasher.update(mention.text.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// WRITER
// ============================================================================

/// Appends resolution rows to the flat run file and the per-case partition
/// tree. Partition files are opened lazily and kept open for the run.
pub struct SelWriter {
    flat: BufWriter<File>,
    sel_dir: PathBuf,
    partitions: HashMap<PathBuf, BufWriter<File>>,
    pub rows_written: usize,
}

impl SelWriter {
    pub fn create(flat_path: &Path, sel_dir: &Path) -> Result<SelWriter> {
        if let Some(parent) = flat_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output dir {}", parent.display()))?;
        }
        let flat = File::create(flat_path)
            .with_context(|| format!("Failed to create SEL file {}", flat_path.display()))?;
        Ok(SelWriter {
            flat: BufWriter::new(flat),
            sel_dir: sel_dir.to_path_buf(),
            partitions: HashMap::new(),
            rows_written: 0,
        })
    }

    /// Partition path for a case: SEL_DIR/<court>/<yy>/<ucid>.jsonl
    fn partition_path(&self, row: &Resolution) -> PathBuf {
        // case ids contain path separators; flatten them for the filename
        let safe_ucid = row.ucid.replace(['/', ';', ':'], "-");
        self.sel_dir
            .join(&row.court)
            .join(format!("{:02}", row.year % 100))
            .join(format!("{}.jsonl", safe_ucid))
    }

    pub fn append(&mut self, row: &Resolution) -> Result<()> {
        let line = serde_json::to_string(row).context("Failed to serialize resolution row")?;

        self.flat.write_all(line.as_bytes())?;
        self.flat.write_all(b"\n")?;

        let path = self.partition_path(row);
        if !self.partitions.contains_key(&path) {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create SEL partition dir {}", parent.display())
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open SEL partition {}", path.display()))?;
            self.partitions.insert(path.clone(), BufWriter::new(file));
        }
        let part = self
            .partitions
            .get_mut(&path)
            .context("SEL partition writer missing")?;
        part.write_all(line.as_bytes())?;
        part.write_all(b"\n")?;

        self.rows_written += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<usize> {
        self.flat.flush()?;
        for (_, mut writer) in self.partitions.drain() {
            writer.flush()?;
        }
        Ok(self.rows_written)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mention(ucid: &str, ordinal: u32, text: &str) -> Mention {
        Mention {
            ucid: ucid.to_string(),
            court: "ilnd".to_string(),
            year: 2016,
            source: SourceKind::DocketEntry,
            ordinal,
            text: text.to_string(),
            pretext: String::new(),
            extraction_method: "ner".to_string(),
        }
    }

    fn row(ucid: &str, ordinal: u32) -> Resolution {
        let m = mention(ucid, ordinal, "Judge Smith");
        Resolution {
            ucid: m.ucid.clone(),
            court: m.court.clone(),
            year: m.year,
            source: m.source,
            ordinal: m.ordinal,
            extracted_text: m.text.clone(),
            normalized: Some("smith".to_string()),
            prefix_category: PrefixCategory::NondescriptJudge,
            is_transfer: false,
            resolved_name: Some("john smith".to_string()),
            sjid: Some("SJ000000".to_string()),
            rule: MatchRule::RegistryExact,
            excluded: false,
            idempotency_key: idempotency_key(&m),
        }
    }

    #[test]
    fn test_idempotency_key_stability() {
        let a = idempotency_key(&mention("case-1", 3, "Judge Smith"));
        let b = idempotency_key(&mention("case-1", 3, "Judge Smith"));
        assert_eq!(a, b);
        // any identity field changing changes the key
        assert_ne!(a, idempotency_key(&mention("case-2", 3, "Judge Smith")));
        assert_ne!(a, idempotency_key(&mention("case-1", 4, "Judge Smith")));
        assert_ne!(a, idempotency_key(&mention("case-1", 3, "Judge Doe")));
    }

    #[test]
    fn test_writer_flat_and_partition() {
        let dir = TempDir::new().unwrap();
        let flat = dir.path().join("SEL.jsonl");
        let sel_dir = dir.path().join("SEL");

        let mut writer = SelWriter::create(&flat, &sel_dir).unwrap();
        writer.append(&row("ilnd;;1:16-cv-01234", 1)).unwrap();
        writer.append(&row("ilnd;;1:16-cv-01234", 2)).unwrap();
        writer.append(&row("ilnd;;1:16-cv-05678", 1)).unwrap();
        let written = writer.finish().unwrap();
        assert_eq!(written, 3);

        let flat_content = fs::read_to_string(&flat).unwrap();
        assert_eq!(flat_content.lines().count(), 3);

        let part = sel_dir
            .join("ilnd")
            .join("16")
            .join("ilnd--1-16-cv-01234.jsonl");
        let part_content = fs::read_to_string(&part).unwrap();
        assert_eq!(part_content.lines().count(), 2);

        // rows parse back
        let parsed: Resolution = serde_json::from_str(flat_content.lines().next().unwrap()).unwrap();
        assert_eq!(parsed.sjid.as_deref(), Some("SJ000000"));
    }
}
