// 📥 Ingestion - CSV loaders for mention, party, and ground-truth batches
//
// All tabular input enters here. Each loader binds CSV headers to a row
// struct via serde, skips and counts malformed rows (a bad row never kills
// a batch), and returns the parsed records plus ingest stats.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// SOURCE KIND
// ============================================================================

/// Where in a case a mention was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Free text of a numbered docket entry
    DocketEntry,
    /// Case-header assigned-judge field
    AssignedJudge,
    /// Case-header referred-judge field
    ReferredJudge,
}

impl SourceKind {
    pub fn is_header(&self) -> bool {
        !matches!(self, SourceKind::DocketEntry)
    }
}

// ============================================================================
// MENTION
// ============================================================================

/// One extracted judicial-name mention. Immutable after ingestion; the
/// pipeline consumes each mention exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    /// Unique case id ("ilnd;;1:16-cv-01234")
    #[serde(rename = "ucid")]
    pub ucid: String,

    /// Court abbreviation ("ilnd")
    #[serde(rename = "court")]
    pub court: String,

    /// Case filing year
    #[serde(rename = "year")]
    pub year: u16,

    /// Extraction source within the case
    #[serde(rename = "docket_source")]
    pub source: SourceKind,

    /// Docket entry index, or ordinal within the header field
    #[serde(rename = "docket_index")]
    pub ordinal: u32,

    /// Raw extracted span text
    #[serde(rename = "extracted_entity")]
    pub text: String,

    /// Text window immediately preceding the span
    #[serde(rename = "original_text", default)]
    pub pretext: String,

    /// Which extraction pass produced the span (ner, regex, header)
    #[serde(rename = "entity_extraction_method", default)]
    pub extraction_method: String,
}

// ============================================================================
// PARTY / COUNSEL
// ============================================================================

/// A party or counsel name attached to a case header. Used purely as a
/// negative filter: a mention matching one of these is not a judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyRecord {
    #[serde(rename = "ucid")]
    pub ucid: String,

    #[serde(rename = "name")]
    pub name: String,

    /// "party" or "counsel"
    #[serde(rename = "role", default)]
    pub role: String,
}

// ============================================================================
// GROUND TRUTH
// ============================================================================

/// One biographical ground-truth record (commissioned judge).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthRecord {
    /// Canonical full name as commissioned
    pub full_name: String,

    /// External biographical id
    pub nid: String,

    /// Earliest commission date
    pub commission_date: NaiveDate,

    /// Latest termination date; None while still serving
    pub termination_date: Option<NaiveDate>,

    /// Court abbreviation of the seat, when known
    pub court: Option<String>,
}

// Raw CSV shape before date parsing
#[derive(Debug, Deserialize)]
struct GroundTruthRow {
    #[serde(rename = "FullName")]
    full_name: String,
    #[serde(rename = "NID")]
    nid: String,
    #[serde(rename = "Commission Date")]
    commission_date: String,
    #[serde(rename = "Termination Date", default)]
    termination_date: String,
    #[serde(rename = "Court", default)]
    court: String,
}

// ============================================================================
// STATS
// ============================================================================

/// Per-batch ingest accounting: loaded vs skipped rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub loaded: usize,
    pub skipped: usize,
}

// ============================================================================
// LOADERS
// ============================================================================

/// Load a mention batch. Malformed rows are skipped and counted.
pub fn load_mentions(path: &Path) -> Result<(Vec<Mention>, IngestStats)> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open mention batch {}", path.display()))?;

    let mut mentions = Vec::new();
    let mut stats = IngestStats::default();
    for result in reader.deserialize::<Mention>() {
        match result {
            Ok(m) if !m.text.trim().is_empty() && !m.ucid.trim().is_empty() => {
                mentions.push(m);
                stats.loaded += 1;
            }
            _ => stats.skipped += 1,
        }
    }
    Ok((mentions, stats))
}

/// Load the party/counsel negative-filter batch.
pub fn load_parties(path: &Path) -> Result<(Vec<PartyRecord>, IngestStats)> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open party batch {}", path.display()))?;

    let mut parties = Vec::new();
    let mut stats = IngestStats::default();
    for result in reader.deserialize::<PartyRecord>() {
        match result {
            Ok(p) if !p.name.trim().is_empty() => {
                parties.push(p);
                stats.loaded += 1;
            }
            _ => stats.skipped += 1,
        }
    }
    Ok((parties, stats))
}

/// Load the biographical ground-truth table. Rows with an unparseable
/// commission date are skipped; a missing termination date means the judge
/// is still serving.
pub fn load_ground_truth(path: &Path) -> Result<(Vec<GroundTruthRecord>, IngestStats)> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open ground-truth table {}", path.display()))?;

    let mut records = Vec::new();
    let mut stats = IngestStats::default();
    for result in reader.deserialize::<GroundTruthRow>() {
        let row = match result {
            Ok(r) => r,
            Err(_) => {
                stats.skipped += 1;
                continue;
            }
        };
        let commission = match parse_date(&row.commission_date) {
            Some(d) => d,
            None => {
                stats.skipped += 1;
                continue;
            }
        };
        records.push(GroundTruthRecord {
            full_name: row.full_name,
            nid: row.nid,
            commission_date: commission,
            termination_date: parse_date(&row.termination_date),
            court: if row.court.trim().is_empty() {
                None
            } else {
                Some(row.court.trim().to_lowercase())
            },
        });
        stats.loaded += 1;
    }
    Ok((records, stats))
}

// Ground-truth exports carry ISO or US-style dates depending on vintage
fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .ok()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_load_mentions_skips_malformed() {
        let f = csv_file(
            "ucid,court,year,docket_source,docket_index,extracted_entity,original_text,entity_extraction_method\n\
             ilnd;;1:16-cv-01234,ilnd,2016,docket_entry,3,Judge Smith,before Judge,ner\n\
             ilnd;;1:16-cv-01234,ilnd,2016,docket_entry,4,,before Judge,ner\n\
             ,ilnd,2016,assigned_judge,0,John Smith,,header\n\
             ilnd;;1:16-cv-05678,ilnd,2016,assigned_judge,0,John Smith,,header\n",
        );
        let (mentions, stats) = load_mentions(f.path()).unwrap();
        assert_eq!(mentions.len(), 2);
        assert_eq!(stats.loaded, 2);
        assert_eq!(stats.skipped, 2);
        assert_eq!(mentions[0].source, SourceKind::DocketEntry);
        assert!(mentions[1].source.is_header());
    }

    #[test]
    fn test_load_ground_truth_dates() {
        let f = csv_file(
            "FullName,NID,Commission Date,Termination Date,Court\n\
             John Robert Smith,1001,1995-03-01,2010-06-30,ilnd\n\
             Jane Doe,1002,08/15/2012,,\n\
             Bad Row,1003,not-a-date,,\n",
        );
        let (records, stats) = load_ground_truth(f.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(
            records[0].termination_date,
            NaiveDate::from_ymd_opt(2010, 6, 30)
        );
        assert_eq!(records[1].termination_date, None);
        assert_eq!(records[1].commission_date, NaiveDate::from_ymd_opt(2012, 8, 15).unwrap());
        assert_eq!(records[0].court.as_deref(), Some("ilnd"));
    }

    #[test]
    fn test_load_parties() {
        let f = csv_file(
            "ucid,name,role\n\
             ilnd;;1:16-cv-01234,Acme Corp,party\n\
             ilnd;;1:16-cv-01234,Sarah Jones,counsel\n\
             ilnd;;1:16-cv-01234,,party\n",
        );
        let (parties, stats) = load_parties(f.path()).unwrap();
        assert_eq!(parties.len(), 2);
        assert_eq!(stats.skipped, 1);
    }
}
