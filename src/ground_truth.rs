// 📚 Ground-Truth Index - Commission-window-scoped biographical lookup
//
// The biographical table lists every commissioned judge with commission and
// termination dates. A run only ever consults the slice of that table whose
// service overlaps the run's commission window; this module builds that
// slice once and serves exact and fuzzy lookups over it.
//
// The fuzzy lookup surfaces ALL equally-best candidates above threshold.
// Collapsing a tie here would hide ambiguity from the matcher, which is the
// only component allowed to decide.

use crate::config::CommissionWindow;
use crate::ingest::GroundTruthRecord;
use crate::normalize::{self, NameKey};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Default Jaro-Winkler acceptance threshold for biographical matches.
pub const FUZZY_THRESHOLD: f64 = 0.95;

/// A ground-truth record paired with its precomputed name key.
#[derive(Debug, Clone)]
pub struct IndexedRecord {
    pub record: GroundTruthRecord,
    pub key: NameKey,
}

/// Read-only lookup index over the in-window ground-truth records.
pub struct GroundTruthIndex {
    records: Vec<IndexedRecord>,
    by_name: HashMap<String, Vec<usize>>,
}

impl GroundTruthIndex {
    /// Build the index for one run.
    ///
    /// A record is in scope unless it terminated before the window starts or
    /// was commissioned after the window ends. `active_cutoff` (tagging mode)
    /// additionally drops records terminated before the cutoff. Records whose
    /// names normalize to nothing are dropped.
    pub fn build(
        records: Vec<GroundTruthRecord>,
        window: Option<&CommissionWindow>,
        active_cutoff: Option<NaiveDate>,
    ) -> GroundTruthIndex {
        let mut indexed = Vec::new();
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();

        for record in records {
            if let Some(w) = window {
                if record.commission_date > w.end {
                    continue;
                }
                if let Some(term) = record.termination_date {
                    if term < w.start {
                        continue;
                    }
                }
            }
            if let Some(cutoff) = active_cutoff {
                if let Some(term) = record.termination_date {
                    if term < cutoff {
                        continue;
                    }
                }
            }
            let key = match normalize::normalize(&record.full_name) {
                Some(k) => k,
                None => continue,
            };
            by_name
                .entry(key.normalized.clone())
                .or_default()
                .push(indexed.len());
            indexed.push(IndexedRecord { record, key });
        }

        GroundTruthIndex {
            records: indexed,
            by_name,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All in-scope records, for pooling with the registry in the
    /// last-name-superstring rule.
    pub fn records(&self) -> &[IndexedRecord] {
        &self.records
    }

    /// Exact match on the fully normalized name.
    pub fn lookup_exact(&self, key: &NameKey) -> Vec<&IndexedRecord> {
        match self.by_name.get(&key.normalized) {
            Some(idxs) => idxs.iter().map(|&i| &self.records[i]).collect(),
            None => Vec::new(),
        }
    }

    /// Fuzzy match: every record scoring at least `threshold`, with the
    /// best-scoring tier returned in full. The caller sees ties.
    pub fn lookup_fuzzy(&self, key: &NameKey, threshold: f64) -> Vec<(&IndexedRecord, f64)> {
        let probe = key.unified_tokens.join(" ");
        let mut best = threshold;
        let mut hits: Vec<(&IndexedRecord, f64)> = Vec::new();

        for rec in &self.records {
            let target = rec.key.unified_tokens.join(" ");
            let score = strsim::jaro_winkler(&probe, &target);
            if score < threshold {
                continue;
            }
            if score > best {
                best = score;
                hits.retain(|(_, s)| *s >= best);
            }
            hits.push((rec, score));
        }

        // keep only the top tier
        hits.retain(|(_, s)| (*s - best).abs() < f64::EPSILON || *s >= best);
        hits
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

    fn record(name: &str, nid: &str, comm: NaiveDate, term: Option<NaiveDate>) -> GroundTruthRecord {
        GroundTruthRecord {
            full_name: name.to_string(),
            nid: nid.to_string(),
            commission_date: comm,
            termination_date: term,
            court: None,
        }
    }

    fn window(a: NaiveDate, b: NaiveDate) -> CommissionWindow {
        CommissionWindow::new(a, b).unwrap()
    }

    #[test]
    fn test_window_filter() {
        let records = vec![
            // terminated before the window: out
            record("Old Judge", "1", date(1950, 1, 1), Some(date(1980, 1, 1))),
            // commissioned after the window: out
            record("Future Judge", "2", date(2020, 1, 1), None),
            // serving through the window: in
            record("John Smith", "3", date(1995, 1, 1), Some(date(2015, 1, 1))),
            // still serving: in
            record("Jane Doe", "4", date(2000, 1, 1), None),
        ];
        let w = window(date(1990, 1, 1), date(2010, 12, 31));
        let index = GroundTruthIndex::build(records, Some(&w), None);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_active_cutoff() {
        let records = vec![
            record("John Smith", "3", date(1995, 1, 1), Some(date(2005, 1, 1))),
            record("Jane Doe", "4", date(2000, 1, 1), None),
        ];
        let index = GroundTruthIndex::build(records, None, Some(date(2010, 1, 1)));
        assert_eq!(index.len(), 1);
        assert_eq!(index.records()[0].record.nid, "4");
    }

    #[test]
    fn test_exact_lookup() {
        let records = vec![record("John Robert Smith", "3", date(1995, 1, 1), None)];
        let index = GroundTruthIndex::build(records, None, None);
        let key = normalize::normalize("Judge John Robert Smith").unwrap();
        let hits = index.lookup_exact(&key);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.nid, "3");
        let miss = normalize::normalize("Robert Jones").unwrap();
        assert!(index.lookup_exact(&miss).is_empty());
    }

    #[test]
    fn test_fuzzy_surfaces_ties() {
        let records = vec![
            record("Deborah Smith", "1", date(1995, 1, 1), None),
            record("Debra Smith", "2", date(1996, 1, 1), None),
        ];
        let index = GroundTruthIndex::build(records, None, None);
        // unified spelling makes both of these exact under fuzzy: a tie the
        // caller must see
        let key = normalize::normalize("Debora Smith").unwrap();
        let hits = index.lookup_fuzzy(&key, FUZZY_THRESHOLD);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_fuzzy_threshold() {
        let records = vec![record("John Smith", "1", date(1995, 1, 1), None)];
        let index = GroundTruthIndex::build(records, None, None);
        let near = normalize::normalize("Jon Smith").unwrap();
        assert!(!index.lookup_fuzzy(&near, FUZZY_THRESHOLD).is_empty());
        let far = normalize::normalize("Henrietta Willoughby").unwrap();
        assert!(index.lookup_fuzzy(&far, FUZZY_THRESHOLD).is_empty());
    }
}
