// 🚂 Pipeline - Baseline / tagging / update mode controllers
//
// One entry point per run: load inputs, resolve every mention, commit the
// registry changes once, write the SEL and JEL outputs. The three modes
// share the whole middle of this file and differ only in what they are
// allowed to do to the registry:
//
//   baseline  starts from an empty registry and mints freely
//   tagging   freezes the registry; unmatched mentions stay unresolved
//   update    mints within a commission window disjoint from all prior runs
//
// Matching fans out per court with rayon; workers only propose decisions.
// Every registry mutation funnels through one deterministic merge pass and
// one transactional commit, so parallel order never leaks into the output.

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::{BufWriter, Write};

use crate::config::{Mode, RunConfig};
use crate::ground_truth::GroundTruthIndex;
use crate::ingest::{self, Mention, SourceKind};
use crate::matcher::{
    self, derive_label, MatchDecision, MatchRule, Matcher, PartyFilter, PoolTarget,
};
use crate::normalize::{self, NameKey, PrefixCategory};
use crate::registry::{self, EventKind, Registry, RegistryEvent, RegistryStore};
use crate::segmenter::{self, CaseEntry, Passage};
use crate::sel::{self, Resolution, SelWriter};

/// Label given to entities minted directly from a biographical match.
const CONFIRMED_LABEL: &str = "FJC_Judge";

// ============================================================================
// RUN REPORT
// ============================================================================

/// Operator-facing accounting for one run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub mentions_loaded: usize,
    pub mentions_skipped: usize,
    pub rows_written: usize,
    pub duplicates_suppressed: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub excluded: usize,
    pub minted: usize,
    pub registry_size: usize,
    pub passages: usize,
}

// ============================================================================
// PREPARED MENTIONS
// ============================================================================

// A mention after normalization, ready for matching
struct Prepared {
    mention: Mention,
    key: Option<NameKey>,
    prefix: PrefixCategory,
    is_transfer: bool,
    // passage attribution inherited from the segmenter, docket entries only
    attribution: Option<String>,
}

fn prepare(mention: Mention) -> Prepared {
    let key = normalize::normalize(&mention.text);
    let prefix = match mention.source {
        SourceKind::AssignedJudge => PrefixCategory::AssignedJudge,
        SourceKind::ReferredJudge => PrefixCategory::ReferredJudge,
        // attorney/party verbiage overrides any honorific in the window, so
        // counsel mentions never count as judge evidence
        SourceKind::DocketEntry if normalize::is_non_judicial_context(&mention.pretext) => {
            PrefixCategory::NoKeywords
        }
        SourceKind::DocketEntry => normalize::categorize_prefix(&mention.pretext),
    };
    let is_transfer = normalize::is_transfer_language(&mention.pretext)
        || normalize::is_transfer_language(&mention.text);
    Prepared {
        mention,
        key,
        prefix,
        is_transfer,
        attribution: None,
    }
}

// The passage attribution rescues an unmatched mention when the mention's
// tokens are strictly contained in the attributed name ("doe" in a passage
// attributed to "robert doe").
fn rescue_attribution(p: &Prepared) -> Option<String> {
    let key = p.key.as_ref()?;
    let attribution = p.attribution.as_ref()?;
    if attribution == &key.normalized {
        return None;
    }
    let attr_tokens: Vec<String> = attribution.split_whitespace().map(String::from).collect();
    if attr_tokens.len() > key.unified_tokens.len()
        && matcher::tokens_in_tokens(&key.unified_tokens, &attr_tokens)
    {
        Some(attribution.clone())
    } else {
        None
    }
}

// ============================================================================
// SEGMENTATION PASS
// ============================================================================

/// One attributed passage of one case, as written to the passage log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CasePassage {
    pub ucid: String,
    #[serde(flatten)]
    pub passage: Passage,
}

// Run the segmenter per case and stamp each docket mention with its
// passage attribution. Header mentions are atomic and never touched.
// Returns every passage so the attribution decisions can be logged.
fn attribute_passages(prepared: &mut [Prepared], fallback_to_header: bool) -> Vec<CasePassage> {
    // header fallback names per case
    let mut header_names: HashMap<String, String> = HashMap::new();
    if fallback_to_header {
        for p in prepared.iter() {
            if p.mention.source == SourceKind::AssignedJudge {
                if let Some(key) = &p.key {
                    header_names
                        .entry(p.mention.ucid.clone())
                        .or_insert_with(|| key.normalized.clone());
                }
            }
        }
    }

    // group docket mention indexes by case
    let mut by_case: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, p) in prepared.iter().enumerate() {
        if p.mention.source == SourceKind::DocketEntry {
            by_case.entry(p.mention.ucid.clone()).or_default().push(i);
        }
    }

    let mut all_passages = Vec::new();
    for (ucid, idxs) in by_case {
        // fold mentions into per-entry candidates, in docket order
        let mut entries: BTreeMap<u32, CaseEntry> = BTreeMap::new();
        for &i in &idxs {
            let p = &prepared[i];
            let entry = entries.entry(p.mention.ordinal).or_insert_with(|| CaseEntry {
                ordinal: p.mention.ordinal,
                is_transfer_marker: false,
                candidates: Vec::new(),
            });
            if p.is_transfer {
                entry.is_transfer_marker = true;
            }
            if let Some(key) = &p.key {
                entry.candidates.push(key.normalized.clone());
            }
        }
        let ordered: Vec<CaseEntry> = entries.into_values().collect();
        let fallback = header_names.get(&ucid).map(String::as_str);
        let passages = segmenter::segment(&ordered, fallback);

        // ordinal → attribution
        let mut attribution_of: HashMap<u32, String> = HashMap::new();
        for passage in &passages {
            if let Some(name) = &passage.attribution {
                for &ordinal in &passage.ordinals {
                    attribution_of.insert(ordinal, name.clone());
                }
            }
        }
        for &i in &idxs {
            let ordinal = prepared[i].mention.ordinal;
            prepared[i].attribution = attribution_of.get(&ordinal).cloned();
        }
        all_passages.extend(passages.into_iter().map(|passage| CasePassage {
            ucid: ucid.clone(),
            passage,
        }));
    }
    all_passages
}

// Log every passage as one JSON line so the attribution behind each
// passage_context resolution can be audited after the run.
fn write_passage_log(passages: &[CasePassage], config: &RunConfig) -> Result<()> {
    let path = config.passages_path();
    let file = fs::File::create(&path)
        .with_context(|| format!("Failed to create passage log {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for passage in passages {
        serde_json::to_writer(&mut out, passage)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

// ============================================================================
// RUN
// ============================================================================

/// Execute one full pipeline run per the config.
pub fn run(config: &RunConfig) -> Result<RunReport> {
    fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.output_dir.display()
        )
    })?;

    let mut store = RegistryStore::open(&config.registry_db_path())?;
    let mut registry = store.load()?;

    // configuration conflicts abort before any write
    match config.mode {
        Mode::Baseline => {
            if !registry.is_empty() {
                bail!(
                    "baseline run requires an empty registry; found {} entities",
                    registry.len()
                );
            }
        }
        Mode::Update => {
            let window = config
                .commission_window
                .as_ref()
                .context("update mode requires a commission window")?;
            store.check_window_disjoint(window)?;
        }
        Mode::Tagging => {}
    }

    // ---- ingest ----
    let (mentions, mention_stats) = ingest::load_mentions(&config.mentions_path)?;
    let (parties, _) = ingest::load_parties(&config.parties_path)?;
    let (gt_records, _) = ingest::load_ground_truth(&config.ground_truth_path)?;

    let ground_truth = GroundTruthIndex::build(
        gt_records,
        config.commission_window.as_ref(),
        config.active_period_cutoff,
    );

    let mut party_filter = PartyFilter::new();
    for p in &parties {
        if let Some(key) = normalize::normalize(&p.name) {
            party_filter.insert(&p.ucid, &key.normalized);
        }
    }

    // ---- normalize + segment ----
    let mut prepared: Vec<Prepared> = mentions.into_iter().map(prepare).collect();
    // resolution order must not depend on input order
    prepared.sort_by(|a, b| {
        (
            &a.mention.court,
            &a.mention.ucid,
            a.mention.source as u8,
            a.mention.ordinal,
            &a.mention.text,
        )
            .cmp(&(
                &b.mention.court,
                &b.mention.ucid,
                b.mention.source as u8,
                b.mention.ordinal,
                &b.mention.text,
            ))
    });
    let passages = attribute_passages(&mut prepared, config.fallback_to_header);

    // ---- parallel matching: per-court workers propose, nothing commits ----
    let matcher = Matcher::new(&registry, &ground_truth, &party_filter);

    let mut court_of: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, p) in prepared.iter().enumerate() {
        court_of.entry(&p.mention.court).or_default().push(i);
    }
    let courts: Vec<(&str, Vec<usize>)> = court_of.into_iter().collect();

    let mut decisions: Vec<(usize, MatchDecision)> = courts
        .par_iter()
        .flat_map(|(_, idxs)| {
            idxs.iter()
                .map(|&i| {
                    let p = &prepared[i];
                    let decision = match &p.key {
                        Some(key) => matcher.resolve(&p.mention.ucid, key),
                        None => MatchDecision::Unmatched,
                    };
                    (i, decision)
                })
                .collect::<Vec<_>>()
        })
        .collect();
    decisions.sort_by_key(|(i, _)| *i);

    // ---- merge pass: passage rescue, minting, event assembly ----
    let mut merge = MergePass::new(&registry, config.mode);

    // resolve passage attributions first so rescued mentions can reuse them
    let mut attribution_links: HashMap<String, (String, String)> = HashMap::new();

    let mut rows: Vec<Resolution> = Vec::with_capacity(decisions.len());
    let mut mint_tallies: HashMap<String, HashMap<PrefixCategory, usize>> = HashMap::new();
    // (row index, own normalized name, rescue attribution)
    let mut pending: Vec<(usize, Option<String>, Option<String>)> = Vec::new();

    for (i, decision) in &decisions {
        let p = &prepared[*i];
        let (resolved_name, sjid, rule, excluded) = match decision {
            MatchDecision::Excluded => (None, None, MatchRule::PartyExcluded, true),
            MatchDecision::Registry { sjid, name, rule } => {
                (Some(name.clone()), Some(sjid.clone()), *rule, false)
            }
            MatchDecision::GroundTruth { nid, name, rule } => {
                let sjid = merge.link_ground_truth(name, nid);
                (Some(name.clone()), sjid, *rule, false)
            }
            MatchDecision::Superstring { target, name } => {
                let sjid = match target {
                    PoolTarget::Registry { sjid } => Some(sjid.clone()),
                    PoolTarget::GroundTruth { nid } => merge.link_ground_truth(name, nid),
                };
                (Some(name.clone()), sjid, MatchRule::TokenSuperstring, false)
            }
            MatchDecision::Unmatched => {
                // defer: passage rescue and minting happen after this loop.
                // A short form contained in its passage's attributed name is
                // that judge, not a new entity, so it never feeds the mint
                // tallies.
                let own = p.key.as_ref().map(|k| k.normalized.clone());
                let rescue = rescue_attribution(p);
                if rescue.is_none() {
                    if let (Some(key), true) = (&p.key, config.mode.can_mint()) {
                        *mint_tallies
                            .entry(key.normalized.clone())
                            .or_default()
                            .entry(p.prefix)
                            .or_default() += 1;
                    }
                }
                pending.push((rows.len(), own, rescue));
                (None, None, MatchRule::Unresolved, false)
            }
        };

        if let (Some(name), Some(id)) = (&resolved_name, &sjid) {
            attribution_links.insert(name.clone(), (id.clone(), name.clone()));
        }

        rows.push(Resolution {
            ucid: p.mention.ucid.clone(),
            court: p.mention.court.clone(),
            year: p.mention.year,
            source: p.mention.source,
            ordinal: p.mention.ordinal,
            extracted_text: p.mention.text.clone(),
            normalized: p.key.as_ref().map(|k| k.normalized.clone()),
            prefix_category: p.prefix,
            is_transfer: p.is_transfer,
            resolved_name,
            sjid,
            rule,
            excluded,
            idempotency_key: sel::idempotency_key(&p.mention),
        });
    }

    // mint entities for unmatched names with sufficient evidence, in sorted
    // name order so ids are deterministic
    if config.mode.can_mint() {
        let mut names: Vec<&String> = mint_tallies.keys().collect();
        names.sort();
        for name in names {
            if let Some(label) = derive_label(&mint_tallies[name]) {
                merge.mint_provisional(name, &label);
            }
        }
    }

    // passage rescue + minted links for the deferred rows
    for (row_i, normalized, rescue) in pending {
        // inherit the passage attribution first: a rescued short form is the
        // attributed judge even when its own name was minted elsewhere
        if let Some(attribution) = &rescue {
            let link = attribution_links
                .get(attribution)
                .cloned()
                .or_else(|| merge.minted_sjid(attribution).map(|s| (s, attribution.clone())));
            if let Some((sjid, resolved)) = link {
                rows[row_i].resolved_name = Some(resolved);
                rows[row_i].sjid = Some(sjid);
                rows[row_i].rule = MatchRule::PassageContext;
                continue;
            }
        }

        // own name minted this run?
        if let Some(name) = &normalized {
            if let Some(sjid) = merge.minted_sjid(name) {
                rows[row_i].resolved_name = Some(name.clone());
                rows[row_i].sjid = Some(sjid);
                rows[row_i].rule = MatchRule::Minted;
            }
        }
    }

    // ---- emit SEL rows, suppressing duplicate appends ----
    let mut writer = SelWriter::create(&config.sel_flat_path(), &config.sel_dir())?;
    let mut report = RunReport {
        mentions_loaded: mention_stats.loaded,
        mentions_skipped: mention_stats.skipped,
        ..RunReport::default()
    };

    // counts only accrue for rows that actually land
    let mut mention_counts: HashMap<String, u64> = HashMap::new();
    let mut case_sets: HashMap<String, HashSet<String>> = HashMap::new();
    // keys become durable only alongside the registry events, after the row
    // writers have flushed; a crash mid-run therefore leaves rows without
    // keys (retried harmlessly), never keys without rows
    let mut seen_keys: HashSet<&str> = HashSet::new();
    let mut new_keys: Vec<(String, String)> = Vec::new();

    for row in &rows {
        if seen_keys.contains(row.idempotency_key.as_str())
            || store.has_resolution_key(&row.idempotency_key)?
        {
            report.duplicates_suppressed += 1;
            continue;
        }
        seen_keys.insert(&row.idempotency_key);
        new_keys.push((row.idempotency_key.clone(), row.ucid.clone()));
        writer.append(row)?;
        if row.excluded {
            report.excluded += 1;
        } else if let Some(sjid) = &row.sjid {
            report.resolved += 1;
            *mention_counts.entry(sjid.clone()).or_default() += 1;
            case_sets
                .entry(sjid.clone())
                .or_default()
                .insert(row.ucid.clone());
        } else {
            report.unresolved += 1;
        }
    }
    report.rows_written = writer.finish()?;

    // passage attribution decisions, one per line
    write_passage_log(&passages, config)?;
    report.passages = passages.len();

    // ---- single transactional commit of all registry changes ----
    let mut events = merge.into_events();
    report.minted = events
        .iter()
        .filter(|e| matches!(e.kind, EventKind::Created { .. }))
        .count();
    let mut sjids: Vec<&String> = mention_counts.keys().collect();
    sjids.sort();
    for sjid in sjids {
        events.push(RegistryEvent::new(
            sjid,
            EventKind::CountsIncreased {
                mentions: mention_counts[sjid],
                cases: case_sets.get(sjid).map(|s| s.len() as u64).unwrap_or(0),
            },
            config.mode,
        ));
    }

    // uniqueness is re-validated by the fold before anything is stored
    for event in &events {
        registry.apply(event)?;
    }
    store.commit_run(&events, &new_keys)?;
    store.record_run(config.mode, config.commission_window.as_ref())?;

    registry::write_jel_snapshot(&registry, &config.jel_snapshot_path())?;
    report.registry_size = registry.len();
    Ok(report)
}

// ============================================================================
// MERGE PASS
// ============================================================================

// Owns id allocation. Workers never see this; every mint goes through here
// sequentially, so two workers proposing the same new name get one entity.
struct MergePass<'a> {
    registry: &'a Registry,
    mode: Mode,
    next_id: u64,
    minted: HashMap<String, String>,
    minted_nids: HashMap<String, String>,
    events: Vec<RegistryEvent>,
}

impl<'a> MergePass<'a> {
    fn new(registry: &'a Registry, mode: Mode) -> MergePass<'a> {
        let next_id = registry
            .next_sjid()
            .strip_prefix("SJ")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        MergePass {
            registry,
            mode,
            next_id,
            minted: HashMap::new(),
            minted_nids: HashMap::new(),
            events: Vec::new(),
        }
    }

    fn allocate(&mut self) -> String {
        let sjid = registry::format_sjid(self.next_id);
        self.next_id += 1;
        sjid
    }

    /// Entity id for a ground-truth-confirmed name: an existing entity with
    /// this nid, an entity minted earlier in this run, or (when the mode may
    /// mint) a fresh confirmed entity. Tagging returns None for new names.
    fn link_ground_truth(&mut self, name: &str, nid: &str) -> Option<String> {
        if let Some(entity) = self.registry.by_nid(nid) {
            return Some(entity.sjid.clone());
        }
        if let Some(sjid) = self.minted_nids.get(nid) {
            return Some(sjid.clone());
        }
        if !self.mode.can_mint() {
            return None;
        }
        let sjid = self.allocate();
        self.events.push(RegistryEvent::new(
            &sjid,
            EventKind::Created {
                name: name.to_string(),
                pretty_name: normalize::prettify(name),
                label: CONFIRMED_LABEL.to_string(),
                nid: Some(nid.to_string()),
            },
            self.mode,
        ));
        self.minted.insert(name.to_string(), sjid.clone());
        self.minted_nids.insert(nid.to_string(), sjid.clone());
        Some(sjid)
    }

    /// Mint a provisional entity from mention evidence alone.
    fn mint_provisional(&mut self, name: &str, label: &str) {
        if self.minted.contains_key(name) || !self.registry.by_name(name).is_empty() {
            return;
        }
        let sjid = self.allocate();
        self.events.push(RegistryEvent::new(
            &sjid,
            EventKind::Created {
                name: name.to_string(),
                pretty_name: normalize::prettify(name),
                label: label.to_string(),
                nid: None,
            },
            self.mode,
        ));
        self.minted.insert(name.to_string(), sjid);
    }

    fn minted_sjid(&self, name: &str) -> Option<String> {
        self.minted.get(name).cloned()
    }

    fn into_events(self) -> Vec<RegistryEvent> {
        self.events
    }
}

// ============================================================================
// TESTS
// ============================================================================
