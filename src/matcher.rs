// 🎯 Matcher - Priority-rule resolution of mentions to entities
//
// Every mention is pushed through a fixed cascade of rules, cheapest and
// most certain first. The first rule that fires decides, and the rule name
// is recorded on the resolution row so every link is auditable. A mention
// no rule can place stays explicitly unresolved; the matcher never guesses
// between candidates.
//
// Rule order:
//   0. party/counsel guard   - not a judge, excluded from candidacy
//   1. registry exact        - normalized name already in the JEL, unique
//   2. ground-truth exact    - biographical match inside the window, unique
//   3. ground-truth fuzzy    - Jaro-Winkler >= 0.95, unique best
//   4. token superstring     - short form contained in exactly one pool name
//   5. unmatched             - left for minting (baseline/update) or null

use crate::ground_truth::{GroundTruthIndex, FUZZY_THRESHOLD};
use crate::normalize::{NameKey, PrefixCategory};
use crate::registry::Registry;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ============================================================================
// DECISION LOG
// ============================================================================

/// Which rule decided a mention's resolution. Serialized into SEL rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchRule {
    PartyExcluded,
    RegistryExact,
    GroundTruthExact,
    GroundTruthFuzzy,
    TokenSuperstring,
    /// Inherited the passage's attributed identity
    PassageContext,
    Minted,
    Unresolved,
}

impl MatchRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchRule::PartyExcluded => "party_excluded",
            MatchRule::RegistryExact => "registry_exact",
            MatchRule::GroundTruthExact => "ground_truth_exact",
            MatchRule::GroundTruthFuzzy => "ground_truth_fuzzy",
            MatchRule::TokenSuperstring => "token_superstring",
            MatchRule::PassageContext => "passage_context",
            MatchRule::Minted => "minted",
            MatchRule::Unresolved => "unresolved",
        }
    }
}

/// Where a superstring hit landed.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolTarget {
    Registry { sjid: String },
    GroundTruth { nid: String },
}

/// The matcher's verdict on one mention. Minting is not decided here: the
/// merge pass owns id allocation, so unmatched mentions are handed up.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchDecision {
    /// Mention names a party or counsel of the same case
    Excluded,
    /// Linked to an existing registry entity
    Registry {
        sjid: String,
        name: String,
        rule: MatchRule,
    },
    /// Matched a ground-truth record not yet in the registry
    GroundTruth {
        nid: String,
        name: String,
        rule: MatchRule,
    },
    /// Short form contained in exactly one pool name
    Superstring { target: PoolTarget, name: String },
    /// No rule fired
    Unmatched,
}

// ============================================================================
// TOKEN CONTAINMENT
// ============================================================================

/// Is `short` contained in `long` as an ordered token subsequence, with
/// duplicate tokens respected?
///
/// "smith" ⊂ "john smith"; "john smith" ⊂ "john robert smith";
/// "george h george" ⊄ "george h" (the second "george" has no partner);
/// "lewis a" matches "wilma a lewis" in neither direction (order).
pub fn tokens_in_tokens(short: &[String], long: &[String]) -> bool {
    if short.is_empty() || short.len() > long.len() {
        return false;
    }
    // per-token multiplicity must be available in the long form
    let mut counts: HashMap<&str, isize> = HashMap::new();
    for t in long {
        *counts.entry(t.as_str()).or_default() += 1;
    }
    for t in short {
        let c = counts.entry(t.as_str()).or_default();
        *c -= 1;
        if *c < 0 {
            return false;
        }
    }
    // and the tokens must appear in order
    let mut pos = 0;
    for t in short {
        match long[pos..].iter().position(|l| l == t) {
            Some(i) => pos += i + 1,
            None => return false,
        }
    }
    true
}

// ============================================================================
// SUPERSTRING INDEX
// ============================================================================

#[derive(Debug, Clone)]
struct PoolEntry {
    name: String,
    tokens: Vec<String>,
    target: PoolTarget,
}

/// Pool of known full names (registry ∪ ground truth) indexed for the
/// unique-superstring rule.
pub struct SuperstringIndex {
    entries: Vec<PoolEntry>,
}

impl SuperstringIndex {
    pub fn build(registry: &Registry, ground_truth: &GroundTruthIndex) -> SuperstringIndex {
        let mut entries = Vec::new();
        for entity in registry.entities() {
            entries.push(PoolEntry {
                name: entity.name.clone(),
                tokens: entity.name.split_whitespace().map(String::from).collect(),
                target: PoolTarget::Registry {
                    sjid: entity.sjid.clone(),
                },
            });
        }
        for rec in ground_truth.records() {
            // already-registered names would double-count as two pool hits
            if registry.by_name(&rec.key.normalized).is_empty() {
                entries.push(PoolEntry {
                    name: rec.key.normalized.clone(),
                    tokens: rec.key.unified_tokens.clone(),
                    target: PoolTarget::GroundTruth {
                        nid: rec.record.nid.clone(),
                    },
                });
            }
        }
        SuperstringIndex { entries }
    }

    #[cfg(test)]
    fn from_names(names: &[&str]) -> SuperstringIndex {
        SuperstringIndex {
            entries: names
                .iter()
                .enumerate()
                .map(|(i, n)| PoolEntry {
                    name: n.to_string(),
                    tokens: n.split_whitespace().map(String::from).collect(),
                    target: PoolTarget::Registry {
                        sjid: crate::registry::format_sjid(i as u64),
                    },
                })
                .collect(),
        }
    }

    /// Resolve a short form iff exactly one distinct pool name strictly
    /// contains it AND every pool entry bearing that name is the same
    /// identity. Two judges sharing the winning full name are as ambiguous
    /// as two different names; zero or ambiguous yields None.
    pub fn resolve(&self, key: &NameKey) -> Option<(&str, &PoolTarget)> {
        let probe = &key.unified_tokens;
        let mut hit: Option<&PoolEntry> = None;
        let mut distinct = HashSet::new();
        let mut unanimous = true;

        for entry in &self.entries {
            if entry.tokens.len() > probe.len() && tokens_in_tokens(probe, &entry.tokens) {
                distinct.insert(entry.name.as_str());
                match hit {
                    None => hit = Some(entry),
                    Some(first) if first.target != entry.target => unanimous = false,
                    Some(_) => {}
                }
            }
        }

        match (hit, distinct.len(), unanimous) {
            (Some(entry), 1, true) => Some((&entry.name, &entry.target)),
            _ => None,
        }
    }
}

// ============================================================================
// PARTY FILTER
// ============================================================================

/// Per-case set of normalized party/counsel names, the negative filter.
#[derive(Debug, Default)]
pub struct PartyFilter {
    by_ucid: HashMap<String, HashSet<String>>,
}

impl PartyFilter {
    pub fn new() -> PartyFilter {
        PartyFilter::default()
    }

    pub fn insert(&mut self, ucid: &str, normalized_name: &str) {
        self.by_ucid
            .entry(ucid.to_string())
            .or_default()
            .insert(normalized_name.to_string());
    }

    pub fn is_party(&self, ucid: &str, key: &NameKey) -> bool {
        match self.by_ucid.get(ucid) {
            Some(names) => names.contains(&key.normalized),
            None => false,
        }
    }
}

// ============================================================================
// MATCHER
// ============================================================================

/// Read-only resolution engine over one run's registry, ground truth, and
/// party filter. Safe to share across per-court workers.
pub struct Matcher<'a> {
    registry: &'a Registry,
    ground_truth: &'a GroundTruthIndex,
    superstrings: SuperstringIndex,
    parties: &'a PartyFilter,
}

impl<'a> Matcher<'a> {
    pub fn new(
        registry: &'a Registry,
        ground_truth: &'a GroundTruthIndex,
        parties: &'a PartyFilter,
    ) -> Matcher<'a> {
        Matcher {
            registry,
            ground_truth,
            superstrings: SuperstringIndex::build(registry, ground_truth),
            parties,
        }
    }

    /// Run the rule cascade for one mention.
    pub fn resolve(&self, ucid: &str, key: &NameKey) -> MatchDecision {
        // 0. party/counsel guard
        if self.parties.is_party(ucid, key) {
            return MatchDecision::Excluded;
        }

        // 1. registry exact, unique
        let registry_hits = self.registry.by_name(&key.normalized);
        if registry_hits.len() == 1 {
            return MatchDecision::Registry {
                sjid: registry_hits[0].sjid.clone(),
                name: registry_hits[0].name.clone(),
                rule: MatchRule::RegistryExact,
            };
        }

        // 2. ground-truth exact, unique
        let exact = self.ground_truth.lookup_exact(key);
        if exact.len() == 1 {
            return MatchDecision::GroundTruth {
                nid: exact[0].record.nid.clone(),
                name: exact[0].key.normalized.clone(),
                rule: MatchRule::GroundTruthExact,
            };
        }
        if exact.len() > 1 {
            // ambiguous biographical name: never guess
            return MatchDecision::Unmatched;
        }

        // 3. ground-truth fuzzy, unique best
        let fuzzy = self.ground_truth.lookup_fuzzy(key, FUZZY_THRESHOLD);
        if fuzzy.len() == 1 {
            return MatchDecision::GroundTruth {
                nid: fuzzy[0].0.record.nid.clone(),
                name: fuzzy[0].0.key.normalized.clone(),
                rule: MatchRule::GroundTruthFuzzy,
            };
        }

        // 4. unique token superstring over the pool
        if let Some((name, target)) = self.superstrings.resolve(key) {
            return MatchDecision::Superstring {
                target: target.clone(),
                name: name.to_string(),
            };
        }

        MatchDecision::Unmatched
    }
}

// ============================================================================
// ROLE LABELS
// ============================================================================

/// Minimum mention count before a keyword-free name can become an entity.
const MIN_MINT_OCCURRENCES: usize = 3;

// Specific-role buckets tried in priority order at each confidence tier
const LABEL_PRIORITY: &[(PrefixCategory, &str)] = &[
    (PrefixCategory::MagistrateJudge, "Magistrate_Judge"),
    (PrefixCategory::DistrictJudge, "District_Judge"),
    (PrefixCategory::BankruptcyJudge, "Bankruptcy_Judge"),
    (PrefixCategory::CircuitAppeals, "Circuit_Appeals"),
];

/// Derive a role label for a candidate entity from the prefix-category
/// tallies of its mentions. `None` denies minting: the evidence does not
/// support a judicial entity.
pub fn derive_label(tallies: &HashMap<PrefixCategory, usize>) -> Option<String> {
    let total: usize = tallies.values().sum();
    let judgey: usize = tallies
        .iter()
        .filter(|(c, _)| c.is_judgey())
        .map(|(_, &n)| n)
        .sum();
    let header: usize = tallies
        .iter()
        .filter(|(c, _)| {
            matches!(
                c,
                PrefixCategory::AssignedJudge | PrefixCategory::ReferredJudge
            )
        })
        .map(|(_, &n)| n)
        .sum();

    if judgey == 0 {
        // deny: no judge-like evidence at all
        if header == 0 {
            return None;
        }
        // deny: header-only and rarely seen
        if total < MIN_MINT_OCCURRENCES {
            return None;
        }
        // header-only entities are assigned judges, labeled district
        return Some("District_Judge".to_string());
    }

    // confidence tiers over the judge-like tally, specific roles first
    for tier in [1.0_f64, 0.5, 0.25] {
        for (category, label) in LABEL_PRIORITY {
            let n = tallies.get(category).copied().unwrap_or(0);
            if n > 0 && (n as f64) / (judgey as f64) >= tier {
                return Some(label.to_string());
            }
        }
    }

    Some("Nondescript_Judge".to_string())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use crate::ingest::GroundTruthRecord;
    use crate::normalize;
    use crate::registry::{EventKind, RegistryEvent};
    use chrono::NaiveDate;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    fn registry_with(names: &[&str]) -> Registry {
        let mut registry = Registry::new();
        for name in names {
            let sjid = registry.next_sjid();
            registry
                .apply(&RegistryEvent::new(
                    &sjid,
                    EventKind::Created {
                        name: name.to_string(),
                        pretty_name: name.to_string(),
                        label: "Nondescript_Judge".to_string(),
                        nid: None,
                    },
                    Mode::Baseline,
                ))
                .unwrap();
        }
        registry
    }

    fn gt_index(names: &[(&str, &str)]) -> GroundTruthIndex {
        let records = names
            .iter()
            .map(|(name, nid)| GroundTruthRecord {
                full_name: name.to_string(),
                nid: nid.to_string(),
                commission_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
                termination_date: None,
                court: None,
            })
            .collect();
        GroundTruthIndex::build(records, None, None)
    }

    #[test]
    fn test_tokens_in_tokens() {
        assert!(tokens_in_tokens(&toks("smith"), &toks("john smith")));
        assert!(tokens_in_tokens(
            &toks("john smith"),
            &toks("john robert smith")
        ));
        // duplicate token needs a partner
        assert!(!tokens_in_tokens(&toks("george h george"), &toks("george h")));
        assert!(tokens_in_tokens(
            &toks("george h george"),
            &toks("george h george iii")
        ));
        // order matters both ways
        assert!(!tokens_in_tokens(&toks("lewis a"), &toks("wilma a lewis")));
        assert!(!tokens_in_tokens(&toks("a lewis"), &toks("lewis a wilma")));
        assert!(!tokens_in_tokens(&toks("doe"), &toks("john smith")));
    }

    #[test]
    fn test_superstring_unique_or_null() {
        let key = |s: &str| normalize::normalize(s).unwrap();

        // two superstrings of "smith" → unresolved
        let pool = SuperstringIndex::from_names(&["smith", "john smith", "robert smith"]);
        assert!(pool.resolve(&key("smith")).is_none());

        // no superstring at all → unresolved
        let pool = SuperstringIndex::from_names(&["smith", "john smith"]);
        assert!(pool.resolve(&key("doe")).is_none());

        // exactly one → resolved
        let pool = SuperstringIndex::from_names(&["john smith", "robert jones"]);
        let (name, _) = pool.resolve(&key("smith")).unwrap();
        assert_eq!(name, "john smith");
    }

    #[test]
    fn test_rule_cascade_order() {
        let registry = registry_with(&["john smith"]);
        let gt = gt_index(&[("John Smith", "1001"), ("Jane Doe", "1002")]);
        let parties = PartyFilter::new();
        let matcher = Matcher::new(&registry, &gt, &parties);

        // registry exact beats ground truth
        let d = matcher.resolve("case-1", &normalize::normalize("John Smith").unwrap());
        assert!(matches!(
            d,
            MatchDecision::Registry {
                rule: MatchRule::RegistryExact,
                ..
            }
        ));

        // ground-truth exact for a name not yet registered
        let d = matcher.resolve("case-1", &normalize::normalize("Jane Doe").unwrap());
        match d {
            MatchDecision::GroundTruth { nid, rule, .. } => {
                assert_eq!(nid, "1002");
                assert_eq!(rule, MatchRule::GroundTruthExact);
            }
            other => panic!("unexpected decision {:?}", other),
        }

        // short form "doe" has exactly one superstring in the pool
        let d = matcher.resolve("case-1", &normalize::normalize("Doe").unwrap());
        assert!(matches!(d, MatchDecision::Superstring { .. }));

        // nothing fires
        let d = matcher.resolve("case-1", &normalize::normalize("Zebulon Quill").unwrap());
        assert_eq!(d, MatchDecision::Unmatched);
    }

    #[test]
    fn test_party_guard_excludes() {
        let registry = registry_with(&["sarah jones"]);
        let gt = gt_index(&[]);
        let mut parties = PartyFilter::new();
        parties.insert("case-1", "sarah jones");
        let matcher = Matcher::new(&registry, &gt, &parties);

        let key = normalize::normalize("Sarah Jones").unwrap();
        assert_eq!(matcher.resolve("case-1", &key), MatchDecision::Excluded);
        // same name in another case resolves normally
        assert!(matches!(
            matcher.resolve("case-2", &key),
            MatchDecision::Registry { .. }
        ));
    }

    #[test]
    fn test_ambiguous_ground_truth_never_guessed() {
        let registry = Registry::new();
        // two distinct judges with the same name
        let gt = gt_index(&[("John Smith", "1001"), ("John Smith", "1002")]);
        let parties = PartyFilter::new();
        let matcher = Matcher::new(&registry, &gt, &parties);
        let d = matcher.resolve("case-1", &normalize::normalize("John Smith").unwrap());
        assert_eq!(d, MatchDecision::Unmatched);

        // the short form is just as ambiguous: "smith" has one superstring
        // name in the pool, but that name belongs to two identities
        let d = matcher.resolve("case-1", &normalize::normalize("Smith").unwrap());
        assert_eq!(d, MatchDecision::Unmatched);
    }

    #[test]
    fn test_superstring_same_name_two_identities_is_ambiguous() {
        let registry = Registry::new();
        let gt = gt_index(&[("John Smith", "1001"), ("John Smith", "1002")]);
        let index = SuperstringIndex::build(&registry, &gt);
        let key = normalize::normalize("Smith").unwrap();
        assert!(index.resolve(&key).is_none());

        // a single identity behind the name still resolves
        let gt = gt_index(&[("John Smith", "1001")]);
        let index = SuperstringIndex::build(&registry, &gt);
        let (name, target) = index.resolve(&key).unwrap();
        assert_eq!(name, "john smith");
        assert_eq!(
            *target,
            PoolTarget::GroundTruth {
                nid: "1001".to_string()
            }
        );
    }

    #[test]
    fn test_derive_label() {
        let mut tallies = HashMap::new();
        tallies.insert(PrefixCategory::MagistrateJudge, 8);
        tallies.insert(PrefixCategory::DistrictJudge, 2);
        assert_eq!(derive_label(&tallies).as_deref(), Some("Magistrate_Judge"));

        // magistrate priority on an even split
        let mut tallies = HashMap::new();
        tallies.insert(PrefixCategory::MagistrateJudge, 5);
        tallies.insert(PrefixCategory::DistrictJudge, 5);
        assert_eq!(derive_label(&tallies).as_deref(), Some("Magistrate_Judge"));

        // nondescript evidence only
        let mut tallies = HashMap::new();
        tallies.insert(PrefixCategory::NondescriptJudge, 4);
        assert_eq!(derive_label(&tallies).as_deref(), Some("Nondescript_Judge"));

        // header-only evidence defaults to district
        let mut tallies = HashMap::new();
        tallies.insert(PrefixCategory::AssignedJudge, 4);
        assert_eq!(derive_label(&tallies).as_deref(), Some("District_Judge"));

        // header-only but rarely seen: denied
        let mut tallies = HashMap::new();
        tallies.insert(PrefixCategory::AssignedJudge, 2);
        assert_eq!(derive_label(&tallies), None);

        // no judge-like evidence: denied
        let mut tallies = HashMap::new();
        tallies.insert(PrefixCategory::NoKeywords, 50);
        assert_eq!(derive_label(&tallies), None);
        let mut tallies = HashMap::new();
        tallies.insert(PrefixCategory::JudicialActor, 1);
        tallies.insert(PrefixCategory::NoKeywords, 1);
        assert_eq!(derive_label(&tallies), None);
    }
}
