// 🧹 Normalizer - Raw entity strings → comparable name keys
//
// Docket text is noisy: honorifics, docket boilerplate, dates, possessives,
// and OCR junk get glued onto judge names. This module turns a raw extracted
// string into a normalized comparison key plus structured name parts.
//
// Problem solved:
// - "Judge John R. Smith's" / "Hon. JOHN R SMITH, USDJ" → "john r smith"
// - Suffix-aware surname anchors ("john smith jr" anchors on "smith")
// - Pretext windows categorized into mutually exclusive honorific buckets
// - Transfer verbiage ("reassigned to") detected for passage segmentation
//
// Everything here is side-effect-free and deterministic. A string with no
// surviving name tokens yields None, never an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// PREFIX CATEGORY
// ============================================================================

/// Mutually exclusive honorific bucket for the text preceding a mention.
///
/// The labels double as wire values in SEL rows, so `as_str` keeps the
/// original underscore spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrefixCategory {
    BankruptcyJudge,
    CircuitAppeals,
    DistrictJudge,
    MagistrateJudge,
    NondescriptJudge,
    /// Clerk/mediator style verbiage ("referred to", "order signed by")
    JudicialActor,
    NoKeywords,
    /// Header metadata field: assigned judge
    AssignedJudge,
    /// Header metadata field: referred judge
    ReferredJudge,
}

impl PrefixCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrefixCategory::BankruptcyJudge => "Bankruptcy_Judge",
            PrefixCategory::CircuitAppeals => "Circuit_Appeals",
            PrefixCategory::DistrictJudge => "District_Judge",
            PrefixCategory::MagistrateJudge => "Magistrate_Judge",
            PrefixCategory::NondescriptJudge => "Nondescript_Judge",
            PrefixCategory::JudicialActor => "Judicial_Actor",
            PrefixCategory::NoKeywords => "No_Keywords",
            PrefixCategory::AssignedJudge => "Assigned_Judge",
            PrefixCategory::ReferredJudge => "Referred_Judge",
        }
    }

    /// Buckets that count as judge-like evidence when deriving a role label.
    pub fn is_judgey(&self) -> bool {
        matches!(
            self,
            PrefixCategory::BankruptcyJudge
                | PrefixCategory::CircuitAppeals
                | PrefixCategory::DistrictJudge
                | PrefixCategory::MagistrateJudge
                | PrefixCategory::NondescriptJudge
        )
    }
}

// ============================================================================
// PATTERN TABLES
// ============================================================================

/// Generational suffixes that are part of a name, not noise.
pub const SUFFIXES: &[&str] = &[
    "i", "ii", "iii", "iv", "v", "jr", "jnr", "snr", "sr", "junior", "senior",
];

// Accented characters seen in commissioned judge names, folded to ascii
const ACCENT_FROM: &str = "áàâäéèêëíìîïóòôöúùûüñç";
const ACCENT_TO: &str = "aaaaeeeeiiiioooouuuunc";

/// Unified spellings for first names that appear under variant spellings in
/// docket text (Debra/Deborah, Eric/Erik). Applied to comparison tokens only;
/// display names keep the extracted spelling.
static NAME_UNIFIER: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("allan", "allen"),
        ("brian", "bryan"),
        ("catharine", "catherine"),
        ("katherine", "catherine"),
        ("katharine", "catherine"),
        ("debora", "deborah"),
        ("debra", "deborah"),
        ("elisabeth", "elizabeth"),
        ("eric", "erik"),
        ("erick", "erik"),
        ("frederic", "frederick"),
        ("jacquelyn", "jacqueline"),
        ("jonathan", "johnathan"),
        ("jonothan", "johnathan"),
        ("kristin", "kristen"),
        ("laurence", "lawrence"),
        ("louis", "lewis"),
        ("marcia", "marsha"),
        ("meagan", "megan"),
        ("meghan", "megan"),
        ("michele", "michelle"),
        ("nathaneal", "nathaniel"),
        ("nicolas", "nicholas"),
        ("nickolas", "nicholas"),
        ("patric", "patrick"),
        ("randal", "randall"),
        ("samuel", "sam"),
        ("sallie", "sally"),
        ("sonia", "sonja"),
        ("stephan", "stephen"),
        ("stewart", "stuart"),
        ("silvia", "sylvia"),
        ("suzanne", "susan"),
        ("theadore", "theodore"),
        ("teresa", "theresa"),
        ("wm", "william"),
    ])
});

// Leading "by"/"to"/"re" docket verbiage before the actual name
static LEADING_VERBIAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(by|to|re|before)[\s:]+").unwrap());

// Honorific/title tokens stripped from the front of a name, repeatedly
static FRONT_TITLES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(the\s+)?(honorable|hon\.?|judges?|justices?|chief|senior|sr\.?|visiting|magistrate|district|bankruptcy|mr\.?|ms\.?|mrs\.?|u\.?s\.?)\s+",
    )
    .unwrap()
});

// Affixed role abbreviations that ride along with names: "USDJ", "U.S.M.J.", "MJ"
static AFFIXED_ROLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^|[\s,])(u\.?s\.?[dm]\.?j\.?|[dm]\.?j\.?|usdj|usmj|c\.?j\.?)\.?($|[\s,])")
        .unwrap()
});

// Numeric dates ("on 12/31/2014", "dated 1-2-19") and everything after them
static DATES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(on|by|for|dated|entered:?|scheduled)?\s*\d+[-/.]\d+[-/.]\d+.*$").unwrap()
});

// Month and weekday words that signal scheduling text, not names.
// April and May are given names, so they are excluded here and only cut
// by AMBIGUOUS_MONTHS when scheduling context pins them down.
static CALENDAR_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(on|for|scheduled|set\s+for|continued\s+to)?\s*\b(january|february|march|june|july|august|september|october|november|december|monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b.*$")
        .unwrap()
});

// April/May only count as months behind a scheduling verb or before a day
static AMBIGUOUS_MONTHS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\s*(on|for|scheduled|set\s+for|continued\s+to)\s+(april|may)\b.*$|\s+(april|may)\s+\d.*$)")
        .unwrap()
});

// Possessive markers on a name ("Judge Smith's chambers")
static POSSESSIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)('s|s')(\s|$)").unwrap());

// A string that is only digits and punctuation carries no name
static NUMBERS_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d\s.,:;\-=/#]*$").unwrap());

// Transfer verbiage near a mention; also the passage-boundary marker
static TRANSFER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(transferred|(re)?assigned)\s+(to|from)\b").unwrap());

// Docket punctuation that ends the name portion of a string
const HARD_BREAKS: &[&str] = &[
    ":", ";", "**", "--", " - ", "(", ")", "[", "]", "{", "}", "<b", "</font",
];

// ----------------------------------------------------------------------------
// Prefix bucket keyword tables, most specific bucket first. Nondescript must
// come after bankruptcy/district/magistrate because "judge" is a substring of
// all of them.
// ----------------------------------------------------------------------------

static BANKRUPTCY_PAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(bankruptcy\s+(chief\s+|case\s+|court\s+)?judges?|u\.?\s?s\.?\s?bankruptcy|u\.?s\.?b\.?j\.?)\b")
        .unwrap()
});

static CIRCUIT_PAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b((chief|senior|associate|junior)\s+justices?|appellate\s+judges?|(first|second|third|fourth|fifth|sixth|seventh|eighth|ninth|tenth|eleventh)?\s*circuit\s+(judges?|j)|justices)\b")
        .unwrap()
});

static DISTRICT_PAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(district\s+(court\s+)?judges?|dist\.?\s+judges?|u\.?\s?s\.?\s?d\.?\s?j\.?|usdj)\b")
        .unwrap()
});

static MAGISTRATE_PAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(mag(istrate)?\.?\s+judges?|chief\s+magistrate|u\.?\s?s\.?\s?m\.?\s?j\.?|usmj)\b")
        .unwrap()
});

static NONDESCRIPT_PAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(honorable\s+judges?|visiting\s+judges?|court\s+judges?|judges?|honorable|hon\.?|jud)\b")
        .unwrap()
});

static JUDICIAL_ACTOR_PAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(judgment\s+signed\s+by|order\s+signed\s+by|orders?\s+by|ordered\s+by|motions?\s+(referred\s+to|before)|proceed(ings)?\s+before|held\s+before|before|assigned\s+to|referred\s+to|reassigned\s+to|transferred?\s+to|to\s+chambers|chambers)\b")
        .unwrap()
});

// Contextual verbiage marking a non-judicial entity (party, counsel, firm)
static NON_JUDICIAL_PAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(att(orne)?y|counsel|esq(uire)?|ausa|plaintiff|defendant|deft|movant|arbitrator|mediator|clerk|pro\s+se|d/b/a|o/b/o)\b")
        .unwrap()
});

// ============================================================================
// NAME KEY
// ============================================================================

/// Structured, comparable form of one extracted name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameKey {
    /// Fully normalized name string (lowercased, cleaned, space-collapsed)
    pub normalized: String,

    /// Whitespace tokens of the normalized string
    pub tokens: Vec<String>,

    /// Tokens with variant first-name spellings unified (comparison only)
    pub unified_tokens: Vec<String>,

    /// Generational suffix ("jr", "iii") when present
    pub suffix: Option<String>,

    /// Surname anchor: last token that is not a suffix
    pub anchor: Option<String>,
}

impl NameKey {
    /// True when the key is a bare surname (or surname + suffix) with no
    /// given-name tokens - the short form the substring rule handles.
    pub fn is_short_form(&self) -> bool {
        self.tokens_without_suffix().len() == 1
    }

    /// Name tokens with any generational suffix removed.
    pub fn tokens_without_suffix(&self) -> &[String] {
        match self.suffix {
            Some(_) => &self.tokens[..self.tokens.len() - 1],
            None => &self.tokens[..],
        }
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Normalize a raw extracted entity string into a comparable `NameKey`.
///
/// Returns `None` when no name tokens survive cleaning (pure dates, docket
/// codes, empty strings). This is the expected outcome for junk extractions,
/// not a failure.
pub fn normalize(raw: &str) -> Option<NameKey> {
    let mut s = raw.trim().to_string();
    if s.is_empty() {
        return None;
    }

    // Cut at the first hard docket punctuation break
    if let Some(i) = HARD_BREAKS
        .iter()
        .filter_map(|p| s.find(p))
        .min()
    {
        s.truncate(i);
    }

    // Shave docket verbiage and honorific titles off the front, repeatedly:
    // strings like "by Judge Hon. John Smith" need several passes
    loop {
        let before = s.len();
        s = LEADING_VERBIAGE.replace(&s, "").to_string();
        s = FRONT_TITLES.replace(&s, "").to_string();
        if s.len() == before {
            break;
        }
    }

    // Drop trailing scheduling text, role abbreviations, possessives
    s = DATES.replace(&s, "").to_string();
    s = CALENDAR_WORDS.replace(&s, "").to_string();
    s = AMBIGUOUS_MONTHS.replace(&s, "").to_string();
    s = AFFIXED_ROLE.replace_all(&s, " ").to_string();
    s = POSSESSIVE.replace_all(&s, " ").to_string();

    // Lowercase + accent folding
    let mut folded = String::with_capacity(s.len());
    for c in s.chars().flat_map(|c| c.to_lowercase()) {
        match ACCENT_FROM.chars().position(|a| a == c) {
            Some(i) => folded.push(ACCENT_TO.chars().nth(i).unwrap_or(c)),
            None => folded.push(c),
        }
    }

    // Strip residual punctuation; keep hyphens and apostrophes inside names
    let cleaned: String = folded
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' || c == '-' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    if NUMBERS_ONLY.is_match(cleaned.trim()) {
        return None;
    }

    // Collapse whitespace, drop tokens that are bare digits
    let tokens: Vec<String> = cleaned
        .split_whitespace()
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
        .map(|t| t.trim_matches(|c| c == '\'' || c == '-').to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.is_empty() {
        return None;
    }

    let normalized = tokens.join(" ");

    // Suffix-aware anchor: "john smith jr" anchors on "smith"
    let (suffix, anchor) = match tokens.as_slice() {
        [.., prev, last] if SUFFIXES.contains(&last.as_str()) => {
            (Some(last.clone()), Some(prev.clone()))
        }
        [.., last] => (None, Some(last.clone())),
        [] => (None, None),
    };

    let unified_tokens = tokens
        .iter()
        .map(|t| match NAME_UNIFIER.get(t.as_str()) {
            Some(u) => u.to_string(),
            None => t.clone(),
        })
        .collect();

    Some(NameKey {
        normalized,
        tokens,
        unified_tokens,
        suffix,
        anchor,
    })
}

/// Render a normalized name for display: first letter of each token
/// capitalized, roman-numeral suffixes fully uppercased.
pub fn prettify(normalized: &str) -> String {
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    let mut out = Vec::with_capacity(tokens.len());
    for (i, tok) in tokens.iter().enumerate() {
        let is_last = i == tokens.len() - 1;
        if is_last && tokens.len() > 1 && SUFFIXES.contains(tok) && tok.starts_with('i') {
            out.push(tok.to_uppercase());
        } else {
            let mut chars = tok.chars();
            match chars.next() {
                Some(first) => out.push(first.to_uppercase().collect::<String>() + chars.as_str()),
                None => {}
            }
        }
    }
    out.join(" ")
}

// ============================================================================
// PRETEXT CLASSIFICATION
// ============================================================================

/// Categorize the pretext window preceding a mention into exactly one bucket.
///
/// Bucket patterns are tried most-specific first: "bankruptcy judge" must win
/// over the bare "judge" that nondescript would catch.
pub fn categorize_prefix(pretext: &str) -> PrefixCategory {
    if BANKRUPTCY_PAT.is_match(pretext) {
        PrefixCategory::BankruptcyJudge
    } else if CIRCUIT_PAT.is_match(pretext) {
        PrefixCategory::CircuitAppeals
    } else if DISTRICT_PAT.is_match(pretext) {
        PrefixCategory::DistrictJudge
    } else if MAGISTRATE_PAT.is_match(pretext) {
        PrefixCategory::MagistrateJudge
    } else if NONDESCRIPT_PAT.is_match(pretext) {
        PrefixCategory::NondescriptJudge
    } else if JUDICIAL_ACTOR_PAT.is_match(pretext) {
        PrefixCategory::JudicialActor
    } else {
        PrefixCategory::NoKeywords
    }
}

/// Does the pretext contain case-transfer verbiage ("reassigned to",
/// "transferred from")? Used for the SEL transfer flag and as the passage
/// boundary marker in the segmenter.
pub fn is_transfer_language(text: &str) -> bool {
    TRANSFER.is_match(text)
}

/// Does the surrounding text signal a non-judicial actor (attorney, party,
/// clerk)? Mentions matching this are excluded from matcher candidacy.
pub fn is_non_judicial_context(text: &str) -> bool {
    NON_JUDICIAL_PAT.is_match(text)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_honorifics_and_roles() {
        let key = normalize("Judge John R. Smith").unwrap();
        assert_eq!(key.normalized, "john r smith");
        assert_eq!(key.anchor.as_deref(), Some("smith"));
        assert_eq!(key.suffix, None);

        let key = normalize("Hon. JOHN R SMITH, USDJ").unwrap();
        assert_eq!(key.normalized, "john r smith");

        let key = normalize("by Magistrate Judge Jane Doe").unwrap();
        assert_eq!(key.normalized, "jane doe");
    }

    #[test]
    fn test_suffix_anchor() {
        let key = normalize("John Smith Jr").unwrap();
        assert_eq!(key.suffix.as_deref(), Some("jr"));
        assert_eq!(key.anchor.as_deref(), Some("smith"));
        assert_eq!(key.tokens_without_suffix(), &["john", "smith"]);
        assert!(!key.is_short_form());

        // bare surname + suffix is still a short form
        let key = normalize("Smith Jr").unwrap();
        assert!(key.is_short_form());
    }

    #[test]
    fn test_accent_folding() {
        let key = normalize("Nelson Román").unwrap();
        assert_eq!(key.normalized, "nelson roman");
    }

    #[test]
    fn test_unified_spellings() {
        let key = normalize("Debra Smith").unwrap();
        assert_eq!(key.unified_tokens, vec!["deborah", "smith"]);
        // display tokens keep the extracted spelling
        assert_eq!(key.tokens, vec!["debra", "smith"]);
    }

    #[test]
    fn test_junk_yields_none() {
        assert!(normalize("").is_none());
        assert!(normalize("   ").is_none());
        assert!(normalize("12/31/2014").is_none());
        assert!(normalize("#1234").is_none());
        assert!(normalize("-- : --").is_none());
    }

    #[test]
    fn test_trailing_dates_and_schedule_cut() {
        let key = normalize("John Smith on 12/31/2014").unwrap();
        assert_eq!(key.normalized, "john smith");

        let key = normalize("Jane Doe scheduled Tuesday").unwrap();
        assert_eq!(key.normalized, "jane doe");
    }

    #[test]
    fn test_april_and_may_need_scheduling_context() {
        let key = normalize("Jane Doe continued to April 5, 2020").unwrap();
        assert_eq!(key.normalized, "jane doe");

        let key = normalize("John Smith hearing May 12").unwrap();
        assert_eq!(key.normalized, "john smith hearing");

        // April and May as given names survive
        let key = normalize("April Oliveri").unwrap();
        assert_eq!(key.normalized, "april oliveri");
        let key = normalize("Judge May Chen").unwrap();
        assert_eq!(key.normalized, "may chen");
    }

    #[test]
    fn test_possessive_stripped() {
        let key = normalize("Judge Smith's").unwrap();
        assert_eq!(key.normalized, "smith");
    }

    #[test]
    fn test_hard_break_cut() {
        let key = normalize("Judge Thomas: re motion to dismiss").unwrap();
        assert_eq!(key.normalized, "thomas");
    }

    #[test]
    fn test_prefix_categories() {
        assert_eq!(
            categorize_prefix("before Magistrate Judge"),
            PrefixCategory::MagistrateJudge
        );
        assert_eq!(
            categorize_prefix("U.S. District Judge"),
            PrefixCategory::DistrictJudge
        );
        // bankruptcy wins over the embedded "judge"
        assert_eq!(
            categorize_prefix("Bankruptcy Judge"),
            PrefixCategory::BankruptcyJudge
        );
        assert_eq!(
            categorize_prefix("Honorable"),
            PrefixCategory::NondescriptJudge
        );
        assert_eq!(
            categorize_prefix("motions referred to"),
            PrefixCategory::JudicialActor
        );
        assert_eq!(categorize_prefix("lorem ipsum"), PrefixCategory::NoKeywords);
    }

    #[test]
    fn test_transfer_language() {
        assert!(is_transfer_language("case transferred to Judge Doe"));
        assert!(is_transfer_language("reassigned from Judge Smith"));
        assert!(is_transfer_language("assigned to Judge Smith"));
        assert!(!is_transfer_language("order by Judge Smith"));
    }

    #[test]
    fn test_non_judicial_context() {
        assert!(is_non_judicial_context("attorney for plaintiff"));
        assert!(is_non_judicial_context("Esquire"));
        assert!(!is_non_judicial_context("district judge"));
    }

    #[test]
    fn test_prettify() {
        assert_eq!(prettify("john r smith"), "John R Smith");
        assert_eq!(prettify("william orrick iii"), "William Orrick III");
    }

    #[test]
    fn test_deterministic() {
        let a = normalize("Judge John R. Smith");
        let b = normalize("Judge John R. Smith");
        assert_eq!(a, b);
    }
}
