// Judicial Entity Disambiguation - Core Library
// Exposes all modules for use in the CLI and tests

pub mod config;
pub mod ingest;
pub mod normalize;
pub mod ground_truth;
pub mod registry;
pub mod matcher;
pub mod segmenter;
pub mod sel;
pub mod pipeline;

// Re-export commonly used types
pub use config::{CommissionWindow, Mode, RunConfig};
pub use ingest::{
    load_ground_truth, load_mentions, load_parties, GroundTruthRecord, IngestStats, Mention,
    PartyRecord, SourceKind,
};
pub use normalize::{normalize, prettify, NameKey, PrefixCategory};
pub use ground_truth::{GroundTruthIndex, FUZZY_THRESHOLD};
pub use registry::{
    format_sjid, write_jel_snapshot, EntityState, EventKind, Registry, RegistryEntity,
    RegistryEvent, RegistryStore,
};
pub use matcher::{
    derive_label, tokens_in_tokens, MatchDecision, MatchRule, Matcher, PartyFilter,
    SuperstringIndex,
};
pub use segmenter::{segment, CaseEntry, Passage};
pub use sel::{idempotency_key, Resolution, SelWriter};
pub use pipeline::{run, CasePassage, RunReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
