// ✂️ Passage Segmenter & Attributor - Who presided over which stretch
//
// A case's docket is a chronological sequence of entries. When a case is
// transferred or reassigned, the judge mentioned before the marker and the
// judge mentioned after it are different people even when the names are
// confusable. Splitting at transfer markers and attributing each passage
// independently keeps those identities apart.
//
// The marker entry itself belongs to no passage: its text talks about both
// the outgoing and incoming judge, so counting it on either side would
// contaminate the tally. Header mentions never pass through here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One docket entry, reduced to what segmentation needs: its position,
/// whether it is a transfer marker, and the normalized candidate names its
/// mentions produced.
#[derive(Debug, Clone)]
pub struct CaseEntry {
    pub ordinal: u32,
    pub is_transfer_marker: bool,
    pub candidates: Vec<String>,
}

/// A contiguous run of entries between transfer markers, with the identity
/// the run was attributed to (if any).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    /// Ordinals of the entries in this passage
    pub ordinals: Vec<u32>,

    /// Winning normalized name, or None for a blank attribution
    pub attribution: Option<String>,

    /// Whether the blank/attribution came from the header fallback
    pub from_fallback: bool,
}

/// Split a case's entries into passages at transfer markers and attribute
/// each passage by strict plurality over its candidate names.
///
/// Ties and candidate-free passages attribute blank, unless `fallback`
/// (the case-header assigned judge) is provided, in which case it fills the
/// blank. Entries must already be in docket order.
pub fn segment(entries: &[CaseEntry], fallback: Option<&str>) -> Vec<Passage> {
    let mut passages = Vec::new();
    let mut current: Vec<&CaseEntry> = Vec::new();

    for entry in entries {
        if entry.is_transfer_marker {
            if !current.is_empty() {
                passages.push(attribute(&current, fallback));
                current.clear();
            }
        } else {
            current.push(entry);
        }
    }
    if !current.is_empty() {
        passages.push(attribute(&current, fallback));
    }
    passages
}

fn attribute(entries: &[&CaseEntry], fallback: Option<&str>) -> Passage {
    let ordinals = entries.iter().map(|e| e.ordinal).collect();

    let mut tally: HashMap<&str, usize> = HashMap::new();
    for entry in entries {
        for name in &entry.candidates {
            *tally.entry(name.as_str()).or_default() += 1;
        }
    }

    // strict plurality: a unique maximum count, otherwise blank
    let winner = match tally.values().max().copied() {
        Some(max) => {
            let top: Vec<&str> = tally
                .iter()
                .filter(|(_, &c)| c == max)
                .map(|(&n, _)| n)
                .collect();
            if top.len() == 1 {
                Some(top[0].to_string())
            } else {
                None
            }
        }
        None => None,
    };

    match winner {
        Some(name) => Passage {
            ordinals,
            attribution: Some(name),
            from_fallback: false,
        },
        None => Passage {
            ordinals,
            attribution: fallback.map(|f| f.to_string()),
            from_fallback: fallback.is_some(),
        },
    }
}

// ============================================================================
// TESTS
// ============================================================================
