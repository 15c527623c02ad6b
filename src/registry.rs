// 🏛️ Registry (JEL) - Event-sourced append-only store of judicial entities
//
// The registry is the system of record for every judicial entity ever
// minted. It is append-only in the strictest sense: entity ids are minted
// once and never reused or removed, and every change to an entity is an
// event in an ordered log. Current state is a fold over that log, so the
// full history of how an entity came to be is always reconstructible.
//
// Storage is SQLite in WAL mode. The same database carries the run ledger
// used for the cross-run commission-window disjointness check, and the
// resolution idempotency keys, so one transaction boundary covers all
// invariants at commit time.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use uuid::Uuid;

use crate::config::{CommissionWindow, Mode};

// ============================================================================
// ENTITY
// ============================================================================

/// Lifecycle state of a registry entity. No transition removes an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityState {
    /// Minted from mention evidence alone
    Provisional,
    /// Linked to a ground-truth biographical record
    Confirmed,
    /// Label changed by a later update run
    Revised,
}

/// One judicial entity: a JEL row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntity {
    /// Permanent id: "SJ" + zero-padded counter, never reused
    pub sjid: String,

    /// Canonical lowercase name
    pub name: String,

    /// Display form of the name
    pub pretty_name: String,

    /// Role label (FJC_Judge, District_Judge, Magistrate_Judge, ...)
    pub label: String,

    pub state: EntityState,

    /// External biographical id once confirmed
    pub nid: Option<String>,

    /// Aggregate counts; only ever increase
    pub mention_count: u64,
    pub case_count: u64,
}

/// Render an SJID from its counter value.
pub fn format_sjid(n: u64) -> String {
    format!("SJ{:06}", n)
}

fn parse_sjid(sjid: &str) -> Option<u64> {
    sjid.strip_prefix("SJ")?.parse().ok()
}

// ============================================================================
// EVENTS
// ============================================================================

/// What happened to an entity. The payload is everything needed to replay
/// the change without consulting any other source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventKind {
    Created {
        name: String,
        pretty_name: String,
        label: String,
        nid: Option<String>,
    },
    Confirmed {
        nid: String,
    },
    Relabeled {
        label: String,
    },
    CountsIncreased {
        mentions: u64,
        cases: u64,
    },
}

/// One entry in the registry event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEvent {
    pub event_id: String,
    pub sjid: String,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    /// Which pipeline mode produced the event
    pub actor: String,
}

impl RegistryEvent {
    pub fn new(sjid: &str, kind: EventKind, mode: Mode) -> RegistryEvent {
        RegistryEvent {
            event_id: Uuid::new_v4().to_string(),
            sjid: sjid.to_string(),
            kind,
            timestamp: Utc::now(),
            actor: mode.as_str().to_string(),
        }
    }
}

// ============================================================================
// IN-MEMORY VIEW
// ============================================================================

/// Current registry state, derived by folding the event log. BTreeMap keeps
/// iteration (and thus snapshots) in stable sjid order.
#[derive(Debug, Default)]
pub struct Registry {
    entities: BTreeMap<String, RegistryEntity>,
    by_name: HashMap<String, Vec<String>>,
    next_id: u64,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> impl Iterator<Item = &RegistryEntity> {
        self.entities.values()
    }

    pub fn get(&self, sjid: &str) -> Option<&RegistryEntity> {
        self.entities.get(sjid)
    }

    /// All entities whose canonical name equals `name`.
    pub fn by_name(&self, name: &str) -> Vec<&RegistryEntity> {
        match self.by_name.get(name) {
            Some(ids) => ids.iter().filter_map(|id| self.entities.get(id)).collect(),
            None => Vec::new(),
        }
    }

    /// Entity already confirmed against this biographical id, if any.
    pub fn by_nid(&self, nid: &str) -> Option<&RegistryEntity> {
        self.entities
            .values()
            .find(|e| e.nid.as_deref() == Some(nid))
    }

    /// Next sjid to mint: one past the highest id ever issued, so ids are
    /// never reused even after revisions.
    pub fn next_sjid(&self) -> String {
        format_sjid(self.next_id)
    }

    /// Apply one event to the fold. Unknown-entity events other than
    /// `Created` are rejected; the log is corrupt if they appear.
    pub fn apply(&mut self, event: &RegistryEvent) -> Result<()> {
        match &event.kind {
            EventKind::Created {
                name,
                pretty_name,
                label,
                nid,
            } => {
                if self.entities.contains_key(&event.sjid) {
                    bail!("duplicate Created event for {}", event.sjid);
                }
                let state = if nid.is_some() {
                    EntityState::Confirmed
                } else {
                    EntityState::Provisional
                };
                self.by_name
                    .entry(name.clone())
                    .or_default()
                    .push(event.sjid.clone());
                self.entities.insert(
                    event.sjid.clone(),
                    RegistryEntity {
                        sjid: event.sjid.clone(),
                        name: name.clone(),
                        pretty_name: pretty_name.clone(),
                        label: label.clone(),
                        state,
                        nid: nid.clone(),
                        mention_count: 0,
                        case_count: 0,
                    },
                );
                if let Some(n) = parse_sjid(&event.sjid) {
                    if n >= self.next_id {
                        self.next_id = n + 1;
                    }
                }
            }
            EventKind::Confirmed { nid } => {
                let entity = self
                    .entities
                    .get_mut(&event.sjid)
                    .with_context(|| format!("Confirmed event for unknown {}", event.sjid))?;
                entity.nid = Some(nid.clone());
                if entity.state == EntityState::Provisional {
                    entity.state = EntityState::Confirmed;
                }
            }
            EventKind::Relabeled { label } => {
                let entity = self
                    .entities
                    .get_mut(&event.sjid)
                    .with_context(|| format!("Relabeled event for unknown {}", event.sjid))?;
                entity.label = label.clone();
                entity.state = EntityState::Revised;
            }
            EventKind::CountsIncreased { mentions, cases } => {
                let entity = self
                    .entities
                    .get_mut(&event.sjid)
                    .with_context(|| format!("CountsIncreased event for unknown {}", event.sjid))?;
                entity.mention_count += mentions;
                entity.case_count += cases;
            }
        }
        Ok(())
    }
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// Durable backing for the registry: the event log, the run ledger, and the
/// resolution idempotency keys.
pub struct RegistryStore {
    conn: Connection,
}

impl RegistryStore {
    pub fn open(path: &Path) -> Result<RegistryStore> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open registry database {}", path.display()))?;
        let store = RegistryStore { conn };
        store.setup()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<RegistryStore> {
        let conn = Connection::open_in_memory()?;
        let store = RegistryStore { conn };
        store.setup()?;
        Ok(store)
    }

    fn setup(&self) -> Result<()> {
        self.conn
            .pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL mode")?;

        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS registry_events (
                    event_id TEXT PRIMARY KEY,
                    seq INTEGER NOT NULL,
                    sjid TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    actor TEXT NOT NULL
                )",
                [],
            )
            .context("Failed to create registry_events table")?;

        self.conn
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_events_sjid ON registry_events(sjid)",
                [],
            )
            .context("Failed to create event index")?;

        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS runs (
                    run_id TEXT PRIMARY KEY,
                    mode TEXT NOT NULL,
                    window_start TEXT,
                    window_end TEXT,
                    started_at TEXT NOT NULL
                )",
                [],
            )
            .context("Failed to create runs table")?;

        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS resolution_keys (
                    idempotency_key TEXT PRIMARY KEY,
                    ucid TEXT NOT NULL,
                    recorded_at TEXT NOT NULL
                )",
                [],
            )
            .context("Failed to create resolution_keys table")?;

        Ok(())
    }

    /// Replay the full event log into a `Registry` fold.
    pub fn load(&self) -> Result<Registry> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, sjid, payload, timestamp, actor
             FROM registry_events ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut registry = Registry::new();
        for row in rows {
            let (event_id, sjid, payload, timestamp, actor) = row?;
            let kind: EventKind = serde_json::from_str(&payload)
                .with_context(|| format!("Corrupt event payload for {}", event_id))?;
            let timestamp = timestamp
                .parse::<DateTime<Utc>>()
                .with_context(|| format!("Corrupt event timestamp for {}", event_id))?;
            registry.apply(&RegistryEvent {
                event_id,
                sjid,
                kind,
                timestamp,
                actor,
            })?;
        }
        Ok(registry)
    }

    /// Commit one run's registry changes atomically: the event batch and the
    /// resolution keys it vouches for land in a single transaction. This is
    /// the single writer commit point: per-court workers only propose, the
    /// merge pass hands everything here once the row writers are flushed, so
    /// a key is never durable without its row already on disk.
    pub fn commit_run(
        &mut self,
        events: &[RegistryEvent],
        keys: &[(String, String)],
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let next_seq: i64 = tx
                .query_row("SELECT COALESCE(MAX(seq), 0) FROM registry_events", [], |r| {
                    r.get(0)
                })?;
            let mut stmt = tx.prepare(
                "INSERT INTO registry_events
                 (event_id, seq, sjid, kind, payload, timestamp, actor)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (i, event) in events.iter().enumerate() {
                let kind_name = match &event.kind {
                    EventKind::Created { .. } => "Created",
                    EventKind::Confirmed { .. } => "Confirmed",
                    EventKind::Relabeled { .. } => "Relabeled",
                    EventKind::CountsIncreased { .. } => "CountsIncreased",
                };
                let payload = serde_json::to_string(&event.kind)?;
                stmt.execute(rusqlite::params![
                    event.event_id,
                    next_seq + 1 + i as i64,
                    event.sjid,
                    kind_name,
                    payload,
                    event.timestamp.to_rfc3339(),
                    event.actor,
                ])?;
            }

            // insert-or-skip: a crashed run may have committed some keys
            let mut key_stmt = tx.prepare(
                "INSERT OR IGNORE INTO resolution_keys
                 (idempotency_key, ucid, recorded_at)
                 VALUES (?1, ?2, ?3)",
            )?;
            let now = Utc::now().to_rfc3339();
            for (key, ucid) in keys {
                key_stmt.execute(rusqlite::params![key, ucid, now])?;
            }
        }
        tx.commit().context("Failed to commit run changes")?;
        Ok(())
    }

    /// Has a resolution with this idempotency key already been recorded?
    pub fn has_resolution_key(&self, key: &str) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM resolution_keys WHERE idempotency_key = ?1",
                [key],
                |r| r.get(0),
            )
            .context("Failed to query resolution key")?;
        Ok(count > 0)
    }

    /// Fatal-check the run's commission window against every prior
    /// minting run. Overlap is a configuration conflict; nothing has been
    /// written yet when this runs. A prior run with the exact same window
    /// is a re-run of this run, not a conflict: it passes, and the
    /// idempotency keys make the retry a no-op.
    pub fn check_window_disjoint(&self, window: &CommissionWindow) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "SELECT mode, window_start, window_end FROM runs
             WHERE window_start IS NOT NULL AND mode != 'tagging'",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (mode, start, end) = row?;
            let prior = CommissionWindow::new(
                start.parse::<NaiveDate>().context("Corrupt run window")?,
                end.parse::<NaiveDate>().context("Corrupt run window")?,
            )?;
            if prior == *window {
                continue;
            }
            if window.overlaps(&prior) {
                bail!(
                    "commission window {}..{} overlaps prior {} run window {}..{}",
                    window.start,
                    window.end,
                    mode,
                    prior.start,
                    prior.end
                );
            }
        }
        Ok(())
    }

    /// Record run metadata so later update runs can check disjointness.
    pub fn record_run(&self, mode: Mode, window: Option<&CommissionWindow>) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO runs (run_id, mode, window_start, window_end, started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    mode.as_str(),
                    window.map(|w| w.start.to_string()),
                    window.map(|w| w.end.to_string()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("Failed to record run metadata")?;
        Ok(())
    }

    /// History of one entity, oldest first.
    pub fn events_for(&self, sjid: &str) -> Result<Vec<RegistryEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, sjid, payload, timestamp, actor
             FROM registry_events WHERE sjid = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map([sjid], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut events = Vec::new();
        for row in rows {
            let (event_id, sjid, payload, timestamp, actor) = row?;
            events.push(RegistryEvent {
                event_id,
                sjid,
                kind: serde_json::from_str(&payload).context("Corrupt event payload")?,
                timestamp: timestamp
                    .parse::<DateTime<Utc>>()
                    .context("Corrupt event timestamp")?,
                actor,
            });
        }
        Ok(events)
    }
}

// ============================================================================
// SNAPSHOT EXPORT
// ============================================================================

/// Write the current registry state as a JSONL snapshot, one JEL row per
/// line in sjid order.
pub fn write_jel_snapshot(registry: &Registry, path: &Path) -> Result<usize> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create JEL snapshot {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut count = 0;
    for entity in registry.entities() {
        serde_json::to_writer(&mut writer, entity)?;
        writer.write_all(b"\n")?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

// ============================================================================
// TESTS
// ============================================================================
