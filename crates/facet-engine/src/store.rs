//! Gallery persistence — the descriptor store behind the match resolver.
//!
//! The engine thread is the single writer; readers get consistent,
//! insertion-ordered snapshots. Descriptors are stored as JSON float arrays
//! tagged by their length, and re-validated against the known descriptor
//! sizes on the way out.

use chrono::{DateTime, Utc};
use facet_core::enrollment;
use facet_core::types::{AngleClass, Descriptor, GalleryRecord, Identity};
use facet_core::{GalleryIdentity, GallerySnapshot};
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("descriptor encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("unknown identity: {0}")]
    UnknownIdentity(String),
    #[error("stored descriptor has unknown length {0}")]
    CorruptDescriptor(usize),
}

/// Gallery store contract.
///
/// `snapshot` must reflect a consistent state per call (no mid-scan
/// mutation) and preserve insertion order, which the match resolver relies
/// on for deterministic tie-breaking.
pub trait GalleryStore: Send + Sync {
    fn create_identity(&self, display_name: &str) -> Result<Identity, StoreError>;
    fn get_identity(&self, id: &str) -> Result<Option<Identity>, StoreError>;
    fn list_identities(&self) -> Result<Vec<Identity>, StoreError>;
    /// Append one capture and recompute the identity's completeness.
    /// Returns the updated identity.
    fn append_record(&self, record: &GalleryRecord) -> Result<Identity, StoreError>;
    fn snapshot(&self) -> Result<GallerySnapshot, StoreError>;
    fn record_count(&self) -> Result<usize, StoreError>;
    /// Remove an identity and all of its records. Returns false when the
    /// identity was not present.
    fn delete_identity(&self, id: &str) -> Result<bool, StoreError>;
}

/// Canonical captured-angle set for an identity, derived from its records.
fn captured_set(angles: impl IntoIterator<Item = AngleClass>) -> BTreeSet<AngleClass> {
    angles
        .into_iter()
        .filter(|a| enrollment::CANONICAL_ANGLES.contains(a))
        .collect()
}

// ---------------------------------------------------------------------------
// SQLite store
// ---------------------------------------------------------------------------

/// SQLite-backed gallery store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (and initialize) the database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory database, mainly for tests and diagnostics.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS identities (
                 id           TEXT PRIMARY KEY,
                 display_name TEXT NOT NULL,
                 is_complete  INTEGER NOT NULL DEFAULT 0,
                 created_at   TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS records (
                 id          INTEGER PRIMARY KEY AUTOINCREMENT,
                 identity_id TEXT NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
                 angle       TEXT NOT NULL,
                 descriptor  TEXT NOT NULL,
                 confidence  REAL NOT NULL,
                 captured_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_records_identity ON records(identity_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn load_identity(conn: &Connection, id: &str) -> Result<Option<Identity>, StoreError> {
        let mut stmt =
            conn.prepare("SELECT id, display_name, is_complete FROM identities WHERE id = ?1")?;
        let mut rows = stmt.query([id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let identity_id: String = row.get(0)?;
        let display_name: String = row.get(1)?;
        let is_complete: bool = row.get(2)?;
        let captured = Self::captured_angles(conn, &identity_id)?;
        Ok(Some(Identity {
            id: identity_id,
            display_name,
            captured_angles: captured,
            is_complete,
        }))
    }

    fn captured_angles(conn: &Connection, id: &str) -> Result<BTreeSet<AngleClass>, StoreError> {
        let mut stmt = conn.prepare("SELECT DISTINCT angle FROM records WHERE identity_id = ?1")?;
        let angles = stmt
            .query_map([id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(captured_set(
            angles.iter().filter_map(|a| AngleClass::parse(a)),
        ))
    }
}

fn decode_descriptor(json: &str) -> Result<Descriptor, StoreError> {
    let values: Vec<f32> = serde_json::from_str(json)?;
    let len = values.len();
    Descriptor::from_values(values).ok_or(StoreError::CorruptDescriptor(len))
}

impl GalleryStore for SqliteStore {
    fn create_identity(&self, display_name: &str) -> Result<Identity, StoreError> {
        let conn = self.conn.lock().expect("store mutex");
        let identity = Identity {
            id: uuid::Uuid::new_v4().to_string(),
            display_name: display_name.to_string(),
            captured_angles: BTreeSet::new(),
            is_complete: false,
        };
        conn.execute(
            "INSERT INTO identities (id, display_name, is_complete, created_at)
             VALUES (?1, ?2, 0, ?3)",
            rusqlite::params![identity.id, identity.display_name, Utc::now().to_rfc3339()],
        )?;
        tracing::info!(id = %identity.id, name = %identity.display_name, "identity created");
        Ok(identity)
    }

    fn get_identity(&self, id: &str) -> Result<Option<Identity>, StoreError> {
        let conn = self.conn.lock().expect("store mutex");
        Self::load_identity(&conn, id)
    }

    fn list_identities(&self) -> Result<Vec<Identity>, StoreError> {
        let conn = self.conn.lock().expect("store mutex");
        let mut stmt = conn.prepare("SELECT id FROM identities ORDER BY rowid")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut identities = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(identity) = Self::load_identity(&conn, &id)? {
                identities.push(identity);
            }
        }
        Ok(identities)
    }

    fn append_record(&self, record: &GalleryRecord) -> Result<Identity, StoreError> {
        let conn = self.conn.lock().expect("store mutex");
        if Self::load_identity(&conn, &record.identity_id)?.is_none() {
            return Err(StoreError::UnknownIdentity(record.identity_id.clone()));
        }

        let descriptor_json = serde_json::to_string(record.descriptor.values())?;
        conn.execute(
            "INSERT INTO records (identity_id, angle, descriptor, confidence, captured_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                record.identity_id,
                record.angle_class.as_str(),
                descriptor_json,
                record.confidence,
                record.captured_at.to_rfc3339(),
            ],
        )?;

        let captured = Self::captured_angles(&conn, &record.identity_id)?;
        let is_complete = enrollment::is_complete(&captured);
        conn.execute(
            "UPDATE identities SET is_complete = ?1 WHERE id = ?2",
            rusqlite::params![is_complete, record.identity_id],
        )?;

        let identity = Self::load_identity(&conn, &record.identity_id)?
            .ok_or_else(|| StoreError::UnknownIdentity(record.identity_id.clone()))?;
        tracing::debug!(
            id = %identity.id,
            angle = %record.angle_class,
            captured = captured.len(),
            is_complete,
            "record appended"
        );
        Ok(identity)
    }

    fn snapshot(&self) -> Result<GallerySnapshot, StoreError> {
        let conn = self.conn.lock().expect("store mutex");
        let mut stmt =
            conn.prepare("SELECT id, display_name FROM identities ORDER BY rowid")?;
        let heads = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut identities = Vec::with_capacity(heads.len());
        for (id, display_name) in heads {
            let mut stmt = conn.prepare(
                "SELECT angle, descriptor, confidence, captured_at
                 FROM records WHERE identity_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([&id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f32>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut records = Vec::with_capacity(rows.len());
            for (angle, descriptor_json, confidence, captured_at) in rows {
                let Some(angle_class) = AngleClass::parse(&angle) else {
                    tracing::warn!(identity = %id, angle, "skipping record with unknown angle");
                    continue;
                };
                records.push(GalleryRecord {
                    identity_id: id.clone(),
                    angle_class,
                    descriptor: decode_descriptor(&descriptor_json)?,
                    confidence,
                    captured_at: captured_at
                        .parse::<DateTime<Utc>>()
                        .unwrap_or_else(|_| Utc::now()),
                });
            }
            identities.push(GalleryIdentity {
                id,
                display_name,
                records,
            });
        }
        Ok(GallerySnapshot { identities })
    }

    fn record_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().expect("store mutex");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn delete_identity(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().expect("store mutex");
        conn.execute("DELETE FROM records WHERE identity_id = ?1", [id])?;
        let deleted = conn.execute("DELETE FROM identities WHERE id = ?1", [id])?;
        if deleted > 0 {
            tracing::info!(id, "identity deleted");
        }
        Ok(deleted > 0)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    identities: Vec<Identity>,
    records: Vec<GalleryRecord>,
}

/// In-memory gallery store for tests and embedded callers.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GalleryStore for MemoryStore {
    fn create_identity(&self, display_name: &str) -> Result<Identity, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex");
        let identity = Identity {
            id: uuid::Uuid::new_v4().to_string(),
            display_name: display_name.to_string(),
            captured_angles: BTreeSet::new(),
            is_complete: false,
        };
        inner.identities.push(identity.clone());
        Ok(identity)
    }

    fn get_identity(&self, id: &str) -> Result<Option<Identity>, StoreError> {
        let inner = self.inner.lock().expect("store mutex");
        Ok(inner.identities.iter().find(|i| i.id == id).cloned())
    }

    fn list_identities(&self) -> Result<Vec<Identity>, StoreError> {
        let inner = self.inner.lock().expect("store mutex");
        Ok(inner.identities.clone())
    }

    fn append_record(&self, record: &GalleryRecord) -> Result<Identity, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex");
        let position = inner
            .identities
            .iter()
            .position(|i| i.id == record.identity_id)
            .ok_or_else(|| StoreError::UnknownIdentity(record.identity_id.clone()))?;

        inner.records.push(record.clone());
        let captured = captured_set(
            inner
                .records
                .iter()
                .filter(|r| r.identity_id == record.identity_id)
                .map(|r| r.angle_class),
        );
        let identity = &mut inner.identities[position];
        identity.is_complete = enrollment::is_complete(&captured);
        identity.captured_angles = captured;
        Ok(identity.clone())
    }

    fn snapshot(&self) -> Result<GallerySnapshot, StoreError> {
        let inner = self.inner.lock().expect("store mutex");
        let identities = inner
            .identities
            .iter()
            .map(|identity| GalleryIdentity {
                id: identity.id.clone(),
                display_name: identity.display_name.clone(),
                records: inner
                    .records
                    .iter()
                    .filter(|r| r.identity_id == identity.id)
                    .cloned()
                    .collect(),
            })
            .collect();
        Ok(GallerySnapshot { identities })
    }

    fn record_count(&self) -> Result<usize, StoreError> {
        let inner = self.inner.lock().expect("store mutex");
        Ok(inner.records.len())
    }

    fn delete_identity(&self, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex");
        let before = inner.identities.len();
        inner.identities.retain(|i| i.id != id);
        inner.records.retain(|r| r.identity_id != id);
        Ok(inner.identities.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_core::types::LEGACY_DIM;

    fn test_record(identity_id: &str, angle: AngleClass) -> GalleryRecord {
        GalleryRecord {
            identity_id: identity_id.to_string(),
            angle_class: angle,
            descriptor: Descriptor::Legacy(
                (0..LEGACY_DIM).map(|i| (i as f32 * 0.07).sin()).collect(),
            ),
            confidence: 0.8,
            captured_at: Utc::now(),
        }
    }

    fn stores() -> Vec<Box<dyn GalleryStore>> {
        vec![
            Box::new(SqliteStore::open_in_memory().unwrap()),
            Box::new(MemoryStore::new()),
        ]
    }

    #[test]
    fn test_create_and_list() {
        for store in stores() {
            let a = store.create_identity("Ada").unwrap();
            let b = store.create_identity("Grace").unwrap();
            assert_ne!(a.id, b.id);

            let listed = store.list_identities().unwrap();
            assert_eq!(listed.len(), 2);
            // Insertion order is preserved.
            assert_eq!(listed[0].display_name, "Ada");
            assert_eq!(listed[1].display_name, "Grace");
        }
    }

    #[test]
    fn test_append_updates_captured_angles() {
        for store in stores() {
            let identity = store.create_identity("Ada").unwrap();
            let updated = store
                .append_record(&test_record(&identity.id, AngleClass::Frontal))
                .unwrap();
            assert!(updated.captured_angles.contains(&AngleClass::Frontal));
            assert!(!updated.is_complete);
        }
    }

    #[test]
    fn test_completeness_recomputed_after_each_capture() {
        for store in stores() {
            let identity = store.create_identity("Ada").unwrap();
            for (i, angle) in enrollment::CANONICAL_ANGLES.iter().enumerate() {
                let updated = store.append_record(&test_record(&identity.id, *angle)).unwrap();
                assert_eq!(updated.is_complete, i == 4, "after capture {i}");
            }
        }
    }

    #[test]
    fn test_repeat_capture_does_not_inflate_progress() {
        for store in stores() {
            let identity = store.create_identity("Ada").unwrap();
            store.append_record(&test_record(&identity.id, AngleClass::Frontal)).unwrap();
            let updated = store
                .append_record(&test_record(&identity.id, AngleClass::Frontal))
                .unwrap();
            assert_eq!(updated.captured_angles.len(), 1);
            assert_eq!(store.record_count().unwrap(), 2);
        }
    }

    #[test]
    fn test_append_to_unknown_identity_fails() {
        for store in stores() {
            let result = store.append_record(&test_record("missing", AngleClass::Frontal));
            assert!(matches!(result, Err(StoreError::UnknownIdentity(_))));
        }
    }

    #[test]
    fn test_snapshot_roundtrips_descriptor() {
        for store in stores() {
            let identity = store.create_identity("Ada").unwrap();
            let record = test_record(&identity.id, AngleClass::LeftProfile);
            store.append_record(&record).unwrap();

            let snapshot = store.snapshot().unwrap();
            assert_eq!(snapshot.identities.len(), 1);
            let stored = &snapshot.identities[0].records[0];
            assert_eq!(stored.angle_class, AngleClass::LeftProfile);
            assert_eq!(stored.descriptor, record.descriptor);
        }
    }

    #[test]
    fn test_delete_identity_removes_records() {
        for store in stores() {
            let identity = store.create_identity("Ada").unwrap();
            store.append_record(&test_record(&identity.id, AngleClass::Frontal)).unwrap();

            assert!(store.delete_identity(&identity.id).unwrap());
            assert!(!store.delete_identity(&identity.id).unwrap());
            assert_eq!(store.record_count().unwrap(), 0);
            assert!(store.snapshot().unwrap().is_empty());
        }
    }

    #[test]
    fn test_decode_rejects_unknown_length() {
        let json = serde_json::to_string(&vec![0.5f32; 33]).unwrap();
        assert!(matches!(
            decode_descriptor(&json),
            Err(StoreError::CorruptDescriptor(33))
        ));
    }
}
