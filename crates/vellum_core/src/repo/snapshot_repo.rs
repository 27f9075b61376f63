//! Generic continuity/snapshot SQL shared by every versioned entity kind.
//!
//! # Responsibility
//! - Map the `RevisionedKind` trait onto per-kind continuity and snapshot
//!   tables without runtime reflection.
//! - Provide the untyped chain reads and surgical writes the purge engine
//!   and integrity checks run per `EntityKind`.
//!
//! # Invariants
//! - `insert_snapshot` demotes the prior `current` row in the same call, so
//!   a continuity never ends a transaction with two current snapshots.
//! - Write helpers run inside the caller's SQL transaction and never
//!   commit on their own.

use crate::model::attachment::{AttachmentFields, AttachmentIdentity};
use crate::model::dataset::DatasetFields;
use crate::model::entity::{ContinuityId, EntityKind, Snapshot};
use crate::model::revision::RevisionId;
use crate::model::state::EntityState;
use crate::model::tag::{DatasetTagFields, DatasetTagIdentity, TagFields};
use crate::repo::{RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

/// Statically-typed description of one versioned entity kind: its identity
/// columns, its revisioned field set, and how both bind to SQL.
pub trait RevisionedKind {
    /// Identity/FK values stored once on the continuity row.
    type Identity: Clone + std::fmt::Debug;
    /// Revisioned field values copied into every snapshot.
    type Fields: Clone + PartialEq + std::fmt::Debug;

    /// Storage mapping metadata for this kind.
    const KIND: EntityKind;

    /// Binds identity values in `EntityKind::identity_columns` order.
    fn bind_identity(identity: &Self::Identity) -> Vec<Value>;
    /// Binds field values in `EntityKind::field_columns` order.
    fn bind_fields(fields: &Self::Fields) -> Vec<Value>;
    /// Parses field columns from a snapshot row.
    fn parse_fields(row: &Row<'_>) -> rusqlite::Result<Self::Fields>;
}

/// Marker for the dataset kind.
pub struct DatasetKind;

impl RevisionedKind for DatasetKind {
    type Identity = String;
    type Fields = DatasetFields;

    const KIND: EntityKind = EntityKind::Dataset;

    fn bind_identity(identity: &Self::Identity) -> Vec<Value> {
        vec![Value::Text(identity.clone())]
    }

    fn bind_fields(fields: &Self::Fields) -> Vec<Value> {
        vec![
            Value::Text(fields.title.clone()),
            opt_text(&fields.notes),
            opt_text(&fields.url),
        ]
    }

    fn parse_fields(row: &Row<'_>) -> rusqlite::Result<Self::Fields> {
        Ok(DatasetFields {
            title: row.get("title")?,
            notes: row.get("notes")?,
            url: row.get("url")?,
        })
    }
}

/// Marker for the tag kind.
pub struct TagKind;

impl RevisionedKind for TagKind {
    type Identity = String;
    type Fields = TagFields;

    const KIND: EntityKind = EntityKind::Tag;

    fn bind_identity(identity: &Self::Identity) -> Vec<Value> {
        vec![Value::Text(identity.clone())]
    }

    fn bind_fields(_fields: &Self::Fields) -> Vec<Value> {
        Vec::new()
    }

    fn parse_fields(_row: &Row<'_>) -> rusqlite::Result<Self::Fields> {
        Ok(TagFields)
    }
}

/// Marker for the attachment kind.
pub struct AttachmentKind;

impl RevisionedKind for AttachmentKind {
    type Identity = AttachmentIdentity;
    type Fields = AttachmentFields;

    const KIND: EntityKind = EntityKind::Attachment;

    fn bind_identity(identity: &Self::Identity) -> Vec<Value> {
        vec![
            Value::Text(identity.dataset_id.to_string()),
            Value::Integer(identity.ordinal),
        ]
    }

    fn bind_fields(fields: &Self::Fields) -> Vec<Value> {
        vec![Value::Text(fields.url.clone()), opt_text(&fields.description)]
    }

    fn parse_fields(row: &Row<'_>) -> rusqlite::Result<Self::Fields> {
        Ok(AttachmentFields {
            url: row.get("url")?,
            description: row.get("description")?,
        })
    }
}

/// Marker for the dataset-tag link kind.
pub struct DatasetTagKind;

impl RevisionedKind for DatasetTagKind {
    type Identity = DatasetTagIdentity;
    type Fields = DatasetTagFields;

    const KIND: EntityKind = EntityKind::DatasetTag;

    fn bind_identity(identity: &Self::Identity) -> Vec<Value> {
        vec![
            Value::Text(identity.dataset_id.to_string()),
            Value::Text(identity.tag_id.to_string()),
        ]
    }

    fn bind_fields(_fields: &Self::Fields) -> Vec<Value> {
        Vec::new()
    }

    fn parse_fields(_row: &Row<'_>) -> rusqlite::Result<Self::Fields> {
        Ok(DatasetTagFields)
    }
}

/// Inserts a new continuity identity row.
pub fn insert_continuity<K: RevisionedKind>(
    conn: &Connection,
    continuity_id: ContinuityId,
    identity: &K::Identity,
) -> RepoResult<()> {
    let kind = K::KIND;
    let mut columns = vec!["continuity_uuid"];
    columns.extend_from_slice(kind.identity_columns());

    let placeholders = (1..=columns.len())
        .map(|position| format!("?{position}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut values = vec![Value::Text(continuity_id.to_string())];
    values.extend(K::bind_identity(identity));

    conn.execute(
        &format!(
            "INSERT INTO {} ({}) VALUES ({});",
            kind.continuity_table(),
            columns.join(", "),
            placeholders
        ),
        params_from_iter(values),
    )?;
    Ok(())
}

/// Appends one snapshot stamped with `revision_id` and flips it to current,
/// demoting the prior current row of the same continuity.
pub fn insert_snapshot<K: RevisionedKind>(
    conn: &Connection,
    continuity_id: ContinuityId,
    revision_id: RevisionId,
    fields: &K::Fields,
    state: EntityState,
) -> RepoResult<()> {
    let kind = K::KIND;
    conn.execute(
        &format!(
            "UPDATE {} SET current = 0 WHERE continuity_uuid = ?1 AND current = 1;",
            kind.snapshot_table()
        ),
        [continuity_id.to_string()],
    )?;

    let mut columns = vec!["continuity_uuid", "revision_id", "state", "current"];
    columns.extend_from_slice(kind.field_columns());

    let placeholders = (1..=columns.len())
        .map(|position| format!("?{position}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut values = vec![
        Value::Text(continuity_id.to_string()),
        Value::Integer(revision_id),
        Value::Text(state.as_db().to_string()),
        Value::Integer(1),
    ];
    values.extend(K::bind_fields(fields));

    conn.execute(
        &format!(
            "INSERT INTO {} ({}) VALUES ({});",
            kind.snapshot_table(),
            columns.join(", "),
            placeholders
        ),
        params_from_iter(values),
    )?;
    Ok(())
}

/// Loads the current snapshot of one continuity.
pub fn current_snapshot<K: RevisionedKind>(
    conn: &Connection,
    continuity_id: ContinuityId,
) -> RepoResult<Option<Snapshot<K::Fields>>> {
    let sql = format!(
        "{} WHERE continuity_uuid = ?1 AND current = 1;",
        snapshot_select(K::KIND)
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([continuity_id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_snapshot_row::<K>(row)?));
    }
    Ok(None)
}

/// Loads the snapshot with the largest `revision_id <= revision_id`, the
/// entity's state as of that revision. `None` means "did not exist yet" —
/// an expected outcome, not an error.
pub fn snapshot_as_of<K: RevisionedKind>(
    conn: &Connection,
    continuity_id: ContinuityId,
    revision_id: RevisionId,
) -> RepoResult<Option<Snapshot<K::Fields>>> {
    let sql = format!(
        "{} WHERE continuity_uuid = ?1 AND revision_id <= ?2
         ORDER BY revision_id DESC LIMIT 1;",
        snapshot_select(K::KIND)
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![continuity_id.to_string(), revision_id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_snapshot_row::<K>(row)?));
    }
    Ok(None)
}

/// One entry of a continuity's chain, newest first, as seen by the purge
/// planner: position and current flag only, no field payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainEntry {
    pub revision_id: RevisionId,
    pub current: bool,
}

/// Continuities of `kind` that have a snapshot stamped with `revision_id`,
/// in deterministic (continuity id) order.
pub fn continuities_touched_by(
    conn: &Connection,
    kind: EntityKind,
    revision_id: RevisionId,
) -> RepoResult<Vec<ContinuityId>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT continuity_uuid FROM {}
         WHERE revision_id = ?1
         ORDER BY continuity_uuid ASC;",
        kind.snapshot_table()
    ))?;
    let mut rows = stmt.query([revision_id])?;
    let mut continuities = Vec::new();
    while let Some(row) = rows.next()? {
        let uuid_text: String = row.get(0)?;
        continuities.push(parse_continuity_uuid(&uuid_text, kind)?);
    }
    Ok(continuities)
}

/// The two most recent chain entries of one continuity, newest first.
pub fn recent_chain(
    conn: &Connection,
    kind: EntityKind,
    continuity_id: ContinuityId,
) -> RepoResult<Vec<ChainEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT revision_id, current FROM {}
         WHERE continuity_uuid = ?1
         ORDER BY revision_id DESC LIMIT 2;",
        kind.snapshot_table()
    ))?;
    let mut rows = stmt.query([continuity_id.to_string()])?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        entries.push(ChainEntry {
            revision_id: row.get(0)?,
            current: row.get::<_, i64>(1)? != 0,
        });
    }
    Ok(entries)
}

/// Current flag of one specific snapshot row, if it exists.
pub fn snapshot_is_current(
    conn: &Connection,
    kind: EntityKind,
    continuity_id: ContinuityId,
    revision_id: RevisionId,
) -> RepoResult<Option<bool>> {
    let current: Option<i64> = conn
        .query_row(
            &format!(
                "SELECT current FROM {} WHERE continuity_uuid = ?1 AND revision_id = ?2;",
                kind.snapshot_table()
            ),
            params![continuity_id.to_string(), revision_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(current.map(|value| value != 0))
}

/// Number of snapshots in one continuity's chain.
pub fn chain_length(
    conn: &Connection,
    kind: EntityKind,
    continuity_id: ContinuityId,
) -> RepoResult<i64> {
    let count = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE continuity_uuid = ?1;",
            kind.snapshot_table()
        ),
        [continuity_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Deletes one snapshot row. Returns `false` when absent.
pub fn delete_snapshot_row(
    conn: &Connection,
    kind: EntityKind,
    continuity_id: ContinuityId,
    revision_id: RevisionId,
) -> RepoResult<bool> {
    let changed = conn.execute(
        &format!(
            "DELETE FROM {} WHERE continuity_uuid = ?1 AND revision_id = ?2;",
            kind.snapshot_table()
        ),
        params![continuity_id.to_string(), revision_id],
    )?;
    Ok(changed == 1)
}

/// Deletes one continuity row; snapshot rows follow via `ON DELETE CASCADE`.
pub fn delete_continuity_row(
    conn: &Connection,
    kind: EntityKind,
    continuity_id: ContinuityId,
) -> RepoResult<bool> {
    let changed = conn.execute(
        &format!(
            "DELETE FROM {} WHERE continuity_uuid = ?1;",
            kind.continuity_table()
        ),
        [continuity_id.to_string()],
    )?;
    Ok(changed == 1)
}

/// Marks one existing snapshot row as current. The caller has already
/// removed the newer row that held the flag.
pub fn promote_snapshot(
    conn: &Connection,
    kind: EntityKind,
    continuity_id: ContinuityId,
    revision_id: RevisionId,
) -> RepoResult<bool> {
    let changed = conn.execute(
        &format!(
            "UPDATE {} SET current = 1 WHERE continuity_uuid = ?1 AND revision_id = ?2;",
            kind.snapshot_table()
        ),
        params![continuity_id.to_string(), revision_id],
    )?;
    Ok(changed == 1)
}

/// Continuities of `kind` with zero snapshot rows — invalid post-commit.
pub fn continuities_without_snapshots(
    conn: &Connection,
    kind: EntityKind,
) -> RepoResult<Vec<ContinuityId>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT c.continuity_uuid FROM {} c
         WHERE NOT EXISTS (
             SELECT 1 FROM {} s WHERE s.continuity_uuid = c.continuity_uuid
         )
         ORDER BY c.continuity_uuid ASC;",
        kind.continuity_table(),
        kind.snapshot_table()
    ))?;
    let rows = stmt.query([])?;
    collect_continuity_ids(rows, kind)
}

/// Continuities of `kind` whose current flag is missing, duplicated, or not
/// on the snapshot with the maximum revision id.
pub fn continuities_with_broken_current(
    conn: &Connection,
    kind: EntityKind,
) -> RepoResult<Vec<ContinuityId>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT s.continuity_uuid FROM {table} s
         GROUP BY s.continuity_uuid
         HAVING SUM(s.current) <> 1
             OR MAX(CASE WHEN s.current = 1 THEN s.revision_id END)
                <> MAX(s.revision_id)
         ORDER BY s.continuity_uuid ASC;",
        table = kind.snapshot_table()
    ))?;
    let rows = stmt.query([])?;
    collect_continuity_ids(rows, kind)
}

fn collect_continuity_ids(
    mut rows: rusqlite::Rows<'_>,
    kind: EntityKind,
) -> RepoResult<Vec<ContinuityId>> {
    let mut continuities = Vec::new();
    while let Some(row) = rows.next()? {
        let uuid_text: String = row.get(0)?;
        continuities.push(parse_continuity_uuid(&uuid_text, kind)?);
    }
    Ok(continuities)
}

fn snapshot_select(kind: EntityKind) -> String {
    let mut columns = vec!["continuity_uuid", "revision_id", "state", "current"];
    columns.extend_from_slice(kind.field_columns());
    format!("SELECT {} FROM {}", columns.join(", "), kind.snapshot_table())
}

fn parse_snapshot_row<K: RevisionedKind>(row: &Row<'_>) -> RepoResult<Snapshot<K::Fields>> {
    let uuid_text: String = row.get("continuity_uuid")?;
    let continuity_id = parse_continuity_uuid(&uuid_text, K::KIND)?;

    let state_text: String = row.get("state")?;
    let state = EntityState::parse_db(&state_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid state `{state_text}` in {}.state",
            K::KIND.snapshot_table()
        ))
    })?;

    let current = match row.get::<_, i64>("current")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid current value `{other}` in {}.current",
                K::KIND.snapshot_table()
            )));
        }
    };

    Ok(Snapshot {
        continuity_id,
        revision_id: row.get("revision_id")?,
        fields: K::parse_fields(row)?,
        state,
        current,
    })
}

fn opt_text(value: &Option<String>) -> Value {
    match value {
        Some(text) => Value::Text(text.clone()),
        None => Value::Null,
    }
}

pub(crate) fn parse_continuity_uuid(value: &str, kind: EntityKind) -> RepoResult<ContinuityId> {
    Uuid::parse_str(value).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid value `{value}` in {}.continuity_uuid",
            kind.continuity_table()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::{
        continuities_with_broken_current, continuities_without_snapshots, current_snapshot,
        insert_continuity, insert_snapshot, DatasetKind,
    };
    use crate::db::open_db_in_memory;
    use crate::model::dataset::DatasetFields;
    use crate::model::entity::EntityKind;
    use crate::model::state::EntityState;
    use crate::repo::ledger_repo::insert_revision;
    use uuid::Uuid;

    #[test]
    fn optional_fields_round_trip_through_null_columns() {
        let conn = open_db_in_memory().unwrap();
        let continuity_id = Uuid::new_v4();
        insert_continuity::<DatasetKind>(&conn, continuity_id, &"census".to_string()).unwrap();
        let revision = insert_revision(&conn, "tester", "seed").unwrap();

        let fields = DatasetFields {
            title: "Census".to_string(),
            notes: None,
            url: Some("https://example.org".to_string()),
        };
        insert_snapshot::<DatasetKind>(
            &conn,
            continuity_id,
            revision.id,
            &fields,
            EntityState::Active,
        )
        .unwrap();

        let snapshot = current_snapshot::<DatasetKind>(&conn, continuity_id)
            .unwrap()
            .expect("snapshot should exist");
        assert_eq!(snapshot.fields, fields);
        assert!(snapshot.fields.notes.is_none());
        assert_eq!(snapshot.fields.url.as_deref(), Some("https://example.org"));
    }

    #[test]
    fn integrity_scans_report_broken_chains() {
        let conn = open_db_in_memory().unwrap();

        let orphan = Uuid::new_v4();
        insert_continuity::<DatasetKind>(&conn, orphan, &"orphan".to_string()).unwrap();
        assert_eq!(
            continuities_without_snapshots(&conn, EntityKind::Dataset).unwrap(),
            vec![orphan]
        );
        assert!(continuities_with_broken_current(&conn, EntityKind::Dataset)
            .unwrap()
            .is_empty());

        let broken = Uuid::new_v4();
        insert_continuity::<DatasetKind>(&conn, broken, &"broken".to_string()).unwrap();
        let revision = insert_revision(&conn, "tester", "seed").unwrap();
        insert_snapshot::<DatasetKind>(
            &conn,
            broken,
            revision.id,
            &DatasetFields {
                title: "t".to_string(),
                ..DatasetFields::default()
            },
            EntityState::Active,
        )
        .unwrap();
        conn.execute(
            "UPDATE dataset_revisions SET current = 0 WHERE continuity_uuid = ?1;",
            [broken.to_string()],
        )
        .unwrap();

        assert_eq!(
            continuities_with_broken_current(&conn, EntityKind::Dataset).unwrap(),
            vec![broken]
        );
    }
}
