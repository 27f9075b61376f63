//! Catalog read models and natural-key lookups.
//!
//! # Responsibility
//! - Resolve continuities by natural key (dataset/tag name, link pair).
//! - Materialize read models through `current` snapshots, including the
//!   active tag names of a dataset.
//!
//! # Invariants
//! - Default reads are constrained to `state = 'active'` current snapshots.
//! - Dataset listings are deterministic: `name ASC`.

use crate::model::attachment::AttachmentRecord;
use crate::model::dataset::{DatasetFields, DatasetRecord};
use crate::model::entity::{ContinuityId, EntityKind};
use crate::model::state::EntityState;
use crate::model::tag::{DatasetTagRecord, TagRecord};
use crate::repo::snapshot_repo::parse_continuity_uuid;
use crate::repo::{RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

const DATASETS_DEFAULT_LIMIT: u32 = 20;
const DATASETS_LIMIT_MAX: u32 = 100;

/// Query options for dataset listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetListQuery {
    /// Optional single-tag exact match filter (normalized name).
    pub tag: Option<String>,
    /// Maximum rows to return. Defaults to 20 and clamps to 100.
    pub limit: Option<u32>,
    /// Number of rows to skip.
    pub offset: u32,
}

/// Normalizes the dataset page size according to the catalog contract.
pub fn normalize_dataset_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => DATASETS_DEFAULT_LIMIT,
        Some(value) if value > DATASETS_LIMIT_MAX => DATASETS_LIMIT_MAX,
        Some(value) => value,
    }
}

/// Resolves a dataset continuity by natural key, regardless of state.
pub fn find_dataset_id(conn: &Connection, name: &str) -> RepoResult<Option<ContinuityId>> {
    find_by_name(conn, EntityKind::Dataset, name)
}

/// Resolves a tag continuity by normalized name, regardless of state.
pub fn find_tag_id(conn: &Connection, name: &str) -> RepoResult<Option<ContinuityId>> {
    find_by_name(conn, EntityKind::Tag, name)
}

/// Resolves a dataset-tag link continuity by its endpoint pair.
pub fn find_link_id(
    conn: &Connection,
    dataset_id: ContinuityId,
    tag_id: ContinuityId,
) -> RepoResult<Option<ContinuityId>> {
    let uuid_text: Option<String> = conn
        .query_row(
            "SELECT continuity_uuid FROM dataset_tags
             WHERE dataset_uuid = ?1 AND tag_uuid = ?2;",
            params![dataset_id.to_string(), tag_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    uuid_text
        .map(|value| parse_continuity_uuid(&value, EntityKind::DatasetTag))
        .transpose()
}

/// Resolves an attachment continuity by its owning dataset and ordinal.
pub fn find_attachment_id(
    conn: &Connection,
    dataset_id: ContinuityId,
    ordinal: i64,
) -> RepoResult<Option<ContinuityId>> {
    let uuid_text: Option<String> = conn
        .query_row(
            "SELECT continuity_uuid FROM attachments
             WHERE dataset_uuid = ?1 AND ordinal = ?2;",
            params![dataset_id.to_string(), ordinal],
            |row| row.get(0),
        )
        .optional()?;
    uuid_text
        .map(|value| parse_continuity_uuid(&value, EntityKind::Attachment))
        .transpose()
}

/// Next free ordinal for a dataset's attachment list.
pub fn next_attachment_ordinal(conn: &Connection, dataset_id: ContinuityId) -> RepoResult<i64> {
    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(ordinal), -1) + 1 FROM attachments
         WHERE dataset_uuid = ?1;",
        [dataset_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(next)
}

/// Loads one dataset through its current snapshot.
pub fn get_dataset(
    conn: &Connection,
    name: &str,
    include_deleted: bool,
) -> RepoResult<Option<DatasetRecord>> {
    let mut stmt = conn.prepare(
        "SELECT
            d.continuity_uuid,
            d.name,
            s.title,
            s.notes,
            s.url,
            s.state,
            s.revision_id
         FROM datasets d
         INNER JOIN dataset_revisions s
             ON s.continuity_uuid = d.continuity_uuid AND s.current = 1
         WHERE d.name = ?1
           AND (?2 = 1 OR s.state = 'active');",
    )?;
    let mut rows = stmt.query(params![name, bool_to_int(include_deleted)])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_dataset_row(conn, row)?));
    }
    Ok(None)
}

/// Lists active datasets with optional single-tag filter and pagination.
pub fn list_datasets(
    conn: &Connection,
    query: &DatasetListQuery,
) -> RepoResult<Vec<DatasetRecord>> {
    let mut sql = String::from(
        "SELECT
            d.continuity_uuid,
            d.name,
            s.title,
            s.notes,
            s.url,
            s.state,
            s.revision_id
         FROM datasets d
         INNER JOIN dataset_revisions s
             ON s.continuity_uuid = d.continuity_uuid AND s.current = 1
         WHERE s.state = 'active'",
    );
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(tag) = query.tag.as_ref() {
        sql.push_str(
            " AND EXISTS (
                SELECT 1
                FROM dataset_tags link
                INNER JOIN dataset_tag_revisions ls
                    ON ls.continuity_uuid = link.continuity_uuid
                   AND ls.current = 1
                   AND ls.state = 'active'
                INNER JOIN tags t ON t.continuity_uuid = link.tag_uuid
                WHERE link.dataset_uuid = d.continuity_uuid
                  AND t.name = ?
            )",
        );
        bind_values.push(Value::Text(tag.clone()));
    }

    sql.push_str(" ORDER BY d.name ASC LIMIT ?");
    bind_values.push(Value::Integer(i64::from(normalize_dataset_limit(
        query.limit,
    ))));
    if query.offset > 0 {
        sql.push_str(" OFFSET ?");
        bind_values.push(Value::Integer(i64::from(query.offset)));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut datasets = Vec::new();
    while let Some(row) = rows.next()? {
        datasets.push(parse_dataset_row(conn, row)?);
    }
    Ok(datasets)
}

/// Active tag names linked to one dataset, sorted by name.
pub fn tags_for_dataset(conn: &Connection, dataset_id: ContinuityId) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT t.name
         FROM dataset_tags link
         INNER JOIN dataset_tag_revisions ls
             ON ls.continuity_uuid = link.continuity_uuid
            AND ls.current = 1
            AND ls.state = 'active'
         INNER JOIN tags t ON t.continuity_uuid = link.tag_uuid
         INNER JOIN tag_revisions ts
             ON ts.continuity_uuid = t.continuity_uuid
            AND ts.current = 1
            AND ts.state = 'active'
         WHERE link.dataset_uuid = ?1
         ORDER BY t.name ASC;",
    )?;
    let mut rows = stmt.query([dataset_id.to_string()])?;
    let mut tags = Vec::new();
    while let Some(row) = rows.next()? {
        tags.push(row.get(0)?);
    }
    Ok(tags)
}

/// Loads one tag through its current snapshot.
pub fn get_tag(
    conn: &Connection,
    name: &str,
    include_deleted: bool,
) -> RepoResult<Option<TagRecord>> {
    let mut stmt = conn.prepare(
        "SELECT t.continuity_uuid, t.name, s.state, s.revision_id
         FROM tags t
         INNER JOIN tag_revisions s
             ON s.continuity_uuid = t.continuity_uuid AND s.current = 1
         WHERE t.name = ?1
           AND (?2 = 1 OR s.state = 'active');",
    )?;
    let mut rows = stmt.query(params![name, bool_to_int(include_deleted)])?;
    if let Some(row) = rows.next()? {
        let uuid_text: String = row.get(0)?;
        return Ok(Some(TagRecord {
            continuity_id: parse_continuity_uuid(&uuid_text, EntityKind::Tag)?,
            name: row.get(1)?,
            state: parse_state(row.get::<_, String>(2)?.as_str(), EntityKind::Tag)?,
            revision_id: row.get(3)?,
        }));
    }
    Ok(None)
}

/// All active tag names, sorted.
pub fn list_tags(conn: &Connection) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT t.name
         FROM tags t
         INNER JOIN tag_revisions s
             ON s.continuity_uuid = t.continuity_uuid AND s.current = 1
         WHERE s.state = 'active'
         ORDER BY t.name ASC;",
    )?;
    let mut rows = stmt.query([])?;
    let mut tags = Vec::new();
    while let Some(row) = rows.next()? {
        tags.push(row.get(0)?);
    }
    Ok(tags)
}

/// Link continuities attached to one dataset, optionally active-only.
pub fn links_for_dataset(
    conn: &Connection,
    dataset_id: ContinuityId,
    active_only: bool,
) -> RepoResult<Vec<DatasetTagRecord>> {
    let mut stmt = conn.prepare(
        "SELECT
            link.continuity_uuid,
            link.dataset_uuid,
            link.tag_uuid,
            s.state,
            s.revision_id
         FROM dataset_tags link
         INNER JOIN dataset_tag_revisions s
             ON s.continuity_uuid = link.continuity_uuid AND s.current = 1
         WHERE link.dataset_uuid = ?1
           AND (?2 = 0 OR s.state = 'active')
         ORDER BY link.continuity_uuid ASC;",
    )?;
    let mut rows = stmt.query(params![dataset_id.to_string(), bool_to_int(active_only)])?;
    let mut links = Vec::new();
    while let Some(row) = rows.next()? {
        let link_uuid: String = row.get(0)?;
        let dataset_uuid: String = row.get(1)?;
        let tag_uuid: String = row.get(2)?;
        links.push(DatasetTagRecord {
            continuity_id: parse_continuity_uuid(&link_uuid, EntityKind::DatasetTag)?,
            dataset_id: parse_continuity_uuid(&dataset_uuid, EntityKind::Dataset)?,
            tag_id: parse_continuity_uuid(&tag_uuid, EntityKind::Tag)?,
            state: parse_state(row.get::<_, String>(3)?.as_str(), EntityKind::DatasetTag)?,
            revision_id: row.get(4)?,
        });
    }
    Ok(links)
}

/// Link continuities attached to one tag, optionally active-only.
pub fn links_for_tag(
    conn: &Connection,
    tag_id: ContinuityId,
    active_only: bool,
) -> RepoResult<Vec<DatasetTagRecord>> {
    let mut stmt = conn.prepare(
        "SELECT
            link.continuity_uuid,
            link.dataset_uuid,
            link.tag_uuid,
            s.state,
            s.revision_id
         FROM dataset_tags link
         INNER JOIN dataset_tag_revisions s
             ON s.continuity_uuid = link.continuity_uuid AND s.current = 1
         WHERE link.tag_uuid = ?1
           AND (?2 = 0 OR s.state = 'active')
         ORDER BY link.continuity_uuid ASC;",
    )?;
    let mut rows = stmt.query(params![tag_id.to_string(), bool_to_int(active_only)])?;
    let mut links = Vec::new();
    while let Some(row) = rows.next()? {
        let link_uuid: String = row.get(0)?;
        let dataset_uuid: String = row.get(1)?;
        let tag_uuid: String = row.get(2)?;
        links.push(DatasetTagRecord {
            continuity_id: parse_continuity_uuid(&link_uuid, EntityKind::DatasetTag)?,
            dataset_id: parse_continuity_uuid(&dataset_uuid, EntityKind::Dataset)?,
            tag_id: parse_continuity_uuid(&tag_uuid, EntityKind::Tag)?,
            state: parse_state(row.get::<_, String>(3)?.as_str(), EntityKind::DatasetTag)?,
            revision_id: row.get(4)?,
        });
    }
    Ok(links)
}

/// Attachments of one dataset through their current snapshots.
pub fn attachments_for_dataset(
    conn: &Connection,
    dataset_id: ContinuityId,
    include_deleted: bool,
) -> RepoResult<Vec<AttachmentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT
            a.continuity_uuid,
            a.dataset_uuid,
            a.ordinal,
            s.url,
            s.description,
            s.state,
            s.revision_id
         FROM attachments a
         INNER JOIN attachment_revisions s
             ON s.continuity_uuid = a.continuity_uuid AND s.current = 1
         WHERE a.dataset_uuid = ?1
           AND (?2 = 1 OR s.state = 'active')
         ORDER BY a.ordinal ASC;",
    )?;
    let mut rows = stmt.query(params![dataset_id.to_string(), bool_to_int(include_deleted)])?;
    let mut attachments = Vec::new();
    while let Some(row) = rows.next()? {
        let attachment_uuid: String = row.get(0)?;
        let dataset_uuid: String = row.get(1)?;
        attachments.push(AttachmentRecord {
            continuity_id: parse_continuity_uuid(&attachment_uuid, EntityKind::Attachment)?,
            dataset_id: parse_continuity_uuid(&dataset_uuid, EntityKind::Dataset)?,
            ordinal: row.get(2)?,
            fields: crate::model::attachment::AttachmentFields {
                url: row.get(3)?,
                description: row.get(4)?,
            },
            state: parse_state(row.get::<_, String>(5)?.as_str(), EntityKind::Attachment)?,
            revision_id: row.get(6)?,
        });
    }
    Ok(attachments)
}

fn parse_dataset_row(conn: &Connection, row: &rusqlite::Row<'_>) -> RepoResult<DatasetRecord> {
    let uuid_text: String = row.get(0)?;
    let continuity_id = parse_continuity_uuid(&uuid_text, EntityKind::Dataset)?;
    let tags = tags_for_dataset(conn, continuity_id)?;
    Ok(DatasetRecord {
        continuity_id,
        name: row.get(1)?,
        fields: DatasetFields {
            title: row.get(2)?,
            notes: row.get(3)?,
            url: row.get(4)?,
        },
        state: parse_state(row.get::<_, String>(5)?.as_str(), EntityKind::Dataset)?,
        revision_id: row.get(6)?,
        tags,
    })
}

fn find_by_name(
    conn: &Connection,
    kind: EntityKind,
    name: &str,
) -> RepoResult<Option<ContinuityId>> {
    let uuid_text: Option<String> = conn
        .query_row(
            &format!(
                "SELECT continuity_uuid FROM {} WHERE name = ?1;",
                kind.continuity_table()
            ),
            [name],
            |row| row.get(0),
        )
        .optional()?;
    uuid_text
        .map(|value| parse_continuity_uuid(&value, kind))
        .transpose()
}

fn parse_state(value: &str, kind: EntityKind) -> RepoResult<EntityState> {
    EntityState::parse_db(value).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid state `{value}` in {}.state",
            kind.snapshot_table()
        ))
    })
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_dataset_limit;

    #[test]
    fn dataset_limit_defaults_and_caps() {
        assert_eq!(normalize_dataset_limit(None), 20);
        assert_eq!(normalize_dataset_limit(Some(0)), 20);
        assert_eq!(normalize_dataset_limit(Some(33)), 33);
        assert_eq!(normalize_dataset_limit(Some(999)), 100);
    }
}
