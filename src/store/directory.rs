//! The hierarchical directory store: entries, attributes, users, groups,
//! organizational units, and group membership, with recursive subtree
//! search and operational-attribute computation on read.
//!
//! Built fresh — the teacher has no database of its own — grounded in the
//! EAV/store shape implied by the `sql2ldap` reference's column-mapped SQL
//! generation and in the teacher's `errors.rs` taxonomy for surfacing
//! storage faults.

use crate::dn::{dn_eq, parent_dn};
use crate::errors::{HeraclesError, Result};
use crate::filter::{self, Filter};
use crate::store::attributes;
use crate::store::models::{is_protected_attribute, Entry, NewEntry, ObjectKind};
use crate::store::pool::SqlitePool;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::instrument;

/// Bound on recursive subtree traversal depth, defusing any accidental
/// cycle introduced by edits (§4.9, §8).
const MAX_SUBTREE_DEPTH: i64 = 100;

/// A fully-formed update to apply to an existing entry (the handler has
/// already applied add/delete/replace semantics in memory and resolved
/// password processing; the store only persists the result).
#[derive(Debug, Clone, Default)]
pub struct EntryUpdate {
    /// The complete new attribute map, excluding `userPassword`.
    pub attributes: HashMap<String, Vec<String>>,
    /// `Some(new hash)` when this Modify touched `userPassword`.
    pub new_password_hash: Option<String>,
}

/// The hierarchical directory store.
pub struct DirectoryStore {
    pool: SqlitePool,
}

impl DirectoryStore {
    /// Wraps an already-built connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn get_entry(&self, dn: &str) -> Result<Option<Entry>> {
        let conn = self.pool.get().await.map_err(|e| HeraclesError::Pool(e.to_string()))?;
        let dn = dn.to_string();
        tokio::task::spawn_blocking(move || get_entry_blocking(&conn, &dn))
            .await
            .map_err(|e| HeraclesError::Internal(e.to_string()))?
    }

    #[instrument(skip(self))]
    pub async fn entry_exists(&self, dn: &str) -> Result<bool> {
        Ok(self.get_entry(dn).await?.is_some())
    }

    #[instrument(skip(self, new_entry), fields(dn = %new_entry.dn))]
    pub async fn create_entry(&self, new_entry: NewEntry) -> Result<Entry> {
        validate_new_entry(&new_entry)?;

        let mut conn = self.pool.get().await.map_err(|e| HeraclesError::Pool(e.to_string()))?;
        tokio::task::spawn_blocking(move || create_entry_blocking(&mut conn, new_entry))
            .await
            .map_err(|e| HeraclesError::Internal(e.to_string()))?
    }

    #[instrument(skip(self, update))]
    pub async fn update_entry(&self, dn: &str, update: EntryUpdate) -> Result<Entry> {
        let mut conn = self.pool.get().await.map_err(|e| HeraclesError::Pool(e.to_string()))?;
        let dn = dn.to_string();
        tokio::task::spawn_blocking(move || update_entry_blocking(&mut conn, &dn, update))
            .await
            .map_err(|e| HeraclesError::Internal(e.to_string()))?
    }

    #[instrument(skip(self))]
    pub async fn delete_entry(&self, dn: &str) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(|e| HeraclesError::Pool(e.to_string()))?;
        let dn = dn.to_string();
        tokio::task::spawn_blocking(move || delete_entry_blocking(&mut conn, &dn))
            .await
            .map_err(|e| HeraclesError::Internal(e.to_string()))?
    }

    #[instrument(skip(self, filter))]
    pub async fn search_entries(&self, base_dn: &str, filter: &Filter) -> Result<Vec<Entry>> {
        let conn = self.pool.get().await.map_err(|e| HeraclesError::Pool(e.to_string()))?;
        let base_dn = base_dn.to_string();
        let filter = filter.clone();
        tokio::task::spawn_blocking(move || search_entries_blocking(&conn, &base_dn, &filter))
            .await
            .map_err(|e| HeraclesError::Internal(e.to_string()))?
    }

    #[instrument(skip(self))]
    pub async fn get_children(&self, dn: &str) -> Result<Vec<Entry>> {
        let conn = self.pool.get().await.map_err(|e| HeraclesError::Pool(e.to_string()))?;
        let dn = dn.to_string();
        tokio::task::spawn_blocking(move || get_children_blocking(&conn, &dn))
            .await
            .map_err(|e| HeraclesError::Internal(e.to_string()))?
    }

    #[instrument(skip(self))]
    pub async fn get_all_entries(&self) -> Result<Vec<Entry>> {
        let conn = self.pool.get().await.map_err(|e| HeraclesError::Pool(e.to_string()))?;
        tokio::task::spawn_blocking(move || {
            let rows = query_entry_rows(&conn, "SELECT id, dn, parent_dn, object_class, created_at, updated_at FROM entries", [])?;
            hydrate_rows(&conn, rows)
        })
        .await
        .map_err(|e| HeraclesError::Internal(e.to_string()))?
    }

    /// Returns `(password_hash, canonical_dn)` for `uid`. This is the only
    /// code path that may return the hash.
    #[instrument(skip(self))]
    pub async fn get_user_password_hash(&self, uid: &str) -> Result<(String, String)> {
        let conn = self.pool.get().await.map_err(|e| HeraclesError::Pool(e.to_string()))?;
        let uid = uid.to_string();
        tokio::task::spawn_blocking(move || {
            conn.query_row(
                "SELECT u.password_hash, e.dn \
                 FROM users u \
                 JOIN entries e ON e.id = u.entry_id \
                 JOIN attributes a ON a.entry_id = e.id \
                 WHERE lower(a.name) = 'uid' AND lower(a.value) = lower(?1) \
                 LIMIT 1",
                params![uid],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(HeraclesError::from)?
            .ok_or_else(|| HeraclesError::NotFound(format!("no such uid: {uid}")))
        })
        .await
        .map_err(|e| HeraclesError::Internal(e.to_string()))?
    }
}

fn validate_new_entry(new_entry: &NewEntry) -> Result<()> {
    if new_entry.dn.is_empty() {
        return Err(HeraclesError::ObjectClassViolation("dn must not be empty".into()));
    }
    if new_entry.object_class.is_empty() {
        return Err(HeraclesError::ObjectClassViolation(
            "objectClass must not be empty".into(),
        ));
    }
    let kind = ObjectKind::from_object_class(&new_entry.object_class).ok_or_else(|| {
        HeraclesError::ObjectClassViolation(format!(
            "unsupported primary object class: {}",
            new_entry.object_class
        ))
    })?;
    for required in kind.required_attributes() {
        let present = new_entry
            .attributes
            .iter()
            .any(|(name, values)| name.eq_ignore_ascii_case(required) && !values.is_empty());
        if !present {
            return Err(HeraclesError::ObjectClassViolation(format!(
                "missing required attribute: {required}"
            )));
        }
    }
    Ok(())
}

struct EntryRow {
    id: i64,
    dn: String,
    parent_dn: String,
    object_class: String,
    created_at: String,
    updated_at: String,
}

fn query_entry_rows(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<EntryRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(EntryRow {
                id: row.get(0)?,
                dn: row.get(1)?,
                parent_dn: row.get(2)?,
                object_class: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn get_entry_blocking(conn: &Connection, dn: &str) -> Result<Option<Entry>> {
    let rows = query_entry_rows(
        conn,
        "SELECT id, dn, parent_dn, object_class, created_at, updated_at FROM entries WHERE lower(dn) = lower(?1)",
        params![dn],
    )?;
    Ok(hydrate_rows(conn, rows)?.into_iter().next())
}

fn get_children_blocking(conn: &Connection, dn: &str) -> Result<Vec<Entry>> {
    let rows = query_entry_rows(
        conn,
        "SELECT id, dn, parent_dn, object_class, created_at, updated_at FROM entries WHERE lower(parent_dn) = lower(?1)",
        params![dn],
    )?;
    hydrate_rows(conn, rows)
}

fn search_entries_blocking(conn: &Connection, base_dn: &str, filter: &Filter) -> Result<Vec<Entry>> {
    let compiled = filter::try_compile(filter);
    let (predicate, predicate_values) = compiled
        .clone()
        .unwrap_or_else(|| ("1=1".to_string(), vec![]));

    let sql = format!(
        "WITH RECURSIVE subtree(id, dn, depth) AS ( \
            SELECT id, dn, 0 FROM entries WHERE lower(dn) = lower(?1) \
            UNION ALL \
            SELECT e.id, e.dn, s.depth + 1 \
            FROM entries e JOIN subtree s ON lower(e.parent_dn) = lower(s.dn) \
            WHERE s.depth < {MAX_SUBTREE_DEPTH} \
         ) \
         SELECT entries.id, entries.dn, entries.parent_dn, entries.object_class, \
                entries.created_at, entries.updated_at \
         FROM entries JOIN subtree ON entries.id = subtree.id \
         WHERE {predicate}"
    );

    let mut bind_values: Vec<rusqlite::types::Value> =
        vec![rusqlite::types::Value::Text(base_dn.to_string())];
    bind_values.extend(
        predicate_values
            .into_iter()
            .map(rusqlite::types::Value::Text),
    );

    let rows = query_entry_rows(conn, &sql, params_from_iter(bind_values))?;
    let entries = hydrate_rows(conn, rows)?;

    if compiled.is_some() {
        Ok(entries)
    } else {
        Ok(entries
            .into_iter()
            .filter(|entry| filter::matches(filter, entry))
            .collect())
    }
}

fn create_entry_blocking(conn: &mut Connection, new_entry: NewEntry) -> Result<Entry> {
    let kind = ObjectKind::from_object_class(&new_entry.object_class)
        .expect("validated by validate_new_entry");
    let now = now_rfc3339();

    let tx = conn.transaction()?;

    if entry_id_by_dn(&tx, &new_entry.dn)?.is_some() {
        return Err(HeraclesError::AlreadyExists(new_entry.dn.clone()));
    }

    tx.execute(
        "INSERT INTO entries (dn, parent_dn, object_class, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![new_entry.dn, new_entry.parent_dn, new_entry.object_class, now],
    )?;
    let entry_id = tx.last_insert_rowid();

    let mut password_hash: Option<&str> = None;
    for (name, values) in &new_entry.attributes {
        if name.eq_ignore_ascii_case("userPassword") {
            password_hash = values.first().map(|s| s.as_str());
            continue;
        }
        for value in values {
            tx.execute(
                "INSERT INTO attributes (entry_id, name, value) VALUES (?1, ?2, ?3)",
                params![entry_id, name, value],
            )?;
        }
    }

    match kind {
        ObjectKind::OrganizationalUnit => {
            tx.execute("INSERT INTO organizational_units (entry_id) VALUES (?1)", params![entry_id])?;
        }
        ObjectKind::GroupOfNames => {
            tx.execute("INSERT INTO groups (entry_id) VALUES (?1)", params![entry_id])?;
            sync_group_members(&tx, entry_id, &new_entry.attributes)?;
        }
        ObjectKind::InetOrgPerson => {
            let hash = password_hash.ok_or_else(|| {
                HeraclesError::ConstraintViolation("inetOrgPerson requires userPassword".into())
            })?;
            tx.execute(
                "INSERT INTO users (entry_id, password_hash) VALUES (?1, ?2)",
                params![entry_id, hash],
            )?;
        }
    }

    tx.commit()?;

    get_entry_blocking(conn, &new_entry.dn)?
        .ok_or_else(|| HeraclesError::Internal("entry vanished after insert".into()))
}

fn update_entry_blocking(conn: &mut Connection, dn: &str, update: EntryUpdate) -> Result<Entry> {
    let tx = conn.transaction()?;

    let entry_id = entry_id_by_dn(&tx, dn)?.ok_or_else(|| HeraclesError::NotFound(dn.to_string()))?;
    let now = now_rfc3339();

    let object_class: String = tx.query_row(
        "SELECT object_class FROM entries WHERE id = ?1",
        params![entry_id],
        |row| row.get(0),
    )?;

    tx.execute("UPDATE entries SET updated_at = ?1 WHERE id = ?2", params![now, entry_id])?;
    tx.execute("DELETE FROM attributes WHERE entry_id = ?1", params![entry_id])?;

    for (name, values) in &update.attributes {
        if name.eq_ignore_ascii_case("userPassword") {
            continue;
        }
        for value in values {
            tx.execute(
                "INSERT INTO attributes (entry_id, name, value) VALUES (?1, ?2, ?3)",
                params![entry_id, name, value],
            )?;
        }
    }

    if object_class.eq_ignore_ascii_case("groupOfNames") {
        tx.execute("DELETE FROM group_members WHERE group_entry_id = ?1", params![entry_id])?;
        sync_group_members(&tx, entry_id, &update.attributes)?;
    }

    if let Some(hash) = &update.new_password_hash {
        let affected = tx.execute(
            "UPDATE users SET password_hash = ?1 WHERE entry_id = ?2",
            params![hash, entry_id],
        )?;
        if affected == 0 {
            return Err(HeraclesError::ConstraintViolation(
                "userPassword can only be set on inetOrgPerson entries".into(),
            ));
        }
    }

    tx.commit()?;

    get_entry_blocking(conn, dn)?.ok_or_else(|| HeraclesError::Internal("entry vanished after update".into()))
}

fn delete_entry_blocking(conn: &mut Connection, dn: &str) -> Result<()> {
    let tx = conn.transaction()?;

    let entry_id = entry_id_by_dn(&tx, dn)?.ok_or_else(|| HeraclesError::NotFound(dn.to_string()))?;

    let child_count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM entries WHERE lower(parent_dn) = lower(?1)",
        params![dn],
        |row| row.get(0),
    )?;
    if child_count > 0 {
        return Err(HeraclesError::NotAllowedOnNonLeaf(dn.to_string()));
    }

    tx.execute("DELETE FROM entries WHERE id = ?1", params![entry_id])?;
    tx.commit()?;
    Ok(())
}

/// Populates `group_members` rows from a group entry's `member` attribute
/// values, so reverse `memberOf` lookups stay in sync with the forward
/// DN-valued attribute without requiring a client to maintain both.
fn sync_group_members(
    tx: &rusqlite::Transaction,
    group_entry_id: i64,
    attributes: &HashMap<String, Vec<String>>,
) -> Result<()> {
    let members = attributes
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("member"))
        .map(|(_, values)| values.as_slice())
        .unwrap_or(&[]);

    for member_dn in members {
        let member_id = entry_id_by_dn(tx, member_dn)?.ok_or_else(|| {
            HeraclesError::ConstraintViolation(format!("member refers to unknown entry: {member_dn}"))
        })?;
        tx.execute(
            "INSERT OR IGNORE INTO group_members (group_entry_id, member_entry_id) VALUES (?1, ?2)",
            params![group_entry_id, member_id],
        )?;
    }
    Ok(())
}

fn entry_id_by_dn(conn: &Connection, dn: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM entries WHERE lower(dn) = lower(?1)",
        params![dn],
        |row| row.get(0),
    )
    .optional()
    .map_err(HeraclesError::from)
}

/// Attaches attribute rows and computed operational attributes, turning
/// `EntryRow`s into fully hydrated `Entry`s.
fn hydrate_rows(conn: &Connection, rows: Vec<EntryRow>) -> Result<Vec<Entry>> {
    let mut entries = Vec::with_capacity(rows.len());

    for row in rows {
        let json: Option<String> = conn
            .query_row(
                "SELECT json_group_array(json_object('name', name, 'value', value)) \
                 FROM attributes WHERE entry_id = ?1",
                params![row.id],
                |r| r.get(0),
            )
            .optional()?
            .flatten();

        let mut attrs = attributes::decode(json.as_deref())?;

        attrs.insert("objectclass".to_string(), vec![row.object_class.clone()]);
        attrs.insert(
            "createtimestamp".to_string(),
            vec![to_generalized_time(&row.created_at)],
        );
        attrs.insert(
            "modifytimestamp".to_string(),
            vec![to_generalized_time(&row.updated_at)],
        );

        if row.object_class.eq_ignore_ascii_case("inetOrgPerson") {
            let member_of = member_of_groups(conn, row.id)?;
            if !member_of.is_empty() {
                attrs.insert("memberof".to_string(), member_of);
            }
        }

        entries.push(Entry {
            id: row.id,
            dn: row.dn,
            parent_dn: row.parent_dn,
            object_class: row.object_class,
            created_at: row.created_at,
            updated_at: row.updated_at,
            attributes: attrs,
        });
    }

    Ok(entries)
}

fn member_of_groups(conn: &Connection, member_entry_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT g.dn FROM group_members gm JOIN entries g ON g.id = gm.group_entry_id \
         WHERE gm.member_entry_id = ?1 ORDER BY g.dn",
    )?;
    let dns = stmt
        .query_map(params![member_entry_id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(dns)
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .expect("Rfc3339 formatting never fails for now_utc()")
}

/// Reformats an RFC 3339 UTC instant into LDAP generalized time
/// (`YYYYMMDDHHMMSSZ`). `now_rfc3339` may emit fractional seconds, so only
/// the first 14 digits (date + time, no fraction) are kept before the
/// trailing `Z`.
fn to_generalized_time(rfc3339: &str) -> String {
    let digits: String = rfc3339.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("{}Z", &digits[..digits.len().min(14)])
}

/// Derives the parent DN a new entry should be stored under.
pub fn derive_parent_dn(dn: &str) -> String {
    parent_dn(dn)
}

/// Whether `candidate` sits directly under `base` (single-level scope).
pub fn is_direct_child(candidate_parent_dn: &str, base: &str) -> bool {
    dn_eq(candidate_parent_dn, base)
}

/// Guards a requested attribute name against the protected-operational set.
pub fn reject_if_protected(attr: &str) -> Result<()> {
    if is_protected_attribute(attr) {
        return Err(HeraclesError::UnwillingToPerform(format!(
            "{attr} is a protected operational attribute"
        )));
    }
    Ok(())
}
