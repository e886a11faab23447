//! SQLite node store.
//!
//! One `node` table with a self-referencing `parent_id` foreign key. Subtrees
//! are read with a recursive CTE capped at the requested depth and reassembled
//! in memory.

use super::{NodeStore, StoreError, StoreResult, ROOT_OVERVIEW_DEPTH};
use crate::schema::{Depth, NodeRecord, NodeTree};
use rusqlite::{ffi, params, Connection, OptionalExtension, ToSql};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// SQLite-backed node store. The connection is shared behind a mutex.
pub struct SqliteNodeStore {
    conn: Mutex<Connection>,
}

/// One row of a subtree query before reassembly.
struct FlatRow {
    id: Uuid,
    parent_id: Option<Uuid>,
    name: String,
    level: u32,
}

impl SqliteNodeStore {
    /// Open (or create) a database file. `:memory:` opens a private in-memory
    /// database.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if path == Path::new(":memory:") {
            return Self::open_in_memory();
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS node (
                id TEXT PRIMARY KEY NOT NULL,
                parent_id TEXT REFERENCES node(id),
                name TEXT NOT NULL CHECK (length(trim(name)) > 0)
            );

            CREATE INDEX IF NOT EXISTS idx_node_parent ON node(parent_id);
            CREATE INDEX IF NOT EXISTS idx_node_name ON node(name);

            -- Sibling names are unique; roots share the '' parent key.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_node_sibling_name
                ON node(ifnull(parent_id, ''), name);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn insert_record(conn: &Connection, node: &NodeRecord) -> StoreResult<()> {
        if node.parent_id == Some(node.id) {
            return Err(StoreError::MissingParent(node.id));
        }
        conn.execute(
            "INSERT INTO node (id, parent_id, name) VALUES (?1, ?2, ?3)",
            params![
                node.id.to_string(),
                node.parent_id.map(|p| p.to_string()),
                node.name
            ],
        )
        .map_err(|e| classify(e, node))?;
        Ok(())
    }

    /// Id of the node named `name` directly under `parent_id` (a root when
    /// `None`), if one is stored.
    fn find_sibling(
        conn: &Connection,
        parent_id: Option<Uuid>,
        name: &str,
    ) -> StoreResult<Option<Uuid>> {
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM node WHERE ifnull(parent_id, '') = ifnull(?1, '') AND name = ?2",
                params![parent_id.map(|p| p.to_string()), name],
                |row| row.get(0),
            )
            .optional()?;
        id.as_deref().map(parse_id).transpose()
    }

    /// Run a subtree query seeded by `seed` (a `WHERE` clause over `node`).
    /// `?1` is always the depth; further parameters follow it.
    fn fetch_subtrees(
        conn: &Connection,
        seed: &str,
        depth: u32,
        extra: &[&dyn ToSql],
    ) -> StoreResult<Vec<NodeTree>> {
        let sql = format!(
            "WITH RECURSIVE subtree(id, parent_id, name, seq, level) AS (
                 SELECT id, parent_id, name, rowid, 0 FROM node WHERE {seed}
                 UNION ALL
                 SELECT n.id, n.parent_id, n.name, n.rowid, s.level + 1
                 FROM node n JOIN subtree s ON n.parent_id = s.id
                 WHERE s.level < ?1
             )
             SELECT id, parent_id, name, level FROM subtree ORDER BY level, seq"
        );

        let mut bound: Vec<&dyn ToSql> = Vec::with_capacity(1 + extra.len());
        bound.push(&depth);
        bound.extend_from_slice(extra);

        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt
            .query_map(bound.as_slice(), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = Vec::with_capacity(raw.len());
        for (id, parent_id, name, level) in raw {
            rows.push(FlatRow {
                id: parse_id(&id)?,
                parent_id: parent_id.as_deref().map(parse_id).transpose()?,
                name,
                level,
            });
        }

        Ok(assemble(rows))
    }
}

fn parse_id(raw: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Corrupt(format!("bad id '{}': {}", raw, e)))
}

/// Map constraint violations to the store's error kinds.
fn classify(err: rusqlite::Error, node: &NodeRecord) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref failure, _) = err {
        match failure.extended_code {
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY => return StoreError::DuplicateId(node.id),
            ffi::SQLITE_CONSTRAINT_UNIQUE => {
                return StoreError::DuplicateSibling {
                    name: node.name.clone(),
                }
            }
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                if let Some(parent) = node.parent_id {
                    return StoreError::MissingParent(parent);
                }
            }
            _ => {}
        }
    }
    StoreError::Database(err)
}

/// Rebuild trees from rows ordered by (level, insertion). Level-0 rows are
/// the requested nodes.
fn assemble(rows: Vec<FlatRow>) -> Vec<NodeTree> {
    let mut seeds = Vec::new();
    let mut children: HashMap<Uuid, Vec<FlatRow>> = HashMap::new();

    for row in rows {
        match (row.level, row.parent_id) {
            (0, _) | (_, None) => seeds.push(row),
            (_, Some(parent)) => children.entry(parent).or_default().push(row),
        }
    }

    seeds
        .into_iter()
        .map(|seed| attach(seed, &mut children))
        .collect()
}

fn attach(row: FlatRow, children: &mut HashMap<Uuid, Vec<FlatRow>>) -> NodeTree {
    let kids = children.remove(&row.id).unwrap_or_default();
    NodeTree {
        id: row.id,
        parent_id: row.parent_id,
        name: row.name,
        children: kids.into_iter().map(|k| attach(k, children)).collect(),
    }
}

impl NodeStore for SqliteNodeStore {
    fn create(&self, node: &NodeRecord) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        Self::insert_record(&tx, node)?;
        tx.commit()?;
        Ok(())
    }

    fn insert_tree(&self, nodes: &[NodeRecord]) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        // Dropping the transaction on an early return rolls it back.
        let tx = conn.transaction()?;
        // Incoming id -> id of the stored node it merged into.
        let mut merged: HashMap<Uuid, Uuid> = HashMap::new();
        let mut written = 0;
        for node in nodes {
            let parent_id = node
                .parent_id
                .map(|p| merged.get(&p).copied().unwrap_or(p));
            if let Some(existing) = Self::find_sibling(&tx, parent_id, &node.name)? {
                merged.insert(node.id, existing);
                continue;
            }
            let node = NodeRecord {
                id: node.id,
                parent_id,
                name: node.name.clone(),
            };
            Self::insert_record(&tx, &node)?;
            written += 1;
        }
        tx.commit()?;
        Ok(written)
    }

    fn get_by_id(&self, id: Uuid, depth: Depth) -> StoreResult<Option<NodeTree>> {
        let conn = self.lock()?;
        let id = id.to_string();
        let mut trees = Self::fetch_subtrees(&conn, "id = ?2", depth.get(), &[&id])?;
        Ok(trees.pop())
    }

    fn get_by_name(&self, name: &str, depth: Depth) -> StoreResult<Option<NodeTree>> {
        let conn = self.lock()?;
        let mut trees = Self::fetch_subtrees(
            &conn,
            "id = (SELECT id FROM node WHERE name = ?2 ORDER BY rowid LIMIT 1)",
            depth.get(),
            &[&name],
        )?;
        Ok(trees.pop())
    }

    fn get_roots(&self) -> StoreResult<Vec<NodeTree>> {
        let conn = self.lock()?;
        Self::fetch_subtrees(&conn, "parent_id IS NULL", ROOT_OVERVIEW_DEPTH, &[])
    }

    fn count(&self) -> StoreResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM node", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
