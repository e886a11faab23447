//! Service configuration, read from the environment (after `.env` is loaded).

use anyhow::Result;
use std::path::PathBuf;

use crate::tree_builder::PATH_WIDTH;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_DATABASE_PATH: &str = "org_structure.db";

/// Hierarchy headers, top entity first.
pub const DEFAULT_COLUMNS: [&str; PATH_WIDTH] = ["Entity", "Branch", "Department", "Unit", "Position"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    /// Spreadsheet used for bootstrap and served by the download endpoint.
    pub source_path: Option<PathBuf>,
    pub columns: Vec<String>,
}

impl AppConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = get("ORG_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let database_path = get("ORG_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));
        let source_path = get("ORG_SOURCE_PATH")
            .or_else(|| get("OSB_STRUCT_READER_CSV_PATH"))
            .map(PathBuf::from);

        let columns: Vec<String> = match get("ORG_COLUMNS") {
            Some(raw) => raw.split(',').map(|c| c.trim().to_string()).collect(),
            None => DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
        };
        if columns.len() != PATH_WIDTH || columns.iter().any(|c| c.is_empty()) {
            anyhow::bail!(
                "ORG_COLUMNS must list exactly {} non-empty headers, got {:?}",
                PATH_WIDTH,
                columns
            );
        }

        Ok(Self {
            bind_addr,
            database_path,
            source_path,
            columns,
        })
    }
}
