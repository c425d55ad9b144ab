/// SQLite persistence layer for funnel definitions
///
/// The graph itself is stored as JSON; name, editor schema version, and
/// node count are lifted into columns so listings never decode graph
/// bodies. Validation happens at compile time in the registry, not here.

use crate::funnel::types::FunnelDefinition;
use anyhow::Result;
use sqlx::{sqlite::SqlitePool, Row};
use std::collections::HashMap;

/// SQLite-based funnel definition storage
#[derive(Debug, Clone)]
pub struct FunnelStorage {
    pool: SqlitePool,
}

impl FunnelStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the funnels schema; safe to call repeatedly
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS funnels (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                schema_version INTEGER NOT NULL DEFAULT 1,
                node_count INTEGER NOT NULL DEFAULT 0,
                definition JSON NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_funnels_name
            ON funnels(name)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a new funnel or update an existing one (UPSERT)
    pub async fn save_funnel(&self, funnel: &FunnelDefinition) -> Result<()> {
        let definition_json = serde_json::to_string(funnel)?;

        sqlx::query(
            r#"
            INSERT INTO funnels (id, name, schema_version, node_count, definition, updated_at)
            VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                schema_version = excluded.schema_version,
                node_count = excluded.node_count,
                definition = excluded.definition,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&funnel.id)
        .bind(&funnel.name)
        .bind(funnel.schema_version as i64)
        .bind(funnel.nodes.len() as i64)
        .bind(&definition_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieve a funnel definition by ID
    pub async fn get_funnel(&self, id: &str) -> Result<Option<FunnelDefinition>> {
        let definition: Option<String> =
            sqlx::query_scalar("SELECT definition FROM funnels WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        definition
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(Into::into)
    }

    /// List all funnels with their editor-facing metadata
    pub async fn list_funnels(&self) -> Result<Vec<FunnelMetadata>> {
        let rows = sqlx::query(
            "SELECT id, name, schema_version, node_count, created_at, updated_at
             FROM funnels ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut funnels = Vec::new();
        for row in rows {
            funnels.push(FunnelMetadata {
                id: row.get("id"),
                name: row.get("name"),
                schema_version: row.get::<i64, _>("schema_version") as u32,
                node_count: row.get::<i64, _>("node_count") as usize,
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            });
        }

        Ok(funnels)
    }

    /// Load all funnels for registry initialization
    pub async fn load_all_funnels(&self) -> Result<HashMap<String, FunnelDefinition>> {
        let rows = sqlx::query("SELECT id, definition FROM funnels")
            .fetch_all(&self.pool)
            .await?;

        let mut funnels = HashMap::new();
        for row in rows {
            let id: String = row.get("id");
            let definition_json: String = row.get("definition");
            let funnel: FunnelDefinition = serde_json::from_str(&definition_json)?;
            funnels.insert(id, funnel);
        }

        Ok(funnels)
    }

    /// Delete a funnel by ID
    pub async fn delete_funnel(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM funnels WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Funnel metadata for listing operations, served without decoding the
/// stored graph JSON
#[derive(Debug, serde::Serialize)]
pub struct FunnelMetadata {
    pub id: String,
    pub name: String,
    pub schema_version: u32,
    pub node_count: usize,
    pub created_at: String,
    pub updated_at: String,
}
