use async_trait::async_trait;
use sqlx::Row;
use tracing::{debug, info};

use conductor_core::{
    domain::indexes::{LegacyIndex, LEGACY_INDEXES, REQUIRED_INDEXES},
    Collection, CoreError, IndexDescriptor, IndexManager, IndexSpec,
};

use crate::error::{is_already_exists, map_sqlx_err};
use crate::PostgresConnection;

/// `CREATE INDEX IF NOT EXISTS` for one catalogue entry
pub(crate) fn create_index_sql(spec: &IndexSpec) -> String {
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        if spec.unique { "UNIQUE " } else { "" },
        spec.name,
        spec.collection.name(),
        spec.keys.join(", ")
    )
}

/// `DROP INDEX IF EXISTS` for one legacy name
pub(crate) fn drop_index_sql(legacy: &LegacyIndex) -> String {
    format!("DROP INDEX IF EXISTS {}", legacy.name)
}

const LIST_INDEXES_SQL: &str = r#"
    SELECT
        t.relname::text AS table_name,
        i.relname::text AS index_name,
        ix.indisunique AS is_unique,
        ARRAY(
            SELECT a.attname::text
            FROM unnest(ix.indkey::smallint[]) WITH ORDINALITY AS k(attnum, ord)
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
            ORDER BY k.ord
        ) AS columns
    FROM pg_index ix
    JOIN pg_class t ON t.oid = ix.indrelid
    JOIN pg_class i ON i.oid = ix.indexrelid
    JOIN pg_namespace n ON n.oid = t.relnamespace
    WHERE n.nspname = current_schema()
      AND t.relname = ANY($1)
      AND NOT ix.indisprimary
"#;

/// Index manager issuing DDL against the current schema
#[derive(Clone)]
pub struct PostgresIndexManager {
    conn: PostgresConnection,
}

impl PostgresIndexManager {
    /// Create a new Postgres index manager
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }

    async fn execute_ddl(&self, sql: &str) -> Result<(), CoreError> {
        match sqlx::query(sql).execute(self.conn.pool()).await {
            Ok(_) => Ok(()),
            Err(e) if is_already_exists(&e) => {
                debug!(sql, "Index created concurrently by another node");
                Ok(())
            }
            Err(e) => Err(map_sqlx_err("Index DDL failed", e)),
        }
    }
}

#[async_trait]
impl IndexManager for PostgresIndexManager {
    async fn ensure_indexes(&self) -> Result<(), CoreError> {
        for legacy in LEGACY_INDEXES {
            self.execute_ddl(&drop_index_sql(legacy)).await?;
        }
        for spec in REQUIRED_INDEXES {
            self.execute_ddl(&create_index_sql(spec)).await?;
        }
        info!(count = REQUIRED_INDEXES.len(), "Indexes ensured");
        Ok(())
    }

    async fn list_indexes(&self) -> Result<Vec<IndexDescriptor>, CoreError> {
        let tables: Vec<String> = Collection::ALL
            .iter()
            .map(|collection| collection.name().to_string())
            .collect();

        let rows = sqlx::query(LIST_INDEXES_SQL)
            .bind(&tables)
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to list indexes", e))?;

        let mut listed = rows
            .iter()
            .map(|row| -> Result<IndexDescriptor, sqlx::Error> {
                Ok(IndexDescriptor {
                    collection: row.try_get("table_name")?,
                    name: row.try_get("index_name")?,
                    keys: row.try_get("columns")?,
                    unique: row.try_get("is_unique")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_err("Failed to decode index row", e))?;
        listed.sort();
        Ok(listed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_definition_index_sql() {
        let spec = REQUIRED_INDEXES
            .iter()
            .find(|spec| spec.name == "unq_definition_id_version")
            .unwrap();
        assert_eq!(
            create_index_sql(spec),
            "CREATE UNIQUE INDEX IF NOT EXISTS unq_definition_id_version ON definitions (definition_id, version)"
        );
    }

    #[test]
    fn compound_event_index_keeps_key_order() {
        let spec = REQUIRED_INDEXES
            .iter()
            .find(|spec| spec.name == "idx_event_namekey")
            .unwrap();
        assert_eq!(
            create_index_sql(spec),
            "CREATE INDEX IF NOT EXISTS idx_event_namekey ON events (event_name, event_key, event_time)"
        );
    }

    #[test]
    fn legacy_drops_tolerate_absence() {
        for legacy in LEGACY_INDEXES {
            assert!(drop_index_sql(legacy).starts_with("DROP INDEX IF EXISTS "));
        }
    }
}
