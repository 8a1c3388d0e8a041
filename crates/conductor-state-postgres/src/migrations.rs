/// Generate SQL migrations for the PostgreSQL store
///
/// Each entity is a row holding its full document in `data` plus the columns
/// the queries filter on. Secondary indexes belong to the index manager; the
/// only ones created here are the unique keys that upserts arbitrate on,
/// under the same names the index catalogue uses.
pub fn generate_migrations() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "20240601000000_initial_schema",
            r#"
        CREATE TABLE IF NOT EXISTS workflows (
            id TEXT PRIMARY KEY,
            workflow_definition_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            status TEXT NOT NULL,
            next_execution BIGINT NULL,
            create_time TIMESTAMPTZ NOT NULL,
            data JSONB NOT NULL
        );

        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            event_name TEXT NOT NULL,
            event_key TEXT NOT NULL,
            event_time TIMESTAMPTZ NOT NULL,
            is_processed BOOLEAN NOT NULL DEFAULT FALSE,
            data JSONB NOT NULL
        );

        -- Lease columns are set and cleared together
        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            event_name TEXT NOT NULL,
            event_key TEXT NOT NULL,
            subscribe_as_of TIMESTAMPTZ NOT NULL,
            lease_token TEXT NULL,
            lease_worker TEXT NULL,
            lease_expiry TIMESTAMPTZ NULL,
            data JSONB NOT NULL,
            CONSTRAINT chk_lease_complete CHECK (
                (lease_token IS NULL AND lease_worker IS NULL AND lease_expiry IS NULL)
                OR (lease_token IS NOT NULL AND lease_worker IS NOT NULL AND lease_expiry IS NOT NULL)
            )
        );

        CREATE TABLE IF NOT EXISTS scheduled_commands (
            command_name TEXT NOT NULL,
            data TEXT NOT NULL,
            execute_time BIGINT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS execution_errors (
            id BIGSERIAL PRIMARY KEY,
            workflow_id TEXT NOT NULL,
            execution_pointer_id TEXT NOT NULL,
            error_time TIMESTAMPTZ NOT NULL,
            message TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS definitions (
            definition_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            data JSONB NOT NULL
        );
        "#,
        ),
        (
            "20240715000000_upsert_keys_and_resources",
            r#"
        CREATE UNIQUE INDEX IF NOT EXISTS unq_definition_id_version
            ON definitions (definition_id, version);

        CREATE TABLE IF NOT EXISTS resources (
            bucket TEXT NOT NULL,
            name TEXT NOT NULL,
            version INTEGER NOT NULL,
            data JSONB NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS unq_resource_bucket_name_version
            ON resources (bucket, name, version);
        "#,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::Collection;

    #[test]
    fn every_collection_has_a_table() {
        let sql: String = generate_migrations().into_iter().map(|(_, sql)| sql).collect();
        for collection in Collection::ALL {
            assert!(
                sql.contains(&format!("CREATE TABLE IF NOT EXISTS {} (", collection.name())),
                "missing table for {}",
                collection
            );
        }
    }

    #[test]
    fn upsert_targets_are_unique_before_index_management_runs() {
        let sql: String = generate_migrations().into_iter().map(|(_, sql)| sql).collect();
        assert!(sql.contains("CREATE UNIQUE INDEX IF NOT EXISTS unq_definition_id_version"));
        assert!(sql.contains("CREATE UNIQUE INDEX IF NOT EXISTS unq_resource_bucket_name_version"));
    }
}
