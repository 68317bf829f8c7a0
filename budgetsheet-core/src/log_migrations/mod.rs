//! Event log migrations
//!
//! Each migration is a tuple of (name, sql_content), applied in order.
//! `000_migrations` bootstraps the bookkeeping table and is always first.
//!
//! When adding a migration, append an entry with the next number. Never edit
//! one that has shipped.

pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations", MIGRATIONS_TABLE),
    ("001_operation_log", OPERATION_LOG),
];

const MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sys_migrations (
    migration_name VARCHAR PRIMARY KEY,
    applied_at TIMESTAMP DEFAULT current_timestamp
);
"#;

const OPERATION_LOG: &str = r#"
CREATE TABLE IF NOT EXISTS sys_logs (
    id UBIGINT PRIMARY KEY,
    timestamp BIGINT NOT NULL,
    entry_point VARCHAR NOT NULL,
    app_version VARCHAR NOT NULL,
    platform VARCHAR NOT NULL,
    event VARCHAR NOT NULL,
    operation VARCHAR,
    table_name VARCHAR,
    error_kind VARCHAR,
    error_message VARCHAR
);

CREATE INDEX IF NOT EXISTS idx_sys_logs_timestamp ON sys_logs (timestamp);
"#;
