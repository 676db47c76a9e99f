use ::duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_bar_tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS bars_day (
    code TEXT NOT NULL,
    date BIGINT NOT NULL,
    open DOUBLE NOT NULL,
    high DOUBLE NOT NULL,
    low DOUBLE NOT NULL,
    close DOUBLE NOT NULL,
    volume BIGINT NOT NULL,
    value BIGINT NOT NULL,
    market_cap BIGINT,
    diff_rate DOUBLE,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(code, date)
);

CREATE TABLE IF NOT EXISTS bars_1min (
    code TEXT NOT NULL,
    date BIGINT NOT NULL,
    open DOUBLE NOT NULL,
    high DOUBLE NOT NULL,
    low DOUBLE NOT NULL,
    close DOUBLE NOT NULL,
    volume BIGINT NOT NULL,
    value BIGINT NOT NULL,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(code, date)
);

CREATE TABLE IF NOT EXISTS bars_week (
    code TEXT NOT NULL,
    date BIGINT NOT NULL,
    open DOUBLE NOT NULL,
    high DOUBLE NOT NULL,
    low DOUBLE NOT NULL,
    close DOUBLE NOT NULL,
    volume BIGINT NOT NULL,
    value BIGINT NOT NULL,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(code, date)
);

CREATE TABLE IF NOT EXISTS bars_month (
    code TEXT NOT NULL,
    date BIGINT NOT NULL,
    open DOUBLE NOT NULL,
    high DOUBLE NOT NULL,
    low DOUBLE NOT NULL,
    close DOUBLE NOT NULL,
    volume BIGINT NOT NULL,
    value BIGINT NOT NULL,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(code, date)
);
"#,
    },
    Migration {
        version: "0002_catalog",
        sql: r#"
CREATE TABLE IF NOT EXISTS catalog (
    stock_code TEXT PRIMARY KEY,
    stock_name TEXT NOT NULL,
    market_kind BIGINT NOT NULL,
    stock_status BIGINT NOT NULL,
    date BIGINT NOT NULL,
    day_synced BIGINT,
    min_synced BIGINT,
    week_synced BIGINT,
    month_synced BIGINT,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
    Migration {
        version: "0003_validation",
        sql: r#"
CREATE TABLE IF NOT EXISTS validation_issues (
    dataset TEXT NOT NULL,
    collection TEXT NOT NULL,
    date BIGINT NOT NULL,
    time BIGINT,
    issue_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    description TEXT NOT NULL,
    recorded_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS validation_progress (
    dataset TEXT PRIMARY KEY,
    last_code TEXT NOT NULL,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
    Migration {
        version: "0004_sync_log",
        sql: r#"
CREATE TABLE IF NOT EXISTS sync_log (
    run_id TEXT NOT NULL,
    code TEXT NOT NULL,
    dataset TEXT NOT NULL,
    status TEXT NOT NULL,
    rows BIGINT NOT NULL,
    timestamp TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
    Migration {
        version: "0005_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_bars_day_date ON bars_day(date);
CREATE INDEX IF NOT EXISTS idx_bars_1min_date ON bars_1min(date);
CREATE INDEX IF NOT EXISTS idx_validation_issues_series ON validation_issues(dataset, collection, date);
CREATE INDEX IF NOT EXISTS idx_sync_log_run ON sync_log(run_id, dataset);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let query = format!(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = '{}'",
            escape_sql_string(migration.version)
        );
        let applied_count: i64 = connection.query_row(query.as_str(), [], |row| row.get(0))?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            let insert = format!(
                "INSERT INTO schema_migrations (version) VALUES ('{}')",
                escape_sql_string(migration.version)
            );
            connection.execute_batch(insert.as_str())?;
        }
    }

    Ok(())
}

fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}
