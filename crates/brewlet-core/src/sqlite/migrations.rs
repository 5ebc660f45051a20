/// One forward step of the settings schema. Versions start at 1 and are dense.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATIONS: [SqliteMigration; 1] = [SqliteMigration {
    version: 1,
    name: "app_settings",
    sql: r#"
CREATE TABLE IF NOT EXISTS app_settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#,
}];

pub fn migrations() -> &'static [SqliteMigration] {
    &MIGRATIONS
}

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map(|entry| entry.version).unwrap_or(0)
}
