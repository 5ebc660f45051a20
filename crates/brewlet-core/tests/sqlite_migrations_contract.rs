use brewlet_core::sqlite::{current_schema_version, migrations};

#[test]
fn migration_versions_are_dense_from_one() {
    let entries = migrations();
    assert!(!entries.is_empty());

    for (index, entry) in entries.iter().enumerate() {
        assert_eq!(entry.version, index as i64 + 1, "{} is out of sequence", entry.name);
        assert!(!entry.sql.trim().is_empty(), "{} has no sql", entry.name);
    }
    assert_eq!(current_schema_version(), entries.len() as i64);
}

#[test]
fn schema_holds_only_the_settings_table() {
    let names: Vec<_> = migrations().iter().map(|entry| entry.name).collect();
    assert_eq!(names, vec!["app_settings"]);

    let sql = migrations()[0].sql;
    assert!(sql.contains("CREATE TABLE IF NOT EXISTS app_settings"));
    assert!(sql.contains("value TEXT NOT NULL"));
    assert!(!sql.contains("updated_at"));
}
