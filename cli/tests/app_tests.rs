use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use switchyard_cli::{parse_rename, App, Backend, SwitchyardConfig};
use switchyard_dal::{DalError, DalFactory, DataAdapter, RelationalAdapter};
use switchyard_flags::{FlagConfig, FlagStore};
use switchyard_migrate::RestoreOptions;
use switchyard_model::{FieldType, Filter, Record};
use tempfile::TempDir;

fn record(value: serde_json::Value) -> Record {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn flag_store(dir: &TempDir) -> Arc<FlagStore> {
    let config = FlagConfig {
        path: dir.path().join("flags.json"),
        ..Default::default()
    };
    Arc::new(FlagStore::with_env(config, Arc::new(|_: &str| None)).unwrap())
}

/// Two in-memory databases, one standing in for the spreadsheet side.
fn app_with(dir: &TempDir, config: SwitchyardConfig) -> (App, Arc<RelationalAdapter>, Arc<RelationalAdapter>) {
    let sheet = Arc::new(RelationalAdapter::open_in_memory().unwrap());
    let db = Arc::new(RelationalAdapter::open_in_memory().unwrap());
    let factory = DalFactory::new(
        flag_store(dir),
        Ok(db.clone() as Arc<dyn DataAdapter>),
        Ok(sheet.clone() as Arc<dyn DataAdapter>),
    );
    (App::with_factory(config, factory), sheet, db)
}

// ── Configuration ────────────────────────────────────────────────

#[test]
fn config_sections_are_optional() {
    let config = SwitchyardConfig::from_toml("").unwrap();

    assert_eq!(config.dal.spreadsheet.cache_ttl_secs, 300);
    assert_eq!(config.migration.options.batch_size, 100);
    assert_eq!(config.backup.retention, 10);
    assert!(config.migration.tables.is_empty());
}

#[test]
fn config_parses_every_section() {
    let config = SwitchyardConfig::from_toml(
        r#"
        [dal.google]
        spreadsheet_id = "sheet-123"
        access_token = "token"

        [dal.spreadsheet]
        chunk_size = 25

        [dal.relational]
        path = ":memory:"

        [flags]
        path = "state/flags.json"
        modes = ["production"]

        [migration]
        dry_run = true
        batch_size = 20
        error_log_dir = "logs"

        [[migration.tables]]
        source = "Policies 2024"
        destination = "policies"

        [[migration.tables]]
        source = "claims"

        [migration.rules.policies]
        required_fields = ["name"]
        field_types = { rate = "number" }

        [backup]
        dir = "snapshots"
        retention = 3
        compress = true
        "#,
    )
    .unwrap();

    assert_eq!(config.dal.google.spreadsheet_id, "sheet-123");
    assert_eq!(config.dal.spreadsheet.chunk_size, 25);
    assert_eq!(config.dal.relational.path, ":memory:");
    assert_eq!(config.flags.modes, vec!["production".to_string()]);
    assert!(config.migration.options.dry_run);
    assert_eq!(config.migration.options.batch_size, 20);
    assert_eq!(config.migration.options.row_delay_ms, 100);
    assert_eq!(config.migration.tables.len(), 2);
    assert_eq!(config.migration.tables[1].destination, None);
    let rules = config.migration.rules.get("policies").unwrap();
    assert_eq!(rules.field_types["rate"], FieldType::Number);
    assert_eq!(config.backup.retention, 3);
}

#[test]
fn missing_config_file_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let config = SwitchyardConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.backup.retention, 10);
}

#[test]
fn broken_config_file_names_the_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("switchyard.toml");
    std::fs::write(&path, "[backup\nretention = ").unwrap();

    let err = SwitchyardConfig::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("switchyard.toml"));
}

#[test]
fn rename_arguments_need_both_sides() {
    assert_eq!(
        parse_rename("Policies 2024=policies"),
        Ok(("Policies 2024".to_string(), "policies".to_string()))
    );
    assert!(parse_rename("policies").is_err());
    assert!(parse_rename("=policies").is_err());
}

// ── Flags and status ─────────────────────────────────────────────

#[test]
fn open_without_credentials_leaves_only_relational() {
    let dir = TempDir::new().unwrap();
    let mut config = SwitchyardConfig::default();
    config.flags.path = dir.path().join("flags.json");
    config.dal.relational.path = ":memory:".to_string();

    let app = App::open(config).unwrap();
    let status = app.status();

    assert!(status.relational_available);
    assert!(!status.spreadsheet_available);
}

#[test]
fn flags_round_trip_through_the_app() {
    let dir = TempDir::new().unwrap();
    let (app, _, _) = app_with(&dir, SwitchyardConfig::default());

    app.set_flag("production:policies", true).unwrap();

    assert_eq!(app.flags().get("production:policies"), Some(&true));
    assert_eq!(app.reload_flags().unwrap().get("production:policies"), Some(&true));
}

// ── Migration ────────────────────────────────────────────────────

#[tokio::test]
async fn migrate_runs_the_configured_tables() {
    let dir = TempDir::new().unwrap();
    let config = SwitchyardConfig::from_toml(&format!(
        r#"
        [migration]
        batch_delay_ms = 0
        row_delay_ms = 0
        table_delay_ms = 0
        error_log_dir = "{}"

        [[migration.tables]]
        source = "Policies 2024"
        destination = "policies"

        [migration.rules.policies]
        required_fields = ["name"]
        "#,
        dir.path().join("logs").display()
    ))
    .unwrap();
    let (app, sheet, db) = app_with(&dir, config);
    sheet
        .batch_create(
            "Policies 2024",
            vec![
                record(json!({"id": "p-1", "name": "Fire"})),
                record(json!({"id": "p-2", "name": ""})),
            ],
        )
        .await
        .unwrap();

    let report = app.migrate(false, &[]).await.unwrap();

    assert_eq!(report.tables["policies"].success, 1);
    assert_eq!(report.tables["policies"].failed, 1);
    assert_eq!(db.read("policies", &Filter::new()).await.unwrap().len(), 1);
    assert!(dir.path().join("logs").join("policies-errors.json").exists());
}

#[tokio::test]
async fn migrate_rejects_unknown_table_filters() {
    let dir = TempDir::new().unwrap();
    let config = SwitchyardConfig::from_toml(
        r#"
        [[migration.tables]]
        source = "claims"
        "#,
    )
    .unwrap();
    let (app, _, _) = app_with(&dir, config);

    let err = app.migrate(true, &["policies".to_string()]).await.unwrap_err();
    assert!(err.to_string().contains("policies"));
}

#[tokio::test]
async fn migrate_needs_the_spreadsheet_adapter() {
    let dir = TempDir::new().unwrap();
    let config = SwitchyardConfig::from_toml(
        r#"
        [[migration.tables]]
        source = "claims"
        "#,
    )
    .unwrap();
    let factory = DalFactory::new(
        flag_store(&dir),
        Ok(Arc::new(RelationalAdapter::open_in_memory().unwrap()) as Arc<dyn DataAdapter>),
        Err(DalError::Configuration("no credentials".into())),
    );
    let app = App::with_factory(config, factory);

    let err = app.migrate(false, &[]).await.unwrap_err();
    assert!(err.to_string().contains("spreadsheet adapter is unavailable"));
}

// ── Backup and restore ───────────────────────────────────────────

#[tokio::test]
async fn backup_then_restore_into_the_database() {
    let dir = TempDir::new().unwrap();
    let mut config = SwitchyardConfig::default();
    config.backup.dir = dir.path().join("backups");
    config.backup.batch_delay_ms = 0;
    config.backup.row_delay_ms = 0;
    let (app, sheet, db) = app_with(&dir, config);
    sheet
        .batch_create(
            "claims",
            vec![record(json!({"id": "c-1"})), record(json!({"id": "c-2"}))],
        )
        .await
        .unwrap();

    let outcome = app
        .backup(Backend::Spreadsheet, &["claims".to_string()], true)
        .await
        .unwrap();
    assert!(outcome.path.to_string_lossy().ends_with(".zip"));

    let report = app
        .restore(&outcome.path, Backend::Relational, &RestoreOptions::default())
        .await
        .unwrap();

    assert_eq!(report.restored(), 2);
    assert_eq!(db.read("claims", &Filter::new()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn backup_without_tables_is_refused() {
    let dir = TempDir::new().unwrap();
    let (app, _, _) = app_with(&dir, SwitchyardConfig::default());

    let err = app.backup(Backend::Relational, &[], false).await.unwrap_err();
    assert!(err.to_string().contains("no tables"));
}
