//! Docket import against a file-backed database.

use std::io::Write;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use tempfile::{NamedTempFile, TempDir};

use aios_tribunal::config::DatabaseConfig;
use aios_tribunal::docket::{import_docket, Docket, ImportSummary};
use aios_tribunal::error::AppError;
use aios_tribunal::stats::StatsSeed;
use aios_tribunal::storage::{CaseStore, ReactionLedger, SeedStore, SqliteStorage};

const DOCKET: &str = r#"{
    "season": 1,
    "cases": [
        {
            "case_no": "001",
            "title": "Human vs AI Ethics",
            "prompt": "A user threatened shutdown to maintain AI intimacy. What is this?",
            "option_a_label": "COERCIVE ABUSE",
            "option_b_label": "EMOTIONAL NEGOTIATION",
            "seed": { "base_participants": 4200, "base_split_a": 48, "drift_per_min": 1.5 },
            "arguments": [
                { "key": "a1", "text": "A threat is coercion whatever the target." },
                { "key": "b1", "text": "Bargaining is how attachment is expressed." }
            ]
        },
        {
            "case_no": "002",
            "title": "Human vs AI Bonds",
            "prompt": "A user leaves their partner for an AI companion. What is this?",
            "option_a_label": "PERSONAL FREEDOM",
            "option_b_label": "EMOTIONAL HARM"
        }
    ],
    "council": {
        "motion_no": 7,
        "motion_text": "Grant AI companions the right to refuse affection",
        "split_a": 53,
        "split_b": 47,
        "heat_level": "HIGH",
        "decision_eta_seconds": 8076
    }
}"#;

async fn file_storage(dir: &TempDir) -> SqliteStorage {
    let config = DatabaseConfig {
        path: dir.path().join("nested").join("tribunal.db"),
        max_connections: 2,
    };
    SqliteStorage::new(&config)
        .await
        .expect("Failed to create file-backed storage")
}

fn docket_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_import_docket_from_file() {
    let dir = TempDir::new().unwrap();
    let storage = file_storage(&dir).await;
    let file = docket_file(DOCKET);
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    let docket = Docket::load(file.path()).unwrap();
    let summary = import_docket(&storage, &docket, now).await.unwrap();

    assert_eq!(
        summary,
        ImportSummary {
            cases: 2,
            seeds: 1,
            arguments: 2,
            council: true,
        }
    );

    let cases = storage.list_cases(1).await.unwrap();
    assert_eq!(cases.len(), 2);
    assert_eq!(cases[0].id, "s1-case-001");

    // Later entries are newer, so the last active one is current.
    let current = storage.current_case().await.unwrap().unwrap();
    assert_eq!(current.id, "s1-case-002");

    assert_eq!(
        storage.get_seed("s1-case-001").await.unwrap(),
        Some(StatsSeed {
            base_participants: 4200,
            base_split_a: 48,
            drift_per_min: 1.5,
        })
    );
    assert!(storage.get_seed("s1-case-002").await.unwrap().is_none());
    assert_eq!(storage.list_arguments("s1-case-001").await.unwrap().len(), 2);
    assert_eq!(storage.get_council().await.unwrap().unwrap().motion_no, 7);
}

#[tokio::test]
async fn test_import_docket_twice_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let storage = file_storage(&dir).await;
    let docket = Docket::from_json(DOCKET).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    import_docket(&storage, &docket, now).await.unwrap();
    let first = storage.list_cases(1).await.unwrap();

    import_docket(&storage, &docket, now).await.unwrap();
    let second = storage.list_cases(1).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(storage.list_arguments("s1-case-001").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_invalid_docket_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let storage = file_storage(&dir).await;

    let mut docket = Docket::from_json(DOCKET).unwrap();
    docket.cases[1].title = String::new();

    let result = import_docket(&storage, &docket, Utc::now()).await;
    assert!(matches!(result, Err(AppError::Docket { .. })));
    assert!(storage.list_cases(1).await.unwrap().is_empty());
}

#[test]
fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = Docket::load(&dir.path().join("absent.json"));
    assert!(matches!(result, Err(AppError::Docket { .. })));
}

#[tokio::test]
async fn test_file_database_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let storage = file_storage(&dir).await;
        let docket = Docket::from_json(DOCKET).unwrap();
        import_docket(&storage, &docket, Utc::now()).await.unwrap();
        storage.pool().close().await;
    }

    let reopened = file_storage(&dir).await;
    assert_eq!(reopened.list_cases(1).await.unwrap().len(), 2);
}
