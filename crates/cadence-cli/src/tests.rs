use std::path::PathBuf;

use cadence_core::{
    CatalogItem, EntityRecord, MutationAction, QueueEntry, Stored, SyncReport, SyncStatus,
};
use clap::Parser;
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::cli::{CatalogCommand, Cli, Commands, TrackArgs};
use crate::commands::catalog::{build_item, summary, to_list_item};
use crate::commands::common::{
    format_stored_lines, format_timestamp, open_local_engine, parse_value, require_text,
    resolve_db_path, Context,
};
use crate::commands::playlist::build_playlist;
use crate::commands::queue::format_queue_lines;
use crate::commands::sync::format_report;
use crate::error::CliError;

fn track(title: &str) -> TrackArgs {
    TrackArgs {
        title: title.to_string(),
        id: Some("t1".to_string()),
        artist: Some("  Nadia ".to_string()),
        album: Some("   ".to_string()),
        genre: None,
        duration_ms: Some(180_000),
    }
}

#[test]
fn parse_value_prefers_json() {
    assert_eq!(parse_value("3"), json!(3));
    assert_eq!(parse_value("true"), json!(true));
    assert_eq!(parse_value("{\"a\":1}"), json!({"a": 1}));
    assert_eq!(parse_value("rock"), json!("rock"));
}

#[test]
fn require_text_rejects_blank() {
    assert_eq!(require_text("  hi ", "Title").unwrap(), "hi");
    assert!(matches!(
        require_text(" \t", "Title"),
        Err(CliError::EmptyArgument("Title"))
    ));
}

#[test]
fn explicit_db_path_wins() {
    let explicit = PathBuf::from("/tmp/explicit.db");
    assert_eq!(resolve_db_path(Some(explicit.clone())), explicit);
}

#[test]
fn build_item_normalizes_optional_text() {
    let item = build_item(track("Song A")).unwrap();
    assert_eq!(item.id, "t1");
    assert_eq!(item.artist.as_deref(), Some("Nadia"));
    assert_eq!(item.album, None);
    assert_eq!(item.duration_ms, Some(180_000));

    assert!(build_item(track("  ")).is_err());
}

#[test]
fn build_playlist_dedupes_tracks() {
    let playlist = build_playlist(
        "Focus",
        None,
        Some(String::new()),
        vec!["t1".to_string(), "t2".to_string(), "t1".to_string()],
    )
    .unwrap();
    assert_eq!(playlist.track_ids, vec!["t1", "t2"]);
    assert_eq!(playlist.description, None);
}

#[test]
fn stored_lines_carry_status_marker() {
    let item = CatalogItem::with_id("t1", "Song A").artist("Nadia").genre("jazz");
    let mut record = EntityRecord::from_entity(&item).unwrap();
    record.sync_status = SyncStatus::Offline;
    let stored = Stored::<CatalogItem>::from_record(&record).unwrap();

    assert_eq!(
        format_stored_lines(&[stored.clone()], summary),
        vec!["! t1  Song A - Nadia [jazz]"]
    );
    let json = serde_json::to_value(to_list_item(&stored)).unwrap();
    assert_eq!(json["syncStatus"], "offline");
    assert_eq!(json["title"], "Song A");
}

#[test]
fn queue_lines_show_target_and_retries() {
    let entry = QueueEntry {
        id: "catalog-update-0-abcd1234".to_string(),
        action: MutationAction::Update,
        collection: cadence_core::EntityCollection::Catalog,
        entity_id: "t1".to_string(),
        payload: json!({"id": "t1"}),
        created_at: 0,
        retry_count: 2,
    };
    assert_eq!(
        format_queue_lines(&[entry]),
        vec!["catalog-update-0-abcd1234  update catalog/t1  retries=2  queued 1970-01-01 00:00:00 UTC"]
    );
    assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn report_lists_failures() {
    let report = SyncReport {
        replayed: 2,
        retried: 1,
        failures: vec![cadence_core::sync::ReplayFailure {
            entry_id: "e1".to_string(),
            error: "HTTP 500".to_string(),
        }],
        ..SyncReport::default()
    };
    let lines = format_report(&report);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Replayed 2, retrying 1"));
    assert_eq!(lines[1], "  e1: HTTP 500");
}

#[test]
fn cli_parses_nested_commands() {
    let cli = Cli::try_parse_from([
        "cadence",
        "--offline",
        "catalog",
        "find",
        "genre",
        "rock",
        "--json",
    ])
    .unwrap();
    assert!(cli.offline);
    assert!(matches!(
        cli.command,
        Commands::Catalog(CatalogCommand::Find { ref index, ref value, json: true })
            if index == "genre" && value == "rock"
    ));

    assert!(Cli::try_parse_from(["cadence", "dead-letters", "retry", "x"]).is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_cli_writes_are_queued_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Context {
        db_path: dir.path().join("cadence.db"),
        offline: true,
    };

    let engine = open_local_engine(&ctx).await.unwrap();
    let stored = engine.save(&build_item(track("Song A")).unwrap()).await.unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Offline);
    drop(engine);

    let reopened = open_local_engine(&ctx).await.unwrap();
    let queue = reopened.store().list_queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].action, MutationAction::Create);
    // the unconfigured remote never gets a pass while offline
    assert_eq!(reopened.trigger_sync().await.unwrap(), None);
}
