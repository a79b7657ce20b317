//! Snapshot, feed and publication tests

mod helpers;

use helpers::{files_in, open_engine, MemoryBackend, ScriptedItem, ScriptedSource, MIB};
use std::time::Duration;
use tempfile::TempDir;
use tubecast::models::Show;
use tubecast::services::feed;
use tubecast::EngineError;

const SHOW: &str = "Tech Talks";

fn read_snapshot(path: &std::path::Path) -> Show {
    let bytes = std::fs::read(path).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Replace `path` with a non-empty directory so atomic renames onto it fail
fn block(path: &std::path::Path) {
    let _ = std::fs::remove_file(path);
    std::fs::create_dir_all(path).unwrap();
    std::fs::write(path.join("occupied"), b"x").unwrap();
}

fn unblock(path: &std::path::Path) {
    std::fs::remove_dir_all(path).unwrap();
}

#[tokio::test]
async fn test_feed_always_matches_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    let source = ScriptedSource::new();
    let backend = MemoryBackend::new();
    for (id, date) in [("e1", "20240105"), ("e2", "20240301"), ("e3", "20240210")] {
        source.add_item(id, ScriptedItem::new(40 * MIB).upload_date(date));
    }
    let engine = open_engine(temp_dir.path(), &source, &backend, 100).await;

    engine.create_show(SHOW, "Talks & <demos>", None).await.unwrap();
    for id in ["e1", "e2", "e3"] {
        engine.add_video(SHOW, id, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let snapshot = read_snapshot(&engine.layout().snapshot_path(SHOW));
        let local = std::fs::read_to_string(engine.layout().feed_path(SHOW)).unwrap();
        assert_eq!(local, feed::render(&snapshot).unwrap());

        let published = backend.body("Tech Talks/Tech Talks.xml").unwrap();
        assert_eq!(published, local.as_bytes());
    }

    // e3 pushed e1 out; items are ordered newest publish date first
    let snapshot = read_snapshot(&engine.layout().snapshot_path(SHOW));
    assert!(!snapshot.has_episode("e1"));
    let local = std::fs::read_to_string(engine.layout().feed_path(SHOW)).unwrap();
    let e2 = local.find("<guid isPermaLink=\"false\">e2</guid>").unwrap();
    let e3 = local.find("<guid isPermaLink=\"false\">e3</guid>").unwrap();
    assert!(e2 < e3);
    assert!(local.contains("Talks &amp; &lt;demos&gt;"));
}

#[tokio::test]
async fn test_no_temporary_files_left_behind() {
    let temp_dir = TempDir::new().unwrap();
    let source = ScriptedSource::new();
    let backend = MemoryBackend::new();
    source.add_item("abc123", ScriptedItem::new(MIB));
    let engine = open_engine(temp_dir.path(), &source, &backend, 500).await;

    engine.create_show(SHOW, "Talks", None).await.unwrap();
    engine.add_video(SHOW, "abc123", None).await.unwrap();
    engine.remove_video(SHOW, "abc123").await.unwrap();

    assert_eq!(
        files_in(&engine.layout().stations_dir()),
        vec!["Tech Talks.json".to_string()]
    );
    assert_eq!(
        files_in(&engine.layout().feeds_dir()),
        vec!["Tech Talks.xml".to_string()]
    );
}

#[tokio::test]
async fn test_publish_failure_is_not_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let source = ScriptedSource::new();
    let backend = MemoryBackend::new();
    source.add_item("abc123", ScriptedItem::new(MIB));
    source.add_item("def456", ScriptedItem::new(MIB));
    let engine = open_engine(temp_dir.path(), &source, &backend, 500).await;
    backend.fail_uploads_ending_with(Some(".xml"));

    let show = engine.create_show(SHOW, "Talks", None).await.unwrap();
    assert_eq!(show.feed_url, "");
    assert!(engine.layout().feed_path(SHOW).exists());

    let outcome = engine.add_video(SHOW, "abc123", None).await.unwrap();
    assert!(!outcome.publish.is_published());
    assert!(outcome.publish.remote_error.is_some());

    // Local state moved on regardless
    let snapshot = read_snapshot(&engine.layout().snapshot_path(SHOW));
    assert!(snapshot.has_episode("abc123"));
    assert!(!backend.has("Tech Talks/Tech Talks.xml"));

    // Next mutation publishes and records the public URL
    backend.fail_uploads_ending_with(None);
    let outcome = engine.add_video(SHOW, "def456", None).await.unwrap();
    assert!(outcome.publish.is_published());
    let snapshot = read_snapshot(&engine.layout().snapshot_path(SHOW));
    assert_eq!(
        snapshot.feed_url,
        MemoryBackend::url_for("Tech Talks/Tech Talks.xml")
    );
    assert_eq!(snapshot.episodes.len(), 2);
}

#[tokio::test]
async fn test_sync_reports_publish_failures() {
    let temp_dir = TempDir::new().unwrap();
    let source = ScriptedSource::new();
    let backend = MemoryBackend::new();
    source.add_item("n1", ScriptedItem::new(MIB));
    source.set_channel("@creator", &["n1"]);
    let engine = open_engine(temp_dir.path(), &source, &backend, 500).await;

    engine.create_show(SHOW, "Talks", None).await.unwrap();
    backend.fail_uploads_ending_with(Some(".xml"));

    let report = engine.sync_channel(SHOW, "@creator", None).await.unwrap();
    assert_eq!(report.added_guids(), vec!["n1"]);
    assert!(!report.publish_errors.is_empty());
    assert!(report.publish_errors.iter().all(|(show, _)| show == SHOW));
}

#[tokio::test]
async fn test_evictions_survive_restart() {
    let temp_dir = TempDir::new().unwrap();
    let source = ScriptedSource::new();
    let backend = MemoryBackend::new();
    for id in ["old", "mid", "new"] {
        source.add_item(id, ScriptedItem::new(45 * MIB));
    }

    {
        let engine = open_engine(temp_dir.path(), &source, &backend, 100).await;
        for id in ["old", "mid", "new"] {
            engine.add_video(SHOW, id, Some("Talks")).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    let engine = open_engine(temp_dir.path(), &source, &backend, 100).await;
    let show = engine.show(SHOW).await.unwrap();
    let guids: Vec<&str> = show.episodes.iter().map(|e| e.guid.as_str()).collect();
    assert_eq!(guids, vec!["mid", "new"]);
    assert!(backend.keys().iter().all(|k| !k.starts_with("Tech Talks/old.")));
}

#[tokio::test]
async fn test_create_show_with_unwritable_snapshot_leaves_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let source = ScriptedSource::new();
    let backend = MemoryBackend::new();
    let engine = open_engine(temp_dir.path(), &source, &backend, 500).await;
    let cover = temp_dir.path().join("art.png");
    std::fs::write(&cover, b"png").unwrap();

    block(&engine.layout().snapshot_path(SHOW));
    let err = engine
        .create_show(SHOW, "Talks", Some(&cover))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Persistence(_)));
    assert!(!engine.registry().exists(SHOW).await);
    assert!(!backend.has("Tech Talks/cover.png"));
    assert!(backend.deleted().contains(&"Tech Talks/cover.png".to_string()));
    assert!(!engine.layout().feed_path(SHOW).exists());
}

#[tokio::test]
async fn test_create_show_with_unwritable_feed_leaves_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let source = ScriptedSource::new();
    let backend = MemoryBackend::new();
    let cover = temp_dir.path().join("art.png");
    std::fs::write(&cover, b"png").unwrap();

    {
        let engine = open_engine(temp_dir.path(), &source, &backend, 500).await;
        block(&engine.layout().feed_path(SHOW));

        let err = engine
            .create_show(SHOW, "Talks", Some(&cover))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Persistence(_)));
        assert!(!engine.registry().exists(SHOW).await);
        assert!(!engine.layout().snapshot_path(SHOW).exists());
        assert!(!backend.has("Tech Talks/cover.png"));
    }

    // Nothing resurfaces on restart
    let engine = open_engine(temp_dir.path(), &source, &backend, 500).await;
    assert!(engine.list_shows().await.unwrap().is_empty());

    unblock(&engine.layout().feed_path(SHOW));
    engine.create_show(SHOW, "Talks", None).await.unwrap();
    assert!(engine.registry().exists(SHOW).await);
}

#[tokio::test]
async fn test_add_video_with_unwritable_feed_rolls_back() {
    let temp_dir = TempDir::new().unwrap();
    let source = ScriptedSource::new();
    let backend = MemoryBackend::new();
    source.add_item("abc123", ScriptedItem::new(MIB));
    let engine = open_engine(temp_dir.path(), &source, &backend, 500).await;
    engine.create_show(SHOW, "Talks", None).await.unwrap();

    block(&engine.layout().feed_path(SHOW));
    let err = engine.add_video(SHOW, "abc123", None).await.unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));

    let snapshot = read_snapshot(&engine.layout().snapshot_path(SHOW));
    assert!(!snapshot.has_episode("abc123"));
    assert!(backend.keys().iter().all(|k| !k.starts_with("Tech Talks/abc123.")));
    assert!(files_in(&engine.layout().media_dir(SHOW)).is_empty());

    // Once the feed is writable again the same item goes through
    unblock(&engine.layout().feed_path(SHOW));
    engine.add_video(SHOW, "abc123", None).await.unwrap();
    let snapshot = read_snapshot(&engine.layout().snapshot_path(SHOW));
    assert!(snapshot.has_episode("abc123"));
    assert!(backend.has("Tech Talks/abc123.mp3"));
}

#[tokio::test]
async fn test_remove_video_with_unwritable_feed_keeps_episode() {
    let temp_dir = TempDir::new().unwrap();
    let source = ScriptedSource::new();
    let backend = MemoryBackend::new();
    source.add_item("abc123", ScriptedItem::new(MIB));
    let engine = open_engine(temp_dir.path(), &source, &backend, 500).await;
    engine.create_show(SHOW, "Talks", None).await.unwrap();
    engine.add_video(SHOW, "abc123", None).await.unwrap();

    block(&engine.layout().feed_path(SHOW));
    let err = engine.remove_video(SHOW, "abc123").await.unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));
    let snapshot = read_snapshot(&engine.layout().snapshot_path(SHOW));
    assert!(snapshot.has_episode("abc123"));

    // Remote deletion is idempotent, so a retry converges
    unblock(&engine.layout().feed_path(SHOW));
    engine.remove_video(SHOW, "abc123").await.unwrap();
    let snapshot = read_snapshot(&engine.layout().snapshot_path(SHOW));
    assert!(!snapshot.has_episode("abc123"));
    assert!(backend.keys().iter().all(|k| !k.starts_with("Tech Talks/abc123.")));
    let local = std::fs::read_to_string(engine.layout().feed_path(SHOW)).unwrap();
    assert_eq!(local, feed::render(&snapshot).unwrap());
}
