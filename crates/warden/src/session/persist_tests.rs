// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::session::test_support::session;

#[test]
fn file_backend_writes_three_keys() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = FileBackend::new(dir.path().join("nested/session.json"));
    let s = session(3600);

    backend.save(&PersistedSession::from(&s))?;

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(backend.path())?)?;
    assert_eq!(raw["authToken"], s.access_token.as_str());
    assert!(raw["refreshToken"].is_string());
    assert_eq!(raw["user"]["userId"], "u-1");

    let loaded = backend.load()?;
    assert_eq!(loaded, Some(PersistedSession::from(&s)));
    Ok(())
}

#[test]
fn file_backend_leaves_no_temp_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = FileBackend::new(dir.path().join("session.json"));
    for secs in [60, 120, 180] {
        backend.save(&PersistedSession::from(&session(secs)))?;
    }
    let names: Vec<String> = std::fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["session.json".to_owned()]);
    Ok(())
}

#[test]
fn clear_removes_file_and_is_idempotent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = FileBackend::new(dir.path().join("session.json"));
    backend.save(&PersistedSession::from(&session(60)))?;

    backend.clear()?;
    assert!(!backend.path().exists());
    assert_eq!(backend.load()?, None);
    backend.clear()?;
    Ok(())
}

#[test]
fn partial_layout_loads() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");
    std::fs::write(&path, r#"{"authToken":"abc","refreshToken":""}"#)?;

    let loaded = FileBackend::new(path).load()?.unwrap_or_default();
    assert_eq!(loaded.access_token(), Some("abc"));
    assert_eq!(loaded.refresh_token(), None);
    assert!(loaded.user.is_none());
    Ok(())
}

#[test]
fn memory_backend_clones_share_state() -> anyhow::Result<()> {
    let backend = MemoryBackend::default();
    let other = backend.clone();
    backend.save(&PersistedSession::from(&session(60)))?;
    assert!(other.snapshot().is_some());
    other.clear()?;
    assert!(backend.snapshot().is_none());
    Ok(())
}
