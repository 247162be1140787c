//! File-backed checkpoint log: one `<dir>/<correlation_id>.jsonl` per request.

use crate::log::{CheckpointEntry, CheckpointLog};
use agenda_core::{AgendaResult, CheckpointError, CorrelationId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::io::AsyncWriteExt;

const EXTENSION: &str = "jsonl";

#[derive(Debug, Clone)]
pub struct JsonlCheckpointLog {
    dir: PathBuf,
}

fn io_error(correlation_id: &str, e: impl std::fmt::Display) -> CheckpointError {
    CheckpointError::Io {
        correlation_id: correlation_id.to_string(),
        reason: e.to_string(),
    }
}

impl JsonlCheckpointLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, correlation_id: &CorrelationId) -> AgendaResult<PathBuf> {
        if !correlation_id.is_path_safe() {
            return Err(io_error(correlation_id.as_str(), "correlation id is not path-safe").into());
        }
        Ok(self
            .dir
            .join(format!("{}.{}", correlation_id.as_str(), EXTENSION)))
    }

    /// Parse a stream, skipping lines that fail to decode.
    fn parse(correlation_id: &CorrelationId, raw: &str) -> Vec<CheckpointEntry> {
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(
                        correlation_id = %correlation_id,
                        error = %e,
                        "Skipping malformed checkpoint line"
                    );
                    None
                }
            })
            .collect()
    }

    async fn read_stream(&self, path: &Path, correlation_id: &CorrelationId) -> AgendaResult<Vec<CheckpointEntry>> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(Self::parse(correlation_id, &raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(io_error(correlation_id.as_str(), e).into()),
        }
    }

    /// Every `.jsonl` file in the directory, sorted.
    async fn stream_paths(&self) -> AgendaResult<Vec<PathBuf>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("*", e).into()),
        };
        let mut paths = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| io_error("*", e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Delete `path` if it was last written before `cutoff`.
    async fn prune_file(path: &Path, cutoff: SystemTime) -> std::io::Result<bool> {
        let modified = tokio::fs::metadata(path).await?.modified()?;
        if modified >= cutoff {
            return Ok(false);
        }
        tokio::fs::remove_file(path).await?;
        Ok(true)
    }
}

#[async_trait]
impl CheckpointLog for JsonlCheckpointLog {
    async fn append_entry(
        &self,
        correlation_id: &CorrelationId,
        entry: CheckpointEntry,
    ) -> AgendaResult<()> {
        let path = self.path_for(correlation_id)?;
        let mut line = serde_json::to_string(&entry).map_err(|e| CheckpointError::Serialization {
            reason: e.to_string(),
        })?;
        line.push('\n');

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(correlation_id.as_str(), e))?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_error(correlation_id.as_str(), e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| io_error(correlation_id.as_str(), e))?;
        file.flush()
            .await
            .map_err(|e| io_error(correlation_id.as_str(), e))?;
        Ok(())
    }

    async fn replay(&self, correlation_id: &CorrelationId) -> AgendaResult<Vec<CheckpointEntry>> {
        let path = self.path_for(correlation_id)?;
        self.read_stream(&path, correlation_id).await
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> AgendaResult<usize> {
        let cutoff = SystemTime::from(cutoff);
        let mut pruned = 0;
        for path in self.stream_paths().await? {
            match Self::prune_file(&path, cutoff).await {
                Ok(true) => pruned += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Skipping checkpoint stream during prune"
                    );
                }
            }
        }
        if pruned > 0 {
            tracing::debug!(pruned, dir = %self.dir.display(), "Pruned checkpoint streams");
        }
        Ok(pruned)
    }

    async fn list(&self) -> AgendaResult<Vec<CorrelationId>> {
        Ok(self
            .stream_paths()
            .await?
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()))
            .map(CorrelationId::from_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::stage;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn test_jsonl_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlCheckpointLog::new(dir.path().join("checkpoints"));
        let cid = CorrelationId::new();
        log.append(&cid, stage::ROUTE, json!({"decision": "plan"})).await.unwrap();
        log.append(&cid, stage::DONE, json!({})).await.unwrap();

        let file = dir.path().join("checkpoints").join(format!("{}.jsonl", cid));
        let raw = std::fs::read_to_string(file).unwrap();
        assert_eq!(raw.lines().count(), 2);

        let entries = log.replay(&cid).await.unwrap();
        let stages: Vec<&str> = entries.iter().map(|e| e.stage.as_str()).collect();
        assert_eq!(stages, vec!["route", "done"]);
        assert_eq!(log.list().await.unwrap(), vec![cid]);
    }

    #[tokio::test]
    async fn test_missing_stream_and_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlCheckpointLog::new(dir.path());
        let cid = CorrelationId::from_string("partial");
        assert!(log.replay(&cid).await.unwrap().is_empty());

        log.append(&cid, stage::ROUTE, json!({})).await.unwrap();
        let path = dir.path().join("partial.jsonl");
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{not json\n");
        std::fs::write(&path, raw).unwrap();
        assert_eq!(log.replay(&cid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unsafe_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlCheckpointLog::new(dir.path());
        let err = log
            .append(&CorrelationId::from_string("../escape"), stage::ROUTE, json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("path-safe"));
    }

    fn backdate(path: &Path, days: u64) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - std::time::Duration::from_secs(days * 86_400))
            .unwrap();
    }

    #[tokio::test]
    async fn test_prune_by_last_write() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlCheckpointLog::new(dir.path());
        let stale = CorrelationId::from_string("stale");
        let live = CorrelationId::from_string("live");
        log.append(&stale, stage::DONE, json!({})).await.unwrap();
        log.append(&live, stage::ROUTE, json!({})).await.unwrap();
        backdate(&dir.path().join("stale.jsonl"), 9);
        backdate(&dir.path().join("live.jsonl"), 9);
        // a fresh write keeps the stream alive
        log.append(&live, stage::DONE, json!({})).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        backdate(&dir.path().join("notes.txt"), 9);

        assert_eq!(log.prune_before(Utc::now() - Duration::days(7)).await.unwrap(), 1);
        assert_eq!(log.list().await.unwrap(), vec![live]);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_prune_keeps_fresh_empty_stream() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlCheckpointLog::new(dir.path());
        std::fs::write(dir.path().join("opening.jsonl"), "").unwrap();

        assert_eq!(log.prune_before(Utc::now() - Duration::days(30)).await.unwrap(), 0);
        assert!(dir.path().join("opening.jsonl").exists());
    }

    #[tokio::test]
    async fn test_prune_tolerates_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlCheckpointLog::new(dir.path());
        let foreign = dir.path().join("backup copy.jsonl");
        std::fs::write(&foreign, "{not json\n").unwrap();
        log.append(&CorrelationId::from_string("zz-old"), stage::DONE, json!({}))
            .await
            .unwrap();
        backdate(&dir.path().join("zz-old.jsonl"), 9);

        assert_eq!(log.prune_before(Utc::now() - Duration::days(7)).await.unwrap(), 1);
        assert!(!dir.path().join("zz-old.jsonl").exists());
        assert!(foreign.exists());
    }
}
