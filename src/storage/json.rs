//! JSON batch file sink
//!
//! Records are buffered per target and written on commit as
//! `<dir>/<target>/<target>_<n>.json`, one file per commit and target.

use crate::query::Target;
use crate::record::{record_id, Record};
use crate::storage::traits::{Sink, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// On-disk layout of one batch file
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchFile {
    pub start_at: String,
    pub finished_at: String,
    pub json: Vec<Record>,
}

impl BatchFile {
    /// Reads a batch file from disk
    pub fn read(path: &Path) -> StorageResult<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

#[derive(Serialize)]
struct BatchFileRef<'a> {
    start_at: String,
    finished_at: String,
    json: &'a [Record],
}

#[derive(Debug)]
struct PendingBatch {
    started_at: DateTime<Utc>,
    records: Vec<Record>,
}

/// Sink writing numbered JSON batch files
pub struct JsonSink {
    output_dir: PathBuf,
    pending: BTreeMap<Target, PendingBatch>,
    next_sequence: HashMap<Target, u32>,
}

impl JsonSink {
    /// Creates a sink rooted at `output_dir`, creating the directory if needed
    pub fn new(output_dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(output_dir)?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            pending: BTreeMap::new(),
            next_sequence: HashMap::new(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Number of records buffered and not yet written
    pub fn pending_len(&self) -> usize {
        self.pending.values().map(|b| b.records.len()).sum()
    }

    fn sequence_for(&mut self, target: Target) -> StorageResult<u32> {
        if let Some(n) = self.next_sequence.get(&target) {
            return Ok(*n);
        }
        // Continue after batches left by an earlier run.
        let n = list_batches(&self.output_dir, target)?
            .last()
            .map(|(n, _)| n + 1)
            .unwrap_or(0);
        self.next_sequence.insert(target, n);
        Ok(n)
    }

    fn write_batch(&mut self, target: Target, batch: &PendingBatch) -> StorageResult<PathBuf> {
        let n = self.sequence_for(target)?;
        let dir = self.output_dir.join(target.as_str());
        fs::create_dir_all(&dir)?;

        let path = batch_path(&self.output_dir, target, n);
        let file = BatchFileRef {
            start_at: batch.started_at.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
            json: &batch.records,
        };

        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, &file)?;
        writer.flush()?;

        self.next_sequence.insert(target, n + 1);
        tracing::debug!("Wrote {} records to {}", file.json.len(), path.display());
        Ok(path)
    }
}

impl Sink for JsonSink {
    fn name(&self) -> &'static str {
        "json"
    }

    fn save(&mut self, target: Target, records: &[Record]) -> StorageResult<()> {
        if records.iter().any(|r| record_id(r).is_none()) {
            return Err(StorageError::MissingId { target });
        }
        let batch = self.pending.entry(target).or_insert_with(|| PendingBatch {
            started_at: Utc::now(),
            records: Vec::new(),
        });
        batch.records.extend(records.iter().cloned());
        Ok(())
    }

    /// Writes one batch per buffered target
    ///
    /// A batch stays buffered until its own file is written, so a failed
    /// target is retried by the next commit. Other targets are still
    /// written; the first error is returned.
    fn commit(&mut self) -> StorageResult<()> {
        let targets: Vec<Target> = self.pending.keys().copied().collect();
        let mut first_error = None;

        for target in targets {
            let Some(batch) = self.pending.remove(&target) else {
                continue;
            };
            if batch.records.is_empty() {
                continue;
            }
            if let Err(e) = self.write_batch(target, &batch) {
                tracing::error!("Failed to write {} batch: {}", target, e);
                self.pending.insert(target, batch);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Path of batch `n` of `target` under `dir`
pub fn batch_path(dir: &Path, target: Target, n: u32) -> PathBuf {
    dir.join(target.as_str())
        .join(format!("{}_{}.json", target.as_str(), n))
}

/// Lists the batch files of `target` under `dir`, ordered by sequence number
///
/// A missing target directory yields an empty list. Files not matching
/// `<target>_<n>.json` are ignored.
pub fn list_batches(dir: &Path, target: Target) -> StorageResult<Vec<(u32, PathBuf)>> {
    let target_dir = dir.join(target.as_str());
    if !target_dir.is_dir() {
        return Ok(Vec::new());
    }

    let prefix = format!("{}_", target.as_str());
    let mut batches = Vec::new();
    for entry in fs::read_dir(&target_dir)? {
        let path = entry?.path();
        let sequence = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(&prefix))
            .and_then(|n| n.strip_suffix(".json"))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(n) = sequence {
            batches.push((n, path));
        }
    }
    batches.sort_by_key(|(n, _)| *n);
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_commit_writes_numbered_batches() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonSink::new(dir.path()).unwrap();

        sink.save(Target::Roles, &[record(json!({"id": 1})), record(json!({"id": 2}))])
            .unwrap();
        sink.commit().unwrap();
        sink.save(Target::Roles, &[record(json!({"id": 3}))]).unwrap();
        sink.commit().unwrap();

        let first = BatchFile::read(&batch_path(dir.path(), Target::Roles, 0)).unwrap();
        let second = BatchFile::read(&batch_path(dir.path(), Target::Roles, 1)).unwrap();
        assert_eq!(first.json.len(), 2);
        assert_eq!(second.json.len(), 1);
        assert!(first.start_at <= first.finished_at);
        assert_eq!(sink.pending_len(), 0);
    }

    #[test]
    fn test_empty_commit_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonSink::new(dir.path()).unwrap();
        sink.save(Target::Tags, &[]).unwrap();
        sink.commit().unwrap();

        assert!(list_batches(dir.path(), Target::Tags).unwrap().is_empty());
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonSink::new(dir.path()).unwrap();
        let result = sink.save(Target::Platforms, &[record(json!({"name": "EL"}))]);
        assert!(matches!(
            result,
            Err(StorageError::MissingId {
                target: Target::Platforms
            })
        ));
        assert_eq!(sink.pending_len(), 0);
    }

    #[test]
    fn test_sequence_continues_after_existing_files() {
        let dir = TempDir::new().unwrap();
        {
            let mut sink = JsonSink::new(dir.path()).unwrap();
            sink.save(Target::Tags, &[record(json!({"id": 1}))]).unwrap();
            sink.commit().unwrap();
        }
        let mut sink = JsonSink::new(dir.path()).unwrap();
        sink.save(Target::Tags, &[record(json!({"id": 2}))]).unwrap();
        sink.commit().unwrap();

        let batches = list_batches(dir.path(), Target::Tags).unwrap();
        let numbers: Vec<u32> = batches.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![0, 1]);
    }

    #[test]
    fn test_failed_write_keeps_batch_for_next_commit() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("roles");
        fs::write(&blocker, "not a directory").unwrap();

        let mut sink = JsonSink::new(dir.path()).unwrap();
        sink.save(Target::Roles, &[record(json!({"id": 1}))]).unwrap();
        sink.save(Target::Tags, &[record(json!({"id": 2}))]).unwrap();

        assert!(sink.commit().is_err());
        assert_eq!(sink.pending_len(), 1);
        assert_eq!(list_batches(dir.path(), Target::Tags).unwrap().len(), 1);

        fs::remove_file(&blocker).unwrap();
        sink.commit().unwrap();

        assert_eq!(sink.pending_len(), 0);
        let roles = BatchFile::read(&batch_path(dir.path(), Target::Roles, 0)).unwrap();
        assert_eq!(roles.json.len(), 1);
        assert_eq!(list_batches(dir.path(), Target::Tags).unwrap().len(), 1);
    }

    #[test]
    fn test_list_batches_orders_numerically() {
        let dir = TempDir::new().unwrap();
        let tags = dir.path().join("tags");
        fs::create_dir_all(&tags).unwrap();
        for name in ["tags_10.json", "tags_2.json", "tags_0.json", "notes.txt"] {
            fs::write(tags.join(name), "{}").unwrap();
        }

        let numbers: Vec<u32> = list_batches(dir.path(), Target::Tags)
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(numbers, vec![0, 2, 10]);
    }
}
