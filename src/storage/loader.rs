//! Loads JSON batch files into the relational store

use crate::query::Target;
use crate::record::{record_id, Record};
use crate::resolver::{DependencyResolver, RoleLookup};
use crate::storage::json::{list_batches, BatchFile};
use crate::storage::sqlite::SqliteSink;
use crate::storage::traits::Sink;
use std::collections::BTreeMap;
use std::path::Path;

/// What a load stored
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub records: BTreeMap<Target, usize>,
    pub dependencies: usize,
}

/// Reads every batch of `target` under `json_dir`, in sequence order
pub fn read_target(json_dir: &Path, target: Target) -> crate::Result<Vec<Record>> {
    let mut records = Vec::new();
    for (_, path) in list_batches(json_dir, target)? {
        let batch = BatchFile::read(&path)?;
        records.extend(batch.json);
    }
    Ok(records)
}

/// Inserts the JSON batches under `json_dir` into `sink`
///
/// Targets are stored providers first and roles last. Role dependencies
/// are then resolved with `resolver`, whose name to id cache is kept in
/// `json_dir`.
///
/// # Arguments
///
/// * `json_dir` - Directory written by the JSON sink
/// * `sink` - Migrated relational sink
/// * `resolver` - Dependency resolver used for the roles
pub async fn load_json_dir<L: RoleLookup>(
    json_dir: &Path,
    sink: &mut SqliteSink,
    resolver: &mut DependencyResolver<L>,
) -> crate::Result<LoadReport> {
    let mut report = LoadReport::default();

    for target in Target::LOAD_ORDER {
        let mut records = read_target(json_dir, target)?;
        tracing::info!("{}: {} objects were found", target, records.len());

        records.retain(|r| {
            let keep = record_id(r).is_some();
            if !keep {
                tracing::warn!("Skip a {} record without 'id'", target);
            }
            keep
        });

        sink.save(target, &records)?;
        sink.commit()?;
        report.records.insert(target, records.len());

        if target == Target::Roles && !records.is_empty() {
            tracing::info!("Try to resolve role dependencies.");
            resolver.load_mapping(json_dir)?;
            let edges = resolver.resolve(&records).await?;
            report.dependencies = sink.insert_dependencies(&edges)?;
        }
    }

    tracing::info!("Done");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DependencyRef;
    use crate::resolver::{ResolveError, ROLE_ID_MAPPING_FILE};
    use crate::storage::json::JsonSink;
    use crate::storage::RelationalSink;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    struct NoLookup;

    #[async_trait]
    impl RoleLookup for NoLookup {
        async fn dependencies_of(&self, _role_id: i64) -> Result<Vec<DependencyRef>, ResolveError> {
            Ok(Vec::new())
        }
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_load_json_dir() {
        let dir = TempDir::new().unwrap();
        {
            let mut json_sink = JsonSink::new(dir.path()).unwrap();
            json_sink
                .save(Target::Tags, &[record(json!({"id": 1, "name": "web"}))])
                .unwrap();
            json_sink
                .save(
                    Target::Roles,
                    &[
                        record(json!({"id": 10, "name": "a", "summary_fields": {
                            "namespace": {"name": "ns"}, "dependencies": ["ns.b"]}})),
                        record(json!({"id": 11, "name": "b", "summary_fields": {
                            "namespace": {"name": "ns"}, "dependencies": []}})),
                    ],
                )
                .unwrap();
            json_sink.commit().unwrap();
            json_sink
                .save(Target::Roles, &[record(json!({"id": 12, "name": "c"}))])
                .unwrap();
            json_sink.commit().unwrap();
        }

        let mut sink = SqliteSink::new_in_memory().unwrap();
        sink.migrate().unwrap();
        let mut resolver = DependencyResolver::new(NoLookup);

        let report = load_json_dir(dir.path(), &mut sink, &mut resolver)
            .await
            .unwrap();

        assert_eq!(report.records.get(&Target::Tags), Some(&1));
        assert_eq!(report.records.get(&Target::Roles), Some(&3));
        assert_eq!(report.records.get(&Target::Providers), Some(&0));
        assert_eq!(report.dependencies, 1);
        assert_eq!(sink.count_records(Target::Roles).unwrap(), 3);
        assert!(dir.path().join(ROLE_ID_MAPPING_FILE).exists());
    }
}
