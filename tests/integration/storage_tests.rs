//! Integration tests for the relational store and the JSON batch loader

use galaxy_crawler::config::{ApiConfig, Config, CrawlerConfig, OutputConfig};
use galaxy_crawler::crawler::{build_http_client, run_crawl};
use galaxy_crawler::query::{QueryBuilder, Target};
use galaxy_crawler::resolver::{load_mapping, DependencyResolver, HttpRoleLookup, ROLE_ID_MAPPING_FILE};
use galaxy_crawler::storage::{
    load_json_dir, DatabaseUrl, JsonSink, RelationalSink, Sink, SqliteSink, StorageError,
};
use galaxy_crawler::CrawlerError;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sqlite_config(server: &MockServer, dir: &TempDir) -> Config {
    let db_path = dir.path().join("galaxy.db");
    Config {
        api: ApiConfig {
            base_url: format!("{}/api/v1/", server.uri()),
            ..ApiConfig::default()
        },
        crawler: CrawlerConfig {
            interval_secs: 0,
            retry: 0,
            page_size: 10,
            receive_timeout_secs: 1,
            targets: vec!["tags".to_string()],
            ..CrawlerConfig::default()
        },
        output: OutputConfig {
            directory: dir.path().to_string_lossy().to_string(),
            formats: vec!["sqlite".to_string()],
            database_url: Some(format!("sqlite:///{}", db_path.display())),
        },
    }
}

#[tokio::test]
async fn test_sqlite_crawl_requires_migration() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v1/tags/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"id": 1, "name": "web", "created": "2019-01-02T03:04:05.123456Z"},
                {"id": 2, "name": "db", "created": "not a date"}
            ]
        })))
        .mount(&mock_server)
        .await;

    let config = sqlite_config(&mock_server, &dir);

    let result = run_crawl(&config).await;
    assert!(matches!(
        result,
        Err(CrawlerError::Storage(StorageError::MigrationRequired { current: 0, .. }))
    ));

    let url = config.database_url().unwrap().unwrap();
    assert!(matches!(url, DatabaseUrl::Sqlite(_)));
    let mut sink = SqliteSink::open(&url).unwrap();
    sink.migrate().unwrap();
    assert!(!sink.is_migration_required().unwrap());
    drop(sink);

    let report = run_crawl(&config).await.unwrap();
    assert_eq!(report.records_saved, 2);

    let sink = SqliteSink::open(&url).unwrap();
    assert_eq!(sink.count_records(Target::Tags).unwrap(), 2);
}

#[tokio::test]
async fn test_load_resolves_dependencies_with_live_lookup() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let roles = vec![json!({
        "id": 1,
        "name": "web",
        "download_count": 10,
        "summary_fields": {
            "namespace": {"name": "alice"},
            "dependencies": ["bob.db"]
        }
    })
    .as_object()
    .unwrap()
    .clone()];
    let tags = vec![json!({"id": 5, "name": "web"}).as_object().unwrap().clone()];

    let mut json_sink = JsonSink::new(dir.path()).unwrap();
    json_sink.save(Target::Roles, &roles).unwrap();
    json_sink.save(Target::Tags, &tags).unwrap();
    json_sink.commit().unwrap();

    // Only the live lookup knows bob.db's id.
    Mock::given(method("GET"))
        .and(path("/api/v1/roles/1/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "summary_fields": {"dependencies": [{"name": "bob.db", "id": 2}]}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let api = ApiConfig {
        base_url: format!("{}/api/v1/", mock_server.uri()),
        ..ApiConfig::default()
    };
    let lookup = HttpRoleLookup::new(
        build_http_client(&api).unwrap(),
        QueryBuilder::new(&api.base_url, false, 10).unwrap(),
    );
    let mut resolver = DependencyResolver::new(lookup);

    let mut sink = SqliteSink::new_in_memory().unwrap();
    sink.migrate().unwrap();

    let report = load_json_dir(dir.path(), &mut sink, &mut resolver)
        .await
        .unwrap();

    assert_eq!(report.records[&Target::Roles], 1);
    assert_eq!(report.records[&Target::Tags], 1);
    assert_eq!(report.dependencies, 1);
    assert_eq!(sink.count_dependencies().unwrap(), 1);

    let mapping = load_mapping(&dir.path().join(ROLE_ID_MAPPING_FILE)).unwrap();
    assert_eq!(mapping.get("bob.db"), Some(&2));
    assert_eq!(mapping.get("alice.web"), Some(&1));
}

#[tokio::test]
async fn test_in_memory_store_crawls_without_migrate() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v1/tags/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 1, "name": "web"}]
        })))
        .mount(&mock_server)
        .await;

    let mut config = sqlite_config(&mock_server, &dir);
    config.output.database_url = Some("sqlite://".to_string());
    galaxy_crawler::config::validate(&config).unwrap();

    let report = run_crawl(&config).await.unwrap();
    assert_eq!(report.records_saved, 1);
}
