//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the
//! full fetch, filter and store cycle end-to-end.

use galaxy_crawler::config::{ApiConfig, Config, CrawlerConfig, OutputConfig};
use galaxy_crawler::crawler::{run_crawl, FetcherOutcome};
use galaxy_crawler::query::Target;
use galaxy_crawler::storage::{list_batches, read_target, BatchFile};
use galaxy_crawler::CrawlerError;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration crawling `targets` from the mock server
fn create_test_config(server: &MockServer, targets: &[&str], filters: &[&str], out: &TempDir) -> Config {
    Config {
        api: ApiConfig {
            base_url: format!("{}/api/v1/", server.uri()),
            timeout_secs: 5,
            connect_timeout_secs: 5,
            ..ApiConfig::default()
        },
        crawler: CrawlerConfig {
            interval_secs: 0,
            retry: 2,
            page_size: 10,
            receive_timeout_secs: 1,
            targets: targets.iter().map(|t| t.to_string()).collect(),
            filters: filters.iter().map(|f| f.to_string()).collect(),
            ..CrawlerConfig::default()
        },
        output: OutputConfig {
            directory: out.path().to_string_lossy().to_string(),
            formats: vec!["json".to_string()],
            database_url: None,
        },
    }
}

fn roles_page(downloads: &[u64]) -> Value {
    let results: Vec<Value> = downloads
        .iter()
        .enumerate()
        .map(|(i, d)| {
            json!({
                "id": i + 1,
                "name": format!("role{}", i + 1),
                "download_count": d,
                "summary_fields": {"namespace": {"name": "acme"}, "dependencies": []}
            })
        })
        .collect();
    json!({ "count": results.len(), "results": results })
}

#[tokio::test]
async fn test_crawl_stops_at_first_record_below_threshold() {
    let mock_server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v1/roles/"))
        .and(query_param("page", "1"))
        .and(query_param("order_by", "-repository__download_count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(roles_page(&[1000, 600, 400])))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server, &["roles"], &["download>500"], &out);
    let report = run_crawl(&config).await.unwrap();

    assert!(report.early_stopped);
    assert!(!report.interrupted);
    assert_eq!(report.records_saved, 2);
    assert_eq!(report.pages_parsed, 1);

    let batches = list_batches(out.path(), Target::Roles).unwrap();
    assert_eq!(batches.len(), 1);
    let batch = BatchFile::read(&batches[0].1).unwrap();
    let downloads: Vec<u64> = batch
        .json
        .iter()
        .map(|r| r["download_count"].as_u64().unwrap())
        .collect();
    assert_eq!(downloads, vec![1000, 600]);
}

#[tokio::test]
async fn test_crawl_walks_targets_and_shrinks_around_server_errors() {
    let mock_server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v1/tags/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 1, "name": "web"}, {"id": 2, "name": "db"}]
        })))
        .mount(&mock_server)
        .await;

    // The first page of ten roles breaks the server; single-role pages work.
    Mock::given(method("GET"))
        .and(path("/api/v1/roles/"))
        .and(query_param("page", "1"))
        .and(query_param("page_size", "10"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/roles/"))
        .and(query_param("page_size", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(roles_page(&[700])))
        .mount(&mock_server)
        .await;

    // Unmatched requests (page 2 of each target) get wiremock's 404.
    let config = create_test_config(&mock_server, &["tags", "roles"], &[], &out);
    let report = run_crawl(&config).await.unwrap();

    assert_eq!(report.fetcher, FetcherOutcome::Completed);
    assert!(!report.early_stopped);
    assert_eq!(report.pages_fetched, 11);
    assert_eq!(report.pages_parsed, 11);
    assert_eq!(report.records_saved, 12);

    assert_eq!(read_target(out.path(), Target::Tags).unwrap().len(), 2);
    assert_eq!(read_target(out.path(), Target::Roles).unwrap().len(), 10);
}

#[tokio::test]
async fn test_crawl_fails_after_retry_budget() {
    let mock_server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v1/tags/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server, &["tags"], &[], &out);
    let result = run_crawl(&config).await;

    assert!(matches!(
        result,
        Err(CrawlerError::RequestFailed { attempts: 3, .. })
    ));
}
