//! Integration tests against a mock Galaxy API

mod crawl_tests;
mod storage_tests;
