//! Live lookups of a role's dependency list

use crate::query::QueryBuilder;
use crate::record::{role_dependencies, DependencyRef};
use crate::resolver::ResolveError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;

/// Source of a role's full dependency list, ids included
#[async_trait]
pub trait RoleLookup: Send + Sync {
    async fn dependencies_of(&self, role_id: i64) -> Result<Vec<DependencyRef>, ResolveError>;
}

/// Looks roles up with `GET <base>/roles/<id>/`
pub struct HttpRoleLookup {
    client: Client,
    builder: QueryBuilder,
}

impl HttpRoleLookup {
    pub fn new(client: Client, builder: QueryBuilder) -> Self {
        Self { client, builder }
    }
}

#[async_trait]
impl RoleLookup for HttpRoleLookup {
    async fn dependencies_of(&self, role_id: i64) -> Result<Vec<DependencyRef>, ResolveError> {
        let url = self.builder.role_url(role_id)?;
        let response = self
            .client
            .get(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("Get {}: {}", status.as_u16(), url);
        if !status.is_success() {
            return Err(ResolveError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await?;
        let record = body.as_object().ok_or_else(|| {
            ResolveError::MalformedResponse(format!("{} did not return an object", url))
        })?;
        Ok(role_dependencies(record))
    }
}
