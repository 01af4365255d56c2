//! Jira REST (v2) implementation of `IssueTracker`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{is_well_formed_key, IssueStatus, IssueTracker, TrackerError};

pub struct JiraClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<RawIssue>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    key: String,
    fields: RawFields,
}

#[derive(Debug, Deserialize)]
struct RawFields {
    status: RawStatus,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TransitionsResponse {
    #[serde(default)]
    transitions: Vec<RawTransition>,
}

#[derive(Debug, Deserialize)]
struct RawTransition {
    id: String,
    name: String,
    to: Option<RawStatus>,
}

impl JiraClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TrackerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TrackerError::ApiError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let url = format!("{}/rest/api/2{}", self.base_url, endpoint);
        let req = self.client.request(method, url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn check(response: Response, key: &str) -> Result<Response, TrackerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.as_u16() == 404 {
            return Err(TrackerError::NotFound(key.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(TrackerError::ApiError(format!(
            "HTTP {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        )))
    }

    async fn find_transition(&self, key: &str, status: &str) -> Result<String, TrackerError> {
        let response = self
            .request(Method::GET, &format!("/issue/{key}/transitions"))
            .send()
            .await?;
        let available: TransitionsResponse = Self::check(response, key).await?.json().await?;

        available
            .transitions
            .into_iter()
            .find(|t| {
                t.name.eq_ignore_ascii_case(status)
                    || t
                        .to
                        .as_ref()
                        .is_some_and(|to| to.name.eq_ignore_ascii_case(status))
            })
            .map(|t| t.id)
            .ok_or_else(|| TrackerError::NoTransition {
                key: key.to_string(),
                status: status.to_string(),
            })
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn is_valid_key(&self, key: &str) -> bool {
        if !is_well_formed_key(key) {
            return false;
        }

        let response = self
            .request(Method::GET, &format!("/issue/{key}"))
            .query(&[("fields", "status")])
            .send()
            .await;

        match response {
            Ok(r) => match Self::check(r, key).await {
                Ok(_) => true,
                Err(e) => {
                    debug!(key, error = %e, "issue lookup rejected key");
                    false
                }
            },
            Err(e) => {
                warn!(key, error = %e, "issue lookup failed");
                false
            }
        }
    }

    async fn assign(&self, key: &str, user: &str) -> Result<(), TrackerError> {
        let response = self
            .request(Method::PUT, &format!("/issue/{key}/assignee"))
            .json(&json!({ "name": user }))
            .send()
            .await?;
        Self::check(response, key).await?;
        Ok(())
    }

    async fn add_comment(&self, key: &str, body: &str) -> Result<(), TrackerError> {
        let response = self
            .request(Method::POST, &format!("/issue/{key}/comment"))
            .json(&json!({ "body": body }))
            .send()
            .await?;
        Self::check(response, key).await?;
        Ok(())
    }

    async fn set_status(&self, key: &str, status: &str) -> Result<(), TrackerError> {
        let transition_id = self.find_transition(key, status).await?;
        let response = self
            .request(Method::POST, &format!("/issue/{key}/transitions"))
            .json(&json!({ "transition": { "id": transition_id } }))
            .send()
            .await?;
        Self::check(response, key).await?;
        Ok(())
    }

    async fn query_many(&self, keys: &[String]) -> Result<Vec<IssueStatus>, TrackerError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let jql = format!("key in ({})", keys.join(","));
        let max_results = keys.len().to_string();
        let response = self
            .request(Method::GET, "/search")
            .query(&[
                ("jql", jql.as_str()),
                ("fields", "status"),
                ("maxResults", max_results.as_str()),
                ("validateQuery", "warn"),
            ])
            .send()
            .await?;

        let found: SearchResponse = Self::check(response, &keys.join(","))
            .await?
            .json()
            .await?;

        Ok(found
            .issues
            .into_iter()
            .map(|i| IssueStatus {
                key: i.key,
                status: i.fields.status.name,
            })
            .collect())
    }
}
