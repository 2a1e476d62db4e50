//! Jira REST adapter
//!
//! One outbound call per method, no retry and no caching. Errors carry the
//! upstream status and body so handlers can surface them as-is.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use testdeck_common::config::JiraConfig;

const DEFAULT_MAX_RESULTS: u32 = 50;
const MAX_RESULTS_CAP: u32 = 100;

#[derive(Debug, Error)]
pub enum JiraError {
    #[error("Jira request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Jira returned {status}: {body}")]
    Status { status: u16, body: String },
}

pub type JiraResult<T> = Result<T, JiraError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraProject {
    pub id: String,
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraIssue {
    pub key: String,
    pub summary: String,
    pub status: Option<String>,
    pub issue_type: Option<String>,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub updated: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuePage {
    pub total: u64,
    pub issues: Vec<JiraIssue>,
}

/// Filters for an issue search
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueQuery {
    pub project: Option<String>,
    pub status: Option<String>,
    pub max_results: Option<u32>,
}

impl IssueQuery {
    pub fn jql(&self) -> String {
        let quote = |v: &str| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\""));
        let mut clauses = Vec::new();
        if let Some(project) = self.project.as_deref().filter(|p| !p.is_empty()) {
            clauses.push(format!("project = {}", quote(project)));
        }
        if let Some(status) = self.status.as_deref().filter(|s| !s.is_empty()) {
            clauses.push(format!("status = {}", quote(status)));
        }
        let mut jql = clauses.join(" AND ");
        if !jql.is_empty() {
            jql.push(' ');
        }
        jql.push_str("ORDER BY updated DESC");
        jql
    }

    pub fn max_results(&self) -> u32 {
        self.max_results
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, MAX_RESULTS_CAP)
    }
}

#[derive(Deserialize)]
struct RawSearch {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    issues: Vec<RawIssue>,
}

#[derive(Deserialize)]
struct RawIssue {
    key: String,
    #[serde(default)]
    fields: RawFields,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFields {
    #[serde(default)]
    summary: String,
    status: Option<Named>,
    issuetype: Option<Named>,
    priority: Option<Named>,
    assignee: Option<Person>,
    updated: Option<String>,
}

#[derive(Deserialize)]
struct Named {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Person {
    display_name: String,
}

impl From<RawIssue> for JiraIssue {
    fn from(raw: RawIssue) -> Self {
        let f = raw.fields;
        Self {
            key: raw.key,
            summary: f.summary,
            status: f.status.map(|n| n.name),
            issue_type: f.issuetype.map(|n| n.name),
            priority: f.priority.map(|n| n.name),
            assignee: f.assignee.map(|p| p.display_name),
            updated: f.updated,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JiraClient {
    http: reqwest::Client,
    api_base: String,
    username: Option<String>,
    api_token: Option<String>,
}

impl JiraClient {
    /// `None` when no host is configured
    pub fn from_config(config: &JiraConfig) -> JiraResult<Option<Self>> {
        if !config.is_configured() {
            return Ok(None);
        }
        let host = config.host.as_deref().unwrap_or_default().trim().trim_end_matches('/');
        let origin = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(!config.strict_ssl)
            .build()?;

        Ok(Some(Self {
            http,
            api_base: format!("{}/rest/api/{}", origin, config.api_version),
            username: config.username.clone(),
            api_token: config.api_token.clone(),
        }))
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.http.get(format!("{}{}", self.api_base, path));
        match &self.username {
            Some(user) => request.basic_auth(user, self.api_token.as_deref()),
            None => request,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> JiraResult<T> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Jira responded with {}: {}", status, body);
            return Err(JiraError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    pub async fn get_projects(&self) -> JiraResult<Vec<JiraProject>> {
        debug!("Fetching Jira projects");
        self.send(self.get("/project")).await
    }

    pub async fn get_issues(&self, query: &IssueQuery) -> JiraResult<IssuePage> {
        let jql = query.jql();
        debug!("Searching Jira issues: {}", jql);
        let request = self
            .get("/search")
            .query(&[("jql", jql), ("maxResults", query.max_results().to_string())]);
        let raw: RawSearch = self.send(request).await?;
        Ok(IssuePage {
            total: raw.total,
            issues: raw.issues.into_iter().map(JiraIssue::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn config(host: &str) -> JiraConfig {
        JiraConfig {
            host: Some(host.to_string()),
            username: Some("bot@example.com".to_string()),
            api_token: Some("secret".to_string()),
            ..JiraConfig::default()
        }
    }

    #[test]
    fn test_unconfigured_is_none() {
        assert!(JiraClient::from_config(&JiraConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_host_without_scheme() {
        let client = JiraClient::from_config(&config("acme.atlassian.net/")).unwrap().unwrap();
        assert_eq!(client.api_base(), "https://acme.atlassian.net/rest/api/2");
    }

    #[test]
    fn test_jql() {
        assert_eq!(IssueQuery::default().jql(), "ORDER BY updated DESC");
        let query = IssueQuery {
            project: Some("WEB".into()),
            status: Some("In \"Progress\"".into()),
            max_results: Some(500),
        };
        assert_eq!(
            query.jql(),
            r#"project = "WEB" AND status = "In \"Progress\"" ORDER BY updated DESC"#
        );
        assert_eq!(query.max_results(), 100);
    }

    #[tokio::test]
    async fn test_get_projects() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/api/2/project")
            .match_header("authorization", Matcher::Regex("^Basic ".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id":"10000","key":"WEB","name":"Website","self":"x"}]"#)
            .create_async()
            .await;

        let client = JiraClient::from_config(&config(&server.url())).unwrap().unwrap();
        let projects = client.get_projects().await.unwrap();

        mock.assert_async().await;
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].key, "WEB");
    }

    #[tokio::test]
    async fn test_get_issues_maps_fields() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/rest/api/2/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("jql".into(), r#"project = "WEB" ORDER BY updated DESC"#.into()),
                Matcher::UrlEncoded("maxResults".into(), "10".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"total":1,"issues":[{"key":"WEB-1","fields":{"summary":"Broken login",
                "status":{"name":"Open"},"issuetype":{"name":"Bug"},
                "assignee":{"displayName":"Sam"},"updated":"2026-01-01T00:00:00.000+0000"}}]}"#,
            )
            .create_async()
            .await;

        let client = JiraClient::from_config(&config(&server.url())).unwrap().unwrap();
        let page = client
            .get_issues(&IssueQuery {
                project: Some("WEB".into()),
                status: None,
                max_results: Some(10),
            })
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        let issue = &page.issues[0];
        assert_eq!(issue.key, "WEB-1");
        assert_eq!(issue.status.as_deref(), Some("Open"));
        assert_eq!(issue.assignee.as_deref(), Some("Sam"));
        assert!(issue.priority.is_none());
    }

    #[tokio::test]
    async fn test_upstream_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/rest/api/2/project")
            .with_status(401)
            .with_body("Unauthorized")
            .create_async()
            .await;

        let client = JiraClient::from_config(&config(&server.url())).unwrap().unwrap();
        match client.get_projects().await {
            Err(JiraError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "Unauthorized");
            }
            other => panic!("unexpected: {:?}", other.map(|p| p.len())),
        }
    }
}
