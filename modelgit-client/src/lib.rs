//! # modelgit-client
//!
//! Blocking client for modelgit collaboration servers.
//!
//! ## Example
//!
//! ```no_run
//! use modelgit_client::CollaborationClient;
//! use modelgit_core::{Change, DiffType, LibraryCheck, ModelType};
//!
//! let client = CollaborationClient::new("http://localhost:3030", "lca/steel")
//!     .unwrap()
//!     .with_credentials("ann", "secret");
//!
//! let changes = vec![Change::new(ModelType::Flow, "A", "elementary/CO2", DiffType::Modified)];
//! let restrictions = client.check(&changes).unwrap();
//! for r in restrictions {
//!     println!("{} is part of {}", r.dataset_ref_id, r.library_name);
//! }
//! ```

use modelgit_core::config::RemoteConfig;
use modelgit_core::library::{enrich, split_repository_id, validate_request, RemoteRestriction};
use modelgit_core::{
    Change, CommitResult, Error, LibraryCheck, LibraryRestriction, PushPack, Remote, Result,
};
use reqwest::blocking::Response;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

pub const SESSION_COOKIE: &str = "JSESSIONID";

/// Sessions are opened on the first request that needs one, never when the
/// client is built.
pub struct CollaborationClient {
    base_url: String,
    group: String,
    name: String,
    credentials: Option<(String, String)>,
    session_id: Mutex<Option<String>>,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    session_id: String,
}

fn web_error(e: reqwest::Error) -> Error {
    Error::WebRequest {
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}

fn unexpected(response: Response) -> Error {
    let status = response.status();
    let message = response
        .text()
        .ok()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unexpected status").to_string());
    Error::WebRequest {
        status: Some(status.as_u16()),
        message,
    }
}

impl CollaborationClient {
    /// Create a client for the repository `group/name` on `base_url`.
    pub fn new(base_url: impl Into<String>, repository_id: &str) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let (group, name) = split_repository_id(repository_id)?;
        Ok(Self {
            base_url,
            group: group.to_string(),
            name: name.to_string(),
            credentials: None,
            session_id: Mutex::new(None),
            client: reqwest::blocking::Client::new(),
        })
    }

    /// Builds a client from the `[remote]` section. A configured session wins
    /// over credentials. No request is sent.
    pub fn from_config(remote: &RemoteConfig) -> Result<Self> {
        let client = Self::new(remote.url.clone(), &remote.repository_id)?;
        Ok(match (&remote.session_id, &remote.username, &remote.password) {
            (Some(id), _, _) => client.with_session(id.clone()),
            (None, Some(user), Some(password)) => client.with_credentials(user, password),
            _ => client,
        })
    }

    pub fn with_session(self, session_id: impl Into<String>) -> Self {
        *self.session_slot() = Some(session_id.into());
        self
    }

    /// Logs in with these credentials before the first request without a session.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_slot().clone()
    }

    fn session_slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.session_id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn repository_id(&self) -> String {
        format!("{}/{}", self.group, self.name)
    }

    /// Opens a session and keeps its id for later requests.
    pub fn login(&self, username: &str, password: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/login", self.base_url))
            .json(&LoginRequest { username, password })
            .send()
            .map_err(web_error)?;
        if response.status() != StatusCode::OK {
            return Err(unexpected(response));
        }

        let body: LoginResponse = response.json().map_err(web_error)?;
        info!("Logged in to {} as {}", self.base_url, username);
        *self.session_slot() = Some(body.session_id.clone());
        Ok(body.session_id)
    }

    fn ensure_session(&self) -> Result<Option<String>> {
        if let Some(id) = self.session_id() {
            return Ok(Some(id));
        }
        match &self.credentials {
            Some((username, password)) => self.login(username, password).map(Some),
            None => Ok(None),
        }
    }

    /// Check server health
    pub fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .map_err(web_error)?;

        Ok(response.status().is_success())
    }

    fn post(&self, endpoint: &str) -> Result<reqwest::blocking::RequestBuilder> {
        let session = self.ensure_session()?;
        let request = self
            .client
            .post(format!("{}/{}", self.base_url, endpoint))
            .query(&[("group", self.group.as_str()), ("name", self.name.as_str())]);
        Ok(match session {
            Some(id) => request.header(
                reqwest::header::COOKIE,
                format!("{}={}", SESSION_COOKIE, id),
            ),
            None => request,
        })
    }
}

impl LibraryCheck for CollaborationClient {
    /// `204` means nothing is restricted; `200` lists the restrictions.
    /// Every other status is a failure carrying that status.
    fn check(&self, changes: &[Change]) -> Result<Vec<LibraryRestriction>> {
        validate_request(&self.base_url, changes)?;
        let ref_ids: Vec<&str> = changes.iter().map(|c| c.ref_id.as_str()).collect();

        let response = self
            .post("library")?
            .json(&ref_ids)
            .send()
            .map_err(web_error)?;

        match response.status() {
            StatusCode::NO_CONTENT => {
                debug!("No library restrictions for {} changes", changes.len());
                Ok(Vec::new())
            }
            StatusCode::OK => {
                let restrictions: Vec<RemoteRestriction> = response.json().map_err(web_error)?;
                enrich(restrictions, changes)
            }
            _ => Err(unexpected(response)),
        }
    }
}

impl Remote for CollaborationClient {
    /// `200` and `409` both carry a [`CommitResult`].
    fn push(&self, pack: &PushPack) -> Result<CommitResult> {
        let response = self.post("push")?.json(pack).send().map_err(web_error)?;

        match response.status() {
            StatusCode::OK | StatusCode::CONFLICT => response.json().map_err(web_error),
            _ => Err(unexpected(response)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = CollaborationClient::new("http://localhost:3030/", "lca/steel").unwrap();
        assert_eq!(client.base_url, "http://localhost:3030");
        assert_eq!(client.repository_id(), "lca/steel");
        assert!(client.session_id().is_none());
    }

    #[test]
    fn test_invalid_repository_id() {
        assert!(matches!(
            CollaborationClient::new("http://localhost:3030", "steel"),
            Err(Error::Precondition(_))
        ));
    }

    #[test]
    fn test_check_rejects_empty_request() {
        let client = CollaborationClient::new("http://localhost:3030", "lca/steel").unwrap();
        assert!(matches!(client.check(&[]), Err(Error::Precondition(_))));
    }

    #[test]
    fn test_from_config_uses_session() {
        let remote = RemoteConfig {
            url: "http://localhost:3030".to_string(),
            repository_id: "lca/steel".to_string(),
            collaboration_server: true,
            session_id: Some("abc".to_string()),
            username: None,
            password: None,
        };
        let client = CollaborationClient::from_config(&remote).unwrap();
        assert_eq!(client.session_id().as_deref(), Some("abc"));
    }

    #[test]
    fn test_from_config_defers_login() {
        let remote = RemoteConfig {
            url: "http://127.0.0.1:1".to_string(),
            repository_id: "lca/steel".to_string(),
            collaboration_server: true,
            session_id: None,
            username: Some("ann".to_string()),
            password: Some("secret".to_string()),
        };
        let client = CollaborationClient::from_config(&remote).unwrap();
        assert!(client.session_id().is_none());

        let changes = vec![Change::new(
            modelgit_core::ModelType::Flow,
            "A",
            "A",
            modelgit_core::DiffType::Added,
        )];
        let err = client.check(&changes).unwrap_err();
        assert!(matches!(err, Error::WebRequest { status: None, .. }));
    }
}
