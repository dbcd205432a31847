//! Content store reached over HTTP
//!
//! Speaks to the persistence endpoints served by [`crate::server`] (or any
//! service with the same surface): `GET /api/load-content` and
//! `POST /api/save-content`, both carrying the whole document.

use crate::content_model::TableOfContents;
use crate::store::{ContentStore, StoreError};
use serde::de::DeserializeOwned;
use std::io::BufReader;

/// Path of the load endpoint
pub const LOAD_PATH: &str = "/api/load-content";
/// Path of the save endpoint
pub const SAVE_PATH: &str = "/api/save-content";

/// [`ContentStore`] backed by the HTTP persistence endpoints
#[derive(Debug, Clone)]
pub struct HttpStore {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpStore {
    /// Store talking to the service at `base_url` (e.g. `http://127.0.0.1:9002`)
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl ContentStore for HttpStore {
    fn load(&self) -> Result<Option<TableOfContents>, StoreError> {
        let response = match self.agent.get(&self.url(LOAD_PATH)).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => return Ok(None),
            Err(e) => return Err(map_ureq_error(e)),
        };

        let toc = read_json(response).map_err(|e| {
            if e.is_io() {
                StoreError::Transport(e.to_string())
            } else {
                StoreError::Json(e)
            }
        })?;
        Ok(Some(toc))
    }

    fn save(&self, toc: &TableOfContents) -> Result<(), StoreError> {
        let body = serde_json::to_string(toc)?;
        self.agent
            .post(&self.url(SAVE_PATH))
            .set("Content-Type", "application/json")
            .send_string(&body)
            .map_err(map_ureq_error)?;
        log::debug!("Saved {} chapters to {}", toc.len(), self.base_url);
        Ok(())
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

/// Parse a JSON response body straight from the connection
///
/// Unlike `Response::into_string`, this has no size cap, so documents
/// carrying large inline images still load.
pub(crate) fn read_json<T: DeserializeOwned>(response: ureq::Response) -> serde_json::Result<T> {
    serde_json::from_reader(BufReader::new(response.into_reader()))
}

/// Turn a ureq failure into a store error, keeping the server's message
fn map_ureq_error(error: ureq::Error) -> StoreError {
    match error {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            StoreError::Status {
                status,
                message: error_message(&body),
            }
        }
        ureq::Error::Transport(transport) => StoreError::Transport(transport.to_string()),
    }
}

/// Pull `error` out of a JSON error payload, or fall back to the raw body
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("error")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let store = HttpStore::new("http://localhost:9002/");
        assert_eq!(store.base_url(), "http://localhost:9002");
        assert_eq!(store.url(LOAD_PATH), "http://localhost:9002/api/load-content");
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"error":"Failed to save content"}"#),
            "Failed to save content"
        );
        assert_eq!(error_message("  Bad Gateway \n"), "Bad Gateway");
    }

    #[test]
    fn test_unreachable_server_is_transport_error() {
        // port 9 (discard) on loopback is not expected to be listening
        let store = HttpStore::new("http://127.0.0.1:9");
        assert!(matches!(store.load(), Err(StoreError::Transport(_))));
    }
}
