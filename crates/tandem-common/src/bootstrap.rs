//! Initial session fetch.
//!
//! The seed snapshot is fetched once per session attach, before the channel
//! delivers its first broadcast. Failure is terminal for that session view.

use std::future::Future;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::SyncConfig;
use crate::error::BootstrapError;
use crate::identity::SessionKey;

/// Session state returned by the server when a client attaches.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InitialSession {
    pub text: String,
    pub language: String,
    pub input_text: String,
    pub stdout: String,
    pub stderr: String,
}

impl InitialSession {
    pub fn new(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
            ..Default::default()
        }
    }
}

/// Source of the initial session state.
pub trait SessionBootstrap: Send + Sync {
    fn fetch(
        &self,
        key: &SessionKey,
    ) -> impl Future<Output = Result<InitialSession, BootstrapError>> + Send;
}

/// A fixed seed, for tests and offline demos.
impl SessionBootstrap for InitialSession {
    async fn fetch(&self, _key: &SessionKey) -> Result<InitialSession, BootstrapError> {
        Ok(self.clone())
    }
}

/// Fetches `GET {api_url}{session_id}`.
#[derive(Debug, Clone)]
pub struct HttpBootstrap {
    client: reqwest::Client,
    api_url: String,
    retries: u32,
}

impl HttpBootstrap {
    /// Retries after the first failure before giving up.
    pub const DEFAULT_RETRIES: u32 = 2;

    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            retries: Self::DEFAULT_RETRIES,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.api_url.clone())
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn session_url(&self, key: &SessionKey) -> Result<Url, BootstrapError> {
        let raw = format!("{}{}", self.api_url, key.session_id);
        Url::parse(&raw).map_err(|source| BootstrapError::InvalidUrl { url: raw, source })
    }

    async fn fetch_once(&self, url: Url) -> Result<InitialSession, BootstrapError> {
        self.client
            .get(url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(BootstrapError::Request)?
            .json::<InitialSession>()
            .await
            .map_err(BootstrapError::Request)
    }
}

impl SessionBootstrap for HttpBootstrap {
    async fn fetch(&self, key: &SessionKey) -> Result<InitialSession, BootstrapError> {
        let url = self.session_url(key)?;
        let mut attempt = 0;
        loop {
            match self.fetch_once(url.clone()).await {
                Ok(session) => {
                    tracing::debug!(session = %key.session_id, attempt, "fetched initial session");
                    return Ok(session);
                }
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(session = %key.session_id, attempt, error = %e, "session fetch failed, retrying");
                }
                Err(e) => {
                    tracing::error!(session = %key.session_id, error = %e, "session fetch failed");
                    return Err(BootstrapError::SessionInvalid {
                        session_id: key.session_id.clone(),
                        source: Box::new(e),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UserId;

    fn key() -> SessionKey {
        SessionKey::new("abc", UserId::new("u"))
    }

    #[test]
    fn test_decode_get_session_response() {
        let json = r#"{"Text":"fn main() {}","Language":"rust","InputText":"","Stdout":"hi","Stderr":""}"#;
        let session: InitialSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.text, "fn main() {}");
        assert_eq!(session.language, "rust");
        assert_eq!(session.stdout, "hi");

        // Older servers only send text and language.
        let session: InitialSession =
            serde_json::from_str(r#"{"Text":"x","Language":"go"}"#).unwrap();
        assert_eq!(session, InitialSession::new("x", "go"));
    }

    #[test]
    fn test_session_url() {
        let bootstrap = HttpBootstrap::new("http://localhost:5000/api/");
        assert_eq!(
            bootstrap.session_url(&key()).unwrap().as_str(),
            "http://localhost:5000/api/abc"
        );
    }

    #[tokio::test]
    async fn test_static_seed() {
        let seed = InitialSession::new("hello", "python");
        assert_eq!(seed.fetch(&key()).await.unwrap(), seed);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_session_invalid() {
        let bootstrap = HttpBootstrap::new("http://127.0.0.1:1/api/").with_retries(1);
        let err = bootstrap.fetch(&key()).await.unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::SessionInvalid { ref session_id, .. } if session_id == "abc"
        ));
    }
}
