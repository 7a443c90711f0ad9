//! Shared HTTP client used for index, icon and archive downloads

use crate::config::HttpConfig;
use crate::error::{ConfigError, Result};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::{Certificate, Client, Response};
use std::time::Duration;
use tracing::{debug, info};

/// Product token of the User-Agent header
pub const USER_AGENT_PRODUCT: &str = "chart-repo";

/// Builds the User-Agent value: `chart-repo/<version>`, followed by
/// ` (<comment>)` when a non-empty comment is configured.
///
/// ```rust
/// use chart_repo::http::user_agent;
///
/// let ua = user_agent(Some("kubeapps/v2"));
/// assert!(ua.starts_with("chart-repo/"));
/// assert!(ua.ends_with(" (kubeapps/v2)"));
/// ```
pub fn user_agent(comment: Option<&str>) -> String {
    let base = format!("{}/{}", USER_AGENT_PRODUCT, env!("CARGO_PKG_VERSION"));
    match comment.map(str::trim).filter(|c| !c.is_empty()) {
        Some(comment) => format!("{base} ({comment})"),
        None => base,
    }
}

/// HTTP client shared by every request of a sync run.
///
/// Every request carries the configured User-Agent and, when the repository
/// requires it, the caller supplied `Authorization` header.
#[derive(Debug, Clone)]
pub struct NetClient {
    client: Client,
    user_agent: String,
}

impl NetClient {
    /// Creates the client from configuration.
    ///
    /// When `additional_ca_file` exists its certificates are added to the
    /// trusted roots. A missing file is not an error.
    pub async fn new(config: &HttpConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .connect_timeout(Duration::from_secs(config.timeout.min(5)));

        let ca_path = config.additional_ca_file.clone();
        if tokio::fs::try_exists(&ca_path).await.unwrap_or(false) {
            let pem = tokio::fs::read(&ca_path).await?;
            let certs =
                Certificate::from_pem_bundle(&pem).map_err(|e| ConfigError::InvalidCaBundle {
                    path: ca_path.clone(),
                    message: e.to_string(),
                })?;
            info!(path = %ca_path.display(), count = certs.len(), "Loaded additional CA certificates");
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        } else {
            debug!(path = %ca_path.display(), "No additional CA bundle found");
        }

        Ok(Self {
            client: builder.build()?,
            user_agent: user_agent(config.user_agent_comment.as_deref()),
        })
    }

    /// Wraps an already configured [`reqwest::Client`].
    pub fn from_client(client: Client, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Issues a GET request. Non-2xx responses are returned as-is; status
    /// handling belongs to the caller.
    pub async fn get(
        &self,
        url: &str,
        authorization: Option<&str>,
    ) -> std::result::Result<Response, reqwest::Error> {
        let mut request = self
            .client
            .get(url)
            .header(USER_AGENT, self.user_agent.as_str());
        if let Some(auth) = authorization.filter(|a| !a.is_empty()) {
            request = request.header(AUTHORIZATION, auth);
        }
        request.send().await
    }
}
