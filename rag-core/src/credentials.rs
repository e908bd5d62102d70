//! Credential and session provider for backend adapters.
//!
//! Adapters (embedder, generator, vector store) obtain a [`ClientHandle`]
//! once, at construction time. The pipeline itself never talks to the
//! provider.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{RagError, Result};
use crate::settings::{ConfigProvider, as_string, as_u64};

/// Identity that backend calls are made under.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub region: Option<String>,
    pub profile: Option<String>,
    /// Set when the session was obtained through [`CredentialProvider::assume_role`].
    pub assumed_role_arn: Option<String>,
}

/// Everything an adapter needs to reach one backend service.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub service: String,
    /// Base URL of the service, if configured.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub session: Session,
    pub request_timeout: Duration,
}

impl ClientHandle {
    /// The endpoint, or a credentials error naming the missing setting.
    pub fn require_endpoint(&self) -> Result<&str> {
        self.endpoint.as_deref().ok_or_else(|| {
            RagError::Credentials(format!(
                "no endpoint configured for service '{}' (set endpoints.{} or {}_ENDPOINT)",
                self.service,
                self.service,
                env_prefix(&self.service)
            ))
        })
    }
}

/// Acquires sessions and per-service client handles.
pub trait CredentialProvider: Send + Sync {
    /// The default session.
    fn session(&self) -> &Session;

    /// Return a session acting under the given role.
    fn assume_role(&self, role_arn: &str) -> Result<Session>;

    /// Build a handle for `service`, optionally under an assumed role.
    fn get_client(&self, service: &str, assumed_role_arn: Option<&str>) -> Result<ClientHandle>;
}

fn env_prefix(service: &str) -> String {
    service
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Check that `arn` names an IAM role: `arn:<partition>:iam::<account>:role/<name>`.
pub fn validate_role_arn(arn: &str) -> Result<()> {
    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    let valid = matches!(
        parts.as_slice(),
        ["arn", partition, "iam", "", account, resource]
            if !partition.is_empty()
                && account.len() == 12
                && account.chars().all(|c| c.is_ascii_digit())
                && resource.strip_prefix("role/").is_some_and(|name| !name.is_empty())
    );
    if valid {
        Ok(())
    } else {
        Err(RagError::Credentials(format!("'{arn}' is not an IAM role ARN")))
    }
}

/// A [`CredentialProvider`] that resolves everything from configuration.
///
/// - region/profile: `AWS_REGION`, `AWS_PROFILE`
/// - endpoint: `<SERVICE>_ENDPOINT`, then `endpoints.<service>` in the config file
/// - API key: `<SERVICE>_API_KEY`
/// - timeout: `request_timeout_secs` (default 120)
///
/// `<SERVICE>` is the service name upper-cased with non-alphanumerics
/// replaced by `_` (`bedrock-runtime` → `BEDROCK_RUNTIME`).
pub struct EnvCredentialProvider {
    config: Arc<dyn ConfigProvider>,
    session: Session,
    request_timeout: Duration,
}

impl EnvCredentialProvider {
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        let session = Session {
            region: as_string(&config.get("AWS_REGION", Value::Null)),
            profile: as_string(&config.get("AWS_PROFILE", Value::Null)),
            assumed_role_arn: None,
        };
        match &session.profile {
            Some(profile) => info!(profile = %profile, region = ?session.region, "using named profile"),
            None => info!(region = ?session.region, "using default session"),
        }
        let request_timeout = Duration::from_secs(
            as_u64(&config.get("request_timeout_secs", Value::Null)).unwrap_or(120),
        );
        Self { config, session, request_timeout }
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn session(&self) -> &Session {
        &self.session
    }

    fn assume_role(&self, role_arn: &str) -> Result<Session> {
        validate_role_arn(role_arn)?;
        info!(role_arn, "assumed role");
        Ok(Session { assumed_role_arn: Some(role_arn.to_string()), ..self.session.clone() })
    }

    fn get_client(&self, service: &str, assumed_role_arn: Option<&str>) -> Result<ClientHandle> {
        let session = match assumed_role_arn {
            Some(arn) => self.assume_role(arn)?,
            None => self.session.clone(),
        };

        let prefix = env_prefix(service);
        let configured_endpoint = self
            .config
            .get("endpoints", Value::Null)
            .get(service)
            .cloned()
            .unwrap_or(Value::Null);
        let endpoint = as_string(&self.config.get(&format!("{prefix}_ENDPOINT"), configured_endpoint))
            .map(|url| url.trim_end_matches('/').to_string());
        let api_key = as_string(&self.config.get(&format!("{prefix}_API_KEY"), Value::Null));

        debug!(service, endpoint = ?endpoint, has_api_key = api_key.is_some(), "built client handle");

        Ok(ClientHandle {
            service: service.to_string(),
            endpoint,
            api_key,
            session,
            request_timeout: self.request_timeout,
        })
    }
}
