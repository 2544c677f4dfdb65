use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_ssm::error::DisplayErrorContext;
use tracing::{debug, info, warn};

use crate::error::RelayError;

/// A registered bot account: a display name and its Bot API token.
#[derive(Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub name: String,
    pub credential: String,
}

impl BotIdentity {
    pub fn new(name: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            credential: credential.into(),
        }
    }
}

// Tokens must not end up in logs.
impl fmt::Debug for BotIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotIdentity")
            .field("name", &self.name)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// One key/value entry read from the parameter store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub key: Option<String>,
    pub value: Option<String>,
}

/// Read access to the external configuration store.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Every parameter directly under `prefix`, decrypted.
    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<Parameter>, RelayError>;

    /// The value of a single named parameter.
    async fn get_scalar(&self, name: &str) -> Result<String, RelayError>;
}

/// [`ParameterStore`] backed by AWS Systems Manager Parameter Store.
pub struct SsmParameterStore {
    client: aws_sdk_ssm::Client,
}

impl SsmParameterStore {
    pub fn new(client: aws_sdk_ssm::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ParameterStore for SsmParameterStore {
    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<Parameter>, RelayError> {
        let mut parameters = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let page = self
                .client
                .get_parameters_by_path()
                .path(prefix)
                .with_decryption(true)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| {
                    RelayError::ConfigUnavailable(format!(
                        "GetParametersByPath {}: {}",
                        prefix,
                        DisplayErrorContext(&e)
                    ))
                })?;

            parameters.extend(page.parameters().iter().map(|p| Parameter {
                key: p.name().map(str::to_string),
                value: p.value().map(str::to_string),
            }));

            match page.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        debug!("Read {} parameters under {}", parameters.len(), prefix);
        Ok(parameters)
    }

    async fn get_scalar(&self, name: &str) -> Result<String, RelayError> {
        let output = self
            .client
            .get_parameter()
            .name(name)
            .send()
            .await
            .map_err(|e| {
                RelayError::ConfigUnavailable(format!(
                    "GetParameter {}: {}",
                    name,
                    DisplayErrorContext(&e)
                ))
            })?;

        output
            .parameter()
            .and_then(|p| p.value())
            .map(str::to_string)
            .ok_or_else(|| RelayError::ConfigUnavailable(format!("parameter {} has no value", name)))
    }
}

/// Resolves the bot accounts registered under a parameter prefix.
pub struct IdentitySource {
    store: Arc<dyn ParameterStore>,
    prefix: String,
}

impl IdentitySource {
    pub fn new(store: Arc<dyn ParameterStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Read every token under the prefix; the key remainder is the bot name.
    pub async fn list_identities(&self) -> Result<Vec<BotIdentity>, RelayError> {
        let parameters = self.store.get_by_prefix(&self.prefix).await?;

        let identities = parameters
            .into_iter()
            .map(|p| identity_from_parameter(&self.prefix, p))
            .collect::<Result<Vec<_>, _>>()?;

        if identities.is_empty() {
            warn!("No bot tokens found under {}", self.prefix);
        }
        for identity in &identities {
            info!("Found bot '{}'", identity.name);
        }

        Ok(identities)
    }
}

fn identity_from_parameter(prefix: &str, parameter: Parameter) -> Result<BotIdentity, RelayError> {
    let key = parameter
        .key
        .ok_or_else(|| RelayError::ConfigMalformed("parameter without a name".to_string()))?;

    let name = key
        .strip_prefix(prefix)
        .map(|rest| rest.trim_start_matches('/'))
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| {
            RelayError::ConfigMalformed(format!("cannot derive bot name from {}", key))
        })?
        .to_string();

    let credential = parameter
        .value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RelayError::ConfigMalformed(format!("parameter {} has no value", key)))?;

    Ok(BotIdentity::new(name, credential))
}
