use crate::error::{EtlError, Result};
use serde::Deserialize;

/// OAuth client id/secret pair.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn into_pair(self) -> (String, String) {
        (self.client_id, self.client_secret)
    }
}

/// Resolves an opaque credential reference into client credentials.
pub trait CredentialProvider: Send + Sync {
    fn load(&self, secret_id: &str) -> Result<ClientCredentials>;
}

/// Reads `{"client_id": .., "client_secret": ..}` from the environment variable
/// named after the credential reference (upper-cased), e.g. `GENESYS_SECRETS`.
pub struct EnvCredentialProvider;

impl EnvCredentialProvider {
    pub fn variable_name(secret_id: &str) -> String {
        secret_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn load(&self, secret_id: &str) -> Result<ClientCredentials> {
        let var = Self::variable_name(secret_id);
        let raw = std::env::var(&var)
            .map_err(|e| EtlError::Config(format!("credential variable {var}: {e}")))?;
        parse_credentials(&raw)
    }
}

pub fn parse_credentials(raw: &str) -> Result<ClientCredentials> {
    let creds: ClientCredentials = serde_json::from_str(raw)?;
    if creds.client_id.is_empty() {
        return Err(EtlError::MissingField("client_id".into()));
    }
    Ok(creds)
}
