use crate::apis::models::{ContactScanResponse, ConversationQueryResponse, UserListResponse};
use crate::apis::{ApiError, GenesysApi};
use crate::credentials::ClientCredentials;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Genesys Cloud client authorised with the OAuth client-credentials grant.
pub struct GenesysClient {
    client: reqwest::Client,
    api_host: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl GenesysClient {
    /// Fetch a token for `credentials` in `region` (e.g. `mypurecloud.de`) and build a client.
    #[instrument(skip(credentials))]
    pub async fn authenticate(
        credentials: &ClientCredentials,
        region: &str,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let login_url = format!("https://login.{region}/oauth/token");

        let resp = client
            .post(&login_url)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Auth(format!("token request returned {status}: {body}")));
        }
        let token: TokenResponse = resp.json().await?;
        info!("Authenticated against Genesys Cloud region {}", region);

        Ok(Self::with_token(client, format!("https://api.{region}"), token.access_token))
    }

    /// Build a client around an already issued token.
    pub fn with_token(client: reqwest::Client, api_host: String, access_token: String) -> Self {
        Self {
            client,
            api_host: api_host.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status { status: status.as_u16(), body });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl GenesysApi for GenesysClient {
    #[instrument(skip(self))]
    async fn query_conversations(
        &self,
        interval: &str,
        page_number: u32,
        page_size: u32,
    ) -> Result<ConversationQueryResponse, ApiError> {
        let url = format!("{}/api/v2/analytics/conversations/details/query", self.api_host);
        let body = json!({
            "interval": interval,
            "paging": { "pageSize": page_size, "pageNumber": page_number },
        });
        debug!("POST {}", url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    #[instrument(skip(self))]
    async fn scan_contacts(
        &self,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<ContactScanResponse, ApiError> {
        let url = format!("{}/api/v2/externalcontacts/scan/contacts", self.api_host);
        let mut query: Vec<(&str, String)> = vec![("limit", limit.to_string())];
        if let Some(c) = cursor.filter(|c| !c.is_empty()) {
            query.push(("cursor", c.to_string()));
        }
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&query)
            .send()
            .await?;
        Self::decode(resp).await
    }

    #[instrument(skip(self))]
    async fn list_users(&self, page_size: u32) -> Result<UserListResponse, ApiError> {
        let url = format!("{}/api/v2/users", self.api_host);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("pageSize", page_size)])
            .send()
            .await?;
        Self::decode(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_token_trims_trailing_slash() {
        let client = GenesysClient::with_token(
            reqwest::Client::new(),
            "https://api.mypurecloud.de/".to_string(),
            "token".to_string(),
        );
        assert_eq!(client.api_host, "https://api.mypurecloud.de");
    }
}
