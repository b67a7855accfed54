use crate::constants::DEFAULT_REGION;
use crate::error::{EtlError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The endpoints document: one entry per logical source.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct EndpointsConfig {
    pub endpoints: BTreeMap<String, EndpointConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Cron expression for the external scheduler; not interpreted here.
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub params: ExtractionParams,
    pub output: BTreeMap<String, OutputConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractionParams {
    /// ISO-8601 interval for the conversation query, e.g. `2024-01-01T00:00:00Z/2024-01-02T00:00:00Z`.
    pub interval: Option<String>,
    pub page_size: Option<u32>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// column name -> transform id, or `"nothing"`.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Business key used to match staged rows against production.
    pub key: Vec<String>,
}

/// The connections document.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionsConfig {
    pub secrets: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub storage: StorageConfig,
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub notifier: Option<NotifierConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub raw_container: String,
    pub curated_container: String,
    /// output name -> blob name
    pub blob_path: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    /// SQLite file hosting the attached schemas; `:memory:` for a throwaway warehouse.
    pub path: String,
    pub staging_schema: String,
    pub production_schema: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Environment variable holding the Slack webhook URL.
    pub slack_webhook_env: String,
    #[serde(default)]
    pub channel: Option<String>,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        EtlError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
    })
}

impl EndpointsConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: EndpointsConfig = serde_json::from_str(&read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: EndpointsConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn endpoint(&self, name: &str) -> Result<&EndpointConfig> {
        self.endpoints
            .get(name)
            .ok_or_else(|| EtlError::Config(format!("Unknown endpoint '{name}'")))
    }

    pub fn names(&self) -> Vec<String> {
        self.endpoints.keys().cloned().collect()
    }

    fn validate(&self) -> Result<()> {
        for (name, endpoint) in &self.endpoints {
            if endpoint.output.is_empty() {
                return Err(EtlError::Config(format!("Endpoint '{name}' declares no outputs")));
            }
            for (output, cfg) in &endpoint.output {
                if cfg.key.is_empty() {
                    return Err(EtlError::Config(format!(
                        "Output '{output}' of endpoint '{name}' declares an empty business key"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl ConnectionsConfig {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_json::from_str(&read_to_string(path)?)?)
    }

    pub fn blob_name(&self, output: &str) -> Result<&str> {
        self.storage
            .blob_path
            .get(output)
            .map(String::as_str)
            .ok_or_else(|| EtlError::Config(format!("No blob path configured for output '{output}'")))
    }
}

/// Runtime policy: timeouts, retries and backoff.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub stages: StagePolicies,
    pub paging: PagingPolicy,
    pub api: ApiSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StagePolicies {
    pub extract: StagePolicy,
    pub transform: StagePolicy,
    pub load: StagePolicy,
    pub upsert: StagePolicy,
}

impl Default for StagePolicies {
    fn default() -> Self {
        Self {
            extract: StagePolicy::task_default(),
            transform: StagePolicy::task_default(),
            load: StagePolicy::database_default(),
            upsert: StagePolicy::database_default(),
        }
    }
}

/// Bounded duration per attempt plus a fixed retry budget.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StagePolicy {
    pub timeout_seconds: u64,
    pub retries: u32,
    pub retry_delay_seconds: u64,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self::database_default()
    }
}

impl StagePolicy {
    pub fn task_default() -> Self {
        Self { timeout_seconds: 300, retries: 1, retry_delay_seconds: 300 }
    }

    pub fn database_default() -> Self {
        Self { timeout_seconds: 30, retries: 1, retry_delay_seconds: 300 }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

/// Retry budget for a failing numbered page.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PagingPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for PagingPolicy {
    fn default() -> Self {
        Self { max_attempts: 5, initial_backoff_ms: 500, max_backoff_ms: 30_000 }
    }
}

impl PagingPolicy {
    /// Delay before retry number `attempt` (1-based): doubles each time, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let ms = self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub timeout_seconds: u64,
    /// Page size for the conversation query when the endpoint does not set one.
    pub default_page_size: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self { timeout_seconds: 30, default_page_size: 100 }
    }
}

impl Settings {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let settings: Settings = toml::from_str(&read_to_string(path)?)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINTS: &str = r#"{
        "call_logs": {
            "schedule": "0 6 * * *",
            "params": {"interval": "2024-01-01T00:00:00Z/2024-01-02T00:00:00Z", "page_size": 50},
            "output": {
                "conversations": {"fields": {"id": "nothing"}, "key": ["id"]},
                "participants": {"fields": {"session_ani": "phone_number"}, "key": ["conversation_id", "session_id"]}
            }
        },
        "contacts": {
            "params": {"limit": 200, "cursor": null},
            "output": {"contacts": {"key": ["id"]}}
        }
    }"#;

    #[test]
    fn test_endpoints_document_parses() {
        let config = EndpointsConfig::from_json(ENDPOINTS).unwrap();
        assert_eq!(config.names(), vec!["call_logs".to_string(), "contacts".to_string()]);

        let calls = config.endpoint("call_logs").unwrap();
        assert_eq!(calls.params.page_size, Some(50));
        assert_eq!(calls.output["participants"].key.len(), 2);

        let contacts = config.endpoint("contacts").unwrap();
        assert!(contacts.params.cursor.is_none());
        assert!(contacts.output["contacts"].fields.is_empty());
        assert!(config.endpoint("unknown").is_err());
    }

    #[test]
    fn test_empty_business_key_is_rejected() {
        let raw = r#"{"users": {"output": {"users": {"key": []}}}}"#;
        assert!(EndpointsConfig::from_json(raw).is_err());
    }

    #[test]
    fn test_settings_defaults_and_overrides() {
        let settings: Settings = toml::from_str(
            r#"
            [stages.load]
            timeout_seconds = 10

            [paging]
            max_attempts = 3
            "#,
        )
        .unwrap();

        assert_eq!(settings.stages.load.timeout_seconds, 10);
        assert_eq!(settings.stages.load.retries, 1);
        assert_eq!(settings.stages.extract.timeout_seconds, 300);
        assert_eq!(settings.paging.max_attempts, 3);
        assert_eq!(settings.paging.initial_backoff_ms, 500);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = PagingPolicy { max_attempts: 10, initial_backoff_ms: 100, max_backoff_ms: 1_000 };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
        assert_eq!(policy.backoff(5), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(80), Duration::from_millis(1_000));
    }

    #[test]
    fn test_shipped_configs_parse() {
        let endpoints = EndpointsConfig::from_json(include_str!("../configs/endpoints.json")).unwrap();
        let connections: ConnectionsConfig =
            serde_json::from_str(include_str!("../configs/connections.json")).unwrap();
        let settings: Settings = toml::from_str(include_str!("../configs/config.toml")).unwrap();

        for name in endpoints.names() {
            for output in endpoints.endpoint(&name).unwrap().output.keys() {
                assert!(connections.blob_name(output).is_ok(), "no blob path for {output}");
            }
        }
        assert_eq!(connections.region, "mypurecloud.de");
        assert_eq!(settings.stages.upsert.timeout_seconds, 30);
    }
}
