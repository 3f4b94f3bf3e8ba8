//! Convoy Config - Configuration management

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    // Detected from the node when absent
    pub chain_id: Option<u64>,
    pub private_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorConfig {
    // Address of an already deployed executor contract
    pub address: Option<String>,
    // Artifact path used by deploy-executor when no --artifact is given
    pub artifact: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    pub dir: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: "artifacts".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    pub poll_interval_ms: u64,
    pub deadline_secs: Option<u64>,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            deadline_secs: None,
        }
    }
}

impl ApprovalConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub gas_margin: u64,
    pub verify_predicted: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            gas_margin: 100_000,
            verify_predicted: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        let config = Config {
            network: NetworkConfig {
                rpc_url: std::env::var("RPC_URL")
                    .unwrap_or_else(|_| "http://localhost:8545".to_string()),
                chain_id: std::env::var("CHAIN_ID").ok().and_then(|s| s.parse().ok()),
                private_key: std::env::var("PRIVATE_KEY").unwrap_or_default(),
            },
            executor: ExecutorConfig {
                address: std::env::var("EXECUTOR_ADDRESS").ok(),
                artifact: std::env::var("EXECUTOR_ARTIFACT").ok(),
            },
            artifacts: ArtifactsConfig {
                dir: std::env::var("ARTIFACTS_DIR").unwrap_or_else(|_| "artifacts".to_string()),
            },
            approval: ApprovalConfig {
                poll_interval_ms: std::env::var("APPROVAL_POLL_INTERVAL_MS")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()
                    .unwrap_or(5000),
                deadline_secs: std::env::var("APPROVAL_DEADLINE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok()),
            },
            execution: ExecutionConfig {
                gas_margin: std::env::var("GAS_MARGIN")
                    .unwrap_or_else(|_| "100000".to_string())
                    .parse()
                    .unwrap_or(100_000),
                verify_predicted: std::env::var("VERIFY_PREDICTED")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .unwrap_or(true),
            },
            logging: LoggingConfig {
                log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
        };

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.network.rpc_url.is_empty() {
            anyhow::bail!("network.rpc_url cannot be empty");
        }
        if !self.network.rpc_url.starts_with("http://")
            && !self.network.rpc_url.starts_with("https://")
        {
            anyhow::bail!(
                "network.rpc_url must start with http:// or https://, got: {}",
                self.network.rpc_url
            );
        }
        if self.network.private_key.is_empty() {
            anyhow::bail!("network.private_key must be set (every command signs transactions)");
        }

        if let Some(ref address) = self.executor.address {
            if !is_hex_address(address) {
                anyhow::bail!(
                    "executor.address must be a 0x-prefixed 20-byte hex string, got: {}",
                    address
                );
            }
        }

        if self.artifacts.dir.is_empty() {
            anyhow::bail!("artifacts.dir cannot be empty");
        }

        if self.approval.poll_interval_ms == 0 {
            anyhow::bail!("approval.poll_interval_ms must be greater than 0");
        }
        if self.approval.poll_interval_ms < 500 {
            eprintln!(
                "Warning: approval.poll_interval_ms is very low ({}ms), this may cause rate limiting",
                self.approval.poll_interval_ms
            );
        }

        Ok(())
    }
}

fn is_hex_address(s: &str) -> bool {
    match s.strip_prefix("0x") {
        Some(hex) => hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            network: NetworkConfig {
                rpc_url: "http://localhost:8545".to_string(),
                chain_id: Some(31337),
                private_key: "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
                    .to_string(),
            },
            executor: ExecutorConfig::default(),
            artifacts: ArtifactsConfig::default(),
            approval: ApprovalConfig::default(),
            execution: ExecutionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_load_full_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
network:
  rpc_url: https://rpc.example.net
  chain_id: 5
  private_key: "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
executor:
  address: "0x5FbDB2315678afecb367f032d93F642f64180aa3"
artifacts:
  dir: build/artifacts
approval:
  poll_interval_ms: 2000
  deadline_secs: 600
execution:
  gas_margin: 150000
  verify_predicted: false
logging:
  log_level: debug
"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.network.rpc_url, "https://rpc.example.net");
        assert_eq!(config.network.chain_id, Some(5));
        assert_eq!(
            config.executor.address.as_deref(),
            Some("0x5FbDB2315678afecb367f032d93F642f64180aa3")
        );
        assert_eq!(config.artifacts.dir, "build/artifacts");
        assert_eq!(config.approval.poll_interval_ms, 2000);
        assert_eq!(config.approval.deadline(), Some(Duration::from_secs(600)));
        assert_eq!(config.execution.gas_margin, 150_000);
        assert!(!config.execution.verify_predicted);
        assert_eq!(config.logging.log_level, "debug");
    }

    #[test]
    fn test_missing_sections_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
network:
  rpc_url: http://localhost:8545
  private_key: "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.network.chain_id, None);
        assert!(config.executor.address.is_none());
        assert_eq!(config.artifacts.dir, "artifacts");
        assert_eq!(config.approval.poll_interval_ms, 5000);
        assert_eq!(config.approval.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.approval.deadline(), None);
        assert_eq!(config.execution.gas_margin, 100_000);
        assert!(config.execution.verify_predicted);
        assert_eq!(config.logging.log_level, "info");
    }

    #[test]
    fn test_validate_rejects_non_http_rpc_url() {
        let mut config = valid_config();
        config.network.rpc_url = "ws://localhost:8546".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rpc_url"));
    }

    #[test]
    fn test_validate_rejects_missing_private_key() {
        let mut config = valid_config();
        config.network.private_key = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("private_key"));
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let mut config = valid_config();
        config.approval.poll_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));
    }

    #[test]
    fn test_validate_rejects_malformed_executor_address() {
        let mut config = valid_config();
        for bad in [
            "5FbDB2315678afecb367f032d93F642f64180aa3",
            "0x5FbDB2315678afecb367f032d93F642f64180aa",
            "0x5FbDB2315678afecb367f032d93F642f64180agg",
        ] {
            config.executor.address = Some(bad.to_string());
            assert!(config.validate().is_err(), "accepted {bad}");
        }
        config.executor.address = Some("0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "network: [not, a, mapping]").unwrap();
        assert!(Config::load_from_file(&path).is_err());
    }
}
