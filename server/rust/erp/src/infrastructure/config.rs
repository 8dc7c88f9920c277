use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::entity::party::Company;
use crate::domain::value_object::gstin::{is_valid_state_code, Gstin};
use crate::infrastructure::database::DatabaseConfig;
use crate::infrastructure::messaging::KafkaConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config はアプリケーション全体の設定。
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    pub company: CompanyConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
}

/// AppConfig はアプリケーション設定。
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

/// ServerConfig はサーバー設定。
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub request_body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_body_limit_bytes: default_body_limit(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// "json" または "text"
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default)]
    pub trace_endpoint: Option<String>,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            trace_endpoint: None,
            sample_rate: default_sample_rate(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_sample_rate() -> f64 {
    1.0
}

/// AuthConfig は JWT 検証設定。
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: SecretString,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

fn default_cookie_name() -> String {
    "auth-token".to_string()
}

/// CompanyConfig は自社の GST 登録情報。
#[derive(Debug, Clone, Deserialize)]
pub struct CompanyConfig {
    pub name: String,
    #[serde(default)]
    pub gstin: Option<String>,
    pub state_code: String,
}

impl CompanyConfig {
    pub fn to_company(&self) -> Company {
        Company {
            name: self.name.clone(),
            gstin: self.gstin.clone(),
            state_code: self.state_code.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryConfig {
    /// 期限アラートの既定先読み日数
    #[serde(default = "default_expiry_window_days")]
    pub expiry_window_days: i64,
    /// この日数以内に期限を迎えるロットを要注意とする
    #[serde(default = "default_near_expiry_days")]
    pub near_expiry_days: i64,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            expiry_window_days: default_expiry_window_days(),
            near_expiry_days: default_near_expiry_days(),
        }
    }
}

fn default_expiry_window_days() -> i64 {
    90
}

fn default_near_expiry_days() -> i64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_batch_size() -> u32 {
    100
}

fn default_retention_days() -> u32 {
    7
}

impl Config {
    /// CONFIG_PATH（既定 `config/config.yaml`）を読み込み、環境変数で上書きして検証する。
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut cfg = Self::from_yaml(&content)?;
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// `DATABASE_URL` はデータベース接続 URL を、`JWT_SECRET` は署名鍵を、
    /// `OTEL_EXPORTER_OTLP_ENDPOINT` はトレース送信先を上書きする。
    pub fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(url) = env("DATABASE_URL").filter(|v| !v.is_empty()) {
            match self.database {
                Some(ref mut db) => db.url = Some(SecretString::new(url)),
                None => self.database = Some(DatabaseConfig::from_url(url)),
            }
        }
        if let Some(secret) = env("JWT_SECRET").filter(|v| !v.is_empty()) {
            match self.auth {
                Some(ref mut auth) => auth.jwt_secret = SecretString::new(secret),
                None => {
                    self.auth = Some(AuthConfig {
                        jwt_secret: SecretString::new(secret),
                        issuer: None,
                        cookie_name: default_cookie_name(),
                    });
                }
            }
        }
        if let Some(endpoint) = env("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.is_empty()) {
            self.observability.trace_endpoint = Some(endpoint);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let state_code = self.company.state_code.trim();
        if !is_valid_state_code(state_code) {
            return Err(ConfigError::Invalid(format!(
                "company.state_code must be two digits, got {state_code:?}"
            )));
        }
        if let Some(raw) = self.company.gstin.as_deref().filter(|g| !g.trim().is_empty()) {
            let gstin = Gstin::parse(raw)
                .map_err(|e| ConfigError::Invalid(format!("company.gstin: {e}")))?;
            if gstin.state_code() != state_code {
                return Err(ConfigError::Invalid(format!(
                    "company.gstin state {} does not match company.state_code {state_code}",
                    gstin.state_code()
                )));
            }
        }
        if self.outbox.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "outbox.batch_size must be greater than zero".to_string(),
            ));
        }
        if !(0..=365).contains(&self.inventory.expiry_window_days) {
            return Err(ConfigError::Invalid(
                "inventory.expiry_window_days must be between 0 and 365".to_string(),
            ));
        }
        if let Some(ref auth) = self.auth {
            if auth.jwt_secret.expose_secret().is_empty() {
                return Err(ConfigError::Invalid("auth.jwt_secret is empty".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"
app:
  name: "yeelo-erp"
company:
  name: "Yeelo Homeo Pharmacy"
  gstin: "27AAPFU0939F1ZV"
  state_code: "27"
"#;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let cfg = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(cfg.app.version, "0.1.0");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.request_body_limit_bytes, 1024 * 1024);
        assert_eq!(cfg.observability.log_format, "json");
        assert_eq!(cfg.inventory.expiry_window_days, 90);
        assert_eq!(cfg.outbox.batch_size, 100);
        assert!(cfg.database.is_none());
        assert!(cfg.kafka.is_none());
        assert!(cfg.auth.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_secrets_are_redacted_in_debug() {
        let yaml = format!("{MINIMAL}auth:\n  jwt_secret: \"super-secret\"\n");
        let cfg = Config::from_yaml(&yaml).unwrap();
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("super-secret"));
        assert_eq!(cfg.auth.unwrap().cookie_name, "auth-token");
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = Config::from_yaml(MINIMAL).unwrap();
        cfg.apply_env_overrides(env(&[
            ("DATABASE_URL", "postgres://app:pw@db:5432/yeelo"),
            ("JWT_SECRET", "from-env"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://otel:4317"),
        ]));
        let db = cfg.database.as_ref().unwrap();
        assert_eq!(
            db.connection_url().expose_secret(),
            "postgres://app:pw@db:5432/yeelo"
        );
        assert_eq!(
            cfg.auth.as_ref().unwrap().jwt_secret.expose_secret(),
            "from-env"
        );
        assert_eq!(
            cfg.observability.trace_endpoint.as_deref(),
            Some("http://otel:4317")
        );
    }

    #[test]
    fn test_validate_rejects_bad_state_code() {
        let yaml = MINIMAL.replace("state_code: \"27\"", "state_code: \"MH\"");
        assert!(matches!(
            Config::from_yaml(&yaml).unwrap().validate(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_validate_rejects_gstin_state_mismatch() {
        let yaml = MINIMAL.replace("state_code: \"27\"", "state_code: \"29\"");
        assert!(Config::from_yaml(&yaml).unwrap().validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let yaml = format!("{MINIMAL}outbox:\n  batch_size: 0\n");
        assert!(Config::from_yaml(&yaml).unwrap().validate().is_err());
    }
}
