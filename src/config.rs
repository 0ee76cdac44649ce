use config::{Config, Environment, File};
use serde::Deserialize;

/// Gateway configuration, sourced from flat environment variables
/// (`HOSTNAME`, `PORT`, `VALKEY_HOST`, ...) with an optional `config.toml`
/// underneath for local development.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_valkey_host")]
    pub valkey_host: String,
    #[serde(default = "default_valkey_port")]
    pub valkey_port: u16,
    #[serde(default)]
    pub valkey_password: Option<String>,
    #[serde(default)]
    pub valkey_database: u32,

    #[serde(default = "default_atproto_service_url")]
    pub atproto_service_url: String,
    /// Preferred PDS for session creation; falls back to the service URL.
    #[serde(default)]
    pub atproto_pds_url: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default = "default_true")]
    pub tracing_enabled: bool,
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_hostname() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_valkey_host() -> String {
    "localhost".to_string()
}
fn default_valkey_port() -> u16 {
    6379
}
fn default_atproto_service_url() -> String {
    "https://bsky.social".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_environment() -> String {
    "development".to_string()
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        let path = config_path.unwrap_or("config.toml");
        builder = builder.add_source(File::with_name(path).required(false));

        // Flat env overlay: VALKEY_HOST=..., PORT=..., etc.
        builder = builder.add_source(Environment::default().try_parsing(true));

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        url::Url::parse(&self.atproto_service_url)
            .map_err(|e| format!("ATPROTO_SERVICE_URL is not a valid URL: {e}"))?;
        if let Some(pds) = &self.atproto_pds_url {
            url::Url::parse(pds).map_err(|e| format!("ATPROTO_PDS_URL is not a valid URL: {e}"))?;
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    /// Connection URL for the Valkey backend, addressing only the
    /// configured database.
    pub fn valkey_url(&self) -> String {
        match &self.valkey_password {
            Some(password) if !password.is_empty() => format!(
                "redis://:{}@{}:{}/{}",
                password, self.valkey_host, self.valkey_port, self.valkey_database
            ),
            _ => format!(
                "redis://{}:{}/{}",
                self.valkey_host, self.valkey_port, self.valkey_database
            ),
        }
    }

    /// Where sessions are created: the PDS when configured, else the
    /// main service endpoint.
    pub fn pds_url(&self) -> &str {
        self.atproto_pds_url
            .as_deref()
            .unwrap_or(&self.atproto_service_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_config() -> AppConfig {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }

    #[test]
    fn defaults_match_contract() {
        let cfg = bare_config();
        assert_eq!(cfg.hostname, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.valkey_host, "localhost");
        assert_eq!(cfg.valkey_port, 6379);
        assert_eq!(cfg.valkey_database, 0);
        assert_eq!(cfg.atproto_service_url, "https://bsky.social");
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.tracing_enabled);
        assert!(cfg.metrics_enabled);
        assert_eq!(cfg.environment, "development");
        cfg.validate().unwrap();
    }

    #[test]
    fn valkey_url_includes_database_and_password() {
        let mut cfg = bare_config();
        assert_eq!(cfg.valkey_url(), "redis://localhost:6379/0");

        cfg.valkey_password = Some("hunter2".into());
        cfg.valkey_database = 3;
        assert_eq!(cfg.valkey_url(), "redis://:hunter2@localhost:6379/3");
    }

    #[test]
    fn pds_falls_back_to_service_url() {
        let mut cfg = bare_config();
        assert_eq!(cfg.pds_url(), "https://bsky.social");
        cfg.atproto_pds_url = Some("https://pds.example.com".into());
        assert_eq!(cfg.pds_url(), "https://pds.example.com");
    }
}
