//! Configuration for the gateway client.
//!
//! Values come from a TOML file; deployment environment variables
//! override the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ussd_core::{
    ClientOptions, ConnectionInfo, Credentials, LengthMode, MenuSettings, MetricsSettings,
    UssdError,
};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub gateway: GatewayConfig,
    pub timing: TimingConfig,
    pub dispatch: DispatchConfig,
    pub menu: MenuConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// Gateway address and logon credentials.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Sent as the logon application id.
    pub client_id: String,
    /// What the 3-digit header length counts: "frame_total" or "key_and_body".
    pub length_mode: LengthMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub read_timeout_ms: u64,
    pub logon_timeout_ms: u64,
    pub keepalive_interval_secs: u64,
    pub idle_backoff_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Dialog handlers allowed to run at once.
    pub max_concurrent_dialogs: usize,
    /// Outbound frames that may wait for the writer.
    pub write_queue_depth: usize,
    /// Shutdown grace period for in-flight dialogs.
    pub drain_timeout_secs: u64,
}

/// Menu service endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuConfig {
    pub url: String,
    pub telco: String,
    pub product_id: u32,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub url: String,
    pub api_key: String,
    pub count_channel: String,
    pub failure_channel: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Directory for daily log files. If empty, logs go to stderr only.
    pub directory: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 5000,
            logon_timeout_ms: 5000,
            keepalive_interval_secs: 20,
            idle_backoff_ms: 1000,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_dialogs: 64,
            write_queue_depth: 128,
            drain_timeout_secs: 10,
        }
    }
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            telco: "MTN".into(),
            product_id: 2,
            timeout_ms: 8000,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: String::new(),
            api_key: String::new(),
            count_channel: String::new(),
            failure_channel: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            directory: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load the TOML file at `path`, then apply environment overrides.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, UssdError> {
        let mut cfg = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .map_err(|e| UssdError::Config(format!("invalid config {}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(UssdError::Config(format!(
                    "cannot read config {}: {e}",
                    path.display()
                )));
            }
        };
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Override file values with whatever `lookup` finds. Empty values
    /// are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), UssdError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SERVER_HOST") {
            self.gateway.host = v;
        }
        if let Some(v) = get("SERVER_PORT") {
            self.gateway.port = v
                .trim()
                .parse()
                .map_err(|_| UssdError::Config(format!("SERVER_PORT is not a port: {v:?}")))?;
        }
        if let Some(v) = get("USERNAME") {
            self.gateway.username = v;
        }
        if let Some(v) = get("PASSWORD") {
            self.gateway.password = v;
        }
        if let Some(v) = get("CLIENT_ID") {
            self.gateway.client_id = v;
        }
        if let Some(v) = get("USSD_API_URL") {
            self.menu.url = v;
        }
        if let Some(v) = get("MONITORING_STATUS") {
            self.metrics.enabled = !v.trim().eq_ignore_ascii_case("INACTIVE");
        }
        if let Some(v) = get("MONITORING_URL") {
            self.metrics.url = v;
        }
        if let Some(v) = get("MONITORING_API_KEY") {
            self.metrics.api_key = v;
        }
        if let Some(v) = get("MONITORING_USSD_COUNT") {
            self.metrics.count_channel = v;
        }
        if let Some(v) = get("MONITORING_USSD_FAILURE") {
            self.metrics.failure_channel = v;
        }
        if let Some(v) = get("LOG_PATH") {
            self.logging.directory = v;
        }
        Ok(())
    }

    /// Check that every required value is present, naming all the
    /// missing ones at once.
    pub fn validate(&self) -> Result<(), UssdError> {
        let mut missing = Vec::new();
        if self.gateway.host.is_empty() {
            missing.push("gateway.host (SERVER_HOST)");
        }
        if self.gateway.port == 0 {
            missing.push("gateway.port (SERVER_PORT)");
        }
        if self.gateway.username.is_empty() {
            missing.push("gateway.username (USERNAME)");
        }
        if self.gateway.password.is_empty() {
            missing.push("gateway.password (PASSWORD)");
        }
        if self.gateway.client_id.is_empty() {
            missing.push("gateway.client_id (CLIENT_ID)");
        }
        if self.menu.url.is_empty() {
            missing.push("menu.url (USSD_API_URL)");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(UssdError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )))
        }
    }

    /// The default configuration as TOML (for bootstrapping a file).
    pub fn default_toml() -> Result<String, UssdError> {
        toml::to_string_pretty(&Self::default()).map_err(|e| UssdError::Config(e.to_string()))
    }

    pub fn to_client_options(&self) -> ClientOptions {
        let mut options = ClientOptions::new(
            ConnectionInfo::new(self.gateway.host.clone(), self.gateway.port),
            Credentials::new(
                self.gateway.username.clone(),
                self.gateway.password.clone(),
                self.gateway.client_id.clone(),
            ),
        );
        options.length_mode = self.gateway.length_mode;
        options.read_timeout = Duration::from_millis(self.timing.read_timeout_ms.max(1));
        options.logon_timeout = Duration::from_millis(self.timing.logon_timeout_ms.max(1));
        options.keepalive_interval =
            Duration::from_secs(self.timing.keepalive_interval_secs.max(1));
        options.idle_backoff = Duration::from_millis(self.timing.idle_backoff_ms);
        options.resolve_timeout = Duration::from_millis(self.menu.timeout_ms.max(1));
        options.max_concurrent_dialogs = self.dispatch.max_concurrent_dialogs.max(1);
        options.write_queue_depth = self.dispatch.write_queue_depth.max(1);
        options.drain_timeout = Duration::from_secs(self.dispatch.drain_timeout_secs);
        options
    }

    pub fn menu_settings(&self) -> MenuSettings {
        MenuSettings {
            url: self.menu.url.clone(),
            telco: self.menu.telco.clone(),
            product_id: self.menu.product_id,
            timeout: Duration::from_millis(self.menu.timeout_ms.max(1)),
        }
    }

    pub fn metrics_settings(&self) -> MetricsSettings {
        MetricsSettings {
            enabled: self.metrics.enabled,
            url: self.metrics.url.clone(),
            api_key: self.metrics.api_key.clone(),
            count_channel: self.metrics.count_channel.clone(),
            failure_channel: self.metrics.failure_channel.clone(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn complete() -> ClientConfig {
        let mut cfg = ClientConfig::default();
        cfg.apply_env(env(&[
            ("SERVER_HOST", "10.0.0.5"),
            ("SERVER_PORT", "9000"),
            ("USERNAME", "u"),
            ("PASSWORD", "p"),
            ("CLIENT_ID", "12345"),
            ("USSD_API_URL", "http://menu.local/ussd"),
        ]))
        .unwrap();
        cfg
    }

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&ClientConfig::default()).unwrap();
        assert!(text.contains("keepalive_interval_secs"));
        assert!(text.contains("length_mode = \"frame_total\""));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&ClientConfig::default()).unwrap();
        let parsed: ClientConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, ClientConfig::default());
        assert_eq!(parsed.timing.read_timeout_ms, 5000);
        assert_eq!(parsed.menu.telco, "MTN");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let parsed: ClientConfig = toml::from_str(
            "[gateway]\nhost = \"gw\"\nport = 7000\nlength_mode = \"key_and_body\"\n",
        )
        .unwrap();
        assert_eq!(parsed.gateway.host, "gw");
        assert_eq!(parsed.gateway.length_mode, LengthMode::KeyAndBody);
        assert_eq!(parsed.dispatch.max_concurrent_dialogs, 64);
    }

    #[test]
    fn validate_lists_every_missing_value() {
        let err = ClientConfig::default().validate().unwrap_err().to_string();
        for key in [
            "SERVER_HOST",
            "SERVER_PORT",
            "USERNAME",
            "PASSWORD",
            "CLIENT_ID",
            "USSD_API_URL",
        ] {
            assert!(err.contains(key), "{key} not reported in {err}");
        }
        assert!(complete().validate().is_ok());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg: ClientConfig = toml::from_str("[gateway]\nhost = \"from-file\"\n").unwrap();
        cfg.apply_env(env(&[("SERVER_HOST", "from-env"), ("LOG_PATH", "/var/log/ussd")]))
            .unwrap();
        assert_eq!(cfg.gateway.host, "from-env");
        assert_eq!(cfg.logging.directory, "/var/log/ussd");
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut cfg: ClientConfig = toml::from_str("[gateway]\nhost = \"keep\"\n").unwrap();
        cfg.apply_env(env(&[("SERVER_HOST", "  ")])).unwrap();
        assert_eq!(cfg.gateway.host, "keep");
    }

    #[test]
    fn bad_port_is_config_error() {
        let mut cfg = ClientConfig::default();
        let err = cfg.apply_env(env(&[("SERVER_PORT", "ninety")])).unwrap_err();
        assert!(matches!(err, UssdError::Config(_)));
    }

    #[test]
    fn monitoring_inactive_disables_metrics() {
        let mut cfg = ClientConfig::default();
        cfg.apply_env(env(&[("MONITORING_STATUS", "INACTIVE")])).unwrap();
        assert!(!cfg.metrics_settings().enabled);
    }

    #[test]
    fn options_follow_config() {
        let mut cfg = complete();
        cfg.timing.keepalive_interval_secs = 15;
        cfg.dispatch.max_concurrent_dialogs = 8;
        let options = cfg.to_client_options();
        assert_eq!(options.gateway.address(), "10.0.0.5:9000");
        assert_eq!(options.credentials.application_id, "12345");
        assert_eq!(options.keepalive_interval, Duration::from_secs(15));
        assert_eq!(options.max_concurrent_dialogs, 8);
        assert_eq!(options.resolve_timeout, Duration::from_millis(8000));
        assert_eq!(cfg.menu_settings().url, "http://menu.local/ussd");
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ussd-client.toml");
        std::fs::write(&path, "[timing]\nread_timeout_ms = 2500\n").unwrap();
        let cfg = ClientConfig::load(&path).unwrap();
        assert_eq!(cfg.timing.read_timeout_ms, 2500);
    }

    #[test]
    fn load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[timing\nread_timeout_ms = ").unwrap();
        assert!(matches!(ClientConfig::load(&path), Err(UssdError::Config(_))));
    }

    #[test]
    fn default_toml_bootstraps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.toml");
        std::fs::write(&path, ClientConfig::default_toml().unwrap()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: ClientConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, ClientConfig::default());
    }

    #[test]
    fn unreadable_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory exists but cannot be read as a file.
        assert!(matches!(ClientConfig::load(dir.path()), Err(UssdError::Config(_))));
    }
}
