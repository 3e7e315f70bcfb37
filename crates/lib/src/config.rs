//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.chatprobe/config.json`). A missing
//! file yields defaults that match the backend's local development setup
//! (server on 127.0.0.1:5000, doctor user 1, patient user 2, appointment 1).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level probe config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Chat server location (also used by `serve` to bind the stub).
    #[serde(default)]
    pub server: ServerConfig,

    /// The two scripted participants.
    #[serde(default)]
    pub participants: ParticipantsConfig,

    /// Appointment scoping the conversation.
    #[serde(default = "default_appointment_id")]
    pub appointment_id: i64,

    /// Timer pacing for the scripted sequence.
    #[serde(default)]
    pub pacing: PacingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            participants: ParticipantsConfig::default(),
            appointment_id: default_appointment_id(),
            pacing: PacingConfig::default(),
        }
    }
}

/// Chat server host, port, and WebSocket namespace path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Host (default "127.0.0.1").
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Port (default 5000, the backend's local default).
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// WebSocket path of the chat namespace (default "/chat").
    #[serde(default = "default_server_namespace")]
    pub namespace: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            namespace: default_server_namespace(),
        }
    }
}

/// User ids for the two scripted clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantsConfig {
    #[serde(default = "default_doctor_user_id")]
    pub doctor_user_id: i64,

    #[serde(default = "default_patient_user_id")]
    pub patient_user_id: i64,
}

impl Default for ParticipantsConfig {
    fn default() -> Self {
        Self {
            doctor_user_id: default_doctor_user_id(),
            patient_user_id: default_patient_user_id(),
        }
    }
}

/// Timer pacing. The original script paces phases 3 seconds apart with 500 ms
/// rapid bursts; tests compress these to run the whole sequence quickly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacingConfig {
    /// Base step between scripted phases (default 3000 ms).
    #[serde(default = "default_step_millis")]
    pub step_millis: u64,

    /// Gap between messages inside a rapid burst (default 500 ms).
    #[serde(default = "default_rapid_gap_millis")]
    pub rapid_gap_millis: u64,

    /// Interval of the connection status monitor (default 3000 ms).
    #[serde(default = "default_status_interval_millis")]
    pub status_interval_millis: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            step_millis: default_step_millis(),
            rapid_gap_millis: default_rapid_gap_millis(),
            status_interval_millis: default_status_interval_millis(),
        }
    }
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    5000
}

fn default_server_namespace() -> String {
    "/chat".to_string()
}

fn default_doctor_user_id() -> i64 {
    1
}

fn default_patient_user_id() -> i64 {
    2
}

fn default_appointment_id() -> i64 {
    1
}

fn default_step_millis() -> u64 {
    3000
}

fn default_rapid_gap_millis() -> u64 {
    500
}

fn default_status_interval_millis() -> u64 {
    3000
}

/// Namespace as a route path: a leading slash is added when missing, so a
/// config value of "chat" and "/chat" behave the same (axum rejects routes
/// without one).
pub fn namespace_path(config: &Config) -> String {
    let ns = config.server.namespace.trim();
    if ns.starts_with('/') {
        ns.to_string()
    } else {
        format!("/{}", ns)
    }
}

/// WebSocket URL of the chat namespace, e.g. `ws://127.0.0.1:5000/chat`.
pub fn chat_url(config: &Config) -> String {
    format!(
        "ws://{}:{}{}",
        config.server.host,
        config.server.port,
        namespace_path(config)
    )
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("CHATPROBE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".chatprobe").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the default path (or CHATPROBE_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_local_backend() {
        let c = Config::default();
        assert_eq!(c.server.host, "127.0.0.1");
        assert_eq!(c.server.port, 5000);
        assert_eq!(c.server.namespace, "/chat");
        assert_eq!(c.participants.doctor_user_id, 1);
        assert_eq!(c.participants.patient_user_id, 2);
        assert_eq!(c.appointment_id, 1);
        assert_eq!(c.pacing.step_millis, 3000);
        assert_eq!(c.pacing.rapid_gap_millis, 500);
    }

    #[test]
    fn chat_url_concatenates_namespace() {
        let mut c = Config::default();
        c.server.port = 9000;
        assert_eq!(chat_url(&c), "ws://127.0.0.1:9000/chat");
    }

    #[test]
    fn namespace_without_leading_slash_is_normalized() {
        let mut c = Config::default();
        c.server.namespace = "chat".to_string();
        assert_eq!(namespace_path(&c), "/chat");
        assert_eq!(chat_url(&c), "ws://127.0.0.1:5000/chat");
        c.server.namespace = "/chat".to_string();
        assert_eq!(namespace_path(&c), "/chat");
    }

    #[test]
    fn config_path_env_override_wins() {
        std::env::set_var("CHATPROBE_CONFIG_PATH", "/tmp/chatprobe-env/config.json");
        assert_eq!(
            default_config_path(),
            PathBuf::from("/tmp/chatprobe-env/config.json")
        );
        std::env::remove_var("CHATPROBE_CONFIG_PATH");
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let path = PathBuf::from("/nonexistent/chatprobe/config.json");
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.participants.doctor_user_id, 1);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: Config =
            serde_json::from_str(r#"{ "server": { "port": 8080 }, "appointmentId": 42 }"#)
                .unwrap();
        assert_eq!(c.server.port, 8080);
        assert_eq!(c.server.host, "127.0.0.1");
        assert_eq!(c.appointment_id, 42);
        assert_eq!(c.participants.patient_user_id, 2);
    }
}
