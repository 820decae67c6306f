//! Static configuration: the shape loaded once at startup from a config
//! file (and overridable by flags/env in the root crate's CLI), per
//! SPEC_FULL.md §3, grounded on `original_source/cmd/configuration.go`'s
//! `static.Configuration`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticConfiguration {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub entry_points: IndexMap<String, EntryPoint>,
    #[serde(default)]
    pub providers: Providers,
    #[serde(default)]
    pub servers_transport: ServersTransportDefaults,
    #[serde(default)]
    pub tcp_servers_transport: TcpServersTransportDefaults,
    #[serde(default)]
    pub ping: Option<Ping>,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub access_log: Option<AccessLogConfig>,
}

impl Default for StaticConfiguration {
    fn default() -> Self {
        Self {
            global: Global::default(),
            entry_points: IndexMap::new(),
            providers: Providers::default(),
            servers_transport: ServersTransportDefaults::default(),
            tcp_servers_transport: TcpServersTransportDefaults::default(),
            ping: None,
            log: LogConfig::default(),
            access_log: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Global {
    #[serde(default = "default_true")]
    pub check_new_version: bool,
}

impl Default for Global {
    fn default() -> Self {
        Self {
            check_new_version: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPoint {
    pub address: String,
    #[serde(default = "default_transport")]
    pub transport: Transport,
    /// UDP session idle timeout (spec §4.8 "session bound to source
    /// IP:port for `TerminationDelay`"). Ignored for TCP entry points.
    #[serde(
        default = "default_udp_termination_delay",
        with = "crate::label::scalars::duration"
    )]
    pub udp_termination_delay: Duration,
}

fn default_transport() -> Transport {
    Transport::Tcp
}

fn default_udp_termination_delay() -> Duration {
    Duration::from_secs(3)
}

impl EntryPoint {
    pub fn get_address(&self) -> &str {
        &self.address
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Providers {
    #[serde(default = "default_throttle", with = "crate::label::scalars::duration")]
    pub providers_throttle_duration: Duration,
    #[serde(default)]
    pub file: Option<FileProvider>,
}

impl Default for Providers {
    fn default() -> Self {
        Self {
            providers_throttle_duration: default_throttle(),
            file: None,
        }
    }
}

fn default_throttle() -> Duration {
    Duration::from_secs(2)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProvider {
    pub directory: Option<String>,
    pub filename: Option<String>,
    #[serde(default)]
    pub watch: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServersTransportDefaults {
    #[serde(default = "default_max_idle_conns")]
    pub max_idle_conns_per_host: u32,
}

impl Default for ServersTransportDefaults {
    fn default() -> Self {
        Self {
            max_idle_conns_per_host: default_max_idle_conns(),
        }
    }
}

fn default_max_idle_conns() -> u32 {
    200
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpServersTransportDefaults {
    #[serde(default = "default_dial_timeout", with = "crate::label::scalars::duration")]
    pub dial_timeout: Duration,
    #[serde(
        default = "default_dial_keepalive",
        with = "crate::label::scalars::duration"
    )]
    pub dial_keep_alive: Duration,
}

impl Default for TcpServersTransportDefaults {
    fn default() -> Self {
        Self {
            dial_timeout: default_dial_timeout(),
            dial_keep_alive: default_dial_keepalive(),
        }
    }
}

fn default_dial_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_dial_keepalive() -> Duration {
    Duration::from_secs(15)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ping {
    #[serde(default = "default_ping_entrypoint")]
    pub entry_point: String,
}

fn default_ping_entrypoint() -> String {
    "ingress".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogConfig {
    #[serde(default = "default_access_log_path")]
    pub file_path: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_access_log_path() -> String {
    "access.log".to_string()
}

impl StaticConfiguration {
    /// Applies defaults that depend on other fields having already been
    /// parsed, mirroring `SetEffectiveConfiguration` in
    /// `original_source/cmd/healthcheck/healthcheck.go`'s caller.
    pub fn set_effective_configuration(&mut self) {
        if self.entry_points.is_empty() {
            self.entry_points.insert(
                "ingress".to_string(),
                EntryPoint {
                    address: ":8000".to_string(),
                    transport: Transport::Tcp,
                    udp_termination_delay: default_udp_termination_delay(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_providers_throttle_is_two_seconds() {
        let providers = Providers::default();
        assert_eq!(providers.providers_throttle_duration, Duration::from_secs(2));
    }

    #[test]
    fn set_effective_configuration_adds_default_entrypoint() {
        let mut cfg = StaticConfiguration::default();
        cfg.set_effective_configuration();
        assert!(cfg.entry_points.contains_key("ingress"));
    }

    #[test]
    fn parses_yaml() {
        let yaml = r#"
entryPoints:
  web:
    address: ":80"
providers:
  providersThrottleDuration: "1s"
"#;
        let cfg: StaticConfiguration = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.entry_points["web"].address, ":80");
        assert_eq!(
            cfg.providers.providers_throttle_duration,
            Duration::from_secs(1)
        );
    }
}
