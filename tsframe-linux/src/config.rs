//! Load config from file and environment.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tsframe_core::source::{DEFAULT_FRAMES_PER_CLIENT, SEND_RETRY_DELAY};
use tsframe_core::{Mode, ReaderConfig, SourceConfig, Target};

/// What the daemon does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Connect to `host:port` and count frames.
    #[default]
    Receive,
    /// Listen on `port` and stream frames to every client.
    Serve,
}

/// Daemon configuration. File: ~/.config/tsframe/config.toml or /etc/tsframe/config.toml.
/// Env overrides: TSFRAME_ROLE, TSFRAME_HOST, TSFRAME_PORT, TSFRAME_MODE, TSFRAME_BACKOFF_MS,
/// TSFRAME_POLL_INTERVAL_MS, TSFRAME_CONNECT_TIMEOUT_MS, TSFRAME_READ_TIMEOUT_MS,
/// TSFRAME_FRAMES_PER_CLIENT, TSFRAME_SOURCE_MODE.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub role: Role,
    /// Stream host to read from (receive role).
    #[serde(default = "default_host")]
    pub host: String,
    /// Remote port (receive) or listen port (serve). Default 9999.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Reader strategy (receive role).
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// 0 spins.
    #[serde(default)]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
    #[serde(default = "default_frames_per_client")]
    pub frames_per_client: usize,
    /// Send strategy (serve role).
    #[serde(default)]
    pub source_mode: Mode,
}

fn default_host() -> String {
    "192.168.0.111".to_string()
}
fn default_port() -> u16 {
    9999
}
fn default_backoff_ms() -> u64 {
    1000
}
fn default_frames_per_client() -> usize {
    DEFAULT_FRAMES_PER_CLIENT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: Role::default(),
            host: default_host(),
            port: default_port(),
            mode: Mode::default(),
            backoff_ms: default_backoff_ms(),
            poll_interval_ms: 0,
            connect_timeout_ms: None,
            read_timeout_ms: None,
            frames_per_client: default_frames_per_client(),
            source_mode: Mode::default(),
        }
    }
}

impl Config {
    pub fn target(&self) -> Target {
        Target::new(self.host.clone(), self.port)
    }

    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            backoff: Duration::from_millis(self.backoff_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
            read_timeout: self.read_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            frames_per_client: self.frames_per_client,
            mode: self.source_mode,
            retry_delay: SEND_RETRY_DELAY,
        }
    }

    /// The source listens on every interface.
    pub fn source_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_env(&mut c, |key| std::env::var(key).ok());
    c
}

/// Apply overrides from `lookup`. Unparseable values are ignored with a warning.
pub fn apply_env(c: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(s) = lookup("TSFRAME_ROLE") {
        match s.as_str() {
            "receive" => c.role = Role::Receive,
            "serve" => c.role = Role::Serve,
            _ => tracing::warn!(value = %s, "ignoring TSFRAME_ROLE"),
        }
    }
    if let Some(s) = lookup("TSFRAME_HOST") {
        c.host = s;
    }
    override_parsed(&lookup, "TSFRAME_PORT", &mut c.port);
    if let Some(mode) = lookup_mode(&lookup, "TSFRAME_MODE") {
        c.mode = mode;
    }
    override_parsed(&lookup, "TSFRAME_BACKOFF_MS", &mut c.backoff_ms);
    override_parsed(&lookup, "TSFRAME_POLL_INTERVAL_MS", &mut c.poll_interval_ms);
    let mut connect_timeout = 0u64;
    if override_parsed(&lookup, "TSFRAME_CONNECT_TIMEOUT_MS", &mut connect_timeout) {
        c.connect_timeout_ms = Some(connect_timeout);
    }
    let mut read_timeout = 0u64;
    if override_parsed(&lookup, "TSFRAME_READ_TIMEOUT_MS", &mut read_timeout) {
        c.read_timeout_ms = Some(read_timeout);
    }
    override_parsed(&lookup, "TSFRAME_FRAMES_PER_CLIENT", &mut c.frames_per_client);
    if let Some(mode) = lookup_mode(&lookup, "TSFRAME_SOURCE_MODE") {
        c.source_mode = mode;
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) -> bool {
    let Some(s) = lookup(key) else {
        return false;
    };
    match s.parse::<T>() {
        Ok(v) => {
            *slot = v;
            true
        }
        Err(_) => {
            tracing::warn!(key, value = %s, "ignoring unparseable override");
            false
        }
    }
}

fn lookup_mode(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Mode> {
    let s = lookup(key)?;
    match s.as_str() {
        "blocking" => Some(Mode::Blocking),
        "non_blocking" | "non-blocking" => Some(Mode::NonBlocking),
        _ => {
            tracing::warn!(key, value = %s, "ignoring unknown mode");
            None
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/tsframe/config.toml"));
    }
    out.push(PathBuf::from("/etc/tsframe/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    let path = config_paths().into_iter().find(|p| p.exists())?;
    load_from(&path)
}

/// Parse one config file. A file that exists but fails to parse falls back to
/// defaults with a warning rather than trying the next path.
pub fn load_from(path: &Path) -> Option<Config> {
    let s = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "config unreadable");
            return None;
        }
    };
    match toml::from_str::<Config>(&s) {
        Ok(c) => {
            tracing::info!(path = %path.display(), "config loaded");
            Some(c)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "config invalid, using defaults");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_session() {
        let c = Config::default();
        assert_eq!(c.role, Role::Receive);
        assert_eq!(c.target(), Target::new("192.168.0.111", 9999));
        assert_eq!(c.mode, Mode::Blocking);
        assert_eq!(c.reader_config(), ReaderConfig::default());
        assert_eq!(c.source_config(), SourceConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "host = \"10.0.0.5\"\nmode = \"non_blocking\"\npoll_interval_ms = 2"
        )
        .unwrap();
        let c = load_from(file.path()).unwrap();
        assert_eq!(c.host, "10.0.0.5");
        assert_eq!(c.mode, Mode::NonBlocking);
        assert_eq!(c.reader_config().poll_interval, Duration::from_millis(2));
        assert_eq!(c.port, 9999);
        assert_eq!(c.backoff_ms, 1000);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hots = \"typo\"").unwrap();
        assert!(load_from(file.path()).is_none());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut c = Config::default();
        apply_env(
            &mut c,
            env(&[
                ("TSFRAME_ROLE", "serve"),
                ("TSFRAME_PORT", "1234"),
                ("TSFRAME_MODE", "non-blocking"),
                ("TSFRAME_READ_TIMEOUT_MS", "250"),
                ("TSFRAME_FRAMES_PER_CLIENT", "5"),
                ("TSFRAME_SOURCE_MODE", "non_blocking"),
            ]),
        );
        assert_eq!(c.role, Role::Serve);
        assert_eq!(c.port, 1234);
        assert_eq!(c.mode, Mode::NonBlocking);
        assert_eq!(c.reader_config().read_timeout, Some(Duration::from_millis(250)));
        assert_eq!(c.source_config().frames_per_client, 5);
        assert_eq!(c.source_config().mode, Mode::NonBlocking);
        assert_eq!(c.source_addr().port(), 1234);
    }

    #[test]
    fn bad_env_values_are_ignored() {
        let mut c = Config::default();
        apply_env(
            &mut c,
            env(&[
                ("TSFRAME_PORT", "not-a-port"),
                ("TSFRAME_MODE", "sideways"),
                ("TSFRAME_CONNECT_TIMEOUT_MS", "-1"),
            ]),
        );
        assert_eq!(c, Config::default());
    }
}
