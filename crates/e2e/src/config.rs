//! Runner configuration
//!
//! Loaded from YAML (`flowcheck.yaml`), then overridden from the environment,
//! then by whatever the caller sets explicitly. Every duration is in
//! milliseconds.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::driver::LaunchOptions;
use crate::error::{E2eError, E2eResult};

pub const DEFAULT_CONFIG_FILE: &str = "flowcheck.yaml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowcheckConfig {
    pub target: TargetConfig,
    pub launch: LaunchConfig,
    pub timeouts: Timeouts,
    pub output: OutputConfig,
}

/// Where the application under test lives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub url: String,

    /// Command that starts the application (e.g. `npm run dev`); empty = unmanaged
    pub command: Vec<String>,

    /// Working directory for `command`
    pub cwd: Option<PathBuf>,

    /// Extra environment for `command`
    pub env: BTreeMap<String, String>,

    /// Path appended to `url` for the reachability probe
    pub health_path: String,

    pub startup_timeout_ms: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5173".to_string(),
            command: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            health_path: "/".to_string(),
            startup_timeout_ms: 30_000,
        }
    }
}

/// Browser process launch parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,

    /// Avoid /dev/shm, which is tiny in most containers
    pub disable_dev_shm: bool,
    pub host_ipc: bool,
    pub single_process: bool,

    /// Appended verbatim after the generated flags
    pub extra_args: Vec<String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1280,
            window_height: 720,
            disable_dev_shm: true,
            host_ipc: true,
            single_process: true,
            extra_args: Vec::new(),
        }
    }
}

impl LaunchConfig {
    pub fn to_options(&self) -> LaunchOptions {
        let mut args = vec![format!("--window-size={},{}", self.window_width, self.window_height)];
        if self.disable_dev_shm {
            args.push("--disable-dev-shm-usage".to_string());
        }
        if self.host_ipc {
            args.push("--ipc=host".to_string());
        }
        if self.single_process {
            args.push("--single-process".to_string());
        }
        args.extend(self.extra_args.iter().cloned());

        LaunchOptions {
            headless: self.headless,
            args,
        }
    }
}

/// Bounds for every suspension point
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Default interaction timeout set on the browser context
    pub context_default_ms: u64,

    /// Initial navigation, until the request is committed
    pub navigation_ms: u64,

    /// Best-effort `domcontentloaded` wait, per frame
    pub readiness_ms: u64,

    /// Fixed delay before each interaction
    pub settle_ms: u64,

    pub action_ms: u64,

    pub verify_ms: u64,
    pub poll_interval_ms: u64,

    /// Pause after the verdict, before teardown
    pub hold_after_verify_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            context_default_ms: 5_000,
            navigation_ms: 10_000,
            readiness_ms: 3_000,
            settle_ms: 3_000,
            action_ms: 5_000,
            verify_ms: 1_000,
            poll_interval_ms: 100,
            hold_after_verify_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub results_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("test-results"),
            results_file: "flowcheck-results.json".to_string(),
        }
    }
}

impl FlowcheckConfig {
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Read `path` if given, else `flowcheck.yaml` when present, else defaults;
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> E2eResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `FLOWCHECK_*` overrides. The lookup is injected so tests don't touch
    /// the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> E2eResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("FLOWCHECK_TARGET_URL") {
            debug!(%url, "target url overridden from environment");
            self.target.url = url;
        }
        if let Some(raw) = lookup("FLOWCHECK_HEADLESS") {
            self.launch.headless = parse_bool(&raw).ok_or_else(|| {
                E2eError::Config(format!("FLOWCHECK_HEADLESS must be a boolean, got '{}'", raw))
            })?;
        }
        if let Some(dir) = lookup("FLOWCHECK_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }
        self.validate()
    }

    pub fn validate(&self) -> E2eResult<()> {
        if !(self.target.url.starts_with("http://") || self.target.url.starts_with("https://")) {
            return Err(E2eError::Config(format!(
                "target.url must be an http(s) origin, got '{}'",
                self.target.url
            )));
        }
        if self.launch.window_width == 0 || self.launch.window_height == 0 {
            return Err(E2eError::Config("launch window size must be non-zero".to_string()));
        }
        if !self.target.health_path.starts_with('/') {
            return Err(E2eError::Config("target.health_path must start with '/'".to_string()));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(E2eError::Config("timeouts.poll_interval_ms must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn results_path(&self) -> PathBuf {
        self.output.dir.join(&self.output.results_file)
    }
}

/// Absolute URLs pass through; anything else is joined onto `base`.
pub fn join_url(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    let path = url.trim_start_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_container_launch_profile() {
        let config = FlowcheckConfig::default();
        let options = config.launch.to_options();

        assert!(options.headless);
        assert_eq!(
            options.args,
            vec![
                "--window-size=1280,720",
                "--disable-dev-shm-usage",
                "--ipc=host",
                "--single-process",
            ]
        );
        assert_eq!(config.target.url, "http://localhost:5173");
        assert_eq!(config.timeouts.navigation_ms, 10_000);
        assert_eq!(config.timeouts.context_default_ms, 5_000);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = r#"
target:
  url: http://127.0.0.1:4173
timeouts:
  settle_ms: 250
launch:
  single_process: false
  extra_args: ["--lang=es-PE"]
"#;
        let config = FlowcheckConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.target.url, "http://127.0.0.1:4173");
        assert_eq!(config.timeouts.settle_ms, 250);
        assert_eq!(config.timeouts.action_ms, 5_000);

        let args = config.launch.to_options().args;
        assert!(!args.iter().any(|a| a == "--single-process"));
        assert_eq!(args.last().map(String::as_str), Some("--lang=es-PE"));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("FLOWCHECK_TARGET_URL", "http://10.0.0.5:5173"),
            ("FLOWCHECK_HEADLESS", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = FlowcheckConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.target.url, "http://10.0.0.5:5173");
        assert!(!config.launch.headless);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(FlowcheckConfig::from_yaml("target:\n  url: localhost:5173\n").is_err());

        let mut config = FlowcheckConfig::default();
        let err = config
            .apply_env(|k| (k == "FLOWCHECK_HEADLESS").then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, E2eError::Config(_)));
    }

    #[test]
    fn joins_relative_urls() {
        let origin = "http://localhost:5173";
        assert_eq!(join_url(&format!("{origin}/"), "/inquilinos"), format!("{origin}/inquilinos"));
        assert_eq!(join_url(origin, ""), origin);
        assert_eq!(join_url(origin, "https://example.com/x"), "https://example.com/x");
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowcheck.yaml");
        std::fs::write(&path, "output:\n  dir: out\n").unwrap();

        let config = FlowcheckConfig::from_file(&path).unwrap();
        assert_eq!(config.results_path(), PathBuf::from("out/flowcheck-results.json"));
    }
}
