// Process configuration.
//
// Read once at startup from the first config file found:
// `$GITRELOAD_CONFIG`, `./gr.env.json`, `~/.gr.env.json`, `/etc/gr.env.json`.
// JSON is the native format; a path ending in `.toml` is parsed as TOML.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::import::ImportSettings;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "GITRELOAD_CONFIG";
const CONFIG_FILE_NAME: &str = "gr.env.json";
const DEFAULT_TIMEOUT_SECS: f64 = 60.0;

/// Server configuration. Keys keep the upper-case names used by existing
/// `gr.env.json` files; unknown keys are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Base directory holding one mirror per repository name.
    #[serde(rename = "REPODIR")]
    pub repo_dir: PathBuf,
    /// Virtualenv of the downstream platform; the importer runs `bin/python` from here.
    #[serde(rename = "VIRTUAL_ENV")]
    pub virtual_env: PathBuf,
    /// Settings module passed as `--settings=` to the import command.
    #[serde(rename = "DJANGO_SETTINGS")]
    pub django_settings: String,
    /// Checkout of the downstream platform, used as the import working directory.
    #[serde(rename = "EDX_PLATFORM")]
    pub edx_platform: PathBuf,
    #[serde(rename = "LOG_LEVEL")]
    pub log_level: Option<String>,
    /// Number of queue workers.
    #[serde(rename = "NUM_THREADS", deserialize_with = "number_or_text")]
    pub num_workers: usize,
    /// Import command timeout, in seconds. Fractions are allowed.
    #[serde(rename = "SUBPROCESS_TIMEOUT", deserialize_with = "number_or_text")]
    pub subprocess_timeout_secs: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            repo_dir: PathBuf::from("/mnt/data/repos"),
            virtual_env: PathBuf::from("/edx/app/edxapp/venvs/edxapp"),
            django_settings: "aws".into(),
            edx_platform: PathBuf::from("/edx/app/edxapp/edx-platform"),
            log_level: None,
            num_workers: 1,
            subprocess_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    /// Load from `explicit` if given, otherwise from the first existing file
    /// on the search path. Returns defaults when no file exists. The second
    /// element is the file that was read, if any.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => search_paths_with(|key| std::env::var(key)).into_iter().find(|p| p.is_file()),
        };

        match path {
            Some(path) => Ok((Self::load_from(&path)?, Some(path))),
            None => Ok((Self::default(), None)),
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let is_toml = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let config: Self = if is_toml {
            toml::from_str(&contents).map_err(ConfigError::Toml)?
        } else {
            serde_json::from_str(&contents).map_err(ConfigError::Json)?
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::Invalid("NUM_THREADS must be at least 1".into()));
        }
        let timeout = Duration::try_from_secs_f64(self.subprocess_timeout_secs);
        if !timeout.is_ok_and(|timeout| !timeout.is_zero()) {
            return Err(ConfigError::Invalid(format!(
                "SUBPROCESS_TIMEOUT must be a positive number of seconds, got {}",
                self.subprocess_timeout_secs
            )));
        }
        self.log_filter().map(|_| ())
    }

    /// Import timeout. Out-of-range values (only reachable when the
    /// struct is built by hand) fall back to the default.
    pub fn subprocess_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.subprocess_timeout_secs)
            .unwrap_or(Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS))
    }

    /// Translate `LOG_LEVEL` into a tracing filter directive.
    pub fn log_filter(&self) -> Result<Option<&'static str>, ConfigError> {
        self.log_level.as_deref().map(parse_log_level).transpose()
    }

    pub fn import_settings(&self) -> ImportSettings {
        ImportSettings {
            python: self.virtual_env.join("bin").join("python"),
            platform_dir: self.edx_platform.clone(),
            django_settings: self.django_settings.clone(),
            repo_dir: self.repo_dir.clone(),
            timeout: self.subprocess_timeout(),
        }
    }
}

/// Map a log level name (the classic DEBUG/INFO/WARNING/ERROR/CRITICAL set,
/// case-insensitive) onto a tracing level directive.
pub fn parse_log_level(level: &str) -> Result<&'static str, ConfigError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "notset" | "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warning" | "warn" => Ok("warn"),
        "error" | "critical" | "fatal" => Ok("error"),
        _ => Err(ConfigError::InvalidLogLevel(level.to_string())),
    }
}

/// Numeric keys may be written as numbers or as numeric strings
/// (`"NUM_THREADS": "4"`), as older config files do.
fn number_or_text<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: std::fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient<T> {
        Number(T),
        Text(String),
    }

    match Lenient::<T>::deserialize(deserializer)? {
        Lenient::Number(value) => Ok(value),
        Lenient::Text(text) => text.trim().parse().map_err(|e| {
            serde::de::Error::custom(format!("invalid number {text:?}: {e}"))
        }),
    }
}

/// Candidate config files, in priority order.
fn search_paths_with<F>(env: F) -> Vec<PathBuf>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let mut paths = Vec::new();
    if let Ok(explicit) = env(CONFIG_ENV_VAR) {
        if !explicit.is_empty() {
            paths.push(PathBuf::from(explicit));
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(CONFIG_FILE_NAME));
    }
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(format!(".{CONFIG_FILE_NAME}")));
    }
    paths.push(Path::new("/etc").join(CONFIG_FILE_NAME));
    paths
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Toml(toml::de::Error),
    InvalidLogLevel(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Json(e) => write!(f, "config parse error: {e}"),
            Self::Toml(e) => write!(f, "config parse error: {e}"),
            Self::InvalidLogLevel(level) => write!(f, "Invalid log level: {level}"),
            Self::Invalid(reason) => write!(f, "invalid config: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from_map(
        map: HashMap<&'static str, &'static str>,
    ) -> impl Fn(&str) -> Result<String, std::env::VarError> {
        move |key: &str| map.get(key).map(|v| v.to_string()).ok_or(std::env::VarError::NotPresent)
    }

    #[test]
    fn defaults_match_stock_deployment() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.repo_dir, PathBuf::from("/mnt/data/repos"));
        assert_eq!(cfg.virtual_env, PathBuf::from("/edx/app/edxapp/venvs/edxapp"));
        assert_eq!(cfg.django_settings, "aws");
        assert_eq!(cfg.edx_platform, PathBuf::from("/edx/app/edxapp/edx-platform"));
        assert!(cfg.log_level.is_none());
        assert_eq!(cfg.num_workers, 1);
        assert_eq!(cfg.subprocess_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn json_file_overrides_defaults_and_ignores_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gr.env.json");
        std::fs::write(
            &path,
            r#"{
                "REPODIR": "/srv/repos",
                "NUM_THREADS": 4,
                "SUBPROCESS_TIMEOUT": 900,
                "LOG_LEVEL": "WARNING",
                "LINKED_REPOS": {"a": ["b"]}
            }"#,
        )
        .unwrap();

        let cfg = ServerConfig::load_from(&path).unwrap();
        assert_eq!(cfg.repo_dir, PathBuf::from("/srv/repos"));
        assert_eq!(cfg.num_workers, 4);
        assert_eq!(cfg.subprocess_timeout(), Duration::from_secs(900));
        assert_eq!(cfg.log_filter().unwrap(), Some("warn"));
        // untouched keys keep defaults
        assert_eq!(cfg.django_settings, "aws");
    }

    #[test]
    fn toml_file_is_parsed_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gitreload.toml");
        std::fs::write(&path, "REPODIR = \"/data/mirrors\"\nDJANGO_SETTINGS = \"devstack\"\n")
            .unwrap();

        let cfg = ServerConfig::load_from(&path).unwrap();
        assert_eq!(cfg.repo_dir, PathBuf::from("/data/mirrors"));
        assert_eq!(cfg.django_settings, "devstack");
    }

    #[test]
    fn numeric_strings_and_fractional_timeouts_are_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gr.env.json");
        std::fs::write(&path, r#"{"NUM_THREADS": "4", "SUBPROCESS_TIMEOUT": 60.0}"#).unwrap();

        let cfg = ServerConfig::load_from(&path).unwrap();
        assert_eq!(cfg.num_workers, 4);
        assert_eq!(cfg.subprocess_timeout(), Duration::from_secs(60));

        std::fs::write(&path, r#"{"SUBPROCESS_TIMEOUT": "2.5"}"#).unwrap();
        let cfg = ServerConfig::load_from(&path).unwrap();
        assert_eq!(cfg.subprocess_timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn non_numeric_and_non_positive_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gr.env.json");

        std::fs::write(&path, r#"{"NUM_THREADS": "many"}"#).unwrap();
        assert!(matches!(ServerConfig::load_from(&path), Err(ConfigError::Json(_))));

        std::fs::write(&path, r#"{"SUBPROCESS_TIMEOUT": -5}"#).unwrap();
        assert!(matches!(ServerConfig::load_from(&path), Err(ConfigError::Invalid(_))));

        std::fs::write(&path, r#"{"SUBPROCESS_TIMEOUT": 0}"#).unwrap();
        assert!(matches!(ServerConfig::load_from(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gr.env.json");
        std::fs::write(&path, r#"{"NUM_THREADS": 0}"#).unwrap();

        let error = ServerConfig::load_from(&path).unwrap_err();
        assert!(matches!(error, ConfigError::Invalid(_)));
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gr.env.json");
        std::fs::write(&path, r#"{"LOG_LEVEL": "chatty"}"#).unwrap();

        let error = ServerConfig::load_from(&path).unwrap_err();
        assert_eq!(error.to_string(), "Invalid log level: chatty");
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gr.env.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(ServerConfig::load_from(&path), Err(ConfigError::Json(_))));
    }

    #[test]
    fn log_levels_map_onto_tracing_directives() {
        assert_eq!(parse_log_level("DEBUG").unwrap(), "debug");
        assert_eq!(parse_log_level("info").unwrap(), "info");
        assert_eq!(parse_log_level("Warning").unwrap(), "warn");
        assert_eq!(parse_log_level("CRITICAL").unwrap(), "error");
        assert_eq!(parse_log_level("NOTSET").unwrap(), "trace");
        assert!(parse_log_level("verbose").is_err());
    }

    #[test]
    fn explicit_env_path_is_searched_first() {
        let mut m = HashMap::new();
        m.insert(CONFIG_ENV_VAR, "/opt/gitreload/custom.json");
        let paths = search_paths_with(env_from_map(m));
        assert_eq!(paths[0], PathBuf::from("/opt/gitreload/custom.json"));
        assert_eq!(paths.last().unwrap(), &PathBuf::from("/etc/gr.env.json"));
    }

    #[test]
    fn empty_env_path_is_skipped() {
        let mut m = HashMap::new();
        m.insert(CONFIG_ENV_VAR, "");
        let paths = search_paths_with(env_from_map(m));
        assert!(paths.iter().all(|p| !p.as_os_str().is_empty()));
        assert!(paths[0].ends_with("gr.env.json"));
    }

    #[test]
    fn explicit_path_wins_over_search() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("explicit.json");
        std::fs::write(&path, r#"{"DJANGO_SETTINGS": "production"}"#).unwrap();

        let (cfg, used) = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.django_settings, "production");
        assert_eq!(used.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn import_settings_derive_interpreter_path() {
        let cfg = ServerConfig::default();
        let settings = cfg.import_settings();
        assert_eq!(settings.python, PathBuf::from("/edx/app/edxapp/venvs/edxapp/bin/python"));
        assert_eq!(settings.platform_dir, cfg.edx_platform);
        assert_eq!(settings.timeout, Duration::from_secs(60));
    }
}
