//! Configuration management for conda-firewall
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files. `${VAR}` references are expanded from the environment
//! before parsing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::REPODATA_FILENAME;

/// Name of the admitted-filename index at the filtered root
pub const FILENAMES_INDEX: &str = "filenames.txt";

/// Name of the admitted-package-name index at the filtered root
pub const PACKAGE_NAMES_INDEX: &str = "packagenames.txt";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Upstream conda host configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Raw catalogs younger than this are not downloaded again
    #[serde(default = "default_max_age_minutes")]
    pub max_age_minutes: u64,

    /// `Cache-Control: max-age` advertised on served catalogs
    #[serde(default = "default_cache_control_max_age_minutes")]
    pub cache_control_max_age_minutes: u64,

    /// Root of the raw (unfiltered) catalog cache
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,

    /// Root of the filtered catalog store and index files
    #[serde(default = "default_filtered_dir")]
    pub filtered_dir: PathBuf,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Mirrored channels by name
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            max_age_minutes: default_max_age_minutes(),
            cache_control_max_age_minutes: default_cache_control_max_age_minutes(),
            raw_dir: default_raw_dir(),
            filtered_dir: default_filtered_dir(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            channels: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_yaml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // First, expand environment variables in the YAML string
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Check values the type system cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let host = self.upstream.host.trim();
        if host.is_empty() {
            return Err(ConfigError::MissingRequired("upstream.host".to_string()));
        }
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(format!(
                "upstream.host must start with http:// or https://, got {}",
                host
            )));
        }
        if self.upstream.download_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "upstream.download_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.upstream.proxy_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "upstream.proxy_timeout_secs must be greater than zero".to_string(),
            ));
        }

        for (name, channel) in &self.channels {
            if name.is_empty() || name.contains('/') {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid channel name: {:?}",
                    name
                )));
            }
            if channel.subdirs.is_empty() {
                return Err(ConfigError::InvalidValue(format!(
                    "channel {} has no subdirs",
                    name
                )));
            }
            if let Some(subdir) = channel
                .subdirs
                .iter()
                .find(|s| s.is_empty() || s.contains('/'))
            {
                return Err(ConfigError::InvalidValue(format!(
                    "channel {} has invalid subdir {:?}",
                    name, subdir
                )));
            }
        }

        Ok(())
    }

    /// Upstream host without a trailing slash
    pub fn upstream_host(&self) -> &str {
        self.upstream.host.trim_end_matches('/')
    }

    /// True if `channel` is configured and lists `subdir`
    pub fn has_subdir(&self, channel: &str, subdir: &str) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|c| c.subdirs.iter().any(|s| s == subdir))
    }

    /// Location of the raw catalog for a channel subdir
    pub fn raw_repodata_path(&self, channel: &str, subdir: &str) -> PathBuf {
        repodata_path(&self.raw_dir, channel, subdir)
    }

    /// Location of the filtered catalog for a channel subdir
    pub fn filtered_repodata_path(&self, channel: &str, subdir: &str) -> PathBuf {
        repodata_path(&self.filtered_dir, channel, subdir)
    }

    pub fn filenames_index_path(&self) -> PathBuf {
        self.filtered_dir.join(FILENAMES_INDEX)
    }

    pub fn package_names_index_path(&self) -> PathBuf {
        self.filtered_dir.join(PACKAGE_NAMES_INDEX)
    }
}

/// `{root}/{channel}/{subdir}/repodata.json`
pub fn repodata_path(root: &Path, channel: &str, subdir: &str) -> PathBuf {
    root.join(channel).join(subdir).join(REPODATA_FILENAME)
}

fn default_max_age_minutes() -> u64 {
    1440
}

fn default_cache_control_max_age_minutes() -> u64 {
    1440
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("repodata-cache/original")
}

fn default_filtered_dir() -> PathBuf {
    PathBuf::from("repodata-cache/filtered")
}

/// Upstream conda host configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    /// Base URL of the upstream host
    #[serde(default = "default_upstream_host")]
    pub host: String,

    /// Timeout for catalog downloads in seconds
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// Timeout for each proxied request in seconds
    #[serde(default = "default_proxy_timeout")]
    pub proxy_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: default_upstream_host(),
            download_timeout_secs: default_download_timeout(),
            proxy_timeout_secs: default_proxy_timeout(),
        }
    }
}

fn default_upstream_host() -> String {
    "https://conda.anaconda.org".to_string()
}

fn default_download_timeout() -> u64 {
    120
}

fn default_proxy_timeout() -> u64 {
    30
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Reject package file requests missing from the filename index
    #[serde(default = "default_gate_package_files")]
    pub gate_package_files: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            gate_package_files: default_gate_package_files(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_gate_package_files() -> bool {
    true
}

/// Per-channel mirroring configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelConfig {
    /// Platform subdirs to mirror, in order
    #[serde(default)]
    pub subdirs: Vec<String>,

    /// Newline-delimited package allowlist; everything is allowed if unset
    #[serde(default)]
    pub allowlist_file: Option<PathBuf>,

    /// Widen the allowlist with every transitive dependency
    #[serde(default)]
    pub recurse_dependencies: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
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

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax. Unset variables are left as-is.
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: Parse complete configuration from YAML
    #[test]
    fn test_parse_complete_yaml_config() {
        let yaml = r#"
upstream:
  host: "https://mirror.example.org"
  download_timeout_secs: 300
  proxy_timeout_secs: 15

max_age_minutes: 60
cache_control_max_age_minutes: 10
raw_dir: "/var/cache/conda/original"
filtered_dir: "/var/cache/conda/filtered"

server:
  host: "0.0.0.0"
  port: 9090
  gate_package_files: false

logging:
  level: "debug"
  format: "pretty"

channels:
  conda-forge:
    subdirs: [linux-64, noarch]
    allowlist_file: /etc/conda-firewall/conda-forge.txt
    recurse_dependencies: true
  bioconda:
    subdirs: [noarch]
"#;

        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.upstream.host, "https://mirror.example.org");
        assert_eq!(config.upstream.download_timeout_secs, 300);
        assert_eq!(config.upstream.proxy_timeout_secs, 15);
        assert_eq!(config.max_age_minutes, 60);
        assert_eq!(config.cache_control_max_age_minutes, 10);
        assert_eq!(config.raw_dir, PathBuf::from("/var/cache/conda/original"));
        assert_eq!(
            config.filtered_dir,
            PathBuf::from("/var/cache/conda/filtered")
        );

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9090);
        assert!(!config.server.gate_package_files);

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");

        assert_eq!(config.channels.len(), 2);
        let forge = config.channels.get("conda-forge").unwrap();
        assert_eq!(forge.subdirs, vec!["linux-64", "noarch"]);
        assert_eq!(
            forge.allowlist_file,
            Some(PathBuf::from("/etc/conda-firewall/conda-forge.txt"))
        );
        assert!(forge.recurse_dependencies);

        let bioconda = config.channels.get("bioconda").unwrap();
        assert_eq!(bioconda.subdirs, vec!["noarch"]);
        assert_eq!(bioconda.allowlist_file, None);
        assert!(!bioconda.recurse_dependencies);

        assert!(config.validate().is_ok());
    }

    // Test 2: Default values are applied for missing fields
    #[test]
    fn test_default_values_applied() {
        let yaml = r#"
server:
  port: 3000
"#;

        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.upstream.host, "https://conda.anaconda.org");
        assert_eq!(config.upstream.download_timeout_secs, 120);
        assert_eq!(config.upstream.proxy_timeout_secs, 30);
        assert_eq!(config.max_age_minutes, 1440);
        assert_eq!(config.cache_control_max_age_minutes, 1440);
        assert_eq!(config.raw_dir, PathBuf::from("repodata-cache/original"));
        assert_eq!(
            config.filtered_dir,
            PathBuf::from("repodata-cache/filtered")
        );

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert!(config.server.gate_package_files);

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "json");
        assert!(config.channels.is_empty());
    }

    // Test 3: Environment variable expansion
    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("TEST_CONDA_FIREWALL_HOST", "https://env.example.org");
        std::env::set_var("TEST_CONDA_FIREWALL_ALLOWLIST", "/env/allow.txt");

        let yaml = r#"
upstream:
  host: "${TEST_CONDA_FIREWALL_HOST}"
channels:
  conda-forge:
    subdirs: [noarch]
    allowlist_file: "${TEST_CONDA_FIREWALL_ALLOWLIST}"
"#;

        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.upstream.host, "https://env.example.org");
        assert_eq!(
            config.channels["conda-forge"].allowlist_file,
            Some(PathBuf::from("/env/allow.txt"))
        );

        std::env::remove_var("TEST_CONDA_FIREWALL_HOST");
        std::env::remove_var("TEST_CONDA_FIREWALL_ALLOWLIST");
    }

    // Test 4: Unset variables are left untouched
    #[test]
    fn test_env_var_expansion_leaves_unknown() {
        let expanded = expand_env_vars("path: ${CONDA_FIREWALL_SURELY_UNSET_VAR}");
        assert_eq!(expanded, "path: ${CONDA_FIREWALL_SURELY_UNSET_VAR}");
    }

    // Test 5: Parse error for invalid YAML
    #[test]
    fn test_parse_error_invalid_yaml() {
        let yaml = r#"
server:
  port: "not_a_number"
"#;

        let result = Config::from_yaml(yaml);
        match result {
            Err(ConfigError::Parse(msg)) => {
                assert!(msg.contains("Failed to parse YAML"));
            }
            _ => panic!("Expected ConfigError::Parse"),
        }
    }

    // Test 6: Empty YAML results in defaults
    #[test]
    fn test_empty_yaml_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    // Test 7: Config serialization round-trip
    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = Config::default();
        config.channels.insert(
            "conda-forge".to_string(),
            ChannelConfig {
                subdirs: vec!["noarch".to_string()],
                allowlist_file: Some(PathBuf::from("allow.txt")),
                recurse_dependencies: true,
            },
        );

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(config, parsed);
    }

    // Test 8: Validation rejects bad values
    #[test]
    fn test_validate_rejects_invalid_values() {
        let mut config = Config::default();
        config.upstream.host = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(_))
        ));

        let mut config = Config::default();
        config.upstream.host = "ftp://example.org".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = Config::default();
        config.upstream.proxy_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = Config::default();
        config
            .channels
            .insert("conda-forge".to_string(), ChannelConfig::default());
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = Config::default();
        config.channels.insert(
            "conda-forge".to_string(),
            ChannelConfig {
                subdirs: vec!["linux-64/../x".to_string()],
                ..Default::default()
            },
        );
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    // Test 9: from_file validates after parsing
    #[test]
    fn test_from_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "channels:\n  conda-forge:\n    subdirs: []\n").unwrap();

        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::InvalidValue(_))
        ));

        let missing = Config::from_file(dir.path().join("missing.yaml"));
        assert!(matches!(missing, Err(ConfigError::FileRead(_))));
    }

    // Test 10: Path helpers
    #[test]
    fn test_path_helpers() {
        let config = Config {
            raw_dir: PathBuf::from("/raw"),
            filtered_dir: PathBuf::from("/filtered"),
            ..Default::default()
        };

        assert_eq!(
            config.raw_repodata_path("conda-forge", "linux-64"),
            PathBuf::from("/raw/conda-forge/linux-64/repodata.json")
        );
        assert_eq!(
            config.filtered_repodata_path("conda-forge", "noarch"),
            PathBuf::from("/filtered/conda-forge/noarch/repodata.json")
        );
        assert_eq!(
            config.filenames_index_path(),
            PathBuf::from("/filtered/filenames.txt")
        );
        assert_eq!(
            config.package_names_index_path(),
            PathBuf::from("/filtered/packagenames.txt")
        );
    }

    // Test 11: Subdir membership and host normalisation
    #[test]
    fn test_has_subdir_and_upstream_host() {
        let mut config = Config::default();
        config.upstream.host = "https://conda.anaconda.org/".to_string();
        config.channels.insert(
            "conda-forge".to_string(),
            ChannelConfig {
                subdirs: vec!["linux-64".to_string()],
                ..Default::default()
            },
        );

        assert!(config.has_subdir("conda-forge", "linux-64"));
        assert!(!config.has_subdir("conda-forge", "osx-64"));
        assert!(!config.has_subdir("bioconda", "linux-64"));
        assert_eq!(config.upstream_host(), "https://conda.anaconda.org");
    }
}
