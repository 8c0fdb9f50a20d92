use davmirror_core::{DavError, ReplicatedStore, ReplicationMode, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URLs of the replicas, in write order.
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub read_fallback: Option<String>,
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Seconds; absent or 0 means the built-in default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub replication_mode: ReplicationMode,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_upload_bytes() -> usize {
    64 * 1024 * 1024
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(
                ::config::Environment::with_prefix("DAVMIRROR")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("locations"),
            )
            .build()
            .map_err(|e| DavError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| DavError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn build_store(&self) -> Result<ReplicatedStore> {
        let mut builder = ReplicatedStore::builder()
            .locations(self.locations.iter().cloned())
            .replication_mode(self.replication_mode)
            .timeout(Duration::from_secs(self.timeout_secs.unwrap_or_default()));

        if let Some(fallback) = self.read_fallback.as_deref() {
            builder = builder.fallback(fallback);
        }

        if let Some(public_base_url) = self.public_base_url.as_deref() {
            builder = builder.public_base_url(public_base_url);
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use davmirror_core::DEFAULT_TIMEOUT;
    use std::io::Write;

    const ENV_KEYS: [&str; 2] = ["DAVMIRROR_LOCATIONS", "DAVMIRROR_TIMEOUT_SECS"];

    /// Loads `file` with the override variables cleared for the duration.
    fn load_clean(file: &tempfile::NamedTempFile) -> Result<Config> {
        temp_env::with_vars_unset(ENV_KEYS, || {
            Config::from_file(file.path().to_str().unwrap())
        })
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn loads_full_config() {
        let file = write_config(
            r#"
locations:
  - "http://dav1/media/"
  - "http://dav2/media/"
read_fallback: "http://archive/media/"
public_base_url: "https://cdn.example.com/media/"
timeout_secs: 7
replication_mode: concurrent
bind_addr: "127.0.0.1:9000"
"#,
        );

        let config = load_clean(&file).unwrap();
        assert_eq!(config.locations.len(), 2);
        assert_eq!(config.replication_mode, ReplicationMode::Concurrent);
        assert_eq!(config.bind_addr, "127.0.0.1:9000");

        let store = config.build_store().unwrap();
        assert_eq!(store.locations().len(), 2);
        assert_eq!(store.timeout(), Duration::from_secs(7));
        assert_eq!(
            store.fallback().map(|location| location.to_string()),
            Some("http://archive/media/".to_string())
        );
        assert_eq!(store.url("a.txt"), "https://cdn.example.com/media/a.txt");
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let file = write_config("locations: [\"http://dav1/media/\"]\ntimeout_secs: 0\n");

        let config = load_clean(&file).unwrap();
        assert_eq!(config.replication_mode, ReplicationMode::Sequential);
        assert_eq!(config.bind_addr, "0.0.0.0:8080");

        let store = config.build_store().unwrap();
        assert_eq!(store.timeout(), DEFAULT_TIMEOUT);
        assert!(store.fallback().is_none());
    }

    #[test]
    fn empty_locations_are_rejected() {
        let file = write_config("locations: []\n");
        let config = load_clean(&file).unwrap();
        assert!(matches!(config.build_store(), Err(DavError::Config(_))));
    }

    #[test]
    fn environment_overrides_file() {
        let file = write_config("locations: [\"http://dav1/media/\"]\ntimeout_secs: 7\n");

        let config = temp_env::with_vars(
            [
                ("DAVMIRROR_LOCATIONS", Some("http://a/,http://b/")),
                ("DAVMIRROR_TIMEOUT_SECS", Some("3")),
            ],
            || Config::from_file(file.path().to_str().unwrap()),
        )
        .unwrap();

        assert_eq!(config.locations, vec!["http://a/", "http://b/"]);
        assert_eq!(config.timeout_secs, Some(3));

        let store = config.build_store().unwrap();
        assert_eq!(store.locations().len(), 2);
        assert_eq!(store.timeout(), Duration::from_secs(3));
        assert_eq!(store.url("x.txt"), "http://a/x.txt");
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(matches!(
            Config::from_file(path.to_str().unwrap()),
            Err(DavError::Config(_))
        ));
    }
}
