//! Loader for workspace configuration with YAML + environment overlays.
//!
//! Every field has a default, so an empty document (or no file at all) yields
//! a working configuration that scrapes `KiMi_` on SensCritique and serves on
//! port 5000. Sources are merged in this order, later ones winning:
//!
//! 1. YAML files / inline snippets, in the order they were added
//! 2. `CRITIQUE__<SECTION>__<KEY>` environment variables
//!
//! `${VAR}` placeholders inside string values are expanded afterwards.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const ENV_PREFIX: &str = "CRITIQUE";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CritiqueConfig {
    pub source: SourceConfig,
    pub crawl: CrawlConfig,
    pub http: HttpConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
    pub log: LogSettings,
}

/// Whose reviews are crawled, and on which site.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub username: String,
    pub origin: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            username: "KiMi_".into(),
            origin: "https://www.senscritique.com".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlMode {
    Strict,
    #[default]
    Permissive,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub max_pages: u32,
    pub delay_ms: u64,
    pub mode: CrawlMode,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages: 10,
            delay_ms: 1000,
            mode: CrawlMode::Permissive,
        }
    }
}

impl CrawlConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub retries: usize,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retries: 0,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub path: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            path: "senscritique_reviews.json".into(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `text` or `json`.
    pub format: String,
    pub dir: Option<String>,
    pub stderr: bool,
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: "text".into(),
            dir: None,
            stderr: true,
            filter: "info".into(),
        }
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct CritiqueConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for CritiqueConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl CritiqueConfigLoader {
    /// Start from the built-in defaults.
    ///
    /// ```
    /// use critique_config::CritiqueConfigLoader;
    ///
    /// let config = CritiqueConfigLoader::new()
    ///     .with_yaml_str("crawl:\n  max_pages: 3")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.crawl.max_pages, 3);
    /// assert_eq!(config.source.username, "KiMi_");
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Like [`with_file`](Self::with_file) but a missing file is skipped, so
    /// deployments can rely purely on environment variables.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into strongly typed config.
    ///
    /// ```
    /// use critique_config::CritiqueConfigLoader;
    ///
    /// unsafe { std::env::set_var("CRITIQUE_DOC_USER", "someone"); }
    ///
    /// let config = CritiqueConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// source:
    ///   username: "${CRITIQUE_DOC_USER}"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(config.source.username, "someone");
    /// assert_eq!(config.source.origin, "https://www.senscritique.com");
    ///
    /// unsafe { std::env::remove_var("CRITIQUE_DOC_USER"); }
    /// ```
    pub fn load(self) -> Result<CritiqueConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        // Convert to serde_json::Value first
        let mut v: Value = cfg.try_deserialize()?;
        if v.is_null() {
            v = Value::Object(Default::default());
        }
        expand_env_in_value(&mut v);

        let typed: CritiqueConfig =
            serde_json::from_value(v).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("FOO", Some("bar"), || {
            let mut v = json!("prefix-${FOO}-suffix");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_in_array_and_object() {
        temp_env::with_vars([("CITY", Some("Lyon")), ("DEPT", Some("69"))], || {
            let mut v = json!([
                "hello-$CITY",
                { "loc": "${CITY}-${DEPT}" },
                42,
                true,
                null
            ]);
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!(["hello-Lyon", { "loc": "Lyon-69" }, 42, true, null])
            );
        });
    }

    #[test]
    fn expands_recursively_across_env_values() {
        temp_env::with_vars(
            [
                ("BAZ", Some("qux")),
                ("BAR", Some("mid-${BAZ}")),
                ("FOO", Some("start-${BAR}-end")),
            ],
            || {
                let mut v = json!("X=${FOO}");
                expand_env_in_value(&mut v);
                assert_eq!(v, json!("X=start-mid-qux-end"));
            },
        );
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${DOES_NOT_EXIST}"));
    }

    #[test]
    fn defaults_match_the_public_listing() {
        let cfg = CritiqueConfig::default();
        assert_eq!(cfg.crawl.max_pages, 10);
        assert_eq!(cfg.crawl.delay(), Duration::from_secs(1));
        assert_eq!(cfg.crawl.mode, CrawlMode::Permissive);
        assert_eq!(cfg.cache.ttl(), Duration::from_secs(600));
        assert_eq!(cfg.server.bind, "0.0.0.0:5000");
        assert_eq!(cfg.http.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let cfg = CritiqueConfigLoader::new()
            .with_yaml_str("crawl:\n  mode: strict\ncache:\n  ttl_secs: 5")
            .load()
            .unwrap();
        assert_eq!(cfg.crawl.mode, CrawlMode::Strict);
        assert_eq!(cfg.crawl.max_pages, 10);
        assert_eq!(cfg.cache.ttl_secs, 5);
        assert_eq!(cfg.cache.path, "senscritique_reviews.json");
    }
}
