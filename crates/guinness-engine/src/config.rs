use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::GenerationError;

pub const API_KEY_NAME: &str = "OPENROUTER_API_KEY";
pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash-image-preview";
pub const DEFAULT_SECRETS_PATH: &str = ".guinness/secrets.toml";

pub const SETUP_INSTRUCTIONS: &str = "\
To configure your API key:

Secrets file:
  1. Create `.guinness/secrets.toml` (or point --secrets / GUINNESS_SECRETS_PATH at one)
  2. Add: OPENROUTER_API_KEY = \"your-api-key-here\"

Or use an environment variable:
  export OPENROUTER_API_KEY=\"your-api-key-here\"
  guinness-selfie chat --out ./selfies

Get your API key from: https://openrouter.ai/keys";

/// One place an API key may live.
pub trait SecretSource: Send + Sync {
    fn name(&self) -> String;
    fn lookup(&self, key: &str) -> Option<String>;
}

/// TOML file with top-level `KEY = "value"` entries.
#[derive(Debug, Clone)]
pub struct SecretsFile {
    path: PathBuf,
}

impl SecretsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SecretSource for SecretsFile {
    fn name(&self) -> String {
        format!("secrets file {}", self.path.display())
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "secrets file unavailable");
                return None;
            }
        };
        let table = match toml::from_str::<toml::Table>(&raw) {
            Ok(table) => table,
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "secrets file is not valid TOML");
                return None;
            }
        };
        table
            .get(key)
            .and_then(toml::Value::as_str)
            .and_then(non_empty)
    }
}

/// Process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecrets;

impl SecretSource for EnvSecrets {
    fn name(&self) -> String {
        "environment".to_string()
    }

    fn lookup(&self, key: &str) -> Option<String> {
        non_empty_env(key)
    }
}

/// In-memory secrets, for hosts that inject configuration directly.
#[derive(Debug, Clone, Default)]
pub struct MapSecrets {
    label: String,
    values: BTreeMap<String, String>,
}

impl MapSecrets {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl SecretSource for MapSecrets {
    fn name(&self) -> String {
        self.label.clone()
    }

    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).and_then(|value| non_empty(value))
    }
}

#[derive(Clone)]
pub struct Credential {
    api_key: String,
    source: String,
}

impl Credential {
    pub fn new(api_key: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            source: source.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Which source provided the key.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Ordered secret sources; the first non-empty value wins.
pub struct CredentialLoader {
    sources: Vec<Box<dyn SecretSource>>,
}

impl CredentialLoader {
    pub fn new(sources: Vec<Box<dyn SecretSource>>) -> Self {
        Self { sources }
    }

    /// Secrets file first, then the environment.
    pub fn layered(secrets_path: impl Into<PathBuf>) -> Self {
        Self::new(vec![
            Box::new(SecretsFile::new(secrets_path)),
            Box::new(EnvSecrets),
        ])
    }

    pub fn load(&self) -> Result<Credential, GenerationError> {
        for source in &self.sources {
            if let Some(api_key) = source.lookup(API_KEY_NAME) {
                let name = source.name();
                debug!(source = %name, "API key resolved");
                return Ok(Credential::new(api_key, name));
            }
        }
        Err(GenerationError::MissingCredential)
    }
}

/// Resolves the secrets path: explicit flag, then `GUINNESS_SECRETS_PATH`, then the default.
pub fn secrets_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| non_empty_env("GUINNESS_SECRETS_PATH").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SECRETS_PATH))
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub api_base: String,
    pub model: String,
    /// `None` keeps the HTTP transport default.
    pub request_timeout: Option<Duration>,
    /// `None` keeps every generation of the session.
    pub history_limit: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: None,
            history_limit: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let api_base = non_empty_env("OPENROUTER_API_BASE")
            .or_else(|| non_empty_env("OPENROUTER_BASE_URL"))
            .map(|raw| normalize_api_base(&raw))
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let request_timeout = non_empty_env("GUINNESS_REQUEST_TIMEOUT_S")
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64);
        let history_limit = non_empty_env("GUINNESS_HISTORY_LIMIT")
            .and_then(|raw| raw.parse::<usize>().ok())
            .filter(|limit| *limit > 0);
        Self {
            api_base,
            model: DEFAULT_MODEL.to_string(),
            request_timeout,
            history_limit,
        }
    }

    pub fn chat_completions_endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

pub fn normalize_api_base(raw: &str) -> String {
    let mut base = raw.trim().trim_end_matches('/').to_string();
    if let Ok(parsed) = reqwest::Url::parse(&base) {
        if parsed.path().trim().is_empty() || parsed.path() == "/" {
            base = format!("{base}/api/v1");
        }
    }
    base.trim_end_matches('/').to_string()
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| non_empty(&value))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{
        normalize_api_base, CredentialLoader, EngineConfig, MapSecrets, SecretSource,
        SecretsFile, API_KEY_NAME, DEFAULT_API_BASE,
    };
    use crate::error::GenerationError;

    #[test]
    fn secrets_file_wins_over_later_sources() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("secrets.toml");
        fs::write(&path, "OPENROUTER_API_KEY = \"  sk-file  \"\n")?;

        let loader = CredentialLoader::new(vec![
            Box::new(SecretsFile::new(&path)),
            Box::new(MapSecrets::new("environment").with(API_KEY_NAME, "sk-env")),
        ]);
        let credential = loader.load()?;
        assert_eq!(credential.api_key(), "sk-file");
        assert!(credential.source().starts_with("secrets file"));
        Ok(())
    }

    #[test]
    fn missing_or_broken_secrets_file_falls_through() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let broken = temp.path().join("broken.toml");
        fs::write(&broken, "OPENROUTER_API_KEY = ")?;

        for primary in [temp.path().join("absent.toml"), broken] {
            let loader = CredentialLoader::new(vec![
                Box::new(SecretsFile::new(&primary)),
                Box::new(MapSecrets::new("environment").with(API_KEY_NAME, "sk-env")),
            ]);
            let credential = loader.load()?;
            assert_eq!(credential.api_key(), "sk-env");
            assert_eq!(credential.source(), "environment");
        }
        Ok(())
    }

    #[test]
    fn blank_values_count_as_missing() {
        let loader = CredentialLoader::new(vec![
            Box::new(MapSecrets::new("store").with(API_KEY_NAME, "   ")),
            Box::new(MapSecrets::new("environment")),
        ]);
        assert!(matches!(
            loader.load(),
            Err(GenerationError::MissingCredential)
        ));
    }

    #[test]
    fn credential_debug_redacts_key() {
        let source = MapSecrets::new("store").with(API_KEY_NAME, "sk-secret");
        assert_eq!(source.lookup(API_KEY_NAME).as_deref(), Some("sk-secret"));
        let credential = CredentialLoader::new(vec![Box::new(source)])
            .load()
            .unwrap();
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn api_base_normalization_adds_api_path_for_bare_hosts() {
        assert_eq!(
            normalize_api_base("https://openrouter.ai"),
            "https://openrouter.ai/api/v1"
        );
        assert_eq!(
            normalize_api_base("https://proxy.local/api/v1/"),
            "https://proxy.local/api/v1"
        );
        assert_eq!(
            EngineConfig::default().chat_completions_endpoint(),
            format!("{DEFAULT_API_BASE}/chat/completions")
        );
    }
}
