use serde::Deserialize;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_URL: &str = "http://127.0.0.1:7350";
pub const DEFAULT_SERVER_KEY: &str = "xoxo-go_server";
pub const DEFAULT_DURATION: &str = "10m";
pub const DEFAULT_USER_ID: &str = "d2bb1a95-5f68-4903-b8ba-77eeebed363e";
pub const DEFAULT_USERNAME: &str = "username";

/// Immutable inputs for one run, resolved once at startup.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Server base URL.
    pub url: String,
    /// Server key used for client-level auth.
    pub server_key: String,
    /// Idle duration before voluntary exit.
    pub duration: Duration,
    /// Device/user identifier sent on authentication.
    pub user_id: String,
    /// Display name sent on authentication.
    pub username: String,
}

/// Values given explicitly on the command line. Flags win over the
/// config file; built-in defaults fill whatever remains.
#[derive(Debug, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub key: Option<String>,
    pub duration: Option<String>,
    pub id: Option<String>,
    pub username: Option<String>,
}

/// Optional on-disk configuration (client.toml). Every field is optional;
/// a missing file resolves to defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClientFile {
    url: Option<String>,
    key: Option<String>,
    duration: Option<String>,
    id: Option<String>,
    username: Option<String>,
}

/// Errors produced while resolving the run configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse the config file as TOML.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// A duration value did not parse.
    BadDuration { value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config file {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config file {}: {}", path.display(), source)
            }
            ConfigError::BadDuration { value } => {
                write!(
                    f,
                    "invalid duration {value:?} (expected forms like \"10m\", \"90s\", \"1h30m\")"
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::BadDuration { .. } => None,
        }
    }
}

/// Resolve the run configuration: config file < CLI flags < built-in defaults.
pub fn resolve(path: &Path, overrides: Overrides) -> Result<RunConfig, ConfigError> {
    let file = load_file(path)?;

    let duration_text = overrides
        .duration
        .or(file.duration)
        .unwrap_or_else(|| DEFAULT_DURATION.to_string());
    let duration = parse_duration(&duration_text)?;

    Ok(RunConfig {
        url: overrides
            .url
            .or(file.url)
            .unwrap_or_else(|| DEFAULT_URL.to_string()),
        server_key: overrides
            .key
            .or(file.key)
            .unwrap_or_else(|| DEFAULT_SERVER_KEY.to_string()),
        duration,
        user_id: overrides
            .id
            .or(file.id)
            .unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
        username: overrides
            .username
            .or(file.username)
            .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
    })
}

fn load_file(path: &Path) -> Result<ClientFile, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using flags and defaults");
        return Ok(ClientFile::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Parse a Go-style duration string: one or more `<integer><unit>` terms
/// where unit is `ms`, `s`, `m`, or `h` (e.g. "10m", "90s", "1h30m").
/// A unit is required; bare numbers are rejected.
pub fn parse_duration(text: &str) -> Result<Duration, ConfigError> {
    let bad = || ConfigError::BadDuration {
        value: text.to_string(),
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(bad());
    }

    let mut total = Duration::ZERO;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let digits_end = rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(bad)?;
        if digits_end == 0 {
            return Err(bad());
        }
        let (digits, tail) = rest.split_at(digits_end);
        let value: u64 = digits.parse().map_err(|_| bad())?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);
        total += match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.saturating_mul(60)),
            "h" => Duration::from_secs(value.saturating_mul(3600)),
            _ => return Err(bad()),
        };
        rest = next;
    }
    Ok(total)
}
