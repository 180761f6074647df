use crate::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CONNECTION_RETRIES, DEFAULT_HOST, DEFAULT_LOCATION,
    DEFAULT_LOG_LEVEL, DEFAULT_NUM_CONNECTIONS, DEFAULT_PORT, DEFAULT_PROTOCOL,
};
use crate::credentials::Credentials;
use crate::error::QsError;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

const KEY_ACCESS_KEY_ID: &str = "access_key_id";
const KEY_SECRET_ACCESS_KEY: &str = "secret_access_key";
const KEY_HOST: &str = "host";
const KEY_LOCATION: &str = "location";
const KEY_PORT: &str = "port";
const KEY_PROTOCOL: &str = "protocol";
const KEY_CONNECTION_RETRIES: &str = "connection_retries";
const KEY_NUM_CONNECTIONS: &str = "num_connections";
const KEY_CHUNK_SIZE: &str = "chunk_size";
const KEY_LOG_LEVEL: &str = "log_level";

/// Client configuration.
///
/// Credentials are required; every other option has a default and invalid
/// values fall back to that default with a warning.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub credentials: Credentials,
    pub host: String,
    pub location: String,
    pub port: u16,
    pub protocol: String,
    pub connection_retries: u32,
    pub num_connections: u32,
    pub chunk_size: u64,
    pub log_level: String,
}

impl Configuration {
    /// Inline construction with default ambient options.
    pub fn new<S>(location: S, access_key_id: S, secret_access_key: S) -> Result<Self, QsError>
    where
        S: Into<String>,
    {
        let credentials = Credentials::new(access_key_id, secret_access_key);
        if !credentials.is_complete() {
            return Err(QsError::InvalidParameter(
                "access_key_id and secret_access_key must not be empty".into(),
            ));
        }
        let location = location.into();
        Ok(Self {
            credentials,
            host: DEFAULT_HOST.to_string(),
            location: if location.is_empty() {
                DEFAULT_LOCATION.to_string()
            } else {
                location
            },
            port: DEFAULT_PORT,
            protocol: DEFAULT_PROTOCOL.to_string(),
            connection_retries: DEFAULT_CONNECTION_RETRIES,
            num_connections: DEFAULT_NUM_CONNECTIONS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        })
    }

    /// Load from a YAML file: a top-level mapping of scalar values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, QsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                QsError::ConfigNotFound(path.display().to_string())
            } else {
                QsError::Io(err)
            }
        })?;

        let raw: BTreeMap<String, Value> = serde_yaml::from_str(&text)
            .map_err(|err| QsError::ConfigInvalid(format!("not a YAML mapping: {err}")))?;

        let access_key_id = scalar(&raw, KEY_ACCESS_KEY_ID)?
            .ok_or_else(|| QsError::ConfigInvalid("missing access_key_id".into()))?;
        let secret_access_key = scalar(&raw, KEY_SECRET_ACCESS_KEY)?
            .ok_or_else(|| QsError::ConfigInvalid("missing secret_access_key".into()))?;

        let config = Self {
            credentials: Credentials::new(access_key_id, secret_access_key),
            host: scalar(&raw, KEY_HOST)?.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            location: scalar(&raw, KEY_LOCATION)?.unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            port: parse_or_default(&raw, KEY_PORT, DEFAULT_PORT as u32, |port| {
                (1..=65535).contains(&port)
            })? as u16,
            protocol: scalar(&raw, KEY_PROTOCOL)?.unwrap_or_else(|| DEFAULT_PROTOCOL.to_string()),
            connection_retries: parse_or_default(
                &raw,
                KEY_CONNECTION_RETRIES,
                DEFAULT_CONNECTION_RETRIES,
                |retries| (1..=16).contains(&retries),
            )?,
            num_connections: parse_or_default(
                &raw,
                KEY_NUM_CONNECTIONS,
                DEFAULT_NUM_CONNECTIONS,
                |num| (1..=8).contains(&num),
            )?,
            chunk_size: parse_or_default(&raw, KEY_CHUNK_SIZE, DEFAULT_CHUNK_SIZE, |size| size > 0)?,
            log_level: scalar(&raw, KEY_LOG_LEVEL)?
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        };
        config.normalized()
    }

    /// Clamp out-of-range options back to their defaults (with a warning)
    /// and reject incomplete credentials.
    pub(crate) fn normalized(mut self) -> Result<Self, QsError> {
        if !self.credentials.is_complete() {
            return Err(QsError::ConfigInvalid(
                "access_key_id and secret_access_key must not be empty".into(),
            ));
        }
        if self.host.is_empty() {
            self.host = DEFAULT_HOST.to_string();
        }
        if self.location.is_empty() {
            self.location = DEFAULT_LOCATION.to_string();
        }
        if self.port == 0 {
            warn!("port 0 is invalid, using default {}", DEFAULT_PORT);
            self.port = DEFAULT_PORT;
        }
        if self.protocol != "https" && self.protocol != "http" {
            warn!(
                protocol = %self.protocol,
                "unsupported protocol, using default {}", DEFAULT_PROTOCOL
            );
            self.protocol = DEFAULT_PROTOCOL.to_string();
        }
        if !(1..=16).contains(&self.connection_retries) {
            warn!(
                connection_retries = self.connection_retries,
                "connection_retries out of range, using default {}", DEFAULT_CONNECTION_RETRIES
            );
            self.connection_retries = DEFAULT_CONNECTION_RETRIES;
        }
        if !(1..=8).contains(&self.num_connections) {
            warn!(
                num_connections = self.num_connections,
                "num_connections out of range, using default {}", DEFAULT_NUM_CONNECTIONS
            );
            self.num_connections = DEFAULT_NUM_CONNECTIONS;
        }
        if self.chunk_size == 0 {
            warn!("chunk_size 0 is invalid, using default {}", DEFAULT_CHUNK_SIZE);
            self.chunk_size = DEFAULT_CHUNK_SIZE;
        }
        if tracing::Level::from_str(&self.log_level).is_err() {
            warn!(
                log_level = %self.log_level,
                "unknown log_level, using default {}", DEFAULT_LOG_LEVEL
            );
            self.log_level = DEFAULT_LOG_LEVEL.to_string();
        }
        Ok(self)
    }

    /// The configured `log_level` as a tracing level. Installing a
    /// subscriber is the host program's business.
    pub fn tracing_level(&self) -> tracing::Level {
        tracing::Level::from_str(&self.log_level).unwrap_or(tracing::Level::DEBUG)
    }
}

/// A scalar option as text. Empty strings count as absent; non-scalar
/// values are a configuration error.
fn scalar(raw: &BTreeMap<String, Value>, key: &str) -> Result<Option<String>, QsError> {
    let text = match raw.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(_) => {
            return Err(QsError::ConfigInvalid(format!(
                "option {key} must be a scalar"
            )))
        }
    };
    Ok(if text.is_empty() { None } else { Some(text) })
}

fn parse_or_default<T>(
    raw: &BTreeMap<String, Value>,
    key: &str,
    default: T,
    valid: impl Fn(T) -> bool,
) -> Result<T, QsError>
where
    T: Copy + FromStr + std::fmt::Display,
{
    let Some(text) = scalar(raw, key)? else {
        return Ok(default);
    };
    match text.parse::<T>() {
        Ok(value) if valid(value) => Ok(value),
        _ => {
            warn!("configuration {key} \"{text}\" is invalid, using default {default}");
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_config(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("qs-config-{}-{name}", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn file_with_only_credentials_uses_defaults() {
        let path = write_config(
            "defaults.yaml",
            "access_key_id: AKID\nsecret_access_key: SECRET\n",
        );
        let config = Configuration::from_file(&path).unwrap();
        assert_eq!(config.host, "qingstor.com");
        assert_eq!(config.location, "pek3a");
        assert_eq!(config.port, 443);
        assert_eq!(config.protocol, "https");
        assert_eq!(config.connection_retries, 3);
        assert_eq!(config.num_connections, 3);
        assert_eq!(config.chunk_size, 32 * 1024 * 1024);
        assert_eq!(config.log_level, "debug");
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn out_of_range_options_fall_back() {
        let path = write_config(
            "fallback.yaml",
            "access_key_id: AKID\n\
             secret_access_key: SECRET\n\
             port: 0\n\
             connection_retries: 99\n\
             num_connections: 12\n\
             chunk_size: 0\n",
        );
        let config = Configuration::from_file(&path).unwrap();
        assert_eq!(config.port, 443);
        assert_eq!(config.connection_retries, 3);
        assert_eq!(config.num_connections, 3);
        assert_eq!(config.chunk_size, 32 * 1024 * 1024);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn explicit_options_are_honored() {
        let path = write_config(
            "explicit.yaml",
            "access_key_id: AKID\n\
             secret_access_key: SECRET\n\
             host: example.com\n\
             location: gd1\n\
             port: 8080\n\
             protocol: http\n\
             connection_retries: 5\n\
             num_connections: 8\n\
             chunk_size: 1048576\n\
             log_level: info\n",
        );
        let config = Configuration::from_file(&path).unwrap();
        assert_eq!(config.host, "example.com");
        assert_eq!(config.location, "gd1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.protocol, "http");
        assert_eq!(config.connection_retries, 5);
        assert_eq!(config.num_connections, 8);
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_credentials_are_fatal() {
        let path = write_config("no-secret.yaml", "access_key_id: AKID\n");
        let err = Configuration::from_file(&path).unwrap_err();
        assert!(matches!(err, QsError::ConfigInvalid(_)));
        std::fs::remove_file(path).unwrap();

        // empty scalars count as missing, unlike the optional fields
        let path = write_config(
            "empty-secret.yaml",
            "access_key_id: AKID\nsecret_access_key: \"\"\n",
        );
        let err = Configuration::from_file(&path).unwrap_err();
        assert!(matches!(err, QsError::ConfigInvalid(_)));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = Configuration::from_file("/nonexistent/qingstor.yaml").unwrap_err();
        assert!(matches!(err, QsError::ConfigNotFound(_)));
    }

    #[test]
    fn non_scalar_option_is_invalid() {
        let path = write_config(
            "non-scalar.yaml",
            "access_key_id: AKID\n\
             secret_access_key: SECRET\n\
             host:\n  - a\n  - b\n",
        );
        let err = Configuration::from_file(&path).unwrap_err();
        assert!(matches!(err, QsError::ConfigInvalid(_)));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn inline_construction_rejects_empty_credentials() {
        assert!(matches!(
            Configuration::new("pek3a", "", "SECRET").unwrap_err(),
            QsError::InvalidParameter(_)
        ));
        let config = Configuration::new("", "AKID", "SECRET").unwrap();
        assert_eq!(config.location, "pek3a");
    }
}
