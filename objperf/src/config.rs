//! Configuration for the benchmarks.
//!
//! Configuration is loaded once at startup and passed to the benchmark drivers by reference. It is
//! merged from the following sources (highest precedence first):
//!
//! 1. Environment variables (prefixed with `MINIO_`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `MINIO_` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `MINIO_ENDPOINT=localhost:9000` sets the storage endpoint
//! - `MINIO_ACCESS_KEY=minioadmin` sets the access key
//! - `MINIO_PAYLOAD__TYPE=random` uploads generated data instead of reading a file
//!
//! # YAML Configuration File
//!
//! ```yaml
//! endpoint: localhost:9000
//! access_key: minioadmin
//! secret_key: minioadmin
//!
//! payload:
//!   type: file
//!   path: /data/bigfile
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use objperf_client::S3ClientConfig;
use secrecy::{CloneableSecret, ExposeSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "MINIO_";

/// Newtype around `String` that protects against accidental logging of secrets in the
/// configuration. Use with [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    /// Returns the secret as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Source of the data uploaded by write benchmarks.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PayloadConfig {
    /// Read the payload from a local file (type `"file"`).
    ///
    /// Every upload opens the file and reads the range `[0, size)` from it, so it must be at least
    /// as large as the biggest object size under test.
    ///
    /// # Default
    ///
    /// `bigfile` in the working directory.
    File {
        /// Path to the payload file.
        path: PathBuf,
    },

    /// Generate pseudo-random data from a seed (type `"random"`).
    ///
    /// This avoids preparing a large file, at the cost of some CPU time per upload.
    Random {
        /// Seed for the generator. Every upload produces the same bytes.
        #[serde(default)]
        seed: u64,
    },
}

impl Default for PayloadConfig {
    fn default() -> Self {
        PayloadConfig::File {
            path: PathBuf::from("bigfile"),
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty printing with colors when writing to a terminal, simplified otherwise.
    Auto,
    /// Pretty printing with colors.
    Pretty,
    /// Simplified plain text output.
    Simplified,
    /// JSON lines.
    Json,
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr so they never mix with the benchmark results on stdout.
#[derive(Debug, Deserialize, Serialize)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable overrides this if set.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `MINIO_LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    ///
    /// # Default
    ///
    /// `Auto`
    ///
    /// # Environment Variable
    ///
    /// `MINIO_LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for the benchmarks.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Host and port of the S3-compatible service.
    ///
    /// Without a scheme, requests are sent over plain HTTP.
    ///
    /// # Default
    ///
    /// `localhost:9000`
    ///
    /// # Environment Variable
    ///
    /// `MINIO_ENDPOINT`
    pub endpoint: String,

    /// Access key used to sign requests.
    ///
    /// # Environment Variable
    ///
    /// `MINIO_ACCESS_KEY`
    pub access_key: Option<String>,

    /// Secret key used to sign requests. Redacted in logs.
    ///
    /// # Environment Variable
    ///
    /// `MINIO_SECRET_KEY`
    pub secret_key: Option<SecretBox<ConfigSecret>>,

    /// Region sent with signed requests.
    ///
    /// # Default
    ///
    /// `us-east-1`
    pub region: String,

    /// Bucket all benchmark objects are written to. Created if missing.
    ///
    /// **Note**: write benchmarks remove *all* objects from this bucket before each object size.
    ///
    /// # Default
    ///
    /// `testbucket`
    pub bucket: String,

    /// Prefix of all object keys written or read by the benchmarks.
    ///
    /// # Default
    ///
    /// `testobject`
    pub object_prefix: String,

    /// Source of the data uploaded by write benchmarks.
    pub payload: PayloadConfig,

    /// Timeout for each individual request.
    ///
    /// # Default
    ///
    /// `None` (no timeout)
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,

    /// Number of concurrent requests while preparing the bucket.
    ///
    /// Applies to removing leftover objects before write benchmarks and to uploading objects with
    /// `--populate`. Measured runs use their own worker count.
    ///
    /// # Default
    ///
    /// `16`
    ///
    /// # Environment
    ///
    /// `MINIO_SETUP_CONCURRENCY`
    pub setup_concurrency: usize,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "localhost:9000".into(),
            access_key: None,
            secret_key: None,
            region: "us-east-1".into(),
            bucket: "testbucket".into(),
            object_prefix: "testobject".into(),
            payload: PayloadConfig::default(),
            request_timeout: None,
            setup_concurrency: 16,
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the optional YAML file and the environment.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided)
    /// 3. Environment variables (prefixed with `MINIO_`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Returns the connection parameters for the storage client.
    pub fn client_config(&self) -> S3ClientConfig {
        S3ClientConfig {
            endpoint: self.endpoint.clone(),
            region: self.region.clone(),
            access_key: self.access_key.clone(),
            secret_key: self
                .secret_key
                .as_ref()
                .map(|secret| secret.expose_secret().as_str().to_owned()),
            request_timeout: self.request_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(config.endpoint, "localhost:9000");
            assert_eq!(config.bucket, "testbucket");
            assert_eq!(config.object_prefix, "testobject");
            assert_eq!(config.payload, PayloadConfig::default());
            assert!(config.secret_key.is_none());
            assert_eq!(config.logging.level, LevelFilter::INFO);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("MINIO_ENDPOINT", "minio:9000");
            jail.set_env("MINIO_ACCESS_KEY", "access");
            jail.set_env("MINIO_SECRET_KEY", "secret");
            jail.set_env("MINIO_PAYLOAD__TYPE", "random");
            jail.set_env("MINIO_PAYLOAD__SEED", "42");
            jail.set_env("MINIO_REQUEST_TIMEOUT", "30s");
            jail.set_env("MINIO_LOGGING__LEVEL", "debug");
            jail.set_env("MINIO_SETUP_CONCURRENCY", "4");

            let config = Config::load(None).unwrap();

            assert_eq!(config.endpoint, "minio:9000");
            assert_eq!(config.access_key.as_deref(), Some("access"));
            assert_eq!(
                config.secret_key.as_ref().unwrap().expose_secret().as_str(),
                "secret"
            );
            assert_eq!(config.payload, PayloadConfig::Random { seed: 42 });
            assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
            assert_eq!(config.logging.level, LevelFilter::DEBUG);
            assert_eq!(config.setup_concurrency, 4);

            let client = config.client_config();
            assert_eq!(client.secret_key.as_deref(), Some("secret"));

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
                endpoint: storage.local:9000
                bucket: perfbucket
                payload:
                    type: file
                    path: /data/payload.bin
                logging:
                    level: warn
                    format: json
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("MINIO_BUCKET", "overridden");

            let config = Config::load(Some(tempfile.path())).unwrap();

            assert_eq!(config.endpoint, "storage.local:9000");
            assert_eq!(config.bucket, "overridden");
            assert_eq!(
                config.payload,
                PayloadConfig::File {
                    path: PathBuf::from("/data/payload.bin")
                }
            );
            assert_eq!(config.logging.level, LevelFilter::WARN);
            assert_eq!(config.logging.format, LogFormat::Json);

            Ok(())
        });
    }

    #[test]
    fn secret_is_redacted() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("MINIO_SECRET_KEY", "hunter2");

            let config = Config::load(None).unwrap();
            assert!(!format!("{config:?}").contains("hunter2"));

            Ok(())
        });
    }
}
