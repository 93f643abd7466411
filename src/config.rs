// ⚙️ Configuration
//
// Built once at start-up and passed by reference to whatever needs it.
// Sources, later ones winning: built-in defaults, optional TOML file,
// MONEY_LEDGER__<SECTION>__<KEY> environment variables.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "MONEY_LEDGER";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Tesseract executable
    pub ocr_command: String,
    pub ocr_language: String,
    /// Receipt OCR has been seen to need minutes on large photos
    pub ocr_timeout_secs: u64,
    pub document_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database: DatabaseConfig {
                path: PathBuf::from("money.db"),
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3001,
                cors_origins: vec!["http://localhost:5173".to_string()],
            },
            ingest: IngestConfig {
                ocr_command: "tesseract".to_string(),
                ocr_language: "eng".to_string(),
                ocr_timeout_secs: 300,
                document_timeout_secs: 120,
                max_upload_bytes: 20 * 1024 * 1024,
            },
        }
    }
}

impl AppConfig {
    /// Load defaults, then `path` (if given, it must exist), then env overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        if let Some(path) = path {
            let path = path
                .to_str()
                .ok_or_else(|| ConfigError::Message(format!("Config path is not UTF-8: {:?}", path)))?;
            builder = builder.add_source(File::new(path, FileFormat::Toml).required(true));
        }

        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl IngestConfig {
    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_secs)
    }

    pub fn document_timeout(&self) -> Duration {
        Duration::from_secs(self.document_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.ingest.ocr_timeout(), Duration::from_secs(300));
        assert_eq!(config.ingest.ocr_command, "tesseract");
        assert!(config.server.port > 0);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[database]
path = "/var/lib/money/ledger.db"

[server]
host = "0.0.0.0"
port = 8080
cors_origins = ["https://ledger.example"]

[ingest]
ocr_timeout_secs = 30
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/var/lib/money/ledger.db"));
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.server.cors_origins, vec!["https://ledger.example"]);
        assert_eq!(config.ingest.ocr_timeout_secs, 30);
        // Untouched keys keep their defaults
        assert_eq!(config.ingest.ocr_language, "eng");
        assert_eq!(config.ingest.document_timeout_secs, 120);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::load(Some(Path::new("/nonexistent/money-ledger.toml"))).is_err());
    }
}
