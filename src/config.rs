// ⚙️ Configuration - TOML settings for audit, transform, server and logging
// Resolution order:
// 1. Explicit path (CLI `--config`)
// 2. `LEGACY_AUDIT_CONFIG` environment variable
// 3. Built-in defaults
// Keys missing from a file fall back to their defaults.

use crate::error::ConfigError;
use crate::records::EntryStatus;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming a TOML config file
pub const CONFIG_ENV_VAR: &str = "LEGACY_AUDIT_CONFIG";

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub audit: AuditSettings,
    pub transform: TransformSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

/// Thresholds used by the audit rule engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    /// Incomes strictly above this are flagged
    pub income_ceiling: f64,

    /// Age from which a taxpayer counts as an adult
    pub adult_age: i32,
}

impl Default for AuditSettings {
    fn default() -> Self {
        AuditSettings {
            income_ceiling: 1_000_000.0,
            adult_age: 18,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformSettings {
    /// Status given to modern records when the legacy entry carries none
    pub default_status: EntryStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: "info".to_string(),
        }
    }
}

// ============================================================================
// LOADING
// ============================================================================

impl Settings {
    /// Resolve settings from an explicit path, the environment, or defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match resolve_config_path(explicit) {
            Some(path) => Settings::from_file(&path),
            None => Ok(Settings::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let settings: Settings = toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.display().to_string(),
            source,
        })?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.audit.income_ceiling.is_finite() || self.audit.income_ceiling < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "audit.income_ceiling must be a non-negative number, got {}",
                self.audit.income_ceiling
            )));
        }
        if self.audit.adult_age <= 0 {
            return Err(ConfigError::Invalid(format!(
                "audit.adult_age must be positive, got {}",
                self.audit.adult_age
            )));
        }
        Ok(())
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    std::env::var_os(CONFIG_ENV_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.audit.income_ceiling, 1_000_000.0);
        assert_eq!(settings.audit.adult_age, 18);
        assert_eq!(settings.transform.default_status, EntryStatus::Pending);
        assert_eq!(settings.server.bind_address(), "0.0.0.0:3000");
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config(
            r#"
[audit]
income_ceiling = 500000.0

[transform]
default_status = "Ativo"
"#,
        );

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.audit.income_ceiling, 500_000.0);
        assert_eq!(settings.audit.adult_age, 18);
        assert_eq!(settings.transform.default_status, EntryStatus::Active);
        assert_eq!(settings.server.port, 3000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = write_config("[audit]\nadult_age = 0\n");
        assert!(matches!(
            Settings::from_file(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let file = write_config("[audit\nincome_ceiling = ");
        assert!(matches!(
            Settings::from_file(file.path()),
            Err(ConfigError::Toml { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = Settings::load(Some(Path::new("/no/such/legacy-audit.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
