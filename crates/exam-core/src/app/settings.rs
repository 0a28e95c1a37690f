//! Run settings (`exam.toml`).
//!
//! ```toml
//! [run]
//! staging = "pooled"
//! max_parallel = 4
//! invocation_timeout_ms = 30000
//!
//! [[configuration]]
//! name = "native"
//!
//! [[configuration]]
//! name = "felix"
//! arguments = ["felix-7"]
//! options = { framework = "felix" }
//! ```
//!
//! Configurations listed here replace the test class's own declarations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Configuration, ExamError, StagingStrategy};
use crate::ports::{ConfigurationSource, TestClass};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid settings: {0}")]
    Invalid(String),
}

impl From<SettingsError> for ExamError {
    fn from(err: SettingsError) -> Self {
        ExamError::Configuration(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingKind {
    #[default]
    Sequential,
    Pooled,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSettings {
    #[serde(default)]
    pub staging: StagingKind,

    /// Pooled staging only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExamSettings {
    #[serde(default)]
    pub run: RunSettings,

    #[serde(default, rename = "configuration", skip_serializing_if = "Vec::is_empty")]
    pub configurations: Vec<Configuration>,
}

impl ExamSettings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = toml::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(text).map_err(|source| SettingsError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        match (self.run.staging, self.run.max_parallel) {
            (StagingKind::Sequential, Some(_)) => Err(SettingsError::Invalid(
                "max_parallel only applies to pooled staging".to_string(),
            )),
            (StagingKind::Pooled, Some(0)) => Err(SettingsError::Invalid(
                "max_parallel must be at least 1".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn strategy(&self) -> StagingStrategy {
        match self.run.staging {
            StagingKind::Sequential => StagingStrategy::Sequential,
            StagingKind::Pooled => StagingStrategy::Pooled {
                max_parallel: self.run.max_parallel.unwrap_or(1),
            },
        }
    }

    pub fn invocation_timeout(&self) -> Option<Duration> {
        self.run.invocation_timeout_ms.map(Duration::from_millis)
    }
}

impl ConfigurationSource for ExamSettings {
    fn configurations(&self, class: &dyn TestClass) -> Result<Vec<Configuration>, ExamError> {
        if self.configurations.is_empty() {
            Ok(class.configurations())
        } else {
            Ok(self.configurations.clone())
        }
    }
}
