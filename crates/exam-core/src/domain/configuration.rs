//! Configuration - 構成宣言
//!
//! 1 つの宣言が 1 つの実行環境に対応します。宣言が N 個あるテストクラスは
//! N 回 stage されます。

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::errors::ExamError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    pub name: String,

    /// Opaque to the core; interpreted by the provisioning collaborator.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,

    /// Bound into every address staged under this configuration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<serde_json::Value>,
}

impl Configuration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: BTreeMap::new(),
            arguments: Vec::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn with_argument(mut self, value: serde_json::Value) -> Self {
        self.arguments.push(value);
        self
    }

    pub fn option(&self, key: &str) -> Option<&serde_json::Value> {
        self.options.get(key)
    }

    /// Arguments bound at staging time: the declared ones, or the name.
    pub fn bound_arguments(&self) -> Vec<serde_json::Value> {
        if self.arguments.is_empty() {
            vec![serde_json::Value::String(self.name.clone())]
        } else {
            self.arguments.clone()
        }
    }

    pub fn validate(&self) -> Result<(), ExamError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ExamError::Configuration(
                "configuration name must not be empty".to_string(),
            ));
        }
        if self.name.chars().any(|c| c.is_control() || matches!(c, '[' | ']')) {
            return Err(ExamError::Configuration(format!(
                "configuration name {:?} contains reserved characters",
                self.name
            )));
        }
        Ok(())
    }
}

/// How environments are provisioned and whether invocations may overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StagingStrategy {
    /// One environment after the other; invocations are serialized.
    #[default]
    Sequential,

    /// Up to `max_parallel` environments provisioned at once; environments are
    /// treated as reentrant.
    Pooled { max_parallel: usize },
}

/// Validate a complete set of declarations for one class.
///
/// Fails when the set is empty, when any declaration is malformed, or when
/// two declarations share a name.
pub fn validate_declarations(configurations: &[Configuration]) -> Result<(), ExamError> {
    if configurations.is_empty() {
        return Err(ExamError::Configuration(
            "no configuration declared".to_string(),
        ));
    }
    let mut names = HashSet::new();
    for configuration in configurations {
        configuration.validate()?;
        if !names.insert(configuration.name.as_str()) {
            return Err(ExamError::Configuration(format!(
                "configuration {:?} declared twice",
                configuration.name
            )));
        }
    }
    Ok(())
}
