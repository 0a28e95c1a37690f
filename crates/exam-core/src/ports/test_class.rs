//! TestClass port - what a host discovery layer hands to the engine.

use crate::domain::{
    BoxError, Configuration, DeclaredOperation, ExamError, ProbeBuilder, StagingStrategy,
};

/// A declared test class: its operations, its configuration declarations and
/// its optional hooks. The implementing value is the class instance.
pub trait TestClass: Send + Sync {
    fn name(&self) -> &str;

    fn operations(&self) -> Vec<DeclaredOperation>;

    /// Configuration declarations. One staged environment per entry.
    fn configurations(&self) -> Vec<Configuration> {
        Vec::new()
    }

    /// Probe customization hook, applied before any operation is registered.
    ///
    /// May add entries to the builder and to `operations`, never remove.
    fn customize_probe(
        &self,
        _builder: &mut ProbeBuilder,
        _operations: &mut DeclaredOperations,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    /// Class-level staging override.
    fn staging(&self) -> Option<StagingStrategy> {
        None
    }
}

/// Append-only list of declared operations handed to `customize_probe`.
#[derive(Debug, Clone, Default)]
pub struct DeclaredOperations {
    inner: Vec<DeclaredOperation>,
}

impl DeclaredOperations {
    pub fn new(inner: Vec<DeclaredOperation>) -> Self {
        Self { inner }
    }

    pub fn push(&mut self, operation: DeclaredOperation) {
        self.inner.push(operation);
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeclaredOperation> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn into_vec(self) -> Vec<DeclaredOperation> {
        self.inner
    }
}

/// Where configuration declarations come from for one run.
pub trait ConfigurationSource: Send + Sync {
    fn configurations(&self, class: &dyn TestClass) -> Result<Vec<Configuration>, ExamError>;
}

/// Reads the class's own declarations.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclaredConfigurations;

impl ConfigurationSource for DeclaredConfigurations {
    fn configurations(&self, class: &dyn TestClass) -> Result<Vec<Configuration>, ExamError> {
        Ok(class.configurations())
    }
}
