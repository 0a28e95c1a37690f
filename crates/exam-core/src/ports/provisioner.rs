//! EnvironmentProvisioner port - the collaborator that turns a configuration
//! into a live execution environment and runs operations inside it.
//!
//! The core retries nothing through this port. Retry policy, if any, belongs
//! to the implementation.

use async_trait::async_trait;

use crate::domain::{BoxError, Configuration, DispatchError, EnvironmentId, OperationRef};

/// Opaque reference to one provisioned environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvironmentHandle {
    id: EnvironmentId,
    configuration: String,
}

impl EnvironmentHandle {
    pub fn new(id: EnvironmentId, configuration: impl Into<String>) -> Self {
        Self {
            id,
            configuration: configuration.into(),
        }
    }

    pub fn id(&self) -> EnvironmentId {
        self.id
    }

    pub fn configuration(&self) -> &str {
        &self.configuration
    }
}

#[async_trait]
pub trait EnvironmentProvisioner: Send + Sync {
    async fn provision(&self, configuration: &Configuration) -> Result<EnvironmentHandle, BoxError>;

    async fn release(&self, handle: &EnvironmentHandle) -> Result<(), BoxError>;

    /// Run one operation and wait for its result.
    async fn dispatch(
        &self,
        handle: &EnvironmentHandle,
        operation: &OperationRef,
    ) -> Result<(), DispatchError>;
}
