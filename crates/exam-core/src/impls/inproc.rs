//! InProcessProvisioner - runs test bodies on the current runtime.
//!
//! Stands in for a real container collaborator during development and tests.
//! Every environment is a bookkeeping entry; dispatch looks the body up in a
//! `TestCatalog` keyed by (declaring unit, operation).
//!
//! Recognized configuration options:
//! - `fail_provisioning = true`: `provision` fails for that configuration
//! - `provision_delay_ms = N`: `provision` sleeps before returning

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    BoxError, Configuration, DispatchError, EnvironmentId, InvocationError, OperationRef,
};
use crate::ports::{EnvironmentHandle, EnvironmentProvisioner, IdGenerator};

/// What a test body sees when it runs.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub configuration: Configuration,
    pub arguments: Vec<serde_json::Value>,
}

#[async_trait]
pub trait TestBody: Send + Sync {
    async fn run(&self, ctx: &InvocationContext) -> Result<(), BoxError>;
}

/// Adapter for synchronous closures.
pub struct FnBody<F>(pub F);

#[async_trait]
impl<F> TestBody for FnBody<F>
where
    F: Fn(&InvocationContext) -> Result<(), BoxError> + Send + Sync,
{
    async fn run(&self, ctx: &InvocationContext) -> Result<(), BoxError> {
        (self.0)(ctx)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("test body for {0}::{1} is already registered")]
    AlreadyRegistered(String, String),
}

/// Registry of test bodies.
///
/// Built during initialization (mutable), then shared read-only behind `Arc`.
#[derive(Default)]
pub struct TestCatalog {
    bodies: HashMap<(String, String), Arc<dyn TestBody>>,
}

impl TestCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        unit: impl Into<String>,
        operation: impl Into<String>,
        body: Arc<dyn TestBody>,
    ) -> Result<(), CatalogError> {
        let key = (unit.into(), operation.into());
        if self.bodies.contains_key(&key) {
            return Err(CatalogError::AlreadyRegistered(key.0, key.1));
        }
        self.bodies.insert(key, body);
        Ok(())
    }

    pub fn register_fn<F>(
        &mut self,
        unit: impl Into<String>,
        operation: impl Into<String>,
        body: F,
    ) -> Result<(), CatalogError>
    where
        F: Fn(&InvocationContext) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register(unit, operation, Arc::new(FnBody(body)))
    }

    pub fn get(&self, unit: &str, operation: &str) -> Option<Arc<dyn TestBody>> {
        self.bodies
            .get(&(unit.to_string(), operation.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

#[derive(Default)]
struct PoolState {
    live: HashMap<EnvironmentId, Configuration>,
    provisioned: usize,
    released: usize,
}

pub struct InProcessProvisioner {
    catalog: Arc<TestCatalog>,
    ids: Arc<dyn IdGenerator>,
    state: Mutex<PoolState>,
}

impl InProcessProvisioner {
    pub fn new(catalog: Arc<TestCatalog>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            catalog,
            ids,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Environments provisioned and not yet released.
    pub async fn outstanding(&self) -> usize {
        self.state.lock().await.live.len()
    }

    pub async fn provisioned_count(&self) -> usize {
        self.state.lock().await.provisioned
    }

    pub async fn released_count(&self) -> usize {
        self.state.lock().await.released
    }
}

#[async_trait]
impl EnvironmentProvisioner for InProcessProvisioner {
    async fn provision(&self, configuration: &Configuration) -> Result<EnvironmentHandle, BoxError> {
        if let Some(ms) = configuration
            .option("provision_delay_ms")
            .and_then(serde_json::Value::as_u64)
        {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if configuration.option("fail_provisioning") == Some(&serde_json::Value::Bool(true)) {
            return Err(format!("cannot provision configuration {}", configuration.name).into());
        }

        let id = self.ids.generate_environment_id();
        let mut state = self.state.lock().await;
        state.live.insert(id, configuration.clone());
        state.provisioned += 1;
        Ok(EnvironmentHandle::new(id, configuration.name.clone()))
    }

    async fn release(&self, handle: &EnvironmentHandle) -> Result<(), BoxError> {
        let mut state = self.state.lock().await;
        if state.live.remove(&handle.id()).is_none() {
            return Err(format!("environment {} is not live", handle.id()).into());
        }
        state.released += 1;
        Ok(())
    }

    async fn dispatch(
        &self,
        handle: &EnvironmentHandle,
        operation: &OperationRef,
    ) -> Result<(), DispatchError> {
        // Clone out so the lock is not held across the body.
        let configuration = {
            let state = self.state.lock().await;
            state.live.get(&handle.id()).cloned()
        };
        let Some(configuration) = configuration else {
            return Err(DispatchError::Container(format!(
                "environment {} is not live",
                handle.id()
            )));
        };
        let Some(body) = self.catalog.get(&operation.unit, &operation.operation) else {
            return Err(DispatchError::Container(format!(
                "no test body for {}::{}",
                operation.unit, operation.operation
            )));
        };

        let ctx = InvocationContext {
            configuration,
            arguments: operation.arguments.clone(),
        };
        body.run(&ctx).await.map_err(|err| {
            DispatchError::Failed(Box::new(InvocationError::new(
                format!("invoking {}::{}", operation.unit, operation.operation),
                err,
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::unwind;
    use crate::ports::{SystemClock, UlidGenerator};

    fn provisioner(catalog: TestCatalog) -> InProcessProvisioner {
        InProcessProvisioner::new(
            Arc::new(catalog),
            Arc::new(UlidGenerator::new(SystemClock)),
        )
    }

    #[test]
    fn catalog_rejects_double_registration() {
        let mut catalog = TestCatalog::new();
        catalog.register_fn("Calc", "adds", |_| Ok(())).unwrap();
        let err = catalog.register_fn("Calc", "adds", |_| Ok(())).unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyRegistered(_, _)));
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn provision_dispatch_release_roundtrip() {
        let mut catalog = TestCatalog::new();
        catalog
            .register_fn("Calc", "adds", |ctx| {
                if ctx.configuration.name == "native" {
                    Ok(())
                } else {
                    Err("wrong environment".into())
                }
            })
            .unwrap();
        let provisioner = provisioner(catalog);

        let handle = provisioner.provision(&Configuration::new("native")).await.unwrap();
        assert_eq!(handle.configuration(), "native");
        assert_eq!(provisioner.outstanding().await, 1);

        provisioner
            .dispatch(&handle, &OperationRef::new("Calc", "adds"))
            .await
            .unwrap();

        provisioner.release(&handle).await.unwrap();
        assert_eq!(provisioner.outstanding().await, 0);
        assert!(provisioner.release(&handle).await.is_err());
        assert_eq!(provisioner.released_count().await, 1);
    }

    #[tokio::test]
    async fn body_failure_is_wrapped_once() {
        let mut catalog = TestCatalog::new();
        catalog
            .register_fn("Calc", "fails", |_| Err("expected 2".into()))
            .unwrap();
        let provisioner = provisioner(catalog);
        let handle = provisioner.provision(&Configuration::new("native")).await.unwrap();

        let err = provisioner
            .dispatch(&handle, &OperationRef::new("Calc", "fails"))
            .await
            .unwrap_err();
        let DispatchError::Failed(wrapped) = err else {
            panic!("expected a body failure");
        };
        assert!(wrapped.downcast_ref::<InvocationError>().is_some());
        assert_eq!(unwind(wrapped).to_string(), "expected 2");
    }

    #[tokio::test]
    async fn missing_body_is_a_container_error() {
        let provisioner = provisioner(TestCatalog::new());
        let handle = provisioner.provision(&Configuration::new("native")).await.unwrap();
        let err = provisioner
            .dispatch(&handle, &OperationRef::new("Calc", "ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Container(_)));
    }

    #[tokio::test]
    async fn configured_provisioning_failure() {
        let provisioner = provisioner(TestCatalog::new());
        let broken = Configuration::new("broken")
            .with_option("fail_provisioning", serde_json::Value::Bool(true));
        assert!(provisioner.provision(&broken).await.is_err());
        assert_eq!(provisioner.provisioned_count().await, 0);
    }
}
