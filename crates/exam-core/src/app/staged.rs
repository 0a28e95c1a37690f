//! StagedReactor - 実行可能になった reactor
//!
//! configuration ごとに 1 つの環境と、確定済みの target 一覧を持ちます。
//! target は staging 時に一度だけ計算され、その後は変わりません。
//!
//! # 主要な操作
//! - `targets`: target 一覧（staging 順）
//! - `invoke`: 1 target を実行し、失敗は unwind して返す
//! - `tear_down`: 全環境を release（冪等）

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{DispatchError, ExamError, OperationRef, Probe, TestAddress};
use crate::ports::EnvironmentProvisioner;

use super::staging::{EnvironmentSlot, EnvironmentState};

#[derive(Debug, Clone)]
struct Target {
    environment: usize,
    operation: OperationRef,
}

pub struct StagedReactor {
    provisioner: Arc<dyn EnvironmentProvisioner>,
    environments: Vec<EnvironmentSlot>,
    order: Vec<TestAddress>,
    targets: HashMap<TestAddress, Target>,
    /// Present when invocations must not overlap.
    gate: Option<Mutex<()>>,
    invocation_timeout: Option<Duration>,
    torn_down: AtomicBool,
}

impl StagedReactor {
    pub(crate) fn new(
        provisioner: Arc<dyn EnvironmentProvisioner>,
        environments: Vec<EnvironmentSlot>,
        probes: &[Probe],
        reentrant: bool,
        invocation_timeout: Option<Duration>,
    ) -> Self {
        let mut order = Vec::new();
        let mut targets = HashMap::new();
        for (index, slot) in environments.iter().enumerate() {
            let bound = slot.configuration.bound_arguments();
            for entry in probes.iter().flat_map(Probe::entries) {
                let address = entry.address.decorate(&slot.configuration.name, bound.clone());
                order.push(address.clone());
                targets.insert(
                    address,
                    Target {
                        environment: index,
                        operation: entry.operation.clone(),
                    },
                );
            }
        }
        info!(
            environments = environments.len(),
            targets = order.len(),
            "reactor staged"
        );
        Self {
            provisioner,
            environments,
            order,
            targets,
            gate: (!reentrant).then(|| Mutex::new(())),
            invocation_timeout,
            torn_down: AtomicBool::new(false),
        }
    }

    /// Every runnable address, in staging order. Distinct by construction.
    pub fn targets(&self) -> &[TestAddress] {
        &self.order
    }

    pub fn is_reentrant(&self) -> bool {
        self.gate.is_none()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Name of the configuration `address` was staged under.
    pub fn configuration_of(&self, address: &TestAddress) -> Option<&str> {
        self.targets
            .get(address)
            .map(|t| self.environments[t.environment].configuration.name.as_str())
    }

    /// Run one target and wait for its result.
    ///
    /// A failing test body surfaces as `ExamError::TestFailure` holding the
    /// body's own error, with every plumbing layer stripped.
    pub async fn invoke(&self, address: &TestAddress) -> Result<(), ExamError> {
        if self.is_torn_down() {
            return Err(ExamError::IllegalState(format!(
                "cannot invoke {address}: reactor has been torn down"
            )));
        }
        let target = self
            .targets
            .get(address)
            .ok_or_else(|| ExamError::UnknownTarget(address.to_string()))?;
        let slot = &self.environments[target.environment];
        let handle = match &slot.state {
            EnvironmentState::Live(handle) => handle,
            EnvironmentState::Unavailable(reason) => {
                return Err(ExamError::EnvironmentUnavailable {
                    target: address.to_string(),
                    reason: reason.clone(),
                });
            }
        };

        let _serialized = match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        let root = address.root();
        debug!(
            address = %address,
            root = %root,
            arguments = ?address.arguments(),
            environment = %handle.id(),
            "invoke"
        );

        let dispatch = self.provisioner.dispatch(handle, &target.operation);
        let result = match self.invocation_timeout {
            Some(limit) => tokio::time::timeout(limit, dispatch)
                .await
                .map_err(|_| ExamError::Timeout {
                    target: address.to_string(),
                    limit,
                })?,
            None => dispatch.await,
        };

        result.map_err(|err| match err {
            DispatchError::Failed(cause) => ExamError::test_failure(cause),
            DispatchError::Container(message) => {
                ExamError::container_msg(format!("Problem invoking {address}: {message}"))
            }
        })
    }

    /// Release every provisioned environment.
    ///
    /// Idempotent: only the first call releases anything. Safe after partial
    /// staging and when nothing was invoked.
    pub async fn tear_down(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            debug!("reactor already torn down");
            return;
        }
        release_live(self.provisioner.as_ref(), &self.environments).await;
        info!("reactor torn down");
    }
}

impl fmt::Debug for StagedReactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let environments: Vec<&str> = self
            .environments
            .iter()
            .map(|slot| slot.configuration.name.as_str())
            .collect();
        f.debug_struct("StagedReactor")
            .field("environments", &environments)
            .field("targets", &self.order.len())
            .field("reentrant", &self.is_reentrant())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

impl Drop for StagedReactor {
    fn drop(&mut self) {
        if !self.is_torn_down() {
            let live = self
                .environments
                .iter()
                .filter(|slot| matches!(slot.state, EnvironmentState::Live(_)))
                .count();
            if live > 0 {
                warn!(live, "staged reactor dropped without teardown, environments leaked");
            }
        }
    }
}

/// Release the live environments among `slots`; failures are logged.
pub(crate) async fn release_live(
    provisioner: &dyn EnvironmentProvisioner,
    slots: &[EnvironmentSlot],
) {
    for slot in slots {
        if let EnvironmentState::Live(handle) = &slot.state {
            match provisioner.release(handle).await {
                Ok(()) => debug!(environment = %handle.id(), "environment released"),
                Err(err) => {
                    warn!(environment = %handle.id(), error = %err, "environment release failed")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Reactor;
    use crate::app::staging::tests::factory_with;
    use crate::domain::{Configuration, ErrorKind, ProbeBuilder, StagingStrategy};
    use crate::impls::{InProcessProvisioner, TestCatalog};
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, thiserror::Error)]
    #[error("balance mismatch: {0}")]
    struct BalanceMismatch(i64);

    fn catalog() -> TestCatalog {
        let mut catalog = TestCatalog::new();
        catalog.register_fn("Bank", "deposits", |_| Ok(())).unwrap();
        catalog
            .register_fn("Bank", "withdraws", |_| Err(BalanceMismatch(-5).into()))
            .unwrap();
        catalog
    }

    async fn stage(
        catalog: TestCatalog,
        strategy: StagingStrategy,
        configurations: Vec<Configuration>,
    ) -> (StagedReactor, Arc<InProcessProvisioner>) {
        let (factory, provisioner) = factory_with(catalog, strategy);
        let mut builder = ProbeBuilder::new();
        builder.add_test("Bank", "deposits").unwrap();
        builder.add_test("Bank", "withdraws").unwrap();

        let mut reactor = Reactor::new();
        for configuration in configurations {
            reactor.add_configuration(configuration);
        }
        reactor.add_probe(builder.build().unwrap());
        (reactor.stage(&factory).await.unwrap(), provisioner)
    }

    fn find<'a>(staged: &'a StagedReactor, caption: &str) -> &'a TestAddress {
        staged.targets().iter().find(|a| a.caption() == caption).unwrap()
    }

    #[tokio::test]
    async fn targets_are_stable_and_decorated() {
        let (staged, _) = stage(
            catalog(),
            StagingStrategy::Sequential,
            vec![Configuration::new("native"), Configuration::new("felix")],
        )
        .await;

        let first: HashSet<_> = staged.targets().iter().cloned().collect();
        let second: HashSet<_> = staged.targets().iter().cloned().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);

        let address = find(&staged, "Bank.deposits[felix]");
        assert!(!address.is_root());
        assert_eq!(address.arguments(), &[serde_json::json!("felix")]);
        assert_eq!(staged.configuration_of(address), Some("felix"));
        staged.tear_down().await;
    }

    #[tokio::test]
    async fn debug_lists_environments_and_target_count() {
        let (staged, _) = stage(
            catalog(),
            StagingStrategy::Sequential,
            vec![Configuration::new("native"), Configuration::new("felix")],
        )
        .await;

        let rendered = format!("{staged:?}");
        assert!(rendered.contains(r#"environments: ["native", "felix"]"#));
        assert!(rendered.contains("targets: 4"));
        assert!(rendered.contains("torn_down: false"));
        staged.tear_down().await;
    }

    #[tokio::test]
    async fn invoke_unwinds_to_the_body_error() {
        let (staged, _) =
            stage(catalog(), StagingStrategy::Sequential, vec![Configuration::new("native")]).await;

        staged.invoke(find(&staged, "Bank.deposits[native]")).await.unwrap();

        let err = staged
            .invoke(find(&staged, "Bank.withdraws[native]"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TestFailure);
        let cause = err.cause().unwrap().downcast_ref::<BalanceMismatch>().unwrap();
        assert_eq!(cause.0, -5);
        staged.tear_down().await;
    }

    #[tokio::test]
    async fn unknown_address_is_rejected() {
        let (staged, _) =
            stage(catalog(), StagingStrategy::Sequential, vec![Configuration::new("native")]).await;
        let err = staged.invoke(&TestAddress::new("Bank.deposits")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownTarget);
        staged.tear_down().await;
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let (staged, provisioner) = stage(
            catalog(),
            StagingStrategy::Sequential,
            vec![Configuration::new("a"), Configuration::new("b")],
        )
        .await;
        assert_eq!(provisioner.outstanding().await, 2);

        staged.tear_down().await;
        staged.tear_down().await;

        assert_eq!(provisioner.outstanding().await, 0);
        assert_eq!(provisioner.released_count().await, 2);

        let address = staged.targets()[0].clone();
        let err = staged.invoke(&address).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalState);
    }

    #[tokio::test]
    async fn unavailable_environment_fails_fast_for_its_targets_only() {
        let (staged, provisioner) = stage(
            catalog(),
            StagingStrategy::Pooled { max_parallel: 2 },
            vec![
                Configuration::new("up"),
                Configuration::new("down").with_option("fail_provisioning", serde_json::json!(true)),
            ],
        )
        .await;

        let err = staged.invoke(find(&staged, "Bank.deposits[down]")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EnvironmentUnavailable);
        staged.invoke(find(&staged, "Bank.deposits[up]")).await.unwrap();

        staged.tear_down().await;
        assert_eq!(provisioner.outstanding().await, 0);
        assert_eq!(provisioner.released_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_body_surfaces_as_timeout() {
        use crate::domain::BoxError;
        use crate::impls::{InvocationContext, TestBody};
        use async_trait::async_trait;

        struct Hangs;

        #[async_trait]
        impl TestBody for Hangs {
            async fn run(&self, _ctx: &InvocationContext) -> Result<(), BoxError> {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok(())
            }
        }

        let mut catalog = TestCatalog::new();
        catalog.register("Slow", "hangs", Arc::new(Hangs)).unwrap();
        let (factory, _) = factory_with(catalog, StagingStrategy::Sequential);
        let factory = factory.with_invocation_timeout(Some(Duration::from_secs(5)));

        let mut builder = ProbeBuilder::new();
        let address = builder.add_test("Slow", "hangs").unwrap();
        let mut reactor = Reactor::new();
        reactor.add_configuration(Configuration::new("native"));
        reactor.add_probe(builder.build().unwrap());
        let staged = reactor.stage(&factory).await.unwrap();

        let target = staged
            .targets()
            .iter()
            .find(|t| t.root() == address)
            .unwrap()
            .clone();
        let err = staged.invoke(&target).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        staged.tear_down().await;
    }

    #[tokio::test]
    async fn serialized_invocations_do_not_overlap() {
        use crate::domain::BoxError;
        use crate::impls::{InvocationContext, TestBody};
        use async_trait::async_trait;

        struct Tracks {
            running: AtomicUsize,
            peak: AtomicUsize,
        }

        #[async_trait]
        impl TestBody for Tracks {
            async fn run(&self, _ctx: &InvocationContext) -> Result<(), BoxError> {
                let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let body = Arc::new(Tracks {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let mut catalog = TestCatalog::new();
        catalog.register("Bank", "deposits", body.clone()).unwrap();
        catalog.register("Bank", "withdraws", body.clone()).unwrap();

        let (staged, _) =
            stage(catalog, StagingStrategy::Sequential, vec![Configuration::new("native")]).await;
        let staged = Arc::new(staged);

        let mut handles = Vec::new();
        for address in staged.targets().to_vec() {
            let staged = Arc::clone(&staged);
            handles.push(tokio::spawn(async move { staged.invoke(&address).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(body.peak.load(Ordering::SeqCst), 1);
        staged.tear_down().await;
    }
}
