//! ExamRunner - テストクラス 1 つを宣言から teardown まで駆動する
//!
//! - prepare: 宣言 → reactor → probe（delegation または add_test）→ stage →
//!   staged target を宣言済み operation に結び付ける
//! - run: prepare → 全 target を invoke → tear_down
//!
//! # Cleanup
//! - invoke はそれぞれ別 task で実行する。test body の panic は
//!   その target の `ERROR` outcome になり、run 自体は止まらない
//! - run の future が途中で drop されても、`TeardownGuard` が
//!   バックグラウンドで tear_down する

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::domain::{
    DeclaredOperation, DelegateFn, ExamError, OperationKind, OutcomeKind, ProbeBuilder, RunEvent,
    RunId, RunReport, TestAddress, TestOutcome,
};
use crate::ports::{
    Clock, ConfigurationSource, DeclaredOperations, EnvironmentProvisioner, IdGenerator,
    OutcomeSink, SystemClock, TestClass, UlidGenerator,
};

use super::directory::{InstantiationInstruction, TestDirectory};
use super::manager::ReactorManager;
use super::reactor::Reactor;
use super::settings::ExamSettings;
use super::staged::StagedReactor;

/// A staged address paired with the declared operation it came from.
///
/// Compared and hashed by address only.
#[derive(Clone)]
pub struct BoundTest {
    address: TestAddress,
    operation: DeclaredOperation,
    name: String,
}

impl BoundTest {
    pub fn address(&self) -> &TestAddress {
        &self.address
    }

    pub fn operation(&self) -> &DeclaredOperation {
        &self.operation
    }

    /// `<operation>:<address caption>`
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for BoundTest {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for BoundTest {}

impl Hash for BoundTest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Debug for BoundTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundTest")
            .field("name", &self.name)
            .field("address", &self.address.id())
            .finish()
    }
}

/// A class that has been staged and bound, ready to invoke.
pub struct StagedRun {
    run: RunId,
    staged: Arc<StagedReactor>,
    operations: HashMap<TestAddress, DeclaredOperation>,
    children: Vec<BoundTest>,
    directory: Arc<TestDirectory>,
    cleaned_up: AtomicBool,
}

impl StagedRun {
    fn bind(
        run: RunId,
        staged: Arc<StagedReactor>,
        operations: HashMap<TestAddress, DeclaredOperation>,
        directory: Arc<TestDirectory>,
    ) -> Result<Self, ExamError> {
        let mut children = Vec::with_capacity(staged.targets().len());
        for address in staged.targets() {
            let operation = operations.get(&address.root()).ok_or_else(|| {
                ExamError::container_msg(format!(
                    "staged target {address} has no declared operation"
                ))
            })?;
            directory.register(
                run,
                address.clone(),
                InstantiationInstruction::for_operation(operation),
            );
            children.push(BoundTest {
                address: address.clone(),
                operation: operation.clone(),
                name: format!("{}:{}", operation.name(), address.caption()),
            });
        }
        Ok(Self {
            run,
            staged,
            operations,
            children,
            directory,
            cleaned_up: AtomicBool::new(false),
        })
    }

    pub fn run_id(&self) -> RunId {
        self.run
    }

    pub fn staged(&self) -> &Arc<StagedReactor> {
        &self.staged
    }

    /// Every runnable child, in staging order.
    pub fn children(&self) -> &[BoundTest] {
        &self.children
    }

    /// Declared operation a staged (or root) address was derived from.
    pub fn operation_of(&self, address: &TestAddress) -> Option<&DeclaredOperation> {
        self.operations.get(&address.root())
    }

    /// Staged addresses derived from one declared operation.
    pub fn addresses_of(&self, operation: &DeclaredOperation) -> Vec<TestAddress> {
        self.children
            .iter()
            .filter(|child| &child.operation == operation)
            .map(|child| child.address.clone())
            .collect()
    }

    pub async fn invoke(&self, child: &BoundTest) -> Result<(), ExamError> {
        self.staged.invoke(&child.address).await
    }

    /// Release every environment and clear the directory. Only the first call
    /// does anything.
    pub async fn tear_down(&self) {
        if self.cleaned_up.swap(true, Ordering::AcqRel) {
            return;
        }
        self.staged.tear_down().await;
        self.directory.clear_run(self.run);
    }

    pub fn is_torn_down(&self) -> bool {
        self.cleaned_up.load(Ordering::Acquire)
    }
}

/// Tears a run down if the future driving it is dropped first.
struct TeardownGuard {
    prepared: Option<Arc<StagedRun>>,
}

impl TeardownGuard {
    fn new(prepared: Arc<StagedRun>) -> Self {
        Self {
            prepared: Some(prepared),
        }
    }

    async fn finish(mut self) {
        if let Some(prepared) = self.prepared.take() {
            prepared.tear_down().await;
        }
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        let Some(prepared) = self.prepared.take() else {
            return;
        };
        if prepared.is_torn_down() {
            return;
        }
        let run = prepared.run_id();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(%run, "run interrupted, tearing down in the background");
                handle.spawn(async move { prepared.tear_down().await });
            }
            Err(_) => {
                prepared.directory.clear_run(run);
                warn!(%run, "run interrupted outside a runtime, environments not released");
            }
        }
    }
}

pub struct ExamRunner {
    manager: ReactorManager,
    directory: Arc<TestDirectory>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl ExamRunner {
    pub fn new(provisioner: Arc<dyn EnvironmentProvisioner>, settings: ExamSettings) -> Self {
        Self {
            manager: ReactorManager::new(provisioner, settings),
            directory: Arc::new(TestDirectory::new()),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn manager(&self) -> &ReactorManager {
        &self.manager
    }

    pub fn directory(&self) -> &Arc<TestDirectory> {
        &self.directory
    }

    /// Stage `class` and bind its targets. The caller owns teardown of the
    /// returned run; on error nothing is left provisioned.
    pub async fn prepare(
        &self,
        class: &dyn TestClass,
        source: &dyn ConfigurationSource,
    ) -> Result<StagedRun, ExamError> {
        let mut declared = DeclaredOperations::new(class.operations());
        self.prepare_as(self.ids.generate_run_id(), class, source, &mut declared)
            .await
    }

    /// `declared` ends up holding every operation known when preparation
    /// stopped, including the ones the customization hook added.
    async fn prepare_as(
        &self,
        run: RunId,
        class: &dyn TestClass,
        source: &dyn ConfigurationSource,
        declared: &mut DeclaredOperations,
    ) -> Result<StagedRun, ExamError> {
        let mut reactor = self.manager.prepare_reactor(class, source)?;
        let operations = self.add_tests_to_reactor(&mut reactor, class, declared)?;
        let factory = self.manager.get_factory(class);
        let staged = Arc::new(reactor.stage(&factory).await?);

        match StagedRun::bind(run, Arc::clone(&staged), operations, Arc::clone(&self.directory)) {
            Ok(prepared) => Ok(prepared),
            Err(err) => {
                staged.tear_down().await;
                self.directory.clear_run(run);
                Err(err)
            }
        }
    }

    /// Build the single probe for `class` and record address -> operation.
    fn add_tests_to_reactor(
        &self,
        reactor: &mut Reactor,
        class: &dyn TestClass,
        declared: &mut DeclaredOperations,
    ) -> Result<HashMap<TestAddress, DeclaredOperation>, ExamError> {
        let builder = self.manager.create_probe(class)?;
        let mut builder = self
            .manager
            .overwrite_with_user_definition(class, builder, declared)?;

        let mut operations = HashMap::with_capacity(declared.len());
        for operation in declared.iter() {
            let address = match operation.kind() {
                OperationKind::Delegating(delegate) => delegate_test(delegate, &mut builder)?,
                OperationKind::Direct => builder.add_test(operation.unit(), operation.name())?,
            };
            if let Some(previous) = operations.insert(address.clone(), operation.clone()) {
                return Err(ExamError::IllegalState(format!(
                    "address {address} bound to both {previous} and {operation}"
                )));
            }
        }
        reactor.add_probe(builder.build()?);
        Ok(operations)
    }

    /// Prepare, invoke every target, tear down.
    ///
    /// Exactly one `Finished` is emitted per staged target. When preparation
    /// fails, exactly one `Aborted` is emitted per declared operation (hook
    /// additions included) and the error is returned.
    pub async fn run(
        &self,
        class: &dyn TestClass,
        source: &dyn ConfigurationSource,
        sink: Arc<dyn OutcomeSink>,
    ) -> Result<RunReport, ExamError> {
        let run = self.ids.generate_run_id();
        info!(%run, class = class.name(), "run starting");

        let mut declared = DeclaredOperations::new(class.operations());
        let prepared = match self.prepare_as(run, class, source, &mut declared).await {
            Ok(prepared) => Arc::new(prepared),
            Err(err) => {
                warn!(%run, class = class.name(), error = %err, "run aborted before invocation");
                for operation in declared.iter() {
                    sink.emit(RunEvent::Aborted {
                        run,
                        unit: operation.unit().to_string(),
                        operation: operation.name().to_string(),
                        reason: err.to_string(),
                    });
                }
                return Err(err);
            }
        };

        let guard = TeardownGuard::new(Arc::clone(&prepared));
        let report = self.execute(&prepared, &sink).await;
        guard.finish().await;
        info!(
            %run,
            passed = report.count(OutcomeKind::Success),
            failed = report.count(OutcomeKind::Failure),
            errors = report.count(OutcomeKind::Error),
            "run finished"
        );
        Ok(report)
    }

    async fn execute(&self, prepared: &StagedRun, sink: &Arc<dyn OutcomeSink>) -> RunReport {
        let children = prepared.children();
        let mut outcomes: Vec<Option<TestOutcome>> = vec![None; children.len()];

        // One task per invocation; non-reentrant runs join each before the next.
        let reentrant = prepared.staged().is_reentrant();
        let mut set = JoinSet::new();
        for (index, child) in children.iter().cloned().enumerate() {
            let staged = Arc::clone(prepared.staged());
            let clock = Arc::clone(&self.clock);
            let sink = Arc::clone(sink);
            let run = prepared.run_id();
            set.spawn(async move {
                let outcome =
                    invoke_child(run, &staged, &child, clock.as_ref(), sink.as_ref()).await;
                (index, outcome)
            });
            if !reentrant {
                drain(&mut set, &mut outcomes).await;
            }
        }
        drain(&mut set, &mut outcomes).await;

        let outcomes = outcomes
            .into_iter()
            .zip(children)
            .map(|(outcome, child)| match outcome {
                Some(outcome) => outcome,
                None => {
                    let outcome = TestOutcome {
                        address: child.address.id(),
                        target: child.name.clone(),
                        unit: child.operation.unit().to_string(),
                        operation: child.operation.name().to_string(),
                        kind: OutcomeKind::Error,
                        reason: Some("Problem interacting with reactor".to_string()),
                        started_at: self.clock.now(),
                        elapsed_ms: 0,
                    };
                    sink.emit(RunEvent::Finished(outcome.clone()));
                    outcome
                }
            })
            .collect();
        RunReport { outcomes }
    }
}

async fn drain(set: &mut JoinSet<(usize, TestOutcome)>, outcomes: &mut [Option<TestOutcome>]) {
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, outcome)) => outcomes[index] = Some(outcome),
            Err(err) => warn!(error = %err, "invocation task did not complete"),
        }
    }
}

/// Call a delegating operation with the in-progress builder. Its returned
/// address replaces the one `add_test` would have produced.
fn delegate_test(delegate: &DelegateFn, builder: &mut ProbeBuilder) -> Result<TestAddress, ExamError> {
    delegate(builder).map_err(|err| ExamError::container("Problem delegating to test", err))
}

async fn invoke_child(
    run: RunId,
    staged: &StagedReactor,
    child: &BoundTest,
    clock: &dyn Clock,
    sink: &dyn OutcomeSink,
) -> TestOutcome {
    sink.emit(RunEvent::Started {
        run,
        target: child.name.clone(),
    });
    let started_at = clock.now();
    let start = Instant::now();
    let result = staged.invoke(&child.address).await;

    let outcome = TestOutcome {
        address: child.address.id(),
        target: child.name.clone(),
        unit: child.operation.unit().to_string(),
        operation: child.operation.name().to_string(),
        kind: OutcomeKind::of(&result),
        reason: result.err().map(|err| err.to_string()),
        started_at,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };
    sink.emit(RunEvent::Finished(outcome.clone()));
    outcome
}
