//! StagingFactory - reactor の環境をどう provision するか
//!
//! - `Sequential`: configuration を 1 つずつ。最初の失敗で、それまでに
//!   provision した環境を release して staging を中断
//! - `Pooled`: 最大 `max_parallel` 個を並行に。失敗した環境は unavailable として
//!   記録し、他は止めない。その target の invoke は `EnvironmentUnavailable`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::domain::{Configuration, ExamError, Probe, StagingStrategy};
use crate::ports::{EnvironmentHandle, EnvironmentProvisioner};

use super::staged::{StagedReactor, release_live};

/// State of one configuration's environment after staging.
#[derive(Debug, Clone)]
pub(crate) enum EnvironmentState {
    Live(EnvironmentHandle),
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub(crate) struct EnvironmentSlot {
    pub configuration: Configuration,
    pub state: EnvironmentState,
}

impl EnvironmentSlot {
    fn live(configuration: Configuration, handle: EnvironmentHandle) -> Self {
        Self {
            configuration,
            state: EnvironmentState::Live(handle),
        }
    }

    fn unavailable(configuration: Configuration, reason: String) -> Self {
        Self {
            configuration,
            state: EnvironmentState::Unavailable(reason),
        }
    }
}

#[derive(Clone)]
pub struct StagingFactory {
    provisioner: Arc<dyn EnvironmentProvisioner>,
    strategy: StagingStrategy,
    invocation_timeout: Option<Duration>,
}

impl StagingFactory {
    pub fn new(provisioner: Arc<dyn EnvironmentProvisioner>, strategy: StagingStrategy) -> Self {
        Self {
            provisioner,
            strategy,
            invocation_timeout: None,
        }
    }

    /// Deadline per invocation. Exceeding it yields `ExamError::Timeout`.
    pub fn with_invocation_timeout(mut self, limit: Option<Duration>) -> Self {
        self.invocation_timeout = limit;
        self
    }

    pub fn strategy(&self) -> StagingStrategy {
        self.strategy
    }

    /// Whether staged environments accept overlapping invocations.
    pub fn is_reentrant(&self) -> bool {
        matches!(self.strategy, StagingStrategy::Pooled { .. })
    }

    pub(crate) async fn stage(
        &self,
        configurations: Vec<Configuration>,
        probes: Vec<Probe>,
    ) -> Result<StagedReactor, ExamError> {
        let environments = match self.strategy {
            StagingStrategy::Sequential => self.provision_sequential(configurations).await?,
            StagingStrategy::Pooled { max_parallel } => {
                self.provision_pooled(configurations, max_parallel).await
            }
        };
        Ok(StagedReactor::new(
            Arc::clone(&self.provisioner),
            environments,
            &probes,
            self.is_reentrant(),
            self.invocation_timeout,
        ))
    }

    async fn provision_sequential(
        &self,
        configurations: Vec<Configuration>,
    ) -> Result<Vec<EnvironmentSlot>, ExamError> {
        let mut slots = Vec::with_capacity(configurations.len());
        for configuration in configurations {
            match self.provisioner.provision(&configuration).await {
                Ok(handle) => {
                    info!(configuration = %configuration.name, environment = %handle.id(), "environment provisioned");
                    slots.push(EnvironmentSlot::live(configuration, handle));
                }
                Err(err) => {
                    warn!(configuration = %configuration.name, error = %err, "provisioning failed, releasing staged environments");
                    release_live(self.provisioner.as_ref(), &slots).await;
                    return Err(ExamError::container(
                        format!(
                            "Problem provisioning environment for configuration {}",
                            configuration.name
                        ),
                        err,
                    ));
                }
            }
        }
        Ok(slots)
    }

    async fn provision_pooled(
        &self,
        configurations: Vec<Configuration>,
        max_parallel: usize,
    ) -> Vec<EnvironmentSlot> {
        let permits = Arc::new(Semaphore::new(max_parallel.max(1)));
        let mut set = JoinSet::new();
        for (index, configuration) in configurations.iter().cloned().enumerate() {
            let provisioner = Arc::clone(&self.provisioner);
            let permits = Arc::clone(&permits);
            set.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => provisioner
                        .provision(&configuration)
                        .await
                        .map_err(|err| err.to_string()),
                    Err(_) => Err("staging pool closed".to_string()),
                };
                (index, result)
            });
        }

        let mut staged: Vec<Option<EnvironmentState>> = vec![None; configurations.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, Ok(handle))) => {
                    info!(configuration = %configurations[index].name, environment = %handle.id(), "environment provisioned");
                    staged[index] = Some(EnvironmentState::Live(handle));
                }
                Ok((index, Err(reason))) => {
                    warn!(configuration = %configurations[index].name, %reason, "environment unavailable");
                    staged[index] = Some(EnvironmentState::Unavailable(reason));
                }
                Err(err) => warn!(error = %err, "provisioning task did not complete"),
            }
        }

        configurations
            .into_iter()
            .zip(staged)
            .map(|(configuration, state)| match state {
                Some(EnvironmentState::Live(handle)) => EnvironmentSlot::live(configuration, handle),
                Some(EnvironmentState::Unavailable(reason)) => {
                    EnvironmentSlot::unavailable(configuration, reason)
                }
                None => EnvironmentSlot::unavailable(
                    configuration,
                    "provisioning task did not complete".to_string(),
                ),
            })
            .collect()
    }
}
