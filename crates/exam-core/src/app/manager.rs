//! ReactorManager - 宣言済みテストクラスから reactor を準備する
//!
//! configuration 宣言の読み込み、probe カスタマイズ hook の適用、staging 戦略の
//! 解決を担当します。probe の組み立てと address の対応付けは runner 側。

use std::sync::Arc;

use tracing::debug;

use crate::domain::{ExamError, ProbeBuilder, StagingStrategy, validate_declarations};
use crate::ports::{ConfigurationSource, DeclaredOperations, EnvironmentProvisioner, TestClass};

use super::reactor::Reactor;
use super::settings::ExamSettings;
use super::staging::StagingFactory;

pub struct ReactorManager {
    provisioner: Arc<dyn EnvironmentProvisioner>,
    settings: ExamSettings,
}

impl ReactorManager {
    pub fn new(provisioner: Arc<dyn EnvironmentProvisioner>, settings: ExamSettings) -> Self {
        Self {
            provisioner,
            settings,
        }
    }

    pub fn settings(&self) -> &ExamSettings {
        &self.settings
    }

    /// Fresh probe builder anchored at the class.
    pub fn create_probe(&self, class: &dyn TestClass) -> Result<ProbeBuilder, ExamError> {
        let mut builder = ProbeBuilder::new();
        builder.set_anchor(class.name())?;
        Ok(builder)
    }

    /// Reactor holding every configuration the class is staged under.
    ///
    /// Fails with `Configuration` when the source yields nothing or anything
    /// malformed.
    pub fn prepare_reactor(
        &self,
        class: &dyn TestClass,
        source: &dyn ConfigurationSource,
    ) -> Result<Reactor, ExamError> {
        let configurations = source.configurations(class)?;
        validate_declarations(&configurations)?;
        debug!(class = class.name(), configurations = configurations.len(), "reactor prepared");

        let mut reactor = Reactor::new();
        for configuration in configurations {
            reactor.add_configuration(configuration);
        }
        Ok(reactor)
    }

    /// Apply the class's probe customization hook.
    ///
    /// A failing hook is surfaced as `ContainerInteraction`, never swallowed.
    pub fn overwrite_with_user_definition(
        &self,
        class: &dyn TestClass,
        mut builder: ProbeBuilder,
        operations: &mut DeclaredOperations,
    ) -> Result<ProbeBuilder, ExamError> {
        class
            .customize_probe(&mut builder, operations)
            .map_err(|err| ExamError::container("Problem applying probe customization", err))?;
        Ok(builder)
    }

    /// Class override, then settings, then sequential.
    pub fn get_factory(&self, class: &dyn TestClass) -> StagingFactory {
        let strategy = class
            .staging()
            .unwrap_or_else(|| self.settings.strategy());
        let strategy = match strategy {
            StagingStrategy::Pooled { max_parallel } => StagingStrategy::Pooled {
                max_parallel: max_parallel.max(1),
            },
            sequential => sequential,
        };
        StagingFactory::new(Arc::clone(&self.provisioner), strategy)
            .with_invocation_timeout(self.settings.invocation_timeout())
    }
}
