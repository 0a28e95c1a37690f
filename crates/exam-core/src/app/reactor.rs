//! Reactor - staging 前の probe と configuration の集約

use crate::domain::{Configuration, ExamError, Probe, validate_declarations};

use super::staged::StagedReactor;
use super::staging::StagingFactory;

/// Mutable collector filled in by the orchestration before staging.
///
/// `stage` consumes the reactor, so a reactor can never be reused after it has
/// been turned into a `StagedReactor`.
#[derive(Debug, Default)]
pub struct Reactor {
    configurations: Vec<Configuration>,
    probes: Vec<Probe>,
}

impl Reactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_configuration(&mut self, configuration: Configuration) {
        self.configurations.push(configuration);
    }

    /// Hand over a built probe. Each probe is consumed exactly once.
    pub fn add_probe(&mut self, probe: Probe) {
        self.probes.push(probe);
    }

    pub fn configurations(&self) -> &[Configuration] {
        &self.configurations
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    /// Provision one environment per configuration and register every probe
    /// entry in each of them.
    ///
    /// Nothing is provisioned when the configuration set is invalid or no probe
    /// has been added.
    pub async fn stage(self, factory: &StagingFactory) -> Result<StagedReactor, ExamError> {
        validate_declarations(&self.configurations)?;
        if self.probes.is_empty() {
            return Err(ExamError::IllegalState(
                "reactor has no probe to stage".to_string(),
            ));
        }
        factory.stage(self.configurations, self.probes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::staging::tests::factory_with;
    use crate::domain::{ErrorKind, ProbeBuilder, StagingStrategy};
    use crate::impls::TestCatalog;

    fn probe() -> Probe {
        let mut builder = ProbeBuilder::new();
        builder.add_test("Calc", "adds").unwrap();
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn zero_configurations_fail_before_provisioning() {
        let (factory, provisioner) = factory_with(TestCatalog::new(), StagingStrategy::Sequential);
        let mut reactor = Reactor::new();
        reactor.add_probe(probe());

        let err = reactor.stage(&factory).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(provisioner.provisioned_count().await, 0);
    }

    #[tokio::test]
    async fn malformed_configuration_fails_before_provisioning() {
        let (factory, provisioner) = factory_with(TestCatalog::new(), StagingStrategy::Sequential);
        let mut reactor = Reactor::new();
        reactor.add_configuration(Configuration::new("ok"));
        reactor.add_configuration(Configuration::new(""));
        reactor.add_probe(probe());

        let err = reactor.stage(&factory).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(provisioner.provisioned_count().await, 0);
    }

    #[tokio::test]
    async fn staging_requires_a_probe() {
        let (factory, provisioner) = factory_with(TestCatalog::new(), StagingStrategy::Sequential);
        let mut reactor = Reactor::new();
        reactor.add_configuration(Configuration::new("native"));

        let err = reactor.stage(&factory).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalState);
        assert_eq!(provisioner.provisioned_count().await, 0);
    }
}
