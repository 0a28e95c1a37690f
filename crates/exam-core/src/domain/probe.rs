//! Probe / ProbeBuilder - test operation の配備単位
//!
//! - `add_test` / `add_test_variants` で登録、`build` で確定
//! - 同じ (unit, operation) の二重登録は `DuplicateTest`
//! - `build` 後の変更はすべて `IllegalState`

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::address::TestAddress;
use super::errors::ExamError;

/// What an environment is asked to run: a declared operation plus the
/// arguments bound to this particular address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRef {
    pub unit: String,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<serde_json::Value>,
}

impl OperationRef {
    pub fn new(unit: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            operation: operation.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<serde_json::Value>) -> Self {
        self.arguments = arguments;
        self
    }
}

/// One registered operation and the address it answers to.
#[derive(Debug, Clone)]
pub struct ProbeEntry {
    pub address: TestAddress,
    pub operation: OperationRef,
}

/// A built, immutable probe.
#[derive(Debug, Clone)]
pub struct Probe {
    anchor: Option<String>,
    metadata: BTreeMap<String, serde_json::Value>,
    entries: Vec<ProbeEntry>,
}

impl Probe {
    pub fn anchor(&self) -> Option<&str> {
        self.anchor.as_deref()
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn entries(&self) -> &[ProbeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Accumulates test operations for one probe.
///
/// Once [`build`](Self::build) has been called every further mutation fails
/// with `IllegalState`.
#[derive(Debug, Default)]
pub struct ProbeBuilder {
    anchor: Option<String>,
    metadata: BTreeMap<String, serde_json::Value>,
    entries: Vec<ProbeEntry>,
    seen: HashSet<(String, String)>,
    built: bool,
}

impl ProbeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one operation. Returns its root address (no arguments).
    pub fn add_test(
        &mut self,
        unit: impl Into<String>,
        operation: impl Into<String>,
    ) -> Result<TestAddress, ExamError> {
        let (unit, operation) = self.claim(unit.into(), operation.into())?;
        let address = TestAddress::new(format!("{unit}.{operation}"));
        self.entries.push(ProbeEntry {
            address: address.clone(),
            operation: OperationRef::new(unit, operation),
        });
        Ok(address)
    }

    /// Register one operation once per argument set.
    ///
    /// Each variant gets its own address, decorated from a shared root which is
    /// returned. The root itself is not runnable.
    pub fn add_test_variants(
        &mut self,
        unit: impl Into<String>,
        operation: impl Into<String>,
        variants: Vec<Vec<serde_json::Value>>,
    ) -> Result<TestAddress, ExamError> {
        self.ensure_open()?;
        if variants.is_empty() {
            return Err(ExamError::IllegalState(
                "add_test_variants needs at least one argument set".to_string(),
            ));
        }
        let (unit, operation) = self.claim(unit.into(), operation.into())?;
        let root = TestAddress::new(format!("{unit}.{operation}"));
        for (index, arguments) in variants.into_iter().enumerate() {
            let address = root.decorate(&index.to_string(), arguments.clone());
            self.entries.push(ProbeEntry {
                address,
                operation: OperationRef::new(unit.clone(), operation.clone())
                    .with_arguments(arguments),
            });
        }
        Ok(root)
    }

    pub fn set_anchor(&mut self, anchor: impl Into<String>) -> Result<(), ExamError> {
        self.ensure_open()?;
        self.anchor = Some(anchor.into());
        Ok(())
    }

    pub fn set_metadata(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), ExamError> {
        self.ensure_open()?;
        self.metadata.insert(key.into(), value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Finalize into an immutable probe.
    pub fn build(&mut self) -> Result<Probe, ExamError> {
        self.ensure_open()?;
        self.built = true;
        Ok(Probe {
            anchor: self.anchor.take(),
            metadata: std::mem::take(&mut self.metadata),
            entries: std::mem::take(&mut self.entries),
        })
    }

    fn ensure_open(&self) -> Result<(), ExamError> {
        if self.built {
            return Err(ExamError::IllegalState("probe has already been built".to_string()));
        }
        Ok(())
    }

    fn claim(&mut self, unit: String, operation: String) -> Result<(String, String), ExamError> {
        self.ensure_open()?;
        if !self.seen.insert((unit.clone(), operation.clone())) {
            return Err(ExamError::DuplicateTest { unit, operation });
        }
        Ok((unit, operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use serde_json::json;

    #[test]
    fn add_test_returns_root_address() {
        let mut builder = ProbeBuilder::new();
        let address = builder.add_test("Calc", "adds").unwrap();

        assert!(address.is_root());
        assert!(address.arguments().is_empty());
        assert_eq!(address.caption(), "Calc.adds");

        let probe = builder.build().unwrap();
        assert_eq!(probe.len(), 1);
        assert_eq!(probe.entries()[0].address, address);
        assert_eq!(probe.entries()[0].operation, OperationRef::new("Calc", "adds"));
    }

    #[test]
    fn duplicate_is_rejected_and_builder_stays_usable() {
        let mut builder = ProbeBuilder::new();
        builder.add_test("Calc", "adds").unwrap();

        let err = builder.add_test("Calc", "adds").unwrap_err();
        assert!(matches!(
            &err,
            ExamError::DuplicateTest { unit, operation } if unit == "Calc" && operation == "adds"
        ));

        builder.add_test("Calc", "subtracts").unwrap();
        builder.add_test("Other", "adds").unwrap();
        assert_eq!(builder.build().unwrap().len(), 3);
    }

    #[test]
    fn variants_share_the_returned_root() {
        let mut builder = ProbeBuilder::new();
        let root = builder
            .add_test_variants("Calc", "divides", vec![vec![json!(1)], vec![json!(2)]])
            .unwrap();
        let probe = builder.build().unwrap();

        assert_eq!(probe.len(), 2);
        for (i, entry) in probe.entries().iter().enumerate() {
            assert_eq!(entry.address.root(), root);
            assert_ne!(entry.address, root);
            assert_eq!(entry.operation.arguments, vec![json!(i + 1)]);
        }
    }

    #[test]
    fn variants_count_as_one_pair() {
        let mut builder = ProbeBuilder::new();
        builder
            .add_test_variants("Calc", "divides", vec![vec![json!(1)]])
            .unwrap();
        let err = builder.add_test("Calc", "divides").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateTest);
    }

    #[test]
    fn mutation_after_build_is_illegal() {
        let mut builder = ProbeBuilder::new();
        builder.set_anchor("CalcTest").unwrap();
        builder.set_metadata("bundle", json!("calc")).unwrap();
        let probe = builder.build().unwrap();
        assert_eq!(probe.anchor(), Some("CalcTest"));
        assert_eq!(probe.metadata()["bundle"], json!("calc"));

        assert_eq!(builder.add_test("Calc", "late").unwrap_err().kind(), ErrorKind::IllegalState);
        assert_eq!(builder.build().unwrap_err().kind(), ErrorKind::IllegalState);
        assert_eq!(builder.set_anchor("x").unwrap_err().kind(), ErrorKind::IllegalState);
    }
}
