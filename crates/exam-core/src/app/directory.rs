//! TestDirectory - address → instantiation instruction
//!
//! runner が target 一覧を確定した時点で登録し、reporting 層が参照し、
//! teardown で消す。runner が所有し `Arc<TestDirectory>` で共有する。
//!
//! 各エントリは登録した run の `RunId` を持つ。teardown は自分の run の
//! エントリだけを消すので、同じ directory を使う run が重なっても互いを
//! 消さない。

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use crate::domain::{AddressId, DeclaredOperation, ExamError, RunId, TestAddress};

/// How to find the declared operation behind an address again.
///
/// Text form is `<declaring unit>;<operation>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstantiationInstruction {
    pub unit: String,
    pub operation: String,
}

impl InstantiationInstruction {
    pub fn new(unit: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            operation: operation.into(),
        }
    }

    pub fn for_operation(operation: &DeclaredOperation) -> Self {
        Self::new(operation.unit(), operation.name())
    }
}

impl fmt::Display for InstantiationInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.unit, self.operation)
    }
}

impl FromStr for InstantiationInstruction {
    type Err = ExamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(';') {
            Some((unit, operation))
                if !unit.is_empty() && !operation.is_empty() && !operation.contains(';') =>
            {
                Ok(Self::new(unit, operation))
            }
            _ => Err(ExamError::IllegalState(format!(
                "malformed instantiation instruction {s:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    run: RunId,
    address: TestAddress,
    instruction: InstantiationInstruction,
}

#[derive(Debug, Default)]
pub struct TestDirectory {
    entries: RwLock<HashMap<AddressId, Entry>>,
}

impl TestDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, run: RunId, address: TestAddress, instruction: InstantiationInstruction) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            address.id(),
            Entry {
                run,
                address,
                instruction,
            },
        );
    }

    pub fn lookup(&self, address: &TestAddress) -> Option<InstantiationInstruction> {
        self.lookup_id(address.id())
    }

    pub fn lookup_id(&self, id: AddressId) -> Option<InstantiationInstruction> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&id).map(|entry| entry.instruction.clone())
    }

    /// Registered addresses, in no particular order.
    pub fn addresses(&self) -> Vec<TestAddress> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.values().map(|entry| entry.address.clone()).collect()
    }

    /// Addresses registered by one run.
    pub fn addresses_of(&self, run: RunId) -> Vec<TestAddress> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .values()
            .filter(|entry| entry.run == run)
            .map(|entry| entry.address.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry registered by `run`.
    pub fn clear_run(&self, run: RunId) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, entry| entry.run != run);
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
