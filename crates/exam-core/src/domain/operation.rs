//! Declared test operations.
//!
//! operation の種別は宣言時に一度だけ決まります。
//! - `Direct`: probe にそのまま登録
//! - `Delegating`: build 時に probe builder を受け取って呼ばれ、自分の address を返す

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::address::TestAddress;
use super::errors::BoxError;
use super::probe::ProbeBuilder;

/// Build-time delegate: receives the in-progress builder, returns the address
/// that stands for the declared operation.
pub type DelegateFn =
    Arc<dyn Fn(&mut ProbeBuilder) -> Result<TestAddress, BoxError> + Send + Sync>;

#[derive(Clone)]
pub enum OperationKind {
    Direct,
    Delegating(DelegateFn),
}

/// One test operation as declared by a test class.
///
/// Identity is `(unit, name)`.
#[derive(Clone)]
pub struct DeclaredOperation {
    unit: String,
    name: String,
    kind: OperationKind,
}

impl DeclaredOperation {
    pub fn direct(unit: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            name: name.into(),
            kind: OperationKind::Direct,
        }
    }

    pub fn delegating<F>(unit: impl Into<String>, name: impl Into<String>, delegate: F) -> Self
    where
        F: Fn(&mut ProbeBuilder) -> Result<TestAddress, BoxError> + Send + Sync + 'static,
    {
        Self {
            unit: unit.into(),
            name: name.into(),
            kind: OperationKind::Delegating(Arc::new(delegate)),
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn is_delegating(&self) -> bool {
        matches!(self.kind, OperationKind::Delegating(_))
    }
}

impl PartialEq for DeclaredOperation {
    fn eq(&self, other: &Self) -> bool {
        self.unit == other.unit && self.name == other.name
    }
}

impl Eq for DeclaredOperation {}

impl Hash for DeclaredOperation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.unit.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Debug for DeclaredOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            OperationKind::Direct => "Direct",
            OperationKind::Delegating(_) => "Delegating",
        };
        f.debug_struct("DeclaredOperation")
            .field("unit", &self.unit)
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

impl fmt::Display for DeclaredOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.unit, self.name)
    }
}
