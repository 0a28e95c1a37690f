//! Domain - ドメインモデル
//!
//! address, probe, configuration, operation, outcome, errors を定義します。
//! I/O は持ちません。

pub mod address;
pub mod configuration;
pub mod errors;
pub mod ids;
pub mod operation;
pub mod outcome;
pub mod probe;

pub use address::TestAddress;
pub use configuration::{Configuration, StagingStrategy, validate_declarations};
pub use errors::{BoxError, DispatchError, ErrorKind, ExamError, InvocationError, unwind};
pub use ids::{AddressId, EnvironmentId, RunId};
pub use operation::{DeclaredOperation, DelegateFn, OperationKind};
pub use outcome::{OutcomeKind, RunEvent, RunReport, TestOutcome};
pub use probe::{OperationRef, Probe, ProbeBuilder, ProbeEntry};
