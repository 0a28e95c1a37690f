//! Errors - エラー分類と原因の unwind
//!
//! # 伝播ポリシー
//! - build 時のエラー（configuration, duplicate test, delegation）は run 全体を中断
//! - invoke 時のエラーはその target だけに閉じる
//! - test body の失敗は `unwind` で plumbing の層を剥がしてから `TestFailure` に入れる

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Boxed error used at every boundary where a test body's own error travels.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Operational classification of an [`ExamError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    DuplicateTest,
    ContainerInteraction,
    EnvironmentUnavailable,
    Timeout,
    IllegalState,
    UnknownTarget,
    TestFailure,
}

#[derive(Debug, Error)]
pub enum ExamError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("duplicate test {unit}::{operation}")]
    DuplicateTest { unit: String, operation: String },

    #[error("{message}")]
    ContainerInteraction {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("environment for {target} is unavailable: {reason}")]
    EnvironmentUnavailable { target: String, reason: String },

    #[error("invocation of {target} timed out after {limit:?}")]
    Timeout { target: String, limit: Duration },

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("no staged target {0}")]
    UnknownTarget(String),

    /// The test's own failure, already unwound to its original cause.
    #[error("{0}")]
    TestFailure(#[source] BoxError),
}

impl ExamError {
    pub fn container(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::ContainerInteraction {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn container_msg(message: impl Into<String>) -> Self {
        Self::ContainerInteraction {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a test-body error, stripping any plumbing layers first.
    pub fn test_failure(error: BoxError) -> Self {
        Self::TestFailure(unwind(error))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::DuplicateTest { .. } => ErrorKind::DuplicateTest,
            Self::ContainerInteraction { .. } => ErrorKind::ContainerInteraction,
            Self::EnvironmentUnavailable { .. } => ErrorKind::EnvironmentUnavailable,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::IllegalState(_) => ErrorKind::IllegalState,
            Self::UnknownTarget(_) => ErrorKind::UnknownTarget,
            Self::TestFailure(_) => ErrorKind::TestFailure,
        }
    }

    /// The original cause of a test failure, if this is one.
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::TestFailure(cause) => Some(cause.as_ref()),
            _ => None,
        }
    }
}

/// Failure reported by the provisioning collaborator for one dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The test body ran and raised.
    #[error("test body failed: {0}")]
    Failed(#[source] BoxError),

    /// The environment could not run the operation at all.
    #[error("environment rejected dispatch: {0}")]
    Container(String),
}

/// A plumbing layer around an underlying error.
///
/// Every generic invocation boundary wraps what it catches in one of these;
/// [`unwind`] removes them again.
#[derive(Debug)]
pub struct InvocationError {
    context: String,
    source: BoxError,
}

impl InvocationError {
    pub fn new(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.source)
    }
}

impl std::error::Error for InvocationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Return the innermost original cause of `error`.
///
/// Strips `InvocationError` layers and `ExamError::TestFailure` wrappers.
/// Anything else is the cause and is returned untouched.
pub fn unwind(mut error: BoxError) -> BoxError {
    loop {
        error = match error.downcast::<InvocationError>() {
            Ok(wrapper) => wrapper.source,
            Err(other) => match other.downcast::<ExamError>() {
                Ok(exam) => match *exam {
                    ExamError::TestFailure(inner) => inner,
                    exam => return Box::new(exam),
                },
                Err(other) => return other,
            },
        };
    }
}
