//! exam-core
//!
//! Core building blocks for staging and invoking tests across configurations.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, address, probe, configuration, operation, outcome, errors）
//! - **ports**: 抽象化レイヤー（EnvironmentProvisioner, TestClass, OutcomeSink, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（manager, reactor, staging, runner, directory, settings）
//! - **impls**: 実装（InProcessProvisioner, ChannelSink など開発用）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{ExamRunner, ExamSettings, ReactorManager, StagedRun};
pub use domain::{ExamError, TestAddress};
