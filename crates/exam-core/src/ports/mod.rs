//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! コンテナや host のテストフレームワークなど、外部との境界はすべて
//! ここの trait を通します。
//!
//! - `EnvironmentProvisioner`: provision / release / dispatch
//! - `TestClass` + `ConfigurationSource`: 宣言の入力
//! - `OutcomeSink`: 結果ストリームの出力
//! - `Clock`, `IdGenerator`: 時刻と ID

pub mod clock;
pub mod id_generator;
pub mod outcome_sink;
pub mod provisioner;
pub mod test_class;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::outcome_sink::{NoopSink, OutcomeSink};
pub use self::provisioner::{EnvironmentHandle, EnvironmentProvisioner};
pub use self::test_class::{
    ConfigurationSource, DeclaredConfigurations, DeclaredOperations, TestClass,
};
