//! App - アプリケーション層
//!
//! ports を組み合わせて、テストクラスの宣言から teardown までを駆動します。
//!
//! # 主要コンポーネント
//! - **ReactorManager**: 宣言の読み込み、probe のカスタマイズ、staging 戦略の解決
//! - **Reactor**: staging 前の probe / configuration の集約
//! - **StagingFactory** / **StagedReactor**: 環境の provision と invoke / tear_down
//! - **ExamRunner**: prepare → invoke → tear_down を一回の run として実行
//! - **TestDirectory**: address → instantiation instruction
//! - **ExamSettings**: `exam.toml` の読み込み

pub mod directory;
pub mod manager;
pub mod reactor;
pub mod runner;
pub mod settings;
pub mod staged;
pub mod staging;

// 主要な型を再エクスポート
pub use self::directory::{InstantiationInstruction, TestDirectory};
pub use self::manager::ReactorManager;
pub use self::reactor::Reactor;
pub use self::runner::{BoundTest, ExamRunner, StagedRun};
pub use self::settings::{ExamSettings, RunSettings, SettingsError, StagingKind};
pub use self::staged::StagedReactor;
pub use self::staging::StagingFactory;
