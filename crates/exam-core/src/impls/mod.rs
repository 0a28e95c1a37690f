//! Impls - 実装（開発・テスト用）
//!
//! - **InProcessProvisioner** + **TestCatalog**: 環境は管理情報のみ、テスト本体は現在の runtime 上で実行
//! - **ChannelSink** / **CollectingSink**: 結果ストリームの受け手
//!
//! コンテナを使う provisioner はこの crate の外に置きます。

pub mod inproc;
pub mod sink;

pub use self::inproc::{
    CatalogError, FnBody, InProcessProvisioner, InvocationContext, TestBody, TestCatalog,
};
pub use self::sink::{ChannelSink, CollectingSink};
