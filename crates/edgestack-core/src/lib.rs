//! edgestack コア
//!
//! スタック定義（KDL）の読み込みから検証までを担当します。
//!
//! - [`model`]: ネットワーク・サービス・ALB・フロントエンドのデータモデル
//! - [`parser`]: KDLパーサー
//! - [`template`]: Teraによるテンプレート展開
//! - [`discovery`]: プロジェクトルートとファイルの自動発見
//! - [`loader`]: 発見 → 展開 → パース → アカウント解決 → 検証
//! - [`validate`]: 構造上の不変条件チェック

pub mod discovery;
pub mod error;
pub mod loader;
pub mod model;
pub mod parser;
pub mod template;
pub mod validate;

pub use discovery::{DiscoveredFiles, discover_files, find_project_root, find_project_root_from};
pub use error::{Result, StackError, ValidationIssue};
pub use loader::{
    LoadOptions, LoadedStack, load_or_reference, load_project, load_project_from_root,
    load_reference, parse_context_arg, require_account, resolve_account,
};
pub use model::*;
pub use parser::{parse_kdl_file, parse_kdl_string};
pub use template::{TemplateProcessor, Variables};
pub use validate::validate;
