//! ファイル自動発見機能
//!
//! プロジェクトルートからスタック定義ファイルと .env ファイルを発見します。

use crate::error::{Result, StackError};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// ルートファイル名
pub const STACK_FILE: &str = "stack.kdl";

/// 発見されたファイル群
#[derive(Debug, Clone, Default)]
pub struct DiscoveredFiles {
    /// ルートファイル (stack.kdl)
    pub root: Option<PathBuf>,
    /// ステージ固有オーバーライドファイル (stack.{stage}.kdl)
    pub stage_override: Option<PathBuf>,
    /// ローカルオーバーライドファイル (stack.local.kdl)
    pub local_override: Option<PathBuf>,
    /// 環境変数ファイル (.env)
    pub env_file: Option<PathBuf>,
    /// ステージ固有の環境変数ファイル (.env.{stage})
    pub stage_env_file: Option<PathBuf>,
}

impl DiscoveredFiles {
    /// テンプレート展開する順序でKDLファイルを返す
    pub fn kdl_files(&self) -> Vec<&PathBuf> {
        [&self.root, &self.stage_override, &self.local_override]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// プロジェクトルートを検出
///
/// 以下の優先順位で検索:
/// 1. 環境変数 EDGESTACK_PROJECT_ROOT
/// 2. カレントディレクトリから上に向かって以下を探す:
///    - stack.kdl
///    - .edgestack/stack.kdl
#[tracing::instrument]
pub fn find_project_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var("EDGESTACK_PROJECT_ROOT") {
        let path = PathBuf::from(&root);
        debug!(env_root = %root, "Checking EDGESTACK_PROJECT_ROOT");
        if has_stack_file(&path) {
            info!(project_root = %path.display(), "Found project root from environment variable");
            return Ok(path);
        }
    }

    let start_dir = std::env::current_dir()?;
    find_project_root_from(&start_dir)
}

/// 指定ディレクトリから上に向かってプロジェクトルートを探す
pub fn find_project_root_from(start_dir: &Path) -> Result<PathBuf> {
    let mut current = start_dir.to_path_buf();
    debug!(start_dir = %start_dir.display(), "Searching for project root");

    loop {
        if has_stack_file(&current) {
            info!(project_root = %current.display(), "Found project root");
            return Ok(current);
        }

        if !current.pop() {
            break;
        }
    }

    warn!(start_dir = %start_dir.display(), "Project root not found");
    Err(StackError::ProjectRootNotFound(start_dir.to_path_buf()))
}

fn has_stack_file(dir: &Path) -> bool {
    dir.join(STACK_FILE).exists() || dir.join(".edgestack").join(STACK_FILE).exists()
}

/// プロジェクトルート直下、なければ .edgestack/ 配下のファイルを返す
fn locate(project_root: &Path, file_name: &str) -> Option<PathBuf> {
    let direct = project_root.join(file_name);
    if direct.exists() {
        return Some(direct);
    }
    let hidden = project_root.join(".edgestack").join(file_name);
    hidden.exists().then_some(hidden)
}

/// ステージ指定でプロジェクトルートからファイルを自動発見
///
/// 読み込み順序: stack.kdl → stack.{stage}.kdl → stack.local.kdl
#[tracing::instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn discover_files(project_root: &Path, stage: Option<&str>) -> Result<DiscoveredFiles> {
    let mut discovered = DiscoveredFiles {
        root: locate(project_root, STACK_FILE),
        local_override: locate(project_root, "stack.local.kdl"),
        env_file: locate(project_root, ".env"),
        ..Default::default()
    };

    if let Some(stage_name) = stage {
        discovered.stage_override = locate(project_root, &format!("stack.{}.kdl", stage_name));
        discovered.stage_env_file = locate(project_root, &format!(".env.{}", stage_name));
    }

    debug!(?discovered, "File discovery complete");
    Ok(discovered)
}
