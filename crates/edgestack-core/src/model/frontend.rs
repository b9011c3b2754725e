//! フロントエンド定義（静的アセットバケット＋CDN）

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// フロントエンド定義
///
/// KDL形式：
/// ```kdl
/// frontend {
///     bucket "FrontendBucket"
///     distribution "FrontendDistribution"
///     assets "../frontend"
///     exclude "*.map" ".DS_Store"
///     default-root-object "index.html"
///     invalidate "/*"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendSpec {
    pub bucket_id: String,
    pub distribution_id: String,
    pub deployment_id: String,
    /// アップロードする静的ファイルのディレクトリ（プロジェクトルート相対）
    pub assets: PathBuf,
    /// アップロード対象から除外するglobパターン
    #[serde(default)]
    pub exclude: Vec<String>,
    pub default_root_object: String,
    /// デプロイごとに無効化するパス
    pub invalidation_paths: Vec<String>,
    /// スタック削除時にバケット内オブジェクトも削除する
    pub auto_delete_objects: bool,
    /// デプロイ時にアセットに存在しないオブジェクトを削除する
    pub prune: bool,
}

impl Default for FrontendSpec {
    fn default() -> Self {
        Self {
            bucket_id: "FrontendBucket".to_string(),
            distribution_id: "FrontendDistribution".to_string(),
            deployment_id: "DeployFrontend".to_string(),
            assets: PathBuf::from("../frontend"),
            exclude: Vec::new(),
            default_root_object: "index.html".to_string(),
            invalidation_paths: vec!["/*".to_string()],
            auto_delete_objects: true,
            prune: true,
        }
    }
}
