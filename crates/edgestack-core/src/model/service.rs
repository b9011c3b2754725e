//! サービス定義

use super::network::SubnetKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// サービス定義（1サービス = 1コンテナのFargateタスク）
///
/// KDL形式：
/// ```kdl
/// service "api1" {
///     image "api1" tag="latest"
///     port 5000
///     cpu 256
///     memory 512
///     desired-count 1
///     health-check "/api1"
///     path "/api1*"
///     priority 1
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    /// ECRリポジトリのイメージ参照（ビルドはしない）
    pub image: ImageRef,
    /// コンテナポート兼ターゲットグループのポート
    pub port: u16,
    /// CPUユニット（256 = 0.25 vCPU）
    pub cpu: u32,
    /// メモリ (MiB)
    pub memory_mib: u32,
    pub desired_count: u32,
    pub assign_public_ip: bool,
    /// 配置先サブネット種別
    #[serde(default)]
    pub subnets: SubnetKind,
    /// ターゲットグループのヘルスチェックパス
    pub health_check_path: String,
    /// リスナールールおよびCDNビヘイビアのパスパターン
    pub path_pattern: String,
    /// リスナールールの優先度
    pub priority: u32,
    /// awslogs のストリームプレフィックス
    pub log_stream_prefix: String,
}

impl ServiceSpec {
    /// 名前とポートから既定値でサービスを作成
    ///
    /// リポジトリ名・ヘルスチェック・パスパターン・ログプレフィックスは
    /// サービス名から導出します。優先度は未設定（0）です。
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        let name = name.into();
        Self {
            image: ImageRef::new(name.clone(), "latest"),
            port,
            cpu: 256,
            memory_mib: 512,
            desired_count: 1,
            assign_public_ip: true,
            subnets: SubnetKind::Public,
            health_check_path: format!("/{}", name),
            path_pattern: format!("/{}*", name),
            priority: 0,
            log_stream_prefix: name.clone(),
            name,
        }
    }

    /// コンストラクトIDの接頭辞（`api1` → `Api1`）
    pub fn construct_prefix(&self) -> String {
        super::pascal_case(&self.name)
    }
}

/// コンテナイメージ参照（リポジトリ名＋タグ）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub repository: String,
    pub tag: String,
}

impl ImageRef {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// `repo:tag` 形式をパース（タグ省略時は `latest`）
    pub fn parse(s: &str) -> Self {
        match s.rsplit_once(':') {
            Some((repo, tag)) if !repo.is_empty() && !tag.contains('/') => Self::new(repo, tag),
            _ => Self::new(s, "latest"),
        }
    }

    /// ECRのイメージURI
    pub fn ecr_uri(&self, account: &str, region: &str) -> String {
        format!(
            "{}.dkr.ecr.{}.amazonaws.com/{}:{}",
            account, region, self.repository, self.tag
        )
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}
