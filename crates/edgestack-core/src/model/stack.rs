//! スタック定義

use super::frontend::FrontendSpec;
use super::load_balancer::LoadBalancerSpec;
use super::network::NetworkSpec;
use super::service::ServiceSpec;
use serde::{Deserialize, Serialize};

/// デフォルトのスタック名
pub const DEFAULT_STACK_NAME: &str = "InfraStack";

/// デフォルトのリージョン（ソースで固定）
pub const DEFAULT_REGION: &str = "us-west-2";

/// StackDefinition - デプロイ単位の設計図
///
/// ネットワーク、クラスター、サービス、ロードバランサー、
/// フロントエンド（バケット＋CDN）をひとまとめに宣言します。
/// 作成・削除は常にスタック単位で行われます。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackDefinition {
    /// スタック名
    pub name: String,
    /// テンプレートの説明文
    #[serde(default)]
    pub description: Option<String>,
    /// デプロイ先のアカウント・リージョン
    pub env: Environment,
    pub network: NetworkSpec,
    pub cluster: ClusterSpec,
    pub load_balancer: LoadBalancerSpec,
    /// サービス（宣言順を保持）
    pub services: Vec<ServiceSpec>,
    pub frontend: FrontendSpec,
    #[serde(default)]
    pub outputs: OutputSpec,
}

impl StackDefinition {
    /// 既定のトポロジーを生成
    ///
    /// 2AZのパブリックサブネット、ECSクラスター、`api1`(5000) と `api2`(6001)、
    /// CloudFront プレフィックスリストからのみ受け付けるALB、
    /// 静的アセット用バケットとCloudFrontディストリビューション。
    /// アカウントは未設定（外部から指定）。
    pub fn reference() -> Self {
        let mut api1 = ServiceSpec::new("api1", 5000);
        api1.priority = 1;
        let mut api2 = ServiceSpec::new("api2", 6001);
        api2.priority = 2;

        Self {
            name: DEFAULT_STACK_NAME.to_string(),
            description: None,
            env: Environment::default(),
            network: NetworkSpec::default(),
            cluster: ClusterSpec::default(),
            load_balancer: LoadBalancerSpec::default(),
            services: vec![api1, api2],
            frontend: FrontendSpec::default(),
            outputs: OutputSpec::default(),
        }
    }

    /// サービスを名前で取得
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    /// サービスを名前で取得（可変）
    pub fn service_mut(&mut self, name: &str) -> Option<&mut ServiceSpec> {
        self.services.iter_mut().find(|s| s.name == name)
    }

    /// アカウントID（解決済みの場合のみ）
    pub fn account(&self) -> Option<&str> {
        self.env.account.as_deref()
    }
}

impl Default for StackDefinition {
    fn default() -> Self {
        Self::reference()
    }
}

/// デプロイ先環境
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// AWSアカウントID（12桁）
    pub account: Option<String>,
    /// リージョン（us-west-2 など）
    pub region: String,
}

impl Environment {
    /// `aws://<account>/<region>` 形式の環境URI
    pub fn uri(&self) -> String {
        format!(
            "aws://{}/{}",
            self.account.as_deref().unwrap_or("unknown-account"),
            self.region
        )
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            account: None,
            region: DEFAULT_REGION.to_string(),
        }
    }
}

/// コンテナクラスター
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub id: String,
}

impl Default for ClusterSpec {
    fn default() -> Self {
        Self {
            id: "AppCluster".to_string(),
        }
    }
}

/// スタック出力の論理名
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// ALBのDNS名を出力する論理名
    pub alb_dns_name: String,
    /// CloudFrontのURLを出力する論理名
    pub cloudfront_url: String,
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            alb_dns_name: "ALBDnsName".to_string(),
            cloudfront_url: "CloudFrontURL".to_string(),
        }
    }
}
