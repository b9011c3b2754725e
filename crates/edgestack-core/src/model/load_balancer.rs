//! ロードバランサー定義

use super::IpCidr;
use serde::{Deserialize, Serialize};
use std::fmt;

/// CloudFront のオリジン向けマネージドプレフィックスリスト（us-west-2）
///
/// 動的に解決せず、設定値として扱います。
pub const CLOUDFRONT_ORIGIN_FACING_PREFIX_LIST: &str = "pl-82a045eb";

/// ALB定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSpec {
    pub id: String,
    /// リスナーポート（HTTP）
    pub port: u16,
    /// 受信を許可する唯一の送信元
    pub ingress: IngressSource,
    /// どのルールにも一致しない場合の固定レスポンス
    pub not_found: FixedResponse,
}

impl Default for LoadBalancerSpec {
    fn default() -> Self {
        Self {
            id: "AppALB".to_string(),
            port: 80,
            ingress: IngressSource::PrefixList(CLOUDFRONT_ORIGIN_FACING_PREFIX_LIST.to_string()),
            not_found: FixedResponse::default(),
        }
    }
}

/// ALBへの受信元
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngressSource {
    /// マネージドプレフィックスリスト（pl-xxxxxxxx）
    PrefixList(String),
    /// IPv4 または IPv6 の CIDR
    Cidr(String),
}

impl IngressSource {
    /// CIDR指定ならパース結果を返す
    pub fn cidr(&self) -> Option<Result<IpCidr, String>> {
        match self {
            Self::Cidr(cidr) => Some(cidr.parse()),
            Self::PrefixList(_) => None,
        }
    }

    /// インターネット全体に開放されているか
    ///
    /// 表記に関係なくプレフィックス長 0 のブロックは全て該当します。
    pub fn is_unrestricted(&self) -> bool {
        matches!(self.cidr(), Some(Ok(cidr)) if cidr.is_any())
    }

    /// セキュリティグループルールの説明文
    pub fn description(&self) -> String {
        match self {
            Self::PrefixList(_) => "CloudFront only".to_string(),
            Self::Cidr(cidr) => format!("Allow from {}", cidr),
        }
    }
}

impl fmt::Display for IngressSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrefixList(id) => write!(f, "prefix-list {}", id),
            Self::Cidr(cidr) => write!(f, "cidr {}", cidr),
        }
    }
}

/// 固定レスポンスアクション
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedResponse {
    pub status_code: u16,
    pub content_type: String,
    pub body: String,
}

impl Default for FixedResponse {
    fn default() -> Self {
        Self {
            status_code: 404,
            content_type: "text/plain".to_string(),
            body: "Not Found".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrestricted_ingress() {
        assert!(IngressSource::Cidr("0.0.0.0/0".to_string()).is_unrestricted());
        assert!(IngressSource::Cidr("::/0".to_string()).is_unrestricted());
        assert!(!IngressSource::Cidr("203.0.113.0/24".to_string()).is_unrestricted());
        assert!(!IngressSource::PrefixList("pl-82a045eb".to_string()).is_unrestricted());
    }

    #[test]
    fn test_unrestricted_ingress_alternate_spellings() {
        for any in ["0.0.0.0/00", "10.0.0.0/0", "::0/0", "0::/0", "2001:db8::/0"] {
            assert!(
                IngressSource::Cidr(any.to_string()).is_unrestricted(),
                "{} should be unrestricted",
                any
            );
        }
        // パースできない値は別のチェックで弾く
        assert!(!IngressSource::Cidr("garbage".to_string()).is_unrestricted());
    }

    #[test]
    fn test_ingress_description() {
        assert_eq!(
            IngressSource::PrefixList("pl-82a045eb".to_string()).description(),
            "CloudFront only"
        );
        assert_eq!(
            IngressSource::Cidr("198.51.100.0/24".to_string()).description(),
            "Allow from 198.51.100.0/24"
        );
    }
}
