//! ネットワーク定義

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

/// 1つのVPCで使用できるアベイラビリティゾーン数の上限
pub const MAX_AZS: u8 = 6;

/// VPC定義
///
/// KDL形式：
/// ```kdl
/// network "AppVpc" {
///     cidr "10.0.0.0/16"
///     max-azs 2
///     nat-gateways 0
///     subnet "Public" type="public" cidr-mask=24
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub id: String,
    pub cidr: String,
    /// 使用するアベイラビリティゾーン数（1〜[`MAX_AZS`]）
    pub max_azs: u8,
    /// NATゲートウェイ数（0 = 作成しない）
    pub nat_gateways: u8,
    /// サブネットグループ（各AZに1つずつ作成される）
    pub subnets: Vec<SubnetSpec>,
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self {
            id: "AppVpc".to_string(),
            cidr: "10.0.0.0/16".to_string(),
            max_azs: 2,
            nat_gateways: 0,
            subnets: vec![SubnetSpec {
                name: "Public".to_string(),
                kind: SubnetKind::Public,
                cidr_mask: 24,
            }],
        }
    }
}

impl NetworkSpec {
    /// 指定種別の最初のサブネットグループ
    pub fn subnet_group(&self, kind: SubnetKind) -> Option<&SubnetSpec> {
        self.subnets.iter().find(|s| s.kind == kind)
    }
}

/// サブネットグループ定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetSpec {
    pub name: String,
    pub kind: SubnetKind,
    pub cidr_mask: u8,
}

/// サブネット種別
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubnetKind {
    /// インターネットゲートウェイへのルートを持つ
    #[default]
    Public,
    /// NATゲートウェイ経由で外向き通信のみ
    Private,
    /// 外部へのルートなし
    Isolated,
}

impl SubnetKind {
    /// 文字列からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "public" => Some(Self::Public),
            "private" | "private-with-egress" | "private_with_egress" => Some(Self::Private),
            "isolated" | "private-isolated" | "private_isolated" => Some(Self::Isolated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Isolated => "isolated",
        }
    }
}

impl fmt::Display for SubnetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IPv4 CIDRブロック
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    pub addr: Ipv4Addr,
    pub prefix: u8,
}

impl Ipv4Cidr {
    /// ブロック内のアドレス数
    pub fn size(&self) -> u64 {
        1u64 << (32 - self.prefix as u32)
    }

    /// ネットワークアドレスが境界に揃っているか
    pub fn is_aligned(&self) -> bool {
        u32::from(self.addr) as u64 % self.size() == 0
    }

    /// `index` 番目の `/mask` サブブロックを返す
    ///
    /// 親ブロックに収まらない場合は `None`。
    pub fn nth_subnet(&self, mask: u8, index: u32) -> Option<Ipv4Cidr> {
        if mask < self.prefix || mask > 32 {
            return None;
        }
        let step = 1u64 << (32 - mask as u32);
        let offset = step.checked_mul(index as u64)?;
        if offset + step > self.size() {
            return None;
        }
        let base = u32::from(self.addr) as u64 + offset;
        Some(Ipv4Cidr {
            addr: Ipv4Addr::from(base as u32),
            prefix: mask,
        })
    }
}

impl FromStr for Ipv4Cidr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| format!("CIDR形式ではありません: {}", s))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| format!("無効なIPv4アドレス: {}", addr))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| format!("無効なプレフィックス長: {}", prefix))?;
        if prefix > 32 {
            return Err(format!("プレフィックス長が範囲外です: /{}", prefix));
        }
        Ok(Self { addr, prefix })
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// IPv4/IPv6 どちらも受け付けるCIDRブロック
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpCidr {
    pub addr: IpAddr,
    pub prefix: u8,
}

impl IpCidr {
    pub fn is_ipv6(&self) -> bool {
        self.addr.is_ipv6()
    }

    /// 全アドレスを含むブロック（/0）か
    pub fn is_any(&self) -> bool {
        self.prefix == 0
    }

    /// ホスト部が全て0か
    pub fn is_aligned(&self) -> bool {
        // ネットワーク部を左に押し出して残りを見る（/32, /128 は None）
        let shift = u32::from(self.prefix);
        match self.addr {
            IpAddr::V4(addr) => u32::from(addr).checked_shl(shift).unwrap_or(0) == 0,
            IpAddr::V6(addr) => u128::from(addr).checked_shl(shift).unwrap_or(0) == 0,
        }
    }
}

impl FromStr for IpCidr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| format!("CIDR形式ではありません: {}", s))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| format!("無効なIPアドレス: {}", addr))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| format!("無効なプレフィックス長: {}", prefix))?;
        let max = if addr.is_ipv6() { 128 } else { 32 };
        if prefix > max {
            return Err(format!("プレフィックス長が範囲外です: /{}", prefix));
        }
        Ok(Self { addr, prefix })
    }
}

impl fmt::Display for IpCidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}
