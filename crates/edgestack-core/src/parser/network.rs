//! network ノードのパース

use super::{child_key, first_integer, first_string, prop_integer, prop_string};
use crate::error::{Result, StackError};
use crate::model::{NetworkSpec, SubnetKind, SubnetSpec};
use kdl::KdlNode;

/// network ノードをパース
///
/// `subnet` を1つでも指定した場合、サブネットグループは宣言されたものだけになります。
pub fn parse_network(node: &KdlNode, base: NetworkSpec) -> Result<NetworkSpec> {
    let mut network = base;
    if let Some(id) = first_string(node) {
        network.id = id;
    }

    let mut subnets = Vec::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child_key(child).as_str() {
                "cidr" => {
                    if let Some(cidr) = first_string(child) {
                        network.cidr = cidr;
                    }
                }
                "max-azs" => {
                    network.max_azs = first_integer(child, "network.max-azs")?;
                }
                "nat-gateways" => {
                    network.nat_gateways = first_integer(child, "network.nat-gateways")?;
                }
                "subnet" => {
                    subnets.push(parse_subnet(child)?);
                }
                _ => {}
            }
        }
    }

    if !subnets.is_empty() {
        network.subnets = subnets;
    }

    Ok(network)
}

/// subnet ノードをパース
///
/// 例: `subnet "Public" type="public" cidr-mask=24`
fn parse_subnet(node: &KdlNode) -> Result<SubnetSpec> {
    let name = first_string(node)
        .ok_or_else(|| StackError::InvalidConfig("subnet requires a name".to_string()))?;

    let kind = match prop_string(node, "type") {
        Some(s) => SubnetKind::parse(&s).ok_or_else(|| {
            StackError::InvalidConfig(format!("subnet '{}': unknown type '{}'", name, s))
        })?,
        None => SubnetKind::Public,
    };

    let cidr_mask = match prop_integer(node, "cidr-mask", "subnet.cidr-mask")? {
        Some(mask) => mask,
        None => prop_integer(node, "cidr_mask", "subnet.cidr_mask")?.unwrap_or(24),
    };

    Ok(SubnetSpec {
        name,
        kind,
        cidr_mask,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(kdl: &str) -> kdl::KdlDocument {
        kdl.parse().unwrap()
    }

    #[test]
    fn test_parse_network() {
        let doc = node(
            r#"
            network "MainVpc" {
                cidr "10.10.0.0/16"
                max-azs 3
                nat-gateways 1
                subnet "Public" type="public" cidr-mask=24
                subnet "App" type="private" cidr-mask=22
            }
        "#,
        );
        let network =
            parse_network(doc.nodes().first().unwrap(), NetworkSpec::default()).unwrap();

        assert_eq!(network.id, "MainVpc");
        assert_eq!(network.cidr, "10.10.0.0/16");
        assert_eq!(network.max_azs, 3);
        assert_eq!(network.nat_gateways, 1);
        assert_eq!(network.subnets.len(), 2);
        assert_eq!(network.subnets[1].kind, SubnetKind::Private);
        assert_eq!(network.subnets[1].cidr_mask, 22);
    }

    #[test]
    fn test_parse_network_keeps_defaults() {
        let doc = node(r#"network { max_azs 2 }"#);
        let network =
            parse_network(doc.nodes().first().unwrap(), NetworkSpec::default()).unwrap();

        assert_eq!(network, NetworkSpec::default());
    }

    #[test]
    fn test_parse_subnet_unknown_type() {
        let doc = node(r#"network { subnet "Dmz" type="dmz" }"#);
        let result = parse_network(doc.nodes().first().unwrap(), NetworkSpec::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_max_azs_type_mismatch() {
        let doc = node(r#"network { max-azs "two" }"#);
        let result = parse_network(doc.nodes().first().unwrap(), NetworkSpec::default());
        assert!(matches!(result, Err(StackError::InvalidConfig(_))));
    }
}
