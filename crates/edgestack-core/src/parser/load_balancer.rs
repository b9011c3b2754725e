//! load-balancer ノードのパース

use super::{child_key, first_integer, first_string, prop_integer, prop_string};
use crate::error::Result;
use crate::model::{IngressSource, LoadBalancerSpec};
use kdl::KdlNode;

/// load-balancer ノードをパース
pub fn parse_load_balancer(node: &KdlNode, base: LoadBalancerSpec) -> Result<LoadBalancerSpec> {
    let mut lb = base;
    if let Some(id) = first_string(node) {
        lb.id = id;
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child_key(child).as_str() {
                "port" => {
                    lb.port = first_integer(child, "load-balancer.port")?;
                }
                "ingress-prefix-list" => {
                    if let Some(id) = first_string(child) {
                        lb.ingress = IngressSource::PrefixList(id);
                    }
                }
                "ingress-cidr" => {
                    if let Some(cidr) = first_string(child) {
                        lb.ingress = IngressSource::Cidr(cidr);
                    }
                }
                "not-found" | "default-response" => {
                    // not-found status=404 content-type="text/plain" body="Not Found"
                    if let Some(status) = prop_integer(child, "status", "not-found.status")? {
                        lb.not_found.status_code = status;
                    }
                    if let Some(content_type) = prop_string(child, "content-type") {
                        lb.not_found.content_type = content_type;
                    }
                    if let Some(body) = prop_string(child, "body") {
                        lb.not_found.body = body;
                    }
                }
                _ => {}
            }
        }
    }

    Ok(lb)
}
