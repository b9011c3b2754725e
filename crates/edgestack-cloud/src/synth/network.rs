//! VPC, subnets, routing and gateways

use super::StackBuilder;
use crate::error::{CloudError, Result};
use crate::template::intrinsic::{get_att, reference};
use crate::template::Resource;
use edgestack_core::{Ipv4Cidr, MAX_AZS, SubnetKind};
use serde_json::{Value, json};
use std::collections::HashMap;

/// Logical ids produced by the network slice
#[derive(Debug, Clone, Default)]
pub(crate) struct NetworkRefs {
    pub vpc: String,
    /// Subnet logical ids per kind, in AZ order
    pub subnets: HashMap<SubnetKind, Vec<String>>,
    /// Default routes of the public subnets (internet connectivity)
    pub public_routes: Vec<String>,
}

impl NetworkRefs {
    /// `[{ "Ref": subnet }, ...]` for one subnet kind
    pub fn subnet_refs(&self, kind: SubnetKind) -> Value {
        Value::Array(
            self.subnets
                .get(&kind)
                .map(|ids| ids.iter().map(|id| reference(id)).collect())
                .unwrap_or_default(),
        )
    }
}

/// Availability zone names `<region>a`, `<region>b`, ...
///
/// Zone letters stop at `z`.
pub(crate) fn availability_zones(region: &str, count: u8) -> Vec<String> {
    ('a'..='z')
        .take(usize::from(count))
        .map(|letter| format!("{}{}", region, letter))
        .collect()
}

/// Hands out subnet blocks in order, aligning each to its own size
struct CidrAllocator {
    vpc: Ipv4Cidr,
    cursor: u64,
}

impl CidrAllocator {
    fn next(&mut self, mask: u8) -> Result<Ipv4Cidr> {
        let step = 1u64 << (32 - mask as u32);
        let aligned = self.cursor.div_ceil(step) * step;
        let index = u32::try_from(aligned / step)
            .map_err(|_| CloudError::InvalidConfig(format!("subnet index overflow in {}", self.vpc)))?;
        let cidr = self.vpc.nth_subnet(mask, index).ok_or_else(|| {
            CloudError::InvalidConfig(format!(
                "no room left for a /{} subnet in {}",
                mask, self.vpc
            ))
        })?;
        self.cursor = aligned + step;
        Ok(cidr)
    }
}

fn subnet_type_tag(kind: SubnetKind) -> &'static str {
    match kind {
        SubnetKind::Public => "Public",
        SubnetKind::Private => "Private",
        SubnetKind::Isolated => "Isolated",
    }
}

pub(crate) fn synth_network(b: &mut StackBuilder<'_>) -> Result<NetworkRefs> {
    let network = b.stack.network.clone();
    let vpc_cidr: Ipv4Cidr = network
        .cidr
        .parse()
        .map_err(CloudError::InvalidConfig)?;
    if network.max_azs == 0 || network.max_azs > MAX_AZS {
        return Err(CloudError::InvalidConfig(format!(
            "max_azs must be between 1 and {}, got {}",
            MAX_AZS, network.max_azs
        )));
    }
    let azs = availability_zones(b.region(), network.max_azs);

    let vpc = b.add(
        &[&network.id, "Resource"],
        Resource::new(
            "AWS::EC2::VPC",
            json!({
                "CidrBlock": network.cidr,
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "InstanceTenancy": "default",
                "Tags": [{ "Key": "Name", "Value": b.name_tag(&[&network.id]) }],
            }),
        ),
    )?;

    let mut refs = NetworkRefs {
        vpc: vpc.clone(),
        ..Default::default()
    };

    let has_public = network.subnet_group(SubnetKind::Public).is_some();
    let gateway_attachment = if has_public {
        let igw = b.add(
            &[&network.id, "IGW"],
            Resource::new(
                "AWS::EC2::InternetGateway",
                json!({
                    "Tags": [{ "Key": "Name", "Value": b.name_tag(&[&network.id]) }],
                }),
            ),
        )?;
        let attachment = b.add(
            &[&network.id, "VPCGW"],
            Resource::new(
                "AWS::EC2::VPCGatewayAttachment",
                json!({
                    "InternetGatewayId": reference(&igw),
                    "VpcId": reference(&vpc),
                }),
            ),
        )?;
        Some((igw, attachment))
    } else {
        None
    };

    let mut allocator = CidrAllocator {
        vpc: vpc_cidr,
        cursor: 0,
    };
    let mut nat_gateways: Vec<String> = Vec::new();
    // Private subnets route through NAT gateways of the public ones, so public
    // groups are emitted first.
    let mut groups = network.subnets.clone();
    groups.sort_by_key(|g| g.kind != SubnetKind::Public);

    for group in &groups {
        for (index, az) in azs.iter().enumerate() {
            let construct = format!("{}Subnet{}", group.name, index + 1);
            let cidr = allocator.next(group.cidr_mask)?;

            let subnet = b.add(
                &[&network.id, &construct, "Subnet"],
                Resource::new(
                    "AWS::EC2::Subnet",
                    json!({
                        "AvailabilityZone": az,
                        "CidrBlock": cidr.to_string(),
                        "MapPublicIpOnLaunch": group.kind == SubnetKind::Public,
                        "Tags": [
                            { "Key": "aws-cdk:subnet-name", "Value": group.name },
                            { "Key": "aws-cdk:subnet-type", "Value": subnet_type_tag(group.kind) },
                            { "Key": "Name", "Value": b.name_tag(&[&network.id, &construct]) },
                        ],
                        "VpcId": reference(&vpc),
                    }),
                ),
            )?;

            let route_table = b.add(
                &[&network.id, &construct, "RouteTable"],
                Resource::new(
                    "AWS::EC2::RouteTable",
                    json!({
                        "Tags": [{ "Key": "Name", "Value": b.name_tag(&[&network.id, &construct]) }],
                        "VpcId": reference(&vpc),
                    }),
                ),
            )?;

            let association = b.add(
                &[&network.id, &construct, "RouteTableAssociation"],
                Resource::new(
                    "AWS::EC2::SubnetRouteTableAssociation",
                    json!({
                        "RouteTableId": reference(&route_table),
                        "SubnetId": reference(&subnet),
                    }),
                ),
            )?;

            match group.kind {
                SubnetKind::Public => {
                    let Some((igw, attachment)) = &gateway_attachment else {
                        continue;
                    };
                    let route = b.add(
                        &[&network.id, &construct, "DefaultRoute"],
                        Resource::new(
                            "AWS::EC2::Route",
                            json!({
                                "DestinationCidrBlock": "0.0.0.0/0",
                                "GatewayId": reference(igw),
                                "RouteTableId": reference(&route_table),
                            }),
                        )
                        .depends_on(attachment.clone()),
                    )?;

                    if (index as u8) < network.nat_gateways {
                        let eip = b.add(
                            &[&network.id, &construct, "EIP"],
                            Resource::new(
                                "AWS::EC2::EIP",
                                json!({
                                    "Domain": "vpc",
                                    "Tags": [{ "Key": "Name", "Value": b.name_tag(&[&network.id, &construct]) }],
                                }),
                            ),
                        )?;
                        let nat = b.add(
                            &[&network.id, &construct, "NATGateway"],
                            Resource::new(
                                "AWS::EC2::NatGateway",
                                json!({
                                    "AllocationId": get_att(&eip, "AllocationId"),
                                    "SubnetId": reference(&subnet),
                                    "Tags": [{ "Key": "Name", "Value": b.name_tag(&[&network.id, &construct]) }],
                                }),
                            )
                            .depends_on(route.clone())
                            .depends_on(association.clone()),
                        )?;
                        nat_gateways.push(nat);
                    }
                    refs.public_routes.push(route);
                }
                SubnetKind::Private => {
                    if nat_gateways.is_empty() {
                        return Err(CloudError::InvalidConfig(format!(
                            "private subnet group {} needs at least one NAT gateway",
                            group.name
                        )));
                    }
                    let nat = &nat_gateways[index % nat_gateways.len()];
                    b.add(
                        &[&network.id, &construct, "DefaultRoute"],
                        Resource::new(
                            "AWS::EC2::Route",
                            json!({
                                "DestinationCidrBlock": "0.0.0.0/0",
                                "NatGatewayId": reference(nat),
                                "RouteTableId": reference(&route_table),
                            }),
                        ),
                    )?;
                }
                SubnetKind::Isolated => {}
            }

            refs.subnets.entry(group.kind).or_default().push(subnet);
        }
    }

    Ok(refs)
}
