//! Deterministic physical ids and attributes
//!
//! Every id is derived from `(account, region, stack, logical id)`, so
//! deploying the same template twice yields the same names.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

const UPPER_ALNUM: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const LOWER_ALNUM: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const MIXED_ALNUM: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const DIGITS: &[u8] = b"0123456789";
const HEX: &[u8] = b"0123456789abcdef";

const MAX_BUCKET_NAME_LEN: usize = 63;
const MAX_NAME_LEN: usize = 64;

/// Canonical hosted zone id of application load balancers in a region
///
/// Regions missing from the table get a placeholder id.
fn elb_hosted_zone(region: &str) -> &'static str {
    match region {
        "us-east-1" => "Z35SXDOTRQ7X7K",
        "us-east-2" => "Z3AADJGX6KTTL2",
        "us-west-1" => "Z368ELLRRE2KJ0",
        "us-west-2" => "Z1H1FL5HABSF5",
        "ca-central-1" => "ZQSVJUPU6J1EY",
        "eu-west-1" => "Z32O12XQLNTSW2",
        "eu-west-2" => "ZHURV8PSTC4K8",
        "eu-central-1" => "Z215JYRZR1TBD5",
        "ap-northeast-1" => "Z14GRHDCWA56QT",
        "ap-northeast-2" => "ZWKZPGTI48KDX",
        "ap-southeast-1" => "Z1LMS91P8CMLE5",
        "ap-southeast-2" => "Z1GM3OXH4ZPM65",
        "ap-south-1" => "ZP97RAFLXTNZK",
        "sa-east-1" => "Z2P70J7HTTTPLU",
        _ => "ZLOCALELBZONE",
    }
}

/// Deployment target the ids are scoped to
#[derive(Debug, Clone)]
pub struct IdContext {
    pub account: String,
    pub region: String,
    pub stack: String,
}

/// Physical id (the `Ref` value) plus `Fn::GetAtt` attributes
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalResource {
    pub id: String,
    pub attributes: BTreeMap<String, Value>,
}

impl PhysicalResource {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    fn attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}

impl IdContext {
    fn digest(&self, logical_id: &str, salt: &str) -> Vec<u8> {
        let input = format!(
            "{}/{}/{}/{}#{}",
            self.account, self.region, self.stack, logical_id, salt
        );
        Sha256::digest(input.as_bytes()).to_vec()
    }

    fn chars(&self, logical_id: &str, salt: &str, charset: &[u8], len: usize) -> String {
        self.digest(logical_id, salt)
            .iter()
            .cycle()
            .take(len)
            .map(|b| charset[*b as usize % charset.len()] as char)
            .collect()
    }

    fn hex(&self, logical_id: &str, salt: &str, len: usize) -> String {
        self.chars(logical_id, salt, HEX, len)
    }

    /// `<stack>-<logical>-<suffix>` capped to `max` characters
    fn stack_name(&self, logical_id: &str, suffix: &str, max: usize) -> String {
        let head_len = max.saturating_sub(suffix.len() + 2);
        let mut head = format!("{}-{}", self.stack, logical_id);
        head.truncate(head_len);
        format!("{}-{}", head, suffix)
    }

    fn arn(&self, service: &str, rest: &str) -> String {
        format!("arn:aws:{}:{}:{}:{}", service, self.region, self.account, rest)
    }

    fn short(value: &str, len: usize) -> String {
        value.chars().filter(|c| c.is_ascii_alphanumeric()).take(len).collect()
    }

    /// Physical identity of a resource
    pub fn assign(&self, logical_id: &str, resource_type: &str, properties: &Value) -> PhysicalResource {
        let prop = |key: &str| properties.get(key).and_then(|v| v.as_str()).map(str::to_string);

        match resource_type {
            "AWS::EC2::VPC" => {
                let id = format!("vpc-{}", self.hex(logical_id, "id", 17));
                PhysicalResource::new(&id)
                    .attr("VpcId", id.clone())
                    .attr("CidrBlock", prop("CidrBlock").unwrap_or_default())
                    .attr(
                        "DefaultSecurityGroup",
                        format!("sg-{}", self.hex(logical_id, "default-sg", 17)),
                    )
            }
            "AWS::EC2::Subnet" => {
                let id = format!("subnet-{}", self.hex(logical_id, "id", 17));
                PhysicalResource::new(&id)
                    .attr("SubnetId", id.clone())
                    .attr("AvailabilityZone", prop("AvailabilityZone").unwrap_or_default())
            }
            "AWS::EC2::RouteTable" => {
                let id = format!("rtb-{}", self.hex(logical_id, "id", 17));
                PhysicalResource::new(&id).attr("RouteTableId", id.clone())
            }
            "AWS::EC2::SubnetRouteTableAssociation" => {
                PhysicalResource::new(format!("rtbassoc-{}", self.hex(logical_id, "id", 17)))
            }
            "AWS::EC2::InternetGateway" => {
                let id = format!("igw-{}", self.hex(logical_id, "id", 17));
                PhysicalResource::new(&id).attr("InternetGatewayId", id.clone())
            }
            "AWS::EC2::Route" | "AWS::EC2::VPCGatewayAttachment" => {
                PhysicalResource::new(format!("{}-{}", Self::short(logical_id, 12), self.hex(logical_id, "id", 8)))
            }
            "AWS::EC2::EIP" => {
                let digest = self.digest(logical_id, "ip");
                let ip = format!("52.{}.{}.{}", digest[0], digest[1], digest[2].max(1));
                PhysicalResource::new(&ip)
                    .attr("PublicIp", ip.clone())
                    .attr("AllocationId", format!("eipalloc-{}", self.hex(logical_id, "alloc", 17)))
            }
            "AWS::EC2::NatGateway" => {
                let id = format!("nat-{}", self.hex(logical_id, "id", 17));
                PhysicalResource::new(&id).attr("NatGatewayId", id.clone())
            }
            "AWS::EC2::SecurityGroup" => {
                let id = format!("sg-{}", self.hex(logical_id, "id", 17));
                PhysicalResource::new(&id).attr("GroupId", id.clone())
            }
            "AWS::EC2::SecurityGroupIngress" => {
                PhysicalResource::new(format!("sgr-{}", self.hex(logical_id, "id", 17)))
            }
            "AWS::ECS::Cluster" => {
                let name = self.stack_name(logical_id, &self.chars(logical_id, "name", MIXED_ALNUM, 12), 255);
                PhysicalResource::new(&name)
                    .attr("Arn", self.arn("ecs", &format!("cluster/{}", name)))
            }
            "AWS::IAM::Role" => {
                let name = self.stack_name(logical_id, &self.chars(logical_id, "name", MIXED_ALNUM, 12), MAX_NAME_LEN);
                PhysicalResource::new(&name)
                    .attr("Arn", format!("arn:aws:iam::{}:role/{}", self.account, name))
                    .attr("RoleId", format!("AROA{}", self.chars(logical_id, "role", UPPER_ALNUM, 17)))
            }
            "AWS::IAM::Policy" => PhysicalResource::new(self.stack_name(
                logical_id,
                &self.chars(logical_id, "name", UPPER_ALNUM, 12),
                MAX_NAME_LEN,
            )),
            "AWS::Logs::LogGroup" => {
                let name = self.stack_name(logical_id, &self.chars(logical_id, "name", MIXED_ALNUM, 12), 512);
                PhysicalResource::new(&name)
                    .attr("Arn", self.arn("logs", &format!("log-group:{}:*", name)))
            }
            "AWS::ECS::TaskDefinition" => {
                let family = prop("Family").unwrap_or_else(|| format!("{}{}", self.stack, logical_id));
                let arn = self.arn("ecs", &format!("task-definition/{}:1", family));
                PhysicalResource::new(&arn).attr("TaskDefinitionArn", arn.clone())
            }
            "AWS::ECS::Service" => {
                let name = self.stack_name(logical_id, &self.chars(logical_id, "name", MIXED_ALNUM, 12), 255);
                let arn = self.arn("ecs", &format!("service/{}", name));
                PhysicalResource::new(&arn)
                    .attr("Name", name)
                    .attr("ServiceArn", arn.clone())
            }
            "AWS::ElasticLoadBalancingV2::LoadBalancer" => {
                let name = format!(
                    "{}-{}-{}",
                    Self::short(&self.stack, 5),
                    Self::short(logical_id, 5),
                    self.chars(logical_id, "name", MIXED_ALNUM, 12)
                );
                let full_name = format!("app/{}/{}", name, self.hex(logical_id, "arn", 16));
                let dns = format!(
                    "{}-{}.{}.elb.amazonaws.com",
                    name,
                    self.chars(logical_id, "dns", DIGITS, 10),
                    self.region
                );
                let arn = self.arn("elasticloadbalancing", &format!("loadbalancer/{}", full_name));
                PhysicalResource::new(&arn)
                    .attr("LoadBalancerArn", arn.clone())
                    .attr("LoadBalancerName", name)
                    .attr("LoadBalancerFullName", full_name)
                    .attr("DNSName", dns)
                    .attr("CanonicalHostedZoneID", elb_hosted_zone(&self.region))
            }
            "AWS::ElasticLoadBalancingV2::Listener" => {
                let arn = self.arn(
                    "elasticloadbalancing",
                    &format!("listener/app/{}/{}", Self::short(logical_id, 16), self.hex(logical_id, "arn", 16)),
                );
                PhysicalResource::new(&arn).attr("ListenerArn", arn.clone())
            }
            "AWS::ElasticLoadBalancingV2::ListenerRule" => {
                let arn = self.arn(
                    "elasticloadbalancing",
                    &format!("listener-rule/app/{}/{}", Self::short(logical_id, 16), self.hex(logical_id, "arn", 16)),
                );
                PhysicalResource::new(&arn).attr("RuleArn", arn.clone())
            }
            "AWS::ElasticLoadBalancingV2::TargetGroup" => {
                let name = format!(
                    "{}-{}-{}",
                    Self::short(&self.stack, 5),
                    Self::short(logical_id, 5),
                    self.chars(logical_id, "name", UPPER_ALNUM, 12)
                );
                let full_name = format!("targetgroup/{}/{}", name, self.hex(logical_id, "arn", 16));
                let arn = self.arn("elasticloadbalancing", &full_name);
                PhysicalResource::new(&arn)
                    .attr("TargetGroupArn", arn.clone())
                    .attr("TargetGroupName", name)
                    .attr("TargetGroupFullName", full_name)
            }
            "AWS::S3::Bucket" => {
                let name = self
                    .stack_name(logical_id, &self.chars(logical_id, "name", LOWER_ALNUM, 12), MAX_BUCKET_NAME_LEN)
                    .to_lowercase();
                PhysicalResource::new(&name)
                    .attr("Arn", format!("arn:aws:s3:::{}", name))
                    .attr("DomainName", format!("{}.s3.amazonaws.com", name))
                    .attr(
                        "RegionalDomainName",
                        format!("{}.s3.{}.amazonaws.com", name, self.region),
                    )
            }
            "AWS::CloudFront::OriginAccessControl" => {
                let id = format!("E{}", self.chars(logical_id, "id", UPPER_ALNUM, 13));
                PhysicalResource::new(&id).attr("Id", id.clone())
            }
            "AWS::CloudFront::Distribution" => {
                let id = format!("E{}", self.chars(logical_id, "id", UPPER_ALNUM, 13));
                let domain = format!("d{}.cloudfront.net", self.chars(logical_id, "domain", LOWER_ALNUM, 13));
                PhysicalResource::new(&id)
                    .attr("Id", id.clone())
                    .attr("DomainName", domain)
            }
            _ => PhysicalResource::new(self.stack_name(
                logical_id,
                &self.chars(logical_id, "name", MIXED_ALNUM, 12),
                255,
            )),
        }
    }
}
