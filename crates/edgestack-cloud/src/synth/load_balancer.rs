//! Security groups, application load balancer, listener, target groups and rules

use super::StackBuilder;
use super::network::NetworkRefs;
use crate::error::Result;
use crate::template::Resource;
use crate::template::intrinsic::{get_att, reference};
use edgestack_core::{IngressSource, SubnetKind};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

pub(crate) const ALB_SECURITY_GROUP: &str = "AlbSG";
pub(crate) const SERVICE_SECURITY_GROUP: &str = "EcsSG";
const LISTENER: &str = "HttpListener";

#[derive(Debug, Clone)]
pub(crate) struct SecurityRefs {
    pub alb: String,
    pub services: String,
}

#[derive(Debug, Clone)]
pub(crate) struct LoadBalancerRefs {
    pub alb: String,
    /// Target group logical id per service name
    pub target_groups: HashMap<String, String>,
    /// Listener rule logical id per service name
    pub rules: HashMap<String, String>,
}

fn allow_all_egress() -> Value {
    json!([{
        "CidrIp": "0.0.0.0/0",
        "Description": "Allow all outbound traffic by default",
        "IpProtocol": "-1",
    }])
}

fn ingress_rule(source: &IngressSource, port: u16) -> Value {
    let mut rule = Map::new();
    match source {
        IngressSource::PrefixList(id) => {
            rule.insert("SourcePrefixListId".to_string(), json!(id));
        }
        IngressSource::Cidr(cidr) => {
            let key = match source.cidr() {
                Some(Ok(parsed)) if parsed.is_ipv6() => "CidrIpv6",
                _ => "CidrIp",
            };
            rule.insert(key.to_string(), json!(cidr));
        }
    }
    rule.insert("Description".to_string(), json!(source.description()));
    rule.insert("FromPort".to_string(), json!(port));
    rule.insert("IpProtocol".to_string(), json!("tcp"));
    rule.insert("ToPort".to_string(), json!(port));
    Value::Object(rule)
}

/// ALB security group (listener port from the configured source only) and the
/// task security group (service ports from the ALB only)
pub(crate) fn synth_security_groups(
    b: &mut StackBuilder<'_>,
    network: &NetworkRefs,
) -> Result<SecurityRefs> {
    let lb = b.stack.load_balancer.clone();

    let services = b.add(
        &[SERVICE_SECURITY_GROUP, "Resource"],
        Resource::new(
            "AWS::EC2::SecurityGroup",
            json!({
                "GroupDescription": "Allow ALB to reach ECS tasks",
                "SecurityGroupEgress": allow_all_egress(),
                "VpcId": reference(&network.vpc),
            }),
        ),
    )?;

    let alb = b.add(
        &[ALB_SECURITY_GROUP, "Resource"],
        Resource::new(
            "AWS::EC2::SecurityGroup",
            json!({
                "GroupDescription": "Allow HTTP from internet",
                "SecurityGroupEgress": allow_all_egress(),
                "SecurityGroupIngress": [ingress_rule(&lb.ingress, lb.port)],
                "VpcId": reference(&network.vpc),
            }),
        ),
    )?;

    let services_spec = b.stack.services.clone();
    for service in &services_spec {
        let construct = format!("from{}{}", ALB_SECURITY_GROUP, service.port);
        b.add(
            &[SERVICE_SECURITY_GROUP, &construct],
            Resource::new(
                "AWS::EC2::SecurityGroupIngress",
                json!({
                    "Description": format!("ALB to {}", service.name.to_uppercase()),
                    "FromPort": service.port,
                    "GroupId": get_att(&services, "GroupId"),
                    "IpProtocol": "tcp",
                    "SourceSecurityGroupId": get_att(&alb, "GroupId"),
                    "ToPort": service.port,
                }),
            ),
        )?;
    }

    Ok(SecurityRefs { alb, services })
}

/// Load balancer in the public subnets, HTTP listener with a fixed-response
/// default action, and one target group plus path rule per service
pub(crate) fn synth_load_balancer(
    b: &mut StackBuilder<'_>,
    network: &NetworkRefs,
    security: &SecurityRefs,
) -> Result<LoadBalancerRefs> {
    let spec = b.stack.load_balancer.clone();

    let mut alb_resource = Resource::new(
        "AWS::ElasticLoadBalancingV2::LoadBalancer",
        json!({
            "LoadBalancerAttributes": [
                { "Key": "deletion_protection.enabled", "Value": "false" },
            ],
            "Scheme": "internet-facing",
            "SecurityGroups": [get_att(&security.alb, "GroupId")],
            "Subnets": network.subnet_refs(SubnetKind::Public),
            "Type": "application",
        }),
    );
    // The load balancer needs internet routes in place before it can be active
    for route in &network.public_routes {
        alb_resource = alb_resource.depends_on(route.clone());
    }
    let alb = b.add(&[&spec.id, "Resource"], alb_resource)?;

    let listener = b.add(
        &[&spec.id, LISTENER, "Resource"],
        Resource::new(
            "AWS::ElasticLoadBalancingV2::Listener",
            json!({
                "DefaultActions": [{
                    "FixedResponseConfig": {
                        "ContentType": spec.not_found.content_type,
                        "MessageBody": spec.not_found.body,
                        "StatusCode": spec.not_found.status_code.to_string(),
                    },
                    "Type": "fixed-response",
                }],
                "LoadBalancerArn": reference(&alb),
                "Port": spec.port,
                "Protocol": "HTTP",
            }),
        ),
    )?;

    let mut refs = LoadBalancerRefs {
        alb,
        target_groups: HashMap::new(),
        rules: HashMap::new(),
    };

    let services = b.stack.services.clone();
    for (index, service) in services.iter().enumerate() {
        let tg_construct = format!("TG{}", index + 1);
        let target_group = b.add(
            &[&tg_construct, "Resource"],
            Resource::new(
                "AWS::ElasticLoadBalancingV2::TargetGroup",
                json!({
                    "HealthCheckPath": service.health_check_path,
                    "Port": service.port,
                    "Protocol": "HTTP",
                    "TargetGroupAttributes": [
                        { "Key": "stickiness.enabled", "Value": "false" },
                    ],
                    "TargetType": "ip",
                    "VpcId": reference(&network.vpc),
                }),
            ),
        )?;

        let rule_construct = format!("{}Rule", service.construct_prefix());
        let rule = b.add(
            &[&spec.id, LISTENER, &rule_construct, "Resource"],
            Resource::new(
                "AWS::ElasticLoadBalancingV2::ListenerRule",
                json!({
                    "Actions": [{
                        "TargetGroupArn": reference(&target_group),
                        "Type": "forward",
                    }],
                    "Conditions": [{
                        "Field": "path-pattern",
                        "PathPatternConfig": { "Values": [service.path_pattern] },
                    }],
                    "ListenerArn": reference(&listener),
                    "Priority": service.priority,
                }),
            ),
        )?;

        refs.target_groups.insert(service.name.clone(), target_group);
        refs.rules.insert(service.name.clone(), rule);
    }

    Ok(refs)
}
