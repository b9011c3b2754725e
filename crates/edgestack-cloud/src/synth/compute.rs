//! ECS cluster, execution role, task definitions and Fargate services

use super::StackBuilder;
use super::load_balancer::{LoadBalancerRefs, SecurityRefs};
use super::network::NetworkRefs;
use crate::error::{CloudError, Result};
use crate::template::intrinsic::{arn, get_att, reference, sub};
use crate::template::{DeletionPolicy, Resource};
use edgestack_core::ServiceSpec;
use serde_json::{Value, json};

pub(crate) const EXECUTION_ROLE: &str = "EcsExecRole";
const EXECUTION_POLICY_ARN: &str = "iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy";
const TASKS_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";

const ECR_PULL_ACTIONS: &[&str] = &[
    "ecr:BatchCheckLayerAvailability",
    "ecr:BatchGetImage",
    "ecr:GetDownloadUrlForLayer",
];

fn assume_role_policy() -> Value {
    json!({
        "Statement": [{
            "Action": "sts:AssumeRole",
            "Effect": "Allow",
            "Principal": { "Service": TASKS_PRINCIPAL },
        }],
        "Version": "2012-10-17",
    })
}

pub(crate) fn synth_cluster(b: &mut StackBuilder<'_>) -> Result<String> {
    let id = b.stack.cluster.id.clone();
    b.add(&[&id, "Resource"], Resource::new("AWS::ECS::Cluster", Value::Null))
}

/// Container image reference; falls back to `Fn::Sub` when the account is
/// only known at deploy time
fn image_uri(b: &StackBuilder<'_>, service: &ServiceSpec) -> Value {
    match b.stack.account() {
        Some(account) => json!(service.image.ecr_uri(account, b.region())),
        None => sub(&format!(
            "${{AWS::AccountId}}.dkr.ecr.{}.${{AWS::URLSuffix}}/{}:{}",
            b.region(),
            service.image.repository,
            service.image.tag
        )),
    }
}

fn repository_arn(b: &StackBuilder<'_>, service: &ServiceSpec) -> Value {
    arn(vec![
        json!(format!("ecr:{}:", b.region())),
        b.account(),
        json!(format!(":repository/{}", service.image.repository)),
    ])
}

/// Execution role, task role, log group, task definition and service for
/// every declared service
pub(crate) fn synth_services(
    b: &mut StackBuilder<'_>,
    network: &NetworkRefs,
    security: &SecurityRefs,
    cluster: &str,
    lb: &LoadBalancerRefs,
) -> Result<()> {
    let services = b.stack.services.clone();

    let execution_role = b.add(
        &[EXECUTION_ROLE, "Resource"],
        Resource::new(
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": assume_role_policy(),
                "ManagedPolicyArns": [arn(vec![json!(EXECUTION_POLICY_ARN)])],
            }),
        ),
    )?;

    let mut log_groups = Vec::new();
    let mut task_definitions = Vec::new();

    for service in &services {
        let prefix = service.construct_prefix();
        let task = format!("{}Task", prefix);
        let container = format!("{}Container", prefix);

        let task_role = b.add(
            &[&task, "TaskRole", "Resource"],
            Resource::new(
                "AWS::IAM::Role",
                json!({ "AssumeRolePolicyDocument": assume_role_policy() }),
            ),
        )?;

        let log_group = b.add(
            &[&task, &container, "LogGroup", "Resource"],
            Resource::new("AWS::Logs::LogGroup", Value::Null)
                .removal_policy(DeletionPolicy::Retain),
        )?;

        let task_id = super::logical_id(&[&task, "Resource"]);
        let task_definition = b.add(
            &[&task, "Resource"],
            Resource::new(
                "AWS::ECS::TaskDefinition",
                json!({
                    "ContainerDefinitions": [{
                        "Essential": true,
                        "Image": image_uri(b, service),
                        "LogConfiguration": {
                            "LogDriver": "awslogs",
                            "Options": {
                                "awslogs-group": reference(&log_group),
                                "awslogs-region": b.region(),
                                "awslogs-stream-prefix": service.log_stream_prefix,
                            },
                        },
                        "Name": container,
                        "PortMappings": [{
                            "ContainerPort": service.port,
                            "Protocol": "tcp",
                        }],
                    }],
                    "Cpu": service.cpu.to_string(),
                    "ExecutionRoleArn": get_att(&execution_role, "Arn"),
                    "Family": format!("{}{}", b.stack.name, task_id),
                    "Memory": service.memory_mib.to_string(),
                    "NetworkMode": "awsvpc",
                    "RequiresCompatibilities": ["FARGATE"],
                    "TaskRoleArn": get_att(&task_role, "Arn"),
                }),
            ),
        )?;

        let target_group = lb.target_groups.get(&service.name).ok_or_else(|| {
            CloudError::ResourceNotFound(format!("target group for service {}", service.name))
        })?;
        let rule = lb.rules.get(&service.name).ok_or_else(|| {
            CloudError::ResourceNotFound(format!("listener rule for service {}", service.name))
        })?;

        b.add(
            &[&format!("{}Service", prefix), "Service"],
            Resource::new(
                "AWS::ECS::Service",
                json!({
                    "Cluster": reference(cluster),
                    "DeploymentConfiguration": {
                        "MaximumPercent": 200,
                        "MinimumHealthyPercent": 50,
                    },
                    "DesiredCount": service.desired_count,
                    "EnableECSManagedTags": false,
                    "HealthCheckGracePeriodSeconds": 60,
                    "LaunchType": "FARGATE",
                    "LoadBalancers": [{
                        "ContainerName": container,
                        "ContainerPort": service.port,
                        "TargetGroupArn": reference(target_group),
                    }],
                    "NetworkConfiguration": {
                        "AwsvpcConfiguration": {
                            "AssignPublicIp": if service.assign_public_ip { "ENABLED" } else { "DISABLED" },
                            "SecurityGroups": [get_att(&security.services, "GroupId")],
                            "Subnets": network.subnet_refs(service.subnets),
                        },
                    },
                    "TaskDefinition": reference(&task_definition),
                }),
            )
            .depends_on(rule.clone())
            .depends_on(task_role),
        )?;

        log_groups.push(log_group);
        task_definitions.push(task_definition);
    }

    let mut statements = Vec::new();
    statements.push(json!({
        "Action": ECR_PULL_ACTIONS,
        "Effect": "Allow",
        "Resource": services.iter().map(|s| repository_arn(b, s)).collect::<Vec<_>>(),
    }));
    statements.push(json!({
        "Action": "ecr:GetAuthorizationToken",
        "Effect": "Allow",
        "Resource": "*",
    }));
    statements.push(json!({
        "Action": ["logs:CreateLogStream", "logs:PutLogEvents"],
        "Effect": "Allow",
        "Resource": log_groups.iter().map(|id| get_att(id, "Arn")).collect::<Vec<_>>(),
    }));

    let policy_id = super::logical_id(&[EXECUTION_ROLE, "DefaultPolicy", "Resource"]);
    b.add(
        &[EXECUTION_ROLE, "DefaultPolicy", "Resource"],
        Resource::new(
            "AWS::IAM::Policy",
            json!({
                "PolicyDocument": {
                    "Statement": statements,
                    "Version": "2012-10-17",
                },
                "PolicyName": policy_id,
                "Roles": [reference(&execution_role)],
            }),
        ),
    )?;

    // Tasks cannot start until the execution role can pull images and write logs
    for task_definition in task_definitions {
        if let Some(resource) = b.template.resources.get_mut(&task_definition) {
            resource.depends_on.push(policy_id.clone());
            resource.depends_on.sort();
        }
    }

    Ok(())
}
