//! Static asset bucket, CDN distribution and the bucket deployment
//!
//! The bucket stays private: the distribution reads it through an origin
//! access control and the bucket policy only grants `s3:GetObject` to that
//! one distribution. Service path patterns get their own cache behaviors that
//! forward everything to the load balancer without caching.

use super::StackBuilder;
use super::load_balancer::LoadBalancerRefs;
use crate::asset::StagedAsset;
use crate::error::Result;
use crate::template::intrinsic::{arn, get_att, reference, sub};
use crate::template::{DeletionPolicy, Resource};
use serde_json::{Value, json};

/// Managed cache policy `CachingOptimized`
pub const CACHING_OPTIMIZED: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";
/// Managed cache policy `CachingDisabled`
pub const CACHING_DISABLED: &str = "4135ea2d-6df8-44a3-9df3-4b5a84be39ad";
/// Managed origin request policy `AllViewer`
pub const ALL_VIEWER: &str = "216adef6-5c7f-47e4-b989-5492eafa07d3";

pub const AUTO_DELETE_TAG: &str = "aws-cdk:auto-delete-objects";
pub const AUTO_DELETE_RESOURCE_TYPE: &str = "Custom::S3AutoDeleteObjects";
pub const BUCKET_DEPLOYMENT_RESOURCE_TYPE: &str = "Custom::CDKBucketDeployment";

const AUTO_DELETE_FUNCTION: &str = "edgestack-auto-delete-objects";
const BUCKET_DEPLOYMENT_FUNCTION: &str = "edgestack-bucket-deployment";
/// Bucket holding staged asset archives, per account and region
pub const ASSET_BUCKET_PATTERN: &str = "edgestack-assets-${AWS::AccountId}-${AWS::Region}";

const ALL_METHODS: &[&str] = &["GET", "HEAD", "OPTIONS", "PUT", "PATCH", "POST", "DELETE"];
const MAX_OAC_NAME_LEN: usize = 64;

#[derive(Debug, Clone)]
pub(crate) struct FrontendRefs {
    pub distribution: String,
}

fn function_token(function: &str) -> Value {
    sub(&format!(
        "arn:${{AWS::Partition}}:lambda:${{AWS::Region}}:${{AWS::AccountId}}:function:{}",
        function
    ))
}

fn oac_name(stack: &str, construct: &str) -> String {
    let mut name = format!("{}{}", stack, construct);
    name.retain(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    name.truncate(MAX_OAC_NAME_LEN);
    name
}

fn proxied_behavior(path_pattern: &str, origin_id: &str) -> Value {
    json!({
        "AllowedMethods": ALL_METHODS,
        "CachePolicyId": CACHING_DISABLED,
        "Compress": true,
        "OriginRequestPolicyId": ALL_VIEWER,
        "PathPattern": path_pattern,
        "TargetOriginId": origin_id,
        "ViewerProtocolPolicy": "allow-all",
    })
}

pub(crate) fn synth_frontend(
    b: &mut StackBuilder<'_>,
    lb: &LoadBalancerRefs,
    asset: Option<&StagedAsset>,
) -> Result<FrontendRefs> {
    let spec = b.stack.frontend.clone();
    let stack_name = b.stack.name.clone();

    let mut bucket_tags = Vec::new();
    if spec.auto_delete_objects {
        bucket_tags.push(json!({ "Key": AUTO_DELETE_TAG, "Value": "true" }));
    }
    let bucket = b.add(
        &[&spec.bucket_id, "Resource"],
        Resource::new(
            "AWS::S3::Bucket",
            json!({
                "PublicAccessBlockConfiguration": {
                    "BlockPublicAcls": true,
                    "BlockPublicPolicy": true,
                    "IgnorePublicAcls": true,
                    "RestrictPublicBuckets": true,
                },
                "Tags": bucket_tags,
            }),
        )
        .removal_policy(DeletionPolicy::Delete),
    )?;

    let oac = b.add(
        &[&spec.distribution_id, "Origin1", "S3OriginAccessControl", "Resource"],
        Resource::new(
            "AWS::CloudFront::OriginAccessControl",
            json!({
                "OriginAccessControlConfig": {
                    "Name": oac_name(&stack_name, &format!("{}Origin1S3OriginAccessControl", spec.distribution_id)),
                    "OriginAccessControlOriginType": "s3",
                    "SigningBehavior": "always",
                    "SigningProtocol": "sigv4",
                },
            }),
        ),
    )?;

    let s3_origin = format!("{}{}Origin1", stack_name, spec.distribution_id);
    let alb_origin = format!("{}{}Origin2", stack_name, spec.distribution_id);

    let behaviors: Vec<Value> = b
        .stack
        .services
        .iter()
        .map(|service| proxied_behavior(&service.path_pattern, &alb_origin))
        .collect();

    let distribution = b.add(
        &[&spec.distribution_id, "Resource"],
        Resource::new(
            "AWS::CloudFront::Distribution",
            json!({
                "DistributionConfig": {
                    "CacheBehaviors": behaviors,
                    "DefaultCacheBehavior": {
                        "AllowedMethods": ["GET", "HEAD"],
                        "CachePolicyId": CACHING_OPTIMIZED,
                        "Compress": true,
                        "TargetOriginId": s3_origin,
                        "ViewerProtocolPolicy": "allow-all",
                    },
                    "DefaultRootObject": spec.default_root_object,
                    "Enabled": true,
                    "HttpVersion": "http2",
                    "IPV6Enabled": true,
                    "Origins": [
                        {
                            "DomainName": get_att(&bucket, "RegionalDomainName"),
                            "Id": s3_origin,
                            "OriginAccessControlId": get_att(&oac, "Id"),
                            "S3OriginConfig": { "OriginAccessIdentity": "" },
                        },
                        {
                            "CustomOriginConfig": {
                                "OriginProtocolPolicy": "http-only",
                                "OriginSSLProtocols": ["TLSv1.2"],
                            },
                            "DomainName": get_att(&lb.alb, "DNSName"),
                            "Id": alb_origin,
                        },
                    ],
                },
            }),
        ),
    )?;

    let mut statements = Vec::new();
    if spec.auto_delete_objects {
        statements.push(json!({
            "Action": ["s3:DeleteObject*", "s3:GetBucket*", "s3:List*", "s3:PutBucketPolicy"],
            "Effect": "Allow",
            "Principal": {
                "AWS": sub(&format!(
                    "arn:${{AWS::Partition}}:iam::${{AWS::AccountId}}:role/{}",
                    AUTO_DELETE_FUNCTION
                )),
            },
            "Resource": [get_att(&bucket, "Arn"), json!({ "Fn::Join": ["", [get_att(&bucket, "Arn"), "/*"]] })],
        }));
    }
    statements.push(json!({
        "Action": "s3:GetObject",
        "Condition": {
            "StringEquals": {
                "AWS:SourceArn": arn(vec![
                    json!("cloudfront::"),
                    b.account(),
                    json!(":distribution/"),
                    reference(&distribution),
                ]),
            },
        },
        "Effect": "Allow",
        "Principal": { "Service": "cloudfront.amazonaws.com" },
        "Resource": json!({ "Fn::Join": ["", [get_att(&bucket, "Arn"), "/*"]] }),
    }));

    let policy = b.add(
        &[&spec.bucket_id, "Policy", "Resource"],
        Resource::new(
            "AWS::S3::BucketPolicy",
            json!({
                "Bucket": reference(&bucket),
                "PolicyDocument": {
                    "Statement": statements,
                    "Version": "2012-10-17",
                },
            }),
        ),
    )?;

    if spec.auto_delete_objects {
        b.add(
            &[&spec.bucket_id, "AutoDeleteObjectsCustomResource", "Default"],
            Resource::new(
                AUTO_DELETE_RESOURCE_TYPE,
                json!({
                    "BucketName": reference(&bucket),
                    "ServiceToken": function_token(AUTO_DELETE_FUNCTION),
                }),
            )
            .depends_on(policy)
            .removal_policy(DeletionPolicy::Delete),
        )?;
    }

    let object_key = match asset {
        Some(asset) => json!(asset.object_key),
        None => {
            let name = format!("{}AssetObjectKey", spec.deployment_id);
            b.template.parameters.insert(
                name.clone(),
                json!({
                    "Description": "Object key of the staged frontend asset archive",
                    "Type": "String",
                }),
            );
            reference(&name)
        }
    };

    let mut properties = json!({
        "DestinationBucketName": reference(&bucket),
        "DistributionId": reference(&distribution),
        "DistributionPaths": spec.invalidation_paths,
        "Prune": spec.prune,
        "RetainOnDelete": false,
        "ServiceToken": function_token(BUCKET_DEPLOYMENT_FUNCTION),
        "SourceBucketNames": [sub(ASSET_BUCKET_PATTERN)],
        "SourceObjectKeys": [object_key],
    });
    if !spec.exclude.is_empty()
        && let Some(map) = properties.as_object_mut()
    {
        map.insert("Exclude".to_string(), json!(spec.exclude));
    }

    let mut deployment = Resource::new(BUCKET_DEPLOYMENT_RESOURCE_TYPE, properties)
        .removal_policy(DeletionPolicy::Delete);
    if let Some(asset) = asset {
        deployment = deployment.metadata(json!({
            "aws:asset:path": asset.file_name,
            "aws:asset:property": "SourceObjectKeys",
        }));
    }
    b.add(&[&spec.deployment_id, "CustomResource", "Default"], deployment)?;

    Ok(FrontendRefs { distribution })
}
