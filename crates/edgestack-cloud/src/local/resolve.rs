//! Intrinsic function evaluation against deployed state

use crate::error::{CloudError, Result};
use crate::state::ResourceState;
use crate::synth::availability_zones;
use crate::template::intrinsic;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Zones returned by `Fn::GetAZs`
const AVAILABILITY_ZONE_COUNT: u8 = 3;

/// Evaluates `Ref`, `Fn::GetAtt`, `Fn::Join`, `Fn::Sub`, `Fn::Select` and
/// `Fn::GetAZs`
pub struct Resolver<'a> {
    pub account: &'a str,
    pub region: &'a str,
    pub stack: &'a str,
    pub resources: &'a BTreeMap<String, ResourceState>,
    pub parameters: &'a BTreeMap<String, String>,
}

impl Resolver<'_> {
    fn unresolvable(&self, context: &str, message: impl Into<String>) -> CloudError {
        CloudError::Unresolvable {
            context: context.to_string(),
            message: message.into(),
        }
    }

    /// Evaluate every intrinsic inside `value`
    pub fn resolve(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Object(map) if map.len() == 1 => {
                let Some((key, arg)) = map.iter().next() else {
                    return Ok(value.clone());
                };
                match key.as_str() {
                    "Ref" => self.reference(arg),
                    "Fn::GetAtt" => self.get_att(arg),
                    "Fn::Join" => self.join(arg),
                    "Fn::Sub" => self.sub(arg),
                    "Fn::Select" => self.select(arg),
                    "Fn::GetAZs" => self.get_azs(arg),
                    _ => Ok(Value::Object(self.resolve_map(map)?)),
                }
            }
            Value::Object(map) => Ok(Value::Object(self.resolve_map(map)?)),
            Value::Array(items) => Ok(Value::Array(
                items.iter().map(|v| self.resolve(v)).collect::<Result<_>>()?,
            )),
            _ => Ok(value.clone()),
        }
    }

    /// Evaluate to a string
    pub fn resolve_string(&self, value: &Value) -> Result<String> {
        match self.resolve(value)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(self.unresolvable("string", format!("{} is not a scalar", other))),
        }
    }

    fn resolve_map(&self, map: &Map<String, Value>) -> Result<Map<String, Value>> {
        map.iter()
            .map(|(k, v)| Ok((k.clone(), self.resolve(v)?)))
            .collect()
    }

    fn pseudo(&self, name: &str) -> Option<String> {
        match name {
            intrinsic::ACCOUNT_ID => Some(self.account.to_string()),
            intrinsic::REGION => Some(self.region.to_string()),
            intrinsic::PARTITION => Some("aws".to_string()),
            intrinsic::URL_SUFFIX => Some("amazonaws.com".to_string()),
            intrinsic::STACK_NAME => Some(self.stack.to_string()),
            _ => None,
        }
    }

    fn lookup_ref(&self, name: &str) -> Result<String> {
        if let Some(value) = self.pseudo(name) {
            return Ok(value);
        }
        if let Some(value) = self.parameters.get(name) {
            return Ok(value.clone());
        }
        self.resources
            .get(name)
            .map(|r| r.id.clone())
            .ok_or_else(|| self.unresolvable("Ref", format!("{} is not deployed", name)))
    }

    fn lookup_att(&self, id: &str, attribute: &str) -> Result<Value> {
        let resource = self
            .resources
            .get(id)
            .ok_or_else(|| self.unresolvable("Fn::GetAtt", format!("{} is not deployed", id)))?;
        resource.attributes.get(attribute).cloned().ok_or_else(|| {
            self.unresolvable(
                "Fn::GetAtt",
                format!("{} ({}) has no attribute {}", id, resource.resource_type, attribute),
            )
        })
    }

    fn reference(&self, arg: &Value) -> Result<Value> {
        let name = arg
            .as_str()
            .ok_or_else(|| self.unresolvable("Ref", "argument must be a string"))?;
        Ok(Value::String(self.lookup_ref(name)?))
    }

    fn get_att(&self, arg: &Value) -> Result<Value> {
        let (id, attribute) = match arg {
            Value::Array(parts) if parts.len() == 2 => (parts[0].as_str(), parts[1].as_str()),
            Value::String(s) => match s.split_once('.') {
                Some((id, attribute)) => (Some(id), Some(attribute)),
                None => (None, None),
            },
            _ => (None, None),
        };
        match (id, attribute) {
            (Some(id), Some(attribute)) => self.lookup_att(id, attribute),
            _ => Err(self.unresolvable("Fn::GetAtt", format!("malformed argument {}", arg))),
        }
    }

    fn join(&self, arg: &Value) -> Result<Value> {
        let Some([separator, list]) = arg.as_array().map(Vec::as_slice) else {
            return Err(self.unresolvable("Fn::Join", format!("malformed argument {}", arg)));
        };
        let separator = separator
            .as_str()
            .ok_or_else(|| self.unresolvable("Fn::Join", "separator must be a string"))?;
        let list = self.resolve(list)?;
        let items = list
            .as_array()
            .ok_or_else(|| self.unresolvable("Fn::Join", "second argument must be a list"))?;
        let parts = items
            .iter()
            .map(|v| self.resolve_string(v))
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::String(parts.join(separator)))
    }

    fn sub(&self, arg: &Value) -> Result<Value> {
        let (template, variables) = match arg {
            Value::String(s) => (s.as_str(), None),
            Value::Array(parts) if parts.len() == 2 => (
                parts[0]
                    .as_str()
                    .ok_or_else(|| self.unresolvable("Fn::Sub", "template must be a string"))?,
                parts[1].as_object(),
            ),
            _ => return Err(self.unresolvable("Fn::Sub", format!("malformed argument {}", arg))),
        };

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            // `${!Literal}` is written out as `${Literal}`
            if let Some(literal) = after.strip_prefix('!') {
                out.push_str("${");
                rest = literal;
                continue;
            }
            let end = after
                .find('}')
                .ok_or_else(|| self.unresolvable("Fn::Sub", format!("unterminated variable in {}", template)))?;
            let name = &after[..end];

            let value = match variables.and_then(|vars| vars.get(name)) {
                Some(v) => self.resolve_string(v)?,
                None => match name.split_once('.') {
                    Some((id, attribute)) if self.pseudo(name).is_none() => {
                        match self.lookup_att(id, attribute)? {
                            Value::String(s) => s,
                            other => other.to_string(),
                        }
                    }
                    _ => self.lookup_ref(name)?,
                },
            };
            out.push_str(&value);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(Value::String(out))
    }

    fn select(&self, arg: &Value) -> Result<Value> {
        let Some([index, list]) = arg.as_array().map(Vec::as_slice) else {
            return Err(self.unresolvable("Fn::Select", format!("malformed argument {}", arg)));
        };
        let index = match self.resolve(index)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| self.unresolvable("Fn::Select", "index must be a non-negative integer"))?;
        let list = self.resolve(list)?;
        list.as_array()
            .and_then(|items| items.get(index as usize))
            .cloned()
            .ok_or_else(|| self.unresolvable("Fn::Select", format!("index {} out of range", index)))
    }

    fn get_azs(&self, arg: &Value) -> Result<Value> {
        let region = match self.resolve(arg)? {
            Value::String(s) if !s.is_empty() => s,
            _ => self.region.to_string(),
        };
        Ok(Value::Array(
            availability_zones(&region, AVAILABILITY_ZONE_COUNT)
                .into_iter()
                .map(Value::String)
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resources() -> BTreeMap<String, ResourceState> {
        BTreeMap::from([
            (
                "Alb".to_string(),
                ResourceState::new("arn:alb", "AWS::ElasticLoadBalancingV2::LoadBalancer")
                    .with_attribute("DNSName", json!("Infra-AppAL-abc-123.us-west-2.elb.amazonaws.com")),
            ),
            (
                "Cdn".to_string(),
                ResourceState::new("E123", "AWS::CloudFront::Distribution")
                    .with_attribute("DomainName", json!("dabc.cloudfront.net")),
            ),
        ])
    }

    fn with_resolver<T>(f: impl FnOnce(&Resolver<'_>) -> T) -> T {
        let resources = resources();
        let parameters = BTreeMap::from([("AssetKey".to_string(), "abc.tar.gz".to_string())]);
        let resolver = Resolver {
            account: "111111111111",
            region: "us-west-2",
            stack: "InfraStack",
            resources: &resources,
            parameters: &parameters,
        };
        f(&resolver)
    }

    #[test]
    fn test_ref_and_get_att() {
        with_resolver(|r| {
            assert_eq!(r.resolve(&json!({ "Ref": "Cdn" })).unwrap(), json!("E123"));
            assert_eq!(r.resolve(&json!({ "Ref": "AssetKey" })).unwrap(), json!("abc.tar.gz"));
            assert_eq!(
                r.resolve(&json!({ "Ref": "AWS::AccountId" })).unwrap(),
                json!("111111111111")
            );
            assert_eq!(
                r.resolve(&json!({ "Fn::GetAtt": ["Cdn", "DomainName"] })).unwrap(),
                json!("dabc.cloudfront.net")
            );
            assert_eq!(
                r.resolve(&json!({ "Fn::GetAtt": "Cdn.DomainName" })).unwrap(),
                json!("dabc.cloudfront.net")
            );
        });
    }

    #[test]
    fn test_join_nested() {
        with_resolver(|r| {
            let url = json!({ "Fn::Join": ["", ["https://", { "Fn::GetAtt": ["Cdn", "DomainName"] }]] });
            assert_eq!(r.resolve(&url).unwrap(), json!("https://dabc.cloudfront.net"));
        });
    }

    #[test]
    fn test_sub() {
        with_resolver(|r| {
            assert_eq!(
                r.resolve(&json!({ "Fn::Sub": "edgestack-assets-${AWS::AccountId}-${AWS::Region}" }))
                    .unwrap(),
                json!("edgestack-assets-111111111111-us-west-2")
            );
            assert_eq!(
                r.resolve(&json!({ "Fn::Sub": "${Cdn.DomainName}/${!Literal}" })).unwrap(),
                json!("dabc.cloudfront.net/${Literal}")
            );
            assert_eq!(
                r.resolve(&json!({ "Fn::Sub": ["${Name}-x", { "Name": { "Ref": "Cdn" } }] }))
                    .unwrap(),
                json!("E123-x")
            );
        });
    }

    #[test]
    fn test_select_get_azs() {
        with_resolver(|r| {
            assert_eq!(
                r.resolve(&json!({ "Fn::Select": [1, { "Fn::GetAZs": "" }] })).unwrap(),
                json!("us-west-2b")
            );
            assert!(r.resolve(&json!({ "Fn::Select": [5, ["a"]] })).is_err());
        });
    }

    #[test]
    fn test_nested_objects_are_resolved() {
        with_resolver(|r| {
            let value = json!({ "Origin": { "DomainName": { "Ref": "Cdn" } }, "Port": 80 });
            assert_eq!(
                r.resolve(&value).unwrap(),
                json!({ "Origin": { "DomainName": "E123" }, "Port": 80 })
            );
        });
    }

    #[test]
    fn test_unresolvable() {
        with_resolver(|r| {
            assert!(matches!(
                r.resolve(&json!({ "Ref": "Missing" })),
                Err(CloudError::Unresolvable { .. })
            ));
            assert!(matches!(
                r.resolve(&json!({ "Fn::GetAtt": ["Cdn", "Nope"] })),
                Err(CloudError::Unresolvable { .. })
            ));
        });
    }
}
