//! モデル定義
//!
//! スタック定義で使用されるデータモデルを定義します。
//! 各モデルはリソースの種類ごとにモジュールに分離されています。

mod frontend;
mod load_balancer;
mod network;
mod service;
mod stack;

// Re-exports
pub use frontend::*;
pub use load_balancer::*;
pub use network::*;
pub use service::*;
pub use stack::*;

/// 名前を PascalCase に変換（`api-1` → `Api1`）
///
/// コンストラクトIDの生成に使用します。
pub fn pascal_case(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("api1"), "Api1");
        assert_eq!(pascal_case("order-service"), "OrderService");
        assert_eq!(pascal_case("user_api_v2"), "UserApiV2");
        assert_eq!(pascal_case("--"), "");
    }

    #[test]
    fn test_reference_stack_shape() {
        let stack = StackDefinition::reference();

        assert_eq!(stack.name, "InfraStack");
        assert_eq!(stack.env.region, "us-west-2");
        assert!(stack.env.account.is_none());
        assert_eq!(stack.network.max_azs, 2);
        assert_eq!(stack.network.nat_gateways, 0);
        assert_eq!(stack.network.subnets.len(), 1);
        assert_eq!(stack.network.subnets[0].kind, SubnetKind::Public);
        assert_eq!(stack.services.len(), 2);

        let api1 = stack.service("api1").unwrap();
        assert_eq!(api1.port, 5000);
        assert_eq!(api1.path_pattern, "/api1*");
        assert_eq!(api1.priority, 1);
        assert_eq!(api1.health_check_path, "/api1");

        let api2 = stack.service("api2").unwrap();
        assert_eq!(api2.port, 6001);
        assert_eq!(api2.priority, 2);
        assert_eq!(api2.image.to_string(), "api2:latest");

        assert_eq!(
            stack.load_balancer.ingress,
            IngressSource::PrefixList("pl-82a045eb".to_string())
        );
        assert_eq!(stack.frontend.default_root_object, "index.html");
        assert_eq!(stack.frontend.invalidation_paths, vec!["/*"]);
    }

    #[test]
    fn test_stack_definition_serialization() {
        let stack = StackDefinition::reference();

        let json = serde_json::to_string(&stack).unwrap();
        assert!(json.contains("InfraStack"));
        assert!(json.contains("pl-82a045eb"));

        let restored: StackDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, stack);
    }
}
