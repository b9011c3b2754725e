//! KDLパーサー
//!
//! スタック定義ファイル（stack.kdl）をパースします。
//! 各ノードタイプのパース処理はモジュールに分離されています。
//! 指定されなかった値は既定のトポロジー（`StackDefinition::reference()`）の値を使います。

mod frontend;
mod load_balancer;
mod network;
mod service;

use frontend::parse_frontend;
use load_balancer::parse_load_balancer;
use network::parse_network;
use service::apply_service;

use crate::error::{Result, StackError};
use crate::model::{ServiceSpec, StackDefinition};
use kdl::{KdlDocument, KdlNode};
use std::fs;
use std::path::Path;
use tracing::debug;

/// KDLファイルをパースしてStackDefinitionを生成
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<StackDefinition> {
    let content = fs::read_to_string(path.as_ref()).map_err(|e| StackError::IoError {
        path: path.as_ref().to_path_buf(),
        message: e.to_string(),
    })?;
    parse_kdl_string(&content)
}

/// KDL文字列をパース
pub fn parse_kdl_string(content: &str) -> Result<StackDefinition> {
    let doc: KdlDocument = content.parse()?;
    let reference = StackDefinition::reference();
    let mut stack = reference.clone();

    // service ノードが1つでもあれば、サービス一覧は宣言されたものだけになる
    let mut services: Vec<ServiceSpec> = Vec::new();
    let mut declared_services = false;

    for node in doc.nodes() {
        match node.name().value() {
            "stack" => {
                if let Some(name) = first_string(node) {
                    stack.name = name;
                }
                if let Some(description) = prop_string(node, "description")
                    .or_else(|| child_string(node, "description"))
                {
                    stack.description = Some(description);
                }
            }
            "env" | "environment" => {
                if let Some(account) =
                    prop_string(node, "account").or_else(|| child_string(node, "account"))
                {
                    // テンプレート展開で空になった場合は未指定扱い
                    if !account.trim().is_empty() {
                        stack.env.account = Some(account.trim().to_string());
                    }
                }
                if let Some(region) =
                    prop_string(node, "region").or_else(|| child_string(node, "region"))
                {
                    stack.env.region = region;
                }
            }
            "network" | "vpc" => {
                stack.network = parse_network(node, stack.network.clone())?;
            }
            "cluster" => {
                if let Some(id) = first_string(node) {
                    stack.cluster.id = id;
                }
            }
            "load-balancer" | "load_balancer" | "alb" => {
                stack.load_balancer = parse_load_balancer(node, stack.load_balancer.clone())?;
            }
            "service" => {
                declared_services = true;
                let name = first_string(node).ok_or_else(|| {
                    StackError::InvalidConfig("service requires a name".to_string())
                })?;
                // 既存のサービスがあればマージ、なければ既定値（または同名の既定サービス）から作成
                if let Some(existing) = services.iter_mut().find(|s| s.name == name) {
                    apply_service(node, existing)?;
                } else {
                    let mut spec = reference
                        .service(&name)
                        .cloned()
                        .unwrap_or_else(|| ServiceSpec::new(name.clone(), 0));
                    apply_service(node, &mut spec)?;
                    services.push(spec);
                }
            }
            "frontend" => {
                stack.frontend = parse_frontend(node, stack.frontend.clone())?;
            }
            "outputs" => {
                if let Some(name) = child_string(node, "alb-dns-name")
                    .or_else(|| child_string(node, "alb_dns_name"))
                {
                    stack.outputs.alb_dns_name = name;
                }
                if let Some(name) = child_string(node, "cloudfront-url")
                    .or_else(|| child_string(node, "cloudfront_url"))
                {
                    stack.outputs.cloudfront_url = name;
                }
            }
            "variables" => {
                // テンプレート展開前に抽出済み
            }
            other => {
                // 不明なノードはスキップ
                debug!(node = %other, "Skipping unknown node");
            }
        }
    }

    if declared_services {
        stack.services = services;
    }

    Ok(stack)
}

/// 子ノード名を kebab-case に正規化
pub(crate) fn child_key(node: &KdlNode) -> String {
    node.name().value().replace('_', "-")
}

/// 最初の位置引数を文字列として取得
pub(crate) fn first_string(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// 全ての位置引数を文字列として取得
pub(crate) fn all_strings(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string().map(|s| s.to_string()))
        .collect()
}

/// プロパティを文字列として取得
pub(crate) fn prop_string(node: &KdlNode, key: &str) -> Option<String> {
    node.get(key)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

/// 子ノードの最初の位置引数を文字列として取得
pub(crate) fn child_string(node: &KdlNode, key: &str) -> Option<String> {
    node.children()
        .and_then(|children| children.get(key))
        .and_then(first_string)
}

/// 最初の位置引数を整数として取得（型が違う場合はエラー）
pub(crate) fn first_integer<T: TryFrom<i128>>(node: &KdlNode, field: &str) -> Result<T> {
    let value = node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .ok_or_else(|| StackError::InvalidConfig(format!("{} requires a value", field)))?
        .value();
    let number = value.as_integer().ok_or_else(|| {
        StackError::InvalidConfig(format!("{} must be an integer, got {}", field, value))
    })?;
    T::try_from(number)
        .map_err(|_| StackError::InvalidConfig(format!("{} is out of range: {}", field, number)))
}

/// プロパティを整数として取得
pub(crate) fn prop_integer<T: TryFrom<i128>>(
    node: &KdlNode,
    key: &str,
    field: &str,
) -> Result<Option<T>> {
    match node.get(key) {
        None => Ok(None),
        Some(value) => {
            let number = value.as_integer().ok_or_else(|| {
                StackError::InvalidConfig(format!("{} must be an integer, got {}", field, value))
            })?;
            T::try_from(number).map(Some).map_err(|_| {
                StackError::InvalidConfig(format!("{} is out of range: {}", field, number))
            })
        }
    }
}

/// 最初の位置引数を真偽値として取得
///
/// `#true` / `#false` に加えて文字列 "true" / "false" も受け付ける
pub(crate) fn first_bool(node: &KdlNode, field: &str) -> Result<bool> {
    let value = node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
        .ok_or_else(|| StackError::InvalidConfig(format!("{} requires a value", field)))?;

    if let Some(b) = value.as_bool() {
        return Ok(b);
    }
    match value.as_string() {
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        _ => Err(StackError::InvalidConfig(format!(
            "{} must be a boolean (#true / #false), got {}",
            field, value
        ))),
    }
}
