//! スタック定義の検証
//!
//! 合成前に構造上の不変条件をチェックします。
//! 違反は最初の1件で止めずに全て収集して返します。

use crate::error::{Result, StackError, ValidationIssue};
use crate::model::{
    FrontendSpec, IngressSource, Ipv4Cidr, LoadBalancerSpec, MAX_AZS, NetworkSpec, ServiceSpec,
    StackDefinition, SubnetKind,
};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// リスナールールの優先度の上限
pub const MAX_RULE_PRIORITY: u32 = 50_000;

static ACCOUNT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{12}$").unwrap());
static REGION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(-gov|-iso[a-z]*)?-[a-z]+-\d{1,2}$").unwrap());
static PREFIX_LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^pl-[0-9a-f]{8,17}$").unwrap());
static ECR_REPOSITORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z0-9]+(?:[._-][a-z0-9]+)*/)*[a-z0-9]+(?:[._-][a-z0-9]+)*$").unwrap()
});
static IMAGE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").unwrap());
static SERVICE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]{0,254}$").unwrap());

/// スタック定義を検証
///
/// 違反が1件でもあれば `StackError::Validation` に全件を入れて返します。
pub fn validate(stack: &StackDefinition) -> Result<()> {
    let issues = collect_issues(stack);
    if issues.is_empty() {
        debug!(stack = %stack.name, "Stack definition is valid");
        Ok(())
    } else {
        for issue in &issues {
            warn!(field = %issue.field, message = %issue.message, "Validation issue");
        }
        Err(StackError::Validation(issues))
    }
}

/// 違反を全て収集
pub fn collect_issues(stack: &StackDefinition) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    check_environment(stack, &mut issues);
    check_network(&stack.network, &mut issues);
    check_load_balancer(&stack.load_balancer, &mut issues);
    check_services(stack, &mut issues);
    check_frontend(&stack.frontend, &mut issues);

    issues
}

fn check_environment(stack: &StackDefinition, issues: &mut Vec<ValidationIssue>) {
    if stack.name.trim().is_empty() {
        issues.push(ValidationIssue::new("stack.name", "スタック名が空です"));
    }
    if let Some(account) = stack.account()
        && !ACCOUNT_RE.is_match(account)
    {
        issues.push(ValidationIssue::new(
            "env.account",
            format!("アカウントIDは12桁の数字である必要があります: {}", account),
        ));
    }
    if !REGION_RE.is_match(&stack.env.region) {
        issues.push(ValidationIssue::new(
            "env.region",
            format!("無効なリージョン: {}", stack.env.region),
        ));
    }
}

fn check_network(network: &NetworkSpec, issues: &mut Vec<ValidationIssue>) {
    let vpc_cidr = match network.cidr.parse::<Ipv4Cidr>() {
        Ok(cidr) => {
            if !cidr.is_aligned() {
                issues.push(ValidationIssue::new(
                    "network.cidr",
                    format!("ネットワークアドレスが境界に揃っていません: {}", cidr),
                ));
            }
            if !(16..=28).contains(&cidr.prefix) {
                issues.push(ValidationIssue::new(
                    "network.cidr",
                    format!("VPCのプレフィックス長は /16〜/28 です: {}", cidr),
                ));
            }
            Some(cidr)
        }
        Err(message) => {
            issues.push(ValidationIssue::new("network.cidr", message));
            None
        }
    };

    if network.max_azs == 0 || network.max_azs > MAX_AZS {
        issues.push(ValidationIssue::new(
            "network.max_azs",
            format!(
                "アベイラビリティゾーン数は 1〜{} です: {}",
                MAX_AZS, network.max_azs
            ),
        ));
    }
    if network.nat_gateways > network.max_azs {
        issues.push(ValidationIssue::new(
            "network.nat_gateways",
            format!(
                "NATゲートウェイ数 ({}) がAZ数 ({}) を超えています",
                network.nat_gateways, network.max_azs
            ),
        ));
    }
    if network.subnet_group(SubnetKind::Public).is_none() {
        issues.push(ValidationIssue::new(
            "network.subnets",
            "インターネット向けALBにはパブリックサブネットが必要です",
        ));
    }

    let mut seen = HashSet::new();
    let mut total_blocks: u64 = 0;
    for subnet in &network.subnets {
        let field = format!("network.subnet.{}", subnet.name);
        if !seen.insert(subnet.name.as_str()) {
            issues.push(ValidationIssue::new(&field, "サブネット名が重複しています"));
        }
        if !(16..=28).contains(&subnet.cidr_mask) {
            issues.push(ValidationIssue::new(
                &field,
                format!("cidr-mask は 16〜28 の範囲です: {}", subnet.cidr_mask),
            ));
            continue;
        }
        if subnet.kind == SubnetKind::Private && network.nat_gateways == 0 {
            issues.push(ValidationIssue::new(
                &field,
                "プライベートサブネットにはNATゲートウェイが必要です（isolated を使用してください）",
            ));
        }
        if let Some(vpc) = vpc_cidr {
            if subnet.cidr_mask < vpc.prefix {
                issues.push(ValidationIssue::new(
                    &field,
                    format!("cidr-mask /{} がVPC {} より大きいです", subnet.cidr_mask, vpc),
                ));
                continue;
            }
            total_blocks += (1u64 << (32 - subnet.cidr_mask as u32)) * network.max_azs as u64;
        }
    }

    if let Some(vpc) = vpc_cidr
        && total_blocks > vpc.size()
    {
        issues.push(ValidationIssue::new(
            "network.subnets",
            format!("サブネットがVPC {} に収まりません", vpc),
        ));
    }
}

fn check_load_balancer(lb: &LoadBalancerSpec, issues: &mut Vec<ValidationIssue>) {
    if lb.port == 0 {
        issues.push(ValidationIssue::new("load_balancer.port", "ポート0は使用できません"));
    }

    if lb.ingress.is_unrestricted() {
        issues.push(ValidationIssue::new(
            "load_balancer.ingress",
            format!(
                "ALBはインターネット全体に開放できません ({})。CDNのプレフィックスリストを指定してください",
                lb.ingress
            ),
        ));
    } else {
        match &lb.ingress {
            IngressSource::PrefixList(id) if !PREFIX_LIST_RE.is_match(id) => {
                issues.push(ValidationIssue::new(
                    "load_balancer.ingress",
                    format!("無効なプレフィックスリストID: {}", id),
                ));
            }
            IngressSource::Cidr(_) => match lb.ingress.cidr() {
                Some(Ok(cidr)) if !cidr.is_aligned() => {
                    issues.push(ValidationIssue::new(
                        "load_balancer.ingress",
                        format!("ネットワークアドレスが境界に揃っていません: {}", cidr),
                    ));
                }
                Some(Err(message)) => {
                    issues.push(ValidationIssue::new("load_balancer.ingress", message));
                }
                _ => {}
            },
            IngressSource::PrefixList(_) => {}
        }
    }

    if !(200..=599).contains(&lb.not_found.status_code) {
        issues.push(ValidationIssue::new(
            "load_balancer.not_found",
            format!("無効なステータスコード: {}", lb.not_found.status_code),
        ));
    }
}

fn check_services(stack: &StackDefinition, issues: &mut Vec<ValidationIssue>) {
    if stack.services.is_empty() {
        issues.push(ValidationIssue::new("services", "サービスが1つも定義されていません"));
        return;
    }

    let mut names: HashMap<&str, usize> = HashMap::new();
    let mut ports: HashMap<u16, &str> = HashMap::new();
    let mut priorities: HashMap<u32, &str> = HashMap::new();
    let mut prefixes: HashMap<String, &str> = HashMap::new();

    for service in &stack.services {
        let field = format!("service.{}", service.name);

        if !SERVICE_NAME_RE.is_match(&service.name) {
            issues.push(ValidationIssue::new(
                &field,
                format!("無効なサービス名: {:?}", service.name),
            ));
        }
        let count = names.entry(service.name.as_str()).or_insert(0);
        *count += 1;
        if *count == 2 {
            issues.push(ValidationIssue::new(&field, "サービス名が重複しています"));
        } else if *count == 1 {
            // 論理IDは名前を PascalCase にしたものから作られる
            let prefix = service.construct_prefix();
            if let Some(other) = prefixes.insert(prefix.clone(), &service.name) {
                issues.push(ValidationIssue::new(
                    &field,
                    format!(
                        "サービス名 {} は {} と同じコンストラクトID {} になります",
                        service.name, other, prefix
                    ),
                ));
            }
        }

        if service.port == 0 {
            issues.push(ValidationIssue::new(
                format!("{}.port", field),
                "コンテナポートが指定されていません（1〜65535）",
            ));
        } else if let Some(other) = ports.insert(service.port, &service.name)
            && other != service.name
        {
            issues.push(ValidationIssue::new(
                format!("{}.port", field),
                format!("ポート {} はサービス {} と重複しています", service.port, other),
            ));
        }

        if service.priority == 0 || service.priority > MAX_RULE_PRIORITY {
            issues.push(ValidationIssue::new(
                format!("{}.priority", field),
                format!(
                    "リスナールールの優先度は 1〜{} です: {}",
                    MAX_RULE_PRIORITY, service.priority
                ),
            ));
        } else if let Some(other) = priorities.insert(service.priority, &service.name)
            && other != service.name
        {
            issues.push(ValidationIssue::new(
                format!("{}.priority", field),
                format!(
                    "優先度 {} はサービス {} と重複しています",
                    service.priority, other
                ),
            ));
        }

        check_service_shape(service, &field, issues);

        if stack.network.subnet_group(service.subnets).is_none() {
            issues.push(ValidationIssue::new(
                format!("{}.subnets", field),
                format!("{} サブネットグループがネットワークにありません", service.subnets),
            ));
        }
    }

    check_path_overlap(&stack.services, issues);
}

fn check_service_shape(service: &ServiceSpec, field: &str, issues: &mut Vec<ValidationIssue>) {
    let repo = &service.image.repository;
    if repo.len() < 2 || repo.len() > 256 || !ECR_REPOSITORY_RE.is_match(repo) {
        issues.push(ValidationIssue::new(
            format!("{}.image", field),
            format!("ECRリポジトリ名として無効です: {}", repo),
        ));
    }
    if !IMAGE_TAG_RE.is_match(&service.image.tag) {
        issues.push(ValidationIssue::new(
            format!("{}.image", field),
            format!("無効なイメージタグ: {}", service.image.tag),
        ));
    }

    if !is_valid_fargate_size(service.cpu, service.memory_mib) {
        issues.push(ValidationIssue::new(
            format!("{}.cpu", field),
            format!(
                "Fargateでサポートされない CPU/メモリの組み合わせ: cpu={} memory={}",
                service.cpu, service.memory_mib
            ),
        ));
    }

    if service.desired_count == 0 {
        warn!(service = %service.name, "desired-count is 0, service will not run any task");
    }

    if !service.path_pattern.starts_with('/') || service.path_pattern.len() > 128 {
        issues.push(ValidationIssue::new(
            format!("{}.path", field),
            format!("パスパターンは / で始まる128文字以内です: {}", service.path_pattern),
        ));
    }
    if !service.health_check_path.starts_with('/') {
        issues.push(ValidationIssue::new(
            format!("{}.health_check", field),
            format!(
                "ヘルスチェックパスは / で始まる必要があります: {}",
                service.health_check_path
            ),
        ));
    }
    if service.log_stream_prefix.is_empty() || service.log_stream_prefix.contains(':') {
        issues.push(ValidationIssue::new(
            format!("{}.log_prefix", field),
            format!("無効なログストリームプレフィックス: {:?}", service.log_stream_prefix),
        ));
    }
}

/// パスパターンのワイルドカードより前の部分
fn literal_prefix(pattern: &str) -> &str {
    match pattern.find(['*', '?']) {
        Some(index) => &pattern[..index],
        None => pattern,
    }
}

/// 一方のリテラル部分が他方の接頭辞になっていれば重複とみなす
fn check_path_overlap(services: &[ServiceSpec], issues: &mut Vec<ValidationIssue>) {
    for (i, a) in services.iter().enumerate() {
        for b in services.iter().skip(i + 1) {
            if a.name == b.name {
                continue;
            }
            let pa = literal_prefix(&a.path_pattern);
            let pb = literal_prefix(&b.path_pattern);
            if pa.starts_with(pb) || pb.starts_with(pa) {
                issues.push(ValidationIssue::new(
                    format!("service.{}.path", b.name),
                    format!(
                        "パスパターン {} はサービス {} の {} と重複します",
                        b.path_pattern, a.name, a.path_pattern
                    ),
                ));
            }
        }
    }
}

fn check_frontend(frontend: &FrontendSpec, issues: &mut Vec<ValidationIssue>) {
    if frontend.assets.as_os_str().is_empty() {
        issues.push(ValidationIssue::new(
            "frontend.assets",
            "アセットディレクトリが指定されていません",
        ));
    }
    for pattern in &frontend.exclude {
        if pattern.is_empty() {
            issues.push(ValidationIssue::new(
                "frontend.exclude",
                "空の除外パターンは指定できません",
            ));
        } else if let Err(e) = glob::Pattern::new(pattern) {
            issues.push(ValidationIssue::new(
                "frontend.exclude",
                format!("無効なglobパターン {:?}: {}", pattern, e),
            ));
        }
    }
    if frontend.default_root_object.is_empty() || frontend.default_root_object.starts_with('/') {
        issues.push(ValidationIssue::new(
            "frontend.default_root_object",
            format!(
                "デフォルトルートオブジェクトは / を含まないキーで指定してください: {:?}",
                frontend.default_root_object
            ),
        ));
    }
    for path in &frontend.invalidation_paths {
        if !path.starts_with('/') {
            issues.push(ValidationIssue::new(
                "frontend.invalidate",
                format!("無効化パスは / で始まる必要があります: {}", path),
            ));
        }
    }
}

/// Fargate のCPU/メモリの組み合わせとして有効か
pub fn is_valid_fargate_size(cpu: u32, memory_mib: u32) -> bool {
    let (min, max, step) = match cpu {
        256 => return matches!(memory_mib, 512 | 1024 | 2048),
        512 => (1024, 4096, 1024),
        1024 => (2048, 8192, 1024),
        2048 => (4096, 16384, 1024),
        4096 => (8192, 30720, 1024),
        8192 => (16384, 61440, 4096),
        16384 => (32768, 122880, 8192),
        _ => return false,
    };
    (min..=max).contains(&memory_mib) && memory_mib % step == 0
}
