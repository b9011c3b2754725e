//! 統合ローダー
//!
//! ファイル発見、テンプレート展開、パース、アカウント解決、検証を統合

use crate::discovery::{DiscoveredFiles, discover_files, find_project_root};
use crate::error::{Result, StackError};
use crate::model::StackDefinition;
use crate::parser::parse_kdl_string;
use crate::template::{TemplateProcessor, extract_variables};
use crate::validate::validate;
use edgestack_config::Settings;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// アカウントIDを指定するコンテキストキー
pub const ACCOUNT_CONTEXT_KEY: &str = "account";

/// CDK互換のアカウント環境変数
pub const DEFAULT_ACCOUNT_ENV: &str = "CDK_DEFAULT_ACCOUNT";

/// ロードオプション
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// ステージ名（stack.{stage}.kdl と .env.{stage} を追加で読み込む）
    pub stage: Option<String>,
    /// `-c key=value` で渡されたコンテキスト（テンプレート変数として最優先）
    pub context: BTreeMap<String, String>,
    /// ユーザー設定（アカウントの最終フォールバック）
    pub settings: Settings,
}

impl LoadOptions {
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// ロード結果
#[derive(Debug, Clone)]
pub struct LoadedStack {
    pub stack: StackDefinition,
    /// プロジェクトルート（スタックファイルがない場合はカレントディレクトリ）
    pub project_root: PathBuf,
    /// 読み込んだKDLファイル（空なら既定トポロジー）
    pub sources: Vec<PathBuf>,
}

impl LoadedStack {
    /// 既定トポロジーを使用したか
    pub fn is_reference(&self) -> bool {
        self.sources.is_empty()
    }

    /// フロントエンドのアセットディレクトリ（プロジェクトルート基準で解決）
    pub fn assets_dir(&self) -> PathBuf {
        self.project_root.join(&self.stack.frontend.assets)
    }
}

/// `key=value` 形式のコンテキスト指定をパース
pub fn parse_context_arg(arg: &str) -> Result<(String, String)> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(StackError::InvalidConfig(format!(
            "コンテキストは key=value 形式で指定してください: {}",
            arg
        ))),
    }
}

/// プロジェクト全体をロード
///
/// 以下の処理を実行:
/// 1. プロジェクトルートの検出
/// 2. ファイルの自動発見
/// 3. 変数の収集とテンプレート展開
/// 4. KDLパース
/// 5. アカウント解決と検証
#[instrument(skip(options), fields(stage = ?options.stage))]
pub fn load_project(options: &LoadOptions) -> Result<LoadedStack> {
    info!("Starting project load");
    let project_root = find_project_root()?;
    load_project_from_root(&project_root, options)
}

/// 指定されたルートディレクトリからプロジェクトをロード
#[instrument(skip(project_root, options), fields(project_root = %project_root.display()))]
pub fn load_project_from_root(project_root: &Path, options: &LoadOptions) -> Result<LoadedStack> {
    // 1. ファイル発見
    debug!("Step 1: Discovering files");
    let discovered = discover_files(project_root, options.stage.as_deref())?;

    // 2. 変数収集とテンプレート準備
    debug!("Step 2: Preparing template processor");
    let mut processor = prepare_template_processor(&discovered, project_root, options)?;

    // 3. テンプレート展開
    debug!("Step 3: Expanding templates");
    let expanded = expand_all_files(&discovered, &mut processor)?;
    info!(content_size = expanded.len(), "Template expansion complete");

    // 4. KDLパース
    debug!("Step 4: Parsing KDL");
    let mut stack = parse_kdl_string(&expanded)?;

    // 5. アカウント解決と検証
    debug!("Step 5: Resolving account and validating");
    resolve_account(&mut stack, options);
    validate(&stack)?;

    info!(
        stack = %stack.name,
        services = stack.services.len(),
        env = %stack.env.uri(),
        "Project loaded successfully"
    );

    Ok(LoadedStack {
        stack,
        project_root: project_root.to_path_buf(),
        sources: discovered.kdl_files().into_iter().cloned().collect(),
    })
}

/// スタックファイルなしで既定トポロジーをロード
#[instrument(skip(project_root, options), fields(project_root = %project_root.display()))]
pub fn load_reference(project_root: &Path, options: &LoadOptions) -> Result<LoadedStack> {
    let mut stack = StackDefinition::reference();
    resolve_account(&mut stack, options);
    validate(&stack)?;

    info!(stack = %stack.name, env = %stack.env.uri(), "Using built-in reference stack");

    Ok(LoadedStack {
        stack,
        project_root: project_root.to_path_buf(),
        sources: Vec::new(),
    })
}

/// プロジェクトがあればロードし、なければ既定トポロジーを使う
pub fn load_or_reference(options: &LoadOptions) -> Result<LoadedStack> {
    match find_project_root() {
        Ok(root) => load_project_from_root(&root, options),
        Err(StackError::ProjectRootNotFound(cwd)) => load_reference(&cwd, options),
        Err(e) => Err(e),
    }
}

/// アカウントIDを解決
///
/// 優先順位（最初に見つかったもの）:
/// 1. スタックファイルの `env account=...`
/// 2. コンテキスト `account`
/// 3. 環境変数 CDK_DEFAULT_ACCOUNT
/// 4. ユーザー設定の default_account
pub fn resolve_account(stack: &mut StackDefinition, options: &LoadOptions) {
    if let Some(account) = stack.account() {
        debug!(account = %account, "Account set in stack file");
        return;
    }

    let resolved = non_empty(options.context.get(ACCOUNT_CONTEXT_KEY).cloned())
        .map(|a| (a, "context"))
        .or_else(|| non_empty(std::env::var(DEFAULT_ACCOUNT_ENV).ok()).map(|a| (a, "env")))
        .or_else(|| non_empty(options.settings.default_account.clone()).map(|a| (a, "settings")));

    match resolved {
        Some((account, source)) => {
            debug!(account = %account, source, "Resolved account");
            stack.env.account = Some(account);
        }
        None => debug!("Account not resolved, template stays environment-agnostic"),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// デプロイにはアカウントIDが必須
pub fn require_account(stack: &StackDefinition) -> Result<&str> {
    stack.account().ok_or(StackError::MissingAccount)
}

/// テンプレートプロセッサを準備
///
/// 変数の優先順位（後勝ち）:
/// PROJECT_ROOT → .env → .env.{stage} → 環境変数 → variables ブロック → コンテキスト
fn prepare_template_processor(
    discovered: &DiscoveredFiles,
    project_root: &Path,
    options: &LoadOptions,
) -> Result<TemplateProcessor> {
    let mut processor = TemplateProcessor::new();

    processor.add_variable(
        "PROJECT_ROOT",
        serde_json::Value::String(project_root.to_string_lossy().to_string()),
    );
    if let Some(stage) = &options.stage {
        processor.add_variable("STAGE", serde_json::Value::String(stage.clone()));
    }

    if let Some(env_file) = &discovered.env_file {
        processor.add_env_file_variables(env_file)?;
    }
    if let Some(stage_env_file) = &discovered.stage_env_file {
        processor.add_env_file_variables(stage_env_file)?;
    }

    processor.add_env_variables();

    for file in discovered.kdl_files() {
        let content = std::fs::read_to_string(file).map_err(|e| StackError::IoError {
            path: file.clone(),
            message: e.to_string(),
        })?;
        let vars = extract_variables(&content)?;
        debug!(file = %file.display(), count = vars.len(), "Extracted variables block");
        processor.add_variables(vars);
    }

    for (key, value) in &options.context {
        processor.add_variable(key.clone(), serde_json::Value::String(value.clone()));
    }

    Ok(processor)
}

/// 全ファイルをテンプレート展開して結合
fn expand_all_files(
    discovered: &DiscoveredFiles,
    processor: &mut TemplateProcessor,
) -> Result<String> {
    let mut expanded = String::new();

    for file in discovered.kdl_files() {
        debug!(file = %file.display(), "Rendering stack file");
        let rendered = processor.render_file(file)?;
        expanded.push_str(&rendered);
        expanded.push_str("\n\n");
    }

    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_parse_context_arg() {
        assert_eq!(
            parse_context_arg("account=111111111111").unwrap(),
            ("account".to_string(), "111111111111".to_string())
        );
        assert_eq!(
            parse_context_arg("url=https://a/b?x=1").unwrap(),
            ("url".to_string(), "https://a/b?x=1".to_string())
        );
        assert!(parse_context_arg("novalue").is_err());
        assert!(parse_context_arg("=value").is_err());
    }

    #[test]
    #[serial]
    fn test_load_project_with_templates() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "stack.kdl",
            r#"
variables {
    API1_TAG "v1"
}

env account="{{ ACCOUNT }}"

service "api1" {
    tag "{{ API1_TAG }}"
}
service "api2" {
    desired-count {{ REPLICAS | default(value=1) }}
}
"#,
        );
        write(dir.path(), ".env", "ACCOUNT=111111111111\nREPLICAS=2\n");

        let loaded = temp_env::with_var_unset(DEFAULT_ACCOUNT_ENV, || {
            load_project_from_root(dir.path(), &LoadOptions::default()).unwrap()
        });

        assert!(!loaded.is_reference());
        assert_eq!(loaded.stack.account(), Some("111111111111"));
        assert_eq!(loaded.stack.service("api1").unwrap().image.tag, "v1");
        assert_eq!(loaded.stack.service("api2").unwrap().desired_count, 2);
        assert_eq!(loaded.assets_dir(), dir.path().join("../frontend"));
    }

    #[test]
    #[serial]
    fn test_context_overrides_variables_block() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "stack.kdl",
            r#"
variables {
    TAG "from-file"
}
service "api1" { tag "{{ TAG }}" }
service "api2"
"#,
        );

        let options = LoadOptions::default().with_context("TAG", "from-context");
        let loaded = load_project_from_root(dir.path(), &options).unwrap();
        assert_eq!(loaded.stack.service("api1").unwrap().image.tag, "from-context");
    }

    #[test]
    #[serial]
    fn test_stage_override_and_env() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "stack.kdl", r#"stack "InfraStack""#);
        write(
            dir.path(),
            "stack.prod.kdl",
            r#"service "api1" { desired-count {{ API1_COUNT }} }
service "api2""#,
        );
        write(dir.path(), ".env", "API1_COUNT=1\n");
        write(dir.path(), ".env.prod", "API1_COUNT=3\n");

        let options = LoadOptions::default().with_stage("prod");
        let loaded = load_project_from_root(dir.path(), &options).unwrap();

        assert_eq!(loaded.sources.len(), 2);
        assert_eq!(loaded.stack.service("api1").unwrap().desired_count, 3);
    }

    #[test]
    #[serial]
    fn test_account_resolution_order() {
        let settings = Settings {
            default_account: Some("444444444444".to_string()),
            ..Default::default()
        };

        temp_env::with_var(DEFAULT_ACCOUNT_ENV, Some("333333333333"), || {
            // コンテキストが環境変数より優先
            let options = LoadOptions {
                settings: settings.clone(),
                ..Default::default()
            }
            .with_context("account", "222222222222");
            let mut stack = StackDefinition::reference();
            resolve_account(&mut stack, &options);
            assert_eq!(stack.account(), Some("222222222222"));

            // 環境変数が設定より優先
            let options = LoadOptions {
                settings: settings.clone(),
                ..Default::default()
            };
            let mut stack = StackDefinition::reference();
            resolve_account(&mut stack, &options);
            assert_eq!(stack.account(), Some("333333333333"));

            // スタックファイルの指定が最優先
            let mut stack = StackDefinition::reference();
            stack.env.account = Some("111111111111".to_string());
            resolve_account(&mut stack, &options);
            assert_eq!(stack.account(), Some("111111111111"));
        });

        temp_env::with_var_unset(DEFAULT_ACCOUNT_ENV, || {
            let options = LoadOptions {
                settings: settings.clone(),
                ..Default::default()
            };
            let mut stack = StackDefinition::reference();
            resolve_account(&mut stack, &options);
            assert_eq!(stack.account(), Some("444444444444"));
        });
    }

    #[test]
    #[serial]
    fn test_load_reference_without_account() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = temp_env::with_var_unset(DEFAULT_ACCOUNT_ENV, || {
            load_reference(dir.path(), &LoadOptions::default()).unwrap()
        });

        assert!(loaded.is_reference());
        assert_eq!(loaded.stack.account(), None);
        assert!(matches!(
            require_account(&loaded.stack),
            Err(StackError::MissingAccount)
        ));
    }

    #[test]
    #[serial]
    fn test_load_rejects_invalid_stack() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "stack.kdl",
            r#"
load-balancer { ingress-cidr "0.0.0.0/0" }
service "api1"
service "api2" { port 5000 }
"#,
        );

        let result = temp_env::with_var_unset(DEFAULT_ACCOUNT_ENV, || {
            load_project_from_root(dir.path(), &LoadOptions::default())
        });
        match result {
            Err(StackError::Validation(issues)) => assert_eq!(issues.len(), 2),
            other => panic!("Expected Validation error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    #[serial]
    fn test_load_undefined_variable_reports_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "stack.kdl", "service \"api1\" { port {{ NOPE }} }");

        match load_project_from_root(dir.path(), &LoadOptions::default()) {
            Err(StackError::TemplateError { file, message }) => {
                assert!(file.ends_with("stack.kdl"));
                assert!(message.contains("NOPE"));
            }
            other => panic!("Expected TemplateError, got {:?}", other.map(|_| ())),
        }
    }
}
