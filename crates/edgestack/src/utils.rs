use crate::GlobalArgs;
use colored::Colorize;
use edgestack_cloud::LocalProvider;
use edgestack_config::Settings;
use edgestack_core::{LoadOptions, LoadedStack, StackDefinition};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// ロード済みのスタックとユーザー設定
pub struct Workspace {
    pub loaded: LoadedStack,
    pub settings: Settings,
}

impl Workspace {
    /// スタックファイルがあればロード、なければ既定トポロジーを使う
    pub fn load(global: &GlobalArgs) -> anyhow::Result<Self> {
        let settings = Settings::load()?;
        let options = load_options(global, settings.clone())?;
        let loaded = edgestack_core::load_or_reference(&options)?;
        tracing::debug!(
            project_root = %loaded.project_root.display(),
            reference = loaded.is_reference(),
            "Loaded workspace"
        );
        Ok(Self { loaded, settings })
    }

    pub fn stack(&self) -> &StackDefinition {
        &self.loaded.stack
    }

    /// クラウドアセンブリの出力先
    pub fn output_dir(&self) -> PathBuf {
        self.loaded.project_root.join(self.settings.output_dir())
    }

    /// ローカルデプロイ状態の保存先
    pub fn state_dir(&self) -> PathBuf {
        self.loaded.project_root.join(self.settings.state_dir())
    }

    /// デプロイ先のプロバイダー（アカウントIDが必須）
    pub fn provider(&self) -> anyhow::Result<LocalProvider> {
        if edgestack_core::require_account(self.stack()).is_err() {
            anyhow::bail!(
                "アカウントIDが解決できません\n\
                 --account、-c account=<id>、環境変数 CDK_DEFAULT_ACCOUNT、\
                 settings.yaml の default_account のいずれかで指定してください"
            );
        }
        Ok(LocalProvider::for_stack(
            self.stack(),
            self.state_dir(),
            self.output_dir(),
        )?)
    }

    /// 読み込んだスタックファイルを表示
    pub fn print_sources(&self) {
        if self.loaded.is_reference() {
            println!(
                "📄 スタックファイルなし: {}",
                "既定トポロジーを使用します".yellow()
            );
            return;
        }
        println!("📄 読み込んだスタックファイル:");
        for source in &self.loaded.sources {
            println!("  • {}", source.display().to_string().cyan());
        }
    }
}

/// グローバルオプションからロードオプションを組み立てる
pub fn load_options(global: &GlobalArgs, settings: Settings) -> anyhow::Result<LoadOptions> {
    let mut options = LoadOptions {
        stage: global.stage.clone(),
        settings,
        ..Default::default()
    };
    for arg in &global.context {
        let (key, value) = edgestack_core::parse_context_arg(arg)?;
        options.context.insert(key, value);
    }
    // --account は -c account=... より優先
    if let Some(account) = &global.account {
        options = options.with_context(edgestack_core::loader::ACCOUNT_CONTEXT_KEY, account);
    }
    Ok(options)
}

/// スタック出力を表示
pub fn print_outputs(stack_name: &str, outputs: &BTreeMap<String, String>) {
    println!("{}", "Outputs:".bold());
    for (name, value) in outputs {
        println!("  {}.{} = {}", stack_name, name.cyan(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_options_collects_context() {
        let global = GlobalArgs {
            context: vec!["account=222222222222".to_string(), "tier=web".to_string()],
            account: None,
            stage: Some("prod".to_string()),
        };
        let options = load_options(&global, Settings::default()).unwrap();
        assert_eq!(options.stage.as_deref(), Some("prod"));
        assert_eq!(options.context["account"], "222222222222");
        assert_eq!(options.context["tier"], "web");
    }

    #[test]
    fn test_load_options_account_flag_wins() {
        let global = GlobalArgs {
            context: vec!["account=222222222222".to_string()],
            account: Some("111111111111".to_string()),
            stage: None,
        };
        let options = load_options(&global, Settings::default()).unwrap();
        assert_eq!(options.context["account"], "111111111111");
    }

    #[test]
    fn test_load_options_rejects_malformed_context() {
        let global = GlobalArgs {
            context: vec!["no-equals".to_string()],
            ..Default::default()
        };
        assert!(load_options(&global, Settings::default()).is_err());
    }
}
