use crate::GlobalArgs;
use crate::utils::{self, Workspace};
use colored::Colorize;
use edgestack_cloud::{ActionType, CloudAssembly, CloudProvider, ResourceSet};

pub async fn handle(global: &GlobalArgs, yes: bool) -> anyhow::Result<()> {
    println!("{}", "デプロイを開始します...".blue().bold());
    let workspace = Workspace::load(global)?;
    workspace.print_sources();

    let stack = workspace.stack();
    let provider = workspace.provider()?;
    println!("スタック: {} ({})", stack.name.cyan(), stack.env.uri());

    let assets_dir = workspace.loaded.assets_dir();
    if !assets_dir.is_dir() {
        anyhow::bail!(
            "アセットディレクトリが見つかりません: {}",
            assets_dir.display()
        );
    }

    // 1. 合成
    println!();
    println!("{}", "【Step 1/3】テンプレートを合成中...".yellow());
    let assembly = CloudAssembly::build(stack, Some(assets_dir.as_path()), &workspace.output_dir())?;
    edgestack_cloud::verify_references(&assembly.template)?;
    println!(
        "  ✓ {} ({}リソース)",
        assembly.template_path().display().to_string().cyan(),
        assembly.template.resources.len()
    );

    // 2. 差分
    println!();
    println!("{}", "【Step 2/3】変更内容を計算中...".yellow());
    let desired = ResourceSet::from_template(&stack.name, &assembly.template);
    let plan = provider.plan(&desired).await?;
    for action in plan
        .actions
        .iter()
        .filter(|a| a.action_type != ActionType::NoOp)
    {
        let marker = match action.action_type {
            ActionType::Create => "+".green(),
            ActionType::Update => "~".yellow(),
            ActionType::Delete => "-".red(),
            ActionType::NoOp => " ".normal(),
        };
        println!("  {} {}", marker, action.description);
    }
    println!("  {}", plan.summary());

    // 確認（--yesが指定されていない場合）
    if !yes {
        println!();
        println!("{}", "警告: 上記の変更をスタックに適用します。".yellow());
        println!("実行するには --yes オプションを指定してください");
        return Ok(());
    }

    let auth = provider.check_auth().await?;
    if !auth.authenticated {
        anyhow::bail!(
            "認証に失敗しました: {}",
            auth.error.unwrap_or_default()
        );
    }

    // 3. 適用
    println!();
    println!("{}", "【Step 3/3】変更を適用中...".yellow());
    let result = provider.apply(&plan).await?;
    for failure in &result.failed {
        println!(
            "  ✗ {}: {}",
            failure.action_id.red(),
            failure.error.as_deref().unwrap_or("")
        );
    }
    if !result.is_success() {
        anyhow::bail!("{}件のリソースでデプロイに失敗しました", result.failed.len());
    }

    println!();
    println!(
        "{}",
        format!(
            "✓ デプロイが完了しました ({}件, {}ms)",
            result.succeeded.len(),
            result.duration_ms
        )
        .green()
        .bold()
    );
    println!();
    utils::print_outputs(&stack.name, &provider.outputs().await?);

    Ok(())
}
