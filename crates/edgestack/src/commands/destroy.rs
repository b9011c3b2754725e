use crate::GlobalArgs;
use crate::utils::Workspace;
use colored::Colorize;
use edgestack_cloud::CloudProvider;

pub async fn handle(global: &GlobalArgs, yes: bool) -> anyhow::Result<()> {
    let workspace = Workspace::load(global)?;
    let provider = workspace.provider()?;
    let stack = workspace.stack();

    let state = provider.get_state().await?;
    if state.is_empty() {
        println!(
            "{}",
            format!("スタック '{}' はデプロイされていません", stack.name).yellow()
        );
        return Ok(());
    }

    println!("{}", "スタックを削除します".blue().bold());
    println!(
        "スタック: {} ({}リソース)",
        stack.name.cyan(),
        state.resources.len()
    );

    if !yes {
        println!();
        println!(
            "{}",
            "警告: バケット内のオブジェクトを含め、すべてのリソースを削除します。".yellow()
        );
        println!("実行するには --yes オプションを指定してください");
        return Ok(());
    }

    let result = provider.destroy_all().await?;
    for failure in &result.failed {
        println!(
            "  ✗ {}: {}",
            failure.action_id.red(),
            failure.error.as_deref().unwrap_or("")
        );
    }
    if !result.is_success() {
        anyhow::bail!("{}件のリソースを削除できませんでした", result.failed.len());
    }

    println!(
        "{}",
        format!("✓ スタックを削除しました ({}件)", result.succeeded.len())
            .green()
            .bold()
    );
    if !result.retained.is_empty() {
        println!("保持されたリソース (Retain):");
        for id in &result.retained {
            println!("  • {}", id.cyan());
        }
    }
    Ok(())
}
