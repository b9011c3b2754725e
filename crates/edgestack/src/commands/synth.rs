use crate::GlobalArgs;
use crate::utils::Workspace;
use colored::Colorize;
use edgestack_cloud::CloudAssembly;
use std::path::PathBuf;

pub fn handle(global: &GlobalArgs, out: Option<PathBuf>, quiet: bool) -> anyhow::Result<()> {
    let workspace = Workspace::load(global)?;
    let stack = workspace.stack();
    let out_dir = out.unwrap_or_else(|| workspace.output_dir());

    // テンプレートは stdout に出すので、進捗は stderr へ
    eprintln!("{}", "テンプレートを合成中...".blue());
    eprintln!("スタック: {} ({})", stack.name.cyan(), stack.env.uri());
    if stack.account().is_none() {
        eprintln!(
            "{}",
            "⚠ アカウントIDが未指定のため、環境非依存のテンプレートを生成します".yellow()
        );
    }

    let assets_dir = workspace.loaded.assets_dir();
    let assets = if assets_dir.is_dir() {
        Some(assets_dir.as_path())
    } else {
        eprintln!(
            "{} {}",
            "⚠ アセットディレクトリが見つかりません:".yellow(),
            assets_dir.display()
        );
        eprintln!("  オブジェクトキーはデプロイ時のパラメータになります");
        None
    };

    let assembly = CloudAssembly::build(stack, assets, &out_dir)?;
    edgestack_cloud::verify_references(&assembly.template)?;

    if !quiet {
        println!("{}", assembly.template.to_json_pretty()?);
    }

    eprintln!();
    eprintln!("{}", "✓ 合成が完了しました".green().bold());
    eprintln!(
        "  テンプレート: {} ({}リソース)",
        assembly.template_path().display().to_string().cyan(),
        assembly.template.resources.len()
    );
    if let Some(asset) = assembly.frontend_asset() {
        eprintln!(
            "  アセット: {} ({}ファイル)",
            assembly.asset_path(asset).display().to_string().cyan(),
            asset.file_count
        );
    }

    Ok(())
}
