use crate::GlobalArgs;
use crate::utils::Workspace;
use colored::Colorize;

pub fn handle(global: &GlobalArgs) -> anyhow::Result<()> {
    println!("{}", "スタック定義を検証中...".blue());

    let workspace = match Workspace::load(global) {
        Ok(workspace) => workspace,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 設定エラー".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };
    workspace.print_sources();

    // 参照の整合性は合成してから確認する
    if let Err(e) = edgestack_cloud::synthesize(workspace.stack(), None)
        .and_then(|template| edgestack_cloud::verify_references(&template))
    {
        eprintln!();
        eprintln!("{}", "✗ 合成エラー".red().bold());
        eprintln!("  {}", e);
        std::process::exit(1);
    }

    let stack = workspace.stack();
    println!("{}", "✓ スタック定義は正常です！".green().bold());
    println!();
    println!("サマリー:");
    println!("  スタック: {} ({})", stack.name.cyan(), stack.env.uri());
    println!(
        "  ネットワーク: {} (AZ {}個, NAT {}個)",
        stack.network.cidr, stack.network.max_azs, stack.network.nat_gateways
    );
    println!("  サービス: {}個", stack.services.len());
    for service in &stack.services {
        println!(
            "    - {} ({}:{}, {} → :{})",
            service.name.cyan(),
            service.image.repository,
            service.image.tag,
            service.path_pattern,
            service.port
        );
    }
    println!(
        "  フロントエンド: {}",
        workspace.loaded.assets_dir().display()
    );

    Ok(())
}
