mod commands;
mod utils;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "edgestack")]
#[command(about = "API とフロントエンドをひとつのスタックに。合成して、そのままデプロイ。", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// 全サブコマンド共通のオプション
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// コンテキスト（key=value、複数指定可）
    #[arg(short = 'c', long = "context", value_name = "KEY=VALUE", global = true)]
    pub context: Vec<String>,

    /// デプロイ先のアカウントID（-c account=... の省略形）
    #[arg(long, global = true)]
    pub account: Option<String>,

    /// ステージ名（stack.{stage}.kdl と .env.{stage} を読み込む）
    #[arg(short = 's', long, env = "EDGESTACK_STAGE", global = true)]
    pub stage: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// テンプレートを合成し、クラウドアセンブリを書き出す
    Synth {
        /// 出力ディレクトリ（既定: edgestack.out）
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// テンプレートを標準出力に表示しない
        #[arg(short, long)]
        quiet: bool,
    },
    /// スタック定義を検証
    Validate,
    /// スタックをデプロイ
    Deploy {
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// デプロイ済みスタックの出力値を表示
    Outputs {
        /// JSON形式で出力
        #[arg(long)]
        json: bool,
    },
    /// スタックを削除
    Destroy {
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // synth はテンプレートを stdout に出すので、ログは stderr へ
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match cli.command {
        Commands::Synth { out, quiet } => {
            commands::synth::handle(&cli.global, out, quiet)?;
        }
        Commands::Validate => {
            commands::validate::handle(&cli.global)?;
        }
        Commands::Deploy { yes } => {
            commands::deploy::handle(&cli.global, yes).await?;
        }
        Commands::Outputs { json } => {
            commands::outputs::handle(&cli.global, json).await?;
        }
        Commands::Destroy { yes } => {
            commands::destroy::handle(&cli.global, yes).await?;
        }
        Commands::Version => {
            println!("edgestack {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
