use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use homework_solver::models::{load_all_toml_files, load_toml_to_extracted_content};
use homework_solver::utils::logging;
use homework_solver::{Config, ExtractedContent, MathSolver, ProviderFactory};

/// 数学作业求解器
#[derive(Debug, Parser)]
#[command(name = "homework-solver", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// provider 名称：openai / gemini / mock / auto
    #[arg(long, global = true, env = "AI_PROVIDER")]
    provider: Option<String>,

    /// 覆盖默认模型
    #[arg(long, global = true, env = "AI_MODEL")]
    model: Option<String>,

    /// 覆盖环境中的 API Key
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// 结果写入文件（默认输出到标准输出）
    #[arg(long, short, global = true)]
    output: Option<PathBuf>,

    /// 详细日志
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 求解一份作业文档（图片或 PDF）
    Solve {
        file: PathBuf,
        /// 写入结果的作业 ID
        #[arg(long)]
        problem_id: Option<String>,
    },
    /// 求解已提取好的题目（TOML 文件或包含 TOML 文件的目录）
    SolveContent { path: PathBuf },
    /// 列出所有 provider 及其状态
    Providers,
    /// 用内置样例演示一次求解
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env();
    logging::init(cli.verbose || config.verbose_logging);

    let factory = ProviderFactory::new(config);

    if let Command::Providers = cli.command {
        return emit(&factory.list_providers(), cli.output.as_deref()).await;
    }

    let solver = MathSolver::from_factory(
        &factory,
        cli.provider.as_deref(),
        cli.model.as_deref(),
        cli.api_key.as_deref(),
    )?;
    logging::log_startup(solver.provider().provider_name(), solver.provider().is_available());

    match cli.command {
        Command::Solve { file, problem_id } => {
            if !file.exists() {
                anyhow::bail!("文件不存在: {}", file.display());
            }
            let solution = solver.solve_from_document(&file).await;
            let solution = match problem_id {
                Some(id) => solution.with_problem_id(id),
                None => solution,
            };
            emit(&solution, cli.output.as_deref()).await
        }
        Command::SolveContent { path } => {
            let documents = load_contents(&path).await?;
            info!("✓ 加载了 {} 份作业", documents.len());

            let mut solutions = Vec::with_capacity(documents.len());
            for content in documents {
                solutions.push(solver.solve(content).await);
            }
            emit(&solutions, cli.output.as_deref()).await
        }
        Command::Demo => {
            let solution = solver.solve(ExtractedContent::sample()).await;
            emit(&solution, cli.output.as_deref()).await
        }
        Command::Providers => Ok(()),
    }
}

async fn load_contents(path: &Path) -> Result<Vec<ExtractedContent>> {
    if path.is_dir() {
        let folder = path.to_str().context("目录路径不是合法的 UTF-8")?;
        load_all_toml_files(folder).await
    } else {
        Ok(vec![load_toml_to_extracted_content(path).await?])
    }
}

/// 以 JSON 输出结果
async fn emit<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("无法写入结果文件: {}", path.display()))?;
            info!("💾 结果已保存至: {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
