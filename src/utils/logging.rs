//! 日志工具模块
//!
//! 提供日志初始化和输出的辅助函数

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::models::question::Solution;

/// 初始化日志
///
/// `RUST_LOG` 优先；否则默认 info，`verbose` 时为 debug。
/// 重复调用（例如测试中）不会报错。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `provider_name`: 当前 provider
/// - `is_available`: provider 是否可用
pub fn log_startup(provider_name: &str, is_available: bool) {
    info!("{}", "=".repeat(60));
    info!("🚀 数学作业求解器启动");
    info!("🤖 Provider: {}", provider_name);
    if !is_available {
        warn!("⚠️ Provider 未配置 API Key，求解结果将只包含错误说明");
    }
    info!("{}", "=".repeat(60));
}

/// 打印求解结果统计
pub fn log_solution_summary(solution: &Solution) {
    let answered = solution
        .questions_solved
        .iter()
        .filter(|q| q.is_answered())
        .count();

    info!("\n{}", "─".repeat(60));
    info!("📊 求解完成: {}/{} 道题目有答案", answered, solution.total_questions);
    info!("⏱️ 耗时: {:.2} 秒", solution.processing_time_seconds);
    info!("📝 总结: {}", truncate_text(&solution.overall_explanation, 80));
    info!("{}", "─".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
