//! # Homework Solver
//!
//! 一个用于解答数学作业的 Rust 库：输入题目或作业文档（图片 / PDF），
//! 输出每道题的答案、解析、步骤以及整份作业的总结。
//!
//! ## 架构设计
//!
//! ### ① 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程
//! - `LlmService` - 调用 OpenAI 兼容的模型接口
//! - `response_parser` - 把模型的不可靠输出恢复成结构化题目
//! - `PdfRenderer` / `TesseractExtractor` - 文档渲染与 OCR
//!
//! ### ② Provider 层（Providers）
//! - `providers/` - 可插拔的求解后端：OpenAI、Gemini（支持读文档）、Mock
//! - `ProviderFactory` - 按名称或凭证自动选择 provider
//!
//! ### ③ 编排层（Orchestration）
//! - `orchestrator/math_solver` - 逐题求解、生成总结、整体兜底
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod services;
pub mod utils;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::question::{ExtractedContent, ProblemType, ProviderDescriptor, Question, Solution};
pub use orchestrator::MathSolver;
pub use providers::{
    DocumentSolver, GeminiProvider, MockProvider, OpenAiProvider, Provider, ProviderFactory,
    ProviderOptions, ProviderRegistry, SolverProvider,
};
pub use services::response_parser::{recover, recover_questions, Recovered, RecoveryStage};
