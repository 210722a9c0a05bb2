//! 编排层（Orchestration Layer）
//!
//! ## 层次关系
//!
//! ```text
//! MathSolver (处理一份作业)
//!     ↓
//! providers (单题求解 / 整份文档求解)
//!     ↓
//! services (能力层：llm / 输出恢复 / 文档 / OCR)
//! ```
//!
//! 编排层只做调度、计时和兜底，不做具体的解题判断。

pub mod math_solver;

pub use math_solver::MathSolver;
