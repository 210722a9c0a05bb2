//! Provider 层
//!
//! 每个 provider 都能"单题求解"和"生成总结"；支持视觉的 provider 额外实现
//! `DocumentSolver`，可以直接读整份文档。
//!
//! ```text
//! ProviderFactory ──(名称 / 自动检测)──▶ Provider
//!                                          ├─ TextOnly(SolverProvider)        openai, mock
//!                                          └─ VisionCapable(DocumentSolver)   gemini
//! ```
//!
//! 求解方法本身不返回错误：内部失败会被写进题目的 explanation，
//! 保证 N 道题总能得到 N 个结果。

pub mod factory;
pub mod gemini;
pub mod mock;
pub mod openai;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{AppResult, LlmError};
use crate::models::question::{ProblemType, ProviderDescriptor, Question};
use crate::services::llm_service::{ChatBackend, ChatRequest, LlmService};
use crate::services::prompts::{
    summary_prompt, FAILED_SUMMARY, SUMMARY_SYSTEM_PROMPT, UNAVAILABLE_SUMMARY,
};

pub use factory::{ProviderFactory, ProviderOptions, ProviderRegistry};
pub use gemini::GeminiProvider;
pub use mock::MockProvider;
pub use openai::OpenAiProvider;

const SUMMARY_MAX_TOKENS: u32 = 500;

/// 求解能力
#[async_trait]
pub trait SolverProvider: Send + Sync {
    /// 展示用名称，例如 "OpenAI"
    fn provider_name(&self) -> &str;

    fn supported_models(&self) -> Vec<String>;

    /// 构造时根据凭证是否存在确定，之后不变
    fn is_available(&self) -> bool;

    /// 是否需要 API Key 才能工作
    fn requires_api_key(&self) -> bool {
        true
    }

    /// 填写答案、解析和步骤；失败时把原因写进 explanation，不会返回错误
    async fn solve_single_question(&self, question: Question) -> Question;

    /// 整份作业的总结；失败时返回固定文案
    async fn generate_overall_explanation(&self, solved_questions: &[Question]) -> String;
}

/// 整份文档求解能力（仅视觉 provider）
#[async_trait]
pub trait DocumentSolver: SolverProvider {
    /// 识别并求解文档中的全部题目，按出现顺序返回，结果非空
    async fn solve_from_document(&self, path: &Path) -> Vec<Question>;

    fn as_solver(&self) -> &dyn SolverProvider;
}

/// 按能力区分的 provider
#[derive(Clone)]
pub enum Provider {
    TextOnly(Arc<dyn SolverProvider>),
    VisionCapable(Arc<dyn DocumentSolver>),
}

impl Provider {
    pub fn text_only(provider: impl SolverProvider + 'static) -> Self {
        Provider::TextOnly(Arc::new(provider))
    }

    pub fn vision_capable(provider: impl DocumentSolver + 'static) -> Self {
        Provider::VisionCapable(Arc::new(provider))
    }

    pub fn solver(&self) -> &dyn SolverProvider {
        match self {
            Provider::TextOnly(p) => p.as_ref(),
            Provider::VisionCapable(p) => p.as_solver(),
        }
    }

    /// 没有文档能力时返回 None，调用方应改走 OCR
    pub fn document_solver(&self) -> Option<&dyn DocumentSolver> {
        match self {
            Provider::TextOnly(_) => None,
            Provider::VisionCapable(p) => Some(p.as_ref()),
        }
    }

    pub fn supports_documents(&self) -> bool {
        matches!(self, Provider::VisionCapable(_))
    }

    pub fn provider_name(&self) -> &str {
        self.solver().provider_name()
    }

    pub fn supported_models(&self) -> Vec<String> {
        self.solver().supported_models()
    }

    pub fn is_available(&self) -> bool {
        self.solver().is_available()
    }

    /// 需要凭证且已经拿到凭证
    pub fn has_api_key(&self) -> bool {
        self.solver().requires_api_key() && self.is_available()
    }

    pub async fn solve_single_question(&self, question: Question) -> Question {
        self.solver().solve_single_question(question).await
    }

    pub async fn generate_overall_explanation(&self, solved_questions: &[Question]) -> String {
        self.solver()
            .generate_overall_explanation(solved_questions)
            .await
    }

    /// 当前状态的描述
    pub fn descriptor(&self, has_api_key: bool) -> ProviderDescriptor {
        ProviderDescriptor {
            provider_name: self.provider_name().to_string(),
            is_available: self.is_available(),
            supported_models: self.supported_models(),
            has_api_key,
            supports_documents: self.supports_documents(),
            error: None,
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.supports_documents() {
            "VisionCapable"
        } else {
            "TextOnly"
        };
        f.debug_struct("Provider")
            .field("kind", &kind)
            .field("name", &self.provider_name())
            .field("available", &self.is_available())
            .finish()
    }
}

// ========== 云端 provider 共用 ==========

/// 创建模型后端
///
/// 地址和模型名称总是会校验；没有凭证时返回 None，provider 仍可构造但不可用。
pub(crate) fn connect_backend(
    api_key: Option<&str>,
    api_base_url: &str,
    model: &str,
    timeout_secs: u64,
) -> AppResult<Option<Arc<dyn ChatBackend>>> {
    let service = LlmService::new(api_key.unwrap_or_default(), api_base_url, model, timeout_secs)?;
    let has_key = api_key.is_some_and(|key| !key.trim().is_empty());
    Ok(has_key.then(|| Arc::new(service) as Arc<dyn ChatBackend>))
}

/// 取出后端，没有凭证时返回 Unavailable
pub(crate) fn require_backend<'a>(
    backend: &'a Option<Arc<dyn ChatBackend>>,
    provider_name: &str,
) -> AppResult<&'a Arc<dyn ChatBackend>> {
    backend.as_ref().ok_or_else(|| {
        LlmError::Unavailable {
            provider: provider_name.to_string(),
        }
        .into()
    })
}

/// 云端 provider 共用的总结流程
pub(crate) async fn summarize_with_backend(
    backend: Option<&Arc<dyn ChatBackend>>,
    provider_name: &str,
    solved_questions: &[Question],
) -> String {
    let Some(backend) = backend else {
        return UNAVAILABLE_SUMMARY.to_string();
    };

    let request = ChatRequest::new(summary_prompt(solved_questions))
        .with_system(SUMMARY_SYSTEM_PROMPT)
        .with_max_tokens(SUMMARY_MAX_TOKENS);

    match backend.send_to_llm(request).await {
        Ok(text) => text,
        Err(e) => {
            warn!("⚠️ {} 生成总结失败: {}", provider_name, e);
            FAILED_SUMMARY.to_string()
        }
    }
}

/// 去重后的题型列表，保持首次出现的顺序
pub(crate) fn distinct_problem_types(questions: &[Question]) -> Vec<ProblemType> {
    let mut seen = Vec::new();
    for q in questions {
        if !seen.contains(&q.problem_type) {
            seen.push(q.problem_type);
        }
    }
    seen
}
