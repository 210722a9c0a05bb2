//! OpenAI provider（纯文本）
//!
//! 每道题一次调用，要求模型严格返回 JSON；解析失败视为调用失败。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::models::question::Question;
use crate::providers::{connect_backend, require_backend, summarize_with_backend, SolverProvider};
use crate::services::llm_service::{ChatBackend, ChatRequest};
use crate::services::prompts::{question_prompt, SOLVER_SYSTEM_PROMPT};
use crate::services::response_parser::{parse_solution_strict, SolutionFields};

pub const OPENAI_MODELS: &[&str] = &[
    "gpt-4",
    "gpt-4-turbo",
    "gpt-4-turbo-preview",
    "gpt-3.5-turbo",
    "gpt-3.5-turbo-16k",
];

const PROVIDER_NAME: &str = "OpenAI";

pub struct OpenAiProvider {
    backend: Option<Arc<dyn ChatBackend>>,
    model: String,
}

impl OpenAiProvider {
    /// 没有 api_key 时仍可构造，但 `is_available()` 为 false
    pub fn new(config: &Config, api_key: Option<&str>, model: &str) -> AppResult<Self> {
        let backend = connect_backend(
            api_key,
            &config.openai_api_base_url,
            model,
            config.llm_request_timeout_secs,
        )?;

        Ok(Self {
            backend,
            model: model.to_string(),
        })
    }

    /// 使用自定义后端（测试或其他兼容服务）
    pub fn with_backend(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            model: backend.model_name().to_string(),
            backend: Some(backend),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn try_solve(&self, question: &Question) -> AppResult<SolutionFields> {
        let backend = require_backend(&self.backend, PROVIDER_NAME)?;

        let request = ChatRequest::new(question_prompt(question)).with_system(SOLVER_SYSTEM_PROMPT);
        let reply = backend.send_to_llm(request).await?;

        Ok(parse_solution_strict(&reply)?)
    }
}

#[async_trait]
impl SolverProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supported_models(&self) -> Vec<String> {
        OPENAI_MODELS.iter().map(|m| m.to_string()).collect()
    }

    fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    async fn solve_single_question(&self, mut question: Question) -> Question {
        debug!("OpenAI ({}) 求解第 {} 题", self.model, question.question_number);

        match self.try_solve(&question).await {
            Ok(fields) => fields.apply_to(&mut question),
            Err(e) => {
                warn!("⚠️ OpenAI 求解第 {} 题失败: {}", question.question_number, e);
                question.explanation = Some(format!("Error solving this question with OpenAI: {}", e));
            }
        }
        question
    }

    async fn generate_overall_explanation(&self, solved_questions: &[Question]) -> String {
        summarize_with_backend(self.backend.as_ref(), PROVIDER_NAME, solved_questions).await
    }
}
