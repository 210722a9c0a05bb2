//! 求解编排器 - 编排层
//!
//! ## 职责
//!
//! 1. **逐题求解**：按顺序调用 provider，结果顺序与输入一致
//! 2. **生成总结**：全部题目完成后调用一次
//! 3. **文档入口**：provider 能读文档时直接交给它，否则先 OCR 再逐题求解
//! 4. **整体兜底**：求解过程 panic 或超时时，返回所有题目都标记为失败的结果
//!
//! 调用方总能拿到一个完整的 `Solution`。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{error, info};

use crate::config::Config;
use crate::error::AppResult;
use crate::models::question::{ExtractedContent, ProviderDescriptor, Question, Solution};
use crate::providers::{Provider, ProviderFactory};
use crate::services::extractor::{ContentExtractor, TesseractExtractor};
use crate::utils::logging::log_solution_summary;

const FALLBACK_ANSWER: &str = "Unable to solve - AI provider error";
const FALLBACK_STEPS: [&str; 4] = [
    "Error occurred during AI processing",
    "Check API key configuration",
    "Verify provider availability",
    "Contact support if issue persists",
];

/// 数学作业求解器
pub struct MathSolver {
    provider: Provider,
    extractor: Arc<dyn ContentExtractor>,
    document_timeout: Duration,
}

impl MathSolver {
    /// 使用指定 provider，OCR 使用 tesseract
    pub fn new(provider: Provider, config: &Config) -> Self {
        Self {
            provider,
            extractor: Arc::new(TesseractExtractor::new(config)),
            document_timeout: Duration::from_secs(config.document_timeout_secs.max(1)),
        }
    }

    /// 通过工厂选择 provider
    pub fn from_factory(
        factory: &ProviderFactory,
        provider_name: Option<&str>,
        model: Option<&str>,
        api_key: Option<&str>,
    ) -> AppResult<Self> {
        let provider = factory.get_provider(provider_name, model, api_key)?;
        info!("✓ 求解器已初始化，provider: {}", provider.provider_name());
        Ok(Self::new(provider, factory.config()))
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_timeout(mut self, document_timeout: Duration) -> Self {
        self.document_timeout = document_timeout;
        self
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// 当前 provider 的状态
    pub fn provider_info(&self) -> ProviderDescriptor {
        self.provider.descriptor(self.provider.has_api_key())
    }

    /// 求解已提取的题目
    pub async fn solve(&self, content: ExtractedContent) -> Solution {
        let start = Instant::now();
        let provider_name = self.provider.provider_name();
        info!(
            "🧮 开始求解 {} 道题目 (provider: {})",
            content.questions.len(),
            provider_name
        );

        let original = content.questions.clone();
        let work = AssertUnwindSafe(self.solve_questions(content.questions)).catch_unwind();

        let (solved, overall) = match tokio::time::timeout(self.document_timeout, work).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => {
                error!("❌ 使用 {} 求解时发生异常: {}", provider_name, panic_message(&*panic));
                self.fallback(original)
            }
            Err(_) => {
                error!(
                    "❌ 使用 {} 求解超时 ({} 秒)",
                    provider_name,
                    self.document_timeout.as_secs()
                );
                self.fallback(original)
            }
        };

        let solution = Solution::new(solved, overall, start.elapsed().as_secs_f64());
        log_solution_summary(&solution);
        solution
    }

    /// 求解一份文档（图片或 PDF）
    pub async fn solve_from_document(&self, path: &Path) -> Solution {
        let start = Instant::now();

        let Some(document_solver) = self.provider.document_solver() else {
            info!("🔍 {} 不支持直接读取文档，先进行 OCR", self.provider.provider_name());
            return match self.extractor.extract(path).await {
                Ok(content) => self.solve(content).await,
                Err(e) => {
                    error!("❌ 内容提取失败: {}", e);
                    Solution::new(
                        Vec::new(),
                        format!("Unable to process homework: content extraction failed ({}).", e),
                        start.elapsed().as_secs_f64(),
                    )
                }
            };
        };

        info!("📷 使用 {} 直接处理文档", document_solver.provider_name());
        let work = AssertUnwindSafe(async {
            let questions = document_solver.solve_from_document(path).await;
            let overall = document_solver.generate_overall_explanation(&questions).await;
            (questions, overall)
        })
        .catch_unwind();

        let (solved, overall) = match tokio::time::timeout(self.document_timeout, work).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => {
                error!("❌ 文档处理发生异常: {}", panic_message(&*panic));
                self.fallback(Vec::new())
            }
            Err(_) => {
                error!("❌ 文档处理超时 ({} 秒)", self.document_timeout.as_secs());
                self.fallback(Vec::new())
            }
        };

        let solution = Solution::new(solved, overall, start.elapsed().as_secs_f64());
        log_solution_summary(&solution);
        solution
    }

    async fn solve_questions(&self, questions: Vec<Question>) -> (Vec<Question>, String) {
        let total = questions.len();
        let mut solved = Vec::with_capacity(total);

        for (index, question) in questions.into_iter().enumerate() {
            info!("📝 [{}/{}] 求解第 {} 题", index + 1, total, question.question_number);
            solved.push(self.provider.solve_single_question(question).await);
        }

        let overall = self.provider.generate_overall_explanation(&solved).await;
        (solved, overall)
    }

    /// 所有题目都标记为 provider 错误
    fn fallback(&self, questions: Vec<Question>) -> (Vec<Question>, String) {
        let provider_name = self.provider.provider_name();

        let questions = questions
            .into_iter()
            .map(|mut q| {
                q.correct_answer = Some(FALLBACK_ANSWER.to_string());
                q.explanation = Some(format!(
                    "There was an error processing this question with the {} provider. Please try again or check your API configuration.",
                    provider_name
                ));
                q.steps = Some(FALLBACK_STEPS.iter().map(|s| s.to_string()).collect());
                q
            })
            .collect();

        let overall = format!(
            "Unable to process homework due to {} provider error. Please check your configuration and try again.",
            provider_name
        );
        (questions, overall)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
