//! Gemini provider（支持视觉）
//!
//! 通过 Gemini 的 OpenAI 兼容端点调用。除单题求解外，还可以直接读整份文档：
//! - 图片：附带图片调用一次
//! - PDF：先整份发送；失败或没有结构化结果时逐页渲染成图片，每页调用一次后合并

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::models::question::Question;
use crate::providers::{
    connect_backend, require_backend, summarize_with_backend, DocumentSolver, SolverProvider,
};
use crate::services::document::{load_attachment, DocumentKind};
use crate::services::llm_service::{Attachment, ChatBackend, ChatRequest};
use crate::services::pdf_render::PdfRenderer;
use crate::services::prompts::{page_prompt, question_prompt, DOCUMENT_PROMPT, SOLVER_SYSTEM_PROMPT};
use crate::services::response_parser::{
    is_plausible_number, parse_solution_fields, recover, Recovered, RecoveryStage,
};

pub const GEMINI_MODELS: &[&str] = &[
    "gemini-pro",
    "gemini-pro-vision",
    "gemini-1.5-pro",
    "gemini-1.5-flash",
];

const PROVIDER_NAME: &str = "Google Gemini";
const DOCUMENT_MAX_TOKENS: u32 = 4096;

pub struct GeminiProvider {
    backend: Option<Arc<dyn ChatBackend>>,
    model: String,
    renderer: PdfRenderer,
}

impl GeminiProvider {
    pub fn new(config: &Config, api_key: Option<&str>, model: &str) -> AppResult<Self> {
        let backend = connect_backend(
            api_key,
            &config.gemini_api_base_url,
            model,
            config.llm_request_timeout_secs,
        )?;

        Ok(Self {
            backend,
            model: model.to_string(),
            renderer: PdfRenderer::new(config),
        })
    }

    /// 使用自定义后端，PDF 渲染使用默认配置
    pub fn with_backend(backend: Arc<dyn ChatBackend>) -> Self {
        Self::with_backend_and_config(backend, &Config::default())
    }

    pub fn with_backend_and_config(backend: Arc<dyn ChatBackend>, config: &Config) -> Self {
        Self {
            model: backend.model_name().to_string(),
            backend: Some(backend),
            renderer: PdfRenderer::new(config),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn try_solve_document(&self, path: &Path) -> AppResult<Vec<Question>> {
        let backend = require_backend(&self.backend, PROVIDER_NAME)?;
        let kind = DocumentKind::from_path(path);

        match kind {
            DocumentKind::Pdf => self.solve_pdf(backend, path).await,
            DocumentKind::Image { .. } => {
                let attachment = load_attachment(path, &kind).await?;
                let reply = backend.send_to_llm(document_request(DOCUMENT_PROMPT, attachment)).await?;
                Ok(merge_page_questions(vec![recover(&reply)]))
            }
        }
    }

    async fn solve_pdf(&self, backend: &Arc<dyn ChatBackend>, path: &Path) -> AppResult<Vec<Question>> {
        let attachment = load_attachment(path, &DocumentKind::Pdf).await?;

        match backend.send_to_llm(document_request(DOCUMENT_PROMPT, attachment)).await {
            Ok(reply) => {
                let recovered = recover(&reply);
                if recovered.is_structured() {
                    info!("✓ PDF 整份识别成功，共 {} 道题目", recovered.questions.len());
                    return Ok(merge_page_questions(vec![recovered]));
                }
                warn!("⚠️ PDF 整份识别没有得到结构化题目，改为逐页处理");
            }
            Err(e) => warn!("⚠️ PDF 整份发送失败: {}，改为逐页处理", e),
        }

        let pages = self.renderer.render_pages(path).await?;
        let total = pages.len();
        let mut page_results = Vec::with_capacity(total);

        for page in pages {
            info!("📄 处理第 {}/{} 页", page.page_number, total);
            let request = document_request(
                page_prompt(page.page_number, total),
                Attachment::new("image/png", page.png),
            );

            let recovered = match backend.send_to_llm(request).await {
                Ok(reply) => recover(&reply),
                Err(e) => {
                    warn!("⚠️ 第 {} 页调用失败: {}", page.page_number, e);
                    Recovered {
                        questions: vec![Question::diagnostic(
                            1,
                            format!("Unable to process page {}", page.page_number),
                            format!("Error processing page {} with Gemini: {}", page.page_number, e),
                            vec!["The page could not be analysed by the AI provider.".to_string()],
                        )],
                        stage: RecoveryStage::Fallback,
                    }
                }
            };
            page_results.push(recovered);
        }

        Ok(merge_page_questions(page_results))
    }
}

fn document_request(prompt: impl Into<String>, attachment: Attachment) -> ChatRequest {
    ChatRequest::new(prompt)
        .with_attachment(attachment)
        .with_max_tokens(DOCUMENT_MAX_TOKENS)
}

/// 合并逐页结果，题号在各页之间连续
///
/// 单次调用的结果也经过这里，当作只有一页。
///
/// - 没有结构化结果的页面跳过；所有页面都失败时返回第一页的兜底题目
/// - 页内题号严格递增且接在前面之后：保持原题号
/// - 页内题号严格递增但与前面重叠（模型每页从 1 开始编号）：整体平移到当前最大题号之后，保留页内间隔
/// - 页内题号重复、乱序或超出 `MAX_QUESTION_NUMBER`：按位置重新编号
pub fn merge_page_questions(pages: Vec<Recovered>) -> Vec<Question> {
    let mut merged: Vec<Question> = Vec::new();
    let mut first_fallback: Option<Vec<Question>> = None;
    let mut running_max = 0u32;

    for (index, page) in pages.into_iter().enumerate() {
        let page_number = index + 1;
        if !page.is_structured() {
            warn!("⚠️ 第 {} 页没有识别出题目，跳过", page_number);
            first_fallback.get_or_insert(page.questions);
            continue;
        }

        let keep_numbers = page
            .questions
            .windows(2)
            .all(|w| w[0].question_number < w[1].question_number)
            && page
                .questions
                .iter()
                .all(|q| is_plausible_number(&q.question_number));
        let first_number = page.questions.first().map_or(1, |q| q.question_number);

        if !keep_numbers {
            warn!("⚠️ 第 {} 页题号重复、乱序或不合理，按位置重新编号", page_number);
        }

        for (position, mut question) in page.questions.into_iter().enumerate() {
            let original = question.question_number;
            question.question_number = if !keep_numbers {
                running_max.saturating_add(position as u32).saturating_add(1)
            } else if first_number > running_max {
                original
            } else {
                running_max
                    .saturating_add(1)
                    .saturating_add(original - first_number)
            };
            if question.question_number != original {
                debug!("第 {} 页题号 {} → {}", page_number, original, question.question_number);
            }
            running_max = running_max.max(question.question_number);
            merged.push(question);
        }
    }

    if merged.is_empty() {
        error!("❌ 所有页面都没有识别出题目");
        return first_fallback.unwrap_or_default();
    }
    merged
}

#[async_trait]
impl SolverProvider for GeminiProvider {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supported_models(&self) -> Vec<String> {
        GEMINI_MODELS.iter().map(|m| m.to_string()).collect()
    }

    fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    async fn solve_single_question(&self, mut question: Question) -> Question {
        debug!("Gemini ({}) 求解第 {} 题", self.model, question.question_number);

        let result = match require_backend(&self.backend, PROVIDER_NAME) {
            Ok(backend) => {
                let request =
                    ChatRequest::new(question_prompt(&question)).with_system(SOLVER_SYSTEM_PROMPT);
                backend.send_to_llm(request).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(reply) => parse_solution_fields(&reply).apply_to(&mut question),
            Err(e) => {
                warn!("⚠️ Gemini 求解第 {} 题失败: {}", question.question_number, e);
                question.explanation = Some(format!("Error solving this question with Gemini: {}", e));
            }
        }
        question
    }

    async fn generate_overall_explanation(&self, solved_questions: &[Question]) -> String {
        summarize_with_backend(self.backend.as_ref(), PROVIDER_NAME, solved_questions).await
    }
}

#[async_trait]
impl DocumentSolver for GeminiProvider {
    async fn solve_from_document(&self, path: &Path) -> Vec<Question> {
        info!("📷 Gemini 直接读取文档: {}", path.display());

        match self.try_solve_document(path).await {
            Ok(questions) if !questions.is_empty() => questions,
            Ok(_) => vec![document_diagnostic(path, "no questions were returned")],
            Err(e) => {
                error!("❌ Gemini 文档处理失败: {}", e);
                vec![document_diagnostic(path, &e.to_string())]
            }
        }
    }

    fn as_solver(&self) -> &dyn SolverProvider {
        self
    }
}

fn document_diagnostic(path: &Path, reason: &str) -> Question {
    Question::diagnostic(
        1,
        format!("Unable to process document {}", path.display()),
        format!("Error processing document with Gemini: {}", reason),
        vec!["Check that the file is a readable image or PDF and try again.".to_string()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::ProblemType;
    use crate::services::llm_service::testing::ScriptedBackend;
    use crate::services::response_parser::fallback_question;

    fn structured(numbers: &[u32]) -> Recovered {
        Recovered {
            questions: numbers
                .iter()
                .map(|n| Question::new(*n, format!("q{}", n), ProblemType::Other))
                .collect(),
            stage: RecoveryStage::Strict,
        }
    }

    fn numbers(questions: &[Question]) -> Vec<u32> {
        questions.iter().map(|q| q.question_number).collect()
    }

    #[test]
    fn test_merge_renumbers_restarted_pages() {
        let merged = merge_page_questions(vec![structured(&[1, 2, 3]), structured(&[1, 2])]);
        assert_eq!(numbers(&merged), vec![1, 2, 3, 4, 5]);
        assert_eq!(merged[3].question_text, "q1");
    }

    #[test]
    fn test_merge_keeps_continuous_numbers() {
        let merged = merge_page_questions(vec![structured(&[1, 2]), structured(&[3, 5])]);
        assert_eq!(numbers(&merged), vec![1, 2, 3, 5]);
    }

    #[test]
    fn test_merge_keeps_gaps_when_shifting() {
        let merged = merge_page_questions(vec![structured(&[1, 2, 3]), structured(&[2, 4])]);
        assert_eq!(numbers(&merged), vec![1, 2, 3, 4, 6]);
    }

    #[test]
    fn test_merge_renumbers_out_of_order_page_by_position() {
        let merged = merge_page_questions(vec![structured(&[1, 2]), structured(&[2, 2, 1])]);
        assert_eq!(numbers(&merged), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_merge_renumbers_huge_numbers() {
        let merged = merge_page_questions(vec![structured(&[u32::MAX]), structured(&[1])]);
        assert_eq!(numbers(&merged), vec![1, 2]);
    }

    #[test]
    fn test_merge_single_page_with_duplicates() {
        let merged = merge_page_questions(vec![structured(&[1, 1])]);
        assert_eq!(numbers(&merged), vec![1, 2]);
    }

    #[test]
    fn test_merge_skips_failed_pages() {
        let failed = Recovered {
            questions: vec![fallback_question("garbage")],
            stage: RecoveryStage::Fallback,
        };
        let merged = merge_page_questions(vec![structured(&[1, 2]), failed.clone(), structured(&[1])]);
        assert_eq!(numbers(&merged), vec![1, 2, 3]);

        let merged = merge_page_questions(vec![failed.clone(), failed]);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].correct_answer.is_none());
    }

    #[tokio::test]
    async fn test_single_image_document() {
        let reply = r#"{"questions":[{"question_number":1,"question_text":"2+2","problem_type":"calculation","options":null,"correct_answer":"4","explanation":"add","steps":["2+2=4"]}]}"#;
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(reply)]));
        let provider = GeminiProvider::with_backend(backend.clone());

        let path = std::env::temp_dir().join(format!("sheet-{}.png", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"fake png").await.unwrap();

        let questions = provider.solve_from_document(&path).await;
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].correct_answer.as_deref(), Some("4"));

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].attachments[0].mime_type, "image/png");
        assert_eq!(requests[0].max_tokens, DOCUMENT_MAX_TOKENS);
    }

    #[tokio::test]
    async fn test_single_image_duplicate_numbers_are_renumbered() {
        let reply = r#"{"questions":[{"question_number":1,"question_text":"a"},{"question_number":1,"question_text":"b"}]}"#;
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(reply)]));
        let provider = GeminiProvider::with_backend(backend);

        let path = std::env::temp_dir().join(format!("sheet-{}.jpg", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"fake jpg").await.unwrap();

        let questions = provider.solve_from_document(&path).await;
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(numbers(&questions), vec![1, 2]);
        assert_eq!(questions[1].question_text, "b");
    }

    #[tokio::test]
    async fn test_missing_document_yields_diagnostic() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let provider = GeminiProvider::with_backend(backend.clone());

        let questions = provider
            .solve_from_document(Path::new("/no/such/sheet.jpg"))
            .await;
        assert_eq!(questions.len(), 1);
        assert!(questions[0]
            .explanation
            .as_deref()
            .unwrap()
            .starts_with("Error processing document with Gemini"));
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_pdf_direct_failure_falls_back_to_pages() {
        let config = Config {
            pdftoppm_cmd: "pdftoppm-does-not-exist".to_string(),
            ..Config::default()
        };
        let backend = Arc::new(ScriptedBackend::new(vec![Err("pdf not supported")]));
        let provider = GeminiProvider::with_backend_and_config(backend.clone(), &config);

        let path = std::env::temp_dir().join(format!("sheet-{}.pdf", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"%PDF-1.4").await.unwrap();

        let questions = provider.solve_from_document(&path).await;
        tokio::fs::remove_file(&path).await.unwrap();

        // 整份发送失败后尝试渲染，渲染器不存在，最终得到一条诊断题目
        assert_eq!(backend.request_count(), 1);
        assert_eq!(questions.len(), 1);
        assert!(questions[0].explanation.as_deref().unwrap().contains("PDF渲染失败"));
    }

    #[tokio::test]
    async fn test_pdf_direct_success_skips_rendering() {
        let config = Config {
            pdftoppm_cmd: "pdftoppm-does-not-exist".to_string(),
            ..Config::default()
        };
        let reply = r#"{"questions":[{"question_number":1,"question_text":"12 x 8","correct_answer":"96"},{"question_number":2,"question_text":"15 - 7","correct_answer":"8"}]}"#;
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(reply)]));
        let provider = GeminiProvider::with_backend_and_config(backend.clone(), &config);

        let path = std::env::temp_dir().join(format!("sheet-{}.pdf", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"%PDF-1.4").await.unwrap();

        let questions = provider.solve_from_document(&path).await;
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(backend.request_count(), 1);
        assert_eq!(numbers(&questions), vec![1, 2]);
        assert_eq!(questions[0].correct_answer.as_deref(), Some("96"));
        assert_eq!(
            backend.requests.lock().unwrap()[0].attachments[0].mime_type,
            "application/pdf"
        );
    }

    #[tokio::test]
    async fn test_pdf_prose_reply_falls_back_to_pages() {
        let config = Config {
            pdftoppm_cmd: "pdftoppm-does-not-exist".to_string(),
            ..Config::default()
        };
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(
            "I can see a worksheet with a few arithmetic problems.",
        )]));
        let provider = GeminiProvider::with_backend_and_config(backend.clone(), &config);

        let path = std::env::temp_dir().join(format!("sheet-{}.pdf", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"%PDF-1.4").await.unwrap();

        let questions = provider.solve_from_document(&path).await;
        tokio::fs::remove_file(&path).await.unwrap();

        // 没有结构化题目时改为逐页渲染，渲染器不存在
        assert_eq!(backend.request_count(), 1);
        assert_eq!(questions.len(), 1);
        assert!(questions[0].explanation.as_deref().unwrap().contains("PDF渲染失败"));
    }

    #[tokio::test]
    async fn test_question_kept_when_backend_fails() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err("quota exceeded")]));
        let provider = GeminiProvider::with_backend(backend);

        let solved = provider
            .solve_single_question(Question::new(4, "What is 12 x 8?", ProblemType::Calculation))
            .await;
        assert_eq!(solved.question_number, 4);
        assert_eq!(solved.question_text, "What is 12 x 8?");
        assert!(solved.correct_answer.is_none());
        assert!(solved
            .explanation
            .as_deref()
            .unwrap()
            .starts_with("Error solving this question with Gemini"));
        assert!(solved.explanation.as_deref().unwrap().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_loose_question_reply() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(
            "```json\n{\"correct_answer\": \"35%\", \"explanation\": \"7 of 20\", \"steps\": [\"7/20\"]}\n```",
        )]));
        let provider = GeminiProvider::with_backend(backend);

        let solved = provider
            .solve_single_question(Question::new(2, "shaded?", ProblemType::MultipleChoice))
            .await;
        assert_eq!(solved.correct_answer.as_deref(), Some("35%"));
        assert_eq!(solved.steps, Some(vec!["7/20".to_string()]));
    }

    #[tokio::test]
    async fn test_prose_question_reply() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(
            "Step 1: count the rectangles\nStep 2: divide\nAnswer: 35%",
        )]));
        let provider = GeminiProvider::with_backend(backend);

        let solved = provider
            .solve_single_question(Question::new(2, "shaded?", ProblemType::MultipleChoice))
            .await;
        assert_eq!(solved.correct_answer.as_deref(), Some("35%"));
        assert_eq!(solved.steps.as_ref().unwrap().len(), 2);
    }
}
