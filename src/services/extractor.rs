//! 内容提取（OCR）- 外部能力
//!
//! 只有当前 provider 不能直接读文档时才会用到。默认实现调用 `tesseract` 命令行，
//! PDF 先逐页渲染再识别；识别出的文字再按行切分成题目。

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, AppResult, ExtractionError};
use crate::models::question::{ExtractedContent, ProblemType, Question};
use crate::services::document::DocumentKind;
use crate::services::pdf_render::PdfRenderer;

const IMAGE_CONFIDENCE: f32 = 0.80;
const PDF_CONFIDENCE: f32 = 0.85;

/// 文档内容提取能力
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> AppResult<ExtractedContent>;
}

/// 基于 tesseract 命令行的提取器
pub struct TesseractExtractor {
    command: String,
    renderer: PdfRenderer,
}

impl TesseractExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            command: config.tesseract_cmd.clone(),
            renderer: PdfRenderer::new(config),
        }
    }

    /// 识别一张图片（通过 stdin 传入字节）
    async fn ocr_bytes(&self, label: &str, image: &[u8]) -> AppResult<String> {
        let ocr_err = |reason: String| {
            AppError::Extraction(ExtractionError::OcrFailed {
                path: label.to_string(),
                reason,
            })
        };

        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "--psm", "6"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ocr_err(format!("无法启动 {}: {}", self.command, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(image)
                .await
                .map_err(|e| ocr_err(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ocr_err(e.to_string()))?;
        if !output.status.success() {
            return Err(ocr_err(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl ContentExtractor for TesseractExtractor {
    async fn extract(&self, path: &Path) -> AppResult<ExtractedContent> {
        let label = path.display().to_string();
        info!("🔍 OCR 提取: {}", label);

        let (raw_text, images_found, confidence) = match DocumentKind::from_path(path) {
            DocumentKind::Pdf => {
                let pages = self.renderer.render_pages(path).await?;
                let mut all_text = String::new();
                for page in &pages {
                    let page_label = format!("{}#{}", label, page.page_number);
                    let text = self.ocr_bytes(&page_label, &page.png).await?;
                    all_text.push_str(&format!("Page {}:\n{}\n\n", page.page_number, text));
                }
                (all_text, pages.len() as u32, PDF_CONFIDENCE)
            }
            DocumentKind::Image { .. } => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| AppError::file_read_failed(&label, e))?;
                (self.ocr_bytes(&label, &bytes).await?, 1, IMAGE_CONFIDENCE)
            }
        };

        if raw_text.trim().is_empty() {
            return Err(ExtractionError::EmptyText { path: label }.into());
        }

        let questions = parse_questions_from_text(&raw_text);
        info!("✓ OCR 完成，识别出 {} 道题目", questions.len());

        Ok(ExtractedContent::new(raw_text, questions, images_found, confidence))
    }
}

// ========== 文本切题 ==========

static QUESTION_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\.?\s*(.+)$").expect("question start pattern is valid"));

static OPTION_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\(([1-4A-Da-d])\)\s*(.+)$").expect("option pattern is valid")
});

static PAGE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Page \d+:$").expect("page header pattern is valid"));

static ALGEBRA_VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[xy]\b").expect("variable pattern is valid"));

/// 从 OCR 文本中切出题目
///
/// 以数字开头的行开始一道新题，`(A)` / `(1)` 开头的行是选项，其余行拼到当前题干后面。
pub fn parse_questions_from_text(text: &str) -> Vec<Question> {
    let mut questions = Vec::new();
    let mut current: Option<(u32, String, Vec<String>)> = None;

    let lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !PAGE_HEADER.is_match(line));

    for line in lines {
        if let Some(caps) = OPTION_LINE.captures(line) {
            if let Some((_, _, options)) = current.as_mut() {
                options.push(caps[2].trim().to_string());
            }
            continue;
        }

        if let Some(caps) = QUESTION_START.captures(line) {
            if let Some((number, text, options)) = current.take() {
                questions.push(build_question(number, text, options));
            }
            let number = caps[1].parse().unwrap_or(questions.len() as u32 + 1);
            current = Some((number, caps[2].trim().to_string(), Vec::new()));
            continue;
        }

        if let Some((_, text, _)) = current.as_mut() {
            text.push(' ');
            text.push_str(line);
        }
    }

    if let Some((number, text, options)) = current {
        questions.push(build_question(number, text, options));
    }

    debug!("文本切题完成，共 {} 道", questions.len());
    questions
}

fn build_question(number: u32, text: String, options: Vec<String>) -> Question {
    let problem_type = classify_problem_type(&text, &options);
    Question::new(number, text, problem_type).with_options(options)
}

/// 按关键词粗略判断题型
pub fn classify_problem_type(text: &str, options: &[String]) -> ProblemType {
    let lower = text.to_lowercase();
    let has_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if !options.is_empty() {
        ProblemType::MultipleChoice
    } else if has_any(&["percent", "percentage", "%"]) {
        ProblemType::Calculation
    } else if has_any(&["rectangle", "square", "circle", "triangle", "area", "perimeter"]) {
        ProblemType::Geometry
    } else if has_any(&["solve", "equation", "variable"]) || ALGEBRA_VARIABLE.is_match(&lower) {
        ProblemType::Algebra
    } else if has_any(&["word", "story", "john", "mary", "total", "altogether"]) {
        ProblemType::WordProblem
    } else {
        ProblemType::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_questions_with_options() {
        let text = "Page 1:\n1. Which one of the following is sixty-three thousand\nand forty in numerals?\n(1) 6340\n(2) 63 040\n(3) 63 400\n(4) 630 040\n2 Find the area of a rectangle 12 cm by 8 cm.\n";
        let questions = parse_questions_from_text(text);

        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].question_number, 1);
        assert_eq!(
            questions[0].question_text,
            "Which one of the following is sixty-three thousand and forty in numerals?"
        );
        assert_eq!(questions[0].problem_type, ProblemType::MultipleChoice);
        assert_eq!(questions[0].options.as_ref().unwrap().len(), 4);
        assert_eq!(questions[1].problem_type, ProblemType::Geometry);
        assert!(questions[1].options.is_none());
    }

    #[test]
    fn test_text_without_numbers_yields_nothing() {
        assert!(parse_questions_from_text("just some words\n(A) stray option").is_empty());
    }

    #[test]
    fn test_classify_problem_type() {
        assert_eq!(classify_problem_type("What percentage is shaded?", &[]), ProblemType::Calculation);
        assert_eq!(classify_problem_type("Solve 3x = 9", &[]), ProblemType::Algebra);
        assert_eq!(classify_problem_type("If y + 2 = 5, find y", &[]), ProblemType::Algebra);
        assert_eq!(classify_problem_type("John has 15 apples", &[]), ProblemType::WordProblem);
        assert_eq!(classify_problem_type("Next number: 2, 4, 6", &[]), ProblemType::Other);
    }

    #[tokio::test]
    async fn test_missing_tesseract_binary() {
        let config = Config {
            tesseract_cmd: "tesseract-does-not-exist".to_string(),
            ..Config::default()
        };
        let extractor = TesseractExtractor::new(&config);

        let path = std::env::temp_dir().join(format!("ocr-{}.png", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, [0u8; 8]).await.unwrap();

        let err = extractor.extract(&path).await.unwrap_err();
        assert!(matches!(err, AppError::Extraction(ExtractionError::OcrFailed { .. })));

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
