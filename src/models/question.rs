use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 题目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    MultipleChoice,
    WordProblem,
    Calculation,
    Geometry,
    Algebra,
    #[default]
    #[serde(other)]
    Other,
}

impl ProblemType {
    /// 序列化名称
    pub fn as_str(self) -> &'static str {
        match self {
            ProblemType::MultipleChoice => "multiple_choice",
            ProblemType::WordProblem => "word_problem",
            ProblemType::Calculation => "calculation",
            ProblemType::Geometry => "geometry",
            ProblemType::Algebra => "algebra",
            ProblemType::Other => "other",
        }
    }

    /// 宽松解析，模型返回的大小写、空格、连字符都兼容，无法识别时归为 Other
    pub fn parse_lenient(value: &str) -> Self {
        let normalized = value.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "multiple_choice" => ProblemType::MultipleChoice,
            "word_problem" => ProblemType::WordProblem,
            "calculation" => ProblemType::Calculation,
            "geometry" => ProblemType::Geometry,
            "algebra" => ProblemType::Algebra,
            _ => ProblemType::Other,
        }
    }
}

impl std::fmt::Display for ProblemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单道数学题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub question_number: u32,
    pub question_text: String,
    pub problem_type: ProblemType,
    /// 选择题选项（仅选择题有，且非空）
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub correct_answer: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub steps: Option<Vec<String>>,
}

impl Question {
    /// 创建未作答的题目
    pub fn new(question_number: u32, question_text: impl Into<String>, problem_type: ProblemType) -> Self {
        Self {
            question_number,
            question_text: question_text.into(),
            problem_type,
            options: None,
            correct_answer: None,
            explanation: None,
            steps: None,
        }
    }

    /// 附加选项，空列表视为没有选项
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let options: Vec<String> = options.into_iter().map(Into::into).collect();
        self.options = if options.is_empty() { None } else { Some(options) };
        self
    }

    /// 构建一道"出错"题目，用于各级兜底
    pub fn diagnostic(
        question_number: u32,
        question_text: impl Into<String>,
        explanation: impl Into<String>,
        steps: Vec<String>,
    ) -> Self {
        Self {
            question_number,
            question_text: question_text.into(),
            problem_type: ProblemType::Other,
            options: None,
            correct_answer: None,
            explanation: Some(explanation.into()),
            steps: Some(steps),
        }
    }

    pub fn is_answered(&self) -> bool {
        self.correct_answer.as_deref().is_some_and(|a| !a.trim().is_empty())
    }
}

/// 提取阶段（OCR）的产出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub raw_text: String,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub images_found: u32,
    /// 置信度，范围 [0, 1]
    #[serde(default)]
    pub confidence_score: f32,
}

impl ExtractedContent {
    pub fn new(raw_text: impl Into<String>, questions: Vec<Question>, images_found: u32, confidence_score: f32) -> Self {
        Self {
            raw_text: raw_text.into(),
            questions,
            images_found,
            confidence_score: confidence_score.clamp(0.0, 1.0),
        }
    }

    /// 内置样例（两道题），离线演示时使用
    pub fn sample() -> Self {
        let questions = vec![
            Question::new(
                1,
                "Which one of the following is sixty-three thousand and forty in numerals?",
                ProblemType::MultipleChoice,
            )
            .with_options(["6340", "63 040", "63 400", "630 040"]),
            Question::new(
                2,
                "The figure below is made up of 20 identical small rectangles. What percentage of the figure is shaded?",
                ProblemType::MultipleChoice,
            )
            .with_options(["35%", "20%", "3%", "7%"]),
        ];

        Self::new("Mock extracted text from homework image", questions, 1, 0.90)
    }
}

/// 一次求解的完整结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    /// 由调用方在求解后设置
    pub problem_id: String,
    pub questions_solved: Vec<Question>,
    pub overall_explanation: String,
    pub total_questions: usize,
    pub solved_at: DateTime<Utc>,
    pub processing_time_seconds: f64,
}

impl Solution {
    pub fn new(questions_solved: Vec<Question>, overall_explanation: impl Into<String>, processing_time_seconds: f64) -> Self {
        Self {
            problem_id: String::new(),
            total_questions: questions_solved.len(),
            questions_solved,
            overall_explanation: overall_explanation.into(),
            solved_at: Utc::now(),
            processing_time_seconds: processing_time_seconds.max(0.0),
        }
    }

    pub fn with_problem_id(mut self, problem_id: impl Into<String>) -> Self {
        self.problem_id = problem_id.into();
        self
    }
}

/// provider 状态描述（每次查询重新计算）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub provider_name: String,
    pub is_available: bool,
    pub supported_models: Vec<String>,
    #[serde(default)]
    pub has_api_key: bool,
    #[serde(default)]
    pub supports_documents: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
