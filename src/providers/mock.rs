//! 本地模拟 provider
//!
//! 不联网，按题号和关键词返回固定答案。没有任何凭证时作为兜底使用，
//! 也用于离线演示和测试。

use async_trait::async_trait;
use tracing::debug;

use crate::models::question::Question;
use crate::providers::{distinct_problem_types, SolverProvider};

pub const MOCK_MODELS: &[&str] = &["mock-model-v1", "mock-model-v2"];

#[derive(Debug, Clone, Default)]
pub struct MockProvider;

impl MockProvider {
    pub fn new() -> Self {
        Self
    }
}

struct CannedAnswer {
    answer: String,
    explanation: String,
    steps: Vec<String>,
}

impl CannedAnswer {
    fn new(answer: &str, explanation: impl Into<String>, steps: &[&str]) -> Self {
        Self {
            answer: answer.to_string(),
            explanation: explanation.into(),
            steps: steps.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn canned_answer(question: &Question) -> CannedAnswer {
    let text = question.question_text.to_lowercase();

    if question.question_number == 1 {
        CannedAnswer::new(
            "63 040",
            "Sixty-three thousand and forty is written as 63,040. The word 'thousand' indicates we need 63 in the thousands place, and 'forty' means 40 in the ones/tens place.",
            &[
                "Identify 'sixty-three thousand' = 63,000",
                "Identify 'forty' = 40",
                "Combine: 63,000 + 40 = 63,040",
                "Check the options to find 63 040",
            ],
        )
    } else if question.question_number == 2 {
        CannedAnswer::new(
            "35%",
            "Looking at the figure with 20 identical rectangles, I need to count the shaded rectangles. There appear to be 7 shaded rectangles out of 20 total. 7/20 = 0.35 = 35%.",
            &[
                "Count total rectangles: 20",
                "Count shaded rectangles: 7",
                "Calculate percentage: 7 ÷ 20 = 0.35",
                "Convert to percentage: 0.35 × 100% = 35%",
            ],
        )
    } else if text.contains("calculate") || text.contains('+') {
        CannedAnswer::new(
            "1245",
            "This is a basic addition problem. Adding the numbers step by step.",
            &[
                "Set up the addition problem",
                "Add ones place: 6 + 9 = 15, write 5 carry 1",
                "Add tens place: 5 + 8 + 1 = 14, write 4 carry 1",
                "Add hundreds place: 4 + 7 + 1 = 12, write 2 carry 1",
                "Result: 1245",
            ],
        )
    } else if text.contains("area") {
        CannedAnswer::new(
            "96 cm²",
            "To find the area of a rectangle, multiply length by width.",
            &[
                "Identify the formula: Area = length × width",
                "Substitute values: Area = 12 cm × 8 cm",
                "Calculate: 12 × 8 = 96",
                "Add units: 96 cm²",
            ],
        )
    } else if text.contains("apple") {
        CannedAnswer::new(
            "8 apples",
            "This is a subtraction word problem. John starts with 15 apples and gives away 7.",
            &[
                "Identify what we know: John has 15 apples initially",
                "Identify what happens: He gives away 7 apples",
                "Set up subtraction: 15 - 7",
                "Calculate: 15 - 7 = 8 apples remaining",
            ],
        )
    } else {
        CannedAnswer::new(
            "Answer depends on the specific problem",
            format!(
                "This is a mock solution for question {}. In a real scenario, an AI would analyze the mathematical content and provide a detailed step-by-step solution.",
                question.question_number
            ),
            &[
                "Step 1: Analyze the problem",
                "Step 2: Identify the mathematical concept",
                "Step 3: Apply the appropriate method",
                "Step 4: Calculate the result",
            ],
        )
    }
}

#[async_trait]
impl SolverProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "Mock Provider"
    }

    fn supported_models(&self) -> Vec<String> {
        MOCK_MODELS.iter().map(|m| m.to_string()).collect()
    }

    fn is_available(&self) -> bool {
        true
    }

    fn requires_api_key(&self) -> bool {
        false
    }

    async fn solve_single_question(&self, mut question: Question) -> Question {
        let canned = canned_answer(&question);
        debug!("Mock 求解第 {} 题: {}", question.question_number, canned.answer);

        question.correct_answer = Some(canned.answer);
        question.explanation = Some(canned.explanation);
        question.steps = Some(canned.steps);
        question
    }

    async fn generate_overall_explanation(&self, solved_questions: &[Question]) -> String {
        let types = distinct_problem_types(solved_questions);
        let focus = if types.is_empty() {
            "various mathematical concepts".to_string()
        } else {
            let names: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
            format!("{} concepts", names.join(", "))
        };

        format!(
            "This homework assignment covers {} questions focusing on {}. These problems help students practice fundamental mathematical skills including number recognition, basic arithmetic, percentage calculations, and problem-solving strategies. Each solution provides step-by-step guidance to help students understand the underlying mathematical principles.",
            solved_questions.len(),
            focus
        )
    }
}
