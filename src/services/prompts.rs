//! 提示词构建
//!
//! 所有 provider 共用同一套提示词，保证返回格式一致。

use crate::models::question::Question;

/// 单题求解的系统提示词
pub const SOLVER_SYSTEM_PROMPT: &str = r#"You are an expert mathematics tutor. Your job is to solve mathematical problems step by step and provide clear explanations that students can understand.

For multiple choice questions, identify the correct answer and explain why.
For calculation problems, show all work step by step.
Always provide educational explanations that help students learn.

Respond in JSON format with:
{
    "correct_answer": "the correct answer",
    "explanation": "detailed explanation of the solution",
    "steps": ["step 1", "step 2", "step 3", ...]
}"#;

/// 总结的系统提示词
pub const SUMMARY_SYSTEM_PROMPT: &str = "You are a mathematics tutor. Provide a brief overall summary of the homework problems that were solved, highlighting the key concepts and skills practiced.";

/// 整份文档识别 + 求解的提示词
pub const DOCUMENT_PROMPT: &str = r#"You are an expert mathematics tutor. The attached document is a math homework sheet.

1. Find EVERY question in the document, in the order they appear.
2. For each question, copy the full question text and any answer options exactly.
3. Classify each question as one of: multiple_choice, word_problem, calculation, geometry, algebra, other.
4. Solve each question step by step.

Respond ONLY with JSON in exactly this format:
{
    "questions": [
        {
            "question_number": 1,
            "question_text": "full question text",
            "problem_type": "multiple_choice",
            "options": ["option 1", "option 2"],
            "correct_answer": "the correct answer",
            "explanation": "detailed explanation of the solution",
            "steps": ["step 1", "step 2"]
        }
    ]
}

Use "options": null for questions that are not multiple choice."#;

/// 服务不可用时的总结
pub const UNAVAILABLE_SUMMARY: &str = "Overall: These problems test various mathematical concepts including number representation, percentages, and basic arithmetic.";

/// 总结生成失败时的总结
pub const FAILED_SUMMARY: &str =
    "Overall: This homework covers various mathematical concepts and problem-solving skills.";

/// 构建单题提示词
pub fn question_prompt(question: &Question) -> String {
    let mut prompt = format!(
        "Question {}: {}\n\n",
        question.question_number, question.question_text
    );

    if let Some(options) = &question.options {
        prompt.push_str("Options:\n");
        for (i, option) in options.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, option));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Problem Type: {}\n\n", question.problem_type));
    prompt.push_str("Please solve this step by step and provide a clear explanation.");
    prompt
}

/// 构建总结提示词（题干最多取 100 个字符）
pub fn summary_prompt(solved_questions: &[Question]) -> String {
    let mut summary = String::from("Questions solved:\n");
    for q in solved_questions {
        let preview: String = q.question_text.chars().take(100).collect();
        summary.push_str(&format!("Q{}: {}...\n", q.question_number, preview));
        if let Some(answer) = &q.correct_answer {
            summary.push_str(&format!("Answer: {}\n", answer));
        }
        summary.push('\n');
    }

    format!(
        "Please provide a brief overall explanation for this homework assignment:\n\n{}",
        summary
    )
}

/// 逐页处理 PDF 时附加页码说明
pub fn page_prompt(page_number: usize, total_pages: usize) -> String {
    format!(
        "{}\n\nThis image is page {} of {}. Number the questions as they appear on this page.",
        DOCUMENT_PROMPT, page_number, total_pages
    )
}
