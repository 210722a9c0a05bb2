//! 模型输出恢复流水线 - 业务能力层
//!
//! 把模型返回的"不可靠文本"转换成结构化的 `Question` 列表。
//!
//! ## 处理顺序（任一步成功即返回）
//! 1. 去掉 Markdown 代码块围栏（没有结束围栏时取到文本末尾）
//! 2. 结构修复：补全未闭合的字符串 / 括号，删除尾随逗号
//! 3. 严格 JSON 解析
//! 4. 正则兜底：按固定字段模式逐个抠出题目
//! 5. 最终兜底：合成一道题，把原文放进解析里
//!
//! `recover` 对任意输入都返回非空列表，不会 panic，也不会返回错误。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ParseError;
use crate::models::question::{ProblemType, Question};

/// 最终兜底时保留的原文长度（字符数）
pub const MAX_FALLBACK_CHARS: usize = 2000;

/// 可信题号上限，超出的题号按顺序重新编号
pub const MAX_QUESTION_NUMBER: u32 = 10_000;

const FALLBACK_QUESTION_TEXT: &str = "Unable to parse structured questions from the AI response";
const FALLBACK_STEP: &str =
    "The AI response could not be parsed into structured questions; the raw response is shown in the explanation.";

/// 结果来自流水线的哪一级
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStage {
    /// 严格解析（含围栏去除和结构修复）
    Strict,
    /// 正则兜底
    Salvaged,
    /// 最终兜底，没有任何结构化内容
    Fallback,
}

/// 恢复结果
#[derive(Debug, Clone)]
pub struct Recovered {
    pub questions: Vec<Question>,
    pub stage: RecoveryStage,
}

impl Recovered {
    /// 是否拿到了真正的结构化题目
    pub fn is_structured(&self) -> bool {
        self.stage != RecoveryStage::Fallback
    }
}

/// 恢复题目列表，只要结果
pub fn recover_questions(raw: &str) -> Vec<Question> {
    recover(raw).questions
}

/// 完整的恢复流水线
pub fn recover(raw: &str) -> Recovered {
    let repaired = repair_json(&strip_markdown_fences(raw));

    match parse_strict(&repaired) {
        Ok(questions) => {
            debug!("严格解析成功，题目数: {}", questions.len());
            return Recovered {
                questions,
                stage: RecoveryStage::Strict,
            };
        }
        Err(e) => debug!("严格解析失败: {}，尝试正则提取", e),
    }

    match salvage_with_regex(raw) {
        Ok(questions) => {
            warn!("⚠️ JSON 无法解析，正则提取到 {} 道题目", questions.len());
            Recovered {
                questions,
                stage: RecoveryStage::Salvaged,
            }
        }
        Err(e) => {
            warn!("⚠️ 正则提取失败: {}，使用兜底题目", e);
            Recovered {
                questions: vec![fallback_question(raw)],
                stage: RecoveryStage::Fallback,
            }
        }
    }
}

// ========== 第 1 级：去围栏 ==========

/// 取出 Markdown 代码块内部内容
///
/// 没有围栏且文本不是以 `{` / `[` 开头时，从第一个 `{` 开始截取。
pub fn strip_markdown_fences(text: &str) -> String {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```") {
        let body = skip_language_tag(&trimmed[start + 3..]);
        let inner = match body.find("```") {
            Some(end) => &body[..end],
            None => body,
        };
        return inner.trim().to_string();
    }

    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        if let Some(pos) = trimmed.find('{') {
            return trimmed[pos..].to_string();
        }
    }

    trimmed.to_string()
}

/// 跳过 ```json 这类语言标记
fn skip_language_tag(s: &str) -> &str {
    let tag_len = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(s.len());
    if tag_len == 0 {
        return s;
    }
    let rest = &s[tag_len..];
    if rest.is_empty() || rest.starts_with(char::is_whitespace) || rest.starts_with(['{', '[']) {
        rest
    } else {
        s
    }
}

// ========== 第 2 级：结构修复 ==========

/// 修复截断或带尾随逗号的 JSON
///
/// 字符串内部的括号不计数；未闭合的字符串先补引号，再按嵌套顺序补齐括号。
pub fn repair_json(text: &str) -> String {
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                if closers.last() == Some(&c) {
                    closers.pop();
                }
            }
            _ => {}
        }
    }

    let mut repaired = if in_string {
        text.to_string()
    } else {
        text.trim_end().to_string()
    };
    if in_string {
        if escaped {
            repaired.pop();
        }
        repaired.push('"');
    }
    while let Some(closer) = closers.pop() {
        repaired.push(closer);
    }

    remove_trailing_commas(&repaired)
}

/// 删除 `}` / `]` 之前的逗号（字符串内部不动）
fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }

    out
}

// ========== 第 3 级：严格解析 ==========

/// 严格解析修复后的 JSON
///
/// 接受 `{"questions": [...]}`、顶层数组、或单个题目对象；一道题都没有视为失败。
pub fn parse_strict(text: &str) -> Result<Vec<Question>, ParseError> {
    let value: Value = serde_json::from_str(text)?;

    let items = match value {
        Value::Object(mut map) => match map.remove("questions") {
            Some(Value::Array(items)) => items,
            Some(single @ Value::Object(_)) => vec![single],
            Some(_) => return Err(ParseError::NoQuestions),
            None if map.contains_key("question_text") => vec![Value::Object(map)],
            None => return Err(ParseError::NoQuestions),
        },
        Value::Array(items) => items,
        _ => return Err(ParseError::NoQuestions),
    };

    // 缺失题号接在已出现的最大题号之后
    let mut last_number = 0u32;
    let questions: Vec<Question> = items
        .iter()
        .filter_map(|item| {
            let question = question_from_value(item, last_number.saturating_add(1))?;
            last_number = last_number.max(question.question_number);
            Some(question)
        })
        .collect();

    if questions.is_empty() {
        return Err(ParseError::NoQuestions);
    }
    Ok(questions)
}

fn question_from_value(item: &Value, fallback_number: u32) -> Option<Question> {
    let obj = item.as_object()?;

    let question_number = obj
        .get("question_number")
        .and_then(value_to_number)
        .filter(is_plausible_number)
        .unwrap_or(fallback_number);

    let question_text = obj
        .get("question_text")
        .or_else(|| obj.get("question"))
        .and_then(value_to_text)
        .unwrap_or_default();

    let problem_type = obj
        .get("problem_type")
        .and_then(Value::as_str)
        .map(ProblemType::parse_lenient)
        .unwrap_or_default();

    let options = obj
        .get("options")
        .map(value_to_list)
        .filter(|list| !list.is_empty());

    let correct_answer = obj
        .get("correct_answer")
        .or_else(|| obj.get("answer"))
        .and_then(value_to_text);

    let explanation = obj.get("explanation").and_then(value_to_text);

    let steps = obj.get("steps").map(value_to_list).unwrap_or_default();

    Some(Question {
        question_number,
        question_text,
        problem_type,
        options,
        correct_answer,
        explanation,
        steps: Some(steps),
    })
}

fn value_to_number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 题号为正且不超过 `MAX_QUESTION_NUMBER`
pub fn is_plausible_number(number: &u32) -> bool {
    (1..=MAX_QUESTION_NUMBER).contains(number)
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn value_to_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_to_text).collect(),
        Value::Null => Vec::new(),
        other => value_to_text(other).into_iter().collect(),
    }
}

// ========== 第 4 级：正则兜底 ==========

static QUESTION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)"question_number"\s*:\s*"?(\d+)"?\s*,\s*"question_text"\s*:\s*"((?:[^"\\]|\\.)*)"\s*,\s*"problem_type"\s*:\s*"([^"]*)""#,
    )
    .expect("question pattern is valid")
});

static ANSWER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)"correct_answer"\s*:\s*(?:"((?:[^"\\]|\\.)*)"|(-?\d+(?:\.\d+)?))"#)
        .expect("answer pattern is valid")
});

static OPTIONS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)"options"\s*:\s*\[([^\]]*)\]"#).expect("options pattern is valid")
});

static EXPLANATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)"explanation"\s*:\s*"((?:[^"\\]|\\.)*)""#)
        .expect("explanation pattern is valid")
});

static STEPS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)"steps"\s*:\s*\[([^\]]*)\]"#).expect("steps pattern is valid")
});

static STRING_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)"((?:[^"\\]|\\.)*)""#).expect("string pattern is valid"));

/// 按固定字段模式在原文中逐个提取题目
///
/// 每个匹配的附加字段（答案 / 选项 / 解析 / 步骤）只在它和下一个匹配之间的窗口里找。
pub fn salvage_with_regex(raw: &str) -> Result<Vec<Question>, ParseError> {
    let matches: Vec<_> = QUESTION_PATTERN.captures_iter(raw).collect();
    if matches.is_empty() {
        return Err(ParseError::NoMatches);
    }

    let mut questions = Vec::with_capacity(matches.len());
    let mut last_number = 0u32;
    for (i, caps) in matches.iter().enumerate() {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let window_end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(raw.len());
        let window = &raw[whole.end()..window_end];

        let question_number = caps[1]
            .parse()
            .ok()
            .filter(is_plausible_number)
            .unwrap_or(last_number.saturating_add(1));
        last_number = last_number.max(question_number);
        let problem_type = ProblemType::parse_lenient(&caps[3]);

        let correct_answer = ANSWER_PATTERN.captures(window).and_then(|c| {
            c.get(1)
                .map(|m| unescape(m.as_str()))
                .or_else(|| c.get(2).map(|m| m.as_str().to_string()))
        });

        let options = if problem_type == ProblemType::MultipleChoice {
            OPTIONS_PATTERN
                .captures(window)
                .map(|c| string_literals(&c[1]))
                .filter(|list| !list.is_empty())
        } else {
            None
        };

        let explanation = EXPLANATION_PATTERN
            .captures(window)
            .map(|c| unescape(&c[1]));

        let steps = STEPS_PATTERN
            .captures(window)
            .map(|c| string_literals(&c[1]))
            .unwrap_or_default();

        questions.push(Question {
            question_number,
            question_text: unescape(&caps[2]),
            problem_type,
            options,
            correct_answer,
            explanation,
            steps: Some(steps),
        });
    }

    Ok(questions)
}

fn string_literals(list_body: &str) -> Vec<String> {
    STRING_LITERAL
        .captures_iter(list_body)
        .map(|c| unescape(&c[1]))
        .collect()
}

/// 还原 JSON 字符串转义，失败时原样返回
fn unescape(s: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", s)).unwrap_or_else(|_| s.to_string())
}

// ========== 第 5 级：最终兜底 ==========

/// 合成一道兜底题目，原文截断后放进解析
pub fn fallback_question(raw: &str) -> Question {
    let trimmed = raw.trim();
    let explanation = if trimmed.is_empty() {
        "The AI returned an empty response.".to_string()
    } else {
        trimmed.chars().take(MAX_FALLBACK_CHARS).collect()
    };

    let mut question = Question::diagnostic(
        1,
        FALLBACK_QUESTION_TEXT,
        explanation,
        vec![FALLBACK_STEP.to_string()],
    );
    question.correct_answer = extract_answer_line(raw);
    question
}

// ========== 单题答案解析 ==========

/// 单题求解返回的字段
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolutionFields {
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
    pub steps: Vec<String>,
}

impl SolutionFields {
    /// 写回题目
    pub fn apply_to(self, question: &mut Question) {
        question.correct_answer = self.correct_answer;
        question.explanation = self.explanation;
        question.steps = Some(self.steps);
    }
}

#[derive(Deserialize)]
struct SolutionPayload {
    #[serde(default)]
    correct_answer: Option<Value>,
    #[serde(default)]
    explanation: Option<Value>,
    #[serde(default)]
    steps: Option<Value>,
}

impl From<SolutionPayload> for SolutionFields {
    fn from(payload: SolutionPayload) -> Self {
        Self {
            correct_answer: payload.correct_answer.as_ref().and_then(value_to_text),
            explanation: payload.explanation.as_ref().and_then(value_to_text),
            steps: payload.steps.as_ref().map(value_to_list).unwrap_or_default(),
        }
    }
}

/// 严格解析单题答案，不做任何修复
pub fn parse_solution_strict(raw: &str) -> Result<SolutionFields, ParseError> {
    let payload: SolutionPayload = serde_json::from_str(raw.trim())?;
    Ok(payload.into())
}

/// 宽松解析单题答案
///
/// 先去围栏、修复后严格解析；仍失败时从文本里找 "Answer:" 行和步骤行，整段原文作为解析。
pub fn parse_solution_fields(raw: &str) -> SolutionFields {
    let repaired = repair_json(&strip_markdown_fences(raw));
    match serde_json::from_str::<SolutionPayload>(&repaired) {
        Ok(payload) => payload.into(),
        Err(e) => {
            debug!("单题答案 JSON 解析失败: {}，按纯文本提取", e);
            extract_solution_from_text(raw)
        }
    }
}

/// 从非结构化文本里提取答案和步骤
pub fn extract_solution_from_text(text: &str) -> SolutionFields {
    let steps = text
        .lines()
        .map(str::trim)
        .filter(|line| {
            line.starts_with(|c: char| c.is_ascii_digit()) || line.starts_with("Step")
        })
        .map(str::to_string)
        .collect();

    SolutionFields {
        correct_answer: extract_answer_line(text),
        explanation: Some(text.trim().to_string()),
        steps,
    }
}

/// 找最后一条 "Answer:" / "Correct answer:" / "Solution:" 行
fn extract_answer_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| {
            let lower = line.to_lowercase();
            ["answer:", "correct answer:", "solution:"]
                .iter()
                .any(|keyword| lower.contains(keyword))
        })
        .filter_map(|line| line.split_once(':').map(|(_, answer)| answer.trim().to_string()))
        .filter(|answer| !answer.is_empty())
        .last()
}
