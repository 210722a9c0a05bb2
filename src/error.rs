use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误（调用方传入了非法参数）
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 文档处理错误（读取 / PDF 渲染）
    #[error("文档错误: {0}")]
    Document(#[from] DocumentError),
    /// 内容提取错误（OCR）
    #[error("提取错误: {0}")]
    Extraction(#[from] ExtractionError),
    /// 模型输出解析错误
    #[error("解析错误: {0}")]
    Parse(#[from] ParseError),
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 请求了未注册的 provider
    #[error("Unknown provider '{name}'. Available providers: {available}")]
    UnknownProvider { name: String, available: String },
    /// API 地址无法解析
    #[error("无效的 API 地址 '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    /// 模型名称为空
    #[error("provider {provider} 的模型名称为空")]
    EmptyModel { provider: String },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// 未配置 API Key
    #[error("{provider} client not available (missing API key)")]
    Unavailable { provider: String },
    /// 构建请求失败
    #[error("构建 LLM 请求失败 (模型: {model}): {source}")]
    RequestBuild {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 调用超时
    #[error("LLM API调用超时 (模型: {model}, {seconds}秒)")]
    Timeout { model: String, seconds: u64 },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
}

/// 文档处理错误
#[derive(Debug, Error)]
pub enum DocumentError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// PDF 渲染失败
    #[error("PDF渲染失败 ({path}): {reason}")]
    RenderFailed { path: String, reason: String },
    /// PDF 没有任何页面
    #[error("PDF没有可渲染的页面: {path}")]
    NoPages { path: String },
}

/// 内容提取错误
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// OCR 工具执行失败
    #[error("OCR执行失败 ({path}): {reason}")]
    OcrFailed { path: String, reason: String },
    /// 未识别出任何文字
    #[error("未识别出任何文字: {path}")]
    EmptyText { path: String },
}

/// 模型输出解析错误
///
/// 只在恢复流水线内部流转，最终都会被降级成兜底题目，不会越过流水线边界。
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON 严格解析失败
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),
    /// JSON 合法但不包含任何题目
    #[error("JSON中没有题目")]
    NoQuestions,
    /// 正则兜底也没有匹配到任何题目
    #[error("正则提取未匹配到题目")]
    NoMatches,
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 是否属于调用方参数错误（对应 HTTP 4xx）
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Config(_))
    }

    /// 创建LLM API调用错误
    pub fn llm_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Document(DocumentError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建PDF渲染错误
    pub fn render_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Document(DocumentError::RenderFailed {
            path: path.into(),
            reason: reason.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
