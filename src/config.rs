use std::collections::BTreeMap;
use std::path::PathBuf;

/// 程序配置
///
/// 所有字段都可以通过环境变量覆盖，优先级：调用方显式参数 > 环境变量 > 默认值。
#[derive(Clone, Debug)]
pub struct Config {
    /// 使用的 provider 名称（"auto" 表示自动检测）
    pub ai_provider: String,
    /// 指定的模型名称（覆盖各 provider 的默认模型）
    pub ai_model: Option<String>,
    /// 环境中所有 `*_API_KEY` 变量的快照
    pub credentials: BTreeMap<String, String>,
    // --- LLM 配置 ---
    pub openai_api_base_url: String,
    pub gemini_api_base_url: String,
    /// 单次 LLM 调用超时（秒）
    pub llm_request_timeout_secs: u64,
    /// 单个文档的总超时（秒）
    pub document_timeout_secs: u64,
    // --- 文档处理配置 ---
    /// PDF 逐页渲染分辨率
    pub pdf_render_dpi: u32,
    pub pdftoppm_cmd: String,
    pub tesseract_cmd: String,
    /// 渲染中间文件存放目录
    pub temp_dir: PathBuf,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ai_provider: "auto".to_string(),
            ai_model: None,
            credentials: BTreeMap::new(),
            openai_api_base_url: "https://api.openai.com/v1".to_string(),
            gemini_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai"
                .to_string(),
            llm_request_timeout_secs: 120,
            document_timeout_secs: 600,
            pdf_render_dpi: 200,
            pdftoppm_cmd: "pdftoppm".to_string(),
            tesseract_cmd: "tesseract".to_string(),
            temp_dir: std::env::temp_dir(),
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            ai_provider: std::env::var("AI_PROVIDER").unwrap_or(default.ai_provider),
            ai_model: std::env::var("AI_MODEL").ok().filter(|v| !v.trim().is_empty()),
            credentials: std::env::vars()
                .filter(|(k, v)| k.ends_with("_API_KEY") && !v.trim().is_empty())
                .collect(),
            openai_api_base_url: std::env::var("OPENAI_API_BASE_URL").unwrap_or(default.openai_api_base_url),
            gemini_api_base_url: std::env::var("GEMINI_API_BASE_URL").unwrap_or(default.gemini_api_base_url),
            llm_request_timeout_secs: std::env::var("LLM_REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_request_timeout_secs),
            document_timeout_secs: std::env::var("DOCUMENT_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.document_timeout_secs),
            pdf_render_dpi: std::env::var("PDF_RENDER_DPI").ok().and_then(|v| v.parse().ok()).unwrap_or(default.pdf_render_dpi),
            pdftoppm_cmd: std::env::var("PDFTOPPM_CMD").unwrap_or(default.pdftoppm_cmd),
            tesseract_cmd: std::env::var("TESSERACT_CMD").unwrap_or(default.tesseract_cmd),
            temp_dir: std::env::var("TEMP_DIR").map(PathBuf::from).unwrap_or(default.temp_dir),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
        }
    }

    /// 读取某个凭证变量（空字符串视为不存在）
    pub fn credential(&self, var_name: &str) -> Option<&str> {
        self.credentials
            .get(var_name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// 设置凭证（测试和嵌入方使用，不读写进程环境）
    pub fn with_credential(mut self, var_name: impl Into<String>, value: impl Into<String>) -> Self {
        self.credentials.insert(var_name.into(), value.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.ai_provider = provider.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.ai_model = Some(model.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_credential_is_absent() {
        let config = Config::default()
            .with_credential("OPENAI_API_KEY", "   ")
            .with_credential("GEMINI_API_KEY", "g-key");

        assert_eq!(config.credential("OPENAI_API_KEY"), None);
        assert_eq!(config.credential("GEMINI_API_KEY"), Some("g-key"));
        assert_eq!(config.credential("GOOGLE_API_KEY"), None);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ai_provider, "auto");
        assert_eq!(config.pdf_render_dpi, 200);
        assert!(config.ai_model.is_none());
    }
}
