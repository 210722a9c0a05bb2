//! LLM 服务 - 业务能力层
//!
//! 只负责"调用模型"能力，不关心题目和流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（OpenAI 本身，以及 Gemini 的 OpenAI 兼容端点）

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, ConfigError, LlmError};

/// 附件（图片或 PDF），以 base64 data URL 形式随用户消息发送
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }
}

/// 一次模型调用的参数
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub user_message: String,
    pub system_message: Option<String>,
    pub attachments: Vec<Attachment>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            system_message: None,
            attachments: Vec::new(),
            temperature: 0.1,
            max_tokens: 1000,
        }
    }

    pub fn with_system(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// 模型调用能力
///
/// provider 只依赖这个 trait，测试时可以换成脚本化的实现。
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// 当前使用的模型
    fn model_name(&self) -> &str;

    /// 发送请求，返回模型回复的文本
    async fn send_to_llm(&self, request: ChatRequest) -> AppResult<String>;
}

/// 基于 async-openai 的 LLM 服务
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
    timeout: Duration,
}

impl LlmService {
    /// 创建新的 LLM 服务
    ///
    /// API 地址无法解析或模型名称为空时返回配置错误。
    pub fn new(
        api_key: &str,
        api_base_url: &str,
        model_name: &str,
        timeout_secs: u64,
    ) -> AppResult<Self> {
        reqwest::Url::parse(api_base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: api_base_url.to_string(),
            reason: e.to_string(),
        })?;

        if model_name.trim().is_empty() {
            return Err(ConfigError::EmptyModel {
                provider: api_base_url.to_string(),
            }
            .into());
        }

        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base_url.trim_end_matches('/'));

        Ok(Self {
            client: Client::with_config(openai_config),
            model_name: model_name.to_string(),
            timeout: Duration::from_secs(timeout_secs.max(1)),
        })
    }

    fn build_err(&self, e: impl std::error::Error + Send + Sync + 'static) -> AppError {
        AppError::Llm(LlmError::RequestBuild {
            model: self.model_name.clone(),
            source: Box::new(e),
        })
    }

    /// 构建用户消息（有附件时使用 Vision 多段内容）
    fn build_user_message(
        &self,
        request: &ChatRequest,
    ) -> AppResult<ChatCompletionRequestMessage> {
        let user_msg = if request.attachments.is_empty() {
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user_message.as_str())
                .build()
                .map_err(|e| self.build_err(e))?
        } else {
            let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> =
                Vec::with_capacity(request.attachments.len() + 1);

            content_parts.push(ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: request.user_message.clone(),
                },
            ));

            for attachment in &request.attachments {
                content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: attachment.data_url(),
                            detail: Some(ImageDetail::High),
                        },
                    },
                ));
            }

            debug!("使用 Vision API，包含 {} 个附件", request.attachments.len());

            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                .build()
                .map_err(|e| self.build_err(e))?
        };

        Ok(ChatCompletionRequestMessage::User(user_msg))
    }
}

#[async_trait]
impl ChatBackend for LlmService {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn send_to_llm(&self, request: ChatRequest) -> AppResult<String> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", request.user_message.len());

        let mut messages = Vec::new();

        if let Some(sys_msg) = &request.system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg.as_str())
                .build()
                .map_err(|e| self.build_err(e))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        messages.push(self.build_user_message(&request)?);

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .build()
            .map_err(|e| self.build_err(e))?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(chat_request))
            .await
            .map_err(|_| {
                warn!("LLM API 调用超时 ({} 秒)", self.timeout.as_secs());
                LlmError::Timeout {
                    model: self.model_name.clone(),
                    seconds: self.timeout.as_secs(),
                }
            })?
            .map_err(|e| {
                warn!("LLM API 调用失败: {}", e);
                AppError::llm_api_failed(&self.model_name, e)
            })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        Ok(content.trim().to_string())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! 脚本化的模型后端，按顺序返回预设回复并记录请求

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    pub(crate) struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, String>>>,
        pub(crate) requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new(replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        fn model_name(&self) -> &str {
            "scripted-model"
        }

        async fn send_to_llm(&self, request: ChatRequest) -> AppResult<String> {
            self.requests.lock().unwrap().push(request);
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(message)) => Err(AppError::Other(message)),
                None => Err(AppError::Other("no scripted reply left".to_string())),
            }
        }
    }
}
