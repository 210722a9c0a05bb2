//! 文档类型识别与读取

use std::path::Path;

use crate::error::{AppError, AppResult};
use crate::services::llm_service::Attachment;

/// 文档类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image { mime_type: &'static str },
}

impl DocumentKind {
    /// 按扩展名判断，未知扩展名按 PNG 处理
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => DocumentKind::Pdf,
            "jpg" | "jpeg" => DocumentKind::Image { mime_type: "image/jpeg" },
            "gif" => DocumentKind::Image { mime_type: "image/gif" },
            "webp" => DocumentKind::Image { mime_type: "image/webp" },
            _ => DocumentKind::Image { mime_type: "image/png" },
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::Image { mime_type } => mime_type,
        }
    }
}

/// 读取整个文件作为附件
pub async fn load_attachment(path: &Path, kind: &DocumentKind) -> AppResult<Attachment> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
    Ok(Attachment::new(kind.mime_type(), data))
}
