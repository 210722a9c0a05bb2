//! PDF 逐页渲染
//!
//! 调用 poppler 的 `pdftoppm` 子进程把每页渲染成 PNG。渲染在子进程里完成，
//! 不占用 tokio 的工作线程。

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, DocumentError};

/// 渲染好的一页
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 从 1 开始
    pub page_number: usize,
    pub png: Vec<u8>,
}

/// PDF 渲染器
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    command: String,
    dpi: u32,
    temp_dir: PathBuf,
}

impl PdfRenderer {
    pub fn new(config: &Config) -> Self {
        Self {
            command: config.pdftoppm_cmd.clone(),
            dpi: config.pdf_render_dpi,
            temp_dir: config.temp_dir.clone(),
        }
    }

    /// 渲染所有页面，按页码顺序返回
    pub async fn render_pages(&self, pdf_path: &Path) -> AppResult<Vec<RenderedPage>> {
        let work_dir = self
            .temp_dir
            .join(format!("homework-pages-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(|e| AppError::render_failed(pdf_path.display().to_string(), e.to_string()))?;

        let result = self.render_into(pdf_path, &work_dir).await;

        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            warn!("清理渲染目录失败 {}: {}", work_dir.display(), e);
        }

        result
    }

    async fn render_into(&self, pdf_path: &Path, work_dir: &Path) -> AppResult<Vec<RenderedPage>> {
        let path_str = pdf_path.display().to_string();
        info!("🖼️ 正在渲染 PDF 页面 ({} DPI): {}", self.dpi, path_str);

        let output = Command::new(&self.command)
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg(pdf_path)
            .arg(work_dir.join("page"))
            .output()
            .await
            .map_err(|e| AppError::render_failed(&path_str, format!("无法启动 {}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::render_failed(&path_str, stderr.trim().to_string()));
        }

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(work_dir)
            .await
            .map_err(|e| AppError::render_failed(&path_str, e.to_string()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::render_failed(&path_str, e.to_string()))?
        {
            let path = entry.path();
            if let Some(number) = page_number_from_file_name(&path) {
                files.push((number, path));
            }
        }
        files.sort_by_key(|(number, _)| *number);

        if files.is_empty() {
            return Err(DocumentError::NoPages { path: path_str }.into());
        }

        let mut pages = Vec::with_capacity(files.len());
        for (page_number, path) in files {
            let png = tokio::fs::read(&path)
                .await
                .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
            debug!("第 {} 页渲染完成，{} 字节", page_number, png.len());
            pages.push(RenderedPage { page_number, png });
        }

        info!("✓ PDF 共渲染 {} 页", pages.len());
        Ok(pages)
    }
}

/// pdftoppm 输出文件名形如 `page-1.png` / `page-01.png`
fn page_number_from_file_name(path: &Path) -> Option<usize> {
    if path.extension().and_then(|s| s.to_str()) != Some("png") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit_once('-')?.1.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_number_from_file_name() {
        assert_eq!(page_number_from_file_name(Path::new("/tmp/x/page-1.png")), Some(1));
        assert_eq!(page_number_from_file_name(Path::new("/tmp/x/page-012.png")), Some(12));
        assert_eq!(page_number_from_file_name(Path::new("/tmp/x/page-1.ppm")), None);
        assert_eq!(page_number_from_file_name(Path::new("/tmp/x/notes.png")), None);
    }

    #[tokio::test]
    async fn test_missing_renderer_binary() {
        let config = Config {
            pdftoppm_cmd: "pdftoppm-does-not-exist".to_string(),
            ..Config::default()
        };
        let renderer = PdfRenderer::new(&config);

        let err = renderer
            .render_pages(Path::new("/tmp/whatever.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Document(DocumentError::RenderFailed { .. })));
    }
}
