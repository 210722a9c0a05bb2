use crate::models::question::ExtractedContent;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从 TOML 文件加载已提取好的题目内容
///
/// 文件格式：
/// ```toml
/// raw_text = "..."
/// images_found = 1
/// confidence_score = 0.9
///
/// [[questions]]
/// question_number = 1
/// question_text = "Calculate: 456 + 789 = ?"
/// problem_type = "calculation"
/// ```
pub async fn load_toml_to_extracted_content(toml_file_path: &Path) -> Result<ExtractedContent> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let mut extracted: ExtractedContent = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    extracted.confidence_score = extracted.confidence_score.clamp(0.0, 1.0);

    Ok(extracted)
}

/// 从文件夹中加载所有 TOML 文件，解析失败的文件跳过
pub async fn load_all_toml_files(folder_path: &str) -> Result<Vec<ExtractedContent>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    // read_dir 顺序不稳定
    paths.sort();

    let mut documents = Vec::new();
    for path in paths {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_toml_to_extracted_content(&path).await {
            Ok(doc) => {
                tracing::info!("成功加载 {} 个题目", doc.questions.len());
                documents.push(doc);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(documents)
}
