// WHY: reruns skip chapters whose annotation file is already complete; a file only
// counts as complete when it ends with the trailing newline written last

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::annotator::AnnotatedChapter;

/// `chapter_0001_annotated.json` for chapter index 0
pub fn annotation_file_name(chapter_index: usize) -> String {
    format!("chapter_{:04}_annotated.json", chapter_index + 1)
}

pub fn annotation_path(out_dir: &Path, chapter_index: usize) -> PathBuf {
    out_dir.join(annotation_file_name(chapter_index))
}

/// True when the file exists and ends with a newline
pub async fn annotation_complete(path: &Path) -> bool {
    match tokio::fs::read(path).await {
        Ok(bytes) => bytes.last() == Some(&b'\n'),
        Err(_) => false,
    }
}

/// Whether a chapter must be (re)written on this run
pub async fn needs_annotation(path: &Path, overwrite_all: bool) -> bool {
    overwrite_all || !annotation_complete(path).await
}

/// Pretty JSON plus a trailing newline, written to a temporary name and renamed into place
pub async fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<PathBuf> {
    let mut content = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    content.push('\n');

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let partial = path.with_extension("json.partial");
    let mut file = tokio::fs::File::create(&partial)
        .await
        .with_context(|| format!("Failed to create {}", partial.display()))?;
    file.write_all(content.as_bytes())
        .await
        .with_context(|| format!("Failed to write {}", partial.display()))?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&partial, path)
        .await
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(path.to_path_buf())
}

pub async fn write_annotation(out_dir: &Path, chapter: &AnnotatedChapter) -> Result<PathBuf> {
    write_json_file(&annotation_path(out_dir, chapter.index), chapter).await
}
