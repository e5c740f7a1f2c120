use anyhow::{Context, Result};
use glob::glob;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::annotator::RawChapter;

/// Configuration for chapter file reading
#[derive(Debug, Clone, Default)]
pub struct ReaderConfig {
    /// Whether to fail fast on the first unreadable file or skip it
    pub fail_fast: bool,
}

/// Statistics for one chapter file
#[derive(Debug, Clone)]
pub struct ReadStats {
    pub file_path: String,
    pub chapters_read: usize,
    pub bytes_read: u64,
    pub duration_ms: u64,
    pub read_error: Option<String>,
}

/// Accepted JSON layouts: a book object, a bare chapter array, or one chapter
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChapterFile {
    Book { chapters: Vec<RawChapter> },
    Chapters(Vec<RawChapter>),
    Chapter(RawChapter),
}

/// Parse chapter JSON in any of the accepted layouts
pub fn parse_chapters(json: &str) -> Result<Vec<RawChapter>> {
    let parsed: ChapterFile = serde_json::from_str(json)
        .context("Expected {\"chapters\": [...]}, a chapter array, or a single {title, paragraphs} object")?;
    Ok(match parsed {
        ChapterFile::Book { chapters } | ChapterFile::Chapters(chapters) => chapters,
        ChapterFile::Chapter(chapter) => vec![chapter],
    })
}

/// `*.json` chapter files directly inside `dir`, in file-name order; previous
/// annotation output is never picked up as input
pub fn discover_chapter_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*.json", dir.display());
    debug!("Discovering chapter files with pattern: {}", pattern);

    let mut files = Vec::new();
    for entry in glob(&pattern).with_context(|| format!("Invalid glob pattern {pattern}"))? {
        match entry {
            Ok(path) => {
                let is_output = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with("_annotated.json"));
                if !is_output {
                    files.push(path);
                }
            }
            Err(e) => warn!("Glob iteration error: {e}"),
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    info!("Discovered {} chapter files in {}", files.len(), dir.display());
    Ok(files)
}

pub struct ChapterReader {
    config: ReaderConfig,
}

impl ChapterReader {
    pub fn new(config: ReaderConfig) -> Self {
        Self { config }
    }

    /// Read one JSON file; without `fail_fast` a failure yields no chapters and an error in the stats
    pub async fn read_file(&self, path: &Path) -> Result<(Vec<RawChapter>, ReadStats)> {
        let start_time = std::time::Instant::now();
        let outcome = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read chapter file {}", path.display()))
            .and_then(|content| {
                let chapters = parse_chapters(&content)
                    .with_context(|| format!("Failed to parse chapter file {}", path.display()))?;
                Ok((chapters, content.len() as u64))
            });

        let (chapters, bytes_read, read_error) = match outcome {
            Ok((chapters, bytes)) => (chapters, bytes, None),
            Err(e) if self.config.fail_fast => return Err(e),
            Err(e) => {
                warn!("Skipping {}: {:#}", path.display(), e);
                (Vec::new(), 0, Some(format!("{e:#}")))
            }
        };

        let stats = ReadStats {
            file_path: path.display().to_string(),
            chapters_read: chapters.len(),
            bytes_read,
            duration_ms: start_time.elapsed().as_millis() as u64,
            read_error,
        };
        debug!(
            file = %stats.file_path,
            chapters = stats.chapters_read,
            bytes = stats.bytes_read,
            "Read chapter file"
        );
        Ok((chapters, stats))
    }

    /// Read a book file, or every chapter file of a directory in name order
    pub async fn read_input(&self, input: &Path) -> Result<Vec<RawChapter>> {
        let metadata = tokio::fs::metadata(input)
            .await
            .with_context(|| format!("Input does not exist: {}", input.display()))?;

        if !metadata.is_dir() {
            let (chapters, stats) = self.read_file(input).await?;
            if let Some(error) = stats.read_error {
                anyhow::bail!("{error}");
            }
            return Ok(chapters);
        }

        let mut chapters = Vec::new();
        let mut failed = 0;
        for path in discover_chapter_files(input)? {
            let (mut read, stats) = self.read_file(&path).await?;
            if stats.read_error.is_some() {
                failed += 1;
            }
            chapters.append(&mut read);
        }
        info!("Read {} chapters from {} ({} files skipped)", chapters.len(), input.display(), failed);
        Ok(chapters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::fs;

    async fn create_test_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let file_path = dir.join(name);
        fs::write(&file_path, content).await.unwrap();
        file_path
    }

    #[test]
    fn test_parse_all_layouts() {
        let book = parse_chapters(r#"{"chapters":[{"title":"One","paragraphs":["a"]},{"paragraphs":["b"]}]}"#).unwrap();
        assert_eq!(book.len(), 2);
        assert_eq!(book[1].title, "");

        let array = parse_chapters(r#"[{"title":"One","paragraphs":["a","b"]}]"#).unwrap();
        assert_eq!(array[0].paragraphs.len(), 2);

        let single = parse_chapters(r#"{"title":"Solo","paragraphs":[]}"#).unwrap();
        assert_eq!(single[0].title, "Solo");

        assert!(parse_chapters(r#"{"pages":[]}"#).is_err());
    }

    #[tokio::test]
    async fn test_directory_read_in_name_order_skipping_bad_files() {
        let temp_dir = TempDir::new().unwrap();
        create_test_file(temp_dir.path(), "002.json", r#"{"title":"Second","paragraphs":["b"]}"#).await;
        create_test_file(temp_dir.path(), "001.json", r#"{"title":"First","paragraphs":["a"]}"#).await;
        create_test_file(temp_dir.path(), "003.json", "not json").await;
        create_test_file(temp_dir.path(), "chapter_0001_annotated.json", "{}").await;
        create_test_file(temp_dir.path(), "notes.txt", "ignored").await;

        let reader = ChapterReader::new(ReaderConfig::default());
        let chapters = reader.read_input(temp_dir.path()).await.unwrap();
        let titles: Vec<&str> = chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_on_bad_file() {
        let temp_dir = TempDir::new().unwrap();
        create_test_file(temp_dir.path(), "001.json", "[").await;

        let reader = ChapterReader::new(ReaderConfig { fail_fast: true });
        assert!(reader.read_input(temp_dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_input_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let reader = ChapterReader::new(ReaderConfig::default());
        assert!(reader.read_input(&temp_dir.path().join("absent.json")).await.is_err());
    }

    #[tokio::test]
    async fn test_read_file_stats() {
        let temp_dir = TempDir::new().unwrap();
        let content = r#"{"chapters":[{"title":"T","paragraphs":["x"]}]}"#;
        let path = create_test_file(temp_dir.path(), "book.json", content).await;

        let (chapters, stats) = ChapterReader::new(ReaderConfig::default()).read_file(&path).await.unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(stats.chapters_read, 1);
        assert_eq!(stats.bytes_read, content.len() as u64);
        assert!(stats.read_error.is_none());
    }
}
