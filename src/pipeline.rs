// WHY: the book roster is a fold over chapters in document order, so only the
// chapter-local normalize/segment work can fan out; the fold stays sequential and
// the parallel path returns exactly what the sequential one does

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::annotator::{AnnotatedChapter, Annotator, RawChapter, Roster, SpanType};

/// Every annotated chapter plus the final book roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedBook {
    pub chapters: Vec<AnnotatedChapter>,
    pub roster: Roster,
}

/// Annotate chapters one after another, threading the book roster through
pub fn annotate_book(annotator: &Annotator, chapters: &[RawChapter]) -> AnnotatedBook {
    let mut roster = Roster::new();
    let annotated = chapters
        .iter()
        .enumerate()
        .map(|(index, raw)| annotator.annotate_chapter(index, raw, &mut roster))
        .collect();

    info!(chapters = chapters.len(), roster_entries = roster.len(), "Annotated book");
    AnnotatedBook {
        chapters: annotated,
        roster,
    }
}

/// Normalize and segment on the blocking pool, `concurrency` chapters at a time, then
/// fold rosters and attribute in document order
pub async fn annotate_book_parallel(
    annotator: Arc<Annotator>,
    chapters: Vec<RawChapter>,
    concurrency: usize,
) -> Result<AnnotatedBook> {
    let total = chapters.len();
    let segmented = stream::iter(chapters.into_iter().enumerate())
        .map(|(index, raw)| {
            let annotator = Arc::clone(&annotator);
            tokio::task::spawn_blocking(move || {
                let chapter = annotator.normalize(&raw);
                let spans = annotator.segment(&chapter);
                debug!(chapter = index, spans = spans.len(), "Segmented chapter on worker");
                (chapter, spans)
            })
        })
        .buffered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut roster = Roster::new();
    let mut annotated = Vec::with_capacity(total);
    for (index, result) in segmented.into_iter().enumerate() {
        let (chapter, spans) = result.with_context(|| format!("Segmentation task for chapter {index} failed"))?;
        annotated.push(annotator.annotate_segmented(index, chapter, spans, &mut roster));
    }

    info!(chapters = total, roster_entries = roster.len(), concurrency, "Annotated book in parallel");
    Ok(AnnotatedBook {
        chapters: annotated,
        roster,
    })
}

/// Outcome of writing one chapter's annotation file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterStatus {
    Written,
    Skipped,
    Failed,
}

/// Per-chapter counts for `run_stats.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterStats {
    pub index: usize,
    pub display_title: String,
    pub paragraphs: usize,
    pub chars: usize,
    pub spans: usize,
    pub dialogue_spans: usize,
    pub thought_spans: usize,
    pub system_spans: usize,
    pub unknown_speakers: usize,
    pub system_angle_fixes: usize,
    pub status: ChapterStatus,
    pub error: Option<String>,
}

impl ChapterStats {
    pub fn new(chapter: &AnnotatedChapter, status: ChapterStatus, error: Option<String>) -> Self {
        Self {
            index: chapter.index,
            display_title: chapter.display_title.clone(),
            paragraphs: chapter.chapter.paragraphs.len(),
            chars: chapter.chapter.char_len(),
            spans: chapter.spans.len(),
            dialogue_spans: chapter.count_type(SpanType::Dialogue),
            thought_spans: chapter.count_type(SpanType::Thought),
            system_spans: chapter.count_type(SpanType::System),
            unknown_speakers: chapter.unknown_speakers(),
            system_angle_fixes: chapter.chapter.normalize_report.counts.system_angle_fixes,
            status,
            error,
        }
    }
}

/// Run summary written next to the annotations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub run_start_utc: u64,
    pub run_duration_ms: u64,
    pub chapters: usize,
    pub chapters_written: usize,
    pub chapters_skipped: usize,
    pub chapters_failed: usize,
    pub total_chars: usize,
    pub total_spans: usize,
    pub unknown_speakers: usize,
    pub roster_entries: usize,
    pub chars_per_sec: f64,
    pub chapter_stats: Vec<ChapterStats>,
}

impl RunStats {
    pub fn new(run_start_utc: u64, duration: Duration, roster_entries: usize, chapter_stats: Vec<ChapterStats>) -> Self {
        let count = |status| chapter_stats.iter().filter(|s| s.status == status).count();
        let total_chars: usize = chapter_stats.iter().map(|s| s.chars).sum();
        let secs = duration.as_secs_f64();
        Self {
            run_start_utc,
            run_duration_ms: duration.as_millis() as u64,
            chapters: chapter_stats.len(),
            chapters_written: count(ChapterStatus::Written),
            chapters_skipped: count(ChapterStatus::Skipped),
            chapters_failed: count(ChapterStatus::Failed),
            total_chars,
            total_spans: chapter_stats.iter().map(|s| s.spans).sum(),
            unknown_speakers: chapter_stats.iter().map(|s| s.unknown_speakers).sum(),
            roster_entries,
            chars_per_sec: if secs > 0.0 { total_chars as f64 / secs } else { 0.0 },
            chapter_stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapters() -> Vec<RawChapter> {
        vec![
            RawChapter::new("One", vec!["\"Hello, Maria,\" he said.".into(), "<Quest Accepted>".into()]),
            RawChapter::new("Two", vec!["\"Fine, Maria,\" she replied.".into()]),
        ]
    }

    #[test]
    fn test_roster_accumulates_across_chapters() {
        let annotator = Annotator::with_defaults().unwrap();
        let book = annotate_book(&annotator, &chapters());
        assert_eq!(book.chapters.len(), 2);
        assert_eq!(book.roster.names(), vec!["Maria".to_string()]);
        assert_eq!(book.chapters[1].chapter_roster.len(), 1);
    }

    #[tokio::test]
    async fn test_parallel_matches_sequential() {
        let annotator = Arc::new(Annotator::with_defaults().unwrap());
        let sequential = annotate_book(&annotator, &chapters());
        let parallel = annotate_book_parallel(Arc::clone(&annotator), chapters(), 4).await.unwrap();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_run_stats_totals() {
        let annotator = Annotator::with_defaults().unwrap();
        let book = annotate_book(&annotator, &chapters());
        let stats: Vec<ChapterStats> = book
            .chapters
            .iter()
            .map(|c| ChapterStats::new(c, ChapterStatus::Written, None))
            .collect();
        let run = RunStats::new(0, Duration::from_millis(10), book.roster.len(), stats);

        assert_eq!(run.chapters, 2);
        assert_eq!(run.chapters_written, 2);
        assert_eq!(run.chapter_stats[0].system_spans, 1);
        assert_eq!(run.chapter_stats[0].dialogue_spans, 1);
        assert_eq!(run.total_spans, run.chapter_stats.iter().map(|s| s.spans).sum::<usize>());
        assert!(run.chars_per_sec > 0.0);
    }
}
