// WHY: shared chapter/span types plus the Annotator facade that wires the four
// components together with one configuration and one capability backend

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub mod attribution;
pub mod capabilities;
pub mod context;
pub mod fuzzy;
pub mod normalizer;
pub mod positions;
pub mod roster;
pub mod segmenter;
pub mod speech;
pub mod titles;

pub use attribution::{AttributeEngine, Attribution, Method, Neighbors};
pub use capabilities::{NlpCapabilities, NoCapabilities};
pub use normalizer::Normalizer;
pub use roster::{Roster, RosterBuilder};
pub use segmenter::Segmenter;

use crate::config::AnnotatorConfig;

/// A chapter as handed over by the ingestion boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChapter {
    #[serde(default)]
    pub title: String,
    pub paragraphs: Vec<String>,
}

impl RawChapter {
    pub fn new(title: impl Into<String>, paragraphs: Vec<String>) -> Self {
        Self {
            title: title.into(),
            paragraphs,
        }
    }
}

/// Structural class of one paragraph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineTag {
    Heading,
    SystemAngle,
    SystemSquare,
    SectionBreak,
    Meta,
    None,
}

impl LineTag {
    pub fn is_system(self) -> bool {
        matches!(self, LineTag::SystemAngle | LineTag::SystemSquare)
    }
}

impl fmt::Display for LineTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LineTag::Heading => "Heading",
            LineTag::SystemAngle => "SystemAngle",
            LineTag::SystemSquare => "SystemSquare",
            LineTag::SectionBreak => "SectionBreak",
            LineTag::Meta => "Meta",
            LineTag::None => "None",
        };
        f.write_str(name)
    }
}

/// Bracket family of an inline system token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InlineTagKind {
    Angle,
    Square,
}

/// Inline `<...>` or `[...]` token, half-open char offsets relative to its paragraph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineTag {
    pub start: usize,
    pub end: usize,
    pub tag: InlineTagKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpanType {
    Narration,
    Dialogue,
    Thought,
    System,
    Meta,
    SectionBreak,
    Heading,
}

impl SpanType {
    /// Dialogue and Thought are the only types that go through the attribution cascade
    pub fn is_quote(self) -> bool {
        matches!(self, SpanType::Dialogue | SpanType::Thought)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpanSubtype {
    LineAngle,
    LineSquare,
    InlineAngle,
    InlineSquare,
}

/// Labeled region of chapter text with absolute half-open char offsets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    #[serde(rename = "type")]
    pub span_type: SpanType,
    pub text: String,
    pub para_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<SpanSubtype>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Per-chapter tallies collected while normalizing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeCounts {
    pub system_angle_fixes: usize,
    pub inline_tags: usize,
    pub headings: usize,
    pub system_angle_lines: usize,
    pub system_square_lines: usize,
    pub section_breaks: usize,
    pub meta_lines: usize,
    pub control_chars_removed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeReport {
    pub is_heading: bool,
    pub removed_heading_index: Option<usize>,
    pub removed_paragraph_indices: Vec<usize>,
    pub counts: NormalizeCounts,
}

/// Read-only normalized form of one chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedChapter {
    pub paragraphs: Vec<String>,
    /// `paragraphs` joined by `separator`, LF line endings only
    pub text: String,
    pub separator: String,
    pub line_tags: Vec<LineTag>,
    pub inline_tags: BTreeMap<usize, Vec<InlineTag>>,
    pub display_title: String,
    pub normalize_report: NormalizeReport,
}

impl NormalizedChapter {
    /// Absolute char offset of each paragraph inside `text`
    pub fn paragraph_starts(&self) -> Vec<usize> {
        let separator_len = self.separator.chars().count();
        let mut starts = Vec::with_capacity(self.paragraphs.len());
        let mut offset = 0;
        for paragraph in &self.paragraphs {
            starts.push(offset);
            offset += paragraph.chars().count() + separator_len;
        }
        starts
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A span together with its speaker attribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedSpan {
    #[serde(flatten)]
    pub span: Span,
    #[serde(flatten)]
    pub attribution: Attribution,
}

/// Output of annotating one chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedChapter {
    pub index: usize,
    pub display_title: String,
    pub chapter: NormalizedChapter,
    pub spans: Vec<AnnotatedSpan>,
    pub chapter_roster: Roster,
}

impl AnnotatedChapter {
    pub fn count_type(&self, span_type: SpanType) -> usize {
        self.spans.iter().filter(|s| s.span.span_type == span_type).count()
    }

    pub fn unknown_speakers(&self) -> usize {
        self.spans
            .iter()
            .filter(|s| s.span.span_type.is_quote() && s.attribution.method == Method::Unknown)
            .count()
    }
}

/// Normalizer, Segmenter, RosterBuilder and AttributeEngine behind one configuration
pub struct Annotator {
    config: AnnotatorConfig,
    normalizer: Normalizer,
    segmenter: Segmenter,
    roster_builder: RosterBuilder,
    engine: AttributeEngine,
    capabilities: Arc<dyn NlpCapabilities>,
}

impl Annotator {
    /// Create an annotator with an injected capability backend
    pub fn new(config: AnnotatorConfig, capabilities: Arc<dyn NlpCapabilities>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            normalizer: Normalizer::new(config.normalizer.clone())?,
            segmenter: Segmenter::new(config.segmenter.clone()),
            roster_builder: RosterBuilder::new(config.roster.clone())?,
            engine: AttributeEngine::new(config.attribution.clone(), config.segmenter.quote_chars())?,
            config,
            capabilities,
        })
    }

    /// Default configuration, no NLP capabilities
    pub fn with_defaults() -> Result<Self> {
        Self::new(AnnotatorConfig::default(), Arc::new(NoCapabilities))
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &dyn NlpCapabilities {
        self.capabilities.as_ref()
    }

    pub fn normalize(&self, chapter: &RawChapter) -> NormalizedChapter {
        self.normalizer.normalize(chapter)
    }

    pub fn segment(&self, chapter: &NormalizedChapter) -> Vec<Span> {
        self.segmenter.segment(chapter)
    }

    pub fn build_chapter_roster(&self, text: &str) -> Roster {
        self.roster_builder.build_chapter_roster(text, self.capabilities.as_ref())
    }

    pub fn merge_book_roster(&self, book: Roster, chapter: &Roster) -> Roster {
        self.roster_builder.merge_book_roster(book, chapter)
    }

    pub fn engine(&self) -> &AttributeEngine {
        &self.engine
    }

    /// Attribute every span of a segmented chapter against a roster
    pub fn attribute_spans(&self, chapter: &NormalizedChapter, spans: &[Span], roster: &Roster) -> Vec<AnnotatedSpan> {
        let full_doc = if self.config.attribution.use_full_document_parse && spans.iter().any(|s| s.span_type.is_quote()) {
            capabilities::call_capability("parse", || self.capabilities.parse(&chapter.text))
        } else {
            None
        };

        spans
            .iter()
            .enumerate()
            .map(|(index, span)| {
                let attribution = match attribution::shortcut_attribution(span.span_type) {
                    Some(shortcut) => shortcut,
                    None => self.engine.attribute_span(
                        &chapter.text,
                        (span.start, span.end),
                        span.span_type,
                        roster,
                        Some(Neighbors::from_spans(spans, index)),
                        full_doc.as_ref(),
                        self.capabilities.as_ref(),
                    ),
                };
                AnnotatedSpan {
                    span: span.clone(),
                    attribution,
                }
            })
            .collect()
    }

    /// Annotate one chapter, folding its roster into the running book roster first
    pub fn annotate_chapter(&self, index: usize, raw: &RawChapter, book_roster: &mut Roster) -> AnnotatedChapter {
        let chapter = self.normalize(raw);
        let spans = self.segment(&chapter);
        self.annotate_segmented(index, chapter, spans, book_roster)
    }

    /// Second half of `annotate_chapter` for chapters normalized and segmented elsewhere
    pub fn annotate_segmented(
        &self,
        index: usize,
        chapter: NormalizedChapter,
        spans: Vec<Span>,
        book_roster: &mut Roster,
    ) -> AnnotatedChapter {
        let chapter_roster = self.build_chapter_roster(&chapter.text);
        *book_roster = self.merge_book_roster(std::mem::take(book_roster), &chapter_roster);

        let annotated = self.attribute_spans(&chapter, &spans, book_roster);
        debug!(
            chapter = index,
            spans = annotated.len(),
            roster_entries = book_roster.len(),
            "Annotated chapter"
        );

        AnnotatedChapter {
            index,
            display_title: chapter.display_title.clone(),
            chapter,
            spans: annotated,
            chapter_roster,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraph_starts_follow_separator() {
        let annotator = Annotator::with_defaults().unwrap();
        let chapter = annotator.normalize(&RawChapter::new("T", vec!["ab".into(), "\u{201C}c\u{201D}".into(), "d".into()]));
        assert_eq!(chapter.paragraph_starts(), vec![0, 4, 9]);
        assert_eq!(chapter.char_len(), 10);
    }

    #[test]
    fn test_annotate_chapter_attributes_every_span() {
        let annotator = Annotator::with_defaults().unwrap();
        let raw = RawChapter::new(
            "Arrival",
            vec![
                "<Level Up!>".into(),
                "\"Hello, Maria,\" he said. \"Hi, John,\" she replied.".into(),
            ],
        );
        let mut book = Roster::default();
        let annotated = annotator.annotate_chapter(0, &raw, &mut book);

        assert_eq!(annotated.spans[0].attribution.speaker, "System");
        assert_eq!(annotated.count_type(SpanType::Dialogue), 2);
        for span in &annotated.spans {
            assert!(!span.attribution.speaker.is_empty());
            assert!((0.0..=1.0).contains(&span.attribution.confidence));
        }
        assert!(book.canonicalize("Maria").is_some());
    }

    #[test]
    fn test_annotated_span_serializes_flat() {
        let span = AnnotatedSpan {
            span: Span {
                start: 0,
                end: 3,
                span_type: SpanType::Narration,
                text: "abc".into(),
                para_index: 0,
                subtype: None,
                notes: Vec::new(),
            },
            attribution: Attribution::new("Narrator", Method::DefaultNarration, 0.99),
        };
        let value = serde_json::to_value(&span).unwrap();
        assert_eq!(value["type"], "Narration");
        assert_eq!(value["speaker"], "Narrator");
        assert_eq!(value["method"], "rule:default_narration");
        assert!(value.get("subtype").is_none());
    }
}
