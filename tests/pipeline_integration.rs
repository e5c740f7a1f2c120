use std::sync::Arc;

use quotecast::annotator::attribution::{SPEAKER_NARRATOR, SPEAKER_SYSTEM, SPEAKER_UNKNOWN};
use quotecast::annotator::LineTag;
use quotecast::{
    annotate_book, annotate_book_parallel, AnnotatorConfig, Annotator, Method, NoCapabilities, SpanSubtype, SpanType,
};

#[path = "integration/fixtures/mod.rs"]
mod fixtures;
use fixtures::*;

#[path = "integration/mod.rs"]
mod test_utils;
use test_utils::{assert_spans_well_formed, ScriptedCapabilities};

fn thought_config() -> AnnotatorConfig {
    let mut config = AnnotatorConfig::default();
    config.segmenter.treat_single_quotes_as_thought = true;
    config
}

/// Every chapter of the book survives segmentation with exact offsets
#[test]
fn test_book_spans_are_well_formed() {
    let annotator = Annotator::with_defaults().expect("Annotator creation should succeed");
    let book = annotate_book(&annotator, &book());

    assert_eq!(book.chapters.len(), 3);
    for chapter in &book.chapters {
        let spans: Vec<_> = chapter.spans.iter().map(|s| s.span.clone()).collect();
        assert_spans_well_formed(&chapter.chapter, &spans);
        for span in &chapter.spans {
            assert!(!span.attribution.speaker.is_empty());
            assert!((0.0..=1.0).contains(&span.attribution.confidence));
        }
    }
}

/// Structural paragraphs get fixed speakers without running the cascade
#[test]
fn test_structural_spans_use_shortcuts() {
    let annotator = Annotator::with_defaults().unwrap();
    let book = annotate_book(&annotator, &[arrival_chapter(), market_chapter()]);
    let arrival = &book.chapters[0];

    assert!(arrival.chapter.normalize_report.is_heading);
    assert_eq!(arrival.chapter.line_tags[0], LineTag::Heading);
    assert_eq!(arrival.chapter.paragraphs[0], "Chapter 1: Arrival");

    let heading = &arrival.spans[0];
    assert_eq!(heading.span.span_type, SpanType::Heading);
    assert_eq!(heading.attribution.speaker, SPEAKER_NARRATOR);
    assert_eq!(heading.attribution.method, Method::NonStory);

    let level_up = &arrival.spans[1];
    assert_eq!(level_up.span.text, "<Level Up!>");
    assert_eq!(level_up.span.subtype, Some(SpanSubtype::LineAngle));
    assert_eq!(level_up.attribution.speaker, SPEAKER_SYSTEM);
    assert_eq!(level_up.attribution.confidence, 1.0);

    assert_eq!(arrival.count_type(SpanType::SectionBreak), 1);

    let market = &book.chapters[1];
    let quest = market
        .spans
        .iter()
        .find(|s| s.span.subtype == Some(SpanSubtype::LineSquare))
        .expect("square system line should be a span");
    assert_eq!(quest.attribution.method, Method::SystemLine);
    assert_eq!(market.count_type(SpanType::Meta), 1);
}

/// The book roster carries names harvested in earlier chapters
#[test]
fn test_book_roster_accumulates_in_document_order() {
    let annotator = Annotator::with_defaults().unwrap();
    let book = annotate_book(&annotator, &book());

    assert!(book.roster.canonicalize("Maria").is_some());
    assert!(book.roster.canonicalize("John").is_some());
    assert!(book.chapters[0].chapter_roster.canonicalize("Maria").is_some());
}

/// Without any capability backend, unmatched quotes fall back to Unknown
#[test]
fn test_unmatched_quotes_are_unknown_without_capabilities() {
    let annotator = Annotator::with_defaults().unwrap();
    let book = annotate_book(&annotator, &[arrival_chapter()]);
    let dialogue: Vec<_> = book.chapters[0]
        .spans
        .iter()
        .filter(|s| s.span.span_type == SpanType::Dialogue)
        .collect();

    assert_eq!(dialogue.len(), 2);
    assert_eq!(dialogue[0].span.text, "\"Hello, Maria,\"");
    for span in dialogue {
        assert_eq!(span.attribution.speaker, SPEAKER_UNKNOWN);
        assert_eq!(span.attribution.confidence, 0.5);
    }
}

/// Thought cue after a single-quoted span
#[test]
fn test_thought_cue_attribution() {
    let annotator = Annotator::new(thought_config(), Arc::new(NoCapabilities)).unwrap();
    let book = annotate_book(&annotator, &[thought_chapter()]);
    let spans = &book.chapters[0].spans;

    let thought: Vec<_> = spans.iter().filter(|s| s.span.span_type == SpanType::Thought).collect();
    assert_eq!(thought.len(), 1);
    assert_eq!(thought[0].span.text, "'I wonder if this will work,'");
    assert_eq!(thought[0].attribution.speaker, "Alice");
    assert_eq!(thought[0].attribution.method, Method::ThoughtCue);
    assert!([0.88_f32, 0.90].contains(&thought[0].attribution.confidence));
}

/// The chapter-wide parse feeds the dependency tier
#[test]
fn test_full_document_parse_attributes_dialogue() {
    let annotator = Annotator::new(AnnotatorConfig::default(), Arc::new(ScriptedCapabilities::parser_only())).unwrap();
    let chapter = quotecast::RawChapter::new("Gate", vec!["\"Open the gate,\" Maria said.".into()]);
    let book = annotate_book(&annotator, &[chapter]);

    let quote = &book.chapters[0].spans[0];
    assert_eq!(quote.span.span_type, SpanType::Dialogue);
    assert_eq!(quote.attribution.speaker, "Maria");
    assert_eq!(quote.attribution.method, Method::DepSubject);
    assert_eq!(quote.attribution.confidence, 0.92);
}

/// Parallel segmentation yields byte-identical books
#[tokio::test]
async fn test_parallel_pipeline_matches_sequential() {
    let annotator = Arc::new(Annotator::new(thought_config(), Arc::new(ScriptedCapabilities::parser_only())).unwrap());
    let sequential = annotate_book(&annotator, &book());

    for concurrency in [1, 2, 8] {
        let parallel = annotate_book_parallel(Arc::clone(&annotator), book(), concurrency)
            .await
            .expect("Parallel pipeline should succeed");
        assert_eq!(parallel, sequential, "concurrency {concurrency}");
        assert_eq!(
            serde_json::to_string(&parallel).unwrap(),
            serde_json::to_string(&sequential).unwrap()
        );
    }
}

#[tokio::test]
async fn test_empty_book() {
    let annotator = Arc::new(Annotator::with_defaults().unwrap());
    let book = annotate_book_parallel(annotator, Vec::new(), 4).await.unwrap();
    assert!(book.chapters.is_empty());
    assert!(book.roster.is_empty());
}
