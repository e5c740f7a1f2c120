pub mod annotator;
pub mod config;
pub mod incremental;
pub mod pipeline;
pub mod reader;

// Re-export main types for convenient access
pub use annotator::{
    AnnotatedChapter, AnnotatedSpan, Annotator, AttributeEngine, Attribution, Method, NlpCapabilities,
    NoCapabilities, NormalizedChapter, Normalizer, RawChapter, Roster, RosterBuilder, Segmenter, Span,
    SpanSubtype, SpanType,
};
pub use config::{load_config, AnnotatorConfig};

// Re-export the book driver and file boundary
pub use incremental::{annotation_complete, annotation_path, needs_annotation, write_annotation};
pub use pipeline::{annotate_book, annotate_book_parallel, AnnotatedBook, RunStats};
pub use reader::{parse_chapters, ChapterReader, ReaderConfig};
