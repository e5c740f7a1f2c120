// Integration test utilities and common code
// WHY: Centralized utilities avoid duplication across integration tests

#![allow(dead_code)]

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use quotecast::annotator::capabilities::{OracleAnswer, ParsedDoc, Sentence, Token, POS_PRONOUN, POS_PROPER_NOUN, POS_VERB};
use quotecast::{AnnotatedChapter, NlpCapabilities, NormalizedChapter, RawChapter, Span};

/// Test fixture helper for creating temporary directories with chapter files
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub root_path: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture with temporary directory
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root_path = temp_dir.path().to_path_buf();

        Self { temp_dir, root_path }
    }

    /// Write raw content to a file below the fixture root
    pub fn create_file<P: AsRef<Path>>(&self, relative_path: P, content: &str) -> PathBuf {
        let file_path = self.root_path.join(relative_path);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }

        fs::write(&file_path, content).expect("Failed to write test file");
        file_path
    }

    /// Write a `{"chapters": [...]}` book file
    pub fn create_book_file<P: AsRef<Path>>(&self, relative_path: P, chapters: &[RawChapter]) -> PathBuf {
        let json = serde_json::json!({ "chapters": chapters });
        self.create_file(relative_path, &json.to_string())
    }

    /// Output directory for annotation files
    pub fn out_dir(&self) -> PathBuf {
        self.root_path.join("annotations")
    }

    /// Annotation file path matching main implementation
    pub fn annotation_path(&self, chapter_index: usize) -> PathBuf {
        self.out_dir()
            .join(format!("chapter_{:04}_annotated.json", chapter_index + 1))
    }

    /// Create a truncated annotation file (without trailing newline) for testing
    pub fn create_partial_annotation(&self, chapter_index: usize, content: &str) -> PathBuf {
        let path = self.annotation_path(chapter_index);
        fs::create_dir_all(self.out_dir()).expect("Failed to create output directory");
        fs::write(&path, content.trim_end_matches('\n')).expect("Failed to write partial annotation");
        path
    }

    /// Read a written annotation back
    pub fn read_annotation(&self, chapter_index: usize) -> AnnotatedChapter {
        let content = fs::read_to_string(self.annotation_path(chapter_index)).expect("Failed to read annotation");
        serde_json::from_str(&content).expect("Annotation should be valid JSON")
    }
}

/// Sorted, non-overlapping, and each span's text is exactly its slice of the chapter
pub fn assert_spans_well_formed(chapter: &NormalizedChapter, spans: &[Span]) {
    let chars: Vec<char> = chapter.text.chars().collect();
    let mut previous_end = 0;
    for span in spans {
        assert!(span.start < span.end, "empty span {span:?}");
        assert!(span.start >= previous_end, "overlap or disorder at {span:?}");
        assert!(span.end <= chars.len(), "span past chapter end {span:?}");
        let slice: String = chars[span.start..span.end].iter().collect();
        assert_eq!(slice, span.text, "span text does not match offsets");
        previous_end = span.end;
    }
}

fn token(text: &str, lemma: &str, pos: &str, dep: &str, head: usize, char_offset: usize) -> Token {
    Token {
        text: text.into(),
        lemma: lemma.into(),
        pos: pos.into(),
        dep: dep.into(),
        head,
        char_offset,
    }
}

/// Tiny rule-based tagger: alphabetic runs are tokens, `said` is the reporting
/// verb, and a capitalized word or `he`/`she` right before it is its subject
pub fn scripted_parse(text: &str) -> ParsedDoc {
    let mut words: Vec<(String, usize)> = Vec::new();
    let mut current = String::new();
    let mut current_start = 0;
    let mut sentences = Vec::new();
    let mut sentence_start = 0;

    for (offset, ch) in text.chars().enumerate() {
        if ch.is_alphabetic() {
            if current.is_empty() {
                current_start = offset;
            }
            current.push(ch);
            continue;
        }
        if !current.is_empty() {
            words.push((std::mem::take(&mut current), current_start));
        }
        if matches!(ch, '.' | '!' | '?') {
            sentences.push(Sentence {
                start_char: sentence_start,
                end_char: offset + 1,
            });
            sentence_start = offset + 1;
        }
    }
    if !current.is_empty() {
        words.push((current, current_start));
    }
    let total = text.chars().count();
    if sentence_start < total {
        sentences.push(Sentence {
            start_char: sentence_start,
            end_char: total,
        });
    }

    let tokens = words
        .iter()
        .enumerate()
        .map(|(i, (word, offset))| {
            let next_is_said = words.get(i + 1).is_some_and(|(w, _)| w == "said");
            let is_pronoun = matches!(word.as_str(), "he" | "she" | "He" | "She");
            let is_name = !is_pronoun && word.chars().next().is_some_and(char::is_uppercase);
            match word.as_str() {
                "said" => token(word, "say", POS_VERB, "ROOT", i, *offset),
                _ if is_pronoun && next_is_said => token(word, &word.to_lowercase(), POS_PRONOUN, "nsubj", i + 1, *offset),
                _ if is_name && next_is_said => token(word, word, POS_PROPER_NOUN, "nsubj", i + 1, *offset),
                _ => token(word, &word.to_lowercase(), "X", "dep", i, *offset),
            }
        })
        .collect();

    ParsedDoc { tokens, sentences }
}

/// Capability backend driven by `scripted_parse`, resolving every pronoun to
/// `antecedent` and answering the oracle with `oracle`
pub struct ScriptedCapabilities {
    pub antecedent: Option<String>,
    pub oracle: Option<OracleAnswer>,
}

impl ScriptedCapabilities {
    pub fn parser_only() -> Self {
        Self {
            antecedent: None,
            oracle: None,
        }
    }
}

impl NlpCapabilities for ScriptedCapabilities {
    fn parse(&self, text: &str) -> Result<Option<ParsedDoc>> {
        Ok(Some(scripted_parse(text)))
    }

    fn resolve_pronoun(&self, _window: &str, _pronoun: (usize, usize)) -> Result<Option<String>> {
        Ok(self.antecedent.clone())
    }

    fn ask_oracle(&self, _excerpt: &str, _roster_names: &[String]) -> Result<Option<OracleAnswer>> {
        Ok(self.oracle.clone())
    }
}

/// Every capability call fails
pub struct BrokenCapabilities;

impl NlpCapabilities for BrokenCapabilities {
    fn parse(&self, _text: &str) -> Result<Option<ParsedDoc>> {
        anyhow::bail!("parser crashed")
    }

    fn find_entities(&self, _text: &str) -> Result<Option<Vec<quotecast::annotator::capabilities::PersonEntity>>> {
        anyhow::bail!("ner crashed")
    }

    fn resolve_pronoun(&self, _window: &str, _pronoun: (usize, usize)) -> Result<Option<String>> {
        anyhow::bail!("coref crashed")
    }

    fn ask_oracle(&self, _excerpt: &str, _roster_names: &[String]) -> Result<Option<OracleAnswer>> {
        anyhow::bail!("oracle crashed")
    }
}
