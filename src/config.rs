// WHY: one place for every tunable of the annotation engine so a partial TOML file
// can override only the fields it names

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Top-level configuration for normalization, segmentation, rosters and attribution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    pub normalizer: NormalizerConfig,
    pub segmenter: SegmenterConfig,
    pub roster: RosterConfig,
    pub attribution: AttributionConfig,
}

/// Line classification and text cleanup rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Separator placed between paragraphs in the joined chapter text
    pub paragraph_separator: String,
    /// Remove control characters other than LF and TAB
    pub strip_control_chars: bool,
    /// Apply Unicode NFKC normalization to every paragraph
    pub unicode_normalize: bool,
    /// Drop paragraph 0 when it is a `Chapter N` heading
    pub treat_heading_as_removable: bool,
    /// Tighten whitespace inside `<...>` tokens on system-angle lines
    pub fix_system_angle_spacing: bool,
    /// Regex fragments (case-insensitive) marking author/translator meta lines
    pub meta_patterns: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            paragraph_separator: "\n\n".to_string(),
            strip_control_chars: true,
            unicode_normalize: false,
            treat_heading_as_removable: false,
            fix_system_angle_spacing: true,
            meta_patterns: vec![
                r"patreon".to_string(),
                r"discord".to_string(),
                r"ko-?fi".to_string(),
                r"support\s+me".to_string(),
                r"join\s+my".to_string(),
                r"read\s+ahead".to_string(),
                r"translator'?s?\s+note".to_string(),
                r"editor'?s?\s+note".to_string(),
                r"^\s*[ta]/n\s*:".to_string(),
            ],
        }
    }
}

/// Span production rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub emit_headings: bool,
    pub emit_meta: bool,
    pub emit_section_breaks: bool,
    pub emit_system_lines: bool,
    /// Carve inline `<...>`/`[...]` tokens out of narration as System spans
    pub emit_inline_system: bool,
    /// Single-quoted spans become Thought instead of Dialogue
    pub treat_single_quotes_as_thought: bool,
    /// Merge contiguous spans of equal type and subtype after sorting
    pub merge_adjacent: bool,
    pub double_quote_openers: Vec<char>,
    pub double_quote_closers: Vec<char>,
    pub single_quote_openers: Vec<char>,
    pub single_quote_closers: Vec<char>,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            emit_headings: true,
            emit_meta: true,
            emit_section_breaks: true,
            emit_system_lines: true,
            emit_inline_system: true,
            treat_single_quotes_as_thought: false,
            merge_adjacent: false,
            double_quote_openers: vec!['"', '\u{201C}'],
            double_quote_closers: vec!['"', '\u{201D}'],
            single_quote_openers: vec!['\'', '\u{2018}'],
            single_quote_closers: vec!['\'', '\u{2019}'],
        }
    }
}

impl SegmenterConfig {
    /// Every character that opens or closes a quote, used as a window stop token
    pub fn quote_chars(&self) -> Vec<char> {
        let mut chars: Vec<char> = self
            .double_quote_openers
            .iter()
            .chain(&self.double_quote_closers)
            .chain(&self.single_quote_openers)
            .chain(&self.single_quote_closers)
            .copied()
            .collect();
        chars.sort_unstable();
        chars.dedup();
        chars
    }
}

/// Character roster harvesting and merge rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    /// Similarity ratio (0-100) at or above which two canonicals are merged
    pub fuzzy_threshold: f64,
    /// Use fuzzy matching when folding chapter rosters into the book roster
    pub fuzzy_merge: bool,
    /// Aliases longer than this many chars are discarded
    pub max_alias_len: usize,
    /// Minimum summed harvest weight for an alias to be kept
    pub min_weight: u32,
    /// Ask the NER capability for PERSON entities
    pub use_ner: bool,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 88.0,
            fuzzy_merge: true,
            max_alias_len: 40,
            min_weight: 1,
            use_ner: true,
        }
    }
}

/// Speaker attribution cascade tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionConfig {
    pub thought_window_chars: usize,
    pub descriptor_window_chars: usize,
    pub min_context_chars: usize,
    pub mid_context_chars: usize,
    pub max_context_chars: usize,
    /// Symmetric window used when neighbouring quote offsets are unknown
    pub context_chars: usize,
    /// Sentence-ending marks allowed in one context window
    pub max_sents: usize,
    /// Token radius searched around a phrasal speech verb
    pub phrasal_token_radius: usize,
    /// Parse the whole chapter once and try sentence-bounded regions
    pub use_full_document_parse: bool,
    pub use_oracle: bool,
    pub oracle_context_chars: usize,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            thought_window_chars: 140,
            descriptor_window_chars: 160,
            min_context_chars: 60,
            mid_context_chars: 120,
            max_context_chars: 240,
            context_chars: 200,
            max_sents: 2,
            phrasal_token_radius: 12,
            use_full_document_parse: true,
            use_oracle: false,
            oracle_context_chars: 400,
        }
    }
}

impl AnnotatorConfig {
    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let seg = &self.segmenter;
        if seg.double_quote_openers.is_empty() || seg.double_quote_closers.is_empty() {
            bail!("segmenter.double_quote_openers and double_quote_closers must not be empty");
        }
        if seg.single_quote_openers.is_empty() || seg.single_quote_closers.is_empty() {
            bail!("segmenter.single_quote_openers and single_quote_closers must not be empty");
        }

        let roster = &self.roster;
        if !(0.0..=100.0).contains(&roster.fuzzy_threshold) {
            bail!("roster.fuzzy_threshold must be within 0..=100, got {}", roster.fuzzy_threshold);
        }
        if roster.max_alias_len == 0 {
            bail!("roster.max_alias_len must be positive");
        }

        let attr = &self.attribution;
        if !(attr.min_context_chars <= attr.mid_context_chars && attr.mid_context_chars <= attr.max_context_chars) {
            bail!(
                "attribution window ladder must be ordered: min {} <= mid {} <= max {}",
                attr.min_context_chars, attr.mid_context_chars, attr.max_context_chars
            );
        }
        if attr.max_sents == 0 {
            bail!("attribution.max_sents must be at least 1");
        }
        Ok(())
    }
}

/// Load configuration from an optional TOML file, falling back to defaults
pub fn load_config(path: Option<&Path>) -> Result<AnnotatorConfig> {
    let config = match path {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str::<AnnotatorConfig>(&raw)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        }
        None => AnnotatorConfig::default(),
    };

    config.validate()?;
    info!(
        separator = ?config.normalizer.paragraph_separator,
        single_quotes_as_thought = config.segmenter.treat_single_quotes_as_thought,
        fuzzy_threshold = config.roster.fuzzy_threshold,
        use_oracle = config.attribution.use_oracle,
        "Configuration loaded"
    );
    Ok(config)
}
