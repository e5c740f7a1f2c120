// WHY: speaker attribution is an ordered cascade of rules; the first rule that yields a
// cue wins, and every capability failure degrades to "no match" instead of an error

use anyhow::Result;
use regex_automata::{meta::Regex, Input};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::capabilities::{call_capability, NlpCapabilities, ParsedDoc};
use super::context::{self, Window, WindowRules};
use super::positions::CharIndex;
use super::roster::Roster;
use super::speech::{SpeechMatcher, Subject, TokenRegion};
use super::titles::NameLexicon;
use super::{Span, SpanType};
use crate::config::AttributionConfig;

pub const SPEAKER_SYSTEM: &str = "System";
pub const SPEAKER_NARRATOR: &str = "Narrator";
pub const SPEAKER_UNKNOWN: &str = "Unknown";

const DESCRIPTORS: &[&str] = &[
    "man", "woman", "boy", "girl", "child", "guard", "soldier", "stranger", "voice", "knight",
    "merchant", "priest", "servant", "maid", "figure", "youth", "warrior", "mage", "officer",
    "driver", "clerk", "elder", "lady", "gentleman", "captain", "shopkeeper",
];

/// How an attribution was reached; serialized as its rule tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "rule:system_line")]
    SystemLine,
    #[serde(rename = "rule:non_story")]
    NonStory,
    #[serde(rename = "rule:default_narration")]
    DefaultNarration,
    #[serde(rename = "rule:thought_cue")]
    ThoughtCue,
    #[serde(rename = "rule:descriptor")]
    Descriptor,
    #[serde(rename = "rule:dep_subject")]
    DepSubject,
    #[serde(rename = "rule:dep_pronoun_coref")]
    DepPronounCoref,
    #[serde(rename = "rule:phrasal_verb")]
    PhrasalVerb,
    #[serde(rename = "rule:phrasal_pronoun_coref")]
    PhrasalPronounCoref,
    #[serde(rename = "llm")]
    Llm,
    #[serde(rename = "rule:unknown")]
    Unknown,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::SystemLine => "rule:system_line",
            Method::NonStory => "rule:non_story",
            Method::DefaultNarration => "rule:default_narration",
            Method::ThoughtCue => "rule:thought_cue",
            Method::Descriptor => "rule:descriptor",
            Method::DepSubject => "rule:dep_subject",
            Method::DepPronounCoref => "rule:dep_pronoun_coref",
            Method::PhrasalVerb => "rule:phrasal_verb",
            Method::PhrasalPronounCoref => "rule:phrasal_pronoun_coref",
            Method::Llm => "llm",
            Method::Unknown => "rule:unknown",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speaker, method tag and confidence in `[0, 1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub speaker: String,
    pub method: Method,
    pub confidence: f32,
}

impl Attribution {
    pub fn new(speaker: impl Into<String>, method: Method, confidence: f32) -> Self {
        Self {
            speaker: speaker.into(),
            method,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Bounds taken from the nearest quotes on either side of a span
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Neighbors {
    pub prev_end: Option<usize>,
    pub next_start: Option<usize>,
}

impl Neighbors {
    pub fn new(prev_end: Option<usize>, next_start: Option<usize>) -> Self {
        Self { prev_end, next_start }
    }

    /// Neighbours of `spans[index]` among the quote spans of the same chapter
    pub fn from_spans(spans: &[Span], index: usize) -> Self {
        let prev_end = spans[..index.min(spans.len())]
            .iter()
            .rev()
            .find(|s| s.span_type.is_quote())
            .map(|s| s.end);
        let next_start = spans
            .iter()
            .skip(index + 1)
            .find(|s| s.span_type.is_quote())
            .map(|s| s.start);
        Self { prev_end, next_start }
    }
}

/// Fixed attribution of span types that never carry a speaker
pub fn shortcut_attribution(span_type: SpanType) -> Option<Attribution> {
    match span_type {
        SpanType::System => Some(Attribution::new(SPEAKER_SYSTEM, Method::SystemLine, 1.0)),
        SpanType::Meta | SpanType::SectionBreak | SpanType::Heading => {
            Some(Attribution::new(SPEAKER_NARRATOR, Method::NonStory, 1.0))
        }
        SpanType::Narration => Some(Attribution::new(SPEAKER_NARRATOR, Method::DefaultNarration, 0.99)),
        SpanType::Dialogue | SpanType::Thought => None,
    }
}

/// Confidence of a named cue depending on whether the roster knew the name
#[derive(Debug, Clone, Copy, PartialEq)]
struct Confidence {
    canonical: f32,
    raw: f32,
}

const THOUGHT_CUE: Confidence = Confidence { canonical: 0.90, raw: 0.88 };
const DEP_SUBJECT: Confidence = Confidence { canonical: 0.95, raw: 0.92 };
const DEP_PRONOUN: Confidence = Confidence { canonical: 0.86, raw: 0.84 };
const PHRASAL: Confidence = Confidence { canonical: 0.90, raw: 0.88 };
const PHRASAL_PRONOUN: Confidence = Confidence { canonical: 0.84, raw: 0.82 };
const DESCRIPTOR_CONFIDENCE: f32 = 0.75;
const UNKNOWN_QUOTE_CONFIDENCE: f32 = 0.50;
const UNKNOWN_OTHER_CONFIDENCE: f32 = 0.99;

/// What a rule found, before roster canonicalization
#[derive(Debug, Clone, PartialEq)]
enum Cue {
    Named { name: String, method: Method, confidence: Confidence },
    Fixed(Attribution),
}

impl Cue {
    fn named(name: impl Into<String>, method: Method, confidence: Confidence) -> Self {
        Cue::Named {
            name: name.into(),
            method,
            confidence,
        }
    }

    fn resolve(self, roster: &Roster) -> Attribution {
        match self {
            Cue::Named { name, method, confidence } => match roster.canonicalize(&name) {
                Some(canonical) => Attribution::new(canonical, method, confidence.canonical),
                None => Attribution::new(name.trim(), method, confidence.raw),
            },
            Cue::Fixed(attribution) => attribution,
        }
    }
}

/// Everything one cascade run needs about the span being attributed
struct SpanContext<'a> {
    index: CharIndex<'a>,
    start: usize,
    end: usize,
    span_type: SpanType,
    roster: &'a Roster,
    neighbors: Option<Neighbors>,
    full_doc: Option<&'a ParsedDoc>,
    capabilities: &'a dyn NlpCapabilities,
}

type Rule = fn(&AttributeEngine, &SpanContext) -> Option<Cue>;

/// Cascade tiers in priority order
const CASCADE: &[(&str, Rule)] = &[
    ("thought_cue", AttributeEngine::thought_cue),
    ("descriptor", AttributeEngine::descriptor),
    ("full_document", AttributeEngine::full_document),
    ("dependency_windows", AttributeEngine::dependency_windows),
    ("oracle", AttributeEngine::oracle),
];

struct CuePatterns {
    thought: Regex,
    descriptor: Regex,
}

impl CuePatterns {
    fn compile() -> Result<Self> {
        let name_token = r"\p{Lu}[\p{L}'\u{2019}\-]*";
        let descriptors = DESCRIPTORS.join("|");
        Ok(Self {
            thought: Regex::new(&format!(r"({name_token}(?:[ \t]+{name_token})?)[ \t]+thought\b"))?,
            descriptor: Regex::new(&format!(
                r"(?i)\b(?:a|the)[ \t]+((?:\p{{L}}+[ \t]+)?(?:{descriptors}))[ \t]+(?:said|asked|replied|called|cried)\b"
            ))?,
        })
    }
}

/// Stateless speaker attribution for quote spans
pub struct AttributeEngine {
    config: AttributionConfig,
    rules: WindowRules,
    matcher: SpeechMatcher,
    patterns: CuePatterns,
    lexicon: NameLexicon,
}

impl AttributeEngine {
    pub fn new(config: AttributionConfig, quote_chars: Vec<char>) -> Result<Self> {
        Ok(Self {
            rules: WindowRules::new(quote_chars, config.max_sents),
            matcher: SpeechMatcher::new(config.phrasal_token_radius),
            patterns: CuePatterns::compile()?,
            lexicon: NameLexicon::new(),
            config,
        })
    }

    pub fn config(&self) -> &AttributionConfig {
        &self.config
    }

    /// Attribute the span `[start, end)` of `text`; bounds outside the text are clamped
    #[allow(clippy::too_many_arguments)]
    pub fn attribute_span(
        &self,
        text: &str,
        (start, end): (usize, usize),
        span_type: SpanType,
        roster: &Roster,
        neighbors: Option<Neighbors>,
        full_doc: Option<&ParsedDoc>,
        capabilities: &dyn NlpCapabilities,
    ) -> Attribution {
        let index = CharIndex::new(text);
        let (start, end) = index.clamp_range(start, end);
        let ctx = SpanContext {
            index,
            start,
            end,
            span_type,
            roster,
            neighbors,
            full_doc,
            capabilities,
        };

        let found = CASCADE.iter().find_map(|(name, rule)| {
            let cue = rule(self, &ctx)?;
            debug!(rule = *name, start, end, "Attribution rule matched");
            Some(cue.resolve(roster))
        });

        found.unwrap_or_else(|| {
            let confidence = if span_type.is_quote() {
                UNKNOWN_QUOTE_CONFIDENCE
            } else {
                UNKNOWN_OTHER_CONFIDENCE
            };
            Attribution::new(SPEAKER_UNKNOWN, Method::Unknown, confidence)
        })
    }

    /// `<Name> thought` after the span, then before it
    fn thought_cue(&self, ctx: &SpanContext) -> Option<Cue> {
        if ctx.span_type != SpanType::Thought {
            return None;
        }
        let size = self.config.thought_window_chars;
        let after = Window::new(ctx.end, ctx.index.clamp(ctx.end.saturating_add(size)));
        let before = Window::new(ctx.start.saturating_sub(size), ctx.start);

        // "Then Alice thought" matches with a leading function word
        let candidate = |raw: String| {
            let name = raw
                .split_whitespace()
                .skip_while(|t| self.lexicon.is_non_name(t))
                .collect::<Vec<_>>()
                .join(" ");
            self.lexicon
                .is_plausible_name(self.lexicon.strip_title(&name))
                .then_some(name)
        };
        let after_hit = self
            .captures_in(&self.patterns.thought, &ctx.index, after)
            .into_iter()
            .find_map(candidate);
        let before_hit = || {
            self.captures_in(&self.patterns.thought, &ctx.index, before)
                .into_iter()
                .rev()
                .find_map(candidate)
        };

        after_hit
            .or_else(before_hit)
            .map(|name| Cue::named(name, Method::ThoughtCue, THOUGHT_CUE))
    }

    /// `the [adjective] <descriptor> said`, giving an `Unknown-Young-Man` style speaker
    fn descriptor(&self, ctx: &SpanContext) -> Option<Cue> {
        let size = self.config.descriptor_window_chars;
        let after = Window::new(ctx.end, ctx.index.clamp(ctx.end.saturating_add(size)));
        let before = Window::new(ctx.start.saturating_sub(size), ctx.start);

        let phrase = self
            .captures_in(&self.patterns.descriptor, &ctx.index, after)
            .into_iter()
            .next()
            .or_else(|| self.captures_in(&self.patterns.descriptor, &ctx.index, before).pop())?;

        let speaker = std::iter::once(SPEAKER_UNKNOWN.to_string())
            .chain(phrase.split_whitespace().map(title_case))
            .collect::<Vec<_>>()
            .join("-");
        Some(Cue::Fixed(Attribution::new(speaker, Method::Descriptor, DESCRIPTOR_CONFIDENCE)))
    }

    /// Sentence-bounded regions of the one chapter parse, forward first
    fn full_document(&self, ctx: &SpanContext) -> Option<Cue> {
        let doc = ctx.full_doc?;
        let max = self.config.max_context_chars;
        let regions = [
            context::forward_sentence_region(doc, ctx.end, max),
            context::backward_sentence_region(doc, ctx.start, max),
        ];

        regions.into_iter().flatten().find_map(|region| {
            let tokens = TokenRegion::new(&doc.tokens, (region.start, region.end), (ctx.start, ctx.end));
            self.match_region(ctx, &tokens, region.text(&ctx.index), region.start)
        })
    }

    /// Parse bounded windows around the quote, capped at the neighbouring quotes.
    /// `Some(Neighbors::default())` still tries the min/mid/max forward then backward
    /// windows, capped by size alone; only `None` takes one symmetric `±context_chars`
    /// window, and `attribute_spans` always passes `Some`
    fn dependency_windows(&self, ctx: &SpanContext) -> Option<Cue> {
        let Some(neighbors) = ctx.neighbors else {
            let window = context::symmetric_window(&ctx.index, ctx.start, ctx.end, self.config.context_chars);
            let quote = (ctx.start - window.start, ctx.end - window.start);
            return self.match_parsed_window(ctx, window, quote);
        };

        let sizes = [
            self.config.min_context_chars,
            self.config.mid_context_chars,
            self.config.max_context_chars,
        ];
        let forward_limit = |size: usize| {
            let limit = ctx.end.saturating_add(size);
            neighbors.next_start.map_or(limit, |next| limit.min(next.max(ctx.end)))
        };
        let backward_limit = |size: usize| {
            let limit = ctx.start.saturating_sub(size);
            neighbors.prev_end.map_or(limit, |prev| limit.max(prev.min(ctx.start)))
        };

        let forward = sizes
            .iter()
            .map(|&size| self.rules.forward(&ctx.index, ctx.end, forward_limit(size)))
            .map(|w| (w, (0, 0)));
        let backward = sizes
            .iter()
            .map(|&size| self.rules.backward(&ctx.index, backward_limit(size), ctx.start))
            .map(|w| (w, (w.len(), w.len())));

        let mut tried: Vec<Window> = Vec::new();
        forward.chain(backward).find_map(|(window, quote)| {
            if window.is_empty() || tried.contains(&window) {
                return None;
            }
            tried.push(window);
            self.match_parsed_window(ctx, window, quote)
        })
    }

    fn match_parsed_window(&self, ctx: &SpanContext, window: Window, quote: (usize, usize)) -> Option<Cue> {
        let window_text = window.text(&ctx.index);
        if window_text.trim().is_empty() {
            return None;
        }
        let parsed = call_capability("parse", || ctx.capabilities.parse(window_text))?;
        let region = TokenRegion::new(&parsed.tokens, (0, window.len()), quote);
        self.match_region(ctx, &region, window_text, 0)
    }

    /// Dependency subject, then phrasal verb; `origin` maps token offsets to `region_text`
    fn match_region(&self, ctx: &SpanContext, region: &TokenRegion, region_text: &str, origin: usize) -> Option<Cue> {
        match self.matcher.dependency_subject(region) {
            Some(Subject::Name(name)) => return Some(Cue::named(name, Method::DepSubject, DEP_SUBJECT)),
            Some(Subject::Pronoun(a, b)) => {
                if let Some(antecedent) = self.resolve(ctx, region_text, (a - origin, b - origin)) {
                    return Some(Cue::named(antecedent, Method::DepPronounCoref, DEP_PRONOUN));
                }
            }
            None => {}
        }

        match self.matcher.phrasal_subject(region)? {
            Subject::Name(name) => Some(Cue::named(name, Method::PhrasalVerb, PHRASAL)),
            Subject::Pronoun(a, b) => self
                .resolve(ctx, region_text, (a - origin, b - origin))
                .map(|antecedent| Cue::named(antecedent, Method::PhrasalPronounCoref, PHRASAL_PRONOUN)),
        }
    }

    fn resolve(&self, ctx: &SpanContext, window: &str, pronoun: (usize, usize)) -> Option<String> {
        call_capability("resolve_pronoun", || ctx.capabilities.resolve_pronoun(window, pronoun))
            .filter(|antecedent| !antecedent.trim().is_empty())
    }

    /// Ask the oracle with a `±oracle_context_chars` excerpt and the roster names
    fn oracle(&self, ctx: &SpanContext) -> Option<Cue> {
        if !self.config.use_oracle {
            return None;
        }
        let excerpt = context::symmetric_window(&ctx.index, ctx.start, ctx.end, self.config.oracle_context_chars);
        let names = ctx.roster.names();
        let answer = call_capability("ask_oracle", || ctx.capabilities.ask_oracle(excerpt.text(&ctx.index), &names))?;

        let speaker = answer.speaker.trim();
        if speaker.is_empty() || answer.confidence.is_nan() || answer.confidence <= 0.0 {
            return None;
        }
        let speaker = ctx.roster.canonicalize(speaker).unwrap_or(speaker);
        Some(Cue::Fixed(Attribution::new(speaker, Method::Llm, answer.confidence)))
    }

    /// Group 1 of every match inside a window, in text order
    fn captures_in(&self, pattern: &Regex, index: &CharIndex, window: Window) -> Vec<String> {
        if window.is_empty() {
            return Vec::new();
        }
        let text = index.text();
        let input = Input::new(text).range(index.byte_of(window.start)..index.byte_of(window.end));
        pattern
            .captures_iter(input)
            .filter_map(|caps| caps.get_group(1).map(|group| text[group.range()].to_string()))
            .collect()
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
