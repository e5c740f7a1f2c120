// WHY: dependency parsing, NER, coreference and the speaker oracle live outside this
// crate; the cascade only sees this trait and degrades when a method is not provided

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Universal POS tag of a person-like subject we accept as a speaker
pub const POS_PROPER_NOUN: &str = "PROPN";
pub const POS_PRONOUN: &str = "PRON";
pub const POS_VERB: &str = "VERB";
pub const DEP_NOMINAL_SUBJECT: &str = "nsubj";

/// One token of a parsed text; `char_offset` is relative to the parsed text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub lemma: String,
    pub pos: String,
    #[serde(rename = "dep_label")]
    pub dep: String,
    /// Index of the syntactic head inside `ParsedDoc::tokens`; a root points at itself
    #[serde(rename = "head_index")]
    pub head: usize,
    pub char_offset: usize,
}

impl Token {
    /// Char offset one past the token's last char
    pub fn char_end(&self) -> usize {
        self.char_offset + self.text.chars().count()
    }

    pub fn is_person_like(&self) -> bool {
        self.pos == POS_PROPER_NOUN || self.pos == POS_PRONOUN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub start_char: usize,
    pub end_char: usize,
}

/// Result of `TokenizeAndParse`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedDoc {
    pub tokens: Vec<Token>,
    pub sentences: Vec<Sentence>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonEntity {
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleAnswer {
    pub speaker: String,
    pub confidence: f32,
}

/// Optional NLP backends consulted by the roster builder and attribution cascade.
///
/// Every method returns `Ok(None)` when the capability is not available. An `Err`
/// is an external failure: callers log it and treat it as "no match". Backends that
/// are not reentrant must serialize access internally.
pub trait NlpCapabilities: Send + Sync {
    fn parse(&self, _text: &str) -> Result<Option<ParsedDoc>> {
        Ok(None)
    }

    fn find_entities(&self, _text: &str) -> Result<Option<Vec<PersonEntity>>> {
        Ok(None)
    }

    /// Resolve the pronoun at char range `pronoun` of `window` to an antecedent mention
    fn resolve_pronoun(&self, _window: &str, _pronoun: (usize, usize)) -> Result<Option<String>> {
        Ok(None)
    }

    fn ask_oracle(&self, _excerpt: &str, _roster_names: &[String]) -> Result<Option<OracleAnswer>> {
        Ok(None)
    }
}

/// Backend with no capabilities; the cascade falls through to its rule-only tiers
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCapabilities;

impl NlpCapabilities for NoCapabilities {}

/// Run one capability call, logging and swallowing external failures
pub fn call_capability<T>(name: &str, call: impl FnOnce() -> Result<Option<T>>) -> Option<T> {
    match call() {
        Ok(value) => value,
        Err(e) => {
            warn!(capability = name, error = %e, "Capability call failed, treating as no match");
            None
        }
    }
}
