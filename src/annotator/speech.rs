// WHY: subject extraction over parser output, shared by the per-window and the
// full-document tiers; only tokens inside the region bounds are considered

use std::collections::HashSet;

use super::capabilities::{Token, DEP_NOMINAL_SUBJECT, POS_PRONOUN, POS_PROPER_NOUN};

/// Lemmas of verbs that report speech or thought
pub const REPORTING_VERBS: &[&str] = &[
    "say", "ask", "reply", "answer", "respond", "shout", "yell", "scream", "cry", "call",
    "whisper", "murmur", "mutter", "mumble", "exclaim", "add", "continue", "snap", "growl",
    "hiss", "sigh", "laugh", "chuckle", "giggle", "explain", "insist", "declare", "demand",
    "retort", "remark", "announce", "state", "note", "agree", "admit", "warn", "beg", "plead",
    "protest", "grumble", "bark", "bellow", "stammer", "stutter", "tell", "think", "wonder",
    "muse", "sneer", "gasp", "groan", "moan", "whimper", "roar", "breathe", "query", "inquire",
];

/// Two-token speech verbs as (verb lemma, particle)
pub const PHRASAL_VERBS: &[(&str, &str)] = &[
    ("chime", "in"),
    ("cut", "in"),
    ("butt", "in"),
    ("break", "in"),
    ("call", "out"),
    ("cry", "out"),
    ("shout", "out"),
    ("blurt", "out"),
    ("bark", "out"),
    ("spit", "out"),
    ("speak", "up"),
    ("pipe", "up"),
    ("go", "on"),
];

const NAME_PART_DEPS: &[&str] = &["compound", "flat", "flat:name"];

/// Speaker candidate found in a token region
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    /// Proper-noun name including compound parts
    Name(String),
    /// Pronoun token char range, in token coordinates
    Pronoun(usize, usize),
}

/// Tokens of one parse restricted to a char range, with the quote position for
/// distance ranking
#[derive(Debug, Clone, Copy)]
pub struct TokenRegion<'a> {
    pub tokens: &'a [Token],
    pub bounds: (usize, usize),
    pub quote: (usize, usize),
}

impl<'a> TokenRegion<'a> {
    pub fn new(tokens: &'a [Token], bounds: (usize, usize), quote: (usize, usize)) -> Self {
        Self { tokens, bounds, quote }
    }

    fn contains(&self, token: &Token) -> bool {
        let inside = token.char_offset >= self.bounds.0 && token.char_end() <= self.bounds.1;
        let in_quote = self.quote.0 < self.quote.1 && token.char_offset < self.quote.1 && token.char_end() > self.quote.0;
        inside && !in_quote
    }

    /// Char distance from a token to the quote
    fn distance(&self, token: &Token) -> usize {
        let (qa, qb) = self.quote;
        if token.char_end() <= qa {
            qa - token.char_end()
        } else {
            token.char_offset.saturating_sub(qb)
        }
    }

    fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.tokens.len()).filter(|&i| self.contains(&self.tokens[i]))
    }
}

/// Matches reporting and phrasal speech verbs with their subject
#[derive(Debug, Clone)]
pub struct SpeechMatcher {
    reporting: HashSet<&'static str>,
    token_radius: usize,
}

impl SpeechMatcher {
    pub fn new(token_radius: usize) -> Self {
        Self {
            reporting: REPORTING_VERBS.iter().copied().collect(),
            token_radius,
        }
    }

    fn is_reporting(&self, token: &Token) -> bool {
        self.reporting.contains(token.lemma.to_lowercase().as_str())
    }

    /// Reporting verb with a PROPN/PRON nominal subject, nearest the quote first
    pub fn dependency_subject(&self, region: &TokenRegion) -> Option<Subject> {
        let tokens = region.tokens;
        region
            .indices()
            .filter(|&v| self.is_reporting(&tokens[v]))
            .filter_map(|v| {
                let subject = region.indices().find(|&i| {
                    i != v
                        && tokens[i].head == v
                        && tokens[i].dep.starts_with(DEP_NOMINAL_SUBJECT)
                        && tokens[i].is_person_like()
                })?;
                Some((region.distance(&tokens[v]), v, subject))
            })
            .min_by_key(|&(distance, v, _)| (distance, v))
            .and_then(|(_, _, subject)| self.subject_of(region, subject))
    }

    /// Phrasal speech verb with the nearest person-like token within the radius
    pub fn phrasal_subject(&self, region: &TokenRegion) -> Option<Subject> {
        let tokens = region.tokens;
        let in_region: Vec<usize> = region.indices().collect();

        let verb = in_region
            .windows(2)
            .filter(|pair| pair[1] == pair[0] + 1)
            .find(|pair| {
                let lemma = tokens[pair[0]].lemma.to_lowercase();
                let particle = tokens[pair[1]].text.to_lowercase();
                PHRASAL_VERBS.iter().any(|(v, p)| *v == lemma && *p == particle)
            })
            .map(|pair| pair[0])?;

        let nsubj = in_region.iter().copied().find(|&i| {
            tokens[i].head == verb && tokens[i].dep.starts_with(DEP_NOMINAL_SUBJECT) && tokens[i].is_person_like()
        });
        let nearest = || {
            in_region
                .iter()
                .copied()
                .filter(|&i| i != verb && i != verb + 1 && tokens[i].is_person_like())
                .filter(|&i| i.abs_diff(verb) <= self.token_radius)
                .min_by_key(|&i| (i.abs_diff(verb), i > verb))
        };

        nsubj.or_else(nearest).and_then(|subject| self.subject_of(region, subject))
    }

    fn subject_of(&self, region: &TokenRegion, subject: usize) -> Option<Subject> {
        let token = &region.tokens[subject];
        match token.pos.as_str() {
            POS_PROPER_NOUN => Some(Subject::Name(full_name(region, subject))),
            POS_PRONOUN => Some(Subject::Pronoun(token.char_offset, token.char_end())),
            _ => None,
        }
    }
}

/// Subject token plus its compound/flat proper-noun dependents, in text order
fn full_name(region: &TokenRegion, subject: usize) -> String {
    let tokens = region.tokens;
    let mut parts: Vec<usize> = region
        .indices()
        .filter(|&i| {
            i != subject
                && tokens[i].head == subject
                && tokens[i].pos == POS_PROPER_NOUN
                && NAME_PART_DEPS.contains(&tokens[i].dep.as_str())
        })
        .collect();
    parts.push(subject);
    parts.sort_by_key(|&i| tokens[i].char_offset);
    parts.iter().map(|&i| tokens[i].text.as_str()).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotator::capabilities::POS_VERB;

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

    // " Mary Jane said softly."
    fn said_tokens() -> Vec<Token> {
        vec![
            token("Mary", "Mary", POS_PROPER_NOUN, "compound", 1, 1),
            token("Jane", "Jane", POS_PROPER_NOUN, "nsubj", 2, 6),
            token("said", "say", POS_VERB, "ROOT", 2, 11),
            token("softly", "softly", "ADV", "advmod", 2, 16),
        ]
    }

    #[test]
    fn test_dependency_subject_with_compound_name() {
        let tokens = said_tokens();
        let region = TokenRegion::new(&tokens, (0, 23), (0, 0));
        let matcher = SpeechMatcher::new(12);
        assert_eq!(matcher.dependency_subject(&region), Some(Subject::Name("Mary Jane".into())));
    }

    #[test]
    fn test_dependency_subject_respects_bounds() {
        let tokens = said_tokens();
        let region = TokenRegion::new(&tokens, (10, 23), (0, 0));
        assert_eq!(SpeechMatcher::new(12).dependency_subject(&region), None);
    }

    #[test]
    fn test_pronoun_subject_is_reported_by_range() {
        let tokens = vec![
            token("she", "she", POS_PRONOUN, "nsubj", 1, 1),
            token("replied", "reply", POS_VERB, "ROOT", 1, 5),
        ];
        let region = TokenRegion::new(&tokens, (0, 13), (0, 0));
        assert_eq!(SpeechMatcher::new(12).dependency_subject(&region), Some(Subject::Pronoun(1, 4)));
    }

    #[test]
    fn test_nearest_verb_wins() {
        // " Tom nodded. Ann said. Bob said." matched backward from a quote at 40
        let tokens = vec![
            token("Ann", "Ann", POS_PROPER_NOUN, "nsubj", 1, 13),
            token("said", "say", POS_VERB, "ROOT", 1, 17),
            token("Bob", "Bob", POS_PROPER_NOUN, "nsubj", 3, 23),
            token("said", "say", POS_VERB, "ROOT", 3, 27),
        ];
        let region = TokenRegion::new(&tokens, (0, 40), (40, 40));
        assert_eq!(SpeechMatcher::new(12).dependency_subject(&region), Some(Subject::Name("Bob".into())));
    }

    #[test]
    fn test_phrasal_verb_subject() {
        // " Lena chimed in."
        let tokens = vec![
            token("Lena", "Lena", POS_PROPER_NOUN, "nsubj", 1, 1),
            token("chimed", "chime", POS_VERB, "ROOT", 1, 6),
            token("in", "in", "ADP", "compound:prt", 1, 13),
        ];
        let region = TokenRegion::new(&tokens, (0, 16), (0, 0));
        let matcher = SpeechMatcher::new(12);
        assert_eq!(matcher.dependency_subject(&region), None);
        assert_eq!(matcher.phrasal_subject(&region), Some(Subject::Name("Lena".into())));
    }

    #[test]
    fn test_phrasal_radius_limits_search() {
        let mut tokens = vec![token("Lena", "Lena", POS_PROPER_NOUN, "obj", 5, 0)];
        for i in 1..5 {
            tokens.push(token("very", "very", "ADV", "advmod", 5, i * 5));
        }
        tokens.push(token("piped", "pipe", POS_VERB, "ROOT", 5, 25));
        tokens.push(token("up", "up", "ADP", "compound:prt", 5, 31));
        let region = TokenRegion::new(&tokens, (0, 40), (40, 40));

        assert_eq!(SpeechMatcher::new(5).phrasal_subject(&region), Some(Subject::Name("Lena".into())));
        assert_eq!(SpeechMatcher::new(4).phrasal_subject(&region), None);
    }
}
