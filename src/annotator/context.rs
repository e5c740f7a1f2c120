// WHY: attribution only looks at text adjacent to a quote; windows stop at the first
// blank line, the next quote mark, or after a bounded number of sentences

use super::capabilities::ParsedDoc;
use super::positions::CharIndex;

/// Extra chars read past a window edge so lookarounds see their neighbours
const LOOKAROUND: usize = 8;

/// Half-open char range inside the chapter text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub end: usize,
}

impl Window {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn text<'a>(&self, index: &CharIndex<'a>) -> &'a str {
        index.slice(self.start, self.end)
    }
}

/// Stop tokens shared by every bounded window
#[derive(Debug, Clone)]
pub struct WindowRules {
    quote_chars: Vec<char>,
    max_sents: usize,
}

impl WindowRules {
    pub fn new(quote_chars: Vec<char>, max_sents: usize) -> Self {
        Self {
            quote_chars,
            max_sents: max_sents.max(1),
        }
    }

    /// Grow right from `from` toward `limit`
    pub fn forward(&self, index: &CharIndex, from: usize, limit: usize) -> Window {
        let (from, limit) = index.clamp_range(from, limit);
        let lo = from.saturating_sub(LOOKAROUND);
        let chars: Vec<char> = index.slice(lo, limit + LOOKAROUND).chars().collect();
        let base = from - lo;

        let mut counter = SentenceCounter::default();
        let mut end = from;
        for k in 0..(limit - from) {
            let i = base + k;
            if self.is_quote_stop(&chars, i) || is_blank_line(&chars, i) {
                break;
            }
            end = from + k + 1;
            if counter.step(chars[i]) >= self.max_sents {
                break;
            }
        }
        Window::new(from, end)
    }

    /// Grow left from `to` toward `limit`; the window never includes the mark that
    /// closes the sentence beyond `max_sents`
    pub fn backward(&self, index: &CharIndex, limit: usize, to: usize) -> Window {
        let (limit, to) = index.clamp_range(limit, to);
        let lo = limit.saturating_sub(LOOKAROUND);
        let chars: Vec<char> = index.slice(lo, to + LOOKAROUND).chars().collect();
        let base_end = to - lo;

        let mut counter = SentenceCounter::default();
        let mut start = to;
        for k in 0..(to - limit) {
            let i = base_end - 1 - k;
            if self.is_quote_stop(&chars, i) || is_blank_line(&chars, i) {
                break;
            }
            if counter.step(chars[i]) >= self.max_sents {
                break;
            }
            start = to - k - 1;
        }
        Window::new(start, to)
    }

    /// A quote mark stops a window unless it sits between two letters
    fn is_quote_stop(&self, chars: &[char], i: usize) -> bool {
        if !self.quote_chars.contains(&chars[i]) {
            return false;
        }
        let before = i.checked_sub(1).and_then(|j| chars.get(j));
        let after = chars.get(i + 1);
        !(before.is_some_and(|c| c.is_alphabetic()) && after.is_some_and(|c| c.is_alphabetic()))
    }
}

/// Counts completed sentences; a run of marks with no text between them ends one sentence
#[derive(Debug, Default)]
struct SentenceCounter {
    sentences: usize,
    has_content: bool,
}

impl SentenceCounter {
    fn step(&mut self, c: char) -> usize {
        if is_sentence_mark(c) {
            if self.has_content {
                self.sentences += 1;
                self.has_content = false;
            }
        } else if !c.is_whitespace() {
            self.has_content = true;
        }
        self.sentences
    }
}

fn is_sentence_mark(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\u{2026}')
}

/// A newline that, ignoring spaces and tabs, touches another newline
fn is_blank_line(chars: &[char], i: usize) -> bool {
    if chars[i] != '\n' {
        return false;
    }
    let next = chars[i + 1..].iter().find(|c| !matches!(**c, ' ' | '\t'));
    let prev = chars[..i].iter().rev().find(|c| !matches!(**c, ' ' | '\t'));
    next == Some(&'\n') || prev == Some(&'\n')
}

/// Symmetric `±radius` window around a span, clamped to the text
pub fn symmetric_window(index: &CharIndex, start: usize, end: usize, radius: usize) -> Window {
    let (start, end) = index.clamp_range(start, end);
    Window::new(start.saturating_sub(radius), index.clamp(end.saturating_add(radius)))
}

/// Region from the quote end through the sentence holding it plus one more sentence
pub fn forward_sentence_region(doc: &ParsedDoc, quote_end: usize, max_chars: usize) -> Option<Window> {
    let sentences = &doc.sentences;
    let first = sentences
        .iter()
        .position(|s| s.start_char < quote_end && quote_end <= s.end_char)
        .or_else(|| sentences.iter().position(|s| s.start_char >= quote_end))?;
    let last = (first + 1).min(sentences.len() - 1);
    let end = sentences[last].end_char.min(quote_end.saturating_add(max_chars));
    (end > quote_end).then(|| Window::new(quote_end, end))
}

/// Region from the start of the sentence before the one holding the quote start
pub fn backward_sentence_region(doc: &ParsedDoc, quote_start: usize, max_chars: usize) -> Option<Window> {
    let sentences = &doc.sentences;
    let holding = sentences
        .iter()
        .position(|s| s.start_char <= quote_start && quote_start < s.end_char)
        .or_else(|| sentences.iter().rposition(|s| s.end_char <= quote_start))?;
    let first = holding.saturating_sub(1);
    let start = sentences[first].start_char.max(quote_start.saturating_sub(max_chars));
    (start < quote_start).then(|| Window::new(start, quote_start))
}
