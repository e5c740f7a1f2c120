// WHY: turns a normalized chapter into sorted, non-overlapping typed spans; whole-line
// tags are emitted first, then inline system tokens and quotes are cut out of narration

use tracing::debug;
#[cfg(feature = "debug-states")]
use tracing::trace;

use super::positions::CharIndex;
use super::{InlineTagKind, LineTag, NormalizedChapter, Span, SpanSubtype, SpanType};
use crate::config::SegmenterConfig;

pub const NOTE_QUOTE_MISMATCH: &str = "quote_mismatch";

/// Quote scanner state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    Narrative,
    DoubleQuote,
    SingleQuote,
}

/// A span before its text is sliced out, absolute char offsets
#[derive(Debug, Clone, PartialEq)]
struct Piece {
    start: usize,
    end: usize,
    span_type: SpanType,
    subtype: Option<SpanSubtype>,
    notes: Vec<String>,
}

impl Piece {
    fn new(start: usize, end: usize, span_type: SpanType) -> Self {
        Self {
            start,
            end,
            span_type,
            subtype: None,
            notes: Vec::new(),
        }
    }

    fn with_subtype(mut self, subtype: SpanSubtype) -> Self {
        self.subtype = Some(subtype);
        self
    }

    fn intersects(&self, other: &Piece) -> bool {
        other.start < self.end && other.end > self.start
    }
}

pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    pub fn segment(&self, chapter: &NormalizedChapter) -> Vec<Span> {
        let starts = chapter.paragraph_starts();
        let mut pieces_by_para: Vec<(usize, Piece)> = Vec::new();

        for (para_index, paragraph) in chapter.paragraphs.iter().enumerate() {
            let chars: Vec<char> = paragraph.chars().collect();
            if chars.is_empty() {
                continue;
            }
            let p0 = starts[para_index];
            let p1 = p0 + chars.len();
            let tag = chapter.line_tags.get(para_index).copied().unwrap_or(LineTag::None);

            if let Some(line_piece) = self.line_piece(tag, p0, p1) {
                pieces_by_para.push((para_index, line_piece));
                continue;
            }

            let mut pieces = vec![Piece::new(p0, p1, SpanType::Narration)];

            if self.config.emit_inline_system {
                if let Some(tags) = chapter.inline_tags.get(&para_index) {
                    for tag in tags {
                        let subtype = match tag.tag {
                            InlineTagKind::Angle => SpanSubtype::InlineAngle,
                            InlineTagKind::Square => SpanSubtype::InlineSquare,
                        };
                        let overlay = Piece::new(p0 + tag.start, p0 + tag.end, SpanType::System).with_subtype(subtype);
                        pieces = overlay_cut(pieces, &overlay);
                    }
                }
            }

            for quote in self.scan_quotes(&chars) {
                let mut overlay = Piece::new(p0 + quote.start, p0 + quote.end, quote.span_type);
                if quote.mismatch {
                    overlay.notes.push(NOTE_QUOTE_MISMATCH.to_string());
                }
                pieces = overlay_cut(pieces, &overlay);
            }

            pieces_by_para.extend(pieces.into_iter().map(|p| (para_index, p)));
        }

        pieces_by_para.sort_by_key(|(_, p)| (p.start, p.end));
        if self.config.merge_adjacent {
            pieces_by_para = merge_adjacent(pieces_by_para);
        }

        let index = CharIndex::new(&chapter.text);
        let spans: Vec<Span> = pieces_by_para
            .into_iter()
            .map(|(para_index, p)| Span {
                start: p.start,
                end: p.end,
                span_type: p.span_type,
                text: index.slice(p.start, p.end).to_string(),
                para_index,
                subtype: p.subtype,
                notes: p.notes,
            })
            .collect();

        debug!(
            title = %chapter.display_title,
            spans = spans.len(),
            quotes = spans.iter().filter(|s| s.span_type.is_quote()).count(),
            "Segmented chapter"
        );
        spans
    }

    /// Whole-paragraph span for a tagged line, or None when the paragraph needs phase 2
    fn line_piece(&self, tag: LineTag, start: usize, end: usize) -> Option<Piece> {
        let cfg = &self.config;
        let piece = match tag {
            LineTag::Heading if cfg.emit_headings => Piece::new(start, end, SpanType::Heading),
            LineTag::Meta if cfg.emit_meta => Piece::new(start, end, SpanType::Meta),
            LineTag::SectionBreak if cfg.emit_section_breaks => Piece::new(start, end, SpanType::SectionBreak),
            LineTag::SystemAngle if cfg.emit_system_lines => {
                Piece::new(start, end, SpanType::System).with_subtype(SpanSubtype::LineAngle)
            }
            LineTag::SystemSquare if cfg.emit_system_lines => {
                Piece::new(start, end, SpanType::System).with_subtype(SpanSubtype::LineSquare)
            }
            _ => return None,
        };
        Some(piece)
    }

    /// Quote runs of one paragraph, paragraph-relative char offsets
    fn scan_quotes(&self, chars: &[char]) -> Vec<QuoteRun> {
        let cfg = &self.config;
        let mut runs = Vec::new();
        let mut state = QuoteState::Narrative;
        let mut open_at = 0;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match state {
                QuoteState::Narrative => {
                    if cfg.double_quote_openers.contains(&c) {
                        state = QuoteState::DoubleQuote;
                        open_at = i;
                    } else if cfg.single_quote_openers.contains(&c) && !is_apostrophe(chars, i) {
                        state = QuoteState::SingleQuote;
                        open_at = i;
                    }
                }
                QuoteState::DoubleQuote => {
                    if cfg.double_quote_closers.contains(&c) {
                        runs.push(QuoteRun::closed(open_at, i + 1, SpanType::Dialogue));
                        state = QuoteState::Narrative;
                    }
                }
                QuoteState::SingleQuote => {
                    if cfg.single_quote_closers.contains(&c) && !is_apostrophe(chars, i) {
                        runs.push(QuoteRun::closed(open_at, i + 1, self.single_quote_type()));
                        state = QuoteState::Narrative;
                    }
                }
            }

            #[cfg(feature = "debug-states")]
            trace!(position = i, character = %c, state = ?state, "Quote scanner step");

            i += 1;
        }

        let unclosed = match state {
            QuoteState::Narrative => None,
            QuoteState::DoubleQuote => Some(SpanType::Dialogue),
            QuoteState::SingleQuote => Some(self.single_quote_type()),
        };
        if let Some(span_type) = unclosed {
            runs.push(QuoteRun {
                start: open_at,
                end: chars.len(),
                span_type,
                mismatch: true,
            });
        }
        runs
    }

    fn single_quote_type(&self) -> SpanType {
        if self.config.treat_single_quotes_as_thought {
            SpanType::Thought
        } else {
            SpanType::Dialogue
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct QuoteRun {
    start: usize,
    end: usize,
    span_type: SpanType,
    mismatch: bool,
}

impl QuoteRun {
    fn closed(start: usize, end: usize, span_type: SpanType) -> Self {
        Self {
            start,
            end,
            span_type,
            mismatch: false,
        }
    }
}

/// A quote mark between two letters ("don't") is an apostrophe
fn is_apostrophe(chars: &[char], i: usize) -> bool {
    let before = i.checked_sub(1).and_then(|j| chars.get(j));
    let after = chars.get(i + 1);
    before.is_some_and(|c| c.is_alphabetic()) && after.is_some_and(|c| c.is_alphabetic())
}

/// Cut `overlay` out of every narration piece it intersects; other pieces pass through
fn overlay_cut(pieces: Vec<Piece>, overlay: &Piece) -> Vec<Piece> {
    let mut out = Vec::with_capacity(pieces.len() + 2);
    for piece in pieces {
        if piece.span_type != SpanType::Narration || !piece.intersects(overlay) {
            out.push(piece);
            continue;
        }

        let cut_start = overlay.start.max(piece.start);
        let cut_end = overlay.end.min(piece.end);
        if piece.start < cut_start {
            out.push(Piece::new(piece.start, cut_start, SpanType::Narration));
        }
        out.push(Piece {
            start: cut_start,
            end: cut_end,
            ..overlay.clone()
        });
        if cut_end < piece.end {
            out.push(Piece::new(cut_end, piece.end, SpanType::Narration));
        }
    }
    out.retain(|p| p.start < p.end);
    out.sort_by_key(|p| (p.start, p.end));
    out
}

fn merge_adjacent(pieces: Vec<(usize, Piece)>) -> Vec<(usize, Piece)> {
    let mut merged: Vec<(usize, Piece)> = Vec::with_capacity(pieces.len());
    for (para_index, piece) in pieces {
        if let Some((_, last)) = merged.last_mut() {
            if last.span_type == piece.span_type && last.subtype == piece.subtype && last.end == piece.start {
                last.end = piece.end;
                for note in piece.notes {
                    if !last.notes.contains(&note) {
                        last.notes.push(note);
                    }
                }
                continue;
            }
        }
        merged.push((para_index, piece));
    }
    merged
}
