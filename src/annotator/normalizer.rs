// WHY: every later stage addresses text by absolute char offset, so paragraph cleanup
// and the joined chapter text must be produced together, once, deterministically

use anyhow::Result;
use regex_automata::meta::Regex;
use std::collections::BTreeMap;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use super::positions::CharIndex;
use super::{InlineTag, InlineTagKind, LineTag, NormalizeCounts, NormalizeReport, NormalizedChapter, RawChapter};
use crate::config::NormalizerConfig;

/// Compiled line classifiers, tried in the order of `LineTag` precedence
struct LinePatterns {
    section_break: Regex,
    meta: Option<Regex>,
    system_angle: Regex,
    system_square: Regex,
    heading: Regex,
    angle_token: Regex,
    square_token: Regex,
    angle_fix: Regex,
}

impl LinePatterns {
    fn compile(config: &NormalizerConfig) -> Result<Self> {
        let stars = r"(?:\*[ \t]*){3,}";
        let rule = r"(?:~[ \t]*){3,}|(?:#[ \t]*){3,}|(?:=[ \t]*){3,}|(?:-[ \t]*){3,}";
        let section_break = format!(r"^\s*(?:{stars}|{rule})$");

        // one angle token with optional sentence mark, repeated for multi-token lines
        let angle_unit = r"<[^>]+>\s*[.?!]*\s*";
        let square_unit = r"\[[^\]]+\]\s*[.?!]*\s*";
        let system_angle = format!(r"^\s*(?:{angle_unit})+$");
        let system_square = format!(r"^\s*(?:{square_unit})+$");

        let meta = if config.meta_patterns.is_empty() {
            None
        } else {
            let alternatives = config
                .meta_patterns
                .iter()
                .map(|p| format!("(?:{p})"))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&format!("(?i){alternatives}"))?)
        };

        Ok(Self {
            section_break: Regex::new(&section_break)?,
            meta,
            system_angle: Regex::new(&system_angle)?,
            system_square: Regex::new(&system_square)?,
            heading: Regex::new(r"^Chapter\s+\d+(?:[:\s]|$)")?,
            angle_token: Regex::new(r"<[^<>\n]+>")?,
            square_token: Regex::new(r"\[[^\[\]\n]+\]")?,
            angle_fix: Regex::new(r"<([^>]*)>([ \t]*[.?!]+)?")?,
        })
    }
}

/// Paragraph classifier and chapter-text builder
pub struct Normalizer {
    config: NormalizerConfig,
    patterns: LinePatterns,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Result<Self> {
        let patterns = LinePatterns::compile(&config)?;
        Ok(Self { config, patterns })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(NormalizerConfig::default())
    }

    /// Classify one cleaned paragraph
    pub fn classify_line(&self, line: &str) -> LineTag {
        let p = &self.patterns;
        if p.section_break.is_match(line) {
            LineTag::SectionBreak
        } else if p.meta.as_ref().is_some_and(|meta| meta.is_match(line)) {
            LineTag::Meta
        } else if p.system_angle.is_match(line) {
            LineTag::SystemAngle
        } else if p.system_square.is_match(line) {
            LineTag::SystemSquare
        } else if p.heading.is_match(line) {
            LineTag::Heading
        } else {
            LineTag::None
        }
    }

    pub fn is_heading(&self, line: &str) -> bool {
        self.patterns.heading.is_match(line)
    }

    pub fn normalize(&self, chapter: &RawChapter) -> NormalizedChapter {
        let mut counts = NormalizeCounts::default();
        let mut paragraphs = Vec::with_capacity(chapter.paragraphs.len());
        let mut line_tags = Vec::with_capacity(chapter.paragraphs.len());

        for raw in &chapter.paragraphs {
            let cleaned = self.clean_paragraph(raw, &mut counts);
            let tag = self.classify_line(&cleaned);
            let paragraph = if tag == LineTag::SystemAngle && self.config.fix_system_angle_spacing {
                self.fix_angle_spacing(&cleaned, &mut counts)
            } else {
                cleaned
            };
            tally_tag(tag, &mut counts);
            paragraphs.push(paragraph);
            line_tags.push(tag);
        }

        let is_heading = paragraphs.first().is_some_and(|p| self.is_heading(p));
        let display_title = match chapter.title.trim() {
            "" if is_heading => paragraphs[0].trim().to_string(),
            title => title.to_string(),
        };

        let mut report = NormalizeReport {
            is_heading,
            ..NormalizeReport::default()
        };
        if is_heading && self.config.treat_heading_as_removable {
            paragraphs.remove(0);
            line_tags.remove(0);
            report.removed_heading_index = Some(0);
            report.removed_paragraph_indices.push(0);
        }

        let mut inline_tags = BTreeMap::new();
        for (index, (paragraph, tag)) in paragraphs.iter().zip(&line_tags).enumerate() {
            if tag.is_system() {
                continue;
            }
            let tags = self.find_inline_tags(paragraph);
            if !tags.is_empty() {
                counts.inline_tags += tags.len();
                inline_tags.insert(index, tags);
            }
        }

        let separator = normalize_line_endings(&self.config.paragraph_separator);
        let text = paragraphs.join(&separator);
        report.counts = counts;

        debug!(
            title = %display_title,
            paragraphs = paragraphs.len(),
            chars = text.len(),
            angle_fixes = report.counts.system_angle_fixes,
            "Normalized chapter"
        );

        NormalizedChapter {
            paragraphs,
            text,
            separator,
            line_tags,
            inline_tags,
            display_title,
            normalize_report: report,
        }
    }

    fn clean_paragraph(&self, raw: &str, counts: &mut NormalizeCounts) -> String {
        let mut text = normalize_line_endings(raw);

        if self.config.strip_control_chars {
            let before = text.chars().count();
            text.retain(|c| !c.is_control() || c == '\n' || c == '\t');
            counts.control_chars_removed += before - text.chars().count();
        }
        if self.config.unicode_normalize {
            text = text.nfkc().collect();
        }

        let trimmed_len = text.trim_end().len();
        text.truncate(trimmed_len);
        text
    }

    /// Tighten `< inner >` to `<inner>` and keep one trailing sentence mark per token
    pub fn fix_angle_spacing(&self, line: &str, counts: &mut NormalizeCounts) -> String {
        let mut fixed = String::with_capacity(line.len());
        let mut last = 0;

        for caps in self.patterns.angle_fix.captures_iter(line) {
            let Some(whole) = caps.get_match() else { continue };
            let inner = caps.get_group(1).map(|s| &line[s.range()]).unwrap_or("");
            let mark = caps
                .get_group(2)
                .and_then(|s| line[s.range()].trim_start().chars().next());

            let mut replacement = format!("<{}>", inner.trim());
            if let Some(mark) = mark {
                replacement.push(mark);
            }

            let original = &line[whole.range()];
            if replacement != original {
                counts.system_angle_fixes += 1;
            }
            fixed.push_str(&line[last..whole.start()]);
            fixed.push_str(&replacement);
            last = whole.end();
        }

        fixed.push_str(&line[last..]);
        fixed
    }

    /// Inline `<...>` and `[...]` tokens as paragraph-relative char ranges, sorted
    pub fn find_inline_tags(&self, paragraph: &str) -> Vec<InlineTag> {
        let index = CharIndex::new(paragraph);
        let mut tags: Vec<InlineTag> = self
            .patterns
            .angle_token
            .find_iter(paragraph)
            .map(|m| (m, InlineTagKind::Angle))
            .chain(self.patterns.square_token.find_iter(paragraph).map(|m| (m, InlineTagKind::Square)))
            .map(|(m, tag)| InlineTag {
                start: index.char_of(m.start()),
                end: index.char_of(m.end()),
                tag,
            })
            .collect();
        tags.sort_by_key(|t| (t.start, t.end));
        tags
    }
}

fn tally_tag(tag: LineTag, counts: &mut NormalizeCounts) {
    match tag {
        LineTag::Heading => counts.headings += 1,
        LineTag::SystemAngle => counts.system_angle_lines += 1,
        LineTag::SystemSquare => counts.system_square_lines += 1,
        LineTag::SectionBreak => counts.section_breaks += 1,
        LineTag::Meta => counts.meta_lines += 1,
        LineTag::None => {}
    }
}

/// CRLF and lone CR become LF
pub fn normalize_line_endings(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}
