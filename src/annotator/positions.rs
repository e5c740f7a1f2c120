// WHY: spans are addressed in chars while Rust strings slice by bytes; building the
// table once per text keeps every lookup O(1) or O(log n) instead of rescanning

/// Char/byte offset table for one text
#[derive(Debug, Clone)]
pub struct CharIndex<'a> {
    text: &'a str,
    /// Byte offset of every char, plus one trailing entry for `text.len()`
    byte_offsets: Vec<usize>,
}

impl<'a> CharIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut byte_offsets: Vec<usize> = text.char_indices().map(|(byte, _)| byte).collect();
        byte_offsets.push(text.len());
        Self { text, byte_offsets }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Number of chars in the text
    pub fn char_len(&self) -> usize {
        self.byte_offsets.len() - 1
    }

    /// Clamp a char offset into `[0, char_len]`
    pub fn clamp(&self, char_pos: usize) -> usize {
        char_pos.min(self.char_len())
    }

    /// Byte offset of a char offset (clamped)
    pub fn byte_of(&self, char_pos: usize) -> usize {
        self.byte_offsets[self.clamp(char_pos)]
    }

    /// Char offset of a byte offset; a byte inside a multi-byte char maps to that char
    pub fn char_of(&self, byte_pos: usize) -> usize {
        match self.byte_offsets.binary_search(&byte_pos) {
            Ok(index) => index,
            Err(insert_at) => insert_at.saturating_sub(1),
        }
    }

    /// Slice by half-open char range; out-of-range or inverted bounds are clamped
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        let (start, end) = self.clamp_range(start, end);
        &self.text[self.byte_of(start)..self.byte_of(end)]
    }

    /// Clamp a half-open char range so that `0 <= start <= end <= char_len`
    pub fn clamp_range(&self, start: usize, end: usize) -> (usize, usize) {
        let end = self.clamp(end);
        (start.min(end), end)
    }
}
