//! OffsetMap: UTF-16 <-> UTF-8 offset translation
//!
//! Span offsets on the wire are UTF-16 code units (what the browser counts).
//! Rust slices by byte, so every slice of document text goes through here.
//! Offsets that land inside a surrogate pair snap forward to the next char.

/// Offset translator for one text
#[derive(Debug, Clone)]
pub struct OffsetMap<'a> {
    text: &'a str,
    /// Empty when the text is ASCII (offsets are identical)
    utf16_starts: Vec<usize>,
    byte_starts: Vec<usize>,
    utf16_len: usize,
}

impl<'a> OffsetMap<'a> {
    pub fn new(text: &'a str) -> Self {
        if text.is_ascii() {
            return Self {
                text,
                utf16_starts: Vec::new(),
                byte_starts: Vec::new(),
                utf16_len: text.len(),
            };
        }

        let mut utf16_starts = Vec::with_capacity(text.len());
        let mut byte_starts = Vec::with_capacity(text.len());
        let mut pos = 0usize;
        for (byte_idx, ch) in text.char_indices() {
            utf16_starts.push(pos);
            byte_starts.push(byte_idx);
            pos += ch.len_utf16();
        }

        Self {
            text,
            utf16_starts,
            byte_starts,
            utf16_len: pos,
        }
    }

    fn is_ascii(&self) -> bool {
        self.byte_starts.is_empty()
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Length of the text in UTF-16 code units
    pub fn utf16_len(&self) -> usize {
        self.utf16_len
    }

    /// UTF-16 offset -> byte offset (clamped to the text)
    pub fn to_byte(&self, utf16: usize) -> usize {
        if utf16 >= self.utf16_len {
            return self.text.len();
        }
        if self.is_ascii() {
            return utf16;
        }
        match self.utf16_starts.binary_search(&utf16) {
            Ok(i) => self.byte_starts[i],
            Err(i) => self.byte_starts.get(i).copied().unwrap_or(self.text.len()),
        }
    }

    /// Byte offset -> UTF-16 offset (clamped to the text)
    pub fn to_utf16(&self, byte: usize) -> usize {
        if byte >= self.text.len() {
            return self.utf16_len;
        }
        if self.is_ascii() {
            return byte;
        }
        match self.byte_starts.binary_search(&byte) {
            Ok(i) => self.utf16_starts[i],
            Err(i) => self.utf16_starts.get(i).copied().unwrap_or(self.utf16_len),
        }
    }

    /// Slice by UTF-16 range; reversed or out-of-range bounds yield a clamped (possibly empty) slice
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        let s = self.to_byte(start);
        let e = self.to_byte(end).max(s);
        &self.text[s..e]
    }
}

/// Length of a string in UTF-16 code units
pub fn utf16_len(s: &str) -> usize {
    if s.is_ascii() {
        s.len()
    } else {
        s.chars().map(char::len_utf16).sum()
    }
}
