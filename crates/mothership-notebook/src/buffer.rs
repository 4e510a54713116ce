//! Rendered tab text and the link annotations laid over it.

use std::ops::Range;

use mothership_core::FilterDescriptor;

/// A clickable span of one rendered line, bound to a narrower filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkAnnotation {
    pub line: usize,
    /// Byte offsets into the line.
    pub span: Range<usize>,
    pub target: FilterDescriptor,
}

impl LinkAnnotation {
    #[must_use]
    pub fn contains(&self, line: usize, column: usize) -> bool {
        self.line == line && self.span.contains(&column)
    }

    /// The annotated text, if the span still fits `line_text`.
    #[must_use]
    pub fn text<'a>(&self, line_text: &'a str) -> Option<&'a str> {
        line_text.get(self.span.clone())
    }
}

/// Line-oriented rendered text of one tab.
///
/// Users can never edit it; only the refresh path inside this crate mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    lines: Vec<String>,
}

impl TextBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_editable(&self) -> bool {
        false
    }

    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    #[must_use]
    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Full text, one record per line, each line newline-terminated.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    pub(crate) fn clear(&mut self) {
        self.lines.clear();
    }

    /// Append a line and return its index.
    pub(crate) fn push_line(&mut self, line: String) -> usize {
        self.lines.push(line);
        self.lines.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_is_never_user_editable() {
        let mut buffer = TextBuffer::new();
        assert!(!buffer.is_editable());
        assert_eq!(buffer.push_line("first".to_string()), 0);
        assert_eq!(buffer.push_line("second".to_string()), 1);
        assert!(!buffer.is_editable());
        assert_eq!(buffer.text(), "first\nsecond\n");
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.text(), "");
    }

    #[test]
    fn annotation_hit_test_is_half_open() {
        let annotation = LinkAnnotation {
            line: 2,
            span: 6..8,
            target: FilterDescriptor::Rack { rack: 12 },
        };
        assert!(annotation.contains(2, 6));
        assert!(annotation.contains(2, 7));
        assert!(!annotation.contains(2, 8));
        assert!(!annotation.contains(1, 6));
        assert_eq!(annotation.text("Rack: 12, Chassis: 3"), Some("12"));
    }
}
