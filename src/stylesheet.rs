//! Style registry: short tag to internal format string dictionary.
//!
//! A [`Stylesheet`] is parsed from a description of the form
//! `KEY='VALUE'[KEY='VALUE']...`. The reserved key `DEFAULT` carries the
//! base format applied before any tag is active; every other pair maps a
//! markup tag to its internal format string.
//!
//! # Examples
//!
//! ```
//! use textblock::Stylesheet;
//!
//! let mut sheet = Stylesheet::new();
//! sheet.set(
//!     "DEFAULT='push font=Vera font_size=10 color=#000000' \
//!      b='push style=bold' \
//!      br='\\n'",
//! );
//! assert_eq!(sheet.match_tag("b"), Some("push style=bold"));
//! assert_eq!(sheet.match_replacement("push style=bold"), Some("b"));
//! ```
//!
//! Sheets are shared across documents as `Rc<Stylesheet>`; the last
//! document dropping its reference frees the sheet.

use crate::event::parse_warning;

/// Tag/format dictionary plus the default format.
#[derive(Clone, Debug, Default)]
pub struct Stylesheet {
    style_text: String,
    default_format: Option<String>,
    tags: Vec<(String, String)>,
}

impl Stylesheet {
    /// Create an empty stylesheet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stylesheet directly from a description.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let mut sheet = Self::new();
        sheet.set(text);
        sheet
    }

    /// Replace the sheet's contents by parsing `text`.
    ///
    /// Keys run from the first non-space character to `=` or whitespace;
    /// values are single-quoted and may contain `\'` escapes. A malformed
    /// trailing fragment (unterminated key or value) is dropped.
    pub fn set(&mut self, text: &str) {
        self.style_text = text.to_string();
        self.default_format = None;
        self.tags.clear();

        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            // Key start: first non-space.
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= bytes.len() {
                break;
            }
            let key_start = i;
            while i < bytes.len() && bytes[i] != b'=' && !bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= bytes.len() || bytes[i] != b'=' {
                // A bare word drops; later entries still parse.
                parse_warning("stylesheet: key without value dropped");
                continue;
            }
            let key = &text[key_start..i];
            i += 1; // consume '='
            if i >= bytes.len() || bytes[i] != b'\'' {
                parse_warning("stylesheet: value missing opening quote, entry dropped");
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                continue;
            }
            i += 1; // consume opening quote
            let mut value = String::new();
            let mut terminated = false;
            while i < bytes.len() {
                match bytes[i] {
                    b'\\' if i + 1 < bytes.len() && (bytes[i + 1] == b'\'' || bytes[i + 1] == b'\\') => {
                        value.push(bytes[i + 1] as char);
                        i += 2;
                    }
                    b'\'' => {
                        terminated = true;
                        i += 1;
                        break;
                    }
                    _ => {
                        // Step a full UTF-8 sequence at once.
                        let ch_len = text[i..].chars().next().map_or(1, char::len_utf8);
                        value.push_str(&text[i..i + ch_len]);
                        i += ch_len;
                    }
                }
            }
            if !terminated {
                parse_warning("stylesheet: unterminated value dropped");
                break;
            }
            if key == "DEFAULT" {
                self.default_format = Some(value);
            } else {
                self.tags.push((key.to_string(), value));
            }
        }
    }

    /// The raw description text this sheet was parsed from.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.style_text
    }

    /// The base format string (the `DEFAULT` entry), if any.
    #[must_use]
    pub fn default_format(&self) -> Option<&str> {
        self.default_format.as_deref()
    }

    /// Look up the internal format string for a markup tag.
    ///
    /// First exact match wins; the tag list preserves description order.
    #[must_use]
    pub fn match_tag(&self, tag: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, r)| r.as_str())
    }

    /// Look up the markup tag for an internal format string (the encode
    /// direction).
    #[must_use]
    pub fn match_replacement(&self, replacement: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(_, r)| r == replacement)
            .map(|(t, _)| t.as_str())
    }

    /// Number of tag mappings (excluding `DEFAULT`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// True when the sheet carries no tags and no default.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.default_format.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_and_tags() {
        let sheet = Stylesheet::from_text(
            "DEFAULT='push font=Vera font_size=10' b='push style=bold' br='\\n'",
        );
        assert_eq!(sheet.default_format(), Some("push font=Vera font_size=10"));
        assert_eq!(sheet.match_tag("b"), Some("push style=bold"));
        assert_eq!(sheet.match_tag("br"), Some("\\n"));
        assert_eq!(sheet.match_tag("nope"), None);
        assert_eq!(sheet.len(), 2);
    }

    #[test]
    fn test_escaped_quote_in_value() {
        let sheet = Stylesheet::from_text(r"q='push quote=\' color=#fff'");
        assert_eq!(sheet.match_tag("q"), Some("push quote=' color=#fff"));
    }

    #[test]
    fn test_malformed_tail_dropped() {
        let sheet = Stylesheet::from_text("a='push x=1' broken='never closed");
        assert_eq!(sheet.match_tag("a"), Some("push x=1"));
        assert_eq!(sheet.match_tag("broken"), None);
        assert_eq!(sheet.len(), 1);
    }

    #[test]
    fn test_key_without_value_dropped() {
        let sheet = Stylesheet::from_text("dangling");
        assert!(sheet.is_empty());
    }

    #[test]
    fn test_parse_recovers_after_bare_word() {
        let sheet = Stylesheet::from_text("bogus a='push x=1'");
        assert_eq!(sheet.match_tag("a"), Some("push x=1"));
        assert_eq!(sheet.len(), 1);
    }

    #[test]
    fn test_match_replacement_reverse_lookup() {
        let sheet = Stylesheet::from_text("h1='push font_size=20' h2='push font_size=16'");
        assert_eq!(sheet.match_replacement("push font_size=16"), Some("h2"));
        assert_eq!(sheet.match_replacement("push font_size=99"), None);
    }

    #[test]
    fn test_set_clears_previous_state() {
        let mut sheet = Stylesheet::from_text("a='push x=1'");
        sheet.set("b='push y=2'");
        assert_eq!(sheet.match_tag("a"), None);
        assert_eq!(sheet.match_tag("b"), Some("push y=2"));
    }

    #[test]
    fn test_closer_override_entry() {
        // Closers can be overridden in the sheet, as in "/p='pop \n\n'".
        let sheet = Stylesheet::from_text("p='push align=left' /p='pop \\n \\n'");
        assert_eq!(sheet.match_tag("/p"), Some("pop \\n \\n"));
    }
}
