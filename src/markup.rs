//! Markup codec: markup text to document nodes and back.
//!
//! Decode is a single linear scan distinguishing three regions — plain
//! text, `<...>` tags, and `&...;` entities. Tags resolve through the
//! [`Stylesheet`]; unknown tags pass through as inert push/pop directives
//! so the format stack still balances. Entities resolve against a fixed
//! builtin table; unknown entities are dropped. Parsing is best-effort:
//! nothing here fails, bad input degrades.
//!
//! Encode walks the document, re-escaping reserved characters in text
//! nodes and re-encoding format nodes back to short tags through the
//! stylesheet's reverse mapping.

use crate::document::{Document, NodeContent};
use crate::event::parse_warning;
use crate::stylesheet::Stylesheet;

/// Named entity table, ordered with the most common escapes first purely
/// for scan speed (lookup is linear, first match wins).
static ENTITIES: &[(&str, &str)] = &[
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&amp;", "&"),
    ("&nbsp;", " "), // allowed to break: mapped to a plain space early
    ("&quot;", "\""),
    ("&copy;", "\u{a9}"),
    ("&reg;", "\u{ae}"),
    ("&Ntilde;", "Ñ"),
    ("&ntilde;", "ñ"),
    ("&Ccedil;", "Ç"),
    ("&ccedil;", "ç"),
    ("&szlig;", "ß"),
    ("&THORN;", "Þ"),
    ("&thorn;", "þ"),
    ("&ETH;", "Ð"),
    ("&eth;", "ð"),
    ("&acute;", "´"),
    ("&cedil;", "¸"),
    ("&deg;", "°"),
    ("&uml;", "¨"),
    ("&cent;", "¢"),
    ("&pound;", "£"),
    ("&curren;", "¤"),
    ("&yen;", "¥"),
    ("&sect;", "§"),
    ("&para;", "¶"),
    ("&laquo;", "«"),
    ("&raquo;", "»"),
    ("&iexcl;", "¡"),
    ("&iquest;", "¿"),
    ("&brvbar;", "¦"),
    ("&ordf;", "ª"),
    ("&ordm;", "º"),
    ("&micro;", "µ"),
    ("&macr;", "¯"),
    ("&oplus;", "⊕"),
    ("&int;", "∫"),
    ("&sum;", "∑"),
    ("&prod;", "∏"),
    ("&perp;", "⊥"),
    ("&or;", "∨"),
    ("&and;", "∧"),
    ("&equiv;", "≡"),
    ("&ne;", "≠"),
    ("&forall;", "∀"),
    ("&exist;", "∃"),
    ("&nabla;", "∇"),
    ("&larr;", "←"),
    ("&rarr;", "→"),
    ("&uarr;", "↑"),
    ("&darr;", "↓"),
    ("&harr;", "↔"),
    ("&lArr;", "⇐"),
    ("&rArr;", "⇒"),
    ("&plusmn;", "±"),
    ("&middot;", "·"),
    ("&times;", "×"),
    ("&divide;", "÷"),
    ("&sup1;", "¹"),
    ("&sup2;", "²"),
    ("&sup3;", "³"),
    ("&frac14;", "¼"),
    ("&frac12;", "½"),
    ("&frac34;", "¾"),
    ("&not;", "¬"),
    ("&Aacute;", "Á"),
    ("&Eacute;", "É"),
    ("&Iacute;", "Í"),
    ("&Oacute;", "Ó"),
    ("&Uacute;", "Ú"),
    ("&Yacute;", "Ý"),
    ("&aacute;", "á"),
    ("&eacute;", "é"),
    ("&iacute;", "í"),
    ("&oacute;", "ó"),
    ("&uacute;", "ú"),
    ("&yacute;", "ý"),
    ("&Acirc;", "Â"),
    ("&Ecirc;", "Ê"),
    ("&Icirc;", "Î"),
    ("&Ocirc;", "Ô"),
    ("&Ucirc;", "Û"),
    ("&acirc;", "â"),
    ("&ecirc;", "ê"),
    ("&icirc;", "î"),
    ("&ocirc;", "ô"),
    ("&ucirc;", "û"),
    ("&Agrave;", "À"),
    ("&Egrave;", "È"),
    ("&Igrave;", "Ì"),
    ("&Ograve;", "Ò"),
    ("&Ugrave;", "Ù"),
    ("&agrave;", "à"),
    ("&egrave;", "è"),
    ("&igrave;", "ì"),
    ("&ograve;", "ò"),
    ("&ugrave;", "ù"),
    ("&Auml;", "Ä"),
    ("&Euml;", "Ë"),
    ("&Iuml;", "Ï"),
    ("&Ouml;", "Ö"),
    ("&auml;", "ä"),
    ("&euml;", "ë"),
    ("&iuml;", "ï"),
    ("&ouml;", "ö"),
    ("&uuml;", "ü"),
    ("&yuml;", "ÿ"),
    ("&Atilde;", "Ã"),
    ("&atilde;", "ã"),
    ("&Otilde;", "Õ"),
    ("&otilde;", "õ"),
    ("&aring;", "å"),
    ("&Aring;", "Å"),
    ("&Oslash;", "Ø"),
    ("&oslash;", "ø"),
    ("&AElig;", "Æ"),
    ("&aelig;", "æ"),
    ("&alpha;", "α"),
    ("&beta;", "β"),
    ("&gamma;", "γ"),
    ("&delta;", "δ"),
    ("&epsilon;", "ε"),
    ("&zeta;", "ζ"),
    ("&eta;", "η"),
    ("&theta;", "θ"),
    ("&iota;", "ι"),
    ("&kappa;", "κ"),
    ("&mu;", "μ"),
    ("&nu;", "ν"),
    ("&omicron;", "ο"),
    ("&xi;", "ξ"),
    ("&pi;", "π"),
    ("&rho;", "ρ"),
    ("&sigma;", "σ"),
    ("&tau;", "τ"),
    ("&upsilon;", "υ"),
    ("&phi;", "φ"),
    ("&chi;", "χ"),
    ("&psi;", "ψ"),
    ("&omega;", "ω"),
];

fn entity_to_text(entity: &str) -> Option<&'static str> {
    ENTITIES
        .iter()
        .find(|(name, _)| *name == entity)
        .map(|(_, text)| *text)
}

/// Reverse mapping for encode: only non-ASCII literals map back, so plain
/// spaces and quotes in document text stay literal.
fn text_to_entity(ch: char) -> Option<&'static str> {
    if ch.is_ascii() {
        return None;
    }
    let mut buf = [0u8; 4];
    let s: &str = ch.encode_utf8(&mut buf);
    ENTITIES
        .iter()
        .find(|(_, text)| *text == s)
        .map(|(name, _)| *name)
}

/// Translate one tag's inner text into the directive stored on a format
/// node.
fn tag_to_directive(sheet: Option<&Stylesheet>, inner: &str) -> Option<String> {
    if inner.is_empty() {
        parse_warning("markup: empty tag dropped");
        return None;
    }
    if let Some(replacement) = sheet.and_then(|s| s.match_tag(inner)) {
        let directive = match replacement.split_whitespace().next() {
            Some("push") => format!("+ {replacement}"),
            Some("pop") => format!("- {replacement}"),
            // Own formats (e.g. a newline) carry no push/pop marker.
            _ => replacement.to_string(),
        };
        return Some(directive);
    }
    if let Some(base) = inner.strip_prefix('/') {
        if base.is_empty() {
            parse_warning("markup: empty closer dropped");
            return None;
        }
        // A closer of a known tag pops; an unknown closer passes through
        // as an inert pop.
        if sheet.and_then(|s| s.match_tag(base)).is_some() {
            Some("- pop".to_string())
        } else {
            Some(format!("- {base}"))
        }
    } else {
        Some(format!("+ {inner}"))
    }
}

/// Decode markup into the document, appending at its primary cursor.
pub(crate) fn decode_into(doc: &mut Document, sheet: Option<&Stylesheet>, markup: &str) {
    let cursor = doc.primary_cursor();
    let bytes = markup.as_bytes();
    let mut i = 0;
    let mut plain_start = 0;

    let flush_plain = |doc: &mut Document, start: usize, end: usize| {
        if start < end {
            doc.append_text(cursor, &markup[start..end]);
        }
    };

    while i < bytes.len() {
        match bytes[i] {
            b'<' => {
                flush_plain(doc, plain_start, i);
                match markup[i + 1..].find('>') {
                    Some(rel) => {
                        let inner = &markup[i + 1..i + 1 + rel];
                        if let Some(directive) = tag_to_directive(sheet, inner) {
                            doc.append_format(cursor, &directive);
                        }
                        i += rel + 2;
                    }
                    None => {
                        parse_warning("markup: unterminated tag dropped");
                        i = bytes.len();
                    }
                }
                plain_start = i;
            }
            b'&' => {
                flush_plain(doc, plain_start, i);
                match markup[i + 1..].find(';') {
                    Some(rel) => {
                        let entity = &markup[i..i + rel + 2];
                        match entity_to_text(entity) {
                            Some(text) => doc.append_text(cursor, text),
                            None => parse_warning(&format!("markup: unknown entity '{entity}'")),
                        }
                        i += rel + 2;
                    }
                    None => {
                        parse_warning("markup: unterminated entity dropped");
                        i = bytes.len();
                    }
                }
                plain_start = i;
            }
            _ => {
                let ch_len = markup[i..].chars().next().map_or(1, char::len_utf8);
                i += ch_len;
            }
        }
    }
    flush_plain(doc, plain_start, bytes.len());
}

fn escape_text_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => match text_to_entity(ch) {
                Some(entity) => out.push_str(entity),
                None => out.push(ch),
            },
        }
    }
}

/// Re-encode the document as markup text.
pub(crate) fn encode(doc: &Document, sheet: Option<&Stylesheet>) -> String {
    let mut out = String::new();
    // Names of opened unmatched tags, so bare `- pop` directives can be
    // re-encoded as the matching closer. `true` marks sheet-resolved
    // openers; only those produce `- pop` on decode, so only those may be
    // consumed by one.
    let mut open_tags: Vec<(String, bool)> = Vec::new();
    let pop_known = |open_tags: &mut Vec<(String, bool)>| -> Option<String> {
        let pos = open_tags.iter().rposition(|(_, known)| *known)?;
        Some(open_tags.remove(pos).0)
    };

    for (_, node) in doc.nodes() {
        match node {
            NodeContent::Text(text) => escape_text_into(&mut out, text),
            NodeContent::Format(directive) => {
                let (marker, body) = if let Some(rest) = directive.strip_prefix("+ ") {
                    (Some('+'), rest)
                } else if let Some(rest) = directive.strip_prefix("- ") {
                    (Some('-'), rest)
                } else {
                    (None, directive.as_str())
                };

                if let Some(tag) = sheet.and_then(|s| s.match_replacement(body)) {
                    // Closer entries carry their own slash ("/p").
                    out.push('<');
                    out.push_str(tag);
                    out.push('>');
                    match marker {
                        Some('+') => open_tags.push((tag.to_string(), true)),
                        Some('-') => {
                            pop_known(&mut open_tags);
                        }
                        _ => {}
                    }
                    continue;
                }

                match marker {
                    Some('+') => {
                        out.push('<');
                        out.push_str(body);
                        out.push('>');
                        let name = body.split_whitespace().next().unwrap_or(body);
                        open_tags.push((name.to_string(), false));
                    }
                    Some('-') => {
                        let name = if body == "pop" {
                            pop_known(&mut open_tags).unwrap_or_default()
                        } else {
                            if let Some(pos) =
                                open_tags.iter().rposition(|(name, _)| name == body)
                            {
                                open_tags.remove(pos);
                            }
                            body.to_string()
                        };
                        out.push_str("</");
                        out.push_str(&name);
                        out.push('>');
                    }
                    _ => {
                        out.push('<');
                        out.push_str(body);
                        out.push('>');
                    }
                }
            }
        }
    }
    out
}
