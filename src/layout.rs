//! Line-breaking layout engine.
//!
//! A layout pass walks the document once, carrying the pen position, the
//! format stack, and the open line accumulator. Text nodes are sliced into
//! positioned [`Item`]s against the active format's font metrics; format
//! nodes mutate the stack or emit [`FormatItem`] markers (newlines, tabs,
//! inline placeholders). Lines are regenerated wholesale by every pass and
//! never mutated incrementally.
//!
//! Decoration styles need pixel insets around the text (outline, glow,
//! shadow). The pass runs with an assumed inset, records the largest inset
//! actually used, and re-runs exactly once when they differ — inset needs
//! are static per style, so the second pass always converges.

use std::rc::Rc;

use unicode_segmentation::UnicodeSegmentation;

use crate::document::{Document, NodeContent, NodeHandle};
use crate::error::{Error, Result};
use crate::font::{FontFace, FontProvider};
use crate::format::{
    Decorations, Directive, Ellipsis, Format, FormatStack, FormatToken, ItemArgs, ItemSizing,
    ItemVSize, StackOp, WrapMode,
};
use crate::stylesheet::Stylesheet;

/// Pixel insets reserved around the layout for decoration styles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Insets {
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub bottom: i32,
}

impl Insets {
    fn merge(&mut self, pad: (i32, i32, i32, i32)) {
        self.left = self.left.max(pad.0);
        self.right = self.right.max(pad.1);
        self.top = self.top.max(pad.2);
        self.bottom = self.bottom.max(pad.3);
    }
}

/// A positioned text run.
#[derive(Clone, Debug)]
pub struct Item {
    /// Rendered text; trailing whitespace at a wrap cut is stripped.
    pub text: String,
    /// Format snapshot the run was measured with.
    pub format: Rc<Format>,
    /// Source node.
    pub node: NodeHandle,
    /// Byte offset of the covered slice within the source node.
    pub byte_offset: usize,
    /// Byte length covered in the source node, including whitespace
    /// stripped from the rendered text.
    pub source_len: usize,
    pub x: i32,
    pub w: i32,
    pub h: i32,
    /// Horizontal inset required by the run's decoration style.
    pub inset: i32,
    /// Pixels above the run's own baseline.
    pub baseline: i32,
}

/// Kind of a non-text line marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormatItemKind {
    Newline,
    Tab,
    Placeholder {
        vsize: ItemVSize,
        href: Option<String>,
    },
}

/// A positioned non-text marker.
#[derive(Clone, Debug)]
pub struct FormatItem {
    pub kind: FormatItemKind,
    /// Source format node.
    pub node: NodeHandle,
    pub x: i32,
    pub w: i32,
    pub h: i32,
    /// Pixels of the marker's height sitting above the baseline.
    pub baseline: i32,
}

/// One output row of layout.
#[derive(Clone, Debug, Default)]
pub struct Line {
    pub items: Vec<Item>,
    pub format_items: Vec<FormatItem>,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    /// Pixels from the line top to the common baseline.
    pub baseline: i32,
    pub line_no: usize,
}

/// Result of a layout pass.
#[derive(Clone, Debug, Default)]
pub struct Layout {
    pub lines: Vec<Line>,
    /// Content extent including insets.
    pub w: i32,
    pub h: i32,
    pub insets: Insets,
}

/// Lay the document out at an optional width/height constraint.
///
/// `width: None` is the unconstrained (native) measurement: no wrapping,
/// no ellipsis, left alignment.
pub(crate) fn layout(
    doc: &Document,
    sheet: Option<&Stylesheet>,
    provider: &dyn FontProvider,
    width: Option<i32>,
    height: Option<i32>,
) -> Result<Layout> {
    let assumed = Insets::default();
    let result = run_pass(doc, sheet, provider, width, height, assumed)?;
    if result.insets != assumed {
        let discovered = result.insets;
        return run_pass(doc, sheet, provider, width, height, discovered);
    }
    Ok(result)
}

fn run_pass(
    doc: &Document,
    sheet: Option<&Stylesheet>,
    provider: &dyn FontProvider,
    width: Option<i32>,
    height: Option<i32>,
    insets: Insets,
) -> Result<Layout> {
    let mut base = Format::default();
    if let Some(default) = sheet.and_then(Stylesheet::default_format) {
        let directive = Directive::parse(default);
        base.apply_tokens(&directive.tokens);
    }
    if !base.font.name.is_empty() {
        base.sync_face(provider)?;
    }

    let mut pass = Pass {
        provider,
        width,
        height,
        insets,
        discovered: Insets::default(),
        stack: FormatStack::new(base),
        lines: Vec::new(),
        line: LineAccum::default(),
        x: 0,
        y: 0,
        ellipsized: false,
        lookback_done: false,
        trailing_line: false,
    };
    pass.open_line();

    for (handle, node) in doc.nodes() {
        match node {
            NodeContent::Format(directive) => pass.process_format(handle, directive)?,
            NodeContent::Text(text) => pass.process_text(handle, text)?,
        }
    }
    // Flush the open line. An explicit trailing newline leaves a real
    // empty line behind; a wrap-forced advance does not.
    if !doc.is_empty() && (!pass.line.is_empty() || pass.lines.is_empty() || pass.trailing_line) {
        pass.finish_line();
    }

    let content_right = pass
        .lines
        .iter()
        .map(|line| line.x + line.w)
        .max()
        .unwrap_or(0);
    let content_bottom = if pass.lines.is_empty() {
        0
    } else {
        pass.y + pass.insets.top + pass.insets.bottom
    };
    Ok(Layout {
        w: if pass.lines.is_empty() {
            0
        } else {
            content_right + pass.insets.right
        },
        h: content_bottom,
        lines: pass.lines,
        insets: pass.discovered,
    })
}

#[derive(Default)]
struct LineAccum {
    /// Pen position the line opened at.
    origin: i32,
    items: Vec<Item>,
    format_items: Vec<FormatItem>,
}

impl LineAccum {
    fn is_empty(&self) -> bool {
        self.items.is_empty() && self.format_items.is_empty()
    }
}

struct Pass<'a> {
    provider: &'a dyn FontProvider,
    width: Option<i32>,
    height: Option<i32>,
    insets: Insets,
    discovered: Insets,
    stack: FormatStack,
    lines: Vec<Line>,
    line: LineAccum,
    x: i32,
    y: i32,
    /// A left/right ellipsis consumed the rest of this line.
    ellipsized: bool,
    /// The current line already went through a look-back redo.
    lookback_done: bool,
    /// The open (empty) line was created by an explicit newline and must
    /// survive even if nothing lands on it.
    trailing_line: bool,
}

impl Pass<'_> {
    fn line_origin(&self) -> i32 {
        self.insets.left + self.stack.top().margin_left
    }

    /// Rightmost usable pen position, when the width is constrained.
    fn right_edge(&self) -> Option<i32> {
        self.width
            .map(|w| w - self.insets.right - self.stack.top().margin_right)
    }

    fn open_line(&mut self) {
        self.x = self.line_origin();
        self.line = LineAccum {
            origin: self.x,
            ..LineAccum::default()
        };
        self.ellipsized = false;
        self.lookback_done = false;
        self.trailing_line = false;
    }

    fn sync_top_face(&mut self) -> Result<()> {
        if self.stack.top().font.name.is_empty() {
            return Ok(());
        }
        self.stack.top_mut().sync_face(self.provider)
    }

    fn process_format(&mut self, handle: NodeHandle, directive: &str) -> Result<()> {
        let parsed = Directive::parse(directive);
        match parsed.op {
            StackOp::Push => {
                self.stack.push();
                self.stack.top_mut().apply_tokens(&parsed.tokens);
                self.sync_top_face()?;
            }
            StackOp::Pop => {
                // The stack base can never be popped.
                self.stack.pop();
            }
            StackOp::None => {
                let has_commands = parsed
                    .tokens
                    .iter()
                    .any(|t| matches!(t, FormatToken::Command { .. }));
                if parsed.item.is_none() && has_commands {
                    self.stack.top_mut().apply_tokens(&parsed.tokens);
                    self.sync_top_face()?;
                }
            }
        }

        // A margin change before any content re-homes the open line.
        if self.line.is_empty() {
            self.x = self.line_origin();
            self.line.origin = self.x;
        }

        if let Some(args) = &parsed.item {
            self.place_item_marker(handle, args);
        } else {
            for token in &parsed.tokens {
                match token {
                    FormatToken::Newline => self.newline_marker(handle),
                    FormatToken::Tab => self.tab_marker(handle),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn face_metrics(&self) -> (i32, i32) {
        self.stack
            .top()
            .face
            .as_ref()
            .map_or((0, 0), |face| (face.ascent(), face.descent()))
    }

    fn newline_marker(&mut self, handle: NodeHandle) {
        let (ascent, descent) = self.face_metrics();
        self.line.format_items.push(FormatItem {
            kind: FormatItemKind::Newline,
            node: handle,
            x: self.x,
            w: 0,
            h: ascent + descent,
            baseline: ascent,
        });
        self.finish_line();
        self.trailing_line = true;
    }

    fn tab_marker(&mut self, handle: NodeHandle) {
        let tabstops = self.stack.top().tabstops.max(1);
        let wrap = self.stack.top().wrap;
        let origin = self.line_origin();
        let mut target = origin + (((self.x - origin) / tabstops) + 1) * tabstops;
        if let Some(edge) = self.right_edge() {
            if target > edge {
                if wrap == WrapMode::None {
                    target = edge.max(self.x);
                } else {
                    self.finish_line();
                    target = self.line_origin() + tabstops;
                }
            }
        }
        let (ascent, descent) = self.face_metrics();
        self.line.format_items.push(FormatItem {
            kind: FormatItemKind::Tab,
            node: handle,
            x: self.x,
            w: target - self.x,
            h: ascent + descent,
            baseline: ascent,
        });
        self.x = target;
    }

    fn place_item_marker(&mut self, handle: NodeHandle, args: &ItemArgs) {
        let (face_ascent, face_descent) = self.face_metrics();
        let line_h = face_ascent + face_descent;

        let (w, h) = match args.sizing {
            ItemSizing::Scaled | ItemSizing::Absolute => (args.w, args.h),
            ItemSizing::Relative => {
                if args.h > 0 && line_h > 0 {
                    (args.w * line_h / args.h, line_h)
                } else {
                    (args.w, args.h)
                }
            }
        };

        if let Some(edge) = self.right_edge() {
            let wraps = self.stack.top().wrap != WrapMode::None;
            if wraps && self.x + w > edge && !self.line.is_empty() {
                self.finish_line();
            }
        }

        let baseline = match args.vsize {
            ItemVSize::Ascent => h,
            ItemVSize::Full => {
                if line_h > 0 {
                    h * face_ascent / line_h
                } else {
                    h
                }
            }
        };
        self.line.format_items.push(FormatItem {
            kind: FormatItemKind::Placeholder {
                vsize: args.vsize,
                href: args.href.clone(),
            },
            node: handle,
            x: self.x,
            w,
            h,
            baseline,
        });
        self.x += w;
    }

    fn process_text(&mut self, handle: NodeHandle, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let fmt = Rc::clone(self.stack.top());
        let Some(face) = fmt.face.clone() else {
            return Err(Error::NoFace);
        };
        self.discovered.merge(fmt.style.pad());

        let mut offset = 0usize;
        while offset < text.len() {
            if self.ellipsized {
                // A previous ellipsis owns the rest of this line.
                return Ok(());
            }
            let pending = &text[offset..];
            let advance = face.advance(pending);

            let Some(edge) = self.right_edge() else {
                self.emit_item(handle, offset, pending, pending.len(), &fmt, &face);
                break;
            };

            if self.x + advance <= edge {
                self.emit_item(handle, offset, pending, pending.len(), &fmt, &face);
                break;
            }

            match (fmt.wrap, fmt.ellipsis) {
                (WrapMode::None, Ellipsis::None) => {
                    // Overflows; the renderer clips.
                    self.emit_item(handle, offset, pending, pending.len(), &fmt, &face);
                    break;
                }
                (WrapMode::None, ellipsis) => {
                    self.emit_ellipsized(handle, offset, pending, ellipsis, &fmt, &face, edge);
                    break;
                }
                (WrapMode::Char, _) => {
                    let avail = (edge - self.x).max(0);
                    let fit = face.fit_width(pending, avail).max(1);
                    let render_cut = byte_of_char(pending, fit);
                    offset += self.emit_wrapped(handle, offset, pending, render_cut, &fmt, &face);
                    self.finish_line();
                }
                (WrapMode::Word, _) => {
                    let avail = (edge - self.x).max(0);
                    let fit = face.fit_width(pending, avail);
                    let over_byte = byte_of_char(pending, fit.max(1));
                    if let Some(render_cut) = word_cut(pending, over_byte) {
                        offset +=
                            self.emit_wrapped(handle, offset, pending, render_cut, &fmt, &face);
                        self.finish_line();
                    } else if !self.line.is_empty() && self.word_boundary_at_pen() {
                        // The word starts fresh at the pen; break between
                        // items and retry it on a new line.
                        self.finish_line();
                        continue;
                    } else if !self.lookback_done && self.lookback_redo() {
                        // Earlier items moved down to rejoin this word;
                        // retry against the fresh line.
                        continue;
                    } else {
                        // A single word wider than the line: place it
                        // whole, never drop it.
                        let word_end = pending
                            .char_indices()
                            .find(|(i, c)| *i >= over_byte && c.is_whitespace())
                            .map_or(pending.len(), |(i, _)| i);
                        offset +=
                            self.emit_wrapped(handle, offset, pending, word_end, &fmt, &face);
                        self.finish_line();
                    }
                }
            }
        }
        Ok(())
    }

    /// Emit a wrapped slice: rendering stops at `render_cut`, the covered
    /// source range extends over the following whitespace run. Returns the
    /// number of source bytes consumed.
    fn emit_wrapped(
        &mut self,
        node: NodeHandle,
        offset: usize,
        pending: &str,
        render_cut: usize,
        fmt: &Rc<Format>,
        face: &Rc<dyn FontFace>,
    ) -> usize {
        let mut source_cut = render_cut;
        for (i, ch) in pending[render_cut..].char_indices() {
            if ch.is_whitespace() {
                source_cut = render_cut + i + ch.len_utf8();
            } else {
                break;
            }
        }
        let rendered = pending[..source_cut].trim_end();
        self.emit_item(node, offset, rendered, source_cut, fmt, face);
        source_cut
    }

    fn emit_item(
        &mut self,
        node: NodeHandle,
        byte_offset: usize,
        rendered: &str,
        source_len: usize,
        fmt: &Rc<Format>,
        face: &Rc<dyn FontFace>,
    ) {
        let w = face.advance(rendered);
        let ascent = face.ascent();
        let descent = face.descent();
        self.line.items.push(Item {
            text: rendered.to_string(),
            format: Rc::clone(fmt),
            node,
            byte_offset,
            source_len,
            x: self.x,
            w,
            h: ascent + descent,
            inset: fmt.style.pad().0,
            baseline: ascent,
        });
        self.x += w;
    }

    fn emit_ellipsized(
        &mut self,
        node: NodeHandle,
        offset: usize,
        pending: &str,
        ellipsis: Ellipsis,
        fmt: &Rc<Format>,
        face: &Rc<dyn FontFace>,
        edge: i32,
    ) {
        let symbol = fmt.ellipsis_symbol.as_str();
        let symbol_w = face.advance(symbol);
        let avail = (edge - self.x - symbol_w).max(0);
        match ellipsis {
            Ellipsis::Right => {
                let keep = face.fit_width(pending, avail);
                let cut = byte_of_char(pending, keep);
                let rendered = format!("{}{symbol}", &pending[..cut]);
                self.emit_item(node, offset, &rendered, pending.len(), fmt, face);
            }
            Ellipsis::Left => {
                // Longest suffix that fits next to the symbol.
                let mut start = pending.len();
                for (i, _) in pending.char_indices().rev() {
                    if face.advance(&pending[i..]) > avail {
                        break;
                    }
                    start = i;
                }
                let rendered = format!("{symbol}{}", &pending[start..]);
                self.emit_item(
                    node,
                    offset + start,
                    &rendered,
                    pending.len() - start,
                    fmt,
                    face,
                );
            }
            Ellipsis::None => unreachable!("caller checked"),
        }
        self.ellipsized = true;
    }

    /// True when the pen sits at a legal word break: after whitespace, or
    /// after a non-text marker (tab, placeholder).
    fn word_boundary_at_pen(&self) -> bool {
        let Some(item) = self.line.items.last() else {
            // Only markers on the line.
            return true;
        };
        let marker_after_text = self
            .line
            .format_items
            .last()
            .is_some_and(|marker| marker.x + marker.w >= item.x + item.w);
        marker_after_text
            || item.text.is_empty()
            || item.text.ends_with(char::is_whitespace)
            || item.text.len() < item.source_len
    }

    /// Move trailing items that adjoin an overrunning word down to a fresh
    /// line (splitting the boundary item when the break sits inside it).
    /// Returns false when the line holds nothing but the word itself.
    fn lookback_redo(&mut self) -> bool {
        // How many trailing items belong to the word, and whether the
        // boundary item must be split at an internal space.
        let mut take = 0usize;
        let mut split_at: Option<usize> = None;
        for item in self.line.items.iter().rev() {
            if item.text.ends_with(char::is_whitespace) || item.text.len() < item.source_len {
                break;
            }
            if let Some(ws_end) = item
                .text
                .char_indices()
                .rev()
                .find(|(_, c)| c.is_whitespace())
                .map(|(i, c)| i + c.len_utf8())
            {
                split_at = Some(ws_end);
                take += 1;
                break;
            }
            take += 1;
        }
        if take == 0 {
            return false;
        }
        let line_survives = split_at.is_some()
            || take < self.line.items.len()
            || !self.line.format_items.is_empty();
        if !line_survives {
            return false;
        }

        let keep = self.line.items.len() - take;
        let mut moved: Vec<Item> = self.line.items.split_off(keep);
        if let Some(ws_end) = split_at {
            let mut head = moved.remove(0);
            let face = head
                .format
                .face
                .clone()
                .expect("a measured item has a face");
            let tail_text = head.text[ws_end..].to_string();
            let tail = Item {
                w: face.advance(&tail_text),
                text: tail_text,
                format: Rc::clone(&head.format),
                node: head.node,
                byte_offset: head.byte_offset + ws_end,
                source_len: head.source_len - ws_end,
                x: 0,
                h: head.h,
                inset: head.inset,
                baseline: head.baseline,
            };
            head.source_len = ws_end;
            head.text.truncate(ws_end);
            head.text.truncate(head.text.trim_end().len());
            head.w = face.advance(&head.text);
            self.line.items.push(head);
            moved.insert(0, tail);
        }

        self.finish_line();
        self.lookback_done = true;
        for mut item in moved {
            item.x = self.x;
            self.x += item.w;
            self.line.items.push(item);
        }
        true
    }

    fn finish_line(&mut self) {
        let accum = std::mem::take(&mut self.line);
        // Line-level parameters come from the format of the line's first
        // item, falling back to the current stack top for empty lines.
        let fmt = accum
            .items
            .first()
            .map(|item| Rc::clone(&item.format))
            .unwrap_or_else(|| Rc::clone(self.stack.top()));

        let (mut ascent, mut descent) = if accum.is_empty() {
            self.face_metrics()
        } else {
            let a = accum
                .items
                .iter()
                .map(|i| i.baseline)
                .chain(accum.format_items.iter().map(|f| f.baseline))
                .max()
                .unwrap_or(0);
            let d = accum
                .items
                .iter()
                .map(|i| i.h - i.baseline)
                .chain(accum.format_items.iter().map(|f| f.h - f.baseline))
                .max()
                .unwrap_or(0);
            (a, d)
        };

        // Underlines draw below the baseline and extend the reservation.
        let underline_extra = accum
            .items
            .iter()
            .map(|i| {
                if i.format.decorations.contains(Decorations::UNDERLINE2) {
                    3
                } else if i.format.decorations.contains(Decorations::UNDERLINE) {
                    1
                } else {
                    0
                }
            })
            .max()
            .unwrap_or(0);
        descent += underline_extra;

        let mut height = ascent + descent;
        if fmt.linesize > 0 {
            height = fmt.linesize;
            ascent = ascent.min(height);
        } else if let Some(rel) = fmt.linerelsize {
            height = (height as f32 * rel) as i32;
            ascent = ascent.min(height);
        }
        if let (Some(fill), Some(layout_h)) = (fmt.linefill, self.height) {
            height = (layout_h as f32 * fill) as i32;
        }

        let right = accum
            .items
            .iter()
            .map(|i| i.x + i.w)
            .chain(accum.format_items.iter().map(|f| f.x + f.w))
            .max()
            .unwrap_or(accum.origin);
        let w = (right - accum.origin).max(0);

        let mut line = Line {
            items: accum.items,
            format_items: accum.format_items,
            x: accum.origin,
            y: self.y + self.insets.top,
            w,
            h: height,
            baseline: ascent,
            line_no: self.lines.len(),
        };

        // Alignment needs a finite width; unconstrained layout is
        // left-aligned by definition.
        if let Some(layout_w) = self.width {
            let leftover =
                (layout_w - self.insets.right - fmt.margin_right) - (accum.origin + w);
            if leftover > 0 && fmt.halign > 0.0 {
                let shift = (fmt.halign * leftover as f32) as i32;
                line.x += shift;
                for item in &mut line.items {
                    item.x += shift;
                }
                for fi in &mut line.format_items {
                    fi.x += shift;
                }
            }
        }

        let gap = if let Some(rel) = fmt.linerelgap {
            (height as f32 * rel) as i32
        } else {
            fmt.linegap
        };
        self.y += height + gap.max(0);
        self.lines.push(line);
        self.open_line();
    }
}

/// Byte index of the char at `char_index` (text length when past the end).
fn byte_of_char(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map_or(text.len(), |(i, _)| i)
}

/// Find the word-wrap render cut for a slice overflowing at `over_byte`.
///
/// Inside whitespace, the cut lands at the overflow point; inside a word
/// it walks back to the word start. `None` when no boundary exists before
/// the overflow.
fn word_cut(pending: &str, over_byte: usize) -> Option<usize> {
    let over_in_ws = pending[over_byte..]
        .graphemes(true)
        .next()
        .is_some_and(|g| g.chars().all(char::is_whitespace));
    if over_in_ws {
        return Some(over_byte);
    }
    // Word start: just after the last whitespace grapheme before the
    // overflow point.
    let mut word_start = None;
    for (i, g) in pending.grapheme_indices(true) {
        if i >= over_byte {
            break;
        }
        if g.chars().all(char::is_whitespace) {
            word_start = Some(i + g.len());
        }
    }
    match word_start {
        // A cut at 0 would make no progress.
        Some(0) | None => None,
        cut => cut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::FixedAdvance;

    fn sheet(extra: &str) -> Stylesheet {
        Stylesheet::from_text(&format!("DEFAULT='push font=Vera font_size=10' {extra}"))
    }

    fn build(markup: &str, sheet: &Stylesheet) -> Document {
        let mut doc = Document::new();
        crate::markup::decode_into(&mut doc, Some(sheet), markup);
        doc
    }

    fn lay(doc: &Document, sheet: &Stylesheet, width: Option<i32>) -> Layout {
        let provider = FixedAdvance::default();
        layout(doc, Some(sheet), &provider, width, None).unwrap()
    }

    fn line_texts(layout: &Layout) -> Vec<String> {
        layout
            .lines
            .iter()
            .map(|line| {
                line.items
                    .iter()
                    .map(|i| i.text.as_str())
                    .collect::<Vec<_>>()
                    .join("|")
            })
            .collect()
    }

    #[test]
    fn test_single_line_unconstrained() {
        let sheet = sheet("");
        let doc = build("Hello", &sheet);
        let out = lay(&doc, &sheet, None);
        assert_eq!(out.lines.len(), 1);
        assert_eq!(out.lines[0].items.len(), 1);
        assert_eq!(out.lines[0].items[0].w, 50);
        assert_eq!(out.lines[0].h, 10);
        assert_eq!(out.lines[0].baseline, 8);
        assert_eq!(out.w, 50);
        assert_eq!(out.h, 10);
    }

    #[test]
    fn test_newline_directive_breaks_line() {
        let sheet = sheet("br='\\n'");
        let doc = build("ab<br>cd", &sheet);
        let out = lay(&doc, &sheet, None);
        assert_eq!(line_texts(&out), vec!["ab", "cd"]);
        assert_eq!(out.lines[1].y, 10);
        assert_eq!(out.h, 20);
        assert_eq!(out.lines[0].format_items[0].kind, FormatItemKind::Newline);
    }

    #[test]
    fn test_word_wrap_at_space() {
        let sheet = sheet("w='push wrap=word'");
        // 8 chars * 10px = 80px; at 50px "Hi" fits, "there" wraps.
        let doc = build("<w>Hi there</w>", &sheet);
        let out = lay(&doc, &sheet, Some(50));
        assert_eq!(line_texts(&out), vec!["Hi", "there"]);
        // The wrap cut strips the space from the rendered run but the
        // covered source range includes it.
        let first = &out.lines[0].items[0];
        assert_eq!(first.text, "Hi");
        assert_eq!(first.source_len, 3);
    }

    #[test]
    fn test_word_wrap_inside_word_walks_back() {
        let sheet = sheet("w='push wrap=word'");
        // At width 50 the overflow point lands inside "bbbb".
        let doc = build("<w>aa bbbb</w>", &sheet);
        let out = lay(&doc, &sheet, Some(50));
        assert_eq!(line_texts(&out), vec!["aa", "bbbb"]);
    }

    #[test]
    fn test_word_wrap_overlong_word_kept_whole() {
        let sheet = sheet("w='push wrap=word'");
        let doc = build("<w>abcdefghij xy</w>", &sheet);
        let out = lay(&doc, &sheet, Some(50));
        // A 100px word on a 50px line: emitted whole, never dropped.
        assert_eq!(line_texts(&out), vec!["abcdefghij", "xy"]);
        assert_eq!(out.lines[0].items[0].w, 100);
    }

    #[test]
    fn test_char_wrap_cuts_anywhere() {
        let sheet = sheet("c='push wrap=char'");
        let doc = build("<c>abcdefgh</c>", &sheet);
        let out = lay(&doc, &sheet, Some(30));
        assert_eq!(line_texts(&out), vec!["abc", "def", "gh"]);
    }

    #[test]
    fn test_lookback_redo_rejoins_split_word() {
        let sheet = sheet("");
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.append_format(cur, "+ push wrap=word font=Vera font_size=10");
        doc.append_text(cur, "aa bb");
        doc.append_format(cur, "- pop");
        doc.append_format(cur, "+ push wrap=word font=Vera font_size=10");
        doc.append_text(cur, "ccc");
        doc.append_format(cur, "- pop");
        let provider = FixedAdvance::default();
        // Width 60: "aa bb" fits (50px) but "bbccc" is one word; the
        // look-back splits "aa bb" at its space and moves "bb" down.
        let out = layout(&doc, Some(&sheet), &provider, Some(60), None).unwrap();
        assert_eq!(line_texts(&out), vec!["aa", "bb|ccc"]);
    }

    #[test]
    fn test_ellipsis_right() {
        let sheet = sheet("e='push ellipsis=right'");
        let doc = build("<e>abcdefghij</e>", &sheet);
        let out = lay(&doc, &sheet, Some(60));
        assert_eq!(out.lines.len(), 1);
        // 30px of symbol + 30px of kept text fit in 60.
        assert_eq!(out.lines[0].items[0].text, "abc...");
        assert!(out.lines[0].items[0].w <= 60);
    }

    #[test]
    fn test_ellipsis_left() {
        let sheet = sheet("e='push ellipsis=left'");
        let doc = build("<e>abcdefghij</e>", &sheet);
        let out = lay(&doc, &sheet, Some(60));
        assert_eq!(out.lines.len(), 1);
        assert_eq!(out.lines[0].items[0].text, "...hij");
    }

    #[test]
    fn test_tab_snaps_to_stop() {
        let sheet = sheet("tb='\\t'");
        let doc = build("ab<tb>cd", &sheet);
        let out = lay(&doc, &sheet, None);
        // Default tabstops = 32: pen at 20 snaps to 32.
        let line = &out.lines[0];
        assert_eq!(line.format_items.len(), 1);
        assert_eq!(line.format_items[0].x, 20);
        assert_eq!(line.format_items[0].w, 12);
        assert_eq!(line.items[1].x, 32);
    }

    #[test]
    fn test_item_placeholder_reserves_space() {
        let sheet = sheet("");
        let doc = build("a<item absize=30x20 vsize=ascent>b", &sheet);
        let out = lay(&doc, &sheet, None);
        let line = &out.lines[0];
        assert_eq!(line.format_items[0].w, 30);
        assert_eq!(line.format_items[0].h, 20);
        // vsize=ascent: the whole height sits above the baseline.
        assert_eq!(line.baseline, 20);
        assert_eq!(line.items[1].x, 40);
    }

    #[test]
    fn test_relsize_item_scales_to_line_height() {
        let sheet = sheet("");
        let doc = build("a<item relsize=20x20>b", &sheet);
        let out = lay(&doc, &sheet, None);
        // Face line height is 10; 20x20 scales to 10x10.
        assert_eq!(out.lines[0].format_items[0].w, 10);
        assert_eq!(out.lines[0].format_items[0].h, 10);
    }

    #[test]
    fn test_alignment_center() {
        let sheet = sheet("ct='push align=center'");
        let doc = build("<ct>ab</ct>", &sheet);
        let out = lay(&doc, &sheet, Some(100));
        // 20px of text in 100px: centered at 40.
        assert_eq!(out.lines[0].items[0].x, 40);
    }

    #[test]
    fn test_alignment_needs_finite_width() {
        let sheet = sheet("ct='push align=center'");
        let doc = build("<ct>ab</ct>", &sheet);
        let out = lay(&doc, &sheet, None);
        assert_eq!(out.lines[0].items[0].x, 0);
    }

    #[test]
    fn test_margins_shift_origin() {
        let sheet = sheet("m='push left_margin=12 right_margin=8 wrap=word'");
        let doc = build("<m>abc def</m>", &sheet);
        let out = lay(&doc, &sheet, Some(60));
        // Usable width 60-12-8 = 40: "abc" fits, "def" wraps.
        assert_eq!(line_texts(&out), vec!["abc", "def"]);
        assert_eq!(out.lines[0].items[0].x, 12);
    }

    #[test]
    fn test_style_padding_converges() {
        let sheet = sheet("o='push style=outline'");
        let doc = build("<o>hi</o>", &sheet);
        let out = lay(&doc, &sheet, None);
        assert_eq!(
            out.insets,
            Insets {
                left: 1,
                right: 1,
                top: 1,
                bottom: 1
            }
        );
        // The re-run pass offsets content by the discovered inset.
        assert_eq!(out.lines[0].items[0].x, 1);
        assert_eq!(out.lines[0].y, 1);
        assert_eq!(out.h, 12);
        assert_eq!(out.w, 22);
    }

    #[test]
    fn test_underline_extends_descent() {
        let sheet = sheet("u='push underline=double'");
        let doc = build("<u>hi</u>", &sheet);
        let out = lay(&doc, &sheet, None);
        assert_eq!(out.lines[0].h, 13);
    }

    #[test]
    fn test_linegap_advances_extra() {
        let sheet = Stylesheet::from_text(
            "DEFAULT='push font=Vera font_size=10 linegap=4' br='\\n'",
        );
        let doc = build("a<br>b", &sheet);
        let out = lay(&doc, &sheet, None);
        assert_eq!(out.lines[1].y, 14);
    }

    #[test]
    fn test_linesize_overrides_height() {
        let sheet = sheet("big='push linesize=30'");
        let doc = build("<big>hi</big>", &sheet);
        let out = lay(&doc, &sheet, None);
        assert_eq!(out.lines[0].h, 30);
        assert_eq!(out.lines[0].baseline, 8);
    }

    #[test]
    fn test_idempotent_geometry() {
        let sheet = sheet("w='push wrap=word'");
        let doc = build("<w>one two three four five</w>", &sheet);
        let a = lay(&doc, &sheet, Some(90));
        let b = lay(&doc, &sheet, Some(90));
        assert_eq!(line_texts(&a), line_texts(&b));
        let geo = |l: &Layout| -> Vec<(i32, i32, i32, i32)> {
            l.lines.iter().map(|ln| (ln.x, ln.y, ln.w, ln.h)).collect()
        };
        assert_eq!(geo(&a), geo(&b));
    }

    #[test]
    fn test_wrap_bound_holds() {
        let sheet = sheet("w='push wrap=word'");
        let doc = build("<w>alpha beta gamma delta epsilon</w>", &sheet);
        let width = 90;
        let out = lay(&doc, &sheet, Some(width));
        assert!(out.lines.len() > 1);
        for line in &out.lines {
            for item in &line.items {
                // Only a single over-wide word may exceed the width.
                if item.text.chars().count() * 10 <= width as usize {
                    assert!(item.x + item.w <= width, "wrapped item exceeds width");
                }
            }
        }
    }

    #[test]
    fn test_item_back_reference_invariant() {
        let sheet = sheet("w='push wrap=word'");
        let doc = build("<w>one two three four</w>", &sheet);
        let out = lay(&doc, &sheet, Some(60));
        for line in &out.lines {
            for item in &line.items {
                let node_text = doc
                    .nodes()
                    .find(|(h, _)| *h == item.node)
                    .and_then(|(_, n)| n.as_text().map(str::to_string))
                    .unwrap();
                let slice = &node_text[item.byte_offset..item.byte_offset + item.source_len];
                assert!(slice.starts_with(&item.text));
                assert!(slice[item.text.len()..].chars().all(char::is_whitespace));
            }
        }
    }

    #[test]
    fn test_empty_document_layout() {
        let sheet = sheet("");
        let doc = Document::new();
        let out = lay(&doc, &sheet, Some(100));
        assert!(out.lines.is_empty());
        assert_eq!((out.w, out.h), (0, 0));
    }

    #[test]
    fn test_missing_face_is_an_error() {
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.append_text(cur, "hi");
        let provider = FixedAdvance::default();
        let err = layout(&doc, None, &provider, None, None);
        assert!(matches!(err, Err(Error::NoFace)));
    }

    #[test]
    fn test_trailing_newline_leaves_empty_line() {
        let sheet = sheet("br='\\n'");
        let doc = build("ab<br>", &sheet);
        let out = lay(&doc, &sheet, None);
        assert_eq!(out.lines.len(), 2);
        assert!(out.lines[1].items.is_empty());
        assert_eq!(out.lines[1].h, 10);
    }
}
