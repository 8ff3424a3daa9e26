//! Bidirectional mapping between cursor positions and layout geometry.
//!
//! Every query resolves through the `(node, byte offset)` back-references
//! layout leaves on items. At a wrapped line boundary the same document
//! position belongs to two lines; the cursor's end-of-line flag picks the
//! line ending there over the line starting there.

use crate::document::{CursorState, NodeHandle};
use crate::font::Rect;
use crate::layout::{FormatItemKind, Layout, Line};

/// Pixel caret/char geometry for a cursor position.
pub(crate) fn char_geometry(layout: &Layout, state: CursorState) -> Option<Rect> {
    locate(layout, state).map(|(_, rect)| rect)
}

/// Line index a cursor position falls on.
pub(crate) fn line_of(layout: &Layout, state: CursorState) -> Option<usize> {
    locate(layout, state).map(|(line_no, _)| line_no)
}

/// Geometry of the format item emitted for a format node.
pub(crate) fn format_item_geometry(layout: &Layout, node: NodeHandle) -> Option<Rect> {
    for line in &layout.lines {
        for fi in &line.format_items {
            if fi.node == node {
                return Some(Rect::new(fi.x, line.y, fi.w, line.h));
            }
        }
    }
    None
}

/// Bounding box of one output line.
pub(crate) fn line_geometry(layout: &Layout, line_no: usize) -> Option<Rect> {
    let line = layout.lines.get(line_no)?;
    Some(Rect::new(line.x, line.y, line.w, line.h))
}

/// Resolve a pixel coordinate to a cursor position.
pub(crate) fn coord_to_state(layout: &Layout, x: i32, y: i32) -> Option<CursorState> {
    let line = layout
        .lines
        .iter()
        .find(|line| y >= line.y && y < line.y + line.h)?;
    line_hit(line, x)
}

/// Resolve a horizontal coordinate on a known line.
pub(crate) fn line_coord_to_state(layout: &Layout, line_no: usize, x: i32) -> Option<CursorState> {
    line_hit(layout.lines.get(line_no)?, x)
}

/// One rectangle per line covered by the (ordered) cursor range.
pub(crate) fn range_rects(layout: &Layout, from: CursorState, to: CursorState) -> Vec<Rect> {
    let (Some((line_a, rect_a)), Some((line_b, rect_b))) =
        (locate(layout, from), locate(layout, to))
    else {
        return Vec::new();
    };

    if line_a == line_b {
        let line = &layout.lines[line_a];
        let w = (rect_b.x - rect_a.x).max(0);
        return vec![Rect::new(rect_a.x, line.y, w, line.h)];
    }

    let mut rects = Vec::with_capacity(line_b - line_a + 1);
    let first = &layout.lines[line_a];
    rects.push(Rect::new(
        rect_a.x,
        first.y,
        (first.x + first.w - rect_a.x).max(0),
        first.h,
    ));
    for line in &layout.lines[line_a + 1..line_b] {
        rects.push(Rect::new(line.x, line.y, line.w, line.h));
    }
    let last = &layout.lines[line_b];
    rects.push(Rect::new(last.x, last.y, (rect_b.x - last.x).max(0), last.h));
    rects
}

/// Find the line and pixel box for a cursor position.
///
/// Returns the covering char's box for interior positions and a
/// zero-width caret at run ends.
fn locate(layout: &Layout, state: CursorState) -> Option<(usize, Rect)> {
    let node = state.node?;

    // Format-node cursors resolve to their emitted marker.
    for line in &layout.lines {
        for fi in &line.format_items {
            if fi.node == node {
                return Some((line.line_no, Rect::new(fi.x, line.y, fi.w, line.h)));
            }
        }
    }

    // The eol flag pins a wrapped boundary to the line ending there.
    if state.eol {
        if let Some(hit) = find_item(layout, node, |start, end| state.offset == end && end > start)
        {
            return Some(end_caret(layout, hit));
        }
    }
    if let Some(hit) = find_item(layout, node, |start, end| {
        state.offset >= start && state.offset < end
    }) {
        return Some(interior_caret(layout, hit, state.offset));
    }
    // End-of-node (or end-of-document) boundary.
    if let Some(hit) = find_item(layout, node, |_, end| state.offset == end) {
        return Some(end_caret(layout, hit));
    }
    None
}

struct ItemHit {
    line_no: usize,
    item_index: usize,
}

fn find_item(
    layout: &Layout,
    node: NodeHandle,
    pred: impl Fn(usize, usize) -> bool,
) -> Option<ItemHit> {
    for (line_no, line) in layout.lines.iter().enumerate() {
        for (item_index, item) in line.items.iter().enumerate() {
            if item.node != node {
                continue;
            }
            let start = item.byte_offset;
            let end = start + item.source_len;
            if pred(start, end) {
                return Some(ItemHit { line_no, item_index });
            }
        }
    }
    None
}

fn interior_caret(layout: &Layout, hit: ItemHit, offset: usize) -> (usize, Rect) {
    let line = &layout.lines[hit.line_no];
    let item = &line.items[hit.item_index];
    let rel = offset - item.byte_offset;
    if rel >= item.text.len() {
        // Inside the whitespace stripped at a wrap cut.
        return end_caret(layout, hit);
    }
    let char_index = item.text[..rel].chars().count();
    let rect = item
        .format
        .face
        .as_ref()
        .and_then(|face| face.char_box(&item.text, char_index));
    match rect {
        Some(r) => (
            hit.line_no,
            Rect::new(item.x + r.x, line.y, r.w, line.h),
        ),
        None => end_caret(layout, hit),
    }
}

fn end_caret(layout: &Layout, hit: ItemHit) -> (usize, Rect) {
    let line = &layout.lines[hit.line_no];
    let item = &line.items[hit.item_index];
    (hit.line_no, Rect::new(item.x + item.w, line.y, 0, line.h))
}

fn line_hit(line: &Line, x: i32) -> Option<CursorState> {
    // Direct hit on a text run.
    for item in &line.items {
        if x >= item.x && x < item.x + item.w {
            let rel = x - item.x;
            let offset = item
                .format
                .face
                .as_ref()
                .and_then(|face| face.char_at_x(&item.text, rel))
                .map_or(0, |(idx, _)| byte_of_char(&item.text, idx));
            return Some(CursorState {
                node: Some(item.node),
                offset: item.byte_offset + offset,
                eol: false,
            });
        }
    }
    // Direct hit on a marker.
    for fi in &line.format_items {
        if x >= fi.x && x < fi.x + fi.w {
            return Some(CursorState {
                node: Some(fi.node),
                offset: 0,
                eol: false,
            });
        }
    }

    // Gap or out-of-range: snap to the nearest edge.
    enum Near {
        Item(usize),
        Marker(usize),
    }
    let mut best: Option<(i32, Near)> = None;
    let mut consider = |distance: i32, near: Near| {
        if best.as_ref().is_none_or(|(d, _)| distance < *d) {
            best = Some((distance, near));
        }
    };
    for (i, item) in line.items.iter().enumerate() {
        let d = if x < item.x {
            item.x - x
        } else {
            x - (item.x + item.w)
        };
        consider(d.max(0), Near::Item(i));
    }
    for (i, fi) in line.format_items.iter().enumerate() {
        let d = if x < fi.x { fi.x - x } else { x - (fi.x + fi.w) };
        consider(d.max(0), Near::Marker(i));
    }

    let ends_with_break = line
        .format_items
        .iter()
        .any(|fi| fi.kind == FormatItemKind::Newline);
    match best?.1 {
        Near::Item(i) => {
            let item = &line.items[i];
            if x < item.x {
                Some(CursorState {
                    node: Some(item.node),
                    offset: item.byte_offset,
                    eol: false,
                })
            } else {
                // Past the right end: the end of a wrapped line and the
                // start of the next one are the same document position,
                // so pin it with the eol flag.
                Some(CursorState {
                    node: Some(item.node),
                    offset: item.byte_offset + item.source_len,
                    eol: !ends_with_break,
                })
            }
        }
        Near::Marker(i) => Some(CursorState {
            node: Some(line.format_items[i].node),
            offset: 0,
            eol: false,
        }),
    }
}

fn byte_of_char(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map_or(text.len(), |(i, _)| i)
}
