//! The textblock object: document, stylesheet, layout caches, and the
//! public editing/geometry API.
//!
//! Everything is single-threaded and synchronous. Layout is lazy: size and
//! geometry queries compute it on demand and memoize the result until the
//! next edit, style change, or resize. The only outward notification is
//! the change callback, fired once per mutating entry point.
//!
//! # Examples
//!
//! ```
//! use std::rc::Rc;
//! use textblock::{FixedAdvance, Stylesheet, Textblock};
//!
//! let style = Rc::new(Stylesheet::from_text(
//!     "DEFAULT='push font=Vera font_size=10 color=#000000' \
//!      b='push style=bold' br='\\n'",
//! ));
//! let mut tb = Textblock::new(Rc::new(FixedAdvance::default()));
//! tb.set_style(Some(style));
//! tb.markup_set(Some("<b>Hi</b> there"));
//!
//! let (w, h) = tb.native_size().unwrap();
//! assert!(w > 0 && h > 0);
//! assert_eq!(tb.markup_get(), "<b>Hi</b> there");
//! ```

use std::cell::{Ref, RefCell};
use std::cmp::Ordering;
use std::rc::Rc;

use crate::document::{CursorId, Document};
use crate::error::Result;
use crate::font::{FontProvider, Rect};
use crate::geometry;
use crate::layout::{self, Insets, Layout};
use crate::markup;
use crate::stylesheet::Stylesheet;

type ChangeCallback = Box<dyn Fn()>;

/// Rich-text document object.
pub struct Textblock {
    doc: Document,
    style: Option<Rc<Stylesheet>>,
    provider: Rc<dyn FontProvider>,
    size: Option<(i32, i32)>,
    /// Markup text retained verbatim until an edit invalidates it.
    retained_markup: RefCell<Option<(u64, String)>>,
    formatted: RefCell<Option<(u64, Layout)>>,
    native: RefCell<Option<(u64, Layout)>>,
    change_cb: Option<ChangeCallback>,
}

impl Textblock {
    /// Create an empty textblock using `provider` for font metrics.
    #[must_use]
    pub fn new(provider: Rc<dyn FontProvider>) -> Self {
        Self {
            doc: Document::new(),
            style: None,
            provider,
            size: None,
            retained_markup: RefCell::new(None),
            formatted: RefCell::new(None),
            native: RefCell::new(None),
            change_cb: None,
        }
    }

    /// Register the "document changed" notification.
    pub fn set_change_callback<F>(&mut self, callback: F)
    where
        F: Fn() + 'static,
    {
        self.change_cb = Some(Box::new(callback));
    }

    /// Read-only access to the underlying document.
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// The attached stylesheet.
    #[must_use]
    pub fn style(&self) -> Option<&Rc<Stylesheet>> {
        self.style.as_ref()
    }

    /// Attach (or detach) a stylesheet. The retained markup is re-decoded
    /// against the new sheet.
    pub fn set_style(&mut self, style: Option<Rc<Stylesheet>>) {
        match (&self.style, &style) {
            (Some(old), Some(new)) if Rc::ptr_eq(old, new) => return,
            (None, None) => return,
            _ => {}
        }
        let markup = if self.doc.is_empty() {
            None
        } else {
            Some(self.markup_get())
        };
        self.style = style;
        self.markup_set(markup.as_deref());
    }

    /// Set the layout size. `None` lays out unconstrained.
    pub fn set_size(&mut self, size: Option<(i32, i32)>) {
        if self.size == size {
            return;
        }
        self.size = size;
        self.formatted.replace(None);
        self.notify();
    }

    /// The current layout size.
    #[must_use]
    pub fn size(&self) -> Option<(i32, i32)> {
        self.size
    }

    // ------------------------------------------------------------------
    // Markup

    /// Replace the document content by decoding markup. `None` clears.
    pub fn markup_set(&mut self, markup: Option<&str>) {
        self.doc.clear();
        if let Some(text) = markup {
            markup::decode_into(&mut self.doc, self.style.as_deref(), text);
        }
        let retained = markup.map(|text| (self.doc.revision(), text.to_string()));
        self.retained_markup.replace(retained);
        self.notify();
    }

    /// The document re-encoded as markup. Returns the text handed to
    /// [`markup_set`](Self::markup_set) verbatim while no edit has
    /// happened since.
    #[must_use]
    pub fn markup_get(&self) -> String {
        let revision = self.doc.revision();
        if let Some((rev, text)) = self.retained_markup.borrow().as_ref() {
            if *rev == revision {
                return text.clone();
            }
        }
        let encoded = markup::encode(&self.doc, self.style.as_deref());
        self.retained_markup
            .replace(Some((revision, encoded.clone())));
        encoded
    }

    /// Remove all content.
    pub fn clear(&mut self) {
        self.doc.clear();
        self.retained_markup.replace(None);
        self.notify();
    }

    // ------------------------------------------------------------------
    // Cursors (delegation; mutating text operations notify)

    /// The document's own cursor.
    #[must_use]
    pub fn primary_cursor(&self) -> CursorId {
        self.doc.primary_cursor()
    }

    /// Create a cursor at the document start.
    pub fn cursor_new(&mut self) -> CursorId {
        self.doc.cursor_new()
    }

    /// Free a cursor (the primary cursor is refused).
    pub fn cursor_free(&mut self, cursor: CursorId) -> bool {
        self.doc.cursor_free(cursor)
    }

    /// Copy one cursor's position onto another.
    pub fn cursor_copy(&mut self, from: CursorId, to: CursorId) -> bool {
        self.doc.cursor_copy(from, to)
    }

    /// Order two cursors by document position.
    #[must_use]
    pub fn cursor_compare(&self, a: CursorId, b: CursorId) -> Ordering {
        self.doc.cursor_compare(a, b)
    }

    pub fn cursor_node_first(&mut self, cursor: CursorId) -> bool {
        self.doc.cursor_node_first(cursor)
    }

    pub fn cursor_node_last(&mut self, cursor: CursorId) -> bool {
        self.doc.cursor_node_last(cursor)
    }

    pub fn cursor_node_next(&mut self, cursor: CursorId) -> bool {
        self.doc.cursor_node_next(cursor)
    }

    pub fn cursor_node_prev(&mut self, cursor: CursorId) -> bool {
        self.doc.cursor_node_prev(cursor)
    }

    pub fn cursor_char_first(&mut self, cursor: CursorId) -> bool {
        self.doc.cursor_char_first(cursor)
    }

    pub fn cursor_char_last(&mut self, cursor: CursorId) -> bool {
        self.doc.cursor_char_last(cursor)
    }

    pub fn cursor_char_next(&mut self, cursor: CursorId) -> bool {
        self.doc.cursor_char_next(cursor)
    }

    pub fn cursor_char_prev(&mut self, cursor: CursorId) -> bool {
        self.doc.cursor_char_prev(cursor)
    }

    /// Byte offset of the cursor within its node.
    #[must_use]
    pub fn cursor_offset(&self, cursor: CursorId) -> usize {
        self.doc.cursor_offset(cursor)
    }

    /// End-of-line flag of the cursor.
    #[must_use]
    pub fn cursor_eol(&self, cursor: CursorId) -> bool {
        self.doc.cursor_eol(cursor)
    }

    /// Set the end-of-line flag.
    pub fn cursor_set_eol(&mut self, cursor: CursorId, eol: bool) {
        self.doc.cursor_set_eol(cursor, eol);
    }

    /// Text of the cursor's node, when it is a text node.
    #[must_use]
    pub fn cursor_node_text(&self, cursor: CursorId) -> Option<&str> {
        self.doc.cursor_node_text(cursor)
    }

    /// Directive of the cursor's node, when it is a format node.
    #[must_use]
    pub fn cursor_node_format(&self, cursor: CursorId) -> Option<&str> {
        self.doc.cursor_node_format(cursor)
    }

    /// Insert text after the cursor.
    pub fn append_text(&mut self, cursor: CursorId, text: &str) {
        self.doc.append_text(cursor, text);
        self.notify();
    }

    /// Insert text before the cursor.
    pub fn prepend_text(&mut self, cursor: CursorId, text: &str) {
        self.doc.prepend_text(cursor, text);
        self.notify();
    }

    /// Insert a format directive after the cursor.
    pub fn append_format(&mut self, cursor: CursorId, directive: &str) {
        self.doc.append_format(cursor, directive);
        self.notify();
    }

    /// Insert a format directive before the cursor.
    pub fn prepend_format(&mut self, cursor: CursorId, directive: &str) {
        self.doc.prepend_format(cursor, directive);
        self.notify();
    }

    /// Delete the cursor's node.
    pub fn node_delete(&mut self, cursor: CursorId) -> bool {
        let deleted = self.doc.node_delete(cursor);
        if deleted {
            self.notify();
        }
        deleted
    }

    /// Delete one codepoint at the cursor.
    pub fn char_delete(&mut self, cursor: CursorId) -> bool {
        let deleted = self.doc.char_delete(cursor);
        if deleted {
            self.notify();
        }
        deleted
    }

    /// Delete the range between two cursors.
    pub fn range_delete(&mut self, a: CursorId, b: CursorId) -> bool {
        let deleted = self.doc.range_delete(a, b);
        if deleted {
            self.notify();
        }
        deleted
    }

    // ------------------------------------------------------------------
    // Size queries

    /// Size of the content laid out at the set size.
    pub fn formatted_size(&self) -> Result<(i32, i32)> {
        let layout = self.formatted_layout()?;
        Ok((layout.w, layout.h))
    }

    /// Size of the content laid out unconstrained.
    pub fn native_size(&self) -> Result<(i32, i32)> {
        let layout = self.native_layout()?;
        Ok((layout.w, layout.h))
    }

    /// Decoration insets discovered by the last formatted layout.
    pub fn style_insets(&self) -> Result<Insets> {
        let layout = self.formatted_layout()?;
        Ok(layout.insets)
    }

    /// Number of laid-out lines at the set size.
    pub fn line_count(&self) -> Result<usize> {
        let layout = self.formatted_layout()?;
        Ok(layout.lines.len())
    }

    // ------------------------------------------------------------------
    // Geometry queries

    /// Pixel box of the char (or caret position) at a cursor.
    pub fn char_geometry(&self, cursor: CursorId) -> Result<Option<Rect>> {
        let Some(state) = self.doc.state(cursor) else {
            return Ok(None);
        };
        let layout = self.formatted_layout()?;
        Ok(geometry::char_geometry(&layout, state))
    }

    /// Line index a cursor position falls on.
    pub fn cursor_line(&self, cursor: CursorId) -> Result<Option<usize>> {
        let Some(state) = self.doc.state(cursor) else {
            return Ok(None);
        };
        let layout = self.formatted_layout()?;
        Ok(geometry::line_of(&layout, state))
    }

    /// Pixel box of one output line.
    pub fn line_geometry(&self, line_no: usize) -> Result<Option<Rect>> {
        let layout = self.formatted_layout()?;
        Ok(geometry::line_geometry(&layout, line_no))
    }

    /// Pixel box of the marker emitted for a format-node cursor.
    pub fn format_item_geometry(&self, cursor: CursorId) -> Result<Option<Rect>> {
        let Some(node) = self.doc.cursor_node(cursor) else {
            return Ok(None);
        };
        let layout = self.formatted_layout()?;
        Ok(geometry::format_item_geometry(&layout, node))
    }

    /// Position a cursor at a pixel coordinate. Returns false when the
    /// coordinate hits no line.
    pub fn coord_to_cursor(&mut self, cursor: CursorId, x: i32, y: i32) -> Result<bool> {
        let state = {
            let layout = self.formatted_layout()?;
            geometry::coord_to_state(&layout, x, y)
        };
        Ok(self.apply_hit(cursor, state))
    }

    /// Position a cursor at a horizontal coordinate on a known line.
    pub fn line_coord_to_cursor(
        &mut self,
        cursor: CursorId,
        line_no: usize,
        x: i32,
    ) -> Result<bool> {
        let state = {
            let layout = self.formatted_layout()?;
            geometry::line_coord_to_state(&layout, line_no, x)
        };
        Ok(self.apply_hit(cursor, state))
    }

    /// One rectangle per line covered by the cursor range.
    pub fn range_rectangles(&self, a: CursorId, b: CursorId) -> Result<Vec<Rect>> {
        let (Some(sa), Some(sb)) = (self.doc.state(a), self.doc.state(b)) else {
            return Ok(Vec::new());
        };
        let (from, to) = match self.doc.cursor_compare(a, b) {
            Ordering::Greater => (sb, sa),
            _ => (sa, sb),
        };
        let layout = self.formatted_layout()?;
        Ok(geometry::range_rects(&layout, from, to))
    }

    // ------------------------------------------------------------------

    fn apply_hit(&mut self, cursor: CursorId, state: Option<crate::document::CursorState>) -> bool {
        match state {
            Some(state) => {
                self.doc.set_state(cursor, state);
                true
            }
            None => false,
        }
    }

    fn formatted_layout(&self) -> Result<Ref<'_, Layout>> {
        let revision = self.doc.revision();
        let valid = self
            .formatted
            .borrow()
            .as_ref()
            .is_some_and(|(rev, _)| *rev == revision);
        if !valid {
            let (width, height) = match self.size {
                Some((w, h)) => (Some(w), Some(h)),
                None => (None, None),
            };
            let computed = layout::layout(
                &self.doc,
                self.style.as_deref(),
                self.provider.as_ref(),
                width,
                height,
            )?;
            self.formatted.replace(Some((revision, computed)));
        }
        Ok(Ref::map(self.formatted.borrow(), |cache| {
            &cache.as_ref().expect("formatted cache filled above").1
        }))
    }

    fn native_layout(&self) -> Result<Ref<'_, Layout>> {
        let revision = self.doc.revision();
        let valid = self
            .native
            .borrow()
            .as_ref()
            .is_some_and(|(rev, _)| *rev == revision);
        if !valid {
            let computed = layout::layout(
                &self.doc,
                self.style.as_deref(),
                self.provider.as_ref(),
                None,
                None,
            )?;
            self.native.replace(Some((revision, computed)));
        }
        Ok(Ref::map(self.native.borrow(), |cache| {
            &cache.as_ref().expect("native cache filled above").1
        }))
    }

    fn notify(&self) {
        if let Some(callback) = &self.change_cb {
            callback();
        }
    }
}
