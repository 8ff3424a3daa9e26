//! Editable document of text and format nodes.
//!
//! A [`Document`] is an ordered sequence of nodes — text runs and format
//! directives — plus the set of live cursors into it. Cursors are owned by
//! the document and addressed by [`CursorId`]; every structural edit
//! reconciles all of them before returning, so no caller can observe a
//! cursor pointing into removed storage.
//!
//! Invariants maintained by every edit:
//!
//! - no two adjacent nodes are both text (neighbors auto-merge),
//! - a live cursor always references a live node (or none, on an empty
//!   document),
//! - cursor offsets always land on UTF-8 char boundaries.
//!
//! # Examples
//!
//! ```
//! use textblock::{Document, NodeContent};
//!
//! let mut doc = Document::new();
//! let cur = doc.primary_cursor();
//! doc.append_text(cur, "Hello");
//! doc.append_format(cur, "+ push style=bold");
//! doc.append_text(cur, "world");
//!
//! let kinds: Vec<bool> = doc.nodes().map(|(_, n)| n.is_text()).collect();
//! assert_eq!(kinds, vec![true, false, true]);
//! ```

mod arena;
mod cursor;

pub use arena::{NodeArena, NodeContent, NodeHandle, NodeIter};

/// Identifier of a cursor owned by a document.
///
/// `CursorId` 0 is the document's primary cursor; it exists for the whole
/// document lifetime and cannot be freed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CursorId(u32);

impl CursorId {
    pub(crate) const PRIMARY: Self = Self(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Position state of one cursor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct CursorState {
    /// Node the cursor rests on; `None` on an empty document.
    pub node: Option<NodeHandle>,
    /// Byte offset into the node's text, always at a char boundary.
    /// 0 for format nodes.
    pub offset: usize,
    /// End-of-line flag: distinguishes "end of wrapped line N" from
    /// "start of line N+1" at the same document position.
    pub eol: bool,
}

/// Ordered node list with live cursors.
#[derive(Debug, Default)]
pub struct Document {
    pub(crate) arena: NodeArena,
    cursors: Vec<Option<CursorState>>,
    revision: u64,
}

impl Document {
    /// Create an empty document with its primary cursor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            arena: NodeArena::new(),
            cursors: vec![Some(CursorState::default())],
            revision: 0,
        }
    }

    /// The document's own cursor.
    #[must_use]
    pub fn primary_cursor(&self) -> CursorId {
        CursorId::PRIMARY
    }

    /// Create a new cursor at the start of the document.
    pub fn cursor_new(&mut self) -> CursorId {
        let state = CursorState {
            node: self.arena.first(),
            offset: 0,
            eol: false,
        };
        for (i, slot) in self.cursors.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(state);
                return CursorId(i as u32);
            }
        }
        self.cursors.push(Some(state));
        CursorId((self.cursors.len() - 1) as u32)
    }

    /// Free a cursor. The primary cursor is refused.
    pub fn cursor_free(&mut self, cursor: CursorId) -> bool {
        if cursor == CursorId::PRIMARY {
            return false;
        }
        match self.cursors.get_mut(cursor.index()) {
            Some(slot @ Some(_)) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Copy the position of `from` onto `to`.
    pub fn cursor_copy(&mut self, from: CursorId, to: CursorId) -> bool {
        let Some(state) = self.state(from) else {
            return false;
        };
        match self.cursors.get_mut(to.index()) {
            Some(slot @ Some(_)) => {
                *slot = Some(state);
                true
            }
            _ => false,
        }
    }

    /// Number of live cursors (the primary included).
    #[must_use]
    pub fn cursor_count(&self) -> usize {
        self.cursors.iter().filter(|slot| slot.is_some()).count()
    }

    /// Monotonic edit counter; bumped by every structural change.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    /// True when no nodes exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Iterate nodes in document order.
    pub fn nodes(&self) -> NodeIter<'_> {
        self.arena.iter()
    }

    /// Remove all nodes; every cursor collapses to the empty position.
    pub fn clear(&mut self) {
        self.arena.clear();
        for slot in self.cursors.iter_mut().flatten() {
            *slot = CursorState::default();
        }
        self.touch();
    }

    /// Node the cursor rests on.
    #[must_use]
    pub fn cursor_node(&self, cursor: CursorId) -> Option<NodeHandle> {
        self.state(cursor)?.node
    }

    /// Byte offset of the cursor within its node.
    #[must_use]
    pub fn cursor_offset(&self, cursor: CursorId) -> usize {
        self.state(cursor).map_or(0, |s| s.offset)
    }

    /// End-of-line flag of the cursor.
    #[must_use]
    pub fn cursor_eol(&self, cursor: CursorId) -> bool {
        self.state(cursor).is_some_and(|s| s.eol)
    }

    /// Set the end-of-line flag (geometry mapping uses this to pin a
    /// position to the end of a wrapped line).
    pub fn cursor_set_eol(&mut self, cursor: CursorId, eol: bool) {
        if let Some(state) = self.state_mut(cursor) {
            state.eol = eol;
        }
    }

    /// Text of the cursor's node, when it is a text node.
    #[must_use]
    pub fn cursor_node_text(&self, cursor: CursorId) -> Option<&str> {
        let handle = self.state(cursor)?.node?;
        self.arena.get(handle)?.as_text()
    }

    /// Directive of the cursor's node, when it is a format node.
    #[must_use]
    pub fn cursor_node_format(&self, cursor: CursorId) -> Option<&str> {
        let handle = self.state(cursor)?.node?;
        self.arena.get(handle)?.as_format()
    }

    pub(crate) fn state(&self, cursor: CursorId) -> Option<CursorState> {
        self.cursors.get(cursor.index()).copied().flatten()
    }

    pub(crate) fn state_mut(&mut self, cursor: CursorId) -> Option<&mut CursorState> {
        self.cursors.get_mut(cursor.index())?.as_mut()
    }

    pub(crate) fn set_state(&mut self, cursor: CursorId, state: CursorState) {
        if let Some(slot) = self.cursors.get_mut(cursor.index()) {
            if slot.is_some() {
                *slot = Some(state);
            }
        }
    }

    /// Iterate live cursor ids.
    pub(crate) fn cursor_ids(&self) -> impl Iterator<Item = CursorId> + use<> {
        let ids: Vec<CursorId> = self
            .cursors
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| CursorId(i as u32)))
            .collect();
        ids.into_iter()
    }

    pub(crate) fn touch(&mut self) {
        self.revision += 1;
        self.assert_invariants();
    }

    /// Debug-only check of the structural invariants.
    fn assert_invariants(&self) {
        #[cfg(debug_assertions)]
        {
            let mut prev_was_text = false;
            for (_, content) in self.arena.iter() {
                let is_text = content.is_text();
                debug_assert!(
                    !(prev_was_text && is_text),
                    "adjacent text nodes must merge"
                );
                prev_was_text = is_text;
            }
            for slot in self.cursors.iter().flatten() {
                if let Some(node) = slot.node {
                    debug_assert!(self.arena.contains(node), "cursor on a removed node");
                    if let Some(text) = self.arena.get(node).and_then(NodeContent::as_text) {
                        debug_assert!(
                            text.is_char_boundary(slot.offset.min(text.len())),
                            "cursor offset off a char boundary"
                        );
                    }
                }
            }
        }
    }
}
