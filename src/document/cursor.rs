//! Cursor operations: navigation, insertion, deletion.
//!
//! Everything here runs through [`Document`] so the full cursor set can be
//! reconciled before an edit returns. Offsets are byte positions at char
//! boundaries; stepping is done per codepoint.

use std::cmp::Ordering;

use super::{CursorId, CursorState, Document, NodeContent, NodeHandle};

/// Clamp a byte offset into `text` down to a char boundary.
fn align_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while offset > 0 && !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Byte offset of the last char in `text` (0 when empty).
fn last_char_offset(text: &str) -> usize {
    text.char_indices().last().map_or(0, |(i, _)| i)
}

/// A directive that is nothing but an explicit newline.
fn is_newline_directive(directive: &str) -> bool {
    matches!(directive.trim(), "\\n" | "\n")
}

/// A push directive as produced by the markup codec (`+ ...`), excluding
/// inline placeholders, which never pair with a pop.
fn is_opener(directive: &str) -> bool {
    directive
        .strip_prefix("+ ")
        .is_some_and(|rest| rest.split_whitespace().next() != Some("item"))
}

/// A pop directive (`- ...`).
fn is_closer(directive: &str) -> bool {
    directive.starts_with("- ")
}

impl Document {
    // ------------------------------------------------------------------
    // Navigation

    /// Move to the first node.
    pub fn cursor_node_first(&mut self, cursor: CursorId) -> bool {
        let Some(first) = self.arena.first() else {
            return false;
        };
        self.set_state(
            cursor,
            CursorState {
                node: Some(first),
                offset: 0,
                eol: false,
            },
        );
        true
    }

    /// Move to the last node, parking on its last char.
    pub fn cursor_node_last(&mut self, cursor: CursorId) -> bool {
        let Some(last) = self.arena.last() else {
            return false;
        };
        let offset = match self.arena.get(last) {
            Some(NodeContent::Text(text)) => last_char_offset(text),
            _ => 0,
        };
        self.set_state(
            cursor,
            CursorState {
                node: Some(last),
                offset,
                eol: false,
            },
        );
        true
    }

    /// Move to the next node.
    pub fn cursor_node_next(&mut self, cursor: CursorId) -> bool {
        let Some(state) = self.state(cursor) else {
            return false;
        };
        let Some(next) = state.node.and_then(|h| self.arena.next(h)) else {
            return false;
        };
        self.set_state(
            cursor,
            CursorState {
                node: Some(next),
                offset: 0,
                eol: false,
            },
        );
        true
    }

    /// Move to the previous node.
    pub fn cursor_node_prev(&mut self, cursor: CursorId) -> bool {
        let Some(state) = self.state(cursor) else {
            return false;
        };
        let Some(prev) = state.node.and_then(|h| self.arena.prev(h)) else {
            return false;
        };
        self.set_state(
            cursor,
            CursorState {
                node: Some(prev),
                offset: 0,
                eol: false,
            },
        );
        true
    }

    /// Move to the first char of the current node.
    pub fn cursor_char_first(&mut self, cursor: CursorId) -> bool {
        let Some(state) = self.state(cursor) else {
            return false;
        };
        if state.node.is_none() {
            return false;
        }
        if let Some(s) = self.state_mut(cursor) {
            s.offset = 0;
            s.eol = false;
        }
        true
    }

    /// Move to the last char of the current node.
    pub fn cursor_char_last(&mut self, cursor: CursorId) -> bool {
        let Some(state) = self.state(cursor) else {
            return false;
        };
        let Some(handle) = state.node else {
            return false;
        };
        let offset = match self.arena.get(handle) {
            Some(NodeContent::Text(text)) => last_char_offset(text),
            _ => 0,
        };
        if let Some(s) = self.state_mut(cursor) {
            s.offset = offset;
            s.eol = false;
        }
        true
    }

    /// Step one codepoint forward, crossing into the next node at a node
    /// end. Returns false at the end of the document.
    pub fn cursor_char_next(&mut self, cursor: CursorId) -> bool {
        let Some(state) = self.state(cursor) else {
            return false;
        };
        let Some(handle) = state.node else {
            return false;
        };
        match self.arena.get(handle) {
            Some(NodeContent::Text(text)) => {
                let offset = align_boundary(text, state.offset);
                let Some(ch) = text[offset..].chars().next() else {
                    // Already at the node end boundary.
                    return self.cursor_node_next(cursor);
                };
                let stepped = offset + ch.len_utf8();
                if stepped < text.len() {
                    if let Some(s) = self.state_mut(cursor) {
                        s.offset = stepped;
                        s.eol = false;
                    }
                    true
                } else if self.arena.next(handle).is_some() {
                    self.cursor_node_next(cursor)
                } else if let Some(s) = self.state_mut(cursor) {
                    // Park on the end-of-document boundary.
                    s.offset = stepped;
                    s.eol = false;
                    true
                } else {
                    false
                }
            }
            Some(NodeContent::Format(_)) => self.cursor_node_next(cursor),
            None => false,
        }
    }

    /// Step one codepoint backward, crossing into the previous node at a
    /// node start. Returns false at the start of the document.
    pub fn cursor_char_prev(&mut self, cursor: CursorId) -> bool {
        let Some(state) = self.state(cursor) else {
            return false;
        };
        let Some(handle) = state.node else {
            return false;
        };
        let offset = match self.arena.get(handle) {
            Some(NodeContent::Text(text)) => align_boundary(text, state.offset),
            _ => 0,
        };
        if offset > 0 {
            let text = self
                .arena
                .get(handle)
                .and_then(NodeContent::as_text)
                .expect("offset > 0 implies text node");
            let stepped = text[..offset]
                .char_indices()
                .last()
                .map_or(0, |(i, _)| i);
            if let Some(s) = self.state_mut(cursor) {
                s.offset = stepped;
                s.eol = false;
            }
            return true;
        }
        let Some(prev) = self.arena.prev(handle) else {
            return false;
        };
        let offset = match self.arena.get(prev) {
            Some(NodeContent::Text(text)) => last_char_offset(text),
            _ => 0,
        };
        self.set_state(
            cursor,
            CursorState {
                node: Some(prev),
                offset,
                eol: false,
            },
        );
        true
    }

    /// Order two cursors: node document position, then offset, then the
    /// end-of-line flag (eol sorts after non-eol). A nodeless cursor sorts
    /// at the document end.
    #[must_use]
    pub fn cursor_compare(&self, a: CursorId, b: CursorId) -> Ordering {
        match (self.state(a), self.state(b)) {
            (Some(sa), Some(sb)) => self.compare_states(sa, sb),
            _ => Ordering::Equal,
        }
    }

    fn compare_states(&self, a: CursorState, b: CursorState) -> Ordering {
        match (a.node, b.node) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(ha), Some(hb)) => {
                if ha == hb {
                    a.offset.cmp(&b.offset).then(a.eol.cmp(&b.eol))
                } else {
                    self.arena.position(ha).cmp(&self.arena.position(hb))
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Insertion

    /// Insert text at the cursor; the cursor advances past the inserted
    /// text, so consecutive appends concatenate.
    pub fn append_text(&mut self, cursor: CursorId, text: &str) {
        self.insert_text_at(cursor, text, false);
    }

    /// Insert text at the cursor; the cursor stays at the insertion
    /// point, so consecutive prepends stack in front of it.
    pub fn prepend_text(&mut self, cursor: CursorId, text: &str) {
        self.insert_text_at(cursor, text, true);
    }

    fn insert_text_at(&mut self, cursor: CursorId, text: &str, prepend: bool) {
        if text.is_empty() {
            return;
        }
        let Some(state) = self.state(cursor) else {
            return;
        };

        let (handle, offset) = match state.node {
            None => {
                let handle = self.arena.push_back(NodeContent::Text(String::new()));
                (handle, 0)
            }
            Some(handle) => match self.arena.get(handle) {
                Some(NodeContent::Text(node_text)) => {
                    (handle, align_boundary(node_text, state.offset))
                }
                Some(NodeContent::Format(_)) => {
                    let fresh = NodeContent::Text(String::new());
                    let created = if prepend {
                        self.arena.insert_before(handle, fresh)
                    } else {
                        self.arena.insert_after(handle, fresh)
                    };
                    (created, 0)
                }
                None => return,
            },
        };

        let byte_len = text.len();
        if let Some(NodeContent::Text(buffer)) = self.arena.get_mut(handle) {
            buffer.insert_str(offset, text);
        }

        for id in self.cursor_ids() {
            if id == cursor {
                continue;
            }
            if let Some(other) = self.state_mut(id) {
                if other.node == Some(handle) && other.offset >= offset {
                    other.offset += byte_len;
                }
            }
        }

        let new_offset = if prepend { offset } else { offset + byte_len };
        self.set_state(
            cursor,
            CursorState {
                node: Some(handle),
                offset: new_offset,
                eol: false,
            },
        );

        self.merge_with_neighbors(handle);
        self.touch();
    }

    /// Insert a format node at the cursor; the cursor retargets to it.
    pub fn append_format(&mut self, cursor: CursorId, directive: &str) {
        self.insert_format_at(cursor, directive, false);
    }

    /// Insert a format node at the cursor; the cursor stays after it.
    pub fn prepend_format(&mut self, cursor: CursorId, directive: &str) {
        self.insert_format_at(cursor, directive, true);
    }

    fn insert_format_at(&mut self, cursor: CursorId, directive: &str, prepend: bool) {
        let Some(state) = self.state(cursor) else {
            return;
        };
        let content = NodeContent::Format(directive.to_string());

        match state.node {
            None => {
                let created = self.arena.push_back(content);
                self.set_state(
                    cursor,
                    CursorState {
                        node: Some(created),
                        offset: 0,
                        eol: false,
                    },
                );
            }
            Some(handle) => {
                let node = self.arena.get(handle).cloned();
                match node {
                    Some(NodeContent::Format(_)) => {
                        let created = if prepend {
                            self.arena.insert_before(handle, content)
                        } else {
                            self.arena.insert_after(handle, content)
                        };
                        if !prepend {
                            self.set_state(
                                cursor,
                                CursorState {
                                    node: Some(created),
                                    offset: 0,
                                    eol: false,
                                },
                            );
                        }
                    }
                    Some(NodeContent::Text(text)) => {
                        let offset = align_boundary(&text, state.offset);
                        if offset == 0 {
                            let created = self.arena.insert_before(handle, content);
                            if !prepend {
                                self.set_state(
                                    cursor,
                                    CursorState {
                                        node: Some(created),
                                        offset: 0,
                                        eol: false,
                                    },
                                );
                            }
                        } else if offset == text.len() {
                            let created = self.arena.insert_after(handle, content);
                            let target = if prepend {
                                // Past the format node: whatever follows it,
                                // or the node itself at the document tail.
                                self.arena.next(created).unwrap_or(created)
                            } else {
                                created
                            };
                            self.set_state(
                                cursor,
                                CursorState {
                                    node: Some(target),
                                    offset: 0,
                                    eol: false,
                                },
                            );
                        } else {
                            // Split: head keeps [..offset], tail [offset..].
                            let tail = text[offset..].to_string();
                            if let Some(NodeContent::Text(buffer)) = self.arena.get_mut(handle) {
                                buffer.truncate(offset);
                            }
                            let created = self.arena.insert_after(handle, content);
                            let tail_handle =
                                self.arena.insert_after(created, NodeContent::Text(tail));

                            for id in self.cursor_ids() {
                                if let Some(other) = self.state_mut(id) {
                                    if other.node == Some(handle) && other.offset >= offset {
                                        other.node = Some(tail_handle);
                                        other.offset -= offset;
                                    }
                                }
                            }
                            let target = if prepend { tail_handle } else { created };
                            self.set_state(
                                cursor,
                                CursorState {
                                    node: Some(target),
                                    offset: 0,
                                    eol: false,
                                },
                            );
                        }
                    }
                    None => return,
                }
            }
        }
        self.touch();
    }

    // ------------------------------------------------------------------
    // Deletion

    /// Delete the cursor's node. Returns false when there is nothing to
    /// delete, or when the node is the document's sole remaining explicit
    /// newline directive (that degenerate terminal node is preserved).
    pub fn node_delete(&mut self, cursor: CursorId) -> bool {
        let Some(state) = self.state(cursor) else {
            return false;
        };
        let Some(handle) = state.node else {
            return false;
        };
        if self.arena.len() == 1 {
            if let Some(NodeContent::Format(f)) = self.arena.get(handle) {
                if is_newline_directive(f) {
                    return false;
                }
            }
        }

        let next = self.arena.next(handle);
        let prev = self.arena.prev(handle);
        self.arena.remove(handle);

        let new_state = if let Some(n) = next {
            CursorState {
                node: Some(n),
                offset: 0,
                eol: false,
            }
        } else if let Some(p) = prev {
            CursorState {
                node: Some(p),
                offset: self.node_end_offset(p),
                eol: false,
            }
        } else {
            CursorState::default()
        };

        self.set_state(cursor, new_state);
        for id in self.cursor_ids() {
            if id == cursor {
                continue;
            }
            if let Some(other) = self.state_mut(id) {
                if other.node == Some(handle) {
                    *other = new_state;
                }
            }
        }

        // Removing a format node can leave two text runs adjacent.
        if let (Some(p), Some(n)) = (prev, next) {
            if self.both_text(p, n) {
                self.merge_pair(p, n);
            }
        }
        self.touch();
        true
    }

    /// Delete one codepoint at the cursor. Deleting the last codepoint of
    /// a node removes the node; on a format node the whole node goes.
    pub fn char_delete(&mut self, cursor: CursorId) -> bool {
        let Some(state) = self.state(cursor) else {
            return false;
        };
        let Some(handle) = state.node else {
            return false;
        };
        let Some(content) = self.arena.get(handle) else {
            return false;
        };
        match content {
            NodeContent::Format(_) => self.node_delete(cursor),
            NodeContent::Text(text) => {
                let offset = align_boundary(text, state.offset);
                let Some(ch) = text[offset..].chars().next() else {
                    return false;
                };
                let ch_len = ch.len_utf8();
                if text.len() == ch_len {
                    return self.node_delete(cursor);
                }
                if let Some(NodeContent::Text(buffer)) = self.arena.get_mut(handle) {
                    buffer.drain(offset..offset + ch_len);
                }
                for id in self.cursor_ids() {
                    if let Some(other) = self.state_mut(id) {
                        if other.node == Some(handle) && other.offset > offset {
                            other.offset = other.offset.saturating_sub(ch_len).max(offset);
                        }
                    }
                }
                self.touch();
                true
            }
        }
    }

    /// Delete everything between two cursors (order-normalized, end
    /// exclusive).
    ///
    /// Push/pop balance is preserved: a push deleted without its pop takes
    /// the first unbalanced pop after the range with it, and a pop deleted
    /// without its push takes the nearest unbalanced push before the
    /// range. Afterwards every cursor sits at the merged deletion point.
    pub fn range_delete(&mut self, a: CursorId, b: CursorId) -> bool {
        let (Some(sa), Some(sb)) = (self.state(a), self.state(b)) else {
            return false;
        };
        if sa.node.is_none() || sb.node.is_none() {
            return false;
        }
        let (first, last) = match self.compare_states(sa, sb) {
            Ordering::Less => (sa, sb),
            Ordering::Greater => (sb, sa),
            Ordering::Equal => return false,
        };
        let h1 = first.node.expect("checked above");
        let h2 = last.node.expect("checked above");

        let merge_point = if h1 == h2 {
            self.range_delete_same_node(h1, first.offset, last.offset)
        } else {
            self.range_delete_cross_node(h1, first.offset, h2, last.offset)
        };
        let Some(merge_point) = merge_point else {
            return false;
        };

        // Every cursor collapses onto the merged deletion point; the heal
        // pass below rebases them if the point's node gets absorbed.
        for id in self.cursor_ids() {
            self.set_state(id, merge_point);
        }
        self.heal_adjacent_text();
        self.touch();
        true
    }

    fn range_delete_same_node(
        &mut self,
        handle: NodeHandle,
        off1: usize,
        off2: usize,
    ) -> Option<CursorState> {
        let text = self.arena.get(handle)?.as_text()?.to_string();
        let o1 = align_boundary(&text, off1);
        let o2 = align_boundary(&text, off2);
        if o1 >= o2 {
            return None;
        }
        if o1 == 0 && o2 == text.len() {
            return Some(self.remove_whole_node(handle));
        }
        if let Some(NodeContent::Text(buffer)) = self.arena.get_mut(handle) {
            buffer.drain(o1..o2);
        }
        Some(CursorState {
            node: Some(handle),
            offset: o1,
            eol: false,
        })
    }

    fn range_delete_cross_node(
        &mut self,
        h1: NodeHandle,
        off1: usize,
        h2: NodeHandle,
        off2: usize,
    ) -> Option<CursorState> {
        let before_range = self.arena.prev(h1);
        let after_h2 = self.arena.next(h2);

        // Pairing state for formats deleted inside the range.
        let mut pending_push = 0usize;
        let mut unmatched_pop = 0usize;
        let classify = |content: &NodeContent, pending: &mut usize, unpop: &mut usize| {
            if let NodeContent::Format(f) = content {
                if is_opener(f) {
                    *pending += 1;
                } else if is_closer(f) {
                    if *pending > 0 {
                        *pending -= 1;
                    } else {
                        *unpop += 1;
                    }
                }
            }
        };

        // Leading boundary.
        let h1_removed = match self.arena.get(h1)? {
            NodeContent::Text(text) => {
                let o1 = align_boundary(text, off1);
                if o1 == 0 {
                    let content = self.arena.remove(h1)?;
                    classify(&content, &mut pending_push, &mut unmatched_pop);
                    true
                } else {
                    if let Some(NodeContent::Text(buffer)) = self.arena.get_mut(h1) {
                        buffer.truncate(o1);
                    }
                    false
                }
            }
            NodeContent::Format(_) => {
                let content = self.arena.remove(h1)?;
                classify(&content, &mut pending_push, &mut unmatched_pop);
                true
            }
        };

        // Whole nodes strictly between the boundaries.
        let mut walk = if h1_removed {
            // h1 is gone; resume from the node that followed it.
            if let Some(b) = before_range {
                self.arena.next(b)
            } else {
                self.arena.first()
            }
        } else {
            self.arena.next(h1)
        };
        while let Some(h) = walk {
            if h == h2 {
                break;
            }
            let next = self.arena.next(h);
            let content = self.arena.remove(h)?;
            classify(&content, &mut pending_push, &mut unmatched_pop);
            walk = next;
        }

        // Trailing boundary: the end cursor is exclusive, so a format node
        // it rests on stays.
        let h2_removed = match self.arena.get(h2)? {
            NodeContent::Text(text) => {
                let o2 = align_boundary(text, off2);
                if o2 >= text.len() {
                    self.arena.remove(h2)?;
                    true
                } else {
                    if o2 > 0 {
                        if let Some(NodeContent::Text(buffer)) = self.arena.get_mut(h2) {
                            buffer.drain(..o2);
                        }
                        // Cursor offsets into h2 are rebased by the final
                        // collapse, so nothing to shift here.
                    }
                    false
                }
            }
            NodeContent::Format(_) => false,
        };

        let mut after = if h2_removed { after_h2 } else { Some(h2) };
        let mut before = if h1_removed { before_range } else { Some(h1) };

        // A deleted push whose pop survived: remove the first unbalanced
        // pop after the range.
        while pending_push > 0 {
            pending_push -= 1;
            let mut depth = 0usize;
            let mut scan = after;
            let mut removed = false;
            while let Some(h) = scan {
                let next = self.arena.next(h);
                if let Some(NodeContent::Format(f)) = self.arena.get(h) {
                    if is_opener(f) {
                        depth += 1;
                    } else if is_closer(f) {
                        if depth == 0 {
                            if after == Some(h) {
                                after = next;
                            }
                            self.arena.remove(h);
                            removed = true;
                            break;
                        }
                        depth -= 1;
                    }
                }
                scan = next;
            }
            if !removed {
                break;
            }
        }

        // A deleted pop whose push survived: remove the nearest unbalanced
        // push before the range.
        while unmatched_pop > 0 {
            unmatched_pop -= 1;
            let mut depth = 0usize;
            let mut scan = before;
            let mut removed = false;
            while let Some(h) = scan {
                let prev = self.arena.prev(h);
                if let Some(NodeContent::Format(f)) = self.arena.get(h) {
                    if is_closer(f) {
                        depth += 1;
                    } else if is_opener(f) {
                        if depth == 0 {
                            if before == Some(h) {
                                before = prev;
                            }
                            self.arena.remove(h);
                            removed = true;
                            break;
                        }
                        depth -= 1;
                    }
                }
                scan = prev;
            }
            if !removed {
                break;
            }
        }

        let merge_point = if !h1_removed {
            let offset = self.node_end_offset(h1);
            CursorState {
                node: Some(h1),
                offset,
                eol: false,
            }
        } else if let Some(h) = after {
            CursorState {
                node: Some(h),
                offset: 0,
                eol: false,
            }
        } else if let Some(h) = before {
            CursorState {
                node: Some(h),
                offset: self.node_end_offset(h),
                eol: false,
            }
        } else {
            CursorState::default()
        };
        Some(merge_point)
    }

    // ------------------------------------------------------------------
    // Shared helpers

    fn node_end_offset(&self, handle: NodeHandle) -> usize {
        match self.arena.get(handle) {
            Some(NodeContent::Text(text)) => text.len(),
            _ => 0,
        }
    }

    fn both_text(&self, a: NodeHandle, b: NodeHandle) -> bool {
        self.arena.get(a).is_some_and(NodeContent::is_text)
            && self.arena.get(b).is_some_and(NodeContent::is_text)
    }

    /// Remove a node and produce the re-homed cursor state for positions
    /// that referenced it.
    fn remove_whole_node(&mut self, handle: NodeHandle) -> CursorState {
        let next = self.arena.next(handle);
        let prev = self.arena.prev(handle);
        self.arena.remove(handle);
        if let Some(n) = next {
            CursorState {
                node: Some(n),
                offset: 0,
                eol: false,
            }
        } else if let Some(p) = prev {
            CursorState {
                node: Some(p),
                offset: self.node_end_offset(p),
                eol: false,
            }
        } else {
            CursorState::default()
        }
    }

    /// Fold `handle` into adjacent text neighbors, keeping cursors
    /// consistent. Returns the surviving handle.
    pub(crate) fn merge_with_neighbors(&mut self, handle: NodeHandle) -> NodeHandle {
        let mut handle = handle;
        if !self.arena.get(handle).is_some_and(NodeContent::is_text) {
            return handle;
        }
        if let Some(prev) = self.arena.prev(handle) {
            if self.arena.get(prev).is_some_and(NodeContent::is_text) {
                handle = self.merge_pair(prev, handle);
            }
        }
        if let Some(next) = self.arena.next(handle) {
            if self.arena.get(next).is_some_and(NodeContent::is_text) {
                handle = self.merge_pair(handle, next);
            }
        }
        handle
    }

    /// Absorb `right` into `left` (both text), retargeting cursors from
    /// the absorbed node with rebased offsets.
    fn merge_pair(&mut self, left: NodeHandle, right: NodeHandle) -> NodeHandle {
        let Some(NodeContent::Text(right_text)) = self.arena.remove(right) else {
            return left;
        };
        let left_len = self.node_end_offset(left);
        if let Some(NodeContent::Text(buffer)) = self.arena.get_mut(left) {
            buffer.push_str(&right_text);
        }
        for id in self.cursor_ids() {
            if let Some(state) = self.state_mut(id) {
                if state.node == Some(right) {
                    state.node = Some(left);
                    state.offset += left_len;
                }
            }
        }
        left
    }

    /// Merge every adjacent text pair in the document (used after bulk
    /// removals).
    fn heal_adjacent_text(&mut self) {
        let mut walk = self.arena.first();
        while let Some(h) = walk {
            match self.arena.next(h) {
                Some(n) if self.both_text(h, n) => {
                    // Stay on `h`; it may now adjoin another text node.
                    self.merge_pair(h, n);
                }
                next => walk = next,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(markupless_nodes: &[(&str, bool)]) -> Document {
        // (content, is_text)
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        for (content, is_text) in markupless_nodes {
            if *is_text {
                doc.append_text(cur, content);
            } else {
                doc.append_format(cur, content);
            }
        }
        doc
    }

    fn node_strings(doc: &Document) -> Vec<String> {
        doc.nodes()
            .map(|(_, n)| match n {
                NodeContent::Text(t) => format!("T:{t}"),
                NodeContent::Format(f) => format!("F:{f}"),
            })
            .collect()
    }

    #[test]
    fn test_append_text_merges_runs() {
        let doc = doc_with(&[("Hello", true), (" world", true)]);
        assert_eq!(node_strings(&doc), vec!["T:Hello world"]);
    }

    #[test]
    fn test_append_format_after_text() {
        let doc = doc_with(&[("Hi", true), ("+ push style=bold", false), ("yo", true)]);
        assert_eq!(
            node_strings(&doc),
            vec!["T:Hi", "F:+ push style=bold", "T:yo"]
        );
    }

    #[test]
    fn test_append_advances_cursor() {
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.append_text(cur, "Hello");
        assert_eq!(doc.cursor_offset(cur), 5);
        doc.append_text(cur, " world");
        assert_eq!(node_strings(&doc), vec!["T:Hello world"]);
        assert_eq!(doc.cursor_offset(cur), 11);
    }

    #[test]
    fn test_prepend_stays_at_insertion_point() {
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.prepend_text(cur, "world");
        assert_eq!(doc.cursor_offset(cur), 0);
        doc.prepend_text(cur, "Hello ");
        assert_eq!(node_strings(&doc), vec!["T:Hello world"]);
        assert_eq!(doc.cursor_offset(cur), 0);
    }

    #[test]
    fn test_format_split_preserves_content() {
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.prepend_text(cur, "Hello world");
        // Park mid-node, before "world".
        let mid = doc.cursor_new();
        doc.cursor_node_first(mid);
        for _ in 0..6 {
            doc.cursor_char_next(mid);
        }
        doc.append_format(mid, "+ push style=bold");
        assert_eq!(
            node_strings(&doc),
            vec!["T:Hello ", "F:+ push style=bold", "T:world"]
        );
        // Acting cursor retargets to the format node on append.
        assert_eq!(doc.cursor_node_format(mid), Some("+ push style=bold"));
    }

    #[test]
    fn test_split_rehomes_later_cursors() {
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.prepend_text(cur, "abcdef");
        let late = doc.cursor_new();
        doc.cursor_node_first(late);
        for _ in 0..5 {
            doc.cursor_char_next(late);
        }
        assert_eq!(doc.cursor_offset(late), 5);

        let mid = doc.cursor_new();
        doc.cursor_node_first(mid);
        for _ in 0..3 {
            doc.cursor_char_next(mid);
        }
        doc.append_format(mid, "\\n");

        // `late` pointed at 'f' (offset 5); now the tail node holds "def"
        // and the cursor must sit at its 'f' (offset 2).
        assert_eq!(doc.cursor_node_text(late), Some("def"));
        assert_eq!(doc.cursor_offset(late), 2);
    }

    #[test]
    fn test_multi_cursor_insert_shift() {
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.prepend_text(cur, "abcd");

        let c_before = doc.cursor_new();
        doc.cursor_node_first(c_before);
        doc.cursor_char_next(c_before); // offset 1

        let c_at = doc.cursor_new();
        doc.cursor_node_first(c_at);
        doc.cursor_char_next(c_at);
        doc.cursor_char_next(c_at); // offset 2

        let c_after = doc.cursor_new();
        doc.cursor_node_first(c_after);
        for _ in 0..3 {
            doc.cursor_char_next(c_after); // offset 3
        }

        // Insert "XY" at offset 2 via a fresh cursor.
        let ins = doc.cursor_new();
        doc.cursor_node_first(ins);
        doc.cursor_char_next(ins);
        doc.cursor_char_next(ins);
        doc.append_text(ins, "XY");

        assert_eq!(doc.cursor_node_text(ins), Some("abXYcd"));
        assert_eq!(doc.cursor_offset(c_before), 1, "cursor before insertion unmoved");
        assert_eq!(doc.cursor_offset(c_at), 4, "cursor at insertion point shifts");
        assert_eq!(doc.cursor_offset(c_after), 5, "cursor after insertion shifts");
        assert_eq!(doc.cursor_offset(ins), 4, "inserting cursor ends after the text");
    }

    #[test]
    fn test_char_delete_shifts_cursors() {
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.prepend_text(cur, "abcd");

        let tail = doc.cursor_new();
        doc.cursor_node_first(tail);
        for _ in 0..3 {
            doc.cursor_char_next(tail);
        }

        let del = doc.cursor_new();
        doc.cursor_node_first(del);
        doc.cursor_char_next(del); // at 'b'
        assert!(doc.char_delete(del));

        assert_eq!(doc.cursor_node_text(del), Some("acd"));
        assert_eq!(doc.cursor_offset(tail), 2);
    }

    #[test]
    fn test_char_delete_empties_node() {
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.append_text(cur, "a");
        doc.append_format(cur, "\\n");
        let first = doc.cursor_new();
        doc.cursor_node_first(first);
        assert!(doc.char_delete(first));
        assert_eq!(node_strings(&doc), vec!["F:\\n"]);
        assert_eq!(doc.cursor_node_format(first), Some("\\n"));
    }

    #[test]
    fn test_node_delete_rehomes_all_cursors() {
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.append_text(cur, "one");
        doc.append_format(cur, "\\n");
        doc.append_text(cur, "two");

        let other = doc.cursor_new();
        doc.cursor_node_first(other);
        doc.cursor_node_next(other); // on the format node
        let del = doc.cursor_new();
        doc.cursor_node_first(del);
        doc.cursor_node_next(del);

        assert!(doc.node_delete(del));
        // Text nodes merged around the removed format node.
        assert_eq!(node_strings(&doc), vec!["T:onetwo"]);
        // Both cursors re-homed to the junction.
        assert_eq!(doc.cursor_offset(del), 3);
        assert_eq!(doc.cursor_offset(other), 3);
    }

    #[test]
    fn test_node_delete_refuses_sole_newline() {
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.append_format(cur, "\\n");
        assert!(!doc.node_delete(cur));
        assert_eq!(doc.node_count(), 1);
    }

    #[test]
    fn test_range_delete_same_node() {
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.prepend_text(cur, "Hello world");

        let a = doc.cursor_new();
        doc.cursor_node_first(a);
        for _ in 0..5 {
            doc.cursor_char_next(a);
        }
        let b = doc.cursor_new();
        doc.cursor_node_first(b);
        for _ in 0..11 {
            doc.cursor_char_next(b);
        }
        assert!(doc.range_delete(a, b));
        assert_eq!(node_strings(&doc), vec!["T:Hello"]);
        assert_eq!(doc.cursor_offset(a), 5);
        assert_eq!(doc.cursor_offset(b), 5);
    }

    #[test]
    fn test_range_delete_cross_node_merges_boundaries() {
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.append_text(cur, "Hello ");
        doc.append_format(cur, "\\n");
        doc.append_text(cur, "big ");
        doc.append_format(cur, "\\n");
        doc.append_text(cur, "world");

        // From after "Hel" to before "rld".
        let a = doc.cursor_new();
        doc.cursor_node_first(a);
        for _ in 0..3 {
            doc.cursor_char_next(a);
        }
        let b = doc.cursor_new();
        doc.cursor_node_last(b); // parks on 'd' of "world"
        doc.cursor_char_prev(b);
        doc.cursor_char_prev(b);
        assert_eq!(doc.cursor_offset(b), 2);

        assert!(doc.range_delete(a, b));
        assert_eq!(node_strings(&doc), vec!["T:Helrld"]);
        assert_eq!(doc.cursor_offset(a), 3);
    }

    #[test]
    fn test_range_delete_balances_dangling_pop() {
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.append_text(cur, "aa");
        doc.append_format(cur, "+ push style=bold");
        doc.append_text(cur, "bb");
        doc.append_format(cur, "- pop");
        doc.append_text(cur, "cc");

        // Delete from the start through the middle of "bb": the push goes,
        // so the surviving pop must go too.
        let a = doc.cursor_new();
        doc.cursor_node_first(a);
        let b = doc.cursor_new();
        doc.cursor_node_first(b);
        doc.cursor_node_next(b);
        doc.cursor_node_next(b);
        doc.cursor_char_next(b); // "b|b"

        assert!(doc.range_delete(a, b));
        assert_eq!(node_strings(&doc), vec!["T:bcc"]);
    }

    #[test]
    fn test_range_delete_balances_dangling_push() {
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.append_text(cur, "aa");
        doc.append_format(cur, "+ push style=bold");
        doc.append_text(cur, "bb");
        doc.append_format(cur, "- pop");
        doc.append_text(cur, "cc");

        // Delete from the middle of "bb" to the middle of "cc": the pop
        // goes, so the now-unmatched push before the range goes too.
        let a = doc.cursor_new();
        doc.cursor_node_first(a);
        doc.cursor_node_next(a);
        doc.cursor_node_next(a);
        doc.cursor_char_next(a);
        let b = doc.cursor_new();
        doc.cursor_node_last(b); // parks on the second 'c' of "cc"
        assert_eq!(doc.cursor_offset(b), 1);

        assert!(doc.range_delete(a, b));
        assert_eq!(node_strings(&doc), vec!["T:aabc"]);
    }

    #[test]
    fn test_range_delete_keeps_balanced_pairs_outside() {
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.append_format(cur, "+ push style=bold");
        doc.append_text(cur, "keep");
        doc.append_format(cur, "- pop");
        doc.append_text(cur, "drop");

        let a = doc.cursor_new();
        doc.cursor_node_last(a);
        doc.cursor_char_first(a);
        let b = doc.cursor_new();
        doc.cursor_node_last(b);
        for _ in 0..4 {
            doc.cursor_char_next(b);
        }
        assert!(doc.range_delete(a, b));
        assert_eq!(
            node_strings(&doc),
            vec!["F:+ push style=bold", "T:keep", "F:- pop"]
        );
    }

    #[test]
    fn test_compare_orders_by_node_then_offset_then_eol() {
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.append_text(cur, "ab");
        doc.append_format(cur, "\\n");
        doc.append_text(cur, "cd");

        let a = doc.cursor_new();
        doc.cursor_node_first(a);
        let b = doc.cursor_new();
        doc.cursor_node_first(b);
        doc.cursor_char_next(b);
        assert_eq!(doc.cursor_compare(a, b), Ordering::Less);

        let c = doc.cursor_new();
        doc.cursor_node_last(c);
        assert_eq!(doc.cursor_compare(b, c), Ordering::Less);

        // Same position: the eol cursor sorts after.
        doc.cursor_copy(a, b);
        doc.cursor_set_eol(b, true);
        assert_eq!(doc.cursor_compare(a, b), Ordering::Less);
        assert_eq!(doc.cursor_compare(b, a), Ordering::Greater);
    }

    #[test]
    fn test_char_navigation_crosses_nodes() {
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.append_text(cur, "ab");
        doc.append_format(cur, "\\n");
        doc.append_text(cur, "cd");

        let c = doc.cursor_new();
        doc.cursor_node_first(c);
        assert!(doc.cursor_char_next(c)); // 'b'
        assert!(doc.cursor_char_next(c)); // format node
        assert!(doc.cursor_node_format(c).is_some());
        assert!(doc.cursor_char_next(c)); // 'c'
        assert_eq!(doc.cursor_node_text(c), Some("cd"));
        assert!(doc.cursor_char_prev(c));
        assert!(doc.cursor_node_format(c).is_some());
        assert!(doc.cursor_char_prev(c));
        assert_eq!(doc.cursor_offset(c), 1);
    }

    #[test]
    fn test_multibyte_stepping() {
        let mut doc = Document::new();
        let cur = doc.primary_cursor();
        doc.prepend_text(cur, "aé中b");

        let c = doc.cursor_new();
        doc.cursor_node_first(c);
        assert!(doc.cursor_char_next(c));
        assert_eq!(doc.cursor_offset(c), 1);
        assert!(doc.cursor_char_next(c));
        assert_eq!(doc.cursor_offset(c), 3); // é is 2 bytes
        assert!(doc.cursor_char_next(c));
        assert_eq!(doc.cursor_offset(c), 6); // 中 is 3 bytes
    }
}
