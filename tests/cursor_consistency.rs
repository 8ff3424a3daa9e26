//! Multi-cursor consistency under structural edits.
//!
//! Whatever sequence of edits runs, every live cursor must keep pointing
//! at a live node with an in-bounds offset, and the document must never
//! hold two adjacent text nodes.

use proptest::prelude::*;
use textblock::{CursorId, Document};

fn assert_invariants(doc: &Document, cursors: &[CursorId]) {
    // No two adjacent text nodes.
    let mut prev_was_text = false;
    for (_, node) in doc.nodes() {
        assert!(
            !(prev_was_text && node.is_text()),
            "adjacent text nodes survived an edit"
        );
        prev_was_text = node.is_text();
    }
    // Every cursor offset stays in bounds on a char boundary. Stale node
    // handles are caught by Document's own debug assertions.
    for &cur in cursors {
        if let Some(text) = doc.cursor_node_text(cur) {
            let offset = doc.cursor_offset(cur);
            assert!(offset <= text.len(), "cursor offset out of bounds");
            assert!(text.is_char_boundary(offset), "cursor off a char boundary");
        }
    }
}

#[test]
fn insert_shifts_only_trailing_cursors_by_byte_length() {
    let mut doc = Document::new();
    let main = doc.primary_cursor();
    doc.prepend_text(main, "hello world");

    // One cursor per interesting offset.
    let offsets = [0usize, 4, 6, 11];
    let cursors: Vec<CursorId> = offsets
        .iter()
        .map(|&target| {
            let cur = doc.cursor_new();
            doc.cursor_node_first(cur);
            for _ in 0..target {
                doc.cursor_char_next(cur);
            }
            assert_eq!(doc.cursor_offset(cur), target);
            cur
        })
        .collect();

    // Insert "ABC" (3 bytes) at offset 6 via a separate cursor.
    let ins = doc.cursor_new();
    doc.cursor_node_first(ins);
    for _ in 0..6 {
        doc.cursor_char_next(ins);
    }
    doc.append_text(ins, "ABC");
    assert_eq!(doc.cursor_node_text(main), Some("hello ABCworld"));

    let expected = [0usize, 4, 9, 14];
    for (cur, want) in cursors.iter().zip(expected) {
        assert_eq!(doc.cursor_offset(*cur), want);
    }
}

#[test]
fn multibyte_insert_shifts_by_bytes_not_chars() {
    let mut doc = Document::new();
    let main = doc.primary_cursor();
    doc.prepend_text(main, "abcd");

    let tail = doc.cursor_new();
    doc.cursor_node_first(tail);
    for _ in 0..3 {
        doc.cursor_char_next(tail);
    }

    let ins = doc.cursor_new();
    doc.cursor_node_first(ins);
    doc.cursor_char_next(ins);
    doc.append_text(ins, "é中"); // 2 + 3 bytes

    assert_eq!(doc.cursor_node_text(main), Some("aé中bcd"));
    assert_eq!(doc.cursor_offset(tail), 8);
}

#[test]
fn range_delete_takes_dangling_pop_with_the_push() {
    let mut doc = Document::new();
    let cur = doc.primary_cursor();
    doc.append_text(cur, "keep ");
    doc.append_format(cur, "+ push style=bold");
    doc.append_text(cur, "bold");
    doc.append_format(cur, "- pop");
    doc.append_text(cur, " tail");

    // Range covering the push but not the pop.
    let a = doc.cursor_new();
    doc.cursor_node_first(a);
    for _ in 0..2 {
        doc.cursor_char_next(a); // "ke|ep "
    }
    let b = doc.cursor_new();
    doc.cursor_node_first(b);
    doc.cursor_node_next(b);
    doc.cursor_node_next(b);
    doc.cursor_char_next(b); // "b|old"

    assert!(doc.range_delete(a, b));

    // The surviving pop was deleted too: the format stack stays balanced.
    let formats: Vec<&str> = doc
        .nodes()
        .filter_map(|(_, n)| n.as_format())
        .collect();
    assert!(formats.is_empty(), "unbalanced formats left: {formats:?}");
    let texts: Vec<&str> = doc.nodes().filter_map(|(_, n)| n.as_text()).collect();
    assert_eq!(texts, vec!["keold tail"]);
}

#[test]
fn range_delete_collapses_other_cursors_to_merge_point() {
    let mut doc = Document::new();
    let cur = doc.primary_cursor();
    doc.append_text(cur, "one two three");

    let bystander = doc.cursor_new();
    doc.cursor_node_first(bystander);
    for _ in 0..10 {
        doc.cursor_char_next(bystander);
    }

    let a = doc.cursor_new();
    doc.cursor_node_first(a);
    for _ in 0..3 {
        doc.cursor_char_next(a);
    }
    let b = doc.cursor_new();
    doc.cursor_node_first(b);
    for _ in 0..7 {
        doc.cursor_char_next(b);
    }
    assert!(doc.range_delete(a, b));

    assert_eq!(doc.cursor_node_text(cur), Some("one three"));
    assert_eq!(doc.cursor_offset(a), 3);
    assert_eq!(doc.cursor_offset(b), 3);
    assert_eq!(doc.cursor_offset(bystander), 3, "bystanders collapse too");
}

#[test]
fn sole_newline_format_node_survives_delete() {
    let mut doc = Document::new();
    let cur = doc.primary_cursor();
    doc.append_format(cur, "\\n");
    assert!(!doc.node_delete(cur));
    assert!(!doc.char_delete(cur));
    assert_eq!(doc.node_count(), 1);
}

// ---------------------------------------------------------------------------
// Properties

#[derive(Clone, Debug)]
enum EditOp {
    AppendText(String),
    AppendFormat(u8),
    Navigate { cursor: u8, steps: u8 },
    CharDelete(u8),
    NodeDelete(u8),
    RangeDelete(u8, u8),
}

fn edit_ops() -> impl Strategy<Value = Vec<EditOp>> {
    let op = prop_oneof![
        4 => "[a-z é]{1,6}".prop_map(EditOp::AppendText),
        2 => (0u8..3).prop_map(EditOp::AppendFormat),
        3 => (0u8..4, 0u8..12).prop_map(|(cursor, steps)| EditOp::Navigate { cursor, steps }),
        2 => (0u8..4).prop_map(EditOp::CharDelete),
        1 => (0u8..4).prop_map(EditOp::NodeDelete),
        1 => (0u8..4, 0u8..4).prop_map(|(a, b)| EditOp::RangeDelete(a, b)),
    ];
    prop::collection::vec(op, 0..24)
}

proptest! {
    /// Random edit storms never break the structural invariants. The
    /// debug assertions inside Document fire on violation as well.
    #[test]
    fn prop_edit_storm_keeps_invariants(ops in edit_ops()) {
        let formats = ["+ push style=bold", "- pop", "\\n"];
        let mut doc = Document::new();
        let cursors: Vec<CursorId> = (0..4)
            .map(|i| if i == 0 { doc.primary_cursor() } else { doc.cursor_new() })
            .collect();

        for op in ops {
            match op {
                EditOp::AppendText(text) => {
                    doc.append_text(cursors[0], &text);
                }
                EditOp::AppendFormat(which) => {
                    doc.append_format(cursors[0], formats[which as usize % formats.len()]);
                }
                EditOp::Navigate { cursor, steps } => {
                    let cur = cursors[cursor as usize % cursors.len()];
                    doc.cursor_node_first(cur);
                    for _ in 0..steps {
                        doc.cursor_char_next(cur);
                    }
                }
                EditOp::CharDelete(cursor) => {
                    doc.char_delete(cursors[cursor as usize % cursors.len()]);
                }
                EditOp::NodeDelete(cursor) => {
                    doc.node_delete(cursors[cursor as usize % cursors.len()]);
                }
                EditOp::RangeDelete(a, b) => {
                    let ca = cursors[a as usize % cursors.len()];
                    let cb = cursors[b as usize % cursors.len()];
                    if ca != cb {
                        doc.range_delete(ca, cb);
                    }
                }
            }
            assert_invariants(&doc, &cursors);
        }
    }

    /// Inserting L bytes shifts cursors at/after the insertion point on
    /// the same node by exactly L, and leaves earlier cursors alone.
    #[test]
    fn prop_insert_shift_is_exact(
        text in "[a-z]{2,12}",
        insert in "[A-Z]{1,5}",
        at in 0usize..12,
        probe in 0usize..12,
    ) {
        let mut doc = Document::new();
        let main = doc.primary_cursor();
        doc.prepend_text(main, &text);
        let at = at.min(text.len());
        let probe_at = probe.min(text.len());

        let probe_cur = doc.cursor_new();
        doc.cursor_node_first(probe_cur);
        for _ in 0..probe_at {
            doc.cursor_char_next(probe_cur);
        }

        let ins = doc.cursor_new();
        doc.cursor_node_first(ins);
        for _ in 0..at {
            doc.cursor_char_next(ins);
        }
        doc.append_text(ins, &insert);

        let expected = if probe_at >= at {
            probe_at + insert.len()
        } else {
            probe_at
        };
        prop_assert_eq!(doc.cursor_offset(probe_cur), expected);
    }
}
