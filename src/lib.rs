//! Textblock - rich-text document model and layout engine
//!
//! A markup dialect is decoded into an editable document of text runs and
//! format directives, formatting state is resolved through a push/pop
//! stack, and a line-breaking layout pass produces pixel-positioned runs
//! for an external renderer. Font metrics and glyph drawing stay behind
//! the [`FontFace`]/[`FontProvider`] traits; the core never rasterizes.
//!
//! # Examples
//!
//! ```
//! use std::rc::Rc;
//! use textblock::{FixedAdvance, Stylesheet, Textblock};
//!
//! let style = Rc::new(Stylesheet::from_text(
//!     "DEFAULT='push font=Vera font_size=10 color=#000000' \
//!      b='push style=bold' br='\\n' w='push wrap=word'",
//! ));
//!
//! let mut tb = Textblock::new(Rc::new(FixedAdvance::default()));
//! tb.set_style(Some(style));
//! tb.markup_set(Some("<w>Hello <b>rich</b> world</w>"));
//!
//! tb.set_size(Some((60, 200)));
//! assert!(tb.line_count().unwrap() > 1);
//! ```

// Crate-level lint configuration
#![warn(unsafe_code)]
#![allow(dead_code)] // Public API functions not yet used internally
#![allow(clippy::cast_possible_truncation)] // Intentional coordinate casts
#![allow(clippy::cast_sign_loss)] // Intentional coordinate conversions
#![allow(clippy::cast_precision_loss)] // Intentional for alignment math
#![allow(clippy::module_name_repetitions)] // Allow Format::FormatToken etc
#![allow(clippy::missing_errors_doc)] // Docs WIP
#![allow(clippy::missing_panics_doc)] // Docs WIP
#![allow(clippy::collapsible_if)] // Sometimes nested ifs are clearer
#![allow(clippy::items_after_statements)] // Common pattern in tests

pub mod color;
pub mod document;
pub mod error;
pub mod event;
pub mod font;
pub mod format;
mod geometry;
pub mod layout;
mod markup;
pub mod stylesheet;
pub mod textblock;

// Re-export core types at crate root
pub use color::Rgba;
pub use document::{CursorId, Document, NodeContent, NodeHandle};
pub use error::{Error, Result};
pub use event::{LogLevel, emit_log, set_log_callback};
pub use font::{FixedAdvance, FontFace, FontProvider, FontSpec, Rect};
pub use format::{
    Decorations, Ellipsis, Format, FormatStack, ItemVSize, TextStyle, WrapMode,
};
pub use layout::{FormatItem, FormatItemKind, Insets, Item, Layout, Line};
pub use stylesheet::Stylesheet;
pub use textblock::Textblock;
