//! Error types for textblock.

use std::fmt;

use crate::font::FontSpec;

/// Result type alias for textblock operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for textblock operations.
///
/// Parse problems never surface here: malformed markup, style entries, and
/// unknown format commands degrade to literal text or inert directives and
/// are reported through the log callback instead. Only resource failures
/// (font loading) reach the caller as errors.
#[derive(Debug)]
pub enum Error {
    /// The font provider could not load a face for the given spec.
    FontLoad { spec: FontSpec, reason: String },
    /// A layout query ran with no usable font face on the format stack.
    NoFace,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FontLoad { spec, reason } => {
                write!(f, "font load failed for {}@{}: {reason}", spec.name, spec.size)
            }
            Self::NoFace => write!(f, "no font face available for layout"),
        }
    }
}

impl std::error::Error for Error {}
