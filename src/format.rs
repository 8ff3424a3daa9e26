//! Resolved formatting state and the push/pop format stack.
//!
//! A [`Format`] is the fully resolved visual snapshot a text run is drawn
//! with: font identity and loaded face, color slots, alignment, margins,
//! decoration flags, wrap/ellipsis behavior, line sizing. Snapshots are
//! shared as `Rc<Format>` — the stack duplicates its top on push, layout
//! items keep references to the snapshot they were measured with, and the
//! loaded font face is released when the last referencing snapshot drops.
//!
//! Format *directives* (the strings carried by Format nodes) are
//! space-separated tokens: an optional `+ `/`- ` marker, an optional
//! `push`/`pop` verb, then `key=value` commands or the reserved literals
//! `\n`, `\t`, and `item ...`. Quotes and spaces inside a token are
//! backslash-escaped.

use std::rc::Rc;

use bitflags::bitflags;

use crate::color::Rgba;
use crate::error::Result;
use crate::event::parse_warning;
use crate::font::{FontFace, FontProvider, FontSpec};

bitflags! {
    /// Text decoration flags.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    pub struct Decorations: u8 {
        /// Single underline.
        const UNDERLINE     = 0x01;
        /// Second underline (drawn below the first).
        const UNDERLINE2    = 0x02;
        /// Strikethrough line.
        const STRIKETHROUGH = 0x04;
        /// Filled backing rectangle behind the run.
        const BACKING       = 0x08;
    }
}

/// Line wrapping behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WrapMode {
    /// No wrapping.
    #[default]
    None,
    /// Wrap at word boundaries, falling back to whole-word overflow.
    Word,
    /// Wrap at codepoint boundaries.
    Char,
}

/// Ellipsis truncation mode. Mutually exclusive with wrapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Ellipsis {
    /// No truncation.
    #[default]
    None,
    /// Keep the tail, elide the head.
    Left,
    /// Keep the head, elide the tail.
    Right,
}

/// Decoration style of the rendered glyphs.
///
/// Each style implies a static pixel inset the renderer needs around the
/// text; layout discovers the largest inset in use and pads accordingly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextStyle {
    #[default]
    Plain,
    Shadow,
    Outline,
    SoftOutline,
    Glow,
    OutlineShadow,
    FarShadow,
    OutlineSoftShadow,
    SoftShadow,
    FarSoftShadow,
}

impl TextStyle {
    /// Static `(left, right, top, bottom)` pixel inset this style needs.
    #[must_use]
    pub const fn pad(self) -> (i32, i32, i32, i32) {
        match self {
            Self::Plain => (0, 0, 0, 0),
            Self::Shadow => (0, 1, 0, 1),
            Self::Outline => (1, 1, 1, 1),
            Self::SoftOutline => (2, 2, 2, 2),
            Self::Glow => (2, 2, 2, 2),
            Self::OutlineShadow => (1, 2, 1, 2),
            Self::FarShadow => (0, 2, 0, 2),
            Self::OutlineSoftShadow => (1, 3, 1, 3),
            Self::SoftShadow => (0, 3, 0, 3),
            Self::FarSoftShadow => (0, 4, 0, 4),
        }
    }
}

/// Vertical alignment value meaning "sit on the common baseline".
pub const VALIGN_BASELINE: f32 = -1.0;

/// A resolved format snapshot.
#[derive(Clone, Debug)]
pub struct Format {
    /// Font identity (the pooling key).
    pub font: FontSpec,
    /// Loaded face, if `font` has been resolved.
    pub face: Option<Rc<dyn FontFace>>,
    /// Identity `face` was loaded for; reload fires only when `font`
    /// diverges from this.
    loaded_spec: Option<FontSpec>,

    /// Text color.
    pub color: Rgba,
    pub underline_color: Rgba,
    pub underline2_color: Rgba,
    pub outline_color: Rgba,
    pub shadow_color: Rgba,
    pub glow_color: Rgba,
    pub glow2_color: Rgba,
    pub backing_color: Rgba,
    pub strikethrough_color: Rgba,

    /// Horizontal alignment: 0.0 left .. 1.0 right.
    pub halign: f32,
    /// Vertical alignment: 0.0 top .. 1.0 bottom, [`VALIGN_BASELINE`] for
    /// baseline alignment.
    pub valign: f32,
    pub wrap: WrapMode,
    pub margin_left: i32,
    pub margin_right: i32,
    pub decorations: Decorations,
    pub style: TextStyle,
    /// Tab stop interval in pixels.
    pub tabstops: i32,
    /// Absolute line height override (0 = computed).
    pub linesize: i32,
    /// Relative line height multiplier.
    pub linerelsize: Option<f32>,
    /// Extra pixels advanced after each line.
    pub linegap: i32,
    /// Relative extra advance, as a fraction of the line height.
    pub linerelgap: Option<f32>,
    /// Line height as a fraction of the layout height.
    pub linefill: Option<f32>,
    pub ellipsis: Ellipsis,
    pub ellipsis_symbol: String,
}

impl Default for Format {
    fn default() -> Self {
        Self {
            font: FontSpec::default(),
            face: None,
            loaded_spec: None,
            color: Rgba::WHITE,
            underline_color: Rgba::WHITE,
            underline2_color: Rgba::WHITE,
            outline_color: Rgba::TRANSPARENT,
            shadow_color: Rgba::TRANSPARENT,
            glow_color: Rgba::TRANSPARENT,
            glow2_color: Rgba::TRANSPARENT,
            backing_color: Rgba::TRANSPARENT,
            strikethrough_color: Rgba::WHITE,
            halign: 0.0,
            valign: VALIGN_BASELINE,
            wrap: WrapMode::None,
            margin_left: 0,
            margin_right: 0,
            decorations: Decorations::empty(),
            style: TextStyle::Plain,
            tabstops: 32,
            linesize: 0,
            linerelsize: None,
            linegap: 0,
            linerelgap: None,
            linefill: None,
            ellipsis: Ellipsis::None,
            ellipsis_symbol: "...".to_string(),
        }
    }
}

impl Format {
    /// Apply a single `key=value` command. Unknown keys and unparsable
    /// values are logged and ignored.
    pub fn apply_command(&mut self, key: &str, value: &str) {
        match key {
            "font" => self.font.name = value.to_string(),
            "font_fallbacks" => self.font.fallbacks = value.to_string(),
            "font_source" => self.font.source = value.to_string(),
            "font_size" => {
                if let Ok(size) = value.parse::<i32>() {
                    self.font.size = size;
                } else {
                    parse_warning(&format!("format: bad font_size '{value}'"));
                }
            }
            "color" => Self::set_color(&mut self.color, value),
            "underline_color" => Self::set_color(&mut self.underline_color, value),
            "underline2_color" => Self::set_color(&mut self.underline2_color, value),
            "outline_color" => Self::set_color(&mut self.outline_color, value),
            "shadow_color" => Self::set_color(&mut self.shadow_color, value),
            "glow_color" => Self::set_color(&mut self.glow_color, value),
            "glow2_color" => Self::set_color(&mut self.glow2_color, value),
            "backing_color" => Self::set_color(&mut self.backing_color, value),
            "strikethrough_color" => Self::set_color(&mut self.strikethrough_color, value),
            "align" => match value {
                "left" => self.halign = 0.0,
                "center" | "middle" => self.halign = 0.5,
                "right" => self.halign = 1.0,
                _ => {
                    if let Some(frac) = parse_percent(value) {
                        self.halign = frac.clamp(0.0, 1.0);
                    } else {
                        parse_warning(&format!("format: bad align '{value}'"));
                    }
                }
            },
            "valign" => match value {
                "top" => self.valign = 0.0,
                "center" | "middle" => self.valign = 0.5,
                "bottom" => self.valign = 1.0,
                "baseline" => self.valign = VALIGN_BASELINE,
                _ => {
                    if let Some(frac) = parse_percent(value) {
                        self.valign = frac.clamp(0.0, 1.0);
                    } else {
                        parse_warning(&format!("format: bad valign '{value}'"));
                    }
                }
            },
            "wrap" => match value {
                "word" => self.wrap = WrapMode::Word,
                "char" => self.wrap = WrapMode::Char,
                "none" | "off" => self.wrap = WrapMode::None,
                _ => parse_warning(&format!("format: bad wrap '{value}'")),
            },
            "left_margin" => Self::apply_margin(&mut self.margin_left, value),
            "right_margin" => Self::apply_margin(&mut self.margin_right, value),
            "underline" => match value {
                "off" | "none" => {
                    self.decorations
                        .remove(Decorations::UNDERLINE | Decorations::UNDERLINE2);
                }
                "on" | "single" => {
                    self.decorations.insert(Decorations::UNDERLINE);
                    self.decorations.remove(Decorations::UNDERLINE2);
                }
                "double" => {
                    self.decorations
                        .insert(Decorations::UNDERLINE | Decorations::UNDERLINE2);
                }
                _ => parse_warning(&format!("format: bad underline '{value}'")),
            },
            "strikethrough" => match value {
                "on" => self.decorations.insert(Decorations::STRIKETHROUGH),
                "off" => self.decorations.remove(Decorations::STRIKETHROUGH),
                _ => parse_warning(&format!("format: bad strikethrough '{value}'")),
            },
            "backing" => match value {
                "on" => self.decorations.insert(Decorations::BACKING),
                "off" => self.decorations.remove(Decorations::BACKING),
                _ => parse_warning(&format!("format: bad backing '{value}'")),
            },
            "style" => match value {
                "plain" | "off" | "none" => self.style = TextStyle::Plain,
                "shadow" => self.style = TextStyle::Shadow,
                "outline" => self.style = TextStyle::Outline,
                "soft_outline" => self.style = TextStyle::SoftOutline,
                "glow" => self.style = TextStyle::Glow,
                "outline_shadow" => self.style = TextStyle::OutlineShadow,
                "far_shadow" => self.style = TextStyle::FarShadow,
                "outline_soft_shadow" => self.style = TextStyle::OutlineSoftShadow,
                "soft_shadow" => self.style = TextStyle::SoftShadow,
                "far_soft_shadow" => self.style = TextStyle::FarSoftShadow,
                _ => parse_warning(&format!("format: bad style '{value}'")),
            },
            "tabstops" => {
                if let Ok(width) = value.parse::<i32>() {
                    self.tabstops = width.max(1);
                } else {
                    parse_warning(&format!("format: bad tabstops '{value}'"));
                }
            }
            "linesize" => {
                if let Ok(size) = value.parse::<i32>() {
                    self.linesize = size;
                    self.linerelsize = None;
                } else {
                    parse_warning(&format!("format: bad linesize '{value}'"));
                }
            }
            "linerelsize" => {
                if let Some(frac) = parse_percent(value) {
                    self.linerelsize = Some(frac);
                    self.linesize = 0;
                } else {
                    parse_warning(&format!("format: bad linerelsize '{value}'"));
                }
            }
            "linegap" => {
                if let Ok(gap) = value.parse::<i32>() {
                    self.linegap = gap;
                    self.linerelgap = None;
                } else {
                    parse_warning(&format!("format: bad linegap '{value}'"));
                }
            }
            "linerelgap" => {
                if let Some(frac) = parse_percent(value) {
                    self.linerelgap = Some(frac);
                    self.linegap = 0;
                } else {
                    parse_warning(&format!("format: bad linerelgap '{value}'"));
                }
            }
            "linefill" => {
                if let Some(frac) = parse_percent(value) {
                    self.linefill = Some(frac);
                } else {
                    parse_warning(&format!("format: bad linefill '{value}'"));
                }
            }
            "ellipsis" => match value {
                "left" => self.ellipsis = Ellipsis::Left,
                "right" => self.ellipsis = Ellipsis::Right,
                "none" | "off" => self.ellipsis = Ellipsis::None,
                _ => parse_warning(&format!("format: bad ellipsis '{value}'")),
            },
            "ellipsis_symbol" => self.ellipsis_symbol = value.to_string(),
            _ => parse_warning(&format!("format: unknown command '{key}'")),
        }
    }

    fn set_color(slot: &mut Rgba, value: &str) {
        if let Some(color) = Rgba::from_hex(value) {
            *slot = color;
        } else {
            parse_warning(&format!("format: bad color '{value}'"));
        }
    }

    fn apply_margin(margin: &mut i32, value: &str) {
        if value == "reset" {
            *margin = 0;
        } else if let Some(delta) = value.strip_prefix('+') {
            match delta.parse::<i32>() {
                Ok(d) => *margin += d,
                Err(_) => parse_warning(&format!("format: bad margin '+{delta}'")),
            }
        } else if let Some(delta) = value.strip_prefix('-') {
            match delta.parse::<i32>() {
                Ok(d) => *margin -= d,
                Err(_) => parse_warning(&format!("format: bad margin '-{delta}'")),
            }
        } else {
            match value.parse::<i32>() {
                Ok(m) => *margin = m,
                Err(_) => parse_warning(&format!("format: bad margin '{value}'")),
            }
        }
    }

    /// Apply all `key=value` tokens of a directive, ignoring literals.
    pub fn apply_tokens(&mut self, tokens: &[FormatToken]) {
        for token in tokens {
            if let FormatToken::Command { key, value } = token {
                self.apply_command(key, value);
            }
        }
    }

    /// Reload the face if the font identity changed since the last load.
    ///
    /// The previous face is kept until the new one loads successfully, so
    /// a failing load leaves the format usable.
    pub fn sync_face(&mut self, provider: &dyn FontProvider) -> Result<()> {
        if self.loaded_spec.as_ref() == Some(&self.font) && self.face.is_some() {
            return Ok(());
        }
        let face = provider.load(&self.font)?;
        self.face = Some(face);
        self.loaded_spec = Some(self.font.clone());
        Ok(())
    }
}

/// Push/pop stack of format snapshots.
///
/// The base entry (the document default) can never be popped. `push`
/// duplicates the current top; command application goes through
/// [`Rc::make_mut`], so snapshots already referenced by layout items are
/// never mutated behind their backs.
#[derive(Debug)]
pub struct FormatStack {
    stack: Vec<Rc<Format>>,
}

impl FormatStack {
    /// Create a stack whose base is `base`.
    #[must_use]
    pub fn new(base: Format) -> Self {
        Self {
            stack: vec![Rc::new(base)],
        }
    }

    /// Current top snapshot.
    #[must_use]
    pub fn top(&self) -> &Rc<Format> {
        self.stack.last().expect("format stack base")
    }

    /// Mutable access to the top (copy-on-write when shared).
    pub fn top_mut(&mut self) -> &mut Format {
        Rc::make_mut(self.stack.last_mut().expect("format stack base"))
    }

    /// Duplicate the top and make the duplicate the new top.
    pub fn push(&mut self) {
        let dup = (**self.top()).clone();
        self.stack.push(Rc::new(dup));
    }

    /// Drop the top. Returns false (and does nothing) at the base.
    pub fn pop(&mut self) -> bool {
        if self.stack.len() > 1 {
            self.stack.pop();
            true
        } else {
            false
        }
    }

    /// Current depth including the base.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// One token of a format directive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormatToken {
    /// Explicit line break (`\n`).
    Newline,
    /// Tab stop (`\t`).
    Tab,
    /// A `key=value` command.
    Command { key: String, value: String },
    /// A bare word (e.g. a stray verb).
    Word(String),
}

/// Stack operation requested by a directive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackOp {
    Push,
    Pop,
    None,
}

/// Sizing rule for an inline placeholder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemSizing {
    /// `size=WxH`: scalable dimensions, used as given.
    Scaled,
    /// `absize=WxH`: absolute pixel dimensions.
    Absolute,
    /// `relsize=WxH`: scaled so the height matches the line height.
    Relative,
}

/// Vertical extent rule for an inline placeholder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ItemVSize {
    /// Spans ascent and descent, split by the font's ratio.
    #[default]
    Full,
    /// Sits entirely above the baseline.
    Ascent,
}

/// Parsed `item ...` placeholder arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemArgs {
    pub w: i32,
    pub h: i32,
    pub sizing: ItemSizing,
    pub vsize: ItemVSize,
    /// Parsed and retained; resolution is out of scope.
    pub href: Option<String>,
}

/// A parsed format directive.
#[derive(Clone, Debug)]
pub struct Directive {
    pub op: StackOp,
    /// Present when the directive is an inline placeholder.
    pub item: Option<ItemArgs>,
    /// Remaining tokens, in order (commands and `\n`/`\t` literals).
    pub tokens: Vec<FormatToken>,
}

impl Directive {
    /// Parse a directive string as stored on a Format node.
    ///
    /// A leading `+ `/`- ` marker (as produced by the markup codec) or a
    /// leading `push`/`pop` verb selects the stack operation; the marker
    /// wins when both are present. `item` directives never touch the
    /// stack.
    #[must_use]
    pub fn parse(directive: &str) -> Self {
        let (marker_op, rest) = if let Some(rest) = directive.strip_prefix("+ ") {
            (Some(StackOp::Push), rest)
        } else if let Some(rest) = directive.strip_prefix("- ") {
            (Some(StackOp::Pop), rest)
        } else {
            (None, directive)
        };

        let mut tokens = tokenize(rest);

        // A leading verb is consumed; the node marker takes precedence.
        let verb_op = match tokens.first() {
            Some(FormatToken::Word(w)) if w == "push" => Some(StackOp::Push),
            Some(FormatToken::Word(w)) if w == "pop" => Some(StackOp::Pop),
            _ => None,
        };
        if verb_op.is_some() {
            tokens.remove(0);
        }
        let mut op = marker_op.or(verb_op).unwrap_or(StackOp::None);

        // `+ item size=...` reserves space; it is not a stack push.
        let mut item = None;
        if matches!(tokens.first(), Some(FormatToken::Word(w)) if w == "item") {
            tokens.remove(0);
            item = Some(parse_item_args(&tokens));
            op = StackOp::None;
        }

        Self { op, item, tokens }
    }
}

fn parse_item_args(tokens: &[FormatToken]) -> ItemArgs {
    let mut args = ItemArgs {
        w: 0,
        h: 0,
        sizing: ItemSizing::Scaled,
        vsize: ItemVSize::default(),
        href: None,
    };
    for token in tokens {
        let FormatToken::Command { key, value } = token else {
            continue;
        };
        match key.as_str() {
            "size" | "absize" | "relsize" => {
                if let Some((w, h)) = parse_dimensions(value) {
                    args.w = w;
                    args.h = h;
                    args.sizing = match key.as_str() {
                        "absize" => ItemSizing::Absolute,
                        "relsize" => ItemSizing::Relative,
                        _ => ItemSizing::Scaled,
                    };
                } else {
                    parse_warning(&format!("format: bad item size '{value}'"));
                }
            }
            "vsize" => match value.as_str() {
                "full" => args.vsize = ItemVSize::Full,
                "ascent" => args.vsize = ItemVSize::Ascent,
                _ => parse_warning(&format!("format: bad item vsize '{value}'")),
            },
            "href" => args.href = Some(value.clone()),
            _ => parse_warning(&format!("format: unknown item argument '{key}'")),
        }
    }
    args
}

fn parse_dimensions(value: &str) -> Option<(i32, i32)> {
    let (w, h) = value.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

fn parse_percent(value: &str) -> Option<f32> {
    let number = value.strip_suffix('%')?;
    let parsed: f32 = number.parse().ok()?;
    Some(parsed / 100.0)
}

/// Split a directive body into tokens.
///
/// Whitespace separates tokens; a backslash escapes a following quote,
/// space, or backslash into the token. Any other backslash pair is kept
/// verbatim so the `\n`/`\t` literals survive.
#[must_use]
pub fn tokenize(body: &str) -> Vec<FormatToken> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars();

    let flush = |current: &mut String, tokens: &mut Vec<FormatToken>| {
        if current.is_empty() {
            return;
        }
        let raw = std::mem::take(current);
        tokens.push(classify_token(raw));
    };

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(escaped @ (' ' | '\'' | '"' | '\\')) => current.push(escaped),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
                None => current.push('\\'),
            },
            c if c.is_whitespace() => flush(&mut current, &mut tokens),
            c => current.push(c),
        }
    }
    flush(&mut current, &mut tokens);
    tokens
}

fn classify_token(raw: String) -> FormatToken {
    match raw.as_str() {
        "\\n" | "\n" => FormatToken::Newline,
        "\\t" | "\t" => FormatToken::Tab,
        _ => {
            if let Some((key, value)) = raw.split_once('=') {
                FormatToken::Command {
                    key: key.to_string(),
                    value: value.to_string(),
                }
            } else {
                FormatToken::Word(raw)
            }
        }
    }
}
