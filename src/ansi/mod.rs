//! Terminal output decoding.
//!
//! Turns the raw byte stream coming off a PTY into abstract render
//! operations a display surface can apply. Good enough for interactive
//! CLI tools; not a full terminal emulator.

mod parser;

pub use parser::AnsiParser;

use serde::{Deserialize, Serialize};

/// Terminal color representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Color {
    /// Default terminal color.
    #[default]
    Default,
    /// Index into the 16-color palette (0-7 standard, 8-15 bright).
    Indexed(u8),
    /// 24-bit RGB color.
    Rgb(u8, u8, u8),
}

/// The 16-color palette (8 standard + 8 bright), as `(r, g, b)`.
pub const PALETTE_16: [(u8, u8, u8); 16] = [
    (0x00, 0x00, 0x00), // black
    (0xcd, 0x31, 0x31), // red
    (0x0d, 0xbc, 0x79), // green
    (0xe5, 0xe5, 0x10), // yellow
    (0x24, 0x72, 0xc8), // blue
    (0xbc, 0x3f, 0xbc), // magenta
    (0x11, 0xa8, 0xcd), // cyan
    (0xe5, 0xe5, 0xe5), // white
    (0x66, 0x66, 0x66), // bright black
    (0xf1, 0x4c, 0x4c), // bright red
    (0x23, 0xd1, 0x8b), // bright green
    (0xf5, 0xf5, 0x43), // bright yellow
    (0x3b, 0x8e, 0xea), // bright blue
    (0xd6, 0x70, 0xd6), // bright magenta
    (0x29, 0xb8, 0xdb), // bright cyan
    (0xff, 0xff, 0xff), // bright white
];

impl Color {
    /// Resolve a 256-palette index to a concrete color.
    ///
    /// 0-15 stay indexed into the 16-color palette; 16-231 form a 6x6x6
    /// cube; 232-255 are a 24-step grayscale ramp.
    pub fn from_palette_256(idx: u8) -> Self {
        match idx {
            0..=15 => Color::Indexed(idx),
            16..=231 => {
                let n = idx - 16;
                let r = n / 36;
                let g = (n / 6) % 6;
                let b = n % 6;
                Color::Rgb(r * 51, g * 51, b * 51)
            }
            232..=255 => {
                let v = 8 + (idx - 232) * 10;
                Color::Rgb(v, v, v)
            }
        }
    }

    /// Concrete RGB value for rendering, or `None` for the default color.
    pub fn to_rgb(self) -> Option<(u8, u8, u8)> {
        match self {
            Color::Default => None,
            Color::Indexed(idx) => PALETTE_16.get(idx as usize).copied(),
            Color::Rgb(r, g, b) => Some((r, g, b)),
        }
    }
}

/// Current SGR attributes for a session's output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Style {
    pub fg: Color,
    pub bg: Color,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

/// An operation the render sink applies to its display surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOp {
    /// Insert text at the current position with the given style.
    InsertStyledText(String, Style),
    /// Clear the whole display surface.
    ClearScreen,
    /// Move the insertion point back to the start of the surface.
    MoveCursorHome,
    /// Return to column zero and replace the current line's contents.
    OverwriteCurrentLine(String),
}
