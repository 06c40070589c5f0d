//! Incremental ANSI escape-sequence decoder.
//!
//! PTY reads can split an escape sequence (or a multi-byte UTF-8
//! character) at any byte boundary, so the parser keeps the unterminated
//! suffix of each chunk and prepends it to the next one. No bytes are
//! lost or duplicated across `feed` calls.

use super::{Color, RenderOp, Style};

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;

/// Stateful decoder for one session's output stream.
///
/// Owns the current SGR style and the carried-over partial sequence.
#[derive(Debug, Default)]
pub struct AnsiParser {
    style: Style,
    partial: Vec<u8>,
}

impl AnsiParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// The style that will be applied to the next text run.
    pub fn style(&self) -> Style {
        self.style
    }

    /// Decode a chunk of PTY output into render operations.
    ///
    /// Clear-screen and cursor-home sequences are emitted first and
    /// stripped before the rest of the chunk is processed. Sequences that
    /// only affect cursor visibility, absolute positioning, or line/column
    /// erase are consumed without rendering.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RenderOp> {
        let mut data = std::mem::take(&mut self.partial);
        data.extend_from_slice(chunk);

        // Hold back anything that cannot be decoded yet: an unterminated
        // escape sequence, a split UTF-8 character, or a trailing `\r`
        // whose pairing `\n` may arrive in the next read.
        let mut cut = incomplete_suffix_start(&data).unwrap_or(data.len());
        cut -= incomplete_utf8_tail(&data[..cut]);
        if cut > 0 && data[cut - 1] == b'\r' {
            cut -= 1;
        }
        self.partial = data.split_off(cut);

        let mut ops = Vec::new();
        if strip_all(&mut data, b"\x1b[2J") | strip_all(&mut data, b"\x1b[3J") {
            ops.push(RenderOp::ClearScreen);
            self.style = Style::default();
        }
        if strip_all(&mut data, b"\x1b[H") {
            ops.push(RenderOp::MoveCursorHome);
        }

        let mut run: Vec<u8> = Vec::new();
        let mut i = 0;
        while i < data.len() {
            if data[i] != ESC {
                run.push(data[i]);
                i += 1;
                continue;
            }
            match data.get(i + 1).copied() {
                Some(b'[') => {
                    let mut j = i + 2;
                    while j < data.len() && (0x20..=0x3f).contains(&data[j]) {
                        j += 1;
                    }
                    let Some(&final_byte) = data.get(j) else { break };
                    if final_byte == b'm' {
                        // Text seen so far carries the style that was
                        // current when it was encountered.
                        self.flush_run(&mut run, &mut ops);
                        self.apply_sgr(&data[i + 2..j]);
                    }
                    i = j + 1;
                }
                Some(b']') => {
                    // OSC (window title etc.), terminated by BEL or ESC \
                    let mut j = i + 2;
                    loop {
                        match data.get(j).copied() {
                            None => {
                                j = data.len();
                                break;
                            }
                            Some(BEL) => {
                                j += 1;
                                break;
                            }
                            Some(ESC) if data.get(j + 1) == Some(&b'\\') => {
                                j += 2;
                                break;
                            }
                            Some(_) => j += 1,
                        }
                    }
                    i = j;
                }
                // Charset designators carry one extra byte.
                Some(b'(' | b')') => i += 3,
                Some(_) => i += 2,
                None => break,
            }
        }
        self.flush_run(&mut run, &mut ops);
        ops
    }

    fn flush_run(&self, run: &mut Vec<u8>, ops: &mut Vec<RenderOp>) {
        if run.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(run).into_owned();
        run.clear();
        self.emit_text(&text, ops);
    }

    /// Emit a text run, rewriting bare-`\r` line redraws.
    ///
    /// `\r\n` is normalized to `\n`; a line segment still containing `\r`
    /// keeps only the text after the last `\r` (collapsing several
    /// same-line redraws that arrived in one chunk into the final frame)
    /// and becomes an `OverwriteCurrentLine`.
    fn emit_text(&self, text: &str, ops: &mut Vec<RenderOp>) {
        let text = text.replace("\r\n", "\n");
        if !text.contains('\r') {
            if !text.is_empty() {
                ops.push(RenderOp::InsertStyledText(text, self.style));
            }
            return;
        }
        let mut plain = String::new();
        for (idx, segment) in text.split('\n').enumerate() {
            if idx > 0 {
                plain.push('\n');
            }
            if let Some(keep) = segment.rsplit('\r').next().filter(|_| segment.contains('\r')) {
                if !plain.is_empty() {
                    ops.push(RenderOp::InsertStyledText(std::mem::take(&mut plain), self.style));
                }
                ops.push(RenderOp::OverwriteCurrentLine(keep.to_string()));
            } else {
                plain.push_str(segment);
            }
        }
        if !plain.is_empty() {
            ops.push(RenderOp::InsertStyledText(plain, self.style));
        }
    }

    /// Apply a `ESC [ <params> m` sequence to the current style.
    ///
    /// Parameters are processed left to right; unknown or malformed ones
    /// are ignored individually without aborting the rest.
    fn apply_sgr(&mut self, params: &[u8]) {
        let params = std::str::from_utf8(params).unwrap_or("");
        let nums: Vec<Option<u16>> = params
            .split(';')
            .map(|p| if p.is_empty() { Some(0) } else { p.parse().ok() })
            .collect();

        let mut i = 0;
        while i < nums.len() {
            let Some(n) = nums[i] else {
                i += 1;
                continue;
            };
            match n {
                0 => self.style = Style::default(),
                1 => self.style.bold = true,
                22 => self.style.bold = false,
                3 => self.style.italic = true,
                23 => self.style.italic = false,
                4 => self.style.underline = true,
                24 => self.style.underline = false,
                30..=37 => self.style.fg = Color::Indexed((n - 30) as u8),
                90..=97 => self.style.fg = Color::Indexed((n - 90 + 8) as u8),
                39 => self.style.fg = Color::Default,
                40..=47 => self.style.bg = Color::Indexed((n - 40) as u8),
                100..=107 => self.style.bg = Color::Indexed((n - 100 + 8) as u8),
                49 => self.style.bg = Color::Default,
                38 | 48 => {
                    let (color, consumed) = extended_color(&nums[i + 1..]);
                    if let Some(color) = color {
                        if n == 38 {
                            self.style.fg = color;
                        } else {
                            self.style.bg = color;
                        }
                    }
                    i += consumed;
                }
                _ => {}
            }
            i += 1;
        }
    }
}

/// Decode the parameters following a 38/48 introducer.
///
/// Returns the color (if well-formed) and how many parameters were
/// consumed beyond the introducer itself.
fn extended_color(rest: &[Option<u16>]) -> (Option<Color>, usize) {
    match rest.first() {
        Some(Some(2)) => {
            let rgb = (
                rest.get(1).copied().flatten(),
                rest.get(2).copied().flatten(),
                rest.get(3).copied().flatten(),
            );
            let color = match rgb {
                (Some(r), Some(g), Some(b)) if r <= 255 && g <= 255 && b <= 255 => {
                    Some(Color::Rgb(r as u8, g as u8, b as u8))
                }
                _ => None,
            };
            (color, 4.min(rest.len()))
        }
        Some(Some(5)) => {
            let color = rest
                .get(1)
                .copied()
                .flatten()
                .filter(|&idx| idx <= 255)
                .map(|idx| Color::from_palette_256(idx as u8));
            (color, 2.min(rest.len()))
        }
        _ => (None, 0),
    }
}

/// Offset of the trailing escape sequence that has no terminator yet, if
/// the data ends inside one.
fn incomplete_suffix_start(data: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < data.len() {
        if data[i] != ESC {
            i += 1;
            continue;
        }
        let start = i;
        match data.get(i + 1).copied() {
            None => return Some(start),
            Some(b'[') => {
                let mut j = i + 2;
                while j < data.len() && (0x20..=0x3f).contains(&data[j]) {
                    j += 1;
                }
                if j >= data.len() {
                    return Some(start);
                }
                i = j + 1;
            }
            Some(b']') => {
                let mut j = i + 2;
                loop {
                    match data.get(j).copied() {
                        None => return Some(start),
                        Some(BEL) => {
                            i = j + 1;
                            break;
                        }
                        Some(ESC) => match data.get(j + 1).copied() {
                            None => return Some(start),
                            Some(b'\\') => {
                                i = j + 2;
                                break;
                            }
                            Some(_) => j += 1,
                        },
                        Some(_) => j += 1,
                    }
                }
            }
            Some(b'(' | b')') => {
                if i + 2 >= data.len() {
                    return Some(start);
                }
                i += 3;
            }
            Some(_) => i += 2,
        }
    }
    None
}

/// Number of trailing bytes that form the start of an unfinished UTF-8
/// character.
fn incomplete_utf8_tail(data: &[u8]) -> usize {
    for back in 1..=data.len().min(3) {
        let b = data[data.len() - back];
        if b < 0x80 {
            return 0;
        }
        if b >= 0xc0 {
            let need = if b >= 0xf0 {
                4
            } else if b >= 0xe0 {
                3
            } else {
                2
            };
            return if need > back { back } else { 0 };
        }
    }
    0
}

/// Remove every occurrence of `needle`, reporting whether any were found.
fn strip_all(haystack: &mut Vec<u8>, needle: &[u8]) -> bool {
    let mut found = false;
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if &haystack[i..i + needle.len()] == needle {
            haystack.drain(i..i + needle.len());
            found = true;
        } else {
            i += 1;
        }
    }
    found
}
