//! ESC/POS command builder
//!
//! Every printer directive is a [`Command`] with a fixed byte encoding.
//! [`EscPosBuilder`] provides a fluent API on top of it for building
//! print data.
//!
//! Numeric parameters never fail: values that do not fit in a byte wrap
//! modulo 256, which is how the printer itself reads them.

use crate::encoding::Codepage;

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;
const DLE: u8 = 0x10;
const LF: u8 = 0x0A;

/// Horizontal text alignment (`ESC a n`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

impl Alignment {
    fn byte(self) -> u8 {
        match self {
            Alignment::Left => 48,
            Alignment::Center => 49,
            Alignment::Right => 50,
        }
    }
}

/// Character magnification (`GS ! n`)
///
/// Width and height are multipliers in `1..=8`; anything outside wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharScale {
    pub width: u8,
    pub height: u8,
}

impl CharScale {
    pub const NORMAL: CharScale = CharScale::new(1, 1);
    pub const DOUBLE: CharScale = CharScale::new(2, 2);
    pub const DOUBLE_HEIGHT: CharScale = CharScale::new(1, 2);
    pub const DOUBLE_WIDTH: CharScale = CharScale::new(2, 1);

    pub const fn new(width: u8, height: u8) -> Self {
        Self { width, height }
    }

    /// Same multiplier in both directions
    pub const fn uniform(factor: u8) -> Self {
        Self::new(factor, factor)
    }

    /// Encoded `n` for `GS ! n`
    pub fn byte(self) -> u8 {
        let w = self.width.wrapping_sub(1) & 0x07;
        let h = self.height.wrapping_sub(1) & 0x07;
        (w << 4) | h
    }
}

impl Default for CharScale {
    fn default() -> Self {
        Self::NORMAL
    }
}

/// Paper cut variant (`GS V m [n]`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutMode {
    Full,
    Partial,
    /// Feed `n` motion units, then partial cut
    FeedAndPartial(u8),
}

/// Real-time status request (`DLE EOT n`)
///
/// The printer answers asynchronously; answers are not interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Printer,
    Offline,
    Error,
    PaperSensor,
}

impl StatusKind {
    fn byte(self) -> u8 {
        match self {
            StatusKind::Printer => 0x01,
            StatusKind::Offline => 0x02,
            StatusKind::Error => 0x03,
            StatusKind::PaperSensor => 0x04,
        }
    }
}

/// Cash drawer kick-out connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawerPin {
    #[default]
    Pin2,
    Pin5,
}

/// A single printer directive
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `ESC @`
    Initialize,
    /// `ESC S`
    SelectStandardMode,
    /// `GS P x y`, motion units from dot pitch in millimetres
    SetDotDistance { horizontal: f32, vertical: f32 },
    /// `GS L nL nH`
    SetLeftMargin(u16),
    /// `ESC 2`
    DefaultLineSpacing,
    /// `ESC 3 n`
    SetLineSpacing(u8),
    /// `GS W nL nH`, width in millimetres at 0.1 mm per unit
    SetPrintAreaWidth(f32),
    /// `ESC M n`
    SelectFont(u8),
    /// `ESC W n`
    SetMaximumWidth(u32),
    /// `ESC t n`
    SelectCodepage(Codepage),
    /// `ESC a n`
    Align(Alignment),
    /// `ESC E n`
    Bold(bool),
    /// `GS ! n`
    Scale(CharScale),
    /// Text in the active codepage
    Text(String),
    /// `LF`
    LineFeed,
    /// `ESC d n`
    FeedLines(u8),
    /// `GS V m [n]`
    Cut(CutMode),
    /// `ESC $ nL nH`
    AbsolutePosition(u16),
    /// `DLE EOT n`
    TransmitStatus(StatusKind),
    /// `ESC c 3 n`
    PaperSensorSignals(u8),
    /// `ESC p m t1 t2`
    CashDrawerPulse {
        pin: DrawerPin,
        on_time: u8,
        off_time: u8,
    },
    /// Pre-encoded bytes, passed through untouched
    Raw(Vec<u8>),
}

impl Command {
    /// Append this directive's bytes to `buf`
    pub fn encode_into(&self, buf: &mut Vec<u8>, codepage: Codepage) {
        match self {
            Command::Initialize => buf.extend_from_slice(&[ESC, 0x40]),
            Command::SelectStandardMode => buf.extend_from_slice(&[ESC, 0x53]),
            Command::SetDotDistance {
                horizontal,
                vertical,
            } => buf.extend_from_slice(&[
                GS,
                0x50,
                motion_units(*horizontal),
                motion_units(*vertical),
            ]),
            Command::SetLeftMargin(dots) => {
                let [low, high] = dots.to_le_bytes();
                buf.extend_from_slice(&[GS, 0x4C, low, high]);
            }
            Command::DefaultLineSpacing => buf.extend_from_slice(&[ESC, 0x32]),
            Command::SetLineSpacing(n) => buf.extend_from_slice(&[ESC, 0x33, *n]),
            Command::SetPrintAreaWidth(mm) => {
                let units = tenth_millimetres(*mm);
                buf.extend_from_slice(&[GS, 0x57, (units % 256) as u8, (units / 256 % 256) as u8]);
            }
            Command::SelectFont(n) => buf.extend_from_slice(&[ESC, 0x4D, *n]),
            Command::SetMaximumWidth(n) => buf.extend_from_slice(&[ESC, 0x57, (n % 256) as u8]),
            Command::SelectCodepage(page) => buf.extend_from_slice(&[ESC, 0x74, page.table()]),
            Command::Align(alignment) => buf.extend_from_slice(&[ESC, 0x61, alignment.byte()]),
            Command::Bold(on) => buf.extend_from_slice(&[ESC, 0x45, u8::from(*on)]),
            Command::Scale(scale) => buf.extend_from_slice(&[GS, 0x21, scale.byte()]),
            Command::Text(text) => buf.extend_from_slice(&codepage.encode(text)),
            Command::LineFeed => buf.push(LF),
            Command::FeedLines(n) => buf.extend_from_slice(&[ESC, 0x64, *n]),
            Command::Cut(mode) => match mode {
                CutMode::Full => buf.extend_from_slice(&[GS, 0x56, 48]),
                CutMode::Partial => buf.extend_from_slice(&[GS, 0x56, 49]),
                CutMode::FeedAndPartial(n) => buf.extend_from_slice(&[GS, 0x56, 66, *n]),
            },
            Command::AbsolutePosition(position) => {
                let [low, high] = position.to_le_bytes();
                buf.extend_from_slice(&[ESC, 0x24, low, high]);
            }
            Command::TransmitStatus(kind) => buf.extend_from_slice(&[DLE, 0x04, kind.byte()]),
            Command::PaperSensorSignals(n) => buf.extend_from_slice(&[ESC, 0x63, 0x33, *n]),
            Command::CashDrawerPulse {
                pin,
                on_time,
                off_time,
            } => {
                let m = match pin {
                    DrawerPin::Pin2 => 0x00,
                    DrawerPin::Pin5 => 0x01,
                };
                buf.extend_from_slice(&[ESC, 0x70, m, *on_time, *off_time]);
            }
            Command::Raw(bytes) => buf.extend_from_slice(bytes),
        }
    }

    /// Encode this directive on its own
    pub fn to_bytes(&self, codepage: Codepage) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf, codepage);
        buf
    }
}

/// `round(25.4 / mm)` clamped into a byte
fn motion_units(mm: f32) -> u8 {
    let units = (25.4 / mm).round();
    if units.is_nan() {
        return 0;
    }
    units.clamp(0.0, 255.0) as u8
}

/// Width in 0.1 mm units, rounded so that e.g. 80.0 maps to 800
fn tenth_millimetres(mm: f32) -> u32 {
    let units = (f64::from(mm) * 10.0).round();
    if units.is_nan() || units <= 0.0 {
        return 0;
    }
    // Saturating cast, then the byte split wraps
    units as u32
}

/// ESC/POS command builder
///
/// Accumulates directives into a byte buffer. Text is encoded with the
/// builder's codepage as it is appended.
#[derive(Debug, Clone)]
pub struct EscPosBuilder {
    buf: Vec<u8>,
    codepage: Codepage,
}

impl EscPosBuilder {
    /// Create an empty builder that encodes text with `codepage`
    pub fn new(codepage: Codepage) -> Self {
        Self {
            buf: Vec::with_capacity(1024),
            codepage,
        }
    }

    /// Get the configured codepage
    pub fn codepage(&self) -> Codepage {
        self.codepage
    }

    /// Append any directive
    pub fn command(&mut self, command: &Command) -> &mut Self {
        command.encode_into(&mut self.buf, self.codepage);
        self
    }

    /// Append a sequence of directives
    pub fn commands<'a>(&mut self, commands: impl IntoIterator<Item = &'a Command>) -> &mut Self {
        for command in commands {
            self.command(command);
        }
        self
    }

    // === Setup ===

    /// Initialize printer (ESC @)
    pub fn initialize(&mut self) -> &mut Self {
        self.command(&Command::Initialize)
    }

    /// Select the builder's codepage on the printer (ESC t n)
    pub fn select_codepage(&mut self) -> &mut Self {
        let page = self.codepage;
        self.command(&Command::SelectCodepage(page))
    }

    // === Text Output ===

    /// Write text in the active codepage
    pub fn text(&mut self, s: &str) -> &mut Self {
        self.buf.extend_from_slice(&self.codepage.encode(s));
        self
    }

    /// Write text followed by newline
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.newline()
    }

    /// Write empty line
    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(LF);
        self
    }

    /// Print and feed n lines
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.command(&Command::FeedLines(lines))
    }

    // === Alignment ===

    pub fn align(&mut self, alignment: Alignment) -> &mut Self {
        self.command(&Command::Align(alignment))
    }

    /// Align text to center
    pub fn center(&mut self) -> &mut Self {
        self.align(Alignment::Center)
    }

    /// Align text to left (default)
    pub fn left(&mut self) -> &mut Self {
        self.align(Alignment::Left)
    }

    /// Align text to right
    pub fn right(&mut self) -> &mut Self {
        self.align(Alignment::Right)
    }

    // === Text Style ===

    pub fn bold(&mut self, on: bool) -> &mut Self {
        self.command(&Command::Bold(on))
    }

    pub fn scale(&mut self, scale: CharScale) -> &mut Self {
        self.command(&Command::Scale(scale))
    }

    /// Reset to normal size
    pub fn reset_size(&mut self) -> &mut Self {
        self.scale(CharScale::NORMAL)
    }

    // === Paper Control ===

    pub fn cut(&mut self, mode: CutMode) -> &mut Self {
        self.command(&Command::Cut(mode))
    }

    // === Cash Drawer ===

    /// Open cash drawer (pin 2)
    pub fn open_drawer(&mut self) -> &mut Self {
        self.command(&Command::CashDrawerPulse {
            pin: DrawerPin::Pin2,
            on_time: 0x80,
            off_time: 0xFF,
        })
    }

    // === Status ===

    /// Ask the printer for a status byte (the answer is not read back)
    pub fn status_query(&mut self, kind: StatusKind) -> &mut Self {
        self.command(&Command::TransmitStatus(kind))
    }

    // === Raw Commands ===

    /// Write raw bytes directly
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    // === Build ===

    /// Move the accumulated bytes out of the builder
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new(Codepage::default())
    }
}

// ============================================================================
// Image Processing
// ============================================================================

/// Convert encoded image bytes (PNG, JPEG, ...) into ESC/POS raster data
///
/// The image will be:
/// - Resized to fit `max_width` dots (384 is safe for 58mm/80mm)
/// - Converted to 1-bit monochrome
/// - Encoded as GS v 0 raster graphics, centered
#[cfg(feature = "image")]
#[tracing::instrument(skip(data), fields(data_len = data.len()))]
pub fn rasterize_logo(data: &[u8], max_width: u32) -> Option<Vec<u8>> {
    use image::GenericImageView;
    use tracing::{debug, warn};

    let img = match image::load_from_memory(data) {
        Ok(i) => {
            debug!(dimensions = ?i.dimensions(), "logo image decoded");
            i
        }
        Err(e) => {
            warn!(error = %e, "decode logo failed");
            return None;
        }
    };

    let (w, h) = img.dimensions();
    if w == 0 || h == 0 || max_width == 0 {
        return None;
    }

    let (new_w, new_h) = if w > max_width {
        let ratio = max_width as f64 / w as f64;
        (max_width, ((h as f64 * ratio) as u32).max(1))
    } else {
        (w, h)
    };

    let resized = if new_w == w {
        img
    } else {
        img.resize_exact(new_w, new_h, image::imageops::FilterType::Nearest)
    };

    let x_bytes = new_w.div_ceil(8);

    let mut raster = Vec::new();

    raster.extend_from_slice(&[ESC, 0x61, Alignment::Center.byte()]);

    // GS v 0 m xL xH yL yH
    raster.extend_from_slice(&[GS, 0x76, 0x30, 0x00]);
    raster.push(x_bytes as u8);
    raster.push((x_bytes >> 8) as u8);
    raster.push(new_h as u8);
    raster.push((new_h >> 8) as u8);

    let rgba = resized.to_rgba8();

    for y in 0..new_h {
        for x_byte in 0..x_bytes {
            let mut byte = 0u8;
            for bit in 0..8 {
                let x = x_byte * 8 + bit;
                if x < new_w {
                    let pixel = rgba.get_pixel(x, y);

                    // Transparent pixels stay white
                    if pixel[3] >= 128 {
                        let luma = (0.299 * pixel[0] as f32
                            + 0.587 * pixel[1] as f32
                            + 0.114 * pixel[2] as f32) as u8;

                        if luma < 128 {
                            byte |= 1 << (7 - bit);
                        }
                    }
                }
            }
            raster.push(byte);
        }
    }

    raster.push(LF);

    Some(raster)
}
