//! Single-byte codepage utilities for receipt printers
//!
//! Printers without Unicode support render text from a legacy code table
//! selected with `ESC t n`. This module provides:
//! - Transliterating UTF-8 text into the selected codepage
//! - Column width helpers (one byte per character on these printers)
//! - Truncating/padding strings to a fixed column width

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

/// Code table understood by the printer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codepage {
    /// DOS Cyrillic (PC866)
    #[default]
    Cp866,
    /// Windows Cyrillic (WPC1251)
    Windows1251,
}

impl Codepage {
    /// Table number sent with `ESC t n`
    pub fn table(self) -> u8 {
        match self {
            Codepage::Cp866 => 17,
            Codepage::Windows1251 => 46,
        }
    }

    /// Backing `encoding_rs` codec
    pub fn encoding(self) -> &'static Encoding {
        match self {
            Codepage::Cp866 => encoding_rs::IBM866,
            Codepage::Windows1251 => encoding_rs::WINDOWS_1251,
        }
    }

    /// Encode text into this codepage
    ///
    /// Characters the table cannot represent fall back to the codec's own
    /// replacement (decimal numeric character references). No validation.
    pub fn encode(self, s: &str) -> Vec<u8> {
        let (bytes, _, _) = self.encoding().encode(s);
        bytes.into_owned()
    }
}

/// Printed width of a string in columns
pub fn text_width(s: &str) -> usize {
    s.chars().count()
}

/// Truncate a string to at most `max_width` columns
pub fn truncate(s: &str, max_width: usize) -> String {
    s.chars().take(max_width).collect()
}

/// Pad a string to exactly `width` columns
///
/// If the string is longer than the width, it will be truncated.
pub fn pad(s: &str, width: usize, align_right: bool) -> String {
    let current_width = text_width(s);
    if current_width >= width {
        return truncate(s, width);
    }
    let spaces = width - current_width;
    if align_right {
        format!("{}{}", " ".repeat(spaces), s)
    } else {
        format!("{}{}", s, " ".repeat(spaces))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_cp866() {
        assert_eq!(
            Codepage::Cp866.encode("Привет"),
            vec![0x8F, 0xE0, 0xA8, 0xA2, 0xA5, 0xE2]
        );
        assert_eq!(Codepage::Cp866.encode("abc 12"), b"abc 12".to_vec());
    }

    #[test]
    fn test_encode_windows_1251() {
        assert_eq!(Codepage::Windows1251.encode("Да"), vec![0xC4, 0xE0]);
    }

    #[test]
    fn test_unmappable_falls_back() {
        // The ruble sign is not part of CP866
        assert_eq!(Codepage::Cp866.encode("₽"), b"&#8381;".to_vec());
    }

    #[test]
    fn test_tables() {
        assert_eq!(Codepage::Cp866.table(), 0x11);
        assert_eq!(Codepage::Windows1251.table(), 46);
    }

    #[test]
    fn test_text_width() {
        assert_eq!(text_width("hello"), 5);
        assert_eq!(text_width("Сумма"), 5);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello world", 5), "hello");
        assert_eq!(truncate("Наименование", 4), "Наим");
        assert_eq!(truncate("ab", 4), "ab");
    }

    #[test]
    fn test_pad() {
        assert_eq!(pad("hi", 5, false), "hi   ");
        assert_eq!(pad("hi", 5, true), "   hi");
        assert_eq!(pad("hello world", 5, false), "hello");
        assert_eq!(pad("Кол-во", 6, false), "Кол-во");
    }
}
