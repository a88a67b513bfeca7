//! Per-printer setup and language settings

use std::time::Duration;

use netprint_escpos::{Codepage, Command};
use serde::{Deserialize, Serialize};

/// Physical setup sent at the start of every receipt
#[derive(Debug, Clone, PartialEq)]
pub struct SetupProfile {
    /// Horizontal and vertical dot pitch in millimetres
    pub dot_pitch_mm: f32,
    pub left_margin: u16,
    pub print_area_mm: f32,
    pub font: u8,
    pub max_width: u32,
}

impl SetupProfile {
    /// Directives that put the printer into a known state
    pub fn commands(&self) -> Vec<Command> {
        vec![
            Command::Initialize,
            Command::SelectStandardMode,
            Command::SetDotDistance {
                horizontal: self.dot_pitch_mm,
                vertical: self.dot_pitch_mm,
            },
            Command::SetLeftMargin(self.left_margin),
            Command::DefaultLineSpacing,
            Command::SetPrintAreaWidth(self.print_area_mm),
            Command::SelectFont(self.font),
            Command::SetMaximumWidth(self.max_width),
        ]
    }
}

impl Default for SetupProfile {
    /// 80 mm roll, font A
    fn default() -> Self {
        Self {
            dot_pitch_mm: 0.1,
            left_margin: 20,
            print_area_mm: 80.0,
            font: 48,
            max_width: 90,
        }
    }
}

/// Receipt language preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ru,
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "ru" | "russian" => Ok(Language::Ru),
            other => Err(format!("unknown language: {}", other)),
        }
    }
}

/// Fixed captions printed around the item table and totals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptLabels {
    pub name: String,
    pub quantity: String,
    pub sum: String,
    pub discount: String,
    pub amount_due: String,
}

impl ReceiptLabels {
    pub fn english() -> Self {
        Self {
            name: "Name".into(),
            quantity: "Qty".into(),
            sum: "Sum".into(),
            discount: "Discount".into(),
            amount_due: "Amount due".into(),
        }
    }

    pub fn russian() -> Self {
        Self {
            name: "Наименование".into(),
            quantity: "Кол-во".into(),
            sum: "Сумма".into(),
            discount: "Скидка".into(),
            amount_due: "К оплате".into(),
        }
    }
}

impl Default for ReceiptLabels {
    fn default() -> Self {
        Self::english()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LanguageProfile {
    pub codepage: Codepage,
    pub labels: ReceiptLabels,
}

impl From<Language> for LanguageProfile {
    fn from(language: Language) -> Self {
        let labels = match language {
            Language::En => ReceiptLabels::english(),
            Language::Ru => ReceiptLabels::russian(),
        };
        Self {
            codepage: Codepage::Cp866,
            labels,
        }
    }
}

/// Everything the composer needs to know about a printer
#[derive(Debug, Clone, PartialEq)]
pub struct PrinterProfile {
    pub setup: SetupProfile,
    pub language: LanguageProfile,
    /// Gap between consecutive chunks of one receipt
    pub chunk_interval: Duration,
}

impl Default for PrinterProfile {
    fn default() -> Self {
        Self {
            setup: SetupProfile::default(),
            language: LanguageProfile::default(),
            chunk_interval: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_bytes() {
        let mut bytes = Vec::new();
        for command in SetupProfile::default().commands() {
            command.encode_into(&mut bytes, Codepage::Cp866);
        }
        assert_eq!(
            bytes,
            vec![
                0x1B, 0x40, // init
                0x1B, 0x53, // standard mode
                0x1D, 0x50, 254, 254, // dot distance
                0x1D, 0x4C, 20, 0, // left margin
                0x1B, 0x32, // line spacing
                0x1D, 0x57, 0x20, 0x03, // 80 mm
                0x1B, 0x4D, 48, // font
                0x1B, 0x57, 90, // max width
            ]
        );
    }

    #[test]
    fn test_language_presets() {
        assert_eq!("RU".parse::<Language>().unwrap(), Language::Ru);
        assert!("de".parse::<Language>().is_err());
        let ru = LanguageProfile::from(Language::Ru);
        assert_eq!(ru.labels.amount_due, "К оплате");
        assert_eq!(LanguageProfile::default().labels, ReceiptLabels::english());
    }
}
