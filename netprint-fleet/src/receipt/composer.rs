//! Receipt composer
//!
//! Renders a [`ReceiptDocument`] into ESC/POS bytes, one chunk per
//! section, each chunk carrying its send offset from job start.

use std::time::Duration;

use base64::Engine;
use netprint_escpos::{CharScale, CutMode, EscPosBuilder};
use tracing::{debug, warn};

use super::layout::{
    LINE_WIDTH, QUANTITY_WIDTH, centered_quantity, format_sum, limited, normalize_percent,
    printable_currency, title_line, wrap_words,
};
use super::model::{
    FieldValue, LabeledValue, ReceiptDocument, ReceiptHeader, ReceiptItem, ReceiptTotals,
};
use super::profile::PrinterProfile;

const NAME_WIDTH: usize = 24;
const SUM_WIDTH: usize = 9;
const BODY_LABEL_WIDTH: usize = 20;
const BODY_VALUE_WIDTH: usize = 18;
const TOTALS_WIDTH: usize = 20;
const LOGO_MAX_DOTS: u32 = 384;

/// One paced write of a print job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub sequence: usize,
    /// Offset from job start
    pub delay: Duration,
    pub bytes: Vec<u8>,
    pub is_final: bool,
}

type Section = fn(&ReceiptComposer, &mut EscPosBuilder, &ReceiptDocument) -> bool;

/// Receipt renderer for one printer profile
#[derive(Debug, Clone, Default)]
pub struct ReceiptComposer {
    profile: PrinterProfile,
}

impl ReceiptComposer {
    pub fn new(profile: PrinterProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &PrinterProfile {
        &self.profile
    }

    /// Render the document as paced chunks
    ///
    /// Config and cut are always present; other sections only when the
    /// document has them. Chunk `i` is due `i * chunk_interval` after start.
    pub fn compose(&self, document: &ReceiptDocument) -> Vec<Chunk> {
        let mut sections = Vec::new();
        for render in Self::SECTIONS {
            let mut b = self.builder();
            if render(self, &mut b, document) {
                sections.push(b.build());
            }
        }

        let last = sections.len().saturating_sub(1);
        let interval = self.profile.chunk_interval;
        let chunks: Vec<Chunk> = sections
            .into_iter()
            .enumerate()
            .map(|(i, bytes)| Chunk {
                sequence: i,
                delay: interval.saturating_mul(i as u32),
                bytes,
                is_final: i == last,
            })
            .collect();

        debug!(
            chunks = chunks.len(),
            bytes = chunks.iter().map(|c| c.bytes.len()).sum::<usize>(),
            "Receipt composed"
        );
        chunks
    }

    /// Render the document as one unpaced byte stream
    pub fn compose_bytes(&self, document: &ReceiptDocument) -> Vec<u8> {
        let mut b = self.builder();
        for render in Self::SECTIONS {
            render(self, &mut b, document);
        }
        b.build()
    }

    const SECTIONS: [Section; 7] = [
        Self::render_config,
        Self::render_header,
        Self::render_body,
        Self::render_items,
        Self::render_totals,
        Self::render_footer,
        Self::render_cut,
    ];

    fn builder(&self) -> EscPosBuilder {
        EscPosBuilder::new(self.profile.language.codepage)
    }

    fn render_config(&self, b: &mut EscPosBuilder, _document: &ReceiptDocument) -> bool {
        b.commands(&self.profile.setup.commands());
        b.select_codepage();
        true
    }

    fn render_header(&self, b: &mut EscPosBuilder, document: &ReceiptDocument) -> bool {
        let Some(header) = &document.header else {
            return false;
        };

        self.render_logo(b, header);

        centered_bold(b, "");
        if let Some(title) = &header.title {
            centered_bold(b, &title_line(title));
        }
        for subtitle in header.subtitle.iter().flatten() {
            for line in wrap_words(subtitle, LINE_WIDTH) {
                centered_bold(b, &line);
            }
        }
        fragment(b, " ", false, true);
        true
    }

    fn render_logo(&self, b: &mut EscPosBuilder, header: &ReceiptHeader) {
        let Some(logo) = &header.logo else {
            return;
        };
        let data = match base64::engine::general_purpose::STANDARD.decode(logo.trim()) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Logo is not valid base64, skipping");
                return;
            }
        };
        if let Some(raster) = netprint_escpos::rasterize_logo(&data, LOGO_MAX_DOTS) {
            b.raw(&raster);
        }
    }

    fn render_body(&self, b: &mut EscPosBuilder, document: &ReceiptDocument) -> bool {
        let Some(body) = &document.body else {
            return false;
        };

        b.reset_size().left();
        for pair in body {
            if pair.label.is_none() && pair.value.is_none() {
                continue;
            }
            let label = pair.label.as_deref().unwrap_or_default();
            let value = pair.value.as_ref().map(FieldValue::display).unwrap_or_default();
            fragment(b, &limited(label, BODY_LABEL_WIDTH), false, false);
            fragment(b, &limited(&value, BODY_VALUE_WIDTH), false, true);
        }
        true
    }

    fn render_items(&self, b: &mut EscPosBuilder, document: &ReceiptDocument) -> bool {
        let Some(items) = &document.items else {
            return false;
        };
        let labels = &self.profile.language.labels;

        fragment(b, " ", false, true);
        divider(b);
        fragment(b, " ", false, true);

        b.reset_size().left();
        let header = format!(
            "{} {} {}",
            limited(&labels.name, NAME_WIDTH),
            limited(&labels.quantity, QUANTITY_WIDTH),
            limited(&labels.sum, SUM_WIDTH),
        );
        fragment(b, &header, true, true);

        for item in items {
            fragment(b, &item_row(item), false, true);
        }

        fragment(b, " ", false, true);
        divider(b);
        fragment(b, " ", false, true);
        b.newline();
        true
    }

    fn render_totals(&self, b: &mut EscPosBuilder, document: &ReceiptDocument) -> bool {
        let Some(totals) = &document.totals else {
            return false;
        };
        let labels = &self.profile.language.labels;

        b.reset_size().left();
        if let Some(discount) = &totals.discount {
            fragment(b, &limited(&labels.discount, TOTALS_WIDTH), false, false);
            fragment(b, &limited(&discount_text(discount), TOTALS_WIDTH), false, true);
        }

        if let Some(amount) = &totals.amount_due {
            let line = format!(
                "{}{}",
                limited(&labels.amount_due, TOTALS_WIDTH),
                limited(&money_text(amount), TOTALS_WIDTH),
            );
            b.bold(true).scale(CharScale::DOUBLE_HEIGHT).line(&line).bold(false).reset_size();
        }

        self.render_payments(b, totals);
        true
    }

    fn render_payments(&self, b: &mut EscPosBuilder, totals: &ReceiptTotals) {
        for LabeledValue { label, value } in totals.payments.iter().flatten() {
            if label.is_none() && value.is_none() {
                continue;
            }
            let label = label.as_deref().unwrap_or_default();
            let value = value.as_ref().map(money_text).unwrap_or_default();
            fragment(b, &limited(label, TOTALS_WIDTH), false, false);
            fragment(b, &limited(&value, TOTALS_WIDTH), true, true);
        }
    }

    fn render_footer(&self, b: &mut EscPosBuilder, document: &ReceiptDocument) -> bool {
        let Some(footer) = &document.footer else {
            return false;
        };

        b.reset_size().left().newline();
        for line in footer {
            centered_bold(b, line);
        }
        true
    }

    fn render_cut(&self, b: &mut EscPosBuilder, _document: &ReceiptDocument) -> bool {
        b.cut(CutMode::FeedAndPartial(10));
        true
    }
}

/// `name(24) qty(6) sum(9)`; missing fields leave their column blank
fn item_row(item: &ReceiptItem) -> String {
    let name = limited(item.name.as_deref().unwrap_or_default(), NAME_WIDTH);
    let quantity = match item.quantity {
        Some(quantity) => centered_quantity(quantity),
        None => limited("", QUANTITY_WIDTH),
    };
    let sum = limited(&item.sum.map(format_sum).unwrap_or_default(), SUM_WIDTH);
    format!("{} {} {}", name, quantity, sum)
}

fn discount_text(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(s) => printable_currency(&normalize_percent(s)),
        other => money_text(other),
    }
}

fn money_text(value: &FieldValue) -> String {
    match value {
        FieldValue::Integer(n) => n.to_string(),
        FieldValue::Number(n) => format_sum(*n),
        FieldValue::Text(s) => printable_currency(s),
    }
}

/// Centered, bold, normal size, own line
fn centered_bold(b: &mut EscPosBuilder, text: &str) {
    b.center().bold(true).reset_size().line(text).bold(false);
}

/// Text at normal size, optionally bold, optionally ending the line
fn fragment(b: &mut EscPosBuilder, text: &str, bold: bool, end_line: bool) {
    b.bold(bold).reset_size().text(text).bold(false);
    if end_line {
        b.newline();
    }
}

fn divider(b: &mut EscPosBuilder) {
    b.center().bold(false).reset_size().line(&"-".repeat(LINE_WIDTH)).left();
}

#[cfg(test)]
mod tests {
    use super::*;
    use netprint_escpos::Codepage;

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    fn sample() -> ReceiptDocument {
        ReceiptDocument {
            header: Some(ReceiptHeader {
                title: Some("ООО Ромашка".into()),
                subtitle: Some(vec!["ИНН 7700000000".into()]),
                logo: None,
            }),
            body: Some(vec![LabeledValue::new("Кассир", "Иванова")]),
            items: Some(vec![ReceiptItem::new("Наименование", 3, 12.5)]),
            totals: Some(ReceiptTotals {
                discount: Some("10.00%".into()),
                amount_due: Some("37.50 ₽".into()),
                payments: Some(vec![LabeledValue::new("Карта", "37.50 ₽")]),
            }),
            footer: Some(vec!["Спасибо".into()]),
        }
    }

    #[test]
    fn test_full_receipt_chunks() {
        let composer = ReceiptComposer::default();
        let chunks = composer.compose(&sample());

        assert_eq!(chunks.len(), 7);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence, i);
            assert_eq!(chunk.delay, Duration::from_millis(100 * i as u64));
            assert_eq!(chunk.is_final, i == 6);
            assert!(!chunk.bytes.is_empty());
        }
        assert_eq!(&chunks[0].bytes[..2], &[0x1B, 0x40]);
        assert_eq!(&chunks[0].bytes[chunks[0].bytes.len() - 3..], &[0x1B, 0x74, 17]);
        assert_eq!(chunks[6].bytes, vec![0x1D, 0x56, 66, 10]);
    }

    #[test]
    fn test_chunks_concatenate_to_unpaced_stream() {
        let composer = ReceiptComposer::default();
        for document in [sample(), ReceiptDocument::default()] {
            let joined: Vec<u8> = composer
                .compose(&document)
                .into_iter()
                .flat_map(|c| c.bytes)
                .collect();
            assert_eq!(joined, composer.compose_bytes(&document));
        }
    }

    #[test]
    fn test_empty_document_is_config_and_cut() {
        let chunks = ReceiptComposer::default().compose(&ReceiptDocument::default());
        assert_eq!(chunks.len(), 2);
        assert!(!chunks[0].is_final);
        assert!(chunks[1].is_final);
        assert_eq!(chunks[1].delay, Duration::from_millis(100));
    }

    #[test]
    fn test_item_row_layout() {
        let row = item_row(&ReceiptItem::new("Наименование", 3, 12.5));
        let expected = format!("{} {} {}", limited("Наименование", 24), "  3   ", "12.50    ");
        assert_eq!(row, expected);

        let chunks = ReceiptComposer::default().compose(&ReceiptDocument {
            items: Some(vec![ReceiptItem::new("Наименование", 3, 12.5)]),
            ..Default::default()
        });
        // Row text, bold off, line feed
        let mut encoded = Codepage::Cp866.encode(&expected);
        encoded.extend_from_slice(&[0x1B, 0x45, 0x00, 0x0A]);
        assert!(contains(&chunks[1].bytes, &encoded));
    }

    #[test]
    fn test_item_row_missing_fields_keep_columns() {
        let row = item_row(&ReceiptItem {
            name: Some("Чай".into()),
            quantity: None,
            sum: None,
        });
        assert_eq!(row.chars().count(), NAME_WIDTH + 1 + 6 + 1 + SUM_WIDTH);
    }

    #[test]
    fn test_header_title_and_wrapped_subtitle() {
        let long_title = "T".repeat(50);
        let document = ReceiptDocument {
            header: Some(ReceiptHeader {
                title: Some(long_title),
                subtitle: Some(vec![format!("{} {}", "a".repeat(30), "b".repeat(15))]),
                logo: None,
            }),
            ..Default::default()
        };
        let bytes = &ReceiptComposer::default().compose(&document)[1].bytes;

        let mut title = "T".repeat(40).into_bytes();
        title.push(0x0A);
        assert!(contains(bytes, &title));
        assert!(!contains(bytes, "T".repeat(41).as_bytes()));

        let mut first = "a".repeat(30).into_bytes();
        first.push(0x0A);
        assert!(contains(bytes, &first));
        let mut second = "b".repeat(15).into_bytes();
        second.push(0x0A);
        assert!(contains(bytes, &second));
    }

    #[test]
    fn test_totals_rendering() {
        let document = ReceiptDocument {
            totals: sample().totals,
            ..Default::default()
        };
        let bytes = &ReceiptComposer::default().compose(&document)[1].bytes;

        // Discount value normalized, currency rewritten
        assert!(contains(bytes, &Codepage::Cp866.encode(&limited("10%", 20))));
        let amount = format!("{}{}", limited("Amount due", 20), limited("37.50 Р", 20));
        let mut expected = vec![0x1B, 0x45, 0x01, 0x1D, 0x21, 0x01];
        expected.extend(Codepage::Cp866.encode(&amount));
        expected.push(0x0A);
        assert!(contains(bytes, &expected));
        // Payment value in bold
        let mut payment = vec![0x1B, 0x45, 0x01, 0x1D, 0x21, 0x00];
        payment.extend(Codepage::Cp866.encode(&limited("37.50 Р", 20)));
        assert!(contains(bytes, &payment));
    }

    #[test]
    fn test_numeric_totals() {
        let document = ReceiptDocument {
            totals: Some(ReceiptTotals {
                discount: Some(FieldValue::Number(5.5)),
                amount_due: Some(FieldValue::Integer(120)),
                payments: None,
            }),
            ..Default::default()
        };
        let bytes = &ReceiptComposer::default().compose(&document)[1].bytes;
        assert!(contains(bytes, limited("5.50", 20).as_bytes()));
        assert!(contains(bytes, limited("120", 20).as_bytes()));
    }

    #[test]
    fn test_body_pairs_are_padded_and_truncated() {
        let document = ReceiptDocument {
            body: Some(vec![
                LabeledValue::new("Очень длинная подпись поля", 42i64),
                LabeledValue::default(),
            ]),
            ..Default::default()
        };
        let bytes = &ReceiptComposer::default().compose(&document)[1].bytes;
        let label = Codepage::Cp866.encode(&limited("Очень длинная подпись поля", 20));
        assert!(contains(bytes, &label));
        let mut value = limited("42", 18).into_bytes();
        value.extend_from_slice(&[0x1B, 0x45, 0x00, 0x0A]);
        assert!(contains(bytes, &value));
    }

    #[test]
    fn test_russian_labels_and_windows_codepage() {
        let mut profile = PrinterProfile::default();
        profile.language.labels = crate::receipt::ReceiptLabels::russian();
        profile.language.codepage = Codepage::Windows1251;
        let composer = ReceiptComposer::new(profile);

        let chunks = composer.compose(&ReceiptDocument {
            items: Some(vec![]),
            ..Default::default()
        });
        assert_eq!(&chunks[0].bytes[chunks[0].bytes.len() - 3..], &[0x1B, 0x74, 46]);
        assert!(contains(
            &chunks[1].bytes,
            &Codepage::Windows1251.encode("Наименование")
        ));
    }

    #[test]
    fn test_custom_chunk_interval() {
        let profile = PrinterProfile {
            chunk_interval: Duration::from_millis(40),
            ..Default::default()
        };
        let chunks = ReceiptComposer::new(profile).compose(&sample());
        assert_eq!(chunks[3].delay, Duration::from_millis(120));
    }

    #[test]
    fn test_huge_chunk_interval_saturates() {
        let profile = PrinterProfile {
            chunk_interval: Duration::MAX,
            ..Default::default()
        };
        let chunks = ReceiptComposer::new(profile).compose(&sample());
        assert_eq!(chunks[0].delay, Duration::ZERO);
        assert_eq!(chunks[2].delay, Duration::MAX);
    }

    #[test]
    fn test_invalid_logo_is_skipped() {
        let mut document = sample();
        if let Some(header) = document.header.as_mut() {
            header.logo = Some("%%%".into());
        }
        let with_bad_logo = ReceiptComposer::default().compose(&document);
        let without_logo = ReceiptComposer::default().compose(&sample());
        assert_eq!(with_bad_logo, without_logo);
    }
}
