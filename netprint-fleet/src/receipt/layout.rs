//! Fixed-column text layout for 40-column receipts

use netprint_escpos::{pad, text_width, truncate};

/// Printable columns on 80 mm paper with font A
pub const LINE_WIDTH: usize = 40;

/// Quantity column width in the item table
pub const QUANTITY_WIDTH: usize = 6;

/// Truncate then left-align to exactly `width` columns
///
/// Applying it twice gives the same result as applying it once.
pub fn limited(s: &str, width: usize) -> String {
    pad(s, width, false)
}

/// Centre a quantity in the six-column item table cell
///
/// Odd-length numbers lean left: `3` renders as `"  3   "`.
pub fn centered_quantity(quantity: i64) -> String {
    let digits = quantity.to_string();
    let len = text_width(&digits);

    let (body, margin) = if len % 2 == 1 {
        (format!("{}  ", digits), 3usize.saturating_sub(len))
    } else {
        (digits, 4usize.saturating_sub(len))
    };
    let spaces = " ".repeat(margin);

    limited(&format!("{}{}{}", spaces, body, spaces), QUANTITY_WIDTH)
}

/// Greedy word wrap on single spaces
///
/// Words longer than `limit` are kept whole on their own line. Runs of
/// spaces are preserved inside a line.
pub fn wrap_words(text: &str, limit: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split(' ') {
        if current.is_empty() {
            current.push_str(word);
        } else if text_width(&current) + 1 + text_width(word) <= limit {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Money with two decimals, `12.5` -> `"12.50"`
pub fn format_sum(sum: f64) -> String {
    format!("{:.2}", sum)
}

/// Rewrite the ruble sign into the Cyrillic letter printers can render
pub fn printable_currency(s: &str) -> String {
    s.replace('₽', "Р")
}

/// `"10.00%"` -> `"10%"`; anything that is not a percentage is unchanged
pub fn normalize_percent(s: &str) -> String {
    let trimmed = s.trim();
    let Some(number) = trimmed.strip_suffix('%') else {
        return s.to_string();
    };
    match number.trim().replace(',', ".").parse::<f64>() {
        Ok(value) if value.is_finite() => format!("{}%", value.round() as i64),
        _ => s.to_string(),
    }
}

/// Cut a title to one printed line
pub fn title_line(title: &str) -> String {
    truncate(title, LINE_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limited_idempotent() {
        for (s, w) in [("Наименование", 24), ("abc", 2), ("", 5), ("exact", 5)] {
            let once = limited(s, w);
            assert_eq!(text_width(&once), w);
            assert_eq!(limited(&once, w), once);
        }
    }

    #[test]
    fn test_centered_quantity() {
        assert_eq!(centered_quantity(3), "  3   ");
        assert_eq!(centered_quantity(12), "  12  ");
        assert_eq!(centered_quantity(123), "123   ");
        assert_eq!(centered_quantity(1234), "1234  ");
        assert_eq!(centered_quantity(1234567), "123456");
        for n in [0, 7, 42, 999, -1] {
            assert_eq!(text_width(&centered_quantity(n)), QUANTITY_WIDTH);
        }
    }

    #[test]
    fn test_wrap_words() {
        let text = "Общество с ограниченной ответственностью Ромашка и партнеры";
        let lines = wrap_words(text, 40);
        assert_eq!(
            lines,
            vec![
                "Общество с ограниченной ответственностью",
                "Ромашка и партнеры",
            ]
        );
        assert!(lines.iter().all(|l| text_width(l) <= 40));

        assert_eq!(wrap_words("", 40), Vec::<String>::new());
        assert_eq!(wrap_words("short", 40), vec!["short"]);
        let long = "x".repeat(45);
        assert_eq!(wrap_words(&format!("a {}", long), 40), vec!["a".to_string(), long]);
    }

    #[test]
    fn test_format_sum() {
        assert_eq!(format_sum(12.5), "12.50");
        assert_eq!(format_sum(100.0), "100.00");
        assert_eq!(format_sum(3.0), "3.00");
    }

    #[test]
    fn test_normalize_percent() {
        assert_eq!(normalize_percent("10.00%"), "10%");
        assert_eq!(normalize_percent("7,5 %"), "8%");
        assert_eq!(normalize_percent("150 ₽"), "150 ₽");
        assert_eq!(normalize_percent("abc%"), "abc%");
    }

    #[test]
    fn test_printable_currency() {
        assert_eq!(printable_currency("1 250,00 ₽"), "1 250,00 Р");
    }
}
