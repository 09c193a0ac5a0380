//! Peso amount parsing for printed statement values

/// Parse a printed amount such as `$1,234.56`, `- $2,000.00` or `(15.00)`.
///
/// Currency symbols, spaces and thousands separators are ignored. A minus
/// sign (leading or trailing) or surrounding parentheses make the result
/// negative. Returns `None` when anything else is left over.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let mut s = raw.trim();
    for suffix in ["MXN", "M.N.", "MN"] {
        if let Some(stripped) = strip_suffix_ignore_case(s, suffix) {
            s = stripped.trim_end();
            break;
        }
    }

    let mut negative = false;
    let mut open_paren = false;
    let mut close_paren = false;
    let mut body = String::with_capacity(s.len());

    for ch in s.chars() {
        match ch {
            '$' | ',' | ' ' | '\u{a0}' | '+' => {}
            '-' | '\u{2212}' => negative = true,
            '(' => open_paren = true,
            ')' => close_paren = true,
            '0'..='9' | '.' => body.push(ch),
            _ => return None,
        }
    }

    if !body.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: f64 = body.parse().ok()?;
    let value = round_cents(value);
    if negative || (open_paren && close_paren) {
        Some(-value)
    } else {
        Some(value)
    }
}

/// Round to two decimals.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// True when two amounts agree to the cent.
pub fn amounts_match(a: f64, b: f64) -> bool {
    (a - b).abs() <= 0.01 + 1e-9
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let cut = s.len().checked_sub(suffix.len())?;
    if !s.is_char_boundary(cut) {
        return None;
    }
    let (head, tail) = s.split_at(cut);
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}
