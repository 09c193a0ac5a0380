//! Date parsing for the formats printed on Mexican statements:
//! `15-ENE-2023`, `15 ENE 23`, `15/ENE`, `15-ENE`, `15/01/2023` and ISO `2023-01-15`.

use chrono::{Datelike, NaiveDate};

/// Month number for a Spanish (or English) month name or abbreviation.
pub fn month_number(token: &str) -> Option<u32> {
    let upper = token.trim().trim_end_matches('.').to_uppercase();
    let prefix: String = upper.chars().take(3).collect();
    if prefix.chars().count() < 3 {
        return None;
    }
    let month = match prefix.as_str() {
        "ENE" | "JAN" => 1,
        "FEB" => 2,
        "MAR" => 3,
        "ABR" | "APR" => 4,
        "MAY" => 5,
        "JUN" => 6,
        "JUL" => 7,
        "AGO" | "AUG" => 8,
        "SEP" | "SET" => 9,
        "OCT" => 10,
        "NOV" => 11,
        "DIC" | "DEC" => 12,
        _ => return None,
    };
    Some(month)
}

/// Parse a printed statement date.
///
/// `context` is the statement's period end. It supplies the year when none
/// is printed (stepping back a year when the month is later than the
/// context month) and the century for two-digit years. Without a context a
/// date lacking its year cannot be resolved.
pub fn parse_statement_date(raw: &str, context: Option<NaiveDate>) -> Option<NaiveDate> {
    let tokens: Vec<&str> = raw
        .split(|c: char| matches!(c, '-' | '/' | ' ' | '.' | ','))
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("de"))
        .collect();

    if tokens.len() == 3 && tokens[0].len() == 4 && is_digits(tokens[0]) {
        let year: i32 = tokens[0].parse().ok()?;
        let month: u32 = tokens[1].parse().ok()?;
        let day: u32 = tokens[2].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if !(2..=3).contains(&tokens.len()) {
        return None;
    }
    if !is_digits(tokens[0]) || tokens[0].len() > 2 {
        return None;
    }
    let day: u32 = tokens[0].parse().ok()?;
    let month = if is_digits(tokens[1]) {
        let m: u32 = tokens[1].parse().ok()?;
        (1..=12).contains(&m).then_some(m)?
    } else {
        month_number(tokens[1])?
    };

    let year = match tokens.get(2) {
        Some(y) if is_digits(y) && y.len() == 4 => y.parse().ok()?,
        Some(y) if is_digits(y) && y.len() == 2 => expand_two_digit_year(y.parse().ok()?, context),
        Some(_) => return None,
        None => {
            let ctx = context?;
            if month > ctx.month() {
                ctx.year() - 1
            } else {
                ctx.year()
            }
        }
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

fn expand_two_digit_year(yy: i32, context: Option<NaiveDate>) -> i32 {
    let reference = context.map(|c| c.year()).unwrap_or(2000 + yy);
    let mut year = (reference / 100) * 100 + yy;
    if year > reference + 1 {
        year -= 100;
    } else if year < reference - 98 {
        year += 100;
    }
    year
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_spanish_months() {
        assert_eq!(month_number("ENE"), Some(1));
        assert_eq!(month_number("ago"), Some(8));
        assert_eq!(month_number("Sept."), Some(9));
        assert_eq!(month_number("Diciembre"), Some(12));
        assert_eq!(month_number("XYZ"), None);
        assert_eq!(month_number("EN"), None);
    }

    #[test]
    fn test_full_dates() {
        assert_eq!(parse_statement_date("15-ENE-2023", None), Some(d(2023, 1, 15)));
        assert_eq!(parse_statement_date("02 feb 23", None), Some(d(2023, 2, 2)));
        assert_eq!(parse_statement_date("15/01/2023", None), Some(d(2023, 1, 15)));
        assert_eq!(parse_statement_date("2023-01-15", None), Some(d(2023, 1, 15)));
        assert_eq!(parse_statement_date("15 de enero de 2023", None), Some(d(2023, 1, 15)));
    }

    #[test]
    fn test_year_from_context() {
        let ctx = Some(d(2023, 1, 31));
        assert_eq!(parse_statement_date("15/ENE", ctx), Some(d(2023, 1, 15)));
        // December purchase on a January statement belongs to the previous year
        assert_eq!(parse_statement_date("28-DIC", ctx), Some(d(2022, 12, 28)));
        assert_eq!(parse_statement_date("15-ENE", None), None);
    }

    #[test]
    fn test_two_digit_year_uses_context_century() {
        assert_eq!(parse_statement_date("31 DIC 99", Some(d(2000, 1, 15))), Some(d(1999, 12, 31)));
        assert_eq!(parse_statement_date("01 ENE 24", Some(d(2023, 12, 31))), Some(d(2024, 1, 1)));
    }

    #[test]
    fn test_invalid() {
        assert_eq!(parse_statement_date("31-FEB-2023", None), None);
        assert_eq!(parse_statement_date("OXXO", None), None);
        assert_eq!(parse_statement_date("15-XYZ-2023", None), None);
        assert_eq!(parse_statement_date("", None), None);
    }
}
