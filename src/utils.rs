use chrono::{Days, NaiveDate};

/// Day zero of the Excel 1900 date system, adjusted for the phantom 1900-02-29.
fn excel_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or(NaiveDate::MIN)
}

/// Converts an Excel serial day number (1900 system) into a calendar date.
/// Any time-of-day fraction is discarded.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    excel_epoch().checked_add_days(Days::new(serial.floor() as u64))
}

/// Converts a calendar date into an Excel serial day number (1900 system).
pub fn date_to_excel_serial(date: NaiveDate) -> f64 {
    date.signed_duration_since(excel_epoch()).num_days() as f64
}

/// Parses the textual date layouts found in the source workbooks.
/// Accepts ISO dates (optionally with a time part) and `DD/MM/YYYY`.
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    let date_part = text.split(['T', ' ']).next().unwrap_or(text);

    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%d/%m/%Y"))
        .ok()
}

/// Actual day count between two dates (ACT numerator).
pub fn days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    end.signed_duration_since(start).num_days()
}

/// ACT/360 simple interest: `residual * coupon * days / 360`.
///
/// The coupon is used exactly as it appears in the source sheet (e.g. `5` for
/// 5%); no unit conversion is applied.
pub fn act360_interest(residual: f64, coupon: f64, start: NaiveDate, end: NaiveDate) -> f64 {
    (residual * coupon * days_between(start, end) as f64) / 360.0
}

/// Converts a 1-based column number to spreadsheet letters (1 -> A, 27 -> AA).
pub fn column_letters(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = ((col - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        col = (col - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Parses an A1-style reference (`$` markers allowed) into 1-based (row, col).
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    let cleaned: String = cell_ref.chars().filter(|c| *c != '$').collect();
    let split = cleaned.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cleaned.split_at(split);

    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let mut col: u32 = 0;
    for ch in letters.chars() {
        col = col
            .checked_mul(26)?
            .checked_add(ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
    }
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }

    Some((row, col))
}
