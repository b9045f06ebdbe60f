/// Normalize a product code to its lookup key.
///
/// Steps:
/// 1. Drop whitespace
/// 2. Drop hyphens and dash variants (en/em dash, minus sign, ...)
/// 3. Drop `_` and `/` separators
/// 4. Uppercase
///
/// Used for codes read from the PDF and for codes read from the spreadsheet,
/// so both sides meet in the same key space. Idempotent.
pub fn normalize_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !is_separator(*c))
        .flat_map(char::to_uppercase)
        .collect()
}

fn is_separator(c: char) -> bool {
    matches!(
        c,
        '-' | '_' | '/' | '\u{2010}'..='\u{2015}' | '\u{2212}' | '\u{FE58}' | '\u{FE63}' | '\u{FF0D}'
    )
}
