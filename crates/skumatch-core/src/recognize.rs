use regex::Regex;
use tracing::debug;

use crate::config::CompiledConfig;
use crate::model::{BBox, PositionedText, RecognizedCode};
use crate::normalize::normalize_code;

/// Words that can sit in a code column without being codes.
const REJECTED_WORDS: &[&str] = &["TOTAL", "SUBTOTAL", "GRANDTOTAL", "PAGE"];

/// Unit suffixes of sizes printed next to products, such as `600MM`.
const SIZE_UNITS: &[&str] = &["MM", "CM", "IN", "KG", "ML", "KW"];

/// How far left (in multiples of the run height) a preceding run on the same
/// line may end and still be read as part of the phrase before a code.
const ADJACENT_GAP_FACTOR: f32 = 3.0;

/// Characters that end a clause. A dependency phrase before one of these does
/// not apply to codes after it.
const CLAUSE_BREAKS: &[char] = &['.', ';'];

/// Finds product codes in positioned text.
#[derive(Debug, Clone)]
pub struct CodeRecognizer {
    code_re: Regex,
    dependency_re: Regex,
    min_len: usize,
    max_len: usize,
}

impl CodeRecognizer {
    pub fn new(config: &CompiledConfig) -> Self {
        CodeRecognizer {
            code_re: config.code_re.clone(),
            dependency_re: config.dependency_re.clone(),
            min_len: config.config.min_code_len,
            max_len: config.config.max_code_len,
        }
    }

    /// Recognize codes on one page's text runs, in run order.
    ///
    /// Greyed runs yield nothing. Codes following a dependency phrase are
    /// returned with `is_dependent` set. Repeated codes are all returned.
    pub fn recognize(&self, texts: &[PositionedText]) -> Vec<RecognizedCode> {
        let mut codes = Vec::new();

        for (idx, run) in texts.iter().enumerate() {
            for m in self.code_re.find_iter(&run.text) {
                let key = normalize_code(m.as_str());
                if !is_valid_code(&key, self.min_len, self.max_len) {
                    continue;
                }
                if run.style.is_greyed {
                    debug!(page = run.page, code = m.as_str(), "discarding greyed code");
                    continue;
                }

                let mut before = self.line_prefix(texts, idx);
                before.push_str(&run.text[..m.start()]);
                let is_dependent = self.follows_dependency_phrase(&before);
                if is_dependent {
                    debug!(page = run.page, code = m.as_str(), "code is a dependency");
                }

                codes.push(RecognizedCode {
                    raw_text: m.as_str().to_string(),
                    normalized_key: key,
                    page: run.page,
                    bbox: span_bbox(run, m.start(), m.end()),
                    is_dependent,
                });
            }
        }

        codes
    }

    fn follows_dependency_phrase(&self, before: &str) -> bool {
        let clause = match before.rfind(CLAUSE_BREAKS) {
            Some(pos) => &before[pos + 1..],
            None => before,
        };
        self.dependency_re.is_match(clause)
    }

    /// Text of the runs immediately to the left of `texts[idx]` on the same
    /// line, joined left to right with a trailing space.
    fn line_prefix(&self, texts: &[PositionedText], idx: usize) -> String {
        let run = &texts[idx];
        let max_gap = run.bbox.height() * ADJACENT_GAP_FACTOR;
        let mut left_edge = run.bbox.x0;
        let mut chain: Vec<usize> = Vec::new();

        while chain.len() < texts.len() {
            let neighbour = texts
                .iter()
                .enumerate()
                .filter(|(j, other)| {
                    *j != idx
                        && other.page == run.page
                        && other.bbox.overlaps_vertically(&run.bbox)
                        && other.bbox.x0 < left_edge
                        && other.bbox.x1 <= left_edge + run.bbox.height() * 0.5
                        && left_edge - other.bbox.x1 <= max_gap
                })
                .max_by(|(_, a), (_, b)| a.bbox.x1.total_cmp(&b.bbox.x1));
            match neighbour {
                Some((j, other)) => {
                    chain.push(j);
                    left_edge = other.bbox.x0;
                }
                None => break,
            }
        }

        let mut prefix = String::new();
        for j in chain.into_iter().rev() {
            prefix.push_str(&texts[j].text);
            prefix.push(' ');
        }
        prefix
    }
}

/// Whether a normalized key is plausible as a product code: within the
/// length bounds, with at least one digit and at least one non-digit, and
/// not a size such as `600MM` or `1200X600`.
pub fn is_valid_code(key: &str, min_len: usize, max_len: usize) -> bool {
    let len = key.chars().count();
    if len < min_len || len > max_len {
        return false;
    }
    if !key.chars().all(char::is_alphanumeric) {
        return false;
    }
    let has_digit = key.chars().any(|c| c.is_ascii_digit());
    let all_digits = key.chars().all(|c| c.is_ascii_digit());
    has_digit && !all_digits && !REJECTED_WORDS.contains(&key) && !is_size(key)
}

/// Digits with a unit suffix, or digit groups joined by `X` with an optional
/// unit after the last group.
fn is_size(key: &str) -> bool {
    let mut rest = key;
    loop {
        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            return false;
        }
        rest = &rest[digits..];
        if rest.is_empty() || SIZE_UNITS.contains(&rest) {
            return true;
        }
        match rest.strip_prefix('X') {
            Some(next) => rest = next,
            None => return false,
        }
    }
}

/// Box of the characters `start..end` (byte offsets) of a run, assuming
/// evenly spaced glyphs.
fn span_bbox(run: &PositionedText, start: usize, end: usize) -> BBox {
    let total = run.text.chars().count().max(1) as f32;
    let before = run.text[..start].chars().count() as f32;
    let len = run.text[start..end].chars().count() as f32;
    let width = run.bbox.width();
    BBox::new(
        run.bbox.x0 + width * before / total,
        run.bbox.top,
        run.bbox.x0 + width * (before + len) / total,
        run.bbox.bottom,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchConfig;
    use crate::model::StyleHint;

    fn recognizer() -> CodeRecognizer {
        CodeRecognizer::new(&MatchConfig::default().compile().unwrap())
    }

    fn run(text: &str, x0: f32, top: f32) -> PositionedText {
        let width = text.chars().count() as f32 * 6.0;
        PositionedText {
            text: text.to_string(),
            page: 1,
            bbox: BBox::new(x0, top, x0 + width, top + 12.0),
            style: StyleHint::default(),
        }
    }

    fn grey(mut text: PositionedText) -> PositionedText {
        text.style.is_greyed = true;
        text
    }

    #[test]
    fn greyed_duplicate_is_discarded() {
        let codes = recognizer().recognize(&[run("K-1001", 100.0, 100.0), grey(run("K-1001A", 100.0, 300.0))]);
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].normalized_key, "K1001");
        assert_eq!(codes[0].raw_text, "K-1001");
        assert!(!codes[0].is_dependent);
    }

    #[test]
    fn phrase_in_same_run_marks_dependent() {
        let codes = recognizer().recognize(&[
            run("K-2002", 100.0, 100.0),
            run("Must order with K-2002", 100.0, 200.0),
        ]);
        assert_eq!(codes.len(), 2);
        assert!(!codes[0].is_dependent);
        assert!(codes[1].is_dependent);
        assert_eq!(codes[1].normalized_key, "K2002");
    }

    #[test]
    fn phrase_in_adjacent_run_marks_dependent() {
        let codes = recognizer().recognize(&[
            run("Requires", 100.0, 200.0),
            run("K-3003", 154.0, 200.0),
        ]);
        assert_eq!(codes.len(), 1);
        assert!(codes[0].is_dependent);
    }

    #[test]
    fn phrase_on_other_line_does_not_apply() {
        let codes = recognizer().recognize(&[
            run("Must order with", 100.0, 200.0),
            run("K-3003", 100.0, 220.0),
        ]);
        assert_eq!(codes.len(), 1);
        assert!(!codes[0].is_dependent);
    }

    #[test]
    fn phrase_in_distant_column_does_not_apply() {
        let codes = recognizer().recognize(&[
            run("Must order with", 50.0, 200.0),
            run("K-4004", 400.0, 200.0),
        ]);
        assert!(!codes[0].is_dependent);
    }

    #[test]
    fn phrase_in_earlier_sentence_does_not_apply() {
        let codes = recognizer().recognize(&[run("Requires drain. K-5005 Faucet", 100.0, 100.0)]);
        assert_eq!(codes.len(), 1);
        assert!(!codes[0].is_dependent);
    }

    #[test]
    fn repeated_codes_are_kept() {
        let codes = recognizer().recognize(&[
            run("K-1001", 100.0, 100.0),
            run("K-1001", 300.0, 100.0),
        ]);
        assert_eq!(codes.len(), 2);
        assert_eq!(codes[0].normalized_key, codes[1].normalized_key);
    }

    #[test]
    fn prices_and_words_are_not_codes() {
        let codes = recognizer().recognize(&[run("TOTAL 1,234.00 USD 450", 100.0, 100.0)]);
        assert!(codes.is_empty());
    }

    #[test]
    fn several_codes_in_one_run_get_their_own_boxes() {
        let codes = recognizer().recognize(&[run("K-10 K-20", 0.0, 0.0)]);
        assert_eq!(codes.len(), 2);
        // 9 chars of 6pt each
        assert_eq!(codes[0].bbox, BBox::new(0.0, 0.0, 24.0, 12.0));
        assert_eq!(codes[1].bbox, BBox::new(30.0, 0.0, 54.0, 12.0));
    }

    #[test]
    fn validity_rules() {
        assert!(is_valid_code("K1001", 3, 24));
        assert!(!is_valid_code("K1", 3, 24));
        assert!(!is_valid_code("123456", 3, 24));
        assert!(!is_valid_code("ABCDEF", 3, 24));
        assert!(!is_valid_code("K1,5", 3, 24));
        assert!(!is_valid_code("K10000000000", 3, 8));
    }

    #[test]
    fn sizes_are_not_codes() {
        assert!(!is_valid_code("600MM", 3, 24));
        assert!(!is_valid_code("1200X600", 3, 24));
        assert!(!is_valid_code("600X600MM", 3, 24));
        assert!(is_valid_code("1001A", 3, 24));
        assert!(is_valid_code("K600MM", 3, 24));
        assert!(is_valid_code("1200XL", 3, 24));
    }

    #[test]
    fn size_beside_code_does_not_take_its_place() {
        let codes = recognizer().recognize(&[run("K-1001 BASIN 600MM 1200X600", 100.0, 100.0)]);
        let keys: Vec<&str> = codes.iter().map(|c| c.normalized_key.as_str()).collect();
        assert_eq!(keys, vec!["K1001"]);
    }
}
