pub mod lopdf;

use crate::error::SkumatchError;
use crate::model::ScannedPage;

/// Opens PDF bytes into a document that can be scanned page by page.
pub trait DocumentScanner: Send + Sync {
    /// Parse the document. Fails with `DocumentRead` when the bytes are not a
    /// readable PDF.
    fn open(&self, pdf_bytes: &[u8]) -> Result<Box<dyn ScannedDocument>, SkumatchError>;

    /// Name of this scanning backend (for diagnostics).
    fn backend_name(&self) -> &str;
}

/// An opened document. Pages are scanned on demand, so a caller can stop
/// early without paying for the rest of the file.
pub trait ScannedDocument {
    fn page_count(&self) -> u32;

    /// Scan one page (1-based). Fails with `PageDecode` for a corrupt page.
    fn scan_page(&self, page: u32) -> Result<ScannedPage, SkumatchError>;
}

impl dyn ScannedDocument + '_ {
    /// Lazily scan every page in order. Calling this again restarts from the
    /// first page.
    pub fn pages(&self) -> Pages<'_> {
        Pages::new(self)
    }
}

/// Page-by-page iterator over a [`ScannedDocument`].
pub struct Pages<'a> {
    doc: &'a dyn ScannedDocument,
    next: u32,
}

impl<'a> Pages<'a> {
    pub fn new(doc: &'a dyn ScannedDocument) -> Self {
        Pages { doc, next: 1 }
    }
}

impl Iterator for Pages<'_> {
    type Item = Result<ScannedPage, SkumatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.doc.page_count() {
            return None;
        }
        let page = self.next;
        self.next += 1;
        Some(self.doc.scan_page(page))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.doc.page_count() + 1).saturating_sub(self.next) as usize;
        (left, Some(left))
    }
}

/// Decides whether a fill colour renders text as a greyed-out decoy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GreyRule {
    /// Luminance (0..1) at or above which a neutral colour is grey.
    pub luminance: f32,
    /// Largest channel spread still considered neutral.
    pub max_saturation: f32,
    /// Fill alpha below which text is faded regardless of colour.
    pub alpha: f32,
}

impl Default for GreyRule {
    fn default() -> Self {
        GreyRule {
            luminance: 0.55,
            max_saturation: 0.15,
            alpha: 0.7,
        }
    }
}

impl GreyRule {
    pub fn is_greyed(&self, rgb: [f32; 3], alpha: f32) -> bool {
        if alpha < self.alpha {
            return true;
        }
        let [r, g, b] = rgb;
        let spread = r.max(g).max(b) - r.min(g).min(b);
        let luminance = 0.299 * r + 0.587 * g + 0.114 * b;
        spread <= self.max_saturation && luminance >= self.luminance
    }
}
