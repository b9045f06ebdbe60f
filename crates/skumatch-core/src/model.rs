use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned box in page space: PDF points, origin at the top-left
/// corner of the page, y growing downward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub top: f32,
    pub x1: f32,
    pub bottom: f32,
}

impl BBox {
    pub fn new(x0: f32, top: f32, x1: f32, bottom: f32) -> Self {
        BBox {
            x0: x0.min(x1),
            top: top.min(bottom),
            x1: x0.max(x1),
            bottom: top.max(bottom),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.top + self.bottom) / 2.0)
    }

    /// Whether the two boxes share part of their vertical extent.
    pub fn overlaps_vertically(&self, other: &BBox) -> bool {
        self.top < other.bottom && other.top < self.bottom
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.1}, {:.1})-({:.1}, {:.1})",
            self.x0, self.top, self.x1, self.bottom
        )
    }
}

/// Rendering hints the recognizer needs, independent of the PDF library.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleHint {
    pub is_greyed: bool,
    pub is_bold: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionedText {
    pub text: String,
    pub page: u32,
    pub bbox: BBox,
    pub style: StyleHint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
}

impl ColorSpace {
    pub fn channels(self) -> u8 {
        match self {
            ColorSpace::Gray => 1,
            ColorSpace::Rgb => 3,
            ColorSpace::Cmyk => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Jpeg,
    Png,
    Jpeg2000,
    Gif,
    Unknown,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Jpeg => write!(f, "jpeg"),
            SourceFormat::Png => write!(f, "png"),
            SourceFormat::Jpeg2000 => write!(f, "jpeg2000"),
            SourceFormat::Gif => write!(f, "gif"),
            SourceFormat::Unknown => write!(f, "unknown"),
        }
    }
}

/// How the bytes of a [`PositionedImage`] are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ImageEncoding {
    /// A self-describing file format (JPEG, PNG, ...).
    Encoded { format: SourceFormat },
    /// Uncompressed samples as stored in a PDF image stream.
    Raw {
        width: u32,
        height: u32,
        bits_per_component: u8,
        color_space: ColorSpace,
    },
}

impl fmt::Display for ImageEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageEncoding::Encoded { format } => write!(f, "{format}"),
            ImageEncoding::Raw {
                width,
                height,
                bits_per_component,
                color_space,
            } => write!(
                f,
                "raw {width}x{height} {bits_per_component}bpc {color_space:?}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionedImage {
    /// Resource name of the XObject plus its draw index on the page.
    pub id: String,
    pub page: u32,
    pub bbox: BBox,
    #[serde(skip)]
    pub raw_bytes: Vec<u8>,
    pub encoding: ImageEncoding,
}

/// Everything the scanner found on one page, in reading order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScannedPage {
    pub page: u32,
    pub texts: Vec<PositionedText>,
    pub images: Vec<PositionedImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedCode {
    pub raw_text: String,
    pub normalized_key: String,
    pub page: u32,
    pub bbox: BBox,
    pub is_dependent: bool,
}

/// A resized PNG, always exactly the configured target size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedImage {
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub png: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeImageBinding {
    pub normalized_key: String,
    pub raw_code: String,
    pub page: u32,
    pub image_id: String,
    pub image: NormalizedImage,
}

/// A spreadsheet row carrying a product code, as reported by a row source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRef {
    pub sheet: String,
    /// Zero-based row index within the sheet.
    pub row: u32,
    /// Zero-based column holding the code.
    pub column: u32,
    /// Zero-based column images should be anchored in, when the sheet has one.
    pub image_column: Option<u32>,
    pub raw_code: String,
    pub key: String,
}

impl RowRef {
    /// A1-style reference of the cell the image is anchored to.
    pub fn image_cell(&self) -> String {
        cell_ref(self.row, self.image_column.unwrap_or(self.column))
    }
}

/// Convert zero-based (row, column) to an A1-style reference.
pub fn cell_ref(row: u32, column: u32) -> String {
    let mut letters = Vec::new();
    let mut n = column + 1;
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    let col: String = letters.into_iter().rev().collect();
    format!("{col}{}", row + 1)
}
