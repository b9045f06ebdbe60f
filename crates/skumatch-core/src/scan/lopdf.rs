use std::collections::HashMap;

use ::lopdf::content::{Content, Operation};
use ::lopdf::{Dictionary, Document, Encoding, Object, ObjectId, Stream};
use tracing::debug;

use crate::error::SkumatchError;
use crate::imaging::{detect_format, format_from_filter};
use crate::model::{
    BBox, ColorSpace, ImageEncoding, PositionedImage, PositionedText, ScannedPage, StyleHint,
};
use crate::scan::{DocumentScanner, GreyRule, ScannedDocument};

/// Rough glyph advance as a fraction of the font size. Font metrics are not
/// read, so run widths are estimates.
const APPROX_CHAR_WIDTH_RATIO: f32 = 0.5;

/// Nesting limit for Form XObjects drawing other Form XObjects.
const MAX_FORM_DEPTH: u8 = 8;

/// US Letter, used when a page has no readable MediaBox.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Scanning backend built on lopdf. Interprets page content streams to
/// position text runs and image draws.
pub struct LopdfScanner {
    grey: GreyRule,
}

impl LopdfScanner {
    pub fn new() -> Self {
        LopdfScanner {
            grey: GreyRule::default(),
        }
    }

    pub fn with_grey_rule(grey: GreyRule) -> Self {
        LopdfScanner { grey }
    }
}

impl Default for LopdfScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentScanner for LopdfScanner {
    fn open(&self, pdf_bytes: &[u8]) -> Result<Box<dyn ScannedDocument>, SkumatchError> {
        let doc = Document::load_mem(pdf_bytes)
            .map_err(|e| SkumatchError::DocumentRead(e.to_string()))?;
        if doc.is_encrypted() {
            return Err(SkumatchError::DocumentRead(
                "encrypted PDFs are not supported".into(),
            ));
        }
        let pages = doc.get_pages().into_values().collect();
        Ok(Box::new(LopdfDocument {
            doc,
            pages,
            grey: self.grey,
        }))
    }

    fn backend_name(&self) -> &str {
        "lopdf"
    }
}

struct LopdfDocument {
    doc: Document,
    pages: Vec<ObjectId>,
    grey: GreyRule,
}

impl ScannedDocument for LopdfDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn scan_page(&self, page: u32) -> Result<ScannedPage, SkumatchError> {
        let page_error = |reason: String| SkumatchError::PageDecode { page, reason };

        let page_id = page
            .checked_sub(1)
            .and_then(|i| self.pages.get(i as usize))
            .copied()
            .ok_or_else(|| page_error("no such page".into()))?;
        let page_dict = self
            .doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|e| page_error(format!("page object: {e}")))?;
        let content = self
            .doc
            .get_page_content(page_id)
            .map_err(|e| page_error(format!("content stream: {e}")))?;
        let operations = Content::decode(&content)
            .map_err(|e| page_error(format!("content stream: {e}")))?
            .operations;

        let media_box = inherited(&self.doc, page_dict, b"MediaBox")
            .and_then(|obj| rect_of(&self.doc, obj))
            .unwrap_or(DEFAULT_MEDIA_BOX);
        let resources =
            inherited(&self.doc, page_dict, b"Resources").and_then(|obj| dict_of(&self.doc, obj));

        let mut walker = Walker::new(&self.doc, page, media_box, self.grey);
        walker.run(&operations, resources, 0);
        Ok(walker.finish())
    }
}

// ---------------------------------------------------------------------------
// Graphics and text state
// ---------------------------------------------------------------------------

/// Affine transform [a b c d e f], applied to row vectors as in PDF.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f32, ty: f32) -> Matrix {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    fn from_operands(operands: &[Object]) -> Option<Matrix> {
        if operands.len() < 6 {
            return None;
        }
        let mut m = [0.0; 6];
        for (slot, obj) in m.iter_mut().zip(operands) {
            *slot = number(obj)?;
        }
        Some(Matrix(m))
    }

    /// `self` followed by `other`.
    fn then(self, other: Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a * a2 + b * c2,
            a * b2 + b * d2,
            c * a2 + d * c2,
            c * b2 + d * d2,
            e * a2 + f * c2 + e2,
            e * b2 + f * d2 + f2,
        ])
    }

    fn apply(self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FillSpace {
    Gray,
    Rgb,
    Cmyk,
    /// Single-ink tint where 1.0 is full ink.
    Tint,
    Unknown,
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill: [f32; 3],
    fill_alpha: f32,
    fill_space: FillSpace,
    text: TextParams,
}

impl Default for GraphicsState {
    fn default() -> Self {
        GraphicsState {
            ctm: Matrix::IDENTITY,
            fill: [0.0; 3],
            fill_alpha: 1.0,
            fill_space: FillSpace::Gray,
            text: TextParams::default(),
        }
    }
}

/// Text state parameters. They belong to the graphics state, so `q`/`Q`
/// saves and restores them along with the CTM.
#[derive(Debug, Clone)]
struct TextParams {
    font: Option<FontKey>,
    font_size: f32,
    horiz_scale: f32,
    char_spacing: f32,
    word_spacing: f32,
    rise: f32,
    leading: f32,
    bold: bool,
}

impl Default for TextParams {
    fn default() -> Self {
        TextParams {
            font: None,
            font_size: 0.0,
            horiz_scale: 1.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            rise: 0.0,
            leading: 0.0,
            bold: false,
        }
    }
}

impl TextParams {
    /// Horizontal advance for `text` in unscaled text space.
    fn advance(&self, text: &str) -> f32 {
        let glyph = self.font_size * APPROX_CHAR_WIDTH_RATIO;
        text.chars()
            .map(|c| {
                let space = if c == ' ' { self.word_spacing } else { 0.0 };
                (glyph + self.char_spacing + space) * self.horiz_scale
            })
            .sum()
    }
}

/// Text object matrices, reset by `BT`.
#[derive(Debug, Clone)]
struct TextMatrices {
    matrix: Matrix,
    line_matrix: Matrix,
}

impl Default for TextMatrices {
    fn default() -> Self {
        TextMatrices {
            matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
        }
    }
}

impl TextMatrices {
    fn next_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translate(tx, ty).then(self.line_matrix);
        self.matrix = self.line_matrix;
    }

    fn move_by(&mut self, dx: f32) {
        self.matrix = Matrix::translate(dx, 0.0).then(self.matrix);
    }
}

// ---------------------------------------------------------------------------
// Fonts
// ---------------------------------------------------------------------------

/// Identifies a font for the decoder cache: its object id when the resource
/// entry is a reference, otherwise the resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FontKey {
    Object(ObjectId),
    Named(Vec<u8>),
}

/// Turns shown string bytes into text for one font.
enum TextDecoder<'a> {
    /// Encoding resolved by lopdf (ToUnicode CMaps, named base encodings).
    Lopdf { encoding: Encoding<'a>, two_byte: bool },
    /// Simple font with an `/Encoding` dictionary and no ToUnicode.
    Differences(Box<[Option<char>; 256]>),
    /// Font lopdf could not resolve.
    Builtin { two_byte: bool },
}

impl<'a> TextDecoder<'a> {
    fn for_font(doc: &'a Document, font: &'a Dictionary) -> Self {
        let encoding = font.get(b"Encoding").ok().map(|obj| resolve(doc, obj));
        let two_byte = encoding
            .and_then(|o| o.as_name().ok())
            .is_some_and(|n| n == b"Identity-H" || n == b"Identity-V");

        if !font.has(b"ToUnicode") {
            if let Some(Object::Dictionary(table)) = encoding {
                return TextDecoder::Differences(Box::new(differences_table(table)));
            }
        }
        match font.get_font_encoding(doc) {
            Ok(encoding) => TextDecoder::Lopdf { encoding, two_byte },
            Err(e) => {
                debug!("font encoding unavailable, using built-in decoding: {e}");
                TextDecoder::Builtin { two_byte }
            }
        }
    }

    fn decode(&self, bytes: &[u8]) -> String {
        match self {
            TextDecoder::Lopdf { encoding, two_byte } => Document::decode_text(encoding, bytes)
                .unwrap_or_else(|_| decode_builtin(bytes, *two_byte)),
            TextDecoder::Differences(table) => bytes
                .iter()
                .filter_map(|&b| table[b as usize])
                .collect(),
            TextDecoder::Builtin { two_byte } => decode_builtin(bytes, *two_byte),
        }
    }
}

// ---------------------------------------------------------------------------
// Content stream walker
// ---------------------------------------------------------------------------

struct Walker<'a> {
    doc: &'a Document,
    page: u32,
    /// Page-space origin: left edge and top edge of the MediaBox.
    left: f32,
    top: f32,
    grey: GreyRule,
    gs: GraphicsState,
    stack: Vec<GraphicsState>,
    text: TextMatrices,
    fonts: HashMap<FontKey, TextDecoder<'a>>,
    texts: Vec<PositionedText>,
    images: Vec<PositionedImage>,
}

impl<'a> Walker<'a> {
    fn new(doc: &'a Document, page: u32, media_box: [f32; 4], grey: GreyRule) -> Self {
        Walker {
            doc,
            page,
            left: media_box[0].min(media_box[2]),
            top: media_box[1].max(media_box[3]),
            grey,
            gs: GraphicsState::default(),
            stack: Vec::new(),
            text: TextMatrices::default(),
            fonts: HashMap::new(),
            texts: Vec::new(),
            images: Vec::new(),
        }
    }

    fn run(&mut self, operations: &[Operation], resources: Option<&'a Dictionary>, depth: u8) {
        for op in operations {
            let operands = op.operands.as_slice();
            match op.operator.as_str() {
                "q" => self.stack.push(self.gs.clone()),
                "Q" => {
                    if let Some(saved) = self.stack.pop() {
                        self.gs = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        self.gs.ctm = m.then(self.gs.ctm);
                    }
                }

                // -- Fill colour -------------------------------------------
                "g" => self.set_fill(FillSpace::Gray, operands),
                "rg" => self.set_fill(FillSpace::Rgb, operands),
                "k" => self.set_fill(FillSpace::Cmyk, operands),
                "cs" => {
                    let space = operands
                        .first()
                        .and_then(|o| o.as_name().ok())
                        .map(|name| fill_space_named(self.doc, resources, name))
                        .unwrap_or(FillSpace::Unknown);
                    self.gs.fill_space = space;
                    self.gs.fill = [0.0; 3];
                }
                "sc" | "scn" => {
                    let space = self.gs.fill_space;
                    self.set_fill(space, operands);
                }
                "gs" => {
                    let alpha = operands
                        .first()
                        .and_then(|o| o.as_name().ok())
                        .and_then(|name| resource(self.doc, resources, b"ExtGState", name))
                        .and_then(|obj| dict_of(self.doc, obj))
                        .and_then(|d| d.get(b"ca").ok())
                        .and_then(number);
                    if let Some(ca) = alpha {
                        self.gs.fill_alpha = ca.clamp(0.0, 1.0);
                    }
                }

                // -- Text state --------------------------------------------
                "BT" => self.text = TextMatrices::default(),
                "Tf" => self.set_font(resources, operands),
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        self.text.matrix = m;
                        self.text.line_matrix = m;
                    }
                }
                "Td" => {
                    if let (Some(tx), Some(ty)) = (operand(operands, 0), operand(operands, 1)) {
                        self.text.next_line(tx, ty);
                    }
                }
                "TD" => {
                    if let (Some(tx), Some(ty)) = (operand(operands, 0), operand(operands, 1)) {
                        self.gs.text.leading = -ty;
                        self.text.next_line(tx, ty);
                    }
                }
                "T*" => {
                    let leading = self.gs.text.leading;
                    self.text.next_line(0.0, -leading);
                }
                "TL" => {
                    if let Some(v) = operand(operands, 0) {
                        self.gs.text.leading = v;
                    }
                }
                "Tc" => {
                    if let Some(v) = operand(operands, 0) {
                        self.gs.text.char_spacing = v;
                    }
                }
                "Tw" => {
                    if let Some(v) = operand(operands, 0) {
                        self.gs.text.word_spacing = v;
                    }
                }
                "Tz" => {
                    if let Some(v) = operand(operands, 0) {
                        self.gs.text.horiz_scale = v / 100.0;
                    }
                }
                "Ts" => {
                    if let Some(v) = operand(operands, 0) {
                        self.gs.text.rise = v;
                    }
                }

                // -- Text showing ------------------------------------------
                "Tj" => {
                    if let Some(bytes) = operands.first().and_then(string_bytes) {
                        self.show(bytes);
                    }
                }
                "'" => {
                    let leading = self.gs.text.leading;
                    self.text.next_line(0.0, -leading);
                    if let Some(bytes) = operands.first().and_then(string_bytes) {
                        self.show(bytes);
                    }
                }
                "\"" => {
                    if let (Some(aw), Some(ac)) = (operand(operands, 0), operand(operands, 1)) {
                        self.gs.text.word_spacing = aw;
                        self.gs.text.char_spacing = ac;
                    }
                    let leading = self.gs.text.leading;
                    self.text.next_line(0.0, -leading);
                    if let Some(bytes) = operands.get(2).and_then(string_bytes) {
                        self.show(bytes);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        self.show_array(items);
                    }
                }

                // -- XObjects ----------------------------------------------
                "Do" => {
                    if let Some(name) = operands.first().and_then(|o| o.as_name().ok()) {
                        self.draw_xobject(resources, name, depth);
                    }
                }
                _ => {}
            }
        }
    }

    fn finish(mut self) -> ScannedPage {
        // Reading order: top-to-bottom, then left-to-right. Stable, so runs at
        // the same position keep stream order.
        self.texts.sort_by(|a, b| {
            a.bbox
                .top
                .total_cmp(&b.bbox.top)
                .then(a.bbox.x0.total_cmp(&b.bbox.x0))
        });
        self.images.sort_by(|a, b| {
            a.bbox
                .top
                .total_cmp(&b.bbox.top)
                .then(a.bbox.x0.total_cmp(&b.bbox.x0))
        });
        ScannedPage {
            page: self.page,
            texts: self.texts,
            images: self.images,
        }
    }

    fn set_fill(&mut self, space: FillSpace, operands: &[Object]) {
        let values: Vec<f32> = operands
            .iter()
            .filter_map(number)
            .map(|v| v.clamp(0.0, 1.0))
            .collect();
        let rgb = match (space, values.as_slice()) {
            (FillSpace::Gray, [g]) => [*g; 3],
            (FillSpace::Tint, [t]) => [1.0 - t; 3],
            (FillSpace::Rgb, [r, g, b]) => [*r, *g, *b],
            (FillSpace::Cmyk, [c, m, y, k]) => {
                [1.0 - (c + k).min(1.0), 1.0 - (m + k).min(1.0), 1.0 - (y + k).min(1.0)]
            }
            // Unknown spaces: guess from the component count.
            (FillSpace::Unknown, [g]) => [*g; 3],
            (FillSpace::Unknown, [r, g, b]) => [*r, *g, *b],
            _ => return,
        };
        self.gs.fill_space = space;
        self.gs.fill = rgb;
    }

    fn set_font(&mut self, resources: Option<&'a Dictionary>, operands: &[Object]) {
        if let Some(size) = operand(operands, 1) {
            self.gs.text.font_size = size;
        }
        let Some(name) = operands.first().and_then(|o| o.as_name().ok()) else {
            return;
        };
        let entry = resource(self.doc, resources, b"Font", name);
        let Some(font) = entry.and_then(|obj| dict_of(self.doc, obj)) else {
            self.gs.text.font = None;
            self.gs.text.bold = false;
            return;
        };
        let key = match entry {
            Some(Object::Reference(id)) => FontKey::Object(*id),
            _ => FontKey::Named(name.to_vec()),
        };
        let doc = self.doc;
        self.fonts
            .entry(key.clone())
            .or_insert_with(|| TextDecoder::for_font(doc, font));

        let base_font = font
            .get(b"BaseFont")
            .ok()
            .and_then(|o| o.as_name().ok())
            .map(|n| String::from_utf8_lossy(n).to_uppercase())
            .unwrap_or_default();
        self.gs.text.bold = base_font.contains("BOLD") || base_font.contains("BLACK");
        self.gs.text.font = Some(key);
    }

    fn decode(&self, bytes: &[u8]) -> String {
        match self.gs.text.font.as_ref().and_then(|key| self.fonts.get(key)) {
            Some(decoder) => decoder.decode(bytes),
            None => decode_builtin(bytes, false),
        }
    }

    fn show(&mut self, bytes: &[u8]) {
        let text = self.decode(bytes);
        let start = self.text.matrix;
        let advance = self.gs.text.advance(&text);
        self.text.move_by(advance);
        self.push_run(text, start, advance);
    }

    /// `TJ`: strings interleaved with kerning adjustments in thousandths of
    /// text space. A large negative adjustment reads as a word gap.
    fn show_array(&mut self, items: &[Object]) {
        let start = self.text.matrix;
        let mut text = String::new();
        let mut advance = 0.0;
        let params = &self.gs.text;
        let gap = params.font_size * APPROX_CHAR_WIDTH_RATIO * params.horiz_scale * 0.3;

        for item in items {
            if let Some(bytes) = string_bytes(item) {
                let fragment = self.decode(bytes);
                let dx = self.gs.text.advance(&fragment);
                self.text.move_by(dx);
                advance += dx;
                text.push_str(&fragment);
            } else if let Some(adj) = number(item) {
                let dx = -adj / 1000.0 * self.gs.text.font_size * self.gs.text.horiz_scale;
                if dx > gap && !text.is_empty() && !text.ends_with(' ') {
                    text.push(' ');
                }
                self.text.move_by(dx);
                advance += dx;
            }
        }
        self.push_run(text, start, advance);
    }

    fn push_run(&mut self, text: String, start: Matrix, advance: f32) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        let size = self.gs.text.font_size;
        let rise = self.gs.text.rise;
        let to_user = start.then(self.gs.ctm);
        let corners = [
            (0.0, rise - 0.2 * size),
            (advance, rise - 0.2 * size),
            (0.0, rise + 0.8 * size),
            (advance, rise + 0.8 * size),
        ];
        let bbox = self.page_bbox(corners.map(|(x, y)| to_user.apply(x, y)));
        let style = StyleHint {
            is_greyed: self.grey.is_greyed(self.gs.fill, self.gs.fill_alpha),
            is_bold: self.gs.text.bold,
        };
        self.texts.push(PositionedText {
            text: trimmed.to_string(),
            page: self.page,
            bbox,
            style,
        });
    }

    fn draw_xobject(&mut self, resources: Option<&'a Dictionary>, name: &[u8], depth: u8) {
        let Some(stream) = resource(self.doc, resources, b"XObject", name)
            .map(|obj| resolve(self.doc, obj))
            .and_then(stream_of)
        else {
            debug!(page = self.page, name = %String::from_utf8_lossy(name), "XObject not found");
            return;
        };
        let subtype = stream.dict.get(b"Subtype").ok().and_then(|o| o.as_name().ok());
        match subtype {
            Some(b"Image") => self.record_image(name, stream),
            Some(b"Form") if depth < MAX_FORM_DEPTH => self.draw_form(stream, resources, depth),
            _ => {}
        }
    }

    fn draw_form(&mut self, stream: &'a Stream, parent: Option<&'a Dictionary>, depth: u8) {
        let content = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        let operations = match Content::decode(&content) {
            Ok(c) => c.operations,
            Err(e) => {
                debug!(page = self.page, "skipping undecodable form XObject: {e}");
                return;
            }
        };
        let resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|obj| dict_of(self.doc, obj))
            .or(parent);

        let saved = self.gs.clone();
        if let Some(m) = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|o| o.as_array().ok())
            .and_then(|arr| Matrix::from_operands(arr))
        {
            self.gs.ctm = m.then(self.gs.ctm);
        }
        self.run(&operations, resources, depth + 1);
        self.gs = saved;
    }

    fn record_image(&mut self, name: &[u8], stream: &Stream) {
        let is_mask = stream
            .dict
            .get(b"ImageMask")
            .is_ok_and(|o| matches!(o, Object::Boolean(true)));
        if is_mask {
            return;
        }
        let unit = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)];
        let bbox = self.page_bbox(unit.map(|(x, y)| self.gs.ctm.apply(x, y)));
        let (raw_bytes, encoding) = image_payload(self.doc, stream);
        let id = format!("{}#{}", String::from_utf8_lossy(name), self.images.len());
        self.images.push(PositionedImage {
            id,
            page: self.page,
            bbox,
            raw_bytes,
            encoding,
        });
    }

    /// Bounding box in page space (top-left origin) of user-space points.
    fn page_bbox(&self, points: [(f32, f32); 4]) -> BBox {
        let xs = points.map(|p| p.0 - self.left);
        let ys = points.map(|p| self.top - p.1);
        BBox::new(
            xs.iter().copied().fold(f32::INFINITY, f32::min),
            ys.iter().copied().fold(f32::INFINITY, f32::min),
            xs.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            ys.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        )
    }
}

// ---------------------------------------------------------------------------
// Image payloads
// ---------------------------------------------------------------------------

/// Pick the bytes to keep for an image stream and describe their layout.
fn image_payload(doc: &Document, stream: &Stream) -> (Vec<u8>, ImageEncoding) {
    let filters = filter_names(&stream.dict);
    let file_format = filters.last().and_then(|f| format_from_filter(f));

    let bytes = match (file_format, filters.len()) {
        // A lone DCT/JPX filter: the stream content is the file itself.
        (Some(_), 1) | (_, 0) => stream.content.clone(),
        _ => stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone()),
    };

    if let Some(format) = file_format {
        return (bytes, ImageEncoding::Encoded { format });
    }
    if let Some(encoding) = raw_layout(doc, &stream.dict) {
        return (bytes, encoding);
    }
    let format = detect_format(&bytes);
    (bytes, ImageEncoding::Encoded { format })
}

fn raw_layout(doc: &Document, dict: &Dictionary) -> Option<ImageEncoding> {
    let width = dict.get(b"Width").ok()?.as_i64().ok()?;
    let height = dict.get(b"Height").ok()?.as_i64().ok()?;
    let bits_per_component = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);
    let color_space = image_color_space(doc, dict.get(b"ColorSpace").ok()?)?;
    Some(ImageEncoding::Raw {
        width: u32::try_from(width).ok()?,
        height: u32::try_from(height).ok()?,
        bits_per_component: u8::try_from(bits_per_component).ok()?,
        color_space,
    })
}

fn image_color_space(doc: &Document, obj: &Object) -> Option<ColorSpace> {
    match resolve(doc, obj) {
        Object::Name(name) => device_space(name),
        Object::Array(arr) => {
            let family = arr.first()?.as_name().ok()?;
            match family {
                b"ICCBased" => {
                    let profile = stream_of(resolve(doc, arr.get(1)?))?;
                    match profile.dict.get(b"N").ok()?.as_i64().ok()? {
                        1 => Some(ColorSpace::Gray),
                        3 => Some(ColorSpace::Rgb),
                        4 => Some(ColorSpace::Cmyk),
                        _ => None,
                    }
                }
                other => device_space(other),
            }
        }
        _ => None,
    }
}

fn device_space(name: &[u8]) -> Option<ColorSpace> {
    match name {
        b"DeviceGray" | b"CalGray" | b"G" => Some(ColorSpace::Gray),
        b"DeviceRGB" | b"CalRGB" | b"RGB" => Some(ColorSpace::Rgb),
        b"DeviceCMYK" | b"CMYK" => Some(ColorSpace::Cmyk),
        _ => None,
    }
}

fn filter_names(dict: &Dictionary) -> Vec<String> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![String::from_utf8_lossy(name).into_owned()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|o| o.as_name().ok())
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .collect(),
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Object helpers
// ---------------------------------------------------------------------------

fn fill_space_named(doc: &Document, resources: Option<&Dictionary>, name: &[u8]) -> FillSpace {
    match name {
        b"DeviceGray" | b"CalGray" => return FillSpace::Gray,
        b"DeviceRGB" | b"CalRGB" => return FillSpace::Rgb,
        b"DeviceCMYK" => return FillSpace::Cmyk,
        _ => {}
    }
    let Some(space) = resource(doc, resources, b"ColorSpace", name).map(|o| resolve(doc, o))
    else {
        return FillSpace::Unknown;
    };
    let Object::Array(arr) = space else {
        return FillSpace::Unknown;
    };
    match arr.first().and_then(|o| o.as_name().ok()) {
        Some(b"Separation") => FillSpace::Tint,
        Some(b"CalGray") => FillSpace::Gray,
        Some(b"CalRGB") => FillSpace::Rgb,
        Some(b"ICCBased") => match image_color_space(doc, space) {
            Some(ColorSpace::Gray) => FillSpace::Gray,
            Some(ColorSpace::Rgb) => FillSpace::Rgb,
            Some(ColorSpace::Cmyk) => FillSpace::Cmyk,
            None => FillSpace::Unknown,
        },
        _ => FillSpace::Unknown,
    }
}

/// Look up `/Category /name` in a resource dictionary.
fn resource<'a>(
    doc: &'a Document,
    resources: Option<&'a Dictionary>,
    category: &[u8],
    name: &[u8],
) -> Option<&'a Object> {
    let entries = dict_of(doc, resources?.get(category).ok()?)?;
    entries.get(name).ok()
}

/// Read a page attribute, walking up the page tree for inheritable keys.
fn inherited<'a>(doc: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut current = page;
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").ok()?;
        current = dict_of(doc, parent)?;
    }
    None
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn stream_of(obj: &Object) -> Option<&Stream> {
    match obj {
        Object::Stream(s) => Some(s),
        _ => None,
    }
}

fn dict_of<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj) {
        Object::Dictionary(d) => Some(d),
        Object::Stream(s) => Some(&s.dict),
        _ => None,
    }
}

fn rect_of(doc: &Document, obj: &Object) -> Option<[f32; 4]> {
    let arr = resolve(doc, obj).as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let mut rect = [0.0; 4];
    for (slot, item) in rect.iter_mut().zip(arr) {
        *slot = number(resolve(doc, item))?;
    }
    Some(rect)
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn operand(operands: &[Object], index: usize) -> Option<f32> {
    operands.get(index).and_then(number)
}

fn string_bytes(obj: &Object) -> Option<&[u8]> {
    match obj {
        Object::String(bytes, _) => Some(bytes),
        _ => None,
    }
}

/// Decode a shown string without font information. Two-byte fonts are read
/// as UTF-16BE; single-byte strings as WinAnsi.
fn decode_builtin(bytes: &[u8], two_byte: bool) -> String {
    let utf16_body = if two_byte {
        Some(bytes)
    } else {
        bytes.strip_prefix(&[0xFE, 0xFF])
    };
    if let Some(body) = utf16_body {
        let units: Vec<u16> = body
            .chunks(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
            .collect();
        return char::decode_utf16(units)
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
    }
    bytes.iter().filter_map(|&b| win_ansi_char(b)).collect()
}

/// WinAnsiEncoding. Bytes outside 0x80..=0x9F match Latin-1, except the soft
/// hyphen which codes print as a plain hyphen.
fn win_ansi_char(byte: u8) -> Option<char> {
    const HIGH: [Option<char>; 32] = [
        Some('\u{20AC}'),
        None,
        Some('\u{201A}'),
        Some('\u{0192}'),
        Some('\u{201E}'),
        Some('\u{2026}'),
        Some('\u{2020}'),
        Some('\u{2021}'),
        Some('\u{02C6}'),
        Some('\u{2030}'),
        Some('\u{0160}'),
        Some('\u{2039}'),
        Some('\u{0152}'),
        None,
        Some('\u{017D}'),
        None,
        None,
        Some('\u{2018}'),
        Some('\u{2019}'),
        Some('\u{201C}'),
        Some('\u{201D}'),
        Some('\u{2022}'),
        Some('\u{2013}'),
        Some('\u{2014}'),
        Some('\u{02DC}'),
        Some('\u{2122}'),
        Some('\u{0161}'),
        Some('\u{203A}'),
        Some('\u{0153}'),
        None,
        Some('\u{017E}'),
        Some('\u{0178}'),
    ];
    match byte {
        0x80..=0x9F => HIGH[(byte - 0x80) as usize],
        0xAD => Some('-'),
        other => Some(other as char),
    }
}

/// Byte-to-char table for an `/Encoding` dictionary: WinAnsi overlaid with
/// the `/Differences` array.
fn differences_table(encoding: &Dictionary) -> [Option<char>; 256] {
    let mut table = [None; 256];
    for (byte, slot) in table.iter_mut().enumerate() {
        *slot = win_ansi_char(byte as u8);
    }
    let Ok(differences) = encoding.get(b"Differences").and_then(Object::as_array) else {
        return table;
    };
    let mut code = 0usize;
    for item in differences {
        match item {
            Object::Integer(start) => code = usize::try_from(*start).unwrap_or(usize::MAX),
            Object::Name(glyph) => {
                if let Some(slot) = table.get_mut(code) {
                    *slot = glyph_char(glyph);
                }
                code = code.saturating_add(1);
            }
            _ => {}
        }
    }
    table
}

/// Unicode for a glyph name: `uniXXXX`, `uXXXX`, single letters and the
/// names of the digits and punctuation that appear in product codes.
fn glyph_char(name: &[u8]) -> Option<char> {
    let name = std::str::from_utf8(name).ok()?;
    let hex = name
        .strip_prefix("uni")
        .filter(|h| h.len() == 4)
        .or_else(|| name.strip_prefix('u').filter(|h| (4..=6).contains(&h.len())));
    if let Some(hex) = hex {
        if let Some(c) = u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
            return Some(c);
        }
    }
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_alphabetic() {
            return Some(c);
        }
    }
    let c = match name {
        "zero" => '0',
        "one" => '1',
        "two" => '2',
        "three" => '3',
        "four" => '4',
        "five" => '5',
        "six" => '6',
        "seven" => '7',
        "eight" => '8',
        "nine" => '9',
        "space" | "nbspace" => ' ',
        "hyphen" | "minus" | "sfthyphen" => '-',
        "endash" => '\u{2013}',
        "emdash" => '\u{2014}',
        "period" => '.',
        "comma" => ',',
        "colon" => ':',
        "semicolon" => ';',
        "slash" => '/',
        "underscore" => '_',
        "parenleft" => '(',
        "parenright" => ')',
        "ampersand" => '&',
        "plus" => '+',
        "numbersign" => '#',
        "percent" => '%',
        "asterisk" => '*',
        "at" => '@',
        "equal" => '=',
        "quotesingle" => '\'',
        "quoteleft" => '\u{2018}',
        "quoteright" => '\u{2019}',
        "quotedbl" => '"',
        "quotedblleft" => '\u{201C}',
        "quotedblright" => '\u{201D}',
        "bullet" => '\u{2022}',
        _ => return None,
    };
    Some(c)
}
