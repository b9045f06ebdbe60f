//! End-to-end tests for the match and fill pipeline.
//!
//! Most tests use a MockScanner that returns pre-built pages, so they
//! exercise recognition, matching, image normalization and binding without a
//! PDF. The tests at the end build a real PDF with lopdf and fill a real
//! workbook.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use skumatch_core::binder::{ImageSink, RowSource};
use skumatch_core::config::MatchConfig;
use skumatch_core::error::SkumatchError;
use skumatch_core::model::{
    BBox, ColorSpace, ImageEncoding, NormalizedImage, PositionedImage, PositionedText, RowRef,
    ScannedPage, StyleHint,
};
use skumatch_core::normalize::normalize_code;
use skumatch_core::pipeline::CancelToken;
use skumatch_core::report::{RunErrorKind, WarningKind};
use skumatch_core::scan::lopdf::LopdfScanner;
use skumatch_core::scan::{DocumentScanner, ScannedDocument};
use skumatch_core::sink::{DirectorySink, Manifest, WorkbookSink, WriteTarget};
use skumatch_core::spreadsheet::WorkbookRows;
use skumatch_core::{fill_rows, match_pdf, scan_codes};

struct MockScanner {
    pages: Vec<ScannedPage>,
    broken_pages: Vec<u32>,
    unreadable: bool,
}

impl MockScanner {
    fn new(pages: Vec<ScannedPage>) -> Self {
        MockScanner {
            pages,
            broken_pages: vec![],
            unreadable: false,
        }
    }
}

impl DocumentScanner for MockScanner {
    fn open(&self, _pdf_bytes: &[u8]) -> Result<Box<dyn ScannedDocument>, SkumatchError> {
        if self.unreadable {
            return Err(SkumatchError::DocumentRead("not a PDF".into()));
        }
        Ok(Box::new(MockDocument {
            pages: self.pages.clone(),
            broken_pages: self.broken_pages.clone(),
        }))
    }

    fn backend_name(&self) -> &str {
        "mock"
    }
}

struct MockDocument {
    pages: Vec<ScannedPage>,
    broken_pages: Vec<u32>,
}

impl ScannedDocument for MockDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn scan_page(&self, page: u32) -> Result<ScannedPage, SkumatchError> {
        if self.broken_pages.contains(&page) {
            return Err(SkumatchError::PageDecode {
                page,
                reason: "corrupt content stream".into(),
            });
        }
        Ok(self.pages[(page - 1) as usize].clone())
    }
}

fn text(page: u32, s: &str, x0: f32, top: f32) -> PositionedText {
    PositionedText {
        text: s.to_string(),
        page,
        bbox: BBox::new(x0, top, x0 + s.chars().count() as f32 * 6.0, top + 10.0),
        style: StyleHint::default(),
    }
}

fn greyed(mut t: PositionedText) -> PositionedText {
    t.style.is_greyed = true;
    t
}

/// A 4x2 solid raw RGB image drawn at 80x40pt.
fn image(page: u32, id: &str, x0: f32, top: f32) -> PositionedImage {
    PositionedImage {
        id: id.to_string(),
        page,
        bbox: BBox::new(x0, top, x0 + 80.0, top + 40.0),
        raw_bytes: vec![180; 4 * 2 * 3],
        encoding: ImageEncoding::Raw {
            width: 4,
            height: 2,
            bits_per_component: 8,
            color_space: ColorSpace::Rgb,
        },
    }
}

fn page(number: u32, texts: Vec<PositionedText>, images: Vec<PositionedImage>) -> ScannedPage {
    ScannedPage {
        page: number,
        texts,
        images,
    }
}

struct Rows(HashMap<String, Vec<RowRef>>);

impl Rows {
    fn new(codes: &[&str]) -> Self {
        let mut map: HashMap<String, Vec<RowRef>> = HashMap::new();
        for (i, raw) in codes.iter().enumerate() {
            let key = normalize_code(raw);
            map.entry(key.clone()).or_default().push(RowRef {
                sheet: "Sinks".into(),
                row: i as u32 + 1,
                column: 0,
                image_column: Some(2),
                raw_code: raw.to_string(),
                key,
            });
        }
        Rows(map)
    }
}

impl RowSource for Rows {
    fn lookup_rows(&self, key: &str) -> Vec<RowRef> {
        self.0.get(key).cloned().unwrap_or_default()
    }
}

#[derive(Default)]
struct RecordingSink {
    locked: bool,
    inserted: Vec<(String, u32, u32)>,
}

impl ImageSink for RecordingSink {
    fn prepare(&mut self) -> Result<(), SkumatchError> {
        if self.locked {
            return Err(SkumatchError::TargetLocked {
                path: "prices.xlsx".into(),
            });
        }
        Ok(())
    }

    fn insert_image(
        &mut self,
        row: &RowRef,
        image: &NormalizedImage,
        width: u32,
        height: u32,
    ) -> Result<(), SkumatchError> {
        assert_eq!((image.width, image.height), (width, height));
        self.inserted.push((row.key.clone(), row.row, width));
        Ok(())
    }
}

fn catalog_page() -> ScannedPage {
    page(
        1,
        vec![
            text(1, "K-1001", 100.0, 100.0),
            text(1, "Vanity basin", 100.0, 112.0),
            greyed(text(1, "K-1001A", 100.0, 300.0)),
        ],
        vec![image(1, "Im1", 90.0, 130.0)],
    )
}

// ---------------------------------------------------------------------------
// Recognition and matching
// ---------------------------------------------------------------------------

#[test]
fn greyed_variant_yields_single_binding() {
    let scanner = MockScanner::new(vec![catalog_page()]);
    let report = match_pdf(&[], &scanner, &MatchConfig::default(), &CancelToken::new()).unwrap();

    assert!(report.is_success());
    assert_eq!(report.bindings.len(), 1);
    let binding = &report.bindings[0];
    assert_eq!(binding.normalized_key, "K1001");
    assert_eq!(binding.raw_code, "K-1001");
    assert_eq!(binding.image_id, "Im1");
    assert_eq!((binding.image.width, binding.image.height), (100, 100));
    assert!(binding.image.png.starts_with(&[0x89, b'P', b'N', b'G']));
}

#[test]
fn dependent_reference_never_gets_its_own_image() {
    let scanner = MockScanner::new(vec![page(
        1,
        vec![
            text(1, "K-2002", 100.0, 100.0),
            text(1, "Must order with K-2002", 100.0, 200.0),
        ],
        vec![image(1, "Im1", 90.0, 120.0), image(1, "Im2", 90.0, 215.0)],
    )]);
    let report = match_pdf(&[], &scanner, &MatchConfig::default(), &CancelToken::new()).unwrap();

    assert_eq!(report.bindings.len(), 1);
    assert_eq!(report.bindings[0].image_id, "Im1");
    assert_eq!(report.warnings_of(WarningKind::DependentCode).count(), 1);
    assert_eq!(report.warnings_of(WarningKind::NoImageForCode).count(), 0);
}

#[test]
fn code_without_image_is_warned_and_others_still_bind() {
    let scanner = MockScanner::new(vec![page(
        1,
        vec![text(1, "K-3003", 100.0, 500.0), text(1, "K-4004", 100.0, 100.0)],
        vec![image(1, "Im1", 90.0, 120.0)],
    )]);
    let report = match_pdf(&[], &scanner, &MatchConfig::default(), &CancelToken::new()).unwrap();

    assert_eq!(report.bindings.len(), 1);
    assert_eq!(report.bindings[0].normalized_key, "K4004");
    let missing: Vec<_> = report.warnings_of(WarningKind::NoImageForCode).collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].raw_code, "K-3003");
    assert_eq!(missing[0].page, 1);
}

#[test]
fn undecodable_image_drops_only_that_binding() {
    let mut broken = image(1, "Im2", 290.0, 120.0);
    broken.raw_bytes.truncate(3);
    let scanner = MockScanner::new(vec![page(
        1,
        vec![text(1, "K-1001", 100.0, 100.0), text(1, "K-5005", 300.0, 100.0)],
        vec![image(1, "Im1", 90.0, 120.0), broken],
    )]);
    let report = match_pdf(&[], &scanner, &MatchConfig::default(), &CancelToken::new()).unwrap();

    assert_eq!(report.bindings.len(), 1);
    assert_eq!(report.bindings[0].normalized_key, "K1001");
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, RunErrorKind::ImageDecode);
    assert_eq!(report.errors[0].raw_code.as_deref(), Some("K-5005"));
    assert!(report.fatal_error.is_none());
}

#[test]
fn corrupt_page_is_skipped() {
    let mut scanner = MockScanner::new(vec![
        catalog_page(),
        page(2, vec![text(2, "K-7007", 100.0, 100.0)], vec![image(2, "Im1", 90.0, 120.0)]),
        page(3, vec![text(3, "K-8008", 100.0, 100.0)], vec![image(3, "Im1", 90.0, 120.0)]),
    ]);
    scanner.broken_pages = vec![2];
    let report = match_pdf(&[], &scanner, &MatchConfig::default(), &CancelToken::new()).unwrap();

    let keys: Vec<&str> = report.bindings.iter().map(|b| b.normalized_key.as_str()).collect();
    assert_eq!(keys, vec!["K1001", "K8008"]);
    assert_eq!(report.pages_total, 3);
    assert_eq!(report.pages_scanned, 2);
    assert_eq!(report.errors[0].kind, RunErrorKind::PageDecode);
    assert_eq!(report.errors[0].page, Some(2));
}

#[test]
fn unreadable_document_is_fatal() {
    let mut scanner = MockScanner::new(vec![]);
    scanner.unreadable = true;
    let report = match_pdf(&[], &scanner, &MatchConfig::default(), &CancelToken::new()).unwrap();
    assert!(report.fatal_error.unwrap().contains("not a PDF"));
    assert!(report.bindings.is_empty());
}

#[test]
fn invalid_config_fails_before_scanning() {
    let config = MatchConfig {
        code_pattern: "(".into(),
        ..MatchConfig::default()
    };
    let scanner = MockScanner::new(vec![catalog_page()]);
    let err = match_pdf(&[], &scanner, &config, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, SkumatchError::ConfigInvalid(_)));
}

#[test]
fn many_pages_keep_document_order() {
    let pages: Vec<ScannedPage> = (1..=9)
        .map(|n| {
            page(
                n,
                vec![text(n, &format!("K-{}00", n), 100.0, 100.0)],
                vec![image(n, "Im1", 90.0, 120.0)],
            )
        })
        .collect();
    let scanner = MockScanner::new(pages);
    let config = MatchConfig {
        workers: Some(2),
        ..MatchConfig::default()
    };
    let report = match_pdf(&[], &scanner, &config, &CancelToken::new()).unwrap();

    let pages: Vec<u32> = report.bindings.iter().map(|b| b.page).collect();
    assert_eq!(pages, (1..=9).collect::<Vec<_>>());
    assert_eq!(report.pages_scanned, 9);
}

#[test]
fn scan_lists_codes_and_greyed_text() {
    let scanner = MockScanner::new(vec![catalog_page()]);
    let summary = scan_codes(&[], &scanner, &MatchConfig::default()).unwrap();
    assert_eq!(summary.pages.len(), 1);
    assert_eq!(summary.pages[0].codes.len(), 1);
    assert_eq!(summary.pages[0].greyed[0].text, "K-1001A");
    assert_eq!(summary.pages[0].images.len(), 1);
    assert!(summary.keys().contains("K1001"));
}

// ---------------------------------------------------------------------------
// Binding into spreadsheet rows
// ---------------------------------------------------------------------------

#[test]
fn fill_writes_every_matching_row() {
    let scanner = MockScanner::new(vec![catalog_page()]);
    let rows = Rows::new(&["K-1001", "k1001", "K-9999"]);
    let mut sink = RecordingSink::default();
    let report = fill_rows(
        &[],
        &scanner,
        &MatchConfig::default(),
        &rows,
        &mut sink,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(
        sink.inserted,
        vec![("K1001".to_string(), 1, 100), ("K1001".to_string(), 2, 100)]
    );
    assert_eq!(report.placements.len(), 2);
    assert_eq!(report.placements[0].cell, "C2");
}

#[test]
fn code_missing_from_sheet_is_warned() {
    let scanner = MockScanner::new(vec![catalog_page()]);
    let rows = Rows::new(&["K-9999"]);
    let mut sink = RecordingSink::default();
    let report = fill_rows(
        &[],
        &scanner,
        &MatchConfig::default(),
        &rows,
        &mut sink,
        &CancelToken::new(),
    )
    .unwrap();

    assert!(sink.inserted.is_empty());
    let warnings: Vec<_> = report.warnings_of(WarningKind::NoRowForCode).collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].key, "K1001");
}

#[test]
fn locked_target_aborts_before_any_write() {
    let scanner = MockScanner::new(vec![catalog_page()]);
    let rows = Rows::new(&["K-1001"]);
    let mut sink = RecordingSink {
        locked: true,
        ..RecordingSink::default()
    };
    let report = fill_rows(
        &[],
        &scanner,
        &MatchConfig::default(),
        &rows,
        &mut sink,
        &CancelToken::new(),
    )
    .unwrap();

    assert!(report.fatal_error.unwrap().contains("locked"));
    assert!(sink.inserted.is_empty());
    assert_eq!(report.pages_scanned, 0);
}

#[test]
fn cancelled_run_writes_nothing_further() {
    let scanner = MockScanner::new(vec![catalog_page()]);
    let rows = Rows::new(&["K-1001"]);
    let mut sink = RecordingSink::default();
    let cancel = CancelToken::new();
    cancel.cancel();
    let report = fill_rows(
        &[],
        &scanner,
        &MatchConfig::default(),
        &rows,
        &mut sink,
        &cancel,
    )
    .unwrap();

    assert!(report.cancelled);
    assert!(!report.is_success());
    assert!(sink.inserted.is_empty());
}

#[test]
fn rerun_into_directory_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("images");
    let workbook = dir.path().join("prices.xlsx");
    let scanner = MockScanner::new(vec![catalog_page()]);
    let rows = Rows::new(&["K-1001"]);

    let mut manifests = Vec::new();
    for _ in 0..2 {
        let mut sink = DirectorySink::new(&out, &workbook);
        let report = fill_rows(
            &[],
            &scanner,
            &MatchConfig::default(),
            &rows,
            &mut sink,
            &CancelToken::new(),
        )
        .unwrap();
        assert!(report.is_success());
        let json = std::fs::read_to_string(out.join("placements.json")).unwrap();
        let manifest: Manifest = serde_json::from_str(&json).unwrap();
        manifests.push(manifest);
    }

    assert_eq!(manifests[0], manifests[1]);
    assert_eq!(manifests[0].placements.len(), 1);
    assert_eq!(manifests[0].placements[0].file, "Sinks_C2.png");
    assert!(out.join("Sinks_C2.png").exists());
}

// ---------------------------------------------------------------------------
// Real PDF into a real workbook
// ---------------------------------------------------------------------------

/// A 16x8 solid RGB image as a DCT (JPEG) XObject.
fn jpeg_image() -> Stream {
    let pixels = [200u8, 40, 40].repeat(16 * 8);
    let mut jpeg = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 90)
        .encode(&pixels, 16, 8, image::ExtendedColorType::Rgb8)
        .unwrap();
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 16,
            "Height" => 8,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    )
}

/// A 16x8 solid RGB image as a Flate-compressed raw XObject.
fn flate_image() -> Stream {
    let mut stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 16,
            "Height" => 8,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        [40u8, 40, 200].repeat(16 * 8),
    );
    stream.compress().unwrap();
    assert!(stream.dict.has(b"Filter"));
    stream
}

fn show(ops: &mut Vec<Operation>, gray: f32, x: i64, y: i64, text: &str) {
    ops.extend([
        Operation::new("BT", vec![]),
        Operation::new("g", vec![gray.into()]),
        Operation::new("Tf", vec!["F1".into(), 10.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
    ]);
}

fn draw(ops: &mut Vec<Operation>, name: &str, x: i64, y: i64) {
    ops.extend([
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![80.into(), 0.into(), 0.into(), 40.into(), x.into(), y.into()],
        ),
        Operation::new("Do", vec![name.into()]),
        Operation::new("Q", vec![]),
    ]);
}

/// One catalog page: K-1001 over a JPEG picture, K-3003 over a Flate
/// picture, a grey K-1001A variant and a "must order with" reference.
fn catalog_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let jpeg = doc.add_object(jpeg_image());
    let flate = doc.add_object(flate_image());

    let mut ops = Vec::new();
    show(&mut ops, 0.0, 100, 700, "K-1001");
    draw(&mut ops, "Im1", 90, 640);
    show(&mut ops, 0.0, 300, 700, "K-3003");
    draw(&mut ops, "Im2", 290, 640);
    show(&mut ops, 0.7, 100, 500, "K-1001A");
    show(&mut ops, 0.0, 100, 300, "Must order with K-2002");
    let content = Content { operations: ops };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => font },
            "XObject" => dictionary! { "Im1" => jpeg, "Im2" => flate },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog);
    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// Write a one-sheet "Sinks" workbook with CODE, DESCRIPTION and IMAGE
/// columns and one row per code.
fn write_workbook(path: &Path, codes: &[&str]) {
    let mut rows = String::from(
        r#"<row r="1"><c r="A1" t="inlineStr"><is><t>CODE</t></is></c><c r="B1" t="inlineStr"><is><t>DESCRIPTION</t></is></c><c r="C1" t="inlineStr"><is><t>IMAGE</t></is></c></row>"#,
    );
    for (i, code) in codes.iter().enumerate() {
        let r = i + 2;
        rows.push_str(&format!(
            r#"<row r="{r}"><c r="A{r}" t="inlineStr"><is><t>{code}</t></is></c><c r="B{r}" t="inlineStr"><is><t>Item</t></is></c></row>"#
        ));
    }
    let parts = [
        (
            "[Content_Types].xml".to_string(),
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#.to_string(),
        ),
        (
            "_rels/.rels".to_string(),
            format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PKG_REL_NS}"><Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#),
        ),
        (
            "xl/workbook.xml".to_string(),
            format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets><sheet name="Sinks" sheetId="1" r:id="rId1"/></sheets></workbook>"#),
        ),
        (
            "xl/_rels/workbook.xml.rels".to_string(),
            format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PKG_REL_NS}"><Relationship Id="rId1" Type="{REL_NS}/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#),
        ),
        (
            "xl/worksheets/sheet1.xml".to_string(),
            format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheetData>{rows}</sheetData></worksheet>"#),
        ),
    ];
    let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    for (name, xml) in parts {
        zip.start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn read_part(path: &Path, name: &str) -> String {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    let mut part = archive.by_name(name).unwrap();
    let mut xml = String::new();
    part.read_to_string(&mut xml).unwrap();
    xml
}

#[test]
fn real_pdf_binds_embedded_images() {
    let pdf = catalog_pdf();
    let report = match_pdf(
        &pdf,
        &LopdfScanner::new(),
        &MatchConfig::default(),
        &CancelToken::new(),
    )
    .unwrap();

    assert!(report.is_success(), "{:?}", report.errors);
    let keys: Vec<&str> = report
        .bindings
        .iter()
        .map(|b| b.normalized_key.as_str())
        .collect();
    assert_eq!(keys, ["K1001", "K3003"]);
    assert!(report.bindings[0].image_id.starts_with("Im1"));
    assert!(report.bindings[1].image_id.starts_with("Im2"));
    for binding in &report.bindings {
        assert_eq!((binding.image.width, binding.image.height), (100, 100));
        assert!(binding.image.png.starts_with(&[0x89, b'P', b'N', b'G']));
    }
    assert_eq!(report.warnings_of(WarningKind::DependentCode).count(), 1);
}

#[test]
fn real_pdf_fills_workbook_copy() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("prices.xlsx");
    write_workbook(&source, &["K-1001", "K-3003", "K-2002"]);
    let original = std::fs::read(&source).unwrap();

    let target = WriteTarget::resolve(&source, true);
    let dest = target.path().to_path_buf();
    let rows = WorkbookRows::open(target.source()).unwrap();
    let mut sink = WorkbookSink::new(target);
    let report = fill_rows(
        &catalog_pdf(),
        &LopdfScanner::new(),
        &MatchConfig::default(),
        &rows,
        &mut sink,
        &CancelToken::new(),
    )
    .unwrap();

    assert!(report.is_success(), "{:?}", report.errors);
    let cells: Vec<&str> = report.placements.iter().map(|p| p.cell.as_str()).collect();
    assert_eq!(cells, ["C2", "C3"]);
    assert_eq!(std::fs::read(&source).unwrap(), original);

    let drawing = read_part(&dest, "xl/drawings/drawing1.xml");
    assert_eq!(drawing.matches("<xdr:oneCellAnchor>").count(), 2);
    assert!(drawing.contains("<xdr:col>2</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>1</xdr:row>"));
    assert!(drawing.contains("<xdr:col>2</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>2</xdr:row>"));
    let sheet = read_part(&dest, "xl/worksheets/sheet1.xml");
    assert!(sheet.contains(r#"<row r="2" ht="75.00" customHeight="1">"#));
    assert!(sheet.contains(r#"<row r="3" ht="75.00" customHeight="1">"#));
    assert!(sheet.contains(r#"<row r="4">"#));

    let reopened = WorkbookRows::open(&dest).unwrap();
    assert_eq!(reopened.keys(), rows.keys());
}

#[test]
fn unreadable_pdf_leaves_no_copy() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("prices.xlsx");
    write_workbook(&source, &["K-1001"]);
    let target = WriteTarget::resolve(&source, true);
    let dest = target.path().to_path_buf();
    let rows = WorkbookRows::open(target.source()).unwrap();

    let mut sink = WorkbookSink::new(target);
    let report = fill_rows(
        b"%PDF-1.5 truncated",
        &LopdfScanner::new(),
        &MatchConfig::default(),
        &rows,
        &mut sink,
        &CancelToken::new(),
    )
    .unwrap();

    assert!(report.fatal_error.is_some());
    assert!(!dest.exists());
}

#[test]
fn locked_copy_is_not_created() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("prices.xlsx");
    write_workbook(&source, &["K-1001"]);
    std::fs::write(dir.path().join("~$prices_with_images.xlsx"), b"").unwrap();
    let target = WriteTarget::resolve(&source, true);
    let dest = target.path().to_path_buf();
    let rows = WorkbookRows::open(target.source()).unwrap();

    let mut sink = WorkbookSink::new(target);
    let report = fill_rows(
        &catalog_pdf(),
        &LopdfScanner::new(),
        &MatchConfig::default(),
        &rows,
        &mut sink,
        &CancelToken::new(),
    )
    .unwrap();

    assert!(report.fatal_error.unwrap().contains("locked"));
    assert!(report.placements.is_empty());
    assert!(!dest.exists());
}
