//! Reading and rewriting the parts of an xlsx package: pictures anchored in
//! a drawing part, and row heights in the worksheet that owns it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::io::{Read, Seek, Write};
use std::path::Path;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::SkumatchError;

const CONTENT_TYPES: &str = "[Content_Types].xml";
const ROOT_RELS: &str = "_rels/.rels";
const DEFAULT_WORKBOOK: &str = "xl/workbook.xml";

const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PACKAGE_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const XDR_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing";
const DRAWINGML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const REL_DRAWING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing";
const REL_IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const DRAWING_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.drawing+xml";

const EMU_PER_PIXEL: u64 = 9525;

/// Worksheet children that must come after `<drawing>`.
const AFTER_DRAWING: &[&[u8]] = &[
    b"legacyDrawing",
    b"legacyDrawingHF",
    b"drawingHF",
    b"picture",
    b"oleObjects",
    b"controls",
    b"webPublishItems",
    b"tableParts",
    b"extLst",
];

fn package_error(part: &str, e: impl Display) -> SkumatchError {
    SkumatchError::Workbook(format!("{part}: {e}"))
}

/// All parts of a package held in memory, in archive order.
#[derive(Debug, Clone, Default)]
pub(crate) struct Package {
    parts: Vec<(String, Vec<u8>)>,
}

impl Package {
    pub fn read(path: &Path) -> Result<Self, SkumatchError> {
        let file = std::fs::File::open(path)?;
        let name = path.display().to_string();
        let mut archive = ZipArchive::new(file).map_err(|e| package_error(&name, e))?;
        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| package_error(&name, e))?;
            if entry.is_dir() {
                continue;
            }
            let part = entry.name().to_string();
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes)?;
            parts.push((part, bytes));
        }
        Ok(Package { parts })
    }

    pub fn write_to<W: Write + Seek>(&self, out: W) -> Result<(), SkumatchError> {
        let mut zip = ZipWriter::new(out);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, bytes) in &self.parts {
            zip.start_file(name.as_str(), options)
                .map_err(|e| package_error(name, e))?;
            zip.write_all(bytes)?;
        }
        zip.finish().map_err(|e| package_error("package", e))?;
        Ok(())
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, bytes)| bytes.as_slice())
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.part(name).is_some()
    }

    pub fn set_part(&mut self, name: &str, bytes: Vec<u8>) {
        match self.parts.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = bytes,
            None => self.parts.push((name.to_string(), bytes)),
        }
    }

    fn required(&self, name: &str) -> Result<&[u8], SkumatchError> {
        self.part(name)
            .ok_or_else(|| package_error(name, "part is missing"))
    }

    fn relationships(&self, part: &str) -> Result<Vec<Relationship>, SkumatchError> {
        let path = rels_path(part);
        match self.part(&path) {
            Some(xml) => parse_relationships(xml, &path),
            None => Ok(Vec::new()),
        }
    }

    /// First unused part name built from `prefix`, a number and `suffix`.
    fn free_name(&self, prefix: &str, suffix: &str) -> String {
        (1..)
            .map(|n| format!("{prefix}{n}{suffix}"))
            .find(|name| !self.has_part(name))
            .unwrap_or_else(|| format!("{prefix}0{suffix}"))
    }

    /// Sheet names mapped to their worksheet part.
    pub fn sheet_parts(&self) -> Result<BTreeMap<String, String>, SkumatchError> {
        let root_rels = match self.part(ROOT_RELS) {
            Some(xml) => parse_relationships(xml, ROOT_RELS)?,
            None => Vec::new(),
        };
        let workbook = root_rels
            .into_iter()
            .find(|r| r.kind.ends_with("/officeDocument"))
            .map(|r| resolve_target("", &r.target))
            .unwrap_or_else(|| DEFAULT_WORKBOOK.to_string());
        let rels = self.relationships(&workbook)?;
        let xml = self.required(&workbook)?;

        let mut sheets = BTreeMap::new();
        let mut reader = Reader::from_reader(xml);
        loop {
            match reader.read_event().map_err(|e| package_error(&workbook, e))? {
                Event::Eof => break,
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                    let (Some(name), Some(id)) = (attribute(&e, b"name"), relationship_id(&e))
                    else {
                        continue;
                    };
                    if let Some(rel) = rels.iter().find(|r| r.id == id) {
                        sheets.insert(name, resolve_target(&workbook, &rel.target));
                    }
                }
                _ => {}
            }
        }
        Ok(sheets)
    }
}

/// A picture to anchor at a zero-based cell of one sheet.
#[derive(Debug, Clone)]
pub(crate) struct SheetImage<'a> {
    pub row: u32,
    pub column: u32,
    pub png: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub row_height_pt: f32,
    /// Picture name. A picture already in the drawing under this name is
    /// replaced.
    pub name: String,
}

/// Anchor `images` in the drawing of `sheet_part`, creating the drawing when
/// the sheet has none, and set each image row's height.
pub(crate) fn place_images(
    package: &mut Package,
    sheet_part: &str,
    images: &[SheetImage<'_>],
) -> Result<(), SkumatchError> {
    let mut sheet_rels = package.relationships(sheet_part)?;
    let existing_drawing = sheet_rels
        .iter()
        .find(|r| r.kind.ends_with("/drawing"))
        .map(|r| resolve_target(sheet_part, &r.target))
        .filter(|part| package.has_part(part));

    let drawing_part = existing_drawing
        .clone()
        .unwrap_or_else(|| package.free_name("xl/drawings/drawing", ".xml"));
    let mut drawing_rels = package.relationships(&drawing_part)?;
    let old_drawing_rel_count = drawing_rels.len();

    let mut anchors = Vec::with_capacity(images.len());
    for image in images {
        let media = package.free_name("xl/media/image", ".png");
        package.set_part(&media, image.png.to_vec());
        let rel_id = next_relationship_id(&drawing_rels);
        drawing_rels.push(Relationship {
            id: rel_id.clone(),
            kind: REL_IMAGE.to_string(),
            target: relative_target(&drawing_part, &media),
        });
        anchors.push(anchor_xml(image, &rel_id));
    }
    let names: BTreeSet<&str> = images.iter().map(|i| i.name.as_str()).collect();

    let drawing = match &existing_drawing {
        Some(part) => extend_drawing(package.required(part)?, part, &names, &anchors)?,
        None => new_drawing(&anchors),
    };
    package.set_part(&drawing_part, drawing);
    write_relationships(package, &drawing_part, &drawing_rels, old_drawing_rel_count)?;

    let mut new_drawing_rel = None;
    if existing_drawing.is_none() {
        let id = next_relationship_id(&sheet_rels);
        let old_count = sheet_rels.len();
        sheet_rels.push(Relationship {
            id: id.clone(),
            kind: REL_DRAWING.to_string(),
            target: relative_target(sheet_part, &drawing_part),
        });
        write_relationships(package, sheet_part, &sheet_rels, old_count)?;
        new_drawing_rel = Some(id);
    }

    let heights: BTreeMap<u32, f32> = images
        .iter()
        .map(|i| (i.row + 1, i.row_height_pt))
        .collect();
    let sheet = edit_sheet(
        package.required(sheet_part)?,
        sheet_part,
        new_drawing_rel.as_deref(),
        &heights,
    )?;
    package.set_part(sheet_part, sheet);

    let overrides: Vec<(String, &str)> = if existing_drawing.is_none() {
        vec![(format!("/{drawing_part}"), DRAWING_CONTENT_TYPE)]
    } else {
        Vec::new()
    };
    let types = ensure_content_types(package.required(CONTENT_TYPES)?, &overrides)?;
    package.set_part(CONTENT_TYPES, types);
    Ok(())
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Relationship {
    id: String,
    kind: String,
    target: String,
}

/// `dir/_rels/name.rels` for part `dir/name`.
fn rels_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/_rels/{name}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

fn parse_relationships(xml: &[u8], part: &str) -> Result<Vec<Relationship>, SkumatchError> {
    let mut rels = Vec::new();
    let mut reader = Reader::from_reader(xml);
    loop {
        match reader.read_event().map_err(|e| package_error(part, e))? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let (Some(id), Some(kind), Some(target)) = (
                    attribute(&e, b"Id"),
                    attribute(&e, b"Type"),
                    attribute(&e, b"Target"),
                ) else {
                    continue;
                };
                rels.push(Relationship { id, kind, target });
            }
            _ => {}
        }
    }
    Ok(rels)
}

fn next_relationship_id(rels: &[Relationship]) -> String {
    let max = rels
        .iter()
        .filter_map(|r| r.id.strip_prefix("rId")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("rId{}", max + 1)
}

fn relationship_xml(rel: &Relationship) -> String {
    format!(
        r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
        rel.id, rel.kind, rel.target
    )
}

/// Store the relationships of `part`. Entries past `existing` are new; an
/// existing rels part keeps its content and gets them appended.
fn write_relationships(
    package: &mut Package,
    part: &str,
    rels: &[Relationship],
    existing: usize,
) -> Result<(), SkumatchError> {
    let path = rels_path(part);
    let added: String = rels[existing..].iter().map(relationship_xml).collect();
    let xml = match package.part(&path) {
        Some(xml) => append_to_root(xml, &path, &added)?,
        None => {
            let body: String = rels.iter().map(relationship_xml).collect();
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{PACKAGE_REL_NS}">{body}</Relationships>"#
            )
            .into_bytes()
        }
    };
    package.set_part(&path, xml);
    Ok(())
}

/// Resolve a relationship target against the part that owns it.
fn resolve_target(part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Target of `to` as written in a relationship owned by `from`.
fn relative_target(from: &str, to: &str) -> String {
    let from_dir: Vec<&str> = match from.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    let to_segments: Vec<&str> = to.split('/').collect();
    let common = from_dir
        .iter()
        .zip(&to_segments[..to_segments.len().saturating_sub(1)])
        .take_while(|(a, b)| a == b)
        .count();
    let mut out: Vec<&str> = vec![".."; from_dir.len() - common];
    out.extend_from_slice(&to_segments[common..]);
    out.join("/")
}

// ---------------------------------------------------------------------------
// Drawings
// ---------------------------------------------------------------------------

fn anchor_xml(image: &SheetImage<'_>, rel_id: &str) -> String {
    let cx = u64::from(image.width) * EMU_PER_PIXEL;
    let cy = u64::from(image.height) * EMU_PER_PIXEL;
    format!(
        concat!(
            "<xdr:oneCellAnchor>",
            "<xdr:from><xdr:col>{col}</xdr:col><xdr:colOff>0</xdr:colOff>",
            "<xdr:row>{row}</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>",
            r#"<xdr:ext cx="{cx}" cy="{cy}"/>"#,
            "<xdr:pic><xdr:nvPicPr>",
            r#"<xdr:cNvPr id="{{ID}}" name="{name}"/>"#,
            r#"<xdr:cNvPicPr><a:picLocks noChangeAspect="1"/></xdr:cNvPicPr></xdr:nvPicPr>"#,
            r#"<xdr:blipFill><a:blip r:embed="{rel}"/><a:stretch><a:fillRect/></a:stretch></xdr:blipFill>"#,
            r#"<xdr:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></xdr:spPr>"#,
            "</xdr:pic><xdr:clientData/></xdr:oneCellAnchor>"
        ),
        col = image.column,
        row = image.row,
        cx = cx,
        cy = cy,
        name = image.name,
        rel = rel_id,
    )
}

/// Fill in the shape ids of anchors written by [`anchor_xml`], counting up
/// from `first_id`.
fn numbered_anchors(anchors: &[String], first_id: u32) -> String {
    anchors
        .iter()
        .zip(first_id..)
        .map(|(anchor, id)| anchor.replacen("{ID}", &id.to_string(), 1))
        .collect()
}

fn new_drawing(anchors: &[String]) -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<xdr:wsDr xmlns:xdr="{XDR_NS}" xmlns:a="{DRAWINGML_NS}" xmlns:r="{REL_NS}">{}</xdr:wsDr>"#,
        numbered_anchors(anchors, 1)
    )
    .into_bytes()
}

/// Copy an existing drawing, dropping anchors whose picture is named in
/// `replaced`, and append `anchors` at the end.
fn extend_drawing(
    xml: &[u8],
    part: &str,
    replaced: &BTreeSet<&str>,
    anchors: &[String],
) -> Result<Vec<u8>, SkumatchError> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + anchors.len() * 800));
    let mut depth = 0usize;
    let mut max_id = 0u32;
    let mut held: Vec<Event<'_>> = Vec::new();
    let mut in_anchor = false;
    let mut drop_anchor = false;

    loop {
        let event = reader.read_event().map_err(|e| package_error(part, e))?;
        if let Event::Start(e) | Event::Empty(e) = &event {
            if e.local_name().as_ref() == b"cNvPr" {
                if let Some(id) = attribute(e, b"id").and_then(|v| v.parse::<u32>().ok()) {
                    max_id = max_id.max(id);
                }
                if attribute(e, b"name").is_some_and(|n| replaced.contains(n.as_str())) {
                    drop_anchor = true;
                }
            }
        }

        match event {
            Event::Eof => break,
            Event::Start(e) if depth == 0 => {
                let root = declare_namespaces(
                    &e,
                    &[("xmlns:xdr", XDR_NS), ("xmlns:a", DRAWINGML_NS), ("xmlns:r", REL_NS)],
                );
                writer.write_event(Event::Start(root))?;
                depth += 1;
            }
            Event::Start(e) if depth == 1 && e.local_name().as_ref().ends_with(b"Anchor") => {
                in_anchor = true;
                drop_anchor = false;
                held.push(Event::Start(e));
                depth += 1;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if in_anchor {
                    held.push(Event::End(e));
                    if depth == 1 {
                        in_anchor = false;
                        for event in held.drain(..) {
                            if !drop_anchor {
                                writer.write_event(event)?;
                            }
                        }
                    }
                    continue;
                }
                if depth == 0 {
                    let added = numbered_anchors(anchors, max_id + 1);
                    writer.get_mut().extend_from_slice(added.as_bytes());
                }
                writer.write_event(Event::End(e))?;
            }
            event => {
                if let Event::Start(_) = event {
                    depth += 1;
                }
                if in_anchor {
                    held.push(event);
                } else {
                    writer.write_event(event)?;
                }
            }
        }
    }
    Ok(writer.into_inner())
}

// ---------------------------------------------------------------------------
// Worksheets
// ---------------------------------------------------------------------------

/// Copy a worksheet, setting custom heights on the rows in `heights`
/// (one-based) and inserting a `<drawing>` reference when given.
fn edit_sheet(
    xml: &[u8],
    part: &str,
    drawing_rel: Option<&str>,
    heights: &BTreeMap<u32, f32>,
) -> Result<Vec<u8>, SkumatchError> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 256));
    // Smallest row last, so rows are taken off the end in sheet order.
    let mut pending: Vec<(u32, f32)> = heights.iter().rev().map(|(r, h)| (*r, *h)).collect();
    let mut prefix = String::new();
    let mut depth = 0usize;
    let mut in_sheet_data = false;
    let mut last_row = 0u32;
    let mut drawing_done = drawing_rel.is_none();

    loop {
        let event = reader.read_event().map_err(|e| package_error(part, e))?;
        match event {
            Event::Eof => break,
            Event::Start(e) if depth == 0 => {
                if let Some(p) = e.name().prefix() {
                    prefix = format!("{}:", String::from_utf8_lossy(p.as_ref()));
                }
                let root = match drawing_rel {
                    Some(_) => declare_namespaces(&e, &[("xmlns:r", REL_NS)]),
                    None => e.into_owned(),
                };
                writer.write_event(Event::Start(root))?;
                depth += 1;
            }
            Event::Start(e) => {
                let local = e.local_name();
                let is_row = depth == 2 && in_sheet_data && local.as_ref() == b"row";
                let opens_sheet_data = depth == 1 && local.as_ref() == b"sheetData";
                if depth == 1 && !drawing_done && AFTER_DRAWING.contains(&local.as_ref()) {
                    write_drawing_ref(&mut writer, &prefix, drawing_rel)?;
                    drawing_done = true;
                }
                in_sheet_data |= opens_sheet_data;
                let e = if is_row {
                    sized_row(&mut writer, &e, &prefix, &mut pending, &mut last_row)?
                } else {
                    e.into_owned()
                };
                writer.write_event(Event::Start(e))?;
                depth += 1;
            }
            Event::Empty(e) => {
                let local = e.local_name();
                let is_row = depth == 2 && in_sheet_data && local.as_ref() == b"row";
                let empty_sheet_data = depth == 1 && local.as_ref() == b"sheetData";
                if depth == 1 && !drawing_done && AFTER_DRAWING.contains(&local.as_ref()) {
                    write_drawing_ref(&mut writer, &prefix, drawing_rel)?;
                    drawing_done = true;
                }
                if empty_sheet_data {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    writer.write_event(Event::Start(e.into_owned()))?;
                    write_remaining_rows(&mut writer, &prefix, &mut pending)?;
                    writer.write_event(Event::End(BytesEnd::new(name)))?;
                    continue;
                }
                let e = if is_row {
                    sized_row(&mut writer, &e, &prefix, &mut pending, &mut last_row)?
                } else {
                    e.into_owned()
                };
                writer.write_event(Event::Empty(e))?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 1 && in_sheet_data && e.local_name().as_ref() == b"sheetData" {
                    write_remaining_rows(&mut writer, &prefix, &mut pending)?;
                    in_sheet_data = false;
                }
                if depth == 0 && !drawing_done {
                    write_drawing_ref(&mut writer, &prefix, drawing_rel)?;
                    drawing_done = true;
                }
                writer.write_event(Event::End(e))?;
            }
            other => writer.write_event(other)?,
        }
    }
    Ok(writer.into_inner())
}

/// Write the pending rows numbered below this row's, then return the row
/// element, with a custom height when one is pending for it.
fn sized_row(
    writer: &mut Writer<Vec<u8>>,
    e: &BytesStart<'_>,
    prefix: &str,
    pending: &mut Vec<(u32, f32)>,
    last_row: &mut u32,
) -> Result<BytesStart<'static>, SkumatchError> {
    // Rows without `r` follow the previous row.
    let r = attribute(e, b"r")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(*last_row + 1);
    *last_row = r;
    while let Some(&(row, height)) = pending.last() {
        if row >= r {
            break;
        }
        writer.write_event(Event::Empty(new_row(prefix, row, height)))?;
        pending.pop();
    }
    match pending.last() {
        Some(&(row, height)) if row == r => {
            pending.pop();
            Ok(with_height(e, height))
        }
        _ => Ok(e.to_owned()),
    }
}

fn write_remaining_rows(
    writer: &mut Writer<Vec<u8>>,
    prefix: &str,
    pending: &mut Vec<(u32, f32)>,
) -> Result<(), SkumatchError> {
    while let Some((row, height)) = pending.pop() {
        writer.write_event(Event::Empty(new_row(prefix, row, height)))?;
    }
    Ok(())
}

fn new_row(prefix: &str, row: u32, height: f32) -> BytesStart<'static> {
    let mut e = BytesStart::new(format!("{prefix}row"));
    e.push_attribute(("r", row.to_string().as_str()));
    e.push_attribute(("ht", format!("{height:.2}").as_str()));
    e.push_attribute(("customHeight", "1"));
    e
}

fn with_height(e: &BytesStart<'_>, height: f32) -> BytesStart<'static> {
    let mut row = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes().flatten() {
        if !matches!(attr.key.as_ref(), b"ht" | b"customHeight") {
            row.push_attribute(attr);
        }
    }
    row.push_attribute(("ht", format!("{height:.2}").as_str()));
    row.push_attribute(("customHeight", "1"));
    row
}

fn write_drawing_ref(
    writer: &mut Writer<Vec<u8>>,
    prefix: &str,
    rel: Option<&str>,
) -> Result<(), SkumatchError> {
    if let Some(id) = rel {
        let mut e = BytesStart::new(format!("{prefix}drawing"));
        e.push_attribute(("r:id", id));
        writer.write_event(Event::Empty(e))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Content types and XML helpers
// ---------------------------------------------------------------------------

/// Register the png extension and `overrides` (part name, content type)
/// unless already present.
fn ensure_content_types(
    xml: &[u8],
    overrides: &[(String, &str)],
) -> Result<Vec<u8>, SkumatchError> {
    let mut has_png = false;
    let mut present = BTreeSet::new();
    let mut reader = Reader::from_reader(xml);
    loop {
        match reader.read_event().map_err(|e| package_error(CONTENT_TYPES, e))? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"Default" => {
                    has_png |= attribute(&e, b"Extension")
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
                }
                b"Override" => {
                    if let Some(part) = attribute(&e, b"PartName") {
                        present.insert(part);
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    let mut added = String::new();
    if !has_png {
        added.push_str(r#"<Default Extension="png" ContentType="image/png"/>"#);
    }
    for (part, content_type) in overrides {
        if !present.contains(part) {
            added.push_str(&format!(
                r#"<Override PartName="{part}" ContentType="{content_type}"/>"#
            ));
        }
    }
    if added.is_empty() {
        return Ok(xml.to_vec());
    }
    append_to_root(xml, CONTENT_TYPES, &added)
}

/// Copy `xml` with `raw` inserted just before the root element closes.
fn append_to_root(xml: &[u8], part: &str, raw: &str) -> Result<Vec<u8>, SkumatchError> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + raw.len()));
    let mut depth = 0usize;
    loop {
        match reader.read_event().map_err(|e| package_error(part, e))? {
            Event::Eof => break,
            Event::Start(e) => {
                depth += 1;
                writer.write_event(Event::Start(e))?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    writer.get_mut().extend_from_slice(raw.as_bytes());
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Empty(e) if depth == 0 => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer.write_event(Event::Start(e))?;
                writer.get_mut().extend_from_slice(raw.as_bytes());
                writer.write_event(Event::End(BytesEnd::new(name)))?;
            }
            other => writer.write_event(other)?,
        }
    }
    Ok(writer.into_inner())
}

/// Root element with any of `decls` (attribute, namespace) it lacks added.
fn declare_namespaces(e: &BytesStart<'_>, decls: &[(&str, &str)]) -> BytesStart<'static> {
    let mut root = e.to_owned();
    for &(key, ns) in decls {
        if attribute(e, key.as_bytes()).is_none() {
            root.push_attribute((key, ns));
        }
    }
    root
}

/// Unescaped value of the attribute whose full name is `key`.
fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

/// The `r:id` of an element, whatever prefix the relationships namespace
/// is bound to.
fn relationship_id(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.prefix().is_some() && a.key.local_name().as_ref() == b"id")
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}
