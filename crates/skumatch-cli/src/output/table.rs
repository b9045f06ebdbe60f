use std::fmt::Write;

use skumatch_core::compare::Coverage;
use skumatch_core::report::{RunReport, Severity};
use skumatch_core::ScanSummary;

pub fn format_scan(summary: &ScanSummary) -> String {
    let mut out = String::new();

    for page in &summary.pages {
        let _ = writeln!(
            out,
            "=== Page {} ({} code(s), {} image(s)) ===\n",
            page.page,
            page.codes.len(),
            page.images.len()
        );

        if !page.codes.is_empty() {
            let max_code = page.codes.iter().map(|c| c.raw_text.len()).max().unwrap_or(8);
            for code in &page.codes {
                let marker = if code.is_dependent { "  (dependent)" } else { "" };
                let _ = writeln!(
                    out,
                    "  {:<width$}  {:<14}  at {}{}",
                    code.raw_text,
                    code.normalized_key,
                    code.bbox,
                    marker,
                    width = max_code
                );
            }
            out.push('\n');
        }

        if !page.greyed.is_empty() {
            out.push_str("  Greyed (ignored):\n");
            for text in &page.greyed {
                let _ = writeln!(out, "    {}", text.text);
            }
            out.push('\n');
        }

        for image in &page.images {
            let _ = writeln!(out, "  image {:<10} {}  {}", image.id, image.bbox, image.encoding);
        }
        if !page.images.is_empty() {
            out.push('\n');
        }
    }

    for error in &summary.errors {
        let _ = writeln!(out, "  error: {}", error.message);
    }

    out
}

pub fn format_report(report: &RunReport) -> String {
    let mut out = String::new();

    if let Some(ref fatal) = report.fatal_error {
        let _ = writeln!(out, "Run failed: {fatal}\n");
        return out;
    }

    let _ = writeln!(
        out,
        "Scanned {}/{} page(s), {} code(s), {} binding(s){}\n",
        report.pages_scanned,
        report.pages_total,
        report.codes_recognized,
        report.bindings.len(),
        if report.cancelled { " (cancelled)" } else { "" }
    );

    if !report.bindings.is_empty() {
        let max_code = report
            .bindings
            .iter()
            .map(|b| b.raw_code.len())
            .max()
            .unwrap_or(8);
        out.push_str("  Bindings:\n");
        for binding in &report.bindings {
            let _ = writeln!(
                out,
                "    {:<width$}  p.{:<4} {} ({}x{})",
                binding.raw_code,
                binding.page,
                binding.image_id,
                binding.image.width,
                binding.image.height,
                width = max_code
            );
        }
        out.push('\n');
    }

    if !report.placements.is_empty() {
        out.push_str("  Placements:\n");
        for placement in &report.placements {
            let _ = writeln!(
                out,
                "    {} -> {}!{}",
                placement.raw_code, placement.sheet, placement.cell
            );
        }
        out.push('\n');
    }

    let important: Vec<_> = report
        .warnings
        .iter()
        .filter(|w| w.severity == Severity::Important)
        .collect();
    if !important.is_empty() {
        out.push_str("  Warnings:\n");
        for warning in &important {
            let _ = writeln!(out, "    [{}] {}", warning.kind, warning.message);
        }
        out.push('\n');
    }

    let dependent = report.warnings.len() - important.len();
    if dependent > 0 {
        let _ = writeln!(out, "  {dependent} dependent reference(s) skipped\n");
    }

    if !report.errors.is_empty() {
        out.push_str("  Errors:\n");
        for error in &report.errors {
            let _ = writeln!(out, "    {}", error.message);
        }
        out.push('\n');
    }

    out
}

pub fn format_coverage(coverage: &Coverage) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} code(s) in both, {:.0}% of spreadsheet codes found in the PDF\n",
        coverage.matched.len(),
        coverage.sheet_coverage() * 100.0
    );

    if !coverage.missing_in_pdf.is_empty() {
        let _ = writeln!(
            out,
            "  In spreadsheet, not in PDF ({}):",
            coverage.missing_in_pdf.len()
        );
        for key in &coverage.missing_in_pdf {
            let _ = writeln!(out, "    {key}");
        }
        out.push('\n');
    }

    if !coverage.missing_in_sheet.is_empty() {
        let _ = writeln!(
            out,
            "  In PDF, not in spreadsheet ({}):",
            coverage.missing_in_sheet.len()
        );
        for key in &coverage.missing_in_sheet {
            let _ = writeln!(out, "    {key}");
        }
        out.push('\n');
    }

    out
}
