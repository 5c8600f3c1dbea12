//! Markdown-ish text to PDF.
//!
//! This is a line scanner, not a Markdown parser: `#`/`##`/`###` headings,
//! lines starting with `**` set in bold, fenced code blocks in Courier, and
//! everything else as wrapped body text. Fonts are the PDF base-14 set, so
//! text is limited to WinAnsi; anything outside it becomes `?`.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::error::{FlowError, Result};

const PAGE_W: f32 = 595.0;
const PAGE_H: f32 = 842.0;
const MARGIN_X: f32 = 50.0;
const TOP_Y: f32 = 790.0;
const BOTTOM_Y: f32 = 60.0;

/// Tokens longer than this are split so a single URL cannot overflow the page.
pub const HARD_SPLIT: usize = 80;

const PREPARED_BY: &str = "sdlc-flow";

// ---------------------------------------------------------------------------
// Styles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Body,
    Bold,
    H1,
    H2,
    H3,
    Code,
}

impl Style {
    fn font(self) -> &'static str {
        match self {
            Style::Body => "F1",
            Style::Bold | Style::H1 | Style::H2 | Style::H3 => "F2",
            Style::Code => "F3",
        }
    }

    fn size(self) -> f32 {
        match self {
            Style::Body | Style::Bold => 11.0,
            Style::H1 => 16.0,
            Style::H2 => 13.0,
            Style::H3 => 12.0,
            Style::Code => 9.0,
        }
    }

    fn leading(self) -> f32 {
        match self {
            Style::Code => 11.0,
            Style::H1 => 22.0,
            Style::H2 | Style::H3 => 18.0,
            _ => 15.0,
        }
    }

    /// Characters per line; roughly the usable width over the average glyph width.
    fn wrap_width(self) -> usize {
        match self {
            Style::Body => 88,
            Style::Bold => 80,
            Style::H1 => 55,
            Style::H2 => 68,
            Style::H3 => 74,
            Style::Code => 90,
        }
    }

    fn color(self) -> [f32; 3] {
        match self {
            Style::H1 | Style::H2 | Style::H3 => [0.06, 0.09, 0.16],
            Style::Code => [0.12, 0.16, 0.23],
            _ => [0.2, 0.25, 0.33],
        }
    }
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Encode for a WinAnsi base font. Typographic quotes and dashes are folded to
/// ASCII; anything else outside Latin-1 becomes `?`.
fn encode_winansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => b'\'',
            '\u{201C}' | '\u{201D}' => b'"',
            '\u{2013}' | '\u{2014}' => b'-',
            '\u{2022}' => 0x95,
            '\t' => b' ',
            c if (c as u32) < 0x20 => b' ',
            c if (c as u32) <= 0xFF && !(0x80..0xA0).contains(&(c as u32)) => c as u8,
            _ => b'?',
        })
        .collect()
}

/// Greedy word wrap to `width` characters; words over [`HARD_SPLIT`] are chunked.
pub(crate) fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    let words = text.split_whitespace().flat_map(|w| {
        let chars: Vec<char> = w.chars().collect();
        chars
            .chunks(HARD_SPLIT)
            .map(|c| c.iter().collect::<String>())
            .collect::<Vec<_>>()
    });

    for word in words {
        let len = word.chars().count();
        if current_len > 0 && current_len + 1 + len > width {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(&word);
        current_len += len;
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Code lines keep their indentation and are hard-split rather than word wrapped.
fn split_code(line: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars.chunks(width).map(|c| c.iter().collect()).collect()
}

fn report_title(markdown: &str) -> &'static str {
    if markdown.contains("Architecture") {
        "Architecture Report"
    } else {
        "System Report"
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

struct Layout {
    pages: Vec<Vec<Operation>>,
    ops: Vec<Operation>,
    y: f32,
}

fn text_op(font: &str, size: f32, x: f32, y: f32, color: [f32; 3], text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("rg", color.iter().map(|c| (*c).into()).collect()),
        Operation::new("Tf", vec![font.into(), size.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(encode_winansi(text))]),
        Operation::new("ET", vec![]),
    ]
}

/// Rough centring for Helvetica: half an em per character.
fn centred_x(text: &str, size: f32) -> f32 {
    let width = text.chars().count() as f32 * size * 0.5;
    ((PAGE_W - width) / 2.0).max(MARGIN_X)
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            ops: Vec::new(),
            y: TOP_Y,
        }
    }

    fn new_page(&mut self) {
        if !self.ops.is_empty() {
            self.pages.push(std::mem::take(&mut self.ops));
        }
        self.y = TOP_Y;
    }

    fn gap(&mut self, points: f32) {
        self.y -= points;
        if self.y < BOTTOM_Y {
            self.new_page();
        }
    }

    fn line(&mut self, style: Style, text: &str) {
        if self.y - style.leading() < BOTTOM_Y {
            self.new_page();
        }
        self.y -= style.leading();
        let ops = text_op(style.font(), style.size(), MARGIN_X, self.y, style.color(), text);
        self.ops.extend(ops);
    }

    fn paragraph(&mut self, style: Style, text: &str) {
        for l in wrap(text, style.wrap_width()) {
            self.line(style, &l);
        }
    }

    fn cover(&mut self, title: &str) {
        self.ops.push(Operation::new(
            "rg",
            vec![0.06f32.into(), 0.09f32.into(), 0.16f32.into()],
        ));
        self.ops.push(Operation::new(
            "re",
            vec![0.into(), 0.into(), PAGE_W.into(), PAGE_H.into()],
        ));
        self.ops.push(Operation::new("f", vec![]));

        let white = [1.0, 1.0, 1.0];
        let muted = [0.58, 0.64, 0.72];
        self.ops
            .extend(text_op("F2", 34.0, centred_x(title, 34.0), 480.0, white, title));
        let by = format!("Prepared by: {PREPARED_BY}");
        self.ops.extend(text_op("F1", 14.0, centred_x(&by, 14.0), 400.0, muted, &by));
        let date = format!("Date: {}", chrono::Utc::now().format("%B %d, %Y"));
        self.ops
            .extend(text_op("F1", 14.0, centred_x(&date, 14.0), 380.0, muted, &date));
        self.new_page();
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        self.new_page();
        let total = self.pages.len();
        for (i, page) in self.pages.iter_mut().enumerate().skip(1) {
            let label = format!("Page {}/{}", i + 1, total);
            page.extend(text_op(
                "F4",
                8.0,
                centred_x(&label, 8.0),
                30.0,
                [0.58, 0.64, 0.72],
                &label,
            ));
        }
        self.pages
    }
}

fn lay_out(markdown: &str) -> Vec<Vec<Operation>> {
    let mut layout = Layout::new();
    layout.cover(report_title(markdown));

    layout.line(Style::H2, "Executive Summary");
    layout.gap(5.0);

    let mut in_code = false;
    for raw in markdown.lines() {
        if raw.trim_start().starts_with("```") {
            in_code = !in_code;
            layout.gap(if in_code { 2.0 } else { 5.0 });
            continue;
        }
        if in_code {
            for l in split_code(raw, Style::Code.wrap_width()) {
                layout.line(Style::Code, &l);
            }
            continue;
        }

        if let Some(h) = raw.strip_prefix("### ") {
            layout.gap(4.0);
            layout.paragraph(Style::H3, h);
        } else if let Some(h) = raw.strip_prefix("## ") {
            layout.gap(5.0);
            layout.paragraph(Style::H2, h);
        } else if let Some(h) = raw.strip_prefix("# ") {
            layout.gap(10.0);
            layout.paragraph(Style::H1, h);
        } else if raw.starts_with("**") {
            layout.paragraph(Style::Bold, &raw.replace("**", ""));
        } else if raw.trim().is_empty() {
            layout.gap(7.0);
        } else {
            layout.paragraph(Style::Body, &raw.replace("**", ""));
        }
    }
    layout.finish()
}

// ---------------------------------------------------------------------------
// Document assembly
// ---------------------------------------------------------------------------

fn font(doc: &mut Document, base: &str) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Render `markdown` to PDF bytes.
pub fn render_pdf(markdown: &str) -> Result<Vec<u8>> {
    let pages = lay_out(markdown);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let f1 = font(&mut doc, "Helvetica");
    let f2 = font(&mut doc, "Helvetica-Bold");
    let f3 = font(&mut doc, "Courier");
    let f4 = font(&mut doc, "Helvetica-Oblique");
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => f1,
            "F2" => f2,
            "F3" => f3,
            "F4" => f4,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let bytes = content
            .encode()
            .map_err(|e| FlowError::Render(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, bytes));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let media_box: Vec<Object> = vec![0.into(), 0.into(), PAGE_W.into(), PAGE_H.into()];
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => media_box,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| FlowError::Render(e.to_string()))?;
    debug!(pages = count, bytes = out.len(), "pdf rendered");
    Ok(out)
}
