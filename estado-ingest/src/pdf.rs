//! PDF access on top of `lopdf`: loading, page text, document metadata and a
//! positioned view of each page (text fragments and ruling lines) for the
//! layout-based table backends.
//!
//! Page indices in this module are 0-based; lopdf page numbers are 1-based.

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};

use crate::error::PdfError;

/// Document-level information reported for logging and the `info` command
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PdfMetadata {
    pub page_count: usize,
    pub file_size: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
}

/// A run of text placed at a point on the page (PDF user space, y grows upward)
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub font_size: f32,
}

impl TextFragment {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }
}

/// A straight stroked or filled segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RulingLine {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl RulingLine {
    pub fn is_horizontal(&self) -> bool {
        (self.y0 - self.y1).abs() < 1.0 && (self.x0 - self.x1).abs() >= 1.0
    }

    pub fn is_vertical(&self) -> bool {
        (self.x0 - self.x1).abs() < 1.0 && (self.y0 - self.y1).abs() >= 1.0
    }

    pub fn length(&self) -> f32 {
        ((self.x1 - self.x0).powi(2) + (self.y1 - self.y0).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub fragments: Vec<TextFragment>,
    pub rulings: Vec<RulingLine>,
}

/// A loaded PDF
pub struct PdfDocument {
    doc: Document,
    size: usize,
}

impl PdfDocument {
    pub fn load(bytes: &[u8]) -> Result<Self, PdfError> {
        if bytes.is_empty() {
            return Err(PdfError::Empty);
        }
        let doc = Document::load_mem(bytes)?;
        Ok(Self {
            doc,
            size: bytes.len(),
        })
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    fn page_id(&self, index: usize) -> Result<ObjectId, PdfError> {
        let number = u32::try_from(index + 1).map_err(|_| PdfError::PageNotFound(index))?;
        self.doc
            .get_pages()
            .get(&number)
            .copied()
            .ok_or(PdfError::PageNotFound(index))
    }

    /// Embedded text of one page, as lopdf decodes it.
    pub fn page_text(&self, index: usize) -> Result<String, PdfError> {
        self.page_id(index)?;
        self.doc
            .extract_text(&[index as u32 + 1])
            .map_err(|e| PdfError::Content {
                page: index + 1,
                message: e.to_string(),
            })
    }

    pub fn metadata(&self) -> PdfMetadata {
        let info = info_dictionary(&self.doc);
        let field = |key: &[u8]| info.and_then(|dict| info_string(&self.doc, dict, key));
        PdfMetadata {
            page_count: self.page_count(),
            file_size: self.size,
            title: field(b"Title"),
            author: field(b"Author"),
            subject: field(b"Subject"),
            creator: field(b"Creator"),
            producer: field(b"Producer"),
            creation_date: field(b"CreationDate"),
            modification_date: field(b"ModDate"),
        }
    }

    /// Positioned text fragments and ruling lines of one page.
    pub fn page_layout(&self, index: usize) -> Result<PageLayout, PdfError> {
        let page_id = self.page_id(index)?;
        let content_err = |e: lopdf::Error| PdfError::Content {
            page: index + 1,
            message: e.to_string(),
        };
        let data = self.doc.get_page_content(page_id).map_err(content_err)?;
        let content = Content::decode(&data).map_err(content_err)?;

        let (width, height) = self.media_box(page_id).unwrap_or((612.0, 792.0));
        let mut interp = ContentInterpreter::default();
        for op in &content.operations {
            interp.apply(&op.operator, &op.operands);
        }
        Ok(PageLayout {
            width,
            height,
            fragments: interp.fragments,
            rulings: interp.rulings,
        })
    }

    fn media_box(&self, page_id: ObjectId) -> Option<(f32, f32)> {
        let page = self.doc.get_object(page_id).ok()?.as_dict().ok()?;
        let mbox = page.get(b"MediaBox").ok()?;
        let (_, mbox) = self.doc.dereference(mbox).ok()?;
        let values: Vec<f32> = mbox.as_array().ok()?.iter().filter_map(number).collect();
        match values.as_slice() {
            [x0, y0, x1, y1] => Some(((x1 - x0).abs(), (y1 - y0).abs())),
            _ => None,
        }
    }
}

/// True when the bytes open as a PDF with at least one readable page.
pub fn validate(bytes: &[u8]) -> bool {
    match PdfDocument::load(bytes) {
        Ok(doc) => doc.page_count() > 0 && doc.page_id(0).is_ok_and(|id| doc.doc.get_page_content(id).is_ok()),
        Err(_) => false,
    }
}

pub fn get_pdf_metadata(bytes: &[u8]) -> Result<PdfMetadata, PdfError> {
    Ok(PdfDocument::load(bytes)?.metadata())
}

fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    let info = doc.trailer.get(b"Info").ok()?;
    let (_, info) = doc.dereference(info).ok()?;
    info.as_dict().ok()
}

fn info_string(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    let (_, value) = doc.dereference(dict.get(key).ok()?).ok()?;
    match value {
        Object::String(bytes, _) => {
            let s = decode_pdf_string(bytes);
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        _ => None,
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, otherwise byte-per-char.
pub(crate) fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Affine transform `[a b c d e f]` as used by `cm` and `Tm`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Default for Matrix {
    fn default() -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0])
    }
}

impl Matrix {
    fn translation(tx: f32, ty: f32) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self` applied first, then `other`.
    fn then(&self, other: &Matrix) -> Matrix {
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

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    fn scale_y(&self) -> f32 {
        let [_, _, c, d, _, _] = self.0;
        (c * c + d * d).sqrt()
    }
}

/// Minimal content-stream interpreter: tracks text positioning and path
/// construction, ignores everything else.
#[derive(Default)]
struct ContentInterpreter {
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    font_size: f32,
    leading: f32,
    path: Vec<RulingLine>,
    cursor: Option<(f32, f32)>,
    fragments: Vec<TextFragment>,
    rulings: Vec<RulingLine>,
}

impl ContentInterpreter {
    fn apply(&mut self, operator: &str, operands: &[Object]) {
        let nums: Vec<f32> = operands.iter().filter_map(number).collect();
        match operator {
            "q" => self.ctm_stack.push(self.ctm),
            "Q" => {
                if let Some(m) = self.ctm_stack.pop() {
                    self.ctm = m;
                }
            }
            "cm" => {
                if let [a, b, c, d, e, f] = nums[..] {
                    self.ctm = Matrix([a, b, c, d, e, f]).then(&self.ctm);
                }
            }
            "BT" => {
                self.text_matrix = Matrix::default();
                self.line_matrix = Matrix::default();
            }
            "Tf" => {
                if let Some(size) = nums.first() {
                    self.font_size = *size;
                }
            }
            "TL" => {
                if let Some(l) = nums.first() {
                    self.leading = *l;
                }
            }
            "Td" | "TD" => {
                if let [tx, ty] = nums[..] {
                    if operator == "TD" {
                        self.leading = -ty;
                    }
                    self.next_line(tx, ty);
                }
            }
            "Tm" => {
                if let [a, b, c, d, e, f] = nums[..] {
                    self.text_matrix = Matrix([a, b, c, d, e, f]);
                    self.line_matrix = self.text_matrix;
                }
            }
            "T*" => self.next_line(0.0, -self.leading),
            "Tj" => self.show_text(operands.first()),
            "'" => {
                self.next_line(0.0, -self.leading);
                self.show_text(operands.first());
            }
            "\"" => {
                self.next_line(0.0, -self.leading);
                self.show_text(operands.get(2));
            }
            "TJ" => self.show_text(operands.first()),
            "m" => {
                if let [x, y] = nums[..] {
                    self.cursor = Some(self.ctm.apply(x, y));
                }
            }
            "l" => {
                if let ([x, y], Some((cx, cy))) = (&nums[..], self.cursor) {
                    let (x1, y1) = self.ctm.apply(*x, *y);
                    self.path.push(RulingLine { x0: cx, y0: cy, x1, y1 });
                    self.cursor = Some((x1, y1));
                }
            }
            "re" => {
                if let [x, y, w, h] = nums[..] {
                    let (x0, y0) = self.ctm.apply(x, y);
                    let (x1, y1) = self.ctm.apply(x + w, y + h);
                    if (y1 - y0).abs() < 2.0 {
                        // thin filled rectangles are how many generators draw rules
                        let ym = (y0 + y1) / 2.0;
                        self.path.push(RulingLine { x0, y0: ym, x1, y1: ym });
                    } else if (x1 - x0).abs() < 2.0 {
                        let xm = (x0 + x1) / 2.0;
                        self.path.push(RulingLine { x0: xm, y0, x1: xm, y1 });
                    } else {
                        self.path.push(RulingLine { x0, y0, x1, y1: y0 });
                        self.path.push(RulingLine { x0, y0: y1, x1, y1 });
                        self.path.push(RulingLine { x0, y0, x1: x0, y1 });
                        self.path.push(RulingLine { x0: x1, y0, x1, y1 });
                    }
                }
            }
            "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => {
                self.rulings
                    .extend(self.path.drain(..).filter(|l| l.is_horizontal() || l.is_vertical()));
                self.cursor = None;
            }
            "n" => {
                self.path.clear();
                self.cursor = None;
            }
            _ => {}
        }
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translation(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn show_text(&mut self, operand: Option<&Object>) {
        let text = match operand {
            Some(Object::String(bytes, _)) => decode_pdf_string(bytes),
            Some(Object::Array(items)) => {
                let mut s = String::new();
                for item in items {
                    match item {
                        Object::String(bytes, _) => s.push_str(&decode_pdf_string(bytes)),
                        // large negative kerning is a word gap
                        other => {
                            if number(other).is_some_and(|n| n < -200.0) {
                                s.push(' ');
                            }
                        }
                    }
                }
                s
            }
            _ => return,
        };
        if text.trim().is_empty() {
            return;
        }

        let full = self.text_matrix.then(&self.ctm);
        let (x, y) = full.apply(0.0, 0.0);
        let size = (self.font_size * full.scale_y()).abs().max(1.0);
        let width = text.chars().count() as f32 * size * 0.5;
        self.fragments.push(TextFragment {
            text: text.trim().to_string(),
            x,
            y,
            width,
            font_size: size,
        });

        let advance = text.chars().count() as f32 * self.font_size * 0.5;
        self.text_matrix = Matrix::translation(advance, 0.0).then(&self.text_matrix);
    }
}
