#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use estado_core::Scored;
use estado_finance::{LanguageModel, LlmError};
use image::GrayImage;
use estado_ingest::{OcrEngine, OcrError, OcrWord, PageRenderer, Table, TableBackend, TableError, TableMethod};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

pub type CallLog = Arc<Mutex<Vec<&'static str>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<&'static str> {
    log.lock().unwrap().clone()
}

pub const STATEMENT_LINES: &[&str] = &[
    "BANCO SANTANDER MEXICO",
    "JUAN PEREZ LOPEZ",
    "ESTADO DE CUENTA",
    "Numero de tarjeta: 1234 5678 9012 3456",
    "RFC: PELJ800101AB1",
    "TU PAGO REQUERIDO ESTE PERIODO",
    "Periodo: Del 01-ENE-2023 al 31-ENE-2023",
    "Fecha de corte: 31-ENE-2023",
    "Fecha limite de pago: 20-FEB-2023",
    "Pago para no generar intereses: $5,432.10",
    "Pago minimo: $350.00",
    "RESUMEN DE CARGOS Y ABONOS DEL PERIODO",
    "Adeudo del periodo anterior = $1,000.00",
    "Cargos regulares no a meses + $775.80",
    "Pagos y abonos - $2,000.00",
    "Limite de credito: $50,000.00",
    "Credito disponible: $44,567.90",
    "Saldo deudor total: $5,432.10",
    "DESGLOSE DE MOVIMIENTOS",
    "15-ENE-2023 OXXO MONTERREY $55.80",
    "16-ENE-2023 17-ENE-2023 PEMEX GAS 1234 $600.00",
    "18-ENE-2023 MISCELANEA LUPITA $120.00",
    "20-ENE-2023 SU PAGO GRACIAS - $2,000.00",
];

fn text_line(x: i64, y: i64, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 10.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
    ]
}

/// One page per entry, each line of text 14 points below the previous.
pub fn pdf_with_pages(pages: &[&[&str]]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let mut kids = Vec::new();
    for lines in pages {
        let operations: Vec<Operation> = lines
            .iter()
            .enumerate()
            .flat_map(|(i, line)| text_line(40, 760 - 14 * i as i64, line))
            .collect();
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! { "Type" => "Pages", "Kids" => kids, "Count" => count }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

pub fn statement_pdf() -> Vec<u8> {
    pdf_with_pages(&[STATEMENT_LINES])
}

/// A scanned page: no text layer at all.
pub fn blank_pdf() -> Vec<u8> {
    let blank: &[&str] = &[];
    pdf_with_pages(&[blank])
}

pub fn zero_page_pdf() -> Vec<u8> {
    pdf_with_pages(&[])
}

/// Table backend that always fails
pub struct FailingBackend(pub CallLog);

impl TableBackend for FailingBackend {
    fn method(&self) -> TableMethod {
        TableMethod::Lattice
    }

    fn extract(&self, _pdf: &[u8], _page: usize) -> Result<Scored<Vec<Table>>, TableError> {
        self.0.lock().unwrap().push("backend");
        Err(TableError::Failed("no ruling lines".to_string()))
    }
}

/// Table backend that finds the same two movement rows on every page,
/// optionally stalling on one page first
pub struct MovementsBackend {
    pub slow_page: Option<(usize, Duration)>,
}

impl MovementsBackend {
    pub fn new() -> Self {
        Self { slow_page: None }
    }

    pub fn slow_on(page: usize, delay: Duration) -> Self {
        Self {
            slow_page: Some((page, delay)),
        }
    }
}

impl TableBackend for MovementsBackend {
    fn method(&self) -> TableMethod {
        TableMethod::Stream
    }

    fn extract(&self, _pdf: &[u8], page: usize) -> Result<Scored<Vec<Table>>, TableError> {
        if let Some((slow, delay)) = self.slow_page {
            if slow == page {
                std::thread::sleep(delay);
            }
        }
        let row = |cells: &[&str]| cells.iter().map(|c| c.to_string()).collect::<Vec<_>>();
        let table = Table::new(vec![
            row(&["15-ENE-2023", "OXXO MONTERREY", "$55.80"]),
            row(&["16-ENE-2023", "PEMEX CENTRO", "$600.00"]),
        ]);
        Ok(Scored::new(vec![table], 0.9))
    }
}

pub struct WhitePage(pub CallLog);

impl PageRenderer for WhitePage {
    fn render(&self, _pdf: &[u8], _page: usize, _dpi: u32) -> Result<GrayImage, OcrError> {
        self.0.lock().unwrap().push("render");
        Ok(GrayImage::from_pixel(40, 40, image::Luma([255])))
    }
}

/// OCR engine that reads the same words from every page
pub struct CannedOcr {
    pub words: Vec<OcrWord>,
    pub log: CallLog,
}

impl CannedOcr {
    pub fn line(text: &str, log: CallLog) -> Self {
        let words = text
            .split_whitespace()
            .enumerate()
            .map(|(i, w)| OcrWord {
                text: w.to_string(),
                left: 10 + 120 * i as u32,
                top: 100,
                width: 10 * w.len() as u32,
                height: 12,
                confidence: 90.0,
            })
            .collect();
        Self { words, log }
    }
}

impl OcrEngine for CannedOcr {
    fn is_available(&self) -> bool {
        true
    }

    fn recognize_words(&self, _image: &GrayImage, _language: &str) -> Result<Vec<OcrWord>, OcrError> {
        self.log.lock().unwrap().push("ocr");
        Ok(self.words.clone())
    }
}

/// Language model with a fixed answer
pub struct ScriptedModel {
    pub reply: String,
    pub delay: Option<Duration>,
    pub log: CallLog,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(reply: &str, log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            delay: None,
            log,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn slow(reply: &str, delay: Duration, log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            delay: Some(delay),
            log,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn is_available(&self) -> bool {
        true
    }

    async fn complete(&self, _system: &str, user: &str) -> Result<String, LlmError> {
        self.log.lock().unwrap().push("llm");
        self.prompts.lock().unwrap().push(user.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.reply.clone())
    }
}
