//! Lexical and structural scoring that decides whether extracted text is a
//! CONDUSEF-format credit card statement.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Sections every CONDUSEF statement must print
const PRIMARY_PHRASES: &[&str] = &[
    "TU PAGO REQUERIDO ESTE PERIODO",
    "DESGLOSE DE MOVIMIENTOS",
    "PAGO PARA NO GENERAR INTERESES",
    "CARGOS, ABONOS Y COMPRAS REGULARES",
    "RESUMEN DE CARGOS Y ABONOS DEL PERIODO",
    "NIVEL DE USO DE TU TARJETA",
    "MENSAJES IMPORTANTES",
    "INDICADORES DEL COSTO ANUAL",
];

const BANKS: &[&str] = &[
    "SANTANDER",
    "BBVA",
    "BANCOMER",
    "BANAMEX",
    "CITIBANAMEX",
    "BANORTE",
    "INBURSA",
    "SCOTIABANK",
    "HSBC",
    "BANCO AZTECA",
    "AFIRME",
];

const CREDIT_PHRASES: &[&str] = &[
    "TARJETA DE CREDITO",
    "TARJETA DE CRÉDITO",
    "ESTADO DE CUENTA",
    "FECHA DE CORTE",
    "PAGO MINIMO",
    "PAGO MÍNIMO",
    "LIMITE DE CREDITO",
    "LÍMITE DE CRÉDITO",
    "CREDITO DISPONIBLE",
    "CRÉDITO DISPONIBLE",
    "SALDO DEUDOR",
    "CONDUSEF",
];

/// Bare terms that, next to a bank name, are enough on their own
const CREDIT_TERMS: &[&str] = &["TARJETA", "CREDITO", "CRÉDITO", "ESTADO DE CUENTA"];

const TABLE_HEADERS: &[&str] = &[
    "COMPRAS Y CARGOS DIFERIDOS A MESES SIN INTERESES",
    "COMPRAS Y CARGOS DIFERIDOS A MESES CON INTERESES",
    "CARGOS, ABONOS Y COMPRAS REGULARES (NO A MESES)",
    "CARGOS NO RECONOCIDOS",
];

const STRUCTURAL_PATTERNS: &[&str] = &[
    r"(?i)p[áa]gina\s*\d+\s*de\s*\d+",
    r"(?i)fecha de corte",
    r"(?i)fecha l[íi]mite de pago",
    r"(?i)RFC:?\s*[A-Z&Ñ]{3,4}\d{6}[A-Z0-9]{3}",
    r"\d{4}[- ]\d{4}[- ]\d{4}[- ]\d{4}",
    r"\$\s*[\d,]+\.?\d*",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocumentKind {
    #[serde(rename = "mexican_condusef")]
    CondusefCreditCard,
    #[serde(rename = "unknown")]
    Unknown,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::CondusefCreditCard => "mexican_condusef",
            DocumentKind::Unknown => "unknown",
        }
    }
}

/// Which rule accepted the document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Primary,
    SecondaryWithHeader,
    Structural,
    BankAndCreditTerm,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    pub kind: DocumentKind,
    pub tier: Option<MatchTier>,
    pub primary_hits: usize,
    pub secondary_hits: usize,
    pub header_hits: usize,
    pub structural_hits: usize,
}

impl Classification {
    pub fn is_condusef(&self) -> bool {
        self.kind == DocumentKind::CondusefCreditCard
    }
}

pub struct DocumentClassifier {
    structural: Vec<Regex>,
}

impl DocumentClassifier {
    pub fn new() -> Result<Self, regex::Error> {
        let structural = STRUCTURAL_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { structural })
    }

    pub fn classify(&self, text: &str) -> Classification {
        let upper = text.to_uppercase();
        let count = |phrases: &[&str]| phrases.iter().filter(|p| upper.contains(*p)).count();

        let primary_hits = count(PRIMARY_PHRASES);
        let secondary_hits = count(BANKS) + count(CREDIT_PHRASES);
        let header_hits = count(TABLE_HEADERS);
        let structural_hits = self.structural.iter().filter(|re| re.is_match(text)).count();
        let has_bank = count(BANKS) > 0;
        let has_credit_term = count(CREDIT_TERMS) > 0;

        let tier = if primary_hits >= 1 {
            Some(MatchTier::Primary)
        } else if secondary_hits >= 2 && header_hits >= 1 {
            Some(MatchTier::SecondaryWithHeader)
        } else if secondary_hits >= 3 && structural_hits >= 2 {
            Some(MatchTier::Structural)
        } else if has_bank && has_credit_term {
            Some(MatchTier::BankAndCreditTerm)
        } else {
            None
        };

        Classification {
            kind: if tier.is_some() {
                DocumentKind::CondusefCreditCard
            } else {
                DocumentKind::Unknown
            },
            tier,
            primary_hits,
            secondary_hits,
            header_hits,
            structural_hits,
        }
    }
}
