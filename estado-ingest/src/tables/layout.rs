//! Tables from poppler's `pdftotext -layout`, which keeps column alignment
//! as runs of spaces.

use std::io::{ErrorKind, Write};
use std::process::Command;

use estado_core::Scored;
use tempfile::NamedTempFile;

use super::{Table, TableBackend, TableMethod, shape_confidence, tables_from_lines};
use crate::error::TableError;

const LAYOUT_CEILING: f64 = 0.7;

#[derive(Debug, Clone)]
pub struct LayoutBackend {
    command: String,
}

impl LayoutBackend {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn layout_text(&self, pdf: &[u8], page: usize) -> Result<String, TableError> {
        let mut file = NamedTempFile::new()?;
        file.write_all(pdf)?;
        file.flush()?;

        let number = (page + 1).to_string();
        let output = Command::new(&self.command)
            .args(["-layout", "-enc", "UTF-8", "-f", &number, "-l", &number])
            .arg(file.path())
            .arg("-")
            .output();

        match output {
            Ok(out) if out.status.success() => Ok(String::from_utf8_lossy(&out.stdout).to_string()),
            Ok(out) => Err(TableError::Failed(format!(
                "{} exited with {}: {}",
                self.command,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            ))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(TableError::BackendNotAvailable(format!("{} not found", self.command)))
            }
            Err(e) => Err(TableError::Io(e)),
        }
    }
}

impl Default for LayoutBackend {
    fn default() -> Self {
        Self::new("pdftotext")
    }
}

impl TableBackend for LayoutBackend {
    fn method(&self) -> TableMethod {
        TableMethod::Layout
    }

    fn is_available(&self) -> bool {
        which::which(&self.command).is_ok()
    }

    fn extract(&self, pdf: &[u8], page: usize) -> Result<Scored<Vec<Table>>, TableError> {
        let text = self.layout_text(pdf, page)?;
        let tables = tables_from_lines(&text);
        let confidence = shape_confidence(&tables, LAYOUT_CEILING);
        Ok(Scored::new(tables, confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary() {
        let backend = LayoutBackend::new("estado-no-such-pdftotext");
        assert!(!backend.is_available());
        assert!(matches!(
            backend.extract(b"%PDF-1.5", 0),
            Err(TableError::BackendNotAvailable(_))
        ));
    }
}
