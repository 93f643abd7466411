// 🔤 Text Sources - Binary input in, one raw text blob out
//
// The OCR and PDF engines are black boxes. This module only owns the
// boundary: sniff the input, run the engine under a timeout, and map its
// failures into `IngestError`.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::error::IngestError;

// ============================================================================
// TRAIT
// ============================================================================

pub trait TextSource: Send + Sync {
    /// Short name for logs and timeout messages
    fn name(&self) -> &'static str;

    /// Extract all text from `bytes`. Multi-page input comes back as one
    /// string with pages in document order.
    fn extract_text(&self, bytes: Vec<u8>) -> impl Future<Output = Result<String, IngestError>> + Send;
}

// ============================================================================
// RECEIPT OCR (tesseract CLI)
// ============================================================================

#[derive(Debug, Clone)]
pub struct TesseractOcr {
    pub command: String,
    pub language: String,
    pub timeout: Duration,
}

impl TesseractOcr {
    pub fn from_config(config: &IngestConfig) -> Self {
        TesseractOcr {
            command: config.ocr_command.clone(),
            language: config.ocr_language.clone(),
            timeout: config.ocr_timeout(),
        }
    }
}

impl TextSource for TesseractOcr {
    fn name(&self) -> &'static str {
        "receipt OCR"
    }

    async fn extract_text(&self, bytes: Vec<u8>) -> Result<String, IngestError> {
        let format = image::guess_format(&bytes)
            .map_err(|e| IngestError::malformed("receipt image", e.to_string()))?;
        debug!(?format, size = bytes.len(), "running OCR");

        // --psm 6: treat the receipt as a single uniform block of text
        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "-l", &self.language, "--psm", "6"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| IngestError::Extraction(format!("failed to start '{}': {}", self.command, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| IngestError::Extraction("OCR process has no stdin".to_string()))?;

        let run = async move {
            stdin.write_all(&bytes).await?;
            drop(stdin);
            child.wait_with_output().await
        };

        // Dropping `run` on timeout drops the child, which kills it
        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                warn!(seconds = self.timeout.as_secs(), "OCR timed out");
                IngestError::Timeout {
                    source_name: self.name(),
                    seconds: self.timeout.as_secs(),
                }
            })?
            .map_err(|e| IngestError::Extraction(format!("OCR process failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IngestError::malformed("receipt image", stderr.trim().to_string()));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        info!(chars = text.len(), "OCR finished");
        Ok(text)
    }
}

// ============================================================================
// STATEMENT DOCUMENTS (PDF)
// ============================================================================

#[derive(Debug, Clone)]
pub struct PdfTextExtractor {
    pub timeout: Duration,
}

impl PdfTextExtractor {
    pub fn from_config(config: &IngestConfig) -> Self {
        PdfTextExtractor {
            timeout: config.document_timeout(),
        }
    }
}

impl TextSource for PdfTextExtractor {
    fn name(&self) -> &'static str {
        "statement text extraction"
    }

    async fn extract_text(&self, bytes: Vec<u8>) -> Result<String, IngestError> {
        if !bytes.starts_with(b"%PDF") {
            return Err(IngestError::malformed("PDF document", "missing %PDF header"));
        }
        debug!(size = bytes.len(), "extracting statement text");

        let task = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes));

        // A timed-out extraction keeps its blocking thread until it returns;
        // its result is discarded.
        let joined = tokio::time::timeout(self.timeout, task).await.map_err(|_| {
            warn!(seconds = self.timeout.as_secs(), "statement extraction timed out");
            IngestError::Timeout {
                source_name: self.name(),
                seconds: self.timeout.as_secs(),
            }
        })?;

        let text = joined
            .map_err(|e| IngestError::Extraction(format!("PDF extraction aborted: {}", e)))?
            .map_err(|e| IngestError::malformed("PDF document", e.to_string()))?;

        info!(chars = text.len(), "statement text extracted");
        Ok(text)
    }
}
