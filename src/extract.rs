use std::path::Path;

use log::debug;

use crate::error::{BridgeError, Result};

/// What a source document is, decided by file extension or MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Csv,
    Html,
    Text,
    Email,
}

impl DocumentKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Csv => "csv",
            Self::Html => "html",
            Self::Text => "text",
            Self::Email => "email",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "pdf" => Some(Self::Pdf),
            "csv" => Some(Self::Csv),
            "html" => Some(Self::Html),
            "text" => Some(Self::Text),
            "email" => Some(Self::Email),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "csv" => Some(Self::Csv),
            "html" | "htm" => Some(Self::Html),
            "txt" | "text" => Some(Self::Text),
            "eml" => Some(Self::Email),
            _ => None,
        }
    }

    pub fn from_mime(mime: &str, filename: Option<&str>) -> Option<Self> {
        let mime = mime.to_ascii_lowercase();
        if mime == "application/pdf" {
            return Some(Self::Pdf);
        }
        if mime == "text/csv" || mime == "application/csv" {
            return Some(Self::Csv);
        }
        if mime == "text/html" {
            return Some(Self::Html);
        }
        // Attachments often arrive as application/octet-stream.
        filename.and_then(|name| Self::from_path(Path::new(name)))
    }
}

/// PDFs carrying an `/Encrypt` trailer entry.
pub fn is_encrypted_pdf(bytes: &[u8]) -> bool {
    bytes.windows(b"/Encrypt".len()).any(|w| w == b"/Encrypt")
}

/// Lossy UTF-8; a leading byte-order mark is dropped.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Turn a document's bytes into the text the parsers read.
pub fn document_text(bytes: &[u8], kind: DocumentKind, password: Option<&str>) -> Result<String> {
    let text = match kind {
        DocumentKind::Pdf => pdf_text(bytes, password)?,
        DocumentKind::Csv | DocumentKind::Html | DocumentKind::Text | DocumentKind::Email => {
            decode_text(bytes)
        }
    };
    debug!(
        "Extracted {} chars of {} text: {:?}",
        text.len(),
        kind.key(),
        text.chars().take(200).collect::<String>()
    );
    Ok(text)
}

#[cfg(feature = "pdf")]
fn pdf_text(bytes: &[u8], password: Option<&str>) -> Result<String> {
    if !is_encrypted_pdf(bytes) {
        return pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| BridgeError::Extraction(e.to_string()));
    }
    match password {
        Some(password) => pdf_extract::extract_text_from_mem_encrypted(bytes, password).map_err(|e| {
            debug!("Encrypted PDF rejected: {e}");
            BridgeError::WrongPassword
        }),
        // Some encrypted statements use an empty user password.
        None => pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
            debug!("Encrypted PDF without password: {e}");
            BridgeError::PasswordRequired
        }),
    }
}

#[cfg(not(feature = "pdf"))]
fn pdf_text(_bytes: &[u8], _password: Option<&str>) -> Result<String> {
    Err(BridgeError::Extraction(
        "PDF support is not compiled in (enable the `pdf` feature)".to_string(),
    ))
}
