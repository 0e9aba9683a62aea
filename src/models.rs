//! Request and response bodies shared by the services and their clients.

use serde::{Deserialize, Serialize};

/// `POST /embed` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedRequest {
    pub texts: Vec<String>,
}

/// `POST /embed` response body: one vector per input text, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub vectors: Vec<Vec<f32>>,
}

/// Detected kind of an uploaded file, serialized as the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Image,
    Txt,
    Csv,
    Docx,
    Unsupported,
}

impl FileKind {
    /// Classify by the lower-cased filename suffix.
    pub fn from_filename(filename: &str) -> Self {
        let name = filename.to_lowercase();
        if name.ends_with(".pdf") {
            FileKind::Pdf
        } else if [".png", ".jpg", ".jpeg", ".tiff", ".bmp", ".gif"]
            .iter()
            .any(|ext| name.ends_with(ext))
        {
            FileKind::Image
        } else if name.ends_with(".txt") {
            FileKind::Txt
        } else if name.ends_with(".csv") {
            FileKind::Csv
        } else if name.ends_with(".docx") {
            FileKind::Docx
        } else {
            FileKind::Unsupported
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Pdf => "pdf",
            FileKind::Image => "image",
            FileKind::Txt => "txt",
            FileKind::Csv => "csv",
            FileKind::Docx => "docx",
            FileKind::Unsupported => "unsupported",
        }
    }
}

/// `POST /file` response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedFile {
    pub filename: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    /// Character count of the full extracted text, before truncation.
    pub length: usize,
    pub text: String,
}

/// Error body used by both services: `{"detail": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}
