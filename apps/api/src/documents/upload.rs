use axum::extract::Multipart;
use bytes::Bytes;

use crate::errors::AppError;

pub const FILE_FIELD: &str = "file";

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOC: &str = "application/msword";
pub const MIME_DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const PDF_MAGIC: &[u8] = b"%PDF-";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Résumé formats accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Doc,
    Docx,
}

impl DocumentKind {
    pub fn from_mime(mime: &str) -> Option<Self> {
        // Browsers sometimes append parameters, e.g. "application/pdf; charset=binary".
        let base = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match base.as_str() {
            MIME_PDF => Some(Self::Pdf),
            MIME_DOC => Some(Self::Doc),
            MIME_DOCX => Some(Self::Docx),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Pdf => MIME_PDF,
            Self::Doc => MIME_DOC,
            Self::Docx => MIME_DOCX,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Doc => "doc",
            Self::Docx => "docx",
        }
    }

    fn magic(&self) -> &'static [u8] {
        match self {
            Self::Pdf => PDF_MAGIC,
            Self::Doc => OLE_MAGIC,
            Self::Docx => ZIP_MAGIC,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> i64 {
        self.bytes.len() as i64
    }
}

/// Reads the `file` field from a multipart body. Other fields are ignored.
pub async fn read_file_field(mut multipart: Multipart) -> Result<UploadedFile, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or("resume").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(|e| {
            if e.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
                AppError::PayloadTooLarge("File exceeds the upload size limit".to_string())
            } else {
                AppError::BadRequest(format!("Failed to read upload: {e}"))
            }
        })?;
        return Ok(UploadedFile {
            filename,
            content_type,
            bytes,
        });
    }
    Err(AppError::BadRequest(format!(
        "Missing multipart field '{FILE_FIELD}'"
    )))
}

fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Checks size, declared MIME type, file extension and content signature.
pub fn validate_upload(file: &UploadedFile, max_bytes: usize) -> Result<DocumentKind, AppError> {
    if file.bytes.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
    }
    if file.bytes.len() > max_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "File exceeds the {} byte limit",
            max_bytes
        )));
    }

    let kind = DocumentKind::from_mime(&file.content_type).ok_or_else(|| {
        AppError::UnsupportedMediaType("Only PDF, DOC and DOCX files are accepted".to_string())
    })?;

    if extension_of(&file.filename).as_deref() != Some(kind.extension()) {
        return Err(AppError::BadRequest(format!(
            "File extension does not match its type; expected .{}",
            kind.extension()
        )));
    }

    if !file.bytes.starts_with(kind.magic()) {
        return Err(AppError::UnsupportedMediaType(
            "File content does not match its declared type".to_string(),
        ));
    }

    Ok(kind)
}
