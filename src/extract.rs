//! Multi-format text extraction for uploaded files.
//!
//! The file kind comes from the filename suffix (see [`FileKind::from_filename`]);
//! each kind is handed to one parser:
//!
//! | Kind | Parser |
//! |------|--------|
//! | `pdf` | `pdf-extract` |
//! | `image` | `image` decode → PNG → OCR executable ([`crate::ocr`]) |
//! | `txt` | `chardetng` detection + `encoding_rs` decode |
//! | `csv` | decoded as `txt`, then `csv` rows joined with tabs |
//! | `docx` | `word/document.xml` paragraphs via `zip` + `quick-xml` |
//!
//! CPU-bound parsers run on the blocking pool; a parser panic surfaces as
//! [`ExtractError::Task`] instead of taking the server down.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use thiserror::Error;

use crate::config::ExtractConfig;
use crate::models::{ExtractedFile, FileKind};
use crate::ocr;

/// Placeholder text for files whose kind has no parser.
pub const UNSUPPORTED_TEXT: &str = "[Unsupported file type]";
/// Placeholder text when a parser produced only whitespace.
pub const NO_TEXT: &str = "[No readable text extracted]";
/// Suffix appended to truncated text.
pub const ELLIPSIS: &str = "...";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Empty file upload")]
    Empty,

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX extraction failed: {0}")]
    Docx(String),

    #[error("image decoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Extract text from an uploaded file and shape the response body.
///
/// # Errors
///
/// [`ExtractError::Empty`] for zero-length content; otherwise whatever the
/// selected parser reports. Unsupported kinds are not an error.
pub async fn extract_file(
    filename: &str,
    bytes: Vec<u8>,
    config: &ExtractConfig,
) -> Result<ExtractedFile, ExtractError> {
    if bytes.is_empty() {
        return Err(ExtractError::Empty);
    }

    let kind = FileKind::from_filename(filename);
    tracing::debug!(filename, kind = kind.as_str(), bytes = bytes.len(), "extracting");

    let text = extract_text(kind, bytes, config).await?;
    Ok(finish(filename, kind, &text, config.max_text_chars))
}

/// Read a file from disk and run it through [`extract_file`].
pub async fn extract_path(path: &Path, config: &ExtractConfig) -> Result<ExtractedFile, ExtractError> {
    let bytes = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    extract_file(&filename, bytes, config).await
}

async fn extract_text(
    kind: FileKind,
    bytes: Vec<u8>,
    config: &ExtractConfig,
) -> Result<String, ExtractError> {
    match kind {
        FileKind::Pdf => tokio::task::spawn_blocking(move || extract_pdf(&bytes)).await?,
        FileKind::Image => {
            let png = tokio::task::spawn_blocking(move || image_to_png(&bytes)).await??;
            ocr::image_to_string(&png, config).await
        }
        FileKind::Txt => Ok(decode_text(&bytes)),
        FileKind::Csv => tokio::task::spawn_blocking(move || csv_to_text(&decode_text(&bytes))).await?,
        FileKind::Docx => tokio::task::spawn_blocking(move || extract_docx(&bytes)).await?,
        FileKind::Unsupported => Ok(UNSUPPORTED_TEXT.to_string()),
    }
}

/// Trim, substitute the placeholder for empty text, count and truncate.
fn finish(filename: &str, kind: FileKind, text: &str, max_chars: usize) -> ExtractedFile {
    let trimmed = text.trim();
    let text = if trimmed.is_empty() { NO_TEXT } else { trimmed };
    let length = text.chars().count();

    ExtractedFile {
        filename: filename.to_string(),
        kind,
        length,
        text: truncate_chars(text, max_chars),
    }
}

/// First `max_chars` characters of `text`, plus [`ELLIPSIS`] if anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], ELLIPSIS),
        None => text.to_string(),
    }
}

/// Decode bytes of unknown encoding. Undecodable sequences are dropped.
pub fn decode_text(bytes: &[u8]) -> String {
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);

    let (text, used, _) = encoding.decode(bytes);
    tracing::trace!(encoding = used.name(), "decoded text");
    text.chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect()
}

fn csv_to_text(decoded: &str) -> Result<String, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(decoded.as_bytes());

    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record?;
        lines.push(record.iter().collect::<Vec<_>>().join("\t"));
    }
    Ok(lines.join("\n"))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Decode any supported raster format (first frame only) and re-encode as PNG,
/// the one format every OCR build reads from stdin.
fn image_to_png(bytes: &[u8]) -> Result<Vec<u8>, ExtractError> {
    let decoded = image::load_from_memory(bytes)?;
    let rgba = image::DynamicImage::ImageRgba8(decoded.to_rgba8());

    let mut png = Vec::new();
    rgba.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)?;
    Ok(png)
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Docx(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Docx(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    docx_paragraphs(&xml)
}

/// Text of the top-level body paragraphs, one per line.
///
/// Paragraphs inside tables and text boxes are skipped. Within a paragraph,
/// run text is concatenated; `w:tab` becomes a tab and `w:br`/`w:cr` a newline.
fn docx_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Option<String> = None;
    // Depth inside w:tbl / w:txbxContent.
    let mut skip_depth = 0usize;
    let mut in_run = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"tbl" | b"txbxContent" => skip_depth += 1,
                b"p" if skip_depth == 0 => current = Some(String::new()),
                b"r" if skip_depth == 0 => in_run = true,
                b"t" if skip_depth == 0 && in_run => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if skip_depth == 0 => match e.local_name().as_ref() {
                b"p" => paragraphs.push(String::new()),
                b"tab" if in_run => {
                    if let Some(p) = current.as_mut() {
                        p.push('\t');
                    }
                }
                b"br" | b"cr" if in_run => {
                    if let Some(p) = current.as_mut() {
                        p.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                if let Some(p) = current.as_mut() {
                    let text = te.unescape().map_err(|e| ExtractError::Docx(e.to_string()))?;
                    p.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"tbl" | b"txbxContent" => skip_depth = skip_depth.saturating_sub(1),
                b"p" if skip_depth == 0 => {
                    if let Some(p) = current.take() {
                        paragraphs.push(p);
                    }
                }
                b"r" if skip_depth == 0 => in_run = false,
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ExtractConfig {
        ExtractConfig::default()
    }

    const DOC_NS: &str = "xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"";

    fn docx_with_body(body: &str) -> Vec<u8> {
        use std::io::Write;
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document {}><w:body>{}</w:body></w:document>",
                DOC_NS, body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate_chars("hello", 5), "hello");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn truncate_appends_ellipsis() {
        assert_eq!(truncate_chars("hello world", 5), "hello...");
    }

    #[test]
    fn truncate_counts_characters_not_bytes() {
        let text = "é".repeat(10);
        let out = truncate_chars(&text, 3);
        assert_eq!(out, "ééé...");
    }

    #[test]
    fn finish_reports_full_length() {
        let text = "x".repeat(2500);
        let out = finish("big.txt", FileKind::Txt, &text, 2000);
        assert_eq!(out.length, 2500);
        assert_eq!(out.text.chars().count(), 2003);
        assert!(out.text.ends_with("..."));
    }

    #[test]
    fn finish_substitutes_placeholder_for_blank_text() {
        let out = finish("blank.txt", FileKind::Txt, " \n\t ", 2000);
        assert_eq!(out.text, NO_TEXT);
        assert_eq!(out.length, NO_TEXT.chars().count());
    }

    #[test]
    fn decode_utf8() {
        assert_eq!(decode_text("naïve café".as_bytes()), "naïve café");
    }

    #[test]
    fn decode_latin1() {
        // "café" in ISO-8859-1 is not valid UTF-8.
        let bytes = b"caf\xe9 au lait, cr\xe8me br\xfbl\xe9e";
        let out = decode_text(bytes);
        assert!(out.starts_with("caf"));
        assert!(!out.contains(char::REPLACEMENT_CHARACTER));
        assert!(out.contains("lait"));
    }

    #[test]
    fn csv_rows_become_tab_separated_lines() {
        let out = csv_to_text("name,age\n\"Smith, J\",42\nshort\n").unwrap();
        assert_eq!(out, "name\tage\nSmith, J\t42\nshort");
    }

    #[test]
    fn docx_joins_paragraphs_and_runs() {
        let xml = format!(
            "<w:document {}><w:body>\
             <w:p><w:r><w:t>Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p>\
             <w:p><w:pPr><w:tabs><w:tab w:val=\"left\" w:pos=\"720\"/></w:tabs></w:pPr>\
             <w:r><w:t>a</w:t><w:tab/><w:t>b</w:t></w:r></w:p>\
             <w:p/>\
             <w:p><w:r><w:t>x &amp; y</w:t></w:r></w:p>\
             </w:body></w:document>",
            DOC_NS
        );
        let out = docx_paragraphs(xml.as_bytes()).unwrap();
        assert_eq!(out, "Hello world\na\tb\n\nx & y");
    }

    #[test]
    fn docx_skips_tables() {
        let xml = format!(
            "<w:document {}><w:body>\
             <w:p><w:r><w:t>before</w:t></w:r></w:p>\
             <w:tbl><w:tr><w:tc><w:p><w:r><w:t>cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl>\
             <w:p><w:r><w:t>after</w:t></w:r></w:p>\
             </w:body></w:document>",
            DOC_NS
        );
        let out = docx_paragraphs(xml.as_bytes()).unwrap();
        assert_eq!(out, "before\nafter");
    }

    #[test]
    fn docx_breaks_become_newlines() {
        let xml = format!(
            "<w:document {}><w:body>\
             <w:p><w:r><w:t>line one</w:t><w:br/><w:t>line two</w:t><w:cr/><w:t>line three</w:t></w:r></w:p>\
             <w:p><w:r><w:t>next</w:t></w:r></w:p>\
             </w:body></w:document>",
            DOC_NS
        );
        let out = docx_paragraphs(xml.as_bytes()).unwrap();
        assert_eq!(out, "line one\nline two\nline three\nnext");
    }

    #[test]
    fn docx_skips_text_boxes() {
        let xml = format!(
            "<w:document {} xmlns:wps=\"http://schemas.microsoft.com/office/word/2010/wordprocessingShape\"><w:body>\
             <w:p><w:r><w:t>body </w:t></w:r>\
             <w:r><w:drawing><wps:txbx><w:txbxContent>\
             <w:p><w:r><w:t>boxed</w:t></w:r></w:p>\
             </w:txbxContent></wps:txbx></w:drawing></w:r>\
             <w:r><w:t>text</w:t></w:r></w:p>\
             </w:body></w:document>",
            DOC_NS
        );
        let out = docx_paragraphs(xml.as_bytes()).unwrap();
        assert_eq!(out, "body text");
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let err = extract_file("a.txt", Vec::new(), &cfg()).await.unwrap_err();
        assert!(matches!(err, ExtractError::Empty));
        assert_eq!(err.to_string(), "Empty file upload");
    }

    #[tokio::test]
    async fn unsupported_kind_returns_placeholder() {
        let out = extract_file("data.bin", vec![1, 2, 3], &cfg()).await.unwrap();
        assert_eq!(out.kind, FileKind::Unsupported);
        assert_eq!(out.text, UNSUPPORTED_TEXT);
        assert_eq!(out.length, UNSUPPORTED_TEXT.len());
    }

    #[tokio::test]
    async fn txt_is_trimmed() {
        let out = extract_file("Notes.TXT", b"  hi there \n".to_vec(), &cfg())
            .await
            .unwrap();
        assert_eq!(out.kind, FileKind::Txt);
        assert_eq!(out.text, "hi there");
        assert_eq!(out.length, 8);
        assert_eq!(out.filename, "Notes.TXT");
    }

    #[tokio::test]
    async fn docx_end_to_end() {
        let bytes = docx_with_body("<w:p><w:r><w:t>office test phrase</w:t></w:r></w:p>");
        let out = extract_file("memo.docx", bytes, &cfg()).await.unwrap();
        assert_eq!(out.kind, FileKind::Docx);
        assert_eq!(out.text, "office test phrase");
    }

    #[tokio::test]
    async fn invalid_zip_returns_docx_error() {
        let err = extract_file("memo.docx", b"not a zip".to_vec(), &cfg())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[tokio::test]
    async fn docx_without_document_xml_is_an_error() {
        use std::io::Write;
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        let err = extract_file("memo.docx", buf, &cfg()).await.unwrap_err();
        assert!(err.to_string().contains("word/document.xml"));
    }

    #[tokio::test]
    async fn invalid_pdf_returns_error() {
        let err = extract_file("bad.pdf", b"not a pdf".to_vec(), &cfg()).await;
        // pdf-extract reports an error; a panic inside it surfaces as Task.
        assert!(matches!(
            err,
            Err(ExtractError::Pdf(_)) | Err(ExtractError::Task(_))
        ));
    }

    #[tokio::test]
    async fn invalid_image_returns_error() {
        let err = extract_file("scan.png", b"not a png".to_vec(), &cfg())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Image(_)));
    }

    #[test]
    fn image_is_reencoded_as_png() {
        let img = image::RgbImage::from_pixel(4, 3, image::Rgb([255, 255, 255]));
        let mut bmp = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bmp), image::ImageFormat::Bmp)
            .unwrap();

        let png = image_to_png(&bmp).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let back = image::load_from_memory(&png).unwrap();
        assert_eq!((back.width(), back.height()), (4, 3));
    }

    #[tokio::test]
    async fn extract_path_uses_file_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rows.csv");
        std::fs::write(&path, "a,b\nc,d\n").unwrap();
        let out = extract_path(&path, &cfg()).await.unwrap();
        assert_eq!(out.filename, "rows.csv");
        assert_eq!(out.kind, FileKind::Csv);
        assert_eq!(out.text, "a\tb\nc\td");
    }
}
