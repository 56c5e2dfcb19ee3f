//! Text extraction for uploaded files: PDF, HTML, and plain text formats

use scraper::{Html, Node, Selector};

use crate::error::{Error, Result};

/// Text pulled out of an uploaded file
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub content: String,
    /// Normalized MIME type (no parameters)
    pub content_type: String,
    /// Title found in the file itself, e.g. an HTML `<title>`
    pub title: Option<String>,
    pub pages: Option<u32>,
}

/// Declared MIME type without parameters, or one guessed from the filename
pub fn resolve_content_type(filename: &str, declared: Option<&str>) -> String {
    let declared = declared
        .and_then(|d| d.split(';').next())
        .map(|d| d.trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty() && d != "application/octet-stream");

    declared.unwrap_or_else(|| {
        mime_guess::from_path(filename)
            .first_or_text_plain()
            .essence_str()
            .to_string()
    })
}

/// Extract text from `bytes` according to its content type
///
/// PDF parsing is CPU-bound; call this from a blocking task.
pub fn extract(filename: &str, declared: Option<&str>, bytes: &[u8]) -> Result<ExtractedText> {
    let content_type = resolve_content_type(filename, declared);

    let (content, title, pages) = match content_type.as_str() {
        "application/pdf" => {
            let (content, pages) = extract_pdf(filename, bytes)?;
            (content, None, pages)
        }
        "text/html" | "application/xhtml+xml" => {
            let html = decode_utf8(filename, bytes)?;
            let (content, title) = extract_html(&html)?;
            (content, title, None)
        }
        t if t.starts_with("text/") => (decode_utf8(filename, bytes)?, None, None),
        _ => return Err(Error::UnsupportedContentType(content_type)),
    };

    Ok(ExtractedText {
        content,
        content_type,
        title,
        pages,
    })
}

fn decode_utf8(filename: &str, bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::InvalidRequest(format!("{} is not valid UTF-8: {}", filename, e)))
}

fn extract_pdf(filename: &str, bytes: &[u8]) -> Result<(String, Option<u32>)> {
    let raw = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| Error::file_parse(filename, format!("PDF extraction failed: {}", e)))?;

    let content = raw
        .replace('\0', "")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let pages = match lopdf::Document::load_mem(bytes) {
        Ok(doc) => Some(doc.get_pages().len() as u32),
        Err(e) => {
            tracing::debug!("Could not count pages in {}: {}", filename, e);
            None
        }
    };

    Ok((content, pages))
}

/// Visible body text and the `<title>`, if any
fn extract_html(html: &str) -> Result<(String, Option<String>)> {
    let document = Html::parse_document(html);
    let title_selector = selector("title")?;
    let body_selector = selector("body")?;

    let title = document
        .select(&title_selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let mut content = String::new();
    if let Some(body) = document.select(&body_selector).next() {
        for node in body.descendants() {
            let Node::Text(text) = node.value() else {
                continue;
            };
            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript"))
            });
            let trimmed = text.trim();
            if hidden || trimmed.is_empty() {
                continue;
            }
            if !content.is_empty() {
                content.push(' ');
            }
            content.push_str(trimmed);
        }
    }

    Ok((content, title))
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::internal(format!("Invalid selector {}: {}", css, e)))
}

/// One-page PDF with a line of Courier text
#[cfg(test)]
pub(crate) fn sample_pdf(text: &str) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
