//! Text extraction from uploaded files
//!
//! Best effort: any parse failure yields an empty string, which callers
//! treat as "could not extract text".

use crate::db::models::FileType;
use tracing::{debug, warn};

/// Extract plain text from an uploaded file's bytes
pub fn extract_text(file_type: FileType, bytes: &[u8]) -> String {
    let text = match file_type {
        FileType::Pdf => extract_pdf(bytes),
        FileType::Docx => extract_docx(bytes),
    };

    let cleaned = clean_text(&text);
    debug!(
        file_type = file_type.as_str(),
        raw_len = text.len(),
        cleaned_len = cleaned.len(),
        "Text extraction complete"
    );
    cleaned
}

fn extract_pdf(bytes: &[u8]) -> String {
    // lopdf can panic on malformed fonts and content streams
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let doc = match lopdf::Document::load_mem(bytes) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "Failed to load PDF");
                return String::new();
            }
        };

        let mut text = String::new();
        for page_num in doc.get_pages().keys() {
            match doc.extract_text(&[*page_num]) {
                Ok(page_text) => {
                    text.push_str(&page_text);
                    text.push('\n');
                }
                Err(e) => {
                    warn!(page = page_num, error = %e, "Failed to extract text from page, skipping");
                }
            }
        }
        text
    }));

    result.unwrap_or_else(|_| {
        warn!("PDF extraction panicked, treating as empty");
        String::new()
    })
}

fn extract_docx(bytes: &[u8]) -> String {
    let doc = match docx_rs::read_docx(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, "Failed to parse DOCX");
            return String::new();
        }
    };

    let mut text = String::new();
    for child in &doc.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(para) => {
                push_paragraph(para, &mut text);
                text.push('\n');
            }
            docx_rs::DocumentChild::Table(table) => {
                for row in &table.rows {
                    let docx_rs::TableChild::TableRow(tr) = row;
                    for cell in &tr.cells {
                        let docx_rs::TableRowChild::TableCell(tc) = cell;
                        for content in &tc.children {
                            if let docx_rs::TableCellContent::Paragraph(para) = content {
                                push_paragraph(para, &mut text);
                                text.push(' ');
                            }
                        }
                    }
                    text.push('\n');
                }
            }
            _ => {}
        }
    }
    text
}

fn push_paragraph(para: &docx_rs::Paragraph, out: &mut String) {
    for child in &para.children {
        match child {
            docx_rs::ParagraphChild::Run(run) => push_run(run, out),
            docx_rs::ParagraphChild::Hyperlink(link) => {
                for inner in &link.children {
                    if let docx_rs::ParagraphChild::Run(run) = inner {
                        push_run(run, out);
                    }
                }
            }
            _ => {}
        }
    }
}

fn push_run(run: &docx_rs::Run, out: &mut String) {
    for child in &run.children {
        if let docx_rs::RunChild::Text(t) = child {
            out.push_str(&t.text);
        }
    }
}

/// Trim lines and drop blank ones
fn clean_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_yields_empty() {
        assert_eq!(extract_text(FileType::Pdf, b"not a pdf"), "");
        assert_eq!(extract_text(FileType::Docx, b"not a zip"), "");
        assert_eq!(extract_text(FileType::Pdf, &[]), "");
    }

    #[test]
    fn test_docx_paragraphs() {
        let mut buf = std::io::Cursor::new(Vec::new());
        docx_rs::Docx::new()
            .add_paragraph(
                docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text("First paragraph.")),
            )
            .add_paragraph(
                docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text("Second one.")),
            )
            .build()
            .pack(&mut buf)
            .unwrap();

        let text = extract_text(FileType::Docx, buf.get_ref());
        assert_eq!(text, "First paragraph.\nSecond one.");
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  a  \n\n\n b\n   \n"), "a\nb");
    }
}
