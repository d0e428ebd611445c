//! Multi-format text extraction.
//!
//! Turns a source file into normalized plain text. Dispatch is by extension
//! (see [`DocumentFormat::from_path`]):
//!
//! | Format | Strategy |
//! |--------|----------|
//! | text | read verbatim (lossy UTF-8) |
//! | Markdown | render to HTML, then the HTML path |
//! | HTML / XHTML | parse, drop `script`/`style`, collapse whitespace |
//! | EPUB | zip archive; concatenate content entries, skip nav/toc/manifest |
//! | PDF | `pdftotext` if available, else in-process `pdf-extract` |

use std::io::Read;
use std::path::Path;
use std::process::Command;

use scraper::node::Node;
use scraper::{ElementRef, Html};

use crate::error::ExtractError;
use crate::models::{Document, DocumentFormat};

/// Elements whose text is never visible.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template"];
/// Elements that end a run of text; adjacent inline text is not merged across them.
const BREAKING_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "td", "th",
    "blockquote", "pre", "section", "article", "header", "footer", "title", "hr",
];
/// Entry name tokens that mark navigation rather than content.
const EPUB_SKIP_MARKERS: &[&str] = &["toc", "nav", "manifest"];
/// Maximum decompressed bytes to read from a single zip entry (zip-bomb protection).
const MAX_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extract plain text from the file at `path`.
pub fn extract_text(path: &Path) -> Result<String, ExtractError> {
    let document = Document::from_path(path)?;
    let path = document.path.as_path();

    match document.format {
        DocumentFormat::Text => read_lossy(path),
        DocumentFormat::Markdown => read_lossy(path).map(|md| markdown_to_text(&md)),
        DocumentFormat::Html => read_lossy(path).map(|html| html_to_text(&html)),
        DocumentFormat::Epub => extract_epub(&read_bytes(path)?),
        DocumentFormat::Pdf => extract_pdf(path),
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, ExtractError> {
    std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_lossy(path: &Path) -> Result<String, ExtractError> {
    let bytes = read_bytes(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Render Markdown to HTML and strip it to visible text.
pub fn markdown_to_text(markdown: &str) -> String {
    let parser = pulldown_cmark::Parser::new(markdown);
    let mut html = String::with_capacity(markdown.len() * 3 / 2);
    pulldown_cmark::html::push_html(&mut html, parser);
    html_to_text(&html)
}

/// Visible text of an HTML document, whitespace runs collapsed to one space.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut buf = String::new();
    collect_visible_text(document.root_element(), &mut buf);
    collapse_whitespace(&buf)
}

fn collect_visible_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                if HIDDEN_TAGS.contains(&el.name()) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_visible_text(child_el, out);
                }
                if BREAKING_TAGS.contains(&el.name()) {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim_end().to_string()
}

// ============ EPUB ============

fn is_epub_content_entry(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    let file_name = lower.rsplit('/').next().unwrap_or(&lower);
    let Some((stem, ext)) = file_name.rsplit_once('.') else {
        return false;
    };
    if !matches!(ext, "html" | "htm" | "xhtml" | "xml") || file_name == "container.xml" {
        return false;
    }
    // `toc.xhtml`, `nav-doc.html`, `book_toc.xhtml`; not `naval_battles.xhtml`.
    !stem
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| EPUB_SKIP_MARKERS.contains(&token))
}

fn extract_epub(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Epub(e.to_string()))?;

    let mut parts = Vec::new();
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| ExtractError::Epub(e.to_string()))?;
        if entry.is_dir() || !is_epub_content_entry(entry.name()) {
            continue;
        }
        let name = entry.name().to_string();
        let mut raw = Vec::new();
        entry
            .take(MAX_ENTRY_BYTES)
            .read_to_end(&mut raw)
            .map_err(|e| ExtractError::Epub(e.to_string()))?;
        if raw.len() as u64 >= MAX_ENTRY_BYTES {
            return Err(ExtractError::Epub(format!(
                "entry {} exceeds size limit ({} bytes)",
                name, MAX_ENTRY_BYTES
            )));
        }

        let markup = String::from_utf8_lossy(&raw);
        let text = if name.to_ascii_lowercase().ends_with(".xml") {
            xml_to_text(markup.as_bytes())?
        } else {
            html_to_text(&markup)
        };
        if !text.is_empty() {
            parts.push(text);
        }
    }

    Ok(parts.join(" "))
}

/// Text nodes of a generic XML document, space separated.
fn xml_to_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut skip_depth = 0usize;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                let local = e.local_name();
                let name = String::from_utf8_lossy(local.as_ref()).to_ascii_lowercase();
                if skip_depth > 0 || HIDDEN_TAGS.contains(&name.as_str()) {
                    skip_depth += 1;
                }
            }
            Ok(quick_xml::events::Event::End(_)) => {
                skip_depth = skip_depth.saturating_sub(1);
            }
            Ok(quick_xml::events::Event::Text(te)) if skip_depth == 0 => {
                let text = te.unescape().unwrap_or_default();
                if !text.trim().is_empty() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(text.trim());
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(collapse_whitespace(&out))
}

// ============ PDF ============

fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    match extract_pdf_with_pdftotext(path) {
        Some(text) => Ok(text),
        None => {
            tracing::debug!(path = %path.display(), "falling back to in-process PDF extraction");
            let bytes = read_bytes(path)?;
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
        }
    }
}

/// Run the external `pdftotext` tool. `None` when it is missing, fails,
/// or produces only whitespace.
fn extract_pdf_with_pdftotext(path: &Path) -> Option<String> {
    let output = Command::new("pdftotext")
        .arg("-layout")
        .arg("-enc")
        .arg("UTF-8")
        .arg(path)
        .arg("-")
        .output();

    match output {
        Ok(output) if output.status.success() => {
            let text = String::from_utf8_lossy(&output.stdout).into_owned();
            if text.trim().is_empty() {
                tracing::warn!(path = %path.display(), "pdftotext extracted no text");
                None
            } else {
                Some(text)
            }
        }
        Ok(output) => {
            tracing::warn!(
                path = %path.display(),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "pdftotext failed"
            );
            None
        }
        Err(e) => {
            tracing::debug!(error = %e, "pdftotext unavailable");
            None
        }
    }
}
