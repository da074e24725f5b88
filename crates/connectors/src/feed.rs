//! RSS/Atom feed walking shared by the feed-shaped connectors.
//!
//! Entries are collected in document order; each keeps its `link` children
//! (text and attributes) and its `id` text so connector-specific selection
//! policies can pick the right URL.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::{is_http_url, ConnectorError, Result};

#[derive(Debug, Default)]
pub struct FeedLink {
    pub text: String,
    pub href: Option<String>,
    pub rel: Option<String>,
    pub title: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Default)]
pub struct FeedEntry {
    pub links: Vec<FeedLink>,
    pub id: Option<String>,
}

enum Capture {
    Link(FeedLink),
    Id(String),
}

/// Parse every RSS `item` / Atom `entry` element in document order.
pub fn parse_entries(xml: &str) -> Result<Vec<FeedEntry>> {
    let mut reader = Reader::from_str(xml);
    let mut entries: Vec<FeedEntry> = Vec::new();
    let mut entry: Option<FeedEntry> = None;
    let mut entry_depth = 0usize;
    let mut depth = 0usize;
    let mut capture: Option<Capture> = None;

    loop {
        match reader.read_event() {
            Err(err) => return Err(ConnectorError::FeedXml(err.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(start)) => {
                depth += 1;
                let name = local_name(start.name().as_ref());
                if entry.is_none() && (name == "item" || name == "entry") {
                    entry = Some(FeedEntry::default());
                    entry_depth = depth;
                } else if entry.is_some() && depth == entry_depth + 1 {
                    if name == "link" {
                        capture = Some(Capture::Link(link_from_attrs(&start)));
                    } else if name == "id" {
                        capture = Some(Capture::Id(String::new()));
                    }
                }
            }
            Ok(Event::Empty(start)) => {
                let name = local_name(start.name().as_ref());
                if let Some(open_entry) = &mut entry {
                    if depth == entry_depth && name == "link" {
                        open_entry.links.push(link_from_attrs(&start));
                    }
                }
            }
            Ok(Event::End(_)) => {
                if let Some(open_entry) = &mut entry {
                    if depth == entry_depth + 1 {
                        match capture.take() {
                            Some(Capture::Link(link)) => open_entry.links.push(link),
                            Some(Capture::Id(text)) => {
                                let text = text.trim();
                                if !text.is_empty() {
                                    open_entry.id = Some(text.to_string());
                                }
                            }
                            None => {}
                        }
                    } else if depth == entry_depth {
                        if let Some(done) = entry.take() {
                            entries.push(done);
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Text(text)) => {
                if let Some(open_capture) = &mut capture {
                    let chunk = text
                        .unescape()
                        .map_err(|err| ConnectorError::FeedXml(err.to_string()))?;
                    match open_capture {
                        Capture::Link(link) => link.text.push_str(&chunk),
                        Capture::Id(buffer) => buffer.push_str(&chunk),
                    }
                }
            }
            Ok(Event::CData(cdata)) => {
                if let Some(open_capture) = &mut capture {
                    let chunk = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                    match open_capture {
                        Capture::Link(link) => link.text.push_str(&chunk),
                        Capture::Id(buffer) => buffer.push_str(&chunk),
                    }
                }
            }
            Ok(_) => {}
        }
    }

    Ok(entries)
}

fn local_name(qualified: &[u8]) -> String {
    let local = match qualified.iter().rposition(|byte| *byte == b':') {
        Some(position) => &qualified[position + 1..],
        None => qualified,
    };
    String::from_utf8_lossy(local).to_ascii_lowercase()
}

fn link_from_attrs(start: &BytesStart<'_>) -> FeedLink {
    let mut link = FeedLink::default();
    for attr in start.attributes().flatten() {
        let name = local_name(attr.key.as_ref());
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => continue,
        };
        match name.as_str() {
            "href" => link.href = Some(value),
            "rel" => link.rel = Some(value),
            "title" => link.title = Some(value),
            "type" => link.content_type = Some(value),
            _ => {}
        }
    }
    link
}

/// RSS/Atom selection: the first link whose text is an HTTP(S) URL, or whose
/// `href` is HTTP(S) with `rel` in {alternate, ""}.
pub fn rss_entry_link(entry: &FeedEntry) -> Option<String> {
    for link in &entry.links {
        let text = link.text.trim();
        if !text.is_empty() && is_http_url(text) {
            return Some(text.to_string());
        }

        let href = link.href.as_deref().unwrap_or_default().trim();
        let rel = link
            .rel
            .as_deref()
            .unwrap_or("alternate")
            .trim()
            .to_ascii_lowercase();
        if !href.is_empty() && (rel == "alternate" || rel.is_empty()) && is_http_url(href) {
            return Some(href.to_string());
        }
    }
    None
}

fn is_pdf_link(url: &str) -> bool {
    let lowered = url.to_ascii_lowercase();
    lowered.ends_with(".pdf") || lowered.contains("/pdf/")
}

/// arXiv selection: first non-PDF alternate link, falling back to the entry
/// `id` when no acceptable link exists.
pub fn arxiv_entry_link(entry: &FeedEntry) -> Option<String> {
    for link in &entry.links {
        let href = link.href.as_deref().unwrap_or_default().trim();
        if href.is_empty() || !is_http_url(href) {
            continue;
        }
        let title = link
            .title
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let content_type = link
            .content_type
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if is_pdf_link(href) || title == "pdf" || content_type == "application/pdf" {
            continue;
        }
        let rel = link
            .rel
            .as_deref()
            .unwrap_or("alternate")
            .trim()
            .to_ascii_lowercase();
        if rel == "alternate" || rel.is_empty() {
            return Some(href.to_string());
        }
    }

    entry
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty() && is_http_url(id) && !is_pdf_link(id))
        .map(str::to_string)
}
