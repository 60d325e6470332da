// src/ingest/rss.rs
//! RSS 2.0 / Atom entry extraction on top of the quick-xml event reader.
//!
//! Entries are collected into `RawEntry` first (strings exactly as the feed had them),
//! then `normalize_entry` applies link/title validation, date fallback, summary/content
//! selection and image precedence.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::types::{ItemType, NormalizedItem};
use crate::ingest::{clean_text, first_img_src};
use crate::sources::Source;

/// One `<item>` or `<entry>` as found in the document.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub guid: Option<String>,
    pub published: Option<String>,
    pub updated: Option<String>,
    pub description: Option<String>,
    pub content_encoded: Option<String>,
    pub media_description: Option<String>,
    pub enclosure_url: Option<String>,
    pub media_thumbnail_url: Option<String>,
    pub media_content_url: Option<String>,
    /// Atom `<link rel href>` pairs, in document order.
    pub links: Vec<(Option<String>, String)>,
}

impl RawEntry {
    /// RSS `<link>` text, then Atom alternate/first link, then an http-ish guid/id.
    fn resolved_link(&self) -> Option<String> {
        if let Some(l) = non_blank(self.link.as_deref()) {
            return Some(l);
        }
        let alternate = self
            .links
            .iter()
            .find(|(rel, _)| rel.as_deref().map_or(true, |r| r == "alternate"))
            .or_else(|| self.links.first())
            .map(|(_, href)| href.clone());
        if let Some(l) = non_blank(alternate.as_deref()) {
            return Some(l);
        }
        non_blank(self.guid.as_deref()).filter(|g| g.starts_with("http"))
    }
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Which text-bearing child of an entry is being captured.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Title,
    Link,
    Guid,
    Published,
    Updated,
    Description,
    ContentEncoded,
    MediaDescription,
}

fn field_for(name: &[u8]) -> Option<Field> {
    Some(match name {
        b"title" => Field::Title,
        b"link" => Field::Link,
        b"guid" | b"id" => Field::Guid,
        b"pubDate" | b"published" | b"dc:date" => Field::Published,
        b"updated" => Field::Updated,
        b"description" | b"summary" => Field::Description,
        b"content:encoded" | b"content" => Field::ContentEncoded,
        b"media:description" => Field::MediaDescription,
        _ => return None,
    })
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn text_of(t: &BytesText<'_>) -> String {
    match t.unescape() {
        Ok(s) => s.into_owned(),
        // feeds routinely carry HTML entities XML doesn't know (&nbsp; &mdash; ...)
        Err(_) => html_escape::decode_html_entities(&String::from_utf8_lossy(t)).into_owned(),
    }
}

/// Walk the document and collect every `<item>` / `<entry>`.
pub fn parse_entries(xml: &str) -> Result<Vec<RawEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut out = Vec::new();
    let mut depth: usize = 0;
    let mut entry: Option<(RawEntry, usize)> = None;
    // (field, depth it opened at, buffer)
    let mut capture: Option<(Field, usize, String)> = None;

    loop {
        let ev = reader
            .read_event()
            .with_context(|| format!("xml error at byte {}", reader.buffer_position()))?;
        match ev {
            Event::Start(e) => {
                depth += 1;
                let name = e.name();
                let name = name.as_ref();
                if capture.is_some() {
                    continue;
                }
                if entry.is_none() {
                    if name == b"item" || name == b"entry" {
                        entry = Some((RawEntry::default(), depth));
                    }
                    continue;
                }
                if let Some((raw, _)) = entry.as_mut() {
                    on_entry_element(raw, &e, name);
                    if let Some(f) = field_for(name) {
                        capture = Some((f, depth, String::new()));
                    }
                }
            }
            Event::Empty(e) => {
                if capture.is_some() {
                    continue;
                }
                if let Some((raw, _)) = entry.as_mut() {
                    let name = e.name();
                    on_entry_element(raw, &e, name.as_ref());
                }
            }
            Event::Text(t) => {
                if let Some((_, _, buf)) = capture.as_mut() {
                    if !buf.is_empty() {
                        buf.push(' ');
                    }
                    buf.push_str(&text_of(&t));
                }
            }
            Event::CData(c) => {
                if let Some((_, _, buf)) = capture.as_mut() {
                    buf.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                if let Some((field, at, _)) = capture.as_ref() {
                    if *at == depth {
                        let field = *field;
                        let buf = capture.take().map(|(_, _, b)| b).unwrap_or_default();
                        if let Some((raw, _)) = entry.as_mut() {
                            store_field(raw, field, buf);
                        }
                    }
                }
                if let Some((_, at)) = entry.as_ref() {
                    if *at == depth {
                        if let Some((raw, _)) = entry.take() {
                            out.push(raw);
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// Attribute-bearing elements: enclosure, media thumbnails, Atom links.
fn on_entry_element(raw: &mut RawEntry, e: &BytesStart<'_>, name: &[u8]) {
    match name {
        b"enclosure" => {
            if raw.enclosure_url.is_none() {
                raw.enclosure_url = attr(e, b"url");
            }
        }
        b"media:thumbnail" => {
            if raw.media_thumbnail_url.is_none() {
                raw.media_thumbnail_url = attr(e, b"url");
            }
        }
        b"media:content" => {
            if raw.media_content_url.is_none() {
                raw.media_content_url = attr(e, b"url");
            }
        }
        b"link" => {
            if let Some(href) = attr(e, b"href") {
                raw.links.push((attr(e, b"rel"), href));
            }
        }
        _ => {}
    }
}

fn store_field(raw: &mut RawEntry, field: Field, value: String) {
    let slot = match field {
        Field::Title => &mut raw.title,
        Field::Link => &mut raw.link,
        Field::Guid => &mut raw.guid,
        Field::Published => &mut raw.published,
        Field::Updated => &mut raw.updated,
        Field::Description => &mut raw.description,
        Field::ContentEncoded => &mut raw.content_encoded,
        Field::MediaDescription => &mut raw.media_description,
    };
    if slot.is_none() && !value.trim().is_empty() {
        *slot = Some(value);
    }
}

/// RFC 2822 (RSS) or RFC 3339 (Atom, dc:date) → UTC.
pub fn parse_feed_date(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    match OffsetDateTime::parse(ts, &Rfc2822).or_else(|_| OffsetDateTime::parse(ts, &Rfc3339)) {
        Ok(odt) => DateTime::<Utc>::from_timestamp(odt.unix_timestamp(), odt.nanosecond()),
        // obsolete zone names ("GMT", "EST") that the strict grammar rejects
        Err(_) => DateTime::parse_from_rfc2822(ts)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

/// Apply the entry rules for one source. `None` when link or title is missing.
pub fn normalize_entry(raw: &RawEntry, source: &Source, now: DateTime<Utc>) -> Option<NormalizedItem> {
    let url = raw.resolved_link()?;
    let title = clean_text(raw.title.as_deref().unwrap_or_default());
    if title.is_empty() {
        return None;
    }

    let published_at = [raw.published.as_deref(), raw.updated.as_deref()]
        .into_iter()
        .flatten()
        .find_map(parse_feed_date)
        .unwrap_or(now);

    let content = non_blank(raw.content_encoded.as_deref())
        .or_else(|| non_blank(raw.description.as_deref()));
    let summary = raw
        .description
        .as_deref()
        .or(raw.media_description.as_deref())
        .or(raw.content_encoded.as_deref())
        .map(clean_text)
        .filter(|s| !s.is_empty());

    let image_url = non_blank(raw.enclosure_url.as_deref())
        .or_else(|| non_blank(raw.media_thumbnail_url.as_deref()))
        .or_else(|| non_blank(raw.media_content_url.as_deref()))
        .or_else(|| content.as_deref().and_then(first_img_src));

    Some(NormalizedItem {
        url,
        title,
        summary,
        content,
        image_url,
        published_at,
        item_type: ItemType::infer_from_domain(&source.domain),
        source_name: source.name.clone(),
        source_domain: source.domain.clone(),
        source_credibility: source.credibility,
        tags: Vec::new(),
    })
}

/// Parse a whole feed body for `source`.
pub fn parse_feed(xml: &str, source: &Source, now: DateTime<Utc>) -> Result<Vec<NormalizedItem>> {
    let t0 = std::time::Instant::now();
    let entries = parse_entries(xml).with_context(|| format!("parsing feed for {}", source.domain))?;
    let total = entries.len();
    let out: Vec<NormalizedItem> = entries
        .iter()
        .filter_map(|e| normalize_entry(e, source, now))
        .collect();

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("crawl_parse_ms").record(ms);
    counter!("crawl_entries_dropped_total").increment((total - out.len()) as u64);
    tracing::debug!(source = %source.name, entries = total, kept = out.len(), "parsed feed");
    Ok(out)
}
