use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use thiserror::Error;

use super::html::{parse_components, parse_status, parse_summary, strip_html};
use super::types::{FeedType, Incident};

const ATOM_NS: &[u8] = b"http://www.w3.org/2005/Atom";
const CONTENT_NS: &[u8] = b"http://purl.org/rss/1.0/modules/content/";

/// Errors raised when a feed document cannot be read as XML.
///
/// A feed that fails here yields no incidents at all; callers never see a
/// partially parsed list.
#[derive(Debug, Error)]
pub enum ParseError {
    /// quick-xml rejected the document (bad syntax, mismatched end tag, ...).
    #[error("XML parse error at byte {position}: {message}")]
    Xml { position: u64, message: String },
    /// The document contained no element at all.
    #[error("Document has no root element")]
    NoRoot,
    /// A second top-level element or stray text followed the root.
    #[error("Unexpected content outside the root element")]
    TrailingContent,
    /// The input ended before every element was closed.
    #[error("Document ended inside <{0}>")]
    UnexpectedEof(String),
}

// ============================================================================
// Element tree
// ============================================================================

/// Minimal owned element tree; feeds are small enough to hold in memory and
/// the entry fallbacks (`summary` then `content`, `guid` then `link`) are far
/// simpler to express against a tree than against the event stream.
#[derive(Debug, Default)]
struct Element {
    ns: Option<Vec<u8>>,
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn is(&self, ns: Option<&[u8]>, name: &str) -> bool {
        self.ns.as_deref() == ns && self.name == name
    }

    fn child(&self, ns: Option<&[u8]>, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(ns, name))
    }

    /// Text of the first matching child, `None` when missing or blank.
    fn child_text(&self, ns: Option<&[u8]>, name: &str) -> Option<&str> {
        self.child(ns, name)
            .map(|c| c.text.as_str())
            .filter(|t| !t.trim().is_empty())
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Collects `self` and every descendant matching `ns`/`name`, in document order.
    fn collect<'a>(&'a self, ns: Option<&[u8]>, name: &str, out: &mut Vec<&'a Element>) {
        if self.is(ns, name) {
            out.push(self);
        }
        for child in &self.children {
            child.collect(ns, name, out);
        }
    }
}

fn xml_error(reader: &NsReader<&[u8]>, err: impl std::fmt::Display) -> ParseError {
    ParseError::Xml {
        position: reader.error_position(),
        message: err.to_string(),
    }
}

fn owned_namespace(resolved: ResolveResult<'_>) -> Option<Vec<u8>> {
    match resolved {
        ResolveResult::Bound(Namespace(ns)) => Some(ns.to_vec()),
        _ => None,
    }
}

fn element_from_start(
    reader: &NsReader<&[u8]>,
    ns: Option<Vec<u8>>,
    start: &quick_xml::events::BytesStart<'_>,
) -> Result<Element, ParseError> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| xml_error(reader, e))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|e| xml_error(reader, e))?
            .into_owned();
        attributes.push((key, value));
    }

    Ok(Element {
        ns,
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        attributes,
        ..Element::default()
    })
}

/// Reads the whole document into an element tree.
///
/// SEC-002: quick-xml 0.37 never expands `<!ENTITY>` declarations; only the
/// five predefined entities and character references are resolved, so a
/// hostile feed cannot trigger external entity loading or entity bombs.
fn read_tree(xml: &str) -> Result<Element, ParseError> {
    let mut reader = NsReader::from_str(xml);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let next = reader
            .read_resolved_event_into(&mut buf)
            .map(|(resolved, event)| (owned_namespace(resolved), event));
        let (resolved, event) = match next {
            Ok(next) => next,
            Err(e) => return Err(xml_error(&reader, e)),
        };

        match event {
            Event::Start(e) => {
                if root.is_some() {
                    return Err(ParseError::TrailingContent);
                }
                let element = element_from_start(&reader, resolved, &e)?;
                stack.push(element);
            }
            Event::Empty(e) => {
                let element = element_from_start(&reader, resolved, &e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None if root.is_none() => root = Some(element),
                    None => return Err(ParseError::TrailingContent),
                }
            }
            Event::End(_) => {
                // quick-xml has already verified the end name matches.
                let Some(element) = stack.pop() else {
                    return Err(ParseError::TrailingContent);
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| xml_error(&reader, e))?;
                match stack.last_mut() {
                    Some(current) => current.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err(ParseError::TrailingContent),
                }
            }
            Event::CData(c) => {
                let raw = c.into_inner();
                let text = String::from_utf8_lossy(&raw);
                match stack.last_mut() {
                    Some(current) => current.text.push_str(&text),
                    None => return Err(ParseError::TrailingContent),
                }
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions, doctype
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.pop() {
        return Err(ParseError::UnexpectedEof(open.name));
    }
    root.ok_or(ParseError::NoRoot)
}

// ============================================================================
// Timestamps
// ============================================================================

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%a, %d %b %Y %H:%M %z",
    "%d %b %Y %H:%M:%S %z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%a, %d %b %Y %H:%M:%S",
];

/// Parses the timestamp formats seen in Atom and RSS feeds.
///
/// Accepts RFC 3339, RFC 2822 (including `GMT`/`UT`), a `UTC` suffix,
/// offsets with or without a colon, naive timestamps (read as UTC) and bare
/// dates. Returns `None` for anything else.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(head) = s.strip_suffix("UTC").or_else(|| s.strip_suffix("utc")) {
        let head = head.trim_end();
        if let Ok(dt) = DateTime::parse_from_rfc2822(&format!("{head} +0000")) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Some(dt) = parse_naive(head) {
            return Some(dt);
        }
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    parse_naive(s)
}

fn parse_naive(s: &str) -> Option<DateTime<Utc>> {
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Unparsable timestamps fall back to "now" rather than failing the feed.
fn timestamp_or_now(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(parse_timestamp).unwrap_or_else(Utc::now)
}

// ============================================================================
// Feed parsing
// ============================================================================

fn build_incident(
    id: &str,
    title: &str,
    updated: DateTime<Utc>,
    link: &str,
    content_html: &str,
    provider: &str,
) -> Incident {
    Incident {
        id: id.trim().to_string(),
        title: strip_html(title),
        status: parse_status(content_html),
        updated,
        link: link.trim().to_string(),
        summary: parse_summary(content_html),
        components: parse_components(content_html),
        provider: provider.to_string(),
    }
}

/// Parses an Atom 1.0 document into incidents, in document order.
///
/// Only `entry` children of the root that live in the Atom namespace are read.
pub fn parse_atom(xml: &str, provider: &str) -> Result<Vec<Incident>, ParseError> {
    let root = read_tree(xml)?;
    let atom = Some(ATOM_NS);

    let incidents = root
        .children
        .iter()
        .filter(|e| e.is(atom, "entry"))
        .map(|entry| {
            let content_html = entry
                .child_text(atom, "summary")
                .or_else(|| entry.child_text(atom, "content"))
                .unwrap_or_default();
            let link = entry
                .child(atom, "link")
                .and_then(|l| l.attribute("href"))
                .unwrap_or_default();

            build_incident(
                entry.child_text(atom, "id").unwrap_or_default(),
                entry.child_text(atom, "title").unwrap_or_default(),
                timestamp_or_now(entry.child_text(atom, "updated")),
                link,
                content_html,
                provider,
            )
        })
        .collect();

    Ok(incidents)
}

/// Parses an RSS 2.0 document into incidents, in document order.
///
/// Every `item` element is read regardless of depth. `content:encoded` is
/// preferred over `description` as the richer content source.
pub fn parse_rss(xml: &str, provider: &str) -> Result<Vec<Incident>, ParseError> {
    let root = read_tree(xml)?;

    let mut items = Vec::new();
    root.collect(None, "item", &mut items);

    let incidents = items
        .into_iter()
        .map(|item| {
            let link = item.child_text(None, "link").unwrap_or_default();
            let id = item.child_text(None, "guid").unwrap_or(link);
            let content_html = item
                .child_text(Some(CONTENT_NS), "encoded")
                .or_else(|| item.child_text(None, "description"))
                .unwrap_or_default();

            build_incident(
                id,
                item.child_text(None, "title").unwrap_or_default(),
                timestamp_or_now(item.child_text(None, "pubDate")),
                link,
                content_html,
                provider,
            )
        })
        .collect();

    Ok(incidents)
}

/// Dispatches to the Atom or RSS parser.
pub fn parse_feed(
    xml: &str,
    feed_type: FeedType,
    provider: &str,
) -> Result<Vec<Incident>, ParseError> {
    match feed_type {
        FeedType::Atom => parse_atom(xml, provider),
        FeedType::Rss => parse_rss(xml, provider),
    }
}
