//! Extraction of status, components and summary from the HTML fragment that
//! status-page feeds embed in each entry.
//!
//! Hosted status pages render every entry with the same narrow convention:
//!
//! ```text
//! <b>Status: Resolved</b><br/><br/>All impacted services have now fully recovered.
//! <br/><br/><b>Affected components</b><ul><li>Conversations (Operational)</li></ul>
//! ```
//!
//! These helpers scan for exactly those markers. Matching is ASCII
//! case-insensitive; everything else in the fragment is treated as opaque text.

use std::collections::HashSet;

use super::types::Component;

const STATUS_OPEN: &str = "<b>status:";
const BOLD_CLOSE: &str = "</b>";
const ITEM_OPEN: &str = "<li";
const ITEM_CLOSE: &str = "</li>";
const COMPONENTS_MARKER: &str = "<b>affected components</b>";

/// Status reported when an entry carries no `Status:` marker.
pub const UNKNOWN_STATUS: &str = "Unknown";

/// Replaces markup with spaces, then collapses whitespace and trims.
///
/// Every `<...>` span becomes a single space. A stray `>` is also replaced
/// and an unterminated `<` swallows the rest of the fragment, so the result
/// never contains angle brackets.
///
/// ```
/// use statuswatch::feed::strip_html;
///
/// assert_eq!(strip_html("<b>Hello</b> <i>World</i>"), "Hello World");
/// ```
pub fn strip_html(fragment: &str) -> String {
    let mut text = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for c in fragment.chars() {
        match c {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' => {
                if !in_tag {
                    text.push(' ');
                }
                in_tag = false;
            }
            _ if in_tag => {}
            _ => text.push(c),
        }
    }
    collapse_whitespace(&text)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Byte range of one `<b>Status: X</b>` marker and of the `X` inside it.
struct StatusMarker {
    start: usize,
    end: usize,
    value_start: usize,
    value_end: usize,
}

/// Finds every status marker in `html`, in document order.
///
/// The value must be non-empty and sit on one line; a marker whose value
/// runs across a newline does not count.
fn status_markers(html: &str) -> Vec<StatusMarker> {
    // ASCII lowercasing keeps byte offsets aligned with `html`.
    let lower = html.to_ascii_lowercase();
    let mut markers = Vec::new();
    let mut from = 0;

    while let Some(rel) = lower[from..].find(STATUS_OPEN) {
        let start = from + rel;
        let after_open = start + STATUS_OPEN.len();
        let value_start = after_open
            + html[after_open..]
                .find(|c: char| !c.is_whitespace())
                .unwrap_or(html.len() - after_open);

        // The value needs at least one character before the closing tag.
        let search_from = html[value_start..]
            .chars()
            .next()
            .map(|c| value_start + c.len_utf8());

        let found = search_from.and_then(|sf| {
            lower[sf..].find(BOLD_CLOSE).map(|rel_close| sf + rel_close)
        });

        match found {
            Some(value_end) if !html[value_start..value_end].contains('\n') => {
                let end = value_end + BOLD_CLOSE.len();
                markers.push(StatusMarker {
                    start,
                    end,
                    value_start,
                    value_end,
                });
                from = end;
            }
            _ => from = after_open,
        }
    }

    markers
}

/// Returns the text of the first `Status:` marker, or [`UNKNOWN_STATUS`].
pub fn parse_status(html: &str) -> String {
    status_markers(html)
        .first()
        .map(|m| strip_html(&html[m.value_start..m.value_end]))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN_STATUS.to_string())
}

/// Splits `"Name (Status)"` into its two halves.
///
/// Mirrors the shape `^(.+?)\s*\(([^)]+)\)\s*$` on already-trimmed text: the
/// earliest `(` that leaves a non-empty, `)`-free status before the final `)`
/// wins, and the name must be non-empty.
fn split_component(raw: &str) -> Option<(&str, &str)> {
    let inner_end = raw.strip_suffix(')')?.len();
    let floor = raw[..inner_end].rfind(')').map_or(0, |i| i + 1);

    let (open, _) = raw[..inner_end]
        .char_indices()
        .find(|&(i, c)| c == '(' && i >= floor && i > 0)?;

    let name = raw[..open].trim();
    let status = raw[open + 1..inner_end].trim();
    if name.is_empty() || open + 1 >= inner_end {
        return None;
    }
    Some((name, status))
}

/// Collects list items as components, deduplicated by their stripped text.
pub fn parse_components(html: &str) -> Vec<Component> {
    let lower = html.to_ascii_lowercase();
    let mut components = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut from = 0;

    while let Some(rel) = lower[from..].find(ITEM_OPEN) {
        let tag_start = from + rel;
        let after_name = tag_start + ITEM_OPEN.len();

        // `<li>` or `<li attr=...>`, but not `<link>` or `<listing>`.
        let is_item = matches!(
            lower.as_bytes().get(after_name),
            Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r')
        );
        let Some(gt) = lower[after_name..].find('>').map(|i| after_name + i) else {
            break;
        };
        if !is_item {
            from = after_name;
            continue;
        }

        let body_start = gt + 1;
        let Some(body_end) = lower[body_start..].find(ITEM_CLOSE).map(|i| body_start + i) else {
            break;
        };
        from = body_end + ITEM_CLOSE.len();

        let raw = strip_html(&html[body_start..body_end]);
        if raw.is_empty() || seen.contains(&raw) {
            continue;
        }

        let component = match split_component(&raw) {
            Some((name, status)) => Component {
                name: name.to_string(),
                status: status.to_string(),
            },
            None => Component {
                name: raw.clone(),
                status: String::new(),
            },
        };
        seen.insert(raw);
        components.push(component);
    }

    components
}

/// Human-readable body of the entry: status marker removed, component list
/// (and anything after it) dropped, markup stripped.
pub fn parse_summary(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut last = 0;
    for m in status_markers(html) {
        text.push_str(&html[last..m.start]);
        last = m.end;
    }
    text.push_str(&html[last..]);

    if let Some(idx) = text.to_ascii_lowercase().find(COMPONENTS_MARKER) {
        text.truncate(idx);
    }
    strip_html(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_strip_removes_tags() {
        assert_eq!(strip_html("<b>Hello</b> <i>World</i>"), "Hello World");
    }

    #[test]
    fn test_strip_collapses_whitespace() {
        assert_eq!(strip_html("  foo   bar  "), "foo bar");
        assert_eq!(strip_html("a<br/>b"), "a b");
    }

    #[test]
    fn test_strip_empty() {
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn test_strip_stray_brackets() {
        assert_eq!(strip_html("a > b"), "a b");
        assert_eq!(strip_html("kept <unterminated tag"), "kept");
    }

    #[test]
    fn test_status_resolved() {
        assert_eq!(
            parse_status("<b>Status: Resolved</b><br/>Details here"),
            "Resolved"
        );
    }

    #[test]
    fn test_status_case_insensitive_and_nested_markup() {
        assert_eq!(
            parse_status("<B>STATUS:   <i>Partial  outage</i></B>"),
            "Partial outage"
        );
    }

    #[test]
    fn test_status_first_marker_wins() {
        let html = "<b>Status: Monitoring</b> then <b>Status: Resolved</b>";
        assert_eq!(parse_status(html), "Monitoring");
    }

    #[test]
    fn test_status_unknown_when_missing() {
        assert_eq!(parse_status("No status here"), UNKNOWN_STATUS);
        assert_eq!(parse_status("<b>Status:</b>"), UNKNOWN_STATUS);
    }

    #[test]
    fn test_status_value_must_be_single_line() {
        let html = "<b>Status: Broken\nacross lines</b>";
        assert_eq!(parse_status(html), UNKNOWN_STATUS);
    }

    #[test]
    fn test_single_component() {
        let components = parse_components("<ul><li>Chat Completions (Operational)</li></ul>");
        assert_eq!(
            components,
            vec![Component {
                name: "Chat Completions".into(),
                status: "Operational".into(),
            }]
        );
    }

    #[test]
    fn test_multiple_components_keep_order() {
        let html = r#"<ul>
            <li>Conversations (Operational)</li>
            <li>Chat Completions (Degraded)</li>
            <li>Responses (Operational)</li>
        </ul>"#;
        let components = parse_components(html);
        assert_eq!(components.len(), 3);
        assert_eq!(components[0].name, "Conversations");
        assert_eq!(components[1].name, "Chat Completions");
        assert_eq!(components[1].status, "Degraded");
        assert_eq!(components[2].name, "Responses");
    }

    #[test]
    fn test_component_deduplication() {
        let html = "<ul><li>Images (Operational)</li><li>Images (Operational)</li>\
                    <li>Images (Degraded)</li></ul>";
        let components = parse_components(html);
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].status, "Operational");
        assert_eq!(components[1].status, "Degraded");
    }

    #[test]
    fn test_component_without_status() {
        let components = parse_components("<ul><li>Some Service</li></ul>");
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].name, "Some Service");
        assert_eq!(components[0].status, "");
    }

    #[test]
    fn test_component_empty_items_discarded() {
        let components = parse_components("<li> </li><li><i></i></li><li>API</li>");
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].name, "API");
    }

    #[test]
    fn test_component_item_with_attributes_and_markup() {
        let html = r#"<li class="c"><span>Files</span> (<em>Full outage</em>)</li>"#;
        let components = parse_components(html);
        assert_eq!(components[0].name, "Files");
        assert_eq!(components[0].status, "Full outage");
    }

    #[test]
    fn test_component_ignores_link_tags() {
        let html = r#"<link href="x"/><li>Batch (Operational)</li>"#;
        let components = parse_components(html);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].name, "Batch");
    }

    #[test]
    fn test_split_component_shapes() {
        assert_eq!(split_component("API (OK)"), Some(("API", "OK")));
        assert_eq!(split_component("API(OK)"), Some(("API", "OK")));
        assert_eq!(split_component("A (b (c)"), Some(("A", "b (c")));
        assert_eq!(split_component("Fine-tuning (v2) (Degraded)"), Some(("Fine-tuning (v2)", "Degraded")));
        assert_eq!(split_component("X ()"), None);
        assert_eq!(split_component("(OK)"), None);
        assert_eq!(split_component("No parens"), None);
    }

    #[test]
    fn test_summary_strips_status_and_components() {
        let html = "<b>Status: Resolved</b><br/><br/>All impacted services recovered.\
                    <br/><br/><b>Affected components</b><ul><li>API (OK)</li></ul>";
        assert_eq!(parse_summary(html), "All impacted services recovered.");
    }

    #[test]
    fn test_summary_without_markers() {
        assert_eq!(
            parse_summary("<p>We are  investigating.</p>"),
            "We are investigating."
        );
    }

    #[test]
    fn test_summary_marker_case_insensitive() {
        let html = "Degraded.<B>AFFECTED COMPONENTS</B><li>API</li>";
        assert_eq!(parse_summary(html), "Degraded.");
    }

    proptest! {
        #[test]
        fn prop_strip_html_output_is_clean(input in ".*") {
            let out = strip_html(&input);
            prop_assert!(!out.contains('<'));
            prop_assert!(!out.contains('>'));
            prop_assert!(!out.contains("  "));
            prop_assert_eq!(out.trim(), out.as_str());
            prop_assert!(!out.chars().zip(out.chars().skip(1)).any(|(a, b)| a.is_whitespace() && b.is_whitespace()));
        }

        #[test]
        fn prop_status_never_empty(input in ".*") {
            prop_assert!(!parse_status(&input).is_empty());
        }
    }
}
