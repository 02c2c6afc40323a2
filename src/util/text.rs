use std::borrow::Cow;

use unicode_width::UnicodeWidthChar;

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Shortens `s` so it occupies at most `max_width` terminal columns.
///
/// When the text is cut, `"..."` is appended and counted against the width.
/// Widths of three columns or fewer get the leading characters without an
/// ellipsis. Text that already fits is returned borrowed.
///
/// ```
/// use statuswatch::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("All systems operational", 10), "All sys...");
/// assert_eq!(truncate_to_width("Resolved", 20), "Resolved");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if max_width == 0 {
        return Cow::Borrowed("");
    }

    let budget = if max_width <= ELLIPSIS_WIDTH {
        max_width
    } else {
        max_width - ELLIPSIS_WIDTH
    };

    let mut used = 0;
    let mut cut = None;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if cut.is_none() && used + w > budget {
            cut = Some(idx);
        }
        used += w;
        if used > max_width {
            let end = cut.unwrap_or(idx);
            if max_width <= ELLIPSIS_WIDTH {
                return Cow::Owned(s[..end].to_string());
            }
            return Cow::Owned(format!("{}{}", &s[..end], ELLIPSIS));
        }
    }

    Cow::Borrowed(s)
}

fn is_stripped_control(b: u8) -> bool {
    b == 0x7f || (b < 0x20 && b != b'\t' && b != b'\n' && b != b'\r')
}

/// SEC-001: Removes terminal control characters and ANSI escape sequences.
///
/// Incident titles, summaries and links come straight from a remote feed and
/// are printed to the operator's terminal, so CSI (`ESC [`) and OSC
/// (`ESC ]` ... BEL/ST) sequences, bare ESC and C0 controls are dropped.
/// Tab, newline and carriage return survive.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    if !bytes.iter().any(|&b| b == 0x1b || is_stripped_control(b)) {
        return Cow::Borrowed(s);
    }

    let len = bytes.len();
    let mut out = String::with_capacity(len);
    let mut i = 0;

    while i < len {
        let b = bytes[i];
        if b == 0x1b {
            match bytes.get(i + 1) {
                Some(b'[') => {
                    i += 2;
                    while i < len {
                        let c = bytes[i];
                        i += 1;
                        if (0x40..=0x7e).contains(&c) {
                            break;
                        }
                    }
                }
                Some(b']') => {
                    i += 2;
                    while i < len {
                        if bytes[i] == 0x07 {
                            i += 1;
                            break;
                        }
                        if bytes[i] == 0x1b && bytes.get(i + 1) == Some(&b'\\') {
                            i += 2;
                            break;
                        }
                        i += 1;
                    }
                }
                _ => i += 1,
            }
        } else if is_stripped_control(b) {
            i += 1;
        } else {
            let start = i;
            i += 1;
            while i < len && bytes[i] != 0x1b && !is_stripped_control(bytes[i]) {
                i += 1;
            }
            // SAFETY: only ASCII bytes end a run, so the slice stays on char boundaries.
            out.push_str(&s[start..i]);
        }
    }

    Cow::Owned(out)
}
