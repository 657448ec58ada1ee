#![forbid(unsafe_code)]

//! Character escaping for canonical serialization.
//!
//! Text and attribute content use different escape sets, and carriage
//! returns always become character references, so the canonical bytes
//! stay identical across line-ending conventions.

/// Escape element text content.  `>` is escaped too, so `]]>` can never
/// appear literally in the output.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\r' => out.push_str("&#xD;"),
            other => out.push(other),
        }
    }
    out
}

/// Escape an attribute value for rendering between double quotes.
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            other => out.push(other),
        }
    }
    out
}

/// Escape processing instruction data.  Only `\r` needs a reference.
pub fn escape_pi(s: &str) -> String {
    s.replace('\r', "&#xD;")
}
