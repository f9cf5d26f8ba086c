//! Reader for the small markup subset popup descriptions are written in.
//!
//! `<b>`/`<strong>` toggle bold text, `<br>` breaks the line and `<img>` adds
//! an image. Any other tag is dropped and its text kept.

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text { text: String, bold: bool },
    LineBreak,
    Image {
        src: String,
        alt: String,
        width: Option<f32>,
    },
}

pub fn parse(markup: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut bold_depth = 0usize;
    let mut text = String::new();
    let mut rest = markup;

    while let Some(open) = rest.find('<') {
        text.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('>') else {
            // unterminated tag, keep it as text
            text.push_str(&rest[open..]);
            rest = "";
            break;
        };
        let tag = &rest[open + 1..open + close];
        rest = &rest[open + close + 1..];

        let (name, attributes) = split_tag(tag);
        match name.as_str() {
            "b" | "strong" => {
                flush(&mut segments, &mut text, bold_depth > 0);
                bold_depth += 1;
            }
            "/b" | "/strong" => {
                flush(&mut segments, &mut text, bold_depth > 0);
                bold_depth = bold_depth.saturating_sub(1);
            }
            "br" => {
                flush(&mut segments, &mut text, bold_depth > 0);
                segments.push(Segment::LineBreak);
            }
            "img" => {
                flush(&mut segments, &mut text, bold_depth > 0);
                if let Some(src) = attribute(attributes, "src") {
                    segments.push(Segment::Image {
                        src,
                        alt: attribute(attributes, "alt").unwrap_or_default(),
                        width: attribute(attributes, "width").and_then(|w| w.parse().ok()),
                    });
                }
            }
            _ => {}
        }
    }
    text.push_str(rest);
    flush(&mut segments, &mut text, bold_depth > 0);
    segments
}

fn flush(segments: &mut Vec<Segment>, text: &mut String, bold: bool) {
    if text.is_empty() {
        return;
    }
    segments.push(Segment::Text {
        text: decode_entities(text),
        bold,
    });
    text.clear();
}

/// Lower-cased tag name (with a leading `/` for closing tags) and the
/// remaining attribute text.
fn split_tag(tag: &str) -> (String, &str) {
    let tag = tag.trim().trim_end_matches('/').trim_end();
    let end = tag.find(char::is_whitespace).unwrap_or(tag.len());
    (tag[..end].to_ascii_lowercase(), &tag[end..])
}

fn attribute(attributes: &str, name: &str) -> Option<String> {
    let mut rest = attributes;
    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].split_whitespace().last().unwrap_or("");
        let after = rest[eq + 1..].trim_start();
        let (value, remaining) = match after.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let body = &after[1..];
                let end = body.find(quote).unwrap_or(body.len());
                (&body[..end], body.get(end + 1..).unwrap_or(""))
            }
            _ => {
                let end = after.find(char::is_whitespace).unwrap_or(after.len());
                (&after[..end], &after[end..])
            }
        };
        if key.eq_ignore_ascii_case(name) {
            return Some(decode_entities(value));
        }
        rest = remaining;
    }
    None
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}
