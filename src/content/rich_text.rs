//! Rich-text to HTML rendering
//!
//! Segments map to block elements (`paragraph` → `<p>`, `heading2` → `<h2>`,
//! consecutive `list-item`s → one `<ul>`, ...). Span offsets count UTF-16
//! code units, as the CMS emits them; spans are re-opened when they overlap.

use super::{BodySegment, Span};
use crate::helpers::html_escape;

/// Render a sequence of body segments as HTML
pub fn as_html(segments: &[BodySegment]) -> String {
    let mut html = String::new();
    let mut open_list: Option<&'static str> = None;

    for segment in segments {
        let list = match segment.kind.as_str() {
            "list-item" => Some("ul"),
            "o-list-item" => Some("ol"),
            _ => None,
        };

        if open_list != list {
            if let Some(tag) = open_list {
                html.push_str(&format!("</{}>", tag));
            }
            if let Some(tag) = list {
                html.push_str(&format!("<{}>", tag));
            }
            open_list = list;
        }

        let inner = render_spans(&segment.text, &segment.spans);
        let tag = match segment.kind.as_str() {
            "heading1" => "h1",
            "heading2" => "h2",
            "heading3" => "h3",
            "heading4" => "h4",
            "heading5" => "h5",
            "heading6" => "h6",
            "preformatted" => "pre",
            "list-item" | "o-list-item" => "li",
            _ => "p",
        };
        html.push_str(&format!("<{tag}>{inner}</{tag}>"));
    }

    if let Some(tag) = open_list {
        html.push_str(&format!("</{}>", tag));
    }

    html
}

/// Render a single text with its inline spans
fn render_spans(text: &str, spans: &[Span]) -> String {
    let chars: Vec<char> = text.chars().collect();
    let boundaries = utf16_boundaries(&chars);

    // Spans re-expressed over char indices
    let mut spans: Vec<(usize, usize, &Span)> = spans
        .iter()
        .filter_map(|s| {
            let start = char_index(&boundaries, s.start)?;
            let end = char_index(&boundaries, s.end)?;
            (start < end).then_some((start, end, s))
        })
        .collect();
    spans.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut out = String::with_capacity(text.len());
    let mut open: Vec<(usize, &Span)> = Vec::new();
    let mut next = 0;

    for (i, c) in chars.iter().enumerate() {
        close_ending(&mut open, i, &mut out);
        while next < spans.len() && spans[next].0 == i {
            let (_, end, span) = spans[next];
            out.push_str(&open_tag(span));
            open.push((end, span));
            next += 1;
        }
        match c {
            '\n' => out.push_str("<br />"),
            c => out.push_str(&html_escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    close_ending(&mut open, chars.len(), &mut out);

    out
}

/// UTF-16 offset at which each char starts, plus the total length
fn utf16_boundaries(chars: &[char]) -> Vec<usize> {
    let mut boundaries = Vec::with_capacity(chars.len() + 1);
    let mut offset = 0;
    for c in chars {
        boundaries.push(offset);
        offset += c.len_utf16();
    }
    boundaries.push(offset);
    boundaries
}

/// Char index starting at a UTF-16 offset; `None` inside a surrogate pair or past the end
fn char_index(boundaries: &[usize], utf16_offset: usize) -> Option<usize> {
    boundaries.binary_search(&utf16_offset).ok()
}

/// Close every span ending at `at`, re-opening the ones stacked above it
fn close_ending<'a>(open: &mut Vec<(usize, &'a Span)>, at: usize, out: &mut String) {
    let Some(pos) = open.iter().position(|(end, _)| *end <= at) else {
        return;
    };

    let tail: Vec<(usize, &Span)> = open.drain(pos..).collect();
    for (_, span) in tail.iter().rev() {
        out.push_str(close_tag(span));
    }
    for (end, span) in tail {
        if end > at {
            out.push_str(&open_tag(span));
            open.push((end, span));
        }
    }
}

fn open_tag(span: &Span) -> String {
    match span.kind.as_str() {
        "strong" => "<strong>".to_string(),
        "em" => "<em>".to_string(),
        "hyperlink" => match &span.url {
            Some(url) => format!(
                r#"<a href="{}" target="_blank" rel="noopener">"#,
                html_escape(url)
            ),
            None => "<a>".to_string(),
        },
        _ => "<span>".to_string(),
    }
}

fn close_tag(span: &Span) -> &'static str {
    match span.kind.as_str() {
        "strong" => "</strong>",
        "em" => "</em>",
        "hyperlink" => "</a>",
        _ => "</span>",
    }
}
