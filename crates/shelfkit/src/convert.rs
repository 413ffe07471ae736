//! XHTML chapter conversion utilities

/// Elements dropped entirely, including their content
const SKIP_TAGS: [&str; 8] = [
    "script", "style", "noscript", "nav", "svg", "iframe", "video", "audio",
];

/// Line width passed to html2text; large enough that it never wraps prose
const TEXT_WIDTH: usize = 10_000;

/// Remove non-content elements and their bodies from an XHTML document
///
/// A small scanner rather than a DOM pass: it tracks a stack of open skip
/// elements and copies every byte outside them unchanged.
pub fn strip_non_content(html: &str) -> String {
    let mut output = String::with_capacity(html.len());
    let mut skip_stack: Vec<String> = Vec::new();
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        let (before, from_tag) = rest.split_at(start);
        if skip_stack.is_empty() {
            output.push_str(before);
        }

        let Some(end) = from_tag.find('>') else {
            if skip_stack.is_empty() {
                output.push_str(from_tag);
            }
            return output;
        };
        let tag = &from_tag[..=end];
        rest = &from_tag[end + 1..];

        let inner = tag[1..tag.len() - 1].trim();
        let is_closing = inner.starts_with('/');
        let name = inner
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        // xmlns-prefixed names such as `svg:svg` count as their local name
        let local = name.rsplit(':').next().unwrap_or("").to_string();

        if SKIP_TAGS.contains(&local.as_str()) {
            if is_closing {
                if let Some(pos) = skip_stack.iter().rposition(|t| *t == local) {
                    skip_stack.truncate(pos);
                }
            } else if !inner.ends_with('/') {
                skip_stack.push(local);
            }
            continue;
        }

        if skip_stack.is_empty() {
            output.push_str(tag);
        }
    }

    if skip_stack.is_empty() {
        output.push_str(rest);
    }
    output
}

/// Convert a chapter document to Markdown
pub fn chapter_markdown(html: &str) -> String {
    let markdown = html2md::parse_html(&strip_non_content(html));
    clean_whitespace(&markdown)
}

/// Convert a chapter document to plain text
pub fn chapter_text(html: &str) -> String {
    let stripped = strip_non_content(html);
    match html2text::from_read(stripped.as_bytes(), TEXT_WIDTH) {
        Ok(text) => clean_whitespace(&text),
        Err(_) => clean_whitespace(&strip_tags(&stripped)),
    }
}

/// Last-resort tag removal used when html2text rejects the input
fn strip_tags(html: &str) -> String {
    let mut output = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                output.push(' ');
            }
            _ if !in_tag => output.push(c),
            _ => {}
        }
    }
    output
}

/// Byte offset of the tag carrying `id="anchor"` (or `name=`), if any
fn anchor_offset(html: &str, anchor: &str) -> Option<usize> {
    let needles = [
        format!("id=\"{}\"", anchor),
        format!("id='{}'", anchor),
        format!("name=\"{}\"", anchor),
    ];
    let hit = needles.iter().filter_map(|n| html.find(n.as_str())).min()?;
    html[..hit].rfind('<')
}

/// Slice the part of a document between two fragment anchors
///
/// Content runs from the element carrying `anchor` up to the element
/// carrying `next_anchor`. A missing anchor means the start of the document;
/// a missing `next_anchor` means the end.
pub fn slice_fragment<'a>(html: &'a str, anchor: Option<&str>, next_anchor: Option<&str>) -> &'a str {
    let start = anchor.and_then(|a| anchor_offset(html, a)).unwrap_or(0);
    let end = next_anchor
        .and_then(|a| anchor_offset(&html[start..], a))
        .filter(|offset| *offset > 0)
        .map(|offset| start + offset)
        .unwrap_or(html.len());
    &html[start..end]
}

/// Clip to at most `max_chars` characters, never splitting a character
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].trim_end().to_string(),
        None => s.to_string(),
    }
}

/// Clean whitespace: collapse runs, trim, keep max 2 newlines
pub fn clean_whitespace(s: &str) -> String {
    let mut result = String::new();
    let mut last_was_space = false;
    let mut newline_count = 0;

    for c in s.chars() {
        if c == '\n' {
            if last_was_space && result.ends_with(' ') {
                result.pop();
            }
            newline_count += 1;
            last_was_space = true;
            if newline_count <= 2 {
                result.push(c);
            }
        } else if c.is_whitespace() {
            if !last_was_space {
                result.push(' ');
                last_was_space = true;
            }
        } else {
            newline_count = 0;
            last_was_space = false;
            result.push(c);
        }
    }

    result.trim().to_string()
}
