use scraper::{ElementRef, Html, Selector};

/// Elements that start a new line of flowing text.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "aside", "h1", "h2", "h3", "h4", "h5",
    "h6", "li", "ul", "ol", "dl", "dt", "dd", "blockquote", "pre", "table", "tr", "figure",
    "figcaption", "hr", "br",
];

/// Elements whose text never reaches the reader.
const SKIPPED_ELEMENTS: &[&str] = &["head", "script", "style", "title", "svg"];

/// Flatten an XHTML section into paragraphs of plain text separated by blank lines.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body = Selector::parse("body")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .unwrap_or_else(|| document.root_element());

    let mut raw = String::new();
    collect_text(body, &mut raw);
    clean_text(&raw)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            let name = child_element.value().name();
            if SKIPPED_ELEMENTS.contains(&name) {
                continue;
            }
            let is_block = BLOCK_ELEMENTS.contains(&name);
            if is_block {
                out.push('\n');
            }
            collect_text(child_element, out);
            if is_block {
                out.push_str("\n\n");
            }
        } else if let Some(text) = child.value().as_text() {
            push_collapsed(out, text);
        }
    }
}

/// Append `text` with every whitespace run folded into one space.
fn push_collapsed(out: &mut String, text: &str) {
    let mut last_was_space = out.ends_with(' ') || out.ends_with('\n') || out.is_empty();
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
}

pub fn clean_text(text: &str) -> String {
    let mut result = text
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");

    // Collapse 3+ consecutive newlines to a single blank line
    while result.contains("\n\n\n") {
        result = result.replace("\n\n\n", "\n\n");
    }

    result.trim().to_string()
}

/// Text of the first h1/h2/h3 in the section, if any.
pub fn first_heading(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let sel = Selector::parse("h1, h2, h3").ok()?;
    document
        .select(&sel)
        .next()
        .map(|el| {
            let mut heading = String::new();
            push_collapsed(&mut heading, &el.text().collect::<String>());
            heading.trim().to_string()
        })
        .filter(|s| !s.is_empty())
}
