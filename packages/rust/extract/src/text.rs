//! Structural text extraction from parsed HTML.
//!
//! Produces a Markdown-flavoured plain-text rendition of a page:
//! headings become `#`-prefixed lines, content-bearing elements become
//! paragraphs, and non-content subtrees (scripts, navigation, chrome)
//! are skipped entirely.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use contentsync_shared::{ExtractedPage, PageMetadata};

/// Tags whose entire subtree is ignored during text extraction.
const EXCLUDED_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "img", "svg", "nav", "footer", "aside", "head",
];

/// Content-bearing elements considered in the paragraph pass.
const CONTENT_SELECTOR: &str =
    "p, article, section, div, main, span, li, td, blockquote, pre, code, figcaption";

/// Fragments at or below this many characters are treated as styling
/// noise and dropped.
const MIN_FRAGMENT_CHARS: usize = 10;

/// Parse `html` and assemble the full extraction result for `url`.
pub(crate) fn build_page(url: &str, html: &str) -> ExtractedPage {
    let doc = Html::parse_document(html);

    ExtractedPage {
        url: url.to_string(),
        title: page_title(&doc, url),
        published_at: published_date(&doc),
        full_content: page_text(&doc),
        metadata: page_metadata(&doc),
    }
}

// ---------------------------------------------------------------------------
// Title and metadata
// ---------------------------------------------------------------------------

/// Document title, falling back to the first `<h1>`, then the URL itself.
fn page_title(doc: &Html, url: &str) -> String {
    let title_sel = Selector::parse("title").unwrap();
    if let Some(el) = doc.select(&title_sel).next() {
        let text = el.text().collect::<String>().trim().to_string();
        if !text.is_empty() {
            return text;
        }
    }

    let h1_sel = Selector::parse("h1").unwrap();
    if let Some(el) = doc.select(&h1_sel).next() {
        let text = el.text().collect::<String>().trim().to_string();
        if !text.is_empty() {
            return text;
        }
    }

    url.to_string()
}

/// Open-Graph-style metadata; every field defaults to the empty string.
fn page_metadata(doc: &Html) -> PageMetadata {
    PageMetadata {
        og_title: meta_content(doc, r#"meta[property="og:title"]"#).unwrap_or_default(),
        og_description: meta_content(doc, r#"meta[property="og:description"]"#)
            .unwrap_or_default(),
        og_image: meta_content(doc, r#"meta[property="og:image"]"#).unwrap_or_default(),
        keywords: meta_content(doc, r#"meta[name="keywords"]"#).unwrap_or_default(),
    }
}

/// First non-empty publication date among the known metadata sources.
fn published_date(doc: &Html) -> Option<String> {
    meta_content(doc, r#"meta[property="article:published_time"]"#)
        .or_else(|| meta_content(doc, r#"meta[name="date"]"#))
        .or_else(|| time_datetime(doc))
}

/// First non-empty `content` attribute matching `selector`.
fn meta_content(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).unwrap();
    doc.select(&sel)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// First non-empty `datetime` attribute on a `<time>` element.
fn time_datetime(doc: &Html) -> Option<String> {
    let sel = Selector::parse("time[datetime]").unwrap();
    doc.select(&sel)
        .filter_map(|el| el.value().attr("datetime"))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Body text
// ---------------------------------------------------------------------------

/// Two-pass structural extraction: headings first, then content elements.
fn page_text(doc: &Html) -> String {
    let mut out = String::new();

    let heading_sel = Selector::parse("h1, h2, h3, h4, h5, h6").unwrap();
    for el in doc.select(&heading_sel) {
        if in_excluded_subtree(el) {
            continue;
        }
        let tag = el.value().name();
        let level: usize = tag[1..].parse().unwrap_or(1);
        out.push_str(&"#".repeat(level));
        out.push(' ');
        out.push_str(element_text(el).trim());
        out.push_str("\n\n");
    }

    let content_sel = Selector::parse(CONTENT_SELECTOR).unwrap();
    for el in doc.select(&content_sel) {
        if in_excluded_subtree(el) {
            continue;
        }
        let text = element_text(el);
        let text = text.trim();
        if text.chars().count() > MIN_FRAGMENT_CHARS {
            out.push_str(text);
            out.push_str("\n\n");
        }
    }

    normalize(&out)
}

fn is_excluded(tag: &str) -> bool {
    EXCLUDED_TAGS.contains(&tag)
}

/// Whether any ancestor of `el` is an excluded tag.
fn in_excluded_subtree(el: ElementRef) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| is_excluded(a.value().name()))
}

/// Descendant text of `el`, skipping excluded subtrees.
fn element_text(el: ElementRef) -> String {
    let mut out = String::new();
    collect_text(el, &mut out);
    out
}

fn collect_text(el: ElementRef, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(&text.text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if !is_excluded(child_el.value().name()) {
                collect_text(child_el, out);
            }
        }
    }
}

/// Collapse newline runs to paragraph breaks and runs of horizontal
/// whitespace to a single space, preserving the two-newline separators
/// emitted between blocks.
fn normalize(text: &str) -> String {
    static NEWLINE_RUNS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
    static SPACE_RUNS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid regex"));

    let text = text.replace('\r', "");
    let text = SPACE_RUNS.replace_all(&text, " ");
    let text = NEWLINE_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_char_fragment_excluded_eleven_included() {
        let html = "<html><body><p>abcdefghij</p><p>abcdefghijk</p></body></html>";
        let page = build_page("https://example.com/x", html);
        assert_eq!(page.full_content, "abcdefghijk");
    }

    #[test]
    fn newline_runs_collapse_to_two() {
        assert_eq!(normalize("A\n\n\n\nB"), "A\n\nB");
        assert_eq!(normalize("A\n\n\nB"), "A\n\nB");
        // Two newlines are already a paragraph break and stay untouched.
        assert_eq!(normalize("A\n\nB"), "A\n\nB");
    }

    #[test]
    fn space_runs_collapse_to_one() {
        assert_eq!(normalize("A   B"), "A B");
        assert_eq!(normalize("A\t\tB"), "A B");
    }

    #[test]
    fn space_collapse_preserves_paragraph_breaks() {
        assert_eq!(normalize("first block\n\nsecond  block"), "first block\n\nsecond block");
    }

    #[test]
    fn title_from_title_tag() {
        let html = "<html><head><title> Doc Title </title></head><body><h1>H</h1></body></html>";
        let page = build_page("https://example.com/x", html);
        assert_eq!(page.title, "Doc Title");
    }

    #[test]
    fn title_falls_back_to_h1() {
        let html = "<html><head><title>   </title></head>\
                    <body><h1>Heading Title</h1></body></html>";
        let page = build_page("https://example.com/x", html);
        assert_eq!(page.title, "Heading Title");
    }

    #[test]
    fn title_falls_back_to_url() {
        let html = "<html><body><p>No title and no heading anywhere</p></body></html>";
        let page = build_page("https://example.com/some/page", html);
        assert_eq!(page.title, "https://example.com/some/page");
    }

    #[test]
    fn metadata_fields_default_to_empty() {
        let html = r#"<html><head>
            <meta property="og:title" content="OG Title" />
            <meta name="keywords" content="rust, parsing" />
        </head><body></body></html>"#;
        let page = build_page("https://example.com/x", html);
        assert_eq!(page.metadata.og_title, "OG Title");
        assert_eq!(page.metadata.keywords, "rust, parsing");
        assert_eq!(page.metadata.og_description, "");
        assert_eq!(page.metadata.og_image, "");
    }

    #[test]
    fn empty_meta_content_treated_as_absent() {
        let html = r#"<html><head>
            <meta property="og:title" content="" />
        </head><body></body></html>"#;
        let page = build_page("https://example.com/x", html);
        assert_eq!(page.metadata.og_title, "");
    }

    #[test]
    fn published_date_prefers_article_time() {
        let html = r#"<html><head>
            <meta property="article:published_time" content="2024-01-15T08:00:00Z" />
            <meta name="date" content="2024-01-16" />
        </head><body><time datetime="2024-01-17">Jan 17</time></body></html>"#;
        let page = build_page("https://example.com/x", html);
        assert_eq!(page.published_at.as_deref(), Some("2024-01-15T08:00:00Z"));
    }

    #[test]
    fn published_date_falls_back_to_date_meta_then_time_tag() {
        let html = r#"<html><head>
            <meta name="date" content="2024-01-16" />
        </head><body></body></html>"#;
        let page = build_page("https://example.com/x", html);
        assert_eq!(page.published_at.as_deref(), Some("2024-01-16"));

        let html = r#"<html><body><time datetime="2024-01-17">Jan 17</time></body></html>"#;
        let page = build_page("https://example.com/x", html);
        assert_eq!(page.published_at.as_deref(), Some("2024-01-17"));
    }

    #[test]
    fn published_date_absent_is_none() {
        let html = "<html><body><p>Nothing dated about this page</p></body></html>";
        let page = build_page("https://example.com/x", html);
        assert_eq!(page.published_at, None);
    }

    #[test]
    fn headings_become_markdown_prefixes() {
        let html = "<html><body><h1>Top</h1><h3>Deep Section</h3></body></html>";
        let page = build_page("https://example.com/x", html);
        assert!(page.full_content.contains("# Top"));
        assert!(page.full_content.contains("### Deep Section"));
    }

    #[test]
    fn excluded_subtrees_are_skipped() {
        let html = r#"<html><body>
            <nav><span>Site navigation with many links</span></nav>
            <script>var analytics = "tracking code payload";</script>
            <p>Actual article paragraph text.</p>
            <footer><p>Copyright notice in the footer area</p></footer>
        </body></html>"#;
        let page = build_page("https://example.com/x", html);
        assert!(page.full_content.contains("Actual article paragraph text."));
        assert!(!page.full_content.contains("Site navigation"));
        assert!(!page.full_content.contains("tracking code"));
        assert!(!page.full_content.contains("Copyright notice"));
    }

    #[test]
    fn excluded_descendants_do_not_leak_into_parent_text() {
        let html = r#"<html><body>
            <div>Visible wrapper text<script>hidden = "payload text";</script></div>
        </body></html>"#;
        let page = build_page("https://example.com/x", html);
        assert!(page.full_content.contains("Visible wrapper text"));
        assert!(!page.full_content.contains("payload"));
    }

    #[test]
    fn fragment_length_counts_characters_not_bytes() {
        // Ten multibyte characters: excluded despite exceeding 10 bytes.
        let html = "<html><body><p>éééééééééé</p></body></html>";
        let page = build_page("https://example.com/x", html);
        assert_eq!(page.full_content, "");
    }
}
