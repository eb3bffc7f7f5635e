//! Markup cleaning ahead of chunking.
//!
//! Turns HTML (or plain text that may contain stray markup) into readable
//! text: scripts and styles are dropped, links are kept as `[text](url)`,
//! block elements land on their own lines and entities are decoded.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

static SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap());

static STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").unwrap());

static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a\s*>"#).unwrap()
});

static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());

static BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)</?(?:p|div|h[1-6]|li|ul|ol|tr|table|thead|tbody|blockquote|section|article|header|footer|pre|hr)\b[^>]*>",
    )
    .unwrap()
});

// A real tag name must be followed by whitespace, `/` or `>`, so angle-bracketed
// addresses like `<bob@example.com>` survive.
static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[a-zA-Z][a-zA-Z0-9]*(?:\s[^>]*)?/?>|<![^>]*>").unwrap());

static NUMERIC_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(?:[xX]([0-9a-fA-F]{1,6})|([0-9]{1,7}));").unwrap());

static INLINE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{a0}\r]+").unwrap());

static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Clean markup into plain text. Idempotent on its own output.
pub fn clean_markup(raw: &str) -> String {
    let text = COMMENT.replace_all(raw, "");
    let text = SCRIPT.replace_all(&text, "");
    let text = STYLE.replace_all(&text, "");

    let text = LINK.replace_all(&text, |caps: &Captures| {
        let url = caps[1].trim();
        let label = TAG.replace_all(&caps[2], "");
        let label = INLINE_SPACE.replace_all(label.trim(), " ");
        if label.is_empty() {
            url.to_string()
        } else {
            format!("[{}]({})", label, url)
        }
    });

    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = BLOCK.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, "");
    let text = decode_entities(&text);

    let lines: Vec<String> = text
        .split('\n')
        .map(|line| INLINE_SPACE.replace_all(line, " ").trim().to_string())
        .collect();
    let joined = lines.join("\n");

    EXCESS_NEWLINES
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}

fn decode_entities(text: &str) -> String {
    let text = NUMERIC_ENTITY.replace_all(text, |caps: &Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (_, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    // &amp; last so "&amp;lt;" decodes to "&lt;" and not "<".
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_scripts_and_styles() {
        let html = "<html><head><style>p { color: red; }</style></head>\
                    <body><script>alert('x')</script><p>Hello</p></body></html>";
        assert_eq!(clean_markup(html), "Hello");
    }

    #[test]
    fn test_links_preserved() {
        let html = r#"<p>See <a href="https://example.com/doc" class="x">the <b>doc</b></a> now</p>"#;
        assert_eq!(clean_markup(html), "See [the doc](https://example.com/doc) now");
    }

    #[test]
    fn test_blocks_on_own_lines() {
        let html = "<h1>Title</h1><p>First</p><p>Second<br>line</p><ul><li>a</li><li>b</li></ul>";
        assert_eq!(clean_markup(html), "Title\n\nFirst\n\nSecond\nline\n\na\n\nb");
    }

    #[test]
    fn test_entities_decoded() {
        assert_eq!(clean_markup("Tom &amp; Jerry &lt;3 &#8364;5 &#x41;"), "Tom & Jerry <3 €5 A");
        assert_eq!(clean_markup("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_plain_text_addresses_survive() {
        assert_eq!(
            clean_markup("From: Bob <bob@example.com>\n\n\n\nThanks"),
            "From: Bob <bob@example.com>\n\nThanks"
        );
    }

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(clean_markup("  a   b\t c  \n  d  "), "a b c\nd");
        assert_eq!(clean_markup(""), "");
    }
}
