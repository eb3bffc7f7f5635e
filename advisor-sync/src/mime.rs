//! Body extraction from provider MIME trees.

use advisor_core::MimePart;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;

/// Decode a base64url body, with or without padding. Invalid UTF-8 is replaced.
pub fn decode_body(data: &str) -> Option<String> {
    let trimmed: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed.trim_end_matches('='))
        .or_else(|_| URL_SAFE.decode(&trimmed))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Extract the best text body from a MIME tree.
///
/// Walks the tree depth-first with an explicit stack and prefers the first
/// `text/plain` leaf, then the first `text/html` leaf, then any part that
/// carries data at all.
pub fn extract_body(root: &MimePart) -> Option<String> {
    let mut plain: Option<&str> = None;
    let mut html: Option<&str> = None;
    let mut other: Option<&str> = None;

    let mut stack = vec![root];
    while let Some(part) = stack.pop() {
        if let Some(data) = part.body_data.as_deref().filter(|d| !d.is_empty()) {
            let mime = part.mime_type.to_ascii_lowercase();
            if mime.starts_with("text/plain") {
                plain = Some(data);
                break;
            } else if mime.starts_with("text/html") {
                html.get_or_insert(data);
            } else {
                other.get_or_insert(data);
            }
        }
        // Reverse so children are visited in document order.
        stack.extend(part.parts.iter().rev());
    }

    plain.or(html).or(other).and_then(decode_body)
}
