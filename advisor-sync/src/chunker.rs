//! Overlapping text segmentation.
//!
//! Segments are at most `chunk_size` characters. Consecutive segments share
//! exactly `overlap` characters: the next segment starts `overlap` characters
//! before the previous one ended. Cut points prefer paragraph breaks, then
//! line breaks, then spaces, and fall back to a hard cut.

use serde::{Deserialize, Serialize};

use crate::html::clean_markup;

const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Maximum segment length in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive segments
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        let overlap = config.overlap.min(chunk_size - 1);
        Self {
            config: ChunkerConfig {
                chunk_size,
                overlap,
            },
        }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Clean markup, then split.
    pub fn split(&self, raw: &str) -> Vec<String> {
        self.split_clean(&clean_markup(raw))
    }

    /// Split text that is already clean.
    pub fn split_clean(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let ChunkerConfig {
            chunk_size,
            overlap,
        } = self.config;

        if chars.len() <= chunk_size {
            return vec![text.to_string()];
        }

        let mut segments = Vec::new();
        let mut start = 0;
        loop {
            if chars.len() - start <= chunk_size {
                segments.push(chars[start..].iter().collect());
                break;
            }
            let end = Self::cut_point(&chars, start, chunk_size, overlap);
            segments.push(chars[start..end].iter().collect());
            start = end - overlap;
        }
        segments
    }

    /// End index (exclusive) for the segment starting at `start`.
    ///
    /// Always in `(start + overlap, start + chunk_size]` so the next start
    /// strictly advances.
    fn cut_point(chars: &[char], start: usize, chunk_size: usize, overlap: usize) -> usize {
        let max_end = start + chunk_size;
        let min_end = start + overlap + 1;

        for separator in SEPARATORS {
            let sep: Vec<char> = separator.chars().collect();
            let mut end = max_end;
            while end >= min_end {
                if end >= sep.len() && chars[end - sep.len()..end] == sep[..] {
                    return end;
                }
                end -= 1;
            }
        }
        max_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Chunker {
        Chunker::new(ChunkerConfig {
            chunk_size: 50,
            overlap: 10,
        })
    }

    fn assert_overlap_law(segments: &[String], overlap: usize) {
        for pair in segments.windows(2) {
            let prev: Vec<char> = pair[0].chars().collect();
            let next: Vec<char> = pair[1].chars().collect();
            assert_eq!(prev[prev.len() - overlap..], next[..overlap]);
        }
    }

    #[test]
    fn test_short_text_single_segment() {
        let chunker = Chunker::default();
        let segments = chunker.split("<p>Hello <b>there</b></p>");
        assert_eq!(segments, vec!["Hello there".to_string()]);
    }

    #[test]
    fn test_empty_text_no_segments() {
        assert!(Chunker::default().split("   ").is_empty());
        assert!(Chunker::default().split("<script>x()</script>").is_empty());
    }

    #[test]
    fn test_hard_cut_without_whitespace() {
        let text = "x".repeat(2500);
        let segments = Chunker::default().split_clean(&text);

        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].len(), 1000);
        assert_eq!(segments[1].len(), 1000);
        assert_eq!(segments[2].len(), 900);
        assert_overlap_law(&segments, 200);
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let text = format!("{}\n\n{}", "a".repeat(30), "b ".repeat(40));
        let segments = small().split_clean(&text);

        assert!(segments[0].ends_with("\n\n"));
        assert!(segments.iter().all(|s| s.chars().count() <= 50));
        assert_overlap_law(&segments, 10);
    }

    #[test]
    fn test_word_boundary_when_no_newlines() {
        let text = "lorem ipsum dolor sit amet ".repeat(10);
        let segments = small().split_clean(&text);

        assert!(segments.len() > 1);
        for segment in &segments[..segments.len() - 1] {
            assert!(segment.ends_with(' '), "cut mid-word: {:?}", segment);
        }
        assert_overlap_law(&segments, 10);
    }

    #[test]
    fn test_deterministic() {
        let text = "The quick brown fox.\n".repeat(200);
        let chunker = Chunker::default();
        assert_eq!(chunker.split(&text), chunker.split(&text));
    }

    #[test]
    fn test_overlap_clamped() {
        let chunker = Chunker::new(ChunkerConfig {
            chunk_size: 10,
            overlap: 50,
        });
        assert_eq!(chunker.config().overlap, 9);
        let segments = chunker.split_clean(&"y".repeat(25));
        assert!(segments.len() > 1);
        assert_overlap_law(&segments, 9);
    }
}
