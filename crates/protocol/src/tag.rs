//! Content tags: the identity of one chunk of one file.
//!
//! A tag is `"{fingerprint}-{index}"`. The index is always parsed as a
//! number so that ordering by tag never degrades to lexical order
//! (`"f-10"` sorts after `"f-9"`).

use std::fmt;
use std::str::FromStr;

/// Error returned when a string is not a valid content tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    #[error("content tag has no index separator: {0}")]
    MissingSeparator(String),

    #[error("content tag has an empty fingerprint: {0}")]
    EmptyFingerprint(String),

    #[error("content tag index is not a number: {0}")]
    InvalidIndex(String),
}

/// Identity of one chunk: the file fingerprint plus the chunk's ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentTag {
    pub fingerprint: String,
    pub index: u64,
}

impl ContentTag {
    pub fn new(fingerprint: impl Into<String>, index: u64) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            index,
        }
    }

    /// Parses `"{fingerprint}-{index}"`, splitting on the last `-`.
    pub fn parse(raw: &str) -> Result<Self, TagError> {
        let (fingerprint, index) = raw
            .rsplit_once('-')
            .ok_or_else(|| TagError::MissingSeparator(raw.to_string()))?;
        if fingerprint.is_empty() {
            return Err(TagError::EmptyFingerprint(raw.to_string()));
        }
        // `u64::from_str` accepts a leading `+`; a tag never has one.
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TagError::InvalidIndex(raw.to_string()));
        }
        let index = index
            .parse::<u64>()
            .map_err(|_| TagError::InvalidIndex(raw.to_string()))?;
        Ok(Self {
            fingerprint: fingerprint.to_string(),
            index,
        })
    }

    /// Returns `true` if this tag names a chunk of `fingerprint`.
    pub fn belongs_to(&self, fingerprint: &str) -> bool {
        self.fingerprint == fingerprint
    }
}

impl fmt::Display for ContentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.fingerprint, self.index)
    }
}

impl FromStr for ContentTag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Returns the extension of `filename` including the leading dot.
///
/// Names without a dot, or ending in one, have no extension and yield `""`.
pub fn extension_of(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(pos) if pos + 1 < filename.len() => &filename[pos..],
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_with_dash() {
        let tag = ContentTag::new("d41d8cd9", 7);
        assert_eq!(tag.to_string(), "d41d8cd9-7");
    }

    #[test]
    fn parse_roundtrip() {
        let tag: ContentTag = "abc123-42".parse().unwrap();
        assert_eq!(tag, ContentTag::new("abc123", 42));
    }

    #[test]
    fn parse_splits_on_last_dash() {
        let tag = ContentTag::parse("a-b-12").unwrap();
        assert_eq!(tag.fingerprint, "a-b");
        assert_eq!(tag.index, 12);
    }

    #[test]
    fn parse_rejects_missing_separator() {
        assert!(matches!(
            ContentTag::parse("abc"),
            Err(TagError::MissingSeparator(_))
        ));
    }

    #[test]
    fn parse_rejects_empty_fingerprint() {
        assert!(matches!(
            ContentTag::parse("-3"),
            Err(TagError::EmptyFingerprint(_))
        ));
    }

    #[test]
    fn parse_rejects_non_numeric_index() {
        assert!(ContentTag::parse("abc-x").is_err());
        assert!(ContentTag::parse("abc-").is_err());
        assert!(ContentTag::parse("abc-+1").is_err());
        assert!(ContentTag::parse("abc-1.5").is_err());
    }

    #[test]
    fn numeric_order_beats_lexical_order() {
        let mut tags: Vec<ContentTag> = ["f-10", "f-2", "f-1", "f-0"]
            .iter()
            .map(|s| ContentTag::parse(s).unwrap())
            .collect();
        tags.sort_by_key(|t| t.index);
        let indices: Vec<u64> = tags.iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 10]);
    }

    #[test]
    fn belongs_to_compares_fingerprint() {
        let tag = ContentTag::new("aaa", 1);
        assert!(tag.belongs_to("aaa"));
        assert!(!tag.belongs_to("bbb"));
    }

    #[test]
    fn extension_includes_dot() {
        assert_eq!(extension_of("movie.mp4"), ".mp4");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
    }

    #[test]
    fn extension_empty_without_dot() {
        assert_eq!(extension_of("README"), "");
    }

    #[test]
    fn trailing_dot_is_no_extension() {
        assert_eq!(extension_of("notes."), "");
        assert_eq!(extension_of(".."), "");
        assert_eq!(extension_of(".bashrc"), ".bashrc");
    }
}
