//! Large object content moved in and out of storage locations

use std::fmt::{self, Display, Formatter};

/// Kind of LOB a working storage location reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LobKind {
    /// Binary content (BLOB)
    Binary,
    /// Character content (CLOB)
    Character,
}

impl LobKind {
    /// Empty value of this kind
    #[must_use]
    pub fn empty(self) -> LobValue {
        match self {
            Self::Binary => LobValue::Binary(Vec::new()),
            Self::Character => LobValue::Character(String::new()),
        }
    }

    /// Whether a value can be stored as this kind
    #[inline]
    #[must_use]
    pub fn accepts(self, value: &LobValue) -> bool {
        value.kind() == self
    }

    /// Wrap raw bytes as this kind
    ///
    /// Character content is decoded as UTF-8; invalid sequences are replaced.
    #[must_use]
    pub fn from_bytes(self, bytes: Vec<u8>) -> LobValue {
        match self {
            Self::Binary => LobValue::Binary(bytes),
            Self::Character => match String::from_utf8(bytes) {
                Ok(text) => LobValue::Character(text),
                Err(e) => LobValue::Character(String::from_utf8_lossy(e.as_bytes()).into_owned()),
            },
        }
    }
}

impl Display for LobKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => f.write_str("BLOB"),
            Self::Character => f.write_str("CLOB"),
        }
    }
}

/// LOB content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobValue {
    /// Binary content
    Binary(Vec<u8>),
    /// Character content
    Character(String),
}

impl LobValue {
    /// Kind of this value
    #[inline]
    #[must_use]
    pub fn kind(&self) -> LobKind {
        match self {
            Self::Binary(_) => LobKind::Binary,
            Self::Character(_) => LobKind::Character,
        }
    }

    /// Size in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// True for zero-length content
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Binary(bytes) => bytes,
            Self::Character(text) => text.as_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display() {
        assert_eq!(LobKind::Binary.to_string(), "BLOB");
        assert_eq!(LobKind::Character.to_string(), "CLOB");
    }

    #[test]
    fn from_bytes_by_kind() {
        let binary = LobKind::Binary.from_bytes(vec![0xff, 0x00]);
        assert_eq!(binary.len(), 2);
        assert!(LobKind::Binary.accepts(&binary));
        assert!(!LobKind::Character.accepts(&binary));

        let text = LobKind::Character.from_bytes(b"hello".to_vec());
        assert_eq!(text, LobValue::Character("hello".to_string()));

        let lossy = LobKind::Character.from_bytes(vec![b'a', 0xff]);
        assert_eq!(lossy.kind(), LobKind::Character);
    }

    #[test]
    fn empty_values() {
        assert!(LobKind::Binary.empty().is_empty());
        assert!(LobKind::Character.empty().is_empty());
    }
}
