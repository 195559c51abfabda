use std::fmt::{Display, Formatter};

use crate::{Result, StoreError};

/// Longest segment accepted by the store, in bytes.
pub const MAX_SEGMENT_LENGTH: usize = 1500;

/// Path to a collection of documents, such as `rooms` or `rooms/abc/wheel`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionPath {
    segments: Vec<String>,
}

/// Path to a single document, such as `rooms/abc`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocPath {
    segments: Vec<String>,
}

/// Path to a field inside a document. Segments are kept apart, so a map key
/// containing dots (a nickname, for example) is addressed as a single segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

/// Checks that a string can be used as a path segment.
pub fn validate_segment(segment: &str) -> Result<()> {
    let reason = if segment.is_empty() {
        Some("segment is empty")
    } else if segment.contains('/') {
        Some("segment contains '/'")
    } else if segment == "." || segment == ".." {
        Some("segment is '.' or '..'")
    } else if segment.len() > 2 && segment.starts_with("__") && segment.ends_with("__") {
        Some("segments wrapped in '__' are reserved")
    } else if segment.len() > MAX_SEGMENT_LENGTH {
        Some("segment is too long")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StoreError::InvalidPath(format!("{segment:?}: {reason}"))),
        None => Ok(()),
    }
}

impl CollectionPath {
    /// A top-level collection
    pub fn root(name: &str) -> Result<Self> {
        validate_segment(name)?;

        Ok(Self {
            segments: vec![name.to_string()],
        })
    }

    /// Path to the document with the given id in this collection
    pub fn doc(&self, id: &str) -> Result<DocPath> {
        validate_segment(id)?;

        let mut segments = self.segments.clone();
        segments.push(id.to_string());

        Ok(DocPath { segments })
    }
}

impl DocPath {
    /// Path to a subcollection of this document
    pub fn collection(&self, name: &str) -> Result<CollectionPath> {
        validate_segment(name)?;

        let mut segments = self.segments.clone();
        segments.push(name.to_string());

        Ok(CollectionPath { segments })
    }

    /// The collection this document lives in
    pub fn parent(&self) -> CollectionPath {
        CollectionPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        }
    }

    /// The id of the document, which is the last segment of the path
    pub fn id(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }
}

impl FieldPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl From<&str> for FieldPath {
    fn from(value: &str) -> Self {
        Self::new([value])
    }
}

impl Display for CollectionPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl Display for DocPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_paths() {
        let room = CollectionPath::root("rooms").unwrap().doc("abc").unwrap();
        let wheel = room.collection("wheel").unwrap().doc("items").unwrap();

        assert_eq!(wheel.to_string(), "rooms/abc/wheel/items");
        assert_eq!(wheel.id(), "items");
        assert_eq!(wheel.parent().to_string(), "rooms/abc/wheel");
        assert_eq!(wheel.parent(), room.collection("wheel").unwrap());
    }

    #[test]
    fn rejects_invalid_segments() {
        let rooms = CollectionPath::root("rooms").unwrap();

        assert!(rooms.doc("").is_err());
        assert!(rooms.doc("a/b").is_err());
        assert!(rooms.doc("..").is_err());
        assert!(rooms.doc("__name__").is_err());
        assert!(rooms.doc("with space").is_ok());
        assert!(rooms.doc("__").is_ok());
    }
}
