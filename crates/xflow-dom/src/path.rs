//! Slash-separated paths for addressing within documents
//!
//! Provides [`DomPath`] for locating elements (and a trailing attribute)
//! relative to a context node, e.g. `engine/release`, `../ID`, `./@name`.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// One step of a [`DomPath`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    /// Child elements with the given name
    Child(String),
    /// The context node itself (`.`)
    Current,
    /// The parent of the context node (`..`)
    Parent,
    /// An attribute of the context node (`@name`), only valid as the last step
    Attribute(String),
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Step::Child(name) => f.write_str(name),
            Step::Current => f.write_str("."),
            Step::Parent => f.write_str(".."),
            Step::Attribute(name) => write!(f, "@{name}"),
        }
    }
}

/// Path within a document tree
///
/// Relative paths start at a context node. Absolute paths (leading `/`)
/// start above the root element, so their first step names the root.
///
/// # Examples
/// - `engine/release` → child `engine`, then its child `release`
/// - `/sys/module/name` → absolute from the `sys` root element
/// - `../ID` → sibling `ID` of the context node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DomPath {
    absolute: bool,
    steps: Vec<Step>,
}

impl DomPath {
    /// Create a relative path from steps
    ///
    /// # Errors
    /// Returns error if an attribute step is not last
    pub fn new(steps: Vec<Step>) -> Result<Self, PathError> {
        validate_steps(&steps)?;
        Ok(Self {
            absolute: false,
            steps,
        })
    }

    /// Path addressing the context node itself
    #[inline]
    #[must_use]
    pub fn current() -> Self {
        Self::default()
    }

    /// Create a relative path of child names
    #[must_use]
    pub fn children<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            absolute: false,
            steps: names.into_iter().map(|n| Step::Child(n.into())).collect(),
        }
    }

    /// Get path steps
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Get number of steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if path has no steps
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check if path starts at the document rather than a context node
    #[inline]
    #[must_use]
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Trailing attribute name, if the path selects an attribute
    #[inline]
    #[must_use]
    pub fn attribute(&self) -> Option<&str> {
        match self.steps.last() {
            Some(Step::Attribute(name)) => Some(name),
            _ => None,
        }
    }

    /// Path without a trailing attribute step
    #[must_use]
    pub fn element_path(&self) -> Self {
        let mut steps = self.steps.clone();
        if matches!(steps.last(), Some(Step::Attribute(_))) {
            steps.pop();
        }
        Self {
            absolute: self.absolute,
            steps,
        }
    }

    /// True when every step is a plain child name
    ///
    /// Only simple paths can be used to create missing elements.
    #[inline]
    #[must_use]
    pub fn is_simple(&self) -> bool {
        !self.absolute && self.steps.iter().all(|s| matches!(s, Step::Child(_)))
    }

    /// Get parent path (if not empty)
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.steps.is_empty() {
            None
        } else {
            Some(Self {
                absolute: self.absolute,
                steps: self.steps[..self.steps.len() - 1].to_vec(),
            })
        }
    }

    /// Append a child step, returning new path
    #[inline]
    #[must_use]
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut new = self.element_path();
        new.steps.push(Step::Child(name.into()));
        new
    }

    /// Join another relative path onto this one
    ///
    /// # Errors
    /// Returns error if `other` is absolute or this path ends in an attribute
    pub fn join(&self, other: &Self) -> Result<Self, PathError> {
        if other.absolute {
            return Err(PathError::AbsoluteJoin(other.to_string()));
        }
        let mut steps = self.steps.clone();
        steps.extend(other.steps.iter().cloned());
        validate_steps(&steps)?;
        Ok(Self {
            absolute: self.absolute,
            steps,
        })
    }
}

impl Display for DomPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.absolute {
            f.write_str("/")?;
        } else if self.steps.is_empty() {
            return f.write_str(".");
        }
        let joined: Vec<String> = self.steps.iter().map(ToString::to_string).collect();
        f.write_str(&joined.join("/"))
    }
}

impl FromStr for DomPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (absolute, body) = match trimmed.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        if body.is_empty() {
            return if absolute {
                Err(PathError::EmptySegment)
            } else {
                Ok(Self::current())
            };
        }

        let steps = body
            .split('/')
            .map(parse_step)
            .collect::<Result<Vec<_>, _>>()?;
        validate_steps(&steps)?;

        Ok(Self { absolute, steps })
    }
}

impl TryFrom<&str> for DomPath {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

fn parse_step(seg: &str) -> Result<Step, PathError> {
    match seg {
        "" => Err(PathError::EmptySegment),
        "." => Ok(Step::Current),
        ".." => Ok(Step::Parent),
        _ => {
            if let Some(attr) = seg.strip_prefix('@') {
                check_name(attr)?;
                Ok(Step::Attribute(attr.to_string()))
            } else {
                check_name(seg)?;
                Ok(Step::Child(seg.to_string()))
            }
        }
    }
}

fn check_name(name: &str) -> Result<(), PathError> {
    let valid_start = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    let valid_rest = name
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(PathError::InvalidSegment(name.to_string()))
    }
}

fn validate_steps(steps: &[Step]) -> Result<(), PathError> {
    let last = steps.len().saturating_sub(1);
    for (i, step) in steps.iter().enumerate() {
        if let Step::Attribute(name) = step {
            if i != last {
                return Err(PathError::AttributeNotLast(name.clone()));
            }
        }
    }
    Ok(())
}

/// Errors related to document paths
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Empty segment in path
    #[error("path contains empty segment")]
    EmptySegment,

    /// Invalid segment characters
    #[error("invalid segment: {0} (must be an XML name)")]
    InvalidSegment(String),

    /// Attribute step followed by further steps
    #[error("attribute step '@{0}' must be the last step")]
    AttributeNotLast(String),

    /// Attempt to join an absolute path onto another
    #[error("cannot join absolute path '{0}'")]
    AbsoluteJoin(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_from_str_simple() {
        let path: DomPath = "engine/release".parse().unwrap();
        assert_eq!(
            path.steps(),
            &[Step::Child("engine".into()), Step::Child("release".into())]
        );
        assert!(path.is_simple());
        assert!(!path.is_absolute());
    }

    #[test]
    fn path_from_str_relative_steps() {
        let path: DomPath = "./../ID".parse().unwrap();
        assert_eq!(
            path.steps(),
            &[Step::Current, Step::Parent, Step::Child("ID".into())]
        );
        assert!(!path.is_simple());
    }

    #[test]
    fn path_from_str_absolute() {
        let path: DomPath = "/sys/module".parse().unwrap();
        assert!(path.is_absolute());
        assert_eq!(path.len(), 2);
        assert_eq!(path.to_string(), "/sys/module");
    }

    #[test]
    fn path_from_str_attribute() {
        let path: DomPath = "upload/@name".parse().unwrap();
        assert_eq!(path.attribute(), Some("name"));
        assert_eq!(path.element_path().to_string(), "upload");
    }

    #[test]
    fn path_attribute_must_be_last() {
        let result: Result<DomPath, _> = "@name/child".parse();
        assert!(matches!(result, Err(PathError::AttributeNotLast(_))));
    }

    #[test]
    fn path_from_str_empty_is_current() {
        let path: DomPath = "".parse().unwrap();
        assert!(path.is_empty());
        assert_eq!(path.to_string(), ".");
    }

    #[test]
    fn path_from_str_empty_segment() {
        let result: Result<DomPath, _> = "a//b".parse();
        assert!(matches!(result, Err(PathError::EmptySegment)));
    }

    #[test]
    fn path_from_str_invalid_chars() {
        let result: Result<DomPath, _> = "a/b c".parse();
        assert!(matches!(result, Err(PathError::InvalidSegment(_))));
    }

    #[test]
    fn path_allows_hyphens_and_prefixes() {
        let path: DomPath = "engine/build-tag".parse().unwrap();
        assert_eq!(path.to_string(), "engine/build-tag");
        let prefixed: DomPath = "fm:api".parse().unwrap();
        assert_eq!(prefixed.len(), 1);
    }

    #[test]
    fn path_parent_and_child() {
        let path: DomPath = "a/b/c".parse().unwrap();
        assert_eq!(path.parent().unwrap().to_string(), "a/b");
        assert_eq!(path.child("d").to_string(), "a/b/c/d");
        assert!(DomPath::current().parent().is_none());
    }

    #[test]
    fn path_join() {
        let base: DomPath = "a".parse().unwrap();
        let rel: DomPath = "../b".parse().unwrap();
        assert_eq!(base.join(&rel).unwrap().to_string(), "a/../b");

        let abs: DomPath = "/x".parse().unwrap();
        assert!(matches!(base.join(&abs), Err(PathError::AbsoluteJoin(_))));
    }

    #[test]
    fn path_children_constructor() {
        let path = DomPath::children(["request_info", "query_string"]);
        assert_eq!(path.to_string(), "request_info/query_string");
    }
}
