//! Tags are the named attributes carried by artifact identities, tag filters
//! are the predicates templates use to select them.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TemplateError;

/// Separates the name of a tag from its value in literals.
pub const TAG_VALUE_SEPARATOR: char = ':';

/// Separates the artifact name and its tags in literals.
pub const TAG_SEPARATOR: char = ',';

/// An immutable `(name, value)` pair attached to an artifact identity.
///
/// Both parts are trimmed and must not be blank. Two tags with the same name
/// and value are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag {
    name: String,
    value: String,
}

impl Tag {
    pub fn new(name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self, TemplateError> {
        let name = check_tag_name(name.as_ref())?;
        let value = value.as_ref().trim();

        if value.is_empty() {
            return Err(TemplateError::MissingValue(name.to_string()));
        }
        if value.contains(TAG_SEPARATOR) {
            return Err(TemplateError::InvalidCharacter(
                value.to_string(),
                TAG_SEPARATOR,
            ));
        }

        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    /// Parses a `name: value` literal.
    pub fn parse(literal: &str) -> Result<Self, TemplateError> {
        match literal.split_once(TAG_VALUE_SEPARATOR) {
            Some((name, _)) if name.trim().is_empty() => {
                Err(TemplateError::BlankTag(literal.to_string()))
            }
            Some((name, value)) => Tag::new(name, value),
            None => match literal.trim() {
                "" => Err(TemplateError::BlankTag(literal.to_string())),
                name => Err(TemplateError::MissingValue(name.to_string())),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} {}", self.name, TAG_VALUE_SEPARATOR, self.value)
    }
}

impl FromStr for Tag {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tag::parse(s)
    }
}

impl TryFrom<String> for Tag {
    type Error = TemplateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Tag::parse(&value)
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.to_string()
    }
}

/// A predicate over tags, keyed by tag name.
///
/// A filter never owns a tag, it only decides whether a tag carried by some
/// artifact is acceptable for the name it guards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagFilter {
    /// Accepts any value under the name, the value is inherited from
    /// whatever artifact gets matched.
    Any(String),
    /// Accepts only the given value under the name.
    Value(String, String),
}

impl TagFilter {
    pub fn any(name: impl AsRef<str>) -> Result<Self, TemplateError> {
        Ok(TagFilter::Any(check_tag_name(name.as_ref())?.to_string()))
    }

    pub fn value(name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self, TemplateError> {
        let tag = Tag::new(name, value)?;
        Ok(TagFilter::Value(tag.name, tag.value))
    }

    pub fn name(&self) -> &str {
        match self {
            TagFilter::Any(name) => name,
            TagFilter::Value(name, _) => name,
        }
    }

    pub fn matches(&self, tag: &Tag) -> bool {
        match self {
            TagFilter::Any(name) => tag.name == *name,
            TagFilter::Value(name, value) => tag.name == *name && tag.value == *value,
        }
    }

    /// Whether some tag could satisfy both filters at once.
    pub(crate) fn overlaps(&self, other: &TagFilter) -> bool {
        match (self, other) {
            (TagFilter::Value(a, x), TagFilter::Value(b, y)) => a == b && x == y,
            _ => self.name() == other.name(),
        }
    }
}

impl Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagFilter::Any(name) => write!(f, "{name}"),
            TagFilter::Value(name, value) => {
                write!(f, "{name}{TAG_VALUE_SEPARATOR} {{{value}}}")
            }
        }
    }
}

fn check_tag_name(raw: &str) -> Result<&str, TemplateError> {
    let name = raw.trim();

    if name.is_empty() {
        return Err(TemplateError::BlankTag(raw.to_string()));
    }
    for c in [TAG_SEPARATOR, TAG_VALUE_SEPARATOR] {
        if name.contains(c) {
            return Err(TemplateError::InvalidCharacter(name.to_string(), c));
        }
    }

    Ok(name)
}
