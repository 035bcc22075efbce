//! Concrete artifact identities and the patterns matching them.
//!
//! A [`TemplateValue`] names one concrete artifact, e.g. `X_train, country: DE`.
//! A [`Template`] describes a family of artifacts, e.g. `X_train, country`,
//! and is used both to select the inputs of a node and to produce its outputs.
//!
//! ## Literals
//!
//! Both are written as `name[, tagSpec]*`. For templates a bare `tagSpec`
//! declares a wildcard filter and `tag: value` a fixed tag. For values every
//! `tagSpec` must be a `tag: value` pair.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::TemplateError;
use crate::tag::{TAG_SEPARATOR, TAG_VALUE_SEPARATOR, Tag, TagFilter};

/// A concrete, fully qualified artifact identity.
///
/// No two tags share a name. Equality, ordering and hashing all go through
/// the canonical string, which is also the key under which the artifact is
/// looked up everywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TemplateValue {
    name: String,
    tags: BTreeMap<String, Tag>,
    canonical: String,
}

impl TemplateValue {
    pub fn new(
        name: impl AsRef<str>,
        tags: impl IntoIterator<Item = Tag>,
    ) -> Result<Self, TemplateError> {
        let name = check_name(name.as_ref())?.to_string();
        let mut map: BTreeMap<String, Tag> = BTreeMap::new();

        for tag in tags {
            match map.get(tag.name()) {
                Some(prev) if *prev == tag => {}
                Some(_) => {
                    return Err(TemplateError::DuplicateTag(tag.name().to_string(), name));
                }
                None => {
                    map.insert(tag.name().to_string(), tag);
                }
            }
        }

        let mut canonical = name.clone();
        for tag in map.values() {
            canonical.push(TAG_SEPARATOR);
            canonical.push(' ');
            canonical.push_str(&tag.to_string());
        }

        Ok(Self {
            name,
            tags: map,
            canonical,
        })
    }

    /// Parses a `name[, tag: value]*` literal.
    pub fn parse(literal: &str) -> Result<Self, TemplateError> {
        let mut parts = literal.split(TAG_SEPARATOR);
        let name = parts.next().unwrap_or_default();

        if name.trim().is_empty() {
            return Err(TemplateError::BlankName(literal.to_string()));
        }

        let tags = parts
            .map(|part| match part.trim() {
                "" => Err(TemplateError::BlankTag(literal.to_string())),
                _ => Tag::parse(part),
            })
            .collect::<Result<Vec<_>, _>>()?;

        TemplateValue::new(name, tags)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags in ascending name order.
    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.values()
    }

    pub fn tag(&self, name: &str) -> Option<&Tag> {
        self.tags.get(name)
    }

    /// The canonical string, `name` followed by the tags sorted by name.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }
}

impl PartialEq for TemplateValue {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for TemplateValue {}

impl Hash for TemplateValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for TemplateValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TemplateValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl FromStr for TemplateValue {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TemplateValue::parse(s)
    }
}

impl TryFrom<String> for TemplateValue {
    type Error = TemplateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TemplateValue::parse(&value)
    }
}

impl From<TemplateValue> for String {
    fn from(value: TemplateValue) -> Self {
        value.canonical
    }
}

/// A pattern over [`TemplateValue`]s.
///
/// * `name` has to be equal for a value to match.
/// * Filters select tags. When matching, every filter must be satisfied by
///   at least one tag of the value. When instantiating, every filter picks
///   the tag it carries over into the produced value.
/// * Fixed tags play no role in matching, they are stamped onto every value
///   the template produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    fixed: IndexMap<String, Tag>,
    filters: IndexMap<String, TagFilter>,
}

impl Template {
    pub fn new(name: impl AsRef<str>) -> Result<Self, TemplateError> {
        Ok(Self {
            name: check_name(name.as_ref())?.to_string(),
            fixed: IndexMap::new(),
            filters: IndexMap::new(),
        })
    }

    /// Adds a tag every produced value will carry.
    pub fn with_tag(mut self, tag: Tag) -> Result<Self, TemplateError> {
        if self.fixed.contains_key(tag.name()) || self.filters.contains_key(tag.name()) {
            return Err(TemplateError::DuplicateTag(
                tag.name().to_string(),
                self.to_string(),
            ));
        }

        self.fixed.insert(tag.name().to_string(), tag);
        Ok(self)
    }

    pub fn with_filter(mut self, filter: TagFilter) -> Result<Self, TemplateError> {
        if self.fixed.contains_key(filter.name()) || self.filters.contains_key(filter.name()) {
            return Err(TemplateError::DuplicateTag(
                filter.name().to_string(),
                self.to_string(),
            ));
        }

        self.filters.insert(filter.name().to_string(), filter);
        Ok(self)
    }

    /// Parses a `name[, tagSpec]*` literal, where `tagSpec` is either a bare
    /// tag name (wildcard filter) or `tag: value` (fixed tag).
    pub fn parse(literal: &str) -> Result<Self, TemplateError> {
        let mut parts = literal.split(TAG_SEPARATOR);
        let name = parts.next().unwrap_or_default();

        if name.trim().is_empty() {
            return Err(TemplateError::BlankName(literal.to_string()));
        }

        let mut template = Template::new(name)?;

        for part in parts {
            template = match part.trim() {
                "" => return Err(TemplateError::BlankTag(literal.to_string())),
                spec if spec.contains(TAG_VALUE_SEPARATOR) => {
                    template.with_tag(Tag::parse(spec)?)?
                }
                spec => template.with_filter(TagFilter::any(spec)?)?,
            };
        }

        Ok(template)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.fixed.values()
    }

    pub fn filters(&self) -> impl Iterator<Item = &TagFilter> {
        self.filters.values()
    }

    pub fn matches(&self, value: &TemplateValue) -> bool {
        value.name == self.name
            && self
                .filters
                .values()
                .all(|filter| value.tags().any(|tag| filter.matches(tag)))
    }

    /// Produces a value from the fixed tags plus, for every filter, the one
    /// candidate tag satisfying it.
    ///
    /// Returns `None` when a filter has no satisfying candidate, or when two
    /// different candidates compete for the same filter.
    pub fn instantiate<'a>(
        &self,
        candidates: impl IntoIterator<Item = &'a Tag>,
    ) -> Option<TemplateValue> {
        let candidates: Vec<&Tag> = candidates.into_iter().collect();
        let mut tags: Vec<Tag> = self.fixed.values().cloned().collect();

        for filter in self.filters.values() {
            let mut selected: Option<&Tag> = None;

            for &tag in candidates.iter().filter(|tag| filter.matches(tag)) {
                match selected {
                    None => selected = Some(tag),
                    Some(prev) if prev == tag => {}
                    Some(_) => return None,
                }
            }

            tags.push(selected?.clone());
        }

        TemplateValue::new(&self.name, tags).ok()
    }

    /// Instantiates the template once for every combination of the distinct
    /// tag values observed on `inputs` under the filtered names.
    pub fn expand(&self, inputs: &[TemplateValue]) -> Vec<TemplateValue> {
        let observed: Vec<Vec<&Tag>> = self
            .filters
            .keys()
            .map(|name| {
                let mut seen: Vec<&Tag> = Vec::new();
                for tag in inputs.iter().filter_map(|value| value.tag(name)) {
                    if !seen.contains(&tag) {
                        seen.push(tag);
                    }
                }
                seen
            })
            .collect();

        cartesian(&observed)
            .into_iter()
            .filter_map(|combination| self.instantiate(combination))
            .collect()
    }

    /// Whether some value produced by `self` could be matched by `input`.
    pub(crate) fn could_feed(&self, input: &Template) -> bool {
        self.name == input.name
            && input.filters.values().all(|filter| {
                self.fixed
                    .get(filter.name())
                    .is_some_and(|tag| filter.matches(tag))
                    || self
                        .filters
                        .get(filter.name())
                        .is_some_and(|own| own.overlaps(filter))
            })
    }
}

impl Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;

        for tag in self.fixed.values() {
            write!(f, "{TAG_SEPARATOR} {tag}")?;
        }
        for filter in self.filters.values() {
            write!(f, "{TAG_SEPARATOR} {filter}")?;
        }

        Ok(())
    }
}

impl FromStr for Template {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Template::parse(s)
    }
}

/// Every way of picking one item per axis, in axis order. No axes yield a
/// single empty combination, an empty axis yields none.
pub(crate) fn cartesian<T: Copy>(axes: &[Vec<T>]) -> Vec<Vec<T>> {
    axes.iter().fold(vec![Vec::new()], |acc, axis| {
        acc.iter()
            .flat_map(|prefix| {
                axis.iter().map(move |&item| {
                    let mut next = prefix.clone();
                    next.push(item);
                    next
                })
            })
            .collect()
    })
}

fn check_name(raw: &str) -> Result<&str, TemplateError> {
    let name = raw.trim();

    if name.is_empty() {
        return Err(TemplateError::BlankName(raw.to_string()));
    }
    if name.contains(TAG_SEPARATOR) {
        return Err(TemplateError::InvalidCharacter(
            name.to_string(),
            TAG_SEPARATOR,
        ));
    }

    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(literal: &str) -> TemplateValue {
        TemplateValue::parse(literal).unwrap()
    }

    fn template(literal: &str) -> Template {
        Template::parse(literal).unwrap()
    }

    fn tag(name: &str, value: &str) -> Tag {
        Tag::new(name, value).unwrap()
    }

    #[test]
    fn test_canonical_sorts_tags() {
        let a = value("res,  Model: modelA , Laplacian: opt");
        let b = TemplateValue::new(
            "res",
            [tag("Laplacian", "opt"), tag("Model", "modelA")],
        )
        .unwrap();

        assert_eq!(a.as_str(), "res, Laplacian: opt, Model: modelA");
        assert_eq!(a, b);
        assert_eq!(value(a.as_str()), a);
    }

    #[test]
    fn test_value_duplicate_tag() {
        assert_eq!(
            TemplateValue::parse("X, country: DE, country: IT"),
            Err(TemplateError::DuplicateTag("country".into(), "X".into()))
        );

        // identical tags collapse
        let x = value("X, country: DE, country: DE");
        assert_eq!(x.as_str(), "X, country: DE");
    }

    #[test]
    fn test_value_requires_tag_values() {
        assert!(matches!(
            TemplateValue::parse("X, country"),
            Err(TemplateError::MissingValue(_))
        ));
        assert!(matches!(
            TemplateValue::parse("X, country: DE,"),
            Err(TemplateError::BlankTag(_))
        ));
        assert_eq!(
            TemplateValue::parse(" , country: DE"),
            Err(TemplateError::BlankName(" , country: DE".into()))
        );
    }

    #[test]
    fn test_blank_name_reports_literal() {
        let err = Template::parse("  , id").unwrap_err();
        assert_eq!(err, TemplateError::BlankName("  , id".into()));
        assert_eq!(err.to_string(), "Blank name in '  , id'");

        assert_eq!(
            Template::new("   "),
            Err(TemplateError::BlankName("   ".into()))
        );
    }

    #[test]
    fn test_parse_template_literal() {
        let t = template(" L , method: ensemble,  id ");
        assert_eq!(t.name(), "L");
        assert_eq!(t.tags().collect::<Vec<_>>(), vec![&tag("method", "ensemble")]);
        assert_eq!(
            t.filters().collect::<Vec<_>>(),
            vec![&TagFilter::Any("id".into())]
        );
        assert_eq!(t.to_string(), "L, method: ensemble, id");
    }

    #[test]
    fn test_template_duplicate_tag() {
        assert!(matches!(
            Template::parse("L, method: a, method"),
            Err(TemplateError::DuplicateTag(name, _)) if name == "method"
        ));
        assert!(matches!(
            Template::parse("L, id, id"),
            Err(TemplateError::DuplicateTag(name, _)) if name == "id"
        ));
        assert!(matches!(
            Template::parse("L, method: a, method: b"),
            Err(TemplateError::DuplicateTag(..))
        ));
    }

    #[test]
    fn test_wildcard_matching() {
        let res = Template::new("res")
            .unwrap()
            .with_filter(TagFilter::any("Model").unwrap())
            .unwrap();

        assert!(res.matches(&TemplateValue::new("res", [tag("Model", "modelA")]).unwrap()));
        assert!(res.matches(&TemplateValue::new("res", [tag("Model", "modelB")]).unwrap()));
        assert!(!res.matches(&TemplateValue::new("other", [tag("Model", "modelA")]).unwrap()));
        assert!(!res.matches(&value("res, Laplacian: opt")));
    }

    #[test]
    fn test_matching_ignores_fixed_and_extra_tags() {
        let t = template("X, country: DE");
        assert!(t.matches(&value("X, country: IT")));
        assert!(t.matches(&value("X")));

        let t = template("X, country");
        assert!(t.matches(&value("X, country: IT, split: train")));
    }

    #[test]
    fn test_value_filter_matching() {
        let t = Template::new("L")
            .unwrap()
            .with_filter(TagFilter::value("method", "opt").unwrap())
            .unwrap();

        assert!(t.matches(&value("L, method: opt")));
        assert!(!t.matches(&value("L, method: identity")));
        assert_eq!(t.to_string(), "L, method: {opt}");
    }

    #[test]
    fn test_instantiate() {
        let t = template("model, kind: linear, id");

        let out = t.instantiate([&tag("id", "1"), &tag("other", "x")]).unwrap();
        assert_eq!(out.as_str(), "model, id: 1, kind: linear");

        // missing filter
        assert_eq!(t.instantiate([&tag("other", "x")]), None);

        // competing candidates for one filter
        assert_eq!(t.instantiate([&tag("id", "1"), &tag("id", "2")]), None);

        // same candidate twice is fine
        assert!(t.instantiate([&tag("id", "1"), &tag("id", "1")]).is_some());
    }

    #[test]
    fn test_instantiate_without_filters() {
        let t = template("y_test");
        let none: [&Tag; 0] = [];
        assert_eq!(t.instantiate(none), Some(value("y_test")));
    }

    #[test]
    fn test_expand_one_output_per_id() {
        let t = template("model, id");
        let inputs = vec![
            value("X_train, id: 1"),
            value("y_train, id: 1"),
            value("X_train, id: 2"),
            value("y_train, id: 2"),
        ];

        let outputs = t.expand(&inputs);
        assert_eq!(outputs, vec![value("model, id: 1"), value("model, id: 2")]);
    }

    #[test]
    fn test_expand_cartesian_product() {
        let t = template("res, Laplacian, Model");
        let inputs = vec![
            value("L, Laplacian: opt"),
            value("L, Laplacian: identity"),
            value("pred, Model: a"),
            value("pred, Model: b"),
        ];

        let outputs = t.expand(&inputs);
        assert_eq!(outputs.len(), 4);
        assert!(outputs.contains(&value("res, Laplacian: identity, Model: b")));
    }

    #[test]
    fn test_expand_unseen_filter_yields_nothing() {
        let t = template("model, id");
        assert!(t.expand(&[value("X_train, country: DE")]).is_empty());
    }

    #[test]
    fn test_could_feed() {
        let out = template("model, id");
        assert!(out.could_feed(&template("model, id")));
        assert!(out.could_feed(&template("model")));
        assert!(!out.could_feed(&template("model, country")));
        assert!(!out.could_feed(&template("pred, id")));

        let fixed = template("L, method: opt");
        assert!(fixed.could_feed(&template("L, method")));
        let wants_identity = Template::new("L")
            .unwrap()
            .with_filter(TagFilter::value("method", "identity").unwrap())
            .unwrap();
        assert!(!fixed.could_feed(&wants_identity));
    }

    #[test]
    fn test_cartesian() {
        assert_eq!(cartesian::<u8>(&[]), vec![Vec::<u8>::new()]);
        assert!(cartesian(&[vec![1], vec![]]).is_empty());
        assert_eq!(
            cartesian(&[vec![1, 2], vec![3]]),
            vec![vec![1, 3], vec![2, 3]]
        );
    }

    #[test]
    fn test_serde_uses_canonical_string() {
        let v = value("X, country: DE");
        assert_eq!(serde_json::to_string(&v).unwrap(), r#""X, country: DE""#);

        let back: TemplateValue = serde_json::from_str(r#""X ,country:DE""#).unwrap();
        assert_eq!(back, v);
    }
}
