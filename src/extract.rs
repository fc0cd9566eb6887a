//! Helpers reading scalar and list fields off a parsed [`XmlNode`].
//!
//! All three functions share the same contract:
//!
//! - a missing `node` or an empty `child` name returns `Ok(None)` without
//!   looking at the defaults;
//! - a missing child element or missing value yields `options.default`;
//! - a failing `convert` yields `options.default` when `options.quiet` is
//!   set, and propagates the converter's error otherwise.

use std::convert::Infallible;

use crate::XmlNode;

/// Lookup options shared by [`attr_of`], [`attr_list_of`] and [`text_of`].
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractOptions<'a, T> {
    /// Attribute to read. Ignored by [`text_of`].
    pub attribute: &'a str,
    pub default: Option<T>,
    pub quiet: bool,
}

impl<T> Default for ExtractOptions<'_, T> {
    fn default() -> Self {
        Self {
            attribute: "value",
            default: None,
            quiet: false,
        }
    }
}

impl<'a, T> ExtractOptions<'a, T> {
    pub fn attribute(mut self, attribute: &'a str) -> Self {
        self.attribute = attribute;
        self
    }

    pub fn default_value(mut self, default: T) -> Self {
        self.default = Some(default);
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

/// Identity converter for fields read as plain strings.
pub fn as_string(value: &str) -> Result<String, Infallible> {
    Ok(value.to_owned())
}

/// Reads `attribute` of the first `child` element of `node`.
///
/// For `<node><child value="THIS"/></node>` this returns `"THIS"`.
pub fn attr_of<T, E, F>(
    node: Option<&XmlNode>,
    child: &str,
    convert: F,
    options: ExtractOptions<'_, T>,
) -> Result<Option<T>, E>
where
    T: Clone,
    F: Fn(&str) -> Result<T, E>,
{
    let Some(node) = node.filter(|_| !child.is_empty()) else {
        return Ok(None);
    };
    let raw = node.find(child).and_then(|el| el.attr(options.attribute));
    convert_or_default(raw, &convert, &options)
}

/// Reads `attribute` from every `child` element of `node`, in document order.
///
/// Elements missing the attribute contribute `options.default`.
pub fn attr_list_of<T, E, F>(
    node: Option<&XmlNode>,
    child: &str,
    convert: F,
    options: ExtractOptions<'_, T>,
) -> Result<Option<Vec<Option<T>>>, E>
where
    T: Clone,
    F: Fn(&str) -> Result<T, E>,
{
    let Some(node) = node.filter(|_| !child.is_empty()) else {
        return Ok(None);
    };
    node.find_all(child)
        .map(|el| convert_or_default(el.attr(options.attribute), &convert, &options))
        .collect::<Result<Vec<_>, E>>()
        .map(Some)
}

/// Reads the text of the first `child` element of `node`.
pub fn text_of<T, E, F>(
    node: Option<&XmlNode>,
    child: &str,
    convert: F,
    options: ExtractOptions<'_, T>,
) -> Result<Option<T>, E>
where
    T: Clone,
    F: Fn(&str) -> Result<T, E>,
{
    let Some(node) = node.filter(|_| !child.is_empty()) else {
        return Ok(None);
    };
    let raw = node.find(child).and_then(XmlNode::text);
    convert_or_default(raw, &convert, &options)
}

fn convert_or_default<T, E, F>(
    raw: Option<&str>,
    convert: &F,
    options: &ExtractOptions<'_, T>,
) -> Result<Option<T>, E>
where
    T: Clone,
    F: Fn(&str) -> Result<T, E>,
{
    match raw {
        None => Ok(options.default.clone()),
        Some(raw) => match convert(raw) {
            Ok(value) => Ok(Some(value)),
            Err(_) if options.quiet => Ok(options.default.clone()),
            Err(err) => Err(err),
        },
    }
}
