use std::{collections::BTreeMap, fmt};

use crate::{
    extract::{as_string, attr_of, text_of, ExtractOptions},
    BggError, Record, Result, Value, XmlNode,
};

const ITEMS: &str = "items";

/// A user's collection: an ordered list of raw item records plus metadata
/// such as the owner.
///
/// The raw items stay as plain maps; [`Collection::iter`] wraps each one in
/// a fresh [`Record`] on the fly.
#[derive(Clone, Debug, PartialEq)]
pub struct Collection {
    record: Record,
}

impl Collection {
    /// Builds a collection from a field map.
    ///
    /// A missing `items` entry is treated as an empty list. Every item must
    /// itself be a map.
    pub fn new(mut data: BTreeMap<String, Value>) -> Result<Self> {
        let items = data
            .entry(ITEMS.to_owned())
            .or_insert_with(|| Value::List(Vec::new()));
        match items {
            Value::List(items) => {
                if let Some(index) = items.iter().position(|item| !matches!(item, Value::Map(_))) {
                    return Err(BggError::InvalidData(format!(
                        "collection item {index} is not a record"
                    )));
                }
            }
            _ => {
                return Err(BggError::InvalidData(
                    "collection items must be a list".to_owned(),
                ))
            }
        }
        Ok(Self {
            record: Record::new(data),
        })
    }

    /// Builds a collection from an `<items>` API document.
    pub fn from_xml(root: &XmlNode, owner: impl Into<String>) -> Result<Self> {
        let mut collection = Self::new(BTreeMap::from([(
            "owner".to_owned(),
            Value::Text(owner.into()),
        )]))?;
        for item in root.find_all("item") {
            collection.append(parse_item(item)?);
        }
        Ok(collection)
    }

    pub fn owner(&self) -> Option<&str> {
        self.record.get_str("owner")
    }

    /// Metadata and items as one read-only record.
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// The raw item maps, in insertion order.
    pub fn items(&self) -> &[Value] {
        self.record.get_list(ITEMS).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    /// Same as [`Collection::len`].
    pub fn size(&self) -> usize {
        self.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends one raw item record.
    pub fn append(&mut self, item: BTreeMap<String, Value>) {
        match self.record.data_mut().get_mut(ITEMS) {
            Some(Value::List(items)) => items.push(Value::Map(item)),
            // `new` guarantees the list exists
            _ => {
                self.record
                    .data_mut()
                    .insert(ITEMS.to_owned(), Value::List(vec![Value::Map(item)]));
            }
        }
    }

    /// Starts a new pass over the items from the first one.
    ///
    /// Each call returns an independent iterator; nothing is shared between
    /// passes.
    pub fn iter(&self) -> CollectionIter<'_> {
        CollectionIter {
            items: self.items().iter(),
        }
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = Record;
    type IntoIter = CollectionIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}'s collection, {} items",
            self.owner().unwrap_or("<unknown>"),
            self.len()
        )
    }
}

/// Iterator over a [`Collection`], yielding one new [`Record`] per item.
#[derive(Clone, Debug)]
pub struct CollectionIter<'a> {
    items: std::slice::Iter<'a, Value>,
}

impl Iterator for CollectionIter<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.items.by_ref().find_map(|item| match item {
            Value::Map(fields) => Some(Record::new(fields.clone())),
            _ => None,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.items.len()))
    }
}

fn parse_item(item: &XmlNode) -> Result<BTreeMap<String, Value>> {
    let id = item
        .attr("objectid")
        .ok_or_else(|| BggError::InvalidData("collection item without objectid".to_owned()))?
        .parse::<i64>()
        .map_err(|err| BggError::InvalidData(format!("invalid objectid: {err}")))?;

    let name = text_of(Some(item), "name", as_string, ExtractOptions::default())
        .unwrap_or_else(|never| match never {});
    let year = text_of(
        Some(item),
        "yearpublished",
        |v| v.trim().parse::<i64>(),
        ExtractOptions::default().quiet(),
    )
    .unwrap_or_default();
    let plays = text_of(
        Some(item),
        "numplays",
        |v| v.trim().parse::<i64>(),
        ExtractOptions::default().default_value(0).quiet(),
    )
    .unwrap_or_default();
    let own = attr_of(
        Some(item),
        "status",
        |v| v.parse::<i64>().map(|flag| flag != 0),
        ExtractOptions::default()
            .attribute("own")
            .default_value(false)
            .quiet(),
    )
    .unwrap_or_default();

    Ok(BTreeMap::from([
        ("id".to_owned(), Value::Integer(id)),
        ("name".to_owned(), Value::from(name)),
        ("yearpublished".to_owned(), Value::from(year)),
        ("numplays".to_owned(), Value::from(plays)),
        ("own".to_owned(), Value::from(own)),
    ]))
}
