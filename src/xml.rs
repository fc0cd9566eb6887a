//! Minimal immutable XML tree built on `quick-xml`.

use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};

/// One parsed XML element.
///
/// `text` holds the character data directly inside the element (CDATA
/// included, entities unescaped) and is `None` when there is none.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub tag: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// First direct child with the given tag.
    pub fn find(&self, tag: &str) -> Option<&XmlNode> {
        self.children.iter().find(|child| child.tag == tag)
    }

    /// All direct children with the given tag, in document order.
    pub fn find_all<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |child| child.tag == tag)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// The document is not well-formed XML.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("malformed XML at byte {position}: {message}")]
pub struct XmlParseError {
    pub position: u64,
    pub message: String,
}

/// Parses a complete document and returns its root element.
pub fn parse_xml(input: &str) -> Result<XmlNode, XmlParseError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        let position = reader.buffer_position() as u64;
        let fail = |message: String| XmlParseError { position, message };

        match reader.read_event().map_err(|err| fail(err.to_string()))? {
            Event::Start(start) => stack.push(open_node(&start).map_err(fail)?),
            Event::Empty(start) => {
                let node = open_node(&start).map_err(fail)?;
                attach(&mut stack, &mut root, node).map_err(fail)?;
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| fail("unexpected closing tag".to_owned()))?;
                attach(&mut stack, &mut root, node).map_err(fail)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|err| fail(err.to_string()))?;
                push_text(&mut stack, &text).map_err(fail)?;
            }
            Event::CData(data) => {
                let text = std::str::from_utf8(&data).map_err(|err| fail(err.to_string()))?;
                push_text(&mut stack, text).map_err(fail)?;
            }
            Event::Eof => break,
            // declarations, comments, processing instructions, doctype
            _ => {}
        }
    }

    let position = reader.buffer_position() as u64;
    if let Some(open) = stack.last() {
        return Err(XmlParseError {
            position,
            message: format!("unclosed element <{}>", open.tag),
        });
    }
    root.ok_or(XmlParseError {
        position,
        message: "no root element".to_owned(),
    })
}

fn open_node(start: &BytesStart<'_>) -> Result<XmlNode, String> {
    let tag = std::str::from_utf8(start.name().as_ref())
        .map_err(|err| err.to_string())?
        .to_owned();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|err| err.to_string())?
            .to_owned();
        let value = attr.unescape_value().map_err(|err| err.to_string())?;
        attributes.push((key, value.into_owned()));
    }

    Ok(XmlNode {
        tag,
        attributes,
        text: None,
        children: Vec::new(),
    })
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) -> Result<(), String> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    if root.is_some() {
        return Err(format!("junk after document element: <{}>", node.tag));
    }
    *root = Some(node);
    Ok(())
}

fn push_text(stack: &mut [XmlNode], text: &str) -> Result<(), String> {
    match stack.last_mut() {
        Some(node) => {
            node.text.get_or_insert_with(String::new).push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err("text outside of the root element".to_owned()),
    }
}
