//! Byte-span index of an XML document.
//!
//! The editor never re-serializes a descriptor; it locates elements with this
//! index and splices replacement text into the original bytes.

use crate::{Result, TreeError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Clone, Debug)]
pub(crate) struct Element {
    pub name: String,
    /// Offset of the `<` of the start tag
    pub start: usize,
    /// Offset just past the start tag
    pub content_start: usize,
    /// Offset of the `<` of the end tag
    pub content_end: usize,
    /// Offset just past the end tag
    pub end: usize,
    pub self_closing: bool,
    pub children: Vec<usize>,
    /// Spans of comments directly inside this element, including `<!--` and `-->`
    pub comments: Vec<(usize, usize)>,
}

impl Element {
    fn open(tag: &BytesStart<'_>, start: usize, after: usize, self_closing: bool) -> Self {
        Self {
            name: String::from_utf8_lossy(tag.local_name().as_ref()).into_owned(),
            start,
            content_start: after,
            content_end: after,
            end: after,
            self_closing,
            children: Vec::new(),
            comments: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct XmlIndex {
    pub elements: Vec<Element>,
    pub root: usize,
}

impl XmlIndex {
    pub fn parse(path: &str, content: &str) -> Result<Self> {
        let mut reader = Reader::from_str(content);
        reader.trim_text(false);

        let mut elements: Vec<Element> = Vec::new();
        let mut stack: Vec<usize> = Vec::new();
        let mut root = None;

        loop {
            let event = reader.read_event().map_err(|e| TreeError::Xml {
                path: path.to_string(),
                message: format!("at byte {}: {}", reader.buffer_position(), e),
            })?;
            // Offsets are recovered backwards from the end of each event since
            // the reader may already have consumed the opening `<`.
            let after = reader.buffer_position();
            let tag_start = || content[..after].rfind('<').unwrap_or(0);
            match event {
                Event::Start(e) => {
                    let index = elements.len();
                    elements.push(Element::open(&e, tag_start(), after, false));
                    attach(&mut elements, &stack, index, &mut root);
                    stack.push(index);
                }
                Event::Empty(e) => {
                    let index = elements.len();
                    elements.push(Element::open(&e, tag_start(), after, true));
                    attach(&mut elements, &stack, index, &mut root);
                }
                Event::End(_) => {
                    if let Some(index) = stack.pop() {
                        elements[index].content_end = tag_start();
                        elements[index].end = after;
                    }
                }
                Event::Comment(_) => {
                    if let Some(&parent) = stack.last() {
                        let start = content[..after].rfind("<!--").unwrap_or(0);
                        elements[parent].comments.push((start, after));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let root = root.ok_or_else(|| TreeError::Xml {
            path: path.to_string(),
            message: "document has no root element".to_string(),
        })?;
        Ok(Self { elements, root })
    }

    pub fn get(&self, index: usize) -> &Element {
        &self.elements[index]
    }

    /// First direct child named `name`
    pub fn child(&self, parent: usize, name: &str) -> Option<usize> {
        self.elements[parent]
            .children
            .iter()
            .copied()
            .find(|&c| self.elements[c].name == name)
    }

    /// All direct children named `name`, in document order
    pub fn children_named<'a>(
        &'a self,
        parent: usize,
        name: &'a str,
    ) -> impl Iterator<Item = usize> + 'a {
        self.elements[parent]
            .children
            .iter()
            .copied()
            .filter(move |&c| self.elements[c].name == name)
    }

    /// Follow a path of child names starting below `from`
    pub fn descend(&self, from: usize, names: &[&str]) -> Option<usize> {
        names
            .iter()
            .try_fold(from, |current, name| self.child(current, name))
    }

    /// Trimmed text content of an element
    pub fn text<'c>(&self, content: &'c str, index: usize) -> &'c str {
        let e = &self.elements[index];
        content[e.content_start..e.content_end].trim()
    }

    /// Text content of the direct child `name`, if any
    pub fn child_text<'c>(&self, content: &'c str, parent: usize, name: &str) -> Option<&'c str> {
        self.child(parent, name).map(|c| self.text(content, c))
    }

    /// End offset of the last child element or comment, if any
    pub fn last_child_end(&self, parent: usize) -> Option<usize> {
        let e = &self.elements[parent];
        let elements = e.children.iter().map(|&c| self.elements[c].end);
        let comments = e.comments.iter().map(|&(_, end)| end);
        elements.chain(comments).max()
    }
}

fn attach(elements: &mut [Element], stack: &[usize], index: usize, root: &mut Option<usize>) {
    match stack.last() {
        Some(&parent) => elements[parent].children.push(index),
        None => {
            if root.is_none() {
                *root = Some(index);
            }
        }
    }
}

/// Whitespace preceding `offset` on its line, or `None` if the line has other text
pub(crate) fn indent_at(content: &str, offset: usize) -> Option<&str> {
    let line_start = content[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let prefix = &content[line_start..offset];
    if prefix.chars().all(|c| c == ' ' || c == '\t') {
        Some(prefix)
    } else {
        None
    }
}
