//! XML text conversion using quick-xml
//!
//! Whitespace-only text is dropped on parse; comments, processing
//! instructions and doctype declarations are ignored.

use crate::document::{Document, NodeId};
use crate::error::{DomError, DomResult};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fmt::Display;
use std::io::Cursor;

impl Document {
    /// Parse XML text into a document
    ///
    /// # Errors
    /// `DomError::Malformed` for invalid XML, an empty input, an element left
    /// open at the end of input, or more than one root element
    pub fn parse_str(xml: &str) -> DomResult<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut doc: Option<Document> = None;
        let mut open: Vec<NodeId> = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let id = open_element(&mut doc, &open, &e)?;
                    open.push(id);
                }
                Ok(Event::Empty(e)) => {
                    open_element(&mut doc, &open, &e)?;
                }
                Ok(Event::End(_)) => {
                    open.pop();
                }
                Ok(Event::Text(t)) => {
                    if let (Some(d), Some(&top)) = (doc.as_mut(), open.last()) {
                        let text = t.unescape().map_err(malformed)?;
                        d.append_text(top, &text);
                    }
                }
                Ok(Event::CData(c)) => {
                    if let (Some(d), Some(&top)) = (doc.as_mut(), open.last()) {
                        let raw = c.into_inner();
                        d.append_text(top, &String::from_utf8_lossy(&raw));
                    }
                }
                Ok(Event::Eof) => {
                    if let (Some(d), Some(&top)) = (doc.as_ref(), open.last()) {
                        return Err(DomError::Malformed(format!(
                            "unclosed element <{}>",
                            d.name(top)
                        )));
                    }
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(DomError::Malformed(format!(
                        "at position {}: {e}",
                        reader.buffer_position()
                    )))
                }
            }
        }

        doc.ok_or_else(|| DomError::Malformed("document has no root element".to_string()))
    }

    /// Serialise the attached tree to XML text
    ///
    /// # Errors
    /// `DomError::Malformed` if the writer fails
    pub fn to_xml_string(&self) -> DomResult<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        self.write_element(&mut writer, self.root())?;
        String::from_utf8(writer.into_inner().into_inner()).map_err(malformed)
    }

    fn write_element<W: std::io::Write>(
        &self,
        writer: &mut Writer<W>,
        node: NodeId,
    ) -> DomResult<()> {
        let name = self.name(node);
        let mut start = BytesStart::new(name);
        for (key, value) in self.attributes(node) {
            start.push_attribute((key, value));
        }

        let text = self.text(node);
        let children = self.children(node);
        if text.is_empty() && children.is_empty() {
            return writer.write_event(Event::Empty(start)).map_err(malformed);
        }

        writer.write_event(Event::Start(start)).map_err(malformed)?;
        if !text.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(malformed)?;
        }
        for child in children {
            self.write_element(writer, *child)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(malformed)
    }
}

fn open_element(
    doc: &mut Option<Document>,
    open: &[NodeId],
    start: &BytesStart<'_>,
) -> DomResult<NodeId> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();

    let id = match doc {
        Some(existing) => {
            let Some(&parent) = open.last() else {
                return Err(DomError::Malformed(format!(
                    "second root element <{name}>"
                )));
            };
            existing.add_element(parent, name)
        }
        None => {
            let created = Document::new(name);
            let root = created.root();
            *doc = Some(created);
            root
        }
    };
    let Some(d) = doc.as_mut() else {
        return Err(DomError::Malformed("element outside document".to_string()));
    };

    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(malformed)?.into_owned();
        d.set_attribute(id, key, value);
    }

    Ok(id)
}

fn malformed(e: impl Display) -> DomError {
    DomError::Malformed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_nested_elements_and_attributes() {
        let doc = Document::parse_str(
            r#"<module name="orders" title="Orders">
                 <header application-title="Shop"/>
                 <state-list><state name="list"/><state name="edit"/></state-list>
               </module>"#,
        )
        .unwrap();

        let root = doc.root();
        assert_eq!(doc.name(root), "module");
        assert_eq!(doc.attribute(root, "name"), Some("orders"));
        assert_eq!(doc.count_at("state-list/state"), 2);
        assert_eq!(doc.text_at("header/@application-title").as_deref(), Some("Shop"));
    }

    #[test]
    fn parse_text_and_cdata() {
        let doc = Document::parse_str(
            "<q><select><![CDATA[SELECT a FROM t WHERE x < :x]]></select><n>a &amp; b</n></q>",
        )
        .unwrap();
        assert_eq!(
            doc.text_at("select").as_deref(),
            Some("SELECT a FROM t WHERE x < :x")
        );
        assert_eq!(doc.text_at("n").as_deref(), Some("a & b"));
    }

    #[test]
    fn parse_rejects_empty_input() {
        assert!(matches!(
            Document::parse_str("   "),
            Err(DomError::Malformed(_))
        ));
    }

    #[test]
    fn parse_rejects_mismatched_tags() {
        assert!(Document::parse_str("<a><b></a>").is_err());
    }

    #[test]
    fn serialise_round_trips_structure() {
        let mut doc = Document::new("sys");
        let root = doc.root();
        let engine = doc.add_element(root, "engine");
        doc.add_element_with_text(engine, "release", "1 < 2");
        doc.set_attribute(engine, "kind", "main");
        doc.add_element(root, "empty");

        let xml = doc.to_xml_string().unwrap();
        assert_eq!(
            xml,
            r#"<sys><engine kind="main"><release>1 &lt; 2</release></engine><empty/></sys>"#
        );

        let reparsed = Document::parse_str(&xml).unwrap();
        assert_eq!(reparsed.text_at("engine/release").as_deref(), Some("1 < 2"));
    }
}
