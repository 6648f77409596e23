use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XmlEvent {
    Decl {
        version: String,
        encoding: Option<String>,
        standalone: Option<String>,
    },
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text {
        text: String,
    },
    CData {
        text: String,
    },
    Comment {
        text: String,
    },
    PI {
        content: String,
    },
    DocType {
        text: String,
    },
}

impl XmlEvent {
    pub fn empty(name: &str, attrs: &[(&str, &str)]) -> Self {
        XmlEvent::Empty {
            name: name.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn start(name: &str) -> Self {
        XmlEvent::Start {
            name: name.to_string(),
            attrs: Vec::new(),
        }
    }

    pub fn end(name: &str) -> Self {
        XmlEvent::End {
            name: name.to_string(),
        }
    }

    /// Element name for `Start`/`Empty`.
    pub fn element_name(&self) -> Option<&str> {
        match self {
            XmlEvent::Start { name, .. } | XmlEvent::Empty { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn is_element(&self, name: &str) -> bool {
        self.element_name() == Some(name)
    }

    pub fn attrs(&self) -> &[(String, String)] {
        match self {
            XmlEvent::Start { attrs, .. } | XmlEvent::Empty { attrs, .. } => attrs,
            _ => &[],
        }
    }
}

#[derive(Clone, Debug)]
pub struct XmlPart {
    pub name: String,
    pub events: Vec<XmlEvent>,
}

/// Raw (still escaped) attribute value.
pub fn find_attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Unescaped attribute value.
pub fn attr_text(attrs: &[(String, String)], key: &str) -> Option<String> {
    let raw = find_attr(attrs, key)?;
    Some(
        quick_xml::escape::unescape(raw)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| raw.to_string()),
    )
}

pub fn parse_xml_part(name: &str, xml_bytes: &[u8]) -> Result<XmlPart> {
    let mut reader = Reader::from_reader(xml_bytes);
    reader.config_mut().trim_text(false);

    let mut events: Vec<XmlEvent> = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let ev = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::parse(name, format!("at byte {}: {e}", reader.buffer_position())))?;
        match ev {
            Event::Eof => break,
            Event::Decl(d) => {
                let version = bytes_to_string(d.version().map_err(|e| Error::parse(name, e))?);
                let encoding = d
                    .encoding()
                    .map(|r| r.map(bytes_to_string))
                    .transpose()
                    .unwrap_or(None);
                let standalone = d
                    .standalone()
                    .map(|r| r.map(bytes_to_string))
                    .transpose()
                    .unwrap_or(None);
                events.push(XmlEvent::Decl {
                    version,
                    encoding,
                    standalone,
                });
            }
            Event::Start(s) => {
                events.push(XmlEvent::Start {
                    name: bytes_to_string(s.name().as_ref()),
                    attrs: collect_attrs(&s)?,
                });
            }
            Event::End(e) => {
                events.push(XmlEvent::End {
                    name: bytes_to_string(e.name().as_ref()),
                });
            }
            Event::Empty(s) => {
                events.push(XmlEvent::Empty {
                    name: bytes_to_string(s.name().as_ref()),
                    attrs: collect_attrs(&s)?,
                });
            }
            Event::Text(t) => {
                let txt = t.unescape().map_err(|e| Error::parse(name, e))?.into_owned();
                events.push(XmlEvent::Text { text: txt });
            }
            Event::CData(t) => {
                events.push(XmlEvent::CData {
                    text: bytes_to_string(t.into_inner()),
                });
            }
            Event::Comment(t) => {
                events.push(XmlEvent::Comment {
                    text: bytes_to_string(t.into_inner()),
                });
            }
            Event::PI(t) => {
                let target = bytes_to_string(t.target());
                let content = bytes_to_string(t.content());
                events.push(XmlEvent::PI {
                    content: format!("{target}{content}"),
                });
            }
            Event::DocType(t) => {
                events.push(XmlEvent::DocType {
                    text: bytes_to_string(t.into_inner()),
                });
            }
        }
    }

    Ok(XmlPart {
        name: name.to_string(),
        events,
    })
}

fn collect_attrs(s: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    for a in s.attributes() {
        let a = a?;
        // Raw bytes keep character references such as `&#xD;` intact on write-back.
        attrs.push((
            bytes_to_string(a.key.as_ref()),
            bytes_to_string(a.value.as_ref()),
        ));
    }
    Ok(attrs)
}

fn bytes_to_string(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

pub fn write_xml_part(part: &XmlPart) -> Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::new();

    fn escape_text_into(out: &mut Vec<u8>, text: &str) {
        for ch in text.chars() {
            match ch {
                '&' => out.extend_from_slice(b"&amp;"),
                '<' => out.extend_from_slice(b"&lt;"),
                '>' => out.extend_from_slice(b"&gt;"),
                _ => {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
    }

    fn write_start_like(out: &mut Vec<u8>, name: &str, attrs: &[(String, String)], empty: bool) {
        out.extend_from_slice(b"<");
        out.extend_from_slice(name.as_bytes());
        // Attribute values are stored already escaped.
        for (k, v) in attrs {
            out.extend_from_slice(b" ");
            out.extend_from_slice(k.as_bytes());
            out.extend_from_slice(b"=\"");
            out.extend_from_slice(v.as_bytes());
            out.extend_from_slice(b"\"");
        }
        if empty {
            out.extend_from_slice(b"/>");
        } else {
            out.extend_from_slice(b">");
        }
    }

    for ev in &part.events {
        match ev {
            XmlEvent::Decl {
                version,
                encoding,
                standalone,
            } => {
                let d =
                    BytesDecl::new(version.as_str(), encoding.as_deref(), standalone.as_deref());
                let mut writer = quick_xml::Writer::new(Vec::new());
                writer
                    .write_event(Event::Decl(d))
                    .map_err(|e| Error::parse(&part.name, e))?;
                out.extend_from_slice(&writer.into_inner());
            }
            XmlEvent::Start { name, attrs } => {
                write_start_like(&mut out, name, attrs, false);
            }
            XmlEvent::End { name } => {
                out.extend_from_slice(b"</");
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(b">");
            }
            XmlEvent::Empty { name, attrs } => {
                write_start_like(&mut out, name, attrs, true);
            }
            XmlEvent::Text { text } => {
                escape_text_into(&mut out, text);
            }
            XmlEvent::CData { text } => {
                out.extend_from_slice(b"<![CDATA[");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"]]>");
            }
            XmlEvent::Comment { text } => {
                out.extend_from_slice(b"<!--");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"-->");
            }
            XmlEvent::PI { content } => {
                out.extend_from_slice(b"<?");
                out.extend_from_slice(content.as_bytes());
                out.extend_from_slice(b"?>");
            }
            XmlEvent::DocType { text } => {
                out.extend_from_slice(b"<!DOCTYPE");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b">");
            }
        }
    }

    Ok(out)
}
