//! Parsing of raw array fragments
//!
//! When the generic deserializer cannot bind an `ArrayOf*` field, the
//! transport hands back the raw XML of the element, e.g.
//!
//! ```xml
//! <NegativeKeywords><Items>free</Items><Items>bad reviews</Items></NegativeKeywords>
//! ```
//!
//! or `<NegativeKeywords xsi:nil="true"/>`. The functions below turn such a
//! fragment into `Some(items)` or `None` for nil.

use crate::errors::{AdSoapError, Result};
use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};

const ITEM_TAG: &[u8] = b"Items";
const NIL_ATTRIBUTE: &[u8] = b"nil";

/// Parses an `ArrayOfString` fragment
///
/// Item text is returned exactly as written (entities resolved, no trimming).
pub fn parse_array_of_string(xml: &str) -> Result<Option<Vec<String>>> {
    parse_items(xml, |text| Ok(text))
}

/// Parses an `ArrayOfInt` fragment
pub fn parse_array_of_int(xml: &str) -> Result<Option<Vec<i64>>> {
    parse_items(xml, |text| {
        text.trim()
            .parse::<i64>()
            .map_err(|_| AdSoapError::format(&text, "int"))
    })
}

/// Parses an `ArrayOfLong` fragment
///
/// The items are decoded as floating point numbers: callers historically
/// receive `123.5` untouched from these fields.
pub fn parse_array_of_long(xml: &str) -> Result<Option<Vec<f64>>> {
    parse_items(xml, |text| {
        text.trim()
            .parse::<f64>()
            .map_err(|_| AdSoapError::format(&text, "long"))
    })
}

fn is_nil(root: &BytesStart) -> Result<bool> {
    for attr in root.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == NIL_ATTRIBUTE {
            let value = attr.value.as_ref();
            return Ok(value == b"true" || value == b"1");
        }
    }
    Ok(false)
}

fn parse_items<T, F>(xml: &str, decode: F) -> Result<Option<Vec<T>>>
where
    F: Fn(String) -> Result<T>,
{
    let mut reader = Reader::from_str(xml);

    // Textes bruts des Items, décodés seulement après le test nil
    let mut texts: Vec<String> = Vec::new();
    let mut current: Option<String> = None;
    let mut depth = 0usize;
    let mut seen_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if depth == 0 {
                    if seen_root {
                        break;
                    }
                    seen_root = true;
                    if is_nil(&e)? {
                        return Ok(None);
                    }
                } else if depth == 1 && e.local_name().as_ref() == ITEM_TAG {
                    current = Some(String::new());
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 0 {
                    // <Root/> : nil ou tableau vide
                    return if is_nil(&e)? { Ok(None) } else { Ok(Some(Vec::new())) };
                } else if depth == 1 && e.local_name().as_ref() == ITEM_TAG {
                    texts.push(String::new());
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    if let Some(text) = current.take() {
                        texts.push(text);
                    }
                } else if depth == 0 {
                    break;
                }
            }
            Event::Text(e) => {
                if let Some(buf) = current.as_mut() {
                    let text = e.decode().map_err(quick_xml::Error::from)?;
                    buf.push_str(&text);
                }
            }
            Event::CData(e) => {
                if let Some(buf) = current.as_mut() {
                    let text = e.decode().map_err(quick_xml::Error::from)?;
                    buf.push_str(&text);
                }
            }
            Event::GeneralRef(e) => {
                if let Some(buf) = current.as_mut() {
                    if let Some(ch) = e.resolve_char_ref()? {
                        buf.push(ch);
                    } else {
                        let name = e.decode().map_err(quick_xml::Error::from)?;
                        match resolve_predefined_entity(&name) {
                            Some(resolved) => buf.push_str(resolved),
                            // entité inconnue : on la restitue telle quelle
                            None => {
                                buf.push('&');
                                buf.push_str(&name);
                                buf.push(';');
                            }
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Ok(Some(Vec::new()));
    }

    texts.into_iter().map(decode).collect::<Result<Vec<T>>>().map(Some)
}
