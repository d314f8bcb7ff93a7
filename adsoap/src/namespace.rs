//! Namespace prefix correction for raw SOAP responses
//!
//! Some endpoints answer with the operation element bound to the API
//! namespace under one prefix (`namesp4:GetForecastListResponse
//! xmlns:namesp4="API"`) while the `xsi:type` / `SOAP-ENC:arrayType`
//! attributes below it reference the same types through another prefix
//! (`namesp2:ForecastStatusInfo`). Deserializers matching prefixes exactly
//! then fail to bind. [`fix_namespace`] rewrites those foreign prefixes to
//! the one actually bound to the API namespace, inside that subtree only.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::{Captures, Regex};
use std::collections::BTreeSet;
use std::ops::Range;
use tracing::{debug, warn};

/// Namespaces whose prefixes are never rewritten
const WELL_KNOWN_NAMESPACES: &[&str] = &[
    "http://www.w3.org/2001/XMLSchema",
    "http://www.w3.org/2001/XMLSchema-instance",
    "http://www.w3.org/1999/XMLSchema",
    "http://www.w3.org/1999/XMLSchema-instance",
    "http://schemas.xmlsoap.org/soap/encoding/",
    "http://schemas.xmlsoap.org/soap/envelope/",
    "http://www.w3.org/2003/05/soap-encoding",
    "http://www.w3.org/2003/05/soap-envelope",
    "http://www.w3.org/XML/1998/namespace",
];

/// Attributes carrying a prefixed type name, by local name
const TYPE_ATTRIBUTES: &[&[u8]] = &[b"type", b"arrayType"];

/// Préfixes déclarés sur un élément
type Bindings = Vec<(String, String)>;

struct Scopes {
    stack: Vec<Bindings>,
}

impl Scopes {
    fn resolve(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some("http://www.w3.org/XML/1998/namespace");
        }
        self.stack
            .iter()
            .rev()
            .flat_map(|b| b.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, ns)| ns.as_str())
    }
}

fn declared_bindings(e: &BytesStart) -> Bindings {
    let mut bindings = Vec::new();
    for attr in e.attributes().flatten() {
        let key = attr.key.as_ref();
        let value = String::from_utf8_lossy(&attr.value).into_owned();
        if key == b"xmlns" {
            bindings.push((String::new(), value));
        } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            bindings.push((String::from_utf8_lossy(prefix).into_owned(), value));
        }
    }
    bindings
}

fn element_prefix(e: &BytesStart) -> Option<String> {
    e.name()
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
}

fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Prefixes of the type references of `e` that are not bound to the
/// canonical prefix nor to a schema namespace
fn collect_foreign(e: &BytesStart, scopes: &Scopes, canonical: &str, found: &mut BTreeSet<String>) {
    for attr in e.attributes().flatten() {
        if !TYPE_ATTRIBUTES.contains(&attr.key.local_name().as_ref()) {
            continue;
        }
        let value = String::from_utf8_lossy(&attr.value);
        let Some((prefix, _)) = value.trim().split_once(':') else {
            continue;
        };
        if prefix == canonical || !is_ncname(prefix) {
            continue;
        }
        let foreign = match scopes.resolve(prefix) {
            Some(ns) => !WELL_KNOWN_NAMESPACES.contains(&ns),
            None => true,
        };
        if foreign {
            found.insert(prefix.to_string());
        }
    }
}

struct Target {
    prefix: String,
    /// Plages des balises (ouvrantes et fermantes) du sous-arbre
    tags: Vec<Range<usize>>,
    foreign: BTreeSet<String>,
}

/// Span of the tag ending at `end`
fn tag_span(xml: &str, end: usize) -> Range<usize> {
    // '<' cannot appear unescaped inside a tag
    xml[..end].rfind('<').unwrap_or(0)..end
}

fn locate(xml: &str, target_namespace: &str) -> quick_xml::Result<Option<Target>> {
    let mut reader = Reader::from_str(xml);
    let mut scopes = Scopes { stack: Vec::new() };

    let mut target: Option<Target> = None;
    // profondeur de l'élément cible dans la pile des portées
    let mut target_depth = 0usize;

    loop {
        let event = reader.read_event()?;
        let position = usize::try_from(reader.buffer_position()).unwrap_or(xml.len());

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                scopes.stack.push(declared_bindings(e));

                match target.as_mut() {
                    Some(t) => {
                        t.tags.push(tag_span(xml, position));
                        collect_foreign(e, &scopes, &t.prefix, &mut t.foreign);
                    }
                    None => {
                        let bound = element_prefix(e)
                            .filter(|p| scopes.resolve(p) == Some(target_namespace));
                        if let Some(prefix) = bound {
                            let mut t = Target {
                                prefix,
                                tags: vec![tag_span(xml, position)],
                                foreign: BTreeSet::new(),
                            };
                            collect_foreign(e, &scopes, &t.prefix, &mut t.foreign);
                            if is_empty {
                                return Ok(Some(t));
                            }
                            target_depth = scopes.stack.len();
                            target = Some(t);
                        }
                    }
                }

                if is_empty {
                    scopes.stack.pop();
                }
            }
            Event::End(_) => {
                let closes_target = target.is_some() && scopes.stack.len() == target_depth;
                if let Some(t) = target.as_mut() {
                    t.tags.push(tag_span(xml, position));
                }
                if closes_target {
                    return Ok(target);
                }
                scopes.stack.pop();
            }
            Event::Eof => return Ok(target),
            _ => {}
        }
    }
}

fn prefix_pattern(foreign: &str) -> Option<Regex> {
    let pattern = format!(r"(^|[^\w.\-:]){}:", regex::escape(foreign));
    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(prefix = %foreign, "Invalid prefix pattern: {}", e);
            None
        }
    }
}

/// Rewrites the prefixes aliasing `target_namespace` to the canonical one.
///
/// The canonical prefix is the prefix of the first element bound to
/// `target_namespace`. Inside that element, every prefix used by a
/// `type`/`arrayType` attribute value is taken as an alias of the canonical
/// one and replaced by `canonical:` in the tags of the subtree (element
/// names, attribute names and values). Text, CDATA and comments are kept
/// as is, as are namespace declarations and schema prefixes (`xsd:`,
/// `xsi:`, `SOAP-ENV:`, …).
///
/// A type prefix bound to some other application namespace is rewritten
/// too: servers such as SOAP::Lite bind the API types to their own
/// namespace (`namesp2="http://namespaces.soaplite.com/perl"`), so the
/// bound namespace cannot tell an alias from an unrelated vocabulary. Only
/// prefixes that never appear in a type reference stay untouched.
///
/// The input is returned unchanged when nothing needs fixing or when it
/// cannot be read as XML.
pub fn fix_namespace(xml: &str, target_namespace: &str) -> String {
    let target = match locate(xml, target_namespace) {
        Ok(Some(t)) if !t.foreign.is_empty() => t,
        Ok(_) => return xml.to_string(),
        Err(e) => {
            warn!(namespace = target_namespace, "Cannot scan response for prefixes: {}", e);
            return xml.to_string();
        }
    };

    let patterns: Vec<Regex> = target
        .foreign
        .iter()
        .filter_map(|foreign| prefix_pattern(foreign))
        .collect();

    let mut fixed = String::with_capacity(xml.len());
    let mut last = 0;
    for tag in &target.tags {
        fixed.push_str(&xml[last..tag.start]);
        let mut rewritten = xml[tag.clone()].to_string();
        for re in &patterns {
            rewritten = re
                .replace_all(&rewritten, |caps: &Captures| {
                    format!("{}{}:", &caps[1], target.prefix)
                })
                .into_owned();
        }
        fixed.push_str(&rewritten);
        last = tag.end;
    }
    fixed.push_str(&xml[last..]);

    debug!(foreign = ?target.foreign, to = %target.prefix, "Rewrote namespace prefixes");
    fixed
}
