//! XML text to [`DecodedNode`].
//!
//! Schema-less: element attributes are stored under the attribute marker,
//! element text under the text key, and repeated child elements become lists.
//! Text is typed on sight (integers, floats, booleans) and whitespace
//! separated numbers become a list of scalars. Nothing is validated.
use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{DecodedNode, Markers, Scalar};

struct Element {
    name: String,
    entries: IndexMap<String, Vec<DecodedNode>>,
    text: String,
}

impl Element {
    fn open(start: &BytesStart<'_>, markers: &Markers) -> Result<Self> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).to_string();
        let mut entries: IndexMap<String, Vec<DecodedNode>> = IndexMap::new();
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = format!("{}{}", markers.attribute, String::from_utf8_lossy(attr.key.as_ref()));
            let value = attr.unescape_value()?;
            entries
                .entry(key)
                .or_default()
                .push(DecodedNode::Scalar(Scalar::parse_text(&value)));
        }
        Ok(Self {
            name,
            entries,
            text: String::new(),
        })
    }

    fn close(self, markers: &Markers) -> DecodedNode {
        if self.entries.is_empty() {
            return typed_text(&self.text);
        }
        let mut map: IndexMap<String, DecodedNode> = self
            .entries
            .into_iter()
            .map(|(key, mut values)| {
                let value = if values.len() == 1 {
                    values.remove(0)
                } else {
                    DecodedNode::List(values)
                };
                (key, value)
            })
            .collect();
        if !self.text.trim().is_empty() {
            map.insert(markers.text.clone(), typed_text(&self.text));
        }
        DecodedNode::Map(map)
    }
}

/// A scalar, or a list when the text is several whitespace separated numbers
fn typed_text(text: &str) -> DecodedNode {
    let text = text.trim();
    let tokens: Vec<Scalar> = text.split_whitespace().map(Scalar::parse_text).collect();
    if tokens.len() > 1 && tokens.iter().all(|t| matches!(t, Scalar::Int(_) | Scalar::Float(_))) {
        return DecodedNode::List(tokens.into_iter().map(DecodedNode::Scalar).collect());
    }
    DecodedNode::Scalar(Scalar::parse_text(text))
}

/// Decode a document; the result is the content of the document element
pub fn decode_xml(bytes: &[u8], markers: &Markers) -> Result<DecodedNode> {
    decode_xml_document(bytes, markers).map(|(_, node)| node)
}

/// Decode a document, returning the document element's local name with its
/// content
pub fn decode_xml_document(bytes: &[u8], markers: &Markers) -> Result<(String, DecodedNode)> {
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<(String, DecodedNode)> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => stack.push(Element::open(e, markers)?),
            Event::Empty(ref e) => {
                let element = Element::open(e, markers)?;
                let name = element.name.clone();
                let node = element.close(markers);
                attach(&mut stack, &mut root, name, node)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::schema("<xml>", "closing tag without an open element"))?;
                let name = element.name.clone();
                let node = element.close(markers);
                attach(&mut stack, &mut root, name, node)?;
            }
            Event::Text(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    if let Some(open) = stack.last() {
        return Err(Error::schema(open.name.as_str(), "element is never closed"));
    }
    let (name, node) = root.ok_or_else(|| Error::schema("<xml>", "no document element"))?;
    debug!("decoded XML document <{}>", name);
    Ok((name, node))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<(String, DecodedNode)>,
    name: String,
    node: DecodedNode,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.entries.entry(name).or_default().push(node);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some((name, node));
            Ok(())
        }
        None => Err(Error::schema(name, "second document element")),
    }
}

/// Raw strings selected by an absolute path expression.
///
/// The first step names the document element and is not checked. Steps are
/// child element names with an optional 1-based position (`vector[1]`); the
/// last step may be an attribute (`@count`). Alternatives are separated by
/// `|` and their selections concatenated. A `//` prefix is read as `/`.
pub fn select(root: &DecodedNode, xpath: &str, markers: &Markers) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for alternative in xpath.split('|') {
        out.extend(select_one(root, alternative.trim(), markers)?);
    }
    Ok(out)
}

fn select_one(root: &DecodedNode, xpath: &str, markers: &Markers) -> Result<Vec<String>> {
    let steps: Vec<&str> = xpath.split('/').filter(|s| !s.is_empty()).skip(1).collect();
    let mut nodes: Vec<&DecodedNode> = vec![root];
    for step in steps {
        let (name, position) = parse_step(step, xpath)?;
        let key = match name.strip_prefix('@') {
            Some(attr) => format!("{}{}", markers.attribute, attr),
            None => name.to_string(),
        };
        let mut next = Vec::new();
        for node in nodes {
            let Some(child) = node.get(&key) else {
                continue;
            };
            let items: Vec<&DecodedNode> = match child {
                DecodedNode::List(items) if !is_text_list(items) => items.iter().collect(),
                other => vec![other],
            };
            match position {
                Some(p) => next.extend(items.get(p - 1).copied()),
                None => next.extend(items),
            }
        }
        nodes = next;
    }
    Ok(nodes.into_iter().filter_map(|n| text_of(n, markers)).collect())
}

fn parse_step<'a>(step: &'a str, xpath: &str) -> Result<(&'a str, Option<usize>)> {
    let Some((name, rest)) = step.split_once('[') else {
        return Ok((step, None));
    };
    let position = rest
        .strip_suffix(']')
        .and_then(|p| p.trim().parse::<usize>().ok())
        .filter(|&p| p > 0)
        .ok_or_else(|| Error::schema(xpath, format!("unsupported step `{}`", step)))?;
    Ok((name, Some(position)))
}

fn is_text_list(items: &[DecodedNode]) -> bool {
    items.iter().all(DecodedNode::is_scalar)
}

fn text_of(node: &DecodedNode, markers: &Markers) -> Option<String> {
    match node {
        DecodedNode::Scalar(s) => Some(s.to_string()),
        DecodedNode::List(items) if is_text_list(items) => Some(
            items
                .iter()
                .filter_map(DecodedNode::as_scalar)
                .map(Scalar::to_string)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        DecodedNode::Map(_) => node.get(&markers.text).and_then(|t| text_of(t, markers)),
        DecodedNode::List(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const NOISE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rcm:noiseLevels xmlns:rcm="http://www.rcm.csa.ca/rcm">
  <productId>RCM1</productId>
  <referenceNoiseLevel>
    <sarCalibrationType>Beta Nought</sarCalibrationType>
    <pixelFirstNoiseValue>10</pixelFirstNoiseValue>
    <stepSize>100</stepSize>
    <numberOfValues>3</numberOfValues>
    <noiseLevelValues units="dB">-20.5 -21 -22.25</noiseLevelValues>
  </referenceNoiseLevel>
  <referenceNoiseLevel>
    <sarCalibrationType>Sigma Nought</sarCalibrationType>
    <pixelFirstNoiseValue>10</pixelFirstNoiseValue>
    <stepSize>100</stepSize>
    <numberOfValues>3</numberOfValues>
    <noiseLevelValues units="dB">-23 -24 -25</noiseLevelValues>
  </referenceNoiseLevel>
  <flag/>
</rcm:noiseLevels>"#;

    #[test]
    fn decodes_marker_conventions() {
        let (root, doc) = decode_xml_document(NOISE.as_bytes(), &Markers::default()).unwrap();
        assert_eq!(root, "noiseLevels");
        let expected = DecodedNode::from(json!({
            "@xmlns:rcm": "http://www.rcm.csa.ca/rcm",
            "productId": "RCM1",
            "referenceNoiseLevel": [
                {
                    "sarCalibrationType": "Beta Nought",
                    "pixelFirstNoiseValue": 10,
                    "stepSize": 100,
                    "numberOfValues": 3,
                    "noiseLevelValues": {"@units": "dB", "$": [-20.5, -21, -22.25]}
                },
                {
                    "sarCalibrationType": "Sigma Nought",
                    "pixelFirstNoiseValue": 10,
                    "stepSize": 100,
                    "numberOfValues": 3,
                    "noiseLevelValues": {"@units": "dB", "$": [-23, -24, -25]}
                }
            ],
            "flag": ""
        }));
        assert_eq!(doc, expected);
    }

    #[test]
    fn malformed_documents_fail() {
        let markers = Markers::default();
        assert!(matches!(
            decode_xml(b"<a><b></a>", &markers).unwrap_err(),
            Error::Xml(_)
        ));
        assert!(decode_xml(b"<a><b>", &markers).is_err());
        assert!(decode_xml(b"", &markers).is_err());
    }

    #[test]
    fn selects_text_attributes_and_positions() {
        let xml = r#"<calibration>
            <calibrationVectorList count="2">
              <calibrationVector><line>0</line><pixel>0 40 80</pixel></calibrationVector>
              <calibrationVector><line>9</line><pixel>0 40 81</pixel></calibrationVector>
            </calibrationVectorList>
          </calibration>"#;
        let markers = Markers::default();
        let doc = decode_xml(xml.as_bytes(), &markers).unwrap();
        let select = |xpath: &str| select(&doc, xpath, &markers).unwrap();
        assert_eq!(select("/calibration/calibrationVectorList/@count"), vec!["2"]);
        assert_eq!(
            select("//calibration/calibrationVectorList/calibrationVector/line"),
            vec!["0", "9"]
        );
        assert_eq!(
            select("/calibration/calibrationVectorList/calibrationVector[1]/pixel"),
            vec!["0 40 80"]
        );
        assert!(select("/calibration/nothing/here").is_empty());
        assert_eq!(
            select("/calibration/nothing | /calibration/calibrationVectorList/@count"),
            vec!["2"]
        );
    }
}
