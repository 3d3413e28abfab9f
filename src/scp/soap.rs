// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! SOAP 1.1 envelopes for the SCP end-user web service.
//!
//! Requests are small and flat, so they are rendered directly. Responses are
//! parsed into a lightweight [`XmlElement`] tree keyed by local element names,
//! which keeps the client independent of the namespace prefixes the service
//! happens to emit.

use crate::constants::{SCP_XML_NAMESPACE, SOAP_ENVELOPE_NAMESPACE};
use crate::errors::ScpError;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

/// An XML element reduced to its local name, text content and children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Local name (namespace prefix removed)
    pub name: String,
    /// Concatenated text content
    pub text: String,
    /// Child elements in document order
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn named(name: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(name).into_owned(),
            ..Self::default()
        }
    }

    /// First child with the given local name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    /// All children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Text of the first child with the given name, or an empty string.
    #[must_use]
    pub fn child_text(&self, name: &str) -> String {
        self.child(name)
            .map(|child| child.text.clone())
            .unwrap_or_default()
    }

    /// Texts of all children with the given name.
    #[must_use]
    pub fn child_texts(&self, name: &str) -> Vec<String> {
        self.children_named(name)
            .map(|child| child.text.clone())
            .collect()
    }
}

/// Render a request envelope for an SCP operation.
///
/// Field values are XML-escaped; field names are trusted constants.
#[must_use]
pub fn envelope(operation: &str, fields: &[(&str, &str)]) -> String {
    let mut payload = String::new();
    for (name, value) in fields {
        payload.push_str(&format!("<{name}>{}</{name}>", escape(*value)));
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <soapenv:Envelope xmlns:soapenv=\"{SOAP_ENVELOPE_NAMESPACE}\" xmlns:ns=\"{SCP_XML_NAMESPACE}\">\
         <soapenv:Body><ns:{operation}>{payload}</ns:{operation}></soapenv:Body>\
         </soapenv:Envelope>"
    )
}

fn malformed(err: impl std::fmt::Display) -> ScpError {
    ScpError::MalformedResponse(err.to_string())
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else {
        *root = Some(element);
    }
}

/// Parse a document into its root element.
///
/// # Errors
///
/// Returns [`ScpError::MalformedResponse`] for invalid XML, unbalanced tags or an
/// empty document.
pub fn parse_document(body: &str) -> Result<XmlElement, ScpError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(start) => stack.push(XmlElement::named(start.local_name().as_ref())),
            Event::Empty(start) => {
                let element = XmlElement::named(start.local_name().as_ref());
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed("unexpected closing tag"))?;
                attach(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(malformed)?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(malformed("unterminated element"));
    }
    root.ok_or_else(|| malformed("empty document"))
}

/// Extract the operation response element from a SOAP envelope.
///
/// # Errors
///
/// Returns [`ScpError::Fault`] if the body carries a SOAP fault, and
/// [`ScpError::MalformedResponse`] if the envelope has no body content.
pub fn response_element(body: &str) -> Result<XmlElement, ScpError> {
    let envelope = parse_document(body)?;
    let mut soap_body = envelope
        .child("Body")
        .cloned()
        .ok_or_else(|| malformed("missing SOAP body"))?;

    if let Some(fault) = soap_body.child("Fault") {
        return Err(ScpError::Fault {
            code: fault.child_text("faultcode"),
            message: fault.child_text("faultstring"),
        });
    }

    if soap_body.children.is_empty() {
        return Err(malformed("empty SOAP body"));
    }
    Ok(soap_body.children.swap_remove(0))
}

#[cfg(test)]
#[path = "soap_tests.rs"]
mod soap_tests;
