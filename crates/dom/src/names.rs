//! XML name and qualified-name validation
//!
//! Lexical rules follow XML 1.0 (fifth edition) `Name` productions; the
//! prefix/namespace binding rules follow the DOM "validate and extract"
//! algorithm.

use crate::error::{DomError, Result};

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";
pub const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}'
        | '\u{D8}'..='\u{F6}'
        | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}'
        | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9'
            | '\u{B7}'
            | '\u{300}'..='\u{36F}'
            | '\u{203F}'..='\u{2040}')
}

/// `Name` production
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_name_start_char(first) => chars.all(is_name_char),
        _ => false,
    }
}

/// `NCName` production: a Name without colons
fn is_valid_ncname(name: &str) -> bool {
    !name.contains(':') && is_valid_name(name)
}

/// `QName` production: an NCName, or two joined by a single colon
pub fn is_valid_qualified_name(name: &str) -> bool {
    match name.split_once(':') {
        None => is_valid_ncname(name),
        Some((prefix, local)) => is_valid_ncname(prefix) && is_valid_ncname(local),
    }
}

pub fn validate_name(name: &str) -> Result<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(DomError::InvalidCharacter(name.to_string()))
    }
}

pub fn validate_qualified_name(name: &str) -> Result<()> {
    if is_valid_qualified_name(name) {
        Ok(())
    } else {
        Err(DomError::InvalidCharacter(name.to_string()))
    }
}

/// Split a qualified name and check it against its namespace
///
/// Returns `(namespace, prefix, local_name)`. An empty namespace string is
/// treated as no namespace.
pub fn validate_and_extract(
    namespace: Option<&str>,
    qualified_name: &str,
) -> Result<(Option<String>, Option<String>, String)> {
    let namespace = namespace.filter(|ns| !ns.is_empty());
    validate_qualified_name(qualified_name)?;

    let (prefix, local_name) = match qualified_name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qualified_name),
    };

    if prefix.is_some() && namespace.is_none() {
        return Err(DomError::Namespace("prefix without a namespace"));
    }
    if prefix == Some("xml") && namespace != Some(XML_NAMESPACE) {
        return Err(DomError::Namespace("the xml prefix is reserved"));
    }
    let is_xmlns = qualified_name == "xmlns" || prefix == Some("xmlns");
    if is_xmlns && namespace != Some(XMLNS_NAMESPACE) {
        return Err(DomError::Namespace("xmlns requires the XMLNS namespace"));
    }
    if !is_xmlns && namespace == Some(XMLNS_NAMESPACE) {
        return Err(DomError::Namespace("the XMLNS namespace requires xmlns"));
    }

    Ok((
        namespace.map(str::to_string),
        prefix.map(str::to_string),
        local_name.to_string(),
    ))
}

/// Check a prefix → namespace declaration before storing it on an element
pub fn validate_declaration(prefix: Option<&str>, uri: &str) -> Result<()> {
    if let Some(prefix) = prefix {
        if !is_valid_qualified_name(prefix) || prefix.contains(':') {
            return Err(DomError::InvalidCharacter(prefix.to_string()));
        }
    }
    match prefix {
        Some("xmlns") => Err(DomError::Namespace("the xmlns prefix cannot be declared")),
        Some("xml") if uri != XML_NAMESPACE => {
            Err(DomError::Namespace("the xml prefix is reserved"))
        }
        _ if prefix != Some("xml") && uri == XML_NAMESPACE => {
            Err(DomError::Namespace("the XML namespace is bound to xml"))
        }
        _ if uri == XMLNS_NAMESPACE => {
            Err(DomError::Namespace("the XMLNS namespace cannot be declared"))
        }
        Some(_) if uri.is_empty() => Err(DomError::Namespace("prefix bound to empty namespace")),
        _ => Ok(()),
    }
}
