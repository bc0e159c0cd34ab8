//! Regex patterns for the plain-text example format
//! Extracted to a separate crate for compilation optimization

use once_cell::sync::Lazy;
use regex::Regex;

/// Label section in front of the first `|`
pub mod header {
    use super::*;

    pub static TAG: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^'(\S*)$").expect("Invalid regex pattern"));

    pub static NUMBER: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?$").expect("Invalid regex pattern")
    });

    /// Label fields and the optional tag of one header
    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct Header<'a> {
        pub fields: Vec<&'a str>,
        pub tag: Option<&'a str>,
    }

    /// Split a header into its label fields and tag
    pub fn split(text: &str) -> Header<'_> {
        let mut header = Header::default();

        for token in text.split_whitespace() {
            match TAG.captures(token) {
                Some(caps) => header.tag = caps.get(1).map(|m| m.as_str()),
                None => header.fields.push(token),
            }
        }

        header
    }

    /// True for numbers in decimal notation (no `nan`, no `inf`)
    ///
    /// Exponents are not range-checked; `1e39` matches but overflows `f32`.
    pub fn is_number(token: &str) -> bool {
        NUMBER.is_match(token)
    }
}

/// Namespaces and features after each `|`
pub mod features {
    use super::*;

    pub static NAMESPACE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^(?P<name>[^:|\s]+)(?::(?P<scale>[^:|\s]+))?$").expect("Invalid regex pattern")
    });

    pub static FEATURE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^(?P<name>[^:|\s]+)(?::(?P<value>[^:|\s]*))?$").expect("Invalid regex pattern")
    });

    /// Text between two bars
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct Segment<'a> {
        /// Raw namespace token, `None` for the default namespace
        pub namespace: Option<&'a str>,
        /// Whitespace-separated feature tokens
        pub body: &'a str,
    }

    /// Split everything after the header into one segment per `|`
    ///
    /// A name glued to the bar (`|user age:31`) opens a named namespace, a bar
    /// followed by whitespace opens the default one.
    pub fn segments(rest: &str) -> impl Iterator<Item = Segment<'_>> {
        rest.split('|').map(|piece| {
            if piece.starts_with(char::is_whitespace) || piece.is_empty() {
                return Segment { namespace: None, body: piece };
            }

            match piece.split_once(char::is_whitespace) {
                Some((namespace, body)) => Segment { namespace: Some(namespace), body },
                None => Segment { namespace: Some(piece), body: "" },
            }
        })
    }

    /// Parse a namespace token into its name and optional scale
    pub fn namespace(token: &str) -> Option<(&str, Option<&str>)> {
        let caps = NAMESPACE.captures(token)?;
        let name = caps.name("name")?.as_str();
        Some((name, caps.name("scale").map(|m| m.as_str())))
    }

    /// Parse a feature token into its name and optional value
    pub fn feature(token: &str) -> Option<(&str, Option<&str>)> {
        let caps = FEATURE.captures(token)?;
        let name = caps.name("name")?.as_str();
        Some((name, caps.name("value").map(|m| m.as_str())))
    }
}
