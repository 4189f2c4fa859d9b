use std::fmt;
use std::str::FromStr;

use nom::{
    bytes::complete::{escaped, take_while1},
    character::complete::{char, none_of, one_of, space0},
    combinator::opt,
    sequence::delimited,
    IResult,
};

use crate::error::{Error, Result};
use crate::types::param::{parse_params, Param};
use crate::uri::{parse_uri_core, parse_uri_prefix, Uri};

/// A SIP name-addr or addr-spec: `"Display Name" <uri>;params` or
/// `uri;params`. Used by From, To, Contact, Route and Record-Route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub display_name: Option<String>,
    pub uri: Uri,
    pub params: Vec<Param>,
}

impl Address {
    /// Creates a new Address with no display name or parameters.
    pub fn new(uri: Uri) -> Self {
        Address {
            display_name: None,
            uri,
            params: Vec::new(),
        }
    }

    /// Creates an Address with a display name.
    pub fn new_with_display_name(display_name: impl Into<String>, uri: Uri) -> Self {
        Address {
            display_name: Some(display_name.into()),
            uri,
            params: Vec::new(),
        }
    }

    /// Gets the tag parameter value.
    pub fn tag(&self) -> Option<&str> {
        self.params.iter().find_map(|p| match p {
            Param::Tag(tag_val) => Some(tag_val.as_str()),
            _ => None,
        })
    }

    /// Sets or replaces the tag parameter.
    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.params.retain(|p| !matches!(p, Param::Tag(_)));
        self.params.push(Param::Tag(tag.into()));
    }

    /// Returns self with the tag parameter set.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.set_tag(tag);
        self
    }

    /// Checks if a parameter with the given key exists (case-insensitive).
    pub fn has_param(&self, key: &str) -> bool {
        self.params.iter().any(|p| p.key().eq_ignore_ascii_case(key))
    }
}

// Quoting is needed when the display name is not a plain token sequence.
fn needs_quoting(display_name: &str) -> bool {
    display_name.chars().any(|c| {
        !c.is_alphanumeric()
            && !matches!(c, '-' | '.' | '!' | '%' | '*' | '_' | '+' | '`' | '\'' | '~' | ' ')
    }) || display_name.contains('"')
        || display_name.contains('\\')
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.display_name {
            let trimmed = name.trim();
            if !trimmed.is_empty() {
                if needs_quoting(trimmed) {
                    write!(f, "\"{}\" ", trimmed.replace('\\', "\\\\").replace('"', "\\\""))?;
                } else {
                    write!(f, "{} ", trimmed)?;
                }
            }
        }

        write!(f, "<{}>", self.uri)?;

        for param in &self.params {
            write!(f, "{}", param)?;
        }

        Ok(())
    }
}

fn quoted_display_name(input: &str) -> IResult<&str, String> {
    let (input, raw) = delimited(
        char('"'),
        opt(escaped(none_of("\"\\"), '\\', one_of("\"\\"))),
        char('"'),
    )(input)?;
    let unescaped = raw
        .unwrap_or("")
        .replace("\\\"", "\"")
        .replace("\\\\", "\\");
    Ok((input, unescaped))
}

fn token_display_name(input: &str) -> IResult<&str, String> {
    // One or more tokens separated by spaces, ending before '<'.
    let mut rest = input;
    let mut out = String::new();
    loop {
        let (r, word) = take_while1(|c: char| {
            c.is_alphanumeric()
                || matches!(c, '-' | '.' | '!' | '%' | '*' | '_' | '+' | '`' | '\'' | '~')
        })(rest)?;
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
        let (r, _) = space0(r)?;
        rest = r;
        if rest.starts_with('<') {
            return Ok((rest, out));
        }
        if rest.is_empty() {
            return Err(nom::Err::Error(nom::error::Error::new(
                rest,
                nom::error::ErrorKind::TakeWhile1,
            )));
        }
    }
}

/// Parses a name-addr or addr-spec with trailing header parameters.
pub(crate) fn parse_address(input: &str) -> IResult<&str, Address> {
    let (input, _) = space0(input)?;

    // name-addr: optional display-name, then <uri>
    if let Ok((rest, display_name)) = quoted_display_name(input) {
        let (rest, _) = space0(rest)?;
        let (rest, uri) = delimited(char('<'), parse_uri_prefix, char('>'))(rest)?;
        let (rest, params) = parse_params(rest)?;
        let display_name = Some(display_name).filter(|s| !s.is_empty());
        return Ok((
            rest,
            Address {
                display_name,
                uri,
                params,
            },
        ));
    }

    if input.starts_with('<') {
        let (rest, uri) = delimited(char('<'), parse_uri_prefix, char('>'))(input)?;
        let (rest, params) = parse_params(rest)?;
        return Ok((
            rest,
            Address {
                display_name: None,
                uri,
                params,
            },
        ));
    }

    if let Ok((rest, display_name)) = token_display_name(input) {
        let (rest, uri) = delimited(char('<'), parse_uri_prefix, char('>'))(rest)?;
        let (rest, params) = parse_params(rest)?;
        return Ok((
            rest,
            Address {
                display_name: Some(display_name),
                uri,
                params,
            },
        ));
    }

    // addr-spec: bare URI; semicolon params belong to the header here.
    let (rest, uri) = parse_uri_core(input)?;
    let (rest, params) = parse_params(rest)?;
    Ok((
        rest,
        Address {
            display_name: None,
            uri,
            params,
        },
    ))
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match parse_address(s) {
            Ok((rest, addr)) if rest.trim().is_empty() => Ok(addr),
            Ok((rest, _)) => Err(Error::Parser(format!(
                "Trailing data after address: {rest}"
            ))),
            Err(_) => Err(Error::Parser(format!("Failed to parse address: {s}"))),
        }
    }
}
