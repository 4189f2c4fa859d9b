use std::fmt;
use std::net::IpAddr;

use nom::{
    branch::alt,
    bytes::complete::{escaped, take_while1},
    character::complete::{char, none_of, one_of},
    combinator::{opt, recognize},
    multi::many0,
    sequence::{delimited, preceded},
    IResult,
};

/// A single `;key=value` parameter on a header field or address.
///
/// Parameters the transaction layer cares about get typed variants;
/// everything else rides along in `Other` with its value kept verbatim
/// (quotes included), so re-encoding reproduces the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// The `branch` parameter, used in Via headers for transaction identity.
    Branch(String),
    /// The `tag` parameter, used in From/To headers for dialog identification.
    Tag(String),
    /// The `received` parameter, set on Via to record the source IP.
    Received(IpAddr),
    /// The `rport` parameter (RFC 3581); a flag on requests, filled in
    /// with the source port on responses.
    Rport(Option<u16>),
    /// The `maddr` parameter, used in Via headers.
    Maddr(String),
    /// The `ttl` parameter, used in Via headers.
    Ttl(u8),
    /// The `lr` flag (loose routing), used in Route headers.
    Lr,
    /// Generic parameter represented as key-value.
    Other(String, Option<String>),
}

impl Param {
    /// Returns the parameter's key name.
    pub fn key(&self) -> &str {
        match self {
            Param::Branch(_) => "branch",
            Param::Tag(_) => "tag",
            Param::Received(_) => "received",
            Param::Rport(_) => "rport",
            Param::Maddr(_) => "maddr",
            Param::Ttl(_) => "ttl",
            Param::Lr => "lr",
            Param::Other(key, _) => key,
        }
    }

    /// Builds a `branch` parameter.
    pub fn branch(value: impl Into<String>) -> Self {
        Param::Branch(value.into())
    }

    /// Builds a `tag` parameter.
    pub fn tag(value: impl Into<String>) -> Self {
        Param::Tag(value.into())
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Branch(val) => write!(f, ";branch={}", val),
            Param::Tag(val) => write!(f, ";tag={}", val),
            Param::Received(val) => write!(f, ";received={}", val),
            Param::Rport(Some(port)) => write!(f, ";rport={}", port),
            Param::Rport(None) => write!(f, ";rport"),
            Param::Maddr(val) => write!(f, ";maddr={}", val),
            Param::Ttl(val) => write!(f, ";ttl={}", val),
            Param::Lr => write!(f, ";lr"),
            Param::Other(key, Some(val)) => write!(f, ";{}={}", key, val),
            Param::Other(key, None) => write!(f, ";{}", key),
        }
    }
}

fn is_param_char(c: char) -> bool {
    c.is_alphanumeric()
        || matches!(
            c,
            '-' | '.' | '!' | '%' | '*' | '_' | '+' | '`' | '\'' | '~' | '[' | ']' | ':'
        )
}

// A quoted-string value, returned with its quotes so encoding is verbatim.
fn quoted_value(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('"'),
        opt(escaped(none_of("\"\\"), '\\', one_of("\"\\"))),
        char('"'),
    ))(input)
}

fn token_value(input: &str) -> IResult<&str, &str> {
    take_while1(is_param_char)(input)
}

// One parameter after its leading ';' has been consumed.
fn param_body(input: &str) -> IResult<&str, Param> {
    let (input, _) = nom::character::complete::space0(input)?;
    let (input, key) = take_while1(|c: char| c.is_alphanumeric() || c == '-' || c == '_')(input)?;
    let (input, value) = opt(preceded(
        delimited(
            nom::character::complete::space0,
            char('='),
            nom::character::complete::space0,
        ),
        alt((quoted_value, token_value)),
    ))(input)?;

    let param = match (key.to_ascii_lowercase().as_str(), value) {
        ("branch", Some(v)) => Param::Branch(v.to_string()),
        ("tag", Some(v)) => Param::Tag(v.to_string()),
        ("received", Some(v)) => match v.parse::<IpAddr>() {
            Ok(ip) => Param::Received(ip),
            Err(_) => Param::Other(key.to_string(), Some(v.to_string())),
        },
        ("rport", Some(v)) => match v.parse::<u16>() {
            Ok(port) => Param::Rport(Some(port)),
            Err(_) => Param::Other(key.to_string(), Some(v.to_string())),
        },
        ("rport", None) => Param::Rport(None),
        ("maddr", Some(v)) => Param::Maddr(v.to_string()),
        ("ttl", Some(v)) => match v.parse::<u8>() {
            Ok(ttl) => Param::Ttl(ttl),
            Err(_) => Param::Other(key.to_string(), Some(v.to_string())),
        },
        ("lr", None) => Param::Lr,
        (_, v) => Param::Other(key.to_string(), v.map(String::from)),
    };
    Ok((input, param))
}

/// Parses a run of `;key=value` parameters, as found after a URI in an
/// address or after the sent-by in a Via.
pub(crate) fn parse_params(input: &str) -> IResult<&str, Vec<Param>> {
    many0(preceded(
        preceded(nom::character::complete::space0, char(';')),
        param_body,
    ))(input)
}
