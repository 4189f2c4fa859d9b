use std::fmt;
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while1},
    character::complete::{char, digit1},
    combinator::{map, map_res, opt},
    multi::{many0, separated_list0},
    sequence::{pair, preceded, separated_pair, terminated},
    IResult,
};

use crate::error::{Error, Result};

/// SIP URI schema types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// SIP URI (non-secure)
    Sip,
    /// SIPS URI (secure SIP)
    Sips,
    /// TEL URI (telephone number)
    Tel,
}

impl Scheme {
    /// Returns the string representation of the scheme
    pub fn as_str(&self) -> &str {
        match self {
            Scheme::Sip => "sip",
            Scheme::Sips => "sips",
            Scheme::Tel => "tel",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sip" => Ok(Scheme::Sip),
            "sips" => Ok(Scheme::Sips),
            "tel" => Ok(Scheme::Tel),
            _ => Err(Error::InvalidUri(format!("Invalid scheme: {s}"))),
        }
    }
}

/// SIP URI components as defined in RFC 3261.
///
/// Parameters and headers are kept in the order they were parsed, so a
/// URI re-encodes to the same string it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    /// URI scheme (sip, sips, tel)
    pub scheme: Scheme,
    /// User part (optional)
    pub user: Option<String>,
    /// Password (optional, deprecated)
    pub password: Option<String>,
    /// Host (required); IPv6 references keep their brackets
    pub host: String,
    /// Port (optional)
    pub port: Option<u16>,
    /// URI parameters (;key=value or ;key)
    pub parameters: Vec<(String, Option<String>)>,
    /// URI headers (?key=value)
    pub headers: Vec<(String, String)>,
}

impl Uri {
    /// Create a new URI with the minimum required fields
    pub fn new(scheme: Scheme, host: impl Into<String>) -> Self {
        Uri {
            scheme,
            user: None,
            password: None,
            host: host.into(),
            port: None,
            parameters: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Create a new SIP URI
    pub fn sip(host: impl Into<String>) -> Self {
        Self::new(Scheme::Sip, host)
    }

    /// Create a new SIPS URI
    pub fn sips(host: impl Into<String>) -> Self {
        Self::new(Scheme::Sips, host)
    }

    /// Create a new TEL URI
    pub fn tel(number: impl Into<String>) -> Self {
        Self::new(Scheme::Tel, number)
    }

    /// Get the username part of the URI, if present
    pub fn username(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Set the user part of the URI
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the port part of the URI
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Add a parameter to the URI
    pub fn with_parameter(
        mut self,
        key: impl Into<String>,
        value: Option<impl Into<String>>,
    ) -> Self {
        self.parameters.push((key.into(), value.map(|v| v.into())));
        self
    }

    /// Looks up a parameter by name, case-insensitively.
    pub fn parameter(&self, key: &str) -> Option<Option<&str>> {
        self.parameters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_deref())
    }

    /// Returns the transport parameter if present
    pub fn transport(&self) -> Option<&str> {
        self.parameter("transport").flatten()
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;

        if let Some(user) = &self.user {
            write!(f, "{}", user)?;

            if let Some(password) = &self.password {
                write!(f, ":{}", password)?;
            }

            write!(f, "@")?;
        }

        write!(f, "{}", self.host)?;

        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }

        for (key, value) in &self.parameters {
            write!(f, ";{}", key)?;
            if let Some(val) = value {
                write!(f, "={}", val)?;
            }
        }

        if !self.headers.is_empty() {
            write!(f, "?")?;

            let mut first = true;
            for (key, value) in &self.headers {
                if !first {
                    write!(f, "&")?;
                }
                write!(f, "{}={}", key, value)?;
                first = false;
            }
        }

        Ok(())
    }
}

// Parse the scheme of a URI; "sips" must be tried before "sip".
fn scheme_parser(input: &str) -> IResult<&str, Scheme> {
    map_res(alt((tag("sips"), tag("sip"), tag("tel"))), |s: &str| {
        Scheme::from_str(s)
    })(input)
}

// Parse the userinfo part (user:password@)
fn userinfo_parser(input: &str) -> IResult<&str, (Option<&str>, Option<&str>)> {
    match opt(terminated(
        pair(
            take_till(|c| c == ':' || c == '@' || c == ';' || c == '?'),
            opt(preceded(char(':'), take_till(|c| c == '@'))),
        ),
        char('@'),
    ))(input)
    {
        Ok((remaining, Some((user, password)))) => Ok((remaining, (Some(user), password))),
        Ok((remaining, None)) => Ok((remaining, (None, None))),
        Err(e) => Err(e),
    }
}

// Parse the host part. IPv6 references keep their square brackets.
fn host_parser(input: &str) -> IResult<&str, &str> {
    if input.starts_with('[') {
        nom::combinator::recognize(nom::sequence::tuple((
            char('['),
            take_while1(|c: char| c.is_ascii_hexdigit() || c == ':' || c == '.'),
            char(']'),
        )))(input)
    } else {
        take_while1(|c: char| c.is_alphanumeric() || c == '.' || c == '-' || c == '+')(input)
    }
}

// Parse the port part
fn port_parser(input: &str) -> IResult<&str, u16> {
    map_res(preceded(char(':'), digit1), |s: &str| s.parse::<u16>())(input)
}

// Parse a single parameter
fn parameter_parser(input: &str) -> IResult<&str, (String, Option<String>)> {
    preceded(
        char(';'),
        pair(
            map(take_till(|c| c == '=' || c == ';' || c == '?'), String::from),
            opt(preceded(
                char('='),
                map(take_till(|c| c == ';' || c == '?'), String::from),
            )),
        ),
    )(input)
}

// Parse all parameters
fn parameters_parser(input: &str) -> IResult<&str, Vec<(String, Option<String>)>> {
    many0(parameter_parser)(input)
}

// Parse a single header
fn header_parser(input: &str) -> IResult<&str, (String, String)> {
    separated_pair(
        map(take_till(|c| c == '=' || c == '&'), String::from),
        char('='),
        map(take_till(|c| c == '&'), String::from),
    )(input)
}

// Parse all headers
fn headers_parser(input: &str) -> IResult<&str, Vec<(String, String)>> {
    preceded(char('?'), separated_list0(char('&'), header_parser))(input)
}

// Parser for a complete URI
fn uri_parser(input: &str) -> IResult<&str, Uri> {
    let (input, scheme) = terminated(scheme_parser, char(':'))(input)?;
    let (input, (user, password)) = userinfo_parser(input)?;
    let (input, host) = host_parser(input)?;
    let (input, port) = opt(port_parser)(input)?;

    let (input, parameters) = opt(parameters_parser)(input)?;
    let (input, headers) = opt(headers_parser)(input)?;

    let mut uri = Uri::new(scheme, host);

    uri.user = user.filter(|u| !u.is_empty()).map(String::from);
    uri.password = password.map(String::from);
    uri.port = port;

    if let Some(params) = parameters {
        uri.parameters = params;
    }

    if let Some(hdrs) = headers {
        uri.headers = hdrs;
    }

    Ok((input, uri))
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match uri_parser(s) {
            Ok(("", uri)) => Ok(uri),
            Ok((rest, _)) => Err(Error::InvalidUri(format!(
                "Trailing data after URI: {rest}"
            ))),
            Err(_) => Err(Error::InvalidUri(format!("Failed to parse URI: {s}"))),
        }
    }
}

/// Parses a URI from a prefix of `input`, returning the remainder.
/// Used by start-line and header parsers where the URI is followed
/// by more grammar.
pub(crate) fn parse_uri_prefix(input: &str) -> IResult<&str, Uri> {
    uri_parser(input)
}

/// Parses a URI without touching trailing `;params` or `?headers`.
///
/// Needed for the bare addr-spec form of From/To, where RFC 3261
/// assigns semicolon parameters to the header rather than the URI.
pub(crate) fn parse_uri_core(input: &str) -> IResult<&str, Uri> {
    let (input, scheme) = terminated(scheme_parser, char(':'))(input)?;
    let (input, (user, password)) = userinfo_parser(input)?;
    let (input, host) = host_parser(input)?;
    let (input, port) = opt(port_parser)(input)?;

    let mut uri = Uri::new(scheme, host);
    uri.user = user.filter(|u| !u.is_empty()).map(String::from);
    uri.password = password.map(String::from);
    uri.port = port;

    Ok((input, uri))
}

/// Parses a `host[:port]` pair as found in the Via sent-by.
pub(crate) fn parse_host_port(input: &str) -> IResult<&str, (&str, Option<u16>)> {
    pair(host_parser, opt(port_parser))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_uri() {
        let uri = Uri::sip("example.com");
        assert_eq!(uri.scheme, Scheme::Sip);
        assert_eq!(uri.host, "example.com");
        assert!(uri.user.is_none());
        assert!(uri.port.is_none());
        assert!(uri.parameters.is_empty());
        assert!(uri.headers.is_empty());

        assert_eq!(uri.to_string(), "sip:example.com");
    }

    #[test]
    fn test_uri_display_order() {
        let uri = Uri::sip("example.com")
            .with_user("alice")
            .with_port(5060)
            .with_parameter("transport", Some("tcp"))
            .with_parameter("lr", None::<String>);

        assert_eq!(uri.to_string(), "sip:alice@example.com:5060;transport=tcp;lr");
    }

    #[test]
    fn test_parse_simple_uri() {
        let uri = Uri::from_str("sip:example.com").unwrap();
        assert_eq!(uri.scheme, Scheme::Sip);
        assert_eq!(uri.host, "example.com");
        assert!(uri.user.is_none());

        let uri = Uri::from_str("sips:secure.example.com:5061").unwrap();
        assert_eq!(uri.scheme, Scheme::Sips);
        assert_eq!(uri.host, "secure.example.com");
        assert_eq!(uri.port, Some(5061));
    }

    #[test]
    fn test_parse_complex_uri() {
        let uri = Uri::from_str("sip:alice@example.com;transport=tcp?subject=Meeting").unwrap();
        assert_eq!(uri.scheme, Scheme::Sip);
        assert_eq!(uri.user, Some("alice".to_string()));
        assert_eq!(uri.host, "example.com");
        assert_eq!(uri.parameter("transport"), Some(Some("tcp")));
        assert_eq!(uri.headers[0], ("subject".to_string(), "Meeting".to_string()));
    }

    #[test]
    fn test_parse_ipv6_uri() {
        let uri = Uri::from_str("sip:[2001:db8::1]:5060").unwrap();
        assert_eq!(uri.host, "[2001:db8::1]");
        assert_eq!(uri.port, Some(5060));
        assert_eq!(uri.to_string(), "sip:[2001:db8::1]:5060");
    }

    #[test]
    fn test_parse_round_trip() {
        let input = "sip:bob@biloxi.example.com:5060;transport=udp";
        let uri = Uri::from_str(input).unwrap();
        assert_eq!(uri.to_string(), input);
    }

    #[test]
    fn test_tel_uri() {
        let uri = Uri::from_str("tel:+1-212-555-0123").unwrap();
        assert_eq!(uri.scheme, Scheme::Tel);
        assert_eq!(uri.host, "+1-212-555-0123");
    }

    #[test]
    fn test_invalid_uri() {
        assert!(Uri::from_str("http://example.com").is_err());
        assert!(Uri::from_str("sip:").is_err());
        assert!(Uri::from_str("").is_err());
    }
}
