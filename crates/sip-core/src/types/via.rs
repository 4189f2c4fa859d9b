use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use nom::{
    bytes::complete::take_while1,
    character::complete::{char, space0, space1},
    combinator::opt,
    sequence::tuple,
    IResult,
};

use crate::error::{Error, Result};
use crate::types::param::{parse_params, Param};
use crate::uri::parse_host_port;

/// One hop of a Via header: `SIP/2.0/UDP host:port;params`.
///
/// A single Via header line may carry several comma-separated hops;
/// those are collected into a `Vec<Via>` by the header layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Via {
    /// Protocol name, normally "SIP"
    pub protocol_name: String,
    /// Protocol version, normally "2.0"
    pub protocol_version: String,
    /// Transport token (UDP, TCP, TLS, ...)
    pub transport: String,
    /// Sent-by host; IPv6 references keep their brackets
    pub host: String,
    /// Sent-by port (optional)
    pub port: Option<u16>,
    /// Via parameters (branch, received, rport, ...)
    pub params: Vec<Param>,
}

impl Via {
    /// Creates a new SIP/2.0 Via hop.
    pub fn new(transport: impl Into<String>, host: impl Into<String>, port: Option<u16>) -> Self {
        Via {
            protocol_name: "SIP".to_string(),
            protocol_version: "2.0".to_string(),
            transport: transport.into(),
            host: host.into(),
            port,
            params: Vec::new(),
        }
    }

    /// Returns self with the branch parameter set.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.set_branch(branch);
        self
    }

    /// Gets the branch parameter value.
    pub fn branch(&self) -> Option<&str> {
        self.params.iter().find_map(|p| match p {
            Param::Branch(val) => Some(val.as_str()),
            _ => None,
        })
    }

    /// Sets or replaces the branch parameter.
    pub fn set_branch(&mut self, branch: impl Into<String>) {
        let branch = branch.into();
        if let Some(pos) = self.params.iter().position(|p| matches!(p, Param::Branch(_))) {
            self.params[pos] = Param::Branch(branch);
        } else {
            self.params.push(Param::Branch(branch));
        }
    }

    /// Gets the received parameter value.
    pub fn received(&self) -> Option<IpAddr> {
        self.params.iter().find_map(|p| match p {
            Param::Received(ip) => Some(*ip),
            _ => None,
        })
    }

    /// Sets or replaces the received parameter.
    pub fn set_received(&mut self, addr: IpAddr) {
        if let Some(pos) = self.params.iter().position(|p| matches!(p, Param::Received(_))) {
            self.params[pos] = Param::Received(addr);
        } else {
            self.params.push(Param::Received(addr));
        }
    }

    /// Gets the rport parameter: `None` if absent, `Some(None)` for the
    /// bare flag, `Some(Some(port))` once a response filled it in.
    pub fn rport(&self) -> Option<Option<u16>> {
        self.params.iter().find_map(|p| match p {
            Param::Rport(port) => Some(*port),
            _ => None,
        })
    }

    /// Sets or replaces the rport parameter with a concrete port.
    pub fn set_rport(&mut self, port: u16) {
        if let Some(pos) = self.params.iter().position(|p| matches!(p, Param::Rport(_))) {
            self.params[pos] = Param::Rport(Some(port));
        } else {
            self.params.push(Param::Rport(Some(port)));
        }
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{} {}",
            self.protocol_name, self.protocol_version, self.transport, self.host
        )?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        Ok(())
    }
}

fn protocol_token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '.' || c == '-')(input)
}

/// Parses a single Via hop (everything up to the next comma or end).
pub(crate) fn parse_via(input: &str) -> IResult<&str, Via> {
    let (input, _) = space0(input)?;
    let (input, (name, _, version, _, transport)) = tuple((
        protocol_token,
        char('/'),
        protocol_token,
        char('/'),
        protocol_token,
    ))(input)?;
    let (input, _) = space1(input)?;
    let (input, (host, port)) = parse_host_port(input)?;
    let (input, params) = parse_params(input)?;

    Ok((
        input,
        Via {
            protocol_name: name.to_string(),
            protocol_version: version.to_string(),
            transport: transport.to_ascii_uppercase(),
            host: host.to_string(),
            port,
            params,
        },
    ))
}

impl FromStr for Via {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match parse_via(s) {
            Ok((rest, via)) if rest.trim().is_empty() => Ok(via),
            _ => Err(Error::Parser(format!("Failed to parse Via: {s}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_via() {
        let via = Via::from_str("SIP/2.0/UDP pc33.atlanta.example.com;branch=z9hG4bK776asdhds")
            .unwrap();
        assert_eq!(via.transport, "UDP");
        assert_eq!(via.host, "pc33.atlanta.example.com");
        assert!(via.port.is_none());
        assert_eq!(via.branch(), Some("z9hG4bK776asdhds"));
    }

    #[test]
    fn test_parse_via_with_port() {
        let via = Via::from_str("SIP/2.0/TCP client.biloxi.example.com:5060;branch=z9hG4bK74bf9")
            .unwrap();
        assert_eq!(via.transport, "TCP");
        assert_eq!(via.port, Some(5060));
    }

    #[test]
    fn test_parse_via_ipv6() {
        let via = Via::from_str("SIP/2.0/UDP [2001:db8::9:1]:5060;branch=z9hG4bKas3").unwrap();
        assert_eq!(via.host, "[2001:db8::9:1]");
        assert_eq!(via.port, Some(5060));
    }

    #[test]
    fn test_via_display_round_trip() {
        let input = "SIP/2.0/UDP pc33.atlanta.example.com:5060;branch=z9hG4bK776asdhds";
        let via = Via::from_str(input).unwrap();
        assert_eq!(via.to_string(), input);
    }

    #[test]
    fn test_via_received_rport() {
        let mut via = Via::new("UDP", "client.example.com", Some(5060));
        via.set_received("192.0.2.1".parse().unwrap());
        via.set_rport(43817);
        assert_eq!(via.received(), Some("192.0.2.1".parse().unwrap()));
        assert_eq!(via.rport(), Some(Some(43817)));
        assert_eq!(
            via.to_string(),
            "SIP/2.0/UDP client.example.com:5060;received=192.0.2.1;rport=43817"
        );
    }

    #[test]
    fn test_set_branch_replaces() {
        let mut via = Via::new("UDP", "example.com", None).with_branch("z9hG4bK1");
        via.set_branch("z9hG4bK2");
        assert_eq!(via.branch(), Some("z9hG4bK2"));
        assert_eq!(
            via.params.iter().filter(|p| matches!(p, Param::Branch(_))).count(),
            1
        );
    }
}
