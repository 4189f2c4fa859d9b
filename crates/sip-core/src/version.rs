use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// SIP protocol version, as defined in RFC 3261.
///
/// The current version is "SIP/2.0".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    /// Major version (currently 2)
    pub major: u8,
    /// Minor version (currently 0)
    pub minor: u8,
}

impl Version {
    /// Create a new SIP version with the given major and minor versions.
    pub fn new(major: u8, minor: u8) -> Self {
        Version { major, minor }
    }

    /// Creates a SIP version with the standard version (2.0)
    pub fn sip_2_0() -> Self {
        Version { major: 2, minor: 0 }
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::sip_2_0()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // Fast path for the only version anyone sends.
        if s.eq_ignore_ascii_case("SIP/2.0") {
            return Ok(Version::sip_2_0());
        }
        let rest = s
            .strip_prefix("SIP/")
            .or_else(|| s.strip_prefix("sip/"))
            .ok_or(Error::InvalidVersion)?;
        let (major, minor) = rest.split_once('.').ok_or(Error::InvalidVersion)?;
        let major = major.parse::<u8>().map_err(|_| Error::InvalidVersion)?;
        let minor = minor.parse::<u8>().map_err(|_| Error::InvalidVersion)?;
        Ok(Version { major, minor })
    }
}
