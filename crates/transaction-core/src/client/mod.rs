//! Client transaction machines, RFC 3261 section 17.1.

pub(crate) mod invite;
pub(crate) mod non_invite;
