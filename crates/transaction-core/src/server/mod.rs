//! Server transaction machines, RFC 3261 section 17.2.

pub(crate) mod invite;
pub(crate) mod non_invite;
