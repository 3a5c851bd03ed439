//! Minimal DNS client
//!
//! Resolves the broker hostname without relying on the platform resolver, which
//! on constrained targets caches aggressively and fails opaquely. Only IPv4 A
//! records are supported.

pub mod codec;
pub mod resolver;
pub mod socket;

pub use codec::{encode_query, parse_response, EncodeError};
pub use resolver::{AddressResolver, ResolverPolicy, DNS_PORT};
pub use socket::{bind_nonblocking, DatagramSocket};
