//! Testing utilities and mock implementations
//!
//! Mocks for every platform seam so the link, resolver and broker state
//! machines can be driven without a radio, a network or a broker.

pub mod mocks;

pub use mocks::*;
