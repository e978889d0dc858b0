//! SRTLA/SRT wire format: constants, packet classification, parsers and
//! builders. All multi-byte integers are big-endian on the wire.

mod builders;
mod constants;
mod parsers;
mod types;

pub use builders::*;
pub use constants::*;
pub use parsers::*;
pub use types::*;
