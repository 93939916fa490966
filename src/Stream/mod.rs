pub mod Cyclic;

pub use self::Cyclic::{FsStream, StreamClaimError};
