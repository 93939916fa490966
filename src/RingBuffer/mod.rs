pub mod FixedSize;
pub mod VarSize;

pub use self::FixedSize::FixedRingBuffer;
pub use self::VarSize::{VsClaim, VsRingBuffer};
