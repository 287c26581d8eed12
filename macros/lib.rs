pub use options::*;
pub use testing::*;
