pub mod bottleneck;
pub mod c2f;
pub mod conv;

pub use bottleneck::Bottleneck;
pub use c2f::C2f;
pub use conv::Conv;
