pub mod cover;
pub mod error;
pub mod finalize;
pub mod tag;

pub use cover::CoverCache;
pub use error::TagError;
pub use finalize::{PostProcess, PostProcessor};
