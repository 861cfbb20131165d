pub mod metadata;
pub mod quality;
pub mod reference;

pub use metadata::{AlbumMetadata, MediaMetadata, TrackMetadata, TrackMetadataBuilder};
pub use quality::{AudioFormat, QualityTier};
pub use reference::{MediaReference, MediaType, Service};
