pub mod deezer;
pub mod qobuz;
pub mod tidal;
