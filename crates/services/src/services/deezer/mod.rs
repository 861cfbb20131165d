mod deezer;
mod models;

pub use deezer::{Deezer, DeezerCredentials};
