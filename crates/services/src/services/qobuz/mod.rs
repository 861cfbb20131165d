mod models;
mod qobuz;

pub use qobuz::{Qobuz, QobuzCredentials};
