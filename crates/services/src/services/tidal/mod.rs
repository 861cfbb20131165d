mod device;
mod models;
mod tidal;

pub use device::{DeviceAuthHandle, DeviceAuthorization};
pub use tidal::{Tidal, TidalCredentials};
