pub mod adapter;
pub mod auth_flows;
pub mod error;
pub mod resolver;
pub mod services;
mod default;

pub use adapter::{Adapter, AdapterRegistry, ResolvedDownload, ServiceAdapter, ServiceCredentials};
pub use auth_flows::AuthFlows;
pub use default::{DEFAULT_UA, default_client};
pub use error::AdapterError;
pub use resolver::UrlResolver;
