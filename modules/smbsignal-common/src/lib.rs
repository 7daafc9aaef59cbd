pub mod config;
pub mod error;
pub mod identity;
pub mod types;

pub use config::{Config, RegistryKind, SearchBackendKind};
pub use error::SmbSignalError;
pub use identity::{capture_identity, domain_of};
pub use types::*;
