//! Configuration-backed implementations of the outbound ports.

pub mod profiles;
pub mod token;

pub use profiles::ConfigTenantProfiles;
pub use token::{constant_time_compare, StaticTokenValidator};
