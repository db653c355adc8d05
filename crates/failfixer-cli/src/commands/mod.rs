//! CLI command implementations

pub mod config;
pub mod inspect;
pub mod profiles;
pub mod resume;
pub mod validate;
