//! Records API client

pub mod client;
pub mod projects;
