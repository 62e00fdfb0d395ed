//! HTTP handlers of the SSO authority.

pub mod auth;
pub mod device;
pub mod user;
pub mod well_known;
