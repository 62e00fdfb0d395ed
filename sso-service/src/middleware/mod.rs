pub mod auth;
pub mod device;
pub mod rights;

pub use auth::{auth_middleware, AuthUser};
pub use device::{device_middleware, ClientDevice};
pub use rights::device_rights_middleware;
