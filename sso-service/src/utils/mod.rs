pub mod cookies;
pub mod password;
pub mod random;
pub mod validation;

pub use password::{hash_password, verify_password, Password, PasswordHashString};
pub use validation::{JsonBody, ValidatedJson};
