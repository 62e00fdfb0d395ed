//! Domain models for the SSO authority.

pub mod caller;
pub mod device;
pub mod login_code;
pub mod oauth_connection;
pub mod role;
pub mod user;
pub mod webauthn_credential;

pub use caller::Caller;
pub use device::{Device, DeviceFingerprint, UserAgentSummary};
pub use login_code::{CodePurpose, StoredCode};
pub use oauth_connection::OAuthConnection;
pub use role::{Permission, Role, ADMIN_ROLE};
pub use user::{normalize_email, User, UserResponse};
pub use webauthn_credential::WebauthnCredential;
