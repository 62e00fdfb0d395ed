//! Persistence collaborator.
//!
//! `Store` is the seam between the coordinator and durable state. `Database`
//! implements it over Postgres; `MockStore` keeps everything in memory for tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::error::ServiceError;
use crate::models::{Device, OAuthConnection, User, WebauthnCredential};

#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> Result<(), ServiceError>;

    /// Look a user up by email, roles and permissions included.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError>;
    async fn insert_user(&self, user: &User) -> Result<(), ServiceError>;
    async fn update_password(&self, user_id: Uuid, password_hash: &str)
        -> Result<(), ServiceError>;

    async fn find_user_by_oauth(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<User>, ServiceError>;
    async fn link_oauth(&self, connection: &OAuthConnection) -> Result<(), ServiceError>;

    /// Insert the device or refresh `last_active` when the id already exists.
    async fn upsert_device(&self, device: &Device) -> Result<Device, ServiceError>;
    async fn find_device(&self, device_id: &str) -> Result<Option<Device>, ServiceError>;
    async fn list_devices(&self, user_id: Uuid) -> Result<Vec<Device>, ServiceError>;
    async fn rename_device(
        &self,
        device_id: &str,
        name: &str,
    ) -> Result<Option<Device>, ServiceError>;
    /// Returns whether a row was removed.
    async fn delete_device(&self, device_id: &str) -> Result<bool, ServiceError>;

    async fn list_credentials(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<WebauthnCredential>, ServiceError>;
    async fn insert_credential(&self, credential: &WebauthnCredential)
        -> Result<(), ServiceError>;
    async fn update_credential(&self, credential_id: &str, passkey: &str)
        -> Result<(), ServiceError>;

    /// Current revocation marker for the user, zero when never revoked.
    async fn revocation_marker(&self, user_id: Uuid) -> Result<i64, ServiceError>;
    /// Advance the marker and return the new value. Never decreases.
    async fn advance_revocation_marker(&self, user_id: Uuid) -> Result<i64, ServiceError>;
}

#[derive(Default)]
struct MockState {
    users: HashMap<Uuid, User>,
    oauth: Vec<OAuthConnection>,
    devices: HashMap<String, Device>,
    credentials: Vec<WebauthnCredential>,
    markers: HashMap<Uuid, i64>,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MockStore {
    state: Mutex<MockState>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MockState>, ServiceError> {
        self.state
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Mock store mutex poisoned: {}", e)))
    }
}

#[async_trait]
impl Store for MockStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let email = crate::models::normalize_email(email);
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(self.lock()?.users.get(&user_id).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(ServiceError::Conflict("already exists".to_string()));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        let user = state.users.get_mut(&user_id).ok_or(ServiceError::NotFound)?;
        user.password = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn find_user_by_oauth(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<User>, ServiceError> {
        let state = self.lock()?;
        Ok(state
            .oauth
            .iter()
            .find(|c| c.provider == provider && c.provider_id == provider_id)
            .and_then(|c| state.users.get(&c.user_id).cloned()))
    }

    async fn link_oauth(&self, connection: &OAuthConnection) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        if !state
            .oauth
            .iter()
            .any(|c| c.provider == connection.provider && c.provider_id == connection.provider_id)
        {
            state.oauth.push(connection.clone());
        }
        Ok(())
    }

    async fn upsert_device(&self, device: &Device) -> Result<Device, ServiceError> {
        let mut state = self.lock()?;
        let stored = state
            .devices
            .entry(device.id.clone())
            .and_modify(|d| d.last_active = Utc::now())
            .or_insert_with(|| device.clone());
        Ok(stored.clone())
    }

    async fn find_device(&self, device_id: &str) -> Result<Option<Device>, ServiceError> {
        Ok(self.lock()?.devices.get(device_id).cloned())
    }

    async fn list_devices(&self, user_id: Uuid) -> Result<Vec<Device>, ServiceError> {
        let mut devices: Vec<Device> = self
            .lock()?
            .devices
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        devices.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        Ok(devices)
    }

    async fn rename_device(
        &self,
        device_id: &str,
        name: &str,
    ) -> Result<Option<Device>, ServiceError> {
        let mut state = self.lock()?;
        Ok(state.devices.get_mut(device_id).map(|d| {
            d.name = name.to_string();
            d.clone()
        }))
    }

    async fn delete_device(&self, device_id: &str) -> Result<bool, ServiceError> {
        Ok(self.lock()?.devices.remove(device_id).is_some())
    }

    async fn list_credentials(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<WebauthnCredential>, ServiceError> {
        Ok(self
            .lock()?
            .credentials
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_credential(
        &self,
        credential: &WebauthnCredential,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        if state.credentials.iter().any(|c| c.id == credential.id) {
            return Err(ServiceError::Conflict("already exists".to_string()));
        }
        state.credentials.push(credential.clone());
        Ok(())
    }

    async fn update_credential(
        &self,
        credential_id: &str,
        passkey: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        let credential = state
            .credentials
            .iter_mut()
            .find(|c| c.id == credential_id)
            .ok_or(ServiceError::NotFound)?;
        credential.passkey = passkey.to_string();
        credential.last_used_at = Some(Utc::now());
        Ok(())
    }

    async fn revocation_marker(&self, user_id: Uuid) -> Result<i64, ServiceError> {
        Ok(self.lock()?.markers.get(&user_id).copied().unwrap_or(0))
    }

    async fn advance_revocation_marker(&self, user_id: Uuid) -> Result<i64, ServiceError> {
        let mut state = self.lock()?;
        let marker = state.markers.entry(user_id).or_insert(0);
        *marker += 1;
        Ok(*marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceFingerprint;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_upsert_device_converges_on_one_row() {
        let store = MockStore::new();
        let uid = Uuid::new_v4();
        let fp = DeviceFingerprint::new(Ipv4Addr::new(1, 2, 3, 4), "UA/1");

        let first = store.upsert_device(&fp.to_device(uid)).await.unwrap();
        store.rename_device(&first.id, "Laptop").await.unwrap();
        let second = store.upsert_device(&fp.to_device(uid)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Laptop");
        assert_eq!(store.list_devices(uid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_revocation_marker_is_monotonic() {
        let store = MockStore::new();
        let uid = Uuid::new_v4();
        assert_eq!(store.revocation_marker(uid).await.unwrap(), 0);
        assert_eq!(store.advance_revocation_marker(uid).await.unwrap(), 1);
        assert_eq!(store.advance_revocation_marker(uid).await.unwrap(), 2);
        assert_eq!(store.revocation_marker(uid).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MockStore::new();
        let a = User::new("A".into(), "a@b.c", "h".into(), None);
        let b = User::new("B".into(), "A@B.C", "h".into(), None);
        store.insert_user(&a).await.unwrap();
        assert!(matches!(
            store.insert_user(&b).await,
            Err(ServiceError::Conflict(_))
        ));
    }
}
