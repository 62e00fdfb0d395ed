//! Rights evaluation for device-scoped operations.

use std::sync::Arc;

use super::error::ServiceError;
use super::store::Store;
use crate::models::Caller;

#[derive(Clone)]
pub struct RightsEvaluator {
    store: Arc<dyn Store>,
}

impl RightsEvaluator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Admins may act on any device. Everyone else only on their own.
    ///
    /// Performs at most one device lookup, and none for admins. An unknown
    /// device is denied like a foreign one.
    pub async fn authorize_device(
        &self,
        caller: &Caller,
        device_id: &str,
    ) -> Result<(), ServiceError> {
        if caller.is_admin() {
            return Ok(());
        }

        match self.store.find_device(device_id).await? {
            Some(device) if device.user_id == caller.uid => Ok(()),
            _ => {
                tracing::info!(user_id = %caller.uid, device_id, "Device operation denied");
                Err(ServiceError::Forbidden)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceFingerprint, Role, ADMIN_ROLE};
    use crate::services::store::MockStore;
    use std::net::Ipv4Addr;
    use uuid::Uuid;

    async fn owned_device(store: &MockStore, owner: Uuid) -> String {
        let fp = DeviceFingerprint::new(Ipv4Addr::new(10, 0, 0, 1), "UA/1");
        store.upsert_device(&fp.to_device(owner)).await.unwrap().id
    }

    #[tokio::test]
    async fn test_owner_allowed_stranger_denied() {
        let store = Arc::new(MockStore::new());
        let owner = Uuid::new_v4();
        let device_id = owned_device(&store, owner).await;
        let rights = RightsEvaluator::new(store);

        assert!(rights
            .authorize_device(&Caller::new(owner, vec![]), &device_id)
            .await
            .is_ok());
        assert!(matches!(
            rights
                .authorize_device(&Caller::new(Uuid::new_v4(), vec![]), &device_id)
                .await,
            Err(ServiceError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_admin_allowed_on_any_device() {
        let store = Arc::new(MockStore::new());
        let device_id = owned_device(&store, Uuid::new_v4()).await;
        let rights = RightsEvaluator::new(store);
        let admin = Caller::new(Uuid::new_v4(), vec![Role::new(1, ADMIN_ROLE)]);

        assert!(rights.authorize_device(&admin, &device_id).await.is_ok());
        assert!(rights.authorize_device(&admin, "missing").await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_device_is_forbidden() {
        let rights = RightsEvaluator::new(Arc::new(MockStore::new()));
        assert!(matches!(
            rights
                .authorize_device(&Caller::new(Uuid::new_v4(), vec![]), "nope")
                .await,
            Err(ServiceError::Forbidden)
        ));
    }
}
