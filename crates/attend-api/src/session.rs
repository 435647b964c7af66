//! Signed-in employee session, persisted through the injected store.

use crate::types::Employee;
use attend_core::store::{get_json, set_json, KEY_EMPLOYEE, KEY_SESSION};
use attend_core::{KeyValueStore, LocationCache, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub employee_id: String,
    #[serde(default)]
    pub token: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(employee_id: impl Into<String>, token: Option<String>) -> Self {
        Self {
            employee_id: employee_id.into(),
            token,
            started_at: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn save(&self, session: &Session) -> Result<(), StoreError> {
        set_json(self.store.as_ref(), KEY_SESSION, session).await
    }

    pub async fn load(&self) -> Result<Option<Session>, StoreError> {
        get_json(self.store.as_ref(), KEY_SESSION).await
    }

    pub async fn save_employee(&self, employee: &Employee) -> Result<(), StoreError> {
        set_json(self.store.as_ref(), KEY_EMPLOYEE, employee).await
    }

    pub async fn load_employee(&self) -> Result<Option<Employee>, StoreError> {
        get_json(self.store.as_ref(), KEY_EMPLOYEE).await
    }

    /// End the session: forget the employee and every cached position and
    /// geofence, so nothing leaks to the next person using the device.
    ///
    /// Every step is attempted even if an earlier one fails; the first error
    /// is returned.
    pub async fn logout(&self) -> Result<(), StoreError> {
        let mut first_err = None;
        for key in [KEY_SESSION, KEY_EMPLOYEE] {
            if let Err(e) = self.store.remove(key).await {
                tracing::warn!(key, error = %e, "failed to remove session entry");
                first_err.get_or_insert(e);
            }
        }
        if let Err(e) = LocationCache::new(self.store.clone()).clear().await {
            first_err.get_or_insert(e);
        }
        tracing::info!("session ended");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
