//! Alert model, key-value backed persistence, and the alerting service.

pub mod monitor;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::{CsmError, Result};
use crate::storage::KeyValueStorage;

/// Alert severity, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Informational,
    Warning,
    Critical,
}

/// A single alert record as produced by a product plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Stable identifier assigned by the producing plugin.
    pub id: String,
    /// Detection time.
    pub timestamp: DateTime<Utc>,
    /// Alert severity.
    pub severity: Severity,
    /// Subsystem the alert originates from.
    pub module: String,
    /// Human-readable description.
    pub description: String,
    /// Whether an operator has acknowledged the alert.
    pub acknowledged: bool,
}

impl Alert {
    /// Build a fresh, unacknowledged alert stamped with the current time.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        module: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now(),
            severity,
            module: module.into(),
            description: description.into(),
            acknowledged: false,
        }
    }
}

/// Key prefix separating alert records from other storage tenants.
const ALERT_KEY_PREFIX: &str = "alert:";

/// Alert persistence over a key-value backing.
#[derive(Clone, Debug)]
pub struct AlertStorage {
    backing: Arc<dyn KeyValueStorage>,
}

impl AlertStorage {
    /// Wrap a key-value backing.
    #[must_use]
    pub fn new(backing: Arc<dyn KeyValueStorage>) -> Self {
        Self { backing }
    }

    /// Persist an alert, replacing any record with the same id.
    pub fn store(&self, alert: &Alert) -> Result<()> {
        let value = serde_json::to_value(alert)?;
        self.backing.put(&alert_key(&alert.id), value)
    }

    /// Fetch a single alert by id.
    pub fn retrieve(&self, id: &str) -> Result<Option<Alert>> {
        match self.backing.get(&alert_key(id))? {
            Some(value) => Ok(Some(decode(value)?)),
            None => Ok(None),
        }
    }

    /// Fetch all alerts, oldest first.
    pub fn retrieve_all(&self) -> Result<Vec<Alert>> {
        let mut alerts = Vec::new();
        for key in self.backing.keys()? {
            if !key.starts_with(ALERT_KEY_PREFIX) {
                continue;
            }
            if let Some(value) = self.backing.get(&key)? {
                alerts.push(decode(value)?);
            }
        }
        alerts.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(alerts)
    }
}

fn alert_key(id: &str) -> String {
    format!("{ALERT_KEY_PREFIX}{id}")
}

fn decode(value: serde_json::Value) -> Result<Alert> {
    serde_json::from_value(value).map_err(|e| CsmError::Storage {
        context: "alert decode",
        details: e.to_string(),
    })
}

/// Query/update surface the API layer exposes over stored alerts.
#[derive(Clone, Debug)]
pub struct AlertsService {
    storage: AlertStorage,
}

impl AlertsService {
    /// Build the service over its storage. The storage must already exist;
    /// the service never creates backings of its own.
    #[must_use]
    pub fn new(storage: AlertStorage) -> Self {
        Self { storage }
    }

    /// All alerts, oldest first.
    pub fn list(&self) -> Result<Vec<Alert>> {
        self.storage.retrieve_all()
    }

    /// Number of stored alerts.
    pub fn count(&self) -> Result<usize> {
        Ok(self.storage.retrieve_all()?.len())
    }

    /// Mark an alert acknowledged. Returns the updated record, or `None`
    /// when no alert has that id.
    pub fn acknowledge(&self, id: &str) -> Result<Option<Alert>> {
        match self.storage.retrieve(id)? {
            Some(mut alert) => {
                alert.acknowledged = true;
                self.storage.store(&alert)?;
                Ok(Some(alert))
            }
            None => Ok(None),
        }
    }
}
