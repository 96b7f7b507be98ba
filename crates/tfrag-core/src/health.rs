//! Health report for the vector store and configured collections.

use serde::{Deserialize, Serialize};

use crate::db_adapter::LazyStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Store reachable but some collections are missing.
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionHealth {
    pub name: String,
    /// `None` when the collection does not exist.
    pub documents: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub message: String,
    /// "connected" or "unavailable".
    pub vector_db_status: String,
    pub documents_count: Option<usize>,
    pub collections: Vec<CollectionHealth>,
}

pub const VECTOR_DB_CONNECTED: &str = "connected";
pub const VECTOR_DB_UNAVAILABLE: &str = "unavailable";

/// Count documents across `collections`.
pub fn check_health(store: &LazyStore, collections: &[String]) -> HealthReport {
    if let Err(e) = store.store() {
        return HealthReport {
            status: HealthStatus::Unhealthy,
            message: e.to_string(),
            vector_db_status: VECTOR_DB_UNAVAILABLE.to_string(),
            documents_count: None,
            collections: Vec::new(),
        };
    }

    let mut report = Vec::with_capacity(collections.len());
    let mut errors = Vec::new();
    for name in collections {
        match store.collection_count(name) {
            Ok(documents) => report.push(CollectionHealth {
                name: name.clone(),
                documents,
            }),
            Err(e) => {
                tracing::warn!("Could not count collection '{}': {}", name, e);
                errors.push(format!("{}: {}", name, e));
                report.push(CollectionHealth {
                    name: name.clone(),
                    documents: None,
                });
            }
        }
    }

    let total: usize = report.iter().filter_map(|c| c.documents).sum();
    let missing: Vec<&str> = report
        .iter()
        .filter(|c| c.documents.is_none())
        .map(|c| c.name.as_str())
        .collect();

    let (status, message) = if missing.is_empty() {
        (
            HealthStatus::Healthy,
            format!("{} documents in {} collections", total, report.len()),
        )
    } else if errors.is_empty() {
        (
            HealthStatus::Degraded,
            format!("Missing collections: {}", missing.join(", ")),
        )
    } else {
        (HealthStatus::Degraded, errors.join("; "))
    };

    HealthReport {
        status,
        message,
        vector_db_status: VECTOR_DB_CONNECTED.to_string(),
        documents_count: Some(total),
        collections: report,
    }
}
