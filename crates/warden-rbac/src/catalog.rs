//! Identity service catalog, fetched once per process.
use crate::errors::{RbacError, RbacResult};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use warden_identity::IdentityClient;

/// Write-once cache of the service names known to the identity backend.
pub struct ServiceCatalog {
    identity: Arc<dyn IdentityClient>,
    services: OnceCell<BTreeSet<String>>,
}

impl ServiceCatalog {
    pub fn new(identity: Arc<dyn IdentityClient>) -> Self {
        Self {
            identity,
            services: OnceCell::new(),
        }
    }

    /// Enumerate enabled services, lower-cased, cached for the process life.
    pub async fn available_services(&self) -> RbacResult<&BTreeSet<String>> {
        self.services
            .get_or_try_init(|| async {
                let records = self.identity.list_services().await?;
                let names: BTreeSet<String> = records
                    .into_iter()
                    .filter(|record| record.enabled)
                    .map(|record| record.name.to_lowercase())
                    .collect();
                tracing::debug!(services = names.len(), "identity catalog cached");
                Ok::<_, RbacError>(names)
            })
            .await
    }

    pub async fn validate(&self, service: &str) -> RbacResult<()> {
        if self.available_services().await?.contains(service) {
            Ok(())
        } else {
            Err(RbacError::InvalidService(service.to_string()))
        }
    }
}
