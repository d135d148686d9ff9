use std::sync::Arc;

use finder_core::LatLng;
use finder_engine::LatestOnly;

use crate::{ApiError, BackendClient};

/// Resolves map clicks to addresses.
///
/// Only the latest click counts: a new lookup aborts the pending one, so a
/// slow answer for an earlier click never overwrites a newer address.
pub struct AddressLookup {
    client: Arc<BackendClient>,
    latest: LatestOnly,
}

impl AddressLookup {
    pub fn new(client: Arc<BackendClient>) -> Self {
        AddressLookup {
            client,
            latest: LatestOnly::new(),
        }
    }

    /// Address of `point`, or `None` when a newer lookup superseded this one.
    pub async fn lookup(&self, point: LatLng) -> Option<Result<String, ApiError>> {
        let client = Arc::clone(&self.client);
        self.latest
            .run(async move { client.reverse_geocode(point).await })
            .await
    }

    pub fn cancel(&self) {
        self.latest.cancel();
    }
}
