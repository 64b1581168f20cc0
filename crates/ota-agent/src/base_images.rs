//! Base-image store.
//!
//! Delta reconstruction needs the image an ECU currently runs. The store is
//! parameterized by ECU id and injected into staging, rather than living as
//! an implicit global cache.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use ota_core::EcuId;
use parking_lot::RwLock;

/// Locally held base firmware images, keyed by ECU id.
#[derive(Debug, Default, Clone)]
pub struct BaseImageStore {
    images: Arc<RwLock<HashMap<EcuId, Bytes>>>,
}

impl BaseImageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the base image for an ECU.
    pub fn insert(&self, ecu_id: EcuId, image: Bytes) {
        self.images.write().insert(ecu_id, image);
    }

    /// Fetch the base image for an ECU, if known.
    #[must_use]
    pub fn get(&self, ecu_id: &EcuId) -> Option<Bytes> {
        self.images.read().get(ecu_id).cloned()
    }
}
