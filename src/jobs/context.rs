use std::sync::Arc;

use crate::{
    bridge::AsyncBridge, events::Broadcaster, settings::EngineSettings, store::ScanStore,
};

use super::{cancel::Cancellations, lock::DeviceLocks};

/// Shared plumbing handed to every runner. Cheap to clone.
#[derive(Clone)]
pub struct JobContext {
    pub locks: DeviceLocks,
    pub cancellations: Cancellations,
    pub events: Broadcaster,
    pub bridge: AsyncBridge,
    pub store: Arc<dyn ScanStore>,
    pub settings: Arc<EngineSettings>,
}

impl JobContext {
    pub fn new(
        events: Broadcaster,
        bridge: AsyncBridge,
        store: Arc<dyn ScanStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            locks: DeviceLocks::new(),
            cancellations: Cancellations::new(),
            events,
            bridge,
            store,
            settings: Arc::new(settings),
        }
    }
}
