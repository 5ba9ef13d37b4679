use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::Config;
use crate::notify::Notifier;
use crate::observability::metrics::Metrics;
use crate::registry::DriverRegistry;
use crate::store::TripStore;
use crate::transport::ChannelHub;

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub rounds: u32,
    pub offer_timeout: Duration,
}

pub struct AppState {
    pub trips: TripStore,
    pub drivers: DriverRegistry,
    pub hub: ChannelHub,
    pub dispatch_tx: mpsc::Sender<Uuid>,
    pub settings: DispatchSettings,
    pub notifier: Notifier,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config) -> (Self, mpsc::Receiver<Uuid>) {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.dispatch_queue_size);

        (
            Self {
                trips: TripStore::new(),
                drivers: DriverRegistry::new(),
                hub: ChannelHub::new(config.event_buffer_size),
                dispatch_tx,
                settings: DispatchSettings {
                    rounds: config.dispatch_rounds,
                    offer_timeout: Duration::from_millis(config.offer_timeout_ms),
                },
                notifier: Notifier::new(config.notify_webhook_url.clone()),
                metrics: Metrics::new(),
            },
            dispatch_rx,
        )
    }
}
