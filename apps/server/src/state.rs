use std::sync::Arc;

use crate::auth::CredentialVerifier;
use crate::bookings::{BookingService, BookingStore};
use crate::registry::SessionRegistry;
use crate::time_window::Clock;

#[derive(Clone)]
pub struct AppState {
    /// Live session rooms, shared by every relay connection.
    pub registry: Arc<SessionRegistry>,
    pub bookings: BookingService,
    pub verifier: Arc<dyn CredentialVerifier>,
    /// Wall clock in the schedule's offset.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn BookingStore>,
        verifier: Arc<dyn CredentialVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            bookings: BookingService::new(store),
            verifier,
            clock,
        }
    }
}
