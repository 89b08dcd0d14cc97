mod memory;
mod model;
mod postgres;
mod service;
mod store;

pub use memory::MemoryBookingStore;
pub use model::{Booking, NewBooking, TimingView};
pub use postgres::PgBookingStore;
pub use service::{BookingError, BookingService};
pub use store::{BookingStore, StoreError};
