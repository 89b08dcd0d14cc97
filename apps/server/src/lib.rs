pub mod auth;
pub mod bookings;
pub mod config;
pub mod error;
pub mod observability;
pub mod registry;
pub mod relay;
pub mod routes;
pub mod state;
pub mod time_window;
pub mod validation;
