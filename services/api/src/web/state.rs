//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use booking_core::booking::BookingManager;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<BookingManager>,
    pub config: Arc<Config>,
}
