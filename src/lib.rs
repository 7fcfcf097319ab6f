//! Food Checkout Library
//!
//! Client-side checkout for the food delivery platform: loads an unpaid
//! order, hands payment to a hosted gateway, verifies the result with the
//! backend and releases orders that are abandoned or fail.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod cache;
pub mod config;
pub mod errors;
pub mod events;
pub mod gateways;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;

pub use config::{load_config, CheckoutConfig};
pub use errors::{CheckoutError, ServiceError};
pub use services::checkout::{
    CheckoutController, CheckoutSettings, CheckoutState, CheckoutStep, Conclusion, Outcome,
    ReturnParams, Teardown,
};
