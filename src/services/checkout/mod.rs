//! Checkout session controller: takes an unpaid order through payment,
//! verification and cleanup.

pub mod controller;
pub mod return_params;
pub mod session;

pub use controller::{
    CheckoutController, CheckoutSettings, CheckoutStep, Conclusion, Navigation, Teardown,
};
pub use return_params::{return_target, ReturnParams};
pub use session::{AlreadySettled, CheckoutSession, CheckoutState, Outcome};
