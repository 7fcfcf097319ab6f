// Checkout flow
pub mod checkout;
