// Order data as seen by the client
pub mod order;
// Payment gateway payloads
pub mod payment;

pub use order::{BuyerInfo, Order, OrderId, OrderStatus};
pub use payment::{
    ClientEnvironment, DeliveryMode, GatewayResult, PaymentAttemptId, PaymentDispatch,
    PaymentRequest, PaymentVerification,
};
