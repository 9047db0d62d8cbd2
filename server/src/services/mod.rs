pub mod access;
pub mod availability;
pub mod clock;
pub mod coupons;
pub mod credentials;
pub mod lifecycle;
pub mod notifier;
pub mod payment_gateway;
pub mod pricing;
pub mod slots;
