pub mod attendee;
pub mod cancellation;
pub mod coupon;
pub mod payment;
pub mod reservation;
pub mod resource;
