pub mod bookings;
pub mod health;
pub mod leaves;
pub mod notifications;
pub mod slots;
