pub mod booking;
pub mod email;
pub mod leave;
pub mod notifications;
pub mod schedule_time;
pub mod slots;
