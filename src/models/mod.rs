pub mod booking;
pub mod leave;
pub mod notification;
pub mod slot;
pub mod therapist;
