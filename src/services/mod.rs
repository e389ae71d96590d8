pub mod booking;
pub mod notifications;
