pub mod availability;
pub mod bookings;
pub mod calendar;
pub mod core;
pub mod enrollments;
pub mod lessons;
pub mod notifications;
pub mod patterns;
pub mod setup;
