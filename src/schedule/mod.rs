pub mod availability;
pub mod booking;
pub mod calendar;
pub mod enrollments;
pub mod error;
pub mod hybrid;
pub mod interval;
pub mod lessons;
pub mod model;
pub mod notify;
pub mod patterns;
pub mod repo;
pub mod reschedule;
pub mod slots;

#[cfg(test)]
mod testutil;

pub use error::SchedError;
