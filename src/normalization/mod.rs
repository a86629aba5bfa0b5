pub mod calendar;
pub mod measures;
pub mod names;
