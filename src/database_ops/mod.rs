pub mod box_office;
pub mod bridge;
pub mod date_dim;
pub mod dimensions;
pub mod facts;
pub mod memory;
pub mod model;
pub mod pass;
pub mod report;
pub mod source;
pub mod warehouse;

#[cfg(test)]
pub mod fixtures;
