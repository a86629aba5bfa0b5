pub mod cli;
pub mod database_ops;
pub mod error;
pub mod normalization;
pub mod orchestrator;
pub mod telemetry;

pub mod util {
    pub mod db;
    pub mod env;
    pub mod retry;
}
