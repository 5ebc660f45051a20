pub mod brew;
pub mod execution;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod sqlite;
pub mod state;
