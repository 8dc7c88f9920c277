pub mod config;
pub mod database;
pub mod messaging;
pub mod persistence;
