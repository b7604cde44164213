//! Concrete adapters for the port traits.

pub mod csv_adapter;
pub mod file_config_adapter;
