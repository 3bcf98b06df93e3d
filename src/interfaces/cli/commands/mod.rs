pub mod config_management;
pub mod definition;
pub mod queue;
