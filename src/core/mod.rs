pub mod analysis;
pub mod config;
pub mod error;
pub mod script;
pub mod state;
