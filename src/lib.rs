pub mod apis;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod pipeline;
