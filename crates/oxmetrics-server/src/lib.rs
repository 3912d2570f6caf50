//! The oxmetrics server: accepts metric updates over HTTP and serves them
//! back from a [`backend::Backend`] chosen at startup.

pub mod api;
pub mod app;
pub mod backend;
pub mod config;
pub mod flush;
pub mod logging;
pub mod state;
