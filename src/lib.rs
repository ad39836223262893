//! Core library for now-playing-widget
pub mod config;
pub mod models;
pub mod api;
pub mod normalize;
pub mod cors;
pub mod error;
pub mod server;
pub mod poller;
pub mod weather;
pub mod util;
