//! Reactive keyed caching for remote resources, with a SQLite-backed
//! connection catalog as the worked example.

pub mod app;
pub mod catalog;
pub mod config;
pub mod event;
pub mod logging;
pub mod resource;
