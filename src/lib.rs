//! DSA tutor backend: mastery tracking, adaptive practice selection, bounded tutoring sessions,
//! and progress analytics behind an Axum HTTP + WebSocket API.

pub mod analytics;
pub mod assistant;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod logic;
pub mod mastery;
pub mod protocol;
pub mod routes;
pub mod seeds;
pub mod selector;
pub mod session;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod util;
