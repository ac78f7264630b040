//! Start coordinator for connbench
//!
//! A tiny HTTP service handing out globally ordered start tokens to
//! independent load-generator processes, plus the client those processes
//! use to fetch them. Each token assigns a disjoint block of client ids and
//! a staggered ramp delay, so many generators can share one broker without
//! colliding or all connecting at once.

#![warn(missing_docs)]

pub mod app;
pub mod client;
pub mod error;
pub mod service;

pub use app::{build_router, serve, serve_on, AppState, Health};
pub use client::{TokenClient, DEFAULT_FETCH_TIMEOUT};
pub use error::CoordinatorError;
pub use service::{CoordinatorConfig, StartCoordinator, DEFAULT_BIND, DEFAULT_TIME_STEP};
