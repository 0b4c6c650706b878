//! Infrastructure for the shelf audit: configuration, storage backends, and the
//! application service that ties the domain to them.

pub mod config;
pub mod service;
pub mod store;
