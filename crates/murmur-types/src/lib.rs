//! Types shared between the murmur persistence layer, HTTP API and clients.

pub mod api;
pub mod events;
pub mod models;
pub mod tracking;

pub use models::{Category, Priority, Role, Status};
