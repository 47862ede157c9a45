//! Wire types shared by the Pledge REST API and the chat gateway.

pub mod api;
pub mod events;
pub mod models;
