//! Server-rendered web frontend for the Socio social network.
//!
//! Each browser session gets its own view models (feed, composer, profile),
//! driven through [`api::SocioApi`] and rendered to HTML by [`templates`].

pub mod api;
pub mod auth;
pub mod config;
pub mod core;
pub mod follow;
pub mod handlers;
pub mod models;
pub mod posts;
pub mod session;
pub mod sync;
pub mod templates;
pub mod users;
