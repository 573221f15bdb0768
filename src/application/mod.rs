//! Application services: one per aggregate, plus feed assembly.

pub mod engagement;
pub mod error;
pub mod feed;
pub mod follows;
mod hydrate;
pub mod pagination;
pub mod posts;
pub mod repos;
pub mod services;
pub mod sessions;
pub mod users;
