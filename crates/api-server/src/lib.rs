#![warn(clippy::unwrap_used)]

pub mod points_rest;
pub mod referral_rest;
pub mod rest;
pub mod server;

pub use server::ApiServer;
