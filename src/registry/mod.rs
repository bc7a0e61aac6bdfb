pub mod auth;
pub mod client;

pub use auth::{parse_challenge, BearerChallenge};
pub use client::{GhcrClient, RegistryGateway};
