//! Infrastructure layer: credential verifiers, relay transports and DTOs.

pub mod auth;
pub mod dto;
pub mod relay;
