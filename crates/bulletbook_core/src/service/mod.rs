//! Use-case services on top of catalogs.
//!
//! # Responsibility
//! - Orchestrate catalog calls into desk-level operations.
//! - Keep callers decoupled from storage details.

pub mod desk_service;
pub mod input;
pub mod scheduler;
pub mod transfer;
