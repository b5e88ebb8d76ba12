//! Domain model for bullets and the buckets that hold them.
//!
//! # Responsibility
//! - Define the single record shape shared by every bullet variant.
//! - Keep variant behavior as functions dispatched on `BulletKind`.
//!
//! # Invariants
//! - Every bullet is identified by an immutable `uid`; the integer `id` is
//!   bucket-scoped and reassigned on transfer.

pub mod bucket;
pub mod bullet;
pub mod clock;
pub mod patch;
