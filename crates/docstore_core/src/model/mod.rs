//! Domain model for persisted documents and their analyses.
//!
//! # Responsibility
//! - Define the entity shapes the persistence layer reads and writes.
//! - Define the base audit/soft-delete attributes every entity carries.
//!
//! # Invariants
//! - Every entity is identified by a stable `EntityId`.
//! - Audit fields are stamped by the save pipeline, never by callers.
//! - Deletion is represented by soft-delete tombstones, not hard delete.

pub mod analysis;
pub mod document;
pub mod entity;
