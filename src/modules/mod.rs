//! Modules layer - Infrastructure components for external integrations
//!
//! Contains the object-store client and the storage adapter built on it.

pub mod storage;
