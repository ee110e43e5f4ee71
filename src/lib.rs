//! `ovms-adapter` — model-mesh runtime adapter for OpenVINO Model Server
//! style backends.
//!
//! The backend only understands a static, file-based multi-model JSON
//! configuration; the mesh control plane speaks a load/unload/status RPC
//! contract. This crate sits between the two as a sidecar and translates
//! each call into artifact placement, an atomic config-document rewrite, a
//! triggered hot reload, and verification of the backend's per-model status.
//!
//! | Concern | Module |
//! |---------|--------|
//! | Artifact placement | [`placement`] |
//! | Size estimation | [`sizing`] |
//! | Config document store | [`store`] |
//! | Reload coordination | [`reload`] |
//! | RPC surface | [`server`] |
//!
//! The document mutation and the reload are deliberately not transactional:
//! a transport failure after persist leaves a drift window the mesh resolves
//! by retrying, which re-applies the same name-keyed mutation.

pub mod config;
pub mod error;
pub mod model;
pub mod placement;
pub mod reload;
pub mod server;
pub mod sizing;
pub mod store;

pub use config::AdapterConfig;
pub use error::{AdapterError, AdapterResult};
pub use server::{AdapterServer, AppState};
