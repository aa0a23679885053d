//! cft-lib: Core types and logic for the Cloud Foundation deployment tool
//!
//! This crate turns a set of Deployment Manager configs into an ordered,
//! dependency-aware run:
//! - `config`: loading, rendering and identifying configs
//! - `reference`: cross-deployment output references
//! - `graph`: the dependency graph and its levels
//! - `deployment`: create/update/delete/preview of one config
//! - `execute`: running an action over all levels
//! - `remote`: the provisioning API and its implementations

pub mod config;
pub mod consts;
pub mod deployment;
pub mod document;
pub mod execute;
pub mod graph;
pub mod reference;
pub mod remote;
pub mod render;
pub mod types;
