//! # ofx-host - OpenFX image effect hosting
//!
//! Loads OpenFX image effect bundles and exposes each effect as an image
//! node: its parameters become typed slots, its clips become node inputs and
//! rendering happens under the caller's evaluation context (time, region,
//! default format).
//!
//! ## Core Features
//!
//! - **Discovery**: scans `*.ofx.bundle` directories on the configured and
//!   standard search paths, with a JSON cache of what was found
//! - **Binding**: describes an effect once and shares the schema between nodes
//! - **Parameters**: nested, typed slots with validation and rollback
//! - **Geometry**: the project follows the first connected source, else the
//!   default format, re-read on every evaluation
//! - **Concurrency**: renders serialize per instance; re-targeting or
//!   destroying a node waits for in-flight renders
//!
//! See [`plugin_host`] for the module layout.

pub mod plugin_host;
