//! Native OpenFX plugin support
//!
//! ```text
//! ┌──────────────┐  libloading   ┌────────────────────┐
//! │ BundleCache  │──────────────▶│ Bundle (.ofx)       │
//! └──────┬───────┘               │ OfxGetPlugin(n)     │
//!        │                       └─────────┬──────────┘
//!        ▼                                 │ mainEntry(action, handle, in, out)
//! ┌────────────────────┐                   ▼
//! │ BinaryEffectPlugin │──────▶ ┌──────────────────────┐
//! │ BinaryInstance     │        │ host suites          │
//! └────────────────────┘        │ property / effect /  │
//!                               │ param / memory / MT  │
//!                               └──────────────────────┘
//! ```

pub mod abi;
pub mod binary;
pub mod bundle;
pub mod handles;
pub mod property;
pub mod suites;

pub use binary::{BinaryEffectPlugin, BinaryInstance};
pub use bundle::{Bundle, BundleCache};
pub use property::PropertySet;
