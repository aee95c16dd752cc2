//! Layered settings
//!
//! Settings are merged from these sources (later sources override earlier):
//!
//! 1. **Global** - `<config_dir>/decksync/config.toml`
//! 2. **Project** - `deck.toml` in the working directory, or `--config FILE`
//! 3. **Local overrides** - `deck.local.toml` (keep it out of version control)
//! 4. **Flags and environment** - applied by the CLI through
//!    [`ConfigResolver::resolve_with`]
//!
//! # Example
//!
//! ```ignore
//! use deck_core::config::ConfigResolver;
//!
//! let settings = ConfigResolver::new(".").resolve()?;
//! let gateway = settings.gateway_store();
//! let control_plane = settings.control_plane_store()?;
//! ```

mod manifest;
mod resolver;

pub use manifest::{ControlPlaneSection, GatewaySection, Manifest, SyncSection};
pub use resolver::{
    ConfigResolver, DEFAULT_CONTROL_PLANE_URL, DEFAULT_GATEWAY_URL, LOCAL_CONFIG, PROJECT_CONFIG,
    Settings,
};
