//! RapidKit Core - Module composition engine
//!
//! This library installs declarative modules into application projects and
//! keeps track of every file it writes so later runs can diff, merge,
//! roll back or uninstall them safely. It is used by the `rapidkit` binary
//! but can be embedded by any tool that manages RapidKit projects.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! - **Layer 1: Building blocks** - manifests, template rendering, file hashing,
//!   the file-state registry and the snippet injector
//! - **Layer 2: Extension points** - framework plugins and manifest overrides
//! - **Layer 3: Operations** - [`ModuleGenerator`] and the [`lifecycle`] commands
//! - **Layer 4: Interactive prompts** - optional cliclack prompts (feature-gated)
//!
//! # Feature Flags
//!
//! - `jinja` (default): Renders templates with minijinja; without it only the
//!   built-in `{{ var }}` fallback renderer is available
//! - `tui` (default): Enables the cliclack-based merge prompter
//!
//! # Example Usage
//!
//! ```ignore
//! use rapidkit_core::{EngineConfig, GenerateOptions, ModuleGenerator};
//!
//! let config = EngineConfig::from_env();
//! let generator = ModuleGenerator::new("modules", config);
//! let report = generator.generate("free/essentials/logging", project_root, &GenerateOptions {
//!     profile: Some("fastapi/standard".into()),
//!     ..GenerateOptions::default()
//! })?;
//! ```

pub mod config;
pub mod deps;
pub mod error;
pub mod fsutil;
pub mod generator;
pub mod lifecycle;
pub mod lock;
pub mod manifest;
pub mod overrides;
pub mod plugins;
pub mod render;
pub mod snippets;
pub mod state;
pub mod versioning;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use generator::{GenerateOptions, GenerateReport, GenerationPlan, ModuleGenerator, ModuleReport};
pub use manifest::{compute_install_order, LoadedModule, ModuleManifest};
pub use plugins::{FrameworkPlugin, PluginRegistry};
pub use render::TemplateRenderer;
pub use snippets::SnippetInjector;
pub use state::{FileState, FileStateStore};
pub use versioning::AutoVersioner;

#[cfg(feature = "tui")]
pub use tui::ClackMergePrompter;

/// Engine version recorded in generated reports
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
