//! Floe, a dynamic module framework for chat bots.
//!
//! The crate is built around a generic module registry and two
//! specializations of it:
//!
//! - [`registry::ModuleRegistry`] owns the live modules of one kind and
//!   provides the load / register / remove / hot-reload lifecycle through
//!   the [`registry::Registry`] trait.
//! - [`commands::CommandRegistry`] specializes it for chat commands:
//!   alias indexing, prefix resolution, permission checks and dispatch.
//! - [`listeners::ListenerRegistry`] specializes it for event-driven
//!   modules bound to named [`emitter::Emitter`] sources.
//!
//! Module sources are discovered by scanning a directory tree and turned
//! into instances by a pluggable [`loader::ModuleLoader`]; the chat
//! platform itself is an external collaborator represented only by
//! [`message::Message`] and an event [`emitter::Emitter`].

pub mod commands;
pub mod config;
pub mod emitter;
pub mod errors;
pub mod listeners;
pub mod loader;
pub mod message;
pub mod module;
pub mod registry;
pub mod unique_map;

pub use commands::{Command, CommandContext, CommandRegistry, Dispatch, PermissionSide, PermissionSpec, Prefix};
pub use config::{CommandConfig, RegistryConfig};
pub use emitter::{Emitter, EventHandler, SubscriptionId};
pub use errors::{Error, Result};
pub use listeners::{Listener, ListenerKind, ListenerRegistry};
pub use loader::{LibraryLoader, ModuleLoader, StaticLoader};
pub use message::{ClientInfo, Message};
pub use module::{Module, ModuleEntry};
pub use registry::{GenericRegistry, ModuleRegistry, Registry};
