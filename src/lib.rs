//! # ferrous-lifecycle
//!
//! Lifecycle runtime for long-lived application objects: a strict
//! Detached / Deactivated / Activated / Destroyed state machine, declarative
//! dependency bindings that wire objects together on attach and unwind on
//! detach, and an ordered service registry driven in bulk passes.
//!
//! ## Features
//!
//! - **Strict state machine**: primitives check their precondition and never
//!   skip a state; [`ObjectGraph::force_state`] walks the path for you
//! - **Declarative bindings**: each type lists its bind points once in
//!   [`Lifecycle::declare_bindings`]; links are tracked by both endpoints
//! - **Broken dependencies**: a required link losing its target forces the
//!   dependent back to Detached; optional links just clear the field
//! - **Ordered services**: attach all, activate all, start all, then tick
//!   [`Updatable`] services in registration order
//! - **Error routing**: failing hooks are wrapped with the service identity
//!   and handed to an [`ErrorHandler`] that decides whether to re-raise
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use ferrous_lifecycle::{
//!     Application, BindTable, HookResult, Lifecycle, LifecycleState, ServiceBinding, Shared,
//!     Updatable,
//! };
//!
//! #[derive(Default)]
//! struct Input {
//!     pressed: bool,
//! }
//! impl Lifecycle for Input {}
//!
//! #[derive(Default)]
//! struct Player {
//!     input: Option<Shared<Input>>,
//!     moves: u32,
//! }
//!
//! impl Lifecycle for Player {
//!     fn declare_bindings(table: &mut BindTable<Self>) {
//!         table.service("input", ServiceBinding, |p: &mut Player| &mut p.input);
//!     }
//! }
//!
//! impl Updatable for Player {
//!     fn update(&mut self, _elapsed: Duration) -> HookResult {
//!         if let Some(input) = &self.input {
//!             if input.borrow().pressed {
//!                 self.moves += 1;
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut app = Application::new();
//! let input = app.register_instance(Input::default())?;
//! let player = app.register_updatable_instance(Player::default())?;
//! app.initialize()?;
//!
//! input.borrow_mut().pressed = true;
//! app.update_frame(Duration::from_millis(16))?;
//! assert_eq!(player.borrow().moves, 1);
//!
//! let id = app.service_id::<Player>().unwrap();
//! assert_eq!(app.graph().state(id)?, LifecycleState::Activated);
//! # Ok::<(), ferrous_lifecycle::LifecycleError>(())
//! ```
//!
//! ## Driving objects directly
//!
//! The [`ObjectGraph`] can be used without the registry:
//!
//! ```rust
//! use ferrous_lifecycle::{Lifecycle, LifecycleState, ObjectGraph};
//!
//! struct Door;
//! impl Lifecycle for Door {}
//!
//! let mut graph = ObjectGraph::new();
//! let door = graph.insert(Door);
//! assert!(graph.force_state(door, LifecycleState::Activated, true)?);
//! assert!(graph.status(door)?.is_started);
//!
//! // Activate is only legal from Deactivated.
//! assert!(graph.activate(door).unwrap_err().is_invalid_state());
//! # Ok::<(), ferrous_lifecycle::LifecycleError>(())
//! ```
//!
//! ## Cargo features
//!
//! - `diagnostics`: re-verify link bookkeeping after every link removal
//! - `config`: [`RuntimeOptions::from_json_str`]
//! - `graph-export`: JSON/YAML export of [`GraphSnapshot`] with timestamps
//! - `ahash`, `smallvec`, `performance`: faster internal collections

pub mod application;
pub mod config;
pub mod container;
pub mod dependency;
pub mod error;
pub mod graph_export;
pub mod key;
pub mod object;
pub mod observer;
pub mod services;
pub mod state;

mod internal;

pub use application::Application;
pub use config::{ConfigSource, EnvironmentConfigSource, MapConfigSource, RuntimeOptions, ENV_PREFIX};
pub use container::{Container, ContainerInterceptor};
pub use dependency::{
    from_collection_fn, from_fn, optional, AllOf, BindContext, BindTable, BindingPolicy,
    Candidate, CollectionFnPolicy, Constant, FnPolicy, LinkId, LinkInfo, Optional,
    ServiceBinding,
};
pub use error::{
    HookError, HookFailure, HookResult, LifecycleError, LifecycleResult, ServiceError,
};
pub use graph_export::{GraphSnapshot, LinkEdge, ObjectNode};
pub use key::TypeKey;
pub use object::{
    shared, AsAny, DynObject, Lifecycle, LifecycleCore, ObjectGraph, ObjectId, ObjectStatus,
    Shared,
};
pub use observer::{LifecycleObserver, LoggingObserver, MetricsObserver};
pub use services::{
    DefaultErrorHandler, ErrorHandler, ServiceInstance, ServiceKind, ServiceRegistry,
    Updatable, UpdateFn,
};
pub use state::{LifecycleState, LinkKind, Operation};
