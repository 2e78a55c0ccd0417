//! Declarative bindings between lifecycle objects.
//!
//! A type declares its bind points once, in
//! [`Lifecycle::declare_bindings`](crate::Lifecycle::declare_bindings). On
//! attach, every bind point asks its [`BindingPolicy`] for a candidate; a
//! candidate that is itself a graph object produces a [`LinkId`] registered
//! with both endpoints. Detach releases lifecycle links, destroy releases all
//! of them, and a required link losing its target forces the dependent back
//! to Detached.

mod binding;
mod link;
mod resolve;
mod resolver;
mod table;

pub use binding::{
    from_collection_fn, from_fn, optional, AllOf, BindContext, BindingPolicy, Candidate,
    CollectionFnPolicy, Constant, FnPolicy, Optional, ServiceBinding,
};
pub use link::{LinkId, LinkInfo};
pub use table::BindTable;

pub(crate) use link::{DependencyLink, LinkTable};
pub(crate) use resolver::{DescriptorCache, TypeBindings};
