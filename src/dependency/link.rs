use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::internal::{Arena, RawHandle};
use crate::object::ObjectId;
use crate::state::LinkKind;

use super::resolver::{Accessor, Resolver};

/// Generational handle of a dependency link.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(pub(crate) RawHandle);

impl fmt::Debug for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkId({}v{})", self.0.index, self.0.generation)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}v{}", self.0.index, self.0.generation)
    }
}

/// Source holds a reference to target through one bind point.
///
/// Listed by both endpoints from creation until removal.
pub(crate) struct DependencyLink {
    pub(crate) source: ObjectId,
    pub(crate) target: ObjectId,
    pub(crate) resolver: Rc<Resolver>,
    /// The target as stored in the source's field, for collection removal.
    pub(crate) target_value: Rc<dyn Any>,
}

impl DependencyLink {
    pub(crate) fn kind(&self) -> LinkKind {
        self.resolver.kind
    }

    pub(crate) fn info(&self, id: LinkId) -> LinkInfo {
        LinkInfo {
            id,
            source: self.source,
            target: self.target,
            member: self.resolver.member,
            kind: self.resolver.kind,
            required: self.resolver.required,
            collection: matches!(self.resolver.accessor, Accessor::Collection(_)),
        }
    }
}

/// Read-only description of a dependency link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkInfo {
    pub id: LinkId,
    pub source: ObjectId,
    pub target: ObjectId,
    pub member: &'static str,
    pub kind: LinkKind,
    pub required: bool,
    pub collection: bool,
}

#[derive(Default)]
pub(crate) struct LinkTable {
    links: Arena<DependencyLink>,
}

impl LinkTable {
    pub(crate) fn insert(&mut self, link: DependencyLink) -> LinkId {
        LinkId(self.links.insert(link))
    }

    pub(crate) fn get(&self, id: LinkId) -> Option<&DependencyLink> {
        self.links.get(id.0)
    }

    pub(crate) fn remove(&mut self, id: LinkId) -> Option<DependencyLink> {
        self.links.remove(id.0)
    }

    pub(crate) fn len(&self) -> usize {
        self.links.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (LinkId, &DependencyLink)> + '_ {
        self.links.iter().map(|(handle, link)| (LinkId(handle), link))
    }
}
