use std::any::Any;
use std::rc::Rc;

use crate::error::LifecycleResult;
use crate::key::TypeKey;
use crate::object::{Lifecycle, ObjectGraph, ObjectId, Shared};

/// A value offered for a bind point.
///
/// Candidates built from graph objects carry the object's id and produce a
/// dependency link; plain values are stored but never linked.
#[derive(Clone)]
pub struct Candidate {
    pub(crate) value: Rc<dyn Any>,
    pub(crate) object: Option<ObjectId>,
}

impl Candidate {
    /// A plain value, stored without a link.
    pub fn value<V: Any>(value: Rc<V>) -> Self {
        Self {
            value,
            object: None,
        }
    }

    /// The graph object behind this candidate, if any.
    pub fn object_id(&self) -> Option<ObjectId> {
        self.object
    }
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("object", &self.object)
            .finish_non_exhaustive()
    }
}

/// Read-only view of the graph handed to binding policies.
pub struct BindContext<'g> {
    graph: &'g ObjectGraph,
    dependent: ObjectId,
    dependent_type: TypeKey,
}

impl<'g> BindContext<'g> {
    pub(crate) fn new(graph: &'g ObjectGraph, dependent: ObjectId) -> LifecycleResult<Self> {
        Ok(Self {
            dependent_type: graph.type_key(dependent)?,
            graph,
            dependent,
        })
    }

    /// The object whose bind point is being resolved.
    pub fn dependent(&self) -> ObjectId {
        self.dependent
    }

    pub fn dependent_type(&self) -> TypeKey {
        self.dependent_type
    }

    pub fn graph(&self) -> &'g ObjectGraph {
        self.graph
    }

    /// Candidate for a live, non-destroyed graph object.
    pub fn object(&self, id: ObjectId) -> Option<Candidate> {
        let entry = self.graph.objects.get(id.0)?;
        if entry.core.is_destroyed() {
            return None;
        }
        Some(Candidate {
            value: entry.value.clone(),
            object: Some(id),
        })
    }

    /// First live object of exactly the type `key`.
    pub fn first_of(&self, key: TypeKey) -> Option<Candidate> {
        self.graph
            .objects_of_type(key)
            .into_iter()
            .find_map(|id| self.object(id))
    }

    /// Every live object of exactly the type `key`, in slot order.
    pub fn all_of(&self, key: TypeKey) -> Vec<Candidate> {
        self.graph
            .objects_of_type(key)
            .into_iter()
            .filter_map(|id| self.object(id))
            .collect()
    }

    /// Candidate for a shared object; linked when the graph knows it.
    pub fn shared<T: Lifecycle>(&self, object: &Shared<T>) -> Candidate {
        Candidate {
            value: object.clone(),
            object: self.graph.find_object(object),
        }
    }
}

/// Strategy locating the value for one declared binding.
///
/// The runtime never decides how a candidate is found; it only checks the
/// candidate's type and that it is not destroyed.
pub trait BindingPolicy {
    /// Candidate for a single-valued bind point expecting `expected`.
    fn resolve(&self, cx: &BindContext<'_>, expected: TypeKey) -> Option<Candidate>;

    /// Candidates for a collection bind point of `element` items.
    fn resolve_collection(
        &self,
        _cx: &BindContext<'_>,
        _element: TypeKey,
    ) -> Option<Vec<Candidate>> {
        None
    }

    /// Required bind points block attach when absent and break their
    /// dependent when the target goes away.
    fn is_required(&self) -> bool {
        true
    }
}

/// Binds the first live graph object of the expected type.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceBinding;

impl BindingPolicy for ServiceBinding {
    fn resolve(&self, cx: &BindContext<'_>, expected: TypeKey) -> Option<Candidate> {
        cx.first_of(expected)
    }
}

/// Binds every live graph object of the element type. Always resolves for
/// collections, possibly to an empty list.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllOf;

impl BindingPolicy for AllOf {
    fn resolve(&self, cx: &BindContext<'_>, expected: TypeKey) -> Option<Candidate> {
        cx.first_of(expected)
    }

    fn resolve_collection(&self, cx: &BindContext<'_>, element: TypeKey) -> Option<Vec<Candidate>> {
        Some(cx.all_of(element))
    }
}

/// Binds a fixed plain value.
pub struct Constant<V>(Rc<V>);

impl<V: Any> Constant<V> {
    pub fn new(value: V) -> Self {
        Self(Rc::new(value))
    }

    pub fn from_rc(value: Rc<V>) -> Self {
        Self(value)
    }
}

impl<V: Any> BindingPolicy for Constant<V> {
    fn resolve(&self, _cx: &BindContext<'_>, _expected: TypeKey) -> Option<Candidate> {
        Some(Candidate::value(self.0.clone()))
    }
}

/// Policy backed by a closure. See [`from_fn`].
pub struct FnPolicy<F>(F);

/// Builds a single-value policy from a closure.
///
/// ```rust
/// use ferrous_lifecycle::{from_fn, Candidate};
/// use std::rc::Rc;
///
/// let policy = from_fn(|_cx, _expected| Some(Candidate::value(Rc::new(60u32))));
/// # let _ = policy;
/// ```
pub fn from_fn<F>(resolve: F) -> FnPolicy<F>
where
    F: Fn(&BindContext<'_>, TypeKey) -> Option<Candidate>,
{
    FnPolicy(resolve)
}

impl<F> BindingPolicy for FnPolicy<F>
where
    F: Fn(&BindContext<'_>, TypeKey) -> Option<Candidate>,
{
    fn resolve(&self, cx: &BindContext<'_>, expected: TypeKey) -> Option<Candidate> {
        (self.0)(cx, expected)
    }
}

/// Collection policy backed by a closure. See [`from_collection_fn`].
pub struct CollectionFnPolicy<F>(F);

pub fn from_collection_fn<F>(resolve: F) -> CollectionFnPolicy<F>
where
    F: Fn(&BindContext<'_>, TypeKey) -> Option<Vec<Candidate>>,
{
    CollectionFnPolicy(resolve)
}

impl<F> BindingPolicy for CollectionFnPolicy<F>
where
    F: Fn(&BindContext<'_>, TypeKey) -> Option<Vec<Candidate>>,
{
    fn resolve(&self, _cx: &BindContext<'_>, _expected: TypeKey) -> Option<Candidate> {
        None
    }

    fn resolve_collection(&self, cx: &BindContext<'_>, element: TypeKey) -> Option<Vec<Candidate>> {
        (self.0)(cx, element)
    }
}

/// Makes any policy optional. See [`optional`].
pub struct Optional<P>(P);

/// Wraps `policy` so a missing candidate does not block attach and a lost
/// target only clears the field.
pub fn optional<P: BindingPolicy>(policy: P) -> Optional<P> {
    Optional(policy)
}

impl<P: BindingPolicy> BindingPolicy for Optional<P> {
    fn resolve(&self, cx: &BindContext<'_>, expected: TypeKey) -> Option<Candidate> {
        self.0.resolve(cx, expected)
    }

    fn resolve_collection(&self, cx: &BindContext<'_>, element: TypeKey) -> Option<Vec<Candidate>> {
        self.0.resolve_collection(cx, element)
    }

    fn is_required(&self) -> bool {
        false
    }
}
