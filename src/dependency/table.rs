use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::key::TypeKey;
use crate::object::{Lifecycle, Shared};
use crate::state::LinkKind;

use super::binding::BindingPolicy;
use super::resolver::{field_fn, Accessor, CollectionAccessor, FieldFn, Resolver, ValueAccessor};

/// Bind point declarations of the type `T`.
///
/// Filled in by [`Lifecycle::declare_bindings`]. Each declaration names the
/// member (used in logs and notifications), the policy that finds the
/// value, and a projection to the field that receives it.
///
/// | Method | Field type | Linked |
/// |---|---|---|
/// | [`service`](Self::service) | `Option<Shared<D>>` | yes, when the value is a graph object |
/// | [`value`](Self::value) | `Option<Rc<V>>` | no |
/// | [`services`](Self::services) | `Vec<Shared<D>>` | one link per graph object |
/// | [`values`](Self::values) | `Vec<Rc<V>>` | no |
///
/// # Examples
///
/// ```rust
/// use std::rc::Rc;
/// use ferrous_lifecycle::{
///     optional, AllOf, BindTable, Constant, Lifecycle, LinkKind, ServiceBinding, Shared,
/// };
///
/// struct Audio;
/// impl Lifecycle for Audio {}
///
/// struct Sprite;
/// impl Lifecycle for Sprite {}
///
/// #[derive(Default)]
/// struct Scene {
///     audio: Option<Shared<Audio>>,
///     sprites: Vec<Shared<Sprite>>,
///     title: Option<Rc<String>>,
/// }
///
/// impl Lifecycle for Scene {
///     fn declare_bindings(table: &mut BindTable<Self>) {
///         table
///             .service("audio", optional(ServiceBinding), |s: &mut Scene| &mut s.audio)
///             .services("sprites", AllOf, |s: &mut Scene| &mut s.sprites)
///             .link_kind(LinkKind::LOADABLE)
///             .value("title", Constant::new(String::from("intro")), |s: &mut Scene| &mut s.title);
///     }
/// }
/// ```
pub struct BindTable<T> {
    resolvers: Vec<Resolver>,
    kind: LinkKind,
    _marker: PhantomData<fn(&mut T)>,
}

impl<T: Lifecycle> BindTable<T> {
    pub(crate) fn new() -> Self {
        Self {
            resolvers: Vec::new(),
            kind: LinkKind::LIFECYCLE,
            _marker: PhantomData,
        }
    }

    /// Link category of the bind points declared after this call.
    pub fn link_kind(&mut self, kind: LinkKind) -> &mut Self {
        self.kind = kind;
        self
    }

    /// Single lifecycle object of type `D`.
    pub fn service<D, P, F>(&mut self, member: &'static str, policy: P, field: F) -> &mut Self
    where
        D: Lifecycle,
        P: BindingPolicy + 'static,
        F: Fn(&mut T) -> &mut Option<Shared<D>> + 'static,
    {
        let accessor = Accessor::Value(ValueAccessor::of::<std::cell::RefCell<D>>(
            TypeKey::of::<D>(),
        ));
        self.declare(member, policy, project(field), accessor)
    }

    /// Single plain value of type `V`.
    pub fn value<V, P, F>(&mut self, member: &'static str, policy: P, field: F) -> &mut Self
    where
        V: Any,
        P: BindingPolicy + 'static,
        F: Fn(&mut T) -> &mut Option<Rc<V>> + 'static,
    {
        let accessor = Accessor::Value(ValueAccessor::of::<V>(TypeKey::of::<V>()));
        self.declare(member, policy, project(field), accessor)
    }

    /// Ordered collection of lifecycle objects of type `D`.
    pub fn services<D, P, F>(&mut self, member: &'static str, policy: P, field: F) -> &mut Self
    where
        D: Lifecycle,
        P: BindingPolicy + 'static,
        F: Fn(&mut T) -> &mut Vec<Shared<D>> + 'static,
    {
        let accessor = Accessor::Collection(CollectionAccessor::of::<std::cell::RefCell<D>>(
            TypeKey::of::<D>(),
        ));
        self.declare(member, policy, project(field), accessor)
    }

    /// Ordered collection of plain values of type `V`.
    pub fn values<V, P, F>(&mut self, member: &'static str, policy: P, field: F) -> &mut Self
    where
        V: Any,
        P: BindingPolicy + 'static,
        F: Fn(&mut T) -> &mut Vec<Rc<V>> + 'static,
    {
        let accessor = Accessor::Collection(CollectionAccessor::of::<V>(TypeKey::of::<V>()));
        self.declare(member, policy, project(field), accessor)
    }

    /// Pulls in the bind points of an embedded `B` reached through `project`.
    ///
    /// The inherited points keep the link category `B` declared them with.
    pub fn inherit<B, F>(&mut self, project: F) -> &mut Self
    where
        B: Lifecycle,
        F: Fn(&mut T) -> &mut B + 'static,
    {
        let mut base = BindTable::<B>::new();
        B::declare_bindings(&mut base);

        let project = Rc::new(project);
        for resolver in base.resolvers {
            let outer = project.clone();
            let inner = resolver.field.clone();
            let field = field_fn(move |object| {
                let this = object.downcast_mut::<T>()?;
                (*inner)((*outer)(this) as &mut dyn Any)
            });
            self.resolvers.push(Resolver { field, ..resolver });
        }
        self
    }

    /// Number of bind points declared so far.
    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    pub(crate) fn into_resolvers(self) -> Vec<Resolver> {
        self.resolvers
    }

    fn declare<P>(
        &mut self,
        member: &'static str,
        policy: P,
        field: FieldFn,
        accessor: Accessor,
    ) -> &mut Self
    where
        P: BindingPolicy + 'static,
    {
        self.resolvers.push(Resolver {
            member,
            required: policy.is_required(),
            policy: Rc::new(policy),
            kind: self.kind,
            field,
            accessor,
        });
        self
    }
}

fn project<T, X, F>(field: F) -> FieldFn
where
    T: Any,
    X: Any,
    F: Fn(&mut T) -> &mut X + 'static,
{
    field_fn(move |object| {
        object
            .downcast_mut::<T>()
            .map(|this| field(this) as &mut dyn Any)
    })
}
