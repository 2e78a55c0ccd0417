use std::any::{Any, TypeId};
use std::rc::Rc;

use crate::internal::FastMap;
use crate::key::TypeKey;
use crate::object::Lifecycle;
use crate::state::LinkKind;

use super::binding::BindingPolicy;
use super::table::BindTable;

/// Projects an object (as `dyn Any`) to one of its bind point fields.
pub(crate) type FieldFn = Rc<dyn Fn(&mut dyn Any) -> Option<&mut dyn Any>>;

pub(crate) fn field_fn<F>(project: F) -> FieldFn
where
    F: Fn(&mut dyn Any) -> Option<&mut dyn Any> + 'static,
{
    Rc::new(project)
}

/// One declared bind point: where its value comes from and where it goes.
///
/// Shared by every link created through it; links compare resolvers by
/// pointer to find the bind point they belong to.
pub(crate) struct Resolver {
    pub(crate) member: &'static str,
    pub(crate) policy: Rc<dyn BindingPolicy>,
    pub(crate) required: bool,
    pub(crate) kind: LinkKind,
    pub(crate) field: FieldFn,
    pub(crate) accessor: Accessor,
}

#[derive(Clone, Copy)]
pub(crate) enum Accessor {
    Value(ValueAccessor),
    Collection(CollectionAccessor),
}

/// Field of type `Option<Rc<S>>`.
#[derive(Clone, Copy)]
pub(crate) struct ValueAccessor {
    pub(crate) expected: TypeKey,
    pub(crate) accepts: fn(&dyn Any) -> bool,
    pub(crate) assign: fn(&mut dyn Any, Option<Rc<dyn Any>>) -> bool,
}

impl ValueAccessor {
    pub(crate) fn of<S: Any>(expected: TypeKey) -> Self {
        Self {
            expected,
            accepts: accepts::<S>,
            assign: assign_value::<S>,
        }
    }
}

/// Field of type `Vec<Rc<S>>`.
#[derive(Clone, Copy)]
pub(crate) struct CollectionAccessor {
    pub(crate) element: TypeKey,
    pub(crate) accepts: fn(&dyn Any) -> bool,
    pub(crate) assign: fn(&mut dyn Any, Vec<Rc<dyn Any>>) -> bool,
    pub(crate) remove: fn(&mut dyn Any, &Rc<dyn Any>) -> bool,
}

impl CollectionAccessor {
    pub(crate) fn of<S: Any>(element: TypeKey) -> Self {
        Self {
            element,
            accepts: accepts::<S>,
            assign: assign_collection::<S>,
            remove: remove_item::<S>,
        }
    }
}

fn accepts<S: Any>(value: &dyn Any) -> bool {
    value.is::<S>()
}

// Each writer returns false only when the field is not of the declared type.

fn assign_value<S: Any>(field: &mut dyn Any, value: Option<Rc<dyn Any>>) -> bool {
    let Some(slot) = field.downcast_mut::<Option<Rc<S>>>() else {
        return false;
    };
    match value {
        None => *slot = None,
        Some(value) => match value.downcast::<S>() {
            Ok(value) => *slot = Some(value),
            Err(_) => return false,
        },
    }
    true
}

fn assign_collection<S: Any>(field: &mut dyn Any, values: Vec<Rc<dyn Any>>) -> bool {
    let Some(slot) = field.downcast_mut::<Vec<Rc<S>>>() else {
        return false;
    };
    let mut items = Vec::with_capacity(values.len());
    for value in values {
        match value.downcast::<S>() {
            Ok(item) => items.push(item),
            Err(_) => return false,
        }
    }
    *slot = items;
    true
}

fn remove_item<S: Any>(field: &mut dyn Any, target: &Rc<dyn Any>) -> bool {
    let Some(slot) = field.downcast_mut::<Vec<Rc<S>>>() else {
        return false;
    };
    let wanted = Rc::as_ptr(target) as *const ();
    if let Some(position) = slot
        .iter()
        .position(|item| Rc::as_ptr(item) as *const () == wanted)
    {
        slot.remove(position);
    }
    true
}

/// Bind points of one concrete type, inherited ones included.
pub(crate) struct TypeBindings {
    pub(crate) resolvers: Vec<Rc<Resolver>>,
}

impl TypeBindings {
    pub(crate) fn describe<T: Lifecycle>() -> TypeBindings {
        let mut table = BindTable::<T>::new();
        T::declare_bindings(&mut table);
        TypeBindings {
            resolvers: table.into_resolvers().into_iter().map(Rc::new).collect(),
        }
    }
}

/// Per-type binding descriptors, built on first use and never rebuilt.
#[derive(Default)]
pub(crate) struct DescriptorCache {
    by_type: FastMap<TypeId, Rc<TypeBindings>>,
    builds: usize,
}

impl DescriptorCache {
    pub(crate) fn get_or_build(
        &mut self,
        key: TypeKey,
        describe: fn() -> TypeBindings,
    ) -> Rc<TypeBindings> {
        if let Some(bindings) = self.by_type.get(&key.id()) {
            return bindings.clone();
        }
        let bindings = Rc::new(describe());
        self.builds += 1;
        tracing::trace!(ty = key.name(), points = bindings.resolvers.len(), "binding descriptor built");
        self.by_type.insert(key.id(), bindings.clone());
        bindings
    }

    pub(crate) fn builds(&self) -> usize {
        self.builds
    }
}
