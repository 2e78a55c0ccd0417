//! Resolving bind points into links and unwinding them again.

use std::any::Any;
use std::rc::Rc;

use crate::error::LifecycleResult;
use crate::object::{ObjectGraph, ObjectId};
use crate::state::LinkKind;

use super::binding::{BindContext, Candidate};
use super::link::{DependencyLink, LinkId, LinkInfo};
use super::resolver::{Accessor, Resolver};

impl ObjectGraph {
    /// Resolves every bind point of the object's type.
    ///
    /// Every bind point is attempted even after one fails; the result is true
    /// only when all of them succeeded.
    pub(crate) fn resolve_dependencies(&mut self, id: ObjectId) -> LifecycleResult<bool> {
        let (key, describe) = {
            let entry = self.entry(id)?;
            (entry.key, entry.describe)
        };
        let bindings = self.descriptors.get_or_build(key, describe);
        let mut resolved = true;
        for resolver in &bindings.resolvers {
            resolved &= self.resolve_point(id, resolver)?;
        }
        Ok(resolved)
    }

    fn resolve_point(&mut self, id: ObjectId, resolver: &Rc<Resolver>) -> LifecycleResult<bool> {
        self.release_point(id, resolver)?;

        let found = match resolver.accessor {
            Accessor::Value(accessor) => {
                let candidate = {
                    let cx = BindContext::new(self, id)?;
                    resolver.policy.resolve(&cx, accessor.expected)
                };
                match candidate.filter(|c| self.accept_candidate(id, resolver, c, accessor.accepts)) {
                    Some(candidate) => {
                        self.link_candidate(id, resolver, &candidate)?;
                        self.write_field(id, resolver, |field| {
                            (accessor.assign)(field, Some(candidate.value))
                        })?;
                        true
                    }
                    None => false,
                }
            }
            Accessor::Collection(accessor) => {
                let candidates = {
                    let cx = BindContext::new(self, id)?;
                    resolver.policy.resolve_collection(&cx, accessor.element)
                };
                match candidates {
                    Some(candidates) => {
                        let accepted: Vec<Candidate> = candidates
                            .into_iter()
                            .filter(|c| self.accept_candidate(id, resolver, c, accessor.accepts))
                            .collect();
                        for candidate in &accepted {
                            self.link_candidate(id, resolver, candidate)?;
                        }
                        let values: Vec<Rc<dyn Any>> =
                            accepted.into_iter().map(|c| c.value).collect();
                        self.write_field(id, resolver, |field| (accessor.assign)(field, values))?;
                        true
                    }
                    None => false,
                }
            }
        };

        if !found {
            tracing::debug!(
                object = %id,
                member = resolver.member,
                required = resolver.required,
                "no candidate for bind point"
            );
        }
        Ok(found || !resolver.required)
    }

    fn accept_candidate(
        &self,
        id: ObjectId,
        resolver: &Resolver,
        candidate: &Candidate,
        accepts: fn(&dyn Any) -> bool,
    ) -> bool {
        if !accepts(&*candidate.value) {
            tracing::warn!(object = %id, member = resolver.member, "candidate rejected: wrong type");
            return false;
        }
        if let Some(target) = candidate.object {
            let alive = self
                .objects
                .get(target.0)
                .map_or(false, |entry| !entry.core.is_destroyed());
            if !alive {
                tracing::warn!(
                    object = %id,
                    member = resolver.member,
                    target = %target,
                    "candidate rejected: destroyed or unknown object"
                );
                return false;
            }
        }
        true
    }

    fn link_candidate(
        &mut self,
        source: ObjectId,
        resolver: &Rc<Resolver>,
        candidate: &Candidate,
    ) -> LifecycleResult<()> {
        let Some(target) = candidate.object else {
            return Ok(());
        };
        if target == source {
            return Ok(());
        }
        self.entry(target)?;

        let link = self.links.insert(DependencyLink {
            source,
            target,
            resolver: resolver.clone(),
            target_value: candidate.value.clone(),
        });
        self.entry_mut(source)?.links.push(link);
        self.entry_mut(target)?.links.push(link);

        tracing::debug!(%link, %source, %target, member = resolver.member, "dependency linked");
        self.observers.dependency_linked(source, target, resolver.member);
        Ok(())
    }

    /// Releases links the object still holds through `resolver`, so
    /// repeated attach attempts never stack links on one bind point.
    fn release_point(&mut self, id: ObjectId, resolver: &Rc<Resolver>) -> LifecycleResult<()> {
        let stale: Vec<LinkId> = self
            .entry(id)?
            .links
            .iter()
            .copied()
            .filter(|link| {
                self.links.get(*link).map_or(false, |link| {
                    link.source == id && Rc::ptr_eq(&link.resolver, resolver)
                })
            })
            .collect();
        for link in stale {
            self.unregister(link, id)?;
        }
        Ok(())
    }

    fn write_field(
        &self,
        id: ObjectId,
        resolver: &Resolver,
        write: impl FnOnce(&mut dyn Any) -> bool,
    ) -> LifecycleResult<()> {
        let project = resolver.field.clone();
        let written = self.with_object(id, |object| match (*project)(object.as_any_mut()) {
            Some(field) => write(field),
            None => false,
        })?;
        if !written {
            tracing::error!(
                object = %id,
                member = resolver.member,
                "bind point field does not match its declaration"
            );
        }
        Ok(())
    }

    /// Removes every link of the object whose category is in `mask`, last
    /// registered first.
    ///
    /// Cascades triggered by a removal may drop further links of this object,
    /// so the list is re-read after every removal. All matching links are
    /// removed even if a cascade fails; the first failure is returned.
    pub(crate) fn delete_dependencies(&mut self, id: ObjectId, mask: LinkKind) -> LifecycleResult<()> {
        let mut outcome = Ok(());
        loop {
            let next = self.entry(id)?.links.iter().rev().copied().find(|link| {
                self.links
                    .get(*link)
                    .map_or(false, |link| mask.contains(link.kind()))
            });
            let Some(link) = next else {
                break;
            };
            if let Err(err) = self.unregister(link, id) {
                outcome = outcome.and(Err(err));
            }
            if cfg!(feature = "diagnostics") {
                if let Err(violation) = self.verify_links() {
                    tracing::error!(object = %id, %violation, "link bookkeeping violated");
                }
            }
        }
        outcome
    }

    /// Removes one link on behalf of `caller`.
    ///
    /// The link leaves both endpoint lists and the table before anything
    /// else runs. When the caller is the target of a required single-value
    /// link, the source is told its dependency broke (and is forced back to
    /// Detached); the stale field is then cleared and the source notified.
    pub(crate) fn unregister(&mut self, id: LinkId, caller: ObjectId) -> LifecycleResult<()> {
        let Some(link) = self.links.remove(id) else {
            if let Ok(entry) = self.entry_mut(caller) {
                entry.links.retain(|held| *held != id);
            }
            return Ok(());
        };
        for endpoint in [link.source, link.target] {
            if let Ok(entry) = self.entry_mut(endpoint) {
                entry.links.retain(|held| *held != id);
            }
        }

        let resolver = &link.resolver;
        let is_target = caller == link.target;
        let mut outcome = Ok(());
        match resolver.accessor {
            Accessor::Value(accessor) => {
                if is_target && resolver.required {
                    outcome = self.dependency_broken(link.source, resolver.member);
                }
                if let Err(err) =
                    self.write_field(link.source, resolver, |field| (accessor.assign)(field, None))
                {
                    outcome = outcome.and(Err(err));
                }
            }
            Accessor::Collection(accessor) => {
                let target_value = &link.target_value;
                if let Err(err) = self.write_field(link.source, resolver, |field| {
                    (accessor.remove)(field, target_value)
                }) {
                    outcome = outcome.and(Err(err));
                }
            }
        }

        tracing::debug!(
            link = %id,
            source = %link.source,
            target = %link.target,
            member = resolver.member,
            "dependency removed"
        );
        self.observers
            .dependency_removed(link.source, link.target, resolver.member);
        let member = resolver.member;
        if let Err(err) = self.with_object(link.source, |object| object.on_dependency_removed(member)) {
            outcome = outcome.and(Err(err));
        }
        outcome
    }

    /// Links held by the object, in registration order.
    pub fn links_of(&self, id: ObjectId) -> LifecycleResult<Vec<LinkInfo>> {
        Ok(self
            .entry(id)?
            .links
            .iter()
            .filter_map(|link| self.links.get(*link).map(|l| l.info(*link)))
            .collect())
    }

    /// Every live link, in slot order.
    pub fn links(&self) -> Vec<LinkInfo> {
        self.links.iter().map(|(id, link)| link.info(id)).collect()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Checks that every link is listed exactly once by each endpoint and
    /// that no object lists a link it is not an endpoint of.
    pub fn verify_links(&self) -> Result<(), String> {
        for (id, link) in self.links.iter() {
            for endpoint in [link.source, link.target] {
                let entry = self
                    .objects
                    .get(endpoint.0)
                    .ok_or_else(|| format!("link {id} points at missing object {endpoint}"))?;
                let listed = entry.links.iter().filter(|held| **held == id).count();
                if listed != 1 {
                    return Err(format!("link {id} listed {listed} times by {endpoint}"));
                }
            }
        }
        for (handle, entry) in self.objects.iter() {
            let object = ObjectId(handle);
            for held in entry.links.iter() {
                match self.links.get(*held) {
                    Some(link) if link.source == object || link.target == object => {}
                    Some(_) => return Err(format!("{object} lists foreign link {held}")),
                    None => return Err(format!("{object} lists removed link {held}")),
                }
            }
        }
        Ok(())
    }
}
