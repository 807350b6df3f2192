//! Live objects known to the driver, with their placement and cost.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::lock::{HandleId, Schedulable};

/// Identity of a container (world instance, shard, room).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerId(pub u32);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Coordinates of a region subdivision inside a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionCoord {
    /// X index.
    pub x: i32,
    /// Z index.
    pub z: i32,
}

impl RegionCoord {
    /// Creates a coordinate.
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// What kind of object a registration is. Selects the default cost.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// A container's own tick.
    Container,
    /// A region subdivision.
    Region,
    /// Anything that moves between regions.
    Agent,
}

/// Where an object lives. Drives the grouping strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    /// Parent container, `None` for free-standing objects.
    pub container: Option<ContainerId>,
    /// Region inside the container.
    pub region: Option<RegionCoord>,
    /// Object kind.
    pub kind: ObjectKind,
}

impl Placement {
    /// The container object itself.
    #[must_use]
    pub const fn container(id: ContainerId) -> Self {
        Self {
            container: Some(id),
            region: None,
            kind: ObjectKind::Container,
        }
    }

    /// A region of `container`.
    #[must_use]
    pub const fn region(container: ContainerId, region: RegionCoord) -> Self {
        Self {
            container: Some(container),
            region: Some(region),
            kind: ObjectKind::Region,
        }
    }

    /// An agent standing in `region` of `container`.
    #[must_use]
    pub const fn agent(container: ContainerId, region: RegionCoord) -> Self {
        Self {
            container: Some(container),
            region: Some(region),
            kind: ObjectKind::Agent,
        }
    }

    /// An object outside any container.
    #[must_use]
    pub const fn loose(kind: ObjectKind) -> Self {
        Self {
            container: None,
            region: None,
            kind,
        }
    }
}

/// A registered object.
#[derive(Clone)]
pub struct LiveObject {
    /// The handle to tick.
    pub target: Arc<dyn Schedulable>,
    /// Where it lives.
    pub placement: Placement,
    /// Estimated tick cost.
    pub cost: u64,
}

impl fmt::Debug for LiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveObject")
            .field("id", &self.target.id())
            .field("placement", &self.placement)
            .field("cost", &self.cost)
            .finish()
    }
}

/// Every object the driver ticks, in registration order.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    objects: BTreeMap<HandleId, LiveObject>,
}

impl ObjectRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `target`. Re-registering replaces placement and cost.
    pub fn insert(&mut self, target: Arc<dyn Schedulable>, placement: Placement, cost: u64) -> HandleId {
        let id = target.id();
        self.objects.insert(id, LiveObject { target, placement, cost });
        id
    }

    /// Unregisters an object and clears its affinity record.
    pub fn remove(&mut self, id: HandleId) -> Option<LiveObject> {
        let removed = self.objects.remove(&id)?;
        removed.target.handler().clear();
        Some(removed)
    }

    /// Returns `true` if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: HandleId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Looks up an object.
    #[must_use]
    pub fn get(&self, id: HandleId) -> Option<&LiveObject> {
        self.objects.get(&id)
    }

    /// Number of registered objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &LiveObject> {
        self.objects.values()
    }

    /// Objects grouped by container, containers in id order. Objects with
    /// no container are returned under `None`, first.
    #[must_use]
    pub fn group_by_container(&self) -> BTreeMap<Option<ContainerId>, Vec<&LiveObject>> {
        let mut groups: BTreeMap<Option<ContainerId>, Vec<&LiveObject>> = BTreeMap::new();
        for object in self.objects.values() {
            groups.entry(object.placement.container).or_default().push(object);
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::Acquirable;
    use crate::test_support::Inert;

    #[test]
    fn test_insert_and_iterate_in_registration_order() {
        let mut registry = ObjectRegistry::new();
        let first = registry.insert(Arc::new(Acquirable::new(Inert)), Placement::loose(ObjectKind::Agent), 5);
        let second = registry.insert(Arc::new(Acquirable::new(Inert)), Placement::container(ContainerId(1)), 7);

        let order: Vec<_> = registry.iter().map(|object| object.target.id()).collect();
        assert_eq!(order, vec![first, second]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(second).unwrap().cost, 7);
    }

    #[test]
    fn test_remove_clears_affinity() {
        let mut registry = ObjectRegistry::new();
        let handle = Arc::new(Acquirable::new(Inert));
        let worker = crate::thread::Worker::detached("registry-test");
        handle.handler().refresh_thread(&worker);

        let id = registry.insert(handle.clone(), Placement::loose(ObjectKind::Agent), 5);
        assert!(registry.remove(id).is_some());
        assert!(handle.handler().is_unassigned());
        assert!(registry.remove(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_group_by_container() {
        let mut registry = ObjectRegistry::new();
        let home = ContainerId(2);
        let region = RegionCoord::new(0, 0);
        registry.insert(Arc::new(Acquirable::new(Inert)), Placement::container(home), 5);
        registry.insert(Arc::new(Acquirable::new(Inert)), Placement::agent(home, region), 5);
        registry.insert(Arc::new(Acquirable::new(Inert)), Placement::loose(ObjectKind::Agent), 5);

        let groups = registry.group_by_container();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&Some(home)].len(), 2);
        assert_eq!(groups[&None].len(), 1);
        assert_eq!(groups.keys().next(), Some(&None));
    }
}
