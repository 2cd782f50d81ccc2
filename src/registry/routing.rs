//! Impassable-roads store consumed by path search.

use std::sync::Arc;

use arc_swap::ArcSwap;
use hashbrown::HashMap;

use super::RegistrySnapshot;
use crate::models::{Profile, RoadSegmentId};

/// Per-profile impassable roads, as seen by the routing subsystem.
///
/// Route searches read snapshots lock-free; publishing a profile's set swaps the whole map.
pub struct RoutingConfig {
    impassable: ArcSwap<HashMap<Profile, Arc<RegistrySnapshot>>>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            impassable: ArcSwap::from_pointee(HashMap::new()),
        }
    }
}

impl RoutingConfig {
    pub fn set_impassable_roads(&self, profile: Profile, roads: Arc<RegistrySnapshot>) {
        self.impassable.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(profile.clone(), Arc::clone(&roads));
            next
        });
    }

    pub fn clear_impassable_roads(&self, profile: &Profile) {
        self.impassable.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(profile);
            next
        });
    }

    /// Empty snapshot if nothing was applied for `profile`
    pub fn impassable_roads(&self, profile: &Profile) -> Arc<RegistrySnapshot> {
        self.impassable
            .load()
            .get(profile)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_impassable(&self, profile: &Profile, id: &RoadSegmentId) -> bool {
        self.impassable
            .load()
            .get(profile)
            .is_some_and(|roads| roads.contains(id))
    }
}
