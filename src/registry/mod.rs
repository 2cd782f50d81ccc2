//! Aggregated, persistable exclusion set per routing profile.
//!
//! Readers always work on an immutable [`RegistrySnapshot`]. Every mutation builds a new
//! snapshot and publishes it with a single atomic swap, so `replace` (clear + add) is never
//! observed half-done.

mod routing;
mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use hashbrown::HashMap;
use tracing::{debug, info, warn};

use crate::error::PersistError;
use crate::models::{AvoidRoadEntry, Profile, RoadSegmentId};

pub use routing::RoutingConfig;
pub use store::AvoidRoadRecord;

/// Name of the persisted exclusion file inside each profile directory
pub const PROCESSED_IDS_FILE: &str = "processed_ids.json";

/// Insertion-ordered set of exclusions, unique per base id.
///
/// Segments are identified by [`RoadSegmentId::base_id`], the part that is persisted, so
/// a restored entry matches every sub-object of the segment it was resolved from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrySnapshot {
    entries: Vec<AvoidRoadEntry>,
    positions: HashMap<u64, usize>,
}

impl RegistrySnapshot {
    pub fn from_entries<I: IntoIterator<Item = AvoidRoadEntry>>(entries: I) -> Self {
        let mut snapshot = Self::default();
        snapshot.extend(entries);
        snapshot
    }

    /// Entries with an already present base id overwrite in place and keep their position.
    fn extend<I: IntoIterator<Item = AvoidRoadEntry>>(&mut self, entries: I) {
        for entry in entries {
            match self.positions.get(&entry.id.base_id()) {
                Some(&pos) => self.entries[pos] = entry,
                None => {
                    self.positions.insert(entry.id.base_id(), self.entries.len());
                    self.entries.push(entry);
                }
            }
        }
    }

    fn without(&self, id: &RoadSegmentId) -> Option<Self> {
        let base = id.base_id();
        self.positions.get(&base)?;
        Some(Self::from_entries(
            self.entries.iter().filter(|e| e.id.base_id() != base).copied(),
        ))
    }

    pub fn get(&self, id: &RoadSegmentId) -> Option<&AvoidRoadEntry> {
        self.positions
            .get(&id.base_id())
            .map(|&pos| &self.entries[pos])
    }

    pub fn contains(&self, id: &RoadSegmentId) -> bool {
        self.positions.contains_key(&id.base_id())
    }

    pub fn entries(&self) -> &[AvoidRoadEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &AvoidRoadEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Exclusion set for one routing profile
pub struct AvoidRoadsRegistry {
    profile: Profile,
    current: ArcSwap<RegistrySnapshot>,
}

impl AvoidRoadsRegistry {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            current: ArcSwap::from_pointee(RegistrySnapshot::default()),
        }
    }

    /// Rebuild a registry from a persisted file. A missing file gives an empty registry.
    ///
    /// Ids come back with a zero sub-object index.
    pub fn load(path: &Path, profile: Profile) -> Result<Self, PersistError> {
        let records = store::read(path)?;
        let snapshot = RegistrySnapshot::from_entries(records.into_iter().map(AvoidRoadEntry::from));
        debug!(
            "Loaded {} avoid roads for {} from {}",
            snapshot.len(),
            profile,
            path.display()
        );
        Ok(Self {
            profile,
            current: ArcSwap::from_pointee(snapshot),
        })
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Current immutable view
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    pub fn clear(&self) {
        self.current.store(Arc::new(RegistrySnapshot::default()));
    }

    /// Merge entries; entries for an already present segment are overwritten.
    pub fn add_all<I: IntoIterator<Item = AvoidRoadEntry>>(&self, entries: I) {
        let entries: Vec<AvoidRoadEntry> = entries.into_iter().collect();
        self.current.rcu(|current| {
            let mut next = RegistrySnapshot::clone(current);
            next.extend(entries.iter().copied());
            next
        });
    }

    /// Clear and add in one swap.
    pub fn replace<I: IntoIterator<Item = AvoidRoadEntry>>(&self, entries: I) {
        let next = RegistrySnapshot::from_entries(entries);
        info!("Replacing avoid roads for {}: {} entries", self.profile, next.len());
        self.current.store(Arc::new(next));
    }

    /// Drop one exclusion. Returns whether it was present.
    pub fn remove(&self, id: &RoadSegmentId) -> bool {
        let mut removed = false;
        self.current.rcu(|current| match current.without(id) {
            Some(next) => {
                removed = true;
                Arc::new(next)
            }
            None => {
                removed = false;
                Arc::clone(current)
            }
        });
        removed
    }

    /// Atomically write the current snapshot to `path`.
    pub fn persist(&self, path: &Path) -> Result<(), PersistError> {
        let snapshot = self.snapshot();
        store::write_atomic(path, snapshot.iter())
    }

    /// Hand the current snapshot to the routing subsystem for this profile.
    pub fn apply(&self, routing: &RoutingConfig) {
        routing.set_impassable_roads(self.profile.clone(), self.snapshot());
    }
}

impl std::fmt::Debug for AvoidRoadsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvoidRoadsRegistry")
            .field("profile", &self.profile)
            .field("len", &self.len())
            .finish()
    }
}

/// Registries keyed by profile, each persisted under `<root>/<profile>/processed_ids.json`.
///
/// Registries are created on first use, empty, and never dropped.
pub struct RegistrySet {
    root: PathBuf,
    registries: ArcSwap<HashMap<Profile, Arc<AvoidRoadsRegistry>>>,
}

impl RegistrySet {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            registries: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn path_for(&self, profile: &Profile) -> Result<PathBuf, PersistError> {
        if !profile.is_path_safe() {
            return Err(PersistError::InvalidProfile(profile.name().to_string()));
        }
        Ok(self.root.join(profile.name()).join(PROCESSED_IDS_FILE))
    }

    pub fn get(&self, profile: &Profile) -> Option<Arc<AvoidRoadsRegistry>> {
        self.registries.load().get(profile).cloned()
    }

    pub fn get_or_create(&self, profile: &Profile) -> Arc<AvoidRoadsRegistry> {
        if let Some(existing) = self.get(profile) {
            return existing;
        }
        self.insert_if_absent(Arc::new(AvoidRoadsRegistry::new(profile.clone())))
    }

    /// Load `profile`'s persisted file into a fresh registry and register it.
    ///
    /// An already registered profile is left as is.
    pub fn load(&self, profile: &Profile) -> Result<Arc<AvoidRoadsRegistry>, PersistError> {
        if let Some(existing) = self.get(profile) {
            return Ok(existing);
        }
        let path = self.path_for(profile)?;
        let registry = AvoidRoadsRegistry::load(&path, profile.clone())?;
        Ok(self.insert_if_absent(Arc::new(registry)))
    }

    /// Load and apply every profile's persisted exclusions. Unreadable files are logged
    /// and leave that profile empty.
    pub fn restore(&self, profiles: &[Profile], routing: &RoutingConfig) {
        for profile in profiles {
            match self.load(profile) {
                Ok(registry) => {
                    registry.apply(routing);
                    info!("Restored {} avoid roads for {}", registry.len(), profile);
                }
                Err(e) => {
                    warn!(profile = %profile, "Failed to restore avoid roads: {}", e);
                }
            }
        }
    }

    pub fn profiles(&self) -> Vec<Profile> {
        self.registries.load().keys().cloned().collect()
    }

    fn insert_if_absent(&self, registry: Arc<AvoidRoadsRegistry>) -> Arc<AvoidRoadsRegistry> {
        let profile = registry.profile().clone();
        self.registries.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.entry(profile.clone())
                .or_insert_with(|| Arc::clone(&registry));
            next
        });
        self.get(&profile).unwrap_or(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoPoint;

    fn entry(id: u64, lat: f64, lon: f64) -> AvoidRoadEntry {
        AvoidRoadEntry::new(RoadSegmentId(id), GeoPoint::new(lat, lon))
    }

    fn mapping() -> Vec<AvoidRoadEntry> {
        vec![entry(64, 50.4, 30.5), entry(128, 50.45, 30.6), entry(192, 50.5, 30.7)]
    }

    #[test]
    fn test_add_all_is_idempotent() {
        let once = AvoidRoadsRegistry::new(Profile::car());
        once.add_all(mapping());

        let twice = AvoidRoadsRegistry::new(Profile::car());
        twice.add_all(mapping());
        twice.add_all(mapping());

        assert_eq!(*once.snapshot(), *twice.snapshot());
        assert_eq!(twice.len(), 3);
    }

    #[test]
    fn test_add_all_overwrites_same_id_in_place() {
        let registry = AvoidRoadsRegistry::new(Profile::car());
        registry.add_all(mapping());
        registry.add_all([entry(128, 1.0, 2.0)]);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.entries()[1], entry(128, 1.0, 2.0));
    }

    #[test]
    fn test_clear_then_add_all_equals_mapping() {
        let registry = AvoidRoadsRegistry::new(Profile::car());
        registry.add_all([entry(999 << 6, 0.0, 0.0)]);

        registry.clear();
        registry.add_all(mapping());
        assert_eq!(registry.snapshot().entries(), mapping().as_slice());
        assert!(!registry.snapshot().contains(&RoadSegmentId(999 << 6)));
    }

    #[test]
    fn test_replace_swaps_whole_snapshot() {
        let registry = AvoidRoadsRegistry::new(Profile::car());
        registry.add_all([entry(999 << 6, 0.0, 0.0)]);

        let before = registry.snapshot();
        registry.replace(mapping());

        // A reader holding the old snapshot still sees the old, complete state
        assert_eq!(before.len(), 1);
        assert_eq!(registry.snapshot().entries(), mapping().as_slice());

        registry.replace(Vec::new());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove() {
        let registry = AvoidRoadsRegistry::new(Profile::car());
        registry.add_all(mapping());

        assert!(registry.remove(&RoadSegmentId(128)));
        assert!(!registry.remove(&RoadSegmentId(128)));
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(&RoadSegmentId(192)), Some(&entry(192, 50.5, 30.7)));
    }

    #[test]
    fn test_persist_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_ids.json");

        let registry = AvoidRoadsRegistry::new(Profile::car());
        registry.add_all(mapping());
        registry.add_all([entry((7 << 6) | 5, -33.9, 151.2)]);
        registry.persist(&path).unwrap();

        let loaded = AvoidRoadsRegistry::load(&path, Profile::car()).unwrap();
        let triples = |r: &AvoidRoadsRegistry| {
            let mut t: Vec<AvoidRoadRecord> = r.snapshot().iter().map(AvoidRoadRecord::from).collect();
            t.sort_by_key(|rec| rec.road_id);
            t
        };
        assert_eq!(triples(&registry), triples(&loaded));
    }

    #[test]
    fn test_round_trip_with_shared_base_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_ids.json");

        let registry = AvoidRoadsRegistry::new(Profile::car());
        registry.add_all([
            entry((10 << 6) | 1, 50.4, 30.5),
            entry((10 << 6) | 2, 50.45, 30.6),
        ]);
        assert_eq!(registry.len(), 1);
        registry.persist(&path).unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["avoid_roads"].as_array().unwrap().len(), 1);

        let loaded = AvoidRoadsRegistry::load(&path, Profile::car()).unwrap();
        let triples = |r: &AvoidRoadsRegistry| -> Vec<AvoidRoadRecord> {
            r.snapshot().iter().map(AvoidRoadRecord::from).collect()
        };
        assert_eq!(triples(&registry), triples(&loaded));
        assert_eq!(
            triples(&loaded),
            vec![AvoidRoadRecord { road_id: 10, lat: 50.45, lon: 30.6 }]
        );
    }

    #[test]
    fn test_restored_entry_matches_original_sub_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_ids.json");
        let raw = RoadSegmentId((4242 << 6) | 7);

        let registry = AvoidRoadsRegistry::new(Profile::car());
        registry.add_all([AvoidRoadEntry::new(raw, GeoPoint::new(50.4, 30.5))]);
        registry.persist(&path).unwrap();

        let routing = RoutingConfig::default();
        AvoidRoadsRegistry::load(&path, Profile::car())
            .unwrap()
            .apply(&routing);
        assert!(routing.is_impassable(&Profile::car(), &raw));
        assert!(routing.is_impassable(&Profile::car(), &RoadSegmentId::from_base_id(4242)));
        assert!(!routing.is_impassable(&Profile::car(), &RoadSegmentId::from_base_id(4243)));
    }

    #[test]
    fn test_readers_never_observe_a_mixed_set() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let routing = RoutingConfig::default();
        let registry = AvoidRoadsRegistry::new(Profile::car());
        let old: Vec<_> = (1..=50).map(|b| entry(b << 6, 50.0, 30.0)).collect();
        let new: Vec<_> = (101..=150).map(|b| entry(b << 6, 51.0, 31.0)).collect();
        registry.replace(old.clone());
        registry.apply(&routing);

        let done = AtomicBool::new(false);
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    while !done.load(Ordering::Acquire) {
                        for snapshot in [routing.impassable_roads(&Profile::car()), registry.snapshot()] {
                            let stale = snapshot.iter().filter(|e| e.id.base_id() <= 50).count();
                            assert_eq!(snapshot.len(), 50);
                            assert!(stale == 0 || stale == 50, "{} stale entries of 50", stale);
                        }
                    }
                });
            }
            for round in 0..500 {
                registry.replace(if round % 2 == 0 { new.clone() } else { old.clone() });
                registry.apply(&routing);
            }
            done.store(true, Ordering::Release);
        });
    }

    #[test]
    fn test_path_for_rejects_unsafe_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let set = RegistrySet::new(dir.path());

        for name in ["../../etc", "/tmp/x", ".."] {
            let err = set.path_for(&Profile::new(name)).unwrap_err();
            assert!(matches!(err, PersistError::InvalidProfile(_)));
        }
        assert!(matches!(
            set.load(&Profile::new("../x")),
            Err(PersistError::InvalidProfile(_))
        ));
    }

    #[test]
    fn test_apply_publishes_to_routing() {
        let routing = RoutingConfig::default();
        let registry = AvoidRoadsRegistry::new(Profile::bicycle());
        registry.add_all(mapping());
        registry.apply(&routing);

        assert!(routing.is_impassable(&Profile::bicycle(), &RoadSegmentId(64)));
        assert!(!routing.is_impassable(&Profile::car(), &RoadSegmentId(64)));
    }

    #[test]
    fn test_registry_set_creates_once() {
        let dir = tempfile::tempdir().unwrap();
        let set = RegistrySet::new(dir.path());
        assert_eq!(
            set.path_for(&Profile::car()).unwrap(),
            dir.path().join("car").join("processed_ids.json")
        );

        let first = set.get_or_create(&Profile::car());
        first.add_all(mapping());
        let second = set.get_or_create(&Profile::car());
        assert!(Arc::ptr_eq(&first, &second));
        assert!(set.get(&Profile::bicycle()).is_none());
    }

    #[test]
    fn test_restore_applies_persisted_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RegistrySet::new(dir.path());
        let car = writer.get_or_create(&Profile::car());
        car.add_all(mapping());
        car.persist(&writer.path_for(&Profile::car()).unwrap()).unwrap();

        // A corrupt file for another profile does not stop the restore
        let broken = writer.path_for(&Profile::bicycle()).unwrap();
        std::fs::create_dir_all(broken.parent().unwrap()).unwrap();
        std::fs::write(&broken, b"not json").unwrap();

        let routing = RoutingConfig::default();
        let reader = RegistrySet::new(dir.path());
        reader.restore(&[Profile::car(), Profile::bicycle()], &routing);

        assert_eq!(reader.get(&Profile::car()).unwrap().len(), 3);
        assert!(reader.get(&Profile::bicycle()).is_none());
        assert!(routing.is_impassable(&Profile::car(), &RoadSegmentId(128)));
    }
}
