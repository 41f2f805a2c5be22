//! Persisted seed directions, keyed by a content hash of the input.
//!
//! Seed search dominates the cost of a run and depends only on the spheres
//! and the direction settings, so its result can be reused across runs.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tunnel_kernel_geom::Disk;
use tunnel_kernel_math::{try_direction, Point3, Vec3};

use crate::direction::SeedDirection;
use crate::error::{DiscretizeError, Result};
use crate::tunnel::Tunnel;
use crate::DiscretizeSettings;

/// Content hash of a tunnel plus everything that influences seed search.
///
/// Keys are stable for a given build; entries written by another build may
/// simply miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeometryKey(pub u64);

impl GeometryKey {
    /// Key for `tunnel` searched with `settings`.
    pub fn of(tunnel: &Tunnel, settings: &DiscretizeSettings) -> Self {
        let mut hasher = DefaultHasher::new();
        tunnel.len().hash(&mut hasher);
        for s in tunnel.spheres() {
            for c in s.center.iter() {
                c.to_bits().hash(&mut hasher);
            }
            s.radius.to_bits().hash(&mut hasher);
        }
        let d = &settings.direction;
        d.initial_cone.to_bits().hash(&mut hasher);
        d.rounds.hash(&mut hasher);
        d.phi_step.to_bits().hash(&mut hasher);
        d.max_passes.hash(&mut hasher);
        settings.tolerance.to_bits().hash(&mut hasher);
        settings.shuffle_seed.hash(&mut hasher);
        Self(hasher.finish())
    }
}

impl fmt::Display for GeometryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Where seed directions are kept between runs.
pub trait DirectionStore: Send + Sync {
    /// Seeds stored under `key`, if any.
    fn load(&self, key: &GeometryKey) -> Result<Option<Vec<SeedDirection>>>;

    /// Store `seeds` under `key`, replacing any previous entry.
    fn store(&self, key: &GeometryKey, seeds: &[SeedDirection]) -> Result<()>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<GeometryKey, Vec<SeedDirection>>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DirectionStore for MemoryStore {
    fn load(&self, key: &GeometryKey) -> Result<Option<Vec<SeedDirection>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| DiscretizeError::Cache("memory store lock poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn store(&self, key: &GeometryKey, seeds: &[SeedDirection]) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| DiscretizeError::Cache("memory store lock poisoned".into()))?;
        entries.insert(*key, seeds.to_vec());
        Ok(())
    }
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Store rooted at `dir`; the directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `key`.
    pub fn path_for(&self, key: &GeometryKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl DirectionStore for JsonFileStore {
    fn load(&self, key: &GeometryKey) -> Result<Option<Vec<SeedDirection>>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        let entry: CacheEntry = serde_json::from_str(&text)
            .map_err(|e| DiscretizeError::Cache(format!("{}: {e}", path.display())))?;
        if entry.key != *key {
            return Err(DiscretizeError::Cache(format!(
                "{} holds key {}",
                path.display(),
                entry.key
            )));
        }
        entry
            .seeds
            .into_iter()
            .map(SeedDirection::try_from)
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    fn store(&self, key: &GeometryKey, seeds: &[SeedDirection]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let entry = CacheEntry {
            key: *key,
            seeds: seeds.iter().map(SeedRecord::from).collect(),
        };
        let json = serde_json::to_string_pretty(&entry)
            .map_err(|e| DiscretizeError::Cache(e.to_string()))?;
        fs::write(self.path_for(key), json)?;
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    key: GeometryKey,
    seeds: Vec<SeedRecord>,
}

/// On-disk form of a [`SeedDirection`].
#[derive(Serialize, Deserialize)]
struct SeedRecord {
    offset: f64,
    direction: [f64; 3],
    center: [f64; 3],
    radius: f64,
}

impl From<&SeedDirection> for SeedRecord {
    fn from(seed: &SeedDirection) -> Self {
        Self {
            offset: seed.offset,
            direction: seed.direction.into_inner().into(),
            center: seed.disk.center.coords.into(),
            radius: seed.disk.radius,
        }
    }
}

impl TryFrom<SeedRecord> for SeedDirection {
    type Error = DiscretizeError;

    fn try_from(record: SeedRecord) -> Result<Self> {
        let direction = try_direction(&Vec3::from(record.direction))
            .ok_or_else(|| DiscretizeError::Cache("stored seed has no direction".into()))?;
        Ok(Self {
            offset: record.offset,
            direction,
            disk: Disk::from_dir(Point3::from(record.center), direction, record.radius),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunnel_kernel_geom::Sphere;
    use tunnel_kernel_math::Dir3;

    fn tunnel(shift: f64) -> Tunnel {
        Tunnel::new(vec![
            Sphere::new(Point3::new(0.0, 0.0, 0.0), 2.0),
            Sphere::new(Point3::new(2.5 + shift, 0.0, 0.0), 2.0),
        ])
        .unwrap()
    }

    fn seeds() -> Vec<SeedDirection> {
        let d = Dir3::new_normalize(Vec3::new(1.0, 0.5, 0.0));
        vec![
            SeedDirection {
                offset: 0.0,
                direction: d,
                disk: Disk::from_dir(Point3::origin(), d, 2.0),
            },
            SeedDirection {
                offset: 2.5,
                direction: Vec3::x_axis(),
                disk: Disk::from_dir(Point3::new(2.5, 0.0, 0.0), Vec3::x_axis(), 1.75),
            },
        ]
    }

    #[test]
    fn test_key_tracks_geometry_and_settings() {
        let settings = DiscretizeSettings::default();
        let a = GeometryKey::of(&tunnel(0.0), &settings);
        assert_eq!(a, GeometryKey::of(&tunnel(0.0), &settings));
        assert_ne!(a, GeometryKey::of(&tunnel(1e-9), &settings));

        let mut other = settings.clone();
        other.direction.rounds += 1;
        assert_ne!(a, GeometryKey::of(&tunnel(0.0), &other));

        // Spacing does not affect seeds.
        let mut spacing = settings.clone();
        spacing.delta *= 2.0;
        assert_eq!(a, GeometryKey::of(&tunnel(0.0), &spacing));
        assert_eq!(a.to_string().len(), 16);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        let key = GeometryKey(42);
        assert!(store.load(&key).unwrap().is_none());
        store.store(&key, &seeds()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.load(&key).unwrap().unwrap(), seeds());
    }

    #[test]
    fn test_json_file_store() {
        let dir = std::env::temp_dir().join(format!("tunnel-cache-test-{}", std::process::id()));
        let store = JsonFileStore::new(&dir);
        let key = GeometryKey(0xdead_beef);
        assert!(store.load(&key).unwrap().is_none());

        store.store(&key, &seeds()).unwrap();
        assert!(store.path_for(&key).ends_with("00000000deadbeef.json"));
        let loaded = store.load(&key).unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        for (a, b) in loaded.iter().zip(seeds()) {
            assert!((a.offset - b.offset).abs() < 1e-15);
            assert!((a.direction.into_inner() - b.direction.into_inner()).norm() < 1e-15);
            assert!((a.disk.center - b.disk.center).norm() < 1e-15);
            assert!((a.disk.radius - b.disk.radius).abs() < 1e-15);
        }

        // An entry copied under the wrong name is rejected.
        let other = GeometryKey(7);
        fs::copy(store.path_for(&key), store.path_for(&other)).unwrap();
        assert!(matches!(store.load(&other), Err(DiscretizeError::Cache(_))));

        fs::remove_dir_all(&dir).unwrap();
    }
}
