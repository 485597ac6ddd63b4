//! Entity metadata following entities across chunks and regions

use regiontag::{ChunkHost, ChunkKey, EntityKey, RegionKey, StoreConfig, WorldRegister};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tempfile::TempDir;
use uuid::Uuid;

#[derive(Default)]
struct TestHost {
    loaded: Mutex<HashMap<ChunkKey, HashSet<EntityKey>>>,
}

impl TestHost {
    fn place(&self, chunk: ChunkKey, entities: &[EntityKey]) {
        self.loaded
            .lock()
            .unwrap()
            .insert(chunk, entities.iter().copied().collect());
    }

    fn clear(&self) {
        self.loaded.lock().unwrap().clear();
    }
}

impl ChunkHost for TestHost {
    fn is_chunk_loaded(&self, chunk: ChunkKey) -> bool {
        self.loaded.lock().unwrap().contains_key(&chunk)
    }

    fn live_entities(&self, chunk: ChunkKey) -> HashSet<EntityKey> {
        self.loaded
            .lock()
            .unwrap()
            .get(&chunk)
            .cloned()
            .unwrap_or_default()
    }
}

fn open(dir: &TempDir) -> WorldRegister {
    WorldRegister::open(StoreConfig::new(dir.path())).unwrap()
}

#[test]
fn test_entity_moves_between_regions() {
    let temp_dir = TempDir::new().unwrap();
    let world = open(&temp_dir);
    let host = TestHost::default();
    let from = ChunkKey::new(31, 0);
    let to = ChunkKey::new(32, 0);
    let id = Uuid::new_v4();

    host.place(from, &[id]);
    host.place(to, &[]);
    world
        .load_chunk(from)
        .create_stored_entity(id, |tag| tag.put_string("name", "wolf"));
    world.load_chunk(to);

    world.save_all(&host);
    let source = world.region(RegionKey::new(0, 0)).region_tag();
    assert!(source.get_chunk(&from.local()).unwrap().contains_entity(&id));

    // The entity walks across the region border
    host.place(from, &[]);
    host.place(to, &[id]);
    world.save_all(&host);

    let source = world.region(RegionKey::new(0, 0)).region_tag();
    let target = world.region(RegionKey::new(1, 0)).region_tag();
    assert!(source.get_chunk(&from.local()).is_none());
    let moved = target.get_chunk(&to.local()).unwrap().get_entity(&id).unwrap();
    assert_eq!(moved.get_string("name"), Some("wolf"));
    assert!(world.load_chunk(to).stored_entities().contains(&id));
}

#[test]
fn test_entity_reloads_with_its_chunk() {
    let temp_dir = TempDir::new().unwrap();
    let chunk = ChunkKey::new(4, 4);
    let id = Uuid::new_v4();
    {
        let world = open(&temp_dir);
        let host = TestHost::default();
        host.place(chunk, &[id]);
        world
            .load_chunk(chunk)
            .create_stored_entity(id, |tag| tag.put_int("health", 20));
        world.save_all(&host);
        host.clear();
        world.unload_regions(&host);
    }

    let world = open(&temp_dir);
    assert!(!world.is_entity_stored(&id));

    let register = world.load_chunk(chunk);
    assert!(register.stored_entities().contains(&id));
    assert!(world.is_entity_stored(&id));
    assert_eq!(world.get_stored_entity(&id).unwrap().get_int("health"), Some(20));
}

#[test]
fn test_unload_chunk_evicts_live_entities() {
    let temp_dir = TempDir::new().unwrap();
    let world = open(&temp_dir);
    let chunk = ChunkKey::new(0, 0);
    let id = Uuid::new_v4();

    world
        .load_chunk(chunk)
        .create_stored_entity(id, |tag| tag.put_int("age", 2));
    assert!(world.is_entity_stored(&id));

    let live: HashSet<EntityKey> = [id].into_iter().collect();
    assert!(world.unload_chunk(chunk, &live));
    assert!(!world.is_entity_stored(&id));
    assert!(!world.is_chunk_loaded(chunk));

    let aggregate = world.region(RegionKey::new(0, 0)).region_tag();
    let stored = aggregate.get_chunk(&chunk.local()).unwrap();
    assert_eq!(stored.get_entity(&id).unwrap().get_int("age"), Some(2));
}

#[test]
fn test_teardown_keeps_remembered_entities() {
    let temp_dir = TempDir::new().unwrap();
    let world = open(&temp_dir);
    let chunk = ChunkKey::new(0, 0);
    let id = Uuid::new_v4();

    let register = world.load_chunk(chunk);
    register.create_stored_entity(id, |tag| tag.put_string("kind", "pig"));

    // No live enumeration: everything the chunk remembers is pulled out of the world cache
    register.save_population(None);
    assert!(!world.is_entity_stored(&id));
    assert!(register.chunk_tag().contains_entity(&id));
}

#[test]
fn test_entities_without_metadata_are_dropped() {
    let temp_dir = TempDir::new().unwrap();
    let world = open(&temp_dir);
    let chunk = ChunkKey::new(0, 0);
    let empty = Uuid::new_v4();
    let unknown = Uuid::new_v4();

    let register = world.load_chunk(chunk);
    register.create_stored_entity(empty, |_| ());

    let live: HashSet<EntityKey> = [empty, unknown].into_iter().collect();
    register.save_population(Some(&live));

    let tag = register.chunk_tag();
    assert_eq!(tag.entity_count(), 0);
    assert_eq!(register.stored_entities(), live);
}

#[test]
fn test_reference_entity_adopts_migrating_metadata() {
    let temp_dir = TempDir::new().unwrap();
    let world = open(&temp_dir);
    let id = Uuid::new_v4();

    // Freshly spawned entity with no owning chunk yet
    world.create_stored_entity(id, |tag| tag.put_int("level", 3));

    let register = world.load_chunk(ChunkKey::new(2, 2));
    register.reference_entity(id);
    register.save_population(None);

    assert_eq!(
        register.chunk_tag().get_entity(&id).unwrap().get_int("level"),
        Some(3)
    );
}
