use flock_ecs::{BucketStorage, EntityId, NO_ENTITY};

#[derive(Clone, Copy, Debug, PartialEq)]
struct Payload(EntityId);

const FIRST: EntityId = 2;
const COUNT: u32 = 3_000;

fn populated() -> BucketStorage<Payload, 1000> {
    let mut storage: BucketStorage<Payload, 1000> = BucketStorage::new();
    for id in FIRST..FIRST + COUNT {
        storage.attach(id, Payload(id));
    }
    storage
}

#[test]
fn attach_fills_buckets_in_order() {
    let storage = populated();
    assert_eq!(storage.bucket_count(), 3);
    assert_eq!(storage.len(), COUNT as usize);
    for bucket in 0..3 {
        assert_eq!(storage.active_slots(bucket), 1000);
    }
}

#[test]
fn defrag_restores_ascending_order() {
    let mut storage = populated();

    let mut detached = 0usize;
    for id in (FIRST..FIRST + COUNT).filter(|id| (id - FIRST) % 7 == 0) {
        storage.detach(id);
        detached += 1;
    }

    storage.defragment();

    // Non-empty slots ascend across (bucket 0, slot 0) .. (bucket B-1,
    // slot N-1), with the empties compacted to the global tail.
    let mut all_slots: Vec<EntityId> = Vec::new();
    for bucket in 0..storage.bucket_count() {
        all_slots.extend_from_slice(storage.slot_entities(bucket));
    }
    let live: Vec<EntityId> = all_slots
        .iter()
        .copied()
        .filter(|&id| id != NO_ENTITY)
        .collect();
    assert!(live.windows(2).all(|pair| pair[0] < pair[1]));
    let first_empty = all_slots
        .iter()
        .position(|&id| id == NO_ENTITY)
        .expect("detached slots must remain empty");
    assert!(
        all_slots[first_empty..].iter().all(|&id| id == NO_ENTITY),
        "empties did not compact toward the tail"
    );

    let total_active: usize = (0..storage.bucket_count())
        .map(|bucket| storage.active_slots(bucket))
        .sum();
    assert_eq!(total_active, COUNT as usize - detached);

    // Handle integrity: each surviving entity's handle points at a slot
    // holding its id, and the value came along.
    for id in (FIRST..FIRST + COUNT).filter(|id| (id - FIRST) % 7 != 0) {
        let handle = storage.handle(id).expect("surviving entity lost its handle");
        assert_eq!(
            storage.slot_entities(handle.bucket as usize)[handle.slot as usize],
            id
        );
        assert_eq!(*storage.get(id), Payload(id));
    }
}

#[test]
fn defrag_of_untouched_storage_is_identity() {
    let mut storage = populated();
    storage.defragment();
    for id in FIRST..FIRST + COUNT {
        assert_eq!(*storage.get(id), Payload(id));
    }
    let slots: Vec<EntityId> = (0..storage.bucket_count())
        .flat_map(|bucket| storage.slot_entities(bucket).iter().copied())
        .collect();
    assert!(slots.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn detach_reopens_the_earliest_slot() {
    let mut storage: BucketStorage<Payload, 100> = BucketStorage::new();
    for id in FIRST..FIRST + 100 {
        storage.attach(id, Payload(id));
    }

    storage.detach(FIRST + 40);
    storage.detach(FIRST + 10);
    storage.detach(FIRST + 70);

    // The next attach lands in the earliest hole.
    storage.attach(9_000, Payload(9_000));
    let handle = storage.handle(9_000).unwrap();
    assert_eq!((handle.bucket, handle.slot), (0, 10));

    storage.attach(9_001, Payload(9_001));
    let handle = storage.handle(9_001).unwrap();
    assert_eq!((handle.bucket, handle.slot), (0, 40));
}

#[test]
fn defrag_estimate_tracks_fragmentation() {
    let mut storage = populated();
    assert_eq!(storage.estimate_defrag_seconds(), None);

    // 3000 slots; past 300 removals the ratio crosses 10%.
    for id in FIRST..FIRST + 300 {
        storage.detach(id);
    }
    assert_eq!(storage.estimate_defrag_seconds(), None);

    for id in FIRST + 300..FIRST + 400 {
        storage.detach(id);
    }
    let estimate = storage
        .estimate_defrag_seconds()
        .expect("fragmentation above threshold must yield an estimate");
    assert!(estimate > 0.0);

    storage.defragment();
    assert_eq!(storage.removals_since_defrag(), 0);
    assert_eq!(storage.estimate_defrag_seconds(), None);
}

#[test]
#[should_panic(expected = "already has component")]
fn double_attach_is_fatal() {
    let mut storage: BucketStorage<Payload, 10> = BucketStorage::new();
    storage.attach(5, Payload(5));
    storage.attach(5, Payload(5));
}

#[test]
#[should_panic(expected = "has no component")]
fn detach_of_absent_is_fatal() {
    let mut storage: BucketStorage<Payload, 10> = BucketStorage::new();
    storage.detach(5);
}
