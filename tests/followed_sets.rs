use flock_ecs::prelude::*;
use flock_ecs::FollowedSet;

#[test]
fn append_newest_bulk_copies() {
    let mut set = FollowedSet::new();
    set.append_newest(&[2, 3, 5]);
    set.append_newest(&[8, 13]);
    assert_eq!(set.as_slice(), &[2, 3, 5, 8, 13]);
}

#[test]
fn merge_insert_unions_and_dedups() {
    let mut set = FollowedSet::new();
    set.append_newest(&[2, 5, 9, 14]);
    set.merge_insert(&[3, 5, 10, 20]);
    assert_eq!(set.as_slice(), &[2, 3, 5, 9, 10, 14, 20]);

    set.merge_insert(&[]);
    assert_eq!(set.as_slice(), &[2, 3, 5, 9, 10, 14, 20]);

    let mut empty = FollowedSet::new();
    empty.merge_insert(&[4, 6]);
    assert_eq!(empty.as_slice(), &[4, 6]);
}

#[test]
fn difference_remove_is_a_linear_set_difference() {
    let mut set = FollowedSet::new();
    set.append_newest(&[2, 3, 5, 8, 13, 21, 34]);

    set.difference_remove(&[3, 13, 55]);
    assert_eq!(set.as_slice(), &[2, 5, 8, 21, 34]);

    set.difference_remove(&[1]);
    assert_eq!(set.as_slice(), &[2, 5, 8, 21, 34]);

    set.difference_remove(&[2, 5, 8, 21, 34]);
    assert!(set.is_empty());
}

#[test]
fn contains_uses_the_sorted_order() {
    let mut set = FollowedSet::new();
    set.append_newest(&[2, 4, 6, 8]);
    assert!(set.contains(6));
    assert!(!set.contains(5));
}

#[test]
fn split_covers_the_set_with_balanced_ranges() {
    let mut set = FollowedSet::new();
    set.append_newest(&[2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);

    let ranges = set.split(3);
    assert_eq!(ranges.len(), 3);
    assert_eq!(ranges[0].len(), 4);
    assert_eq!(ranges[1].len(), 3);
    assert_eq!(ranges[2].len(), 3);

    let concatenated: Vec<EntityId> = ranges.iter().flat_map(|r| r.iter().copied()).collect();
    assert_eq!(concatenated, set.as_slice());

    // More ranges than elements: the tail ranges are empty, coverage exact.
    let ranges = set.split(16);
    assert_eq!(ranges.len(), 16);
    let sizes: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
    assert!(sizes.iter().all(|&len| len <= 1));
    let concatenated: Vec<EntityId> = ranges.iter().flat_map(|r| r.iter().copied()).collect();
    assert_eq!(concatenated, set.as_slice());

    let ranges = set.split(1);
    assert_eq!(ranges.len(), 1);
    assert_eq!(ranges[0], set.as_slice());
}

// ───────────────────────────────────────────────────────────────────────────
// Follow/mask truth across a churn of structural changes.
// ───────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
struct Hull(#[allow(dead_code)] u32);
impl Component for Hull {
    type Storage = SparseStorage<Self>;
}

#[derive(Clone, Copy)]
struct Engine(#[allow(dead_code)] u32);
impl Component for Engine {
    type Storage = SparseStorage<Self>;
}

#[derive(Clone, Copy)]
struct Cargo(#[allow(dead_code)] u32);
impl Component for Cargo {
    type Storage = SparseStorage<Self>;
}

struct Targets(Vec<EntityId>);

struct HullWatcher;
impl System for HullWatcher {
    fn access(&self) -> Access {
        Access::new().subscribes::<Hull>()
    }
    fn run(&self, _ctx: &SystemCtx<'_>) {}
}

struct FreighterWatcher;
impl System for FreighterWatcher {
    fn access(&self) -> Access {
        Access::new()
            .subscribes::<Hull>()
            .subscribes::<Engine>()
            .subscribes::<Cargo>()
    }
    fn run(&self, _ctx: &SystemCtx<'_>) {}
}

struct AttachEngines;
impl System for AttachEngines {
    fn access(&self) -> Access {
        Access::new().attaches::<Engine>().reads_resource::<Targets>()
    }
    fn run(&self, ctx: &SystemCtx<'_>) {
        let targets = ctx.resource::<Targets>();
        let mut attach = ctx.attach::<Engine>();
        for &id in &targets.0 {
            attach.attach(id, Engine(1));
        }
    }
}

struct DetachCargo;
impl System for DetachCargo {
    fn access(&self) -> Access {
        Access::new().detaches::<Cargo>().reads_resource::<Targets>()
    }
    fn run(&self, ctx: &SystemCtx<'_>) {
        let targets = ctx.resource::<Targets>();
        let mut detach = ctx.detach::<Cargo>();
        for &id in &targets.0 {
            detach.detach(id);
        }
    }
}

struct Scuttle;
impl System for Scuttle {
    fn access(&self) -> Access {
        Access::new().destroys_entities().reads_resource::<Targets>()
    }
    fn run(&self, ctx: &SystemCtx<'_>) {
        let targets = ctx.resource::<Targets>();
        let mut destroyer = ctx.destroyer();
        for &id in &targets.0 {
            destroyer.destroy(id);
        }
    }
}

fn build_world() -> World {
    WorldBuilder::new()
        .register_component::<Hull>()
        .register_component::<Engine>()
        .register_component::<Cargo>()
        .register_resource::<Targets>()
        .add_system(HullWatcher)
        .add_system(FreighterWatcher)
        .add_system(AttachEngines)
        .add_system(DetachCargo)
        .add_system(Scuttle)
        .threads(2)
        .init(|resources| resources.construct_and_own(Targets(Vec::new())))
        .unwrap()
}

fn assert_invariants(world: &World) {
    let live = world.live_entities();

    // Mask truth: mask bits mirror storage occupancy.
    for &id in &live {
        assert_eq!(
            world.has_component::<Hull>(id),
            world.storage::<Hull>().has(id)
        );
        assert_eq!(
            world.has_component::<Engine>(id),
            world.storage::<Engine>().has(id)
        );
        assert_eq!(
            world.has_component::<Cargo>(id),
            world.storage::<Cargo>().has(id)
        );
    }

    // Follow truth + sortedness for both watchers.
    let hull_watcher = world.followed::<HullWatcher>();
    assert!(hull_watcher.as_slice().windows(2).all(|p| p[0] < p[1]));
    for &id in &live {
        assert_eq!(hull_watcher.contains(id), world.has_component::<Hull>(id));
    }

    let freighter = world.followed::<FreighterWatcher>();
    assert!(freighter.as_slice().windows(2).all(|p| p[0] < p[1]));
    for &id in &live {
        let qualifies = world.has_component::<Hull>(id)
            && world.has_component::<Engine>(id)
            && world.has_component::<Cargo>(id);
        assert_eq!(freighter.contains(id), qualifies);
    }
}

#[test]
fn follow_truth_through_structural_churn() {
    let mut world = build_world();

    // Thirty hulls with cargo, no engines yet.
    let mut ids = Vec::new();
    world.build_entities(|builder| {
        for n in 0..30u32 {
            let skeleton = builder.new_entity().attach(Hull(n)).attach(Cargo(n));
            ids.push(skeleton.id());
        }
    });
    assert_eq!(world.entity_count(), 30);
    assert_eq!(world.followed::<HullWatcher>().len(), 30);
    assert_eq!(world.followed::<FreighterWatcher>().len(), 0);
    assert_invariants(&world);

    // Engines for every third ship: they become freighters.
    let engined: Vec<EntityId> = ids.iter().copied().step_by(3).collect();
    world.resource_mut::<Targets>().0 = engined.clone();
    let attach = world.system_id::<AttachEngines>();
    world.run_sequential(&[attach]);
    assert_eq!(world.followed::<FreighterWatcher>().len(), engined.len());
    assert_invariants(&world);

    // Strip cargo from half of those: they stop being freighters, but the
    // engine storage keeps their engines.
    let stripped: Vec<EntityId> = engined.iter().copied().step_by(2).collect();
    world.resource_mut::<Targets>().0 = stripped.clone();
    let detach = world.system_id::<DetachCargo>();
    world.run_sequential(&[detach]);
    assert_eq!(
        world.followed::<FreighterWatcher>().len(),
        engined.len() - stripped.len()
    );
    for &id in &stripped {
        assert!(world.storage::<Engine>().has(id));
    }
    assert_invariants(&world);

    // Scuttle the stripped ships entirely.
    world.resource_mut::<Targets>().0 = stripped.clone();
    let scuttle = world.system_id::<Scuttle>();
    world.run_sequential(&[scuttle]);
    assert_eq!(world.entity_count(), 30 - stripped.len());
    for &id in &stripped {
        assert!(!world.contains_entity(id));
        assert!(!world.storage::<Hull>().has(id));
        assert!(!world.storage::<Engine>().has(id));
    }
    assert_invariants(&world);
}

#[test]
fn drains_with_empty_queues_are_no_ops() {
    let mut world = build_world();
    world.build_entities(|builder| {
        for n in 0..10u32 {
            builder.new_entity().attach(Hull(n)).attach(Cargo(n)).attach(Engine(n));
        }
    });

    let before_live = world.live_entities();
    let before_hull = world.followed::<HullWatcher>().as_slice().to_vec();
    let before_freighter = world.followed::<FreighterWatcher>().as_slice().to_vec();

    // Structural systems run with nothing targeted; their drains see empty
    // queues. Back-to-back runs must leave the state untouched.
    world.resource_mut::<Targets>().0.clear();
    let attach = world.system_id::<AttachEngines>();
    let detach = world.system_id::<DetachCargo>();
    let scuttle = world.system_id::<Scuttle>();
    world.run_sequential(&[attach, detach, scuttle]);
    world.run_sequential(&[attach, detach, scuttle]);

    assert_eq!(world.live_entities(), before_live);
    assert_eq!(world.followed::<HullWatcher>().as_slice(), &before_hull[..]);
    assert_eq!(
        world.followed::<FreighterWatcher>().as_slice(),
        &before_freighter[..]
    );
}
