use flock_ecs::prelude::*;

#[derive(Clone, Copy)]
struct Position {
    #[allow(dead_code)]
    x: f32,
}
impl Component for Position {
    type Storage = SparseStorage<Self>;
}

#[derive(Clone, Copy)]
struct Velocity {
    x: f32,
}
impl Component for Velocity {
    type Storage = SparseStorage<Self>;
}

struct Target(EntityId);

struct Mover;
impl System for Mover {
    fn access(&self) -> Access {
        Access::new().subscribes::<Position>().subscribes::<Velocity>()
    }
    fn run(&self, _ctx: &SystemCtx<'_>) {}
}

struct GiveVelocity;
impl System for GiveVelocity {
    fn access(&self) -> Access {
        Access::new().attaches::<Velocity>().reads_resource::<Target>()
    }
    fn run(&self, ctx: &SystemCtx<'_>) {
        let target = ctx.resource::<Target>().0;
        let mut attach = ctx.attach::<Velocity>();
        attach.attach(target, Velocity { x: 2.5 });
    }
}

struct TakePosition;
impl System for TakePosition {
    fn access(&self) -> Access {
        Access::new().detaches::<Position>().reads_resource::<Target>()
    }
    fn run(&self, ctx: &SystemCtx<'_>) {
        let target = ctx.resource::<Target>().0;
        let mut detach = ctx.detach::<Position>();
        detach.detach(target);
    }
}

fn build_world() -> (World, EntityId) {
    let mut world = WorldBuilder::new()
        .register_component::<Position>()
        .register_component::<Velocity>()
        .register_resource::<Target>()
        .add_system(Mover)
        .add_system(GiveVelocity)
        .add_system(TakePosition)
        .threads(2)
        .init(|resources| resources.construct_and_own(Target(0)))
        .unwrap();

    let mut id = 0;
    world.build_entities(|builder| {
        id = builder.new_entity().attach(Position { x: 1.0 }).id();
    });
    world.resource_mut::<Target>().0 = id;
    (world, id)
}

#[test]
fn attach_updates_the_follow_index_at_the_drain() {
    let (mut world, entity) = build_world();

    // Position alone does not satisfy {Position, Velocity}.
    assert!(!world.followed::<Mover>().contains(entity));

    let give = world.system_id::<GiveVelocity>();
    world.run_sequential(&[give]);

    assert!(world.followed::<Mover>().contains(entity));
    assert!(world.has_component::<Velocity>(entity));
    assert_eq!(world.storage::<Velocity>().get(entity).x, 2.5);
}

#[test]
fn detach_unfollows_but_leaves_other_storages_alone() {
    let (mut world, entity) = build_world();

    let give = world.system_id::<GiveVelocity>();
    let take = world.system_id::<TakePosition>();
    world.run_sequential(&[give]);
    assert!(world.followed::<Mover>().contains(entity));

    world.run_sequential(&[take]);

    assert!(!world.followed::<Mover>().contains(entity));
    assert!(!world.has_component::<Position>(entity));
    assert!(!world.storage::<Position>().has(entity));

    // The velocity never went anywhere.
    assert!(world.storage::<Velocity>().has(entity));
    assert_eq!(world.storage::<Velocity>().get(entity).x, 2.5);
    assert!(world.contains_entity(entity));
}

// The storage changes immediately inside the invocation, but the follow
// index only catches up at the drain.
#[test]
fn follow_updates_wait_for_the_drain() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Probe(Arc<AtomicBool>);
    impl System for Probe {
        fn access(&self) -> Access {
            Access::new()
                .subscribes::<Position>()
                .subscribes::<Velocity>()
                .attaches::<Velocity>()
                .reads_resource::<Target>()
        }
        fn run(&self, ctx: &SystemCtx<'_>) {
            let target = ctx.resource::<Target>().0;
            {
                let mut attach = ctx.attach::<Velocity>();
                attach.attach(target, Velocity { x: 9.0 });
            }
            // Still the snapshot left by the previous drain.
            assert!(!ctx.entities().contains(target));
            self.0.store(true, Ordering::Release);
        }
    }

    let ran = Arc::new(AtomicBool::new(false));
    let mut world = WorldBuilder::new()
        .register_component::<Position>()
        .register_component::<Velocity>()
        .register_resource::<Target>()
        .add_system(Probe(ran.clone()))
        .threads(2)
        .init(|resources| resources.construct_and_own(Target(0)))
        .unwrap();

    let mut id = 0;
    world.build_entities(|builder| {
        id = builder.new_entity().attach(Position { x: 1.0 }).id();
    });
    world.resource_mut::<Target>().0 = id;

    let probe = world.system_id::<Probe>();
    world.run_sequential(&[probe]);
    assert!(ran.load(Ordering::Acquire));
    assert!(world.storage::<Velocity>().has(id));
    assert!(world.followed::<Probe>().contains(id));
}
