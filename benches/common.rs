#![allow(dead_code)]

use flock_ecs::engine::random;
use flock_ecs::prelude::*;
use flock_ecs::EntityBuilder;

pub const AGENTS_SMALL: usize = 1_000;
pub const AGENTS_MED: usize = 100_000;

pub const DT: f32 = 0.016;

#[derive(Clone, Copy)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}
impl Component for Position {
    type Storage = BucketStorage<Self, 15_000>;
}

#[derive(Clone, Copy)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}
impl Component for Velocity {
    type Storage = BucketStorage<Self, 15_000>;
}

#[derive(Clone, Copy)]
pub struct Angle {
    pub theta: f32,
}
impl Component for Angle {
    type Storage = BucketStorage<Self, 15_000>;
}

#[derive(Clone, Copy)]
pub struct RotationalVelocity {
    pub dtheta: f32,
}
impl Component for RotationalVelocity {
    type Storage = BucketStorage<Self, 15_000>;
}

pub struct Translation;
impl System for Translation {
    fn access(&self) -> Access {
        Access::new()
            .subscribes::<Position>()
            .subscribes::<Velocity>()
            .writes::<Position>()
            .reads::<Velocity>()
    }
    fn run(&self, ctx: &SystemCtx<'_>) {
        let mut position = ctx.write::<Position>();
        let velocity = ctx.read::<Velocity>();
        ctx.entities().for_each(|id| {
            let v = velocity[id];
            let p = &mut position[id];
            p.x += DT * v.x;
            p.y += DT * v.y;
        });
    }
}

pub struct Rotation;
impl System for Rotation {
    fn access(&self) -> Access {
        Access::new()
            .subscribes::<Angle>()
            .subscribes::<RotationalVelocity>()
            .writes::<Angle>()
            .reads::<RotationalVelocity>()
    }
    fn run(&self, ctx: &SystemCtx<'_>) {
        let mut angle = ctx.write::<Angle>();
        let rotational = ctx.read::<RotationalVelocity>();
        ctx.entities().for_each(|id| {
            angle[id].theta += DT * rotational[id].dtheta;
        });
    }
}

pub fn spawn_agent(builder: &mut EntityBuilder<'_>) {
    builder
        .new_entity()
        .attach(Position {
            x: random::uniform_f32(-500.0, 500.0),
            y: random::uniform_f32(-500.0, 500.0),
        })
        .attach(Velocity {
            x: random::uniform_f32(-1.0, 1.0),
            y: random::uniform_f32(-1.0, 1.0),
        })
        .attach(Angle { theta: 0.0 })
        .attach(RotationalVelocity { dtheta: 0.1 });
}

pub fn build_world(agents: usize) -> World {
    let mut world = WorldBuilder::new()
        .register_component::<Position>()
        .register_component::<Velocity>()
        .register_component::<Angle>()
        .register_component::<RotationalVelocity>()
        .add_system(Translation)
        .add_system(Rotation)
        .build()
        .unwrap();

    world.build_entities(|builder| {
        for _ in 0..agents {
            spawn_agent(builder);
        }
    });
    world
}
