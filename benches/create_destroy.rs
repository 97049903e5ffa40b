use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::hint::black_box;

use flock_ecs::prelude::*;

mod common;
use common::*;

struct CullOffscreen;
impl System for CullOffscreen {
    fn access(&self) -> Access {
        Access::new()
            .subscribes::<Position>()
            .reads::<Position>()
            .builds_entities()
            .destroys_entities()
    }
    fn run(&self, ctx: &SystemCtx<'_>) {
        let position = ctx.read::<Position>();
        let mut builder = ctx.builder();
        let mut destroyer = ctx.destroyer();
        ctx.entities().for_each(|id| {
            let p = position.get(id);
            if p.x * p.x > 200_000.0 || p.y * p.y > 200_000.0 {
                destroyer.destroy(id);
                spawn_agent(&mut builder);
            }
        });
    }
}

fn churn_world(agents: usize) -> World {
    let mut world = WorldBuilder::new()
        .register_component::<Position>()
        .register_component::<Velocity>()
        .register_component::<Angle>()
        .register_component::<RotationalVelocity>()
        .add_system(Translation)
        .add_system(Rotation)
        .add_system(CullOffscreen)
        .build()
        .unwrap();

    world.build_entities(|builder| {
        for _ in 0..agents {
            spawn_agent(builder);
        }
    });
    world
}

fn create_destroy_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_destroy");
    group.sample_size(20);

    for agents in [10_000usize, 100_000] {
        group.bench_function(format!("churn_{agents}"), |b| {
            b.iter_batched(
                || churn_world(agents),
                |mut world| {
                    world.tick();
                    black_box(world.entity_count())
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, create_destroy_benchmark);
criterion_main!(benches);
