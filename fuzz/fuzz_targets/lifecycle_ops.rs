#![no_main]

use ferrous_lifecycle::{
    optional, AllOf, BindTable, Lifecycle, LifecycleState, ObjectGraph, ServiceBinding, Shared,
};
use libfuzzer_sys::fuzz_target;

struct Engine;
impl Lifecycle for Engine {}

#[derive(Default)]
struct Car {
    engine: Option<Shared<Engine>>,
}

impl Lifecycle for Car {
    fn declare_bindings(table: &mut BindTable<Self>) {
        table.service("engine", ServiceBinding, |c: &mut Car| &mut c.engine);
    }
}

#[derive(Default)]
struct Dashboard {
    engine: Option<Shared<Engine>>,
    cars: Vec<Shared<Car>>,
}

impl Lifecycle for Dashboard {
    fn declare_bindings(table: &mut BindTable<Self>) {
        table
            .service("engine", optional(ServiceBinding), |d: &mut Dashboard| &mut d.engine)
            .services("cars", AllOf, |d: &mut Dashboard| &mut d.cars);
    }
}

const STATES: [LifecycleState; 4] = [
    LifecycleState::Destroyed,
    LifecycleState::Detached,
    LifecycleState::Deactivated,
    LifecycleState::Activated,
];

fuzz_target!(|data: &[u8]| {
    let mut graph = ObjectGraph::new();
    let mut ids = vec![
        graph.insert(Engine),
        graph.insert(Car::default()),
        graph.insert(Dashboard::default()),
    ];

    // Each byte pair picks an object and an operation
    for chunk in data.chunks_exact(2) {
        let id = ids[chunk[0] as usize % ids.len()];
        let op = chunk[1];
        let outcome = match op % 12 {
            0 => graph.load(id),
            1 => graph.attach(id).map(drop),
            2 => graph.activate(id),
            3 => graph.start(id),
            4 => graph.deactivate(id),
            5 => graph.detach(id),
            6 => graph.destroy(id),
            7 => graph
                .force_state(id, STATES[(op as usize >> 4) % STATES.len()], op & 0x80 != 0)
                .map(drop),
            8 => graph.set_enabled(id, op & 0x80 != 0),
            9 => {
                if ids.len() < 32 {
                    ids.push(graph.insert(Car::default()));
                }
                Ok(())
            }
            10 => {
                if ids.len() < 32 {
                    ids.push(graph.insert(Engine));
                }
                Ok(())
            }
            _ => {
                if graph.state(id).map_or(false, |state| state == LifecycleState::Destroyed) {
                    graph.remove(id).map(drop).and_then(|()| {
                        ids.retain(|known| *known != id);
                        Ok(())
                    })
                } else {
                    Ok(())
                }
            }
        };

        // Nothing here fails a hook, so only precondition errors may surface
        if let Err(err) = outcome {
            assert!(err.is_invalid_state(), "unexpected error: {err}");
        }
        if let Err(violation) = graph.verify_links() {
            panic!("link bookkeeping broken: {violation}");
        }
        if ids.is_empty() {
            break;
        }
    }
});
