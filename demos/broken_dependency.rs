/// Example: What happens when a required dependency goes away
///
/// Two turrets require a power grid; a radar uses it optionally. Destroying
/// the grid forces both turrets back to Detached while the radar keeps
/// running with its field cleared.

use ferrous_lifecycle::{
    optional, BindTable, HookResult, Lifecycle, LifecycleState, MetricsObserver, ObjectGraph,
    ServiceBinding, Shared,
};
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

pub struct PowerGrid {
    pub output_kw: u32,
}

impl Lifecycle for PowerGrid {
    fn on_destroy(&mut self) -> HookResult {
        tracing::warn!(output_kw = self.output_kw, "power grid destroyed");
        Ok(())
    }
}

#[derive(Default)]
pub struct Turret {
    grid: Option<Shared<PowerGrid>>,
}

impl Lifecycle for Turret {
    fn declare_bindings(table: &mut BindTable<Self>) {
        table.service("grid", ServiceBinding, |t: &mut Turret| &mut t.grid);
    }

    fn on_detach(&mut self) -> HookResult {
        tracing::info!("turret powering down");
        Ok(())
    }
}

#[derive(Default)]
pub struct Radar {
    grid: Option<Shared<PowerGrid>>,
}

impl Lifecycle for Radar {
    fn declare_bindings(table: &mut BindTable<Self>) {
        table.service("grid", optional(ServiceBinding), |r: &mut Radar| &mut r.grid);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let metrics = Rc::new(MetricsObserver::new());
    let mut graph = ObjectGraph::new();
    graph.add_observer(metrics.clone());

    let grid = graph.insert(PowerGrid { output_kw: 480 });
    let turrets = [graph.insert(Turret::default()), graph.insert(Turret::default())];
    let radar = graph.insert(Radar::default());

    for id in turrets.iter().copied().chain([radar]) {
        graph.force_state(id, LifecycleState::Activated, true)?;
    }
    println!("{}", graph.snapshot().to_dot());

    // The grid never attached, so it can be destroyed straight away
    graph.destroy(grid)?;

    for id in turrets {
        println!("turret {id}: {}", graph.state(id)?);
    }
    let radar_grid = match graph.get::<Radar>(radar) {
        Some(handle) => handle.borrow().grid.is_some(),
        None => false,
    };
    println!("radar {radar}: {} (grid bound: {radar_grid})", graph.state(radar)?);

    println!(
        "links created: {}, removed: {}, broken: {}",
        metrics.links_created(),
        metrics.links_removed(),
        metrics.broken_dependencies()
    );

    // Without a grid the turrets cannot come back
    for id in turrets {
        let attached = graph.attach(id)?;
        println!("turret {id} reattached: {attached}");
    }

    println!("{}", graph.snapshot().to_dot());
    Ok(())
}
