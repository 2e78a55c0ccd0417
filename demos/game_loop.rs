/// Example: A fixed-step game loop driven by the service registry
///
/// Services are registered with the application, initialized in three bulk
/// passes, ticked every frame, and one service is registered late from
/// inside an update to show it joining on the next frame.
///
/// Run with `RUST_LOG=ferrous_lifecycle=debug cargo run --example game_loop`
/// to see every transition.

use ferrous_lifecycle::{
    optional, Application, BindTable, Container, HookResult, Lifecycle, LifecycleResult,
    LoggingObserver, RuntimeOptions, ServiceBinding, Shared, Updatable,
};
use std::rc::Rc;
use std::time::Duration;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

// ===== Input =====

#[derive(Default)]
pub struct Input {
    pub frame: u64,
    pub jump_pressed: bool,
}

impl Lifecycle for Input {
    fn on_activated(&mut self) -> HookResult {
        tracing::info!("input devices acquired");
        Ok(())
    }

    fn on_deactivated(&mut self) -> HookResult {
        tracing::info!("input devices released");
        Ok(())
    }
}

impl Updatable for Input {
    fn update(&mut self, _elapsed: Duration) -> HookResult {
        self.frame += 1;
        // Scripted input: jump every fourth frame
        self.jump_pressed = self.frame % 4 == 0;
        Ok(())
    }
}

// ===== Physics =====

#[derive(Default)]
pub struct Physics {
    pub gravity: f32,
}

impl Lifecycle for Physics {
    fn on_loaded(&mut self) -> HookResult {
        self.gravity = -9.81;
        Ok(())
    }
}

// ===== Player =====

#[derive(Default)]
pub struct Player {
    input: Option<Shared<Input>>,
    physics: Option<Shared<Physics>>,
    height: f32,
    velocity: f32,
    jumps: u32,
}

impl Lifecycle for Player {
    fn declare_bindings(table: &mut BindTable<Self>) {
        table
            .service("input", ServiceBinding, |p: &mut Player| &mut p.input)
            .service("physics", ServiceBinding, |p: &mut Player| &mut p.physics);
    }

    fn start(&mut self) -> HookResult {
        tracing::info!("player spawned");
        Ok(())
    }
}

impl Updatable for Player {
    fn update(&mut self, elapsed: Duration) -> HookResult {
        let (Some(input), Some(physics)) = (&self.input, &self.physics) else {
            return Ok(());
        };
        let dt = elapsed.as_secs_f32();

        if input.borrow().jump_pressed && self.height <= 0.0 {
            self.velocity = 4.0;
            self.jumps += 1;
        }
        self.velocity += physics.borrow().gravity * dt;
        self.height = (self.height + self.velocity * dt).max(0.0);
        Ok(())
    }
}

// ===== Hud =====

/// Shows the player's state; registered by the spawner at frame 3.
#[derive(Default)]
pub struct Hud {
    player: Option<Shared<Player>>,
    frames_drawn: u32,
}

impl Lifecycle for Hud {
    fn declare_bindings(table: &mut BindTable<Self>) {
        table.service("player", optional(ServiceBinding), |h: &mut Hud| &mut h.player);
    }
}

impl Updatable for Hud {
    fn update(&mut self, _elapsed: Duration) -> HookResult {
        self.frames_drawn += 1;
        if let Some(player) = &self.player {
            let player = player.borrow();
            tracing::info!(height = player.height, jumps = player.jumps, "hud");
        }
        Ok(())
    }
}

/// Registers the HUD once the game has run for a few frames.
pub struct Spawner {
    container: Container,
    frames: u32,
}

impl Lifecycle for Spawner {}

impl Updatable for Spawner {
    fn update(&mut self, _elapsed: Duration) -> HookResult {
        self.frames += 1;
        if self.frames == 3 {
            tracing::info!("spawning hud");
            self.container.register_updatable_instance(Hud::default())?;
        }
        Ok(())
    }
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into())
        .add_directive("ferrous_lifecycle=info".parse()?);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
    Ok(())
}

fn run() -> LifecycleResult<()> {
    let options = RuntimeOptions::from_env()?.with_max_update_step(Duration::from_millis(50));
    let mut app = Application::with_options(options);
    app.graph_mut().add_observer(Rc::new(LoggingObserver::new()));

    // Registration order is update order
    app.register_updatable_instance(Input::default())?;
    app.register_instance(Physics::default())?;
    let player = app.register_updatable_instance(Player::default())?;
    let spawner = Spawner {
        container: app.container().clone(),
        frames: 0,
    };
    app.register_updatable_instance(spawner)?;

    app.initialize()?;

    for frame in 0..12 {
        app.update_frame(Duration::from_millis(16))?;
        // Notifications raised from inside hooks are applied here
        app.pump()?;

        if frame == 6 {
            tracing::info!("window lost focus");
            app.on_deactivated()?;
            app.update_frame(Duration::from_millis(16))?;
            app.on_activated()?;
        }
    }

    let jumps = player.borrow().jumps;
    let hud = app.resolve::<Hud>()?;
    tracing::info!(jumps, hud_frames = hud.borrow().frames_drawn, "game over");

    let snapshot = app.graph().snapshot();
    println!("{}", snapshot.to_mermaid());

    app.shutdown()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing()?;
    run()?;
    Ok(())
}
