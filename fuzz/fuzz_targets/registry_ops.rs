#![no_main]

use ferrous_lifecycle::{
    Application, HookResult, Lifecycle, LifecycleError, LifecycleState, RuntimeOptions, Updatable,
};
use libfuzzer_sys::fuzz_target;
use std::time::Duration;

macro_rules! service {
    ($($ty:ident),*) => {
        $(
            #[derive(Default)]
            struct $ty {
                fail_updates: bool,
            }

            impl Lifecycle for $ty {}

            impl Updatable for $ty {
                fn update(&mut self, _elapsed: Duration) -> HookResult {
                    if self.fail_updates {
                        return Err("update failed".into());
                    }
                    Ok(())
                }
            }
        )*
    };
}

service!(Alpha, Beta, Gamma, Delta);

fn register(app: &mut Application, which: u8, fail_updates: bool) -> Result<(), LifecycleError> {
    let result = match which % 4 {
        0 => app.register_updatable_instance(Alpha { fail_updates }).map(drop),
        1 => app.register_updatable_instance(Beta { fail_updates }).map(drop),
        2 => app.register_instance(Gamma { fail_updates }).map(drop),
        _ => app.register_updatable_type(move |_| Ok(Delta { fail_updates })),
    };
    match result {
        Err(LifecycleError::DuplicateRegistration(_)) => Ok(()),
        other => other,
    }
}

fn unregister(app: &mut Application, which: u8) -> Result<(), LifecycleError> {
    match which % 4 {
        0 => app.unregister::<Alpha>(),
        1 => app.unregister::<Beta>(),
        2 => app.unregister::<Gamma>(),
        _ => app.unregister::<Delta>(),
    }
    .map(drop)
}

fuzz_target!(|data: &[u8]| {
    let mut app = Application::with_options(RuntimeOptions::default().with_rethrow_errors(false));

    for &byte in data {
        let which = byte >> 4;
        let outcome = match byte % 8 {
            0 | 1 => register(&mut app, which, byte & 0x08 != 0),
            2 => unregister(&mut app, which),
            3 => app.initialize(),
            4 | 5 => app.update_frame(Duration::from_millis(u64::from(which))),
            6 => app.on_deactivated(),
            _ => {
                if app.container().is_registered::<Delta>() {
                    app.resolve::<Delta>().map(drop)
                } else {
                    app.on_activated()
                }
            }
        };
        if let Err(err) = outcome {
            panic!("unexpected error: {err}");
        }

        let graph = app.graph();
        assert!(graph.verify_links().is_ok());
        for id in app.services().roster() {
            assert!(graph.contains(id));
            if app.services().is_initialized()
                && app.services().state() == LifecycleState::Activated
            {
                assert!(graph.state(id).unwrap().is_attached());
            }
        }
    }

    app.shutdown().unwrap();
    assert!(app.graph().is_empty());
});
