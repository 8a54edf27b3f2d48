//! Headless симуляция арены
//!
//! Запускает Bevy App без рендера: загрузка контента, затем N fixed тиков.
//!
//! Usage: `ragdoll_simulation [config.ron] [seed] [ticks]`

use std::process::ExitCode;

use ragdoll_simulation::{
    create_headless_app, logger, roster_snapshot, CharacterRoster, LoadFailed, RagdollPlugin,
    SimulationConfig,
};

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);

    let config = match args.next() {
        Some(path) => match std::fs::read_to_string(&path)
            .map_err(|err| err.to_string())
            .and_then(|source| SimulationConfig::from_ron_str(&source).map_err(|err| err.to_string()))
        {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Failed to load config {}: {}", path, err);
                return ExitCode::FAILURE;
            }
        },
        None => SimulationConfig::default(),
    };
    let seed = args.next().and_then(|arg| arg.parse().ok()).unwrap_or(42);
    let ticks: u32 = args.next().and_then(|arg| arg.parse().ok()).unwrap_or(1000);

    println!("Starting ragdoll arena headless simulation (seed: {})", seed);

    let mut app = create_headless_app(seed);
    app.add_plugins(RagdollPlugin {
        config,
        ..Default::default()
    });

    for tick in 0..ticks {
        app.update();

        if let Some(failed) = app.world().get_resource::<LoadFailed>() {
            eprintln!("Content loading failed: {}", failed.0);
            return ExitCode::FAILURE;
        }

        if tick % 100 == 0 {
            if let Some(roster) = app.world().get_resource::<CharacterRoster>() {
                println!(
                    "Tick {}: {} characters, {} pending destruction, {} debris limbs",
                    tick,
                    roster.len(),
                    roster.pending_destruction_count(),
                    roster.debris().len()
                );
            }
        }
    }

    let snapshot = roster_snapshot(app.world());
    logger::log(&format!("Final roster snapshot: {} bytes", snapshot.len()));
    println!("Simulation complete!");
    ExitCode::SUCCESS
}
