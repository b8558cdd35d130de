use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use server::combat::Difficulty;
use server::hub::Hub;
use server::map::{Map, DEFAULT_MAP};
use server::network::{Broadcaster, CollisionRelay, Server};
use server::world::World;
use shared::EnemyKind;

/// Main-method of the application.
/// Parses command-line arguments, builds the game context, then runs the
/// accept loop and the simulation tick until shutdown.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "5000")]
        port: u16,
        /// Tick rate (simulation updates per second)
        #[clap(short, long, default_value = "20")]
        tick_rate: u32,
        /// Path to a map file; the embedded map is used when omitted
        #[clap(short, long)]
        map: Option<PathBuf>,
        /// Damage difficulty preset (easy, normal, hard)
        #[clap(short, long, default_value = "normal")]
        difficulty: String,
    }

    let args = Args::parse();

    let map = match &args.map {
        Some(path) => Map::load(path)?,
        None => Map::parse(DEFAULT_MAP)?,
    };
    let difficulty = Difficulty::parse(&args.difficulty)?;

    let mut world = World::new(map);
    world.spawn_enemy(EnemyKind::Slime, 200, 200);
    world.spawn_enemy(EnemyKind::Bat, 320, 120);

    let connections = Broadcaster::new();
    let hub = Arc::new(Hub::new(
        world,
        Some(difficulty.pipeline()),
        connections.clone(),
    ));
    hub.register_collision_observer(Arc::new(CollisionRelay::new(connections.clone())))
        .await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let address = format!("{}:{}", args.host, args.port);
    let mut server = match Server::bind(&address, Arc::clone(&hub), connections, shutdown_rx.clone())
        .await
    {
        Ok(server) => server,
        Err(e) => {
            error!("startup failed: {}", e);
            return Err(e.into());
        }
    };

    // Spawn accept loop
    let mut accept_handle = tokio::spawn(async move {
        server.run().await;
    });

    // Spawn simulation tick loop
    let tick_handle = {
        let hub = Arc::clone(&hub);
        tokio::spawn(run_tick_loop(hub, args.tick_rate, shutdown_rx))
    };

    // Handle shutdown gracefully
    let mut accept_finished = false;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down gracefully");
        }
        result = &mut accept_handle => {
            if let Err(e) = result {
                error!("accept loop task failed: {}", e);
            }
            accept_finished = true;
        }
    }

    // Signal the loops to stop and join them before returning
    let _ = shutdown_tx.send(true);
    if let Err(e) = tick_handle.await {
        error!("tick loop task failed: {}", e);
    }
    if !accept_finished {
        if let Err(e) = accept_handle.await {
            error!("accept loop task failed: {}", e);
        }
    }

    info!("server stopped");
    Ok(())
}

/// Runs the fixed-rate simulation tick until the shutdown signal fires.
async fn run_tick_loop(hub: Arc<Hub>, tick_rate: u32, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_millis((1000 / tick_rate.max(1)) as u64);
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("simulation tick every {:?}", period);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                hub.tick().await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("tick loop stopping");
                    break;
                }
            }
        }
    }
}
