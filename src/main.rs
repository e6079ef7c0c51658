use anyhow::{Context, Result};
use fleetcast::api::{create_router, GatewayState};
use fleetcast::auth::StaticCredentialValidator;
use fleetcast::broadcast::Broadcaster;
use fleetcast::config::{load_config, FleetConfig};
use fleetcast::replication::{
    Backbone, NatsBackbone, PresenceTracker, ReplicationPublisher, Subjects,
};
use fleetcast::simulation::{run_simulation, Simulator};
use fleetcast::subscription::InterestIndex;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetcast=info".into()),
        )
        .init();

    info!("Fleetcast starting...");

    // Load configuration
    let mut config = match std::env::var("FLEETCAST_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading configuration");
            load_config(&path)?
        }
        Err(_) => {
            info!("FLEETCAST_CONFIG not set, using defaults");
            FleetConfig::default()
        }
    };
    config.apply_env();
    config.validate().context("Invalid configuration")?;

    let instance_id = config.server.instance_id.clone();
    info!(
        instance_id = %instance_id,
        auth_enabled = config.auth.enabled,
        simulation = config.simulation.enabled,
        "Configuration loaded"
    );

    // Interest index and broadcaster
    let index = Arc::new(InterestIndex::new());
    let presence = Arc::new(PresenceTracker::new(config.presence.expiry()));
    let mut broadcaster = Broadcaster::new(
        instance_id.clone(),
        index,
        config.gateway.outbound_buffer,
    )
    .with_presence(presence);

    // Replication backbone (optional; failure degrades to local-only delivery)
    let mut replication_stream = None;
    let mut replicating = false;
    if config.nats.enabled {
        match NatsBackbone::connect(&config.nats).await {
            Ok(nats) => {
                let backbone: Arc<dyn Backbone> = Arc::new(nats);
                let subjects = Subjects::new(config.nats.subject_prefix.clone());
                match backbone.subscribe(subjects.all()).await {
                    Ok(stream) => replication_stream = Some(stream),
                    Err(e) => warn!(
                        error = %e,
                        "Backbone subscribe failed, not receiving replicated updates"
                    ),
                }
                let (publisher, _) = ReplicationPublisher::spawn(
                    backbone,
                    subjects,
                    config.nats.publish_queue,
                );
                broadcaster = broadcaster.with_replication(publisher);
                replicating = true;
            }
            Err(e) => {
                warn!(error = %e, "NATS unavailable, running single-instance");
            }
        }
    } else {
        info!("Replication disabled");
    }

    let broadcaster = Arc::new(broadcaster);

    if let Some(stream) = replication_stream {
        tokio::spawn(Arc::clone(&broadcaster).run_replication_listener(stream));
    }
    // Peers still need our presence even when we cannot hear theirs
    if replicating {
        let heartbeat = config.presence.heartbeat();
        tokio::spawn(Arc::clone(&broadcaster).run_presence_heartbeat(heartbeat));
    }

    // Simulation
    let snapshots = if config.simulation.enabled {
        let simulator = Simulator::from_config(&config.simulation)?;
        let snapshots = simulator.subscribe_snapshots();
        tokio::spawn(run_simulation(
            simulator,
            Arc::clone(&broadcaster),
            config.simulation.tick_interval(),
            config.simulation.bulk_sync_every_ticks,
        ));
        Some(snapshots)
    } else {
        info!("Simulation disabled, relaying replicated updates only");
        None
    };

    // HTTP / WebSocket server
    let validator = Arc::new(StaticCredentialValidator::from_entries(
        &config.auth.credentials,
    ));
    info!(credentials = validator.len(), "Credential table loaded");

    let state = Arc::new(GatewayState {
        broadcaster: Arc::clone(&broadcaster),
        validator,
        auth_enabled: config.auth.enabled,
        snapshots,
    });
    let app = create_router(state, &config.server.cors_origin);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "Observer gateway listening on /ws/assets");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Fleetcast stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
