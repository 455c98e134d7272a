mod command;
mod config;
mod connection;
mod hardware;
mod playback;
#[cfg(test)]
mod testing;
mod transport;
mod update;

use command::{BuzzerHandler, CommandHandler, Dispatcher, HandlerRegistry, LedHandler};
use config::Config;
use connection::ConnectivitySupervisor;
use hardware::{SimulatedPin, SimulatedTone};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use transport::{HostLink, MqttSession};
use update::{NoopUpdater, UpdateProvider};

use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Budget for broker replies (CONNACK, SUBACK)
const BROKER_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let path = config::resolve_path(
        std::env::args().nth(1),
        std::env::var(config::CONFIG_ENV).ok(),
    );
    let config = config::load_with_retry(&path).await;

    info!("Actuator agent starting: {}", config.device_id);
    info!("  Link: {}", config.link.name);
    info!("  Broker: {}:{}", config.broker.host, config.broker.port);

    let registry = Arc::new(register_handlers(&config));
    registry.for_each(|topic, _| info!("  Handler: {}", topic));
    let ready = registry.initialize_all().await;
    info!("{} of {} handlers ready", ready, registry.len());

    let link = HostLink::new(
        config.link.name.clone(),
        config.broker.host.clone(),
        config.broker.port,
    );
    let session = MqttSession::new(config.broker.host.clone(), config.broker.port)
        .with_reply_timeout(BROKER_REPLY_TIMEOUT);
    let mut supervisor = ConnectivitySupervisor::new(
        config.supervisor_config(),
        link,
        session,
        Dispatcher::new(registry.clone()),
    );
    let mut updater = NoopUpdater::default();

    let mut ticker = interval(config.loop_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    // Main loop
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                // failures are logged where they happen; the loop never gives up
                if let Err(e) = supervisor.tick().await {
                    debug!("Connectivity: {}", e);
                }
                updater.poll().await;
            }
        }
    }

    registry.shutdown_all().await;
    supervisor.shutdown().await;
    info!("Actuator agent stopped after {} loop iterations", updater.polls());
}

/// Register every handler the device carries, in subscription order
fn register_handlers(config: &Config) -> HandlerRegistry {
    let handlers: Vec<Box<dyn CommandHandler>> = vec![
        Box::new(LedHandler::new(
            config.led_topic(),
            Box::new(SimulatedPin::new(config.handlers.led.pin_or_invalid())),
        )),
        Box::new(BuzzerHandler::with_config(
            config.buzzer_topic(),
            Box::new(SimulatedTone::new(config.handlers.buzzer.pin_or_invalid())),
            config.sequencer_config(),
        )),
    ];

    let mut registry = HandlerRegistry::new();
    for handler in handlers {
        // rejected registrations are logged by the registry
        let _ = registry.register(handler);
    }
    registry
}
