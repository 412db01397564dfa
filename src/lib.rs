pub mod catalog;
pub mod config;
pub mod events;
pub mod identity;
pub mod message_store;
pub mod metrics;
pub mod models;
pub mod moderation;
pub mod pipeline;
pub mod profiler;
pub mod rate_limit;
pub mod registry;
pub mod reputation;
pub mod routes;
pub mod shadowban;
pub mod stats;
pub mod store;

use std::sync::Arc;

use rocket::fairing::AdHoc;
use rocket_cors::{AllowedOrigins, CorsOptions};

use config::AppConfig;
use events::BroadcastBus;
use message_store::MessageStore;
use metrics::Metrics;
use pipeline::SecurityGate;
use rate_limit::RateLimitConfig;
use registry::ConnectionRegistry;
use stats::StatsRecorder;
use store::{RedisStore, SharedStore};

/// Production entry: configuration and rate limits from the environment,
/// state in Redis.
pub async fn rocket() -> rocket::Rocket<rocket::Build> {
    let config = AppConfig::from_env();
    let store: SharedStore = Arc::new(
        RedisStore::connect(&config.redis_url)
            .await
            .expect("failed to connect to the coordination store"),
    );
    build_rocket(config, RateLimitConfig::from_env(), store)
}

/// Wire the app against an explicit store and limits. The test suite uses
/// this with `MemoryStore`; it also serves single-instance dev runs.
pub fn rocket_with_store(
    config: AppConfig,
    rate_config: RateLimitConfig,
    store: SharedStore,
) -> rocket::Rocket<rocket::Build> {
    build_rocket(config, rate_config, store)
}

fn build_rocket(
    config: AppConfig,
    rate_config: RateLimitConfig,
    store: SharedStore,
) -> rocket::Rocket<rocket::Build> {
    let metrics = Arc::new(Metrics::new());
    let registry = ConnectionRegistry::new();
    let gate = SecurityGate::new(store.clone(), &config, rate_config, metrics.clone());
    let messages = MessageStore::new(store.clone());
    let stats = StatsRecorder::new(store.clone());
    let bus = BroadcastBus::new(store.clone(), metrics.clone());

    let cors = match &config.allowed_origin {
        Some(origin) => CorsOptions {
            allowed_origins: AllowedOrigins::some_exact(&[origin.as_str()]),
            ..CorsOptions::default()
        },
        None => CorsOptions::default(),
    }
    .to_cors()
    .expect("Failed to create CORS");

    let figment = rocket::Config::figment()
        .merge(("address", config.bind_host.clone()))
        .merge(("port", config.bind_port))
        // Drain deadline for in-flight handlers on SIGTERM/SIGINT.
        .merge(("shutdown.grace", 10u32));

    let subscriber_store = store.clone();
    let subscriber_registry = registry.clone();
    let subscriber_metrics = metrics.clone();

    rocket::custom(figment)
        .manage(config)
        .manage(store)
        .manage(metrics)
        .manage(registry)
        .manage(gate)
        .manage(messages)
        .manage(stats)
        .manage(bus)
        .attach(cors)
        .register(
            "/",
            rocket::catchers![
                routes::bad_request,
                routes::unprocessable,
                routes::not_found,
                routes::too_many_requests,
                routes::internal_error,
            ],
        )
        .mount(
            "/",
            rocket::routes![
                routes::post_message,
                routes::get_messages,
                routes::reveal_contact,
                routes::report_message,
                routes::cooldown,
                routes::stats_daily,
                routes::stats_cities,
                routes::health,
                routes::metrics_endpoint,
                routes::ws_feed,
            ],
        )
        .attach(AdHoc::on_liftoff("Broadcast Subscriber", move |_rocket| {
            Box::pin(async move {
                events::spawn_subscriber(
                    subscriber_store,
                    subscriber_registry,
                    subscriber_metrics,
                );
                println!("📡 Broadcast subscriber started");
            })
        }))
}
