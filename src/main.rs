use recipe_auth::auth::AuthService;
use recipe_auth::clock::{Clock, SystemClock};
use recipe_auth::configuration::{get_configuration, RedisSettings};
use recipe_auth::startup::run;
use recipe_auth::store::{
    spawn_sweeper, InMemoryRevocationStore, PgRefreshTokenStore, PgUserRepository,
    RedisRevocationStore, RevocationStore,
};
use recipe_auth::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    let connection_string = configuration.database.connection_string();
    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(configuration.database.max_connections)
        .connect(&connection_string)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    tracing::info!("Database connection pool created successfully");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let revocations: Arc<dyn RevocationStore> = match &configuration.redis {
        Some(redis) => Arc::new(connect_redis(redis, clock.clone()).await?),
        None => {
            tracing::warn!("No redis configured, revocations are kept in process memory");
            Arc::new(InMemoryRevocationStore::new(clock.clone()))
        }
    };
    let refresh_tokens = Arc::new(PgRefreshTokenStore::new(pool.clone()));
    let users = Arc::new(PgUserRepository::new(pool));

    let _sweeper = spawn_sweeper(
        refresh_tokens.clone(),
        revocations.clone(),
        clock.clone(),
        configuration.auth.sweep_interval(),
    );

    let auth = AuthService::new(&configuration.auth, users, refresh_tokens, revocations, clock)
        .map_err(|e| {
            tracing::error!("Failed to build auth service: {}", e);
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "Auth configuration error")
        })?;

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(listener, Arc::new(auth))?;
    tracing::info!("Server started successfully");

    server.await
}

async fn connect_redis(
    settings: &RedisSettings,
    clock: Arc<dyn Clock>,
) -> std::io::Result<RedisRevocationStore> {
    let to_io = |e: redis::RedisError| {
        tracing::error!("Failed to connect to redis: {}", e);
        std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Redis connection error")
    };

    let client = redis::Client::open(settings.url.as_str()).map_err(to_io)?;
    let manager = redis::aio::ConnectionManager::new(client)
        .await
        .map_err(to_io)?;

    tracing::info!("Redis connection established");
    Ok(RedisRevocationStore::new(manager, clock, settings.key_prefix.clone()))
}
