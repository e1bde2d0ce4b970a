use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{http::header, middleware::Logger, web, App, HttpServer};
use log::{error, info, warn};
use sqlx::postgres::PgPoolOptions;

use taskmaster_auth::auth::{oauth::OAuthProviders, AuthMiddleware, AuthService};
use taskmaster_auth::config::Config;
use taskmaster_auth::routes::{self, health};
use taskmaster_auth::store::{MemoryUserStore, PgUserStore, UserStore};

async fn build_store(config: &Config) -> std::io::Result<Arc<dyn UserStore>> {
    let database_url = match &config.database_url {
        Some(url) => url,
        None => {
            warn!("DATABASE_URL is not set, accounts are kept in memory and lost on restart");
            return Ok(Arc::new(MemoryUserStore::new()));
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    info!("connected to database, migrations applied");
    Ok(Arc::new(PgUserStore::new(pool)))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info,actix_web=info"));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e));
        }
    };

    let store = build_store(&config).await?;
    let service = web::Data::new(AuthService::from_config(&config, store));
    let providers = web::Data::new(OAuthProviders::from_config(&config));
    let cors_origins = config.cors_origins.clone();

    info!(
        "Starting Task Master auth server at {}",
        config.server_url()
    );
    HttpServer::new(move || {
        let cors = cors_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
            .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(service.clone())
            .app_data(providers.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .service(health::health)
            .service(health::index)
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware)
                    .configure(routes::config),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await
}
