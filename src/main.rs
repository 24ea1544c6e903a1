use std::sync::Mutex;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod blockchain;
mod config;

use config::Config;

// Load the registry from the data directory, or fall back to an in-memory one
fn initialize_registry(config: &Config) -> anyhow::Result<blockchain::Registry> {
    let options = config.registry_options();

    match blockchain::Registry::with_storage(&config.data_dir, &options) {
        Ok(registry) => {
            info!("Loaded registry from storage at {}", config.data_dir.display());
            Ok(registry)
        }
        Err(err) => {
            warn!("Failed to load registry from storage: {}", err);
            warn!("Creating in-memory registry instead");

            blockchain::Registry::new(&options).context("invalid mining configuration")
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::list_users,
        api::handlers::add_user,
        api::handlers::list_properties,
        api::handlers::create_property,
        api::handlers::get_property,
        api::handlers::transfer_property,
        api::handlers::rent_property,
        api::handlers::get_property_history,
        api::handlers::get_blocks,
        api::handlers::validate_chain,
        api::handlers::get_difficulty,
        api::handlers::set_difficulty
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::TransactionKind,
            blockchain::User,
            blockchain::Property,
            blockchain::PropertyEvent,
            api::schema::AddUserRequest,
            api::schema::CreatePropertyRequest,
            api::schema::TransferRequest,
            api::schema::RentRequest,
            api::schema::PropertyResponse,
            api::schema::BlocksResponse,
            api::schema::ValidationResponse,
            api::schema::DifficultyBody
        )
    ),
    tags(
        (name = "property-chain", description = "Property registry API endpoints")
    ),
    info(
        title = "PropertyChain API",
        version = "0.1.0",
        description = "Create, transfer and rent properties on a proof-of-work ledger",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env();
    let registry = web::Data::new(Mutex::new(initialize_registry(&config)?));

    info!(
        "Starting HTTP server at http://{}:{} (difficulty {})",
        config.host, config.port, config.difficulty
    );

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Configure OpenAPI documentation
        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(registry.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?
    .run()
    .await?;

    Ok(())
}
