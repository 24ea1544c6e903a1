use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/users", web::get().to(handlers::list_users))
            .route("/users", web::post().to(handlers::add_user))
            .route("/properties", web::get().to(handlers::list_properties))
            .route("/properties", web::post().to(handlers::create_property))
            .route("/properties/{id}", web::get().to(handlers::get_property))
            .route("/properties/{id}/transfer", web::post().to(handlers::transfer_property))
            .route("/properties/{id}/rent", web::post().to(handlers::rent_property))
            .route("/properties/{id}/history", web::get().to(handlers::get_property_history))
            .route("/chain/blocks", web::get().to(handlers::get_blocks))
            .route("/chain/validate", web::get().to(handlers::validate_chain))
            .route("/chain/difficulty", web::get().to(handlers::get_difficulty))
            .route("/chain/difficulty", web::put().to(handlers::set_difficulty))
    );
}
