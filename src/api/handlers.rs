use std::sync::{Mutex, MutexGuard};

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use thiserror::Error;
use uuid::Uuid;

use super::schema::{
    AddUserRequest, BlocksQuery, BlocksResponse, CreatePropertyRequest, DifficultyBody,
    PropertyResponse, RentRequest, TransferRequest, ValidationResponse,
};
use crate::blockchain::account::AccountError;
use crate::blockchain::chain::BlockchainError;
use crate::blockchain::property::PropertyError;
use crate::blockchain::{Block, Property, PropertyEvent, Registry, RegistryError, User};

/// Data structure for the registry state
pub type RegistryData = web::Data<Mutex<Registry>>;

/// Number of blocks the explorer shows when none is requested
const DEFAULT_BLOCK_COUNT: usize = 5;

/// Errors returned by the API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Registry lock poisoned")]
    LockPoisoned,

    #[error("Background task failed: {0}")]
    Blocking(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Registry(RegistryError::AccountError(err)) => account_status(err),
            ApiError::Registry(RegistryError::PropertyError(err)) => match err {
                PropertyError::NotFound(_) => StatusCode::NOT_FOUND,
                PropertyError::NotOwner { .. } => StatusCode::FORBIDDEN,
                PropertyError::SelfRent(_) | PropertyError::SelfTransfer(_) => {
                    StatusCode::BAD_REQUEST
                }
                PropertyError::InvalidRecord { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                PropertyError::AccountError(err) => account_status(err),
                PropertyError::BlockchainError(err) => chain_status(err),
            },
            ApiError::Registry(RegistryError::BlockchainError(err)) => chain_status(err),
            ApiError::Registry(RegistryError::StorageError(_))
            | ApiError::LockPoisoned
            | ApiError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string()
        }))
    }
}

fn account_status(err: &AccountError) -> StatusCode {
    match err {
        AccountError::DuplicateUser(_) => StatusCode::CONFLICT,
        AccountError::UnknownUser(_) => StatusCode::NOT_FOUND,
        AccountError::InvalidName => StatusCode::BAD_REQUEST,
    }
}

fn chain_status(err: &BlockchainError) -> StatusCode {
    match err {
        BlockchainError::ChainIntegrityBroken { .. } => StatusCode::CONFLICT,
        BlockchainError::InvalidDifficulty(_) => StatusCode::BAD_REQUEST,
        BlockchainError::MiningExhausted { .. } | BlockchainError::InvalidBlock(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn lock(registry: &Mutex<Registry>) -> Result<MutexGuard<'_, Registry>, ApiError> {
    registry.lock().map_err(|_| ApiError::LockPoisoned)
}

/// Runs a registry call on the blocking pool
///
/// Mining holds the lock for the whole nonce search, so every handler that
/// takes the lock waits for it here instead of on an async worker.
async fn with_registry_blocking<T, F>(registry: RegistryData, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut Registry) -> Result<T, RegistryError> + Send + 'static,
{
    web::block(move || {
        let mut registry = lock(&registry)?;
        f(&mut registry).map_err(ApiError::from)
    })
    .await
    .map_err(|err| ApiError::Blocking(err.to_string()))?
}

/// Get all users
///
/// Returns every registered user in the order they were added
#[utoipa::path(
    get,
    path = "/api/v1/users",
    responses(
        (status = 200, description = "Users retrieved successfully", body = Vec<User>)
    )
)]
pub async fn list_users(registry: RegistryData) -> Result<HttpResponse, ApiError> {
    let users: Vec<User> =
        with_registry_blocking(registry, |registry| Ok(registry.list_users().to_vec())).await?;

    Ok(HttpResponse::Ok().json(users))
}

/// Add a new user
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = AddUserRequest,
    responses(
        (status = 201, description = "User created successfully", body = User),
        (status = 400, description = "Empty user name"),
        (status = 409, description = "User already exists")
    )
)]
pub async fn add_user(
    registry: RegistryData,
    user_req: web::Json<AddUserRequest>,
) -> Result<HttpResponse, ApiError> {
    let AddUserRequest { name, display_name } = user_req.into_inner();

    let user = with_registry_blocking(registry, move |registry| {
        registry.add_user(&name, display_name.as_deref())
    })
    .await?;

    Ok(HttpResponse::Created().json(user))
}

/// Get all properties
///
/// Returns every property, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/properties",
    responses(
        (status = 200, description = "Properties retrieved successfully", body = Vec<Property>)
    )
)]
pub async fn list_properties(registry: RegistryData) -> Result<HttpResponse, ApiError> {
    let properties: Vec<Property> = with_registry_blocking(registry, |registry| {
        Ok(registry.list_properties().into_iter().cloned().collect())
    })
    .await?;

    Ok(HttpResponse::Ok().json(properties))
}

/// Create a new property
///
/// Registers the property and mines a block recording its creation
#[utoipa::path(
    post,
    path = "/api/v1/properties",
    request_body = CreatePropertyRequest,
    responses(
        (status = 201, description = "Property created successfully", body = PropertyResponse),
        (status = 404, description = "Unknown owner"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_property(
    registry: RegistryData,
    property_req: web::Json<CreatePropertyRequest>,
) -> Result<HttpResponse, ApiError> {
    let CreatePropertyRequest { owner, title, description } = property_req.into_inner();

    let (property, block) = with_registry_blocking(registry, move |registry| {
        registry.create_property(&owner, &title, &description)
    })
    .await?;

    Ok(HttpResponse::Created().json(PropertyResponse { property, block }))
}

/// Get a property
#[utoipa::path(
    get,
    path = "/api/v1/properties/{id}",
    params(
        ("id" = String, Path, description = "Property id")
    ),
    responses(
        (status = 200, description = "Property retrieved successfully", body = Property),
        (status = 404, description = "Property not found")
    )
)]
pub async fn get_property(
    registry: RegistryData,
    property_id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let property_id = property_id.into_inner();
    let property: Property = with_registry_blocking(registry, move |registry| {
        registry.get_property(property_id).cloned()
    })
    .await?;

    Ok(HttpResponse::Ok().json(property))
}

/// Transfer ownership of a property
///
/// Only the current owner can transfer; a block is mined for the transfer
#[utoipa::path(
    post,
    path = "/api/v1/properties/{id}/transfer",
    params(
        ("id" = String, Path, description = "Property id")
    ),
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Property transferred successfully", body = PropertyResponse),
        (status = 400, description = "Transfer to the current owner"),
        (status = 403, description = "Acting user does not own the property"),
        (status = 404, description = "Property or user not found")
    )
)]
pub async fn transfer_property(
    registry: RegistryData,
    property_id: web::Path<Uuid>,
    transfer_req: web::Json<TransferRequest>,
) -> Result<HttpResponse, ApiError> {
    let property_id = property_id.into_inner();
    let TransferRequest { from, to } = transfer_req.into_inner();

    let (property, block) = with_registry_blocking(registry, move |registry| {
        registry.transfer(property_id, &from, &to)
    })
    .await?;

    Ok(HttpResponse::Ok().json(PropertyResponse { property, block }))
}

/// Rent a property to another user
///
/// Only the current owner can rent out; a block is mined for the rental
#[utoipa::path(
    post,
    path = "/api/v1/properties/{id}/rent",
    params(
        ("id" = String, Path, description = "Property id")
    ),
    request_body = RentRequest,
    responses(
        (status = 200, description = "Property rented successfully", body = PropertyResponse),
        (status = 400, description = "Owner renting to themselves"),
        (status = 403, description = "Acting user does not own the property"),
        (status = 404, description = "Property or user not found")
    )
)]
pub async fn rent_property(
    registry: RegistryData,
    property_id: web::Path<Uuid>,
    rent_req: web::Json<RentRequest>,
) -> Result<HttpResponse, ApiError> {
    let property_id = property_id.into_inner();
    let RentRequest { owner, renter } = rent_req.into_inner();

    let (property, block) = with_registry_blocking(registry, move |registry| {
        registry.rent(property_id, &owner, &renter)
    })
    .await?;

    Ok(HttpResponse::Ok().json(PropertyResponse { property, block }))
}

/// Get the history of a property
///
/// Returns the recorded events oldest first; unknown ids have an empty history
#[utoipa::path(
    get,
    path = "/api/v1/properties/{id}/history",
    params(
        ("id" = String, Path, description = "Property id")
    ),
    responses(
        (status = 200, description = "History retrieved successfully", body = Vec<PropertyEvent>)
    )
)]
pub async fn get_property_history(
    registry: RegistryData,
    property_id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let property_id = property_id.into_inner();
    let history: Vec<PropertyEvent> = with_registry_blocking(registry, move |registry| {
        Ok(registry.get_history(property_id).to_vec())
    })
    .await?;

    Ok(HttpResponse::Ok().json(history))
}

/// Get the last blocks of the chain
///
/// Returns the most recent `n` blocks, newest first
#[utoipa::path(
    get,
    path = "/api/v1/chain/blocks",
    params(
        ("n" = Option<usize>, Query, description = "Number of blocks, default 5")
    ),
    responses(
        (status = 200, description = "Blocks retrieved successfully", body = BlocksResponse)
    )
)]
pub async fn get_blocks(
    registry: RegistryData,
    query: web::Query<BlocksQuery>,
) -> Result<HttpResponse, ApiError> {
    let count = query.n.unwrap_or(DEFAULT_BLOCK_COUNT);

    let response = with_registry_blocking(registry, move |registry| {
        let blocks: Vec<Block> = registry.get_last_n_blocks(count).iter().rev().cloned().collect();

        Ok(BlocksResponse {
            length: registry.chain().len(),
            difficulty: registry.difficulty(),
            blocks,
        })
    })
    .await?;

    Ok(HttpResponse::Ok().json(response))
}

/// Check if the chain is valid
///
/// Validates every block and reports the first broken one
#[utoipa::path(
    get,
    path = "/api/v1/chain/validate",
    responses(
        (status = 200, description = "Chain validation status", body = ValidationResponse)
    )
)]
pub async fn validate_chain(registry: RegistryData) -> Result<HttpResponse, ApiError> {
    let validation =
        with_registry_blocking(registry, |registry| Ok(registry.validate_chain())).await?;

    let response = match validation {
        Ok(()) => ValidationResponse {
            is_valid: true,
            broken_index: None,
            reason: None,
        },
        Err(RegistryError::BlockchainError(BlockchainError::ChainIntegrityBroken {
            index,
            reason,
        })) => ValidationResponse {
            is_valid: false,
            broken_index: Some(index),
            reason: Some(reason),
        },
        Err(err) => return Err(err.into()),
    };

    Ok(HttpResponse::Ok().json(response))
}

/// Get the mining difficulty
#[utoipa::path(
    get,
    path = "/api/v1/chain/difficulty",
    responses(
        (status = 200, description = "Current difficulty", body = DifficultyBody)
    )
)]
pub async fn get_difficulty(registry: RegistryData) -> Result<HttpResponse, ApiError> {
    let difficulty = with_registry_blocking(registry, |registry| Ok(registry.difficulty())).await?;

    Ok(HttpResponse::Ok().json(DifficultyBody { difficulty }))
}

/// Set the mining difficulty
///
/// Affects blocks mined from now on
#[utoipa::path(
    put,
    path = "/api/v1/chain/difficulty",
    request_body = DifficultyBody,
    responses(
        (status = 200, description = "Difficulty updated", body = DifficultyBody),
        (status = 400, description = "Difficulty out of range")
    )
)]
pub async fn set_difficulty(
    registry: RegistryData,
    difficulty_req: web::Json<DifficultyBody>,
) -> Result<HttpResponse, ApiError> {
    let requested = difficulty_req.difficulty;

    let difficulty = with_registry_blocking(registry, move |registry| {
        registry.set_difficulty(requested)?;
        Ok(registry.difficulty())
    })
    .await?;

    Ok(HttpResponse::Ok().json(DifficultyBody { difficulty }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use crate::blockchain::RegistryOptions;
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn test_data() -> RegistryData {
        let options = RegistryOptions {
            difficulty: 1,
            ..RegistryOptions::default()
        };
        web::Data::new(Mutex::new(Registry::new(&options).unwrap()))
    }

    #[actix_web::test]
    async fn test_list_and_add_users() {
        let app =
            test::init_service(App::new().app_data(test_data()).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/users")
            .set_json(json!({ "name": "dana", "display_name": "Dana Demo" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri("/api/v1/users")
            .set_json(json!({ "name": "dana" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get().uri("/api/v1/users").to_request();
        let users: Value = test::call_and_read_body_json(&app, req).await;
        let names: Vec<&str> = users
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["alice", "bob", "carlos", "dana"]);
    }

    #[actix_web::test]
    async fn test_property_flow() {
        let app =
            test::init_service(App::new().app_data(test_data()).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/properties")
            .set_json(json!({
                "owner": "alice",
                "title": "Cozy Apartment",
                "description": "2BHK with balcony"
            }))
            .to_request();
        let created: Value = test::call_and_read_body_json(&app, req).await;
        let id = created["property"]["id"].as_str().unwrap().to_string();
        assert_eq!(created["block"]["index"], 1);

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/properties/{}/transfer", id))
            .set_json(json!({ "from": "bob", "to": "carlos" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/properties/{}/transfer", id))
            .set_json(json!({ "from": "alice", "to": "bob" }))
            .to_request();
        let transferred: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(transferred["property"]["owner"], "bob");
        assert_eq!(transferred["block"]["transactions"][0]["type"], "transfer");

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/properties/{}/rent", id))
            .set_json(json!({ "owner": "bob", "renter": "bob" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/properties/{}/rent", id))
            .set_json(json!({ "owner": "bob", "renter": "carlos" }))
            .to_request();
        let rented: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(rented["property"]["renter"], "carlos");

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/properties/{}/history", id))
            .to_request();
        let history: Value = test::call_and_read_body_json(&app, req).await;
        let kinds: Vec<&str> = history
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["type"].as_str().unwrap())
            .collect();
        assert_eq!(kinds, vec!["create", "transfer", "rent"]);
    }

    #[actix_web::test]
    async fn test_unknown_property() {
        let app =
            test::init_service(App::new().app_data(test_data()).configure(configure_routes)).await;
        let id = Uuid::new_v4();

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/properties/{}", id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/properties/{}/history", id))
            .to_request();
        let history: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(history, json!([]));
    }

    #[actix_web::test]
    async fn test_chain_explorer() {
        let data = test_data();
        {
            let mut registry = data.lock().unwrap();
            for owner in ["alice", "bob", "carlos"] {
                registry.create_property(owner, "T", "D").unwrap();
            }
        }
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure_routes)).await;

        let req = test::TestRequest::get().uri("/api/v1/chain/blocks?n=2").to_request();
        let blocks: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(blocks["length"], 4);
        assert_eq!(blocks["blocks"][0]["index"], 3);
        assert_eq!(blocks["blocks"][1]["index"], 2);

        let req = test::TestRequest::get().uri("/api/v1/chain/validate").to_request();
        let validation: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(validation["is_valid"], true);

        let req = test::TestRequest::put()
            .uri("/api/v1/chain/difficulty")
            .set_json(json!({ "difficulty": 2 }))
            .to_request();
        let difficulty: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(difficulty["difficulty"], 2);

        let req = test::TestRequest::put()
            .uri("/api/v1/chain/difficulty")
            .set_json(json!({ "difficulty": 65 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/api/v1/chain/difficulty").to_request();
        let difficulty: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(difficulty["difficulty"], 2);
    }

    #[actix_web::test]
    async fn test_reads_wait_for_the_lock_off_the_async_worker() {
        let data = test_data();
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure_routes)).await;

        // Hold the registry lock from another thread, as a long mining call would
        let (locked_tx, locked_rx) = mpsc::channel();
        let holder = {
            let data = data.clone();
            thread::spawn(move || {
                let _guard = data.lock().unwrap();
                locked_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(500));
            })
        };
        locked_rx.recv().unwrap();

        let started = Instant::now();
        let timer = actix_web::rt::spawn(async move {
            actix_web::rt::time::sleep(Duration::from_millis(20)).await;
            started.elapsed()
        });

        let req = test::TestRequest::get().uri("/api/v1/users").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let timer_fired_after = timer.await.unwrap();
        assert!(
            timer_fired_after < Duration::from_millis(400),
            "worker stalled for {:?}",
            timer_fired_after
        );

        holder.join().unwrap();
    }
}
