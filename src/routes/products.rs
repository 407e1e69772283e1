use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::products::{CreateProductRequest, ProductList, UpdateProductRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Product,
    response::{ApiResponse, Created},
    routes::{AppJson, params::ProductQuery},
    services::product_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route(
            "/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
}

#[utoipa::path(
    get,
    path = "/api/perfumes",
    params(ProductQuery),
    responses(
        (status = 200, description = "List perfumes", body = ApiResponse<ProductList>)
    ),
    tag = "Perfumes"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = product_service::list_products(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/perfumes/{id}",
    params(("id" = Uuid, Path, description = "Perfume ID")),
    responses(
        (status = 200, description = "Get perfume", body = ApiResponse<Product>),
        (status = 404, description = "Perfume not found"),
    ),
    tag = "Perfumes"
)]
pub async fn get_product(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let resp = product_service::get_product(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/perfumes",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Create perfume", body = ApiResponse<Product>),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Perfumes"
)]
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CreateProductRequest>,
) -> AppResult<Created<Product>> {
    product_service::create_product(&state, &user, payload).await
}

#[utoipa::path(
    put,
    path = "/api/perfumes/{id}",
    params(("id" = Uuid, Path, description = "Perfume ID")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Update perfume", body = ApiResponse<Product>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Perfume not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Perfumes"
)]
pub async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<UpdateProductRequest>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let resp = product_service::update_product(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/perfumes/{id}",
    params(("id" = Uuid, Path, description = "Perfume ID")),
    responses(
        (status = 204, description = "Perfume deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Perfume not found"),
        (status = 409, description = "Perfume is referenced by orders"),
    ),
    security(("bearer_auth" = [])),
    tag = "Perfumes"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    product_service::delete_product(&state, &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
