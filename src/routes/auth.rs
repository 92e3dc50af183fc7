use axum::{extract::State, Json};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{password, Action, RequestContext, Resource},
    error::{AppError, AppResult},
    models::User,
    schema::{roles, users},
    state::AppState,
};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let mut conn = state.db()?;

    let found = users::table
        .inner_join(roles::table)
        .filter(users::username.eq(payload.username.trim()))
        .select((users::all_columns, roles::name))
        .first::<(User, String)>(&mut conn)
        .optional()?;

    let Some((user, role_name)) = found else {
        warn!(username = %payload.username, "login rejected: unknown user");
        return Err(AppError::unauthorized());
    };

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        warn!(user_id = %user.id, "login rejected: wrong password");
        return Err(AppError::unauthorized());
    }

    let access_token = state
        .jwt
        .generate_token(user.id, &user.username, &role_name)?;

    info!(user_id = %user.id, role = %role_name, "user logged in");
    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt.expires_in_seconds(),
    }))
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub username: String,
    pub role: String,
    pub permissions: Vec<PermissionInfo>,
    pub permitted_contracts: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct PermissionInfo {
    pub resource: Resource,
    pub action: Action,
}

const KNOWN_RESOURCES: [Resource; 2] = [Resource::ContractHeader, Resource::ContractSubset];
const KNOWN_ACTIONS: [Action; 5] = [
    Action::Index,
    Action::Create,
    Action::Edit,
    Action::Delete,
    Action::Activation,
];

pub async fn me(context: RequestContext) -> Json<MeResponse> {
    let permissions = KNOWN_RESOURCES
        .iter()
        .flat_map(|resource| KNOWN_ACTIONS.iter().map(move |action| (*resource, *action)))
        .filter(|(resource, action)| context.can(*action, *resource))
        .map(|(resource, action)| PermissionInfo { resource, action })
        .collect();

    Json(MeResponse {
        user_id: context.user_id,
        username: context.username,
        role: context.role_name,
        permissions,
        permitted_contracts: context.permitted_contracts,
    })
}
