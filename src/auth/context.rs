use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use diesel::prelude::*;
use tracing::debug;
use uuid::Uuid;

use super::gate::{can_perform, Action, Capabilities, Resource};
use super::AuthenticatedUser;
use crate::{
    error::{AppError, AppResult},
    schema::{contract_subsets, role_contract_subsets, role_permissions, roles, users},
    state::AppState,
};

/// Everything a handler needs to know about the caller, loaded once per
/// request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: Uuid,
    pub username: String,
    pub role_id: Uuid,
    pub role_name: String,
    pub capabilities: Capabilities,
    /// Live contract subsets the caller's role may see.
    pub permitted_contracts: Vec<Uuid>,
}

impl RequestContext {
    pub fn can(&self, action: Action, resource: Resource) -> bool {
        can_perform(&self.capabilities, action, resource)
    }

    pub fn authorize(&self, action: Action, resource: Resource) -> AppResult<()> {
        if self.can(action, resource) {
            Ok(())
        } else {
            debug!(
                user_id = %self.user_id,
                role = %self.role_name,
                action = %action,
                resource = %resource,
                "authorization denied"
            );
            Err(AppError::forbidden())
        }
    }

    pub fn load(conn: &mut PgConnection, user: &AuthenticatedUser) -> AppResult<Self> {
        let (role_id, role_name): (Uuid, String) = users::table
            .inner_join(roles::table)
            .filter(users::id.eq(user.user_id))
            .select((roles::id, roles::name))
            .first::<(Uuid, String)>(conn)
            .optional()?
            .ok_or_else(AppError::unauthorized)?;

        let grants: Vec<(String, String)> = role_permissions::table
            .filter(role_permissions::role_id.eq(role_id))
            .select((role_permissions::resource, role_permissions::action))
            .load(conn)?;

        let permitted_contracts: Vec<Uuid> = role_contract_subsets::table
            .inner_join(contract_subsets::table)
            .filter(role_contract_subsets::role_id.eq(role_id))
            .filter(contract_subsets::deleted_at.is_null())
            .select(contract_subsets::id)
            .order(contract_subsets::id.asc())
            .load(conn)?;

        Ok(Self {
            user_id: user.user_id,
            username: user.username.clone(),
            role_id,
            role_name,
            capabilities: Capabilities::from_rows(grants),
            permitted_contracts,
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(context) = parts.extensions.get::<RequestContext>() {
            return Ok(context.clone());
        }

        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        let mut conn = state.db()?;
        let context = RequestContext::load(&mut conn, &user)?;
        parts.extensions.insert(context.clone());
        Ok(context)
    }
}
