use axum::extract::{Json, Path, State};
use chrono::Utc;
use diesel::{dsl::exists, prelude::*, PgConnection};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    auth::{Action, RequestContext, Resource},
    error::{AppError, AppResult},
    file_store::Disk,
    models::{ContractHeader, NewContractHeader},
    schema::{contract_headers, contract_subsets, users},
    state::AppState,
};

use super::lifecycle::{FormFields, ManagedResource};
use super::to_iso;

pub struct ContractHeaders;

#[derive(Debug, Clone)]
pub struct ContractHeaderInput {
    pub name: String,
    pub workplace: String,
}

#[derive(Serialize)]
pub struct ContractHeaderInfo {
    pub id: Uuid,
    pub name: String,
    pub workplace: String,
    pub files: bool,
    pub inactive: bool,
    pub user_id: Uuid,
    pub owner: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct ContractHeaderListResponse {
    pub contract_headers: Vec<ContractHeaderInfo>,
}

#[derive(Serialize)]
pub struct ContractHeaderResponse {
    pub contract_header: ContractHeaderInfo,
}

impl ManagedResource for ContractHeaders {
    const RESOURCE: Resource = Resource::ContractHeader;
    const DISK: Disk = Disk::ContractDocs;
    const LABEL: &'static str = "contract_header";

    type Input = ContractHeaderInput;

    fn parse(fields: &FormFields) -> AppResult<Self::Input> {
        Ok(ContractHeaderInput {
            name: fields.required("name")?,
            workplace: fields.required("workplace")?,
        })
    }

    fn check(_conn: &mut PgConnection, _input: &Self::Input, _current: Option<Uuid>) -> AppResult<()> {
        Ok(())
    }

    fn insert(
        conn: &mut PgConnection,
        id: Uuid,
        input: &Self::Input,
        owner: Uuid,
        files: bool,
    ) -> AppResult<()> {
        let new_header = NewContractHeader {
            id,
            name: input.name.clone(),
            workplace: input.workplace.clone(),
            user_id: owner,
            files,
        };
        diesel::insert_into(contract_headers::table)
            .values(&new_header)
            .execute(conn)?;
        Ok(())
    }

    fn update(
        conn: &mut PgConnection,
        id: Uuid,
        input: &Self::Input,
        owner: Uuid,
        new_files: bool,
    ) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        diesel::update(
            contract_headers::table
                .filter(contract_headers::id.eq(id))
                .filter(contract_headers::deleted_at.is_null()),
        )
        .set((
            contract_headers::name.eq(&input.name),
            contract_headers::workplace.eq(&input.workplace),
            contract_headers::user_id.eq(owner),
            contract_headers::updated_at.eq(now),
        ))
        .execute(conn)?;

        if new_files {
            diesel::update(contract_headers::table.find(id))
                .set(contract_headers::files.eq(true))
                .execute(conn)?;
        }
        Ok(())
    }

    fn ensure_exists(conn: &mut PgConnection, id: Uuid) -> AppResult<()> {
        let found: bool = diesel::select(exists(
            contract_headers::table
                .filter(contract_headers::id.eq(id))
                .filter(contract_headers::deleted_at.is_null()),
        ))
        .get_result(conn)?;
        if found {
            Ok(())
        } else {
            Err(AppError::not_found())
        }
    }

    fn has_dependents(conn: &mut PgConnection, id: Uuid) -> AppResult<bool> {
        Ok(diesel::select(exists(
            contract_subsets::table
                .filter(contract_subsets::contract_header_id.eq(id))
                .filter(contract_subsets::deleted_at.is_null()),
        ))
        .get_result(conn)?)
    }

    fn soft_delete(conn: &mut PgConnection, id: Uuid) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        diesel::update(contract_headers::table.find(id))
            .set((
                contract_headers::deleted_at.eq(Some(now)),
                contract_headers::updated_at.eq(now),
            ))
            .execute(conn)?;
        Ok(())
    }

    fn toggle_status(conn: &mut PgConnection, id: Uuid) -> AppResult<bool> {
        let inactive: bool = contract_headers::table
            .filter(contract_headers::id.eq(id))
            .filter(contract_headers::deleted_at.is_null())
            .select(contract_headers::inactive)
            .first(conn)?;

        diesel::update(contract_headers::table.find(id))
            .set((
                contract_headers::inactive.eq(!inactive),
                contract_headers::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        Ok(!inactive)
    }
}

pub(crate) fn load_headers_with_owner(
    conn: &mut PgConnection,
    only: Option<Uuid>,
) -> AppResult<Vec<(ContractHeader, String)>> {
    let mut query = contract_headers::table
        .inner_join(users::table)
        .filter(contract_headers::deleted_at.is_null())
        .select((contract_headers::all_columns, users::username))
        .order((contract_headers::created_at.asc(), contract_headers::id.asc()))
        .into_boxed();

    if let Some(id) = only {
        query = query.filter(contract_headers::id.eq(id));
    }

    Ok(query.load::<(ContractHeader, String)>(conn)?)
}

fn to_info(header: ContractHeader, owner: String) -> ContractHeaderInfo {
    ContractHeaderInfo {
        id: header.id,
        name: header.name,
        workplace: header.workplace,
        files: header.files,
        inactive: header.inactive,
        user_id: header.user_id,
        owner,
        created_at: to_iso(header.created_at),
        updated_at: to_iso(header.updated_at),
    }
}

pub async fn list_contract_headers(
    State(state): State<AppState>,
    context: RequestContext,
) -> AppResult<Json<ContractHeaderListResponse>> {
    context.authorize(Action::Index, Resource::ContractHeader)?;

    let mut conn = state.db()?;
    let contract_headers = load_headers_with_owner(&mut conn, None)?
        .into_iter()
        .map(|(header, owner)| to_info(header, owner))
        .collect();

    Ok(Json(ContractHeaderListResponse { contract_headers }))
}

pub async fn edit_contract_header(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ContractHeaderResponse>> {
    context.authorize(Action::Edit, Resource::ContractHeader)?;

    let mut conn = state.db()?;
    let (header, owner) = load_headers_with_owner(&mut conn, Some(id))?
        .into_iter()
        .next()
        .ok_or_else(AppError::not_found)?;

    Ok(Json(ContractHeaderResponse {
        contract_header: to_info(header, owner),
    }))
}
