use std::collections::HashMap;

use axum::extract::{Json, Path, State};
use chrono::Utc;
use diesel::{dsl::exists, prelude::*, PgConnection};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    auth::{Action, RequestContext, Resource},
    error::{AppError, AppResult},
    file_store::Disk,
    models::{ContractSubset, Employee, NewContractSubset},
    schema::{contract_headers, contract_subsets, employees, users},
    state::AppState,
};

use super::lifecycle::{FormFields, ManagedResource};
use super::to_iso;

pub struct ContractSubsets;

#[derive(Debug, Clone)]
pub struct ContractSubsetInput {
    pub contract_header_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub workplace: String,
}

#[derive(Serialize, Clone)]
pub struct SubsetRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Serialize, Clone)]
pub struct HeaderRef {
    pub id: Uuid,
    pub name: String,
    pub workplace: String,
}

#[derive(Serialize)]
pub struct ContractSubsetInfo {
    pub id: Uuid,
    pub contract_header_id: Uuid,
    pub contract_header: Option<HeaderRef>,
    pub parent_id: Option<Uuid>,
    pub parent: Option<SubsetRef>,
    pub name: String,
    pub workplace: String,
    pub files: bool,
    pub inactive: bool,
    pub user_id: Uuid,
    pub owner: String,
    pub children: Vec<SubsetRef>,
    pub employee_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct EmployeeInfo {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Serialize)]
pub struct ContractSubsetListResponse {
    pub contract_subsets: Vec<ContractSubsetInfo>,
    pub contract_headers: Vec<HeaderRef>,
}

#[derive(Serialize)]
pub struct ContractSubsetResponse {
    pub contract_subset: ContractSubsetInfo,
    pub employees: Vec<EmployeeInfo>,
    /// Candidate parents for the edit form.
    pub contract_subsets: Vec<SubsetRef>,
    pub contract_headers: Vec<HeaderRef>,
}

impl ManagedResource for ContractSubsets {
    const RESOURCE: Resource = Resource::ContractSubset;
    const DISK: Disk = Disk::ContractSubsetDocs;
    const LABEL: &'static str = "contract_subset";

    type Input = ContractSubsetInput;

    fn parse(fields: &FormFields) -> AppResult<Self::Input> {
        Ok(ContractSubsetInput {
            contract_header_id: fields.required_uuid("contract_header_id")?,
            parent_id: fields.optional_uuid("parent_id")?,
            name: fields.required("name")?,
            workplace: fields.required("workplace")?,
        })
    }

    fn check(conn: &mut PgConnection, input: &Self::Input, current: Option<Uuid>) -> AppResult<()> {
        let header_exists: bool = diesel::select(exists(
            contract_headers::table
                .filter(contract_headers::id.eq(input.contract_header_id))
                .filter(contract_headers::deleted_at.is_null()),
        ))
        .get_result(conn)?;
        if !header_exists {
            return Err(AppError::bad_request(
                "the selected contract header is invalid",
            ));
        }

        let Some(parent_id) = input.parent_id else {
            return Ok(());
        };

        if current == Some(parent_id) {
            return Err(AppError::bad_request(
                "a contract subset cannot be its own parent",
            ));
        }

        let parent_exists: bool = diesel::select(exists(
            contract_subsets::table
                .filter(contract_subsets::id.eq(parent_id))
                .filter(contract_subsets::deleted_at.is_null()),
        ))
        .get_result(conn)?;
        if !parent_exists {
            return Err(AppError::bad_request("the selected parent is invalid"));
        }

        if let Some(current) = current {
            if gather_descendant_subset_ids(conn, current)?.contains(&parent_id) {
                return Err(AppError::bad_request(
                    "cannot move a contract subset under one of its descendants",
                ));
            }
        }

        Ok(())
    }

    fn insert(
        conn: &mut PgConnection,
        id: Uuid,
        input: &Self::Input,
        owner: Uuid,
        files: bool,
    ) -> AppResult<()> {
        let new_subset = NewContractSubset {
            id,
            contract_header_id: input.contract_header_id,
            parent_id: input.parent_id,
            name: input.name.clone(),
            workplace: input.workplace.clone(),
            user_id: owner,
            files,
        };
        diesel::insert_into(contract_subsets::table)
            .values(&new_subset)
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
            contract_subsets::table
                .filter(contract_subsets::id.eq(id))
                .filter(contract_subsets::deleted_at.is_null()),
        )
        .set((
            contract_subsets::contract_header_id.eq(input.contract_header_id),
            contract_subsets::parent_id.eq(input.parent_id),
            contract_subsets::name.eq(&input.name),
            contract_subsets::workplace.eq(&input.workplace),
            contract_subsets::user_id.eq(owner),
            contract_subsets::updated_at.eq(now),
        ))
        .execute(conn)?;

        if new_files {
            diesel::update(contract_subsets::table.find(id))
                .set(contract_subsets::files.eq(true))
                .execute(conn)?;
        }
        Ok(())
    }

    fn ensure_exists(conn: &mut PgConnection, id: Uuid) -> AppResult<()> {
        let found: bool = diesel::select(exists(
            contract_subsets::table
                .filter(contract_subsets::id.eq(id))
                .filter(contract_subsets::deleted_at.is_null()),
        ))
        .get_result(conn)?;
        if found {
            Ok(())
        } else {
            Err(AppError::not_found())
        }
    }

    /// Only employee assignments block removal; child subsets do not.
    fn has_dependents(conn: &mut PgConnection, id: Uuid) -> AppResult<bool> {
        Ok(diesel::select(exists(
            employees::table
                .filter(employees::contract_subset_id.eq(id))
                .filter(employees::deleted_at.is_null()),
        ))
        .get_result(conn)?)
    }

    /// Live children are detached so they stay editable.
    fn soft_delete(conn: &mut PgConnection, id: Uuid) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        diesel::update(contract_subsets::table.find(id))
            .set((
                contract_subsets::deleted_at.eq(Some(now)),
                contract_subsets::updated_at.eq(now),
            ))
            .execute(conn)?;
        diesel::update(
            contract_subsets::table
                .filter(contract_subsets::parent_id.eq(id))
                .filter(contract_subsets::deleted_at.is_null()),
        )
        .set((
            contract_subsets::parent_id.eq(None::<Uuid>),
            contract_subsets::updated_at.eq(now),
        ))
        .execute(conn)?;
        Ok(())
    }

    fn toggle_status(conn: &mut PgConnection, id: Uuid) -> AppResult<bool> {
        let inactive: bool = contract_subsets::table
            .filter(contract_subsets::id.eq(id))
            .filter(contract_subsets::deleted_at.is_null())
            .select(contract_subsets::inactive)
            .first(conn)?;

        diesel::update(contract_subsets::table.find(id))
            .set((
                contract_subsets::inactive.eq(!inactive),
                contract_subsets::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        Ok(!inactive)
    }
}

pub(crate) fn gather_descendant_subset_ids(
    conn: &mut PgConnection,
    subset_id: Uuid,
) -> AppResult<Vec<Uuid>> {
    let mut ids = vec![subset_id];
    let mut queue = vec![subset_id];

    while let Some(current) = queue.pop() {
        let child_ids: Vec<Uuid> = contract_subsets::table
            .filter(contract_subsets::parent_id.eq(Some(current)))
            .select(contract_subsets::id)
            .load(conn)?;
        // Rows written before the cycle check existed could loop.
        let unseen: Vec<Uuid> = child_ids
            .into_iter()
            .filter(|id| !ids.contains(id))
            .collect();
        queue.extend(unseen.iter().copied());
        ids.extend(unseen);
    }

    Ok(ids)
}

fn load_live_subsets(conn: &mut PgConnection) -> AppResult<Vec<(ContractSubset, String)>> {
    Ok(contract_subsets::table
        .inner_join(users::table)
        .filter(contract_subsets::deleted_at.is_null())
        .select((contract_subsets::all_columns, users::username))
        .order((contract_subsets::created_at.asc(), contract_subsets::id.asc()))
        .load::<(ContractSubset, String)>(conn)?)
}

fn load_header_refs(conn: &mut PgConnection) -> AppResult<Vec<HeaderRef>> {
    let rows: Vec<(Uuid, String, String)> = contract_headers::table
        .filter(contract_headers::deleted_at.is_null())
        .order((contract_headers::created_at.asc(), contract_headers::id.asc()))
        .select((
            contract_headers::id,
            contract_headers::name,
            contract_headers::workplace,
        ))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(id, name, workplace)| HeaderRef {
            id,
            name,
            workplace,
        })
        .collect())
}

fn load_employee_counts(
    conn: &mut PgConnection,
    subset_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, i64>> {
    if subset_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(Uuid, i64)> = employees::table
        .filter(employees::deleted_at.is_null())
        .filter(employees::contract_subset_id.eq_any(subset_ids))
        .group_by(employees::contract_subset_id)
        .select((employees::contract_subset_id, diesel::dsl::count_star()))
        .load(conn)?;

    Ok(rows.into_iter().collect())
}

/// Assembles the list view: header, parent and children are resolved from the
/// already-loaded rows instead of per-record queries.
fn build_subset_infos(
    subsets: Vec<(ContractSubset, String)>,
    headers: &[HeaderRef],
    employee_counts: &HashMap<Uuid, i64>,
) -> Vec<ContractSubsetInfo> {
    let headers_by_id: HashMap<Uuid, &HeaderRef> =
        headers.iter().map(|header| (header.id, header)).collect();
    let names: HashMap<Uuid, String> = subsets
        .iter()
        .map(|(subset, _)| (subset.id, subset.name.clone()))
        .collect();

    let mut children: HashMap<Uuid, Vec<SubsetRef>> = HashMap::new();
    for (subset, _) in &subsets {
        if let Some(parent_id) = subset.parent_id {
            children.entry(parent_id).or_default().push(SubsetRef {
                id: subset.id,
                name: subset.name.clone(),
            });
        }
    }

    subsets
        .into_iter()
        .map(|(subset, owner)| ContractSubsetInfo {
            id: subset.id,
            contract_header_id: subset.contract_header_id,
            contract_header: headers_by_id
                .get(&subset.contract_header_id)
                .map(|header| (*header).clone()),
            parent_id: subset.parent_id,
            parent: subset.parent_id.and_then(|parent_id| {
                names.get(&parent_id).map(|name| SubsetRef {
                    id: parent_id,
                    name: name.clone(),
                })
            }),
            children: children.remove(&subset.id).unwrap_or_default(),
            employee_count: employee_counts.get(&subset.id).copied().unwrap_or(0),
            name: subset.name,
            workplace: subset.workplace,
            files: subset.files,
            inactive: subset.inactive,
            user_id: subset.user_id,
            owner,
            created_at: to_iso(subset.created_at),
            updated_at: to_iso(subset.updated_at),
        })
        .collect()
}

pub async fn list_contract_subsets(
    State(state): State<AppState>,
    context: RequestContext,
) -> AppResult<Json<ContractSubsetListResponse>> {
    context.authorize(Action::Index, Resource::ContractSubset)?;

    let mut conn = state.db()?;
    let subsets = load_live_subsets(&mut conn)?;
    let contract_headers = load_header_refs(&mut conn)?;
    let ids: Vec<Uuid> = subsets.iter().map(|(subset, _)| subset.id).collect();
    let employee_counts = load_employee_counts(&mut conn, &ids)?;

    Ok(Json(ContractSubsetListResponse {
        contract_subsets: build_subset_infos(subsets, &contract_headers, &employee_counts),
        contract_headers,
    }))
}

pub async fn edit_contract_subset(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ContractSubsetResponse>> {
    context.authorize(Action::Edit, Resource::ContractSubset)?;

    let mut conn = state.db()?;
    let subsets = load_live_subsets(&mut conn)?;
    if !subsets.iter().any(|(subset, _)| subset.id == id) {
        return Err(AppError::not_found());
    }

    let contract_headers = load_header_refs(&mut conn)?;
    let employees: Vec<Employee> = employees::table
        .filter(employees::contract_subset_id.eq(id))
        .filter(employees::deleted_at.is_null())
        .order((employees::last_name.asc(), employees::first_name.asc()))
        .load(&mut conn)?;
    let employee_counts = HashMap::from([(id, employees.len() as i64)]);

    let candidates = subsets
        .iter()
        .filter(|(subset, _)| subset.id != id)
        .map(|(subset, _)| SubsetRef {
            id: subset.id,
            name: subset.name.clone(),
        })
        .collect();

    let contract_subset = build_subset_infos(subsets, &contract_headers, &employee_counts)
        .into_iter()
        .find(|info| info.id == id)
        .ok_or_else(AppError::not_found)?;

    Ok(Json(ContractSubsetResponse {
        contract_subset,
        employees: employees
            .into_iter()
            .map(|employee| EmployeeInfo {
                id: employee.id,
                first_name: employee.first_name,
                last_name: employee.last_name,
            })
            .collect(),
        contract_subsets: candidates,
        contract_headers,
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use uuid::Uuid;

    use super::{build_subset_infos, ContractSubsetInput, ContractSubsets, HeaderRef};
    use crate::models::ContractSubset;
    use crate::routes::lifecycle::{FormFields, ManagedResource};

    fn subset(id: Uuid, header: Uuid, parent: Option<Uuid>, name: &str) -> ContractSubset {
        let now = Utc::now().naive_utc();
        ContractSubset {
            id,
            contract_header_id: header,
            parent_id: parent,
            name: name.to_string(),
            workplace: "HQ".to_string(),
            user_id: Uuid::new_v4(),
            files: false,
            inactive: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn parse_requires_header_name_and_workplace() {
        let mut fields = FormFields::default();
        fields.insert("name", "Cleaning");
        fields.insert("workplace", "North");
        let err = ContractSubsets::parse(&fields).unwrap_err();
        assert_eq!(err.message(), "the contract_header_id field is required");

        let header = Uuid::new_v4();
        fields.insert("contract_header_id", header.to_string());
        fields.insert("parent_id", "");
        let ContractSubsetInput {
            contract_header_id,
            parent_id,
            ..
        } = ContractSubsets::parse(&fields).unwrap();
        assert_eq!(contract_header_id, header);
        assert!(parent_id.is_none());
    }

    #[test]
    fn infos_link_parents_children_and_headers() {
        let header = Uuid::new_v4();
        let root = Uuid::new_v4();
        let leaf = Uuid::new_v4();
        let headers = vec![HeaderRef {
            id: header,
            name: "Facilities".into(),
            workplace: "HQ".into(),
        }];
        let counts = HashMap::from([(leaf, 3)]);

        let infos = build_subset_infos(
            vec![
                (subset(root, header, None, "Root"), "admin".into()),
                (subset(leaf, header, Some(root), "Leaf"), "editor".into()),
            ],
            &headers,
            &counts,
        );

        let root_info = infos.iter().find(|info| info.id == root).unwrap();
        assert_eq!(root_info.children.len(), 1);
        assert_eq!(root_info.children[0].id, leaf);
        assert_eq!(root_info.employee_count, 0);
        assert_eq!(root_info.contract_header.as_ref().unwrap().name, "Facilities");

        let leaf_info = infos.iter().find(|info| info.id == leaf).unwrap();
        assert_eq!(leaf_info.parent.as_ref().unwrap().name, "Root");
        assert_eq!(leaf_info.employee_count, 3);
        assert_eq!(leaf_info.owner, "editor");
    }
}
