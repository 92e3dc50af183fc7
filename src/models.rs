use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = roles)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = roles)]
pub struct NewRole {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = users)]
#[diesel(belongs_to(Role))]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role_id: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = role_permissions)]
pub struct RolePermission {
    pub role_id: Uuid,
    pub resource: String,
    pub action: String,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = role_contract_subsets)]
pub struct RoleContractSubset {
    pub role_id: Uuid,
    pub contract_subset_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = contract_headers)]
pub struct ContractHeader {
    pub id: Uuid,
    pub name: String,
    pub workplace: String,
    pub user_id: Uuid,
    pub files: bool,
    pub inactive: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = contract_headers)]
pub struct NewContractHeader {
    pub id: Uuid,
    pub name: String,
    pub workplace: String,
    pub user_id: Uuid,
    pub files: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = contract_subsets)]
#[diesel(belongs_to(ContractHeader))]
pub struct ContractSubset {
    pub id: Uuid,
    pub contract_header_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub workplace: String,
    pub user_id: Uuid,
    pub files: bool,
    pub inactive: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = contract_subsets)]
pub struct NewContractSubset {
    pub id: Uuid,
    pub contract_header_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub workplace: String,
    pub user_id: Uuid,
    pub files: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = employees)]
#[diesel(belongs_to(ContractSubset))]
pub struct Employee {
    pub id: Uuid,
    pub contract_subset_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = employees)]
pub struct NewEmployee {
    pub id: Uuid,
    pub contract_subset_id: Uuid,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable)]
#[diesel(table_name = automation_periods)]
pub struct AutomationPeriod {
    pub id: Uuid,
    pub month_name: String,
    pub automation_year: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = advantages)]
pub struct NewAdvantage {
    pub id: Uuid,
    pub name: String,
}

// Automation rows are written by the workflow engine; these inserts exist for seeding.
#[derive(Debug, Insertable)]
#[diesel(table_name = performance_automations)]
pub struct NewPerformanceAutomation {
    pub contract_subset_id: Uuid,
    pub automation_period_id: Uuid,
    pub current_role_id: Uuid,
    pub user_id: Uuid,
    pub is_finished: bool,
    pub is_read: bool,
    pub is_referred: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = invoice_automations)]
pub struct NewInvoiceAutomation {
    pub contract_subset_id: Uuid,
    pub automation_period_id: Uuid,
    pub current_role_id: Uuid,
    pub user_id: Uuid,
    pub is_finished: bool,
    pub is_read: bool,
    pub is_referred: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = advantage_automations)]
pub struct NewAdvantageAutomation {
    pub employee_id: Uuid,
    pub advantage_id: Uuid,
    pub current_role_id: Uuid,
    pub user_id: Uuid,
    pub is_finished: bool,
    pub is_read: bool,
    pub is_referred: bool,
}
