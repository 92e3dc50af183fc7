//! Pending automation inbox shown to staff users.
//!
//! Each category lists automations whose current role is the caller's role,
//! whose contract is one the role may see, and which are neither finished
//! nor read, most recent first.

use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::schema::{
    advantage_automations, advantages, automation_periods, contract_subsets, employees,
    invoice_automations, performance_automations,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub message: String,
    pub action: String,
    pub referred: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationFeed {
    pub performance: Vec<Notification>,
    pub invoice: Vec<Notification>,
    pub advantage: Vec<Notification>,
}

/// Performance or invoice automation joined with its contract and period.
#[derive(Debug, Clone, Queryable)]
pub struct PeriodicInboxRow {
    pub id: i64,
    pub is_referred: bool,
    pub contract_name: String,
    pub workplace: String,
    pub month_name: String,
    pub automation_year: i32,
}

#[derive(Debug, Clone, Queryable)]
pub struct AdvantageInboxRow {
    pub id: i64,
    pub is_referred: bool,
    pub advantage_name: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Copy)]
pub struct InboxScope<'a> {
    pub role_id: Uuid,
    pub contracts: &'a [Uuid],
}

pub trait InboxSource {
    fn performance_inbox(&mut self, scope: InboxScope<'_>) -> AppResult<Vec<PeriodicInboxRow>>;
    fn invoice_inbox(&mut self, scope: InboxScope<'_>) -> AppResult<Vec<PeriodicInboxRow>>;
    fn advantage_inbox(&mut self, scope: InboxScope<'_>) -> AppResult<Vec<AdvantageInboxRow>>;
}

impl InboxSource for PgConnection {
    fn performance_inbox(&mut self, scope: InboxScope<'_>) -> AppResult<Vec<PeriodicInboxRow>> {
        let rows = performance_automations::table
            .inner_join(contract_subsets::table)
            .inner_join(automation_periods::table)
            .filter(performance_automations::current_role_id.eq(scope.role_id))
            .filter(performance_automations::contract_subset_id.eq_any(scope.contracts))
            .filter(performance_automations::is_finished.eq(false))
            .filter(performance_automations::is_read.eq(false))
            .filter(contract_subsets::deleted_at.is_null())
            .order(performance_automations::id.desc())
            .select((
                performance_automations::id,
                performance_automations::is_referred,
                contract_subsets::name,
                contract_subsets::workplace,
                automation_periods::month_name,
                automation_periods::automation_year,
            ))
            .load::<PeriodicInboxRow>(self)?;
        Ok(rows)
    }

    fn invoice_inbox(&mut self, scope: InboxScope<'_>) -> AppResult<Vec<PeriodicInboxRow>> {
        let rows = invoice_automations::table
            .inner_join(contract_subsets::table)
            .inner_join(automation_periods::table)
            .filter(invoice_automations::current_role_id.eq(scope.role_id))
            .filter(invoice_automations::contract_subset_id.eq_any(scope.contracts))
            .filter(invoice_automations::is_finished.eq(false))
            .filter(invoice_automations::is_read.eq(false))
            .filter(contract_subsets::deleted_at.is_null())
            .order(invoice_automations::id.desc())
            .select((
                invoice_automations::id,
                invoice_automations::is_referred,
                contract_subsets::name,
                contract_subsets::workplace,
                automation_periods::month_name,
                automation_periods::automation_year,
            ))
            .load::<PeriodicInboxRow>(self)?;
        Ok(rows)
    }

    fn advantage_inbox(&mut self, scope: InboxScope<'_>) -> AppResult<Vec<AdvantageInboxRow>> {
        let rows = advantage_automations::table
            .inner_join(employees::table)
            .inner_join(advantages::table)
            .filter(advantage_automations::current_role_id.eq(scope.role_id))
            .filter(employees::contract_subset_id.eq_any(scope.contracts))
            .filter(employees::deleted_at.is_null())
            .filter(advantage_automations::is_finished.eq(false))
            .filter(advantage_automations::is_read.eq(false))
            .order(advantage_automations::id.desc())
            .select((
                advantage_automations::id,
                advantage_automations::is_referred,
                advantages::name,
                employees::first_name,
                employees::last_name,
            ))
            .load::<AdvantageInboxRow>(self)?;
        Ok(rows)
    }
}

/// Collects the three inbox categories. A role without permitted contracts
/// gets an empty feed without touching the source.
pub fn build_feed<S>(source: &mut S, role_id: Uuid, permitted: &[Uuid]) -> AppResult<NotificationFeed>
where
    S: InboxSource + ?Sized,
{
    if permitted.is_empty() {
        return Ok(NotificationFeed::default());
    }

    let scope = InboxScope {
        role_id,
        contracts: permitted,
    };

    let performance = source
        .performance_inbox(scope)?
        .into_iter()
        .map(|row| Notification {
            message: periodic_message("Performance report", &row),
            action: performance_details_path(row.id),
            referred: row.is_referred,
        })
        .collect();

    let invoice = source
        .invoice_inbox(scope)?
        .into_iter()
        .map(|row| Notification {
            message: periodic_message("Invoice", &row),
            action: invoice_details_path(row.id),
            referred: row.is_referred,
        })
        .collect();

    let advantage = source
        .advantage_inbox(scope)?
        .into_iter()
        .map(|row| Notification {
            message: advantage_message(&row),
            action: advantage_details_path(row.id),
            referred: row.is_referred,
        })
        .collect();

    Ok(NotificationFeed {
        performance,
        invoice,
        advantage,
    })
}

// TODO: referred automations reuse the first-review wording until the
// workflow owners provide the referral text; `referred` is exposed so the UI
// can tell them apart meanwhile.
fn periodic_message(kind: &str, row: &PeriodicInboxRow) -> String {
    format!(
        "{kind} of {} ({}) for {} {} is awaiting your review",
        row.contract_name, row.workplace, row.month_name, row.automation_year
    )
}

fn advantage_message(row: &AdvantageInboxRow) -> String {
    format!(
        "Advantage request {} for {} {} is awaiting your review",
        row.advantage_name, row.first_name, row.last_name
    )
}

pub fn performance_details_path(id: i64) -> String {
    format!("/performance-automations/{id}/details")
}

pub fn invoice_details_path(id: i64) -> String {
    format!("/invoice-automations/{id}/details")
}

pub fn advantage_details_path(id: i64) -> String {
    format!("/advantage-automations/{id}/details")
}
