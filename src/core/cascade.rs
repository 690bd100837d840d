//! Cascading deletion of users and everything that references them.
//!
//! [`plan_user_deletion`] is the only place that knows which records depend on a user:
//! it turns the user's role and the deletion scope into an ordered list of
//! `(collection, condition)` steps. [`execute_plan`] runs the steps and then reconciles
//! surviving properties, all on the caller's transaction, so a failing step leaves
//! nothing behind.

use super::{AppContext, Actor, booking::reconcile_availability, log_failure};
use crate::{
    entities::{
        Booking, LeaveRequest, Notification, Property, Review, Transaction, User, UserRating, booking,
        leave_request, notification, property, review, transaction, user, user_rating,
    },
    errors::{Error, Result},
    models::Role,
};
use chrono::{DateTime, Utc};
use sea_orm::{Condition, QuerySelect, TransactionTrait, prelude::*, sea_query::SimpleExpr};
use std::{collections::BTreeSet, fmt};
use tracing::{debug, info, instrument};

/// Who is asking for the deletion, which decides how far it reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeScope {
    /// The user or an admin removing the account record
    UserRemoval,
    /// The user closing their own account; also removes authored content
    SelfService,
}

/// Tables a cascade can delete from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Collection {
    UserRatings,
    LeaveRequests,
    Transactions,
    Bookings,
    Reviews,
    Notifications,
    Properties,
    Users,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UserRatings => "user_ratings",
            Self::LeaveRequests => "leave_requests",
            Self::Transactions => "transactions",
            Self::Bookings => "bookings",
            Self::Reviews => "reviews",
            Self::Notifications => "notifications",
            Self::Properties => "properties",
            Self::Users => "users",
        })
    }
}

/// One `DELETE ... WHERE filter` against one collection.
#[derive(Debug, Clone)]
pub struct DeletionStep {
    pub collection: Collection,
    pub filter: Condition,
}

/// Ordered deletion steps plus the surviving properties whose bookings are affected.
#[derive(Debug, Clone)]
pub struct CascadePlan {
    pub user_id: i64,
    pub scope: CascadeScope,
    pub steps: Vec<DeletionStep>,
    pub reconcile_properties: Vec<i64>,
}

impl CascadePlan {
    /// Collections touched by this plan, in execution order.
    #[must_use]
    pub fn collections(&self) -> Vec<Collection> {
        self.steps.iter().map(|s| s.collection).collect()
    }
}

/// Rows removed per collection by an executed plan.
#[derive(Debug, Clone, Default)]
pub struct DeletionReport {
    pub user_id: i64,
    pub deleted: Vec<(Collection, u64)>,
    /// The caller's session cookie must be cleared
    pub clear_session: bool,
}

impl DeletionReport {
    /// Rows removed from `collection`.
    #[must_use]
    pub fn count(&self, collection: Collection) -> u64 {
        self.deleted
            .iter()
            .filter(|(c, _)| *c == collection)
            .map(|(_, n)| n)
            .sum()
    }
}

/// `OR` of the given expressions, or `None` when there is nothing to match.
fn any_of(parts: impl IntoIterator<Item = Option<SimpleExpr>>) -> Option<Condition> {
    let mut condition = Condition::any();
    let mut used = false;
    for part in parts.into_iter().flatten() {
        condition = condition.add(part);
        used = true;
    }
    used.then_some(condition)
}

fn non_empty(ids: &BTreeSet<i64>) -> Option<Vec<i64>> {
    (!ids.is_empty()).then(|| ids.iter().copied().collect())
}

/// Builds the deletion plan for `target`.
///
/// Owners lose their properties and everything attached to them. Every user loses the
/// bookings they made; non-owners also lose the notifications addressed to them. The
/// self-service scope additionally removes the reviews, leave requests and
/// notifications of the user regardless of role.
pub async fn plan_user_deletion<C: ConnectionTrait>(
    db: &C,
    target: &user::Model,
    scope: CascadeScope,
) -> Result<CascadePlan> {
    let role = target.role()?;
    let user_id = target.id;
    let self_service = scope == CascadeScope::SelfService;

    let owned_properties: BTreeSet<i64> = if role == Role::Owner {
        Property::find()
            .select_only()
            .column(property::Column::Id)
            .filter(property::Column::OwnerId.eq(user_id))
            .into_tuple::<i64>()
            .all(db)
            .await?
            .into_iter()
            .collect()
    } else {
        BTreeSet::new()
    };

    let mut bookings: BTreeSet<i64> = BTreeSet::new();
    if let Some(ids) = non_empty(&owned_properties) {
        let on_properties: Vec<i64> = Booking::find()
            .select_only()
            .column(booking::Column::Id)
            .filter(booking::Column::PropertyId.is_in(ids))
            .into_tuple()
            .all(db)
            .await?;
        bookings.extend(on_properties);
    }

    // Bookings the user made as a tenant go too, whatever the role: none may outlive it.
    let made: Vec<(i64, i64)> = Booking::find()
        .select_only()
        .column(booking::Column::Id)
        .column(booking::Column::PropertyId)
        .filter(booking::Column::TenantId.eq(user_id))
        .into_tuple()
        .all(db)
        .await?;
    let mut reconcile_properties: BTreeSet<i64> = BTreeSet::new();
    for (booking_id, property_id) in made {
        bookings.insert(booking_id);
        if !owned_properties.contains(&property_id) {
            reconcile_properties.insert(property_id);
        }
    }

    let property_ids = non_empty(&owned_properties);
    let booking_ids = non_empty(&bookings);
    let mut steps = Vec::new();
    let mut push = |collection, filter: Option<Condition>| {
        if let Some(filter) = filter {
            steps.push(DeletionStep { collection, filter });
        }
    };

    push(
        Collection::UserRatings,
        any_of([
            Some(user_rating::Column::RaterId.eq(user_id)),
            Some(user_rating::Column::RateeId.eq(user_id)),
        ]),
    );
    push(
        Collection::LeaveRequests,
        any_of([
            booking_ids
                .clone()
                .map(|ids| leave_request::Column::BookingId.is_in(ids)),
            self_service.then(|| leave_request::Column::TenantId.eq(user_id)),
            self_service.then(|| leave_request::Column::OwnerId.eq(user_id)),
        ]),
    );
    push(
        Collection::Transactions,
        any_of([booking_ids
            .clone()
            .map(|ids| transaction::Column::BookingId.is_in(ids))]),
    );
    push(
        Collection::Bookings,
        any_of([booking_ids.map(|ids| booking::Column::Id.is_in(ids))]),
    );
    push(
        Collection::Reviews,
        any_of([
            property_ids
                .clone()
                .map(|ids| review::Column::PropertyId.is_in(ids)),
            self_service.then(|| review::Column::ReviewerId.eq(user_id)),
        ]),
    );
    push(
        Collection::Notifications,
        any_of([
            property_ids
                .clone()
                .map(|ids| notification::Column::PropertyId.is_in(ids)),
            (role != Role::Owner || self_service).then(|| notification::Column::UserId.eq(user_id)),
        ]),
    );
    push(
        Collection::Properties,
        any_of([property_ids.map(|ids| property::Column::Id.is_in(ids))]),
    );
    push(
        Collection::Users,
        any_of([Some(user::Column::Id.eq(user_id))]),
    );

    Ok(CascadePlan {
        user_id,
        scope,
        steps,
        reconcile_properties: reconcile_properties.into_iter().collect(),
    })
}

async fn execute_step<C: ConnectionTrait>(db: &C, step: &DeletionStep) -> Result<u64> {
    let filter = step.filter.clone();
    let result = match step.collection {
        Collection::UserRatings => UserRating::delete_many().filter(filter).exec(db).await?,
        Collection::LeaveRequests => LeaveRequest::delete_many().filter(filter).exec(db).await?,
        Collection::Transactions => Transaction::delete_many().filter(filter).exec(db).await?,
        Collection::Bookings => Booking::delete_many().filter(filter).exec(db).await?,
        Collection::Reviews => Review::delete_many().filter(filter).exec(db).await?,
        Collection::Notifications => Notification::delete_many().filter(filter).exec(db).await?,
        Collection::Properties => Property::delete_many().filter(filter).exec(db).await?,
        Collection::Users => User::delete_many().filter(filter).exec(db).await?,
    };
    Ok(result.rows_affected)
}

/// Runs every step of `plan` in order, then reconciles surviving properties.
///
/// Pass a transaction: the steps are only atomic if `db` is one.
pub async fn execute_plan<C: ConnectionTrait>(
    db: &C,
    plan: &CascadePlan,
    now: DateTime<Utc>,
) -> Result<DeletionReport> {
    let mut deleted = Vec::with_capacity(plan.steps.len());
    for step in &plan.steps {
        let rows = execute_step(db, step).await?;
        debug!(user_id = plan.user_id, "Deleted {rows} row(s) from {}", step.collection);
        deleted.push((step.collection, rows));
    }
    for property_id in &plan.reconcile_properties {
        reconcile_availability(db, *property_id, now).await?;
    }
    Ok(DeletionReport {
        user_id: plan.user_id,
        deleted,
        clear_session: plan.scope == CascadeScope::SelfService,
    })
}

async fn delete_user_txn(ctx: &AppContext, user_id: i64, scope: CascadeScope) -> Result<DeletionReport> {
    let now = ctx.now();
    let txn = ctx.database.begin().await?;

    let target = User::find_by_id(user_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("user", user_id))?;
    let plan = plan_user_deletion(&txn, &target, scope).await?;
    let report = execute_plan(&txn, &plan, now).await?;

    txn.commit().await?;
    info!(
        user_id,
        bookings = report.count(Collection::Bookings),
        properties = report.count(Collection::Properties),
        "User deleted with {} cascade step(s)",
        report.deleted.len()
    );
    Ok(report)
}

/// Deletes a user and every dependent record in one transaction.
///
/// Allowed for the user themself and for admins.
#[instrument(skip(ctx))]
pub async fn delete_user(ctx: &AppContext, actor: &Actor, user_id: i64) -> Result<DeletionReport> {
    if actor.user_id != user_id && !actor.is_admin() {
        let err = Error::forbidden("only the user or an admin can delete an account");
        log_failure("delete_user", &err);
        return Err(err);
    }
    delete_user_txn(ctx, user_id, CascadeScope::UserRemoval)
        .await
        .inspect_err(|e| log_failure("delete_user", e))
}

/// Closes the caller's own account. The report asks the caller to clear the session.
#[instrument(skip(ctx))]
pub async fn delete_account(ctx: &AppContext, actor: &Actor) -> Result<DeletionReport> {
    delete_user_txn(ctx, actor.user_id, CascadeScope::SelfService)
        .await
        .inspect_err(|e| log_failure("delete_account", e))
}
