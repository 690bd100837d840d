//! Payment ledger - one rent entry per booking per calendar month.
//!
//! Payments are status transitions reported by a trusted caller; no money moves here.
//! A month's entry is created on first payment with `total_expected` set to the
//! property's monthly price. Marking a month paid completes the booking.

use super::{
    AppContext, Actor,
    booking::{BookingUpdate, apply_booking_update, find_booking, find_property, reconcile_availability},
    calendar::MonthPeriod,
    log_failure,
};
use crate::{
    entities::{Transaction, booking, transaction},
    errors::{Error, Result},
    models::{BookingStatus, TransactionStatus},
    notify::{NotificationEvent, Outbox},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde_json::json;
use tracing::{info, instrument};

/// Which ledger entry a payment applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTarget {
    /// An existing ledger entry
    Transaction(i64),
    /// The entry for a booking and month, created if missing
    BookingMonth {
        booking_id: i64,
        month: u32,
        year: i32,
    },
}

/// A tenant's report of a rent payment.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    /// Ledger entry being paid
    pub target: PaymentTarget,
    /// Amount received, added to `total_paid`
    pub amount: f64,
    /// Free-form payment method ("card", "bank transfer", ...)
    pub method: String,
    /// Requested outcome; anything other than paid, unpaid or advanced means paid
    pub desired_status: Option<TransactionStatus>,
}

/// Ledger entry and booking after a payment.
#[derive(Debug, Clone)]
pub struct PaymentReceipt {
    /// The entry after the payment
    pub transaction: transaction::Model,
    /// The booking, completed if the month was marked paid
    pub booking: booking::Model,
}

/// All ledger entries of one booking.
#[derive(Debug, Clone)]
pub struct BookingLedger {
    pub booking_id: i64,
    /// Entries in calendar order
    pub entries: Vec<transaction::Model>,
    /// Rent due across all entries
    pub total_expected: f64,
    /// Rent received across all entries
    pub total_paid: f64,
    /// Sum of per-month outstanding amounts
    pub outstanding: f64,
}

fn validate_payment(request: &PaymentRequest) -> Result<()> {
    if !request.amount.is_finite() || request.amount < 0.0 {
        return Err(Error::invalid_input(format!(
            "payment amount {} is not a non-negative number",
            request.amount
        )));
    }
    if let PaymentTarget::BookingMonth { month, .. } = request.target {
        if !(1..=12).contains(&month) {
            return Err(Error::invalid_input(format!("month {month} is out of range")));
        }
    }
    Ok(())
}

/// Finds the ledger entry for `booking_id` in `period`.
pub(crate) async fn find_entry<C: ConnectionTrait>(
    db: &C,
    booking_id: i64,
    period: MonthPeriod,
) -> Result<Option<transaction::Model>> {
    Transaction::find()
        .filter(transaction::Column::BookingId.eq(booking_id))
        .filter(transaction::Column::Month.eq(period.month))
        .filter(transaction::Column::Year.eq(period.year))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Records a payment on behalf of the booking's tenant.
#[instrument(skip(ctx, request), fields(amount = request.amount))]
pub async fn pay(ctx: &AppContext, actor: &Actor, request: &PaymentRequest) -> Result<PaymentReceipt> {
    validate_payment(request)?;
    let (receipt, outbox) = pay_txn(ctx, actor, request)
        .await
        .inspect_err(|e| log_failure("pay", e))?;
    ctx.notifier.publish(outbox);
    Ok(receipt)
}

async fn pay_txn(
    ctx: &AppContext,
    actor: &Actor,
    request: &PaymentRequest,
) -> Result<(PaymentReceipt, Outbox)> {
    let now = ctx.now();
    let txn = ctx.database.begin().await?;

    let existing = match request.target {
        PaymentTarget::Transaction(id) => Some(
            Transaction::find_by_id(id)
                .one(&txn)
                .await?
                .ok_or_else(|| Error::not_found("transaction", id))?,
        ),
        PaymentTarget::BookingMonth {
            booking_id,
            month,
            year,
        } => find_entry(&txn, booking_id, MonthPeriod { year, month }).await?,
    };
    let booking_id = match (&existing, request.target) {
        (Some(entry), _) => entry.booking_id,
        (None, PaymentTarget::BookingMonth { booking_id, .. }) => booking_id,
        (None, PaymentTarget::Transaction(id)) => return Err(Error::not_found("transaction", id)),
    };

    let booking = find_booking(&txn, booking_id).await?;
    if !actor.rents(&booking) {
        return Err(Error::forbidden("only the tenant can pay for a booking"));
    }
    let booking_status = booking.status()?;
    if !matches!(booking_status, BookingStatus::Approved | BookingStatus::Completed) {
        return Err(Error::invalid_state(format!(
            "booking {booking_id} is {booking_status}, rent is only collected on approved bookings"
        )));
    }
    let property = find_property(&txn, booking.property_id).await?;

    let entry = match (existing, request.target) {
        (Some(entry), _) => entry,
        (None, PaymentTarget::BookingMonth { month, year, .. }) => {
            transaction::ActiveModel {
                booking_id: Set(booking.id),
                month: Set(i32::try_from(month).unwrap_or(1)),
                year: Set(year),
                total_expected: Set(property.price),
                total_paid: Set(0.0),
                status: Set(TransactionStatus::Pending.as_str().to_string()),
                payment_method: Set(None),
                payment_date: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?
        }
        (None, PaymentTarget::Transaction(id)) => return Err(Error::not_found("transaction", id)),
    };

    let current = entry.status()?;
    if !current.accepts_payment() {
        return Err(Error::invalid_state(format!(
            "transaction {} is {current} and cannot take payments",
            entry.id
        )));
    }

    let status = request
        .desired_status
        .filter(|s| s.is_payment_outcome())
        .unwrap_or(TransactionStatus::Paid);
    let total_paid = if status == TransactionStatus::Paid {
        entry.total_expected
    } else {
        (entry.total_paid + request.amount).min(entry.total_expected)
    };

    let mut active: transaction::ActiveModel = entry.clone().into();
    active.status = Set(status.as_str().to_string());
    active.total_paid = Set(total_paid);
    active.payment_method = Set(Some(request.method.clone()));
    active.updated_at = Set(now);
    if matches!(status, TransactionStatus::Paid | TransactionStatus::Advanced) {
        active.payment_date = Set(Some(now));
    }
    let updated = Transaction::update_many()
        .set(active)
        .filter(transaction::Column::Id.eq(entry.id))
        .filter(transaction::Column::Status.eq(entry.status.as_str()))
        .exec(&txn)
        .await?;
    if updated.rows_affected == 0 {
        return Err(Error::invalid_state(format!(
            "transaction {} changed while paying",
            entry.id
        )));
    }
    let entry = Transaction::find_by_id(entry.id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("transaction", entry.id))?;

    let booking = if status == TransactionStatus::Paid && booking_status == BookingStatus::Approved {
        let update = BookingUpdate {
            status: Some(BookingStatus::Completed),
            ..Default::default()
        };
        let completed = apply_booking_update(&txn, &booking, update, now).await?;
        reconcile_availability(&txn, property.id, now).await?;
        completed
    } else {
        booking
    };

    txn.commit().await?;
    info!(
        transaction_id = entry.id,
        booking_id = booking.id,
        "Rent for {:04}-{:02} marked {status}",
        entry.year,
        entry.month
    );

    let period = format!("{:04}-{:02}", entry.year, entry.month);
    let metadata = json!({
        "transaction_id": entry.id,
        "status": entry.status,
        "total_paid": entry.total_paid,
        "total_expected": entry.total_expected,
    });
    let mut outbox = Outbox::new();
    outbox.push(
        NotificationEvent::new(
            booking.tenant_id,
            format!("Payment {status}"),
            format!("Your rent for {period} at \"{}\" is now {status}.", property.title),
            format!("/bookings/{}/ledger", booking.id),
        )
        .about(booking.id, property.id)
        .with_metadata(metadata.clone()),
    );
    outbox.push(
        NotificationEvent::new(
            property.owner_id,
            format!("Payment {status}"),
            format!("Rent for {period} at \"{}\" is now {status}.", property.title),
            format!("/bookings/{}/ledger", booking.id),
        )
        .about(booking.id, property.id)
        .with_metadata(metadata),
    );
    Ok((
        PaymentReceipt {
            transaction: entry,
            booking,
        },
        outbox,
    ))
}

/// Every ledger entry of a booking, readable by its tenant, the owner and admins.
pub async fn booking_ledger(ctx: &AppContext, actor: &Actor, booking_id: i64) -> Result<BookingLedger> {
    let booking = find_booking(&ctx.database, booking_id).await?;
    if !actor.rents(&booking) {
        let property = find_property(&ctx.database, booking.property_id).await?;
        if !actor.manages(&property) {
            return Err(Error::forbidden("not a party to this booking"));
        }
    }

    let entries = Transaction::find()
        .filter(transaction::Column::BookingId.eq(booking_id))
        .order_by_asc(transaction::Column::Year)
        .order_by_asc(transaction::Column::Month)
        .all(&ctx.database)
        .await?;

    let total_expected = entries.iter().map(|e| e.total_expected).sum();
    let total_paid = entries.iter().map(|e| e.total_paid).sum();
    let outstanding = entries.iter().map(transaction::Model::outstanding).sum();
    Ok(BookingLedger {
        booking_id,
        entries,
        total_expected,
        total_paid,
        outstanding,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::{core::Actor, models::AvailabilityStatus, test_utils::*};

    fn month_payment(booking_id: i64, amount: f64, desired: Option<TransactionStatus>) -> PaymentRequest {
        PaymentRequest {
            target: PaymentTarget::BookingMonth {
                booking_id,
                month: 3,
                year: 2030,
            },
            amount,
            method: "card".to_string(),
            desired_status: desired,
        }
    }

    #[tokio::test]
    async fn test_pay_validation_happens_before_any_query() -> Result<()> {
        // Booking 4242 does not exist: a lookup would answer NotFound
        let (ctx, _rx) = setup_test_context().await?;
        let tenant = Actor::tenant(1);

        for amount in [f64::NAN, f64::INFINITY, -5.0] {
            let result = pay(&ctx, &tenant, &month_payment(4242, amount, None)).await;
            assert!(matches!(result, Err(Error::InvalidInput { .. })));
        }

        let mut bad_month = month_payment(4242, 10.0, None);
        bad_month.target = PaymentTarget::BookingMonth {
            booking_id: 4242,
            month: 13,
            year: 2030,
        };
        let result = pay(&ctx, &tenant, &bad_month).await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));

        let result = pay(&ctx, &tenant, &month_payment(4242, 10.0, None)).await;
        assert!(matches!(result, Err(Error::NotFound { entity: "booking", .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_paying_pending_month_completes_booking() -> Result<()> {
        let (ctx, mut rx) = setup_test_context().await?;
        let scenario = setup_scenario(&ctx).await?;
        let booking = create_approved_booking(&ctx, &scenario).await?;
        let entry = create_test_transaction(&ctx.database, booking.id, 3, 2030, 0.0).await?;
        drain(&mut rx);

        let receipt = pay(
            &ctx,
            &Actor::tenant(scenario.tenant.id),
            &PaymentRequest {
                target: PaymentTarget::Transaction(entry.id),
                amount: 40.0,
                method: "bank transfer".to_string(),
                desired_status: Some(TransactionStatus::Paid),
            },
        )
        .await?;

        assert_eq!(receipt.transaction.status()?, TransactionStatus::Paid);
        assert_eq!(receipt.transaction.total_paid, receipt.transaction.total_expected);
        assert!(receipt.transaction.is_settled());
        assert!(receipt.transaction.payment_date.is_some());
        assert_eq!(receipt.booking.status()?, BookingStatus::Completed);
        assert_eq!(
            availability_of(&ctx.database, scenario.property.id).await?,
            AvailabilityStatus::Available
        );

        let recipients = [rx.try_recv().unwrap().user_id, rx.try_recv().unwrap().user_id];
        assert_eq!(recipients, [scenario.tenant.id, scenario.owner.id]);
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_payments_accumulate_and_cap() -> Result<()> {
        let (ctx, _rx) = setup_test_context().await?;
        let scenario = setup_scenario(&ctx).await?;
        let booking = create_approved_booking(&ctx, &scenario).await?;
        let tenant = Actor::tenant(scenario.tenant.id);

        // First payment creates the month with the property price as expectation
        let first = pay(&ctx, &tenant, &month_payment(booking.id, 30.0, Some(TransactionStatus::Unpaid))).await?;
        assert_eq!(first.transaction.total_expected, scenario.property.price);
        assert_eq!(first.transaction.total_paid, 30.0);
        assert_eq!(first.transaction.outstanding(), scenario.property.price - 30.0);
        assert!(first.transaction.payment_date.is_none());
        assert_eq!(first.booking.status()?, BookingStatus::Approved);

        let second = pay(
            &ctx,
            &tenant,
            &month_payment(booking.id, 10_000.0, Some(TransactionStatus::Advanced)),
        )
        .await?;
        assert_eq!(second.transaction.id, first.transaction.id);
        assert_eq!(second.transaction.total_paid, scenario.property.price);
        assert_eq!(second.transaction.status()?, TransactionStatus::Advanced);
        assert!(second.transaction.payment_date.is_some());
        assert_eq!(second.booking.status()?, BookingStatus::Approved);
        Ok(())
    }

    #[tokio::test]
    async fn test_unsupported_desired_status_means_paid() -> Result<()> {
        let (ctx, _rx) = setup_test_context().await?;
        let scenario = setup_scenario(&ctx).await?;
        let booking = create_approved_booking(&ctx, &scenario).await?;

        let receipt = pay(
            &ctx,
            &Actor::tenant(scenario.tenant.id),
            &month_payment(booking.id, 0.0, Some(TransactionStatus::Refunded)),
        )
        .await?;
        assert_eq!(receipt.transaction.status()?, TransactionStatus::Paid);
        Ok(())
    }

    #[tokio::test]
    async fn test_paid_month_rejects_further_payments() -> Result<()> {
        let (ctx, _rx) = setup_test_context().await?;
        let scenario = setup_scenario(&ctx).await?;
        let booking = create_approved_booking(&ctx, &scenario).await?;
        let tenant = Actor::tenant(scenario.tenant.id);

        pay(&ctx, &tenant, &month_payment(booking.id, 100.0, None)).await?;
        let again = pay(&ctx, &tenant, &month_payment(booking.id, 100.0, None)).await;
        assert!(matches!(again, Err(Error::InvalidState { .. })));

        let ledger = booking_ledger(&ctx, &tenant, booking.id).await?;
        assert_eq!(ledger.entries.len(), 1);
        assert_eq!(ledger.outstanding, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_pay_requires_tenant_and_live_booking() -> Result<()> {
        let (ctx, _rx) = setup_test_context().await?;
        let scenario = setup_scenario(&ctx).await?;
        // Pending first: approval takes the property off the market
        let pending = create_pending_booking(&ctx, &scenario).await?;
        let approved = create_approved_booking(&ctx, &scenario).await?;

        let by_owner = pay(&ctx, &Actor::owner(scenario.owner.id), &month_payment(approved.id, 10.0, None)).await;
        assert!(matches!(by_owner, Err(Error::Forbidden { .. })));

        let on_pending = pay(
            &ctx,
            &Actor::tenant(scenario.tenant.id),
            &month_payment(pending.id, 10.0, None),
        )
        .await;
        assert!(matches!(on_pending, Err(Error::InvalidState { .. })));

        let missing = pay(
            &ctx,
            &Actor::tenant(scenario.tenant.id),
            &PaymentRequest {
                target: PaymentTarget::Transaction(31337),
                amount: 1.0,
                method: "cash".to_string(),
                desired_status: None,
            },
        )
        .await;
        assert!(matches!(missing, Err(Error::NotFound { entity: "transaction", .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_ledger_orders_months_and_sums() -> Result<()> {
        let (ctx, _rx) = setup_test_context().await?;
        let scenario = setup_scenario(&ctx).await?;
        let booking = create_approved_booking(&ctx, &scenario).await?;
        create_test_transaction(&ctx.database, booking.id, 2, 2031, 25.0).await?;
        create_test_transaction(&ctx.database, booking.id, 11, 2030, 100.0).await?;

        let ledger = booking_ledger(&ctx, &Actor::owner(scenario.owner.id), booking.id).await?;
        let months: Vec<(i32, i32)> = ledger.entries.iter().map(|e| (e.year, e.month)).collect();
        assert_eq!(months, vec![(2030, 11), (2031, 2)]);
        assert_eq!(ledger.total_paid, 125.0);
        assert_eq!(ledger.outstanding, 75.0);

        let stranger = booking_ledger(&ctx, &Actor::tenant(scenario.tenant.id + 3), booking.id).await;
        assert!(matches!(stranger, Err(Error::Forbidden { .. })));
        Ok(())
    }
}
