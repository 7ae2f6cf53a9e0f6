//! Dues ledger: payments, bulk operations and reporting.
//!
//! Bulk operations handle each item on its own and report per-item results;
//! one bad member or payment id never stops the rest.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};
use sea_orm::{IntoActiveModel, Set};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::auth::Claims;
use super::user::UserSummary;
use khidmat_common::{AppError, AppResult, FinanceConfig, IdGenerator};
use khidmat_db::{
    entities::{
        payment::{self, PaymentStatus, PaymentType},
        user,
    },
    repositories::{PaymentFilter, PaymentRepository, UserRepository},
};

/// Zone label for members without one.
const UNASSIGNED_ZONE: &str = "Unassigned";

/// The same month and day in another year. Feb 29 falls back to Feb 28.
fn anniversary(date: NaiveDate, year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, date.month(), date.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), date.day() - 1))
        .unwrap_or(date)
}

/// Start of the subscription year that contains `today`: the latest
/// anniversary of `registered` on or before `today`.
#[must_use]
pub fn subscription_year_start(registered: NaiveDate, today: NaiveDate) -> NaiveDate {
    if registered >= today {
        return registered;
    }
    let this_year = anniversary(registered, today.year());
    if this_year <= today {
        this_year
    } else {
        anniversary(registered, today.year() - 1)
    }
}

/// Label of the subscription year containing `today`, e.g. "2025-2026".
#[must_use]
pub fn subscription_year(registered: NaiveDate, today: NaiveDate) -> String {
    let start = subscription_year_start(registered, today);
    format!("{}-{}", start.year(), start.year() + 1)
}

/// Receipt number for a payment settled on `date`.
#[must_use]
pub fn receipt_number(payment_id: &str, date: NaiveDate) -> String {
    let suffix = payment_id
        .get(payment_id.len().saturating_sub(8)..)
        .unwrap_or(payment_id);
    format!("RCPT-{}-{}", date.format("%Y%m%d"), suffix.to_uppercase())
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// A payment as shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub id: String,
    pub member_id: String,
    pub amount: i64,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub subscription_year: Option<String>,
    pub due_date: NaiveDate,
    pub paid_date: Option<DateTime<FixedOffset>>,
    pub receipt_number: Option<String>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: String,
    pub created_at: DateTime<FixedOffset>,
}

impl From<payment::Model> for PaymentView {
    fn from(p: payment::Model) -> Self {
        Self {
            id: p.id,
            member_id: p.member_id,
            amount: p.amount,
            payment_type: p.payment_type,
            status: p.status,
            subscription_year: p.subscription_year,
            due_date: p.due_date,
            paid_date: p.paid_date,
            receipt_number: p.receipt_number,
            payment_method: p.payment_method,
            notes: p.notes,
            recorded_by: p.recorded_by,
            created_at: p.created_at,
        }
    }
}

/// Totals per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuesSummary {
    pub paid_amount: i64,
    pub paid_count: u64,
    pub pending_amount: i64,
    pub pending_count: u64,
    pub overdue_amount: i64,
    pub overdue_count: u64,
}

impl DuesSummary {
    fn add(&mut self, p: &payment::Model) {
        match p.status {
            PaymentStatus::Paid => {
                self.paid_amount += p.amount;
                self.paid_count += 1;
            }
            PaymentStatus::Pending => {
                self.pending_amount += p.amount;
                self.pending_count += 1;
            }
            PaymentStatus::Overdue => {
                self.overdue_amount += p.amount;
                self.overdue_count += 1;
            }
        }
    }
}

/// Per-zone slice of the overview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneBreakdown {
    pub zone: String,
    pub members: u64,
    #[serde(flatten)]
    pub totals: DuesSummary,
}

/// Organization-wide ledger figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinanceOverview {
    pub total_members: u64,
    pub total_revenue: i64,
    pub pending_amount: i64,
    pub pending_count: u64,
    pub overdue_amount: i64,
    pub overdue_count: u64,
    /// Paid payments per active member, as a percentage
    pub collection_rate: f64,
    pub zones: Vec<ZoneBreakdown>,
}

/// One member's payment history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDues {
    pub member: UserSummary,
    pub payments: Vec<PaymentView>,
    pub summary: DuesSummary,
}

/// Input for recording one payment.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentInput {
    #[validate(length(min = 1))]
    pub member_id: String,

    #[validate(range(min = 1))]
    pub amount: i64,

    pub payment_type: PaymentType,

    #[validate(length(max = 16))]
    pub subscription_year: Option<String>,

    pub due_date: Option<NaiveDate>,

    #[validate(length(max = 64))]
    pub payment_method: Option<String>,

    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Input for settling one payment.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MarkPaidInput {
    #[validate(length(max = 64))]
    pub payment_method: Option<String>,

    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Input for assigning dues to many members.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkAssignInput {
    #[validate(length(min = 1, max = 1000))]
    pub member_ids: Vec<String>,

    /// Defaults to the configured annual subscription amount
    #[validate(range(min = 1))]
    pub amount: Option<i64>,

    #[serde(default = "default_payment_type")]
    pub payment_type: PaymentType,

    /// Overrides the per-member computed label
    #[validate(length(max = 16))]
    pub subscription_year: Option<String>,

    pub due_date: Option<NaiveDate>,

    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

const fn default_payment_type() -> PaymentType {
    PaymentType::AnnualSubscription
}

/// Input for settling many payments.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkMarkPaidInput {
    #[validate(length(min = 1, max = 1000))]
    pub payment_ids: Vec<String>,

    #[validate(length(max = 64))]
    pub payment_method: Option<String>,
}

/// Listing filters.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentQuery {
    pub member_id: Option<String>,
    pub status: Option<PaymentStatus>,
    pub payment_type: Option<PaymentType>,
    pub subscription_year: Option<String>,
}

/// An item a bulk operation handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSuccess {
    pub id: String,
    pub payment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_number: Option<String>,
}

/// An item a bulk operation did not handle, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFailure {
    pub id: String,
    pub reason: String,
}

/// Per-item results of a bulk operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReport {
    pub succeeded: Vec<BulkSuccess>,
    pub failed: Vec<BulkFailure>,
}

impl BulkReport {
    fn fail(&mut self, id: &str, reason: impl Into<String>) {
        self.failed.push(BulkFailure {
            id: id.to_string(),
            reason: reason.into(),
        });
    }
}

/// Results of the annual dues sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoGenerateReport {
    pub generated: Vec<BulkSuccess>,
    pub skipped: Vec<BulkFailure>,
    pub failed: Vec<BulkFailure>,
}

/// Finance service for business logic.
#[derive(Clone)]
pub struct FinanceService {
    payment_repo: PaymentRepository,
    user_repo: UserRepository,
    config: FinanceConfig,
    id_gen: IdGenerator,
}

impl FinanceService {
    /// Create a new finance service.
    #[must_use]
    pub const fn new(
        payment_repo: PaymentRepository,
        user_repo: UserRepository,
        config: FinanceConfig,
    ) -> Self {
        Self {
            payment_repo,
            user_repo,
            config,
            id_gen: IdGenerator::new(),
        }
    }

    /// Ledger totals over all payments and active members.
    pub async fn overview(&self) -> AppResult<FinanceOverview> {
        let members = self.user_repo.find_active().await?;
        let payments = self.payment_repo.find_all().await?;

        let zone_of: HashMap<&str, &str> = members
            .iter()
            .map(|m| (m.id.as_str(), m.zone.as_deref().unwrap_or(UNASSIGNED_ZONE)))
            .collect();

        let mut zones: BTreeMap<&str, ZoneBreakdown> = BTreeMap::new();
        for &zone in zone_of.values() {
            zones
                .entry(zone)
                .or_insert_with(|| ZoneBreakdown {
                    zone: zone.to_string(),
                    ..ZoneBreakdown::default()
                })
                .members += 1;
        }

        let mut totals = DuesSummary::default();
        for p in &payments {
            totals.add(p);
            let zone = zone_of
                .get(p.member_id.as_str())
                .copied()
                .unwrap_or(UNASSIGNED_ZONE);
            zones
                .entry(zone)
                .or_insert_with(|| ZoneBreakdown {
                    zone: zone.to_string(),
                    ..ZoneBreakdown::default()
                })
                .totals
                .add(p);
        }

        let total_members = members.len() as u64;
        Ok(FinanceOverview {
            total_members,
            total_revenue: totals.paid_amount,
            pending_amount: totals.pending_amount,
            pending_count: totals.pending_count,
            overdue_amount: totals.overdue_amount,
            overdue_count: totals.overdue_count,
            collection_rate: collection_rate(totals.paid_count, total_members),
            zones: zones.into_values().collect(),
        })
    }

    /// Payment history and totals of one member.
    pub async fn member_dues(&self, member_id: &str) -> AppResult<MemberDues> {
        let member = self.user_repo.get_by_id(member_id).await?;
        let payments = self.payment_repo.find_by_member(member_id).await?;

        let mut summary = DuesSummary::default();
        for p in &payments {
            summary.add(p);
        }

        Ok(MemberDues {
            member: UserSummary::from(&member),
            payments: payments.into_iter().map(PaymentView::from).collect(),
            summary,
        })
    }

    pub async fn list_payments(&self, query: PaymentQuery) -> AppResult<Vec<PaymentView>> {
        let payments = self
            .payment_repo
            .list(&PaymentFilter {
                member_id: query.member_id,
                status: query.status,
                payment_type: query.payment_type,
                subscription_year: query.subscription_year,
            })
            .await?;
        Ok(payments.into_iter().map(PaymentView::from).collect())
    }

    /// Record one pending payment.
    pub async fn create_payment(
        &self,
        actor: &Claims,
        input: CreatePaymentInput,
    ) -> AppResult<PaymentView> {
        input.validate()?;

        let member = self.user_repo.get_by_id(&input.member_id).await?;
        let today = today();
        let year = input.subscription_year.or_else(|| {
            (input.payment_type == PaymentType::AnnualSubscription)
                .then(|| subscription_year(member.created_at.date_naive(), today))
        });

        let mut model = self.pending_payment(
            actor,
            &member.id,
            input.amount,
            input.payment_type,
            year,
            input.due_date.unwrap_or_else(|| self.default_due_date(today)),
            input.notes,
        );
        model.payment_method = Set(input.payment_method);

        let created = self.payment_repo.create(model).await?;
        tracing::info!(
            payment_id = %created.id,
            member_id = %created.member_id,
            amount = created.amount,
            recorded_by = %actor.sub,
            "Payment recorded"
        );
        Ok(created.into())
    }

    /// Settle one payment.
    pub async fn mark_paid(
        &self,
        actor: &Claims,
        id: &str,
        input: MarkPaidInput,
    ) -> AppResult<PaymentView> {
        input.validate()?;

        let payment = self.payment_repo.get_by_id(id).await?;
        if payment.status == PaymentStatus::Paid {
            return Err(AppError::BadRequest("Payment already paid".to_string()));
        }

        let updated = self
            .settle(actor, payment, input.payment_method, input.notes)
            .await?;
        Ok(updated.into())
    }

    /// Create one pending payment per listed member.
    pub async fn bulk_assign(&self, actor: &Claims, input: BulkAssignInput) -> AppResult<BulkReport> {
        input.validate()?;

        let members: HashMap<String, user::Model> = self
            .user_repo
            .find_by_ids(&input.member_ids)
            .await?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        let today = today();
        let amount = input
            .amount
            .unwrap_or(self.config.annual_subscription_amount);
        let due_date = input
            .due_date
            .unwrap_or_else(|| self.default_due_date(today));

        let mut report = BulkReport::default();
        for member_id in &input.member_ids {
            let Some(member) = members.get(member_id) else {
                report.fail(member_id, "Member not found");
                continue;
            };

            let year = input
                .subscription_year
                .clone()
                .unwrap_or_else(|| subscription_year(member.created_at.date_naive(), today));
            let model = self.pending_payment(
                actor,
                member_id,
                amount,
                input.payment_type,
                Some(year.clone()),
                due_date,
                input.notes.clone(),
            );

            match self.payment_repo.create(model).await {
                Ok(created) => report.succeeded.push(BulkSuccess {
                    id: member_id.clone(),
                    payment_id: created.id,
                    subscription_year: Some(year),
                    receipt_number: None,
                }),
                Err(e) => {
                    tracing::warn!(member_id = %member_id, error = %e, "Due assignment failed");
                    report.fail(member_id, e.to_string());
                }
            }
        }

        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            assigned_by = %actor.sub,
            "Bulk dues assigned"
        );
        Ok(report)
    }

    /// Settle many payments.
    pub async fn bulk_mark_paid(
        &self,
        actor: &Claims,
        input: BulkMarkPaidInput,
    ) -> AppResult<BulkReport> {
        input.validate()?;

        let mut report = BulkReport::default();
        for payment_id in &input.payment_ids {
            let payment = match self.payment_repo.find_by_id(payment_id).await {
                Ok(Some(payment)) => payment,
                Ok(None) => {
                    report.fail(payment_id, "Payment not found");
                    continue;
                }
                Err(e) => {
                    report.fail(payment_id, e.to_string());
                    continue;
                }
            };

            if payment.status == PaymentStatus::Paid {
                report.fail(payment_id, "Payment already paid");
                continue;
            }

            match self
                .settle(actor, payment, input.payment_method.clone(), None)
                .await
            {
                Ok(paid) => report.succeeded.push(BulkSuccess {
                    id: payment_id.clone(),
                    payment_id: paid.id,
                    subscription_year: paid.subscription_year,
                    receipt_number: paid.receipt_number,
                }),
                Err(e) => {
                    tracing::warn!(payment_id = %payment_id, error = %e, "Mark paid failed");
                    report.fail(payment_id, e.to_string());
                }
            }
        }

        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            recorded_by = %actor.sub,
            "Bulk payments settled"
        );
        Ok(report)
    }

    /// Create the current annual subscription for every active member
    /// registered at least a year ago who does not have one yet.
    pub async fn auto_generate(&self, actor: &Claims) -> AppResult<AutoGenerateReport> {
        let today = today();
        let members = self.user_repo.find_active().await?;
        let due_date = self.default_due_date(today);

        let mut report = AutoGenerateReport::default();
        for member in &members {
            let registered = member.created_at.date_naive();
            if anniversary(registered, registered.year() + 1) > today {
                report.skipped.push(BulkFailure {
                    id: member.id.clone(),
                    reason: "Registered less than a year ago".to_string(),
                });
                continue;
            }

            let year = subscription_year(registered, today);
            match self
                .payment_repo
                .has_annual_subscription(&member.id, &year)
                .await
            {
                Ok(true) => {
                    report.skipped.push(BulkFailure {
                        id: member.id.clone(),
                        reason: format!("Subscription for {year} already exists"),
                    });
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    report.failed.push(BulkFailure {
                        id: member.id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            }

            let model = self.pending_payment(
                actor,
                &member.id,
                self.config.annual_subscription_amount,
                PaymentType::AnnualSubscription,
                Some(year.clone()),
                due_date,
                None,
            );
            match self.payment_repo.create(model).await {
                Ok(created) => report.generated.push(BulkSuccess {
                    id: member.id.clone(),
                    payment_id: created.id,
                    subscription_year: Some(year),
                    receipt_number: None,
                }),
                Err(e) => {
                    tracing::warn!(member_id = %member.id, error = %e, "Annual due generation failed");
                    report.failed.push(BulkFailure {
                        id: member.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            generated = report.generated.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Annual dues generated"
        );
        Ok(report)
    }

    /// Move pending payments past their due date to overdue.
    pub async fn refresh_overdue(&self) -> AppResult<u64> {
        let changed = self.payment_repo.mark_overdue(today()).await?;
        if changed > 0 {
            tracing::info!(count = changed, "Payments marked overdue");
        }
        Ok(changed)
    }

    fn default_due_date(&self, today: NaiveDate) -> NaiveDate {
        today + Duration::days(self.config.due_in_days)
    }

    #[allow(clippy::too_many_arguments)]
    fn pending_payment(
        &self,
        actor: &Claims,
        member_id: &str,
        amount: i64,
        payment_type: PaymentType,
        subscription_year: Option<String>,
        due_date: NaiveDate,
        notes: Option<String>,
    ) -> payment::ActiveModel {
        payment::ActiveModel {
            id: Set(self.id_gen.generate()),
            member_id: Set(member_id.to_string()),
            amount: Set(amount),
            payment_type: Set(payment_type),
            status: Set(PaymentStatus::Pending),
            subscription_year: Set(subscription_year),
            due_date: Set(due_date),
            paid_date: Set(None),
            receipt_number: Set(None),
            payment_method: Set(None),
            notes: Set(notes),
            recorded_by: Set(actor.sub.clone()),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        }
    }

    async fn settle(
        &self,
        actor: &Claims,
        payment: payment::Model,
        payment_method: Option<String>,
        notes: Option<String>,
    ) -> AppResult<payment::Model> {
        let now = Utc::now();
        let receipt = payment
            .receipt_number
            .clone()
            .unwrap_or_else(|| receipt_number(&payment.id, now.date_naive()));

        let mut active = payment.into_active_model();
        active.status = Set(PaymentStatus::Paid);
        active.paid_date = Set(Some(now.into()));
        active.receipt_number = Set(Some(receipt));
        if payment_method.is_some() {
            active.payment_method = Set(payment_method);
        }
        if notes.is_some() {
            active.notes = Set(notes);
        }
        active.updated_at = Set(Some(now.into()));

        let paid = self.payment_repo.update(active).await?;
        tracing::info!(
            payment_id = %paid.id,
            receipt = ?paid.receipt_number,
            recorded_by = %actor.sub,
            "Payment settled"
        );
        Ok(paid)
    }
}

/// Percentage with two decimals; zero when there are no members.
#[allow(clippy::cast_precision_loss)]
fn collection_rate(paid: u64, members: u64) -> f64 {
    if members == 0 {
        return 0.0;
    }
    (paid as f64 / members as f64 * 10_000.0).round() / 100.0
}
