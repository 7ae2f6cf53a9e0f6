//! Duty chart service.
//!
//! Person fields arrive as free text. Anything shaped like a user id is
//! checked against the user table in the same transaction as the write;
//! everything else is stored verbatim and shown as-is.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use sea_orm::{IntoActiveModel, Set};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use super::auth::Claims;
use super::notification::NotificationService;
use super::user::UserSummary;
use khidmat_common::{AppError, AppResult, IdGenerator};
use khidmat_db::{
    entities::{
        duty_chart::{self, Assignment, MemberRef},
        notification::NotificationType,
        user::Role,
    },
    repositories::{DutyChartFilter, DutyChartRepository, UserRepository},
};

/// One assignment row as submitted.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentInput {
    #[validate(length(min = 1, max = 256))]
    pub location: String,

    #[validate(length(max = 256))]
    pub area: Option<String>,

    #[validate(length(max = 512))]
    pub task: Option<String>,

    pub officer: Option<String>,

    pub sub_officer: Option<String>,

    #[validate(length(max = 128))]
    pub team: Option<String>,

    #[serde(default)]
    pub members: Vec<String>,
}

/// Input for creating a duty chart.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDutyChartInput {
    #[validate(length(min = 1, max = 256))]
    pub event_name: String,

    #[validate(length(max = 256))]
    pub title: Option<String>,

    pub date: NaiveDate,

    #[validate(length(min = 1, max = 32))]
    pub reporting_time: String,

    #[validate(length(min = 1, max = 256))]
    pub dress_code: String,

    #[validate(length(min = 1, max = 256))]
    pub in_charge: String,

    pub captain: Option<String>,

    pub vice_captain: Option<String>,

    #[serde(default)]
    #[validate(nested)]
    pub assignments: Vec<AssignmentInput>,

    #[validate(length(max = 4000))]
    pub remarks: Option<String>,
}

/// Input for updating a duty chart. Absent fields are left alone; a supplied
/// `assignments` array replaces the stored one.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDutyChartInput {
    #[validate(length(min = 1, max = 256))]
    pub event_name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub title: Option<Option<String>>,

    pub date: Option<NaiveDate>,

    #[validate(length(min = 1, max = 32))]
    pub reporting_time: Option<String>,

    #[validate(length(min = 1, max = 256))]
    pub dress_code: Option<String>,

    #[validate(length(min = 1, max = 256))]
    pub in_charge: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub captain: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub vice_captain: Option<Option<String>>,

    #[validate(nested)]
    pub assignments: Option<Vec<AssignmentInput>>,

    #[serde(default, deserialize_with = "double_option")]
    pub remarks: Option<Option<String>>,
}

/// Distinguish an explicit `null` (clear) from an absent field (keep).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Listing filters.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DutyChartQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Matched against event name, title and assignment tasks.
    pub search: Option<String>,
}

/// A person field with user references expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PersonView {
    User(UserSummary),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentView {
    pub location: String,
    pub area: Option<String>,
    pub task: Option<String>,
    pub officer: Option<PersonView>,
    pub sub_officer: Option<PersonView>,
    pub team: Option<String>,
    pub members: Vec<PersonView>,
}

/// A duty chart ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DutyChartView {
    pub id: String,
    pub event_name: String,
    pub title: Option<String>,
    pub date: NaiveDate,
    pub reporting_time: String,
    pub dress_code: String,
    pub in_charge: PersonView,
    pub captain: Option<PersonView>,
    pub vice_captain: Option<PersonView>,
    pub assignments: Vec<AssignmentView>,
    pub remarks: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: Option<DateTime<FixedOffset>>,
}

/// Classify one submitted person field. Blank input means "no one".
#[must_use]
pub fn parse_member_ref(raw: &str) -> Option<MemberRef> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else if IdGenerator::is_valid(trimmed) {
        Some(MemberRef::Resolved(trimmed.to_lowercase()))
    } else {
        Some(MemberRef::Unresolved(trimmed.to_string()))
    }
}

fn parse_optional(raw: Option<&str>) -> Option<MemberRef> {
    raw.and_then(parse_member_ref)
}

fn parse_assignments(inputs: Vec<AssignmentInput>) -> Vec<Assignment> {
    inputs
        .into_iter()
        .map(|a| Assignment {
            location: a.location.trim().to_string(),
            area: a.area,
            task: a.task,
            officer: parse_optional(a.officer.as_deref()),
            sub_officer: parse_optional(a.sub_officer.as_deref()),
            team: a.team,
            members: a.members.iter().filter_map(|m| parse_member_ref(m)).collect(),
        })
        .collect()
}

/// Collects user ids from person fields, first occurrence order, no repeats.
#[derive(Default)]
struct IdCollector(Vec<String>);

impl IdCollector {
    fn add(&mut self, member: Option<&MemberRef>) {
        if let Some(id) = member.and_then(MemberRef::user_id) {
            if !self.0.iter().any(|seen| seen == id) {
                self.0.push(id.to_string());
            }
        }
    }

    fn add_assignments(&mut self, assignments: &[Assignment]) {
        for a in assignments {
            self.add(a.officer.as_ref());
            self.add(a.sub_officer.as_ref());
            for m in &a.members {
                self.add(Some(m));
            }
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> AppResult<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(format!("Failed to encode duty chart: {e}")))
}

/// Duty chart service for business logic.
#[derive(Clone)]
pub struct DutyChartService {
    chart_repo: DutyChartRepository,
    user_repo: UserRepository,
    notifications: NotificationService,
    id_gen: IdGenerator,
}

impl DutyChartService {
    /// Create a new duty chart service.
    #[must_use]
    pub const fn new(
        chart_repo: DutyChartRepository,
        user_repo: UserRepository,
        notifications: NotificationService,
    ) -> Self {
        Self {
            chart_repo,
            user_repo,
            notifications,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a chart and announce it to active users.
    pub async fn create(
        &self,
        actor: &Claims,
        input: CreateDutyChartInput,
    ) -> AppResult<DutyChartView> {
        input.validate()?;

        let in_charge = parse_member_ref(&input.in_charge)
            .ok_or_else(|| AppError::Validation("inCharge is required".to_string()))?;
        let captain = parse_optional(input.captain.as_deref());
        let vice_captain = parse_optional(input.vice_captain.as_deref());
        let assignments = parse_assignments(input.assignments);

        let mut ids = IdCollector::default();
        ids.add(Some(&in_charge));
        ids.add(captain.as_ref());
        ids.add(vice_captain.as_ref());
        ids.add_assignments(&assignments);

        let event_name = input.event_name.trim().to_string();
        let model = duty_chart::ActiveModel {
            id: Set(self.id_gen.generate()),
            event_name: Set(event_name.clone()),
            title: Set(input.title),
            date: Set(input.date),
            reporting_time: Set(input.reporting_time.trim().to_string()),
            dress_code: Set(input.dress_code.trim().to_string()),
            in_charge: Set(to_json(&in_charge)?),
            captain: Set(captain.as_ref().map(to_json).transpose()?),
            vice_captain: Set(vice_captain.as_ref().map(to_json).transpose()?),
            assignments: Set(to_json(&assignments)?),
            remarks: Set(input.remarks),
            created_by: Set(actor.sub.clone()),
            created_at: Set(chrono::Utc::now().into()),
            updated_at: Set(None),
        };

        let chart = self.chart_repo.insert_checked(model, &ids.0).await?;
        tracing::info!(chart_id = %chart.id, created_by = %actor.sub, "Duty chart created");

        self.notifications
            .broadcast_best_effort(
                NotificationType::Duty,
                format!("New duty chart: {event_name} on {}", chart.date),
                &actor.sub,
            )
            .await;

        self.view(chart).await
    }

    /// Update a chart. Only person fields present in the input are checked.
    pub async fn update(
        &self,
        actor: &Claims,
        id: &str,
        input: UpdateDutyChartInput,
    ) -> AppResult<DutyChartView> {
        input.validate()?;

        let chart = self.chart_repo.get_by_id(id).await?;
        let mut ids = IdCollector::default();
        let mut active = chart.into_active_model();

        if let Some(event_name) = input.event_name {
            active.event_name = Set(event_name.trim().to_string());
        }
        if let Some(title) = input.title {
            active.title = Set(title);
        }
        if let Some(date) = input.date {
            active.date = Set(date);
        }
        if let Some(reporting_time) = input.reporting_time {
            active.reporting_time = Set(reporting_time.trim().to_string());
        }
        if let Some(dress_code) = input.dress_code {
            active.dress_code = Set(dress_code.trim().to_string());
        }
        if let Some(raw) = input.in_charge {
            let in_charge = parse_member_ref(&raw)
                .ok_or_else(|| AppError::Validation("inCharge is required".to_string()))?;
            ids.add(Some(&in_charge));
            active.in_charge = Set(to_json(&in_charge)?);
        }
        if let Some(raw) = input.captain {
            let captain = parse_optional(raw.as_deref());
            ids.add(captain.as_ref());
            active.captain = Set(captain.as_ref().map(to_json).transpose()?);
        }
        if let Some(raw) = input.vice_captain {
            let vice_captain = parse_optional(raw.as_deref());
            ids.add(vice_captain.as_ref());
            active.vice_captain = Set(vice_captain.as_ref().map(to_json).transpose()?);
        }
        if let Some(inputs) = input.assignments {
            let assignments = parse_assignments(inputs);
            ids.add_assignments(&assignments);
            active.assignments = Set(to_json(&assignments)?);
        }
        if let Some(remarks) = input.remarks {
            active.remarks = Set(remarks);
        }

        active.updated_at = Set(Some(chrono::Utc::now().into()));

        let chart = self.chart_repo.update_checked(active, &ids.0).await?;
        tracing::info!(chart_id = %chart.id, updated_by = %actor.sub, "Duty chart updated");

        self.view(chart).await
    }

    /// List charts. Members only see charts that list them in an assignment.
    pub async fn list(
        &self,
        caller: &Claims,
        query: &DutyChartQuery,
    ) -> AppResult<Vec<DutyChartView>> {
        let mut charts = self
            .chart_repo
            .list(DutyChartFilter {
                date_from: query.date_from,
                date_to: query.date_to,
            })
            .await?;

        if caller.role == Role::Member {
            charts.retain(|c| c.has_member(&caller.sub));
        }

        if let Some(term) = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let term = term.to_lowercase();
            charts.retain(|c| matches_search(c, &term));
        }

        self.views(charts).await
    }

    /// Fetch one chart. Members may only fetch charts they are assigned to.
    pub async fn get(&self, caller: &Claims, id: &str) -> AppResult<DutyChartView> {
        let chart = self.chart_repo.get_by_id(id).await?;

        if caller.role == Role::Member && !chart.has_member(&caller.sub) {
            return Err(AppError::Forbidden(
                "You are not assigned to this duty chart".to_string(),
            ));
        }

        self.view(chart).await
    }

    /// Delete a chart.
    pub async fn delete(&self, actor: &Claims, id: &str) -> AppResult<()> {
        if !self.chart_repo.delete(id).await? {
            return Err(AppError::NotFound(format!("Duty chart {id}")));
        }
        tracing::info!(chart_id = %id, deleted_by = %actor.sub, "Duty chart deleted");
        Ok(())
    }

    async fn view(&self, chart: duty_chart::Model) -> AppResult<DutyChartView> {
        let mut views = self.views(vec![chart]).await?;
        views
            .pop()
            .ok_or_else(|| AppError::Internal("Duty chart view missing".to_string()))
    }

    /// Expand resolved references with one batched user lookup. Ids that no
    /// longer resolve are shown as raw strings.
    async fn views(&self, charts: Vec<duty_chart::Model>) -> AppResult<Vec<DutyChartView>> {
        let mut decoded = Vec::with_capacity(charts.len());
        let mut ids = IdCollector::default();

        for chart in charts {
            let in_charge = chart.in_charge_ref()?;
            let captain = chart.captain_ref()?;
            let vice_captain = chart.vice_captain_ref()?;
            let assignments = chart.assignment_list()?;

            ids.add(Some(&in_charge));
            ids.add(captain.as_ref());
            ids.add(vice_captain.as_ref());
            ids.add_assignments(&assignments);

            decoded.push((chart, in_charge, captain, vice_captain, assignments));
        }

        let users: HashMap<String, UserSummary> = self
            .user_repo
            .find_by_ids(&ids.0)
            .await?
            .iter()
            .map(|u| (u.id.clone(), UserSummary::from(u)))
            .collect();

        let person = |member: &MemberRef| match member.user_id().and_then(|id| users.get(id)) {
            Some(summary) => PersonView::User(summary.clone()),
            None => PersonView::Raw(member.as_str().to_string()),
        };

        Ok(decoded
            .into_iter()
            .map(|(chart, in_charge, captain, vice_captain, assignments)| DutyChartView {
                in_charge: person(&in_charge),
                captain: captain.as_ref().map(person),
                vice_captain: vice_captain.as_ref().map(person),
                assignments: assignments
                    .iter()
                    .map(|a| AssignmentView {
                        location: a.location.clone(),
                        area: a.area.clone(),
                        task: a.task.clone(),
                        officer: a.officer.as_ref().map(person),
                        sub_officer: a.sub_officer.as_ref().map(person),
                        team: a.team.clone(),
                        members: a.members.iter().map(person).collect(),
                    })
                    .collect(),
                id: chart.id,
                event_name: chart.event_name,
                title: chart.title,
                date: chart.date,
                reporting_time: chart.reporting_time,
                dress_code: chart.dress_code,
                remarks: chart.remarks,
                created_by: chart.created_by,
                created_at: chart.created_at,
                updated_at: chart.updated_at,
            })
            .collect())
    }
}

fn matches_search(chart: &duty_chart::Model, term: &str) -> bool {
    let contains = |s: &str| s.to_lowercase().contains(term);

    contains(&chart.event_name)
        || chart.title.as_deref().is_some_and(contains)
        || chart.assignment_list().is_ok_and(|list| {
            list.iter()
                .any(|a| a.task.as_deref().is_some_and(contains))
        })
}
