use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = user_preferences)]
#[diesel(primary_key(user_id))]
pub struct PreferenceRow {
    pub user_id: String,
    pub email: String,
    pub industry: String,
    pub tone: String,
    pub template_format: String,
    pub template_style: String,
    pub temperature: f64,
    pub delivery_time: Option<String>,
    pub timezone: Option<String>,
    pub auto_generate: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = user_preferences)]
#[diesel(treat_none_as_null = true)]
pub struct UpsertPreferenceRow {
    pub user_id: String,
    pub email: String,
    pub industry: String,
    pub tone: String,
    pub template_format: String,
    pub template_style: String,
    pub temperature: f64,
    pub delivery_time: Option<String>,
    pub timezone: Option<String>,
    pub auto_generate: bool,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = delivery_history)]
pub struct HistoryRow {
    pub id: Uuid,
    pub user_id: String,
    pub email: String,
    pub industry: String,
    pub title: String,
    pub body: String,
    pub template_format: String,
    pub template_style: String,
    pub tone: String,
    pub trigger_kind: String,
    pub occasion_date: Option<NaiveDate>,
    pub content_digest: String,
    pub sent_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = delivery_history)]
pub struct NewHistoryRow {
    pub id: Uuid,
    pub user_id: String,
    pub email: String,
    pub industry: String,
    pub title: String,
    pub body: String,
    pub template_format: String,
    pub template_style: String,
    pub tone: String,
    pub trigger_kind: String,
    pub occasion_date: Option<NaiveDate>,
    pub content_digest: String,
    pub sent_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = occasion_claims)]
#[diesel(primary_key(user_id, occasion_date))]
pub struct OccasionClaim {
    pub user_id: String,
    pub occasion_date: NaiveDate,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub claimed_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = occasion_claims)]
pub struct NewOccasionClaim {
    pub user_id: String,
    pub occasion_date: NaiveDate,
    pub status: String,
    pub attempts: i32,
    pub claimed_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = subscriptions)]
#[diesel(primary_key(email))]
pub struct SubscriptionRow {
    pub email: String,
    pub status: String,
    pub current_period_end: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}
