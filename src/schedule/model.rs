use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const TIME_FMT: &str = "%H:%M";
pub const DATE_FMT: &str = "%Y-%m-%d";

pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, TIME_FMT)
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FMT).ok()
}

pub fn fmt_time(t: NaiveTime) -> String {
    t.format(TIME_FMT).to_string()
}

pub fn fmt_date(d: NaiveDate) -> String {
    d.format(DATE_FMT).to_string()
}

pub fn fmt_stamp(at: NaiveDateTime) -> String {
    at.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// 0 = Sunday .. 6 = Saturday.
pub fn weekday_index(d: NaiveDate) -> u8 {
    d.weekday().num_days_from_sunday() as u8
}

pub(crate) mod hhmm {
    use chrono::NaiveTime;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::fmt_time(*t))
    }
}

pub(crate) mod ymd {
    use chrono::NaiveDate;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::fmt_date(*d))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Teacher,
    Parent,
}

/// Caller identity as established by the request layer. Trusted as-is.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub tenant_id: String,
    pub role: Role,
    pub actor_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    Teacher,
    Room,
}

impl ResourceKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TEACHER" => Some(Self::Teacher),
            "ROOM" => Some(Self::Room),
            _ => None,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::Teacher => "teacher_id",
            Self::Room => "room_id",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Teacher => "teacher",
            Self::Room => "room",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LessonCategory {
    Individual,
    Group,
    Band,
    Hybrid,
}

impl LessonCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INDIVIDUAL" => Some(Self::Individual),
            "GROUP" => Some(Self::Group),
            "BAND" => Some(Self::Band),
            "HYBRID" => Some(Self::Hybrid),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Individual => "INDIVIDUAL",
            Self::Group => "GROUP",
            Self::Band => "BAND",
            Self::Hybrid => "HYBRID",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternKind {
    Alternating,
    Custom,
}

impl PatternKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALTERNATING" => Some(Self::Alternating),
            "CUSTOM" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alternating => "ALTERNATING",
            Self::Custom => "CUSTOM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeekKind {
    Group,
    Individual,
    Unscheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "CONFIRMED" => Some(Self::Confirmed),
            "CANCELLED" => Some(Self::Cancelled),
            "COMPLETED" => Some(Self::Completed),
            "NO_SHOW" => Some(Self::NoShow),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
            Self::Completed => "COMPLETED",
            Self::NoShow => "NO_SHOW",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::NoShow)
    }

    /// Legal edges of the booking lifecycle.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, NoShow)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub id: String,
    pub name: String,
    #[serde(with = "ymd")]
    pub start_date: NaiveDate,
    #[serde(with = "ymd")]
    pub end_date: NaiveDate,
    pub total_weeks: u32,
}

impl Term {
    pub fn weeks_between(start: NaiveDate, end: NaiveDate) -> u32 {
        ((end - start).num_days().max(0) / 7 + 1) as u32
    }

    pub fn contains(&self, d: NaiveDate) -> bool {
        self.start_date <= d && d <= self.end_date
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub name: String,
    pub teacher_id: String,
    pub room_id: String,
    pub term_id: String,
    pub day_of_week: u8,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub duration_minutes: i64,
    pub category: LessonCategory,
    pub capacity: i64,
    pub active: bool,
}

impl Lesson {
    pub fn summary(&self) -> LessonRef {
        LessonRef {
            id: self.id.clone(),
            name: self.name.clone(),
            day_of_week: self.day_of_week,
            start_time: fmt_time(self.start_time),
            end_time: fmt_time(self.end_time),
        }
    }
}

/// Compact lesson identity used in conflict reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRef {
    pub id: String,
    pub name: String,
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridPattern {
    pub lesson_id: String,
    pub term_id: String,
    pub kind: PatternKind,
    pub group_weeks: BTreeSet<u32>,
    pub individual_weeks: BTreeSet<u32>,
    pub slot_duration_minutes: i64,
    pub booking_deadline_hours: i64,
    pub booking_open: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub lesson_id: String,
    pub student_id: String,
    pub parent_id: String,
    pub week_number: u32,
    #[serde(with = "ymd")]
    pub scheduled_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub status: BookingStatus,
    pub cancellation_reason: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub lesson_id: String,
    pub student_id: String,
    pub student_name: String,
    pub enrolled_at: String,
}
