use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Slot length used when a doctor has custom hours but no weekly template yet.
pub const DEFAULT_SLOT_DURATION_MINUTES: u32 = 30;

// ==============================================================================
// CALENDAR PRIMITIVES
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl From<Weekday> for DayOfWeek {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

impl DayOfWeek {
    pub fn of(date: NaiveDate) -> Self {
        date.weekday().into()
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DayOfWeek::Monday => "monday",
            DayOfWeek::Tuesday => "tuesday",
            DayOfWeek::Wednesday => "wednesday",
            DayOfWeek::Thursday => "thursday",
            DayOfWeek::Friday => "friday",
            DayOfWeek::Saturday => "saturday",
            DayOfWeek::Sunday => "sunday",
        };
        write!(f, "{}", name)
    }
}

/// Clock-time range within a single day, half-open `[start, end)`.
///
/// An `end` of 00:00 closes the range at the following midnight, so
/// 22:00-00:00 is the last two hours of the day and 00:00-00:00 the whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Convenience for whole-minute ranges; `None` for invalid clock values.
    pub fn hm(start_hour: u32, start_minute: u32, end_hour: u32, end_minute: u32) -> Option<Self> {
        Some(Self {
            start: NaiveTime::from_hms_opt(start_hour, start_minute, 0)?,
            end: NaiveTime::from_hms_opt(end_hour, end_minute, 0)?,
        })
    }

    /// Offset of `start` from the day's first midnight.
    pub fn start_offset(&self) -> Duration {
        self.start - NaiveTime::MIN
    }

    /// Offset of `end` from the day's first midnight; 00:00 reads as 24:00.
    pub fn end_offset(&self) -> Duration {
        if self.end == NaiveTime::MIN {
            Duration::days(1)
        } else {
            self.end - NaiveTime::MIN
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start_offset() >= self.end_offset()
    }

    pub fn duration(&self) -> Duration {
        self.end_offset() - self.start_offset()
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start_offset() < other.end_offset() && other.start_offset() < self.end_offset()
    }

    /// Local wall-clock bounds of the range on `date`.
    pub fn on(&self, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        let midnight = date.and_time(NaiveTime::MIN);
        (midnight + self.start_offset(), midnight + self.end_offset())
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// Inclusive calendar-date range in doctor-local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    pub fn single(date: NaiveDate) -> Self {
        Self { from: date, to: date }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// Number of calendar days covered, zero when `to < from`.
    pub fn len_days(&self) -> i64 {
        ((self.to - self.from).num_days() + 1).max(0)
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let to = self.to;
        self.from.iter_days().take_while(move |date| *date <= to)
    }
}

// ==============================================================================
// DOCTOR & TEMPLATE MODELS
// ==============================================================================

/// The slice of a doctor record the scheduling engine needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorProfile {
    pub id: Uuid,
    pub timezone: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl DoctorProfile {
    pub fn new(id: Uuid, timezone: &str) -> Self {
        Self {
            id,
            timezone: Some(timezone.to_string()),
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub day: DayOfWeek,
    pub ranges: Vec<TimeRange>,
}

/// Recurring weekly working hours of one doctor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyTemplate {
    pub doctor_id: Uuid,
    pub slot_duration_minutes: u32,
    /// Sorted by day, at most one entry per day.
    pub days: Vec<DaySchedule>,
    pub updated_at: DateTime<Utc>,
}

impl WeeklyTemplate {
    /// Template of a doctor who never published hours.
    pub fn empty(doctor_id: Uuid, updated_at: DateTime<Utc>) -> Self {
        Self {
            doctor_id,
            slot_duration_minutes: DEFAULT_SLOT_DURATION_MINUTES,
            days: Vec::new(),
            updated_at,
        }
    }

    pub fn ranges_for(&self, day: DayOfWeek) -> &[TimeRange] {
        self.days
            .iter()
            .find(|entry| entry.day == day)
            .map(|entry| entry.ranges.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    FullyBlocked,
    CustomHours,
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionKind::FullyBlocked => write!(f, "fully_blocked"),
            ExceptionKind::CustomHours => write!(f, "custom_hours"),
        }
    }
}

/// One-off override of the weekly template for a single local date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionalDate {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub kind: ExceptionKind,
    #[serde(default)]
    pub custom_ranges: Vec<TimeRange>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExceptionalDate {
    /// Working ranges this exception grants; empty when blocked.
    pub fn ranges(&self) -> &[TimeRange] {
        match self.kind {
            ExceptionKind::FullyBlocked => &[],
            ExceptionKind::CustomHours => &self.custom_ranges,
        }
    }
}

// ==============================================================================
// RESOLVED AVAILABILITY
// ==============================================================================

/// A concrete bookable interval `[start, end)` in UTC, tagged with the
/// doctor-local date it belongs to. Used both for quantized slots and for
/// coalesced open intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub local_date: NaiveDate,
}

impl OpenInterval {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn intersects(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

/// An active appointment as seen from the schedule side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedInterval {
    pub appointment_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

// ==============================================================================
// REQUEST DTOS
// ==============================================================================

/// Full replacement of a doctor's weekly template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetWeeklyScheduleRequest {
    pub slot_duration_minutes: u32,
    pub days: Vec<DaySchedule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddExceptionalDateRequest {
    pub date: NaiveDate,
    pub kind: ExceptionKind,
    pub custom_ranges: Option<Vec<TimeRange>>,
    pub reason: Option<String>,
}
