//! Validation and normalisation of weekly templates and exceptional dates.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::models::{
    AddExceptionalDateRequest, DaySchedule, ExceptionKind, ExceptionalDate,
    SetWeeklyScheduleRequest, TimeRange, WeeklyTemplate,
};

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Ranges must each be non-empty, sorted by start and pairwise disjoint.
/// Back-to-back ranges (`a.end == b.start`) are allowed.
pub fn validate_ranges(ranges: &[TimeRange]) -> Result<(), ScheduleError> {
    for range in ranges {
        if range.is_empty() {
            return Err(ScheduleError::Validation(format!(
                "Time range {} must start before it ends",
                range
            )));
        }
    }

    for pair in ranges.windows(2) {
        let (previous, next) = (&pair[0], &pair[1]);
        if next.start < previous.start {
            return Err(ScheduleError::Validation(format!(
                "Time ranges must be sorted: {} comes after {}",
                next, previous
            )));
        }
        if previous.overlaps(next) {
            return Err(ScheduleError::Validation(format!(
                "Time ranges {} and {} overlap",
                previous, next
            )));
        }
    }

    Ok(())
}

pub fn validate_slot_duration(minutes: u32) -> Result<(), ScheduleError> {
    if minutes == 0 || minutes > MINUTES_PER_DAY {
        return Err(ScheduleError::Validation(format!(
            "Slot duration must be between 1 and {} minutes, got {}",
            MINUTES_PER_DAY, minutes
        )));
    }
    Ok(())
}

/// Builds the replacement template. Days are sorted, empty days dropped and a
/// day listed twice is rejected rather than merged.
pub fn build_weekly_template(
    doctor_id: Uuid,
    request: SetWeeklyScheduleRequest,
    now: DateTime<Utc>,
) -> Result<WeeklyTemplate, ScheduleError> {
    validate_slot_duration(request.slot_duration_minutes)?;

    let mut days: Vec<DaySchedule> = Vec::with_capacity(request.days.len());
    for entry in request.days {
        if days.iter().any(|existing| existing.day == entry.day) {
            return Err(ScheduleError::Validation(format!(
                "Day {} appears more than once",
                entry.day
            )));
        }
        validate_ranges(&entry.ranges)
            .map_err(|e| ScheduleError::Validation(format!("{}: {}", entry.day, strip_prefix(e))))?;
        days.push(entry);
    }

    days.retain(|entry| !entry.ranges.is_empty());
    days.sort_by_key(|entry| entry.day);

    Ok(WeeklyTemplate {
        doctor_id,
        slot_duration_minutes: request.slot_duration_minutes,
        days,
        updated_at: now,
    })
}

pub fn build_exceptional_date(
    doctor_id: Uuid,
    request: AddExceptionalDateRequest,
    now: DateTime<Utc>,
) -> Result<ExceptionalDate, ScheduleError> {
    let custom_ranges = request.custom_ranges.unwrap_or_default();

    match request.kind {
        ExceptionKind::FullyBlocked if !custom_ranges.is_empty() => {
            return Err(ScheduleError::Validation(
                "A fully blocked date cannot carry custom ranges".to_string(),
            ));
        }
        ExceptionKind::CustomHours if custom_ranges.is_empty() => {
            return Err(ScheduleError::Validation(
                "Custom hours require at least one time range".to_string(),
            ));
        }
        _ => {}
    }
    validate_ranges(&custom_ranges)?;

    Ok(ExceptionalDate {
        id: Uuid::new_v4(),
        doctor_id,
        date: request.date,
        kind: request.kind,
        custom_ranges,
        reason: request.reason.filter(|reason| !reason.trim().is_empty()),
        created_at: now,
    })
}

fn strip_prefix(error: ScheduleError) -> String {
    match error {
        ScheduleError::Validation(msg) => msg,
        other => other.to_string(),
    }
}
