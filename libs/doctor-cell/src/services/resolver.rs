//! Merges a weekly template with exceptional dates into concrete UTC
//! intervals.
//!
//! For each doctor-local date the exceptional date, if any, wins over the
//! template: a blocked date yields nothing, custom hours replace the
//! template's ranges for that weekday. Ranges are then cut into slots of
//! `slot_duration_minutes` in local time and converted to UTC. Local times
//! that do not exist (DST gap) are skipped; ambiguous ones (DST overlap)
//! resolve to the earlier instant.

use std::collections::BTreeMap;
use std::iter::Peekable;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use shared_config::TrailingSlotPolicy;

use crate::models::{
    DateRange, DayOfWeek, ExceptionalDate, OpenInterval, TimeRange, WeeklyTemplate,
    DEFAULT_SLOT_DURATION_MINUTES,
};

#[derive(Debug, Clone)]
pub struct AvailabilityResolver {
    template: Option<WeeklyTemplate>,
    exceptions: BTreeMap<NaiveDate, ExceptionalDate>,
    timezone: Tz,
    slot_minutes: i64,
    policy: TrailingSlotPolicy,
}

impl AvailabilityResolver {
    pub fn new(
        template: Option<WeeklyTemplate>,
        exceptions: Vec<ExceptionalDate>,
        timezone: Tz,
        policy: TrailingSlotPolicy,
    ) -> Self {
        let slot_minutes = template
            .as_ref()
            .map(|t| t.slot_duration_minutes)
            .filter(|minutes| *minutes > 0)
            .unwrap_or(DEFAULT_SLOT_DURATION_MINUTES);

        Self {
            template,
            exceptions: exceptions.into_iter().map(|e| (e.date, e)).collect(),
            timezone,
            slot_minutes: i64::from(slot_minutes),
            policy,
        }
    }

    /// Same resolver with one exceptional date added or replaced. Used to
    /// preview the effect of an exception before storing it.
    pub fn with_exception(mut self, exception: ExceptionalDate) -> Self {
        self.exceptions.insert(exception.date, exception);
        self
    }

    /// Same resolver with the exception for `date` removed.
    pub fn without_exception(mut self, date: NaiveDate) -> Self {
        self.exceptions.remove(&date);
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Doctor-local date an instant falls on.
    pub fn local_date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }

    /// Working clock ranges in effect on `date`, after exception precedence.
    pub fn ranges_for_date(&self, date: NaiveDate) -> &[TimeRange] {
        if let Some(exception) = self.exceptions.get(&date) {
            return exception.ranges();
        }
        match &self.template {
            Some(template) => template.ranges_for(DayOfWeek::of(date)),
            None => &[],
        }
    }

    /// Quantized slots over the date range, chronological and non-overlapping.
    /// The iterator is lazy and the resolver can be queried again.
    pub fn slots(&self, range: DateRange) -> impl Iterator<Item = OpenInterval> + '_ {
        let mut last_end: Option<DateTime<Utc>> = None;
        range
            .days()
            .flat_map(move |date| self.slots_for_date(date))
            .filter(move |slot| match last_end {
                // Guards against DST folds mapping two local slots onto
                // overlapping instants.
                Some(end) if slot.start < end => false,
                _ => {
                    last_end = Some(slot.end);
                    true
                }
            })
    }

    /// Back-to-back slots of the same local date merged into maximal
    /// bookable intervals.
    pub fn open_intervals(&self, range: DateRange) -> Coalesce<impl Iterator<Item = OpenInterval> + '_> {
        Coalesce {
            inner: self.slots(range).peekable(),
        }
    }

    pub fn open_intervals_for_date(&self, date: NaiveDate) -> Vec<OpenInterval> {
        self.open_intervals(DateRange::single(date)).collect()
    }

    /// True when `[start, end)` is exactly a run of back-to-back slots on the
    /// local date on which it starts: `start` is a slot start, `end` a slot
    /// end, and no gap lies between them.
    pub fn covers(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        if start >= end {
            return false;
        }
        let date = self.local_date_of(start);
        let mut run_end: Option<DateTime<Utc>> = None;

        for slot in self.slots(DateRange::single(date)) {
            match run_end {
                None if slot.start == start => {}
                None if slot.start > start => return false,
                None => continue,
                Some(previous) if slot.start != previous => return false,
                Some(_) => {}
            }
            if slot.end == end {
                return true;
            }
            if slot.end > end {
                return false;
            }
            run_end = Some(slot.end);
        }
        false
    }

    fn slots_for_date(&self, date: NaiveDate) -> impl Iterator<Item = OpenInterval> + '_ {
        self.ranges_for_date(date)
            .iter()
            .flat_map(move |range| self.quantize(date, *range))
    }

    fn quantize(&self, date: NaiveDate, range: TimeRange) -> impl Iterator<Item = OpenInterval> + '_ {
        let step = Duration::minutes(self.slot_minutes);
        let (mut cursor, range_end) = range.on(date);

        std::iter::from_fn(move || {
            while cursor < range_end {
                let local_start = cursor;
                let full_end = local_start + step;
                let local_end = if full_end <= range_end {
                    full_end
                } else if self.policy == TrailingSlotPolicy::EmitShort {
                    range_end
                } else {
                    cursor = range_end;
                    return None;
                };
                cursor = local_end;

                if let Some(slot) = self.to_utc(date, local_start, local_end) {
                    return Some(slot);
                }
            }
            None
        })
    }

    fn to_utc(
        &self,
        date: NaiveDate,
        local_start: NaiveDateTime,
        local_end: NaiveDateTime,
    ) -> Option<OpenInterval> {
        let start = self
            .timezone
            .from_local_datetime(&local_start)
            .earliest()?
            .with_timezone(&Utc);
        // An end inside a DST gap keeps the slot's elapsed length.
        let end = self
            .timezone
            .from_local_datetime(&local_end)
            .earliest()
            .map(|end| end.with_timezone(&Utc))
            .unwrap_or(start + (local_end - local_start));

        (start < end).then_some(OpenInterval {
            start,
            end,
            local_date: date,
        })
    }
}

/// Iterator adaptor behind [`AvailabilityResolver::open_intervals`].
pub struct Coalesce<I: Iterator<Item = OpenInterval>> {
    inner: Peekable<I>,
}

impl<I: Iterator<Item = OpenInterval>> Iterator for Coalesce<I> {
    type Item = OpenInterval;

    fn next(&mut self) -> Option<Self::Item> {
        let mut current = self.inner.next()?;
        while let Some(next) = self
            .inner
            .next_if(|n| n.local_date == current.local_date && n.start == current.end)
        {
            current.end = next.end;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DaySchedule, ExceptionKind};
    use uuid::Uuid;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
    }

    fn template(slot: u32, ranges: Vec<TimeRange>) -> WeeklyTemplate {
        WeeklyTemplate {
            doctor_id: Uuid::nil(),
            slot_duration_minutes: slot,
            days: vec![DaySchedule { day: DayOfWeek::Monday, ranges }],
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn trailing_partial_slot_follows_policy() {
        let ranges = vec![TimeRange::hm(9, 0, 10, 10).unwrap()];

        let dropping = AvailabilityResolver::new(
            Some(template(30, ranges.clone())),
            vec![],
            Tz::UTC,
            TrailingSlotPolicy::Drop,
        );
        let slots: Vec<_> = dropping.slots(DateRange::single(monday())).collect();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].end.format("%H:%M").to_string(), "10:00");

        let emitting = AvailabilityResolver::new(
            Some(template(30, ranges)),
            vec![],
            Tz::UTC,
            TrailingSlotPolicy::EmitShort,
        );
        let slots: Vec<_> = emitting.slots(DateRange::single(monday())).collect();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[2].duration_minutes(), 10);
    }

    #[test]
    fn custom_hours_replace_template_for_that_date() {
        let exception = ExceptionalDate {
            id: Uuid::new_v4(),
            doctor_id: Uuid::nil(),
            date: monday(),
            kind: ExceptionKind::CustomHours,
            custom_ranges: vec![TimeRange::hm(14, 0, 15, 0).unwrap()],
            reason: None,
            created_at: Utc::now(),
        };
        let resolver = AvailabilityResolver::new(
            Some(template(30, vec![TimeRange::hm(9, 0, 12, 0).unwrap()])),
            vec![exception],
            Tz::UTC,
            TrailingSlotPolicy::Drop,
        );

        let intervals = resolver.open_intervals_for_date(monday());
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].start.format("%H:%M").to_string(), "14:00");
        assert_eq!(intervals[0].duration_minutes(), 60);

        let restored = resolver.without_exception(monday());
        assert_eq!(restored.open_intervals_for_date(monday())[0].duration_minutes(), 180);
    }

    #[test]
    fn converts_local_hours_using_doctor_timezone() {
        let resolver = AvailabilityResolver::new(
            Some(template(60, vec![TimeRange::hm(9, 0, 10, 0).unwrap()])),
            vec![],
            chrono_tz::America::New_York,
            TrailingSlotPolicy::Drop,
        );

        let slots: Vec<_> = resolver.slots(DateRange::single(monday())).collect();
        assert_eq!(slots.len(), 1);
        // EST is UTC-5 in January.
        assert_eq!(slots[0].start.format("%H:%M").to_string(), "14:00");
        assert_eq!(slots[0].local_date, monday());
    }
}
