use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::{AppConfig, TrailingSlotPolicy};
use shared_utils::clock::{Clock, SystemClock};

use crate::error::ScheduleError;
use crate::models::{
    AddExceptionalDateRequest, BookedInterval, DateRange, DoctorProfile, ExceptionalDate,
    OpenInterval, SetWeeklyScheduleRequest, WeeklyTemplate,
};
use crate::services::locks::DoctorLocks;
use crate::services::resolver::AvailabilityResolver;
use crate::services::store::{BookingLedger, ScheduleStore};
use crate::services::template::{build_exceptional_date, build_weekly_template};

/// Weekly templates, exceptional dates and the availability derived from
/// them.
pub struct ScheduleService {
    store: Arc<dyn ScheduleStore>,
    ledger: Arc<dyn BookingLedger>,
    locks: DoctorLocks,
    clock: Arc<dyn Clock>,
    policy: TrailingSlotPolicy,
    max_range_days: i64,
    default_timezone: Tz,
}

impl ScheduleService {
    /// `ledger` is where exception changes and slot listings see existing
    /// bookings.
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        ledger: Arc<dyn BookingLedger>,
        config: &AppConfig,
    ) -> Self {
        let default_timezone = config
            .default_doctor_timezone
            .parse::<Tz>()
            .unwrap_or_else(|_| {
                warn!(
                    "DEFAULT_DOCTOR_TIMEZONE '{}' is not a valid IANA zone, using UTC",
                    config.default_doctor_timezone
                );
                Tz::UTC
            });

        Self {
            store,
            ledger,
            locks: DoctorLocks::new(),
            clock: Arc::new(SystemClock),
            policy: config.trailing_slot_policy,
            max_range_days: config.availability_range_days(),
            default_timezone,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Lock registry shared with the booking side.
    pub fn locks(&self) -> &DoctorLocks {
        &self.locks
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ==========================================================================
    // DOCTORS
    // ==========================================================================

    pub async fn get_doctor(&self, doctor_id: Uuid) -> Result<DoctorProfile, ScheduleError> {
        self.store
            .get_doctor(doctor_id)
            .await?
            .ok_or(ScheduleError::DoctorNotFound(doctor_id))
    }

    pub fn timezone_of(&self, doctor: &DoctorProfile) -> Result<Tz, ScheduleError> {
        match doctor.timezone.as_deref().map(str::trim) {
            None | Some("") => Ok(self.default_timezone),
            Some(name) => name.parse::<Tz>().map_err(|_| {
                ScheduleError::Validation(format!(
                    "Doctor {} has an unknown timezone '{}'",
                    doctor.id, name
                ))
            }),
        }
    }

    // ==========================================================================
    // WEEKLY TEMPLATE
    // ==========================================================================

    /// Stored template, or an empty one when the doctor never published hours.
    pub async fn get_weekly_schedule(&self, doctor_id: Uuid) -> Result<WeeklyTemplate, ScheduleError> {
        let doctor = self.get_doctor(doctor_id).await?;
        let template = self.store.get_weekly_template(doctor.id).await?;
        Ok(template.unwrap_or_else(|| WeeklyTemplate::empty(doctor.id, self.clock.now())))
    }

    /// Replaces the whole template. Days missing from the request become
    /// non-working days.
    #[instrument(skip(self, request), fields(doctor_id = %doctor_id))]
    pub async fn set_weekly_schedule(
        &self,
        doctor_id: Uuid,
        request: SetWeeklyScheduleRequest,
    ) -> Result<WeeklyTemplate, ScheduleError> {
        let doctor = self.get_doctor(doctor_id).await?;
        let template = build_weekly_template(doctor.id, request, self.clock.now())?;

        let _guard = self.locks.acquire(doctor.id).await;
        let stored = self.store.replace_weekly_template(template).await?;

        info!(
            "Weekly schedule replaced for doctor {} ({} working days, {} min slots)",
            doctor.id,
            stored.days.len(),
            stored.slot_duration_minutes
        );
        Ok(stored)
    }

    // ==========================================================================
    // EXCEPTIONAL DATES
    // ==========================================================================

    pub async fn get_exceptional_dates(
        &self,
        doctor_id: Uuid,
        range: Option<DateRange>,
    ) -> Result<Vec<ExceptionalDate>, ScheduleError> {
        let doctor = self.get_doctor(doctor_id).await?;
        if let Some(range) = range {
            if range.to < range.from {
                return Err(ScheduleError::Validation(
                    "'from' must not be after 'to'".to_string(),
                ));
            }
        }
        Ok(self.store.list_exceptional_dates(doctor.id, range).await?)
    }

    #[instrument(skip(self, request), fields(doctor_id = %doctor_id, date = %request.date))]
    pub async fn add_exceptional_date(
        &self,
        doctor_id: Uuid,
        request: AddExceptionalDateRequest,
    ) -> Result<ExceptionalDate, ScheduleError> {
        let doctor = self.get_doctor(doctor_id).await?;
        let timezone = self.timezone_of(&doctor)?;
        let exception = build_exceptional_date(doctor.id, request, self.clock.now())?;
        let date = exception.date;

        let _guard = self.locks.acquire(doctor.id).await;

        let existing = self
            .store
            .list_exceptional_dates(doctor.id, Some(DateRange::single(date)))
            .await?;
        if !existing.is_empty() {
            warn!("Duplicate exceptional date {} for doctor {}", date, doctor.id);
            return Err(ScheduleError::DuplicateException(date));
        }

        let bookings = self.bookings_on(doctor.id, timezone, date).await?;
        if !bookings.is_empty() {
            let template = self.store.get_weekly_template(doctor.id).await?;
            let preview = AvailabilityResolver::new(template, vec![], timezone, self.policy)
                .with_exception(exception.clone());

            if let Some(stranded) = bookings.iter().find(|b| !preview.covers(b.start, b.end)) {
                warn!(
                    "Exceptional date {} would strand appointment {}",
                    date, stranded.appointment_id
                );
                return Err(ScheduleError::InvalidOperation(format!(
                    "Appointment {} on {} would fall outside the new working hours",
                    stranded.appointment_id, date
                )));
            }
        }

        let stored = self
            .store
            .insert_exceptional_date(exception)
            .await
            .map_err(|e| {
                if e.is_conflict() {
                    ScheduleError::DuplicateException(date)
                } else {
                    ScheduleError::Database(e)
                }
            })?;

        info!("Exceptional date {} ({}) added for doctor {}", stored.date, stored.kind, doctor.id);
        Ok(stored)
    }

    #[instrument(skip(self), fields(doctor_id = %doctor_id, exception_id = %exception_id))]
    pub async fn remove_exceptional_date(
        &self,
        doctor_id: Uuid,
        exception_id: Uuid,
    ) -> Result<bool, ScheduleError> {
        let doctor = self.get_doctor(doctor_id).await?;
        let timezone = self.timezone_of(&doctor)?;

        let _guard = self.locks.acquire(doctor.id).await;

        let exception = self
            .store
            .get_exceptional_date(doctor.id, exception_id)
            .await?
            .ok_or(ScheduleError::ExceptionNotFound(exception_id))?;

        let bookings = self.bookings_on(doctor.id, timezone, exception.date).await?;
        if !bookings.is_empty() {
            warn!(
                "Refusing to remove exceptional date {}: {} active appointments",
                exception.date,
                bookings.len()
            );
            return Err(ScheduleError::InvalidOperation(format!(
                "{} active appointments exist on {}",
                bookings.len(),
                exception.date
            )));
        }

        let removed = self.store.delete_exceptional_date(doctor.id, exception_id).await?;
        if !removed {
            return Err(ScheduleError::ExceptionNotFound(exception_id));
        }

        info!("Exceptional date {} removed for doctor {}", exception.date, doctor.id);
        Ok(true)
    }

    // ==========================================================================
    // AVAILABILITY
    // ==========================================================================

    /// Resolver loaded with everything that affects `range` for the doctor.
    pub async fn resolver_for(
        &self,
        doctor: &DoctorProfile,
        range: DateRange,
    ) -> Result<AvailabilityResolver, ScheduleError> {
        let timezone = self.timezone_of(doctor)?;
        let template = self.store.get_weekly_template(doctor.id).await?;
        let exceptions = self.store.list_exceptional_dates(doctor.id, Some(range)).await?;

        debug!(
            "Resolver for doctor {} over {}..={} ({} exceptions)",
            doctor.id,
            range.from,
            range.to,
            exceptions.len()
        );
        Ok(AvailabilityResolver::new(template, exceptions, timezone, self.policy))
    }

    /// Resolver for the doctor-local date on which `instant` falls.
    pub async fn resolver_at(
        &self,
        doctor: &DoctorProfile,
        instant: DateTime<Utc>,
    ) -> Result<AvailabilityResolver, ScheduleError> {
        let timezone = self.timezone_of(doctor)?;
        let date = instant.with_timezone(&timezone).date_naive();
        self.resolver_for(doctor, DateRange::single(date)).await
    }

    pub async fn resolve_open_intervals(
        &self,
        doctor_id: Uuid,
        range: DateRange,
    ) -> Result<Vec<OpenInterval>, ScheduleError> {
        self.validate_range(&range)?;
        let doctor = self.get_doctor(doctor_id).await?;
        let resolver = self.resolver_for(&doctor, range).await?;
        Ok(resolver.open_intervals(range).collect())
    }

    /// Quantized slots, without regard to bookings.
    pub async fn resolve_slots(
        &self,
        doctor_id: Uuid,
        range: DateRange,
    ) -> Result<Vec<OpenInterval>, ScheduleError> {
        self.validate_range(&range)?;
        let doctor = self.get_doctor(doctor_id).await?;
        let resolver = self.resolver_for(&doctor, range).await?;
        Ok(resolver.slots(range).collect())
    }

    /// Quantized slots that no active appointment intersects.
    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        range: DateRange,
    ) -> Result<Vec<OpenInterval>, ScheduleError> {
        self.validate_range(&range)?;
        let doctor = self.get_doctor(doctor_id).await?;
        let resolver = self.resolver_for(&doctor, range).await?;
        let slots: Vec<OpenInterval> = resolver.slots(range).collect();

        let (Some(first), Some(last)) = (slots.first(), slots.last()) else {
            return Ok(slots);
        };

        let bookings = self
            .ledger
            .active_bookings(doctor.id, first.start, last.end)
            .await?;
        Ok(slots
            .into_iter()
            .filter(|slot| !bookings.iter().any(|b| slot.intersects(b.start, b.end)))
            .collect())
    }

    fn validate_range(&self, range: &DateRange) -> Result<(), ScheduleError> {
        if range.to < range.from {
            return Err(ScheduleError::Validation(
                "'from' must not be after 'to'".to_string(),
            ));
        }
        if range.len_days() > self.max_range_days {
            return Err(ScheduleError::Validation(format!(
                "Date range spans {} days, at most {} allowed",
                range.len_days(),
                self.max_range_days
            )));
        }
        Ok(())
    }

    /// Active bookings starting on the doctor-local `date`.
    async fn bookings_on(
        &self,
        doctor_id: Uuid,
        timezone: Tz,
        date: NaiveDate,
    ) -> Result<Vec<BookedInterval>, ScheduleError> {
        // UTC offsets stay within a day, so one day of padding each side
        // catches every booking on the local date.
        let from = date.and_time(chrono::NaiveTime::MIN).and_utc() - Duration::days(1);
        let to = from + Duration::days(3);

        let bookings = self.ledger.active_bookings(doctor_id, from, to).await?;
        Ok(bookings
            .into_iter()
            .filter(|b| b.start.with_timezone(&timezone).date_naive() == date)
            .collect())
    }
}
