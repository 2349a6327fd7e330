// libs/appointment-cell/tests/booking_test.rs

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use futures::future::join_all;
use uuid::Uuid;

use appointment_cell::models::{
    AppointmentError, AppointmentSearchQuery, AppointmentStatus, AvailabilityVerdict,
    CancelledBy, CreateAppointmentRequest, UpdateAppointmentRequest,
};
use appointment_cell::services::{
    AppointmentBookingService, AppointmentStore, InMemoryAppointmentStore, StoreLedger,
};
use doctor_cell::models::{
    AddExceptionalDateRequest, DateRange, DayOfWeek, DaySchedule, DoctorProfile, ExceptionKind,
    SetWeeklyScheduleRequest, TimeRange,
};
use doctor_cell::services::{InMemoryScheduleStore, ScheduleService};
use doctor_cell::ScheduleError;
use shared_config::AppConfig;
use shared_utils::clock::FixedClock;

struct Fixture {
    bookings: Arc<AppointmentBookingService>,
    schedules: Arc<ScheduleService>,
    clock: FixedClock,
    doctor_id: Uuid,
    patient_a: Uuid,
    patient_b: Uuid,
    patient_c: Uuid,
}

/// 2030-01-07, a Monday, in UTC.
fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 7, h, m, 0).unwrap()
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
}

async fn fixture() -> Fixture {
    let schedule_store = InMemoryScheduleStore::new();
    let doctor_id = Uuid::new_v4();
    schedule_store
        .register_doctor(DoctorProfile::new(doctor_id, "UTC"))
        .await;

    let appointment_store = InMemoryAppointmentStore::new();
    let (patient_a, patient_b, patient_c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    for patient in [patient_a, patient_b, patient_c] {
        appointment_store.register_patient(patient).await;
    }
    let store: Arc<dyn AppointmentStore> = Arc::new(appointment_store);

    let clock = FixedClock::new(Utc.with_ymd_and_hms(2030, 1, 1, 8, 0, 0).unwrap());
    let schedules = Arc::new(
        ScheduleService::new(
            Arc::new(schedule_store),
            Arc::new(StoreLedger::new(store.clone())),
            &AppConfig::default(),
        )
        .with_clock(Arc::new(clock.clone())),
    );

    schedules
        .set_weekly_schedule(
            doctor_id,
            SetWeeklyScheduleRequest {
                slot_duration_minutes: 30,
                days: vec![DaySchedule {
                    day: DayOfWeek::Monday,
                    ranges: vec![TimeRange::hm(9, 0, 12, 0).unwrap()],
                }],
            },
        )
        .await
        .unwrap();

    let bookings = Arc::new(AppointmentBookingService::new(store, schedules.clone()));

    Fixture {
        bookings,
        schedules,
        clock,
        doctor_id,
        patient_a,
        patient_b,
        patient_c,
    }
}

fn request(f: &Fixture, patient_id: Uuid, start: DateTime<Utc>, minutes: i64) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        patient_id,
        doctor_id: f.doctor_id,
        start_time: start,
        end_time: start + Duration::minutes(minutes),
        notes: None,
    }
}

async fn active_for_doctor(f: &Fixture) -> Vec<appointment_cell::models::Appointment> {
    f.bookings
        .get_by_doctor(f.doctor_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.is_active())
        .collect()
}

#[tokio::test]
async fn booking_inside_working_hours_is_scheduled() {
    let f = fixture().await;

    let appointment = f
        .bookings
        .create_appointment(request(&f, f.patient_a, at(10, 0), 30))
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Scheduled);
    assert_eq!(appointment.reschedule_of, None);

    // A multi-slot booking inside one working window is accepted too.
    f.bookings
        .create_appointment(request(&f, f.patient_b, at(10, 30), 90))
        .await
        .unwrap();
}

#[tokio::test]
async fn blocked_date_is_outside_working_hours() {
    let f = fixture().await;
    f.schedules
        .add_exceptional_date(
            f.doctor_id,
            AddExceptionalDateRequest {
                date: monday(),
                kind: ExceptionKind::FullyBlocked,
                custom_ranges: None,
                reason: Some("Conference".to_string()),
            },
        )
        .await
        .unwrap();

    let verdict = f
        .bookings
        .check_availability(f.doctor_id, at(9, 0), at(9, 30), None)
        .await
        .unwrap();
    assert_eq!(verdict, AvailabilityVerdict::OutsideWorkingHours);

    let available = f
        .bookings
        .conflicts()
        .is_available(f.doctor_id, at(9, 0), at(9, 30), None)
        .await
        .unwrap();
    assert!(!available);

    let result = f
        .bookings
        .create_appointment(request(&f, f.patient_a, at(9, 0), 30))
        .await;
    assert_matches!(result, Err(AppointmentError::OutsideWorkingHours));
}

#[tokio::test]
async fn booking_must_cover_whole_slots() {
    let f = fixture().await;

    // Inside the 09:00-12:00 window but off the 30 minute grid.
    for (start, minutes) in [(at(9, 10), 30), (at(9, 0), 45), (at(9, 15), 45)] {
        let result = f
            .bookings
            .create_appointment(request(&f, f.patient_a, start, minutes))
            .await;
        assert_matches!(result, Err(AppointmentError::OutsideWorkingHours), "{} +{}m", start, minutes);
    }

    let odd_seconds = at(9, 40) + Duration::seconds(7);
    let verdict = f
        .bookings
        .check_availability(f.doctor_id, odd_seconds, odd_seconds + Duration::minutes(13), None)
        .await
        .unwrap();
    assert_eq!(verdict, AvailabilityVerdict::OutsideWorkingHours);

    assert!(active_for_doctor(&f).await.is_empty());
    f.bookings
        .create_appointment(request(&f, f.patient_a, at(9, 30), 60))
        .await
        .unwrap();
}

#[tokio::test]
async fn second_booking_for_same_slot_is_unavailable() {
    let f = fixture().await;

    f.bookings
        .create_appointment(request(&f, f.patient_a, at(10, 0), 30))
        .await
        .unwrap();
    let result = f
        .bookings
        .create_appointment(request(&f, f.patient_b, at(10, 0), 30))
        .await;
    assert_matches!(result, Err(AppointmentError::SlotUnavailable));

    // Partial overlap is just as taken; touching is not.
    let result = f
        .bookings
        .create_appointment(request(&f, f.patient_b, at(9, 30), 60))
        .await;
    assert_matches!(result, Err(AppointmentError::SlotUnavailable));
    f.bookings
        .create_appointment(request(&f, f.patient_b, at(10, 30), 30))
        .await
        .unwrap();
}

#[tokio::test]
async fn concurrent_bookings_never_double_book() {
    let f = fixture().await;

    let attempts = (0..12).map(|i| {
        let bookings = f.bookings.clone();
        let patient = if i % 2 == 0 { f.patient_a } else { f.patient_b };
        // Overlapping 30 and 60 minute requests on the slot grid.
        let start = at(9, 0) + Duration::minutes(30 * (i % 5));
        let minutes = if i % 3 == 0 { 60 } else { 30 };
        let req = request(&f, patient, start, minutes);
        tokio::spawn(async move { bookings.create_appointment(req).await })
    });

    let results = join_all(attempts).await;
    let mut booked = 0;
    for result in results {
        match result.unwrap() {
            Ok(_) => booked += 1,
            Err(e) => assert_matches!(e, AppointmentError::SlotUnavailable),
        }
    }
    assert!(booked >= 1);

    let active = active_for_doctor(&f).await;
    assert_eq!(active.len(), booked);
    for (i, a) in active.iter().enumerate() {
        for b in active.iter().skip(i + 1) {
            assert!(
                !a.overlaps(b.start_time, b.end_time),
                "{} and {} overlap",
                a.id,
                b.id
            );
        }
    }
}

#[tokio::test]
async fn reschedule_moves_the_booking_and_frees_the_old_slot() {
    let f = fixture().await;
    let original = f
        .bookings
        .create_appointment(request(&f, f.patient_a, at(10, 0), 30))
        .await
        .unwrap();

    let moved = f
        .bookings
        .reschedule_appointment(original.id, at(11, 0), at(11, 30))
        .await
        .unwrap();

    assert_eq!(moved.status, AppointmentStatus::Scheduled);
    assert_eq!(moved.reschedule_of, Some(original.id));
    assert_eq!(moved.patient_id, f.patient_a);
    assert_eq!(moved.start_time, at(11, 0));

    let old = f.bookings.get_appointment(original.id).await.unwrap();
    assert_eq!(old.status, AppointmentStatus::Rescheduled);

    // Exactly one active appointment for this patient and doctor.
    let active: Vec<_> = active_for_doctor(&f)
        .await
        .into_iter()
        .filter(|a| a.patient_id == f.patient_a)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, moved.id);

    f.bookings
        .create_appointment(request(&f, f.patient_b, at(10, 0), 30))
        .await
        .unwrap();

    // The old row is terminal now.
    let result = f
        .bookings
        .reschedule_appointment(original.id, at(9, 0), at(9, 30))
        .await;
    assert_matches!(
        result,
        Err(AppointmentError::InvalidTransition { status: AppointmentStatus::Rescheduled, .. })
    );
}

#[tokio::test]
async fn concurrent_reschedules_and_bookings_never_double_book() {
    for _ in 0..20 {
        let f = fixture().await;
        let first = f
            .bookings
            .create_appointment(request(&f, f.patient_a, at(9, 0), 30))
            .await
            .unwrap();
        let second = f
            .bookings
            .create_appointment(request(&f, f.patient_b, at(9, 30), 30))
            .await
            .unwrap();

        let moves = [first.id, second.id].map(|id| {
            let bookings = f.bookings.clone();
            tokio::spawn(async move {
                bookings
                    .reschedule_appointment(id, at(11, 0), at(11, 30))
                    .await
                    .map(|a| a.id)
            })
        });
        let bookings = f.bookings.clone();
        let req = request(&f, f.patient_c, at(11, 0), 30);
        let fresh = tokio::spawn(async move { bookings.create_appointment(req).await.map(|a| a.id) });

        let mut results = join_all(moves).await;
        results.push(fresh.await);
        let mut winners = 0;
        for result in results {
            match result.unwrap() {
                Ok(_) => winners += 1,
                Err(e) => assert_matches!(e, AppointmentError::SlotUnavailable),
            }
        }
        assert_eq!(winners, 1);

        let active = active_for_doctor(&f).await;
        for (i, a) in active.iter().enumerate() {
            for b in active.iter().skip(i + 1) {
                assert!(!a.overlaps(b.start_time, b.end_time), "{} and {} overlap", a.id, b.id);
            }
        }
        assert_eq!(active.iter().filter(|a| a.start_time == at(11, 0)).count(), 1);

        for (patient, original) in [(f.patient_a, &first), (f.patient_b, &second)] {
            let mine: Vec<_> = active.iter().filter(|a| a.patient_id == patient).collect();
            assert_eq!(mine.len(), 1);

            let old = f.bookings.get_appointment(original.id).await.unwrap();
            if mine[0].id == original.id {
                assert_eq!(old.status, AppointmentStatus::Scheduled);
            } else {
                assert_eq!(old.status, AppointmentStatus::Rescheduled);
                assert_eq!(mine[0].reschedule_of, Some(original.id));
            }
        }
    }
}

#[tokio::test]
async fn reschedule_may_overlap_its_own_interval() {
    let f = fixture().await;
    let original = f
        .bookings
        .create_appointment(request(&f, f.patient_a, at(10, 0), 60))
        .await
        .unwrap();

    let moved = f
        .bookings
        .reschedule_appointment(original.id, at(10, 30), at(11, 30))
        .await
        .unwrap();
    assert_eq!(moved.start_time, at(10, 30));
}

#[tokio::test]
async fn reschedule_into_taken_slot_changes_nothing() {
    let f = fixture().await;
    let mine = f
        .bookings
        .create_appointment(request(&f, f.patient_a, at(10, 0), 30))
        .await
        .unwrap();
    f.bookings
        .create_appointment(request(&f, f.patient_b, at(11, 0), 30))
        .await
        .unwrap();

    let result = f
        .bookings
        .reschedule_appointment(mine.id, at(11, 0), at(11, 30))
        .await;
    assert_matches!(result, Err(AppointmentError::SlotUnavailable));

    let unchanged = f.bookings.get_appointment(mine.id).await.unwrap();
    assert_eq!(unchanged.status, AppointmentStatus::Scheduled);
    assert_eq!(active_for_doctor(&f).await.len(), 2);
}

#[tokio::test]
async fn cancelling_twice_is_an_invalid_transition() {
    let f = fixture().await;
    let appointment = f
        .bookings
        .create_appointment(request(&f, f.patient_a, at(10, 0), 30))
        .await
        .unwrap();

    let result = f
        .bookings
        .cancel_appointment(appointment.id, "  ".to_string(), CancelledBy::Patient)
        .await;
    assert_matches!(result, Err(AppointmentError::Validation(_)));

    let cancelled = f
        .bookings
        .cancel_appointment(appointment.id, "Feeling better".to_string(), CancelledBy::Patient)
        .await
        .unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(cancelled.cancelled_by, Some(CancelledBy::Patient));
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Feeling better"));

    let result = f
        .bookings
        .cancel_appointment(appointment.id, "Again".to_string(), CancelledBy::Patient)
        .await;
    assert_matches!(
        result,
        Err(AppointmentError::InvalidTransition { status: AppointmentStatus::Cancelled, .. })
    );

    // The interval is free again.
    f.bookings
        .create_appointment(request(&f, f.patient_b, at(10, 0), 30))
        .await
        .unwrap();
}

#[tokio::test]
async fn completion_needs_confirmation_and_an_ended_appointment() {
    let f = fixture().await;
    let appointment = f
        .bookings
        .create_appointment(request(&f, f.patient_a, at(10, 0), 30))
        .await
        .unwrap();

    let result = f.bookings.complete_appointment(appointment.id).await;
    assert_matches!(
        result,
        Err(AppointmentError::InvalidTransition { status: AppointmentStatus::Scheduled, .. })
    );

    let confirmed = f.bookings.confirm_appointment(appointment.id).await.unwrap();
    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);

    let result = f.bookings.complete_appointment(appointment.id).await;
    assert_matches!(result, Err(AppointmentError::Validation(_)));

    f.clock.set(at(10, 30));
    let completed = f.bookings.complete_appointment(appointment.id).await.unwrap();
    assert_eq!(completed.status, AppointmentStatus::Completed);

    let result = f.bookings.confirm_appointment(appointment.id).await;
    assert_matches!(result, Err(AppointmentError::InvalidTransition { .. }));
}

#[tokio::test]
async fn update_rechecks_availability_excluding_itself() {
    let f = fixture().await;
    let mine = f
        .bookings
        .create_appointment(request(&f, f.patient_a, at(10, 0), 30))
        .await
        .unwrap();
    f.bookings
        .create_appointment(request(&f, f.patient_b, at(11, 0), 30))
        .await
        .unwrap();

    let stretched = f
        .bookings
        .update_appointment(
            mine.id,
            UpdateAppointmentRequest {
                end_time: Some(at(11, 0)),
                notes: Some("Bring lab results".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(stretched.id, mine.id);
    assert_eq!(stretched.end_time, at(11, 0));
    assert_eq!(stretched.notes.as_deref(), Some("Bring lab results"));

    let result = f
        .bookings
        .update_appointment(
            mine.id,
            UpdateAppointmentRequest {
                end_time: Some(at(11, 30)),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(result, Err(AppointmentError::SlotUnavailable));

    let result = f
        .bookings
        .update_appointment(
            mine.id,
            UpdateAppointmentRequest {
                start_time: Some(at(12, 0)),
                end_time: Some(at(12, 30)),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(result, Err(AppointmentError::OutsideWorkingHours));
}

#[tokio::test]
async fn rejects_malformed_and_past_requests() {
    let f = fixture().await;

    let result = f
        .bookings
        .create_appointment(request(&f, f.patient_a, at(10, 0), 0))
        .await;
    assert_matches!(result, Err(AppointmentError::Validation(_)));

    f.clock.set(at(11, 0));
    let result = f
        .bookings
        .create_appointment(request(&f, f.patient_a, at(10, 0), 30))
        .await;
    assert_matches!(result, Err(AppointmentError::Validation(_)));

    let stranger = Uuid::new_v4();
    let result = f
        .bookings
        .create_appointment(request(&f, stranger, at(11, 30), 30))
        .await;
    assert_matches!(result, Err(AppointmentError::PatientNotFound(id)) if id == stranger);

    let mut other_doctor = request(&f, f.patient_a, at(11, 30), 30);
    other_doctor.doctor_id = Uuid::new_v4();
    let result = f.bookings.create_appointment(other_doctor).await;
    assert_matches!(result, Err(AppointmentError::DoctorNotFound(_)));
}

#[tokio::test]
async fn exceptions_respect_existing_bookings() {
    let f = fixture().await;
    f.bookings
        .create_appointment(request(&f, f.patient_a, at(10, 0), 30))
        .await
        .unwrap();

    let result = f
        .schedules
        .add_exceptional_date(
            f.doctor_id,
            AddExceptionalDateRequest {
                date: monday(),
                kind: ExceptionKind::FullyBlocked,
                custom_ranges: None,
                reason: None,
            },
        )
        .await;
    assert_matches!(result, Err(ScheduleError::InvalidOperation(_)));
}

#[tokio::test]
async fn booked_slots_leave_the_listing_and_pin_the_exception() {
    let f = fixture().await;
    f.schedules
        .add_exceptional_date(
            f.doctor_id,
            AddExceptionalDateRequest {
                date: monday(),
                kind: ExceptionKind::CustomHours,
                custom_ranges: Some(vec![TimeRange::hm(9, 0, 11, 0).unwrap()]),
                reason: None,
            },
        )
        .await
        .unwrap();
    f.bookings
        .create_appointment(request(&f, f.patient_a, at(9, 30), 60))
        .await
        .unwrap();

    let free: Vec<_> = f
        .schedules
        .available_slots(f.doctor_id, DateRange::single(monday()))
        .await
        .unwrap()
        .into_iter()
        .map(|slot| slot.start)
        .collect();
    assert_eq!(free, vec![at(9, 0), at(10, 30)]);

    let exception = f
        .schedules
        .get_exceptional_dates(f.doctor_id, None)
        .await
        .unwrap()
        .remove(0);
    let result = f.schedules.remove_exceptional_date(f.doctor_id, exception.id).await;
    assert_matches!(result, Err(ScheduleError::InvalidOperation(_)));
}

#[tokio::test]
async fn listings_filter_and_order_by_start() {
    let f = fixture().await;
    let late = f
        .bookings
        .create_appointment(request(&f, f.patient_a, at(11, 0), 30))
        .await
        .unwrap();
    let early = f
        .bookings
        .create_appointment(request(&f, f.patient_b, at(9, 0), 30))
        .await
        .unwrap();
    f.bookings
        .cancel_appointment(late.id, "Travel".to_string(), CancelledBy::Doctor)
        .await
        .unwrap();

    let all = f.bookings.get_by_doctor(f.doctor_id).await.unwrap();
    assert_eq!(all.iter().map(|a| a.id).collect::<Vec<_>>(), vec![early.id, late.id]);

    let mine = f.bookings.get_by_patient(f.patient_a).await.unwrap();
    assert_eq!(mine.len(), 1);

    let cancelled = f.bookings.get_by_status(AppointmentStatus::Cancelled).await.unwrap();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].id, late.id);

    let morning = f.bookings.get_by_date_range(at(8, 0), at(10, 0)).await.unwrap();
    assert_eq!(morning.len(), 1);
    assert_eq!(morning[0].id, early.id);

    let result = f
        .bookings
        .search_appointments(&AppointmentSearchQuery {
            from: Some(at(10, 0)),
            to: Some(at(9, 0)),
            ..Default::default()
        })
        .await;
    assert_matches!(result, Err(AppointmentError::Validation(_)));
}
