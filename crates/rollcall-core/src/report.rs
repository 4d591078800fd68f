//! Collection reports
//!
//! System-wide totals over every student's fines, payments and community
//! service. Outstanding amounts are clamped per student and then summed.

use chrono::{DateTime, Local, NaiveDate};
use rollcall_api::{FineRecord, PaymentRecord, ServiceRecord, Student};
use rollcall_config::Event;
use rollcall_util::{EventId, StudentId};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::outstanding_balance;

/// Money and hours for one group of students
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub fines: Decimal,
    pub fine_count: usize,
    pub payments: Decimal,
    pub payment_count: usize,
    pub service_credits: Decimal,
    pub service_hours: u32,
    /// Sum of each student's balance floored at zero
    pub outstanding: Decimal,
}

impl Totals {
    fn add(&mut self, other: &Totals) {
        self.fines += other.fines;
        self.fine_count += other.fine_count;
        self.payments += other.payments;
        self.payment_count += other.payment_count;
        self.service_credits += other.service_credits;
        self.service_hours += other.service_hours;
        self.outstanding += other.outstanding;
    }

    /// Total collected, in cash and in service credit
    pub fn collected(&self) -> Decimal {
        self.payments + self.service_credits
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventTotals {
    pub event_id: EventId,
    /// `None` when the event is no longer configured
    pub name: Option<String>,
    pub fines: Decimal,
    pub fine_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SemesterTotals {
    pub school_year: String,
    pub semester: u8,
    pub fines: Decimal,
    pub fine_count: usize,
}

/// Totals for one course and section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionTotals {
    pub course: String,
    pub section: String,
    pub students: usize,
    pub totals: Totals,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonthlyCollection {
    /// `YYYY-MM`
    pub month: String,
    pub payments: Decimal,
    pub service_credits: Decimal,
}

/// Raw records a report is built from
#[derive(Debug, Clone, Copy)]
pub struct ReportSource<'a> {
    pub students: &'a [Student],
    pub events: &'a [Event],
    pub fines: &'a [FineRecord],
    pub payments: &'a [PaymentRecord],
    pub services: &'a [ServiceRecord],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryReport {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub generated_at: DateTime<Local>,
    pub overall: Totals,
    pub by_event: Vec<EventTotals>,
    pub by_semester: Vec<SemesterTotals>,
    pub by_section: Vec<SectionTotals>,
    pub monthly: Vec<MonthlyCollection>,
}

impl SummaryReport {
    /// Aggregate every record dated within `[from, to]`. An open bound
    /// matches everything on that side.
    pub fn build(
        source: ReportSource<'_>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        generated_at: DateTime<Local>,
    ) -> Self {
        let in_range = |date: NaiveDate| {
            from.is_none_or(|start| start <= date) && to.is_none_or(|end| date <= end)
        };

        let mut per_student: BTreeMap<&StudentId, Totals> = BTreeMap::new();
        let mut per_event: BTreeMap<&EventId, (Decimal, usize)> = BTreeMap::new();
        let mut monthly: BTreeMap<String, MonthlyCollection> = BTreeMap::new();

        for fine in source.fines.iter().filter(|f| in_range(f.date)) {
            let totals = per_student.entry(&fine.student_id).or_default();
            totals.fines += fine.amount;
            totals.fine_count += 1;

            let event = per_event.entry(&fine.event_id).or_default();
            event.0 += fine.amount;
            event.1 += 1;
        }

        for payment in source.payments.iter().filter(|p| in_range(p.date)) {
            let totals = per_student.entry(&payment.student_id).or_default();
            totals.payments += payment.amount;
            totals.payment_count += 1;
            month_entry(&mut monthly, payment.date).payments += payment.amount;
        }

        for service in source.services.iter().filter(|s| in_range(s.date)) {
            let totals = per_student.entry(&service.student_id).or_default();
            totals.service_credits += service.credit_amount;
            totals.service_hours += service.hours;
            month_entry(&mut monthly, service.date).service_credits += service.credit_amount;
        }

        for totals in per_student.values_mut() {
            totals.outstanding =
                outstanding_balance(totals.fines, totals.payments, totals.service_credits);
        }

        let mut overall = Totals::default();
        for totals in per_student.values() {
            overall.add(totals);
        }

        let events: BTreeMap<&EventId, &Event> =
            source.events.iter().map(|e| (&e.id, e)).collect();

        let mut by_semester: BTreeMap<(String, u8), (Decimal, usize)> = BTreeMap::new();
        let by_event: Vec<EventTotals> = per_event
            .into_iter()
            .map(|(event_id, (fines, fine_count))| {
                let event = events.get(event_id);
                if let Some(event) = event {
                    let semester = by_semester
                        .entry((event.school_year.clone(), event.semester))
                        .or_default();
                    semester.0 += fines;
                    semester.1 += fine_count;
                }
                EventTotals {
                    event_id: event_id.clone(),
                    name: event.map(|e| e.name.clone()),
                    fines,
                    fine_count,
                }
            })
            .collect();

        let by_semester: Vec<SemesterTotals> = by_semester
            .into_iter()
            .map(|((school_year, semester), (fines, fine_count))| SemesterTotals {
                school_year,
                semester,
                fines,
                fine_count,
            })
            .collect();

        let mut sections: BTreeMap<(&str, &str), SectionTotals> = BTreeMap::new();
        for student in source.students {
            let section = sections
                .entry((student.course.as_str(), student.section.as_str()))
                .or_insert_with(|| SectionTotals {
                    course: student.course.clone(),
                    section: student.section.clone(),
                    students: 0,
                    totals: Totals::default(),
                });
            section.students += 1;
            if let Some(totals) = per_student.get(&student.id) {
                section.totals.add(totals);
            }
        }

        Self {
            from,
            to,
            generated_at,
            overall,
            by_event,
            by_semester,
            by_section: sections.into_values().collect(),
            monthly: monthly.into_values().collect(),
        }
    }
}

fn month_entry(
    monthly: &mut BTreeMap<String, MonthlyCollection>,
    date: NaiveDate,
) -> &mut MonthlyCollection {
    let month = date.format("%Y-%m").to_string();
    monthly
        .entry(month.clone())
        .or_insert_with(|| MonthlyCollection {
            month,
            ..Default::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rollcall_api::SessionConfig;
    use rollcall_config::{AttendanceSchedule, FineOverrides, WindowSet};
    use rollcall_util::{FineId, PaymentId, ServiceId, TransactionId};
    use rust_decimal_macros::dec;

    fn on(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, month, day).unwrap()
    }

    fn generated_at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap()
    }

    fn student(id: &str, course: &str, section: &str) -> Student {
        Student {
            id: StudentId::new(id),
            first_name: "Ana".into(),
            last_name: "Reyes".into(),
            course: course.into(),
            year_level: 1,
            section: section.into(),
            rfid_tag: None,
        }
    }

    fn event(id: &str, semester: u8) -> Event {
        Event {
            id: EventId::new(id),
            name: format!("Event {}", id),
            date: on(3, 14),
            semester,
            school_year: "2024-2025".into(),
            sessions: SessionConfig::Both,
            schedule: AttendanceSchedule::Windowed(WindowSet::default()),
            fine_overrides: FineOverrides::default(),
        }
    }

    fn fine(student_id: &str, event_id: &str, amount: Decimal, date: NaiveDate) -> FineRecord {
        FineRecord {
            fine_id: FineId::generate(),
            transaction_id: TransactionId::generate(),
            student_id: StudentId::new(student_id),
            event_id: EventId::new(event_id),
            amount,
            date,
        }
    }

    fn payment(student_id: &str, amount: Decimal, date: NaiveDate) -> PaymentRecord {
        PaymentRecord {
            payment_id: PaymentId::generate(),
            transaction_id: TransactionId::generate(),
            student_id: StudentId::new(student_id),
            amount,
            receipt_no: "1001".into(),
            date,
        }
    }

    fn service(student_id: &str, hours: u32, date: NaiveDate) -> ServiceRecord {
        ServiceRecord {
            service_id: ServiceId::generate(),
            student_id: StudentId::new(student_id),
            hours,
            credit_amount: Decimal::from(hours) * dec!(50),
            date,
            description: None,
        }
    }

    struct Fixture {
        students: Vec<Student>,
        events: Vec<Event>,
        fines: Vec<FineRecord>,
        payments: Vec<PaymentRecord>,
        services: Vec<ServiceRecord>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                students: vec![
                    student("2023-0001", "BSIT", "A"),
                    student("2023-0002", "BSIT", "A"),
                    student("2023-0003", "BSCS", "B"),
                ],
                events: vec![event("EVT-1", 2), event("EVT-2", 2)],
                fines: vec![
                    fine("2023-0001", "EVT-1", dec!(100), on(3, 14)),
                    fine("2023-0002", "EVT-1", dec!(30), on(3, 14)),
                    fine("2023-0003", "EVT-2", dec!(100), on(4, 2)),
                    fine("2023-0003", "EVT-OLD", dec!(50), on(1, 10)),
                ],
                payments: vec![
                    payment("2023-0001", dec!(40), on(3, 20)),
                    payment("2023-0002", dec!(80), on(4, 3)),
                ],
                services: vec![service("2023-0003", 2, on(4, 5))],
            }
        }

        fn source(&self) -> ReportSource<'_> {
            ReportSource {
                students: &self.students,
                events: &self.events,
                fines: &self.fines,
                payments: &self.payments,
                services: &self.services,
            }
        }
    }

    #[test]
    fn overall_totals_clamp_each_student() {
        let fixture = Fixture::new();
        let report = SummaryReport::build(fixture.source(), None, None, generated_at());

        let overall = &report.overall;
        assert_eq!(overall.fines, dec!(280));
        assert_eq!(overall.fine_count, 4);
        assert_eq!(overall.payments, dec!(120));
        assert_eq!(overall.payment_count, 2);
        assert_eq!(overall.service_credits, dec!(100));
        assert_eq!(overall.service_hours, 2);
        assert_eq!(overall.collected(), dec!(220));
        // 60 + 0 (overpaid by 50) + 50
        assert_eq!(overall.outstanding, dec!(110));
    }

    #[test]
    fn fines_group_by_event_and_semester() {
        let fixture = Fixture::new();
        let report = SummaryReport::build(fixture.source(), None, None, generated_at());

        assert_eq!(report.by_event.len(), 3);
        assert_eq!(report.by_event[0].event_id.as_str(), "EVT-1");
        assert_eq!(report.by_event[0].fines, dec!(130));
        assert_eq!(report.by_event[0].fine_count, 2);
        assert_eq!(report.by_event[0].name.as_deref(), Some("Event EVT-1"));
        assert_eq!(report.by_event[2].event_id.as_str(), "EVT-OLD");
        assert!(report.by_event[2].name.is_none());

        assert_eq!(report.by_semester.len(), 1);
        assert_eq!(report.by_semester[0].fines, dec!(230));
        assert_eq!(report.by_semester[0].fine_count, 3);
    }

    #[test]
    fn sections_and_months() {
        let fixture = Fixture::new();
        let report = SummaryReport::build(fixture.source(), None, None, generated_at());

        let sections: Vec<_> = report
            .by_section
            .iter()
            .map(|s| (s.course.as_str(), s.section.as_str(), s.students))
            .collect();
        assert_eq!(sections, vec![("BSCS", "B", 1), ("BSIT", "A", 2)]);
        assert_eq!(report.by_section[1].totals.fines, dec!(130));
        assert_eq!(report.by_section[1].totals.outstanding, dec!(60));

        let months: Vec<_> = report.monthly.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, vec!["2025-03", "2025-04"]);
        assert_eq!(report.monthly[1].payments, dec!(80));
        assert_eq!(report.monthly[1].service_credits, dec!(100));
    }

    #[test]
    fn date_range_is_inclusive() {
        let fixture = Fixture::new();
        let report =
            SummaryReport::build(fixture.source(), Some(on(3, 14)), Some(on(3, 31)), generated_at());

        assert_eq!(report.overall.fines, dec!(130));
        assert_eq!(report.overall.payments, dec!(40));
        assert_eq!(report.overall.service_credits, Decimal::ZERO);
        assert_eq!(report.monthly.len(), 1);
    }

    #[test]
    fn empty_source_gives_zero_totals() {
        let report = SummaryReport::build(
            ReportSource {
                students: &[],
                events: &[],
                fines: &[],
                payments: &[],
                services: &[],
            },
            None,
            None,
            generated_at(),
        );
        assert_eq!(report.overall, Totals::default());
        assert!(report.by_event.is_empty());
        assert!(report.by_section.is_empty());
    }
}
