//! rollcall - attendance fines and clearance ledger
//!
//! Wires configuration, the SQLite store and the attendance engine behind a
//! command line. `station` runs a long-lived scan loop; every other
//! subcommand performs one operation and exits.

mod station;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use clap::{Args as ClapArgs, Parser, Subcommand};
use rollcall_api::{Direction, ScanIdentity, ScanRequest, Session, Student};
use rollcall_config::load_config;
use rollcall_core::{AttendanceEngine, FinalizationReport, Ledger, SummaryReport};
use rollcall_store::{SqliteStore, Store};
use rollcall_util::{EventId, MOCK_TIME_FORMAT, StudentId, default_config_path, store_path};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// rollcall - Student attendance, fines and clearance
#[derive(Parser, Debug)]
#[command(name = "rollcall")]
#[command(about = "Student attendance, fines and clearance ledger", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/rollcall/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set ROLLCALL_DATA_DIR env var)
    #[arg(short, long, env = "ROLLCALL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add or update a student
    Enroll {
        /// Student id, e.g. 2023-0001
        id: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long, default_value = "")]
        course: String,
        #[arg(long, default_value_t = 1)]
        year_level: u8,
        #[arg(long, default_value = "")]
        section: String,
        /// RFID card tag
        #[arg(long)]
        rfid: Option<String>,
    },

    /// Record one scan
    Scan {
        #[command(flatten)]
        identity: IdentityArgs,
        #[command(flatten)]
        slot: SlotArgs,
        /// Scan time as "YYYY-MM-DD HH:MM[:SS]" (default: now)
        #[arg(long, value_parser = parse_local_datetime)]
        at: Option<DateTime<Local>>,
    },

    /// Stamp a check-out time on an existing record
    CheckOut {
        #[arg(short, long)]
        event: String,
        #[arg(short, long)]
        student: String,
        #[arg(long, value_parser = parse_local_datetime)]
        at: Option<DateTime<Local>>,
    },

    /// Read RFID tags from stdin, one per line, until EOF or a signal
    Station {
        #[command(flatten)]
        slot: SlotArgs,
    },

    /// Mark every student without a record absent and issue pending fines
    Finalize {
        #[arg(short, long)]
        event: String,
    },

    /// Mark absentees for one session once its window has closed
    MarkAbsent {
        #[command(flatten)]
        slot: SlotArgs,
    },

    /// Record a cash payment
    Pay {
        #[arg(short, long)]
        student: String,
        #[arg(short, long)]
        amount: Decimal,
        /// Official receipt number
        #[arg(short, long)]
        receipt: String,
        /// Payment date (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Record community service hours
    Service {
        #[arg(short, long)]
        student: String,
        #[arg(long)]
        hours: u32,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show a student's ledger
    Ledger {
        student: String,
        /// Only entries on or after this date
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Only entries on or before this date
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Print the ledger as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a student's clearance status
    Clearance { student: String },

    /// Show fines, collections and outstanding balances across all students
    Report {
        /// Only records on or after this date
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Only records on or before this date
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show recent audit events
    Audit {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(ClapArgs, Debug)]
#[group(required = true, multiple = false)]
struct IdentityArgs {
    /// RFID card tag
    #[arg(long)]
    rfid: Option<String>,
    /// Student id, for manual entry
    #[arg(long)]
    student: Option<String>,
}

impl IdentityArgs {
    fn into_identity(self) -> Result<ScanIdentity> {
        match (self.rfid, self.student) {
            (Some(tag), None) => Ok(ScanIdentity::Rfid(tag)),
            (None, Some(id)) => Ok(ScanIdentity::Student(StudentId::new(id))),
            _ => bail!("Exactly one of --rfid or --student is required"),
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
struct SlotArgs {
    #[arg(short, long)]
    event: String,
    /// AM or PM
    #[arg(long)]
    session: Session,
    /// in or out
    #[arg(long, default_value = "in")]
    direction: Direction,
}

fn parse_local_datetime(s: &str) -> std::result::Result<DateTime<Local>, String> {
    let naive = NaiveDateTime::parse_from_str(s, MOCK_TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"))
        .map_err(|e| format!("invalid date/time '{}': {}", s, e))?;
    Local
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| format!("'{}' is not a single local time", s))
}

/// Open the store and build the engine
fn open_engine(args: &Args) -> Result<AttendanceEngine> {
    let policy = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    info!(
        config_path = %args.config.display(),
        event_count = policy.events.len(),
        "Configuration loaded"
    );

    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| policy.service.data_dir.clone());
    let db_path = store_path(&data_dir);
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database {:?}", db_path))?,
    );

    if !store.is_healthy() {
        bail!("Store at {:?} is not responding", db_path);
    }
    info!(db_path = %db_path.display(), "Store initialized");

    Ok(AttendanceEngine::new(policy, store))
}

fn today() -> NaiveDate {
    rollcall_util::now().date_naive()
}

fn print_report(report: &FinalizationReport) {
    println!(
        "Marked {} absent, issued {} fine(s) totalling ₱{:.2}",
        report.absentees_marked, report.fines_issued, report.amount_fined
    );
}

fn print_ledger(ledger: &Ledger, from: Option<NaiveDate>, to: Option<NaiveDate>) {
    let entries = ledger.transactions_between(
        from.unwrap_or(NaiveDate::MIN),
        to.unwrap_or(NaiveDate::MAX),
    );

    println!("Ledger for {}", ledger.student_id);
    println!();
    for entry in entries {
        let sign = if entry.is_debit() { "+" } else { "-" };
        println!(
            "  {}  {:<16} {:<24} {}{:>10.2}",
            entry.date,
            entry.kind.label(),
            entry.id,
            sign,
            entry.amount
        );
    }
    println!();
    println!("  Fines:            ₱{:.2}", ledger.total_fines);
    println!("  Payments:         ₱{:.2}", ledger.total_payments);
    println!("  Service credits:  ₱{:.2}", ledger.total_service_credits);
    println!("  Balance:          ₱{:.2}", ledger.closing_balance);
    println!("  Outstanding:      ₱{:.2}", ledger.outstanding());
    println!("  Status:           {}", ledger.clearance());
}

fn print_summary(report: &SummaryReport) {
    let overall = &report.overall;
    println!("Collection report");
    println!();
    println!("  Fines issued:     {:>4}  ₱{:.2}", overall.fine_count, overall.fines);
    println!("  Cash payments:    {:>4}  ₱{:.2}", overall.payment_count, overall.payments);
    println!(
        "  Service credits:  {:>4}h ₱{:.2}",
        overall.service_hours, overall.service_credits
    );
    println!("  Collected:              ₱{:.2}", overall.collected());
    println!("  Outstanding:            ₱{:.2}", overall.outstanding);

    if !report.by_event.is_empty() {
        println!();
        println!("By event:");
        for event in &report.by_event {
            println!(
                "  {:<16} {:<28} {:>4}  ₱{:.2}",
                event.event_id,
                event.name.as_deref().unwrap_or("(not configured)"),
                event.fine_count,
                event.fines
            );
        }
    }

    if !report.by_semester.is_empty() {
        println!();
        println!("By semester:");
        for semester in &report.by_semester {
            println!(
                "  {} sem {}  {:>4}  ₱{:.2}",
                semester.school_year, semester.semester, semester.fine_count, semester.fines
            );
        }
    }

    if !report.by_section.is_empty() {
        println!();
        println!("By course and section:");
        for section in &report.by_section {
            println!(
                "  {:<8} {:<4} {:>4} students  fines ₱{:.2}  collected ₱{:.2}  outstanding ₱{:.2}",
                section.course,
                section.section,
                section.students,
                section.totals.fines,
                section.totals.collected(),
                section.totals.outstanding
            );
        }
    }

    if !report.monthly.is_empty() {
        println!();
        println!("Monthly collections:");
        for month in &report.monthly {
            println!(
                "  {}  cash ₱{:.2}  service ₱{:.2}",
                month.month, month.payments, month.service_credits
            );
        }
    }
}

fn run(args: Args) -> Result<()> {
    let engine = open_engine(&args)?;

    match args.command {
        Command::Enroll {
            id,
            first_name,
            last_name,
            course,
            year_level,
            section,
            rfid,
        } => {
            let student = Student {
                id: StudentId::new(id),
                first_name,
                last_name,
                course,
                year_level,
                section,
                rfid_tag: rfid,
            };
            let name = student.full_name();
            engine.enroll_student(student)?;
            println!("Enrolled {}", name);
        }

        Command::Scan { identity, slot, at } => {
            let request = ScanRequest::new(
                identity.into_identity()?,
                EventId::new(slot.event),
                slot.session,
                slot.direction,
                at.unwrap_or_else(rollcall_util::now),
            );
            let outcome = engine.scan(&request)?;
            println!("{}", station::describe_outcome(&outcome));
        }

        Command::CheckOut { event, student, at } => {
            let record = engine.check_out(
                &StudentId::new(student.as_str()),
                &EventId::new(event.as_str()),
                at.unwrap_or_else(rollcall_util::now),
            )?;
            match record {
                Some(_) => println!("Checked out {} from {}", student, event),
                None => println!("{} has no attendance record for {}", student, event),
            }
        }

        Command::Station { slot } => {
            let engine = Arc::new(engine);
            return station::run_station(engine, slot);
        }

        Command::Finalize { event } => {
            let report = engine.finalize_event(&EventId::new(event))?;
            print_report(&report);
        }

        Command::MarkAbsent { slot } => {
            let report = engine.mark_session_absentees(
                &EventId::new(slot.event),
                slot.session,
                slot.direction,
                rollcall_util::now(),
            )?;
            print_report(&report);
        }

        Command::Pay {
            student,
            amount,
            receipt,
            date,
        } => {
            let payment = engine.record_payment(
                &StudentId::new(student),
                amount,
                &receipt,
                date.unwrap_or_else(today),
            )?;
            println!(
                "Recorded payment {} of ₱{:.2} (OR {})",
                payment.payment_id, payment.amount, payment.receipt_no
            );
        }

        Command::Service {
            student,
            hours,
            description,
            date,
        } => {
            let record = engine.record_service(
                &StudentId::new(student),
                hours,
                date.unwrap_or_else(today),
                description,
            )?;
            println!(
                "Recorded {} hour(s) of service as {}, credit ₱{:.2}",
                record.hours,
                record.service_id.credit_payment_id(),
                record.credit_amount
            );
        }

        Command::Ledger {
            student,
            from,
            to,
            json,
        } => {
            let ledger = engine.ledger_for_student(&StudentId::new(student), rollcall_util::now())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&ledger)?);
            } else {
                print_ledger(&ledger, from, to);
            }
        }

        Command::Clearance { student } => {
            let status = engine.clearance(&StudentId::new(student.as_str()))?;
            println!("{}: {}", student, status);
        }

        Command::Report { from, to, json } => {
            let report = engine.summary_report(from, to)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_summary(&report);
            }
        }

        Command::Audit { limit } => {
            for audit in engine.store().get_recent_audits(limit)? {
                println!(
                    "{}  {}",
                    rollcall_util::format_datetime_full(&audit.timestamp),
                    serde_json::to_string(&audit.event)?
                );
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so command output stays clean
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    if rollcall_util::is_mock_time_active() {
        info!(now = %rollcall_util::now(), "Mock time active");
    }

    run(args)
}
