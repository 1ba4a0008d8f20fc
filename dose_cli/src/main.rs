use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use dose_core::journal::read_events;
use dose_core::*;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Doses listed after the next one by `next`
const UPCOMING_LIMIT: usize = 5;

#[derive(Parser)]
#[command(name = "doses")]
#[command(about = "Medication dose scheduling and adherence tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Patient to act on (defaults to the configured patient)
    #[arg(long, global = true)]
    patient: Option<String>,

    /// Evaluate as of this instant (RFC 3339) instead of the current time
    #[arg(long, global = true, value_parser = parse_instant)]
    now: Option<DateTime<Utc>>,

    /// More log output on stderr (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the doses scheduled for a day (default)
    Today {
        /// Local date to show (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },

    /// Show the most urgent dose and what follows it
    Next,

    /// Show adherence rates and the current streak
    Adherence {
        /// Length of the recent-period window in days
        #[arg(long)]
        period_days: Option<u32>,
    },

    /// Log a dose as taken, missed or skipped
    Log {
        /// Dose instance id, as shown by `today` or `next`
        instance_id: Uuid,

        /// Outcome: taken, missed or skipped
        status: String,

        /// When the dose was actually taken (RFC 3339)
        #[arg(long, value_parser = parse_instant)]
        at: Option<DateTime<Utc>>,

        /// Free-text notes
        #[arg(long)]
        notes: Option<String>,

        /// Side effect experienced (repeatable)
        #[arg(long = "side-effect")]
        side_effects: Vec<String>,
    },

    /// Show the dose-log journal
    History,

    /// Export all doses to CSV
    Export {
        /// Output file
        #[arg(long)]
        out: PathBuf,
    },
}

fn parse_instant(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    dose_core::logging::init(cli.verbose);

    let config = Config::load()?;
    let settings = config.schedule_settings()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let patient_id = cli
        .patient
        .unwrap_or_else(|| config.data.patient_id.clone());
    let now = cli.now.unwrap_or_else(Utc::now);

    let session = Session::open(data_dir, patient_id, settings, now)?;

    match cli.command {
        Some(Commands::Today { date }) => cmd_today(&session, date),
        Some(Commands::Next) => cmd_next(&session),
        Some(Commands::Adherence { period_days }) => cmd_adherence(
            &session,
            period_days.unwrap_or(config.adherence.period_days),
        ),
        Some(Commands::Log {
            instance_id,
            status,
            at,
            notes,
            side_effects,
        }) => cmd_log(&session, instance_id, &status, at, notes, side_effects),
        Some(Commands::History) => cmd_history(&session),
        Some(Commands::Export { out }) => cmd_export(&session, &out),
        None => {
            // Default to "today" command
            cmd_today(&session, None)
        }
    }
}

/// One patient's ledger, loaded and synced for the duration of a command
struct Session {
    engine: DoseEngine,
    patient_id: String,
    now: DateTime<Utc>,
    snapshot_path: PathBuf,
    journal_path: PathBuf,
    _lock: PatientLock,
}

impl Session {
    fn open(
        data_dir: PathBuf,
        patient_id: String,
        settings: ScheduleSettings,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let state_dir = data_dir.join("state");
        let snapshot_path = state_dir.join(format!("{}.json", patient_id));
        let lock = PatientLock::acquire(&state_dir.join(format!("{}.lock", patient_id)))?;

        let prescriptions: Vec<Prescription> =
            load_prescriptions(&data_dir.join("prescriptions.json"))?
                .into_iter()
                .filter(|p| p.patient_id == patient_id)
                .collect();

        tracing::debug!(
            "Opening ledger for {} at {} ({} prescriptions)",
            patient_id,
            now,
            prescriptions.len()
        );

        let engine = DoseEngine::new(settings);
        engine.restore(LedgerSnapshot::load(&snapshot_path, &patient_id)?)?;
        engine.sync_prescriptions(&patient_id, &prescriptions, now)?;

        let session = Self {
            engine,
            patient_id,
            now,
            snapshot_path,
            journal_path: data_dir.join("journal").join("dose_log.jsonl"),
            _lock: lock,
        };
        session.save()?;
        Ok(session)
    }

    fn save(&self) -> Result<()> {
        if let Some(snapshot) = self.engine.snapshot(&self.patient_id)? {
            snapshot.save(&self.snapshot_path)?;
        }
        Ok(())
    }

    fn settings(&self) -> &ScheduleSettings {
        self.engine.settings()
    }

    fn order(&self, order_id: &str) -> Result<Option<MedicationOrder>> {
        Ok(self
            .engine
            .read(&self.patient_id, |ledger| ledger.order(order_id).cloned())?
            .flatten())
    }

    fn local_time(&self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.settings().local_offset)
            .format("%H:%M")
            .to_string()
    }

    fn local_datetime(&self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.settings().local_offset)
            .format("%Y-%m-%d %H:%M")
            .to_string()
    }
}

fn cmd_today(session: &Session, date: Option<NaiveDate>) -> Result<()> {
    let date = date.unwrap_or_else(|| session.settings().local_date(session.now));
    let doses = session
        .engine
        .get_today_schedule(&session.patient_id, date, session.now)?;

    if doses.is_empty() {
        println!("No doses scheduled for {}.", date);
        return Ok(());
    }

    println!("Schedule for {} ({})", date, session.patient_id);
    println!();
    for dose in &doses {
        let (name, dosage, category) = match session.order(&dose.order_id)? {
            Some(order) => {
                let category = categorize(&order.name);
                (order.name, order.dosage_text, category)
            }
            None => (dose.order_id.clone(), String::new(), MedicationCategory::Medicine),
        };
        println!(
            "  {}  {:<8} {} {} [{}]",
            session.local_time(dose.scheduled_time),
            dose.status,
            name,
            dosage,
            category
        );
        println!("         id: {}", dose.id);
    }

    Ok(())
}

fn cmd_next(session: &Session) -> Result<()> {
    let upcoming = session
        .engine
        .get_upcoming(&session.patient_id, session.now, UPCOMING_LIMIT + 1)?;

    let Some((next, rest)) = upcoming.split_first() else {
        println!("No upcoming doses.");
        return Ok(());
    };

    let name = session
        .order(&next.instance.order_id)?
        .map(|o| format!("{} {}", o.name, o.dosage_text))
        .unwrap_or_else(|| next.instance.order_id.clone());

    println!("Next dose: {}", name.trim());
    println!(
        "  At: {} ({})",
        session.local_datetime(next.instance.scheduled_time),
        format_countdown(next.countdown)
    );
    println!("  Status: {}", next.severity);
    println!("  id: {}", next.instance.id);

    if !rest.is_empty() {
        println!();
        println!("Then:");
        for dose in rest {
            let name = session
                .order(&dose.instance.order_id)?
                .map(|o| o.name)
                .unwrap_or_else(|| dose.instance.order_id.clone());
            println!(
                "  {}  {} (in {})",
                session.local_datetime(dose.instance.scheduled_time),
                name,
                format_countdown(dose.countdown)
            );
        }
    }

    Ok(())
}

fn format_rate(rate: Option<f64>) -> String {
    rate.map(|r| format!("{:.0}%", r * 100.0))
        .unwrap_or_else(|| "n/a".into())
}

fn cmd_adherence(session: &Session, period_days: u32) -> Result<()> {
    let snapshot = session
        .engine
        .get_adherence(&session.patient_id, period_days, session.now)?;

    println!("Adherence for {}", session.patient_id);
    println!("  Overall:          {}", format_rate(snapshot.overall_rate));
    println!(
        "  Last {} days:      {}",
        period_days,
        format_rate(snapshot.period_rate)
    );
    println!("  Last 30 days:     {}", format_rate(snapshot.month_rate));
    println!("  Streak:           {} days", snapshot.streak_days);

    if !snapshot.per_medication.is_empty() {
        println!();
        for med in &snapshot.per_medication {
            let name = session
                .order(&med.order_id)?
                .map(|o| o.name)
                .unwrap_or_else(|| med.order_id.clone());
            println!(
                "  {:<20} {:>4}  taken {} / missed {} / skipped {}",
                name,
                format_rate(med.rate),
                med.taken_count,
                med.missed_count,
                med.skipped_count
            );
        }
    }

    Ok(())
}

fn cmd_log(
    session: &Session,
    instance_id: Uuid,
    status: &str,
    at: Option<DateTime<Utc>>,
    notes: Option<String>,
    side_effects: Vec<String>,
) -> Result<()> {
    let mut log = DoseLog::new(status.parse()?);
    if let Some(at) = at {
        log = log.at(at);
    }
    if let Some(notes) = notes {
        log = log.with_notes(notes);
    }
    for effect in &side_effects {
        log = log.with_side_effect(canonical_side_effect(effect));
    }

    let logged = match session.engine.log_dose(instance_id, log, session.now) {
        Ok(logged) => logged,
        Err(Error::AlreadyLogged { instance_id, existing }) => {
            eprintln!("Dose {} was already logged as {}", instance_id, existing.status);
            if let Some(logged_at) = existing.logged_at {
                eprintln!("  Logged at: {}", session.local_datetime(logged_at));
            }
            if let Some(notes) = &existing.notes {
                eprintln!("  Notes: {}", notes);
            }
            return Err(Error::AlreadyLogged {
                instance_id,
                existing,
            });
        }
        Err(e) => return Err(e),
    };

    session.save()?;
    let mut journal = JsonlJournal::new(&session.journal_path);
    journal.append(&DoseLogEvent::from_instance(
        &session.patient_id,
        &logged,
        session.now,
    ))?;

    let name = session
        .order(&logged.order_id)?
        .map(|o| o.name)
        .unwrap_or_else(|| logged.order_id.clone());
    println!("✓ Logged {} as {}", name, logged.status);
    if let Some(actual) = logged.actual_time {
        println!("  Taken at: {}", session.local_datetime(actual));
    }
    if !logged.side_effects.is_empty() {
        let effects: Vec<&str> = logged.side_effects.iter().map(String::as_str).collect();
        println!("  Side effects: {}", effects.join(", "));
    }

    Ok(())
}

fn cmd_history(session: &Session) -> Result<()> {
    let events: Vec<DoseLogEvent> = read_events(&session.journal_path)?
        .into_iter()
        .filter(|e| e.patient_id == session.patient_id)
        .collect();

    if events.is_empty() {
        println!("No doses logged yet.");
        return Ok(());
    }

    for event in &events {
        let name = session
            .order(&event.order_id)?
            .map(|o| o.name)
            .unwrap_or_else(|| event.order_id.clone());
        println!(
            "{}  {:<8} {} (scheduled {})",
            session.local_datetime(event.logged_at),
            event.status,
            name,
            session.local_datetime(event.scheduled_time)
        );
        if let Some(notes) = &event.notes {
            println!("    notes: {}", notes);
        }
    }

    Ok(())
}

fn cmd_export(session: &Session, out: &Path) -> Result<()> {
    let count = session
        .engine
        .read(&session.patient_id, |ledger| {
            export_csv(ledger, &DoseFilter::default(), session.now, out)
        })?
        .transpose()?
        .unwrap_or(0);

    println!("✓ Exported {} doses", count);
    println!("  CSV: {}", out.display());
    Ok(())
}
