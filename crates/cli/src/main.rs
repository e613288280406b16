use clap::{Parser, Subcommand};
use outreach_core::{
    config::path_from_env_value, constants, indicator_signals, CoreConfig, CoreContext,
    OutreachError, OutreachService, Patient, Priority, ReminderDispatcher, RuleTablePolicy,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "outreach")]
#[command(about = "Patient outreach workflow CLI")]
#[command(after_help = "Exit codes:
  0  success
  1  invalid input, unreadable data or any other failure
  3  patient or cohort not found
  4  patient already received a reminder in this run
  5  a reminder could not be delivered")]
struct Cli {
    /// Patient data JSON file (defaults to $OUTREACH_PATIENT_DATA, then demo patients)
    #[arg(long, global = true)]
    patients: Option<PathBuf>,
    /// Cohort catalog YAML file (defaults to $OUTREACH_COHORT_CATALOG, then built-in)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all patients
    List {
        /// Only patients at least this old
        #[arg(long)]
        min_age: Option<u32>,
        /// Only patients at most this old
        #[arg(long)]
        max_age: Option<u32>,
    },
    /// Show one patient record
    Show {
        /// Patient id
        id: i64,
    },
    /// Find patients whose facts mention any of the terms
    Search {
        #[arg(required = true)]
        terms: Vec<String>,
    },
    /// Show the cohort catalog summary
    Cohorts,
    /// Classify a patient into cohorts
    Classify {
        /// Patient id
        id: i64,
    },
    /// Evaluate a patient against one cohort's intervention criteria
    Evaluate {
        /// Patient id
        id: i64,
        /// Cohort key, e.g. diabetic
        cohort: String,
    },
    /// Show the analysis together with the interventions a cohort offers
    Options {
        /// Patient id
        id: i64,
        /// Cohort key, e.g. diabetic
        cohort: String,
    },
    /// Count structured indicator signals per cohort (diagnostic only)
    Signals {
        /// Patient id
        id: i64,
    },
    /// Send one reminder in a fresh run
    Remind {
        /// Patient id
        id: i64,
        /// Reminder type, e.g. hba1c_testing
        reminder_type: String,
        /// low, normal, high or urgent
        #[arg(long, default_value = "normal")]
        priority: Priority,
    },
    /// Run the rule-table workflow over every patient and print the report
    Run,
}

/// Exit status for any failure without a more specific code.
const EXIT_FAILURE: u8 = 1;
/// The requested patient or cohort does not exist.
const EXIT_NOT_FOUND: u8 = 3;
/// The patient already received a reminder in this run.
const EXIT_DUPLICATE: u8 = 4;
/// A reminder could not be delivered.
const EXIT_DISPATCH_FAILED: u8 = 5;

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

fn run() -> anyhow::Result<u8> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("outreach=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Use 'outreach --help' for commands");
        return Ok(0);
    };

    let patients = cli.patients.or_else(|| {
        path_from_env_value(std::env::var(constants::PATIENT_DATA_ENV).ok())
    });
    let catalog = cli.catalog.or_else(|| {
        path_from_env_value(std::env::var(constants::COHORT_CATALOG_ENV).ok())
    });
    let cfg = CoreConfig::new(patients, catalog)?;
    let service = OutreachService::new(
        Arc::new(CoreContext::from_config(&cfg)?),
        Arc::new(ReminderDispatcher::default()),
    );

    execute(command, &service)
}

/// Maps a failed command to its process exit status.
fn exit_code(e: &anyhow::Error) -> u8 {
    match e.downcast_ref::<OutreachError>() {
        Some(err) if err.is_not_found() => EXIT_NOT_FOUND,
        Some(OutreachError::DuplicateDispatch { .. }) => EXIT_DUPLICATE,
        Some(OutreachError::DispatchFailure { .. }) => EXIT_DISPATCH_FAILED,
        _ => EXIT_FAILURE,
    }
}

fn find_patient(service: &OutreachService, id: i64) -> Result<&Patient, OutreachError> {
    service
        .get_patient(id)
        .ok_or(OutreachError::PatientNotFound(id))
}

fn execute(command: Commands, service: &OutreachService) -> anyhow::Result<u8> {
    match command {
        Commands::List { min_age, max_age } => {
            let patients: Vec<&Patient> = if min_age.is_some() || max_age.is_some() {
                service.context().patients().by_age_range(min_age, max_age)
            } else {
                service.list_patients().iter().collect()
            };
            if patients.is_empty() {
                println!("No patients found.");
            } else {
                for patient in patients {
                    let age = patient
                        .age
                        .map(|a| a.to_string())
                        .unwrap_or_else(|| "?".into());
                    println!(
                        "ID: {}, Name: {}, Age: {}, Facts: {}",
                        patient.id,
                        patient.name,
                        age,
                        patient.supporting_facts.join("; ")
                    );
                }
            }
        }
        Commands::Show { id } => print_json(find_patient(service, id)?)?,
        Commands::Search { terms } => {
            let found = service.search_patients(&terms);
            if found.is_empty() {
                println!("No patients match.");
            }
            for patient in found {
                println!("ID: {}, Name: {}", patient.id, patient.name);
            }
        }
        Commands::Cohorts => print_json(&service.list_cohorts().summary())?,
        Commands::Classify { id } => {
            let patient = find_patient(service, id)?;
            print_json(&service.classify(patient))?;
        }
        Commands::Evaluate { id, cohort } => {
            let patient = find_patient(service, id)?;
            print_json(&service.evaluate(patient, &cohort)?)?;
        }
        Commands::Options { id, cohort } => {
            let patient = find_patient(service, id)?;
            print_json(&service.intervention_options(patient, &cohort)?)?;
        }
        Commands::Signals { id } => {
            let signals = indicator_signals(find_patient(service, id)?);
            print_json(&signals)?;
            match signals.dominant_cohort() {
                Some(cohort) => println!("Dominant cohort: {}", cohort),
                None => println!("No dominant cohort"),
            }
        }
        Commands::Remind {
            id,
            reminder_type,
            priority,
        } => {
            let run = service.begin_run();
            print_json(&run.dispatch_reminder(id, &reminder_type, priority)?)?;
        }
        Commands::Run => {
            let report = service.begin_run().execute(&RuleTablePolicy)?;
            print_json(&report)?;
            if !report.failures.is_empty() {
                eprintln!("{} reminder(s) could not be delivered", report.failures.len());
                return Ok(EXIT_DISPATCH_FAILED);
            }
        }
    }

    Ok(0)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
