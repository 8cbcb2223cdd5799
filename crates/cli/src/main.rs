mod throttle;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use nwd_core::{
    constants::DEFAULT_DATA_DIR, Actor, AssessmentRequest, CertificateId, CertificationService,
    CoreConfig, CoreError, Curriculum, CurriculumId, EnrollmentId, GearTypeId, ImportRow,
    NewRequest, PersonId, Privilege, RequestId, RequestRef, RequestStatus, RequestType, StoreKind,
    TaskUnitId,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use throttle::{import_throttled, Throttle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nwd")]
#[command(about = "NWD sailing certification CLI")]
struct Cli {
    /// Record directory
    #[arg(long, env = "NWD_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,
    /// Location name stamped on requests and commits
    #[arg(long, env = "NWD_LOCATION")]
    location: String,
    /// Store backend: git or memory
    #[arg(long, env = "NWD_STORE", default_value = "git")]
    store: StoreKind,
    #[command(flatten)]
    actor: ActorArgs,
    #[command(subcommand)]
    command: Option<Commands>,
}

/// The person on whose behalf the command runs.
#[derive(Args)]
struct ActorArgs {
    #[arg(long = "actor-id", env = "NWD_ACTOR_ID", global = true)]
    id: Option<String>,
    #[arg(long = "actor-name", env = "NWD_ACTOR_NAME", global = true)]
    name: Option<String>,
    #[arg(
        long = "actor-privilege",
        env = "NWD_ACTOR_PRIVILEGE",
        global = true,
        default_value = "member"
    )]
    privilege: Privilege,
}

#[derive(Subcommand)]
enum Commands {
    /// Curriculum management
    #[command(subcommand)]
    Curriculum(CurriculumCommands),
    /// Enroll a person in a curriculum
    Enroll {
        #[arg(long)]
        person: PersonId,
        #[arg(long)]
        curriculum: CurriculumId,
        #[arg(long)]
        gear_type: GearTypeId,
    },
    /// Progress of enrollments
    #[command(subcommand)]
    Progress(ProgressCommands),
    /// Assessment requests (PvB)
    #[command(subcommand)]
    Request(RequestCommands),
    /// Certificates
    #[command(subcommand)]
    Certificate(CertificateCommands),
    /// Import historical qualifications from a YAML list of rows
    Import {
        file: PathBuf,
        /// Rows per chunk
        #[arg(long, default_value_t = 50)]
        chunk_size: usize,
        /// Rate limit; 0 disables pacing
        #[arg(long, default_value_t = 20)]
        rows_per_second: u32,
    },
}

#[derive(Subcommand)]
enum CurriculumCommands {
    /// Register a curriculum revision from a YAML file
    Register { file: PathBuf },
}

#[derive(Subcommand)]
enum ProgressCommands {
    /// Show per-module progress
    Show { enrollment: EnrollmentId },
    /// Record progress (0-100) for one competency
    Record {
        enrollment: EnrollmentId,
        competency: nwd_core::CompetencyId,
        value: u8,
    },
    /// Complete every competency of every required module
    CompleteCore {
        #[arg(required = true)]
        enrollments: Vec<EnrollmentId>,
    },
    /// Terminate enrollments
    Terminate {
        #[arg(required = true)]
        enrollments: Vec<EnrollmentId>,
    },
}

/// Request ids, each optionally suffixed with `@version`.
#[derive(Args)]
struct Targets {
    #[arg(required = true)]
    requests: Vec<String>,
}

impl Targets {
    fn refs(&self) -> anyhow::Result<Vec<RequestRef>> {
        self.requests.iter().map(|raw| parse_target(raw)).collect()
    }
}

fn parse_target(raw: &str) -> anyhow::Result<RequestRef> {
    match raw.split_once('@') {
        Some((id, version)) => Ok(RequestRef::at_version(
            RequestId::parse(id)?,
            version
                .parse()
                .with_context(|| format!("invalid version in '{raw}'"))?,
        )),
        None => Ok(RequestRef::from(RequestId::parse(raw)?)),
    }
}

#[derive(Subcommand)]
enum RequestCommands {
    /// Create a request in concept
    Create {
        #[arg(long = "type")]
        request_type: RequestType,
        #[arg(long)]
        candidate: PersonId,
        #[arg(long = "task-unit", required = true)]
        task_units: Vec<TaskUnitId>,
        #[arg(long)]
        location: Option<String>,
    },
    /// List requests
    List {
        #[arg(long)]
        status: Option<RequestStatus>,
    },
    /// Show one request
    Show { id: RequestId },
    Submit(Targets),
    Cancel(Targets),
    /// Set the start time (RFC 3339)
    StartTime {
        #[arg(long)]
        at: DateTime<Utc>,
        #[command(flatten)]
        targets: Targets,
    },
    /// Assign a learning coach
    Coach {
        #[arg(long)]
        coach: PersonId,
        #[command(flatten)]
        targets: Targets,
    },
    /// Grant the coach's permission on their behalf
    Grant(Targets),
    /// Respond as the assigned learning coach
    Respond {
        #[arg(long)]
        decline: bool,
        #[command(flatten)]
        targets: Targets,
    },
    /// Assign an assessor to every task unit
    Assessor {
        #[arg(long)]
        assessor: PersonId,
        #[command(flatten)]
        targets: Targets,
    },
    Start(Targets),
    Complete(Targets),
    Abort(Targets),
}

#[derive(Subcommand)]
enum CertificateCommands {
    /// Issue certificates
    Issue {
        #[arg(required = true)]
        enrollments: Vec<EnrollmentId>,
        /// Student-facing visibility moment (RFC 3339), at most 72 hours ahead
        #[arg(long)]
        visible_from: Option<DateTime<Utc>>,
    },
    /// Withdraw certificates within 24 hours of issuance
    Withdraw {
        #[arg(required = true)]
        certificates: Vec<CertificateId>,
    },
    /// Verify a certificate handle and code
    Verify { handle: String, code: String },
}

fn actor(args: &ActorArgs) -> anyhow::Result<Actor> {
    let id = args
        .id
        .as_deref()
        .context("--actor-id (or NWD_ACTOR_ID) is required for this command")?;
    let name = args.name.as_deref().unwrap_or("nwd-cli");
    Ok(Actor::new(PersonId::parse(id)?, name, args.privilege)?)
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let de = serde_yaml::Deserializer::from_str(&text);
    serde_path_to_error::deserialize(de).with_context(|| format!("parsing {}", path.display()))
}

fn print_requests(requests: &[AssessmentRequest]) {
    if requests.is_empty() {
        println!("No requests found.");
    }
    for r in requests {
        println!(
            "{} {} [{}] {} candidate={} v{}",
            r.handle, r.id, r.status, r.request_type, r.candidate, r.version
        );
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nwd_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'nwd --help' for commands");
        return Ok(());
    };

    let cfg = Arc::new(CoreConfig::new(cli.data_dir, &cli.location)?);
    let service = CertificationService::open(cfg, cli.store)?;

    match command {
        Commands::Curriculum(CurriculumCommands::Register { file }) => {
            let curriculum: Curriculum = read_yaml(&file)?;
            let c = service.register_curriculum(&actor(&cli.actor)?, curriculum)?;
            println!("Registered curriculum {} revision {}", c.id, c.revision);
        }
        Commands::Enroll {
            person,
            curriculum,
            gear_type,
        } => {
            let e = service.enroll(&actor(&cli.actor)?, person, curriculum, gear_type)?;
            println!(
                "Enrolled: {} ({} competencies carried over)",
                e.id,
                e.completed_ever.len()
            );
        }
        Commands::Progress(cmd) => match cmd {
            ProgressCommands::Show { enrollment } => {
                let s = service.progress_summary(enrollment)?;
                for m in &s.modules {
                    let marker = if m.required { "*" } else { " " };
                    println!("{marker} {:<30} {}/{}", m.title, m.completed, m.total);
                }
                println!(
                    "required {}/{}, total {}/{}",
                    s.required_completed, s.required_total, s.completed, s.total
                );
            }
            ProgressCommands::Record {
                enrollment,
                competency,
                value,
            } => {
                service.record_progress(&actor(&cli.actor)?, enrollment, competency, value)?;
                println!("Recorded {value} for {competency}");
            }
            ProgressCommands::CompleteCore { enrollments } => {
                let updated =
                    service.complete_core_competencies(&actor(&cli.actor)?, &enrollments)?;
                println!("Completed core competencies for {} enrollments", updated.len());
            }
            ProgressCommands::Terminate { enrollments } => {
                let updated = service.terminate_enrollments(&actor(&cli.actor)?, &enrollments)?;
                println!("Terminated {} enrollments", updated.len());
            }
        },
        Commands::Request(cmd) => run_request(&service, &cli.actor, cmd)?,
        Commands::Certificate(cmd) => match cmd {
            CertificateCommands::Issue {
                enrollments,
                visible_from,
            } => {
                let issued =
                    service.issue_certificates(&actor(&cli.actor)?, &enrollments, visible_from)?;
                for c in issued {
                    println!("{} {} code={}", c.handle, c.id, c.verification_code);
                }
            }
            CertificateCommands::Withdraw { certificates } => {
                match service.withdraw_certificates(&actor(&cli.actor)?, &certificates) {
                    Ok(()) => println!("Withdrew {} certificates", certificates.len()),
                    Err(e @ CoreError::WithdrawalWindowExpired { .. }) => {
                        anyhow::bail!(e.user_message())
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            CertificateCommands::Verify { handle, code } => {
                match service.verify_certificate(&handle, &code)? {
                    Some(c) => println!(
                        "VALID: {} issued {} to {}",
                        c.handle,
                        c.issued_at.to_rfc3339(),
                        c.person
                    ),
                    None => println!("INVALID: no certificate matches this handle and code"),
                }
            }
        },
        Commands::Import {
            file,
            chunk_size,
            rows_per_second,
        } => {
            let rows: Vec<ImportRow> = read_yaml(&file)?;
            let report = import_throttled(
                &service,
                &actor(&cli.actor)?,
                &rows,
                Throttle {
                    chunk_size,
                    rows_per_second,
                },
                |done, total| eprintln!("{done}/{total} rows processed"),
            )?;
            println!("Imported {} of {} rows", report.succeeded, report.total());
            for e in &report.failed {
                println!("  row {}: {}", e.row, e.reason);
            }
        }
    }

    Ok(())
}

fn run_request(
    service: &CertificationService,
    actor_args: &ActorArgs,
    cmd: RequestCommands,
) -> anyhow::Result<()> {
    let updated = match cmd {
        RequestCommands::Create {
            request_type,
            candidate,
            task_units,
            location,
        } => {
            let location = location
                .map(nwd_types::NonEmptyText::new)
                .transpose()
                .map_err(CoreError::from)?;
            let r = service.create_request(
                &actor(actor_args)?,
                NewRequest {
                    request_type,
                    candidate,
                    task_units,
                    location,
                },
            )?;
            println!("Created {} ({})", r.handle, r.id);
            return Ok(());
        }
        RequestCommands::List { status } => {
            print_requests(&service.requests(status)?);
            return Ok(());
        }
        RequestCommands::Show { id } => {
            print_requests(&[service.request(id)?]);
            return Ok(());
        }
        RequestCommands::Submit(t) => service.submit_requests(&actor(actor_args)?, &t.refs()?)?,
        RequestCommands::Cancel(t) => service.cancel_requests(&actor(actor_args)?, &t.refs()?)?,
        RequestCommands::StartTime { at, targets } => {
            service.update_start_time(&actor(actor_args)?, &targets.refs()?, at)?
        }
        RequestCommands::Coach { coach, targets } => {
            service.assign_learning_coach(&actor(actor_args)?, &targets.refs()?, coach)?
        }
        RequestCommands::Grant(t) => {
            service.grant_learning_coach_permission(&actor(actor_args)?, &t.refs()?)?
        }
        RequestCommands::Respond { decline, targets } => {
            service.respond_as_learning_coach(&actor(actor_args)?, &targets.refs()?, !decline)?
        }
        RequestCommands::Assessor { assessor, targets } => {
            service.assign_assessor(&actor(actor_args)?, &targets.refs()?, assessor)?
        }
        RequestCommands::Start(t) => service.start_assessments(&actor(actor_args)?, &t.refs()?)?,
        RequestCommands::Complete(t) => {
            service.complete_assessments(&actor(actor_args)?, &t.refs()?)?
        }
        RequestCommands::Abort(t) => service.abort_requests(&actor(actor_args)?, &t.refs()?)?,
    };
    print_requests(&updated);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn targets_accept_versions() {
        let id = RequestId::new();
        let r = parse_target(&format!("{id}@3")).unwrap();
        assert_eq!(r.version, Some(3));
        assert_eq!(parse_target(&id.to_string()).unwrap().version, None);
        assert!(parse_target(&format!("{id}@x")).is_err());
    }

    #[test]
    fn import_defaults_match_documented_throttle() {
        let cli = Cli::try_parse_from([
            "nwd",
            "--location",
            "Sneek",
            "import",
            "rows.yaml",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Import {
                chunk_size,
                rows_per_second,
                ..
            }) => {
                assert_eq!(chunk_size, 50);
                assert_eq!(rows_per_second, 20);
            }
            _ => panic!("expected import command"),
        }
    }
}
