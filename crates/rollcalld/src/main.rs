use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

mod cache;
mod capture;
mod config;
mod coordinator;
mod detector;
mod engine;
mod loops;
mod overlay;
mod session;
mod submitter;
#[cfg(test)]
mod testutil;

use rollcall_api::{ApiClient, AttendanceBackend};
use rollcall_core::{
    derive_absent_list,
    types::{AttendanceStatus, SessionStatus},
};

use capture::DirectoryFrameSource;
use config::Config;
use coordinator::CaptureOutcome;
use detector::RemoteDetector;
use engine::Engine;
use loops::LoopMode;
use overlay::LogOverlay;

#[derive(Parser)]
#[command(name = "rollcalld", about = "Face-recognition attendance daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Landmark overlay only, no recognition
    Landmark,
    /// Periodic recognition with automatic submission
    Auto,
}

impl From<Mode> for LoopMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Landmark => LoopMode::Landmark,
            Mode::Auto => LoopMode::Auto,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run detection for a session until interrupted
    Run {
        /// Attendance session id
        #[arg(short, long)]
        session: String,
        /// Directory of frame images standing in for the camera stream
        #[arg(short, long)]
        frames: PathBuf,
        /// Detection mode to start in
        #[arg(short, long, value_enum, default_value = "auto")]
        mode: Mode,
    },
    /// Mark a session completed
    Complete {
        /// Attendance session id
        #[arg(short, long)]
        session: String,
    },
    /// Show a session's status and its absent list
    Status {
        /// Attendance session id
        #[arg(short, long)]
        session: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let backend: Arc<dyn AttendanceBackend> =
        Arc::new(ApiClient::new(&config.api_base, &config.api_token));

    match cli.command {
        Commands::Run {
            session,
            frames,
            mode,
        } => run(config, backend, &session, &frames, mode.into()).await,
        Commands::Complete { session } => complete(backend, &session).await,
        Commands::Status { session } => status(backend, &session).await,
    }
}

async fn run(
    config: Config,
    backend: Arc<dyn AttendanceBackend>,
    session_id: &str,
    frames: &std::path::Path,
    mode: LoopMode,
) -> Result<()> {
    tracing::info!(session = session_id, "rollcalld starting");

    let detector = Arc::new(RemoteDetector::new(
        &config.detector_url,
        config.snapshot_quality,
    ));
    let camera = Arc::new(DirectoryFrameSource::open(frames)?);
    let overlay = Arc::new(LogOverlay);

    let engine = Engine::connect(
        config,
        backend,
        detector,
        camera,
        overlay,
        session_id,
    )
    .await?;

    engine.open_session().await?;
    match mode {
        LoopMode::Landmark => engine.start_landmark_mode().await?,
        LoopMode::Auto => engine.start_auto_mode().await?,
    }
    tracing::info!(?mode, "rollcalld ready; commands on stdin, ctrl-c to exit");

    control_loop(&engine).await?;
    tracing::info!("rollcalld shutting down");
    engine.teardown().await;

    Ok(())
}

/// Line-oriented control surface on stdin, standing in for the
/// interactive attendance UI. Runs until ctrl-c, `quit`, or the session
/// is completed.
async fn control_loop(engine: &Engine) -> Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else { continue };
        let result = dispatch(engine, command, &words.collect::<Vec<_>>()).await;
        match result {
            Ok(ControlFlow::Continue) => {}
            Ok(ControlFlow::Quit) => break,
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

enum ControlFlow {
    Continue,
    Quit,
}

async fn dispatch(engine: &Engine, command: &str, args: &[&str]) -> Result<ControlFlow> {
    match (command, args) {
        ("auto", []) => engine.start_auto_mode().await?,
        ("landmark", []) => engine.start_landmark_mode().await?,
        ("stop", []) => engine.stop_loops().await,
        ("mode", []) => match engine.active_mode().await {
            Some(mode) => println!("{mode:?}"),
            None => println!("stopped"),
        },
        ("capture", []) => match engine.manual_capture().await? {
            CaptureOutcome::Submitted {
                student_name,
                confidence,
                ..
            } => println!("recognized {student_name} ({confidence:.2})"),
            CaptureOutcome::NoMatch => println!("no matching student"),
            CaptureOutcome::NoFace => println!("no face detected"),
        },
        ("mark", [student, status]) => {
            let status = parse_status(status)?;
            engine.manual_entry(student, status, None).await?;
        }
        ("mark", [student, status, note @ ..]) => {
            let status = parse_status(status)?;
            engine
                .manual_entry(student, status, Some(note.join(" ")))
                .await?;
        }
        ("approve", [request_id]) => engine.approve_absence(request_id).await?,
        ("reject", [request_id]) => engine.reject_absence(request_id).await?,
        ("absent", []) => {
            for entry in engine.absent_list() {
                println!("{} ({}) [{:?}]", entry.member_name, entry.member_id, entry.action);
            }
        }
        ("refresh", []) => engine.refresh(),
        ("complete", []) => {
            engine.complete_session().await?;
            println!("session {} completed", engine.session_id());
            return Ok(ControlFlow::Quit);
        }
        ("quit", []) => return Ok(ControlFlow::Quit),
        _ => eprintln!(
            "commands: auto | landmark | stop | mode | capture | mark <student> <status> [note] \
             | approve <req> | reject <req> | absent | refresh | complete | quit"
        ),
    }
    Ok(ControlFlow::Continue)
}

fn parse_status(raw: &str) -> Result<AttendanceStatus> {
    match raw {
        "present" => Ok(AttendanceStatus::Present),
        "late" => Ok(AttendanceStatus::Late),
        "absent" => Ok(AttendanceStatus::Absent),
        "excused" => Ok(AttendanceStatus::Excused),
        other => bail!("unknown attendance status {other:?}"),
    }
}

async fn complete(backend: Arc<dyn AttendanceBackend>, session_id: &str) -> Result<()> {
    let session = backend.session(session_id).await?;
    if !session.status.can_transition_to(SessionStatus::Completed) {
        bail!("session {session_id} is already completed");
    }
    backend
        .set_session_status(session_id, SessionStatus::Completed)
        .await?;
    println!("session {session_id} completed");
    Ok(())
}

async fn status(backend: Arc<dyn AttendanceBackend>, session_id: &str) -> Result<()> {
    let session = backend.session(session_id).await?;
    let roster = backend.class_roster(&session.class_id).await?;
    let logs = backend.attendance_logs(session_id).await?;
    let requests = backend.absence_requests(session_id).await?;

    println!("session:  {} ({:?})", session.id, session.status);
    println!("class:    {}", session.class_id);
    println!("schedule: {}", session.scheduled_at);
    println!(
        "roster:   {} students, {} with face data",
        roster.len(),
        roster.iter().filter(|m| m.has_face_data()).count()
    );
    println!("logged:   {} attendance records", logs.len());

    let absent = derive_absent_list(&roster, &logs, &requests, session.scheduled_at.date());
    println!("absent:   {}", absent.len());
    for entry in absent {
        match entry.request {
            Some(request) => println!(
                "  {} ({}) - leave request {} [{:?}]",
                entry.member_name, entry.member_id, request.id, request.status
            ),
            None => println!("  {} ({})", entry.member_name, entry.member_id),
        }
    }
    Ok(())
}
