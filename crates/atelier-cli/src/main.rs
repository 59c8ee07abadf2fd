use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use atelier_contracts::commands::{parse_line, SessionCommand};
use atelier_contracts::error::EditError;
use atelier_contracts::events::EventWriter;
use atelier_contracts::image::{
    extension_for_media_type, media_type_for_path, EditedImage, WorkingImage,
};
use atelier_contracts::models::{ModelCatalog, DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL};
use atelier_contracts::request::{
    AspectRatio, EnhanceQuality, EnhanceStyle, ExpandQuality, MergeMode, MockupTheme,
    OperationKind, OperationRequest, RemovalMode,
};
use atelier_contracts::session::{Completion, EditSession, Submission};
use atelier_engine::{clamp_timeout, short_artifact_id, EditEngine, DEFAULT_TIMEOUT_SECONDS};
use clap::{Parser, Subcommand};
use image::GenericImageView;
use serde_json::{json, Value};
use similar::TextDiff;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "atelier", version, about = "Session-based AI image editing")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive editing session.
    Edit(EditArgs),
    /// One edit, start to finish, no session.
    Process(ProcessArgs),
    /// Rewrite a prompt through the text model and print it.
    Polish(PolishArgs),
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_IMAGE_MODEL)]
    image_model: String,
    #[arg(long, default_value = DEFAULT_TEXT_MODEL)]
    text_model: String,
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECONDS)]
    timeout: u64,
    /// Image to open before the first prompt.
    #[arg(long)]
    input: Option<PathBuf>,
    /// Merge reference to attach after --input.
    #[arg(long)]
    reference: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ProcessArgs {
    #[arg(long)]
    input: PathBuf,
    /// Second image for merge.
    #[arg(long)]
    reference: Option<PathBuf>,
    /// enhance, expand, remove-background, mockup, or merge.
    #[arg(long)]
    mode: String,
    #[arg(long, default_value = "auto")]
    style: String,
    /// Quality tier (enhance: hd|4k|8k, expand: same|hd|4k|8k).
    #[arg(long)]
    quality: Option<String>,
    #[arg(long, default_value = "")]
    prompt: String,
    #[arg(long, default_value = "original")]
    ratio: String,
    #[arg(long, default_value = "strict")]
    removal: String,
    #[arg(long)]
    enhance_subject: bool,
    #[arg(long, default_value = "modern_studio")]
    theme: String,
    #[arg(long, default_value = "replace")]
    merge: String,
    /// Result path; defaults to a timestamped file under --out.
    #[arg(long)]
    save: Option<PathBuf>,
    /// Also print the result as a data URI.
    #[arg(long)]
    data_uri: bool,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_IMAGE_MODEL)]
    image_model: String,
    #[arg(long, default_value = DEFAULT_TEXT_MODEL)]
    text_model: String,
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECONDS)]
    timeout: u64,
}

#[derive(Debug, Parser)]
struct PolishArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_TEXT_MODEL)]
    text_model: String,
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECONDS)]
    timeout: u64,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("atelier error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Edit(args) => {
            run_edit(args)?;
            Ok(0)
        }
        Command::Process(args) => run_process(args),
        Command::Polish(args) => run_polish(args),
    }
}

/// What the submission worker reports back to the REPL loop.
struct WorkerReport {
    generation: u64,
    operation: OperationKind,
    outcome: Result<EditedImage, EditError>,
}

/// The live submission thread plus what it is working on.
struct Worker {
    handle: thread::JoinHandle<()>,
    operation: OperationKind,
}

fn run_edit(args: EditArgs) -> Result<()> {
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let session_id = Uuid::new_v4().to_string();
    let events = EventWriter::new(&events_path, session_id);
    let catalog = ModelCatalog::builtin();
    let engine = Arc::new(EditEngine::new(
        events.clone(),
        &catalog,
        &args.image_model,
        &args.text_model,
        clamp_timeout(args.timeout),
    )?);
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;

    let mut session = EditSession::new();
    let mut panel = OptionPanel::new();
    let (report_tx, report_rx) = mpsc::channel::<WorkerReport>();
    let mut worker: Option<Worker> = None;

    emit(
        &events,
        "session_started",
        json!({
            "out": args.out.display().to_string(),
            "image_model": engine.image_model(),
            "text_model": engine.text_model(),
            "timeout_s": clamp_timeout(args.timeout).as_secs(),
        }),
    );

    if let Some(path) = &args.input {
        let message = open_primary(&mut session, &events, &path.to_string_lossy())?;
        println!("{message}");
    }
    if let Some(path) = &args.reference {
        if args.input.is_none() {
            bail!("--reference needs --input; a reference attaches to an open image");
        }
        let message = open_reference_image(&mut session, &events, &path.to_string_lossy())?;
        println!("{message}");
    }

    println!("Atelier session started. Type /help for commands.");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        drain_reports(&mut session, &report_rx, &mut worker, &events);

        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        match parse_line(input) {
            SessionCommand::Empty => continue,
            SessionCommand::Help => print_help(),
            SessionCommand::Quit => {
                if session.in_flight().is_some() {
                    println!("Abandoning the in-flight edit.");
                }
                break;
            }
            SessionCommand::Unknown(command) => {
                println!("Unknown command: /{command}. Type /help.");
            }
            SessionCommand::Malformed { usage, .. } => {
                println!("Usage: {usage}");
            }
            SessionCommand::Open(path) => match open_primary(&mut session, &events, &path) {
                Ok(message) => println!("{message}"),
                Err(err) => println!("Open failed: {err:#}"),
            },
            SessionCommand::OpenReference(path) => {
                match open_reference_image(&mut session, &events, &path) {
                    Ok(message) => {
                        println!("{message}");
                        if panel.mode != OperationKind::Merge {
                            println!("Switch with /mode merge to use it.");
                        }
                    }
                    Err(err) => println!("Attach failed: {err:#}"),
                }
            }
            SessionCommand::Mode(kind_text) => match OperationKind::from_key(&kind_text) {
                Some(kind) => {
                    if kind != OperationKind::Merge
                        && panel.mode == OperationKind::Merge
                        && session.reference().is_some()
                    {
                        session.clear_reference();
                        println!("Detached the merge reference.");
                    }
                    panel.mode = kind;
                    emit(&events, "mode_changed", json!({ "mode": kind.key() }));
                    println!("Mode: {}", panel.mode_summary());
                }
                None => println!(
                    "Unknown mode: {kind_text}. Modes: enhance expand remove-background mockup merge"
                ),
            },
            SessionCommand::Set(pairs) => {
                for (key, value) in pairs {
                    println!("{}", panel.set(&key, &value));
                }
            }
            SessionCommand::Prompt(text) => {
                println!("{}", panel.set_prompt(&text));
                if session.working().is_none() && !text.trim().is_empty() {
                    println!("No image open yet; /open one before /go.");
                }
            }
            SessionCommand::Polish(text) => {
                let source = text
                    .or_else(|| panel.prompt().map(str::to_string))
                    .unwrap_or_default();
                let source = source.trim().to_string();
                if source.is_empty() {
                    println!("Nothing to polish; type a prompt first.");
                    continue;
                }
                match engine.enhance_prompt(&source) {
                    Ok(polished) => {
                        let diff = TextDiff::from_lines(source.as_str(), polished.as_str());
                        print!("{}", diff.unified_diff().header("prompt", "polished"));
                        println!("{}", panel.set_prompt(&polished));
                    }
                    Err(err) => println!("Polish failed: {err}"),
                }
            }
            SessionCommand::Go => match session.begin(panel.request()) {
                Ok(submission) => {
                    start_submission(
                        &engine,
                        &report_tx,
                        &events,
                        &mut session,
                        &mut worker,
                        submission,
                    );
                }
                Err(err) => println!("Cannot submit: {err}"),
            },
            SessionCommand::Retry => match session.retry() {
                Ok(submission) => {
                    start_submission(
                        &engine,
                        &report_tx,
                        &events,
                        &mut session,
                        &mut worker,
                        submission,
                    );
                }
                Err(err) => println!("Cannot retry: {err}"),
            },
            SessionCommand::Wait => {
                if session.in_flight().is_none() {
                    println!("Nothing in flight.");
                } else {
                    println!("Waiting for the in-flight edit...");
                    wait_for_reports(&mut session, &report_rx, &mut worker, &events);
                }
            }
            SessionCommand::Undo => {
                if session.undo() {
                    emit(
                        &events,
                        "undo_applied",
                        json!({ "depth": session.history_depth() }),
                    );
                    println!(
                        "Stepped back to the previous image ({} undo left).",
                        session.history_depth()
                    );
                } else {
                    println!("Nothing to undo.");
                }
            }
            SessionCommand::Keep => match session.continue_with_new() {
                Ok(()) => {
                    panel.clear_prompts();
                    emit(
                        &events,
                        "continued_with_new",
                        json!({ "depth": session.history_depth() }),
                    );
                    println!(
                        "Editing the new image now ({} undo available).",
                        session.history_depth()
                    );
                }
                Err(err) => println!("Cannot keep: {err}"),
            },
            SessionCommand::Revert => match session.continue_with_original() {
                Ok(()) => {
                    emit(&events, "reverted_to_input", json!({}));
                    println!("Discarded the result; still editing the current image.");
                }
                Err(err) => println!("Cannot revert: {err}"),
            },
            SessionCommand::Reset => {
                session.reset();
                panel.clear_prompts();
                emit(&events, "session_reset", json!({}));
                println!("Session reset. /open an image to start again.");
            }
            SessionCommand::Save(target) => {
                save_current(&session, &events, &args.out, target.as_deref());
            }
            SessionCommand::Status => {
                print_status(&session, &panel, &engine, &events);
            }
        }
    }

    Ok(())
}

fn start_submission(
    engine: &Arc<EditEngine>,
    report_tx: &mpsc::Sender<WorkerReport>,
    events: &EventWriter,
    session: &mut EditSession,
    worker: &mut Option<Worker>,
    submission: Submission,
) {
    let generation = submission.generation;
    let operation = submission.request.kind();
    emit(
        events,
        "submit_started",
        json!({ "generation": generation, "operation": operation.key() }),
    );

    let engine = Arc::clone(engine);
    let tx = report_tx.clone();
    let spawned = thread::Builder::new()
        .name("edit-submit".to_string())
        .spawn(move || {
            let outcome = engine.submit(
                &submission.request,
                &submission.working,
                submission.reference.as_ref(),
            );
            let _ = tx.send(WorkerReport {
                generation,
                operation,
                outcome,
            });
        });
    match spawned {
        Ok(handle) => {
            *worker = Some(Worker { handle, operation });
            println!(
                "Submitted {} (generation {generation}). /wait blocks until it lands.",
                operation.key()
            );
        }
        Err(err) => {
            let report = WorkerReport {
                generation,
                operation,
                outcome: Err(EditError::Transport(format!(
                    "worker thread spawn failed: {err}"
                ))),
            };
            apply_report(session, report, events);
        }
    }
}

fn apply_report(session: &mut EditSession, report: WorkerReport, events: &EventWriter) {
    let generation = report.generation;
    let operation = report.operation.key();
    let error = report.outcome.as_ref().err().cloned();
    match session.complete(generation, report.outcome) {
        Completion::Applied => {
            if let Some(error) = error {
                emit(
                    events,
                    "submit_failed",
                    json!({
                        "generation": generation,
                        "operation": operation,
                        "error_kind": error.kind(),
                        "message": error.message(),
                    }),
                );
                println!("Edit failed: {error}");
                println!("The image is untouched. /retry runs it again.");
            } else if let Some(result) = session.result() {
                emit(
                    events,
                    "result_applied",
                    json!({
                        "generation": generation,
                        "operation": operation,
                        "artifact_id": short_artifact_id(&result.data),
                        "media_type": result.media_type,
                        "bytes": result.data.len(),
                    }),
                );
                println!(
                    "Result ready: {} ({}). /keep continues from it, /revert discards it, /save writes it.",
                    result.media_type,
                    format_bytes(result.data.len())
                );
            }
        }
        Completion::Stale => {
            emit(
                events,
                "stale_result_discarded",
                json!({ "generation": generation, "operation": operation }),
            );
            println!("Discarded a stale {operation} result (generation {generation}).");
        }
    }
}

fn drain_reports(
    session: &mut EditSession,
    report_rx: &mpsc::Receiver<WorkerReport>,
    worker: &mut Option<Worker>,
    events: &EventWriter,
) {
    while let Ok(report) = report_rx.try_recv() {
        apply_report(session, report, events);
    }
    let finished = worker
        .as_ref()
        .map(|active| active.handle.is_finished())
        .unwrap_or(false);
    if finished {
        // A report sent right before the thread exited may still be queued.
        while let Ok(report) = report_rx.try_recv() {
            apply_report(session, report, events);
        }
        if let Some(active) = worker.take() {
            let _ = active.handle.join();
            if let Some(generation) = session.in_flight() {
                // The worker died without reporting; unblock the session.
                let report = WorkerReport {
                    generation,
                    operation: active.operation,
                    outcome: Err(EditError::Transport(
                        "the edit worker ended without a result".to_string(),
                    )),
                };
                apply_report(session, report, events);
            }
        }
    }
}

fn wait_for_reports(
    session: &mut EditSession,
    report_rx: &mpsc::Receiver<WorkerReport>,
    worker: &mut Option<Worker>,
    events: &EventWriter,
) {
    while session.in_flight().is_some() {
        match report_rx.recv_timeout(Duration::from_millis(250)) {
            Ok(report) => apply_report(session, report, events),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                drain_reports(session, report_rx, worker, events);
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn open_primary(
    session: &mut EditSession,
    events: &EventWriter,
    path_text: &str,
) -> Result<String> {
    let image = load_working(Path::new(path_text))?;
    emit(
        events,
        "image_opened",
        json!({
            "name": image.name,
            "bytes": image.byte_len(),
            "media_type": image.media_type,
        }),
    );
    let summary = image_summary(&image);
    let had_flight = session.in_flight().is_some();
    session.upload(image);
    let mut message = format!("Opened {summary}.");
    if had_flight {
        message.push_str(" The in-flight edit will be discarded when it lands.");
    }
    Ok(message)
}

fn open_reference_image(
    session: &mut EditSession,
    events: &EventWriter,
    path_text: &str,
) -> Result<String> {
    let image = load_working(Path::new(path_text))?;
    let summary = image_summary(&image);
    let name = image.name.clone();
    let bytes = image.byte_len();
    let media_type = image.media_type.clone();
    session.attach_reference(image)?;
    emit(
        events,
        "reference_opened",
        json!({ "name": name, "bytes": bytes, "media_type": media_type }),
    );
    Ok(format!("Reference attached: {summary}."))
}

fn save_current(session: &EditSession, events: &EventWriter, out_dir: &Path, target: Option<&str>) {
    let (data, media_type, source) = if let Some(result) = session.result() {
        (result.data.clone(), result.media_type.clone(), "result")
    } else if let Some(working) = session.working() {
        (working.bytes.clone(), working.media_type.clone(), "image")
    } else {
        println!("Nothing to save yet.");
        return;
    };

    let path = match target {
        Some(text) => PathBuf::from(text),
        None => out_dir.join(default_artifact_name(&media_type)),
    };
    match fs::write(&path, &data) {
        Ok(()) => {
            emit(
                events,
                "artifact_saved",
                json!({
                    "path": path.display().to_string(),
                    "bytes": data.len(),
                    "source": source,
                }),
            );
            println!(
                "Saved {source} to {} ({}).",
                path.display(),
                format_bytes(data.len())
            );
        }
        Err(err) => println!("Save failed: {err}"),
    }
}

fn print_status(
    session: &EditSession,
    panel: &OptionPanel,
    engine: &EditEngine,
    events: &EventWriter,
) {
    println!("Phase: {}", session.phase().key());
    match session.working() {
        Some(image) => println!("Image: {}", image_summary(image)),
        None => println!("Image: none (use /open)"),
    }
    if let Some(reference) = session.reference() {
        println!("Reference: {}", image_summary(reference));
    }
    if let Some(result) = session.result() {
        println!(
            "Result: {} ({}); /keep or /revert",
            result.media_type,
            format_bytes(result.data.len())
        );
    }
    if let Some(error) = session.last_error() {
        println!("Last error: {error}");
    }
    if let Some(generation) = session.in_flight() {
        println!("In flight: generation {generation}");
    }
    println!("Mode: {}", panel.mode_summary());
    if let Some(prompt) = panel.prompt() {
        if !prompt.trim().is_empty() {
            println!("Prompt: {prompt}");
        }
    }
    println!("Undo depth: {}", session.history_depth());
    println!("Models: {} / {}", engine.image_model(), engine.text_model());
    println!("Events: {}", events.path().display());
}

fn print_help() {
    println!("Commands:");
    println!("  /open <path>    load a new primary image");
    println!("  /ref <path>     attach or replace the merge reference");
    println!("  /mode <kind>    enhance, expand, remove-background, mockup, or merge");
    println!("  /set key=value  options: style quality ratio removal enhance-subject theme merge");
    println!("  /prompt [text]  set (or clear) the active operation's free prompt");
    println!("  /polish [text]  rewrite the free prompt through the text model");
    println!("  /go             submit the edit; the prompt stays interactive");
    println!("  /wait           block until the in-flight edit lands");
    println!("  /retry          re-run the failed submission unchanged");
    println!("  /undo           step back to the previous applied image");
    println!("  /keep           continue editing the new result");
    println!("  /revert         discard the result, keep the current image");
    println!("  /save [path]    write the result (or current image) to disk");
    println!("  /status /reset /help /quit");
    println!("Bare text sets the free prompt for the active mode.");
}

// ---------------------------------------------------------------------------
// Option panel
// ---------------------------------------------------------------------------

/// REPL-side option state, one slot per operation, so switching modes does
/// not lose what the user already dialed in.
struct OptionPanel {
    mode: OperationKind,
    style: EnhanceStyle,
    enhance_quality: EnhanceQuality,
    expand_prompt: String,
    ratio: AspectRatio,
    expand_quality: ExpandQuality,
    removal: RemovalMode,
    removal_prompt: String,
    enhance_subject: bool,
    theme: MockupTheme,
    mockup_prompt: String,
    merge: MergeMode,
    merge_prompt: String,
}

impl OptionPanel {
    fn new() -> Self {
        Self {
            mode: OperationKind::RemoveBackground,
            style: EnhanceStyle::Auto,
            enhance_quality: EnhanceQuality::Hd,
            expand_prompt: String::new(),
            ratio: AspectRatio::Original,
            expand_quality: ExpandQuality::EightK,
            removal: RemovalMode::Strict,
            removal_prompt: String::new(),
            enhance_subject: false,
            theme: MockupTheme::ModernStudio,
            mockup_prompt: String::new(),
            merge: MergeMode::Replace,
            merge_prompt: String::new(),
        }
    }

    fn request(&self) -> OperationRequest {
        match self.mode {
            OperationKind::Enhance => OperationRequest::Enhance {
                style: self.style,
                quality: self.enhance_quality,
            },
            OperationKind::Expand => OperationRequest::Expand {
                prompt: self.expand_prompt.trim().to_string(),
                ratio: self.ratio.clone(),
                quality: self.expand_quality,
            },
            OperationKind::RemoveBackground => OperationRequest::RemoveBackground {
                mode: self.removal,
                prompt: self.removal_prompt.trim().to_string(),
                enhance_subject: self.enhance_subject,
            },
            OperationKind::Mockup => OperationRequest::Mockup {
                theme: self.theme,
                prompt: self.mockup_prompt.trim().to_string(),
            },
            OperationKind::Merge => OperationRequest::Merge {
                mode: self.merge,
                prompt: self.merge_prompt.trim().to_string(),
            },
        }
    }

    fn set(&mut self, key: &str, value: &str) -> String {
        match key {
            "style" => {
                self.style = EnhanceStyle::from_key(value);
                format!("Style set to {}.", self.style.key())
            }
            "quality" => match self.mode {
                OperationKind::Enhance => {
                    self.enhance_quality = EnhanceQuality::from_key(value);
                    format!("Enhance quality set to {}.", self.enhance_quality.key())
                }
                OperationKind::Expand => {
                    self.expand_quality = ExpandQuality::from_key(value);
                    format!("Expand quality set to {}.", self.expand_quality.key())
                }
                _ => "Quality applies to enhance or expand; switch with /mode first.".to_string(),
            },
            "ratio" => {
                self.ratio = AspectRatio::from_key(value);
                format!("Ratio set to {}.", self.ratio.key())
            }
            "removal" => {
                self.removal = RemovalMode::from_key(value);
                format!("Removal set to {}.", self.removal.key())
            }
            "enhance-subject" | "enhance_subject" => {
                self.enhance_subject = parse_switch(value);
                format!(
                    "Subject enhancement {}.",
                    if self.enhance_subject { "on" } else { "off" }
                )
            }
            "theme" => {
                self.theme = MockupTheme::from_key(value);
                format!("Theme set to {}.", self.theme.key())
            }
            "merge" => {
                self.merge = MergeMode::from_key(value);
                format!("Merge mode set to {}.", self.merge.key())
            }
            other => format!(
                "Unknown option '{other}'. Options: style quality ratio removal enhance-subject theme merge"
            ),
        }
    }

    fn set_prompt(&mut self, text: &str) -> String {
        let trimmed = text.trim().to_string();
        let cleared = trimmed.is_empty();
        let mode = self.mode.key();
        match self.mode {
            OperationKind::Enhance => {
                return "Enhance takes no free prompt; /set style=... tunes it instead."
                    .to_string();
            }
            OperationKind::Expand => self.expand_prompt = trimmed,
            OperationKind::RemoveBackground => self.removal_prompt = trimmed,
            OperationKind::Mockup => self.mockup_prompt = trimmed,
            OperationKind::Merge => self.merge_prompt = trimmed,
        }
        let mut message = if cleared {
            format!("Prompt cleared for {mode}.")
        } else {
            format!("Prompt set for {mode}.")
        };
        if self.mode == OperationKind::RemoveBackground
            && !cleared
            && self.removal != RemovalMode::Custom
        {
            message.push_str(" It applies once removal=custom.");
        }
        message
    }

    fn prompt(&self) -> Option<&str> {
        match self.mode {
            OperationKind::Enhance => None,
            OperationKind::Expand => Some(self.expand_prompt.as_str()),
            OperationKind::RemoveBackground => Some(self.removal_prompt.as_str()),
            OperationKind::Mockup => Some(self.mockup_prompt.as_str()),
            OperationKind::Merge => Some(self.merge_prompt.as_str()),
        }
    }

    fn clear_prompts(&mut self) {
        self.expand_prompt.clear();
        self.removal_prompt.clear();
        self.mockup_prompt.clear();
        self.merge_prompt.clear();
    }

    fn mode_summary(&self) -> String {
        match self.mode {
            OperationKind::Enhance => format!(
                "enhance (style={} quality={})",
                self.style.key(),
                self.enhance_quality.key()
            ),
            OperationKind::Expand => format!(
                "expand (ratio={} quality={})",
                self.ratio.key(),
                self.expand_quality.key()
            ),
            OperationKind::RemoveBackground => format!(
                "remove-background (removal={} enhance-subject={})",
                self.removal.key(),
                if self.enhance_subject { "on" } else { "off" }
            ),
            OperationKind::Mockup => format!("mockup (theme={})", self.theme.key()),
            OperationKind::Merge => format!("merge (mode={})", self.merge.key()),
        }
    }
}

fn parse_switch(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "on" | "true" | "yes" | "1"
    )
}

// ---------------------------------------------------------------------------
// One-shot subcommands
// ---------------------------------------------------------------------------

fn run_process(args: ProcessArgs) -> Result<i32> {
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let session_id = Uuid::new_v4().to_string();
    let events = EventWriter::new(&events_path, session_id);
    let catalog = ModelCatalog::builtin();
    let engine = EditEngine::new(
        events.clone(),
        &catalog,
        &args.image_model,
        &args.text_model,
        clamp_timeout(args.timeout),
    )?;
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;

    let request = request_from_flags(&args)?;
    let working = load_working(&args.input)?;
    let reference = match &args.reference {
        Some(path) => Some(load_working(path)?),
        None => None,
    };

    let result = engine.submit(&request, &working, reference.as_ref())?;

    let path = args
        .save
        .clone()
        .unwrap_or_else(|| args.out.join(default_artifact_name(&result.media_type)));
    fs::write(&path, &result.data)
        .with_context(|| format!("failed to write {}", path.display()))?;
    emit(
        &events,
        "artifact_saved",
        json!({
            "path": path.display().to_string(),
            "bytes": result.data.len(),
            "source": "result",
        }),
    );
    println!(
        "Saved result to {} ({}).",
        path.display(),
        format_bytes(result.data.len())
    );
    if args.data_uri {
        println!("{}", result.data_uri());
    }
    Ok(0)
}

fn request_from_flags(args: &ProcessArgs) -> Result<OperationRequest> {
    let Some(kind) = OperationKind::from_key(&args.mode) else {
        bail!(
            "unknown mode '{}'; expected enhance, expand, remove-background, mockup, or merge",
            args.mode
        );
    };
    let prompt = args.prompt.trim().to_string();
    Ok(match kind {
        OperationKind::Enhance => OperationRequest::Enhance {
            style: EnhanceStyle::from_key(&args.style),
            quality: args
                .quality
                .as_deref()
                .map(EnhanceQuality::from_key)
                .unwrap_or_default(),
        },
        OperationKind::Expand => OperationRequest::Expand {
            prompt,
            ratio: AspectRatio::from_key(&args.ratio),
            quality: args
                .quality
                .as_deref()
                .map(ExpandQuality::from_key)
                .unwrap_or(ExpandQuality::EightK),
        },
        OperationKind::RemoveBackground => OperationRequest::RemoveBackground {
            mode: RemovalMode::from_key(&args.removal),
            prompt,
            enhance_subject: args.enhance_subject,
        },
        OperationKind::Mockup => OperationRequest::Mockup {
            theme: MockupTheme::from_key(&args.theme),
            prompt,
        },
        OperationKind::Merge => OperationRequest::Merge {
            mode: MergeMode::from_key(&args.merge),
            prompt,
        },
    })
}

fn run_polish(args: PolishArgs) -> Result<i32> {
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let session_id = Uuid::new_v4().to_string();
    let events = EventWriter::new(&events_path, session_id);
    let catalog = ModelCatalog::builtin();
    let engine = EditEngine::new(
        events,
        &catalog,
        DEFAULT_IMAGE_MODEL,
        &args.text_model,
        clamp_timeout(args.timeout),
    )?;
    let polished = engine.enhance_prompt(args.prompt.trim())?;
    println!("{polished}");
    Ok(0)
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn load_working(path: &Path) -> Result<WorkingImage> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read image {}", path.display()))?;
    let media_type = media_type_for_path(path);
    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("image")
        .to_string();
    Ok(WorkingImage::upload(bytes, media_type, name))
}

fn image_summary(image: &WorkingImage) -> String {
    match image::load_from_memory(&image.bytes) {
        Ok(decoded) => {
            let (width, height) = decoded.dimensions();
            format!(
                "{} ({width}x{height}, {})",
                image.name,
                format_bytes(image.byte_len())
            )
        }
        Err(_) => format!("{} ({})", image.name, format_bytes(image.byte_len())),
    }
}

fn default_artifact_name(media_type: &str) -> String {
    format!(
        "edited-{}.{}",
        unix_epoch_millis(),
        extension_for_media_type(media_type)
    )
}

fn format_bytes(len: usize) -> String {
    if len >= 1024 * 1024 {
        format!("{:.1} MiB", len as f64 / (1024.0 * 1024.0))
    } else if len >= 1024 {
        format!("{} KiB", len / 1024)
    } else {
        format!("{len} B")
    }
}

fn unix_epoch_millis() -> i64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

fn emit(events: &EventWriter, event_type: &str, payload: Value) {
    let _ = events.emit(event_type, payload.as_object().cloned().unwrap_or_default());
}

#[cfg(test)]
mod tests {
    use super::{
        default_artifact_name, format_bytes, parse_switch, request_from_flags, OptionPanel,
        ProcessArgs,
    };
    use atelier_contracts::request::{
        AspectRatio, EnhanceQuality, ExpandQuality, MergeMode, OperationKind, OperationRequest,
        RemovalMode,
    };
    use std::path::PathBuf;

    fn process_args(mode: &str) -> ProcessArgs {
        ProcessArgs {
            input: PathBuf::from("input.png"),
            reference: None,
            mode: mode.to_string(),
            style: "auto".to_string(),
            quality: None,
            prompt: String::new(),
            ratio: "original".to_string(),
            removal: "strict".to_string(),
            enhance_subject: false,
            theme: "modern_studio".to_string(),
            merge: "replace".to_string(),
            save: None,
            data_uri: false,
            out: PathBuf::from("out"),
            events: None,
            image_model: "dryrun-image-1".to_string(),
            text_model: "dryrun-text-1".to_string(),
            timeout: 90,
        }
    }

    #[test]
    fn panel_defaults_build_a_strict_removal_request() {
        let panel = OptionPanel::new();
        assert_eq!(
            panel.request(),
            OperationRequest::RemoveBackground {
                mode: RemovalMode::Strict,
                prompt: String::new(),
                enhance_subject: false,
            }
        );
    }

    #[test]
    fn quality_key_routes_by_active_mode() {
        let mut panel = OptionPanel::new();
        panel.mode = OperationKind::Enhance;
        panel.set("quality", "4k");
        assert_eq!(panel.enhance_quality, EnhanceQuality::FourK);
        assert_eq!(panel.expand_quality, ExpandQuality::EightK);

        panel.mode = OperationKind::Expand;
        panel.set("quality", "hd");
        assert_eq!(panel.expand_quality, ExpandQuality::Hd);
        assert_eq!(panel.enhance_quality, EnhanceQuality::FourK);

        panel.mode = OperationKind::Mockup;
        let message = panel.set("quality", "hd");
        assert!(message.contains("enhance or expand"));
    }

    #[test]
    fn unknown_option_key_lists_the_choices() {
        let mut panel = OptionPanel::new();
        let message = panel.set("contrast", "high");
        assert!(message.contains("Unknown option 'contrast'"));
        assert!(message.contains("style quality ratio removal enhance-subject theme merge"));
    }

    #[test]
    fn prompt_is_stored_per_mode() {
        let mut panel = OptionPanel::new();
        panel.mode = OperationKind::Expand;
        panel.set_prompt("wider horizon");
        panel.mode = OperationKind::Merge;
        panel.set_prompt("on the desk");

        panel.mode = OperationKind::Expand;
        assert_eq!(panel.prompt(), Some("wider horizon"));
        panel.mode = OperationKind::Merge;
        assert_eq!(panel.prompt(), Some("on the desk"));
    }

    #[test]
    fn enhance_mode_rejects_free_prompts() {
        let mut panel = OptionPanel::new();
        panel.mode = OperationKind::Enhance;
        let message = panel.set_prompt("make it pop");
        assert!(message.contains("no free prompt"));
        assert_eq!(panel.prompt(), None);
    }

    #[test]
    fn removal_prompt_warns_until_custom_mode() {
        let mut panel = OptionPanel::new();
        let message = panel.set_prompt("keep the red mug");
        assert!(message.contains("removal=custom"));
        panel.set("removal", "custom");
        let message = panel.set_prompt("keep the red mug");
        assert!(!message.contains("removal=custom"));
    }

    #[test]
    fn clear_prompts_drops_every_free_text() {
        let mut panel = OptionPanel::new();
        panel.mode = OperationKind::Expand;
        panel.set_prompt("wider");
        panel.mode = OperationKind::Mockup;
        panel.set_prompt("on marble");
        panel.clear_prompts();
        assert_eq!(panel.prompt(), Some(""));
        panel.mode = OperationKind::Expand;
        assert_eq!(panel.prompt(), Some(""));
    }

    #[test]
    fn mode_summary_names_the_live_options() {
        let mut panel = OptionPanel::new();
        assert_eq!(
            panel.mode_summary(),
            "remove-background (removal=strict enhance-subject=off)"
        );
        panel.mode = OperationKind::Expand;
        panel.set("ratio", "16:9");
        assert_eq!(panel.mode_summary(), "expand (ratio=16:9 quality=8k)");
    }

    #[test]
    fn process_flags_build_each_operation() {
        let mut args = process_args("merge");
        args.merge = "place".to_string();
        args.prompt = "on the shelf".to_string();
        assert_eq!(
            request_from_flags(&args).unwrap(),
            OperationRequest::Merge {
                mode: MergeMode::Place,
                prompt: "on the shelf".to_string(),
            }
        );

        let mut args = process_args("expand");
        args.ratio = "16:9".to_string();
        assert_eq!(
            request_from_flags(&args).unwrap(),
            OperationRequest::Expand {
                prompt: String::new(),
                ratio: AspectRatio::Named("16:9".to_string()),
                quality: ExpandQuality::EightK,
            }
        );
    }

    #[test]
    fn unknown_process_mode_is_an_error() {
        let args = process_args("sharpify");
        let err = request_from_flags(&args).unwrap_err();
        assert!(err.to_string().contains("unknown mode 'sharpify'"));
    }

    #[test]
    fn switch_values_parse_loosely() {
        assert!(parse_switch("on"));
        assert!(parse_switch("TRUE"));
        assert!(parse_switch("1"));
        assert!(!parse_switch("off"));
        assert!(!parse_switch("definitely"));
    }

    #[test]
    fn default_artifact_names_carry_the_extension() {
        assert!(default_artifact_name("image/png").starts_with("edited-"));
        assert!(default_artifact_name("image/png").ends_with(".png"));
        assert!(default_artifact_name("image/jpeg").ends_with(".jpg"));
    }

    #[test]
    fn byte_formatting_picks_sensible_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(4096), "4 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MiB");
    }
}
