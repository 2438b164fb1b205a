use crate::decks::{MeshFiles, MeshModel};
use crate::engine::{RunOptions, SimulationEngine, SystemLauncher, WorkerCount};
use crate::error::{PipelineError, ResolveError};
use crate::manifest::RunManifest;
use crate::model::RunEvent;
use crate::outputs::{self, OutputRecord, ResolveOptions};
use crate::text_summary;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser)]
#[command(
    name = "adcirc-driver",
    version,
    about = "Stage, run and inspect coldstart/hotstart ADCIRC simulations"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write the input decks, run every phase and summarise the outputs
    Run(RunArgs),
    /// Only write the input decks
    Write(WriteArgs),
    /// Classify a result file and load it when a reader exists
    Resolve(ResolveArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// JSON run manifest
    pub manifest: PathBuf,

    /// Working directory (defaults to a fresh directory under the system temp dir)
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// MPI workers: a positive integer or "auto" for one per physical core
    #[arg(long, default_value = "auto")]
    pub nproc: WorkerCount,

    /// Skip the coldstart phase of a two-phase run
    #[arg(long)]
    pub no_coldstart: bool,

    /// Skip the hotstart phase of a two-phase run
    #[arg(long)]
    pub no_hotstart: bool,

    /// Reuse the working directory if it already exists
    #[arg(long)]
    pub overwrite: bool,

    /// Print the run report as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Suppress progress and solver output on stderr
    #[arg(long)]
    pub quiet: bool,

    /// Export the run report as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,
}

#[derive(Debug, Args)]
pub struct WriteArgs {
    /// JSON run manifest
    pub manifest: PathBuf,

    /// Directory the decks are written to
    #[arg(long)]
    pub outdir: PathBuf,

    /// Write into an existing directory
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Result file to classify
    pub path: PathBuf,

    /// fort.14 of the run, needed to tell surface files from station files
    #[arg(long)]
    pub mesh: Option<PathBuf>,

    /// fort.15 of the run, needed for harmonic station files
    #[arg(long)]
    pub control: Option<PathBuf>,

    /// Print the descriptor and record as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: Cli) -> Result<()> {
    match args.command {
        Command::Run(args) => run_simulation(args).await,
        Command::Write(args) => write_inputs(args),
        Command::Resolve(args) => resolve_file(args),
    }
}

async fn run_simulation(args: RunArgs) -> Result<()> {
    let manifest = RunManifest::load(&args.manifest)?;
    let mesh = manifest.open_mesh()?;
    let config = manifest.configuration(&mesh)?;
    let decks = manifest.control_decks()?;

    let mut opts = RunOptions::new(args.workdir.clone().unwrap_or_else(default_workdir));
    opts.workers = args.nproc;
    opts.run_coldstart = !args.no_coldstart;
    opts.run_hotstart = !args.no_hotstart;
    opts.overwrite = args.overwrite;

    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<RunEvent>();
    let engine = SimulationEngine::new(SystemLauncher, &decks);

    let started = std::time::Instant::now();
    let (result, ()) = tokio::join!(
        engine.run(&config, &opts, evt_tx),
        print_events(evt_rx, &out_tx, args.quiet)
    );

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            for line in failure_lines(&e) {
                let _ = out_tx.send(OutputLine::Stderr(line));
            }
            drop(out_tx);
            let _ = out_handle.await;
            return Err(e).with_context(|| format!("run in {} failed", opts.workdir.display()));
        }
    };

    let processed = crate::orchestrator::process_run_completion(
        &outcome,
        args.auto_save,
        args.export_json.as_deref(),
    );

    if args.json {
        let out = serde_json::to_string_pretty(&processed.report)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        for line in text_summary::build_text_summary(&processed.report).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    // Whole seconds; solver runs are long.
    let elapsed = std::time::Duration::from_secs(started.elapsed().as_secs());
    let _ = out_tx.send(OutputLine::Stderr(format!(
        "Elapsed: {}",
        humantime::format_duration(elapsed)
    )));
    for msg in processed.export_messages {
        let _ = out_tx.send(OutputLine::Stderr(msg));
    }
    if let Some(p) = processed.auto_saved_path {
        let _ = out_tx.send(OutputLine::Stderr(format!("Saved: {}", p.display())));
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

/// Relay engine events to stderr until the engine drops its sender.
async fn print_events(
    mut rx: mpsc::UnboundedReceiver<RunEvent>,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
    quiet: bool,
) {
    while let Some(ev) = rx.recv().await {
        if quiet {
            continue;
        }
        let line = match ev {
            RunEvent::PhaseStarted { phase } => format!("== {phase:?} =="),
            RunEvent::ProcessStarted { argv, cwd } => {
                format!("$ {} (in {})", argv.join(" "), cwd.display())
            }
            RunEvent::ProcessOutput { line } => line,
            RunEvent::Info(info) => info.to_message(),
        };
        let _ = out_tx.send(OutputLine::Stderr(line));
    }
}

/// Extra diagnostics printed before the error itself.
fn failure_lines(err: &PipelineError) -> Vec<String> {
    match err {
        PipelineError::Divergence { events } => text_summary::divergence_lines(events),
        PipelineError::Resolve(ResolveError::UnsupportedOutputFormat { partial, .. }) => {
            text_summary::classification_lines(partial)
        }
        _ => Vec::new(),
    }
}

fn write_inputs(args: WriteArgs) -> Result<()> {
    let manifest = RunManifest::load(&args.manifest)?;
    let mesh = manifest.open_mesh()?;
    let config = manifest.configuration(&mesh)?;
    let decks = manifest.control_decks()?;

    SimulationEngine::new(SystemLauncher, &decks)
        .write(&config, &args.outdir, args.overwrite, None)
        .with_context(|| format!("writing inputs to {}", args.outdir.display()))?;
    eprintln!("Wrote input decks to {}", args.outdir.display());
    Ok(())
}

fn resolve_file(args: ResolveArgs) -> Result<()> {
    let mesh_points = match args.mesh.as_deref() {
        Some(fort14) => Some(
            MeshFiles::open(fort14, None, None)
                .with_context(|| format!("reading mesh {}", fort14.display()))?
                .node_count(),
        ),
        None => None,
    };
    let opts = ResolveOptions {
        mesh_points,
        control_file: args.control.clone(),
    };

    let descriptor = match outputs::resolve(&args.path, &opts) {
        Ok(d) => d,
        Err(e) => {
            if let ResolveError::UnsupportedOutputFormat { partial, .. } = &e {
                for line in text_summary::classification_lines(partial) {
                    eprintln!("{line}");
                }
            }
            return Err(e.into());
        }
    };
    let record = outputs::dispatch(&args.path, &descriptor)?;

    if args.json {
        let out = serde_json::json!({
            "path": args.path,
            "descriptor": descriptor,
            "record": record,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for line in text_summary::descriptor_lines(&args.path, &descriptor) {
        println!("{line}");
    }
    if let OutputRecord::SurfaceExtrema(extrema) = &record {
        for line in text_summary::extrema_lines(&crate::metrics::summarize_extrema(extrema)) {
            println!("{line}");
        }
    }
    Ok(())
}

fn default_workdir() -> PathBuf {
    let stamp = time::OffsetDateTime::now_utc()
        .format(time::macros::format_description!(
            "[year][month][day]-[hour][minute][second]"
        ))
        .unwrap_or_else(|_| "run".into());
    std::env::temp_dir().join(format!("adcirc-driver-{stamp}"))
}

