use clap::{Parser, Subcommand, ValueEnum};
use cosim_app::{
    AppResult, JsonLinesSink, RunOverrides, RunProgressEvent, RunRequest, RunStage,
    project_service, run_service,
};
use cosim_circuit::ControlMode;
use cosim_controls::ControllerFactory;
use cosim_sim::ResultSink;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cosim-cli")]
#[command(about = "cosim CLI - controller co-simulation on distribution circuits", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate scenario file syntax, structure and controller types
    Validate {
        /// Path to the scenario YAML or JSON file
        project_path: PathBuf,
    },
    /// Run a scenario over its simulation horizon
    Run {
        /// Path to the scenario YAML or JSON file
        project_path: PathBuf,
        /// Override the control-iteration cap per timestep
        #[arg(long)]
        max_iterations: Option<usize>,
        /// Override the convergence tolerance on the largest residual
        #[arg(long)]
        tolerance: Option<f64>,
        /// Override the horizon length in seconds
        #[arg(long)]
        duration: Option<f64>,
        /// Override how native solver controls settle
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Write the run summary as JSON
        #[arg(long)]
        summary_json: Option<PathBuf>,
        /// Write the full step record as JSON
        #[arg(long)]
        record_json: Option<PathBuf>,
        /// Stream every step as JSON lines while running
        #[arg(long)]
        steps_jsonl: Option<PathBuf>,
    },
    /// List the controller types that scenarios can use
    Controllers,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Static,
    Time,
}

impl From<ModeArg> for ControlMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Static => ControlMode::Static,
            ModeArg::Time => ControlMode::Time,
        }
    }
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { project_path } => cmd_validate(&project_path),
        Commands::Run {
            project_path,
            max_iterations,
            tolerance,
            duration,
            mode,
            summary_json,
            record_json,
            steps_jsonl,
        } => cmd_run(
            &project_path,
            RunOverrides {
                max_control_iterations: max_iterations,
                error_tolerance: tolerance,
                duration_s: duration,
                control_mode: mode.map(ControlMode::from),
            },
            Outputs {
                summary_json,
                record_json,
                steps_jsonl,
            },
        ),
        Commands::Controllers => cmd_controllers(),
    }
}

fn cmd_validate(project_path: &Path) -> AppResult<()> {
    println!("Validating scenario: {}", project_path.display());
    let project = project_service::load_project(project_path)?;
    let factory = ControllerFactory::default();
    project_service::validate_project(&project, factory.tags())?;
    println!("✓ Scenario is valid");
    for c in project_service::list_controllers(&project) {
        println!("  {} on {} ({} settings)", c.kind, c.element, c.setting_count);
    }
    Ok(())
}

fn cmd_controllers() -> AppResult<()> {
    println!("Controller types:");
    for tag in ControllerFactory::default().tags() {
        println!("  {}", tag);
    }
    Ok(())
}

struct Outputs {
    summary_json: Option<PathBuf>,
    record_json: Option<PathBuf>,
    steps_jsonl: Option<PathBuf>,
}

fn cmd_run(project_path: &Path, overrides: RunOverrides, outputs: Outputs) -> AppResult<()> {
    println!("Running scenario: {}", project_path.display());
    tracing::debug!(overrides = ?overrides, "run overrides");
    let request = RunRequest {
        project_path,
        overrides,
    };

    let mut step_log = match &outputs.steps_jsonl {
        Some(path) => Some(JsonLinesSink::new(BufWriter::new(File::create(path)?))),
        None => None,
    };

    let mut last_emit = Instant::now();
    let mut last_fraction = -1.0f64;
    let response = run_service::run_project_with_progress(
        &request,
        Some(&mut |event| {
            let fraction = event
                .sim
                .as_ref()
                .map(|p| p.fraction_complete)
                .unwrap_or(-1.0);
            let emit_now = (fraction >= 0.0 && (fraction - last_fraction).abs() >= 0.005)
                || last_emit.elapsed().as_millis() >= 100;
            if emit_now {
                render_cli_progress(&event);
                if fraction >= 0.0 {
                    last_fraction = fraction;
                }
                last_emit = Instant::now();
            }
        }),
        step_log
            .as_mut()
            .map(|sink| sink as &mut dyn ResultSink),
    )?;
    clear_progress_line();

    let report = &response.report;
    println!("✓ Simulation completed: {}", report.project);
    println!("  Controllers: {}", report.controllers);
    println!("  Timesteps: {}", report.summary.steps);
    println!("  Control iterations: {}", report.summary.total_iterations);
    println!("  Non-converged timesteps: {}", report.summary.non_converged);
    for t in report.non_converged_times_s.iter().take(10) {
        println!("    t = {:.3} s", t);
    }
    println!(
        "  Timing: compile={:.3}s simulate={:.3}s total={:.3}s",
        response.timing.compile_time_s,
        response.timing.simulate_time_s,
        response.timing.total_time_s
    );

    if let Some(path) = &outputs.summary_json {
        std::fs::write(path, serde_json::to_string_pretty(report)?)?;
        println!("  Summary written to {}", path.display());
    }
    if let Some(path) = &outputs.record_json {
        run_service::save_record(path, &response.record)?;
        println!("  Record written to {}", path.display());
    }
    if let (Some(path), Some(sink)) = (&outputs.steps_jsonl, step_log) {
        let written = sink.written();
        sink.finish()?;
        println!("  {written} steps streamed to {}", path.display());
    }
    Ok(())
}

fn clear_progress_line() {
    print!("\r{}\r", " ".repeat(120));
    let _ = io::stdout().flush();
}

fn render_cli_progress(event: &RunProgressEvent) {
    match (&event.stage, &event.sim) {
        (RunStage::Simulating, Some(p)) => {
            let width = 28usize;
            let filled = ((p.fraction_complete * width as f64).round() as usize).min(width);
            let bar = format!(
                "{}{}",
                "#".repeat(filled),
                "-".repeat(width.saturating_sub(filled))
            );
            print!(
                "\r[{}] {:>6.2}%  t={:.3}s  step={}/{}  non-converged={}  elapsed={:.1}s",
                bar,
                p.fraction_complete * 100.0,
                p.sim_time_s,
                p.step,
                p.total_steps,
                p.non_converged,
                event.elapsed_wall_s
            );
        }
        _ => {
            let spinner = ['|', '/', '-', '\\'];
            let spin_idx = ((event.elapsed_wall_s * 10.0) as usize) % spinner.len();
            let mut line = format!(
                "\r{} {}  elapsed={:.2}s",
                spinner[spin_idx],
                event.stage.label(),
                event.elapsed_wall_s
            );
            if let Some(msg) = &event.message {
                line.push_str(&format!("  {}", msg));
            }
            print!("{}", line);
        }
    }
    let _ = io::stdout().flush();
}
