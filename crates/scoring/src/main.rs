//! CLI entry point for the scanner accuracy benchmark.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

use scoring::config::Settings;
use scoring::evaluate::{EvalOptions, Evaluator};
use scoring::judge::LlmJudge;
use scoring::{loader, reports};

#[derive(Parser)]
#[command(name = "auditbench")]
#[command(about = "Scores scanner findings against curated ground-truth audits")]
#[command(version)]
struct Cli {
  /// Enable verbose logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Evaluate scan results against the source of truth
  Evaluate {
    /// Configuration file
    #[arg(long, default_value = "auditbench.toml")]
    config: PathBuf,

    /// Subjects to evaluate: glob patterns over the configured list, or
    /// literal names (overrides the config file list)
    #[arg(long)]
    subjects: Vec<String>,

    /// Judge model
    #[arg(long)]
    model: Option<String>,

    /// Judge calls per batch decision
    #[arg(long)]
    iterations: Option<usize>,

    /// Candidates per judge prompt
    #[arg(long)]
    batch_size: Option<usize>,

    /// Scanner output directory name under the data root
    #[arg(long)]
    scan_source: Option<String>,

    /// Root directory holding source_of_truth/ and scanner outputs
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Directory for persisted evaluation results
    #[arg(long)]
    output_root: Option<PathBuf>,

    /// Write the rendered judge prompt beside the results
    #[arg(long)]
    debug_prompt: bool,
  },

  /// Generate a Markdown report from persisted evaluation results
  Report {
    /// Folder containing *_results.json files
    #[arg(long, default_value = "./benchmarks")]
    benchmarks: PathBuf,

    /// Original scan results root, for raw scan and QA counts
    #[arg(long)]
    scan_root: Option<PathBuf>,

    /// Output report path (relative paths land in the benchmarks folder)
    #[arg(long, default_value = "REPORT.md")]
    out: PathBuf,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  // Setup logging
  let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
  let subscriber = FmtSubscriber::builder()
    .with_max_level(level)
    .with_target(false)
    .finish();
  tracing::subscriber::set_global_default(subscriber)?;

  match cli.command {
    Commands::Evaluate {
      config,
      subjects,
      model,
      iterations,
      batch_size,
      scan_source,
      data_root,
      output_root,
      debug_prompt,
    } => {
      let mut settings = Settings::load_or_default(&config)?;
      settings.subjects = scoring::config::select_subjects(&settings.subjects, &subjects);
      if let Some(model) = model {
        settings.model = model;
      }
      if let Some(iterations) = iterations {
        settings.iterations = iterations;
      }
      if let Some(batch_size) = batch_size {
        settings.batch_size = batch_size;
      }
      if let Some(scan_source) = scan_source {
        settings.scan_source = scan_source;
      }
      if let Some(data_root) = data_root {
        settings.data_root = data_root;
      }
      if let Some(output_root) = output_root {
        settings.output_root = output_root;
      }
      if debug_prompt {
        settings.debug_prompt = true;
      }
      settings.validate()?;

      run_evaluations(settings).await
    }
    Commands::Report {
      benchmarks,
      scan_root,
      out,
    } => {
      reports::generate_markdown_report(&benchmarks, &out, scan_root.as_deref())?;
      info!(benchmarks = %benchmarks.display(), "Report generated");
      Ok(())
    }
  }
}

async fn run_evaluations(settings: Settings) -> anyhow::Result<()> {
  if settings.subjects.is_empty() {
    anyhow::bail!("No subjects to evaluate; set them in the config file or pass --subjects");
  }

  for subject in &settings.subjects {
    let subject = subject.trim_end_matches(".json");
    info!(
      subject,
      model = %settings.model,
      iterations = settings.iterations,
      batch_size = settings.batch_size,
      "Running evaluation"
    );

    let truth = match loader::load_truth(subject, &settings.data_root) {
      Ok(t) => t,
      Err(e) => {
        error!(subject, err = %e, "Skipping subject");
        continue;
      }
    };
    let candidates = match loader::load_candidates(subject, &settings.data_root, &settings.scan_source) {
      Ok(c) => c,
      Err(e) => {
        error!(subject, err = %e, "Skipping subject");
        continue;
      }
    };

    let mut judge = LlmJudge::new(&settings.model, settings.judge_timeout_secs)?;
    if settings.debug_prompt {
      std::fs::create_dir_all(&settings.output_root)?;
      judge = judge.with_prompt_dump(settings.output_root.join(format!("{subject}_prompt.txt")));
    }

    let pb = ProgressBar::new(truth.len() as u64);
    pb.set_style(
      ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap()
        .progress_chars("#>-"),
    );
    pb.set_message(subject.to_string());

    let options = EvalOptions {
      iterations: settings.iterations,
      batch_size: settings.batch_size,
    };
    let evaluator = Evaluator::new(&judge, options).with_progress(pb.clone());
    let records = evaluator.evaluate(&truth, &candidates).await;
    pb.finish_and_clear();

    loader::store_evaluation(&records, subject, &settings.output_root)?;
    info!(
      subject,
      records = records.len(),
      output = %loader::evaluation_path(subject, &settings.output_root).display(),
      "Evaluation saved"
    );
  }

  Ok(())
}
