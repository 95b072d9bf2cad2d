//! CLI binary for the actorcheck exploration engine.
//!
//! Runs systematic-testing sessions against the bundled register-race
//! program, replays bug traces, and inspects event patterns.
//!
//! # Usage
//!
//! ```bash
//! # Run a session with the default random strategy
//! actorcheck-explore demo
//!
//! # PCT with three switch points, 500 iterations
//! actorcheck-explore demo --strategy pct --bound 3 --iterations 500
//!
//! # Pattern-guided search
//! actorcheck-explore demo --strategy pattern --pattern "Write, Write, Read"
//!
//! # Save checkpoints and bug traces to a directory
//! actorcheck-explore demo --output results/
//!
//! # Replay a bug trace
//! actorcheck-explore replay results/bug-0.trace
//!
//! # Resume a saved session with a bigger iteration budget
//! actorcheck-explore resume --corpus results/ --iterations 2000
//!
//! # Show how a pattern compiles and match it against some events
//! actorcheck-explore pattern "(Write, Ack)+" --events Write,Ack,Write
//! ```
//!
//! Logging goes through `env_logger`; set `RUST_LOG=info` to see
//! per-session progress or `RUST_LOG=debug` for per-iteration detail.

use actorcheck_explore::checkpoint::load_checkpoint;
use actorcheck_explore::config::{ExplorerConfig, StrategyKind};
use actorcheck_explore::demo::RegisterRace;
use actorcheck_explore::explorer::{ExplorationReport, Explorer};
use actorcheck_explore::report::format_report;
use actorcheck_pattern::{parse_pattern, Dfa, Event, Nfa, NfaMatcher};
use actorcheck_sched::{FeedbackSignal, ScheduleTrace};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::Path;

#[derive(Parser)]
#[command(name = "actorcheck-explore")]
#[command(about = "Systematic concurrency testing for actor programs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Explore the register-race demo program.
    Demo {
        /// Load settings from a JSON config file. Flags given on the
        /// command line override it.
        #[arg(long)]
        config: Option<String>,

        /// Scheduling strategy (random, pct, pctcp, feedback, 2stagefeedback,
        /// feedbackpct, 2stagefeedbackpct, feedbackpctcp, pattern).
        #[arg(short, long)]
        strategy: Option<StrategyKind>,

        /// Iterations to run.
        #[arg(short, long)]
        iterations: Option<u64>,

        /// Random seed for reproducibility.
        #[arg(long)]
        seed: Option<u64>,

        /// Switch points for PCT-family strategies.
        #[arg(short, long)]
        bound: Option<usize>,

        /// Step bound for unfair strategies (0 = unbounded).
        #[arg(long)]
        max_unfair_steps: Option<usize>,

        /// Step bound for fair strategies (0 = unbounded).
        #[arg(long)]
        max_fair_steps: Option<usize>,

        /// Event pattern to track.
        #[arg(short, long)]
        pattern: Option<String>,

        /// Novelty signal for feedback strategies (coverage, timeline,
        /// prefix-branching).
        #[arg(long)]
        signal: Option<FeedbackSignal>,

        /// Keep exploring after the first bug.
        #[arg(long)]
        full: bool,

        /// Treat hitting the step bound as a bug.
        #[arg(long)]
        fail_on_max_steps: bool,

        /// Wall-clock budget in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Number of clients in the demo program.
        #[arg(short, long, default_value = "2")]
        clients: usize,

        /// Output directory for the report, checkpoint and bug traces.
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Replay a schedule trace against the demo program.
    Replay {
        /// Path to a trace file.
        trace: String,

        /// Load the step bounds from a JSON config file.
        #[arg(long)]
        config: Option<String>,

        /// Number of clients in the demo program.
        #[arg(short, long, default_value = "2")]
        clients: usize,
    },

    /// Resume a saved session.
    Resume {
        /// Directory containing checkpoint.json.
        #[arg(short, long)]
        corpus: String,

        /// Override the iteration budget for this session.
        #[arg(short, long)]
        iterations: Option<u64>,

        /// Number of clients in the demo program.
        #[arg(long, default_value = "2")]
        clients: usize,
    },

    /// Parse and compile an event pattern.
    Pattern {
        /// Pattern text.
        pattern: String,

        /// Comma-separated event kinds to feed through the matcher.
        #[arg(short, long)]
        events: Option<String>,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            config,
            strategy,
            iterations,
            seed,
            bound,
            max_unfair_steps,
            max_fair_steps,
            pattern,
            signal,
            full,
            fail_on_max_steps,
            timeout,
            clients,
            output,
        } => {
            let mut cfg = match config {
                Some(path) => load_config(&path),
                None => ExplorerConfig {
                    iterations: 100,
                    ..Default::default()
                },
            };
            if let Some(strategy) = strategy {
                cfg.strategy = strategy;
            }
            if let Some(iterations) = iterations {
                cfg.iterations = iterations;
            }
            if let Some(seed) = seed {
                cfg.seed = seed;
            }
            if let Some(bound) = bound {
                cfg.strategy_bound = bound;
            }
            if let Some(steps) = max_unfair_steps {
                cfg.max_unfair_steps = steps;
            }
            if let Some(steps) = max_fair_steps {
                cfg.max_fair_steps = steps;
            }
            if pattern.is_some() {
                cfg.pattern = pattern;
            }
            if let Some(signal) = signal {
                cfg.feedback_signal = signal;
            }
            cfg.full_exploration |= full;
            cfg.fail_on_max_steps |= fail_on_max_steps;
            if timeout.is_some() {
                cfg.timeout_secs = timeout;
            }
            if output.is_some() {
                cfg.output_dir = output;
            }
            cmd_demo(cfg, clients)
        }
        Commands::Replay {
            trace,
            config,
            clients,
        } => cmd_replay(trace, config, clients),
        Commands::Resume {
            corpus,
            iterations,
            clients,
        } => cmd_resume(corpus, iterations, clients),
        Commands::Pattern { pattern, events } => cmd_pattern(pattern, events),
    }
}

fn load_config(path: &str) -> ExplorerConfig {
    match ExplorerConfig::from_json_file(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: failed to load config {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

fn cmd_demo(config: ExplorerConfig, clients: usize) {
    if clients == 0 {
        eprintln!("Error: the demo needs at least one client");
        std::process::exit(1);
    }

    if let Some(ref output_dir) = config.output_dir {
        if let Err(e) = fs::create_dir_all(output_dir) {
            eprintln!("Error: failed to create output directory: {}", e);
            std::process::exit(1);
        }
    }

    eprintln!("═══════════════════════════════════════════════════════════════════════");
    eprintln!("  actorcheck Exploration");
    eprintln!("═══════════════════════════════════════════════════════════════════════");
    eprintln!();
    eprintln!("Configuration:");
    eprintln!("  Program:        register-race ({} clients)", clients);
    eprintln!("  Strategy:       {}", config.strategy);
    eprintln!("  Iterations:     {}", config.iterations);
    eprintln!("  Seed:           {}", config.seed);
    if config.strategy.uses_switch_points() {
        eprintln!("  Switch points:  {}", config.strategy_bound);
    }
    eprintln!("  Step bound:     {}", config.max_steps());
    if let Some(ref pattern) = config.pattern {
        eprintln!("  Pattern:        {}", pattern);
    }
    if let Some(ref output_dir) = config.output_dir {
        eprintln!("  Output:         {}", output_dir);
    }
    eprintln!();

    let output = config.output_dir.clone();
    let mut explorer = match Explorer::new(config, RegisterRace::new(clients)) {
        Ok(explorer) => explorer,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let report = run_explorer(&mut explorer);
    finish(&report, output.as_deref());
}

fn cmd_replay(trace_path: String, config: Option<String>, clients: usize) {
    let text = match fs::read_to_string(&trace_path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error: failed to read trace {}: {}", trace_path, e);
            std::process::exit(1);
        }
    };
    let trace: ScheduleTrace = match text.parse() {
        Ok(trace) => trace,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let config = config.map(|path| load_config(&path)).unwrap_or_default();

    eprintln!("Replaying {} steps from {}", trace.len(), trace_path);
    eprintln!();

    let mut explorer = match Explorer::for_replay(config, RegisterRace::new(clients), trace) {
        Ok(explorer) => explorer,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let report = run_explorer(&mut explorer);
    finish(&report, None);
}

fn cmd_resume(corpus: String, iterations: Option<u64>, clients: usize) {
    if !Path::new(&corpus).is_dir() {
        eprintln!("Error: corpus directory not found: {}", corpus);
        std::process::exit(1);
    }

    let checkpoint_path = format!("{}/checkpoint.json", corpus);
    let checkpoint = match load_checkpoint(&checkpoint_path) {
        Ok(cp) => cp,
        Err(e) => {
            eprintln!("Error: failed to load checkpoint: {}", e);
            std::process::exit(1);
        }
    };

    eprintln!("═══════════════════════════════════════════════════════════════════════");
    eprintln!("  actorcheck Exploration (RESUME)");
    eprintln!("═══════════════════════════════════════════════════════════════════════");
    eprintln!();
    eprintln!("Checkpoint loaded from: {}", checkpoint_path);
    eprintln!();
    eprintln!("Previous progress:");
    eprintln!("  Iterations:     {}", checkpoint.iterations_completed);
    eprintln!("  Steps:          {}", checkpoint.total_steps);
    eprintln!("  Event pairs:    {}", checkpoint.global_coverage.count());
    eprintln!("  Bugs found:     {}", checkpoint.bugs.len());
    eprintln!();
    eprintln!("Configuration:");
    eprintln!("  Strategy:       {}", checkpoint.config.strategy);
    eprintln!(
        "  Iterations:     {}",
        iterations.unwrap_or(checkpoint.config.iterations)
    );
    eprintln!("  Resume seed:    {}", checkpoint.resume_seed());
    eprintln!();

    let mut explorer =
        match Explorer::from_checkpoint(checkpoint, RegisterRace::new(clients), iterations) {
            Ok(explorer) => explorer,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        };

    let report = run_explorer(&mut explorer);
    finish(&report, Some(&corpus));
}

fn cmd_pattern(source: String, events: Option<String>) {
    let pattern = match parse_pattern(&source) {
        Ok(pattern) => pattern,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(span) = e.span() {
                eprintln!("  {}", source);
                eprintln!("  {}^", " ".repeat(span.start));
            }
            std::process::exit(1);
        }
    };

    let nfa = Nfa::from_pattern(&pattern);
    let dfa = Dfa::from_nfa(&nfa);
    println!("Pattern: {}", pattern);
    println!();
    println!("AST:");
    println!("{:#?}", pattern);
    println!();
    println!("NFA ({} states):", nfa.size());
    println!("{}", nfa);
    println!("DFA ({} states):", dfa.size());
    println!("{}", dfa);

    let Some(events) = events else {
        return;
    };

    let mut matcher = NfaMatcher::new(nfa);
    let mut matched = false;
    for kind in events.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        matcher.match_one(&Event::new(kind));
        matched = matcher.is_accepting();
        let status = if matched {
            "match"
        } else if matcher.is_dead() {
            "dead"
        } else {
            "-"
        };
        println!("  {:<16} {}", kind, status);
    }
    println!();
    println!(
        "Result: {} ({} states visited)",
        if matched { "matched" } else { "no match" },
        matcher.visited_states().len()
    );
}

fn run_explorer(explorer: &mut Explorer<RegisterRace>) -> ExplorationReport {
    // Progress comes from the explorer's log::info! output under env_logger.
    match explorer.run() {
        Ok(report) => report,
        Err(e) => {
            eprintln!();
            eprintln!("Exploration failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn finish(report: &ExplorationReport, output: Option<&str>) {
    let formatted = format_report(report);
    println!("{}", formatted);

    if let Some(output_dir) = output {
        let report_path = format!("{}/report.txt", output_dir);
        if let Err(e) = fs::write(&report_path, &formatted) {
            eprintln!("Warning: failed to save report: {}", e);
        } else {
            eprintln!("Saved report to: {}", report_path);
        }
    }

    if !report.bugs.is_empty() {
        std::process::exit(1);
    }
}
