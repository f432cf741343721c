use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use seqforge_engine::demo;
use seqforge_engine::{
    Catalog, ComponentCache, EngineError, GenConfig, GenerationEngine, JsonLinesSink, MemorySink,
    SequenceSink, StatementRecord, TeeSink,
};

/// Exit code when a component behaved differently on re-execution.
const FLAKY_EXIT_CODE: i32 = 2;

/// Call deadline applied to catalogs with non-returning operations.
const DEFAULT_MIXED_TIMEOUT_MS: u64 = 1_000;

#[derive(Parser)]
#[command(
    name = "seqforge",
    about = "seqforge: feedback-directed random generation of call sequences"
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate sequences against a built-in catalog.
    Run {
        /// Catalog of operations to exercise.
        #[arg(short, long, value_enum, default_value = "stack")]
        catalog: CatalogChoice,
        /// Generation settings (JSON). Flags below override it.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
        /// Wall-clock budget in milliseconds.
        #[arg(long)]
        time_limit_ms: Option<u64>,
        #[arg(long)]
        input_limit: Option<u64>,
        #[arg(long)]
        output_limit: Option<u64>,
        #[arg(long)]
        max_size: Option<usize>,
        #[arg(long)]
        null_ratio: Option<f64>,
        #[arg(long)]
        alias_ratio: Option<f64>,
        #[arg(long)]
        forbid_null: bool,
        /// Prefer short, rarely selected components.
        #[arg(long)]
        favor_shorter: bool,
        #[arg(long)]
        clear_threshold: Option<usize>,
        /// Per-call deadline in milliseconds; enables isolated execution.
        #[arg(long)]
        call_timeout_ms: Option<u64>,
        /// Abort if no progress is made for this many milliseconds.
        #[arg(long)]
        stall_window_ms: Option<u64>,
        /// Keep candidate history for divergence reports.
        #[arg(long)]
        diagnostics: bool,
        /// Log every random decision (needs -vv).
        #[arg(long)]
        trace_random: bool,
        /// Write accepted sequences as JSON lines to this file.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Seed the pool from a component cache.
        #[arg(long)]
        cache_in: Option<PathBuf>,
        /// Save the final pool to a component cache.
        #[arg(long)]
        cache_out: Option<PathBuf>,
        /// Print accepted sequences after the report.
        #[arg(long)]
        show: bool,
    },
    /// List the sequences stored in a component cache.
    Inspect {
        /// Cache file (JSON)
        file: PathBuf,
        /// Render sequences as code using this catalog.
        #[arg(short, long, value_enum)]
        catalog: Option<CatalogChoice>,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the default generation settings.
    Config {
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the operations of a built-in catalog.
    Catalog {
        #[arg(value_enum)]
        name: CatalogChoice,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CatalogChoice {
    Counter,
    Stack,
    Mixed,
}

impl CatalogChoice {
    fn build(self) -> Result<Catalog, EngineError> {
        match self {
            CatalogChoice::Counter => demo::counter_catalog(),
            CatalogChoice::Stack => demo::stack_catalog(),
            CatalogChoice::Mixed => demo::mixed_catalog(),
        }
    }
}

#[derive(Serialize)]
struct InspectEntry {
    index: usize,
    statements: usize,
    calls: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    if let Err(e) = run(cli.command) {
        eprintln!("error: {e}");
        if matches!(e, EngineError::Flaky(_)) {
            process::exit(FLAKY_EXIT_CODE);
        }
        process::exit(1);
    }
}

fn run(command: Command) -> Result<(), EngineError> {
    match command {
        Command::Run {
            catalog,
            config,
            seed,
            time_limit_ms,
            input_limit,
            output_limit,
            max_size,
            null_ratio,
            alias_ratio,
            forbid_null,
            favor_shorter,
            clear_threshold,
            call_timeout_ms,
            stall_window_ms,
            diagnostics,
            trace_random,
            output,
            cache_in,
            cache_out,
            show,
        } => {
            let mut cfg = match &config {
                Some(path) => GenConfig::load(path)?,
                None => GenConfig::default(),
            };
            if let Some(v) = seed {
                cfg.seed = v;
            }
            if let Some(v) = time_limit_ms {
                cfg.time_limit_ms = v;
            }
            if let Some(v) = input_limit {
                cfg.input_limit = v;
            }
            if let Some(v) = output_limit {
                cfg.output_limit = v;
            }
            if let Some(v) = max_size {
                cfg.max_size = v;
            }
            if let Some(v) = null_ratio {
                cfg.null_ratio = v;
            }
            if let Some(v) = alias_ratio {
                cfg.alias_ratio = v;
            }
            if let Some(v) = clear_threshold {
                cfg.clear_threshold = v;
            }
            if let Some(v) = call_timeout_ms {
                cfg.call_timeout_ms = Some(v);
            }
            if let Some(v) = stall_window_ms {
                cfg.stall_window_ms = v;
            }
            cfg.forbid_null |= forbid_null;
            cfg.favor_shorter |= favor_shorter;
            cfg.diagnostics |= diagnostics;

            if matches!(catalog, CatalogChoice::Mixed) && cfg.call_timeout_ms.is_none() {
                warn!(
                    timeout_ms = DEFAULT_MIXED_TIMEOUT_MS,
                    "mixed catalog has a non-returning operation; enabling isolated execution"
                );
                cfg.call_timeout_ms = Some(DEFAULT_MIXED_TIMEOUT_MS);
            }

            let ops = catalog.build()?;
            let seeds = match &cache_in {
                Some(path) => {
                    let cache = ComponentCache::load(path)?;
                    let seeds = cache.resolve(&ops)?;
                    info!(path = %path.display(), components = seeds.len(), "loaded component cache");
                    seeds
                }
                None => Vec::new(),
            };

            let memory = MemorySink::new();
            let sink: Box<dyn SequenceSink> = match &output {
                Some(path) if show => Box::new(TeeSink::new(vec![
                    Box::new(memory.clone()),
                    Box::new(JsonLinesSink::create(path)?),
                ])),
                Some(path) => Box::new(JsonLinesSink::create(path)?),
                None => Box::new(memory.clone()),
            };

            let mut engine = GenerationEngine::new(ops, cfg)?
                .with_sink(sink)
                .with_seeds(seeds)?
                .with_random_trace(trace_random);
            let report = engine.run()?;

            if let Some(path) = &cache_out {
                let cache = ComponentCache::from_sequences(engine.catalog(), engine.pool().components());
                cache.save(path)?;
                info!(path = %path.display(), components = cache.len(), "saved component cache");
            }
            if let Some(path) = &output {
                info!(path = %path.display(), outputs = report.outputs, "outputs written");
            }

            println!("{}", report.to_json()?);
            if show {
                for accepted in memory.accepted() {
                    println!(
                        "\n// #{} {}\n{}",
                        accepted.index,
                        accepted.classification.as_str(),
                        accepted.sequence.to_code()
                    );
                }
            }
        }
        Command::Inspect {
            file,
            catalog,
            json,
        } => {
            let cache = ComponentCache::load(&file)?;
            let resolved = match catalog {
                Some(choice) => Some(cache.resolve(&choice.build()?)?),
                None => None,
            };
            let entries: Vec<InspectEntry> = cache
                .records()
                .iter()
                .enumerate()
                .map(|(index, record)| InspectEntry {
                    index,
                    statements: record.statements.len(),
                    calls: record
                        .statements
                        .iter()
                        .filter(|s| matches!(s, StatementRecord::Call { .. }))
                        .count(),
                    code: resolved.as_ref().and_then(|seqs| seqs.get(index)).map(|s| s.to_code()),
                })
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("cache: {}", file.display());
                println!("  version:   {}", cache.version());
                println!("  catalog:   {}", cache.catalog_fingerprint());
                println!("  sequences: {}", cache.len());
                for entry in &entries {
                    println!(
                        "  [{}] {} statements, {} calls",
                        entry.index, entry.statements, entry.calls
                    );
                    if let Some(code) = &entry.code {
                        for line in code.lines() {
                            println!("      {line}");
                        }
                    }
                }
            }
        }
        Command::Config { output } => {
            let json = GenConfig::default().to_json()?;
            match output {
                Some(path) => {
                    fs::write(&path, &json)?;
                    println!("default config written to {}", path.display());
                }
                None => println!("{json}"),
            }
        }
        Command::Catalog { name } => {
            let ops = name.build()?;
            println!("catalog {}", ops.fingerprint());
            for op in ops.ops() {
                println!("  {}", op.signature());
            }
        }
    }
    Ok(())
}
