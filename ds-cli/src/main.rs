//! ds: search for fast execution orderings of the demo SpMV pipeline.

mod banded;
mod mm;
mod pipeline;

use std::io;
use std::path::PathBuf;
use std::process;
use std::thread;

use ds_bench::{Benchmarker, CollectiveBenchmarker, CsvBenchmarker};
use ds_core::{Config, StrategyKind};
use ds_logging::CsvRecorder;
use ds_mcts::{run_search, strategy_for, SearchOpts};
use ds_platform::{Communicator, Platform, SelfComm, SimAccelerator, ThreadComm};

use banded::MatrixInfo;

fn print_help() {
    eprintln!(
        r#"ds - schedule search for a distributed CPU/GPU operation graph

USAGE:
    ds <COMMAND> [OPTIONS] [MATRIX]

COMMANDS:
    search      Run the schedule search over the demo SpMV pipeline
    graph       Print the demo pipeline graph (JSON on stdout)

OPTIONS:
    -h, --help      Print this help message
    -V, --version   Print version

MATRIX is an optional matrix-market file; without it a random banded
matrix is generated. Results stream to stdout as CSV; diagnostics go to
stderr. Run `ds <COMMAND> --help` for command options.
"#
    );
}

fn print_version() {
    println!("ds {}", env!("CARGO_PKG_VERSION"));
}

fn parse_strategy(s: &str) -> Option<StrategyKind> {
    match s {
        "min_time" => Some(StrategyKind::MinTime),
        "normalized" => Some(StrategyKind::Normalized),
        "normalized_anti_correlation" => Some(StrategyKind::NormalizedAntiCorrelation),
        _ => None,
    }
}

struct SearchArgs {
    cfg: Config,
    ranks: u32,
    matrix: Option<PathBuf>,
    bench_csv: Option<PathBuf>,
    dump_prefix: Option<PathBuf>,
}

fn parse_search_args(args: &[String]) -> SearchArgs {
    let mut config_path: Option<String> = None;
    let mut ranks: u32 = 1;
    let mut iters: Option<u32> = None;
    let mut streams: Option<u32> = None;
    let mut seed: Option<u64> = None;
    let mut strategy: Option<StrategyKind> = None;
    let mut matrix: Option<PathBuf> = None;
    let mut bench_csv: Option<PathBuf> = None;
    let mut dump_prefix: Option<PathBuf> = None;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"ds search

USAGE:
    ds search [OPTIONS] [MATRIX]

OPTIONS:
    --config PATH       YAML config file
    --ranks N           SPMD ranks to run as threads (default: 1)
    --iters N           Override search iterations
    --streams N         Override stream count (beyond the default stream)
    --seed S            Override RNG seed
    --strategy NAME     min_time | normalized | normalized_anti_correlation
    --bench-csv PATH    Replay measurements from CSV instead of running
    --dump-tree PREFIX  Periodically dump the search tree as PREFIX_NNNNNN.json
"#
                );
                process::exit(0);
            }
            "--config" => {
                config_path = Some(args.get(i + 1).cloned().unwrap_or_default());
                i += 2;
            }
            "--ranks" => {
                ranks = args
                    .get(i + 1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(|| {
                        eprintln!("Invalid --ranks value");
                        process::exit(1);
                    });
                i += 2;
            }
            "--iters" => {
                iters = Some(args.get(i + 1).and_then(|s| s.parse().ok()).unwrap_or_else(
                    || {
                        eprintln!("Invalid --iters value");
                        process::exit(1);
                    },
                ));
                i += 2;
            }
            "--streams" => {
                streams = Some(args.get(i + 1).and_then(|s| s.parse().ok()).unwrap_or_else(
                    || {
                        eprintln!("Invalid --streams value");
                        process::exit(1);
                    },
                ));
                i += 2;
            }
            "--seed" => {
                seed = Some(args.get(i + 1).and_then(|s| s.parse().ok()).unwrap_or_else(
                    || {
                        eprintln!("Invalid --seed value");
                        process::exit(1);
                    },
                ));
                i += 2;
            }
            "--strategy" => {
                let name = args.get(i + 1).cloned().unwrap_or_default();
                strategy = Some(parse_strategy(&name).unwrap_or_else(|| {
                    eprintln!("Unknown strategy: {name}");
                    process::exit(1);
                }));
                i += 2;
            }
            "--bench-csv" => {
                bench_csv = Some(PathBuf::from(args.get(i + 1).cloned().unwrap_or_default()));
                i += 2;
            }
            "--dump-tree" => {
                dump_prefix = Some(PathBuf::from(args.get(i + 1).cloned().unwrap_or_default()));
                i += 2;
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown option for `ds search`: {other}");
                eprintln!("Run `ds search --help` for usage.");
                process::exit(1);
            }
            positional => {
                if matrix.is_some() {
                    eprintln!("Only one matrix path is accepted");
                    process::exit(1);
                }
                matrix = Some(PathBuf::from(positional));
                i += 1;
            }
        }
    }

    let mut cfg = match config_path {
        Some(p) => Config::load(&p).unwrap_or_else(|e| {
            eprintln!("Failed to load config {p}: {e}");
            process::exit(1);
        }),
        None => Config::default(),
    };
    if let Some(v) = iters {
        cfg.search.iterations = v;
    }
    if let Some(v) = streams {
        cfg.platform.streams = v;
    }
    if let Some(v) = seed {
        cfg.search.seed = v;
    }
    if let Some(v) = strategy {
        cfg.search.strategy = v;
    }
    if ranks < 1 {
        eprintln!("--ranks must be >= 1");
        process::exit(1);
    }
    if bench_csv.is_some() && ranks != 1 {
        eprintln!("--bench-csv replays a single-rank measurement database");
        process::exit(1);
    }

    SearchArgs {
        cfg,
        ranks,
        matrix,
        bench_csv,
        dump_prefix,
    }
}

fn load_matrix(path: &Option<PathBuf>, seed: u64) -> MatrixInfo {
    match path {
        Some(p) => mm::read_info(p).unwrap_or_else(|e| {
            eprintln!("Failed to read {}: {e}", p.display());
            process::exit(1);
        }),
        None => banded::random_banded(10_000, 8, seed),
    }
}

fn run_rank(
    comm: Box<dyn Communicator>,
    cfg: &Config,
    matrix: &MatrixInfo,
    bench_csv: &Option<PathBuf>,
    dump_prefix: &Option<PathBuf>,
) {
    let rank = comm.rank();
    let size = comm.size();
    let work = banded::partition(matrix, rank, size);
    let g = pipeline::build_pipeline(rank, size, &work);

    let mut plat = Platform::with_streams(
        cfg.platform.streams as usize,
        Box::new(SimAccelerator::new()),
        comm,
    )
    .unwrap_or_else(|e| {
        eprintln!("rank {rank}: platform setup failed: {e}");
        process::exit(1);
    });

    let mut bench: Box<dyn Benchmarker> = match bench_csv {
        Some(p) => Box::new(CsvBenchmarker::load(p, &g).unwrap_or_else(|e| {
            eprintln!("Failed to load benchmark CSV {}: {e}", p.display());
            process::exit(1);
        })),
        None => Box::new(CollectiveBenchmarker::new(&g, &cfg.bench)),
    };

    let strategy = strategy_for(cfg.search.strategy);
    let mut opts = SearchOpts::from_config(&cfg.search);
    opts.dump_prefix = dump_prefix.clone();

    let mut recorder;
    let sink = if rank == 0 {
        recorder = CsvRecorder::new(io::stdout(), 50);
        Some(&mut recorder as &mut dyn ds_logging::ResultSink)
    } else {
        None
    };

    let report = run_search(&g, &mut plat, bench.as_mut(), strategy.as_ref(), &opts, sink)
        .unwrap_or_else(|e| {
            eprintln!("rank {rank}: search failed: {e}");
            process::exit(1);
        });

    if rank == 0 {
        eprintln!(
            "search done: iterations={} nodes={} exhausted={}",
            report.stats.iterations, report.stats.node_count, report.stats.exhausted
        );
        if let Some(best) = report.best {
            let names: Vec<&str> = best.order.iter().map(|o| o.name()).collect();
            eprintln!("best pct10={:.6}: {}", best.result.pct10, names.join(", "));
        }
    }
}

fn cmd_search(args: &[String]) {
    let a = parse_search_args(args);
    ds_logging::log_env_diagnostics();

    let matrix = load_matrix(&a.matrix, a.cfg.search.seed);
    eprintln!(
        "matrix: {}x{} nnz={} ranks={} streams={} strategy={:?}",
        matrix.rows, matrix.cols, matrix.nnz, a.ranks, a.cfg.platform.streams, a.cfg.search.strategy
    );

    if a.ranks == 1 {
        run_rank(
            Box::new(SelfComm::new()),
            &a.cfg,
            &matrix,
            &a.bench_csv,
            &a.dump_prefix,
        );
        return;
    }

    let mut comms = ThreadComm::group(a.ranks);
    let root = comms.remove(0);
    let mut handles = Vec::new();
    for comm in comms {
        let cfg = a.cfg.clone();
        let dump = a.dump_prefix.clone();
        handles.push(thread::spawn(move || {
            run_rank(Box::new(comm), &cfg, &matrix, &None, &dump);
        }));
    }
    run_rank(Box::new(root), &a.cfg, &matrix, &a.bench_csv, &a.dump_prefix);
    for h in handles {
        if h.join().is_err() {
            eprintln!("a rank thread failed");
            process::exit(1);
        }
    }
}

fn cmd_graph(args: &[String]) {
    let mut matrix_path: Option<PathBuf> = None;
    let mut ranks: u32 = 1;
    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"ds graph

USAGE:
    ds graph [--ranks N] [MATRIX]

Prints rank 0's pipeline graph as JSON on stdout and a human-readable
adjacency listing on stderr.
"#
                );
                return;
            }
            "--ranks" => {
                ranks = args
                    .get(i + 1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(|| {
                        eprintln!("Invalid --ranks value");
                        process::exit(1);
                    });
                i += 2;
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown option for `ds graph`: {other}");
                process::exit(1);
            }
            positional => {
                matrix_path = Some(PathBuf::from(positional));
                i += 1;
            }
        }
    }

    let matrix = load_matrix(&matrix_path, 0);
    let work = banded::partition(&matrix, 0, ranks.max(1));
    let g = pipeline::build_pipeline(0, ranks.max(1), &work);
    g.validate().unwrap_or_else(|e| {
        eprintln!("pipeline graph is invalid: {e}");
        process::exit(1);
    });

    eprint!("{}", g.dump());
    let json = ds_core::graph_to_json(&g);
    println!(
        "{}",
        serde_json::to_string_pretty(&json).unwrap_or_else(|e| {
            eprintln!("Failed to serialize graph: {e}");
            process::exit(1);
        })
    );
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("search") => cmd_search(&args[1..]),
        Some("graph") => cmd_graph(&args[1..]),
        Some("--version") | Some("-V") => print_version(),
        Some("--help") | Some("-h") | None => print_help(),
        Some(other) => {
            eprintln!("Unknown command: {other}");
            print_help();
            process::exit(1);
        }
    }
}
