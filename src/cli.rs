//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::trade_log::write_trade_log_file;
use crate::domain::backtest::{BacktestResult, run_series};
use crate::domain::candle::format_timestamp;
use crate::domain::config_validation::{
    load_data_config, load_montecarlo_config, load_strategy_config, validate_config,
};
use crate::domain::error::EngineError;
use crate::domain::ingest::{DataConfig, Timeframe, fetch_candles};
use crate::domain::montecarlo::{MonteCarloConfig, MonteCarloSummary, simulate};
use crate::domain::strategy::StrategyConfig;

#[derive(Parser, Debug)]
#[command(
    name = "candlecross",
    about = "EMA crossover / RSI candle backtester"
)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Print machine-readable JSON results on stdout
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest over stored candles
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory holding candle CSV files (overrides [data] dir)
        #[arg(short, long)]
        data: Option<PathBuf>,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        timeframe: Option<String>,
        /// Write the closed-trade log as CSV
        #[arg(long)]
        trades_out: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Simulate compounding balances for a fixed win rate and payoff
    Montecarlo {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// Install the stderr log subscriber. Safe to call more than once.
pub fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            data,
            symbol,
            timeframe,
            trades_out,
        } => run_backtest(
            &config,
            data,
            symbol,
            timeframe.as_deref(),
            trades_out.as_deref(),
            cli.json,
        ),
        Command::Validate { config } => run_validate(&config),
        Command::Montecarlo { config, seed } => run_montecarlo(config.as_deref(), seed, cli.json),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

fn fail(err: &EngineError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

fn run_backtest(
    config_path: &Path,
    data_dir: Option<PathBuf>,
    symbol: Option<String>,
    timeframe: Option<&str>,
    trades_out: Option<&Path>,
    json: bool,
) -> ExitCode {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let strategy = match load_strategy_config(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let mut data = match load_data_config(&adapter) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };

    // Stage 2: Apply command-line overrides
    if let Some(dir) = data_dir {
        data.dir = dir;
    }
    if let Some(symbol) = symbol {
        data.request.symbol = symbol;
    }
    if let Some(tf) = timeframe {
        data.request.timeframe = match Timeframe::parse(tf) {
            Ok(tf) => tf,
            Err(e) => return fail(&e),
        };
    }

    // Stage 3: Load candles
    let source = CsvAdapter::new(data.dir.clone());
    eprintln!(
        "Loading {} {} candles from {}",
        data.request.symbol,
        data.request.timeframe,
        source
            .csv_path(&data.request.symbol, data.request.timeframe.label())
            .display()
    );
    let series = match fetch_candles(&source, &data.request, &data.pagination, &data.retry) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    if series.is_empty() {
        let start = match data.request.since {
            Some(since) => format_timestamp(since),
            None => format!(
                "now - {} x {} (set [data] since for older files)",
                data.request.limit, data.request.timeframe
            ),
        };
        eprintln!(
            "warning: no {} {} candles at or after {start}",
            data.request.symbol, data.request.timeframe
        );
    } else if series.len() < strategy.warmup_bars() {
        eprintln!(
            "warning: {} candles is fewer than the {} needed to warm up; no trades possible",
            series.len(),
            strategy.warmup_bars()
        );
    }

    // Stage 4: Run
    eprintln!(
        "Running backtest: {} candles, EMA {}/{}, RSI {} < {}",
        series.len(),
        strategy.fast_period,
        strategy.slow_period,
        strategy.rsi_period,
        strategy.rsi_oversold_threshold
    );
    let result = match run_series(&series, &strategy) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    // Stage 5: Report
    print_summary(&result, &data, &strategy);

    if let Some(path) = trades_out {
        if let Err(e) = write_trade_log_file(path, &result.trades) {
            return fail(&e);
        }
        eprintln!("\nTrade log written to: {}", path.display());
    }

    if json {
        match serde_json::to_string_pretty(&result) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("error: failed to serialize result: {e}");
                return ExitCode::from(1);
            }
        }
    }

    ExitCode::SUCCESS
}

fn print_summary(result: &BacktestResult, data: &DataConfig, strategy: &StrategyConfig) {
    let r = &result.report;
    eprintln!(
        "\n=== Results: {} {} ===",
        data.request.symbol, data.request.timeframe
    );
    eprintln!("Starting Cash:    {:.2}", r.starting_cash);
    eprintln!("Final Equity:     {:.2}", r.final_equity);
    eprintln!("Total Return:     {:.2}%", r.total_return * 100.0);
    eprintln!("Net P&L:          {:.2}", r.net_pnl);
    eprintln!("Commission:       {:.2}", r.total_commission);
    eprintln!("Max Drawdown:     -{:.1}%", r.max_drawdown * 100.0);
    eprintln!("Total Trades:     {}", r.total_trades);
    eprintln!("Wins / Losses:    {} / {}", r.wins, r.losses);
    eprintln!("Win Rate:         {:.1}%", r.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", r.profit_factor);
    eprintln!("Avg Win / Loss:   {:.2} / {:.2}", r.avg_win, r.avg_loss);
    if r.skipped_entries > 0 {
        eprintln!("Skipped Entries:  {}", r.skipped_entries);
    }
    if r.insufficient_cash {
        eprintln!("warning: cash went negative during the run");
    }
    if let Some(pos) = &result.open_position {
        eprintln!(
            "\nOpen at end (excluded): entry {:.4} at {}, stop {:.4}, target {:.4}, size {:.6}",
            pos.entry_price,
            format_timestamp(pos.opened_at),
            pos.stop_price,
            pos.take_profit_price,
            pos.size
        );
    }
    if r.total_trades == 0 && result.open_position.is_none() {
        eprintln!(
            "\nNo trades: no bullish crossover with RSI below {}",
            strategy.rsi_oversold_threshold
        );
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_config(&adapter) {
        return fail(&e);
    }

    // Already validated above; these loads cannot fail.
    let (Ok(strategy), Ok(data)) = (load_strategy_config(&adapter), load_data_config(&adapter))
    else {
        return ExitCode::from(2);
    };

    eprintln!("\nStrategy:");
    eprintln!(
        "  EMA fast/slow:    {}/{}",
        strategy.fast_period, strategy.slow_period
    );
    eprintln!(
        "  RSI:              {} (oversold < {})",
        strategy.rsi_period, strategy.rsi_oversold_threshold
    );
    eprintln!("  Risk fraction:    {}", strategy.risk_fraction);
    eprintln!("  Reward multiple:  {}", strategy.reward_multiple);
    eprintln!("  Stop lookback:    {} bars", strategy.lookback);
    eprintln!("  Warm-up:          {} bars", strategy.warmup_bars());
    eprintln!("\nBacktest:");
    eprintln!("  Starting cash:    {}", strategy.starting_cash);
    eprintln!(
        "  Commission:       {} ({:?})",
        strategy.commission_rate, strategy.commission
    );
    eprintln!("\nData:");
    eprintln!(
        "  {} {} x{} from {}",
        data.request.symbol,
        data.request.timeframe,
        data.request.limit,
        data.dir.display()
    );

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_montecarlo(config_path: Option<&Path>, seed: Option<u64>, json: bool) -> ExitCode {
    let mut mc = match config_path {
        Some(path) => {
            let adapter = match load_config(path) {
                Ok(a) => a,
                Err(code) => return code,
            };
            match load_montecarlo_config(&adapter) {
                Ok(c) => c,
                Err(e) => return fail(&e),
            }
        }
        None => MonteCarloConfig::default(),
    };
    if let Some(seed) = seed {
        mc.seed = seed;
    }

    eprintln!(
        "Simulating {} accounts x {} trades (win rate {}, risk {}, reward {})",
        mc.n_simulations, mc.n_trades, mc.win_rate, mc.risk, mc.reward
    );
    let summary = match simulate(&mc) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    print_montecarlo(&summary);

    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("error: failed to serialize result: {e}");
                return ExitCode::from(1);
            }
        }
    }
    ExitCode::SUCCESS
}

fn print_montecarlo(summary: &MonteCarloSummary) {
    eprintln!("\n=== Monte Carlo ===");
    eprintln!("Simulations:      {}", summary.simulations);
    eprintln!("Mean Balance:     {:.2}", summary.mean);
    eprintln!("Median Balance:   {:.2}", summary.median);
    eprintln!("Min / Max:        {:.2} / {:.2}", summary.min, summary.max);
    eprintln!("Below Start:      {:.1}%", summary.losing_share * 100.0);
}
