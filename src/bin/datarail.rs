use datarail::config::{self, RuntimeConfig};
use datarail::drivers::SqliteDataSource;
use datarail::interceptor::{InterceptedExecutor, LoggingInterceptor, Pointcut};
use datarail::{scan_rows, Context, Executor, Result, Value};
use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, info_span};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: datarail <database> <sql> [params...]";

/// Statements whose results are rows rather than a write summary.
fn returns_rows(sql: &str) -> bool {
    let head = sql.trim_start().to_ascii_lowercase();
    ["select", "with", "pragma", "values", "explain"]
        .iter()
        .any(|kw| head.starts_with(kw))
}

/// Parameters are read as JSON where they parse and as text otherwise.
fn parse_param(raw: &str) -> Value {
    serde_json::from_str::<serde_json::Value>(raw)
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(raw))
}

fn run(config: RuntimeConfig, sql: &str, params: &[Value]) -> Result<serde_json::Value> {
    let source = SqliteDataSource::open(&config.sqlite)?;
    let span = info_span!("datarail", database = %config.sqlite.path);
    let executor = InterceptedExecutor::new(source.new_executor(config.executor.kind, span)?)
        .with(Pointcut::all(), Arc::new(LoggingInterceptor));
    let ctx = Context::background();

    let output = if returns_rows(sql) {
        let mut rs = executor.query(&ctx, sql, params)?;
        let mut rows: Vec<BTreeMap<String, Value>> = Vec::new();
        let count = scan_rows(&mut rows, rs.as_mut())?;
        info!("{} rows", count);
        serde_json::Value::Array(
            rows.into_iter()
                .map(|row| Value::Map(row).to_json())
                .collect(),
        )
    } else {
        let rs = executor.execute(&ctx, sql, params)?;
        serde_json::json!({
            "last_insert_id": rs.last_insert_id()?,
            "rows_affected": rs.rows_affected()?,
        })
    };
    executor.close(&ctx, false)?;
    Ok(output)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    }

    let mut config = match config::load_default_config() {
        Ok(config) => config,
        Err(e) => {
            error!("ignoring configuration: {}", e);
            RuntimeConfig::default()
        }
    };
    config.sqlite.path = args[0].clone();
    let params: Vec<Value> = args[2..].iter().map(|p| parse_param(p)).collect();

    match run(config, &args[1], &params) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
