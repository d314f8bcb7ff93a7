//! Outil CLI de diagnostic autour des échanges SOAP
//!
//! Usage:
//!   adsoaptool [--config DIR] fix-namespace FILE [NAMESPACE]
//!   adsoaptool [--config DIR] parse-array string|int|long FILE
//!   adsoaptool [--config DIR] dump REQUEST_ID REQUEST_FILE RESPONSE_FILE
//!   adsoaptool [--config DIR] dump-exchange DIR
//!   adsoaptool [--config DIR] context [HEADER...]

use adsoap::context::HEADER_KEY;
use adsoap::{
    AdSoapConfigExt, HttpOptions, OptionValue, RecordedExchange, parse_array_of_int,
    parse_array_of_long, parse_array_of_string,
};
use adsoapconfig::Config;
use anyhow::{Context, Result, anyhow};
use std::fmt::Display;
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Charge la configuration sous un abonné provisoire, le niveau configuré
/// n'étant pas encore connu
fn load_config<W>(config_dir: &str, filter: EnvFilter, writer: W) -> Result<Config>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .finish();
    tracing::subscriber::with_default(bootstrap, || Config::load_config(config_dir))
}

fn init_logging(config: &Config) {
    let level = config
        .get_log_min_level()
        .unwrap_or_else(|_| "INFO".to_string())
        .to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_text(path: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Cannot read {}", path))
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Cannot read {}", path.display()))
}

fn print_items<T: Display>(items: Option<Vec<T>>) {
    match items {
        Some(items) => {
            for item in items {
                println!("{}", item);
            }
        }
        None => println!("nil"),
    }
}

fn fix_namespace_cmd(config: &Config, args: &[String]) -> Result<()> {
    let file = args.first().ok_or_else(|| anyhow!("Missing FILE"))?;
    let xml = read_text(file)?;

    let fixed = match args.get(1) {
        Some(namespace) => adsoap::fix_namespace(&xml, namespace),
        None => config.fix_response_namespace(&xml),
    };
    print!("{}", fixed);
    Ok(())
}

fn parse_array_cmd(args: &[String]) -> Result<()> {
    let (Some(kind), Some(file)) = (args.first(), args.get(1)) else {
        return Err(anyhow!("Usage: parse-array string|int|long FILE"));
    };
    let xml = read_text(file)?;

    match kind.as_str() {
        "string" => print_items(parse_array_of_string(&xml)?),
        "int" => print_items(parse_array_of_int(&xml)?),
        "long" => print_items(parse_array_of_long(&xml)?),
        other => return Err(anyhow!("Unknown array type '{}'", other)),
    }
    Ok(())
}

fn dump_cmd(config: &Config, args: &[String]) -> Result<()> {
    let [request_id, request_file, response_file] = args else {
        return Err(anyhow!("Usage: dump REQUEST_ID REQUEST_FILE RESPONSE_FILE"));
    };

    let dumper = config.create_dumper()?;
    let request = read_bytes(Path::new(request_file))?;
    let response = read_bytes(Path::new(response_file))?;

    let (req_path, resp_path) = dumper.dump(request_id, &request, &response)?;
    println!("{}", req_path.display());
    println!("{}", resp_path.display());
    Ok(())
}

fn dump_exchange_cmd(config: &Config, args: &[String]) -> Result<()> {
    let dir = Path::new(args.first().ok_or_else(|| anyhow!("Missing DIR"))?);

    let exchange = RecordedExchange::new()
        .with_request(
            read_bytes(&dir.join("request_headers"))?,
            read_bytes(&dir.join("request_body"))?,
        )
        .with_response(
            read_bytes(&dir.join("response_headers"))?,
            read_bytes(&dir.join("response_body"))?,
        );

    let dumper = config.create_dumper()?;
    match dumper.dump_last_request(&exchange)? {
        Some((req_path, resp_path)) => {
            println!("{}", req_path.display());
            println!("{}", resp_path.display());
        }
        None => warn!(directory=%dir.display(), "No RequestId header in response, nothing dumped"),
    }
    Ok(())
}

fn context_cmd(config: &Config, args: &[String]) -> Result<()> {
    let mut extra = HttpOptions::new();
    if !args.is_empty() {
        extra.insert(HEADER_KEY.to_string(), OptionValue::Lines(args.to_vec()));
    }

    let context = config.build_stream_context(extra, None)?;
    for (section, options) in context.options() {
        for (key, value) in options {
            if key == HEADER_KEY {
                for line in context.header_lines() {
                    println!("{}.{}: {}", section, key, line);
                }
            } else {
                println!("{}.{}: {}", section, key, value);
            }
        }
    }
    Ok(())
}

fn print_usage() {
    println!("Usage:");
    println!("  adsoaptool [--config DIR] fix-namespace FILE [NAMESPACE]");
    println!("  adsoaptool [--config DIR] parse-array string|int|long FILE");
    println!("  adsoaptool [--config DIR] dump REQUEST_ID REQUEST_FILE RESPONSE_FILE");
    println!("  adsoaptool [--config DIR] dump-exchange DIR");
    println!("  adsoaptool [--config DIR] context [HEADER...]");
}

fn main() -> Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();

    let mut config_dir = String::new();
    if args.first().map(String::as_str) == Some("--config") {
        if args.len() < 2 {
            print_usage();
            return Ok(());
        }
        config_dir = args[1].clone();
        args.drain(..2);
    }

    let Some(command) = args.first().cloned() else {
        print_usage();
        return Ok(());
    };

    let config = load_config(&config_dir, default_filter(), std::io::stderr)?;
    init_logging(&config);
    info!(config_dir=%config.directory().display(), command=%command, "Starting adsoaptool");

    let rest = &args[1..];
    match command.as_str() {
        "fix-namespace" => fix_namespace_cmd(&config, rest),
        "parse-array" => parse_array_cmd(rest),
        "dump" => dump_cmd(&config, rest),
        "dump-exchange" => dump_exchange_cmd(&config, rest),
        "context" => context_cmd(&config, rest),
        _ => {
            print_usage();
            Ok(())
        }
    }
}
