use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{LevelFilter, info};
use nanonis_control::nanonis::client::catalog::{self, resolve_value};
use nanonis_control::{
    Arg, AppConfig, CATALOG, NanonisClient, NanonisError, NanonisValue, TypeTag,
    load_config, load_config_or_default,
};
use std::path::PathBuf;

/// Send commands to a Nanonis controller over its TCP interface
#[derive(Parser, Debug)]
#[command(name = "nanonis-cli")]
#[command(about = "Send commands to a Nanonis SPM controller", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Override controller address
    #[arg(long)]
    host: Option<String>,

    /// Override controller port (6501-6504)
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Send a raw protocol command, e.g. `send Bias.Set -t f -a 100m`
    Send {
        /// Protocol command name
        command: String,
        /// Argument type codes (h, i, H, I, f, d, +*c, +*f, ...)
        #[arg(short, long, value_delimiter = ',')]
        types: Vec<String>,
        /// Argument values; array elements are separated by ';'
        #[arg(short, long, value_delimiter = ',', allow_hyphen_values = true)]
        args: Vec<String>,
        /// Return type codes
        #[arg(short, long, value_delimiter = ',')]
        returns: Vec<String>,
    },
    /// Invoke a named command from the catalog, e.g. `call tip_z_set -- -100p`
    Call {
        name: String,
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// List the named commands
    List,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    // An explicit config file must load, otherwise fall back to defaults
    let config = match args.config.as_deref() {
        Some(path) => load_config(Some(path)).map_err(NanonisError::from)?,
        None => load_config_or_default(None),
    };

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.console.verbosity.clone());
    initialize_logging(&log_level);

    match &args.command {
        Action::List => {
            print_catalog();
            Ok(())
        }
        Action::Send {
            command,
            types,
            args: values,
            returns,
        } => {
            let client = connect(&args, &config)?;
            let result = send_raw(&client, command, types, values, returns);
            client.close()?;
            print_values(&result?)
        }
        Action::Call { name, args: values } => {
            let client = connect(&args, &config)?;
            let result = call_named(&client, name, values);
            client.close()?;
            print_values(&result?)
        }
    }
}

fn initialize_logging(log_level: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => {
            eprintln!("Warning: Invalid log level '{}', using 'info'", log_level);
            LevelFilter::Info
        }
    };

    env_logger::Builder::from_env(Env::default())
        .filter_level(level)
        .format_timestamp_millis()
        .init();
}

fn connect(args: &Args, config: &AppConfig) -> Result<NanonisClient, NanonisError> {
    let host = args.host.as_deref().unwrap_or(&config.nanonis.host_ip);
    let port = args.port.unwrap_or(config.nanonis.control_port);
    info!("Connecting to {host}:{port}");

    NanonisClient::builder()
        .address(host)
        .port(port)
        .config(config.nanonis.connection())
        .limits(config.limits)
        .build()
}

/// Parse one command line value for the given wire type.
fn parse_cli_value(tag: &TypeTag, text: &str) -> Result<NanonisValue, NanonisError> {
    match tag {
        TypeTag::Array(inner) | TypeTag::Counted(inner) => {
            let items = text
                .split(';')
                .filter(|part| !part.trim().is_empty())
                .map(|part| parse_cli_value(inner, part))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(NanonisValue::Array(items))
        }
        _ => resolve_value("argument", tag, &Arg::Literal(text.to_string())),
    }
}

fn send_raw(
    client: &NanonisClient,
    command: &str,
    types: &[String],
    values: &[String],
    returns: &[String],
) -> Result<Vec<NanonisValue>, NanonisError> {
    let arg_types = types
        .iter()
        .map(|code| code.parse())
        .collect::<Result<Vec<TypeTag>, _>>()?;
    let return_types = returns
        .iter()
        .map(|code| code.parse())
        .collect::<Result<Vec<TypeTag>, _>>()?;

    if arg_types.len() != values.len() {
        return Err(NanonisError::InvalidCommand(format!(
            "{} types given for {} values",
            arg_types.len(),
            values.len()
        )));
    }

    let args = arg_types
        .iter()
        .zip(values)
        .map(|(tag, text)| parse_cli_value(tag, text))
        .collect::<Result<Vec<_>, _>>()?;

    client.send(command, &arg_types, &args, &return_types)
}

fn call_named(
    client: &NanonisClient,
    name: &str,
    values: &[String],
) -> Result<Vec<NanonisValue>, NanonisError> {
    let spec =
        catalog::lookup(name).ok_or_else(|| NanonisError::UnknownCommand(name.to_string()))?;
    let arg_types = spec.arg_types()?;

    // Arrays can't be written as engineering literals, convert them here
    let args = values
        .iter()
        .enumerate()
        .map(|(idx, text)| match arg_types.get(idx) {
            Some(tag @ (TypeTag::Array(_) | TypeTag::Counted(_))) => {
                parse_cli_value(tag, text).map(Arg::Value)
            }
            _ => Ok(Arg::Literal(text.clone())),
        })
        .collect::<Result<Vec<_>, _>>()?;

    client.call(name, &args)
}

fn print_values(values: &[NanonisValue]) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(values)?);
    Ok(())
}

fn print_catalog() {
    for spec in CATALOG {
        let args = spec
            .args
            .iter()
            .map(|a| format!("{}:{}", a.name, a.code))
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:<24} {:<22} ({}) -> [{}]",
            spec.name,
            spec.command,
            args,
            spec.returns.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cli_scalars() {
        assert_eq!(
            parse_cli_value(&TypeTag::F32, "100m").unwrap(),
            NanonisValue::F32(0.1)
        );
        assert_eq!(
            parse_cli_value(&TypeTag::U32, "1").unwrap(),
            NanonisValue::U32(1)
        );
        assert_eq!(
            parse_cli_value(&TypeTag::String, "scan").unwrap(),
            NanonisValue::String("scan".to_string())
        );
    }

    #[test]
    fn test_parse_cli_arrays() {
        let tag = TypeTag::array(TypeTag::I32);
        assert_eq!(
            parse_cli_value(&tag, "0;3;-2").unwrap(),
            NanonisValue::from(vec![0i32, 3, -2])
        );
        assert_eq!(
            parse_cli_value(&tag, "").unwrap(),
            NanonisValue::Array(vec![])
        );
        assert!(parse_cli_value(&tag, "1;x").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "nanonis-cli",
            "--port",
            "6502",
            "send",
            "Bias.Set",
            "-t",
            "f",
            "-a",
            "-100m",
        ])
        .unwrap();
        assert_eq!(args.port, Some(6502));
        match args.command {
            Action::Send { command, types, args, returns } => {
                assert_eq!(command, "Bias.Set");
                assert_eq!(types, vec!["f"]);
                assert_eq!(args, vec!["-100m"]);
                assert!(returns.is_empty());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
