use std::{env, fs, process::ExitCode};

use anyhow::{Context as _, bail};
use tether::{DEFAULT_SCRIPT_NAME, Session, SessionConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: tether <script.py> [--result NAME] [--config FILE]";

/// Parsed command line.
struct Args {
    script: String,
    result: Option<String>,
    config: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let args = parse_args(env::args().skip(1))?;
    let source = fs::read_to_string(&args.script).with_context(|| format!("cannot read {}", args.script))?;

    let mut config = match &args.config {
        Some(path) => SessionConfig::from_json_file(path)?,
        None => SessionConfig::default(),
    };
    if config.script_name == DEFAULT_SCRIPT_NAME {
        config.script_name.clone_from(&args.script);
    }
    debug!(script = %args.script, ?config, "starting session");

    let session = Session::start(config)?;
    let result_name = args.result.clone();
    let outcome = session.run(move |cx| -> tether::Result<Option<String>> {
        let value = cx.execute(&source, result_name.as_deref())?;
        value.map(|value| value.repr(cx)).transpose()
    })?;

    print!("{}", session.take_output());
    let code = match outcome {
        Ok(Some(repr)) => {
            println!("{repr}");
            ExitCode::SUCCESS
        }
        Ok(None) => match &args.result {
            Some(name) => {
                eprintln!("error: script did not set '{name}'");
                ExitCode::FAILURE
            }
            None => ExitCode::SUCCESS,
        },
        Err(err) => {
            eprintln!("{}", err.render());
            ExitCode::FAILURE
        }
    };
    session.stop()?;
    Ok(code)
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut script = None;
    let mut result = None;
    let mut config = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--result" => result = Some(args.next().context("--result needs a variable name")?),
            "--config" => config = Some(args.next().context("--config needs a file path")?),
            "-h" | "--help" => bail!(USAGE),
            flag if flag.starts_with("--") => bail!("unknown option {flag}\n{USAGE}"),
            _ if script.is_none() => script = Some(arg.clone()),
            _ => bail!("unexpected argument {arg}\n{USAGE}"),
        }
    }
    let Some(script) = script else {
        bail!(USAGE);
    };
    Ok(Args { script, result, config })
}
