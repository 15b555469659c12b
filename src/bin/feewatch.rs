use feewatch_lib::config::parse_workers;
use feewatch_lib::runner::EXIT_CONFIG;
use feewatch_lib::{run, RunOptions};

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run(RunOptions),
    Help,
    Version,
}

#[tokio::main]
async fn main() {
    let command = match parse_args(std::env::args().skip(1).collect()) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    match command {
        Command::Help => print_help(),
        Command::Version => println!("feewatch {}", env!("CARGO_PKG_VERSION")),
        Command::Run(options) => {
            let code = run(options).await;
            std::process::exit(code);
        }
    }
}

fn parse_args(argv: Vec<String>) -> Result<Command, String> {
    let mut options = RunOptions::default();

    let mut iter = argv.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--workers" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--workers needs a value".to_string())?;
                let workers = parse_workers(&value).map_err(|err| err.to_string())?;
                options.workers = Some(workers);
            }
            "--group" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--group needs a value".to_string())?;
                options.group = Some(value);
            }
            "--help" | "-h" => return Ok(Command::Help),
            "--version" | "-V" => return Ok(Command::Version),
            other => {
                return Err(format!(
                    "Unknown argument: {}. Use --help for usage.",
                    other
                ))
            }
        }
    }

    Ok(Command::Run(options))
}

fn print_help() {
    println!(
        "feewatch {}\n\n\
Usage:\n  feewatch [--workers N] [--group NAME]\n\n\
Options:\n  --workers N   Check up to N pages at once (overrides WORKERS)\n  --group NAME  Only check the URL group NAME\n  -h, --help    Show this help\n  -V, --version Show version\n\n\
Exit codes:\n  0  no failures\n  1  at least one page failed\n  2  configuration or URL list error",
        env!("CARGO_PKG_VERSION")
    );
}
