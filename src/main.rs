//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{anyhow, bail, Context};
use clap::{crate_version, Arg, ArgAction, Command};
use log::{info, LevelFilter, Log, Metadata, Record};
use ocgen::{error::Diagnostics, parse, semantic};

use std::{
    fs::File,
    io::{self, BufReader, Write},
};

fn main() -> anyhow::Result<()> {
    // Parsing de CLI
    let args = Command::new("oc backend")
        .version(crate_version!())
        .arg(
            Arg::new("input")
                .value_name("FILE")
                .required(true)
                .help("Source file ('-' for stdin)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .takes_value(true)
                .value_name("PREFIX")
                .default_value("-")
                .help("Writes PREFIX.sym and PREFIX.oil ('-' for stdout)"),
        )
        .arg(
            Arg::new("force-ir")
                .long("force-ir")
                .action(ArgAction::SetTrue)
                .help("Generate IR even if semantic errors were found"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help("Increases log verbosity"),
        )
        .get_matches();

    Stderr::install(args.get_count("verbose"))?;

    let input = args
        .get_one::<String>("input")
        .context("No input file")?;

    let output = args
        .get_one::<String>("output")
        .context("No output prefix")?;

    // Front end
    let ast = match input.as_str() {
        "-" => parse::load(io::stdin().lock(), 0, "<stdin>"),
        path => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open for reading: {}", path))?;

            parse::load(BufReader::new(file), 0, path)
        }
    };

    let ast = match ast {
        Ok(ast) => ast,
        Err(diagnostics) => {
            eprint!("{}", diagnostics);
            bail!("Failed to parse {}", input);
        }
    };

    info!("parsed {} nodes", ast.len());

    // Análisis semántico
    let mut analysis = match semantic::analyze(&ast) {
        Ok(analysis) => analysis,
        Err(error) => {
            eprint!("{}", Diagnostics::from(error).kind("internal error"));
            bail!("Semantic analysis aborted");
        }
    };

    let mut sym = open(output, "sym")?;
    analysis
        .write_report(&mut sym)
        .and_then(|()| sym.flush())
        .context("Failed to write symbol report")?;

    let errors = analysis.take_errors();
    let failed = !errors.is_empty();
    if failed {
        eprint!("{}", Diagnostics::from(errors).kind("semantic error"));
    }

    // Código intermedio
    if !failed || args.get_flag("force-ir") {
        let listing = match ocgen::generate(&ast) {
            Ok(listing) => listing,
            Err(error) => {
                eprint!("{}", Diagnostics::from(error).kind("internal error"));
                bail!("Code generation aborted");
            }
        };

        let mut oil = open(output, "oil")?;
        listing
            .write_to(&mut oil)
            .and_then(|()| oil.flush())
            .context("Failed to write intermediate code")?;
    }

    if failed {
        bail!("Semantic analysis of {} failed", input);
    }

    Ok(())
}

/// Abre `PREFIX.extension`, o stdout si el prefijo es `-`.
fn open(prefix: &str, extension: &str) -> anyhow::Result<Box<dyn Write>> {
    if prefix == "-" {
        return Ok(Box::new(io::stdout()));
    }

    let path = format!("{}.{}", prefix, extension);
    let file =
        File::create(&path).with_context(|| format!("Failed to open for writing: {}", path))?;

    Ok(Box::new(io::BufWriter::new(file)))
}

/// Bitácora hacia stderr.
struct Stderr;

static LOGGER: Stderr = Stderr;

impl Stderr {
    fn install(verbosity: u8) -> anyhow::Result<()> {
        let level = match verbosity {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        log::set_logger(&LOGGER).map_err(|error| anyhow!("{}", error))?;
        log::set_max_level(level);

        Ok(())
    }
}

impl Log for Stderr {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}
