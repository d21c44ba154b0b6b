use std::error::Error;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use rten_reference::ReferenceOracle;
use rten_shape_lib::env::verbose_from_env;
use rten_shape_lib::{generate_to_dir, Registry, ShapeLibrary};
use tracing::Level;

/// Default file name of the generated shape library.
const DEFAULT_OUTPUT_NAME: &str = "shape_library.json";

#[derive(Debug, PartialEq)]
struct Args {
    /// Directory to write the shape library to.
    output_dir: PathBuf,

    /// Schema table to check signatures against, instead of the embedded one.
    registry: Option<PathBuf>,

    /// File name of the shape library within `output_dir`.
    output_name: String,

    /// Enable debug logging.
    verbose: bool,
}

#[derive(Debug, PartialEq)]
enum Command {
    Help,
    Generate(Args),
}

const HELP: &str = "Verify the shape function library and write it to a directory.

Usage: {bin_name} [OPTIONS] <output_dir>

  --registry <path>     Operator schema table to check signatures against
  --output-name <name>  Name of the generated file [default: shape_library.json]
  -v, --verbose         Enable verbose logging
  -h, --help            Print help
";

fn parse_args(args: impl IntoIterator<Item = OsString>) -> Result<Command, lexopt::Error> {
    use lexopt::prelude::*;

    let mut output_dir = None;
    let mut registry = None;
    let mut output_name = DEFAULT_OUTPUT_NAME.to_string();
    let mut verbose = false;

    let mut parser = lexopt::Parser::from_args(args);
    while let Some(arg) = parser.next()? {
        match arg {
            Value(val) if output_dir.is_none() => output_dir = Some(PathBuf::from(val)),
            Long("registry") => registry = Some(PathBuf::from(parser.value()?)),
            Long("output-name") => output_name = parser.value()?.string()?,
            Short('v') | Long("verbose") => verbose = true,
            Short('h') | Long("help") => return Ok(Command::Help),
            _ => return Err(arg.unexpected()),
        }
    }

    let output_dir = output_dir.ok_or("missing `<output_dir>` arg")?;

    Ok(Command::Generate(Args {
        output_dir,
        registry,
        output_name,
        verbose,
    }))
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> Result<PathBuf, Box<dyn Error>> {
    let library = ShapeLibrary::with_all_ops()?;
    let registry = match &args.registry {
        Some(path) => Registry::load_file(path)?,
        None => Registry::embedded()?,
    };
    let oracle = ReferenceOracle::new()?;
    let path = generate_to_dir(
        &library,
        &oracle,
        &registry,
        &args.output_dir,
        &args.output_name,
    )?;
    Ok(path)
}

/// Verify every shape function against the reference operators, check their
/// signatures and write the library to a JSON file.
///
/// ```
/// cargo run -p rten-shape-lib-cli -- out/
/// ```
///
/// Set `RTEN_SHAPE_LIB_VERBOSE=1` or pass `--verbose` to log each invocation.
fn main() -> ExitCode {
    let args = match parse_args(std::env::args_os().skip(1)) {
        Ok(Command::Generate(args)) => args,
        Ok(Command::Help) => {
            let bin_name = std::env::args().next().unwrap_or("rten-shape-lib".into());
            print!("{}", HELP.replace("{bin_name}", &bin_name));
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprintln!("error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    init_logging(args.verbose || verbose_from_env());

    match run(&args) {
        Ok(path) => {
            println!("Wrote {}", path.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
