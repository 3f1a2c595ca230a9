use std::path::PathBuf;

use powergen::{run, Config};

const HELP: &str = "\
powergen

USAGE:
    powergen [MAKEFILE_FOLDER]

If no folder is given, powergen asks for one on stdin.

FLAGS:
    -h, --help    Prints this help information
";

fn main() -> anyhow::Result<()> {
    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        print!("{}", HELP);
        return Ok(());
    }
    let directory = args.free()?.into_iter().next().map(PathBuf::from);
    run(Config { directory })
}
