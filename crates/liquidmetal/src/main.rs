mod cli;
mod paths;
mod run;
mod watch;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Export(args)) => run::export(&cli.global, args),
        Some(Command::Mask(args)) => run::mask(&cli.global, args),
        Some(Command::Params) => run::print_params(&cli.global),
        Some(Command::Presets) => {
            run::print_presets();
            Ok(())
        }
        None => run::preview(&cli.global, cli.preview),
    }
}
