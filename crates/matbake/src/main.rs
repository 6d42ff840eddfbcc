mod cli;
mod paths;
mod run;
mod state;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Command::Plan(args) => run::plan(args),
        Command::Bake(args) => run::bake(args),
        Command::Where => run::describe_paths(),
    }
}
