use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "matbake",
    author,
    version,
    about = "Bake material inputs into images",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the passes a bake would run, plus any plan issues.
    Plan(PlanArgs),
    /// Run the bake with the simulated engine and write the resulting scene.
    Bake(BakeArgs),
    /// Show where presets and run state are stored.
    Where,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Scene description (JSON).
    #[arg(long, value_name = "FILE")]
    pub scene: PathBuf,

    /// Preset file; defaults to `presets.toml` in the config directory.
    #[arg(long, value_name = "FILE")]
    pub presets: Option<PathBuf>,

    /// Objects to bake, in order. Defaults to the selected objects, or every
    /// object with presets when nothing is selected.
    #[arg(long = "object", value_name = "NAME")]
    pub objects: Vec<String>,
}

#[derive(Args, Debug)]
pub struct BakeArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Where to write the baked scene; defaults to `<scene>.baked.json`.
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Make the N-th engine call (1-based) fail, to exercise rollback.
    #[arg(long, value_name = "N")]
    pub fail_pass: Option<usize>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repeated_objects_and_failure_injection() {
        let cli = Cli::try_parse_from([
            "matbake",
            "bake",
            "--scene",
            "crate.json",
            "--object",
            "Crate",
            "--object",
            "Barrel",
            "--fail-pass",
            "2",
        ])
        .unwrap();
        let Command::Bake(args) = cli.command else {
            panic!("expected bake command");
        };
        assert_eq!(args.plan.objects, vec!["Crate", "Barrel"]);
        assert_eq!(args.fail_pass, Some(2));
        assert!(args.output.is_none());
    }

    #[test]
    fn plan_requires_a_scene() {
        assert!(Cli::try_parse_from(["matbake", "plan"]).is_err());
    }
}
