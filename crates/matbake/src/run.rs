use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bakeconfig::BakeConfig;
use baker::{BakeStatus, Baker, SimulatedEngine};
use scheduler::{PassPlan, PassScheduler, ValidationIssue};
use shadergraph::Scene;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{BakeArgs, PlanArgs};
use crate::paths::AppPaths;
use crate::state::{AppState, LastRun};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

struct Loaded {
    scene: Scene,
    config: BakeConfig,
    objects: Vec<String>,
}

impl Loaded {
    fn plan(&self) -> Result<(PassPlan, Vec<ValidationIssue>)> {
        let objects: Vec<&str> = self.objects.iter().map(String::as_str).collect();
        let plan = PassScheduler::new(&self.scene, &self.config)
            .schedule(&objects)
            .context("failed to schedule bake passes")?;
        let issues = plan.validate(&self.scene);
        Ok((plan, issues))
    }
}

fn load(args: &PlanArgs, paths: &AppPaths) -> Result<Loaded> {
    let contents = fs::read_to_string(&args.scene)
        .with_context(|| format!("failed to read scene at {}", args.scene.display()))?;
    let scene = Scene::from_json_str(&contents)
        .with_context(|| format!("failed to parse scene at {}", args.scene.display()))?;

    let presets = args
        .presets
        .clone()
        .unwrap_or_else(|| paths.presets_file());
    let contents = fs::read_to_string(&presets)
        .with_context(|| format!("failed to read presets at {}", presets.display()))?;
    let config = BakeConfig::from_toml_str(&contents)
        .with_context(|| format!("failed to parse presets at {}", presets.display()))?;

    let objects = select_objects(&scene, &config, &args.objects);
    info!(
        scene = %args.scene.display(),
        presets = %presets.display(),
        objects = objects.len(),
        "loaded bake inputs"
    );
    Ok(Loaded {
        scene,
        config,
        objects,
    })
}

/// Explicit names win; otherwise the scene's selection, otherwise every
/// object that has presets. Scene order is kept for the implicit cases.
fn select_objects(scene: &Scene, config: &BakeConfig, requested: &[String]) -> Vec<String> {
    if !requested.is_empty() {
        return requested.to_vec();
    }
    let selected: Vec<String> = scene
        .selected_objects()
        .filter(|object| object.is_mesh())
        .map(|object| object.name.clone())
        .collect();
    if !selected.is_empty() {
        return selected;
    }
    scene
        .objects
        .iter()
        .filter(|object| object.is_mesh() && config.objects.contains_key(&object.name))
        .map(|object| object.name.clone())
        .collect()
}

fn print_plan(plan: &PassPlan, issues: &[ValidationIssue]) {
    if plan.is_empty() {
        println!("Nothing to bake.");
    }
    for summary in plan.summaries() {
        println!("{summary}");
    }
    for rejected in &plan.rejected {
        println!(
            "Rejected preset '{}' on '{}': {}",
            rejected.preset, rejected.object, rejected.error
        );
    }
    if !issues.is_empty() {
        println!("Issues:");
        for issue in issues {
            println!("  {issue}");
        }
    }
}

pub fn plan(args: PlanArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let loaded = load(&args, &paths)?;
    let (plan, issues) = loaded.plan()?;
    print_plan(&plan, &issues);

    let problems = issues.len() + plan.rejected.len();
    if problems > 0 {
        bail!("plan has {problems} problem(s)");
    }
    Ok(())
}

pub fn bake(args: BakeArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let mut loaded = load(&args.plan, &paths)?;
    let (plan, issues) = loaded.plan()?;
    print_plan(&plan, &issues);
    if !issues.is_empty() {
        bail!("refusing to bake: plan has {} issue(s)", issues.len());
    }

    let engine = match args.fail_pass {
        Some(call) => SimulatedEngine::failing_on(call),
        None => SimulatedEngine::new(),
    };
    let report = Baker::new(engine).run(&mut loaded.scene, &plan.passes);
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    println!(
        "Bake {}: {} pass(es) completed, {} skipped",
        report.status, report.passes_completed, report.passes_skipped
    );

    let output = args
        .output
        .unwrap_or_else(|| default_output(&args.plan.scene));
    let json = loaded
        .scene
        .to_json()
        .context("failed to serialise baked scene")?;
    fs::write(&output, json)
        .with_context(|| format!("failed to write baked scene to {}", output.display()))?;
    println!("Wrote {}", output.display());

    let run = LastRun::from_report(&args.plan.scene, &report);
    if let Err(err) = AppState::record_run(&paths.state_file(), run) {
        warn!("failed to record run state: {err:#}");
    }

    match report.status {
        BakeStatus::Finished => Ok(()),
        BakeStatus::Cancelled { reason } => bail!("bake cancelled: {reason}"),
    }
}

pub fn describe_paths() -> Result<()> {
    let paths = AppPaths::discover()?;
    let state = AppState::load(&paths.state_file())?;
    println!("Configuration:");
    println!("  config:   {}", paths.config_dir().display());
    println!("  presets:  {}", paths.presets_file().display());
    println!("  state:    {}", paths.state_file().display());
    if let Some(last) = &state.last_run {
        println!(
            "Last run: {} {} ({} completed, {} skipped) at {}",
            last.scene, last.status, last.passes_completed, last.passes_skipped, last.finished_at
        );
    }
    Ok(())
}

fn default_output(scene: &Path) -> PathBuf {
    let stem = scene
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scene".to_string());
    scene.with_file_name(format!("{stem}.baked.json"))
}
