use crate::definition::parsing::ParseDocument;
use crate::definition::trigger::Trigger;
use crate::definition::{Document, Release};
use crate::engine::icons::icns::{self, APPLE_SLOTS};
use crate::engine::icons::{winico, IconAssetSet};
use crate::engine::{Engine, EngineSettings};
use anyhow::{anyhow, Context};
use kdl::KdlDocument;
use miette::{miette, IntoDiagnostic, WrapErr};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

mod definition;
mod engine;
mod logging;
mod utils;

#[cfg(test)]
mod test_support;

const USAGE: &str = "usage: shipwright <command> [flags]

commands:
  build <target|all>       build, stage and archive one target or every target
  release --tag v<semver>  tag-triggered batch over every target
  release --manual         manually dispatched batch over every target
  icons                    run only the icon barrier
  inspect                  list the slots of the generated icon containers

flags:
  --definition <path>      release definition (default: <project>/release.kdl)
  --project <dir>          project root handed to cargo (default: .)
  --assets <dir>           assets root (default: <project>/assets)
  --staging <dir>          staging root (default: <project>/target/shipwright/stage)
  --output <dir>           archive output root (default: <project>/target/shipwright/dist)
  --all-or-nothing         any failed target fails the whole batch
  --parallel               fan targets out once the icon barrier clears
  --verbose                debug logging";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Build { selection: String },
    Release { trigger: Trigger },
    Icons,
    Inspect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    command: Command,
    definition: Option<PathBuf>,
    project: PathBuf,
    assets: Option<PathBuf>,
    staging: Option<PathBuf>,
    output: Option<PathBuf>,
    all_or_nothing: bool,
    parallel: bool,
    verbose: bool,
}

impl CliOptions {
    fn definition_path(&self) -> PathBuf {
        self.definition
            .clone()
            .unwrap_or_else(|| self.project.join("release.kdl"))
    }

    fn settings(&self) -> EngineSettings {
        let mut settings = EngineSettings::new(&self.project);
        if let Some(assets) = &self.assets {
            settings = settings.with_assets_root(assets);
        }
        if let Some(staging) = &self.staging {
            settings = settings.with_staging_root(staging);
        }
        if let Some(output) = &self.output {
            settings = settings.with_output_root(output);
        }
        settings
    }
}

fn flag_value(args: &[String], index: &mut usize, flag: &str) -> Result<String, String> {
    *index += 1;
    args.get(*index)
        .cloned()
        .ok_or_else(|| format!("{flag} expects a value"))
}

fn parse_cli_args(args: &[String]) -> Result<CliOptions, String> {
    let mut positional = vec![];
    let mut definition = None;
    let mut project = PathBuf::from(".");
    let mut assets = None;
    let mut staging = None;
    let mut output = None;
    let mut tag = None;
    let mut manual = false;
    let mut all_or_nothing = false;
    let mut parallel = false;
    let mut verbose = false;

    let mut index = 0;
    while index < args.len() {
        let arg = args[index].as_str();
        match arg {
            "--definition" => definition = Some(PathBuf::from(flag_value(args, &mut index, arg)?)),
            "--project" => project = PathBuf::from(flag_value(args, &mut index, arg)?),
            "--assets" => assets = Some(PathBuf::from(flag_value(args, &mut index, arg)?)),
            "--staging" => staging = Some(PathBuf::from(flag_value(args, &mut index, arg)?)),
            "--output" => output = Some(PathBuf::from(flag_value(args, &mut index, arg)?)),
            "--tag" => tag = Some(flag_value(args, &mut index, arg)?),
            "--manual" => manual = true,
            "--all-or-nothing" => all_or_nothing = true,
            "--parallel" => parallel = true,
            "--verbose" | "-v" => verbose = true,
            "--help" | "-h" => return Err(String::new()),
            flag if flag.starts_with("--") => return Err(format!("unknown flag `{flag}`")),
            value => positional.push(value.to_string()),
        }
        index += 1;
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("build") => Command::Build {
            selection: positional
                .next()
                .ok_or_else(|| "build expects a target name or `all`".to_string())?,
        },
        Some("release") => {
            let trigger = match (tag, manual) {
                (Some(tag), false) => Trigger::from_tag(&tag).map_err(|e| e.to_string())?,
                (None, true) => Trigger::Manual,
                (Some(_), true) => return Err("--tag and --manual are exclusive".to_string()),
                (None, false) => return Err("release expects --tag or --manual".to_string()),
            };
            Command::Release { trigger }
        }
        Some("icons") => Command::Icons,
        Some("inspect") => Command::Inspect,
        Some(other) => return Err(format!("unknown command `{other}`")),
        None => return Err("missing command".to_string()),
    };

    if let Some(extra) = positional.next() {
        return Err(format!("unexpected argument `{extra}`"));
    }

    Ok(CliOptions {
        command,
        definition,
        project,
        assets,
        staging,
        output,
        all_or_nothing,
        parallel,
        verbose,
    })
}

async fn load_release(path: &Path) -> miette::Result<Release> {
    let source = tokio::fs::read_to_string(path)
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("could not read {}", path.display()))?;

    let kdl_document: KdlDocument = source.parse()?;
    let document = Document::parse_document(&kdl_document, &source, path.to_str())?;

    document
        .release
        .ok_or_else(|| miette!("{} has no release node", path.display()))
}

fn inspect(set: &IconAssetSet) -> anyhow::Result<()> {
    let data = std::fs::read(&set.icns).with_context(|| set.icns.display().to_string())?;
    let elements = icns::decode(&data)?;
    println!("{}: {} slots", set.icns.display(), elements.len());
    for element in &elements {
        let name = APPLE_SLOTS
            .iter()
            .find(|slot| slot.ostype == element.ostype)
            .map_or("?", |slot| slot.name);
        println!("  {}  {:<16}  {} bytes", element.ostype_str(), name, element.data.len());
    }

    let data = std::fs::read(&set.ico).with_context(|| set.ico.display().to_string())?;
    let sizes = winico::resolutions(&data)?;
    println!("{}: {} resolutions", set.ico.display(), sizes.len());
    for size in sizes {
        println!("  {size}x{size}");
    }

    Ok(())
}

async fn run(options: CliOptions, mut release: Release) -> anyhow::Result<i32> {
    release.options.all_or_nothing |= options.all_or_nothing;
    release.options.parallel |= options.parallel;

    let engine = Engine::new(options.settings());

    let (targets, trigger) = match options.command {
        Command::Icons => {
            let set = engine.prepare_icons(&release).await?;
            for output in set.outputs() {
                println!("{}", output.display());
            }
            return Ok(0);
        }
        Command::Inspect => {
            let set = IconAssetSet::new(engine.settings.assets_root(), &release.icon);
            inspect(&set)?;
            return Ok(0);
        }
        Command::Build { selection } => {
            let targets = release.select_targets(&selection).ok_or_else(|| {
                let known: Vec<_> = release.targets.iter().map(|t| t.name.as_str()).collect();
                anyhow!("unknown target `{}`, known: all, {}", selection, known.join(", "))
            })?;
            (targets, Trigger::Manual)
        }
        Command::Release { trigger } => (release.targets.clone(), trigger),
    };

    let cancel = engine.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("cancelling, the running toolchain step will finish first");
            cancel.cancel();
        }
    });

    let report = engine.run_batch(&release, &targets, &trigger).await?;
    println!("{}", report);

    Ok(report.exit_code())
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_cli_args(&args) {
        Ok(options) => options,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("shipwright: {message}");
            }
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    logging::setup(options.verbose);

    let release = match load_release(&options.definition_path()).await {
        Ok(release) => release,
        Err(report) => {
            eprintln!("{:?}", report);
            std::process::exit(2);
        }
    };

    match run(options, release).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
