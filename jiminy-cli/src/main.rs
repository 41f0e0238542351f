//! jiminy: inspect plug-in directories, dry-run creators and resolve
//! published files for loaders
//!
//! Creation runs against an in-memory scene, so plug-ins can be tried
//! outside the host application.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use jiminy_host::discovery::default_plugin_dirs;
use jiminy_host::tracing_support::{init_subscriber_with_config, TracingConfig, TracingFormat};
use jiminy_host::{
    create, loaders_for, CreateRequest, Creator, DataMap, LoadContext, Loader, MemoryScene,
    PluginRegistry, SceneBackend, Settings,
};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "jiminy", version, about = "Pipeline plug-in tools")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Settings file (default: last jiminy-settings.toml on JIMINY_SETTINGS_PATH)
    #[arg(long, global = true, env = "JIMINY_SETTINGS")]
    settings: Option<PathBuf>,

    /// Creator plug-in directory; repeatable
    #[arg(long = "plugin-path", short = 'p', global = true)]
    plugin_paths: Vec<PathBuf>,

    /// Loader plug-in directory; repeatable
    #[arg(long = "loader-path", global = true)]
    loader_paths: Vec<PathBuf>,

    /// Project root (default: [project] root, then AVALON_PROJECTS)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Log format (pretty, compact, json)
    #[arg(long, global = true)]
    log_format: Option<TracingFormat>,

    /// Enable debug logs
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List discovered creators
    Discover,

    /// Load every unit in a directory and report failures
    Scan {
        /// Directory to scan
        dir: PathBuf,
    },

    /// Run the creators of a family against an empty scene
    Create(CreateArgs),

    /// List loaders for a representation and the file each would read
    Loaders(LoadersArgs),
}

#[derive(Args, Debug)]
struct CreateArgs {
    /// Subset name
    name: String,

    /// Asset name
    asset: String,

    /// Family to create
    family: String,

    /// Create these nodes in the scene first and select them
    #[arg(long = "select")]
    selection: Vec<String>,

    /// Group the selection into the instance
    #[arg(long)]
    use_selection: bool,

    /// Extra instance data as key=value; values are parsed as JSON when possible
    #[arg(long = "data", value_parser = parse_key_value)]
    data: Vec<(String, Value)>,
}

#[derive(Args, Debug)]
struct LoadersArgs {
    /// Family of the published subset
    family: String,

    /// Representation name (ma, abc, ...)
    representation: String,

    /// Asset to resolve the published file for
    #[arg(long)]
    asset: Option<String>,

    /// Subset to resolve the published file for
    #[arg(long)]
    subset: Option<String>,

    /// Silo of the asset
    #[arg(long, default_value = "assets")]
    silo: String,

    /// Publish template; the default layout when omitted
    #[arg(long)]
    template: Option<String>,
}

fn parse_key_value(s: &str) -> Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::from(value));
    Ok((key.to_string(), value))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.global.settings {
        Some(path) => Some(Settings::load(path)?),
        None => Settings::discover()?,
    };

    let mut logging = settings
        .as_ref()
        .map(Settings::tracing_config)
        .unwrap_or_default();
    if cli.global.verbose {
        logging.level = Some(tracing::Level::DEBUG);
    }
    if let Some(format) = cli.global.log_format {
        logging.format = format;
    }
    init_tracing(logging);

    let registry = PluginRegistry::new().context("Failed to create plug-in registry")?;
    if let Some(settings) = &settings {
        settings.apply(&registry)?;
    }
    for path in &cli.global.plugin_paths {
        registry.register_plugin_path::<Creator>(path)?;
    }
    for path in &cli.global.loader_paths {
        registry.register_plugin_path::<Loader>(path)?;
    }
    if let Some(root) = &cli.global.root {
        registry.register_root(root.clone());
    }
    if registry.plugin_paths::<Creator>().is_empty() {
        for dir in default_plugin_dirs("jiminy").into_iter().filter(|d| d.is_dir()) {
            registry.register_plugin_path::<Creator>(dir)?;
        }
    }

    match cli.command {
        Command::Discover => run_discover(&registry),
        Command::Scan { dir } => run_scan(&registry, dir),
        Command::Create(args) => run_create(&registry, args),
        Command::Loaders(args) => run_loaders(&registry, args),
    }
}

fn init_tracing(config: TracingConfig) {
    if let Err(e) = init_subscriber_with_config(config) {
        eprintln!("Logging disabled: {e}");
    }
}

fn run_discover(registry: &PluginRegistry) -> anyhow::Result<()> {
    for path in registry.plugin_paths::<Creator>() {
        println!("# {}", path.display());
    }

    for creator in registry.discover::<Creator>()? {
        println!(
            "{:<24} family={:<12} order={:<4} {}",
            creator.name(),
            creator.family().unwrap_or("-"),
            creator.order(),
            creator.label().unwrap_or("")
        );
    }
    Ok(())
}

fn run_scan(registry: &PluginRegistry, dir: PathBuf) -> anyhow::Result<()> {
    let result = registry.scanner().scan_directory(&dir)?;

    for unit in &result.units {
        let kind = if unit.entry.is_some() { "wasm" } else { "manifest" };
        println!("{} ({kind})", unit.path.display());
        for class in &unit.classes {
            println!("  {} : {}", class.name, class.bases.join(", "));
        }
    }
    for (path, error) in &result.failures {
        println!("{} FAILED: {error}", path.display());
    }

    if result.is_success() {
        Ok(())
    } else {
        anyhow::bail!(
            "{} of {} units failed to load",
            result.failures.len(),
            result.total_found()
        )
    }
}

fn run_create(registry: &PluginRegistry, args: CreateArgs) -> anyhow::Result<()> {
    let mut scene = MemoryScene::new();
    for node in &args.selection {
        scene.create_node(node)?;
    }
    scene.select(&args.selection)?;

    let mut request = CreateRequest::new(args.name, args.asset, args.family);
    if args.use_selection {
        request = request.option(jiminy_host::creator::USE_SELECTION, true);
    }
    if !args.data.is_empty() {
        request.data = Some(args.data.into_iter().collect::<DataMap>());
    }

    let created = create(registry, &mut scene, &request)?;

    for instance in created.instances() {
        println!("{instance}");
        if let Some(node) = scene.node(instance) {
            if let Some(members) = &node.members {
                println!("  members: {}", members.join(", "));
            }
            for (key, value) in &node.attributes {
                println!("  {key} = {value:?}");
            }
        }
    }
    Ok(())
}

fn run_loaders(registry: &PluginRegistry, args: LoadersArgs) -> anyhow::Result<()> {
    let mut context = LoadContext::new(args.silo).name("representation", &args.representation);
    if let Some(asset) = args.asset {
        context = context.name("asset", asset);
    }
    if let Some(subset) = args.subset {
        context = context.name("subset", subset);
    }
    if let Some(template) = args.template {
        context = context.template(template);
    }

    for loader in loaders_for(registry, &args.family, &args.representation)? {
        match loader.prepare(registry, &context) {
            Ok(instance) => println!(
                "{:<24} order={:<4} {}",
                loader.name(),
                loader.order(),
                instance.fname.display()
            ),
            Err(e) => println!("{:<24} order={:<4} ({e})", loader.name(), loader.order()),
        }
    }
    Ok(())
}
