mod assets;
mod items;

use anyhow::anyhow;
use assets::{AssetDir, BakedMaps};
use chara::{
    catalog::{CatalogItem, ItemKind, ModelInfo, SharedCatalog},
    deform::BoneOffsetDeformer,
    descriptor::{CharacterDescriptor, Gender},
    error::CharaError,
    mtrl::{resolve_path, MaterialRef},
    race::{Race, RaceGraph},
    resolve::{CharacterAssets, CharacterResolver, SlotOutcome},
    settings::ResolveSettings,
};
use clap::{Parser, Subcommand};
use futures::executor::block_on;
use std::{fs, io, path::Path};
use tracing::{info, warn};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Race table replacing the built-in one
    #[arg(long, value_name = "RACES_JSON")]
    races: Option<Box<Path>>,

    /// Resolver settings (skin race, renderer, colours)
    #[arg(short, long, value_name = "SETTINGS_JSON")]
    settings: Option<Box<Path>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the race table
    Races,

    /// Decode material references and show what they resolve to
    Material {
        /// Material file names or full in-game paths
        #[arg(required = true)]
        refs: Vec<Box<str>>,
        /// Skin race to redirect body materials to (e.g. "1401")
        #[arg(short, long)]
        race: Option<Race>,
    },

    /// Resolve a character into race-consistent models and baked texture maps
    Resolve {
        /// Character descriptor (.chara JSON)
        #[arg(short, long)]
        descriptor: Box<Path>,
        /// Item list CSV
        #[arg(short, long)]
        items: Box<Path>,
        /// Directory of extracted game assets
        #[arg(short, long)]
        assets_dir: Box<Path>,
        /// Directory path to write exported files into
        #[arg(short, long)]
        out_dir: Box<Path>,
    },
}

fn load_graph(path: Option<&Path>) -> anyhow::Result<RaceGraph> {
    Ok(match path {
        Some(path) => RaceGraph::from_reader(fs::File::open(path)?)?,
        None => RaceGraph::builtin()?,
    })
}

fn load_settings(graph: &RaceGraph, path: Option<&Path>) -> anyhow::Result<ResolveSettings> {
    let settings = match path {
        Some(path) => ResolveSettings::from_reader(fs::File::open(path)?)?,
        None => ResolveSettings::default(),
    };
    settings.check_races(graph)?;
    Ok(settings)
}

/// Reads the bone offset table. A missing table yields an empty deformer, so any
/// model loaded for another race fails to deform.
fn load_deformer(path: &Path) -> anyhow::Result<BoneOffsetDeformer> {
    match fs::File::open(path) {
        Ok(file) => Ok(BoneOffsetDeformer::from_reader(file)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(
                path = %path.to_string_lossy(),
                "no deformation table; slots needing a deform will fail (fatal for face or body)"
            );
            Ok(BoneOffsetDeformer::new())
        }
        Err(e) => Err(e.into()),
    }
}

fn list_races(graph: &RaceGraph) -> anyhow::Result<()> {
    let mut w = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(std::io::stdout());
    w.write_record(["code", "name", "parent", "skin", "fallback"])?;

    for node in graph.nodes() {
        let fallback: Vec<String> = graph
            .model_priority_list(node.race)?
            .map(|race| race.to_string())
            .collect();
        w.write_record([
            node.race.to_string(),
            node.name.to_string(),
            node.parent.map(|race| race.to_string()).unwrap_or_default(),
            node.skin.to_string(),
            fallback.join(" "),
        ])?;
    }
    w.flush()?;
    Ok(())
}

fn show_materials(
    graph: &RaceGraph,
    mut settings: ResolveSettings,
    refs: &[Box<str>],
    race: Option<Race>,
) -> anyhow::Result<()> {
    if let Some(race) = race {
        graph.node(race)?;
        match race.gender() {
            Gender::Masculine => settings.skin.masculine.race = race,
            Gender::Feminine => settings.skin.feminine.race = race,
        }
    }

    // Gear references carry their own ids; the source item only lends its category.
    let source = CatalogItem {
        name: "-".into(),
        kind: ItemKind::Gear,
        category: "-".into(),
        model: ModelInfo::default(),
    };

    for raw in refs {
        let resolved = MaterialRef::parse(raw)
            .and_then(|reference| resolve_path(&reference, &source, graph, &settings.skin));
        match resolved {
            Ok(path) => println!("{raw}\t{}", serde_json::to_string(&path)?),
            Err(e) => warn!(material = %raw, error = %e, "unable to resolve material"),
        }
    }
    Ok(())
}

fn write_assets(
    out_dir: &Path,
    name: &str,
    assets: &CharacterAssets<BakedMaps>,
) -> anyhow::Result<()> {
    for slot in assets.resolved() {
        let slot_dir = out_dir.join(name).join(slot.slot.label());
        fs::create_dir_all(&slot_dir)?;

        let model_path = slot_dir.join(format!("{}.json", slot.item.name));
        fs::write(&model_path, serde_json::to_vec_pretty(&slot.model.model)?)?;
        println!("{}", model_path.to_string_lossy());

        for (index, baked) in &slot.materials.maps {
            for (usage, image) in &baked.maps {
                let map_path =
                    slot_dir.join(format!("{}_{index}_{}.png", slot.item.name, usage.suffix()));
                image.save(&map_path)?;
                println!("{}", map_path.to_string_lossy());
            }
        }
    }
    Ok(())
}

fn resolve_character(
    graph: &RaceGraph,
    settings: ResolveSettings,
    descriptor_path: &Path,
    items_path: &Path,
    assets_dir: &Path,
    out_dir: &Path,
) -> anyhow::Result<()> {
    let descriptor = CharacterDescriptor::from_reader(fs::File::open(descriptor_path)?)?;
    let name = descriptor_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or(anyhow!("Descriptor path has no file name"))?;

    let catalog = SharedCatalog::new();
    let catalog = catalog.get_or_load(|| {
        items::load_items(items_path).map_err(|e| CharaError::Source(e.into()))
    })?;
    info!(items = catalog.len(), "item catalog loaded");

    let assets = AssetDir::new(assets_dir);
    let deformer = load_deformer(&assets.deform_table())?;

    let progress = |message: &str| info!("{message}");
    let resolver = CharacterResolver::new(graph, &catalog, &assets, &deformer, &assets, &assets)
        .with_settings(settings)
        .with_progress(&progress);
    let character = block_on(resolver.resolve(&descriptor))?;

    for (slot, outcome) in &character.slots {
        if let SlotOutcome::Failed(e) = outcome {
            eprintln!("{slot}: {e}");
        }
    }
    write_assets(out_dir, &name, &character)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let graph = load_graph(cli.races.as_deref())?;
    let settings = load_settings(&graph, cli.settings.as_deref())?;

    match cli.command {
        Commands::Races => list_races(&graph),
        Commands::Material { refs, race } => show_materials(&graph, settings, &refs, race),
        Commands::Resolve {
            descriptor,
            items,
            assets_dir,
            out_dir,
        } => resolve_character(&graph, settings, &descriptor, &items, &assets_dir, &out_dir),
    }
}
