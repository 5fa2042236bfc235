//! gliff SDK - CLI
//!
//! Command-line tools around the SDK.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde_json::{json, Map, Value};

use gliff_sdk::annotation::XYPoint;
use gliff_sdk::gallery::decode_gallery;
use gliff_sdk::{Annotation, Image, MemoryStore, SdkConfig, Session, Tile, Toolbox};

#[derive(Parser)]
#[command(name = "gliff")]
#[command(author = "gliff.ai")]
#[command(version = gliff_sdk::VERSION)]
#[command(about = "gliff SDK - encrypted image projects with gallery tiles")]
struct Cli {
    /// JSON config file (STORE_* environment variables fill the gaps)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// More log output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the resolved configuration
    Config,

    /// List the tiles of a gallery document
    Inspect {
        /// Gallery JSON file
        path: PathBuf,
    },

    /// Demo mode (upload and annotate an image in an in-memory store)
    Demo {
        /// Image to upload instead of a generated one
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Config => {
            let config = load_config(cli.config.as_deref())?;
            print_config(&config);
            if let Err(e) = config.validate() {
                println!("⚠️  {}", e);
            }
        }

        Commands::Inspect { path } => {
            let data = std::fs::read(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let tiles = decode_gallery(&data)?;
            print_gallery(&tiles);
        }

        Commands::Demo { image } => demo(image.as_deref())?,
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SdkConfig> {
    let config = match path {
        Some(path) => SdkConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SdkConfig::default(),
    };
    Ok(config.with_env_fallback())
}

fn print_config(config: &SdkConfig) {
    println!("⚙️  Configuration:");
    println!("   Server:        {}", or_unset(&config.server_url));
    println!("   Username:      {}", or_unset(&config.username));
    println!("   Password:      [REDACTED]");
    println!("   Client name:   {}", config.client_name);
    println!("   Retries:       {}", config.max_commit_retries);
    println!("   Thumbnail max: {}px", config.thumbnail_size);
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() {
        "(unset)"
    } else {
        value
    }
}

fn print_gallery(tiles: &[Tile]) {
    if tiles.is_empty() {
        println!("📭 Gallery is empty");
        return;
    }

    println!("🖼️  Tiles ({}):", tiles.len());
    println!("{:-<72}", "");
    for tile in tiles {
        let name = tile
            .metadata
            .get("imageName")
            .and_then(Value::as_str)
            .unwrap_or("-");
        println!("{} | {} | labels: {:?}", tile.id, name, tile.image_labels);
        for (user, uid) in &tile.annotation_uid {
            let complete = tile.annotation_complete.get(user).copied().unwrap_or(false);
            println!("    ✏️  {} → {} (complete: {})", user, uid, complete);
        }
    }
}

fn demo(image_path: Option<&Path>) -> Result<()> {
    println!("🎭 Running demo against an in-memory store...");

    let store = MemoryStore::new();
    store.add_user("alice", "demo");
    let project_uid = store.create_collection("alice", b"[]");
    info!("demo project {}", project_uid);

    let config = SdkConfig::new("memory://demo", "alice", "demo");
    let mut session = Session::login(&store, config)?;
    let mut project = session.project(&project_uid)?;

    let (name, image) = match image_path {
        Some(path) => {
            let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("image")
                .to_string();
            (name, Image::from_file_bytes(&data)?)
        }
        None => ("scan1".to_string(), Image::from(image::DynamicImage::new_rgb8(200, 100))),
    };

    let mut metadata = Map::new();
    metadata.insert("source".into(), json!("demo"));
    let image_uid = project.upload_image(&name, image, vec!["demo".into()], metadata)?;
    println!("📥 Uploaded {} as {}", name, image_uid);

    let first = spline("cell", &[(10.0, 10.0), (20.0, 10.0), (15.0, 20.0)]);
    let second = spline("nucleus", &[(40.0, 40.0), (45.0, 42.0)]);

    let annotation_uid = project.upload_annotation(&image_uid, "alice", vec![first], None)?;
    project.upload_annotation(&image_uid, "alice", vec![second], None)?;
    project.set_annotation_complete(&image_uid, "alice", true)?;

    let stored = project
        .get_annotations(&image_uid, "alice")?
        .unwrap_or_default();
    println!("✏️  Annotation item {} holds {} annotations", annotation_uid, stored.len());

    println!();
    print_gallery(&project.tiles()?);

    session.logout()?;
    println!("✅ Demo completed!");
    Ok(())
}

fn spline(label: &str, points: &[(f64, f64)]) -> Annotation {
    let mut annotation = Annotation::new(Toolbox::Spline);
    annotation.labels.push(label.to_string());
    annotation.spline.coordinates = points
        .iter()
        .filter_map(|&(x, y)| XYPoint::new(x, y))
        .collect();
    annotation
}
