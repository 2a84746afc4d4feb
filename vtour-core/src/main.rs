//! vtour - Virtual Tourist command-line front end
//!
//! Drops markers, fetches and prunes their photo albums, and keeps the last
//! map region. Each invocation opens the store, runs one operation and shuts
//! the store down so buffered writes reach disk.
//!
//! Ctrl-C during a fetch cancels the pending requests; nothing from the
//! cancelled fetch is applied.

use std::fs::OpenOptions;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;
use vtour_common::config::{self, LoggingConfig, TomlConfig};
use vtour_core::{MapRegion, Photo, TourService};

/// Command-line arguments for vtour
#[derive(Parser, Debug)]
#[command(name = "vtour")]
#[command(about = "Map markers with photo albums from a remote image catalog")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to <config dir>/vtour/config.toml)
    #[arg(short, long, env = "VTOUR_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drop a marker at a location
    Drop {
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
    },
    /// List markers
    Markers,
    /// Show a marker's album, fetching one if it has none
    Album { marker: Uuid },
    /// Replace a marker's album with a new random collection
    NewCollection { marker: Uuid },
    /// Delete a marker and its photos
    DeleteMarker { marker: Uuid },
    /// Delete photos from their album
    DeletePhotos {
        #[arg(required = true)]
        photos: Vec<Uuid>,
    },
    /// Download (or read the cached) image of a photo
    FetchImage {
        photo: Uuid,
        /// Write the image bytes to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the saved map region, or save a new one
    Region {
        /// center-latitude center-longitude latitude-delta longitude-delta
        #[arg(long, num_args = 4, allow_negative_numbers = true, value_names = ["LAT", "LON", "DLAT", "DLON"])]
        set: Option<Vec<f64>>,
    },
    /// Remove all markers, photos and settings
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = match args.config.clone().or_else(config::default_config_path) {
        Some(path) => config::load_toml_config(&path)?,
        None => TomlConfig::default(),
    };
    init_logging(&toml_config.logging)?;
    info!(
        "vtour {} ({}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE")
    );

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    info!("Root folder: {}", root_folder.display());

    let service = TourService::open(&toml_config, &root_folder)
        .await
        .context("Failed to open store")?;

    let outcome = run(&service, args.command).await;
    service.shutdown().await.context("Failed to close store")?;
    outcome
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "vtour={level},vtour_core={level},vtour_common={level}",
            level = logging.level
        ))
    });

    let file_layer = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };
    let stderr_layer = file_layer
        .is_none()
        .then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

async fn run(service: &TourService, command: Command) -> Result<()> {
    match command {
        Command::Drop { latitude, longitude } => {
            let marker = service.create_marker(latitude, longitude).await?;
            println!("{}  {:.6}, {:.6}", marker.id, marker.latitude, marker.longitude);
        }
        Command::Markers => {
            for marker in service.list_markers().await? {
                let photos = service.album(marker.id).await?.len();
                println!(
                    "{}  {:.6}, {:.6}  {} photo(s)",
                    marker.id, marker.latitude, marker.longitude, photos
                );
            }
        }
        Command::Album { marker } => {
            let result = interruptible(service, service.open_album(marker)).await;
            print_album(result)?;
        }
        Command::NewCollection { marker } => {
            let result = interruptible(service, service.fetch_album(marker)).await;
            print_album(result)?;
        }
        Command::DeleteMarker { marker } => {
            let photos = service.delete_marker(marker).await?;
            println!("Deleted marker {} and {} photo(s)", marker, photos);
        }
        Command::DeletePhotos { photos } => {
            let removed = service.delete_photos(&photos).await?;
            println!("Deleted {} of {} photo(s)", removed, photos.len());
        }
        Command::FetchImage { photo, output } => {
            let bytes = interruptible(service, service.fetch_image_bytes(photo)).await?;
            describe_image(service, photo, bytes.len()).await?;
            if let Some(path) = output {
                write_image(&path, &bytes)?;
            }
        }
        Command::Region { set } => match set.as_deref() {
            Some(&[center_latitude, center_longitude, latitude_delta, longitude_delta]) => {
                let region = MapRegion {
                    center_latitude,
                    center_longitude,
                    latitude_delta,
                    longitude_delta,
                };
                service.save_map_region(region).await?;
                println!("Saved map region");
            }
            Some(_) => bail!("--set takes exactly four values"),
            None => match service.map_region().await? {
                Some(region) => println!(
                    "center {:.6}, {:.6}  span {:.6} x {:.6}",
                    region.center_latitude,
                    region.center_longitude,
                    region.latitude_delta,
                    region.longitude_delta
                ),
                None => println!("No map region saved"),
            },
        },
        Command::Reset { yes } => {
            if !yes {
                bail!("Refusing to reset without --yes");
            }
            service.reset().await?;
            println!("All data removed");
        }
    }
    Ok(())
}

/// Run `work`; on Ctrl-C cancel pending requests and let it finish as cancelled
async fn interruptible<T>(
    service: &TourService,
    work: impl Future<Output = vtour_core::Result<T>>,
) -> vtour_core::Result<T> {
    tokio::pin!(work);
    tokio::select! {
        result = &mut work => result,
        _ = signal::ctrl_c() => {
            warn!("Interrupted, cancelling pending requests");
            service.cancel_pending_work();
            work.await
        }
    }
}

fn print_album(result: vtour_core::Result<Vec<Photo>>) -> Result<()> {
    match result {
        Ok(photos) => {
            for photo in photos {
                println!(
                    "{}  {}  {}  {}",
                    photo.id,
                    photo.path.as_deref().unwrap_or("-"),
                    dimensions(photo.width, photo.height),
                    photo.title.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
        Err(e) if e.is_empty_album() => {
            println!("No photos found near this marker");
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            println!("Cancelled");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn describe_image(service: &TourService, photo_id: Uuid, len: usize) -> Result<()> {
    let decoded = service.store().photo(photo_id).await?.and_then(|p| p.image());
    match decoded {
        Some(image) => println!("{} bytes, {}x{}", len, image.width(), image.height()),
        None => println!("{} bytes (not a decodable image)", len),
    }
    Ok(())
}

fn write_image(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn dimensions(width: Option<u32>, height: Option<u32>) -> String {
    match (width, height) {
        (Some(w), Some(h)) => format!("{}x{}", w, h),
        _ => "?x?".to_string(),
    }
}
