//! Opsdesk CLI - gallery management tools.
//!
//! # Usage
//!
//! ```bash
//! # Show the gallery of product 12 (repairs broken ordering on load)
//! opsdesk gallery 12 list
//!
//! # Report ordering problems of color variant 3 of product 12 without fixing them
//! opsdesk gallery 12:3 check
//!
//! # Upload files
//! opsdesk gallery 12 upload front.jpg back.jpg
//!
//! # Move the first image to the third position
//! opsdesk gallery 12 move 0 2
//!
//! # Scripted session against an in-memory store
//! opsdesk demo
//! ```
//!
//! # Commands
//!
//! - `gallery <owner> list|check|upload|replace|move|primary|delete|alt`
//! - `demo` - Walk through a gallery session without a store

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use opsdesk_core::{ImageId, Owner};
use opsdesk_gallery::GalleryConfig;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "opsdesk")]
#[command(author, version, about = "Opsdesk operations console tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the image gallery of a product or color variant
    Gallery {
        /// Gallery owner: `<product_id>` or `<product_id>:<variant_id>`
        owner: Owner,

        #[command(subcommand)]
        action: GalleryAction,
    },
    /// Run a scripted gallery session against an in-memory store
    Demo,
}

#[derive(Subcommand)]
enum GalleryAction {
    /// List images in display order
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Report ordering and primary problems without repairing them
    Check,
    /// Upload image files and append them to the gallery
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Replace the file of an image, keeping its position
    Replace { image: ImageId, file: PathBuf },
    /// Move the image at one position to another (0-based)
    Move { from: usize, to: usize },
    /// Make an image the primary image
    Primary { image: ImageId },
    /// Delete an image
    Delete { image: ImageId },
    /// Set the alt text of an image (empty clears it)
    Alt { image: ImageId, text: String },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &GalleryConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "opsdesk=info,opsdesk_gallery=info".into());

    // JSON for log shippers, text for terminals
    let json = std::env::var("OPSDESK_LOG_JSON").is_ok();
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Demo runs without a store, so configuration is only required for gallery commands
    let config = GalleryConfig::from_env();

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);
    init_tracing();

    let result = match cli.command {
        Commands::Demo => commands::demo::run().await,
        Commands::Gallery { owner, action } => match config {
            Ok(config) => run_gallery(&config, owner, action).await,
            Err(e) => Err(e.into()),
        },
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run_gallery(
    config: &GalleryConfig,
    owner: Owner,
    action: GalleryAction,
) -> Result<(), commands::CommandError> {
    use commands::gallery;

    match action {
        GalleryAction::List { json } => gallery::list(config, owner, json).await,
        GalleryAction::Check => gallery::check(config, owner).await,
        GalleryAction::Upload { files } => gallery::upload(config, owner, &files).await,
        GalleryAction::Replace { image, file } => {
            gallery::replace(config, owner, image, &file).await
        }
        GalleryAction::Move { from, to } => gallery::move_entry(config, owner, from, to).await,
        GalleryAction::Primary { image } => gallery::set_primary(config, owner, image).await,
        GalleryAction::Delete { image } => gallery::delete(config, owner, image).await,
        GalleryAction::Alt { image, text } => gallery::set_alt(config, owner, image, &text).await,
    }
}
