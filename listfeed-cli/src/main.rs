mod surface;

use std::process::ExitCode;
use std::sync::Arc;

use listfeed_core::{
    AppConfig, BinarySource, FeedController, NetworkClient, Photo, Post, RemoteObjectCache,
    Resource, ThumbnailOutcome,
};
use tokio::runtime::Runtime;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::surface::LogSurface;

const VISIBLE_ROWS: usize = 12;

fn main() -> ExitCode {
    init_tracing();

    let config = load_config();
    let client = match NetworkClient::from_config(&config.network) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            error!(error = %err, "failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };
    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to initialise Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let source: Arc<dyn BinarySource> = client.clone();
    let cache = RemoteObjectCache::new(source, config.cache.clone());

    runtime.block_on(async {
        show_posts(&client, cache.clone()).await;
        show_photos(&client, cache.clone()).await;
        let stats = cache.stats().await;
        info!(
            hits = stats.hits,
            misses = stats.misses,
            fetches = stats.fetches,
            evictions = stats.evictions,
            resident = cache.len().await,
            bytes = cache.total_cost().await,
            "image cache"
        );
    });
    ExitCode::SUCCESS
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn load_config() -> AppConfig {
    match std::env::var_os("LISTFEED_CONFIG") {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
}

async fn show_posts(client: &NetworkClient, cache: RemoteObjectCache) {
    let mut posts: FeedController<Post, LogSurface> =
        FeedController::new("posts", cache, LogSurface::new("Posts"));
    if !posts.refresh(client, &Resource::Posts).await {
        return;
    }

    // favorite the first row, delete the second
    let ids = posts.store().identities();
    if let Some(&first) = ids.first() {
        posts.set_favorite(first, true);
    }
    if let Some(&second) = ids.get(1) {
        posts.remove(second);
    }
    info!(title = %posts.surface().title(), "posts ready");
}

async fn show_photos(client: &NetworkClient, cache: RemoteObjectCache) {
    let mut photos: FeedController<Photo, LogSurface> =
        FeedController::new("photos", cache, LogSurface::new("Photos"));
    if !photos.refresh(client, &Resource::AlbumPhotos(1)).await {
        return;
    }

    let visible: Vec<_> = photos
        .store()
        .identities()
        .into_iter()
        .take(VISIBLE_ROWS)
        .collect();
    for (row, id) in visible.into_iter().enumerate() {
        photos.row_visible(row, id);
    }

    let outcomes = photos.settle_thumbnails().await;
    let count = |wanted: fn(&ThumbnailOutcome) -> bool| outcomes.iter().filter(|o| wanted(o)).count();
    info!(
        title = %photos.surface().title(),
        loaded = count(|o| matches!(o, ThumbnailOutcome::Applied(_))),
        failed = count(|o| matches!(o, ThumbnailOutcome::Failed)),
        discarded = count(|o| matches!(o, ThumbnailOutcome::Discarded)),
        "photos ready"
    );
}
