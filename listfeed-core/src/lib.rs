pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod models;
pub mod network;
pub mod reconcile;
pub mod store;

pub use cache::{BinarySource, CacheStats, RemoteObjectCache};
pub use config::{AppConfig, CacheConfig, NetworkConfig};
pub use controller::{
    FeedController, RenderingSurface, RowId, SectionId, SurfaceUpdate, ThumbnailOutcome,
    MAIN_SECTION,
};
pub use error::{ConfigError, FetchError};
pub use models::{Album, Favoritable, Photo, Post, Record, RecordId, Thumbnailed};
pub use network::{NetworkClient, Resource};
pub use reconcile::{fingerprint, Changeset, Operation, Snapshot};
pub use store::{ChangeCause, FeedChange, FeedState, FeedStore, FeedSubscription};
