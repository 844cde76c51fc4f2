use std::hash::{Hash, Hasher};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub type RecordId = i64;

/// A domain entity with a stable identity. Everything except the identity may
/// change over the record's lifetime.
pub trait Record: Clone + Hash + Send + Sync + 'static {
    fn id(&self) -> RecordId;
}

/// Records that reference a remote thumbnail which is attached once fetched.
pub trait Thumbnailed: Record {
    fn thumbnail_url(&self) -> Option<&str>;
    fn has_thumbnail(&self) -> bool;
    fn attach_thumbnail(&mut self, image: Bytes);
}

pub trait Favoritable: Record {
    fn is_favorite(&self) -> bool;
    fn set_favorite(&mut self, favorite: bool);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub user_id: i64,
    pub id: RecordId,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub is_favorite: Option<bool>,
    #[serde(default)]
    pub is_marked_for_deletion: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub album_id: i64,
    pub id: RecordId,
    pub title: String,
    pub url: String,
    pub thumbnail_url: String,
    #[serde(default)]
    pub is_favorite: Option<bool>,
    #[serde(skip)]
    pub thumbnail: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: RecordId,
    pub user_id: i64,
    pub title: String,
}

impl Post {
    pub fn is_marked_for_deletion(&self) -> bool {
        self.is_marked_for_deletion.unwrap_or(false)
    }

    pub fn mark_for_deletion(&mut self, marked: bool) {
        self.is_marked_for_deletion = Some(marked);
    }
}

impl Record for Post {
    fn id(&self) -> RecordId {
        self.id
    }
}

// The attached image contributes only its length.
impl Hash for Photo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.album_id.hash(state);
        self.id.hash(state);
        self.title.hash(state);
        self.url.hash(state);
        self.thumbnail_url.hash(state);
        self.is_favorite.hash(state);
        self.thumbnail.as_ref().map(Bytes::len).hash(state);
    }
}

impl Record for Photo {
    fn id(&self) -> RecordId {
        self.id
    }
}

impl Record for Album {
    fn id(&self) -> RecordId {
        self.id
    }
}

impl Favoritable for Post {
    fn is_favorite(&self) -> bool {
        self.is_favorite.unwrap_or(false)
    }

    fn set_favorite(&mut self, favorite: bool) {
        self.is_favorite = Some(favorite);
    }
}

impl Favoritable for Photo {
    fn is_favorite(&self) -> bool {
        self.is_favorite.unwrap_or(false)
    }

    fn set_favorite(&mut self, favorite: bool) {
        self.is_favorite = Some(favorite);
    }
}

impl Thumbnailed for Photo {
    fn thumbnail_url(&self) -> Option<&str> {
        if self.thumbnail_url.is_empty() {
            None
        } else {
            Some(&self.thumbnail_url)
        }
    }

    fn has_thumbnail(&self) -> bool {
        self.thumbnail.is_some()
    }

    fn attach_thumbnail(&mut self, image: Bytes) {
        self.thumbnail = Some(image);
    }
}
