use listfeed_core::{
    FeedState, Operation, Photo, Post, Record, RenderingSurface, SurfaceUpdate, Thumbnailed,
};
use tracing::{debug, info};

/// One-line description of a row, the headless counterpart of a table cell.
pub trait RowLabel {
    fn label(&self) -> String;
}

impl RowLabel for Post {
    fn label(&self) -> String {
        let marker = if self.is_favorite.unwrap_or(false) { "*" } else { " " };
        format!("{marker} #{} {}", self.id, self.title)
    }
}

impl RowLabel for Photo {
    fn label(&self) -> String {
        let image = match &self.thumbnail {
            Some(bytes) => format!("{} bytes", bytes.len()),
            None if self.thumbnail_url().is_some() => "loading".to_string(),
            None => "no image".to_string(),
        };
        format!("#{} {} [{image}]", self.id, self.title)
    }
}

/// Logs every update instead of drawing it and keeps a title like
/// "Posts : 100".
pub struct LogSurface {
    name: String,
    title: String,
}

impl LogSurface {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            title: format!("{name} : 0"),
            name,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

impl<R: Record + RowLabel> RenderingSurface<R> for LogSurface {
    fn apply(&mut self, update: SurfaceUpdate<'_>, records: &FeedState<R>) {
        for operation in update.changeset.operations() {
            match operation {
                Operation::Delete(id) => debug!(surface = %self.name, id, "delete row"),
                Operation::Insert(id) | Operation::Reconfigure(id) => {
                    if let Some(record) = records.get(id) {
                        debug!(surface = %self.name, op = ?operation, row = %record.label(), "configure row");
                    }
                }
            }
        }
        for (section, items) in &update.sections {
            info!(surface = %self.name, section, rows = items.len(), "section rendered");
        }
    }

    fn settled(&mut self, item_count: usize) {
        self.title = format!("{} : {item_count}", self.name);
        info!(title = %self.title, "update settled");
    }
}
