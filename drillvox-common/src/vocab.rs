//! Vocabulary source contract and in-memory implementation
//!
//! The narration core never owns vocabulary data; it reads items by
//! identifier through the `VocabSource` trait. The same source doubles as
//! the display-order provider used for single-mode auto-advance.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// A single vocabulary item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabItem {
    /// Stable identifier
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    /// Text handed to the speech backend
    pub spoken_text: String,

    /// BCP 47 language tag for synthesis
    #[serde(default = "default_language")]
    pub language: String,

    /// Optional translation/meaning, carried for UI display only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gloss: Option<String>,
}

fn default_language() -> String {
    "ja-JP".to_string()
}

/// Read access to the external vocabulary collection
///
/// Items may be added or removed at any time by the owning collaborator;
/// `resolve` returning `None` for a queued identifier is a normal condition
/// the playback core must absorb.
pub trait VocabSource: Send + Sync {
    /// Look up an item by identifier
    fn resolve(&self, id: &Uuid) -> Option<VocabItem>;

    /// Identifier of the item after `id` in display order
    fn next_in_display_order(&self, id: &Uuid) -> Option<Uuid>;

    /// Identifier of the item before `id` in display order
    fn prev_in_display_order(&self, id: &Uuid) -> Option<Uuid>;

    /// All identifiers in display order
    fn display_order(&self) -> Vec<Uuid>;
}

/// In-memory vocabulary backed by a JSON file
///
/// Display order is the order of the file. The collection can be replaced
/// wholesale while playback runs; readers see a consistent snapshot per call.
pub struct Vocabulary {
    items: RwLock<Vec<VocabItem>>,
}

impl Vocabulary {
    /// Create a vocabulary from items already in memory
    pub fn from_items(items: Vec<VocabItem>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    /// Load a vocabulary from a JSON file (array of items)
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Vocabulary(format!("Failed to read vocabulary file {:?}: {}", path, e))
        })?;

        let items: Vec<VocabItem> = serde_json::from_str(&contents)
            .map_err(|e| Error::Vocabulary(format!("Failed to parse vocabulary JSON: {}", e)))?;

        info!("Loaded {} vocabulary items from {:?}", items.len(), path);
        Ok(Self::from_items(items))
    }

    /// Replace the whole collection (e.g. after an external re-import)
    pub fn replace_all(&self, items: Vec<VocabItem>) {
        *self.items.write().expect("vocabulary lock poisoned") = items;
    }

    /// Remove a single item by identifier
    pub fn remove(&self, id: &Uuid) {
        self.items
            .write()
            .expect("vocabulary lock poisoned")
            .retain(|item| item.id != *id);
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.read().expect("vocabulary lock poisoned").len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VocabSource for Vocabulary {
    fn resolve(&self, id: &Uuid) -> Option<VocabItem> {
        self.items
            .read()
            .expect("vocabulary lock poisoned")
            .iter()
            .find(|item| item.id == *id)
            .cloned()
    }

    fn next_in_display_order(&self, id: &Uuid) -> Option<Uuid> {
        let items = self.items.read().expect("vocabulary lock poisoned");
        let pos = items.iter().position(|item| item.id == *id)?;
        items.get(pos + 1).map(|item| item.id)
    }

    fn prev_in_display_order(&self, id: &Uuid) -> Option<Uuid> {
        let items = self.items.read().expect("vocabulary lock poisoned");
        let pos = items.iter().position(|item| item.id == *id)?;
        if pos == 0 {
            return None;
        }
        items.get(pos - 1).map(|item| item.id)
    }

    fn display_order(&self) -> Vec<Uuid> {
        self.items
            .read()
            .expect("vocabulary lock poisoned")
            .iter()
            .map(|item| item.id)
            .collect()
    }
}
