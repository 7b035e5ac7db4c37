use models::{ArrayPayload, Window};

use serde_json::{Map, Value};

/// Anything a view session can show.
///
/// Implementors hand over an optional array plus the config and metadata that
/// go into the header frame. Options passed to `imshow` take precedence over
/// the maps returned here.
pub trait Displayable {
    fn to_array(&self) -> Option<ArrayPayload>;

    fn to_config(&self) -> Map<String, Value> {
        Map::new()
    }

    fn to_metadata(&self) -> Map<String, Value> {
        Map::new()
    }
}

impl Displayable for ArrayPayload {
    fn to_array(&self) -> Option<ArrayPayload> {
        Some(self.clone())
    }
}

/// A window preset alone is a config-only update for the current image.
impl Displayable for Window {
    fn to_array(&self) -> Option<ArrayPayload> {
        None
    }

    fn to_config(&self) -> Map<String, Value> {
        self.config()
    }
}
