use crate::ModelError;

use std::str::FromStr;

use serde_json::{Map, Value};

const SEGMENTATION_KEYWORD: &str = "seg";
const CONFIG_MODE_KEY: &str = "mode";
const LUT_MODE: &str = "lut";

/// Colormap keywords accepted alongside a display operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    /// Label maps rendered through a lookup table.
    Segmentation,
}

impl Colormap {
    pub const fn keyword(self) -> &'static str {
        match self {
            Colormap::Segmentation => SEGMENTATION_KEYWORD,
        }
    }

    /// Fold the colormap into a viewport config map.
    pub fn apply(self, config: &mut Map<String, Value>) {
        match self {
            Colormap::Segmentation => {
                config.insert(CONFIG_MODE_KEY.to_string(), Value::from(LUT_MODE));
            }
        }
    }
}

impl FromStr for Colormap {
    type Err = ModelError;

    #[track_caller]
    fn from_str(keyword: &str) -> Result<Self, Self::Err> {
        match keyword {
            SEGMENTATION_KEYWORD => Ok(Colormap::Segmentation),
            other => Err(ModelError::validation(format!(
                "Colormap {other} is not supported. Hint: use `{SEGMENTATION_KEYWORD}` for segmentation maps."
            ))),
        }
    }
}
