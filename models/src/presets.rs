//! Common CT windowing presets.
//!
//! Each preset expands to `{"window": {"center": c, "width": w}}`, ready to be
//! merged into the config map of a display operation.

use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// General soft tissue.
    SoftTissue,
    Brain,
    /// Lung parenchyma, airways and nodules.
    Lung,
    Bone,
    Liver,
    Abdomen,
    /// Heart and great vessels.
    Mediastinum,
    /// Narrow window for acute ischemic stroke.
    Stroke,
    Subdural,
    /// Contrast-enhanced vessels.
    Angio,
}

impl Window {
    pub const ALL: [Window; 10] = [
        Window::SoftTissue,
        Window::Brain,
        Window::Lung,
        Window::Bone,
        Window::Liver,
        Window::Abdomen,
        Window::Mediastinum,
        Window::Stroke,
        Window::Subdural,
        Window::Angio,
    ];

    /// `(center, width)` in Hounsfield units.
    pub const fn center_width(self) -> (i32, i32) {
        match self {
            Window::SoftTissue => (50, 400),
            Window::Brain => (40, 80),
            Window::Lung => (-600, 1500),
            Window::Bone => (400, 1500),
            Window::Liver => (60, 150),
            Window::Abdomen => (40, 350),
            Window::Mediastinum => (40, 400),
            Window::Stroke => (35, 40),
            Window::Subdural => (100, 200),
            Window::Angio => (300, 600),
        }
    }

    pub fn config(self) -> Map<String, Value> {
        let (center, width) = self.center_width();
        let mut config = Map::new();
        config.insert(
            "window".to_string(),
            json!({ "center": center, "width": width }),
        );
        config
    }
}
