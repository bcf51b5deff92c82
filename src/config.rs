use crate::capture::CaptureMethod;
use crate::shader::ProfileKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const MIN_SUBFRAMES: u32 = 1;
pub const MAX_SUBFRAMES: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SplitScreen {
    #[default]
    Off,
    /// Left half shaded, right half original.
    Vertical,
    /// Top half shaded, bottom half original.
    Horizontal,
}

impl SplitScreen {
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Self::Off),
            1 => Some(Self::Vertical),
            2 => Some(Self::Horizontal),
            _ => None,
        }
    }

    pub fn index(self) -> u32 {
        match self {
            Self::Off => 0,
            Self::Vertical => 1,
            Self::Horizontal => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MonitorType {
    #[default]
    Lcd,
    Oled,
}

/// Where a window being captured sits relative to its monitor's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowTarget {
    pub offset_x: i32,
    pub offset_y: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    #[serde(default = "default_sub_frames")]
    pub sub_frames: u32,
    #[serde(default = "default_true")]
    pub auto_sync: bool,
    /// Seconds between drift checks.
    #[serde(default = "default_auto_sync_interval")]
    pub auto_sync_interval: u32,
    #[serde(default)]
    pub split_screen: SplitScreen,
    #[serde(default)]
    pub shader_profile: ProfileKind,
    #[serde(default)]
    pub capture_method: CaptureMethod,
    #[serde(default)]
    pub monitor_type: MonitorType,
    #[serde(default)]
    pub hardware_srgb: bool,
    #[serde(default = "default_true")]
    pub remember_settings: bool,
    #[serde(default = "default_true")]
    pub show_ui: bool,
    #[serde(default = "default_output_width")]
    pub output_width: u32,
    #[serde(default = "default_output_height")]
    pub output_height: u32,
    #[serde(default)]
    pub capture_image: Option<PathBuf>,
    /// Non-default shader parameters of the active profile, by name.
    #[serde(default)]
    pub shader_parameters: BTreeMap<String, String>,

    // derived per session, never persisted
    #[serde(skip)]
    pub cross_adapter: bool,
    #[serde(skip)]
    pub capture_window: Option<WindowTarget>,
}

fn default_true() -> bool {
    true
}

fn default_sub_frames() -> u32 {
    4
}

fn default_auto_sync_interval() -> u32 {
    2
}

fn default_output_width() -> u32 {
    1920
}

fn default_output_height() -> u32 {
    1080
}

impl Default for Options {
    fn default() -> Self {
        Self {
            sub_frames: default_sub_frames(),
            auto_sync: true,
            auto_sync_interval: default_auto_sync_interval(),
            split_screen: SplitScreen::Off,
            shader_profile: ProfileKind::default(),
            capture_method: CaptureMethod::default(),
            monitor_type: MonitorType::Lcd,
            hardware_srgb: false,
            remember_settings: true,
            show_ui: true,
            output_width: default_output_width(),
            output_height: default_output_height(),
            capture_image: None,
            shader_parameters: BTreeMap::new(),
            cross_adapter: false,
            capture_window: None,
        }
    }
}

impl Options {
    /// One sub-frame per 60Hz of display refresh.
    pub fn default_sub_frames(vsync_rate: f64) -> u32 {
        let sub_frames = (vsync_rate / 60.0).round();
        if sub_frames < 1.0 {
            1
        } else {
            (sub_frames as u32).min(MAX_SUBFRAMES)
        }
    }

    pub fn validate(&mut self) {
        self.sub_frames = self.sub_frames.clamp(MIN_SUBFRAMES, MAX_SUBFRAMES);
        self.auto_sync_interval = self.auto_sync_interval.max(1);
        self.output_width = self.output_width.max(1);
        self.output_height = self.output_height.max(1);
    }

    /// What gets written to disk. With `remember_settings` off only the flag itself survives.
    pub fn persisted(&self) -> Options {
        if self.remember_settings {
            self.clone()
        } else {
            Options {
                remember_settings: false,
                ..Options::default()
            }
        }
    }
}
