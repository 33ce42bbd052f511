use log::{info, warn};
use serde::{Deserialize, Serialize};

pub const SETTINGS_FILE: &str = "batch_settings.json";

/// Initial capacities and pool sizes for the batch core.
///
/// Buffers grow past their initial sizes on demand; pools never do, so the
/// pool sizes are hard limits for a scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "BatchSettings::default_vertex_count")]
    pub initial_vertex_count: u32,
    #[serde(default = "BatchSettings::default_index_count")]
    pub initial_index_count: u32,
    #[serde(default = "BatchSettings::default_matrix_count")]
    pub initial_matrix_count: u32,
    #[serde(default = "BatchSettings::default_batch_index_count")]
    pub initial_batch_index_count: u32,
    #[serde(default = "BatchSettings::default_indirect_arg_count")]
    pub initial_indirect_arg_count: u32,
    #[serde(default)]
    pub pools: PoolSizes,
    #[serde(default = "BatchSettings::default_shadow_pass")]
    pub shadow_pass: bool,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "BatchSettings::default_frames")]
    pub frames: u32,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            initial_vertex_count: Self::default_vertex_count(),
            initial_index_count: Self::default_index_count(),
            initial_matrix_count: Self::default_matrix_count(),
            initial_batch_index_count: Self::default_batch_index_count(),
            initial_indirect_arg_count: Self::default_indirect_arg_count(),
            pools: PoolSizes::default(),
            shadow_pass: Self::default_shadow_pass(),
            resolution: Resolution::default(),
            frames: Self::default_frames(),
        }
    }
}

impl BatchSettings {
    pub fn load() -> Self {
        Self::load_from_path(SETTINGS_FILE)
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<BatchSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded batch settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default batch settings.",
                        path, err
                    );
                    BatchSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Batch settings file {:?} not found. Using default settings.",
                    path
                );
                BatchSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default batch settings.",
                    path, err
                );
                BatchSettings::default()
            }
        }
    }

    fn validate(mut self) -> Self {
        fn non_zero(value: &mut u32, fallback: u32, what: &str) {
            if *value == 0 {
                warn!("{} must be greater than zero. Using {} instead.", what, fallback);
                *value = fallback;
            }
        }

        non_zero(
            &mut self.initial_vertex_count,
            Self::default_vertex_count(),
            "Initial vertex count",
        );
        non_zero(
            &mut self.initial_index_count,
            Self::default_index_count(),
            "Initial index count",
        );
        non_zero(
            &mut self.initial_matrix_count,
            Self::default_matrix_count(),
            "Initial matrix count",
        );
        non_zero(
            &mut self.initial_batch_index_count,
            Self::default_batch_index_count(),
            "Initial batch index count",
        );
        non_zero(
            &mut self.initial_indirect_arg_count,
            Self::default_indirect_arg_count(),
            "Initial indirect argument count",
        );

        let defaults = PoolSizes::default();
        if self.pools.srv == 0 || self.pools.sampler == 0 || self.pools.rtv == 0 || self.pools.dsv == 0
        {
            warn!("Descriptor pool sizes must be greater than zero. Using defaults for empty pools.");
            if self.pools.srv == 0 {
                self.pools.srv = defaults.srv;
            }
            if self.pools.sampler == 0 {
                self.pools.sampler = defaults.sampler;
            }
            if self.pools.rtv == 0 {
                self.pools.rtv = defaults.rtv;
            }
            if self.pools.dsv == 0 {
                self.pools.dsv = defaults.dsv;
            }
        }

        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }

        self
    }

    const fn default_vertex_count() -> u32 {
        500_000
    }

    const fn default_index_count() -> u32 {
        100_000
    }

    const fn default_matrix_count() -> u32 {
        128
    }

    const fn default_batch_index_count() -> u32 {
        128
    }

    const fn default_indirect_arg_count() -> u32 {
        32
    }

    const fn default_shadow_pass() -> bool {
        true
    }

    const fn default_frames() -> u32 {
        120
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolSizes {
    pub srv: usize,
    pub sampler: usize,
    pub rtv: usize,
    pub dsv: usize,
}

impl Default for PoolSizes {
    fn default() -> Self {
        Self {
            srv: 4096,
            sampler: 32,
            rtv: 128,
            dsv: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}
