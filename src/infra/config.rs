// ============================================================
// Layer 6 - Config File Loading
// ============================================================
// Reads a TrainConfig from JSON. Every field is optional in the
// file; missing ones take TrainConfig::default(). The CLI then
// applies its own flags on top.
//
// Example:
//   {
//     "k_folds": 5,
//     "max_epochs": 20,
//     "augment": { "max_rotation_degrees": 15.0 },
//     "pretrained_weights": "weights/resnet18.pth"
//   }

use anyhow::{Context, Result};
use std::{fs, path::Path};

use crate::application::train_use_case::TrainConfig;

pub fn load_train_config(path: &Path) -> Result<TrainConfig> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
    let cfg: TrainConfig = serde_json::from_str(&json)
        .with_context(|| format!("Invalid training config '{}'", path.display()))?;
    tracing::debug!("Loaded training config from '{}'", path.display());
    Ok(cfg)
}
