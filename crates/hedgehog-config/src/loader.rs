//! Finding and layering `config.toml` files.
//!
//! Layers are read from the machine-wide file, then the user's, then the
//! current directory, then `--config`. Keys set in a later layer replace
//! the same keys in earlier ones; tables merge key by key, so a local
//! `hedgehog.toml` holding only `[device] host` keeps the user's port.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

const APP_DIR: &str = "hedgehog";
const FILE_NAME: &str = "config.toml";

/// Implicit layers, weakest first.
fn config_search_paths() -> Vec<PathBuf> {
    let user_dirs = [
        dirs::home_dir().map(|home| home.join(".config")),
        dirs::config_dir(),
    ];

    let mut paths = vec![Path::new("/etc").join(APP_DIR).join(FILE_NAME)];
    paths.extend(
        user_dirs
            .into_iter()
            .flatten()
            .map(|dir| dir.join(APP_DIR).join(FILE_NAME)),
    );
    paths.push(Path::new(".hedgehog").join(FILE_NAME));
    paths.push(PathBuf::from("hedgehog.toml"));

    // On Linux `~/.config` usually is the config dir.
    paths.dedup();
    paths
}

/// Build the effective [`Config`] from every layer that exists, plus
/// `explicit` (which must exist if given).
pub fn load(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let found = config_search_paths().into_iter().filter(|p| p.is_file());
    let layers: Vec<PathBuf> = found.chain(explicit.map(Path::to_path_buf)).collect();

    let mut merged = toml::Value::Table(toml::map::Map::new());
    for path in &layers {
        debug!(path = %path.display(), "applying config layer");
        merge_toml(&mut merged, read_layer(path)?);
    }

    merged
        .try_into()
        .context("invalid configuration")
}

fn read_layer(path: &Path) -> anyhow::Result<toml::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_toml(dst: &mut toml::Value, src: toml::Value) {
    match (dst, src) {
        (toml::Value::Table(d), toml::Value::Table(s)) => {
            for (k, v) in s {
                let entry = d.entry(k).or_insert(toml::Value::Table(toml::map::Map::new()));
                merge_toml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
