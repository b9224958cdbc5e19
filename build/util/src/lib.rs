// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Small build-script helpers shared by every `build.rs` in this workspace:
//! reading the app-wide TOML configuration out of an environment variable,
//! and locating `OUT_DIR`.

use anyhow::Result;
use serde::de::DeserializeOwned;
use std::env;
use std::path::PathBuf;

/// Reads and deserializes the `[net-stack]`-shaped slice of app
/// configuration a build task cares about. `T` should only model the
/// fields that task needs, not the whole app manifest.
pub fn config<T: DeserializeOwned>() -> Result<T> {
    toml_from_env("APP_CONFIG")
}

fn toml_from_env<T: DeserializeOwned>(var: &str) -> Result<T> {
    let config = env::var(var)?;
    println!("cargo:rerun-if-env-changed={var}");
    Ok(toml::from_str(&config)?)
}

pub fn out_dir() -> PathBuf {
    PathBuf::from(env::var("OUT_DIR").unwrap())
}
