//! A quadrotor flight simulator.
//!
//! Notably, we use Z-up right handed.

// Recommended alias.
extern crate nalgebra as na;

use std::path::Path;

use anyhow::{Context, Result};
use bevy::prelude::*;
use quadsim::{Game, QuadcopterParams, SimSettings, demo::build_demo_scene};

mod uav;
mod ui;

/// Optional controller tuning, read at startup.
const PARAMS_PATH: &str = "assets/quadcopter.json";

fn load_params(path: &Path) -> Result<QuadcopterParams> {
    if !path.exists() {
        return Ok(QuadcopterParams::default());
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    QuadcopterParams::from_json(&json).with_context(|| format!("parsing {}", path.display()))
}

fn main() -> Result<()> {
    let params = load_params(Path::new(PARAMS_PATH))?;

    let mut game = Game::new(SimSettings::default()).context("creating the simulation")?;
    let scene = build_demo_scene(&mut game, params).context("building the demo scene")?;

    App::new()
        .add_plugins(DefaultPlugins)
        .insert_resource(uav::Sim { game, scene })
        .add_plugins((uav::UavPlugin, ui::UIPlugin))
        .run();

    Ok(())
}
