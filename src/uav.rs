//! Flying the UAV from the keyboard and mouse.
//!
//! The simulation itself lives in the `Sim` resource and advances in
//! `FixedUpdate`. This module turns held keys into stick samples, clicks
//! into touches, and keeps the simulation's viewport in step with the main
//! camera so touches can be unprojected.

use bevy::{prelude::*, window::PrimaryWindow};
use quadsim::{ControlEvent, DepthConvention, Game, Viewport, demo::DemoScene};

use crate::ui::MainCameraMarker;

/// The simulation and the ids of the demo objects.
#[derive(Resource)]
pub struct Sim {
    pub game: Game,
    pub scene: DemoScene,
}

/// How fast holding Up/Down moves the thrust stick, per second.
const THRUST_STICK_RATE: f64 = 1.0;

#[derive(Default)]
pub struct UavPlugin;

impl Plugin for UavPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(FixedUpdate, step_sim);
        app.add_systems(Update, (keys_to_sticks, click_to_touch, sync_viewport));
    }
}

fn step_sim(mut sim: ResMut<Sim>, time: Res<Time>) {
    let dt = time.delta_secs_f64();
    sim.game.on_update(dt);
}

fn axis(kb: &ButtonInput<KeyCode>, positive: KeyCode, negative: KeyCode) -> f64 {
    let mut value = 0.0;
    if kb.pressed(positive) {
        value += 1.0;
    }
    if kb.pressed(negative) {
        value -= 1.0;
    }
    value
}

fn keys_to_sticks(
    kb: Res<ButtonInput<KeyCode>>,
    time: Res<Time>,
    sim: Res<Sim>,
    mut thrust: Local<f64>,
) {
    let input = sim.game.input_sender();
    let uav = sim.scene.uav;

    if kb.just_pressed(KeyCode::KeyR) {
        input.control(uav, ControlEvent::ToggleMode);
    }

    // Thrust stays where it was left; the other sticks spring back.
    let climb = axis(&kb, KeyCode::ArrowUp, KeyCode::ArrowDown);
    *thrust = (*thrust + climb * THRUST_STICK_RATE * time.delta_secs_f64()).clamp(-1.0, 1.0);

    // Positive roll lifts the left side, positive pitch drops the nose,
    // positive yaw turns left.
    let roll = axis(&kb, KeyCode::KeyD, KeyCode::KeyA);
    let pitch = axis(&kb, KeyCode::KeyW, KeyCode::KeyS);
    let yaw = axis(&kb, KeyCode::KeyQ, KeyCode::KeyE);

    input.roll_thrust(uav, roll, *thrust);
    input.yaw_pitch(uav, yaw, pitch);
}

fn click_to_touch(
    buttons: Res<ButtonInput<MouseButton>>,
    window: Query<&Window, With<PrimaryWindow>>,
    sim: Res<Sim>,
) {
    if !buttons.just_pressed(MouseButton::Left) {
        return;
    }
    let Ok(window) = window.single() else {
        return;
    };
    if let Some(cursor) = window.cursor_position() {
        sim.game
            .input_sender()
            .touch(cursor.x as f64, cursor.y as f64);
    }
}

/// Map from the Z-up sim frame to bevy's Y-up frame, as a matrix.
fn bevy_from_sim() -> Mat4 {
    Mat4::from_cols(
        Vec4::X,
        Vec4::new(0.0, 0.0, -1.0, 0.0),
        Vec4::Y,
        Vec4::W,
    )
}

fn sync_viewport(
    mut sim: ResMut<Sim>,
    window: Query<&Window, With<PrimaryWindow>>,
    camera: Query<(&Camera, &GlobalTransform), With<MainCameraMarker>>,
) {
    let (Ok(window), Ok((camera, transform))) = (window.single(), camera.single()) else {
        return;
    };
    let view_from_world = Mat4::from(transform.affine()).inverse();
    let clip_from_sim = camera.clip_from_view() * view_from_world * bevy_from_sim();

    sim.game.set_viewport(Viewport {
        width: window.width() as f64,
        height: window.height() as f64,
        projection_view: na::Matrix4::from_column_slice(&clip_from_sim.to_cols_array())
            .cast::<f64>(),
        // Bevy renders with an infinite reversed depth range.
        depth: DepthConvention::ReverseZ,
    });
}
