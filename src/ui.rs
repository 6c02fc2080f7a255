//! The basic UI.
//!
//! Spawns a mesh for every simulated object, copies object poses into bevy
//! transforms after each frame, and overlays some information about the
//! flight.

use std::collections::HashMap;
use std::fmt::Write;

use bevy::{
    color::palettes::css::{GOLD, SADDLE_BROWN, SLATE_GRAY, STEEL_BLUE},
    prelude::*,
};
use quadsim::{ObjectId, RenderSink, WorldObject};

use crate::uav::Sim;

#[derive(Component)]
pub struct InfoText;

#[derive(Component)]
pub struct MainCameraMarker;

/// Which simulated object a mesh draws.
#[derive(Component)]
pub struct SimObject(pub ObjectId);

#[derive(Default)]
pub struct UIPlugin;

impl Plugin for UIPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_ui);
        app.add_systems(Update, (sync_transforms, update_ui));
    }
}

fn setup_ui(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    sim: Res<Sim>,
) {
    // Informative text.
    commands.spawn((
        Text::new(""),
        TextFont {
            font_size: 18.0,
            ..default()
        },
        TextColor(GOLD.into()),
        Node {
            position_type: PositionType::Absolute,
            bottom: Val::Px(5.0),
            left: Val::Px(5.0),
            ..default()
        },
        Name::new("Info Text"),
        InfoText,
    ));

    // Every object is drawn as a unit cube, scaled like the object.
    let cube = meshes.add(Cuboid::new(1.0, 1.0, 1.0));
    for (id, object) in sim.game.world().iter() {
        let color = if id == sim.scene.uav {
            STEEL_BLUE
        } else if id == sim.scene.floor {
            SLATE_GRAY
        } else {
            SADDLE_BROWN
        };
        commands.spawn((
            Mesh3d(cube.clone()),
            MeshMaterial3d(materials.add(StandardMaterial {
                base_color: color.into(),
                perceptual_roughness: 0.85,
                reflectance: 0.02,
                ..default()
            })),
            object_transform(object),
            SimObject(id),
            Name::new(object.label().to_owned()),
        ));
    }

    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: 300.0,
        ..default()
    });

    // The main 3d scene, looking at the UAV's start from behind and above.
    commands.spawn((
        Camera3d::default(),
        Camera {
            order: 0,
            ..default()
        },
        Name::new("Main 3D Camera"),
        Transform::from_translation(sim_to_bevy(&na::Vector3::new(-10.0, 5.0, 7.0)))
            .looking_at(sim_to_bevy(&na::Vector3::new(2.0, 0.0, 1.0)), Vec3::Y),
        Projection::Perspective(PerspectiveProjection {
            fov: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            ..default()
        }),
        MainCameraMarker,
    ));

    commands.spawn((
        DirectionalLight {
            shadows_enabled: true,
            illuminance: 10_000.0,
            ..default()
        },
        Transform::from_translation(sim_to_bevy(&na::Vector3::new(25.0, 10.0, 25.0)))
            .looking_at(sim_to_bevy(&na::Vector3::new(-5.0, -5.0, 0.0)), Vec3::Y),
        Name::new("Main Light"),
    ));
}

/// Collects the transform each object should be drawn with.
#[derive(Default)]
struct TransformSink(HashMap<ObjectId, Transform>);

impl RenderSink for TransformSink {
    fn draw(&mut self, id: ObjectId, object: &WorldObject) {
        self.0.insert(id, object_transform(object));
    }
}

fn sync_transforms(sim: Res<Sim>, mut query: Query<(&SimObject, &mut Transform)>) {
    let mut sink = TransformSink::default();
    sim.game.render(&mut sink);
    for (object, mut transform) in query.iter_mut() {
        if let Some(t) = sink.0.get(&object.0) {
            *transform = *t;
        }
    }
}

fn update_ui(mut text: Query<&mut Text, With<InfoText>>, sim: Res<Sim>) {
    let Ok(mut text) = text.single_mut() else {
        return;
    };

    let mut message = String::new();
    let _ = writeln!(message, "Time: {:.3} s", sim.game.elapsed());
    for (_, object) in sim.game.world().iter() {
        if let Some(status) = object.status() {
            let p = object.position();
            let _ = writeln!(message, "{}: {status}", object.label());
            let _ = writeln!(message, "  pos: {:.2}, {:.2}, {:.2}", p.x, p.y, p.z);
        }
    }
    let _ = writeln!(
        message,
        "WASD roll/pitch, QE yaw, Up/Down thrust, R mode, click to push"
    );

    **text = message;
}

fn object_transform(object: &WorldObject) -> Transform {
    let s = object.scale();
    Transform {
        translation: sim_to_bevy(&object.position()),
        rotation: sim_quat_to_bevy(&object.pose().rotation()),
        // Body Y maps to bevy -Z, body Z to bevy Y.
        scale: Vec3::new(s.x as f32, s.z as f32, s.y as f32),
    }
}

pub fn sim_to_bevy(v: &na::Vector3<f64>) -> Vec3 {
    Vec3::new(v.x as f32, v.z as f32, -v.y as f32)
}

/// Convert a nalgebra quaternion (f64) to a bevy quaternion (f32). This
/// includes the basis change between the Z-up sim and the Y-up bevy.
pub fn sim_quat_to_bevy(q: &na::UnitQuaternion<f64>) -> Quat {
    let r =
        na::UnitQuaternion::from_axis_angle(&na::Vector3::x_axis(), -std::f64::consts::FRAC_PI_2);
    let q = r * q * r.conjugate();
    Quat::from_array([q.i as f32, q.j as f32, q.k as f32, q.w as f32])
}
