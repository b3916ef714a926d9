//! Demo game component driven by the arrow keys

use crate::component::{number_field, text_field, unknown_property, Component, SyncSchema, TickContext};
use crate::config::SyncConfig;
use crate::ecs::EcsBuilder;
use crate::error::{SyncError, SyncResult};
use crate::input::{KEY_DOWN, KEY_LEFT, KEY_RIGHT, KEY_UP};
use crate::state::{numeric_state, ComponentState, Value};

pub const WORLD_WIDTH: f64 = 800.0;
pub const WORLD_HEIGHT: f64 = 600.0;
pub const MOVER_SIZE: f64 = 32.0;
pub const MOVER_SPEED: f64 = 200.0;

/// A box that walks in the direction of the held arrow keys
#[derive(Debug, Clone, PartialEq)]
pub struct Mover {
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    /// Last direction moved in, "idle" while standing still
    pub heading: String,
    pub velocity: (f64, f64),
}

impl Mover {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }

    fn steer(&mut self, cx: &TickContext<'_>) {
        let input = cx.input;
        let mut vx = 0.0;
        let mut vy = 0.0;

        if input.is_key_pressed(KEY_LEFT) {
            vx -= self.speed;
        }
        if input.is_key_pressed(KEY_RIGHT) {
            vx += self.speed;
        }
        if input.is_key_pressed(KEY_UP) {
            vy -= self.speed;
        }
        if input.is_key_pressed(KEY_DOWN) {
            vy += self.speed;
        }

        self.velocity = (vx, vy);
        self.heading = match (vx, vy) {
            (x, _) if x < 0.0 => "left",
            (x, _) if x > 0.0 => "right",
            (_, y) if y < 0.0 => "up",
            (_, y) if y > 0.0 => "down",
            _ => "idle",
        }
        .to_string();
    }
}

impl Default for Mover {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            speed: MOVER_SPEED,
            heading: "idle".to_string(),
            velocity: (0.0, 0.0),
        }
    }
}

fn get_velocity(mover: &Mover) -> ComponentState {
    numeric_state(&[mover.velocity.0, mover.velocity.1])
}

fn set_velocity(mover: &mut Mover, state: &[Value]) -> SyncResult<()> {
    if state.len() < 2 {
        return Err(SyncError::StateTooShort {
            component: "Mover.velocity",
            expected: 2,
            found: state.len(),
        });
    }
    mover.velocity = (
        number_field::<Mover>("velocity", &state[0])?,
        number_field::<Mover>("velocity", &state[1])?,
    );
    Ok(())
}

impl Component for Mover {
    fn init(&mut self, schema: &mut SyncSchema<Self>) {
        schema
            .named("x")
            .named("y")
            .named("heading")
            .custom(get_velocity, set_velocity);
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "x" => Some(Value::from(self.x)),
            "y" => Some(Value::from(self.y)),
            "heading" => Some(Value::from(self.heading.as_str())),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Value) -> SyncResult<()> {
        match name {
            "x" => self.x = number_field::<Self>(name, &value)?,
            "y" => self.y = number_field::<Self>(name, &value)?,
            "heading" => self.heading = text_field::<Self>(name, &value)?,
            _ => return Err(unknown_property::<Self>(name)),
        }
        Ok(())
    }

    fn update(&mut self, cx: &TickContext<'_>) {
        self.steer(cx);

        let dt = cx.time.dt();
        self.x = (self.x + self.velocity.0 * dt).clamp(0.0, WORLD_WIDTH - MOVER_SIZE);
        self.y = (self.y + self.velocity.1 * dt).clamp(0.0, WORLD_HEIGHT - MOVER_SIZE);
    }
}

/// Registry layout of the demo game. Server and clients must build their
/// registries from the same layout so that row indices agree.
pub fn demo_builder(config: SyncConfig) -> EcsBuilder {
    EcsBuilder::with_config(config).register::<Mover>()
}
