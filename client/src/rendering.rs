use crate::game::ClientEcs;
use macroquad::prelude::*;
use shared::{Mover, MOVER_SIZE, WORLD_HEIGHT, WORLD_WIDTH};

#[derive(Debug, Clone)]
pub struct HudInfo {
    pub client_id: Option<String>,
    pub entity_count: usize,
    pub pending_inputs: usize,
    pub outbox: usize,
    pub round_trip_ms: Option<u64>,
    pub fake_ping_ms: u64,
}

impl HudInfo {
    pub fn from_game(game: Option<&ClientEcs>, fake_ping_ms: u64) -> Self {
        let Some(game) = game else {
            return Self {
                client_id: None,
                entity_count: 0,
                pending_inputs: 0,
                outbox: 0,
                round_trip_ms: None,
                fake_ping_ms,
            };
        };

        let pending_inputs = game
            .local_entities()
            .iter()
            .filter_map(|id| {
                let row = game.ecs().row_of::<Mover>().ok()?;
                game.ecs().pending_inputs(id, row)
            })
            .max()
            .unwrap_or(0);

        Self {
            client_id: Some(game.client_id().to_string()),
            entity_count: game.ecs().len(),
            pending_inputs,
            outbox: game.pending_outgoing(),
            round_trip_ms: game.round_trip().map(|rtt| (rtt * 1000.0).round() as u64),
            fake_ping_ms,
        }
    }

    /// Colour of the latency bars for a total round trip in milliseconds
    pub fn latency_color(total_ms: u64) -> Color {
        if total_ms < 50 {
            GREEN
        } else if total_ms < 100 {
            YELLOW
        } else {
            RED
        }
    }
}

pub struct Renderer {
    width: f32,
    height: f32,
}

impl Renderer {
    pub fn new(width: usize, height: usize) -> Self {
        Renderer {
            width: width as f32,
            height: height as f32,
        }
    }

    pub fn render(&mut self, game: Option<&ClientEcs>, hud: &HudInfo) {
        clear_background(Color::from_rgba(26, 26, 26, 255));
        self.draw_world_bounds();

        if let Some(game) = game {
            for (id, mover) in game.ecs().components_of::<Mover>() {
                let is_local = game
                    .ecs()
                    .entity(id)
                    .and_then(|entity| entity.owner())
                    .is_some_and(|owner| owner == game.client_id());
                let color = if is_local {
                    GREEN
                } else {
                    Color::from_rgba(255, 68, 68, 255)
                };
                self.draw_mover(mover, color);
                self.draw_label(id, mover);
            }
        }

        self.draw_ui(hud);
    }

    fn scale(&self) -> (f32, f32) {
        (
            self.width / WORLD_WIDTH as f32,
            self.height / WORLD_HEIGHT as f32,
        )
    }

    fn draw_world_bounds(&mut self) {
        draw_rectangle_lines(
            0.0,
            0.0,
            self.width,
            self.height,
            2.0,
            Color::from_rgba(68, 68, 68, 255),
        );
    }

    fn draw_mover(&mut self, mover: &Mover, color: Color) {
        let (sx, sy) = self.scale();
        let x = mover.x as f32 * sx;
        let y = mover.y as f32 * sy;
        let w = MOVER_SIZE as f32 * sx;
        let h = MOVER_SIZE as f32 * sy;

        draw_rectangle(x, y, w, h, color);
        draw_rectangle_lines(x, y, w, h, 2.0, WHITE);

        let (vx, vy) = mover.velocity;
        if vx != 0.0 || vy != 0.0 {
            let cx = x + w / 2.0;
            let cy = y + h / 2.0;
            draw_line(cx, cy, cx + vx as f32 * 0.15, cy + vy as f32 * 0.15, 2.0, YELLOW);
        }
    }

    fn draw_label(&mut self, id: &str, mover: &Mover) {
        let (sx, sy) = self.scale();
        draw_text(id, mover.x as f32 * sx, mover.y as f32 * sy - 6.0, 14.0, WHITE);
    }

    fn draw_ui(&mut self, hud: &HudInfo) {
        let y_start = 10.0;

        let connection_color = if hud.client_id.is_some() { GREEN } else { RED };
        draw_rectangle(10.0, y_start, 8.0, 8.0, connection_color);
        let label = hud.client_id.as_deref().unwrap_or("connecting...");
        draw_text(label, 22.0, y_start + 8.0, 14.0, WHITE);

        let ping_y = y_start + 16.0;
        let total_ping = hud.round_trip_ms.unwrap_or(0) + hud.fake_ping_ms;
        let ping_bars = ((total_ping / 20).min(10)) as i32;
        for i in 0..10i32 {
            let bar_color = if i < ping_bars {
                HudInfo::latency_color(total_ping)
            } else {
                Color::from_rgba(51, 51, 51, 255)
            };
            draw_rectangle(10.0 + (i as f32) * 3.0, ping_y, 2.0, 8.0, bar_color);
        }
        let ping_text = match hud.round_trip_ms {
            Some(rtt) => format!("rtt {}ms (fake {}ms)", rtt, hud.fake_ping_ms),
            None => format!("rtt ? (fake {}ms)", hud.fake_ping_ms),
        };
        draw_text(&ping_text, 45.0, ping_y + 8.0, 12.0, WHITE);

        let stats = format!(
            "entities {}  unacked {}  outbox {}",
            hud.entity_count, hud.pending_inputs, hud.outbox
        );
        draw_text(&stats, 10.0, ping_y + 24.0, 12.0, WHITE);

        draw_text(
            "Arrows/WASD: move  Esc: quit",
            10.0,
            self.height - 10.0,
            12.0,
            Color::from_rgba(136, 136, 136, 255),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{demo_builder, SyncConfig};

    #[test]
    fn test_hud_before_connect() {
        let hud = HudInfo::from_game(None, 80);
        assert!(hud.client_id.is_none());
        assert_eq!(hud.entity_count, 0);
        assert_eq!(hud.fake_ping_ms, 80);
    }

    #[test]
    fn test_hud_reads_game_state() {
        let game = ClientEcs::new(demo_builder(SyncConfig::default()), "client-1", 0.0);
        let hud = HudInfo::from_game(Some(&game), 0);
        assert_eq!(hud.client_id.as_deref(), Some("client-1"));
        assert_eq!(hud.outbox, 0);
        assert!(hud.round_trip_ms.is_none());
    }

    #[test]
    fn test_latency_color_bands() {
        assert_eq!(HudInfo::latency_color(10), GREEN);
        assert_eq!(HudInfo::latency_color(75), YELLOW);
        assert_eq!(HudInfo::latency_color(150), RED);
    }
}
