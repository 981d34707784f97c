use log::info;
use macroquad::prelude::{
    clear_background, draw_circle, draw_circle_lines, draw_rectangle, draw_rectangle_lines,
    draw_text, measure_text, screen_height, screen_width, Color, BLACK, WHITE,
};
use serde_json::Value;
use shared::{Scores, Snapshot};

/// Seconds the table takes to move from one resting layout to the next.
pub const SHOT_ANIMATION_SECONDS: f32 = 1.0;

const DEFAULT_BALL_RADIUS: f32 = 0.028575;
const POCKETED_STATE: u64 = 4;

/// Everything the session asks of whatever draws the match.
pub trait RenderAdapter {
    /// A new authoritative snapshot was adopted.
    fn replace_snapshot(&mut self, snapshot: &Snapshot);
    fn set_active_player(&mut self, player: &str);
    fn show_scores(&mut self, scores: &Scores);
    fn show_game_over(&mut self, winner: Option<&str>);
    fn hide_game_over(&mut self);
    /// Animate from the previous snapshot to the current one, then settle.
    fn play_shot_animation(&mut self);
}

pub fn score_line(scores: &Scores) -> String {
    scores
        .iter()
        .map(|(name, score)| format!("{}: {}", name.to_uppercase(), score))
        .collect::<Vec<_>>()
        .join(" vs. ")
}

pub fn turn_line(player: &str) -> String {
    format!("Active player: {}", player.to_uppercase())
}

pub fn game_over_line(winner: Option<&str>) -> String {
    match winner {
        Some(winner) => format!("GAME OVER! {} WON!", winner.to_uppercase()),
        None => "GAME OVER!".to_string(),
    }
}

/// Text shown on top of the table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    pub scores: String,
    pub turn: String,
    pub banner: Option<String>,
}

/// Headless adapter that narrates the match through the log.
#[derive(Debug, Default)]
pub struct ConsoleRenderer {
    overlay: Overlay,
    snapshots: u64,
    shots_played: u64,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn snapshots(&self) -> u64 {
        self.snapshots
    }

    pub fn shots_played(&self) -> u64 {
        self.shots_played
    }
}

impl RenderAdapter for ConsoleRenderer {
    fn replace_snapshot(&mut self, snapshot: &Snapshot) {
        self.snapshots += 1;
        info!("Snapshot {} received (t = {:.2})", self.snapshots, snapshot.time());
    }

    fn set_active_player(&mut self, player: &str) {
        self.overlay.turn = turn_line(player);
        info!("{}", self.overlay.turn);
    }

    fn show_scores(&mut self, scores: &Scores) {
        self.overlay.scores = score_line(scores);
        info!("{}", self.overlay.scores);
    }

    fn show_game_over(&mut self, winner: Option<&str>) {
        let banner = game_over_line(winner);
        info!("{}", banner);
        self.overlay.banner = Some(banner);
    }

    fn hide_game_over(&mut self) {
        self.overlay.banner = None;
    }

    fn play_shot_animation(&mut self) {
        self.shots_played += 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BallMarker {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

/// Table geometry and ball positions pulled out of a snapshot.
///
/// Reading is best-effort: missing or odd fields fall back to defaults and
/// unreadable balls are skipped, since the snapshot layout is not ours.
#[derive(Debug, Clone, PartialEq)]
pub struct TableLayout {
    pub width: f32,
    pub length: f32,
    pub balls: Vec<BallMarker>,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            width: 1.27,
            length: 2.54,
            balls: Vec::new(),
        }
    }
}

impl TableLayout {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let raw = snapshot.raw();
        let defaults = TableLayout::default();

        let width = read_f32(&raw["table"]["w"]).unwrap_or(defaults.width);
        let length = read_f32(&raw["table"]["l"]).unwrap_or(defaults.length);

        let mut balls: Vec<BallMarker> = raw["balls"]
            .as_object()
            .map(|balls| {
                balls
                    .iter()
                    .filter_map(|(id, ball)| read_ball(id, ball))
                    .collect()
            })
            .unwrap_or_default();
        balls.sort_by(|a, b| a.id.cmp(&b.id));

        Self {
            width,
            length,
            balls,
        }
    }

    /// Positions part way between `self` and `to`, matched by ball id.
    pub fn interpolate(&self, to: &TableLayout, progress: f32) -> Vec<BallMarker> {
        let progress = progress.clamp(0.0, 1.0);
        to.balls
            .iter()
            .map(|end| match self.balls.iter().find(|start| start.id == end.id) {
                Some(start) => BallMarker {
                    id: end.id.clone(),
                    x: start.x + (end.x - start.x) * progress,
                    y: start.y + (end.y - start.y) * progress,
                    radius: end.radius,
                },
                None => end.clone(),
            })
            .collect()
    }
}

fn read_f32(value: &Value) -> Option<f32> {
    value.as_f64().map(|v| v as f32)
}

fn read_ball(id: &str, ball: &Value) -> Option<BallMarker> {
    let state = &ball["state"];
    if state["s"].as_u64() == Some(POCKETED_STATE) {
        return None;
    }

    let position = &state["rvw"][0];
    Some(BallMarker {
        id: id.to_string(),
        x: read_f32(&position[0])?,
        y: read_f32(&position[1])?,
        radius: read_f32(&ball["params"]["R"]).unwrap_or(DEFAULT_BALL_RADIUS),
    })
}

/// Top-down table drawn with macroquad.
#[derive(Debug, Default)]
pub struct TableRenderer {
    overlay: Overlay,
    resting: Option<TableLayout>,
    target: Option<TableLayout>,
    animation: Option<f32>,
}

impl TableRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Advances a running shot animation by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        let Some(elapsed) = self.animation.as_mut() else {
            return;
        };

        *elapsed += dt;
        if *elapsed >= SHOT_ANIMATION_SECONDS {
            self.animation = None;
            if let Some(target) = self.target.take() {
                self.resting = Some(target);
            }
        }
    }

    /// Layout currently on screen.
    pub fn displayed(&self) -> Option<(f32, f32, Vec<BallMarker>)> {
        let resting = self.resting.as_ref()?;
        let balls = match (self.animation, self.target.as_ref()) {
            (Some(elapsed), Some(target)) => {
                resting.interpolate(target, elapsed / SHOT_ANIMATION_SECONDS)
            }
            _ => resting.balls.clone(),
        };
        Some((resting.width, resting.length, balls))
    }

    pub fn draw(&self) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        if let Some((width, length, balls)) = self.displayed() {
            self.draw_table(width, length, &balls);
        }

        self.draw_overlay();
    }

    fn draw_table(&self, width: f32, length: f32, balls: &[BallMarker]) {
        let margin = 40.0;
        let scale = ((screen_width() - 2.0 * margin) / width)
            .min((screen_height() - 2.0 * margin) / length);
        let origin_x = (screen_width() - width * scale) / 2.0;
        let origin_y = (screen_height() - length * scale) / 2.0;
        let rail = 12.0;

        draw_rectangle(
            origin_x - rail,
            origin_y - rail,
            width * scale + 2.0 * rail,
            length * scale + 2.0 * rail,
            Color::from_rgba(92, 51, 23, 255),
        );
        draw_rectangle(
            origin_x,
            origin_y,
            width * scale,
            length * scale,
            Color::from_rgba(20, 110, 60, 255),
        );

        for ball in balls {
            // Table y grows away from the viewer; screen y grows downwards.
            let x = origin_x + ball.x * scale;
            let y = origin_y + (length - ball.y) * scale;
            let radius = (ball.radius * scale).max(3.0);
            draw_circle(x, y, radius, ball_color(&ball.id));
            draw_circle_lines(x, y, radius, 1.0, BLACK);
        }
    }

    fn draw_overlay(&self) {
        let text_color = Color::from_rgba(230, 0, 0, 255);
        let backdrop = Color::from_rgba(235, 212, 173, 200);

        if !self.overlay.scores.is_empty() {
            let size = measure_text(&self.overlay.scores, None, 32, 1.0);
            draw_rectangle(10.0, 10.0, size.width + 20.0, size.height + 16.0, backdrop);
            draw_text(&self.overlay.scores, 20.0, 18.0 + size.offset_y, 32.0, text_color);
        }

        if !self.overlay.turn.is_empty() {
            let size = measure_text(&self.overlay.turn, None, 32, 1.0);
            let x = screen_width() - size.width - 30.0;
            let y = screen_height() - size.height - 26.0;
            draw_rectangle(x - 10.0, y - 8.0, size.width + 20.0, size.height + 16.0, backdrop);
            draw_text(&self.overlay.turn, x, y + size.offset_y, 32.0, text_color);
        }

        if let Some(banner) = &self.overlay.banner {
            let size = measure_text(banner, None, 64, 1.0);
            let x = (screen_width() - size.width) / 2.0;
            let y = (screen_height() - size.height) / 2.0;
            draw_rectangle(x - 20.0, y - 12.0, size.width + 40.0, size.height + 24.0, backdrop);
            draw_rectangle_lines(x - 20.0, y - 12.0, size.width + 40.0, size.height + 24.0, 2.0, WHITE);
            draw_text(banner, x, y + size.offset_y, 64.0, text_color);
        }
    }
}

fn ball_color(id: &str) -> Color {
    let Ok(number) = id.parse::<u32>() else {
        return WHITE;
    };

    match number % 8 {
        1 => Color::from_rgba(250, 200, 20, 255),
        2 => Color::from_rgba(20, 60, 200, 255),
        3 => Color::from_rgba(210, 30, 30, 255),
        4 => Color::from_rgba(110, 30, 150, 255),
        5 => Color::from_rgba(250, 120, 20, 255),
        6 => Color::from_rgba(20, 130, 60, 255),
        7 => Color::from_rgba(120, 20, 30, 255),
        _ => Color::from_rgba(15, 15, 15, 255),
    }
}

impl RenderAdapter for TableRenderer {
    fn replace_snapshot(&mut self, snapshot: &Snapshot) {
        let layout = TableLayout::from_snapshot(snapshot);
        // A shot still in flight freezes where it is; the next animation
        // starts from there.
        if let Some(elapsed) = self.animation.take() {
            let frozen = match (self.resting.as_ref(), self.target.as_ref()) {
                (Some(resting), Some(target)) => Some(TableLayout {
                    width: target.width,
                    length: target.length,
                    balls: resting.interpolate(target, elapsed / SHOT_ANIMATION_SECONDS),
                }),
                _ => None,
            };
            if frozen.is_some() {
                self.resting = frozen;
            }
        }
        if self.resting.is_none() {
            self.resting = Some(layout.clone());
        }
        self.target = Some(layout);
    }

    fn set_active_player(&mut self, player: &str) {
        self.overlay.turn = turn_line(player);
    }

    fn show_scores(&mut self, scores: &Scores) {
        self.overlay.scores = score_line(scores);
    }

    fn show_game_over(&mut self, winner: Option<&str>) {
        self.overlay.banner = Some(game_over_line(winner));
    }

    fn hide_game_over(&mut self) {
        self.overlay.banner = None;
    }

    fn play_shot_animation(&mut self) {
        if self.target.is_some() {
            self.animation = Some(0.0);
        }
    }
}
