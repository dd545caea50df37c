// THEORY:
// The `table` module simulates a single ball over a regulation table, seen from
// the side: `x` runs along the table's length (0 at the near end, TABLE_WIDTH at
// the far end) and `y` is height above the playing surface, pointing up. Units
// are centimetres and seconds.
//
// The model is deliberately small. Gravity pulls the ball down, the table surface
// reflects it with energy loss, and a racket swing is an instantaneous impulse.
// There is no racket geometry, no spin and no air drag. The step is explicit
// Euler and fully determined by `(state, dt)`.
//
// Phases:
// - `Serving`: the ball rests at the serve point and nothing moves.
// - `InPlay`: the first successful swing launches the ball; gravity and bounces
//   apply from then on.
// Leaving the bounding volume around the table returns to `Serving`, as does an
// explicit `init()`.
//
// For drawing, the ball is projected top-down onto the table rectangle (which is
// TABLE_WIDTH by TABLE_HEIGHT in warp source space): it travels along the centre
// line, and its height shows as a shadow offset and a larger disc.

use crate::core_modules::surface::{Color, Rect, Surface, WHITE};
use image::Rgba;
use nalgebra::{Matrix3, Point2, Vector2};

/// Table length in centimetres (2.74 m).
pub const TABLE_WIDTH: f64 = 274.0;
/// Table width in centimetres (1.525 m); the second axis of the drawn rectangle.
pub const TABLE_HEIGHT: f64 = 152.0;

pub const GRAVITY: f64 = 981.0;
pub const RESTITUTION: f64 = 0.85;
pub const BALL_RADIUS: f64 = 2.0;
pub const SERVE_HEIGHT: f64 = 30.0;
pub const SWING_IMPULSE_X: f64 = 180.0;
pub const SWING_LIFT_Y: f64 = 250.0;
pub const SWING_COOLDOWN: f64 = 0.5;

/// How far past either end the ball may fly before the rally is over.
pub const OUT_OF_BOUNDS_MARGIN: f64 = TABLE_WIDTH * 0.5;
/// Depth of the floor below the playing surface.
pub const FLOOR_DEPTH: f64 = 76.0;

const TABLE_COLOR: Color = Rgba([20, 70, 140, 255]);
const SHADOW_COLOR: Color = Rgba([0, 0, 0, 110]);
const BALL_COLOR: Color = Rgba([255, 150, 30, 255]);
const HEIGHT_SCALE: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    pub position: Point2<f64>,
    pub velocity: Vector2<f64>,
    pub radius: f64,
}

impl Ball {
    pub fn at_serve() -> Self {
        Self {
            position: Table::serve_position(),
            velocity: Vector2::zeros(),
            radius: BALL_RADIUS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Serving,
    InPlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwingDirection {
    Positive,
    Negative,
}

impl SwingDirection {
    pub fn sign(self) -> f64 {
        match self {
            SwingDirection::Positive => 1.0,
            SwingDirection::Negative => -1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    ball: Ball,
    phase: Phase,
    cooldown: f64,
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Table {
    pub fn new() -> Self {
        Self {
            ball: Ball::at_serve(),
            phase: Phase::Serving,
            cooldown: 0.0,
        }
    }

    pub fn serve_position() -> Point2<f64> {
        Point2::new(TABLE_WIDTH * 0.5, SERVE_HEIGHT)
    }

    pub fn source_rect() -> Rect {
        Rect::new(0.0, 0.0, TABLE_WIDTH, TABLE_HEIGHT)
    }

    pub fn ball(&self) -> &Ball {
        &self.ball
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn cooldown_remaining(&self) -> f64 {
        self.cooldown
    }

    /// Back to the serve point, at rest. The swing cooldown is cleared as well so
    /// a fresh serve is always possible.
    pub fn init(&mut self) {
        self.ball = Ball::at_serve();
        self.phase = Phase::Serving;
        self.cooldown = 0.0;
    }

    pub fn update(&mut self, dt: f64) {
        self.cooldown = (self.cooldown - dt).max(0.0);
        if self.phase == Phase::Serving {
            return;
        }

        let ball = &mut self.ball;
        let prev_y = ball.position.y;
        ball.velocity.y -= GRAVITY * dt;
        ball.position += ball.velocity * dt;

        let over_table = (0.0..=TABLE_WIDTH).contains(&ball.position.x);
        let crossed_surface = prev_y >= ball.radius && ball.position.y < ball.radius;
        if over_table && ball.velocity.y < 0.0 && crossed_surface {
            ball.position.y = ball.radius;
            ball.velocity.y = -ball.velocity.y * RESTITUTION;
            tracing::trace!(vy = ball.velocity.y, "bounce");
        }

        if self.out_of_bounds() {
            let p = self.ball.position;
            tracing::debug!(x = p.x, y = p.y, "ball out of bounds, serving again");
            self.init();
        }
    }

    fn out_of_bounds(&self) -> bool {
        let p = self.ball.position;
        p.x < -OUT_OF_BOUNDS_MARGIN
            || p.x > TABLE_WIDTH + OUT_OF_BOUNDS_MARGIN
            || p.y < -FLOOR_DEPTH
    }

    /// Applies one racket impulse. Returns `false` and does nothing while the
    /// previous swing is still cooling down.
    pub fn swing_racket(&mut self, direction: SwingDirection) -> bool {
        if self.cooldown > 0.0 {
            return false;
        }
        self.ball.velocity.x += SWING_IMPULSE_X * direction.sign();
        self.ball.velocity.y += SWING_LIFT_Y;
        self.phase = Phase::InPlay;
        self.cooldown = SWING_COOLDOWN;
        true
    }

    /// Draws the table and ball in table space, mapped through `transform`.
    pub fn draw(&self, surface: &mut dyn Surface, transform: &Matrix3<f64>) {
        surface.push_transform(transform);

        let rect = Self::source_rect();
        surface.set_color(TABLE_COLOR);
        surface.rect(&rect, true);
        surface.set_color(WHITE);
        surface.rect(&rect, false);
        surface.line(
            Point2::new(0.0, TABLE_HEIGHT * 0.5),
            Point2::new(TABLE_WIDTH, TABLE_HEIGHT * 0.5),
        );
        surface.line(
            Point2::new(TABLE_WIDTH * 0.5, 0.0),
            Point2::new(TABLE_WIDTH * 0.5, TABLE_HEIGHT),
        );

        let ball = &self.ball;
        let height = (ball.position.y - ball.radius).max(0.0);
        let ground = Point2::new(ball.position.x, TABLE_HEIGHT * 0.5);
        surface.set_color(SHADOW_COLOR);
        surface.circle(ground, ball.radius, true);
        surface.set_color(BALL_COLOR);
        surface.circle(
            Point2::new(ground.x, ground.y - height * 0.5),
            ball.radius * (1.0 + height * HEIGHT_SCALE),
            true,
        );

        surface.pop_transform();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DT: f64 = 5.0 / 60.0;

    #[test]
    fn init_is_idempotent_from_any_state() {
        let mut table = Table::new();
        table.swing_racket(SwingDirection::Positive);
        for _ in 0..3 {
            table.update(DT);
        }
        table.init();
        let first = *table.ball();
        table.init();
        assert_eq!(*table.ball(), first);
        assert_eq!(first.position, Table::serve_position());
        assert_eq!(first.velocity, Vector2::zeros());
        assert_eq!(table.phase(), Phase::Serving);
    }

    #[test]
    fn serving_ball_does_not_move() {
        let mut table = Table::new();
        table.update(DT);
        table.update(DT);
        assert_eq!(table.ball().position, Table::serve_position());
    }

    #[test]
    fn second_swing_inside_cooldown_is_dropped() {
        let mut table = Table::new();
        assert!(table.swing_racket(SwingDirection::Positive));
        assert!(!table.swing_racket(SwingDirection::Negative));
        assert_eq!(table.ball().velocity, Vector2::new(SWING_IMPULSE_X, SWING_LIFT_Y));
    }

    #[test]
    fn swing_is_available_again_after_cooldown() {
        let mut table = Table::new();
        assert!(table.swing_racket(SwingDirection::Negative));
        for _ in 0..7 {
            table.update(DT);
        }
        assert_eq!(table.cooldown_remaining(), 0.0);
        assert!(table.swing_racket(SwingDirection::Negative));
    }

    #[test]
    fn bounce_reflects_with_restitution_and_clamps_to_surface() {
        let mut table = Table::new();
        table.phase = Phase::InPlay;
        table.ball.position = Point2::new(100.0, BALL_RADIUS + 1.0);
        table.ball.velocity = Vector2::new(0.0, -300.0);
        let dt = 0.01;
        let v_impact = -300.0 - GRAVITY * dt;
        table.update(dt);
        assert_relative_eq!(table.ball().position.y, BALL_RADIUS);
        assert_relative_eq!(table.ball().velocity.y, -v_impact * RESTITUTION, epsilon = 1e-9);
    }

    #[test]
    fn no_bounce_beyond_table_end() {
        let mut table = Table::new();
        table.phase = Phase::InPlay;
        table.ball.position = Point2::new(TABLE_WIDTH + 20.0, BALL_RADIUS + 1.0);
        table.ball.velocity = Vector2::new(0.0, -300.0);
        table.update(0.01);
        assert!(table.ball().position.y < BALL_RADIUS);
        assert!(table.ball().velocity.y < 0.0);
    }

    #[test]
    fn leaving_bounds_returns_to_serve() {
        let mut table = Table::new();
        table.phase = Phase::InPlay;
        table.ball.position = Point2::new(TABLE_WIDTH + OUT_OF_BOUNDS_MARGIN - 1.0, 50.0);
        table.ball.velocity = Vector2::new(600.0, 0.0);
        table.update(DT);
        assert_eq!(table.phase(), Phase::Serving);
        assert_eq!(table.ball().position, Table::serve_position());
    }

    #[test]
    fn falling_past_the_floor_returns_to_serve() {
        let mut table = Table::new();
        table.phase = Phase::InPlay;
        table.ball.position = Point2::new(TABLE_WIDTH + 20.0, -FLOOR_DEPTH + 1.0);
        table.ball.velocity = Vector2::new(0.0, -300.0);
        table.update(0.1);
        assert_eq!(table.phase(), Phase::Serving);
        assert_eq!(table.ball().position, Table::serve_position());
    }

    #[test]
    fn just_above_the_floor_stays_in_play() {
        let mut table = Table::new();
        table.phase = Phase::InPlay;
        table.ball.position = Point2::new(TABLE_WIDTH + 20.0, -FLOOR_DEPTH + 10.0);
        table.ball.velocity = Vector2::zeros();
        table.update(0.01);
        assert_eq!(table.phase(), Phase::InPlay);
    }

    #[test]
    fn update_is_deterministic() {
        let mut a = Table::new();
        let mut b = Table::new();
        a.swing_racket(SwingDirection::Positive);
        b.swing_racket(SwingDirection::Positive);
        for _ in 0..20 {
            a.update(DT);
            b.update(DT);
        }
        assert_eq!(a.ball(), b.ball());
    }
}
