// Headless display state: overlays, target marker, arm pose and pointer input

use log::{debug, info};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickMode {
    Target,
    Obstacle,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub xyz: Vector3<f64>,
    pub radius: f64,
}

pub struct Display {
    circles: Vec<Circle>,
    target: Option<Vector3<f64>>,
    arm: Vec<Vector3<f64>>,
    mouse: (f64, f64),
    on_click: ClickMode,
}

impl Display {
    pub fn new(on_click: ClickMode) -> Self {
        Self { circles: Vec::new(), target: None, arm: Vec::new(), mouse: (0.0, 0.0), on_click }
    }

    pub fn add_circle(&mut self, xyz: Vector3<f64>, radius: f64) -> usize {
        self.circles.push(Circle { xyz, radius });
        debug!("Added circle {} at {:?} r={}", self.circles.len() - 1, xyz.as_slice(), radius);
        self.circles.len() - 1
    }

    pub fn circles(&self) -> &[Circle] {
        &self.circles
    }

    pub fn set_target(&mut self, xyz: Vector3<f64>) {
        self.target = Some(xyz);
    }

    pub fn target(&self) -> Option<Vector3<f64>> {
        self.target
    }

    pub fn set_arm(&mut self, points: Vec<Vector3<f64>>) {
        self.arm = points;
    }

    // Joint origins followed by the end effector, as last drawn.
    pub fn arm(&self) -> &[Vector3<f64>] {
        &self.arm
    }

    pub fn get_mousexy(&self) -> (f64, f64) {
        self.mouse
    }

    pub fn set_mousexy(&mut self, x: f64, y: f64) {
        self.mouse = (x, y);
    }

    pub fn on_click(&self) -> ClickMode {
        self.on_click
    }

    pub fn click(&mut self, x: f64, y: f64) {
        self.mouse = (x, y);
        match self.on_click {
            ClickMode::Target => {
                self.target = Some(Vector3::new(x, y, 0.0));
                info!("Target moved to ({:.3}, {:.3})", x, y);
            }
            ClickMode::Obstacle => {
                if let Some(circle) = self.circles.first_mut() {
                    circle.xyz = Vector3::new(x, y, 0.0);
                    info!("Obstacle moved to ({:.3}, {:.3})", x, y);
                }
            }
            ClickMode::None => {}
        }
    }
}

// Clicks replayed at fixed simulation times, in place of a user at the screen.
#[derive(Debug, Clone)]
pub struct PointerScript {
    clicks: Vec<(f64, f64, f64)>,
    next: usize,
}

impl PointerScript {
    // `clicks` are `(time, x, y)`; they are replayed in time order.
    pub fn new(mut clicks: Vec<(f64, f64, f64)>) -> Self {
        clicks.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { clicks, next: 0 }
    }

    // Clicks due at or before `time` that have not been replayed yet.
    pub fn poll(&mut self, time: f64) -> Vec<(f64, f64)> {
        let mut due = Vec::new();
        while let Some(&(t, x, y)) = self.clicks.get(self.next) {
            if t > time {
                break;
            }
            due.push((x, y));
            self.next += 1;
        }
        due
    }

    pub fn remaining(&self) -> usize {
        self.clicks.len() - self.next
    }

    pub fn rewind(&mut self) {
        self.next = 0;
    }
}
