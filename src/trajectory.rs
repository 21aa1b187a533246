// Trajectory recording for post-hoc plotting

use crate::demo::DemoError;
use chrono::{DateTime, Utc};
use log::info;
use nalgebra::Vector3;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct TrajectoryLog {
    started_at: DateTime<Utc>,
    dt: f64,
    ee_path: Vec<Vector3<f64>>,
    target_path: Vec<Vector3<f64>>,
}

#[derive(Serialize)]
struct TrajectoryRecord<'a> {
    started_at: &'a DateTime<Utc>,
    dt: f64,
    steps: usize,
    ee_path: Vec<[f64; 3]>,
    target_path: Vec<[f64; 3]>,
}

impl TrajectoryLog {
    pub fn new(dt: f64) -> Self {
        Self { started_at: Utc::now(), dt, ee_path: Vec::new(), target_path: Vec::new() }
    }

    pub fn record(&mut self, ee: Vector3<f64>, target: Vector3<f64>) {
        self.ee_path.push(ee);
        self.target_path.push(target);
    }

    pub fn len(&self) -> usize {
        self.ee_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ee_path.is_empty()
    }

    pub fn ee_path(&self) -> &[Vector3<f64>] {
        &self.ee_path
    }

    pub fn target_path(&self) -> &[Vector3<f64>] {
        &self.target_path
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), DemoError> {
        let record = TrajectoryRecord {
            started_at: &self.started_at,
            dt: self.dt,
            steps: self.len(),
            ee_path: self.ee_path.iter().map(|v| [v.x, v.y, v.z]).collect(),
            target_path: self.target_path.iter().map(|v| [v.x, v.y, v.z]).collect(),
        };
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(&mut writer, &record)?;
        writer.flush()?;
        info!("Wrote {} samples to {}", self.len(), path.as_ref().display());
        Ok(())
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        writeln!(writer, "step,ee_x,ee_y,ee_z,target_x,target_y,target_z")?;
        for (step, (ee, target)) in self.ee_path.iter().zip(&self.target_path).enumerate() {
            writeln!(
                writer,
                "{},{},{},{},{},{},{}",
                step, ee.x, ee.y, ee.z, target.x, target.y, target.z
            )?;
        }
        writer.flush()?;
        info!("Wrote {} samples to {}", self.len(), path.as_ref().display());
        Ok(())
    }
}
