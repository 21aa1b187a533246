use nalgebra::{DVector, Vector3};
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use threelink_osc::arm::{ArmConfig, ArmError, Frame};
use threelink_osc::avoid::{Obstacle, Signal};
use threelink_osc::config::DemoConfig;
use threelink_osc::controller::Controller;
use threelink_osc::demo::{DemoError, ObstacleAvoidanceDemo};
use threelink_osc::display::{ClickMode, Display};
use threelink_osc::interface::{Feedback, Interface, SimError};

type Events = Rc<RefCell<Vec<&'static str>>>;

const Q: [f64; 3] = [0.4, 0.8, 0.5];

struct MockInterface {
    display: Display,
    events: Events,
    connects: usize,
    disconnects: usize,
    applied: Vec<Vec<f64>>,
    targets: Vec<Vector3<f64>>,
    stop_after: Option<(usize, Arc<AtomicBool>)>,
    fail_at: Option<usize>,
    click_after: Option<(usize, f64, f64)>,
}

impl MockInterface {
    fn new(events: Events) -> Self {
        Self {
            display: Display::new(ClickMode::Obstacle),
            events,
            connects: 0,
            disconnects: 0,
            applied: Vec::new(),
            targets: Vec::new(),
            stop_after: None,
            fail_at: None,
            click_after: None,
        }
    }
}

impl Interface for MockInterface {
    fn connect(&mut self) -> Result<(), SimError> {
        self.connects += 1;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), SimError> {
        self.disconnects += 1;
        Ok(())
    }

    fn get_feedback(&mut self) -> Result<Feedback, SimError> {
        self.events.borrow_mut().push("feedback");
        Ok(Feedback { q: DVector::from_column_slice(&Q), dq: DVector::zeros(3) })
    }

    fn apply_u(&mut self, u: &[f64]) -> Result<(), SimError> {
        self.events.borrow_mut().push("apply");
        if self.fail_at == Some(self.applied.len()) {
            return Err(SimError::InvalidControl("mock failure".to_string()));
        }
        self.applied.push(u.to_vec());
        if let Some((after, x, y)) = self.click_after {
            if self.applied.len() == after {
                self.display.click(x, y);
            }
        }
        if let Some((after, stop)) = &self.stop_after {
            if self.applied.len() >= *after {
                stop.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    fn set_target(&mut self, xyz: &Vector3<f64>) -> Result<(), SimError> {
        self.targets.push(*xyz);
        Ok(())
    }

    fn display(&self) -> &Display {
        &self.display
    }

    fn display_mut(&mut self) -> &mut Display {
        &mut self.display
    }
}

struct MockController {
    events: Events,
    outputs: Vec<DVector<f64>>,
    panic_at: Option<usize>,
}

impl Controller for MockController {
    fn control(
        &mut self,
        q: &[f64],
        _dq: &[f64],
        target_state: &[f64],
    ) -> Result<DVector<f64>, ArmError> {
        self.events.borrow_mut().push("control");
        assert_eq!(target_state.len(), 6);
        assert_eq!(&target_state[3..], &[0.0, 0.0, 0.0]);
        if self.panic_at == Some(self.outputs.len()) {
            panic!("controller blew up");
        }
        let n = self.outputs.len() as f64 + 1.0;
        let u = DVector::from_vec(vec![n, 2.0 * n + q[0], -3.0 * n]);
        self.outputs.push(u.clone());
        Ok(u)
    }
}

struct MockSignal {
    events: Events,
    outputs: Vec<DVector<f64>>,
    obstacles: Vec<Obstacle>,
}

impl Signal for MockSignal {
    fn generate(&mut self, q: &[f64], obstacles: &[Obstacle]) -> Result<DVector<f64>, ArmError> {
        self.events.borrow_mut().push("signal");
        self.obstacles.extend_from_slice(obstacles);
        let n = self.outputs.len() as f64;
        let u = DVector::from_vec(vec![0.5, -1.0 + q[1], 0.25 * n]);
        self.outputs.push(u.clone());
        Ok(u)
    }
}

fn hand() -> Vector3<f64> {
    ArmConfig::threelink().tx(Frame::EndEffector, &Q).unwrap()
}

fn mock_demo(
    config: DemoConfig,
) -> (ObstacleAvoidanceDemo<MockInterface, MockController, MockSignal>, Events) {
    let events: Events = Rc::new(RefCell::new(Vec::new()));
    let demo = ObstacleAvoidanceDemo::new(
        ArmConfig::threelink(),
        MockInterface::new(events.clone()),
        MockController { events: events.clone(), outputs: Vec::new(), panic_at: None },
        MockSignal { events: events.clone(), outputs: Vec::new(), obstacles: Vec::new() },
        config,
    );
    (demo, events)
}

fn quiet() -> DemoConfig {
    DemoConfig { seed: Some(11), log_every: 0, ..DemoConfig::default() }
}

#[test]
fn applied_control_is_sum_of_controller_and_signal() {
    let (mut demo, _) = mock_demo(quiet());
    let stop = AtomicBool::new(false);
    let summary = demo.run(&stop, Some(5)).unwrap();
    assert_eq!(summary.steps, 5);

    let applied = &demo.interface().applied;
    let ctrl = &demo.controller().outputs;
    let avoid = &demo.signal().outputs;
    assert_eq!(applied.len(), 5);
    for step in 0..5 {
        let expected = &ctrl[step] + &avoid[step];
        assert_eq!(applied[step], expected.as_slice().to_vec(), "step {}", step);
    }
}

#[test]
fn each_step_reads_computes_then_actuates() {
    let (mut demo, events) = mock_demo(quiet());
    let stop = AtomicBool::new(false);
    demo.run(&stop, Some(3)).unwrap();

    let expected: Vec<&str> =
        ["feedback", "control", "signal", "apply"].iter().cycle().take(12).copied().collect();
    assert_eq!(*events.borrow(), expected);
}

#[test]
fn obstacle_follows_the_pointer() {
    let (mut demo, _) = mock_demo(quiet());
    demo.interface_mut().click_after = Some((1, 0.3, 0.4));
    let stop = AtomicBool::new(false);
    demo.run(&stop, Some(2)).unwrap();
    assert_eq!(
        demo.signal().obstacles,
        vec![Obstacle::new(0.0, 0.0, 0.0, 0.2), Obstacle::new(0.3, 0.4, 0.0, 0.2)]
    );
    assert_eq!(demo.interface().display().circles()[0].xyz, Vector3::new(0.3, 0.4, 0.0));
}

#[test]
fn obstacle_starts_at_configured_position() {
    let config = DemoConfig { obstacle_xyz: [1.0, 1.0, 0.0], ..quiet() };
    let (mut demo, _) = mock_demo(config);
    let stop = AtomicBool::new(false);
    demo.run(&stop, Some(1)).unwrap();

    assert_eq!(demo.interface().display().circles()[0].xyz, Vector3::new(1.0, 1.0, 0.0));
    assert_eq!(demo.signal().obstacles, vec![Obstacle::new(1.0, 1.0, 0.0, 0.2)]);
}

#[test]
fn target_resampled_when_strictly_within_threshold() {
    let near = hand() + Vector3::new(0.004, 0.0, 0.0);
    let config = DemoConfig { initial_target: [near.x, near.y, near.z], ..quiet() };
    let (mut demo, _) = mock_demo(config);
    let stop = AtomicBool::new(false);
    let summary = demo.run(&stop, Some(10)).unwrap();

    let targets = &demo.interface().targets;
    assert_eq!(targets.len(), 2);
    assert_eq!(targets[0], near);
    assert_eq!(summary.targets_reached, 1);
    assert_eq!(summary.log.target_path()[0], targets[1]);
    assert!(summary.log.target_path().iter().all(|t| *t == targets[1]));
}

#[test]
fn target_kept_when_outside_threshold() {
    let far = hand() + Vector3::new(0.0, 0.006, 0.0);
    let config = DemoConfig { initial_target: [far.x, far.y, far.z], ..quiet() };
    let (mut demo, _) = mock_demo(config);
    let stop = AtomicBool::new(false);
    let summary = demo.run(&stop, Some(10)).unwrap();

    assert_eq!(demo.interface().targets, vec![far]);
    assert_eq!(summary.targets_reached, 0);
    assert!(summary.log.target_path().iter().all(|t| *t == far));
    assert!(summary.log.ee_path().iter().all(|h| *h == hand()));
}

#[test]
fn resampled_targets_lie_in_the_box() {
    let near = hand();
    for seed in 0..100 {
        let config = DemoConfig {
            initial_target: [near.x, near.y, near.z],
            seed: Some(seed),
            ..quiet()
        };
        let (mut demo, _) = mock_demo(config);
        let stop = AtomicBool::new(false);
        demo.run(&stop, Some(1)).unwrap();

        let target = demo.interface().targets[1];
        assert!((-1.0..=1.0).contains(&target.x), "seed {}: {:?}", seed, target);
        assert!((0.0..=2.0).contains(&target.y), "seed {}: {:?}", seed, target);
        assert_eq!(target.z, 0.0);
    }
}

#[test]
fn interruption_disconnects_exactly_once() {
    let (mut demo, _) = mock_demo(quiet());
    let stop = Arc::new(AtomicBool::new(false));
    demo.interface_mut().stop_after = Some((7, stop.clone()));
    let summary = demo.run(&stop, None).unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.steps, 7);
    assert_eq!(demo.interface().connects, 1);
    assert_eq!(demo.interface().disconnects, 1);
}

#[test]
fn interface_error_still_disconnects_once() {
    let (mut demo, _) = mock_demo(quiet());
    demo.interface_mut().fail_at = Some(3);
    let stop = AtomicBool::new(false);
    let result = demo.run(&stop, None);

    assert!(matches!(result, Err(DemoError::Sim(SimError::InvalidControl(_)))));
    assert_eq!(demo.interface().applied.len(), 3);
    assert_eq!(demo.interface().disconnects, 1);
}

#[test]
fn panic_in_controller_still_disconnects_once() {
    let (mut demo, _) = mock_demo(quiet());
    demo.controller_mut().panic_at = Some(2);
    let stop = AtomicBool::new(false);
    let result = catch_unwind(AssertUnwindSafe(|| demo.run(&stop, None)));

    assert!(result.is_err());
    assert_eq!(demo.interface().applied.len(), 2);
    assert_eq!(demo.interface().disconnects, 1);
}

#[test]
fn simulated_arm_reaches_first_target() {
    let config = DemoConfig {
        on_click: ClickMode::None,
        seed: Some(2024),
        log_every: 0,
        ..DemoConfig::default()
    };
    let mut demo = ObstacleAvoidanceDemo::threelink(config).unwrap();
    let stop = AtomicBool::new(false);
    let summary = demo.run(&stop, Some(8000)).unwrap();

    assert!(summary.targets_reached >= 1, "never reached (0, 2, 0)");
    let first_new = summary
        .log
        .target_path()
        .iter()
        .position(|t| *t != Vector3::new(0.0, 2.0, 0.0))
        .unwrap();
    assert!((summary.log.ee_path()[first_new] - Vector3::new(0.0, 2.0, 0.0)).norm() < 0.005);
}
