use std::{collections::HashMap, sync::Arc, thread, time::Duration};

use anyhow::{Context, Result};
use log::debug;

use super::{DeviceInput, NavStep, Navigator, Screen};

/// Replays configured step lists to reach a screen; leaves it with a fixed
/// number of back presses. Screens without a script are treated as already
/// reachable (no-op).
pub struct ScriptedNavigator {
    input: Arc<dyn DeviceInput>,
    scripts: HashMap<Screen, Vec<NavStep>>,
    exit_backs: HashMap<Screen, u32>,
    back_settle: Duration,
}

impl ScriptedNavigator {
    pub fn new(
        input: Arc<dyn DeviceInput>,
        scripts: HashMap<Screen, Vec<NavStep>>,
        exit_backs: HashMap<Screen, u32>,
        back_settle: Duration,
    ) -> Self {
        Self {
            input,
            scripts,
            exit_backs,
            back_settle,
        }
    }

    fn run_step(&self, serial: &str, step: &NavStep) -> Result<()> {
        let wait_ms = match step {
            NavStep::Tap { x, y, wait_ms } => {
                self.input.tap(serial, *x, *y)?;
                *wait_ms
            }
            NavStep::Swipe {
                x1,
                y1,
                x2,
                y2,
                duration_ms,
                wait_ms,
            } => {
                self.input.swipe(serial, (*x1, *y1), (*x2, *y2), *duration_ms)?;
                *wait_ms
            }
            NavStep::Back { wait_ms } => {
                self.input.back(serial)?;
                *wait_ms
            }
            NavStep::Wait { ms } => *ms,
        };
        if wait_ms > 0 {
            thread::sleep(Duration::from_millis(wait_ms));
        }
        Ok(())
    }
}

impl Navigator for ScriptedNavigator {
    fn navigate_to(&self, serial: &str, screen: Screen) -> Result<()> {
        let Some(steps) = self.scripts.get(&screen) else {
            debug!("no navigation script for {}, staying put", screen.as_str());
            return Ok(());
        };
        for (idx, step) in steps.iter().enumerate() {
            self.run_step(serial, step).with_context(|| {
                format!("navigation to {} failed at step {}", screen.as_str(), idx + 1)
            })?;
        }
        Ok(())
    }

    fn go_back(&self, serial: &str, screen: Screen) -> Result<()> {
        let backs = self.exit_backs.get(&screen).copied().unwrap_or(1);
        for _ in 0..backs {
            self.input.back(serial)?;
            if !self.back_settle.is_zero() {
                thread::sleep(self.back_settle);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl DeviceInput for Recorder {
        fn tap(&self, serial: &str, x: i32, y: i32) -> Result<()> {
            self.0.lock().unwrap().push(format!("{serial} tap {x},{y}"));
            Ok(())
        }
        fn swipe(&self, serial: &str, from: (i32, i32), to: (i32, i32), ms: u64) -> Result<()> {
            self.0
                .lock()
                .unwrap()
                .push(format!("{serial} swipe {from:?}->{to:?} {ms}"));
            Ok(())
        }
        fn back(&self, serial: &str) -> Result<()> {
            self.0.lock().unwrap().push(format!("{serial} back"));
            Ok(())
        }
        fn resolution(&self, _serial: &str) -> Result<(u32, u32)> {
            Ok((960, 540))
        }
    }

    #[test]
    fn runs_script_then_exits_with_configured_backs() {
        let input = Arc::new(Recorder::default());
        let scripts = HashMap::from([(
            Screen::PetToken,
            vec![
                NavStep::Tap { x: 750, y: 80, wait_ms: 0 },
                NavStep::Swipe { x1: 100, y1: 450, x2: 100, y2: 100, duration_ms: 500, wait_ms: 0 },
                NavStep::Wait { ms: 1 },
            ],
        )]);
        let backs = HashMap::from([(Screen::PetToken, 2)]);
        let nav = ScriptedNavigator::new(input.clone(), scripts, backs, Duration::ZERO);

        nav.navigate_to("emulator-5554", Screen::PetToken).unwrap();
        nav.go_back("emulator-5554", Screen::PetToken).unwrap();
        nav.navigate_to("emulator-5554", Screen::Hall).unwrap();
        nav.go_back("emulator-5554", Screen::Hall).unwrap();

        let log = input.0.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![
                "emulator-5554 tap 750,80",
                "emulator-5554 swipe (100, 450)->(100, 100) 500",
                "emulator-5554 back",
                "emulator-5554 back",
                "emulator-5554 back",
            ]
        );
    }
}
