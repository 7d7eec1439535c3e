//! Test doubles for the actuator and process-source seams.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::actuator::ModeActuator;
use crate::error::{ActuatorError, ScanError};
use crate::mode::{Mode, ModeOrigin};
use crate::process_monitor::ProcessSource;

/// Records every apply call; can be switched into a failing state.
#[derive(Default)]
pub struct RecordingActuator {
    calls: Mutex<Vec<(Mode, ModeOrigin)>>,
    fail: AtomicBool,
}

impl RecordingActuator {
    pub fn calls(&self) -> Vec<(Mode, ModeOrigin)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl ModeActuator for RecordingActuator {
    fn apply_mode(&self, mode: Mode, origin: ModeOrigin) -> Result<(), ActuatorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ActuatorError::Aborted("test failure".into()));
        }
        self.calls.lock().unwrap().push((mode, origin));
        Ok(())
    }

    fn current_mode_name(&self) -> String {
        self.calls()
            .last()
            .map(|(m, _)| m.display_name().to_string())
            .unwrap_or_default()
    }
}

/// Process source whose process list the test controls.
#[derive(Clone, Default)]
pub struct FakeProcessSource {
    names: Arc<Mutex<BTreeSet<String>>>,
    fail: Arc<AtomicBool>,
}

impl FakeProcessSource {
    pub fn with(names: &[&str]) -> Self {
        let source = Self::default();
        source.set(names);
        source
    }

    pub fn set(&self, names: &[&str]) {
        *self.names.lock().unwrap() = names.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl ProcessSource for FakeProcessSource {
    fn snapshot(&mut self) -> Result<BTreeSet<String>, ScanError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ScanError::Other("test failure".into()));
        }
        Ok(self.names.lock().unwrap().clone())
    }
}
