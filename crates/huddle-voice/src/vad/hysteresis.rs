//! Asymmetric talking/quiet debouncer.

/// Turns a stream of loud/quiet samples into talking transitions.
///
/// Talking starts on the first loud sample and ends only after
/// `release_samples` consecutive quiet samples.
#[derive(Debug, Clone)]
pub struct Hysteresis {
    release_samples: u32,
    quiet_run: u32,
    talking: bool,
}

impl Hysteresis {
    pub fn new(release_samples: u32) -> Self {
        Self {
            release_samples: release_samples.max(1),
            quiet_run: 0,
            talking: false,
        }
    }

    /// Feed one sample. Returns the new state only when it changed.
    pub fn push(&mut self, loud: bool) -> Option<bool> {
        if loud {
            self.quiet_run = 0;
            if !self.talking {
                self.talking = true;
                return Some(true);
            }
            return None;
        }

        if !self.talking {
            return None;
        }
        self.quiet_run += 1;
        if self.quiet_run >= self.release_samples {
            self.talking = false;
            self.quiet_run = 0;
            return Some(false);
        }
        None
    }

    pub fn is_talking(&self) -> bool {
        self.talking
    }

    pub fn reset(&mut self) {
        self.quiet_run = 0;
        self.talking = false;
    }
}
