//! Fluent configuration for a [`Runtime`].
//!
//! Every setting is a host-facing collaborator or limit; see the methods of
//! [`RuntimeBuilder`] for the defaults.

use crate::report::{ErrorReport, TracingReport};
use crate::runtime::{Config, Runtime};
use crate::time::{Clock, SystemClock};

/// Collects runtime settings before the scheduler is created.
///
/// Every setting is optional; an unconfigured builder produces the same runtime as
/// [`Runtime::new`].
///
/// # Example
/// ```ignore
/// let rt = RuntimeBuilder::new()
///     .reporter(|name: &str, message: &str, _trace: &str| eprintln!("{name}: {message}"))
///     .max_steps_per_tick(64)
///     .build();
/// ```
pub struct RuntimeBuilder {
    reporter: Option<Box<dyn ErrorReport>>,
    clock: Option<Box<dyn Clock>>,
    max_steps_per_tick: Option<usize>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    ///
    /// # Example
    /// ```ignore
    /// let builder = RuntimeBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self {
            reporter: None,
            clock: None,
            max_steps_per_tick: None,
        }
    }

    /// Sets the collaborator that receives uncaught task failures.
    pub fn reporter(mut self, reporter: impl ErrorReport + 'static) -> Self {
        self.reporter = Some(Box::new(reporter));
        self
    }

    /// Sets the clock timers read. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Caps the scheduling steps one tick may run while tasks keep requesting
    /// "continue same tick". Unbounded by default.
    pub fn max_steps_per_tick(mut self, steps: usize) -> Self {
        // A tick always runs at least one step.
        self.max_steps_per_tick = Some(steps.max(1));
        self
    }

    /// Creates the runtime. Settings left unset fall back to their defaults.
    ///
    /// # Example
    /// ```ignore
    /// let rt = RuntimeBuilder::new().build();
    /// ```
    pub fn build(self) -> Runtime {
        let reporter = self
            .reporter
            .unwrap_or_else(|| Box::new(TracingReport));
        let clock = self
            .clock
            .unwrap_or_else(|| Box::new(SystemClock::new()));

        Runtime::from_parts(
            reporter,
            clock,
            Config {
                max_steps_per_tick: self.max_steps_per_tick,
            },
        )
    }
}
