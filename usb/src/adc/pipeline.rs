use super::Adc;
use crate::device::base::CwLiteTransport;
use crate::error::CommandError;
use log::debug;

/// Runs a sequence of configuration steps against an [`Adc`], stopping at the first failure.
///
/// Steps after a failure are skipped entirely, so nothing further reaches the hardware.
///
/// ```ignore
/// adc.pipeline()
///     .then(|adc| adc.set_gain(45))
///     .then(|adc| adc.set_total_samples(3000))
///     .finish()?;
/// ```
pub struct Pipeline<'p, 'a, D: CwLiteTransport + ?Sized> {
    adc: &'p mut Adc<'a, D>,
    error: Option<CommandError>,
    steps: usize,
}

impl<'p, 'a, D: CwLiteTransport + ?Sized> Pipeline<'p, 'a, D> {
    pub(super) fn new(adc: &'p mut Adc<'a, D>) -> Self {
        Self {
            adc,
            error: None,
            steps: 0,
        }
    }

    pub fn then<F>(mut self, step: F) -> Self
    where
        F: FnOnce(&mut Adc<'a, D>) -> Result<(), CommandError>,
    {
        if self.error.is_none() {
            match step(&mut *self.adc) {
                Ok(()) => self.steps += 1,
                Err(error) => {
                    debug!("[adc] step {} failed: {}", self.steps + 1, error);
                    self.error = Some(error);
                }
            }
        }
        self
    }

    /// The failure that stopped the pipeline, if any.
    pub fn error(&self) -> Option<&CommandError> {
        self.error.as_ref()
    }

    /// Number of steps that ran successfully.
    pub fn completed(&self) -> usize {
        self.steps
    }

    pub fn finish(self) -> Result<(), CommandError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
