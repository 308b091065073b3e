use crate::error::{Error, Result};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use std::fs;
use std::path::{Path, PathBuf};

type CheckpointRecorder = NamedMpkBytesRecorder<FullPrecisionSettings>;

/// Running minimum of the validation loss, persisting the model whenever it is reached.
///
/// The checkpoint maps parameter names to tensors and is overwritten in place. A loss equal to the
/// current minimum also triggers a save, so ties resolve to the most recent epoch.
#[derive(Debug, Clone)]
pub struct CheckpointTracker {
    path: PathBuf,
    best: Option<(usize, f64)>,
}

impl CheckpointTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            best: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Epoch of the saved checkpoint.
    pub fn best_epoch(&self) -> Option<usize> {
        self.best.map(|(epoch, _)| epoch)
    }

    pub fn best_loss(&self) -> Option<f64> {
        self.best.map(|(_, loss)| loss)
    }

    /// Records the validation loss of `epoch`, saving `model` if it is a new minimum.
    ///
    /// Returns whether the checkpoint was written. NaN losses are never saved.
    pub fn observe<B: Backend, M: Module<B>>(
        &mut self,
        epoch: usize,
        val_loss: f64,
        model: &M,
    ) -> Result<bool> {
        let improved = match self.best {
            _ if val_loss.is_nan() => false,
            None => true,
            Some((_, best)) => val_loss <= best,
        };
        if !improved {
            return Ok(false);
        }

        let bytes = Recorder::<B>::record(
            &CheckpointRecorder::default(),
            model.clone().into_record(),
            (),
        )?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|err| Error::io(dir, err))?;
        }
        fs::write(&self.path, bytes).map_err(|err| Error::io(&self.path, err))?;
        tracing::debug!("saved checkpoint of epoch {epoch} to {:?}", self.path);

        self.best = Some((epoch, val_loss));
        Ok(true)
    }

    /// Loads the saved parameters into `model`.
    pub fn restore<B: Backend, M: Module<B>>(&self, model: M, device: &B::Device) -> Result<M> {
        if self.best.is_none() {
            return Err(Error::MissingCheckpoint(self.path.clone()));
        }
        let bytes = fs::read(&self.path).map_err(|err| Error::io(&self.path, err))?;
        let record = Recorder::<B>::load(&CheckpointRecorder::default(), bytes, device)?;
        Ok(model.load_record(record))
    }
}
