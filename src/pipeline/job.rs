//! Background runs on the rayon pool with a pollable status.
use super::{CancelToken, QcPipeline, QcStore, RunOutput, RunRecord, RunStatus};
use crate::error::QcError;
use crate::grid::DepthGrid;
use log::debug;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use uuid::Uuid;

struct JobState {
    status: RunStatus,
    result: Option<Result<RunOutput, QcError>>,
}

/// Handle to a run executing off the caller's thread.
pub struct RunJob {
    run_id: Uuid,
    cancel: CancelToken,
    pending: RunRecord,
    shared: Arc<(Mutex<JobState>, Condvar)>,
}

impl RunJob {
    pub fn spawn(pipeline: QcPipeline, grid: Arc<DepthGrid>) -> Self {
        let run_id = Uuid::new_v4();
        let cancel = CancelToken::new();
        let pending = pipeline.pending_record(run_id);
        let shared = Arc::new((
            Mutex::new(JobState {
                status: RunStatus::Pending,
                result: None,
            }),
            Condvar::new(),
        ));

        let worker_shared = Arc::clone(&shared);
        let worker_cancel = cancel.clone();
        rayon::spawn(move || {
            let (lock, cvar) = &*worker_shared;
            lock.lock().unwrap_or_else(PoisonError::into_inner).status = RunStatus::Processing;
            let result = pipeline.run_with_cancel(run_id, &grid, &worker_cancel);
            let status = match &result {
                Ok(_) => RunStatus::Completed,
                Err(err) if err.is_cancelled() => RunStatus::Cancelled,
                Err(_) => RunStatus::Failed,
            };
            debug!("RunJob {run_id} finished status={status:?}");
            let mut state = lock.lock().unwrap_or_else(PoisonError::into_inner);
            state.status = status;
            state.result = Some(result);
            cvar.notify_all();
        });

        Self {
            run_id,
            cancel,
            pending,
            shared,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn status(&self) -> RunStatus {
        self.shared
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    /// Request cancellation; takes effect at the next stage boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the run finishes.
    pub fn wait(self) -> Result<RunOutput, QcError> {
        let (lock, cvar) = &*self.shared;
        let mut state = lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(result) = state.result.take() {
                return result;
            }
            state = cvar.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wait, then store the completed run or its failure record.
    pub fn wait_into(self, store: &QcStore) -> Result<Uuid, QcError> {
        let pending = self.pending.clone();
        match self.wait() {
            Ok(output) => Ok(store.commit(output)),
            Err(err) => {
                store.record_failure(pending, &err);
                Err(err)
            }
        }
    }
}
