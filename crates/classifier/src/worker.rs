//! Dedicated classification worker
//!
//! Moves a [`Classifier`] onto its own thread and serializes every request
//! through one queue. Callers await the real result over a oneshot reply.

use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::classifier::Classifier;
use crate::labels::{LabelMap, Prediction};
use crate::runtime::ModelRuntime;
use crate::{ClassifierError, Result};

enum Job {
    Classify {
        pixels: Vec<u8>,
        reply: oneshot::Sender<Result<Vec<f32>>>,
    },
    Predict {
        pixels: Vec<u8>,
        reply: oneshot::Sender<Result<Prediction>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a classifier running on a dedicated worker thread
pub struct ClassifierWorker {
    /// Job queue; unbounded, jobs wait behind the one in flight
    sender: mpsc::UnboundedSender<Job>,
    /// Worker thread
    handle: JoinHandle<()>,
}

impl ClassifierWorker {
    /// Start the worker; `labels` names classes for [`predict`](Self::predict)
    pub fn spawn<R>(classifier: Classifier<R>, labels: LabelMap) -> Result<Self>
    where
        R: ModelRuntime + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = thread::Builder::new()
            .name("classifier-worker".to_string())
            .spawn(move || run(classifier, labels, receiver))?;

        info!("Classifier worker started");
        Ok(Self { sender, handle })
    }

    /// Queue one classification and wait for its scores
    pub async fn classify(&self, pixels: Vec<u8>) -> Result<Vec<f32>> {
        let (reply, response) = oneshot::channel();
        self.submit(Job::Classify { pixels, reply })?;
        response.await.map_err(|_| ClassifierError::Closed)?
    }

    /// Queue one classification and wait for the best class
    pub async fn predict(&self, pixels: Vec<u8>) -> Result<Prediction> {
        let (reply, response) = oneshot::channel();
        self.submit(Job::Predict { pixels, reply })?;
        response.await.map_err(|_| ClassifierError::Closed)?
    }

    /// Close the classifier once every job queued before this call has run.
    ///
    /// Jobs queued afterwards fail with `Closed`.
    pub async fn close(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.submit(Job::Close { reply })?;
        response.await.map_err(|_| ClassifierError::Closed)
    }

    /// Drain the queue, close the classifier and join the worker thread
    pub async fn shutdown(self) -> Result<()> {
        let Self { sender, handle } = self;
        drop(sender);

        tokio::task::spawn_blocking(move || handle.join())
            .await
            .map_err(|e| ClassifierError::Inference(format!("worker join failed: {}", e)))?
            .map_err(|_| ClassifierError::Inference("classifier worker panicked".to_string()))?;

        info!("Classifier worker stopped");
        Ok(())
    }

    fn submit(&self, job: Job) -> Result<()> {
        self.sender.send(job).map_err(|_| ClassifierError::Closed)
    }
}

/// Worker loop: one job at a time until every sender is gone
fn run<R: ModelRuntime>(
    mut classifier: Classifier<R>,
    labels: LabelMap,
    mut receiver: mpsc::UnboundedReceiver<Job>,
) {
    let mut processed = 0usize;

    while let Some(job) = receiver.blocking_recv() {
        match job {
            Job::Classify { pixels, reply } => {
                let result = classifier.classify(&pixels);
                if let Err(e) = &result {
                    debug!("Classification failed: {}", e);
                }
                if reply.send(result).is_err() {
                    warn!("Caller dropped before classification result was delivered");
                }
            }
            Job::Predict { pixels, reply } => {
                let result = classifier.predict(&pixels, &labels);
                if reply.send(result).is_err() {
                    warn!("Caller dropped before prediction was delivered");
                }
            }
            Job::Close { reply } => {
                classifier.close();
                let _ = reply.send(());
            }
        }
        processed += 1;
    }

    if classifier.state() == crate::ClassifierState::Ready {
        classifier.close();
    }
    debug!("Classifier worker exiting after {} jobs", processed);
}
