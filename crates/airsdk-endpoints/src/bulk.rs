//! Concurrent multi-resource operations.
//!
//! Each helper runs its requests with at most `workers` in flight and never
//! stops at the first failure: every item ends up in either `succeeded` or
//! `failed` of the returned [`BulkReport`], keyed by primary key.

use futures::stream::{self, StreamExt};

use airsdk_core::{AirError, Payload, Result};

use crate::endpoint::EndpointClient;
use crate::model::Model;
use crate::reference::Reference;

/// Per-item outcome of a bulk operation.
#[derive(Debug)]
pub struct BulkReport<T> {
    pub succeeded: Vec<(String, T)>,
    pub failed: Vec<(String, AirError)>,
}

impl<T> Default for BulkReport<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BulkReport<T> {
    fn push(&mut self, key: String, outcome: Result<T>) {
        match outcome {
            Ok(value) => self.succeeded.push((key, value)),
            Err(err) => {
                tracing::debug!(key = %key, error = %err, "bulk item failed");
                self.failed.push((key, err));
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Successful results, or the first failure.
    pub fn into_result(self) -> Result<Vec<(String, T)>> {
        match self.failed.into_iter().next() {
            Some((_, err)) => Err(err),
            None => Ok(self.succeeded),
        }
    }
}

fn check_workers(workers: usize) -> Result<()> {
    if workers == 0 {
        return Err(AirError::invalid_argument("workers must be at least 1"));
    }
    Ok(())
}

impl EndpointClient {
    /// Apply one payload per target.
    ///
    /// Targets are reduced to keys before anything is sent; an invalid
    /// target fails the whole call.
    pub async fn bulk_update<R, P>(
        &self,
        items: Vec<(R, P)>,
        workers: usize,
    ) -> Result<BulkReport<Model>>
    where
        R: Into<Reference>,
        P: Into<Payload>,
    {
        check_workers(workers)?;
        let items = items
            .into_iter()
            .map(|(target, payload)| {
                let target = target.into();
                target.key().map(|key| (key, target, payload.into()))
            })
            .collect::<Result<Vec<_>>>()?;

        let outcomes: Vec<(String, Result<Model>)> = stream::iter(items)
            .map(|(key, target, payload)| async move { (key, self.update(target, payload).await) })
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut report = BulkReport::default();
        for (key, outcome) in outcomes {
            report.push(key, outcome);
        }
        Ok(report)
    }

    /// Delete every target.
    pub async fn bulk_delete<R: Into<Reference>>(
        &self,
        targets: Vec<R>,
        workers: usize,
    ) -> Result<BulkReport<()>> {
        check_workers(workers)?;
        let targets = targets
            .into_iter()
            .map(|target| {
                let target = target.into();
                target.key().map(|key| (key, target))
            })
            .collect::<Result<Vec<_>>>()?;

        let outcomes: Vec<(String, Result<()>)> = stream::iter(targets)
            .map(|(key, target)| async move { (key, self.delete(target).await) })
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut report = BulkReport::default();
        for (key, outcome) in outcomes {
            report.push(key, outcome);
        }
        Ok(report)
    }
}

/// Save every instance. Unsaved drafts are created and reported under
/// their new key, or `#<index>` if creation failed.
pub async fn save_all(models: &mut [Model], workers: usize) -> Result<BulkReport<()>> {
    check_workers(workers)?;
    let outcomes: Vec<(String, Result<()>)> = stream::iter(models.iter_mut().enumerate())
        .map(|(index, model)| async move {
            let outcome = model.save().await;
            let key = model.key().unwrap_or_else(|| format!("#{index}"));
            (key, outcome)
        })
        .buffer_unordered(workers)
        .collect()
        .await;

    let mut report = BulkReport::default();
    for (key, outcome) in outcomes {
        report.push(key, outcome);
    }
    Ok(report)
}
