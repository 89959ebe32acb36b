//! Per-key analysis state.
//!
//! Each [`AnalysisKey`] is `Idle` (absent), `Running`, `Completed` or
//! `Failed`. Starting a key that is already running cancels the old run and
//! bumps the generation; a run may only commit while its generation is the
//! current one, so a superseded run can never overwrite newer state.
//!
//! Every run's token is a child of the registry's root token, so
//! [`AnalysisRegistry::shutdown`] stops current runs and any started later.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use reframe_common::{ReframeError, ReframeResult};
use reframe_project_model::analysis::{AnalysisKey, AnalysisResult};
use reframe_project_model::clip::VideoClip;

use crate::detector::SubjectDetector;
use crate::pipeline::{AnalysisOutcome, AnalysisPipeline, AnalysisProgress, AnalysisRequest};

#[derive(Debug)]
enum Slot {
    Running {
        token: CancellationToken,
        generation: u64,
    },
    Completed(Arc<AnalysisResult>),
    Failed(String),
}

/// Snapshot of a key's state.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisState {
    Idle,
    Running,
    Completed(Arc<AnalysisResult>),
    Failed(String),
}

/// Permission to commit one run's outcome.
#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    key: AnalysisKey,
    generation: u64,
    token: CancellationToken,
}

impl AnalysisTicket {
    pub fn key(&self) -> &AnalysisKey {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Result of [`AnalysisRegistry::begin`].
#[derive(Debug)]
pub enum Begin {
    Cached(Arc<AnalysisResult>),
    Started(AnalysisTicket),
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<AnalysisKey, Slot>,
    next_generation: u64,
}

impl Inner {
    fn is_current(&self, ticket: &AnalysisTicket) -> bool {
        matches!(
            self.slots.get(&ticket.key),
            Some(Slot::Running { generation, .. }) if *generation == ticket.generation
        )
    }
}

/// Shared registry of analyses keyed by source, ratio and strategy.
#[derive(Debug, Default)]
pub struct AnalysisRegistry {
    inner: Mutex<Inner>,
    root: CancellationToken,
}

impl AnalysisRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves the map consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self, key: &AnalysisKey) -> AnalysisState {
        match self.lock().slots.get(key) {
            None => AnalysisState::Idle,
            Some(Slot::Running { .. }) => AnalysisState::Running,
            Some(Slot::Completed(result)) => AnalysisState::Completed(Arc::clone(result)),
            Some(Slot::Failed(message)) => AnalysisState::Failed(message.clone()),
        }
    }

    pub fn result(&self, key: &AnalysisKey) -> Option<Arc<AnalysisResult>> {
        match self.lock().slots.get(key) {
            Some(Slot::Completed(result)) => Some(Arc::clone(result)),
            _ => None,
        }
    }

    /// Seed a completed result, e.g. one loaded from a project file.
    pub fn insert_completed(&self, result: AnalysisResult) -> ReframeResult<()> {
        result
            .validate()
            .map_err(|e| ReframeError::project(format!("refusing invalid cached result: {e}")))?;
        let key = result.key.clone();
        let mut inner = self.lock();
        if let Some(Slot::Running { token, .. }) = inner.slots.get(&key) {
            token.cancel();
        }
        inner.slots.insert(key, Slot::Completed(Arc::new(result)));
        Ok(())
    }

    /// Start (or restart) an analysis for `key`.
    pub fn begin(&self, key: &AnalysisKey) -> Begin {
        let mut inner = self.lock();

        match inner.slots.get(key) {
            Some(Slot::Completed(result)) => {
                tracing::debug!(key = %key.cache_id(), "Analysis cache hit");
                return Begin::Cached(Arc::clone(result));
            }
            Some(Slot::Running { token, generation }) => {
                tracing::info!(
                    key = %key.cache_id(),
                    generation,
                    "Replacing in-flight analysis"
                );
                token.cancel();
            }
            Some(Slot::Failed(_)) | None => {}
        }

        inner.next_generation += 1;
        let generation = inner.next_generation;
        let token = self.root.child_token();
        inner.slots.insert(
            key.clone(),
            Slot::Running {
                token: token.clone(),
                generation,
            },
        );

        Begin::Started(AnalysisTicket {
            key: key.clone(),
            generation,
            token,
        })
    }

    /// Commit a finished run. Returns `false` for a superseded ticket.
    pub fn complete(&self, ticket: &AnalysisTicket, result: AnalysisResult) -> bool {
        let mut inner = self.lock();
        if !inner.is_current(ticket) {
            tracing::debug!(
                key = %ticket.key.cache_id(),
                generation = ticket.generation,
                "Discarding stale analysis result"
            );
            return false;
        }
        inner
            .slots
            .insert(ticket.key.clone(), Slot::Completed(Arc::new(result)));
        true
    }

    pub fn fail(&self, ticket: &AnalysisTicket, message: impl Into<String>) -> bool {
        let mut inner = self.lock();
        if !inner.is_current(ticket) {
            return false;
        }
        inner
            .slots
            .insert(ticket.key.clone(), Slot::Failed(message.into()));
        true
    }

    /// A run observed its cancellation; the key returns to idle.
    pub fn cancelled(&self, ticket: &AnalysisTicket) -> bool {
        let mut inner = self.lock();
        if !inner.is_current(ticket) {
            return false;
        }
        inner.slots.remove(&ticket.key);
        true
    }

    /// Cancel a running analysis. Completed results are kept.
    pub fn cancel(&self, key: &AnalysisKey) -> bool {
        let mut inner = self.lock();
        if let Some(Slot::Running { token, .. }) = inner.slots.get(key) {
            token.cancel();
            inner.slots.remove(key);
            return true;
        }
        false
    }

    /// Cancel every running analysis. Runs started afterwards begin
    /// cancelled and return [`AnalysisOutcome::Cancelled`].
    pub fn shutdown(&self) {
        self.root.cancel();
        let mut inner = self.lock();
        inner
            .slots
            .retain(|_, slot| !matches!(slot, Slot::Running { .. }));
        tracing::info!("Analysis registry shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Replace a completed result's clips with an edited list.
    pub fn commit_edits(
        &self,
        key: &AnalysisKey,
        clips: Vec<VideoClip>,
    ) -> ReframeResult<Arc<AnalysisResult>> {
        let mut inner = self.lock();
        let Some(Slot::Completed(current)) = inner.slots.get(key) else {
            return Err(ReframeError::analysis(format!(
                "cannot commit edits: {} has no completed analysis",
                key.cache_id()
            )));
        };

        let mut edited = AnalysisResult::clone(current);
        edited.clips = clips;
        edited
            .validate()
            .map_err(|e| ReframeError::analysis(format!("edited clips rejected: {e}")))?;

        let edited = Arc::new(edited);
        inner
            .slots
            .insert(key.clone(), Slot::Completed(Arc::clone(&edited)));
        Ok(edited)
    }

    /// Cancel and forget every analysis of a source. Returns the number of
    /// keys dropped.
    pub fn invalidate_source(&self, source_id: &str) -> usize {
        let mut inner = self.lock();
        let before = inner.slots.len();
        inner.slots.retain(|key, slot| {
            if key.source_id != source_id {
                return true;
            }
            if let Slot::Running { token, .. } = slot {
                token.cancel();
            }
            false
        });
        let dropped = before - inner.slots.len();
        tracing::info!(source_id, dropped, "Invalidated analyses");
        dropped
    }

    /// Run (or reuse) the analysis for `request.key` on the blocking pool.
    pub async fn analyze<P>(
        &self,
        pipeline: AnalysisPipeline,
        request: AnalysisRequest,
        detector: Arc<dyn SubjectDetector>,
        progress: P,
    ) -> ReframeResult<AnalysisOutcome>
    where
        P: Fn(AnalysisProgress) + Send + 'static,
    {
        let ticket = match self.begin(&request.key) {
            Begin::Cached(result) => {
                return Ok(AnalysisOutcome::Completed(Box::new(AnalysisResult::clone(
                    &result,
                ))))
            }
            Begin::Started(ticket) => ticket,
        };
        if ticket.token.is_cancelled() {
            self.cancelled(&ticket);
            return Ok(AnalysisOutcome::Cancelled);
        }

        let token = ticket.token.clone();
        let joined = tokio::task::spawn_blocking(move || {
            pipeline.run(detector.as_ref(), &request, &token, &progress)
        })
        .await;

        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(join_err) => Err(ReframeError::analysis(format!(
                "analysis task failed: {join_err}"
            ))),
        };

        match outcome {
            Ok(AnalysisOutcome::Completed(result)) => {
                if self.complete(&ticket, AnalysisResult::clone(&result)) {
                    Ok(AnalysisOutcome::Completed(result))
                } else {
                    Ok(AnalysisOutcome::Cancelled)
                }
            }
            Ok(AnalysisOutcome::Cancelled) => {
                self.cancelled(&ticket);
                Ok(AnalysisOutcome::Cancelled)
            }
            Err(err) => {
                tracing::error!(key = %ticket.key.cache_id(), error = %err, "Analysis failed");
                self.fail(&ticket, err.to_string());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reframe_project_model::detection::{Detection, FramingStrategy};
    use reframe_project_model::framing::{AspectRatio, CropRegion, CropStrategy};
    use reframe_project_model::geometry::{Point, SafeArea, Size};

    use crate::detector::DetectionError;

    fn key(source: &str) -> AnalysisKey {
        AnalysisKey::new(source, AspectRatio::VERTICAL, CropStrategy::SmartCrop)
    }

    fn result_for(key: &AnalysisKey, duration: f64) -> AnalysisResult {
        let safe_area = SafeArea::full_frame(Size::new(1920.0, 1080.0));
        let crop_region = CropRegion::centered(&safe_area, key.aspect_ratio);
        AnalysisResult {
            key: key.clone(),
            clips: vec![VideoClip::new(
                0.0,
                duration,
                FramingStrategy::Track,
                crop_region.origin(),
                crop_region.size(),
            )],
            safe_area,
            target_aspect_ratio: key.aspect_ratio,
            crop_region,
            source_width: 1920.0,
            source_height: 1080.0,
            duration_secs: duration,
            sampled_frames: 0,
            failed_detections: 0,
        }
    }

    fn started(begin: Begin) -> AnalysisTicket {
        match begin {
            Begin::Started(ticket) => ticket,
            Begin::Cached(_) => panic!("expected a fresh run"),
        }
    }

    struct Empty;

    impl SubjectDetector for Empty {
        fn detect(&self, _timestamp_ms: u64) -> Result<Detection, DetectionError> {
            Ok(Detection::default())
        }
    }

    #[test]
    fn test_begin_complete_then_cached() {
        let registry = AnalysisRegistry::new();
        let k = key("a");
        let ticket = started(registry.begin(&k));
        assert_eq!(registry.state(&k), AnalysisState::Running);
        assert!(registry.complete(&ticket, result_for(&k, 4.0)));
        assert!(matches!(registry.begin(&k), Begin::Cached(_)));
    }

    #[test]
    fn test_restart_cancels_and_supersedes_old_run() {
        let registry = AnalysisRegistry::new();
        let k = key("a");
        let first = started(registry.begin(&k));
        let second = started(registry.begin(&k));

        assert!(first.token().is_cancelled());
        assert!(second.generation() > first.generation());
        assert!(!registry.complete(&first, result_for(&k, 1.0)));
        assert_eq!(registry.state(&k), AnalysisState::Running);
        assert!(registry.complete(&second, result_for(&k, 2.0)));
        assert_eq!(registry.result(&k).unwrap().duration_secs, 2.0);
    }

    #[test]
    fn test_stale_ticket_cannot_overwrite_edits() {
        let registry = AnalysisRegistry::new();
        let k = key("a");
        let stale = started(registry.begin(&k));
        registry.insert_completed(result_for(&k, 4.0)).unwrap();
        assert!(stale.token().is_cancelled());

        let mut clips = registry.result(&k).unwrap().clips.clone();
        clips[0].set_crop_position(Point::new(10.0, 0.0), Size::new(606.0, 1080.0));
        registry.commit_edits(&k, clips).unwrap();

        assert!(!registry.complete(&stale, result_for(&k, 4.0)));
        assert!(!registry.fail(&stale, "late failure"));
        assert_eq!(registry.result(&k).unwrap().clips[0].crop_position.x, 10.0);
    }

    #[test]
    fn test_commit_edits_requires_completed_and_contiguous() {
        let registry = AnalysisRegistry::new();
        let k = key("a");
        assert!(registry.commit_edits(&k, Vec::new()).is_err());

        registry.insert_completed(result_for(&k, 4.0)).unwrap();
        let mut clips = registry.result(&k).unwrap().clips.clone();
        clips[0].end_time = 3.0;
        assert!(registry.commit_edits(&k, clips).is_err());
        assert_eq!(registry.result(&k).unwrap().clips[0].end_time, 4.0);
    }

    #[test]
    fn test_fail_and_cancel_transitions() {
        let registry = AnalysisRegistry::new();
        let k = key("a");
        let ticket = started(registry.begin(&k));
        assert!(registry.fail(&ticket, "detector offline"));
        assert_eq!(
            registry.state(&k),
            AnalysisState::Failed("detector offline".to_string())
        );

        let ticket = started(registry.begin(&k));
        assert!(registry.cancel(&k));
        assert!(ticket.token().is_cancelled());
        assert_eq!(registry.state(&k), AnalysisState::Idle);
        assert!(!registry.cancelled(&ticket));
    }

    #[test]
    fn test_invalidate_source_drops_only_that_source() {
        let registry = AnalysisRegistry::new();
        let a = key("a");
        let a_square = AnalysisKey::new("a", AspectRatio::SQUARE, CropStrategy::SmartCrop);
        let b = key("b");
        registry.insert_completed(result_for(&a, 1.0)).unwrap();
        let running = started(registry.begin(&a_square));
        registry.insert_completed(result_for(&b, 1.0)).unwrap();

        assert_eq!(registry.invalidate_source("a"), 2);
        assert!(running.token().is_cancelled());
        assert_eq!(registry.state(&a), AnalysisState::Idle);
        assert!(registry.result(&b).is_some());
    }

    #[tokio::test]
    async fn test_analyze_runs_pipeline_and_caches() {
        let registry = Arc::new(AnalysisRegistry::new());
        let k = key("a");
        let request = AnalysisRequest::new(k.clone(), Size::new(1920.0, 1080.0), 3.0);

        let outcome = registry
            .analyze(
                AnalysisPipeline::with_defaults(),
                request.clone(),
                Arc::new(Empty),
                |_| {},
            )
            .await
            .unwrap();
        let first = outcome.into_result().unwrap();
        assert_eq!(first.clips.len(), 1);
        assert!(matches!(registry.state(&k), AnalysisState::Completed(_)));

        let again = registry
            .analyze(AnalysisPipeline::with_defaults(), request, Arc::new(Empty), |_| {})
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(again.clips[0].id, first.clips[0].id);
    }

    #[test]
    fn test_shutdown_cancels_running_and_later_runs() {
        let registry = AnalysisRegistry::new();
        let running = started(registry.begin(&key("a")));
        registry.insert_completed(result_for(&key("c"), 1.0)).unwrap();

        registry.shutdown();
        assert!(registry.is_shut_down());
        assert!(running.token().is_cancelled());
        assert_eq!(registry.state(&key("a")), AnalysisState::Idle);
        assert!(registry.result(&key("c")).is_some());

        let later = started(registry.begin(&key("b")));
        assert!(later.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_analyze_after_shutdown_is_cancelled_for_every_key() {
        let registry = AnalysisRegistry::new();
        registry.shutdown();

        for (ratio, strategy) in [
            (AspectRatio::VERTICAL, CropStrategy::SmartCrop),
            (AspectRatio::SQUARE, CropStrategy::SmartCrop),
            (AspectRatio::PORTRAIT, CropStrategy::CenterCrop),
        ] {
            let k = AnalysisKey::new("a", ratio, strategy);
            let request = AnalysisRequest::new(k.clone(), Size::new(1920.0, 1080.0), 3.0);
            let outcome = registry
                .analyze(AnalysisPipeline::with_defaults(), request, Arc::new(Empty), |_| {})
                .await
                .unwrap();
            assert!(matches!(outcome, AnalysisOutcome::Cancelled));
            assert_eq!(registry.state(&k), AnalysisState::Idle);
        }
    }
}
