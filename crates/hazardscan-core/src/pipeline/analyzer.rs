//! Per-image analysis: score against the taxonomy, detect objects, and
//! assemble a `DetectionRecord`.
//!
//! Both adapters are blocking ONNX calls. Each call runs on the blocking pool
//! under a device permit and an inference timeout, and transient failures are
//! retried with exponential backoff. A failed stage never aborts the image:
//! its output stays empty and the failure is attached to the record.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use tokio::sync::Semaphore;

use super::retry;
use crate::config::{Config, PipelineConfig, ScoringConfig};
use crate::detection::ObjectDetector;
use crate::error::PipelineError;
use crate::scoring::SimilarityScorer;
use crate::taxonomy::Taxonomy;
use crate::types::{DetectionRecord, ScoredTag, Stage, StageFailure};

/// Settings for the analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    /// Prompt template, top-K and threshold
    pub scoring: ScoringConfig,
    /// Upper bound on a single model call
    pub inference_timeout_ms: u64,
    /// Retry policy for timeouts and unavailable models
    pub retry: PipelineConfig,
    /// Model calls allowed in flight at once, across both adapters
    pub device_permits: usize,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            inference_timeout_ms: 30_000,
            retry: PipelineConfig::default(),
            device_permits: 1,
        }
    }
}

impl AnalyzerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scoring: config.scoring.clone(),
            inference_timeout_ms: config.limits.inference_timeout_ms,
            retry: config.pipeline.clone(),
            device_permits: config.processing.device_permits,
        }
    }
}

/// Runs the scorer and detector for one image at a time.
///
/// Cheap to share: the adapters and taxonomy sit behind `Arc`, and the device
/// semaphore is shared by every concurrent `analyze` call.
pub struct Analyzer {
    scorer: Arc<dyn SimilarityScorer>,
    detector: Option<Arc<dyn ObjectDetector>>,
    taxonomy: Arc<Taxonomy>,
    prompts: Arc<[String]>,
    device: Arc<Semaphore>,
    options: AnalyzerOptions,
}

impl Analyzer {
    /// Create an analyzer. Without a detector the objects list stays empty.
    pub fn new(
        scorer: Arc<dyn SimilarityScorer>,
        detector: Option<Arc<dyn ObjectDetector>>,
        taxonomy: Arc<Taxonomy>,
        options: AnalyzerOptions,
    ) -> Self {
        let prompts: Arc<[String]> = taxonomy
            .tags()
            .iter()
            .map(|tag| options.scoring.prompt_for(tag))
            .collect();
        let device = Arc::new(Semaphore::new(options.device_permits.max(1)));

        Self {
            scorer,
            detector,
            taxonomy,
            prompts,
            device,
            options,
        }
    }

    /// Candidate phrases, one per taxonomy tag, in taxonomy order.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Analyze one decoded image.
    pub async fn analyze(&self, image: Arc<DynamicImage>, path: &Path) -> DetectionRecord {
        let file_name = file_name_of(path);
        let mut failures = Vec::new();

        let scores = {
            let scorer = self.scorer.clone();
            let prompts = self.prompts.clone();
            let image = image.clone();
            let path_buf = path.to_path_buf();
            self.call_model(Stage::Scoring, "scorer", path, move || {
                scorer.score(&image, &prompts, &path_buf)
            })
            .await
        };

        let tags = match scores {
            Ok(scores) if scores.len() == self.prompts.len() => select_tags(
                self.taxonomy.tags(),
                &scores,
                self.options.scoring.top_k,
                self.options.scoring.threshold,
            ),
            Ok(scores) => {
                let err = PipelineError::ModelUnavailable {
                    model: "scorer".to_string(),
                    path: path.to_path_buf(),
                    message: format!(
                        "returned {} scores for {} phrases",
                        scores.len(),
                        self.prompts.len()
                    ),
                };
                failures.push(record_failure(Stage::Scoring, &file_name, &err));
                vec![]
            }
            Err(err) => {
                failures.push(record_failure(Stage::Scoring, &file_name, &err));
                vec![]
            }
        };

        let objects = match &self.detector {
            Some(detector) => {
                let detector = detector.clone();
                let path_buf = path.to_path_buf();
                let result = self
                    .call_model(Stage::Detection, "detector", path, move || {
                        detector.detect(&image, &path_buf)
                    })
                    .await;
                match result {
                    Ok(labels) => labels,
                    Err(err) => {
                        failures.push(record_failure(Stage::Detection, &file_name, &err));
                        vec![]
                    }
                }
            }
            None => vec![],
        };

        tracing::debug!(
            "Analyzed {}: {} tags, {} objects",
            file_name,
            tags.len(),
            objects.len()
        );

        DetectionRecord {
            file_name,
            tags,
            objects,
            failures,
        }
    }

    /// Run a blocking model call with the retry policy applied.
    async fn call_model<T, F>(
        &self,
        stage: Stage,
        model: &str,
        path: &Path,
        call: F,
    ) -> Result<T, PipelineError>
    where
        F: Fn() -> Result<T, PipelineError> + Clone + Send + 'static,
        T: Send + 'static,
    {
        let mut attempt = 0;
        loop {
            match self.call_once(stage, model, path, call.clone()).await {
                Err(err)
                    if attempt < self.options.retry.retry_attempts
                        && retry::is_retryable(&err) =>
                {
                    let delay = retry::backoff_duration(attempt, self.options.retry.retry_delay_ms);
                    tracing::debug!(
                        "Retry {}/{} of {} for {:?} after {:?}: {}",
                        attempt + 1,
                        self.options.retry.retry_attempts,
                        stage,
                        path,
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// One attempt: wait for a device permit and run the call, all under
    /// the inference timeout.
    ///
    /// The permit moves into the blocking task so it is released only when
    /// the model is actually idle again, even after a timeout. A call stuck
    /// behind a wedged model therefore times out instead of waiting forever.
    async fn call_once<T, F>(
        &self,
        stage: Stage,
        model: &str,
        path: &Path,
        call: F,
    ) -> Result<T, PipelineError>
    where
        F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
        T: Send + 'static,
    {
        let unavailable = |message: String| PipelineError::ModelUnavailable {
            model: model.to_string(),
            path: path.to_path_buf(),
            message,
        };

        let device = self.device.clone();
        let attempt = async {
            let permit = match device.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return Err(unavailable(format!("Device semaphore closed: {e}"))),
            };
            let task = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                call()
            });
            match task.await {
                Ok(result) => result,
                Err(e) => Err(unavailable(format!("Inference task failed: {e}"))),
            }
        };

        let timeout_ms = self.options.inference_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), attempt).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout {
                path: path.to_path_buf(),
                stage: stage.to_string(),
                timeout_ms,
            }),
        }
    }
}

/// Keep the `top_k` highest scores, then only those strictly above `threshold`.
///
/// `tags` and `scores` are parallel. Sorting is stable, so equal scores keep
/// taxonomy order. NaN scores are never retained.
pub fn select_tags(tags: &[String], scores: &[f32], top_k: usize, threshold: f32) -> Vec<ScoredTag> {
    let mut ranked: Vec<(usize, f32)> = scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, s)| !s.is_nan())
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    ranked
        .into_iter()
        .take(top_k)
        .filter(|(_, score)| *score > threshold)
        .filter_map(|(i, score)| tags.get(i).map(|tag| ScoredTag::new(tag.clone(), score)))
        .collect()
}

/// The bare filename used as the report's `Image` cell.
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn record_failure(stage: Stage, file_name: &str, err: &PipelineError) -> StageFailure {
    tracing::warn!("{} failed for {}: {}", stage, file_name, err);
    StageFailure::from_error(stage, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use image::RgbImage;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Returns the same scores for every image, keyed by tag.
    struct FixedScorer {
        scores: Vec<(&'static str, f32)>,
    }

    impl SimilarityScorer for FixedScorer {
        fn score(
            &self,
            _image: &DynamicImage,
            phrases: &[String],
            _path: &Path,
        ) -> Result<Vec<f32>, PipelineError> {
            Ok(phrases
                .iter()
                .map(|p| {
                    self.scores
                        .iter()
                        .find(|(tag, _)| *p == format!("a photo of {tag}"))
                        .map(|(_, s)| *s)
                        .unwrap_or(0.001)
                })
                .collect())
        }
    }

    struct FixedDetector(Vec<&'static str>);

    impl ObjectDetector for FixedDetector {
        fn detect(&self, _image: &DynamicImage, _path: &Path) -> Result<Vec<String>, PipelineError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    struct BrokenDetector;

    impl ObjectDetector for BrokenDetector {
        fn detect(&self, _image: &DynamicImage, path: &Path) -> Result<Vec<String>, PipelineError> {
            Err(PipelineError::ModelUnavailable {
                model: "detector".to_string(),
                path: path.to_path_buf(),
                message: "session lost".to_string(),
            })
        }
    }

    /// Fails with `ModelUnavailable` for the first `failures` calls.
    struct FlakyScorer {
        calls: AtomicU32,
        failures: u32,
    }

    impl SimilarityScorer for FlakyScorer {
        fn score(
            &self,
            _image: &DynamicImage,
            phrases: &[String],
            path: &Path,
        ) -> Result<Vec<f32>, PipelineError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(PipelineError::ModelUnavailable {
                    model: "scorer".to_string(),
                    path: path.to_path_buf(),
                    message: "busy".to_string(),
                });
            }
            let mut scores = vec![0.0; phrases.len()];
            scores[0] = 0.9;
            Ok(scores)
        }
    }

    struct SlowScorer;

    impl SimilarityScorer for SlowScorer {
        fn score(
            &self,
            _image: &DynamicImage,
            phrases: &[String],
            _path: &Path,
        ) -> Result<Vec<f32>, PipelineError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(vec![0.0; phrases.len()])
        }
    }

    /// Blocks far past any timeout on the first call, then answers at once.
    struct WedgedOnceScorer {
        calls: AtomicU32,
    }

    impl SimilarityScorer for WedgedOnceScorer {
        fn score(
            &self,
            _image: &DynamicImage,
            phrases: &[String],
            _path: &Path,
        ) -> Result<Vec<f32>, PipelineError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                std::thread::sleep(Duration::from_millis(2_000));
            }
            Ok(vec![0.0; phrases.len()])
        }
    }

    struct ShortScorer;

    impl SimilarityScorer for ShortScorer {
        fn score(
            &self,
            _image: &DynamicImage,
            _phrases: &[String],
            _path: &Path,
        ) -> Result<Vec<f32>, PipelineError> {
            Ok(vec![0.5])
        }
    }

    fn image() -> Arc<DynamicImage> {
        Arc::new(DynamicImage::ImageRgb8(RgbImage::new(4, 4)))
    }

    fn fast_options() -> AnalyzerOptions {
        AnalyzerOptions {
            retry: PipelineConfig {
                retry_attempts: 1,
                retry_delay_ms: 1,
            },
            ..AnalyzerOptions::default()
        }
    }

    fn analyzer(
        scorer: impl SimilarityScorer + 'static,
        detector: Option<Arc<dyn ObjectDetector>>,
        options: AnalyzerOptions,
    ) -> Analyzer {
        Analyzer::new(
            Arc::new(scorer),
            detector,
            Arc::new(Taxonomy::builtin()),
            options,
        )
    }

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_tags_top_k_then_threshold() {
        let names = tags(&["a", "b", "c", "d"]);
        let selected = select_tags(&names, &[0.1, 0.5, 0.3, 0.2], 2, 0.15);
        let kept: Vec<&str> = selected.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(kept, vec!["b", "c"]);
    }

    #[test]
    fn test_select_tags_threshold_is_strict() {
        let names = tags(&["a", "b"]);
        let selected = select_tags(&names, &[0.15, 0.16], 10, 0.15);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].tag, "b");
    }

    #[test]
    fn test_select_tags_threshold_applies_after_top_k() {
        // the third-best tag would pass the threshold but falls outside top-2
        let names = tags(&["a", "b", "c"]);
        let selected = select_tags(&names, &[0.4, 0.35, 0.25], 2, 0.15);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_select_tags_ties_keep_taxonomy_order() {
        let names = tags(&["first", "second", "third"]);
        let selected = select_tags(&names, &[0.3, 0.3, 0.3], 2, 0.1);
        let kept: Vec<&str> = selected.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(kept, vec!["first", "second"]);
    }

    #[test]
    fn test_select_tags_skips_nan() {
        let names = tags(&["a", "b"]);
        let selected = select_tags(&names, &[f32::NAN, 0.5], 10, 0.15);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].tag, "b");
    }

    #[test]
    fn test_select_tags_nothing_from_broken_embedding() {
        let probabilities = crate::math::softmax(&[30.0, f32::NAN, 10.0]);
        let selected = select_tags(&tags(&["mold", "bleach", "dust"]), &probabilities, 10, 0.15);
        assert!(selected.is_empty());
    }

    #[test]
    fn test_select_tags_invariants() {
        let names: Vec<String> = (0..25).map(|i| format!("tag{i}")).collect();
        let scores: Vec<f32> = (0..25).map(|i| (i as f32 * 0.37).fract()).collect();
        for k in [0, 1, 5, 10, 30] {
            let selected = select_tags(&names, &scores, k, 0.15);
            assert!(selected.len() <= k);
            assert!(selected.iter().all(|t| t.score > 0.15));
            assert!(selected.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }

    #[test]
    fn test_file_name_of() {
        assert_eq!(file_name_of(Path::new("/photos/kitchen.jpg")), "kitchen.jpg");
        assert_eq!(file_name_of(Path::new("den.png")), "den.png");
    }

    #[tokio::test]
    async fn test_analyze_combines_both_adapters() {
        let analyzer = analyzer(
            FixedScorer {
                scores: vec![("visible mold", 0.42), ("kitty litter", 0.22)],
            },
            Some(Arc::new(FixedDetector(vec!["cat", "bed"]))),
            fast_options(),
        );

        let record = analyzer.analyze(image(), Path::new("/home/den.jpg")).await;
        assert_eq!(record.file_name, "den.jpg");
        assert_eq!(
            record.tags,
            vec![
                ScoredTag::new("visible mold", 0.42),
                ScoredTag::new("kitty litter", 0.22)
            ]
        );
        assert_eq!(record.objects, vec!["cat", "bed"]);
        assert!(record.is_complete());
    }

    #[tokio::test]
    async fn test_detector_failure_keeps_scorer_tags() {
        let analyzer = analyzer(
            FixedScorer {
                scores: vec![("bleach", 0.6)],
            },
            Some(Arc::new(BrokenDetector)),
            fast_options(),
        );

        let record = analyzer.analyze(image(), Path::new("laundry.jpg")).await;
        assert_eq!(record.tags.len(), 1);
        assert!(record.objects.is_empty());
        assert_eq!(record.failures.len(), 1);
        assert_eq!(record.failures[0].stage, Stage::Detection);
        assert_eq!(record.failures[0].kind, FailureKind::ModelUnavailable);
    }

    #[tokio::test]
    async fn test_no_detector_means_no_objects() {
        let analyzer = analyzer(FixedScorer { scores: vec![] }, None, fast_options());
        let record = analyzer.analyze(image(), Path::new("hall.jpg")).await;
        assert!(record.objects.is_empty());
        assert!(record.tags.is_empty());
        assert!(record.is_complete());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let analyzer = analyzer(
            FlakyScorer {
                calls: AtomicU32::new(0),
                failures: 1,
            },
            None,
            fast_options(),
        );
        let record = analyzer.analyze(image(), Path::new("attic.jpg")).await;
        assert!(record.is_complete());
        assert_eq!(record.tags.len(), 1);
        assert_eq!(record.tags[0].tag, "air freshener");
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let analyzer = analyzer(
            FlakyScorer {
                calls: AtomicU32::new(0),
                failures: 5,
            },
            None,
            fast_options(),
        );
        let record = analyzer.analyze(image(), Path::new("attic.jpg")).await;
        assert!(record.tags.is_empty());
        assert_eq!(record.failures[0].kind, FailureKind::ModelUnavailable);
    }

    #[tokio::test]
    async fn test_slow_scorer_times_out() {
        let options = AnalyzerOptions {
            inference_timeout_ms: 50,
            retry: PipelineConfig {
                retry_attempts: 0,
                retry_delay_ms: 1,
            },
            ..AnalyzerOptions::default()
        };
        let analyzer = analyzer(SlowScorer, None, options);
        let record = analyzer.analyze(image(), Path::new("garage.jpg")).await;
        assert_eq!(record.failures.len(), 1);
        assert_eq!(record.failures[0].kind, FailureKind::Timeout);
        assert_eq!(record.failures[0].stage, Stage::Scoring);
    }

    #[tokio::test]
    async fn test_wedged_model_does_not_stall_next_image() {
        let options = AnalyzerOptions {
            inference_timeout_ms: 100,
            retry: PipelineConfig {
                retry_attempts: 0,
                retry_delay_ms: 1,
            },
            device_permits: 1,
            ..AnalyzerOptions::default()
        };
        let scorer = WedgedOnceScorer {
            calls: AtomicU32::new(0),
        };
        let analyzer = analyzer(scorer, None, options);

        let first = analyzer.analyze(image(), Path::new("attic.jpg")).await;
        assert_eq!(first.failures[0].kind, FailureKind::Timeout);

        // The first call still holds the only device permit.
        let started = std::time::Instant::now();
        let second = analyzer.analyze(image(), Path::new("cellar.jpg")).await;
        assert!(started.elapsed() < Duration::from_millis(1_000));
        assert_eq!(second.failures.len(), 1);
        assert_eq!(second.failures[0].kind, FailureKind::Timeout);
        assert_eq!(second.failures[0].stage, Stage::Scoring);
    }

    #[tokio::test]
    async fn test_score_count_mismatch_is_recorded() {
        let analyzer = analyzer(ShortScorer, None, fast_options());
        let record = analyzer.analyze(image(), Path::new("porch.jpg")).await;
        assert!(record.tags.is_empty());
        assert_eq!(record.failures[0].kind, FailureKind::ModelUnavailable);
    }

    #[test]
    fn test_prompts_follow_taxonomy_order() {
        let analyzer = analyzer(FixedScorer { scores: vec![] }, None, fast_options());
        assert_eq!(analyzer.prompts().len(), 25);
        assert_eq!(analyzer.prompts()[0], "a photo of air freshener");
        assert_eq!(analyzer.prompts()[12], "a photo of visible mold");
    }
}
