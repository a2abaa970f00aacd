//! Image Classification App
//!
//! Headless driver: loads the packaged model once, classifies each supplied
//! image on a dedicated worker and publishes results to a view over a channel.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use classifier::{
    Classifier, ClassifierConfig, ClassifierWorker, LabelMap, ModelLoader, ModelRuntime,
    Prediction, DEFAULT_MODEL_NAME,
};
use image_prep::{InputSpec, Normalization};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Default config file, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "classifier.toml";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding packaged model assets
    pub model_dir: PathBuf,
    /// Model asset name inside `model_dir`
    pub model_name: String,
    /// Optional newline-separated class labels
    pub labels_path: Option<PathBuf>,
    /// Pixel normalisation applied before classification
    pub normalization: Normalization,
    /// Classifier settings
    pub classifier: ClassifierConfig,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines
    pub log_json: bool,
    /// Images to classify
    pub images: Vec<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("assets"),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            labels_path: None,
            normalization: Normalization::default(),
            classifier: ClassifierConfig::default(),
            log_level: "info".to_string(),
            log_json: false,
            images: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Layer an optional TOML file under `CLASSIFIER__<FIELD>` environment overrides.
    ///
    /// Nested fields use `__` as well, e.g. `CLASSIFIER__CLASSIFIER__TOP_K=5`.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("CLASSIFIER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("reading configuration from {}", path.display()))?;

        Ok(settings.try_deserialize()?)
    }
}

/// Parse a configured log level name
pub fn parse_level(level: &str) -> anyhow::Result<Level> {
    Level::from_str(level).map_err(|_| anyhow::anyhow!("invalid log level {:?}", level))
}

/// Initialize logging
pub fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let level = parse_level(level)?;
    let builder = FmtSubscriber::builder().with_max_level(level).with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Outcome of one image, sent to the view
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClassificationEvent {
    Classified {
        source: PathBuf,
        prediction: Prediction,
    },
    Failed {
        source: PathBuf,
        error: String,
    },
}

/// UI-facing state, changed only by events from the result channel
#[derive(Debug, Clone, Default)]
pub struct ResultView {
    /// Text shown for the latest classification
    pub result: String,
    /// Every event received, in order
    pub history: Vec<ClassificationEvent>,
}

impl ResultView {
    /// Apply one event
    pub fn apply(&mut self, event: ClassificationEvent) {
        match &event {
            ClassificationEvent::Classified { prediction, .. } => {
                self.result = format!("Classification Result: {}", prediction.label);
            }
            ClassificationEvent::Failed { source, error } => {
                warn!("Classification of {} failed: {}", source.display(), error);
            }
        }
        self.history.push(event);
    }

    /// Consume events until the channel closes
    pub async fn follow(mut events: mpsc::Receiver<ClassificationEvent>) -> Self {
        let mut view = Self::default();
        while let Some(event) = events.recv().await {
            view.apply(event);
        }
        view
    }
}

/// Load the configured model and classify `config.images`
pub async fn run(config: &AppConfig) -> anyhow::Result<ResultView> {
    let loader = ModelLoader::new(&config.model_dir);
    info!("Loading {} from {}", config.model_name, loader.asset_dir().display());
    let runtime = loader.load_runtime(&config.model_name)?;
    let classifier = Classifier::new(runtime, config.classifier.clone())?;
    run_with(classifier, config).await
}

/// Classify `config.images` with an already constructed classifier.
///
/// The worker is shut down before returning on every path past its spawn.
pub async fn run_with<R>(classifier: Classifier<R>, config: &AppConfig) -> anyhow::Result<ResultView>
where
    R: ModelRuntime + 'static,
{
    let labels = match &config.labels_path {
        Some(path) => LabelMap::from_file(path)?,
        None => LabelMap::default(),
    };
    let spec = InputSpec::from_nhwc(classifier.input_shape().dims())?;
    let worker = ClassifierWorker::spawn(classifier, labels)?;

    let (events, receiver) = mpsc::channel(16);
    let view = tokio::spawn(ResultView::follow(receiver));

    let outcome = classify_all(&worker, &config.images, &spec, &config.normalization, &events).await;
    drop(events);

    let shutdown = worker.shutdown().await;
    let view = view.await?;
    outcome?;
    shutdown?;

    info!("Classified {} images", view.history.len());
    Ok(view)
}

async fn classify_all(
    worker: &ClassifierWorker,
    images: &[PathBuf],
    spec: &InputSpec,
    norm: &Normalization,
    events: &mpsc::Sender<ClassificationEvent>,
) -> anyhow::Result<()> {
    for source in images {
        let event = match classify_one(worker, source, spec, norm).await {
            Ok(prediction) => {
                info!("{} -> {} ({:.3})", source.display(), prediction.label, prediction.score);
                ClassificationEvent::Classified {
                    source: source.clone(),
                    prediction,
                }
            }
            Err(e) => ClassificationEvent::Failed {
                source: source.clone(),
                error: format!("{:#}", e),
            },
        };
        events.send(event).await.context("result view went away")?;
    }
    Ok(())
}

async fn classify_one(
    worker: &ClassifierWorker,
    source: &Path,
    spec: &InputSpec,
    norm: &Normalization,
) -> anyhow::Result<Prediction> {
    let frame = image_prep::decode_file(source, spec.channels)?;
    let pixels = image_prep::preprocess(&frame, spec, norm)?;
    image_prep::check_input(&pixels, spec)?;
    Ok(worker.predict(pixels).await?)
}
