//! Training driver for AlexNet on ImageNet
//!
//! Sequences the framework calls in the order of a typical run:
//!
//! 1. `new`: configure the device
//! 2. `load_data`: discover, check and sample the corpus
//! 3. `create_generator`: training and validation data loaders
//! 4. `build_model`: AlexNet and its SGD optimizer
//! 5. `train`: explicit forward/backward loop with per-epoch validation
//! 6. `predict` / `save`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::{
    data::dataloader::{batcher::Batcher, DataLoader},
    data::dataset::Dataset,
    module::{AutodiffModule, Module},
    nn::loss::CrossEntropyLossConfig,
    optim::{adaptor::OptimizerAdaptor, GradientsParams, Optimizer, Sgd},
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion, Int, Tensor},
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use super::scheduler::{LearningRateScheduler, LrSchedule};
use crate::backend::configure_device;
use crate::dataset::augmentation::{AugmentationConfig, Preprocessor};
use crate::dataset::burn_dataset::{
    create_generator_with, ImageNetBatch, ImageNetBatcher, ImageNetDataset,
};
use crate::dataset::labels::LabelMap;
use crate::dataset::loader::{Data, ImageNetSplit};
use crate::inference::predictor::{rows_to_results, PredictionResult, DEFAULT_TOP_K};
use crate::model::{self, AlexNet, AlexNetConfig, TrainingConfig};
use crate::utils::error::{AlexNetError, Result};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::{EpochMetrics, RunningAverage, TopKAccuracy};

type TrainLoader<B> = Arc<dyn DataLoader<B, ImageNetBatch<B>>>;
type ValidLoader<B> = Arc<dyn DataLoader<
    <B as AutodiffBackend>::InnerBackend,
    ImageNetBatch<<B as AutodiffBackend>::InnerBackend>,
>>;

/// Number of optimizer steps that make up one pass over `train_size` images
pub fn steps_per_epoch(train_size: usize, batch_size: usize) -> usize {
    (train_size / batch_size.max(1)).max(1)
}

/// Loss and accuracy of one pass over the validation generator
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: TopKAccuracy,
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Flattened f32 scores and usize labels of a batch
fn scores_and_labels<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
) -> (Vec<f32>, Vec<usize>) {
    let scores = logits.into_data().iter::<f32>().collect();
    let labels = targets
        .into_data()
        .iter::<i64>()
        .map(|l| l.max(0) as usize)
        .collect();
    (scores, labels)
}

pub struct Trainer<B: AutodiffBackend> {
    data_dir: PathBuf,
    device: B::Device,
    pub model_config: AlexNetConfig,
    pub config: TrainingConfig,

    train_split: Option<ImageNetSplit>,
    validation_split: Option<ImageNetSplit>,

    train_generator: Option<TrainLoader<B>>,
    validation_generator: Option<ValidLoader<B>>,
    batch_size: usize,

    model: Option<AlexNet<B>>,
    optimizer: Option<OptimizerAdaptor<Sgd<B::InnerBackend>, AlexNet<B>, B>>,

    /// Metrics of every finished epoch
    pub history: Vec<EpochMetrics>,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Configure the default device of `B`
    pub fn new<P: AsRef<Path>>(
        data_dir: P,
        model_config: AlexNetConfig,
        config: TrainingConfig,
    ) -> Self {
        let device = B::Device::default();
        configure_device::<B>(&device);

        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            device,
            batch_size: config.batch_size,
            model_config,
            config,
            train_split: None,
            validation_split: None,
            train_generator: None,
            validation_generator: None,
            model: None,
            optimizer: None,
            history: Vec::new(),
        }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Number of sampled training images, 0 before `load_data`
    pub fn train_size(&self) -> usize {
        self.train_split.as_ref().map_or(0, |s| s.len())
    }

    pub fn validation_size(&self) -> usize {
        self.validation_split.as_ref().map_or(0, |s| s.len())
    }

    /// Discover both splits, check the first training image and keep a
    /// seeded sample of each.
    pub fn load_data(&mut self, sample_fraction: f64, only_one: bool) -> Result<()> {
        let data = Data::load(&self.data_dir)?;
        let (train, validation) = data.sample(sample_fraction, only_one, self.config.seed)?;

        if train.is_empty() {
            return Err(AlexNetError::Dataset("training sample is empty".into()));
        }
        if train.num_classes() > self.model_config.num_classes {
            return Err(AlexNetError::Dataset(format!(
                "corpus has {} classes but the model predicts only {}",
                train.num_classes(),
                self.model_config.num_classes
            )));
        }
        if train.num_classes() < self.model_config.num_classes {
            info!(
                "Corpus has {} classes, model predicts {}",
                train.num_classes(),
                self.model_config.num_classes
            );
        }

        self.train_split = Some(train);
        self.validation_split = Some(validation);
        Ok(())
    }

    fn preprocessor(&self, training: bool) -> Preprocessor {
        let size = self.model_config.input_size as u32;
        Preprocessor::new(AugmentationConfig::new().with_image_size(size), training)
    }

    /// Training generator with `batch_size`, validation with the default
    pub fn create_generator(&mut self, batch_size: usize) -> Result<()> {
        let (train, validation) = match (&self.train_split, &self.validation_split) {
            (Some(t), Some(v)) => (ImageNetDataset::from_split(t), ImageNetDataset::from_split(v)),
            _ => return Err(AlexNetError::Training("load_data must run first".into())),
        };

        self.batch_size = batch_size.max(1);
        let workers = self.config.num_workers;
        let seed = self.config.seed;

        self.train_generator = Some(create_generator_with::<B>(
            train,
            self.preprocessor(true),
            self.batch_size,
            seed,
            workers,
        ));
        self.validation_generator = Some(create_generator_with::<B::InnerBackend>(
            validation,
            self.preprocessor(false),
            self.config.batch_size,
            seed,
            workers,
        ));

        debug!(
            "Generators ready: batch size {} (train), {} (validation)",
            self.batch_size, self.config.batch_size
        );
        Ok(())
    }

    /// Initialize AlexNet and the SGD optimizer
    pub fn build_model(&mut self) -> Result<()> {
        self.model_config.validate()?;
        self.config.validate()?;

        let model = self.model_config.init::<B>(&self.device);
        info!(
            "Built AlexNet: {} classes, {} parameters",
            self.model_config.num_classes,
            crate::utils::format_number(model.num_params())
        );

        self.optimizer = Some(self.config.optimizer().init::<B, AlexNet<B>>());
        self.model = Some(model);
        Ok(())
    }

    pub fn model(&self) -> Option<&AlexNet<B>> {
        self.model.as_ref()
    }

    /// Train for `dataset_iterations` epochs and return the epoch history.
    ///
    /// The model and optimizer stay on the trainer when an epoch fails.
    pub fn train(&mut self, dataset_iterations: usize) -> Result<&[EpochMetrics]> {
        let train_loader = self
            .train_generator
            .clone()
            .ok_or_else(|| AlexNetError::Training("create_generator must run first".into()))?;
        let valid_loader = self
            .validation_generator
            .clone()
            .ok_or_else(|| AlexNetError::Training("create_generator must run first".into()))?;
        let (model, mut optimizer) = match (self.model.take(), self.optimizer.take()) {
            (Some(model), Some(optimizer)) => (model, optimizer),
            (model, optimizer) => {
                self.model = model;
                self.optimizer = optimizer;
                return Err(AlexNetError::Training("build_model must run first".into()));
            }
        };

        let (model, outcome) = self.fit(
            model,
            &mut optimizer,
            train_loader,
            valid_loader,
            dataset_iterations,
        );
        self.model = Some(model);
        self.optimizer = Some(optimizer);

        outcome?;
        Ok(&self.history)
    }

    /// Epoch loop; hands the model back whether or not it succeeded
    fn fit(
        &mut self,
        mut model: AlexNet<B>,
        optimizer: &mut OptimizerAdaptor<Sgd<B::InnerBackend>, AlexNet<B>, B>,
        train_loader: TrainLoader<B>,
        valid_loader: ValidLoader<B>,
        epochs: usize,
    ) -> (AlexNet<B>, Result<()>) {
        let steps = steps_per_epoch(self.train_size(), self.batch_size);
        let mut scheduler = LearningRateScheduler::new(
            LrSchedule::from_config(&self.config),
            self.config.learning_rate,
        );
        let mut logger = TrainingLogger::new(epochs);
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);
        let mut best_top1 = 0.0f64;

        info!(
            "Training for {} epochs of {} steps (batch size {})",
            epochs, steps, self.batch_size
        );

        // The training stream repeats: a new pass starts whenever one ends
        let mut batches = train_loader.iter();

        for epoch in 0..epochs {
            logger.start_epoch(epoch);
            let lr = scheduler.lr();
            let mut train_loss = RunningAverage::new();
            let mut train_acc = TopKAccuracy::new(self.config.top_k);
            let pb = progress_bar(steps);

            for _ in 0..steps {
                let batch = match batches.next() {
                    Some(batch) => batch,
                    None => {
                        batches = train_loader.iter();
                        match batches.next() {
                            Some(batch) => batch,
                            None => {
                                pb.finish_and_clear();
                                let err = AlexNetError::Training(
                                    "training generator yielded no batches".into(),
                                );
                                return (model, Err(err));
                            }
                        }
                    }
                };

                let logits = model.forward(batch.images);
                let loss = loss_fn.forward(logits.clone(), batch.targets.clone());
                let loss_value: f64 = loss.clone().into_scalar().elem();
                train_loss.add(loss_value);

                let num_classes = logits.dims()[1];
                let (scores, labels) = scores_and_labels(logits.detach(), batch.targets);
                train_acc.add_batch(&scores, num_classes, &labels);

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(lr, model, grads);

                pb.set_message(format!("loss {:.4}", loss_value));
                pb.inc(1);
            }
            pb.finish_and_clear();

            let evaluation = evaluate(&model.valid(), valid_loader.as_ref(), self.config.top_k);
            let metrics = EpochMetrics {
                epoch: epoch + 1,
                train_loss: train_loss.average(),
                train_top_k: train_acc.top_k(),
                val_loss: evaluation.loss,
                val_top1: evaluation.accuracy.top1(),
                val_top_k: evaluation.accuracy.top_k(),
                learning_rate: lr,
            };

            logger.end_epoch(
                metrics.train_loss,
                metrics.val_loss,
                metrics.val_top1,
                metrics.val_top_k,
                lr,
            );

            best_top1 = best_top1.max(metrics.val_top1);
            scheduler.step(1.0 - metrics.val_top1);
            self.history.push(metrics);
        }

        logger.log_complete(best_top1);
        (model, Ok(()))
    }

    /// Class probabilities for preprocessed images, dropout disabled
    pub fn predict(
        &self,
        images: Tensor<B::InnerBackend, 4>,
    ) -> Result<Tensor<B::InnerBackend, 2>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| AlexNetError::Training("build_model must run first".into()))?;
        Ok(model.valid().forward_softmax(images))
    }

    /// Predict `count` augmented training images
    pub fn predict_samples(
        &self,
        count: usize,
        labels: Option<&LabelMap>,
    ) -> Result<Vec<PredictionResult>> {
        let split = self
            .train_split
            .as_ref()
            .ok_or_else(|| AlexNetError::Training("load_data must run first".into()))?;

        let dataset = ImageNetDataset::from_split(split);
        let items: Vec<_> = (0..count.min(dataset.len()))
            .filter_map(|i| dataset.get(i))
            .collect();
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let paths: Vec<Option<PathBuf>> = items.iter().map(|item| Some(item.path.clone())).collect();
        let batcher = ImageNetBatcher::new(self.preprocessor(true));
        let batch = Batcher::<B::InnerBackend, _, ImageNetBatch<B::InnerBackend>>::batch(
            &batcher,
            items,
            &self.device,
        );

        let start = std::time::Instant::now();
        let probs = self.predict(batch.images)?;
        let num_classes = probs.dims()[1];
        let probs: Vec<f32> = probs.into_data().iter::<f32>().collect();
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        Ok(rows_to_results(&probs, num_classes, labels, DEFAULT_TOP_K, &paths, elapsed_ms))
    }

    /// Save the current model to `<path>/alexnet/1`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| AlexNetError::Training("build_model must run first".into()))?;
        model::save(model, &self.model_config, path)
    }
}

/// Mean loss plus top-1 / top-k accuracy over a validation generator
pub fn evaluate<B: Backend>(
    model: &AlexNet<B>,
    loader: &dyn DataLoader<B, ImageNetBatch<B>>,
    top_k: usize,
) -> Evaluation {
    let mut loss = RunningAverage::new();
    let mut accuracy = TopKAccuracy::new(top_k);

    for batch in loader.iter() {
        let logits = model.forward(batch.images);
        let loss_fn = CrossEntropyLossConfig::new().init(&logits.device());
        let batch_loss: f64 = loss_fn
            .forward(logits.clone(), batch.targets.clone())
            .into_scalar()
            .elem();
        loss.add(batch_loss);

        let num_classes = logits.dims()[1];
        let (scores, labels) = scores_and_labels(logits, batch.targets);
        accuracy.add_batch(&scores, num_classes, &labels);
    }

    Evaluation {
        loss: loss.average(),
        accuracy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn write_corpus(root: &Path) {
        for split in ["train", "validation"] {
            for (c, class) in ["n01", "n02"].iter().enumerate() {
                let dir = root.join(split).join(class);
                std::fs::create_dir_all(&dir).unwrap();
                for i in 0..2 {
                    RgbImage::from_fn(40, 30, |x, y| {
                        let v = ((x + y + i + c as u32) * 7 % 256) as u8;
                        if x == 0 && y == 0 {
                            Rgb([0, 0, 0])
                        } else if x == 1 && y == 0 {
                            Rgb([255, 255, 255])
                        } else {
                            Rgb([v, v / 2, 255 - v])
                        }
                    })
                    .save(dir.join(format!("{}_{}.png", class, i)))
                    .unwrap();
                }
            }
        }
    }

    fn tiny_trainer(root: &Path) -> Trainer<TestBackend> {
        let model_config = AlexNetConfig::new()
            .with_num_classes(2)
            .with_input_size(163)
            .with_conv_filters([2, 4, 4, 4, 4])
            .with_hidden_units(8);
        let config = TrainingConfig::new()
            .with_batch_size(2)
            .with_num_workers(1)
            .with_top_k(1);
        Trainer::new(root, model_config, config)
    }

    #[test]
    fn test_steps_per_epoch() {
        assert_eq!(steps_per_epoch(120_000, 128), 937);
        assert_eq!(steps_per_epoch(1, 128), 1);
        assert_eq!(steps_per_epoch(10, 0), 10);
    }

    #[test]
    fn test_train_requires_generators() {
        let tmp = TempDir::new().unwrap();
        let mut trainer = tiny_trainer(tmp.path());
        assert!(matches!(trainer.train(1), Err(AlexNetError::Training(_))));
        assert!(trainer.create_generator(2).is_err());
    }

    #[test]
    fn test_end_to_end_training() {
        let tmp = TempDir::new().unwrap();
        write_corpus(tmp.path());

        let mut trainer = tiny_trainer(tmp.path());
        trainer.load_data(1.0, false).unwrap();
        assert_eq!(trainer.train_size(), 4);
        assert_eq!(trainer.validation_size(), 4);

        trainer.create_generator(2).unwrap();
        trainer.build_model().unwrap();

        let history = trainer.train(2).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|m| m.train_loss.is_finite() && m.val_loss.is_finite()));
        assert!(history.iter().all(|m| (0.0..=1.0).contains(&m.val_top1)));

        let predictions = trainer.predict_samples(3, None).unwrap();
        assert_eq!(predictions.len(), 3);
        assert!(predictions.iter().all(|p| p.predicted_class < 2));

        let out = tmp.path().join("out");
        let dir = trainer.save(&out).unwrap();
        assert_eq!(dir, out.join("alexnet").join("1"));
    }

    #[test]
    fn test_more_classes_than_outputs_rejected() {
        let tmp = TempDir::new().unwrap();
        write_corpus(tmp.path());

        let model_config = AlexNetConfig::new()
            .with_num_classes(1)
            .with_input_size(163)
            .with_conv_filters([2, 4, 4, 4, 4])
            .with_hidden_units(8);
        let mut trainer: Trainer<TestBackend> =
            Trainer::new(tmp.path(), model_config, TrainingConfig::new());

        assert!(matches!(
            trainer.load_data(1.0, false),
            Err(AlexNetError::Dataset(_))
        ));
        assert_eq!(trainer.train_size(), 0);
    }

    #[test]
    fn test_failed_training_keeps_model() {
        let tmp = TempDir::new().unwrap();
        write_corpus(tmp.path());

        let mut trainer = tiny_trainer(tmp.path());
        trainer.load_data(1.0, false).unwrap();
        trainer.create_generator(2).unwrap();
        trainer.build_model().unwrap();

        std::fs::remove_dir_all(tmp.path().join("train")).unwrap();

        assert!(matches!(trainer.train(1), Err(AlexNetError::Training(_))));
        assert!(trainer.model().is_some());
        assert!(trainer.history.is_empty());

        let out = tmp.path().join("out");
        assert!(trainer.save(&out).is_ok());
    }

    #[test]
    fn test_only_one_sample() {
        let tmp = TempDir::new().unwrap();
        write_corpus(tmp.path());

        let mut trainer = tiny_trainer(tmp.path());
        trainer.load_data(0.5, true).unwrap();
        assert_eq!(trainer.train_size(), 1);
        assert_eq!(trainer.validation_size(), 1);
    }
}
