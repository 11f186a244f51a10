// ============================================================
// Layer 5 - Ball Classifier Architecture
// ============================================================
// Transfer learning on a ResNet backbone:
//
//   input [N, 3, S, S]
//     │
//     ▼
//   conv1 7x7/2 → bn1 → relu → maxpool 3x3/2       (stem)
//     │
//     ▼
//   layer1 → layer2 → layer3 → layer4              (BasicBlock stages)
//     │
//     ▼
//   adaptive avg pool → flatten → dropout → head   (2 logits)
//
// The backbone mirrors torchvision's ResNet-18 field names so
// ImageNet weights exported from PyTorch load straight into it
// (see `load_pretrained_backbone`). torchvision's 1000-class fc
// layer is never loaded: `head` is a fresh Linear(512, 2).
//
// `BackboneKind::Tiny` keeps the same topology with far fewer
// channels and one block per stage. It exists for CPU smoke
// runs and tests, and is never pretrained.

use std::path::Path;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    record::{FullPrecisionSettings, Recorder},
    tensor::{activation::relu, backend::AutodiffBackend},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use serde::{Deserialize, Serialize};

use crate::domain::{
    error::{PipelineError, PipelineResult},
    label::Label,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackboneKind {
    #[default]
    Resnet18,
    Tiny,
}

impl BackboneKind {
    /// (stem channels, per-stage channels, blocks per stage)
    fn layout(self) -> (usize, [usize; 4], [usize; 4]) {
        match self {
            BackboneKind::Resnet18 => (64, [64, 128, 256, 512], [2, 2, 2, 2]),
            BackboneKind::Tiny => (8, [8, 16, 16, 32], [1, 1, 1, 1]),
        }
    }

    pub fn feature_dim(self) -> usize {
        self.layout().1[3]
    }
}

/// Which parameters receive gradients during fine-tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FreezePolicy {
    /// Only the new classification head trains
    HeadOnly,
    /// layer4 and the head train; stem and layer1-3 stay frozen
    #[default]
    LastBlock,
    /// Every parameter trains
    Full,
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
#[derive(Config, Debug)]
pub struct BallClassifierConfig {
    pub backbone: BackboneKind,
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl BallClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> BallClassifier<B> {
        let (stem, stages, blocks) = self.backbone.layout();

        let conv1 = Conv2dConfig::new([3, stem], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);
        let bn1 = BatchNormConfig::new(stem).init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let layer1 = build_stage(stem, stages[0], blocks[0], 1, device);
        let layer2 = build_stage(stages[0], stages[1], blocks[1], 2, device);
        let layer3 = build_stage(stages[1], stages[2], blocks[2], 2, device);
        let layer4 = build_stage(stages[2], stages[3], blocks[3], 2, device);

        let backbone = ResNetBackbone {
            conv1,
            bn1,
            maxpool,
            layer1,
            layer2,
            layer3,
            layer4,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        };

        BallClassifier {
            backbone,
            dropout: DropoutConfig::new(self.dropout).init(),
            head: LinearConfig::new(stages[3], Label::COUNT).init(device),
        }
    }
}

fn build_stage<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    blocks: usize,
    stride: usize,
    device: &B::Device,
) -> Vec<BasicBlock<B>> {
    (0..blocks)
        .map(|i| {
            if i == 0 {
                BasicBlock::new(in_channels, out_channels, stride, device)
            } else {
                BasicBlock::new(out_channels, out_channels, 1, device)
            }
        })
        .collect()
}

fn conv3x3<B: Backend>(in_ch: usize, out_ch: usize, stride: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_ch, out_ch], [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .init(device)
}

// ─── Building blocks ──────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B, 2>,
    pub downsample: Option<Downsample<B>>,
}

impl<B: Backend> BasicBlock<B> {
    fn new(in_ch: usize, out_ch: usize, stride: usize, device: &B::Device) -> Self {
        let downsample = (stride != 1 || in_ch != out_ch).then(|| Downsample {
            conv: Conv2dConfig::new([in_ch, out_ch], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_ch).init(device),
        });

        Self {
            conv1: conv3x3(in_ch, out_ch, stride, device),
            bn1: BatchNormConfig::new(out_ch).init(device),
            conv2: conv3x3(out_ch, out_ch, 1, device),
            bn2: BatchNormConfig::new(out_ch).init(device),
            downsample,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(ds) => ds.bn.forward(ds.conv.forward(x.clone())),
            None => x.clone(),
        };
        let out = relu(self.bn1.forward(self.conv1.forward(x)));
        let out = self.bn2.forward(self.conv2.forward(out));
        relu(out + identity)
    }
}

#[derive(Module, Debug)]
pub struct ResNetBackbone<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub maxpool: MaxPool2d,
    pub layer1: Vec<BasicBlock<B>>,
    pub layer2: Vec<BasicBlock<B>>,
    pub layer3: Vec<BasicBlock<B>>,
    pub layer4: Vec<BasicBlock<B>>,
    pub avgpool: AdaptiveAvgPool2d,
}

impl<B: Backend> ResNetBackbone<B> {
    /// [N, 3, S, S] → [N, feature_dim]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.bn1.forward(self.conv1.forward(x)));
        let mut x = self.maxpool.forward(x);
        for block in self
            .layer1
            .iter()
            .chain(&self.layer2)
            .chain(&self.layer3)
            .chain(&self.layer4)
        {
            x = block.forward(x);
        }
        self.avgpool.forward(x).flatten::<2>(1, 3)
    }
}

#[derive(Module, Debug)]
pub struct BallClassifier<B: Backend> {
    pub backbone: ResNetBackbone<B>,
    pub dropout: Dropout,
    pub head: Linear<B>,
}

impl<B: Backend> BallClassifier<B> {
    /// images: [N, 3, S, S] → logits: [N, 2]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(images);
        self.head.forward(self.dropout.forward(features))
    }

    /// Softmax over the two classes: [N, 2], rows sum to one.
    pub fn forward_probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(images), 1)
    }

    /// Stop gradients for everything the policy keeps frozen.
    pub fn freeze(self, policy: FreezePolicy) -> Self {
        let BallClassifier {
            backbone,
            dropout,
            head,
        } = self;

        let backbone = match policy {
            FreezePolicy::Full => backbone,
            FreezePolicy::HeadOnly => backbone.no_grad(),
            FreezePolicy::LastBlock => ResNetBackbone {
                conv1: backbone.conv1.no_grad(),
                bn1: backbone.bn1.no_grad(),
                maxpool: backbone.maxpool,
                layer1: backbone.layer1.no_grad(),
                layer2: backbone.layer2.no_grad(),
                layer3: backbone.layer3.no_grad(),
                layer4: backbone.layer4,
                avgpool: backbone.avgpool,
            },
        };

        BallClassifier {
            backbone,
            dropout,
            head,
        }
    }
}

impl<B: AutodiffBackend> BallClassifier<B> {
    /// Cross-entropy loss and logits for one training batch.
    pub fn forward_loss(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(images);
        let loss = burn::nn::loss::CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), targets);
        (loss, logits)
    }
}

/// Load torchvision ResNet-18 ImageNet weights into the backbone.
///
/// torchvision stores downsample branches as a Sequential
/// (`downsample.0` / `downsample.1`); those keys are remapped onto
/// the named `conv` / `bn` fields. Keys without a counterpart (the
/// 1000-class `fc`) are ignored.
pub fn load_pretrained_backbone<B: Backend>(
    model: BallClassifier<B>,
    weights: &Path,
    device: &B::Device,
) -> PipelineResult<BallClassifier<B>> {
    let args = LoadArgs::new(weights.to_path_buf())
        .with_key_remap("(.+)\\.downsample\\.0\\.(.+)", "$1.downsample.conv.$2")
        .with_key_remap("(.+)\\.downsample\\.1\\.(.+)", "$1.downsample.bn.$2");

    let record: ResNetBackboneRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(args, device)
        .map_err(|e| PipelineError::model_load(weights, format!("pretrained weights: {e}")))?;

    tracing::info!("Loaded pretrained backbone weights from '{}'", weights.display());

    Ok(BallClassifier {
        backbone: model.backbone.load_record(record),
        dropout: model.dropout,
        head: model.head,
    })
}
