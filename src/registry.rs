//! Static registry of pro-tier model specifications
//!
//! Pure data: each logical model maps to its weight file name, remote
//! source, and the preprocessing parameters its network was trained with.

/// Activation applied to the raw network output
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    /// Pass the raw logits through unchanged
    Linear,
    /// Logistic squashing of the raw logits
    Sigmoid,
}

/// Immutable specification of one logical pro model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    /// Weight file name inside the model directory
    pub file_name: &'static str,
    /// Remote source for on-demand download, if any
    pub remote_url: Option<&'static str>,
    /// Per-channel normalization mean (RGB)
    pub normalization_mean: [f32; 3],
    /// Per-channel normalization std (RGB)
    pub normalization_std: [f32; 3],
    /// Network input resolution (width, height)
    pub target_size: (u32, u32),
    /// Activation applied to the raw output
    pub activation: OutputActivation,
    /// Human-readable label used in status reports and logs
    pub label: &'static str,
}

/// Closed set of known pro-tier models
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ModelKind {
    /// ISNet general-use segmentation (rembg release build)
    IsnetGeneral,
    /// MODNet webcam portrait matting
    ModnetPortrait,
    /// BiRefNet portrait segmentation
    BirefnetPortrait,
}

const ISNET_GENERAL: ModelSpec = ModelSpec {
    file_name: "isnet-general-use.onnx",
    remote_url: Some(
        "https://github.com/danielgatis/rembg/releases/download/v0.0.0/isnet-general-use.onnx",
    ),
    normalization_mean: [0.5, 0.5, 0.5],
    normalization_std: [0.5, 0.5, 0.5],
    target_size: (1024, 1024),
    activation: OutputActivation::Linear,
    label: "isnet-general",
};

const MODNET_PORTRAIT: ModelSpec = ModelSpec {
    file_name: "modnet_webcam_portrait_matting.onnx",
    remote_url: Some(
        "https://huggingface.co/onnx-community/modnet-webnn/resolve/main/onnx/model.onnx",
    ),
    normalization_mean: [0.5, 0.5, 0.5],
    normalization_std: [0.5, 0.5, 0.5],
    target_size: (512, 512),
    activation: OutputActivation::Linear,
    label: "modnet-portrait",
};

const BIREFNET_PORTRAIT: ModelSpec = ModelSpec {
    file_name: "BiRefNet-portrait-epoch_150.onnx",
    remote_url: Some(
        "https://github.com/ZhengPeng7/BiRefNet/releases/download/v1.0/BiRefNet-portrait-epoch_150.onnx",
    ),
    normalization_mean: [0.485, 0.456, 0.406],
    normalization_std: [0.229, 0.224, 0.225],
    target_size: (1024, 1024),
    activation: OutputActivation::Sigmoid,
    label: "birefnet-portrait",
};

impl ModelKind {
    /// All registered model kinds
    pub const ALL: [ModelKind; 3] = [
        ModelKind::IsnetGeneral,
        ModelKind::ModnetPortrait,
        ModelKind::BirefnetPortrait,
    ];

    /// Look up the static spec for this kind
    #[must_use]
    pub fn spec(self) -> &'static ModelSpec {
        match self {
            ModelKind::IsnetGeneral => &ISNET_GENERAL,
            ModelKind::ModnetPortrait => &MODNET_PORTRAIT,
            ModelKind::BirefnetPortrait => &BIREFNET_PORTRAIT,
        }
    }

    /// Resolve a logical name or short alias to a model kind
    ///
    /// One-level lookup only: either the spec label, a short alias, or the
    /// weight file stem.
    #[must_use]
    pub fn resolve(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "isnet" | "isnet-general" | "isnet-general-use" => Some(Self::IsnetGeneral),
            "modnet" | "modnet-portrait" | "modnet_webcam_portrait_matting" => {
                Some(Self::ModnetPortrait)
            },
            "birefnet" | "birefnet-portrait" => Some(Self::BirefnetPortrait),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.spec().label)
    }
}
