//! Weight prefetch tool
//!
//! Downloads registry model weights into the model directory ahead of
//! time so a service start never pays the download on its first pro
//! request. Files already present are left alone.

#[cfg(feature = "cli")]
mod cli {
    use anyhow::Context;
    use clap::Parser;
    use cutout::{download, ModelKind, PipelineConfig};
    use std::path::{Path, PathBuf};
    use tracing::info;

    #[derive(Parser)]
    #[command(author, version, about = "Prefetch cutout model weights", long_about = None)]
    #[command(name = "fetch-models")]
    struct Cli {
        /// Model to fetch (name or alias); repeatable. Default: all registry models
        #[arg(short, long, value_name = "MODEL")]
        model: Vec<String>,

        /// Directory to place weight files in
        #[arg(long, value_name = "DIR")]
        model_dir: Option<PathBuf>,

        /// List registry models and exit
        #[arg(long)]
        list: bool,

        /// Enable debug logging
        #[arg(short, long)]
        verbose: bool,
    }

    pub fn main() -> anyhow::Result<()> {
        let cli = Cli::parse();

        let level = if cli.verbose { "debug" } else { "info" };
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
            )
            .init();

        if cli.list {
            for kind in ModelKind::ALL {
                let spec = kind.spec();
                println!(
                    "{:<20} {:>4}x{:<4} {}",
                    kind,
                    spec.target_size.0,
                    spec.target_size.1,
                    spec.file_name
                );
            }
            return Ok(());
        }

        let model_dir = cli
            .model_dir
            .unwrap_or_else(PipelineConfig::default_model_dir);
        std::fs::create_dir_all(&model_dir)
            .with_context(|| format!("creating model directory {}", model_dir.display()))?;

        let kinds: Vec<ModelKind> = if cli.model.is_empty() {
            ModelKind::ALL.to_vec()
        } else {
            cli.model
                .iter()
                .map(|name| {
                    ModelKind::resolve(name)
                        .with_context(|| format!("unknown model '{name}'"))
                })
                .collect::<anyhow::Result<_>>()?
        };

        for kind in kinds {
            let (path, bytes, skipped) = fetch_one(kind, &model_dir)?;
            let size_mb = bytes as f64 / (1024.0 * 1024.0);
            if skipped {
                info!(
                    model = %kind,
                    path = %path.display(),
                    "Already present ({size_mb:.1} MB), skipped"
                );
            } else {
                info!(
                    model = %kind,
                    path = %path.display(),
                    "Weight file ready ({size_mb:.1} MB)"
                );
            }
        }

        Ok(())
    }

    /// Resolve one model's weight file and its on-disk size
    ///
    /// Returns the path, the file size in bytes, and whether the file was
    /// already present (in which case no download ran).
    fn fetch_one(kind: ModelKind, model_dir: &Path) -> anyhow::Result<(PathBuf, u64, bool)> {
        let spec = kind.spec();
        let already_present = model_dir.join(spec.file_name).exists();
        let path = download::ensure_weight_file(spec, model_dir, true)
            .with_context(|| format!("fetching {kind}"))?;
        let bytes = std::fs::metadata(&path)
            .with_context(|| format!("reading size of {}", path.display()))?
            .len();
        Ok((path, bytes, already_present))
    }

}

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::main()
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
