//! The `hazardscan models` command.
//!
//! The CLIP scorer is fetched from the Hugging Face hub. The YOLO detector is
//! exported locally with Ultralytics, since its weights are not published as
//! ONNX; `models download` prints the export steps.

use std::path::Path;

use anyhow::Context;
use clap::{Args, Subcommand};
use hazardscan_core::detection::{DETECTOR_MODEL_FILENAME, LABELS_FILENAME};
use hazardscan_core::scoring::{TEXT_MODEL_FILENAME, TOKENIZER_FILENAME, VISION_MODEL_FILENAME};
use hazardscan_core::Config;

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Subcommands for model management.
#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// Download the CLIP scorer (vision encoder, text encoder, tokenizer)
    Download {
        /// Re-download files that already exist
        #[arg(long)]
        force: bool,
    },

    /// List expected model files and whether they are installed
    List,

    /// Show model directory path
    Path,
}

/// Hugging Face repository with ONNX exports of CLIP ViT-B/32.
const CLIP_REPO: &str = "Xenova/clip-vit-base-patch32";

/// One file of a downloadable model: where it lives remotely and locally.
struct RemoteFile {
    remote_path: &'static str,
    local_name: &'static str,
}

const CLIP_FILES: &[RemoteFile] = &[
    RemoteFile {
        remote_path: "onnx/vision_model.onnx",
        local_name: VISION_MODEL_FILENAME,
    },
    RemoteFile {
        remote_path: "onnx/text_model.onnx",
        local_name: TEXT_MODEL_FILENAME,
    },
    RemoteFile {
        remote_path: "tokenizer.json",
        local_name: TOKENIZER_FILENAME,
    },
];

/// Execute the models command.
pub async fn execute(args: ModelsArgs) -> anyhow::Result<()> {
    let config = Config::load()?;

    match args.command {
        ModelsCommand::Download { force } => {
            let client = reqwest::Client::new();
            let scorer_dir = config.scoring_model_dir();
            std::fs::create_dir_all(&scorer_dir)
                .with_context(|| format!("Failed to create {}", scorer_dir.display()))?;

            for file in CLIP_FILES {
                let dest = scorer_dir.join(file.local_name);
                if dest.exists() && !force {
                    tracing::info!("{} already exists at {:?}", file.local_name, dest);
                    continue;
                }
                let url = hub_url(CLIP_REPO, file.remote_path);
                tracing::info!("Downloading {}...", file.local_name);
                tracing::info!("  Source: {}", url);
                tracing::info!("  Destination: {:?}", dest);

                let digest = download_file(&client, &url, &dest).await?;
                let size = std::fs::metadata(&dest)?.len();
                tracing::info!(
                    "  {} complete ({:.1} MB, blake3 {})",
                    file.local_name,
                    size as f64 / (1024.0 * 1024.0),
                    digest
                );
            }

            let detector_dir = config.detection_model_dir();
            if detector_dir.join(DETECTOR_MODEL_FILENAME).exists() {
                tracing::info!("Detector already installed at {:?}", detector_dir);
            } else {
                println!("{}", detector_instructions(&config.detection.model, &detector_dir));
            }

            tracing::info!("Scorer downloads complete.");
        }

        ModelsCommand::List => {
            let model_dir = config.model_dir();
            println!("Model directory: {}\n", model_dir.display());

            let scorer_dir = config.scoring_model_dir();
            println!("  Scorer ({}):", config.scoring.model);
            for file in CLIP_FILES {
                print_status(file.local_name, &scorer_dir.join(file.local_name));
            }

            let detector_dir = config.detection_model_dir();
            let enabled = if config.detection.enabled {
                ""
            } else {
                "  (disabled in config)"
            };
            println!("\n  Detector ({}){}:", config.detection.model, enabled);
            print_status(DETECTOR_MODEL_FILENAME, &detector_dir.join(DETECTOR_MODEL_FILENAME));
            let labels = detector_dir.join(LABELS_FILENAME);
            let label_status = if labels.exists() {
                "custom"
            } else {
                "COCO (built in)"
            };
            println!("    - {:24} {}", LABELS_FILENAME, label_status);
        }

        ModelsCommand::Path => {
            println!("{}", config.model_dir().display());
        }
    }

    Ok(())
}

fn hub_url(repo: &str, remote_path: &str) -> String {
    format!("https://huggingface.co/{repo}/resolve/main/{remote_path}")
}

fn print_status(name: &str, path: &Path) {
    let status = if path.exists() {
        "ready"
    } else {
        "not installed"
    };
    println!("    - {:24} {}", name, status);
}

fn detector_instructions(model: &str, detector_dir: &Path) -> String {
    format!(
        "The object detector is not downloaded automatically. Export it with Ultralytics:\n\n  \
         pip install ultralytics\n  \
         yolo export model={model}.pt format=onnx\n  \
         mkdir -p {dir}\n  \
         cp {model}.onnx {dir}/{file}\n\n\
         Optionally add {labels} (one class name per line) for a custom-trained model.\n\
         Without a detector, run scans with --no-detector.",
        dir = detector_dir.display(),
        file = DETECTOR_MODEL_FILENAME,
        labels = LABELS_FILENAME,
    )
}

/// Stream `url` to `dest`, returning the BLAKE3 digest of the bytes written.
///
/// Data goes to a `.part` file first and is renamed into place only after the
/// whole body arrived, so an interrupted download never looks installed.
async fn download_file(client: &reqwest::Client, url: &str, dest: &Path) -> anyhow::Result<String> {
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    let response = client
        .get(url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| anyhow::anyhow!("Download failed: {e}"))?;

    let total_size = response.content_length();
    if let Some(size) = total_size {
        tracing::info!("  Size: {:.1} MB", size as f64 / (1024.0 * 1024.0));
    }

    let partial = dest.with_extension("part");
    let mut file = tokio::fs::File::create(&partial).await?;
    let mut hasher = blake3::Hasher::new();
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;

        if let Some(total) = total_size {
            if downloaded % (50 * 1024 * 1024) < chunk.len() as u64 {
                tracing::info!(
                    "  Progress: {:.0}%",
                    downloaded as f64 / total as f64 * 100.0
                );
            }
        }
    }

    file.flush().await?;
    drop(file);
    tokio::fs::rename(&partial, dest)
        .await
        .with_context(|| format!("Failed to move download into {}", dest.display()))?;

    Ok(hasher.finalize().to_hex().to_string())
}
