use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use vigil_core::generator;
use vigil_core::{LandmarkExtractor, OnnxLandmarkExtractor, UserDirectory};

#[derive(Parser)]
#[command(name = "vigil", about = "Vigil identity verification tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract reference landmarks for every user and write the landmark file
    Generate {
        /// User dataset (TOML); defaults to the built-in dataset
        #[arg(long)]
        users: Option<PathBuf>,
        /// Directory holding the reference photos
        #[arg(long, default_value = "photos")]
        photos: PathBuf,
        /// Landmark file to write (overwritten)
        #[arg(short, long, default_value = "user_landmarks.json")]
        output: PathBuf,
        /// Directory containing det_10g.onnx and face_landmark.onnx
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Print the region landmarks extracted from a single photo
    Inspect {
        /// Image file to analyse
        photo: PathBuf,
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// List the users in the dataset
    Users {
        #[arg(long)]
        users: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            users,
            photos,
            output,
            model_dir,
        } => {
            let directory = load_directory(users.as_deref())?;
            let mut extractor = load_extractor(model_dir)?;

            let (file, summary) = generator::generate(&directory, &photos, &mut extractor);
            file.save(&output)
                .with_context(|| format!("failed to write {}", output.display()))?;

            println!(
                "Saved landmarks for {} of {} users to {} ({} without a face, {} failed, {} photos missing)",
                summary.processed,
                directory.len(),
                output.display(),
                summary.no_face,
                summary.failed,
                summary.missing,
            );
        }
        Commands::Inspect { photo, model_dir } => {
            let mut extractor = load_extractor(model_dir)?;
            let rgb = image::open(&photo)
                .with_context(|| format!("failed to read {}", photo.display()))?
                .to_rgb8();

            match extractor.extract(&rgb)? {
                Some(set) => println!("{}", serde_json::to_string_pretty(&set)?),
                None => println!("No face detected in {}", photo.display()),
            }
        }
        Commands::Users { users } => {
            let directory = load_directory(users.as_deref())?;
            for user in directory.users() {
                println!(
                    "{}  {:<24} national_id={} tax_id={} passport={} photo={}",
                    user.id,
                    user.name,
                    user.national_id,
                    user.tax_id,
                    user.passport,
                    user.photo.as_deref().unwrap_or("-"),
                );
            }
        }
    }

    Ok(())
}

fn load_directory(path: Option<&Path>) -> Result<UserDirectory> {
    UserDirectory::load_or_embedded(path).context("failed to load user dataset")
}

fn load_extractor(model_dir: Option<PathBuf>) -> Result<OnnxLandmarkExtractor> {
    let dir = model_dir.unwrap_or_else(vigil_core::default_model_dir);
    OnnxLandmarkExtractor::load(&dir)
        .with_context(|| format!("failed to load models from {}", dir.display()))
}
