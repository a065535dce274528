use anyhow::Context;
use captcha_segmenter::batch;
use captcha_segmenter::classifiers::template_loader;
use captcha_segmenter::config::{Config, ServeArgs};
use captcha_segmenter::preprocessing::Pipeline;
use captcha_segmenter::{
    evaluate_accuracy, ClassifierRegistry, ImageInput, Predictor, RasterBuffer,
    SegmentationResult, Segmenter, StyleStore,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "captcha-segmenter")]
#[command(about = "CAPTCHA cleaning, calibration and character segmentation")]
#[command(version)]
pub struct Cli {
    /// Directory holding one JSON file per CAPTCHA style
    #[arg(long, global = true, env = "CAPTCHA_STYLES_DIR", default_value = "styles")]
    pub styles_dir: PathBuf,

    /// Directory the style `folder` entries are relative to
    #[arg(long, global = true, env = "CAPTCHA_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Clean a style's samples, calibrate its threshold and extract characters
    Process {
        /// Style names; all styles when omitted
        styles: Vec<String>,
    },
    /// Segment a single image and print the character boxes as JSON
    Segment {
        /// Style the image belongs to
        #[arg(long)]
        style: String,
        image: PathBuf,
    },
    /// Read the text of one CAPTCHA using the style's extracted characters
    Predict {
        /// Style the image belongs to
        #[arg(long)]
        style: String,
        /// Image file, or the image itself in base64
        image: String,
        #[command(flatten)]
        classifier: ClassifierArgs,
    },
    /// Predict labelled samples and report how many were read correctly
    Accuracy {
        /// Style the samples belong to
        #[arg(long)]
        style: String,
        /// Folder of `<label>*.png` samples; the style's folder when omitted
        #[arg(long)]
        samples: Option<PathBuf>,
        #[command(flatten)]
        classifier: ClassifierArgs,
    },
    /// Run the HTTP segmentation service
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct ClassifierArgs {
    /// Side of the square each glyph is resized to before classification
    #[arg(long, env = "CAPTCHA_GLYPH_SIZE", default_value = "20")]
    pub glyph_size: u32,
}

impl ClassifierArgs {
    fn predictor(&self, data_dir: PathBuf) -> Predictor {
        let size = (self.glyph_size, self.glyph_size);
        Predictor::new(ClassifierRegistry::new(template_loader(data_dir, size)))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting captcha-segmenter v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Process { styles } => {
            let mut store = StyleStore::load_dir(&cli.styles_dir)?;
            let names: Vec<String> = if styles.is_empty() {
                store.names().into_iter().map(str::to_string).collect()
            } else {
                styles
            };

            let data_dir = cli.data_dir;
            let reports = tokio::task::spawn_blocking(move || {
                names
                    .iter()
                    .map(|name| {
                        let style = store.get_mut(name)?;
                        batch::process_style(&data_dir, style)
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .await??;

            println!("{}", serde_json::to_string_pretty(&reports)?);
            Ok(())
        }
        Command::Segment { style, image } => {
            let store = StyleStore::load_dir(&cli.styles_dir)?;
            let style = store.get(&style)?;
            let segmenter = Segmenter::new(style.captcha_length(), style.require_threshold()?);

            let buffer = RasterBuffer::open(&image)?;
            let cleaned = style.pipeline().run(buffer)?;
            let prepared = Pipeline::pre_segmentation().run(cleaned)?;

            let output = match segmenter.segment(&prepared)? {
                SegmentationResult::Success(boxes) => {
                    serde_json::json!({ "success": true, "boxes": boxes })
                }
                SegmentationResult::Failure => serde_json::json!({ "success": false }),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Command::Predict {
            style,
            image,
            classifier,
        } => {
            let store = StyleStore::load_dir(&cli.styles_dir)?;
            let style = store.get(&style)?;
            let predictor = classifier.predictor(cli.data_dir);

            let buffer = ImageInput::parse(&image).load()?;
            let prediction = predictor.predict(style, buffer)?;
            tracing::info!(style = style.name(), %prediction, "Prediction");

            let output = serde_json::json!({
                "style": style.name(),
                "success": prediction.text().is_some(),
                "prediction": prediction.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Command::Accuracy {
            style,
            samples,
            classifier,
        } => {
            let store = StyleStore::load_dir(&cli.styles_dir)?;
            let style = store.get(&style)?;
            let folder = samples.unwrap_or_else(|| cli.data_dir.join(style.folder()));
            let samples = batch::list_samples(&folder)?;
            let predictor = classifier.predictor(cli.data_dir);

            let report = evaluate_accuracy(&predictor, style, &samples)?;
            let output = serde_json::json!({
                "style": style.name(),
                "report": report,
                "accuracy_percent": report.accuracy_percent(),
                "skipped_percent": report.skipped_percent(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Command::Serve(args) => {
            let config = Config::new(args, cli.styles_dir);
            tracing::info!("Binding to {}", config.addr());
            captcha_segmenter::server::run(config)
                .await
                .context("server failed")
        }
    }
}
