use bytesize::ByteSize;
use clap::Parser;
use image::RgbImage;
use std::error::Error;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use retina_analyzer::detection::{DetectionFile, ModelSet};
use retina_analyzer::narration::{
    ChatConfig, NarrationRequest, Narrator, OpenRouterClient, ScanContext,
};
use retina_analyzer::processing::render::VesselView;
use retina_analyzer::report::distance_table;
use retina_analyzer::{AnalysisSession, Analyzer, VesselSettings};

#[derive(Parser, Debug)]
#[command(
    name = "retina",
    about = "Analyze a fundus photograph from recorded model outputs and write reports and overlays",
    version
)]
struct Cli {
    /// Fundus image to analyze
    #[arg(short = 'i', long = "image")]
    image: PathBuf,

    /// JSON file with recorded severity, lesion and landmark detections
    #[arg(short = 'd', long = "detections")]
    detections: Option<PathBuf>,

    /// JSON file with vessel settings; missing fields keep their defaults
    #[arg(short = 's', long = "settings")]
    settings: Option<PathBuf>,

    /// Output directory
    #[arg(short = 'o', long = "out", default_value = "retina_out")]
    out: PathBuf,

    /// Force traditional vessel segmentation
    #[arg(long = "traditional")]
    traditional: bool,

    /// Skip morphological post-processing of the vessel mask
    #[arg(long = "no-post-process")]
    no_post_process: bool,

    /// Also write the lesion heatmap blended over the annotated image
    #[arg(long = "heatmap")]
    heatmap: bool,

    /// Ask the narration service for a clinical assessment
    #[arg(long = "narrate")]
    narrate: bool,

    /// Ask the narration service a question about the scan
    #[arg(long = "ask")]
    ask: Option<String>,
}

fn is_image_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(OsStr::to_str) else {
        return false;
    };
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "png" | "jpg" | "jpeg" | "bmp" | "tif" | "tiff" | "webp"
    )
}

fn write_text_file(path: &Path, contents: &str) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

fn save_image(image: &RgbImage, path: &Path) {
    if let Err(e) = image.save(path) {
        eprintln!("Failed to save {}: {e}", path.display());
    }
}

fn load_settings(cli: &Cli) -> Result<VesselSettings, Box<dyn Error>> {
    let mut settings = match &cli.settings {
        Some(path) => VesselSettings::load(path)?,
        None => VesselSettings::default(),
    };
    if cli.traditional {
        settings.use_model = false;
    }
    if cli.no_post_process {
        settings.post_process = false;
    }
    Ok(settings)
}

fn load_models(path: Option<&Path>) -> Result<ModelSet, Box<dyn Error>> {
    Ok(match path {
        Some(path) => DetectionFile::load(path)?.into_models(),
        None => ModelSet::default(),
    })
}

fn write_outputs(cli: &Cli, analyzer: &Analyzer, session: &mut AnalysisSession) -> Result<(), Box<dyn Error>> {
    let out = &cli.out;
    fs::create_dir_all(out)?;

    write_text_file(&out.join("report.txt"), &analyzer.report(session))?;
    save_image(&session.annotated_image(), &out.join("annotated.png"));

    if session.vessels.is_some() {
        let settings = analyzer.settings();
        for (view, name) in [
            (VesselView::Overlay, "vessel_overlay.png"),
            (VesselView::VesselsOnly, "vessels_only.png"),
        ] {
            session.display.vessel_view = view;
            save_image(&session.display_image(settings), &out.join(name));
        }
        session.display.vessel_view = VesselView::Off;
    }

    if cli.heatmap {
        session.toggle_heatmap();
        save_image(&session.annotated_image(), &out.join("heatmap.png"));
        session.toggle_heatmap();
    }

    let mut summary = session.lesion_summary();
    summary.push_str("\n\n");
    for entry in session.lesion_gallery() {
        save_image(&entry.thumbnail, &out.join(format!("lesion_{}.png", entry.index)));
        summary.push_str(&format!(
            "Lesion {}: {} ({:.2}) {}\n",
            entry.index + 1,
            entry.lesion.class_name,
            entry.lesion.confidence,
            entry.measurement.outcome
        ));
    }
    let rows = session.lesion_distances();
    if !rows.is_empty() {
        summary.push('\n');
        summary.push_str(&distance_table(&rows));
    }
    write_text_file(&out.join("lesion_summary.txt"), &summary)?;
    Ok(())
}

async fn narrate(cli: &Cli, context: ScanContext) {
    let client = OpenRouterClient::new(ChatConfig::from_env());
    let (mut narrator, mut events) = Narrator::new(client);
    if !narrator.is_configured() {
        eprintln!("Narration skipped: OPENROUTER_API_KEY is not set");
        return;
    }

    let mut requests = Vec::new();
    if cli.narrate {
        requests.push(("Assessment", NarrationRequest::Assessment(context.clone())));
    }
    if let Some(question) = &cli.ask {
        requests.push((
            "Answer",
            NarrationRequest::Question {
                context,
                question: question.clone(),
            },
        ));
    }

    for (title, request) in requests {
        let id = narrator.request(request);
        while let Some(event) = events.recv().await {
            if event.id != id {
                continue;
            }
            match event.result {
                Ok(text) => println!("\n=== {title} ===\n{text}"),
                Err(e) => eprintln!("{title} failed: {e}"),
            }
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if !cli.image.is_file() || !is_image_file(&cli.image) {
        return Err(format!("Not an image file: {}", cli.image.display()).into());
    }

    let settings = load_settings(&cli)?;
    let models = load_models(cli.detections.as_deref())?;
    let analyzer = Analyzer::new(models, settings);

    let image_path = cli.image.clone();
    let (analyzer, mut session) = tokio::task::spawn_blocking(move || {
        let size = fs::metadata(&image_path).map(|m| m.len()).unwrap_or(0);
        let image = image::open(&image_path)?.to_rgb8();
        info!(
            path = %image_path.display(),
            size = %ByteSize::b(size),
            width = image.width(),
            height = image.height(),
            "image loaded"
        );
        let session = analyzer.analyze(image);
        Ok::<_, image::ImageError>((analyzer, session))
    })
    .await??;

    write_outputs(&cli, &analyzer, &mut session)?;
    info!(out = %cli.out.display(), "outputs written");

    let context = ScanContext::from_session(&session);
    match serde_json::to_string_pretty(&context) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!("scan context not serializable: {e}"),
    }

    if cli.narrate || cli.ask.is_some() {
        narrate(&cli, context).await;
    }
    Ok(())
}
