use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, info, warn};
use simplelog::{Config, WriteLogger};

use flipbook::panic_handler::initialize_panic_handler;
use flipbook::pdf::{BaseLayer, MupdfSource, PREP_FRAMES, PageSlot};
use flipbook::settings::{self, current_settings, load_settings, load_settings_from_path};
use flipbook::{DocumentLocation, FlipEvent, FlipStart, Viewer, ViewerConfig};

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Page through a PDF the way the magazine viewer does
#[derive(Parser, Debug)]
#[command(name = "flipbook", version, about)]
struct Cli {
    /// PDF file to open
    #[arg(value_name = "PDF")]
    pdf: PathBuf,

    /// Single-page layout instead of two-page spreads
    #[arg(long)]
    mobile: bool,

    /// Device pixel ratio used to pick the render scale
    #[arg(long, default_value_t = 1.0)]
    dpr: f32,

    /// Stop after this many page turns
    #[arg(long, value_name = "N")]
    flips: Option<usize>,

    /// Write visible pages and turning-sheet faces as PNG files into DIR
    #[arg(long, value_name = "DIR")]
    export: Option<PathBuf>,

    /// Skip the background preload sweep
    #[arg(long)]
    no_preload: bool,

    /// Settings file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "PATH", default_value = "flipbook.log")]
    log_file: PathBuf,

    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> Result<()> {
    initialize_panic_handler();
    let cli = Cli::parse();

    WriteLogger::init(
        cli.log_level,
        Config::default(),
        File::create(&cli.log_file)
            .with_context(|| format!("cannot create log file {}", cli.log_file.display()))?,
    )?;
    info!("Starting flipbook");

    match &cli.config {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    if cli.no_preload {
        settings::set_preload_enabled(false);
    }
    let settings = current_settings();

    let config = ViewerConfig::from_settings(&settings).with_device_pixel_ratio(cli.dpr);
    let source = Arc::new(MupdfSource::new(settings.render_workers));
    let mut viewer = Viewer::new(source, config);
    viewer.set_mobile(cli.mobile);

    let session = viewer
        .open(&DocumentLocation::Path(cli.pdf.clone()))
        .with_context(|| format!("cannot open {}", cli.pdf.display()))?;
    println!(
        "{}: {} pages, rendered at {:.2}x",
        cli.pdf.display(),
        session.page_count,
        session.render_scale
    );

    if let Some(report) = viewer.wait_for_preload() {
        println!(
            "Preloaded {}/{} pages in {} batches ({} failed)",
            report.rendered, session.page_count, report.batches, report.failed
        );
    }

    if let Some(dir) = &cli.export {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create export directory {}", dir.display()))?;
    }

    show(&viewer, cli.export.as_deref(), 0)?;

    let limit = cli.flips.unwrap_or(usize::MAX);
    let mut step = 0;
    while step < limit && viewer.can_go_next() {
        step += 1;
        match viewer.next() {
            FlipStart::Resolving(ticket) => turn_page(&mut viewer, cli.export.as_deref(), step)
                .with_context(|| format!("page turn {ticket} failed"))?,
            FlipStart::MobilePage(_) => {}
            FlipStart::Ignored => break,
        }
        show(&viewer, cli.export.as_deref(), step)?;
    }

    viewer.close();
    info!("Shutting down flipbook");
    Ok(())
}

/// Drive one desktop page turn to completion the way a shell would
fn turn_page(viewer: &mut Viewer, export: Option<&Path>, step: usize) -> Result<()> {
    match viewer.wait_resolution(RESOLVE_TIMEOUT) {
        Some(FlipEvent::Mounted(key)) => {
            info!("Turning {key}");
            if let (Some(dir), Some(flip)) = (export, viewer.layers().flip) {
                export_slot(dir, &format!("{step:03}-front"), &flip.front)?;
                export_slot(dir, &format!("{step:03}-back"), &flip.back)?;
            }
        }
        Some(FlipEvent::Failed { error, .. }) => bail!(error),
        None => bail!("pages were not ready after {RESOLVE_TIMEOUT:?}"),
    }

    let mut rotating = false;
    for _ in 0..PREP_FRAMES {
        if viewer.on_animation_frame().is_some() {
            rotating = true;
            break;
        }
    }
    if !rotating || viewer.on_transition_settled().is_none() {
        bail!("transition did not settle");
    }
    Ok(())
}

fn show(viewer: &Viewer, export: Option<&Path>, step: usize) -> Result<()> {
    if let Err(e) = viewer.render_visible() {
        warn!("Some visible pages failed to render: {e}");
    }
    println!("{}", viewer.current_label());

    let Some(dir) = export else {
        return Ok(());
    };
    match viewer.layers().base {
        BaseLayer::Empty => {}
        BaseLayer::Single(slot) => export_slot(dir, &format!("{step:03}-page"), &slot)?,
        BaseLayer::Spread { left, right } => {
            export_slot(dir, &format!("{step:03}-left"), &left)?;
            export_slot(dir, &format!("{step:03}-right"), &right)?;
        }
    }
    Ok(())
}

fn export_slot(dir: &Path, prefix: &str, slot: &PageSlot) -> Result<()> {
    let PageSlot::Ready(page, bitmap) = slot else {
        return Ok(());
    };
    let path = dir.join(format!("{prefix}-p{page:03}.png"));
    let image = image::RgbImage::from_raw(bitmap.width_px, bitmap.height_px, bitmap.pixels.clone())
        .with_context(|| format!("page {page} has a malformed pixel buffer"))?;
    image
        .save(&path)
        .with_context(|| format!("cannot write {}", path.display()))?;
    info!("Exported page {page} to {}", path.display());
    Ok(())
}
