use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use tessel_engine::canvas::CanvasPreset;
use tessel_engine::library::DirectoryLibrary;
use tessel_engine::logging::{init_logging, LoggingConfig};
use tessel_engine::render::RendererConfig;
use tessel_engine::window::{Runtime, RuntimeConfig};

/// Tessel studio: paint on a tiled canvas.
#[derive(Parser, Debug)]
#[command(name = "tessel-studio", about = "Tile-based painting surface")]
struct Args {
    /// Library directory, created if missing.
    #[arg(env = "TESSEL_LIBRARY", default_value = "tessel-library", value_name = "LIBRARY_DIR")]
    library: PathBuf,

    /// Canvas to open. Defaults to the first canvas in the library; an empty
    /// library gets a new one.
    #[arg(value_name = "CANVAS_ID")]
    canvas: Option<String>,

    /// Size of a newly created canvas.
    #[arg(long, default_value = "1920x1080", value_parser = parse_size, value_name = "WxH")]
    size: (u32, u32),

    /// Create an unbounded canvas instead of a sized one.
    #[arg(long, conflicts_with = "size")]
    infinite: bool,

    /// Draw tiles outside the canvas bounds.
    #[arg(long)]
    show_overflow: bool,

    /// Log filter in env_logger syntax; falls back to RUST_LOG.
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {s:?}"))?;
    let w: u32 = w.trim().parse().map_err(|e| format!("bad width: {e}"))?;
    let h: u32 = h.trim().parse().map_err(|e| format!("bad height: {e}"))?;
    if w == 0 || h == 0 {
        return Err("canvas size must be non-zero".to_string());
    }
    Ok((w, h))
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(LoggingConfig {
        env_filter: args.log.clone(),
        ..LoggingConfig::default()
    });

    let library = DirectoryLibrary::open(&args.library)
        .with_context(|| format!("failed to open library {}", args.library.display()))?;

    let canvas_id = match args.canvas.clone() {
        Some(id) => id,
        None => match library.list_canvases()?.into_iter().next() {
            Some(id) => id,
            None => {
                let preset = if args.infinite {
                    CanvasPreset::INFINITE
                } else {
                    CanvasPreset::screen(args.size.0, args.size.1)
                };
                library.create_canvas(&preset)?
            }
        },
    };

    let preferences = library.preferences();
    log::info!(
        "opening canvas {canvas_id} from {} (touch drawing {})",
        library.root().display(),
        if preferences.general.touch_drawing { "on" } else { "off" }
    );

    let config = RuntimeConfig {
        title: format!("tessel: {canvas_id}"),
        renderer: RendererConfig {
            show_overflow: args.show_overflow,
            ..RendererConfig::default()
        },
        touch_drawing: preferences.general.touch_drawing,
        ..RuntimeConfig::default()
    };

    Runtime::run(config, Box::new(library), canvas_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canvas_size() {
        assert_eq!(parse_size("800x600"), Ok((800, 600)));
        assert_eq!(parse_size("1024X768"), Ok((1024, 768)));
        assert!(parse_size("800").is_err());
        assert!(parse_size("0x10").is_err());
    }
}
