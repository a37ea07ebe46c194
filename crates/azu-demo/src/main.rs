//! Opens a window and draws a color grid, plus an optional texture given on the
//! command line:
//!
//!     azu-demo [image.png]

use std::path::PathBuf;

use anyhow::Result;
use azu_engine::logging::{init_logging, LoggingConfig};
use azu_engine::{Color, Context, CornerRadii, Fill, QuadOptions, Rect, Vec2};

const TEXTURE_NAME: &str = "demo";

const GRID_COLS: u32 = 8;
const GRID_ROWS: u32 = 6;
const CELL: f32 = 64.0;
const GAP: f32 = 8.0;

fn main() {
    init_logging(LoggingConfig::default());

    if let Err(err) = run() {
        log::error!("fatal: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let texture_path = std::env::args_os().nth(1).map(PathBuf::from);

    let mut ctx = Context::new("azu demo", 800, 600)?;

    let texture_size = match &texture_path {
        Some(path) if ctx.create_texture_from_file(TEXTURE_NAME, path) => Some(ctx.texture_dimensions(TEXTURE_NAME)?),
        _ => None,
    };

    loop {
        if ctx.poll_events().close_requested {
            break;
        }

        ctx.begin_frame()?;
        draw_grid(&mut ctx)?;
        if let Some(size) = texture_size {
            let fitted = fit_within(size, 180.0);
            ctx.submit_textured_quad(
                Rect::new(600.0, GAP, fitted.x, fitted.y),
                TEXTURE_NAME,
                QuadOptions::default().with_radii(CornerRadii::all(16.0)),
            )?;
        }
        ctx.end_frame()?;
    }

    log::info!("closed after {} frames", ctx.frame_number());
    Ok(())
}

fn draw_grid(ctx: &mut Context) -> Result<()> {
    let t = ctx.frame_number() as f32 / 120.0;

    for row in 0..GRID_ROWS {
        for col in 0..GRID_COLS {
            let x = GAP + col as f32 * (CELL + GAP);
            let y = GAP + row as f32 * (CELL + GAP);

            let u = col as f32 / (GRID_COLS - 1) as f32;
            let v = row as f32 / (GRID_ROWS - 1) as f32;
            let pulse = 0.5 + 0.5 * (t + u + v).sin();
            let color = Color::rgba(u, v, pulse, 1.0);

            if (row + col) % 2 == 0 {
                ctx.submit_quad(Rect::new(x, y, CELL, CELL), color)?;
            } else {
                ctx.submit(
                    Rect::new(x, y, CELL, CELL),
                    Fill::Color(color),
                    QuadOptions::default()
                        .with_radii(CornerRadii::all(CELL * 0.25))
                        .with_opacity(0.85),
                )?;
            }
        }
    }
    Ok(())
}

/// Scales `size` down so its longer side is at most `max`.
fn fit_within(size: Vec2, max: f32) -> Vec2 {
    let longest = size.x.max(size.y);
    if longest <= max || longest <= 0.0 {
        return size;
    }
    size * (max / longest)
}
