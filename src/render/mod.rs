//! Terminal render targets for the engine's RGBA frames.

mod ascii;
mod halfblock;
mod kitty;

pub use ascii::AsciiRenderer;
pub use halfblock::HalfBlockRenderer;
pub use kitty::KittyRenderer;

use std::io::Write;

pub struct Frame<'a> {
    pub term_cols: u16,
    pub term_rows: u16,
    pub visual_rows: u16,
    pub pixel_width: usize,
    pub pixel_height: usize,
    pub pixels_rgba: &'a [u8],
    pub hud: &'a str,
    pub hud_rows: u16,
    pub overlay: Option<&'a str>,
    pub sync_updates: bool,
}

pub trait Renderer {
    fn name(&self) -> &'static str;
    fn render(&mut self, frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()>;
}

/// Splits `line` into chunks of at most `width` chars. Always yields one entry.
pub fn hard_wrap_line(line: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let chars: Vec<char> = line.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars.chunks(width).map(|c| c.iter().collect()).collect()
}

pub(crate) fn luma_u8(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 54 + g as u32 * 183 + b as u32 * 19) >> 8) as u8
}

pub(crate) fn write_fg_rgb(out: &mut dyn Write, r: u8, g: u8, b: u8) -> std::io::Result<()> {
    write!(out, "\x1b[38;2;{r};{g};{b}m")
}

pub(crate) fn write_bg_rgb(out: &mut dyn Write, r: u8, g: u8, b: u8) -> std::io::Result<()> {
    write!(out, "\x1b[48;2;{r};{g};{b}m")
}

/// Clears terminal row `row` (1-based) and writes `line` truncated to `cols`.
pub(crate) fn write_hud_line(
    out: &mut dyn Write,
    row: usize,
    cols: usize,
    line: Option<&str>,
) -> anyhow::Result<()> {
    write!(out, "\x1b[{row};1H\x1b[0m\x1b[2K")?;
    if let Some(line) = line {
        let clipped: String = line.chars().take(cols).collect();
        out.write_all(clipped.as_bytes())?;
    }
    Ok(())
}

pub(crate) fn write_hud(out: &mut dyn Write, frame: &Frame<'_>) -> anyhow::Result<()> {
    let mut lines = frame.hud.lines();
    for i in 0..frame.hud_rows as usize {
        write_hud_line(
            out,
            frame.visual_rows as usize + i + 1,
            frame.term_cols as usize,
            lines.next(),
        )?;
    }
    Ok(())
}

/// Checks dimensions and opens a text frame (sync begin, home, autowrap off).
///
/// Returns `(cols, visual_rows, pixel_width)` or `None` when the frame cannot
/// be drawn with `px_per_col` x `px_per_row` pixels per cell.
pub(crate) fn text_frame_begin(
    frame: &Frame<'_>,
    px_per_col: usize,
    px_per_row: usize,
    out: &mut dyn Write,
) -> anyhow::Result<Option<(usize, usize, usize)>> {
    let cols = frame.term_cols as usize;
    let rows = frame.visual_rows as usize;
    let (w, h) = (frame.pixel_width, frame.pixel_height);
    if cols == 0 || rows == 0 || w == 0 || h == 0 {
        return Ok(None);
    }
    if w != cols * px_per_col || h != rows * px_per_row {
        return Ok(None);
    }

    let need = w * h * 4;
    if frame.pixels_rgba.len() < need {
        sync_begin(frame, out)?;
        out.write_all(b"\x1b[H\x1b[0m\x1b[2J")?;
        write!(
            out,
            "pixel buffer too small (need {need}, got {})",
            frame.pixels_rgba.len()
        )?;
        sync_end(frame, out)?;
        out.flush()?;
        return Ok(None);
    }

    sync_begin(frame, out)?;
    // Autowrap off while painting full-width rows, or the last column wraps.
    out.write_all(b"\x1b[H\x1b[0m\x1b[?7l")?;
    Ok(Some((cols, rows, w)))
}

/// HUD, overlay, autowrap back on, sync end, flush.
pub(crate) fn text_frame_end(frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()> {
    write_hud(out, frame)?;
    if let Some(text) = frame.overlay {
        draw_overlay_popup(out, frame.term_cols, frame.term_rows, text)?;
    }
    out.write_all(b"\x1b[?7h")?;
    sync_end(frame, out)?;
    out.flush()?;
    Ok(())
}

pub(crate) fn sync_begin(frame: &Frame<'_>, out: &mut dyn Write) -> std::io::Result<()> {
    if frame.sync_updates {
        out.write_all(b"\x1b[?2026h")?;
    }
    Ok(())
}

pub(crate) fn sync_end(frame: &Frame<'_>, out: &mut dyn Write) -> std::io::Result<()> {
    if frame.sync_updates {
        out.write_all(b"\x1b[?2026l")?;
    }
    Ok(())
}

/// Centered boxed text over a dark backdrop. The first line is the title.
pub fn draw_overlay_popup(
    out: &mut dyn Write,
    term_cols: u16,
    term_rows: u16,
    text: &str,
) -> anyhow::Result<()> {
    let (cols, rows) = (term_cols as usize, term_rows as usize);
    if text.trim().is_empty() || cols < 8 || rows < 4 {
        return Ok(());
    }

    let max_inner = cols.saturating_sub(6).max(1);
    let lines: Vec<String> = text
        .lines()
        .flat_map(|l| hard_wrap_line(l, max_inner))
        .collect();

    let widest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(1);
    let box_w = (widest.clamp(1, max_inner) + 4).min(cols - 2);
    let inner_w = box_w - 4;
    let body_h = lines.len().min(rows.saturating_sub(3).max(1));
    let box_h = (body_h + 2).min(rows - 1);

    let left = (cols - box_w) / 2 + 1;
    let top = (rows - box_h) / 2 + 1;
    let edge = format!("+{}+", "-".repeat(box_w - 2));

    // Backdrop: EL2 per row avoids edge-wrap artifacts.
    out.write_all(b"\x1b[0m\x1b[38;2;220;228;242m\x1b[48;2;2;4;10m")?;
    for row in 1..=rows {
        write!(out, "\x1b[{row};1H\x1b[2K")?;
    }

    out.write_all(b"\x1b[0m\x1b[38;2;236;242;255m\x1b[48;2;10;14;24m")?;
    write!(out, "\x1b[{top};{left}H{edge}")?;
    for (i, line) in lines.iter().take(body_h).enumerate() {
        let row = top + 1 + i;
        write!(out, "\x1b[{row};{left}H| {:inner_w$} |", "")?;
        write!(out, "\x1b[{row};{}H", left + 2)?;
        if i == 0 {
            write!(out, "\x1b[1m\x1b[38;2;255;236;160m{line}\x1b[22m\x1b[38;2;236;242;255m")?;
        } else {
            out.write_all(line.as_bytes())?;
        }
    }
    write!(out, "\x1b[{};{left}H{edge}\x1b[0m", top + box_h - 1)?;
    Ok(())
}
