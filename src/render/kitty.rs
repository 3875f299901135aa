use crate::render::{Frame, Renderer, draw_overlay_popup, sync_begin, sync_end, write_hud};
use anyhow::Context;
use base64::Engine;
use std::io::Write;

/// Raw bytes per escape chunk; 3072 encodes to 4096 base64 bytes.
const RAW_CHUNK: usize = 3 * 1024;

/// Kitty graphics protocol, pixels sent inline as base64 (`t=d`).
pub struct KittyRenderer {
    image_id: u32,
    b64_buf: Vec<u8>,
    overlay_visible_last: bool,
    last_hud_rows: u16,
}

impl Default for KittyRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl KittyRenderer {
    pub fn new() -> Self {
        Self {
            image_id: 1,
            b64_buf: Vec::new(),
            overlay_visible_last: false,
            last_hud_rows: 0,
        }
    }
}

impl Renderer for KittyRenderer {
    fn name(&self) -> &'static str {
        "kitty"
    }

    fn render(&mut self, frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()> {
        let cols = frame.term_cols as usize;
        let visual_rows = frame.visual_rows as usize;
        let (w, h) = (frame.pixel_width, frame.pixel_height);
        if cols == 0 || visual_rows == 0 || w == 0 || h == 0 {
            return Ok(());
        }

        sync_begin(frame, out)?;

        if let Some(text) = frame.overlay {
            // Hide the image so the popup text layer is readable.
            write!(out, "\x1b_Ga=d,d=I,i={}\x1b\\", self.image_id)?;
            clear_rows(out, frame.term_rows as usize)?;
            write_hud(out, frame)?;
            draw_overlay_popup(out, frame.term_cols, frame.term_rows, text)?;
            self.overlay_visible_last = true;
        } else {
            if self.overlay_visible_last || frame.hud_rows != self.last_hud_rows {
                clear_rows(out, frame.term_rows as usize)?;
            }
            out.write_all(b"\x1b[H")?;
            write_kitty_direct_rgba(
                out,
                frame.pixels_rgba,
                (w, h),
                (cols, visual_rows),
                self.image_id,
                &mut self.b64_buf,
            )?;
            write_hud(out, frame)?;
            self.overlay_visible_last = false;
        }
        self.last_hud_rows = frame.hud_rows;

        sync_end(frame, out)?;
        out.flush()?;
        Ok(())
    }
}

fn write_kitty_direct_rgba(
    out: &mut dyn Write,
    rgba: &[u8],
    (w, h): (usize, usize),
    (cols, rows): (usize, usize),
    image_id: u32,
    b64_buf: &mut Vec<u8>,
) -> anyhow::Result<()> {
    let mut chunks = rgba.chunks(RAW_CHUNK).peekable();
    let mut first = true;
    while let Some(chunk) = chunks.next() {
        let more = chunks.peek().is_some() as u8;
        if first {
            write!(out, "\x1b_Ga=T,f=32,s={w},v={h},t=d,i={image_id},p=1,")?;
            write!(out, "c={cols},r={rows},C=1,q=2,z=-1,m={more};")?;
            first = false;
        } else {
            write!(out, "\x1b_Gm={more};")?;
        }

        let b64_len = chunk.len().div_ceil(3) * 4;
        if b64_buf.len() < b64_len {
            b64_buf.resize(b64_len, 0);
        }
        let written = base64::engine::general_purpose::STANDARD
            .encode_slice(chunk, &mut b64_buf[..b64_len])
            .context("base64 encode pixels")?;
        out.write_all(&b64_buf[..written])?;
        out.write_all(b"\x1b\\")?;
    }
    Ok(())
}

fn clear_rows(out: &mut dyn Write, rows: usize) -> anyhow::Result<()> {
    for row in 1..=rows {
        write!(out, "\x1b[{row};1H\x1b[0m\x1b[2K")?;
    }
    Ok(())
}
