//! Character screen.
//!
//! The screen is memory-mapped: the CPU hands it the final WIDTH*HEIGHT
//! bytes of memory on every tick, and the screen decides whether to render
//! based on its frame clock. Rendering interprets each byte as a character
//! and prints HEIGHT rows to the sink.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crate::core::types::CpuByte;

/// Screen width in characters.
pub const SCREEN_WIDTH: usize = 80;
/// Screen height in characters.
pub const SCREEN_HEIGHT: usize = 50;
/// Maximum frames per second.
pub const SCREEN_FPS: u32 = 120;

/// Character screen.
pub struct Screen {
    width: usize,
    height: usize,
    interval: Duration,
    last_drawn: Option<Instant>,
}

impl Screen {
    /// Create a screen with the default 80x50 geometry at 120 FPS.
    pub fn new() -> Self {
        Self::with_geometry(SCREEN_WIDTH, SCREEN_HEIGHT, SCREEN_FPS)
    }

    /// Create a screen with an explicit geometry.
    ///
    /// # Arguments
    ///
    /// * `width` - Width in characters.
    /// * `height` - Height in characters.
    /// * `fps` - Maximum frames per second.
    ///
    /// # Returns
    ///
    /// * Screen instance.
    ///
    pub fn with_geometry(width: usize, height: usize, fps: u32) -> Self {
        Screen {
            width,
            height,
            interval: Duration::from_secs(1) / fps,
            last_drawn: None,
        }
    }

    /// Number of framebuffer bytes the screen consumes.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// True for a degenerate zero-size screen.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Draw a frame to standard output.
    ///
    /// Skips silently when called within `1/FPS` of the previous render.
    /// The framebuffer length must match [`Screen::len`]; a mismatch is a
    /// programming error in the caller and panics.
    ///
    /// # Arguments
    ///
    /// * `data` - Framebuffer bytes.
    ///
    pub fn draw(&mut self, data: &[CpuByte]) {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        self.draw_to(data, &mut handle);
    }

    /// Draw a frame to an arbitrary sink.
    ///
    /// # Arguments
    ///
    /// * `data` - Framebuffer bytes.
    /// * `sink` - Output sink.
    ///
    pub fn draw_to<W: Write>(&mut self, data: &[CpuByte], sink: &mut W) {
        assert_eq!(
            data.len(),
            self.len(),
            "screen received {} bytes but requires {}",
            data.len(),
            self.len()
        );

        if let Some(last) = self.last_drawn {
            if last.elapsed() < self.interval {
                return;
            }
        }
        self.last_drawn = Some(Instant::now());

        self.render_to(data, sink).expect("failed to write frame");
    }

    /// Render a frame unconditionally, without touching the frame clock.
    ///
    /// # Arguments
    ///
    /// * `data` - Framebuffer bytes.
    /// * `sink` - Output sink.
    ///
    /// # Returns
    ///
    /// * Render result.
    ///
    pub fn render_to<W: Write>(&self, data: &[CpuByte], sink: &mut W) -> io::Result<()> {
        for row in data.chunks(self.width) {
            let line: String = row.iter().map(|&byte| char::from(byte)).collect();
            writeln!(sink, "{}", line)?;
        }

        Ok(())
    }
}

impl Default for Screen {
    fn default() -> Self {
        Self::new()
    }
}
