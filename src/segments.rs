/*!
 # Light segment renderers

 The sequencer only tells a renderer which segment to switch; drawing the
 segments is up to the renderer.
*/

use std::io::Write;

use tracing::{trace, warn};

/// A fixed, ordered row of light segments
pub trait Renderer: Send {
    /// Number of segments in the row
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Turns segment `index` on
    fn activate(&mut self, index: usize);

    /// Turns segment `index` off
    fn deactivate(&mut self, index: usize);

    /// Turns every segment off
    fn reset_all(&mut self);
}

/// Draws the row on the terminal, one line per change
#[derive(Debug, Clone)]
pub struct TerminalStrip {
    lit: Vec<bool>,
}

impl TerminalStrip {
    pub fn new(segments: usize) -> Self {
        Self {
            lit: vec![false; segments],
        }
    }

    /// Current row, `●` for lit segments and `○` for dark ones
    pub fn render(&self) -> String {
        self.lit
            .iter()
            .map(|&on| if on { "●" } else { "○" })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn draw(&self) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{}", self.render()).and_then(|_| out.flush()) {
            warn!("Failed to draw light strip: {}", e);
        }
    }

    fn set(&mut self, index: usize, on: bool) {
        match self.lit.get_mut(index) {
            Some(segment) => *segment = on,
            None => {
                warn!("Segment {} out of range (0..{})", index, self.lit.len());
                return;
            }
        }
        self.draw();
    }
}

impl Renderer for TerminalStrip {
    fn len(&self) -> usize {
        self.lit.len()
    }

    fn activate(&mut self, index: usize) {
        self.set(index, true);
    }

    fn deactivate(&mut self, index: usize) {
        self.set(index, false);
    }

    fn reset_all(&mut self) {
        self.lit.iter_mut().for_each(|segment| *segment = false);
        self.draw();
    }
}

/// Emits `ON <i>`, `OFF <i>` and `RESET` command lines for an external renderer
pub struct LineRenderer<W> {
    segments: usize,
    out: W,
}

impl<W: Write + Send> LineRenderer<W> {
    pub fn new(segments: usize, out: W) -> Self {
        Self { segments, out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn send(&mut self, line: std::fmt::Arguments<'_>) {
        trace!("Renderer command: {}", line);
        if let Err(e) = self
            .out
            .write_fmt(format_args!("{line}\n"))
            .and_then(|_| self.out.flush())
        {
            warn!("Failed to send renderer command: {}", e);
        }
    }
}

impl<W: Write + Send> Renderer for LineRenderer<W> {
    fn len(&self) -> usize {
        self.segments
    }

    fn activate(&mut self, index: usize) {
        self.send(format_args!("ON {index}"));
    }

    fn deactivate(&mut self, index: usize) {
        self.send(format_args!("OFF {index}"));
    }

    fn reset_all(&mut self) {
        self.send(format_args!("RESET"));
    }
}
