//! Typed filter-graph builder.
//!
//! Graphs are assembled from [`Filter`] stages with typed parameters and only
//! turned into ffmpeg's textual `-filter_complex` syntax through `Display`.

use std::fmt;

/// A single filter stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Place `inputs` streams next to each other, left to right.
    HStack { inputs: u32 },
    /// Resample to a constant frame rate.
    Fps { fps: u32 },
    /// Scale to `width`; a negative height keeps aspect ratio
    /// (`-2` also rounds to an even number).
    Scale { width: u32, height: i32 },
    /// Grow the frame by `top` pixels above the content, filled with `color`.
    PadTop {
        width: u32,
        top: u32,
        color: &'static str,
    },
    DrawText(DrawText),
    Format { pix_fmt: &'static str },
    Split { outputs: u32 },
    PaletteGen,
    PaletteUse,
}

impl Filter {
    /// ffmpeg filter name.
    pub fn name(&self) -> &'static str {
        match self {
            Filter::HStack { .. } => "hstack",
            Filter::Fps { .. } => "fps",
            Filter::Scale { .. } => "scale",
            Filter::PadTop { .. } => "pad",
            Filter::DrawText(_) => "drawtext",
            Filter::Format { .. } => "format",
            Filter::Split { .. } => "split",
            Filter::PaletteGen => "palettegen",
            Filter::PaletteUse => "paletteuse",
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::HStack { inputs } => write!(f, "hstack=inputs={inputs}"),
            Filter::Fps { fps } => write!(f, "fps={fps}"),
            Filter::Scale { width, height } => write!(f, "scale={width}:{height}"),
            Filter::PadTop { width, top, color } => {
                write!(f, "pad={width}:ih+{top}:0:{top}:{color}")
            }
            Filter::DrawText(text) => fmt::Display::fmt(text, f),
            Filter::Format { pix_fmt } => write!(f, "format={pix_fmt}"),
            Filter::Split { outputs } => write!(f, "split={outputs}"),
            Filter::PaletteGen => f.write_str("palettegen"),
            Filter::PaletteUse => f.write_str("paletteuse"),
        }
    }
}

/// Parameters of a `drawtext` stage.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawText {
    pub font_file: String,
    pub text: String,
    /// Horizontal position expression (may reference `w` and `tw`).
    pub x: String,
    pub y: u32,
    pub font_size: u32,
    pub font_color: &'static str,
    pub shadow_color: &'static str,
    pub shadow_x: i32,
    pub shadow_y: i32,
}

impl fmt::Display for DrawText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "drawtext=fontfile={}:text='{}':x={}:y={}:fontsize={}:fontcolor={}:shadowcolor={}:shadowx={}:shadowy={}",
            self.font_file,
            escape_quoted(&self.text),
            self.x,
            self.y,
            self.font_size,
            self.font_color,
            self.shadow_color,
            self.shadow_x,
            self.shadow_y,
        )
    }
}

/// Escape a value placed inside single quotes in a filter graph.
///
/// A quote closes the quoted run, is emitted escaped, then the run reopens.
fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "'\\''")
}

/// A linear chain: labelled inputs, stages joined by `,`, labelled outputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    inputs: Vec<String>,
    filters: Vec<Filter>,
    outputs: Vec<String>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, label: impl Into<String>) -> Self {
        self.inputs.push(label.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn output(mut self, label: impl Into<String>) -> Self {
        self.outputs.push(label.into());
        self
    }

}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.inputs {
            write!(f, "[{label}]")?;
        }
        for (idx, filter) in self.filters.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            fmt::Display::fmt(filter, f)?;
        }
        for label in &self.outputs {
            write!(f, "[{label}]")?;
        }
        Ok(())
    }
}

/// Chains joined by `;`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGraph {
    chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chain: FilterChain) {
        self.chains.push(chain);
    }

    /// Every stage in graph order.
    pub fn filters(&self) -> impl Iterator<Item = &Filter> {
        self.chains.iter().flat_map(|c| c.filters.iter())
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, chain) in self.chains.iter().enumerate() {
            if idx > 0 {
                f.write_str(";")?;
            }
            fmt::Display::fmt(chain, f)?;
        }
        Ok(())
    }
}
