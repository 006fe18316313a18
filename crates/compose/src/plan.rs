//! Filter graph compiler: job parameters to a [`TranscodePlan`].

use sidebyside_media_engine::{Invocation, InvocationInput};

use crate::clip::{ClipDuration, ClipOffset, OutputKind, Pair};
use crate::graph::{DrawText, Filter, FilterChain, FilterGraph};

/// Seeks land this much before the requested offset to absorb the engine's
/// keyframe rounding.
pub const SEEK_EPSILON_SECS: f64 = 0.04;
/// Output frame width; height follows the stacked aspect ratio.
pub const OUTPUT_WIDTH: u32 = 1280;
/// Black band added above the stacked clips for the labels.
pub const LABEL_BAND_HEIGHT: u32 = 100;
/// Workspace name the label font is staged under.
pub const FONT_NAME: &str = "label_font.ttf";
pub const LABEL_FONT_SIZE: u32 = 48;
pub const BEFORE_LABEL: &str = "BEFORE";
pub const AFTER_LABEL: &str = "AFTER";

const BEFORE_LABEL_X: &str = "10";
const AFTER_LABEL_X: &str = "(w-tw)/2+70";
const LABEL_Y: u32 = 10;
const VIDEO_OUT: &str = "vout";

/// One source bound to the engine: staged name and pre-input seek.
#[derive(Debug, Clone, PartialEq)]
pub struct InputBinding {
    pub name: String,
    pub seek_secs: f64,
}

/// Container/codec side of a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub file_name: String,
    pub media_type: &'static str,
    pub fps: u32,
    pub keeps_audio: bool,
    pub fast_start: bool,
}

/// Immutable execution plan for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodePlan {
    pub kind: OutputKind,
    /// Stream order: before (left), after (right).
    pub inputs: [InputBinding; 2],
    pub graph: FilterGraph,
    pub output: OutputSpec,
    /// Carried for diagnostics only; output length is never bounded by it.
    pub declared_durations: Pair<ClipDuration>,
}

/// Seek position placed before `-i` for a requested visible start.
pub fn pre_input_seek(offset: ClipOffset) -> f64 {
    (offset.secs() - SEEK_EPSILON_SECS).max(0.0)
}

fn format_secs(secs: f64) -> String {
    format!("{secs:.3}")
}

fn label(text: &str, x: &str) -> Filter {
    Filter::DrawText(DrawText {
        font_file: FONT_NAME.to_string(),
        text: text.to_string(),
        x: x.to_string(),
        y: LABEL_Y,
        font_size: LABEL_FONT_SIZE,
        font_color: "white",
        shadow_color: "black",
        shadow_x: 2,
        shadow_y: 2,
    })
}

fn build_graph(kind: OutputKind) -> FilterGraph {
    let mut graph = FilterGraph::new();
    graph.push(
        FilterChain::new()
            .input("0:v")
            .input("1:v")
            .filter(Filter::HStack { inputs: 2 })
            .output("stacked"),
    );

    let layout = FilterChain::new()
        .input("stacked")
        .filter(Filter::Fps { fps: kind.fps() })
        .filter(Filter::Scale {
            width: OUTPUT_WIDTH,
            height: -2,
        })
        .filter(Filter::PadTop {
            width: OUTPUT_WIDTH,
            top: LABEL_BAND_HEIGHT,
            color: "black",
        })
        .filter(label(BEFORE_LABEL, BEFORE_LABEL_X))
        .filter(label(AFTER_LABEL, AFTER_LABEL_X));

    match kind {
        OutputKind::Video => {
            graph.push(
                layout
                    .filter(Filter::Format { pix_fmt: "yuv420p" })
                    .output(VIDEO_OUT),
            );
        }
        OutputKind::LoopingImage => {
            graph.push(
                layout
                    .filter(Filter::Split { outputs: 2 })
                    .output("pal_src")
                    .output("pal_in"),
            );
            graph.push(
                FilterChain::new()
                    .input("pal_in")
                    .filter(Filter::PaletteGen)
                    .output("palette"),
            );
            graph.push(
                FilterChain::new()
                    .input("pal_src")
                    .input("palette")
                    .filter(Filter::PaletteUse)
                    .output(VIDEO_OUT),
            );
        }
    }

    graph
}

impl TranscodePlan {
    /// Compile a plan. Pure and deterministic.
    pub fn compile(
        kind: OutputKind,
        input_names: Pair<String>,
        offsets: Pair<ClipOffset>,
        durations: Pair<ClipDuration>,
    ) -> Self {
        let [before, after] = input_names.into_array();
        let seeks = offsets.map(pre_input_seek);
        let inputs = [
            InputBinding {
                name: before,
                seek_secs: seeks.before,
            },
            InputBinding {
                name: after,
                seek_secs: seeks.after,
            },
        ];

        Self {
            kind,
            inputs,
            graph: build_graph(kind),
            output: OutputSpec {
                file_name: kind.file_name(),
                media_type: kind.media_type(),
                fps: kind.fps(),
                keeps_audio: kind.keeps_audio(),
                fast_start: kind.fast_start(),
            },
            declared_durations: durations,
        }
    }

    /// Engine arguments in order. Seeks always precede their `-i`.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for input in &self.inputs {
            args.push("-ss".to_string());
            args.push(format_secs(input.seek_secs));
            args.push("-i".to_string());
            args.push(input.name.clone());
        }

        args.push("-filter_complex".to_string());
        args.push(self.graph.to_string());
        args.push("-map".to_string());
        args.push(format!("[{VIDEO_OUT}]"));

        if self.output.keeps_audio {
            // Source 0 audio only, if it has any.
            args.push("-map".to_string());
            args.push("0:a?".to_string());
            args.push("-c:a".to_string());
            args.push("copy".to_string());
        } else {
            args.push("-an".to_string());
        }

        match self.kind {
            OutputKind::Video => {
                args.push("-c:v".to_string());
                args.push("libx264".to_string());
                args.push("-preset".to_string());
                args.push("medium".to_string());
                args.push("-pix_fmt".to_string());
                args.push("yuv420p".to_string());
            }
            OutputKind::LoopingImage => {
                args.push("-loop".to_string());
                args.push("0".to_string());
            }
        }

        args.push("-r".to_string());
        args.push(self.output.fps.to_string());

        if self.output.fast_start {
            args.push("-movflags".to_string());
            args.push("+faststart".to_string());
        }

        args.push(self.output.file_name.clone());
        args
    }

    /// Serialize for the engine.
    pub fn invocation(&self) -> Invocation {
        Invocation {
            inputs: self
                .inputs
                .iter()
                .map(|input| InvocationInput {
                    name: input.name.clone(),
                    seek_secs: input.seek_secs,
                })
                .collect(),
            args: self.args(),
            output: self.output.file_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Pair<String> {
        Pair::new("before.mp4".to_string(), "after.mp4".to_string())
    }

    fn offsets(before: f64, after: f64) -> Pair<ClipOffset> {
        Pair::new(
            ClipOffset::new(before).unwrap(),
            ClipOffset::new(after).unwrap(),
        )
    }

    #[test]
    fn test_gif_plan_args() {
        let plan = TranscodePlan::compile(
            OutputKind::LoopingImage,
            names(),
            offsets(2.0, 5.0),
            Pair::default(),
        );
        let graph = "[0:v][1:v]hstack=inputs=2[stacked];\
[stacked]fps=10,scale=1280:-2,pad=1280:ih+100:0:100:black,\
drawtext=fontfile=label_font.ttf:text='BEFORE':x=10:y=10:fontsize=48:fontcolor=white:shadowcolor=black:shadowx=2:shadowy=2,\
drawtext=fontfile=label_font.ttf:text='AFTER':x=(w-tw)/2+70:y=10:fontsize=48:fontcolor=white:shadowcolor=black:shadowx=2:shadowy=2,\
split=2[pal_src][pal_in];[pal_in]palettegen[palette];[pal_src][palette]paletteuse[vout]";

        assert_eq!(
            plan.args(),
            vec![
                "-ss", "1.960", "-i", "before.mp4", "-ss", "4.960", "-i", "after.mp4",
                "-filter_complex", graph, "-map", "[vout]", "-an", "-loop", "0", "-r", "10",
                "output.gif",
            ]
        );
        assert_eq!(plan.output.media_type, "image/gif");
    }

    #[test]
    fn test_video_plan_keeps_source_zero_audio_and_fast_start() {
        let plan = TranscodePlan::compile(
            OutputKind::Video,
            names(),
            offsets(0.0, 0.0),
            Pair::default(),
        );
        let args = plan.args();
        let joined = args.join(" ");
        assert!(joined.contains("-map [vout] -map 0:a? -c:a copy"));
        assert!(!joined.contains("1:a"));
        assert!(joined.contains("-movflags +faststart"));
        assert!(joined.contains("-c:v libx264 -preset medium -pix_fmt yuv420p -r 30"));
        assert!(!args.contains(&"-an".to_string()));
        assert_eq!(args.last().unwrap(), "output.mp4");
        assert!(plan.graph.to_string().contains("format=yuv420p[vout]"));
    }

    #[test]
    fn test_seek_is_clamped_at_zero() {
        assert_eq!(pre_input_seek(ClipOffset::ZERO), 0.0);
        assert_eq!(pre_input_seek(ClipOffset::new(0.02).unwrap()), 0.0);
        assert!((pre_input_seek(ClipOffset::new(3.0).unwrap()) - 2.96).abs() < 1e-9);
    }

    #[test]
    fn test_seek_precedes_each_input() {
        let plan = TranscodePlan::compile(
            OutputKind::Video,
            names(),
            offsets(3.0, 3.0),
            Pair::default(),
        );
        let args = plan.args();
        for (idx, arg) in args.iter().enumerate() {
            if arg == "-i" {
                assert_eq!(args[idx - 2], "-ss");
                assert_eq!(args[idx - 1], "2.960");
            }
        }
    }

    #[test]
    fn test_kind_switch_shares_layout() {
        let gif = TranscodePlan::compile(
            OutputKind::LoopingImage,
            names(),
            offsets(1.0, 1.0),
            Pair::default(),
        );
        let mp4 = TranscodePlan::compile(OutputKind::Video, names(), offsets(1.0, 1.0), Pair::default());

        let layout = |plan: &TranscodePlan| -> Vec<Filter> {
            plan.graph
                .filters()
                .filter(|f| matches!(f, Filter::HStack { .. } | Filter::Scale { .. } | Filter::PadTop { .. } | Filter::DrawText(_)))
                .cloned()
                .collect()
        };
        assert_eq!(layout(&gif), layout(&mp4));
        assert!(gif.graph.filters().any(|f| *f == Filter::Fps { fps: 10 }));
        assert!(mp4.graph.filters().any(|f| *f == Filter::Fps { fps: 30 }));
        assert_ne!(gif.output.media_type, mp4.output.media_type);
    }

    #[test]
    fn test_durations_do_not_change_args() {
        let without = TranscodePlan::compile(
            OutputKind::Video,
            names(),
            offsets(1.0, 2.0),
            Pair::default(),
        );
        let with = TranscodePlan::compile(
            OutputKind::Video,
            names(),
            offsets(1.0, 2.0),
            Pair::new(
                ClipDuration::new(4.0).unwrap(),
                ClipDuration::new(1.5).unwrap(),
            ),
        );
        assert_eq!(without.args(), with.args());
        assert!(!with.args().contains(&"-t".to_string()));
    }

    #[test]
    fn test_invocation_carries_inputs() {
        let plan = TranscodePlan::compile(
            OutputKind::LoopingImage,
            names(),
            offsets(0.5, 0.0),
            Pair::default(),
        );
        let invocation = plan.invocation();
        assert_eq!(invocation.output, "output.gif");
        assert_eq!(invocation.inputs.len(), 2);
        assert_eq!(invocation.inputs[0].name, "before.mp4");
        assert!((invocation.inputs[0].seek_secs - 0.46).abs() < 1e-9);
        assert_eq!(invocation.args, plan.args());
    }
}
