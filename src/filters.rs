//! Engine argument lists for the two conversion stages.

use crate::GifOptions;

/// Sandbox name the source video is written under
pub const INPUT_FILE: &str = "input.mp4";
/// Sandbox name of the palette produced by the first stage
pub const PALETTE_FILE: &str = "palette.png";
/// Sandbox name of the finished GIF
pub const OUTPUT_FILE: &str = "output.gif";

pub(crate) fn build_sampling_filter(options: &GifOptions) -> String {
    format!("fps={},scale={}:-1:flags=lanczos", options.fps, options.width)
}

fn build_palettegen_vf(options: &GifOptions) -> String {
    format!(
        "{},palettegen=max_colors={}",
        build_sampling_filter(options),
        options.max_colors
    )
}

fn build_paletteuse_graph(options: &GifOptions) -> String {
    format!(
        "[0:v]{}[v];[v][1:v]paletteuse=dither=bayer:bayer_scale={}",
        build_sampling_filter(options),
        options.bayer_scale
    )
}

/// Palette stage: sample frames and reduce them to a palette image.
pub fn palette_args(options: &GifOptions) -> Vec<String> {
    vec![
        "-i".into(),
        INPUT_FILE.into(),
        "-vf".into(),
        build_palettegen_vf(options),
        "-y".into(),
        PALETTE_FILE.into(),
    ]
}

/// Encode stage: sample frames again and map them onto the palette.
pub fn encode_args(options: &GifOptions) -> Vec<String> {
    vec![
        "-i".into(),
        INPUT_FILE.into(),
        "-i".into(),
        PALETTE_FILE.into(),
        "-filter_complex".into(),
        build_paletteuse_graph(options),
        "-y".into(),
        OUTPUT_FILE.into(),
    ]
}
