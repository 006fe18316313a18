//! Check engine and font availability.

use sidebyside_common::config::EngineConfig;
use sidebyside_media_engine::ffmpeg::binary_version;

pub async fn run(engine: EngineConfig) -> anyhow::Result<()> {
    println!("SideBySide System Check");
    println!("{}", "=".repeat(50));

    let ffmpeg = binary_version(&engine.ffmpeg_path).await;
    match &ffmpeg {
        Some(version) => println!("[OK] ffmpeg: {version}"),
        None => println!(
            "[FAIL] ffmpeg not runnable at {} (install ffmpeg or set engine.ffmpeg_path)",
            engine.ffmpeg_path.display()
        ),
    }

    match binary_version(&engine.ffprobe_path).await {
        Some(version) => println!("[OK] ffprobe: {version}"),
        None => println!(
            "[WARN] ffprobe not runnable at {} (progress is only reported at completion)",
            engine.ffprobe_path.display()
        ),
    }

    let font_ok = engine.font_path.is_file();
    if font_ok {
        println!("[OK] Label font: {}", engine.font_path.display());
    } else {
        println!(
            "[FAIL] Label font missing: {} (pass --font or set engine.font_path)",
            engine.font_path.display()
        );
    }

    match &engine.workspace_dir {
        Some(dir) => println!("     Workspace: {} (kept)", dir.display()),
        None => println!("     Workspace: temporary, removed after each run"),
    }

    println!();
    if ffmpeg.is_some() && font_ok {
        println!("All required components are available. SideBySide is ready.");
    } else {
        println!("Some required components are missing. See above for fixes.");
    }

    Ok(())
}
