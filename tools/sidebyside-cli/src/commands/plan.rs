//! Print the engine arguments for a job without running it.

use sidebyside_compose::{Pair, TranscodePlan};

use crate::JobArgs;

pub fn run(job: JobArgs, json: bool) -> anyhow::Result<()> {
    let params = job.params()?;
    let plan = TranscodePlan::compile(
        params.kind,
        Pair::new("before.mp4".to_string(), "after.mp4".to_string()),
        params.offsets,
        params.durations,
    );
    let args = plan.args();

    if json {
        println!("{}", serde_json::to_string_pretty(&args)?);
        return Ok(());
    }

    let quoted: Vec<String> = args.iter().map(|a| shell_quote(a)).collect();
    println!("ffmpeg {}", quoted.join(" "));
    Ok(())
}

fn shell_quote(arg: &str) -> String {
    let plain = arg
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '+' | '/'));
    if plain && !arg.is_empty() {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
