use crate::types::KeyPosition;
use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use tracing::debug;

/// One line of a replay script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptStep {
    Press(KeyPosition),
    Release(KeyPosition),
    /// Run this many 1 ms cycles.
    Wait(u32),
}

pub fn load_script<P: AsRef<Path>>(path: P) -> Result<Vec<ScriptStep>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading script {}", path.display()))?;
    parse_script(&text)
}

/// Parse a replay script.
///
/// ```text
/// ; home-row shift, rolled into J
/// press 2,1
/// wait 20
/// press 2,7
/// release 2,1
/// wait 300
/// ```
pub fn parse_script(content: &str) -> Result<Vec<ScriptStep>> {
    let mut steps = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let line = match line.find([';', '#']) {
            Some(idx) => &line[..idx],
            None => line,
        }
        .trim();
        if line.is_empty() {
            continue;
        }

        let step = parse_step(line).with_context(|| format!("line {}: `{}`", line_no + 1, line))?;
        steps.push(step);
    }

    debug!("Parsed replay script with {} steps", steps.len());
    Ok(steps)
}

fn parse_step(line: &str) -> Result<ScriptStep> {
    let mut parts = line.split_whitespace();
    let command = parts.next().ok_or_else(|| anyhow!("empty step"))?;
    let argument = parts
        .next()
        .ok_or_else(|| anyhow!("`{}` needs an argument", command))?;
    if parts.next().is_some() {
        bail!("trailing input after `{} {}`", command, argument);
    }

    match command.to_ascii_lowercase().as_str() {
        "press" | "down" => Ok(ScriptStep::Press(parse_position(argument)?)),
        "release" | "up" => Ok(ScriptStep::Release(parse_position(argument)?)),
        "wait" => {
            let ms = argument
                .trim_end_matches("ms")
                .parse::<u32>()
                .with_context(|| format!("bad wait duration `{}`", argument))?;
            Ok(ScriptStep::Wait(ms))
        }
        other => bail!("unknown command `{}`", other),
    }
}

fn parse_position(text: &str) -> Result<KeyPosition> {
    let (row, col) = text
        .split_once(',')
        .ok_or_else(|| anyhow!("expected `row,col`, got `{}`", text))?;
    let row = row.trim().parse::<u8>().context("bad row")?;
    let col = col.trim().parse::<u8>().context("bad col")?;
    let position = KeyPosition::new(row, col);
    if !position.is_valid() {
        bail!("{},{} is reserved for the invalid position", row, col);
    }
    Ok(position)
}
