use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::args::Format;

pub fn render<T: Serialize>(format: Format, value: &T) -> Result<String> {
    match format {
        Format::Json => {
            let mut out = serde_json::to_string_pretty(value).context("encode json")?;
            out.push('\n');
            Ok(out)
        }
        Format::Yaml => serde_yaml::to_string(value).context("encode yaml"),
    }
}

/// Writes one document to stdout.
pub fn emit<T: Serialize>(format: Format, value: &T) -> Result<()> {
    let rendered = render(format, value)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(rendered.as_bytes()).context("write output")?;
    stdout.flush().context("flush output")
}
