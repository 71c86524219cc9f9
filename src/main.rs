#![warn(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;

use platen::{FontManifest, FontTable, InputRecord, Template};

#[derive(Parser)]
#[command(version, long_about = None)]
struct CliArguments {
    #[arg(long = "template-path", help = "Path to the template file in the JSON format")]
    template_path: PathBuf,
    #[arg(
        long = "inputs-path",
        help = "Path to the input records file in the JSON format, either a single object or an array of objects"
    )]
    inputs_path: PathBuf,
    #[arg(
        long = "fonts-path",
        help = "Path to the font manifest file in the JSON format; without it only the built-in font is available"
    )]
    fonts_path: Option<PathBuf>,
    #[arg(long = "output-path", help = "Path the generated PDF document is written to")]
    output_path: PathBuf,
}

fn main() {
    if let Err(error) = fallible_main() {
        log::error!("{}", error);
        std::process::exit(1);
    }
}

fn fallible_main() -> Result<()> {
    env_logger::init();

    let CliArguments {
        template_path,
        inputs_path,
        fonts_path,
        output_path,
    } = CliArguments::parse();

    let template_content = std::fs::read_to_string(&template_path)
        .map_err(|error| anyhow::anyhow!("Unable to read the template into a string: {}", error))?;
    let template = Template::from_json(&template_content)
        .map_err(|error| anyhow::anyhow!("Unable to deserialize the template: {}", error))?;

    let inputs_content = std::fs::read_to_string(&inputs_path)
        .map_err(|error| anyhow::anyhow!("Unable to read the inputs into a string: {}", error))?;
    let inputs = parse_inputs(&inputs_content)?;

    let font_entries = match fonts_path {
        Some(manifest_path) => {
            let manifest = FontManifest::from_path(&manifest_path)?;
            let manifest_directory = manifest_path.parent().unwrap_or(Path::new("."));
            manifest.read_entries(manifest_directory)?
        }
        None => Vec::new(),
    };
    let fonts = FontTable::load(font_entries)?;

    let generated = platen::generate(&template, &inputs, &fonts)?;
    for failure in &generated.failures {
        log::warn!("{}", failure);
    }

    std::fs::write(&output_path, &generated.bytes).map_err(|error| {
        anyhow::anyhow!("Unable to write the document to {:?}: {}", output_path, error)
    })?;
    log::info!(
        "Wrote {} bytes to {:?} with {} field(s) skipped",
        generated.bytes.len(),
        output_path,
        generated.failures.len()
    );

    Ok(())
}

/// The inputs file holds either one record or an array of records; a single
/// object is treated as a batch of one.
fn parse_inputs(content: &str) -> Result<Vec<InputRecord>> {
    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|error| anyhow::anyhow!("Unable to deserialize the inputs: {}", error))?;
    match value {
        serde_json::Value::Object(record) => Ok(vec![record]),
        serde_json::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                serde_json::Value::Object(record) => Ok(record),
                _ => Err(anyhow::anyhow!("The input record {} is not a JSON object", index)),
            })
            .collect(),
        _ => Err(anyhow::anyhow!(
            "The inputs must be a JSON object or an array of JSON objects"
        )),
    }
}
