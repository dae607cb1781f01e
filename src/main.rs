//! papiro – command-line front end.
//!
//! Usage:
//!   papiro fill <template.html> [--set Key=Value]... [--values values.json] [-o out.html]
//!   papiro raster <document.png> [output.pdf] [--config config.json] [--height PX]
//!   papiro render <input.html> [output.pdf] [--config config.json] [--set Key=Value]... [--no-sandbox]
//!
//! `render` needs the `chromium` feature.

use std::{env, fs, path::PathBuf, process};

use papiro::adapter::StaticRenderer;
use papiro::pipeline::{ConverterConfig, HtmlToPdfService};
use papiro::templates::{replace_tags, TemplateValues};

#[derive(Default)]
struct Options {
    positional: Vec<PathBuf>,
    values: TemplateValues,
    config: ConverterConfig,
    output: Option<PathBuf>,
    height: Option<i64>,
    no_sandbox: bool,
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("papiro");

    let Some(command) = args.get(1) else {
        print_usage(prog);
        process::exit(1);
    };
    if command == "--help" || command == "-h" {
        print_usage(prog);
        process::exit(0);
    }

    let options = match parse_options(&args[2..]) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {e}");
            print_usage(prog);
            process::exit(1);
        }
    };

    let outcome = match command.as_str() {
        "fill" => fill(options),
        "raster" => raster(options),
        "render" => render(options),
        other => Err(format!("Unknown command: {other}")),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn parse_options(args: &[String]) -> Result<Options, String> {
    let mut options = Options::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--set" | "-s" => {
                let pair = iter.next().ok_or("--set needs Key=Value")?;
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("Expected Key=Value, got {pair:?}"))?;
                options.values.insert(key, Some(value.to_string()));
            }
            "--values" => {
                let path = iter.next().ok_or("--values needs a file")?;
                let json = read(path)?;
                let values = TemplateValues::from_json(&json)
                    .map_err(|e| format!("Invalid values in '{path}': {e}"))?;
                options.values.merge(values);
            }
            "--config" | "-c" => {
                let path = iter.next().ok_or("--config needs a file")?;
                let json = read(path)?;
                options.config = ConverterConfig::from_json(&json)
                    .map_err(|e| format!("Invalid config in '{path}': {e}"))?;
            }
            "--height" => {
                let value = iter.next().ok_or("--height needs a number")?;
                options.height = Some(value.parse().map_err(|e| format!("Invalid height: {e}"))?);
            }
            "--no-sandbox" => options.no_sandbox = true,
            "--output" | "-o" => {
                options.output = Some(PathBuf::from(iter.next().ok_or("--output needs a path")?));
            }
            other if other.starts_with('-') => return Err(format!("Unknown flag: {other}")),
            path => options.positional.push(PathBuf::from(path)),
        }
    }
    Ok(options)
}

fn read(path: &str) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Error reading '{path}': {e}"))
}

fn input(options: &Options) -> Result<&PathBuf, String> {
    options
        .positional
        .first()
        .ok_or_else(|| "no input file specified.".to_string())
}

/// Output location: explicit path, or the input's stem with `.pdf`.
fn pdf_output(options: &Options) -> Result<(ConverterConfig, Option<String>), String> {
    let input = input(options)?;
    let output = options
        .positional
        .get(1)
        .cloned()
        .or_else(|| options.output.clone())
        .unwrap_or_else(|| input.with_extension("pdf"));

    let mut config = options.config.clone();
    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        config.output_dir = dir.to_path_buf();
    } else {
        config.output_dir = PathBuf::from(".");
    }
    let file_name = output.file_name().and_then(|n| n.to_str()).map(str::to_string);
    Ok((config, file_name))
}

fn fill(options: Options) -> Result<(), String> {
    let input = input(&options)?;
    let template = read(&input.to_string_lossy())?;
    let html = replace_tags(&template, &options.values);
    match &options.output {
        Some(path) => fs::write(path, html).map_err(|e| format!("Error writing '{}': {e}", path.display())),
        None => {
            print!("{html}");
            Ok(())
        }
    }
}

fn raster(options: Options) -> Result<(), String> {
    let input = input(&options)?;
    let image = fs::read(input).map_err(|e| format!("Error reading '{}': {e}", input.display()))?;
    let mut renderer = StaticRenderer::new(image);
    if let Some(h) = options.height {
        renderer = renderer.with_content_height(h);
    }
    let (config, file_name) = pdf_output(&options)?;
    let service = HtmlToPdfService::with_config(renderer, config);
    // The screenshot is the rendered document; the HTML argument only has
    // to be non-empty.
    run(service.convert_and_save(&input.to_string_lossy(), file_name.as_deref()))
}

#[cfg(feature = "chromium")]
fn render(options: Options) -> Result<(), String> {
    use papiro::chromium::ChromiumFactory;

    let input = input(&options)?;
    let template = read(&input.to_string_lossy())?;
    let html = replace_tags(&template, &options.values);
    let (config, file_name) = pdf_output(&options)?;
    let factory = ChromiumFactory {
        no_sandbox: options.no_sandbox,
    };
    let service = HtmlToPdfService::with_config(factory, config);
    run(service.convert_and_save(&html, file_name.as_deref()))
}

#[cfg(not(feature = "chromium"))]
fn render(_options: Options) -> Result<(), String> {
    Err("this build has no HTML renderer; rebuild with `--features chromium`".to_string())
}

fn run(conversion: impl std::future::Future<Output = papiro::ConversionResult>) -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {e}"))?;
    let result = runtime.block_on(conversion);
    match (result.success, result.file_path, result.error_message) {
        (true, Some(path), _) => {
            eprintln!("Wrote '{}'", path.display());
            Ok(())
        }
        (_, _, message) => Err(message.unwrap_or_else(|| "conversion failed".to_string())),
    }
}

fn print_usage(prog: &str) {
    eprintln!("papiro – HTML to paginated PDF");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} fill <template.html> [--set Key=Value]... [--values values.json] [-o out.html]");
    eprintln!("  {prog} raster <document.png> [output.pdf] [--config config.json] [--height PX]");
    eprintln!("  {prog} render <input.html> [output.pdf] [--config config.json] [--set Key=Value]... [--no-sandbox]");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --set, -s      Template value (repeatable)");
    eprintln!("  --values       JSON object of template values (merged with --set)");
    eprintln!("  --config, -c   JSON converter config (paper, scale, timeout_ms, ...)");
    eprintln!("  --height       Measured content height in pixels (raster only)");
    eprintln!("  --no-sandbox   Launch Chromium without its sandbox (render only)");
    eprintln!("  --output, -o   Output path");
    eprintln!("  --help         Print this message");
}
