use std::path::{Path, PathBuf};

use vizier::render::PreviewOptions;
use vizier::{ConvertOptions, HeuristicMapper, MappingStrategy, MasterCatalog};

#[derive(Debug)]
enum CliError {
    Usage(&'static str),
    Io(std::io::Error),
    Vizier(vizier::Error),
    Render(vizier::render::RenderError),
    Json(serde_json::Error),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{msg}"),
            CliError::Io(err) => write!(f, "I/O error: {err}"),
            CliError::Vizier(err) => write!(f, "{err}"),
            CliError::Render(err) => write!(f, "{err}"),
            CliError::Json(err) => write!(f, "JSON error: {err}"),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<vizier::Error> for CliError {
    fn from(value: vizier::Error) -> Self {
        Self::Vizier(value)
    }
}

impl From<vizier::render::RenderError> for CliError {
    fn from(value: vizier::render::RenderError) -> Self {
        Self::Render(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Extract,
    ExtractMasters,
    Map,
    Rebuild,
    Convert,
    Preview,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Classifier {
    #[default]
    Heuristic,
    Llm,
}

#[derive(Debug)]
struct Args {
    command: Command,
    inputs: Vec<String>,
    output: Option<String>,
    template: Option<String>,
    model: Option<String>,
    classifier: Classifier,
    save_intermediate: bool,
    scale: f32,
}

fn usage() -> &'static str {
    "vizier\n\
\n\
USAGE:\n\
  vizier extract <input.vsdx> -o <diagram.json>\n\
  vizier extract-masters <input.vsdx> -o <masters.json>\n\
  vizier map <diagram.json> <masters.json> -o <mapping.json> [--classifier heuristic|llm] [-m <model>]\n\
  vizier rebuild <input.vsdx> <template.vsdx> <mapping.json> -o <output.vsdx>\n\
  vizier convert <input.vsdx> -t <template.vsdx> -o <output.vsdx> [--classifier heuristic|llm] [-m <model>] [--save-intermediate]\n\
  vizier preview <input.vsdx> -o <preview.png> [--scale <px-per-inch>]\n\
\n\
NOTES:\n\
  - convert runs the whole workflow: extract, map, import, re-layout, rewrite, assemble.\n\
  - --save-intermediate writes the stage JSON artifacts to an intermediate/ directory beside the output.\n\
  - --classifier llm uses a chat-completions endpoint (OPENAI_API_KEY et al.); convert falls back to the\n\
    heuristic mapper when that step fails, map aborts.\n\
"
}

fn parse_args(argv: &[String]) -> Result<Args, CliError> {
    let mut it = argv.iter().skip(1).peekable();
    let command = match it.next().map(String::as_str) {
        Some("extract") => Command::Extract,
        Some("extract-masters") => Command::ExtractMasters,
        Some("map") => Command::Map,
        Some("rebuild") => Command::Rebuild,
        Some("convert") => Command::Convert,
        Some("preview") => Command::Preview,
        Some("--help") | Some("-h") | None => return Err(CliError::Usage(usage())),
        Some(_) => return Err(CliError::Usage(usage())),
    };

    let mut args = Args {
        command,
        inputs: Vec::new(),
        output: None,
        template: None,
        model: None,
        classifier: Classifier::default(),
        save_intermediate: false,
        scale: 40.0,
    };

    while let Some(a) = it.next() {
        match a.as_str() {
            "--help" | "-h" => return Err(CliError::Usage(usage())),
            "-o" | "--output" => {
                let Some(out) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                args.output = Some(out.clone());
            }
            "-t" | "--template" => {
                let Some(path) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                args.template = Some(path.clone());
            }
            "-m" | "--model" => {
                let Some(model) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                args.model = Some(model.clone());
            }
            "--classifier" => {
                let Some(kind) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                args.classifier = match kind.as_str() {
                    "heuristic" => Classifier::Heuristic,
                    "llm" => Classifier::Llm,
                    _ => return Err(CliError::Usage(usage())),
                };
            }
            "--save-intermediate" => args.save_intermediate = true,
            "--scale" => {
                let Some(scale) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                args.scale = scale.parse::<f32>().map_err(|_| CliError::Usage(usage()))?;
                if !(args.scale.is_finite() && args.scale > 0.0) {
                    return Err(CliError::Usage(usage()));
                }
            }
            other if other.starts_with('-') => return Err(CliError::Usage(usage())),
            path => args.inputs.push(path.to_string()),
        }
    }

    Ok(args)
}

fn required_output(args: &Args) -> Result<&str, CliError> {
    args.output.as_deref().ok_or(CliError::Usage(usage()))
}

fn positional<'a>(args: &'a Args, n: usize) -> Result<&'a str, CliError> {
    if args.inputs.len() != n {
        return Err(CliError::Usage(usage()));
    }
    Ok(&args.inputs[0])
}

fn build_strategy(args: &Args) -> Result<Box<dyn MappingStrategy>, CliError> {
    match args.classifier {
        Classifier::Heuristic => Ok(Box::new(HeuristicMapper)),
        Classifier::Llm => {
            let mut mapper = vizier::llm::LlmMapper::from_env()?;
            if let Some(model) = &args.model {
                mapper = mapper.with_model(model.clone());
            }
            Ok(Box::new(mapper))
        }
    }
}

fn write_json(path: &str, value: &impl serde::Serialize) -> Result<(), CliError> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn run(args: Args) -> Result<(), CliError> {
    match args.command {
        Command::Extract => {
            let input = positional(&args, 1)?;
            let output = required_output(&args)?;
            println!("Extracting diagram from: {input}");

            let pkg = vizier::Package::open(Path::new(input))?;
            let name = Path::new(input)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| input.to_string());
            let diagram = vizier::extract_diagram(&pkg, &name)?;
            write_json(output, &diagram)?;

            println!("Diagram data saved to: {output}");
            Ok(())
        }
        Command::ExtractMasters => {
            let input = positional(&args, 1)?;
            let output = required_output(&args)?;
            println!("Extracting masters from: {input}");

            let pkg = vizier::Package::open(Path::new(input))?;
            let masters = vizier::masters::list_masters(&pkg)?;
            println!("Found {} masters", masters.len());
            write_json(output, &MasterCatalog { masters })?;

            println!("Masters saved to: {output}");
            Ok(())
        }
        Command::Map => {
            if args.inputs.len() != 2 {
                return Err(CliError::Usage(usage()));
            }
            let output = required_output(&args)?;
            println!("Creating shape mapping...");

            let diagram: vizier::Diagram =
                serde_json::from_str(&std::fs::read_to_string(&args.inputs[0])?)?;
            let catalog: MasterCatalog =
                serde_json::from_str(&std::fs::read_to_string(&args.inputs[1])?)?;

            let strategy = build_strategy(&args)?;
            let mapping = strategy.create_mapping(&diagram, &catalog.masters)?;
            write_json(output, &mapping)?;

            println!("Mapping created with {} shape mappings", mapping.len());
            println!("Mapping saved to: {output}");
            Ok(())
        }
        Command::Rebuild => {
            if args.inputs.len() != 3 {
                return Err(CliError::Usage(usage()));
            }
            let output = required_output(&args)?;
            println!("Rebuilding diagram with new masters...");

            let mapping: vizier::Mapping =
                serde_json::from_str(&std::fs::read_to_string(&args.inputs[2])?)?;
            let report = vizier::rebuild(
                Path::new(&args.inputs[0]),
                Path::new(&args.inputs[1]),
                Path::new(output),
                &mapping,
                &ConvertOptions::default(),
            )?;

            print_rebuild_summary(&report);
            println!("Rebuilt diagram saved to: {output}");
            Ok(())
        }
        Command::Convert => {
            let input = positional(&args, 1)?;
            let template = args.template.as_deref().ok_or(CliError::Usage(usage()))?;
            let output = required_output(&args)?;

            let opts = ConvertOptions {
                save_intermediate: args
                    .save_intermediate
                    .then(|| intermediate_dir(output))
                    .flatten(),
                ..Default::default()
            };

            println!("[1/4] Extracting source diagram and template masters...");
            println!("[2/4] Generating shape mappings...");
            let report = match args.classifier {
                Classifier::Heuristic => vizier::convert(
                    Path::new(input),
                    Path::new(template),
                    Path::new(output),
                    &HeuristicMapper,
                    &opts,
                )?,
                Classifier::Llm => {
                    let strategy = build_strategy(&args)?;
                    match vizier::convert(
                        Path::new(input),
                        Path::new(template),
                        Path::new(output),
                        strategy.as_ref(),
                        &opts,
                    ) {
                        Ok(report) => report,
                        Err(vizier::Error::Classifier { message }) => {
                            eprintln!(
                                "Warning: LLM mapping failed ({message}); falling back to heuristics"
                            );
                            vizier::convert(
                                Path::new(input),
                                Path::new(template),
                                Path::new(output),
                                &HeuristicMapper,
                                &opts,
                            )?
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
            };

            println!("[3/4] Rewrote {} shapes", report.rewritten);
            println!("[4/4] Assembled output package");
            print_rebuild_summary(&report);
            println!("Conversion complete: {output}");
            Ok(())
        }
        Command::Preview => {
            let input = positional(&args, 1)?;
            let output = required_output(&args)?;

            let options = PreviewOptions { scale: args.scale };
            vizier::render::preview_file(Path::new(input), Path::new(output), &options)?;

            println!("Preview written to: {output}");
            Ok(())
        }
    }
}

fn print_rebuild_summary(report: &vizier::ConvertReport) {
    println!(
        "      {} masters imported, {} shapes restyled, layout: {:?}",
        report.masters_imported, report.rewritten, report.layout.mode
    );
    if !report.unresolved.is_empty() {
        println!("      {} shapes kept their original style", report.unresolved.len());
    }
}

fn intermediate_dir(output: &str) -> Option<PathBuf> {
    let path = Path::new(output);
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    Some(parent.unwrap_or(Path::new(".")).join("intermediate"))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args(&std::env::args().collect::<Vec<_>>()) {
        Ok(v) => v,
        Err(CliError::Usage(msg)) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    match run(args) {
        Ok(()) => {}
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    }
}
