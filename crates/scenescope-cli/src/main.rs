mod generate;
mod render;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use scenescope_core::ScopeConfig;
use scenescope_ir::{build_timeline, diagram, validate_scene_graph, SceneGraph};
use scenescope_lang::{extract, Analysis, Extraction};

use render::{Graphviz, ManimRenderer};

#[derive(Parser)]
#[command(
    name = "scenescope",
    version,
    about = "scenescope: static analysis for generated Manim scripts",
    long_about = "scenescope reads generated Manim animation scripts without running them.\nIt recovers the scene graph (objects and timed animations), checks it for\ndangling targets and broken timing, and drives generation and rendering."
)]
struct Cli {
    /// Path to a scenescope.toml (default: ./scenescope.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the scene graph of a script as JSON
    Extract {
        /// Path to the Python script
        #[arg()]
        file: PathBuf,

        /// Write the JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the timeline of a script as JSON
    Timeline {
        #[arg()]
        file: PathBuf,
    },

    /// Validate a script's scene graph; exits non-zero on any diagnostic
    Check {
        #[arg()]
        file: PathBuf,
    },

    /// Print scene graph, timeline and diagnostics together as JSON
    Analyze {
        #[arg()]
        file: PathBuf,
    },

    /// Export the scene graph as a Graphviz diagram
    Diagram {
        #[arg()]
        file: PathBuf,

        /// Output .dot path (default: <file stem>.dot next to the script)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also render a PNG with Graphviz `dot`
        #[arg(long)]
        png: bool,
    },

    /// Generate a script from a prompt, analyze it, and optionally render it
    Generate {
        /// What the animation should show
        #[arg()]
        prompt: String,

        /// Render the generated scene with manim
        #[arg(long)]
        render: bool,
    },

    /// Render a script with manim
    Render {
        #[arg()]
        file: PathBuf,

        /// Scene class to render (default: the detected scene)
        #[arg(long)]
        scene: Option<String>,
    },

    /// Show version and external tool availability
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Extract { file, output } => cmd_extract(&config, &file, output),
        Commands::Timeline { file } => cmd_timeline(&config, &file),
        Commands::Check { file } => cmd_check(&config, &file),
        Commands::Analyze { file } => cmd_analyze(&config, &file),
        Commands::Diagram { file, output, png } => cmd_diagram(&config, &file, output, png),
        Commands::Generate { prompt, render } => cmd_generate(&config, &prompt, render),
        Commands::Render { file, scene } => cmd_render(&config, &file, scene),
        Commands::Info => cmd_info(&config),
    }
}

fn load_config(path: Option<&Path>) -> Result<ScopeConfig> {
    match path {
        Some(path) => ScopeConfig::load_from_file(path)
            .with_context(|| format!("failed to load config: {}", path.display())),
        None => {
            let cwd = std::env::current_dir().context("failed to resolve current directory")?;
            ScopeConfig::discover(&cwd).context("failed to load scenescope.toml")
        }
    }
}

fn read_extraction(config: &ScopeConfig, file: &Path) -> Result<Extraction> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read file: {}", file.display()))?;
    let name = file.display().to_string();
    let extraction = extract(&source, &name, config.extract.animation_duration)?;
    if extraction.skipped.total() > 0 {
        tracing::debug!(
            assignments = extraction.skipped.assignment,
            expressions = extraction.skipped.expression,
            effect_arguments = extraction.skipped.effect_argument,
            "statements skipped"
        );
    }
    Ok(extraction)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn cmd_extract(config: &ScopeConfig, file: &Path, output: Option<PathBuf>) -> Result<()> {
    let graph = read_extraction(config, file)?.graph;
    match output {
        Some(path) => {
            let json = graph.to_json_pretty().context("failed to serialize scene graph")?;
            std::fs::write(&path, json)
                .with_context(|| format!("failed to write output: {}", path.display()))?;
            tracing::info!("scene graph written to {}", path.display());
            Ok(())
        }
        None => print_json(&graph),
    }
}

fn cmd_timeline(config: &ScopeConfig, file: &Path) -> Result<()> {
    let graph = read_extraction(config, file)?.graph;
    print_json(&build_timeline(&graph.timeline))
}

fn cmd_check(config: &ScopeConfig, file: &Path) -> Result<()> {
    println!("🔍 Checking {}", file.display());
    let graph = read_extraction(config, file)?.graph;
    println!("   ✓ Parse OK");
    println!(
        "   Scene: {}  Objects: {}  Animations: {}  Duration: {}s",
        graph.scene_name.as_deref().unwrap_or("(none)"),
        graph.objects.len(),
        graph.timeline.len(),
        scenescope_core::format_seconds(graph.total_duration())
    );

    let diagnostics = validate_scene_graph(&graph);
    if diagnostics.is_empty() {
        println!("   ✓ Scene graph is valid");
        return Ok(());
    }
    for diag in &diagnostics {
        println!("   ❌ {}", diag);
    }
    anyhow::bail!("{} diagnostic(s) in {}", diagnostics.len(), file.display())
}

fn cmd_analyze(config: &ScopeConfig, file: &Path) -> Result<()> {
    let graph = read_extraction(config, file)?.graph;
    print_json(&Analysis::from_graph(graph))
}

fn cmd_diagram(config: &ScopeConfig, file: &Path, output: Option<PathBuf>, png: bool) -> Result<()> {
    let graph = read_extraction(config, file)?.graph;
    let dot_path = output.unwrap_or_else(|| file.with_extension("dot"));
    std::fs::write(&dot_path, diagram::to_dot(&graph))
        .with_context(|| format!("failed to write diagram: {}", dot_path.display()))?;
    println!("🖼  Diagram written to {}", dot_path.display());

    if png {
        if !Graphviz::is_available() {
            anyhow::bail!("Graphviz `dot` not found; install Graphviz to render PNG diagrams");
        }
        let png_path = dot_path.with_extension("png");
        Graphviz::render_png(&dot_path, &png_path)?;
        println!("🖼  PNG written to {}", png_path.display());
    }
    Ok(())
}

fn cmd_generate(config: &ScopeConfig, prompt: &str, render: bool) -> Result<()> {
    tracing::info!("generating animation for: {}", prompt);
    let code = generate::request_script(&config.generate, prompt)?;

    let script = PathBuf::from(&config.generate.script_path);
    std::fs::write(&script, &code)
        .with_context(|| format!("failed to write script: {}", script.display()))?;
    tracing::info!("script saved as {}", script.display());

    let extraction = extract(
        &code,
        &script.display().to_string(),
        config.extract.animation_duration,
    );
    let graph = match extraction {
        Ok(extraction) => extraction.graph,
        Err(e) => {
            tracing::warn!("generated script does not parse: {}", e);
            anyhow::bail!("generated script could not be analyzed: {}", e);
        }
    };

    let analysis = Analysis::from_graph(graph);
    print_json(&analysis)?;
    for error in &analysis.errors {
        tracing::warn!("{}", error);
    }

    if render {
        render_graph(config, &script, &analysis.scene_graph, None)?;
    }
    Ok(())
}

fn cmd_render(config: &ScopeConfig, file: &Path, scene: Option<String>) -> Result<()> {
    let graph = read_extraction(config, file)?.graph;
    render_graph(config, file, &graph, scene)
}

fn render_graph(
    config: &ScopeConfig,
    script: &Path,
    graph: &SceneGraph,
    scene: Option<String>,
) -> Result<()> {
    let scene = scene
        .or_else(|| graph.scene_name.clone())
        .ok_or_else(|| {
            scenescope_core::ScopeError::InvalidArgument(
                "could not detect a scene class; pass --scene".to_string(),
            )
        })?;

    let renderer = ManimRenderer::new(&config.render);
    if !renderer.is_available() {
        anyhow::bail!(
            "{} not found; install Manim to render scenes",
            config.render.program
        );
    }

    println!("🎥 Rendering scene: {}", scene);
    match renderer.render(script, &scene)? {
        Some(video) => {
            println!("🎬 Video generated at: {}", video.display());
            Ok(())
        }
        None => anyhow::bail!("no video generated in this run"),
    }
}

fn cmd_info(config: &ScopeConfig) -> Result<()> {
    let availability = |ok: bool| if ok { "available ✓" } else { "NOT FOUND ✗" };
    println!("🎬 scenescope");
    println!("   Version:   {}", env!("CARGO_PKG_VERSION"));
    println!(
        "   Manim:     {} ({})",
        availability(ManimRenderer::new(&config.render).is_available()),
        config.render.program
    );
    println!("   Graphviz:  {}", availability(Graphviz::is_available()));
    println!("   Model:     {}", config.generate.model);
    println!(
        "   API key:   {} ({})",
        if std::env::var_os(&config.generate.api_key_env).is_some() {
            "set"
        } else {
            "unset"
        },
        config.generate.api_key_env
    );
    println!(
        "   Duration:  {}s per play group",
        scenescope_core::format_seconds(config.extract.animation_duration)
    );
    Ok(())
}
