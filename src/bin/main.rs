use clap::{Arg, Command};
use jobdesc::config::{self, ConfigSource, Settings};
use jobdesc::controller::{FormController, RefineOutcome};
use jobdesc::images::ImageLoader;
use jobdesc::model::{Field, FieldValue, PersonnelType};
use jobdesc::pdf::Exporter;
use jobdesc::refine::Refiner;
use jobdesc::JdError;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Debug)]
enum AppError {
    Form(JdError),
    Argument(String),
    Export(JdError),
    Output(String),
}

/// Verbosity level for output
#[derive(Debug, Clone, Copy, PartialEq)]
enum Verbosity {
    Quiet,   // No output except errors
    Normal,  // Standard output
    Verbose, // Detailed output
}

/// Get the configuration file based on CLI arguments or default behavior.
///
/// Priority order:
/// 1. If `--config` is explicitly provided, use that file
/// 2. If `jobdescrc.toml` exists in current directory, use it
/// 3. If `<config dir>/jobdesc/jobdescrc.toml` exists, use it
/// 4. Otherwise use default configuration (`None`)
fn get_config_path(matches: &clap::ArgMatches) -> Option<PathBuf> {
    if let Some(config_file) = matches.get_one::<String>("config") {
        return Some(PathBuf::from(config_file));
    }

    let local = Path::new(config::CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local.to_path_buf());
    }

    config::user_config_path()
}

fn load_settings(config_path: Option<&Path>) -> Settings {
    match config_path.and_then(Path::to_str) {
        Some(path) => config::load_config_from_source(ConfigSource::File(path)),
        None => config::load_config_from_source(ConfigSource::Default),
    }
}

/// Resolves `-o`. Without it the exporter falls back to the configured
/// output directory, then the current directory.
fn get_output_path(matches: &clap::ArgMatches) -> Result<Option<PathBuf>, AppError> {
    let Some(output) = matches.get_one::<String>("output") else {
        return Ok(None);
    };
    let current_dir = std::env::current_dir().map_err(|e| AppError::Output(e.to_string()))?;
    Ok(Some(current_dir.join(output)))
}

/// Splits `FIELD=VALUE`. A literal `\n` in the value becomes a line break.
fn split_assignment(raw: &str) -> Result<(Field, String), AppError> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| AppError::Argument(format!("expected FIELD=VALUE, got '{}'", raw)))?;
    let field: Field = name
        .trim()
        .parse()
        .map_err(|e| AppError::Form(JdError::from(e)))?;
    Ok((field, value.replace("\\n", "\n")))
}

fn has_form_input(matches: &clap::ArgMatches) -> bool {
    matches.contains_id("form")
        || matches.contains_id("type")
        || matches.contains_id("set")
        || matches.contains_id("image")
}

fn build_controller(matches: &clap::ArgMatches) -> Result<FormController, AppError> {
    let form_path = matches.get_one::<String>("form").map(PathBuf::from);
    let mut controller = match &form_path {
        Some(path) => jobdesc::form::load_form(path)
            .map_err(|e| AppError::Form(e.into()))?
            .into_controller(),
        None => FormController::new(),
    };

    if let Some(kind) = matches.get_one::<String>("type") {
        let variant: PersonnelType = kind.parse().map_err(AppError::Argument)?;
        controller.select_variant(variant);
    }
    let variant = controller.active();

    for raw in matches.get_many::<String>("set").into_iter().flatten() {
        let (field, value) = split_assignment(raw)?;
        if field.is_image() {
            return Err(AppError::Form(JdError::from(
                jobdesc::model::FieldError::TypeMismatch { field },
            )));
        }
        controller
            .set_field(variant, field, FieldValue::Text(value))
            .map_err(|e| AppError::Form(e.into()))?;
    }

    // --image entries resolve next to the form file, like the form's own entries
    let mut loader = ImageLoader::new(form_path.as_deref());
    for raw in matches.get_many::<String>("image").into_iter().flatten() {
        let (field, entry) = split_assignment(raw)?;
        if !field.is_image() {
            return Err(AppError::Form(JdError::from(
                jobdesc::model::FieldError::TypeMismatch { field },
            )));
        }
        let image = if entry.trim().is_empty() || entry.trim().eq_ignore_ascii_case("none") {
            None
        } else {
            Some(
                loader
                    .load_upload(entry.trim())
                    .map_err(|e| AppError::Form(e.into()))?,
            )
        };
        controller
            .set_field(variant, field, FieldValue::Image(image))
            .map_err(|e| AppError::Form(e.into()))?;
    }

    Ok(controller)
}

fn print_size(bytes: usize) {
    let size_kb = bytes as f64 / 1024.0;
    if size_kb < 1024.0 {
        println!("   Size: {:.1} KB", size_kb);
    } else {
        println!("   Size: {:.2} MB", size_kb / 1024.0);
    }
}

fn run(matches: clap::ArgMatches) -> Result<(), AppError> {
    let verbosity = if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    };
    let dry_run = matches.get_flag("dry-run");

    let config_path = get_config_path(&matches);
    let mut settings = load_settings(config_path.as_deref());
    if let Some(scale) = matches.get_one::<f32>("scale") {
        settings.export.scale = config::clamp_scale(*scale);
    }
    if verbosity == Verbosity::Verbose {
        match &config_path {
            Some(path) => info!("⚙️  Configuration: {}", path.display()),
            None => info!("⚙️  Configuration: built-in defaults"),
        }
    }

    let mut controller = build_controller(&matches)?;
    debug!("Active form: {}", controller.active());

    if matches.get_flag("polish") {
        let refiner = Refiner::from_settings(&settings.refine);
        if verbosity == Verbosity::Verbose {
            info!(
                "✨ Polishing job functions {}",
                if refiner.is_remote() {
                    "with the text service"
                } else {
                    "locally"
                }
            );
        }
        if controller.request_refine(&refiner) == RefineOutcome::Skipped
            && verbosity != Verbosity::Quiet
        {
            warn!("Job functions are empty; nothing to polish");
        }
    }

    if matches.get_flag("json") {
        let json = controller
            .render()
            .to_json()
            .map_err(|e| AppError::Output(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    if matches.get_flag("preview") {
        controller.enter_preview();
        print!("{}", controller.render().outline());
        return Ok(());
    }

    let mut exporter = Exporter::new(settings);
    if let Some(path) = &config_path {
        exporter = exporter.with_base_path(path);
    }
    if let Some(output) = get_output_path(&matches)? {
        exporter = exporter.with_output(output);
    }
    if verbosity == Verbosity::Verbose {
        info!("📄 Generating PDF at scale {:.1}...", exporter.scale());
        match exporter.fonts() {
            Some(fonts) => info!("   Font: {}", fonts.family),
            None => info!("   Font: builtin Helvetica overlay"),
        }
    }

    if dry_run {
        let bytes = exporter
            .export_bytes(&controller.render())
            .map_err(|e| AppError::Export(e.into()))?;
        if verbosity != Verbosity::Quiet {
            println!("✓ Dry-run complete. No PDF written.");
            if verbosity == Verbosity::Verbose {
                print_size(bytes.len());
            }
        }
        return Ok(());
    }

    let artifact = controller.export(&exporter).map_err(AppError::Export)?;
    if verbosity != Verbosity::Quiet {
        println!("✅ Successfully saved PDF to {}", artifact.path.display());
        if verbosity == Verbosity::Verbose {
            print_size(artifact.size);
        }
    }
    Ok(())
}

fn command() -> Command {
    Command::new("jobdesc")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Fill in a personnel job description and export it as a single-page A4 PDF")
        .after_help(
            "EXAMPLES:\n  \
            jobdesc -f form.toml -o out/\n  \
            jobdesc -t unit --set jail_unit=\"Manila City Jail\" --set rank_name=\"JO1 Juan Cruz\"\n  \
            jobdesc -f form.toml --image photo=me.jpg --polish --preview\n  \
            jobdesc -f form.toml --set job_functions=\"inspect cells\\nlog visitors\" --dry-run -v\n\n\
            FIELDS:\n  \
            office, jail_unit, address, rank_name, designation, job_functions (text)\n  \
            photo, org_logo, regional_logo, unit_logo, gov_logo (images)\n",
        )
        .arg(
            Arg::new("form")
                .short('f')
                .long("form")
                .value_name("FORM_FILE")
                .help("Path to a TOML form file holding the regional and unit records"),
        )
        .arg(
            Arg::new("type")
                .short('t')
                .long("type")
                .value_name("TYPE")
                .help("Personnel type to work on: regional or unit (defaults to the form's 'active')"),
        )
        .arg(
            Arg::new("set")
                .long("set")
                .value_name("FIELD=VALUE")
                .help("Set a text field on the active form (can be specified multiple times)")
                .action(clap::ArgAction::Append),
        )
        .arg(
            Arg::new("image")
                .long("image")
                .value_name("FIELD=PATH")
                .help("Upload a JPEG or PNG into an image field, or 'none' to clear it (can be specified multiple times)")
                .action(clap::ArgAction::Append),
        )
        .arg(
            Arg::new("polish")
                .long("polish")
                .help("Polish the job functions into a bullet list before rendering")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("preview")
                .long("preview")
                .help("Print an outline of the rendered page instead of exporting")
                .action(clap::ArgAction::SetTrue)
                .conflicts_with("json"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the rendered page as JSON instead of exporting")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("OUTPUT_PATH")
                .help("Output directory or PDF file (defaults to the configured output_dir, then ./)"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("CONFIG_FILE")
                .help("Path to configuration file (TOML format). Auto-detects jobdescrc.toml if not specified"),
        )
        .arg(
            Arg::new("scale")
                .long("scale")
                .value_name("FACTOR")
                .help("Rasterization scale (2.0 to 6.0)")
                .value_parser(clap::value_parser!(f32)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Show detailed output including fonts and file size")
                .action(clap::ArgAction::SetTrue)
                .conflicts_with("quiet"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Suppress all output except errors")
                .action(clap::ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Render the PDF in memory without writing it")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("get-default-configuration")
                .long("get-default-configuration")
                .help("Print a default jobdescrc.toml to stdout and exit")
                .action(clap::ArgAction::SetTrue),
        )
}

fn main() {
    let mut cmd = command();
    let matches = cmd.clone().get_matches();

    // RUST_LOG still wins; -v only raises the default
    let mut logger = env_logger::Builder::new();
    logger.filter_level(if matches.get_flag("verbose") {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    });
    logger.parse_default_env().format_timestamp_millis().init();

    if matches.get_flag("get-default-configuration") {
        println!("{}", config::default_config_toml());
        process::exit(0);
    }

    if !has_form_input(&matches) {
        let _ = cmd.print_help();
        println!();
        process::exit(1);
    }

    if let Err(e) = run(matches) {
        match e {
            AppError::Form(e) => error!("[X] {}", e),
            AppError::Argument(e) => error!("[X] Invalid argument: {}", e),
            AppError::Export(e) => error!("[X] {}", e),
            AppError::Output(e) => error!("[X] Output error: {}", e),
        }
        process::exit(1);
    }
}
