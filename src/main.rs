use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use dotenvy::dotenv;
use tracing::{error, info};

mod config;
mod credentials;
mod db;
mod export;
mod gate;
mod llm;
mod orchestrator;
mod persist;
mod prompt;
mod removal;
mod state;
mod tools;
mod utils;
mod workspace;

use config::CONFIG;
use credentials::CredentialStore;
use db::database::Database;
use export::ExportFormat;
use llm::media::{detect_mime_type, download_media, from_data_uri, is_image_mime, MediaFile};
use prompt::{ColorPalette, GenerationAttributes, GenerationMode, SubjectPosition};
use state::AppState;
use utils::logging::init_logging;
use workspace::references::ReferenceCollection;
use workspace::session::{
    create_project_tab, delete_project, run_generation_session, SessionRequest,
};

fn usage() -> &'static str {
    "Usage:\n  \
     adforge generate --mode <PORTRAIT|OBJECT|ENHANCE|EXPERT> --subject <path> \
     [--subject <path>]... [--reference <path>]... [--reference-desc <text>]... \
     [--asset <path>]... [--position <left|center|right>] [--gradient] [--blur] \
     [--main-color <color>] [--palette <primary,secondary,accent>] [--width <n>] \
     [--height <n>] [--count <1-4>] [--section <name>] [--project <id>] \
     [--prompt <text>] [--out <dir>]\n  \
     adforge history [--project <id>]\n  \
     adforge project list\n  \
     adforge project create --title <text> --mode <mode> [--section <name>]\n  \
     adforge project delete --id <id>\n  \
     adforge remove-background --image-url <url> [--out <path>]\n  \
     adforge export --input <path> --format <png|jpg|webp> [--quality <1-100>] --output <path>\n  \
     adforge set-key --service <gemini|removal|upload> --key <value>\n  \
     adforge status"
}

struct GenerateArgs {
    mode: GenerationMode,
    subject_paths: Vec<PathBuf>,
    reference_paths: Vec<PathBuf>,
    reference_descs: Vec<String>,
    asset_paths: Vec<PathBuf>,
    position: SubjectPosition,
    attributes: GenerationAttributes,
    palette: Option<ColorPalette>,
    width: u32,
    height: u32,
    count: usize,
    section: String,
    project_id: Option<String>,
    prompt: String,
    out_dir: Option<PathBuf>,
}

fn required_value<'a>(args: &'a [String], index: &mut usize, flag: &str) -> Result<&'a str> {
    *index += 1;
    args.get(*index)
        .map(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

fn parse_generate_args(args: &[String]) -> Result<GenerateArgs> {
    let mut mode = None;
    let mut subject_paths = Vec::new();
    let mut reference_paths = Vec::new();
    let mut reference_descs = Vec::new();
    let mut asset_paths = Vec::new();
    let mut position = SubjectPosition::Center;
    let mut attributes = GenerationAttributes::default();
    let mut palette = None;
    let mut width = 1920u32;
    let mut height = 1080u32;
    let mut count = 1usize;
    let mut section = CONFIG.default_section.clone();
    let mut project_id = None;
    let mut prompt = String::new();
    let mut out_dir = None;

    let mut index = 1;
    while index < args.len() {
        match args[index].as_str() {
            "--mode" => {
                let value = required_value(args, &mut index, "--mode")?;
                mode = Some(
                    GenerationMode::parse(value)
                        .ok_or_else(|| anyhow!("Invalid --mode value: {value}"))?,
                );
            }
            "--subject" => {
                subject_paths.push(PathBuf::from(required_value(args, &mut index, "--subject")?));
            }
            "--reference" => {
                reference_paths.push(PathBuf::from(required_value(
                    args,
                    &mut index,
                    "--reference",
                )?));
            }
            "--reference-desc" => {
                reference_descs
                    .push(required_value(args, &mut index, "--reference-desc")?.to_string());
            }
            "--asset" => {
                asset_paths.push(PathBuf::from(required_value(args, &mut index, "--asset")?));
            }
            "--position" => {
                let value = required_value(args, &mut index, "--position")?;
                position = SubjectPosition::parse(value)
                    .ok_or_else(|| anyhow!("Invalid --position value: {value}"))?;
            }
            "--gradient" => {
                attributes.use_gradient = true;
            }
            "--blur" => {
                attributes.use_blur = true;
            }
            "--main-color" => {
                attributes.use_main_color = true;
                attributes.main_color =
                    Some(required_value(args, &mut index, "--main-color")?.to_string());
            }
            "--palette" => {
                let value = required_value(args, &mut index, "--palette")?;
                let parts: Vec<&str> = value.split(',').map(|part| part.trim()).collect();
                if parts.len() != 3 || parts.iter().any(|part| part.is_empty()) {
                    return Err(anyhow!(
                        "Invalid --palette value: expected primary,secondary,accent"
                    ));
                }
                palette = Some(ColorPalette {
                    primary: parts[0].to_string(),
                    secondary: parts[1].to_string(),
                    accent: parts[2].to_string(),
                });
            }
            "--width" => {
                let value = required_value(args, &mut index, "--width")?;
                width = value
                    .parse::<u32>()
                    .map_err(|_| anyhow!("Invalid --width value: {value}"))?;
            }
            "--height" => {
                let value = required_value(args, &mut index, "--height")?;
                height = value
                    .parse::<u32>()
                    .map_err(|_| anyhow!("Invalid --height value: {value}"))?;
            }
            "--count" => {
                let value = required_value(args, &mut index, "--count")?;
                count = value
                    .parse::<usize>()
                    .map_err(|_| anyhow!("Invalid --count value: {value}"))?;
                if !(1..=CONFIG.max_batch_size).contains(&count) {
                    return Err(anyhow!(
                        "Invalid --count value: must be between 1 and {}",
                        CONFIG.max_batch_size
                    ));
                }
            }
            "--section" => {
                section = required_value(args, &mut index, "--section")?.to_string();
            }
            "--project" => {
                project_id = Some(required_value(args, &mut index, "--project")?.to_string());
            }
            "--prompt" => {
                prompt = required_value(args, &mut index, "--prompt")?.to_string();
            }
            "--out" => {
                out_dir = Some(PathBuf::from(required_value(args, &mut index, "--out")?));
            }
            other => {
                return Err(anyhow!("Unknown flag for generate: {other}"));
            }
        }
        index += 1;
    }

    let mode = mode.ok_or_else(|| anyhow!("--mode is required"))?;
    if subject_paths.is_empty() {
        return Err(anyhow!("--subject is required"));
    }

    Ok(GenerateArgs {
        mode,
        subject_paths,
        reference_paths,
        reference_descs,
        asset_paths,
        position,
        attributes,
        palette,
        width,
        height,
        count,
        section,
        project_id,
        prompt,
        out_dir,
    })
}

/// Loads a file as an image MediaFile; files that are not images or cannot
/// be read are skipped, matching the normalizer's silent-drop behavior.
fn load_image_file(path: &Path) -> Option<MediaFile> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            error!("Could not read {}: {err}", path.display());
            return None;
        }
    };
    let mime_type = detect_mime_type(&bytes)?;
    if !is_image_mime(&mime_type) {
        error!("Skipping {}: not an image ({mime_type})", path.display());
        return None;
    }
    let display_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string());
    Some(MediaFile::new(bytes, mime_type, display_name))
}

async fn run_generate(state: &AppState, args: GenerateArgs) -> Result<()> {
    let subjects: Vec<MediaFile> = args
        .subject_paths
        .iter()
        .filter_map(|path| load_image_file(path))
        .collect();

    let mut references = ReferenceCollection::new();
    references.append_files(args.reference_paths.iter().filter_map(|path| {
        fs::read(path)
            .ok()
            .map(|bytes| (bytes, Some(path.display().to_string())))
    }));
    for (index, description) in args.reference_descs.iter().enumerate() {
        if let Some(item) = references.items().get(index) {
            let id = item.id.clone();
            references.set_description(&id, description);
        }
    }

    let assets: Vec<MediaFile> = args
        .asset_paths
        .iter()
        .filter_map(|path| load_image_file(path))
        .collect();

    let request = SessionRequest {
        mode: args.mode,
        subjects,
        references: references.items().to_vec(),
        assets,
        attributes: args.attributes,
        palette: args.palette,
        position: args.position,
        user_instructions: args.prompt,
        target_width: args.width,
        target_height: args.height,
        batch_size: args.count,
        section: args.section,
        project_id: args.project_id,
    };

    let outcome = run_generation_session(state, request).await?;

    for (index, result) in outcome.results.iter().enumerate() {
        if let Some(bytes) = from_data_uri(&result.url) {
            let dir = args.out_dir.clone().unwrap_or_else(|| PathBuf::from("."));
            fs::create_dir_all(&dir)?;
            let path = dir.join(format!("result-{}.png", index + 1));
            fs::write(&path, bytes)?;
            println!("result {}: saved to {}", index + 1, path.display());
        } else {
            println!("result {}: {}", index + 1, result.url);
        }
    }
    if let Some(warning) = outcome.warning {
        println!("warning: {warning}");
    }

    Ok(())
}

async fn run_history(state: &AppState, args: &[String]) -> Result<()> {
    let mut project_id = None;
    let mut index = 1;
    while index < args.len() {
        match args[index].as_str() {
            "--project" => {
                project_id = Some(required_value(args, &mut index, "--project")?.to_string());
            }
            other => return Err(anyhow!("Unknown flag for history: {other}")),
        }
        index += 1;
    }

    let rows = match project_id {
        Some(id) => state.persistence.list_by_project(&id).await,
        None => state.persistence.list_by_user().await,
    };
    state.history.replace_all(rows);

    let snapshot = state.history.snapshot();
    if snapshot.is_empty() {
        println!("no history entries");
        return Ok(());
    }
    for row in snapshot {
        println!(
            "{}  {}  {}  {}  {}",
            row.created_at.to_rfc3339(),
            row.mode,
            row.section,
            row.project_id.as_deref().unwrap_or("-"),
            row.url
        );
    }
    Ok(())
}

async fn run_project(state: &AppState, args: &[String]) -> Result<()> {
    let action = args
        .get(1)
        .map(|value| value.as_str())
        .ok_or_else(|| anyhow!("project needs an action: list, create, or delete"))?;

    match action {
        "list" => {
            state
                .projects
                .replace_all(state.persistence.list_projects().await);
            let snapshot = state.projects.snapshot();
            if snapshot.is_empty() {
                println!("no projects");
                return Ok(());
            }
            for row in snapshot {
                println!(
                    "{}  {}  {}  {}  {}",
                    row.id,
                    row.created_at.to_rfc3339(),
                    row.mode,
                    row.section,
                    row.title
                );
            }
            Ok(())
        }
        "create" => {
            let mut title = None;
            let mut mode = None;
            let mut section = CONFIG.default_section.clone();
            let mut index = 2;
            while index < args.len() {
                match args[index].as_str() {
                    "--title" => {
                        title = Some(required_value(args, &mut index, "--title")?.to_string());
                    }
                    "--mode" => {
                        let value = required_value(args, &mut index, "--mode")?;
                        mode = Some(
                            GenerationMode::parse(value)
                                .ok_or_else(|| anyhow!("Invalid --mode value: {value}"))?,
                        );
                    }
                    "--section" => {
                        section = required_value(args, &mut index, "--section")?.to_string();
                    }
                    other => return Err(anyhow!("Unknown flag for project create: {other}")),
                }
                index += 1;
            }
            let title = title.ok_or_else(|| anyhow!("--title is required"))?;
            let mode = mode.ok_or_else(|| anyhow!("--mode is required"))?;

            let id = create_project_tab(state, &title, mode, &section).await;
            println!("{id}");
            Ok(())
        }
        "delete" => {
            let mut id = None;
            let mut index = 2;
            while index < args.len() {
                match args[index].as_str() {
                    "--id" => {
                        id = Some(required_value(args, &mut index, "--id")?.to_string());
                    }
                    other => return Err(anyhow!("Unknown flag for project delete: {other}")),
                }
                index += 1;
            }
            let id = id.ok_or_else(|| anyhow!("--id is required"))?;

            state
                .projects
                .replace_all(state.persistence.list_projects().await);
            if !state.projects.contains(&id) {
                return Err(anyhow!("Unknown project id: {id}"));
            }
            if delete_project(state, &id).await {
                println!("deleted {id}");
                Ok(())
            } else {
                Err(anyhow!("Project {id} was not deleted"))
            }
        }
        other => Err(anyhow!("Unknown project action: {other}")),
    }
}

async fn run_remove_background(state: &AppState, args: &[String]) -> Result<()> {
    let mut image_url = None;
    let mut out_path: Option<PathBuf> = None;
    let mut index = 1;
    while index < args.len() {
        match args[index].as_str() {
            "--image-url" => {
                image_url = Some(required_value(args, &mut index, "--image-url")?.to_string());
            }
            "--out" => {
                out_path = Some(PathBuf::from(required_value(args, &mut index, "--out")?));
            }
            other => return Err(anyhow!("Unknown flag for remove-background: {other}")),
        }
        index += 1;
    }

    let image_url = image_url.ok_or_else(|| anyhow!("--image-url is required"))?;
    let api_key = state
        .credentials
        .removal_key()
        .ok_or_else(|| anyhow!("No background-removal API key configured"))?;

    let output_url = removal::remove_background(&image_url, &api_key).await?;
    println!("{output_url}");

    if let Some(path) = out_path {
        let bytes = download_media(&output_url)
            .await
            .ok_or_else(|| anyhow!("Could not download removal result from {output_url}"))?;
        fs::write(&path, bytes)?;
        println!("saved to {}", path.display());
    }
    Ok(())
}

fn run_export(args: &[String]) -> Result<()> {
    let mut input = None;
    let mut format = None;
    let mut quality = 90u8;
    let mut output = None;

    let mut index = 1;
    while index < args.len() {
        match args[index].as_str() {
            "--input" => {
                input = Some(PathBuf::from(required_value(args, &mut index, "--input")?));
            }
            "--format" => {
                let value = required_value(args, &mut index, "--format")?;
                format = Some(
                    ExportFormat::parse(value)
                        .ok_or_else(|| anyhow!("Invalid --format value: {value}"))?,
                );
            }
            "--quality" => {
                let value = required_value(args, &mut index, "--quality")?;
                quality = value
                    .parse::<u8>()
                    .map_err(|_| anyhow!("Invalid --quality value: {value}"))?;
            }
            "--output" => {
                output = Some(PathBuf::from(required_value(args, &mut index, "--output")?));
            }
            other => return Err(anyhow!("Unknown flag for export: {other}")),
        }
        index += 1;
    }

    let input = input.ok_or_else(|| anyhow!("--input is required"))?;
    let format = format.ok_or_else(|| anyhow!("--format is required"))?;
    let output = output.ok_or_else(|| anyhow!("--output is required"))?;

    let bytes = fs::read(&input)?;
    let encoded = export::reencode(&bytes, format, quality)?;
    fs::write(&output, encoded)?;
    println!("exported {} as {}", output.display(), format.extension());
    Ok(())
}

fn run_set_key(state: &AppState, args: &[String]) -> Result<()> {
    let mut service = None;
    let mut key = None;

    let mut index = 1;
    while index < args.len() {
        match args[index].as_str() {
            "--service" => {
                service = Some(required_value(args, &mut index, "--service")?.to_string());
            }
            "--key" => {
                key = Some(required_value(args, &mut index, "--key")?.to_string());
            }
            other => return Err(anyhow!("Unknown flag for set-key: {other}")),
        }
        index += 1;
    }

    let service = service.ok_or_else(|| anyhow!("--service is required"))?;
    let key = key.ok_or_else(|| anyhow!("--key is required"))?;

    match service.as_str() {
        "gemini" => state.credentials.set_generation_key(&key),
        "removal" => state.credentials.set_removal_key(&key),
        "upload" => state.credentials.set_upload_key(&key),
        other => return Err(anyhow!("Unknown service: {other}")),
    }
    println!("stored {service} key");
    Ok(())
}

async fn run_status(state: &AppState) -> Result<()> {
    match state.db.health_check().await {
        Ok(()) => println!("database: ok"),
        Err(err) => println!("database: error ({err})"),
    }
    println!(
        "generation batches in flight: {}/{}",
        state.gate.in_flight(),
        state.gate.limit()
    );
    println!(
        "generation key: {}",
        match (
            state.credentials.generation_key().is_some(),
            state.credentials.generation_key_valid(),
        ) {
            (false, _) => "not set",
            (true, false) => "set (marked invalid/expired)",
            (true, true) => "set",
        }
    );
    println!(
        "removal key: {}",
        if state.credentials.removal_key().is_some() {
            "set"
        } else {
            "not set"
        }
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let _logging_guards = init_logging();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first().map(|value| value.as_str()) else {
        eprintln!("{}", usage());
        std::process::exit(2);
    };

    if command == "export" {
        // Purely local, no database or network needed.
        return run_export(&args);
    }

    let db = Database::init(&CONFIG.database_url).await?;
    let credentials = CredentialStore::load(&CONFIG.credentials_path);
    let state = AppState::new(db, credentials);

    info!("adforge started (command: {command})");

    match command {
        "generate" => {
            let parsed = parse_generate_args(&args)?;
            run_generate(&state, parsed).await
        }
        "history" => run_history(&state, &args).await,
        "project" => run_project(&state, &args).await,
        "remove-background" => run_remove_background(&state, &args).await,
        "set-key" => run_set_key(&state, &args),
        "status" => run_status(&state).await,
        other => {
            eprintln!("Unknown command: {other}\n{}", usage());
            std::process::exit(2);
        }
    }
}
