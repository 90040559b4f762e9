use clap::{Parser, Subcommand};
use polylsp::config::{SettingsOverride, load_settings};
use polylsp::document::{
    CellType, CodeBlock, DocumentOptions, EditorId, VirtualDocument, document_events,
    update_documents,
};
use polylsp::extractor::defaults::default_registry;
use polylsp::lsp::SessionRegistry;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Language-server plumbing for documents that embed several languages
#[derive(Parser)]
#[command(name = "polylsp")]
#[command(version)]
#[command(about = "Language-server plumbing for documents that embed several languages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured language servers as JSON
    Sessions {
        /// Settings file applied over user and project configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the virtual documents built from the given files
    Extract {
        /// Host language of the files (e.g., python)
        #[arg(long)]
        language: String,

        /// Cell type of every file
        #[arg(long, default_value = "code")]
        cell_type: CellType,

        /// Files concatenated as one code block each
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Sessions { config } => sessions(config.as_deref()),
        Commands::Extract {
            language,
            cell_type,
            files,
        } => extract(&language, cell_type, &files),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn sessions(config: Option<&Path>) -> Result<(), String> {
    let root = std::env::current_dir().ok();
    let outcome = load_settings(root.as_deref(), config.map(SettingsOverride::File));
    for event in &outcome.events {
        event.log();
    }

    let sessions = SessionRegistry::new(outcome.settings.language_servers);
    let listing = sessions.list(|_| false);
    let json = serde_json::to_string_pretty(&listing).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn extract(language: &str, cell_type: CellType, files: &[PathBuf]) -> Result<(), String> {
    let Some(first) = files.first() else {
        return Err("no files given".to_string());
    };

    let mut blocks = Vec::with_capacity(files.len());
    for file in files {
        let text = std::fs::read_to_string(file)
            .map_err(|e| format!("cannot read {}: {}", file.display(), e))?;
        blocks.push(CodeBlock::new(
            EditorId::new(file.display().to_string()),
            text,
            cell_type,
        ));
    }

    let file_extension = first
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_else(|| language.to_string());
    let (events, _receiver) = document_events();
    let mut root = VirtualDocument::new(
        DocumentOptions {
            language: language.to_string(),
            path: first.display().to_string(),
            file_extension,
            registry: Arc::new(default_registry()),
        },
        events,
    );
    update_documents(&mut root, &blocks);

    for document in root.active_documents() {
        println!("== {} ({})", document.uri(), document.language());
        println!("{}", document.value());
    }
    Ok(())
}
