use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ragpipe::{
    extraction::extract_pdf,
    logging,
    processing::{ChunkingParams, chunk_text},
    tables::{ExtractedTable, TableKind, parse_rows},
};
use serde_json::{Value, json};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "ragpipe-inspect",
    about = "Run the offline pipeline stages on local files and print JSON"
)]
struct Cli {
    /// Write JSON here instead of stdout.
    #[arg(long, global = true)]
    output: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract per-page text statistics from PDFs (a file or a directory tree).
    Extract {
        path: PathBuf,
        /// Include the full extracted text.
        #[arg(long)]
        text: bool,
    },
    /// Split extracted text into overlapping chunks.
    Chunk {
        path: PathBuf,
        #[arg(long, default_value_t = 1000)]
        chunk_size: usize,
        #[arg(long, default_value_t = 200)]
        overlap: usize,
        #[arg(long, default_value_t = 100)]
        min_chunk_size: usize,
    },
    /// Parse a saved completion response into typed table rows.
    Parse {
        /// File holding the raw model response.
        response: PathBuf,
        /// Table type the response was produced for.
        #[arg(long)]
        table_type: String,
    },
}

fn main() {
    logging::init_cli_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let value = match cli.command {
        Command::Extract { path, text } => inspect_extract(&path, text)?,
        Command::Chunk {
            path,
            chunk_size,
            overlap,
            min_chunk_size,
        } => inspect_chunks(
            &path,
            ChunkingParams {
                chunk_size,
                overlap,
                min_chunk_size,
            },
        )?,
        Command::Parse {
            response,
            table_type,
        } => inspect_parse(&response, &table_type)?,
    };
    write_json(cli.output.as_deref(), &value)
}

fn pdf_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("{} is neither a file nor a directory", path.display());
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|candidate| {
            candidate
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn inspect_extract(path: &Path, include_text: bool) -> Result<Value> {
    let mut documents = Vec::new();
    for file in pdf_files(path)? {
        let bytes = fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
        let entry = match extract_pdf(&bytes) {
            Ok(document) => {
                let mut entry = json!({
                    "file": file.display().to_string(),
                    "page_count": document.page_count,
                    "total_chars": document.total_chars,
                    "total_words": document.total_words,
                    "pages": document.pages,
                });
                if include_text {
                    entry["text"] = Value::from(document.full_text);
                }
                entry
            }
            Err(err) => json!({
                "file": file.display().to_string(),
                "error": err.to_string(),
                "kind": err.kind(),
                "remediation": err.remediation(),
            }),
        };
        documents.push(entry);
    }
    Ok(json!({ "documents": documents }))
}

fn inspect_chunks(path: &Path, params: ChunkingParams) -> Result<Value> {
    let mut documents = Vec::new();
    for file in pdf_files(path)? {
        let bytes = fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
        let document = extract_pdf(&bytes)
            .with_context(|| format!("failed to extract {}", file.display()))?;
        let source = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let chunks = chunk_text(&document.full_text, &source, params)?;
        documents.push(json!({
            "file": file.display().to_string(),
            "chunk_count": chunks.len(),
            "chunks": chunks,
        }));
    }
    Ok(json!({ "documents": documents }))
}

fn inspect_parse(response: &Path, table_type: &str) -> Result<Value> {
    let raw = fs::read_to_string(response)
        .with_context(|| format!("failed to read {}", response.display()))?;
    let kind = TableKind::parse(table_type);
    let table = ExtractedTable::from_objects(&kind, parse_rows(&raw, kind.id()));
    let rows: Vec<Value> = table.records().iter().map(|record| record.to_json()).collect();
    Ok(json!({
        "table_type": table.table_type(),
        "row_count": rows.len(),
        "rows": rows,
    }))
}

fn write_json(output: Option<&Path>, value: &Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create directory {}", parent.display()))?;
            }
            fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{rendered}")?;
            Ok(())
        }
    }
}
