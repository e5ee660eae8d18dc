//! rtfd-guns-parse - Extract files embedded in RTFD combined-marker containers
//!
//! This tool scans RTFD "guns for hands" containers for embedded files,
//! writes each payload to an extraction directory and reports filenames,
//! sizes, hashes and MIME types as JSON.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, ValueEnum};
use rtfd_guns_core::{
    read_input, sanitize_filename, DirectorySink, Extraction, ExtractedFile, Extractor,
    ExtractorConfig, PayloadSink, RTFD_MAGIC,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Parse RTFD guns-for-hands blocks, extract files, and output JSON metadata
#[derive(Parser, Debug)]
#[command(name = "rtfd-guns-parse")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Directory to extract files into
    #[arg(short = 'o', long, default_value = "extracted_files")]
    extract_dir: PathBuf,

    /// Write JSON results to this file (otherwise print to stdout)
    #[arg(short, long)]
    json_out: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Maximum number of files to extract per container (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_files: usize,

    /// Ignore containers that do not start with the 'rtfd' magic
    #[arg(long)]
    require_magic: bool,

    /// Dry run - don't write files, just report what would be extracted
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing files in the extraction directory
    #[arg(long)]
    force: bool,

    /// Conflict resolution strategy for same-name different-content files
    #[arg(long, value_enum, default_value = "hash-suffix")]
    conflict_strategy: ConflictStrategy,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single container to extract
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of containers to process recursively
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Strategy for resolving naming conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ConflictStrategy {
    /// Append a short content hash: file~a1b2c3d4.pdf
    HashSuffix,
    /// Append source container name: file~from-sample.pdf
    SourceSuffix,
    /// Replace the earlier file
    Overwrite,
}

/// Per-container entry of the directory-mode JSON report
#[derive(Debug, Serialize)]
struct ContainerReport {
    source: String,
    warning: Option<String>,
    files: Vec<ExtractedFile>,
}

/// Tracks extracted names for deduplication across containers
#[derive(Default)]
struct ExtractRegistry {
    /// Maps sanitized filename -> (content_hash, output_path)
    seen: HashMap<String, Vec<(String, PathBuf)>>,
    /// Statistics
    stats: RegistryStats,
}

#[derive(Default)]
struct RegistryStats {
    total_found: usize,
    duplicates_skipped: usize,
    conflicts_renamed: usize,
    written: usize,
}

impl ExtractRegistry {
    fn new() -> Self {
        Self::default()
    }

    /// Compute a short hash of the content (first 8 chars of blake3)
    fn content_hash(content: &[u8]) -> String {
        let hash = blake3::hash(content);
        hash.to_hex()[..8].to_string()
    }

    /// Output path of an identical earlier payload with this name, if any
    fn find_duplicate(&self, filename: &str, content_hash: &str) -> Option<&PathBuf> {
        self.seen.get(filename).and_then(|entries| {
            entries
                .iter()
                .find(|(h, _)| h == content_hash)
                .map(|(_, path)| path)
        })
    }

    /// Get the number of variants we've seen for this filename
    fn variant_count(&self, filename: &str) -> usize {
        self.seen.get(filename).map(|e| e.len()).unwrap_or(0)
    }

    /// Decide the output name for a payload.
    ///
    /// `occupied` means a file with different content already sits at
    /// `filename` in the output directory, left there by an earlier run.
    /// Returns `Err(path)` when an identical payload was already written there.
    fn register(
        &mut self,
        filename: &str,
        content_hash: &str,
        output_dir: &Path,
        source: Option<&Path>,
        strategy: ConflictStrategy,
        occupied: bool,
    ) -> std::result::Result<String, PathBuf> {
        self.stats.total_found += 1;

        if let Some(existing) = self.find_duplicate(filename, content_hash).cloned() {
            debug!("Skipping duplicate: {} (hash: {})", filename, content_hash);
            self.stats.duplicates_skipped += 1;
            return Err(existing);
        }

        let output_name = if self.variant_count(filename) == 0 && !occupied {
            filename.to_string()
        } else {
            match strategy {
                ConflictStrategy::Overwrite => {
                    debug!("Overwriting earlier {} (hash: {})", filename, content_hash);
                    filename.to_string()
                }
                ConflictStrategy::HashSuffix => {
                    let new_name = Self::add_suffix(filename, &format!("~{}", content_hash));
                    info!(
                        "Conflict resolved: {} -> {} (content differs)",
                        filename, new_name
                    );
                    self.stats.conflicts_renamed += 1;
                    new_name
                }
                ConflictStrategy::SourceSuffix => {
                    let source_name = source
                        .and_then(|p| p.file_stem())
                        .and_then(|s| s.to_str())
                        .unwrap_or("unknown");
                    let new_name = Self::add_suffix(filename, &format!("~from-{}", source_name));
                    info!(
                        "Conflict resolved: {} -> {} (from {})",
                        filename, new_name, source_name
                    );
                    self.stats.conflicts_renamed += 1;
                    new_name
                }
            }
        };

        self.seen
            .entry(filename.to_string())
            .or_default()
            .push((content_hash.to_string(), output_dir.join(&output_name)));

        Ok(output_name)
    }

    /// Add a suffix before the file extension
    fn add_suffix(filename: &str, suffix: &str) -> String {
        match filename.rfind('.') {
            Some(dot) if dot > 0 => format!("{}{}{}", &filename[..dot], suffix, &filename[dot..]),
            _ => format!("{}{}", filename, suffix),
        }
    }

    fn print_summary(&self) {
        info!(
            "Summary: {} found, {} duplicates skipped, {} conflicts renamed, {} written",
            self.stats.total_found,
            self.stats.duplicates_skipped,
            self.stats.conflicts_renamed,
            self.stats.written
        );
    }
}

/// Sink that routes payloads through the registry before writing them
struct RegistrySink<'a> {
    registry: &'a mut ExtractRegistry,
    directory: DirectorySink,
    source: &'a Path,
    strategy: ConflictStrategy,
    force: bool,
    dry_run: bool,
}

impl RegistrySink<'_> {
    /// Whether `filename` already holds different content on disk
    fn occupied(&self, filename: &str, data: &[u8]) -> rtfd_guns_core::Result<bool> {
        if self.force {
            return Ok(false);
        }
        let path = self.directory.resolve(filename)?;
        Ok(path.exists() && !DirectorySink::matches_content(&path, data))
    }
}

impl PayloadSink for RegistrySink<'_> {
    fn store(&mut self, filename: &str, data: &[u8]) -> rtfd_guns_core::Result<String> {
        let safe = sanitize_filename(filename);
        let content_hash = ExtractRegistry::content_hash(data);
        let occupied = self.occupied(&safe, data)?;

        let output_name = match self.registry.register(
            &safe,
            &content_hash,
            self.directory.root(),
            Some(self.source),
            self.strategy,
            occupied,
        ) {
            Ok(name) => name,
            Err(existing) => return Ok(existing.display().to_string()),
        };

        if self.dry_run {
            let path = self.directory.resolve(&output_name)?;
            info!("Would write: {}", path.display());
            return Ok(path.display().to_string());
        }

        let path = if self.strategy == ConflictStrategy::Overwrite {
            self.directory.clone().force(true).store(&output_name, data)?
        } else {
            self.directory.store(&output_name, data)?
        };
        self.registry.stats.written += 1;
        Ok(path)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Dispatch based on input mode
    if let Some(ref file) = cli.input.file {
        process_single_file(&cli, file)
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(&cli, directory)
    } else {
        bail!("Either --file or --directory must be specified")
    }
}

/// Process a single container
fn process_single_file(cli: &Cli, file: &Path) -> Result<()> {
    if !file.is_file() && file.exists() {
        bail!("Input path is not a file: {}", file.display());
    }

    let mut registry = ExtractRegistry::new();
    let extraction = process_container(cli, file, &mut registry)?;

    if !cli.dry_run {
        registry.print_summary();
    }

    emit_json(cli, &extraction.files)
}

/// Process a directory of containers recursively
fn process_directory(cli: &Cli, directory: &Path) -> Result<()> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut registry = ExtractRegistry::new();
    let mut reports = Vec::new();

    // Walk the directory
    for entry in WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        // Skip directories
        if !path.is_file() {
            continue;
        }

        // Skip hidden files
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false)
        {
            continue;
        }

        // Never re-scan our own output
        if path.starts_with(&cli.extract_dir) {
            continue;
        }

        if !is_likely_container(path) {
            trace!("Skipping non-container: {}", path.display());
            continue;
        }

        debug!("Processing container: {}", path.display());
        match process_container(cli, path, &mut registry) {
            Ok(extraction) => reports.push(container_report(path, extraction)),
            // Log error but continue with other files
            Err(e) => warn!("Error processing {}: {:#}", path.display(), e),
        }
    }

    info!("Processed {} containers", reports.len());

    if !cli.dry_run {
        registry.print_summary();
    }

    emit_json(cli, &reports)
}

/// Report entry for one container. Payload bytes are already on disk and
/// are not kept for the rest of the walk.
fn container_report(path: &Path, extraction: Extraction) -> ContainerReport {
    let mut files = extraction.files;
    for file in &mut files {
        file.data = Vec::new();
    }
    ContainerReport {
        source: path.display().to_string(),
        warning: extraction.warning.map(|w| w.to_string()),
        files,
    }
}

/// Containers start with the 'rtfd' magic
fn is_likely_container(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic).is_ok() && &magic == RTFD_MAGIC
}

/// Extract one container, writing payloads through the registry
fn process_container(
    cli: &Cli,
    path: &Path,
    registry: &mut ExtractRegistry,
) -> Result<Extraction> {
    trace!("Reading {}", path.display());
    let data = read_input(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
    trace!("Read {} bytes from {}", data.len(), path.display());

    let config = ExtractorConfig::new()
        .max_results(cli.max_files)
        .require_magic(cli.require_magic);

    let mut sink = RegistrySink {
        registry,
        directory: DirectorySink::new(&cli.extract_dir).force(cli.force),
        source: path,
        strategy: cli.conflict_strategy,
        force: cli.force,
        dry_run: cli.dry_run,
    };

    let extraction = Extractor::with_config(config).extract(&data, &mut sink);

    for skipped in &extraction.skipped {
        debug!(
            "Skipped marker at offset {} in {}: {}",
            skipped.offset,
            path.display(),
            skipped.reason
        );
    }
    if let Some(warning) = &extraction.warning {
        warn!("{}: {}", path.display(), warning);
    }

    debug!(
        "Extracted {} file(s) from {}",
        extraction.files.len(),
        path.display()
    );

    Ok(extraction)
}

/// Print the JSON report or write it to `--json-out`
fn emit_json<T: Serialize + ?Sized>(cli: &Cli, value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context("Failed to serialize results")?;

    match &cli.json_out {
        Some(path) => {
            fs::write(path, output)
                .with_context(|| format!("Failed to write JSON results: {}", path.display()))?;
            println!("JSON results written to {}", path.display());
        }
        None => println!("{}", output),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtfd_guns_core::COMBINED_MARKER;
    use tempfile::TempDir;

    /// One padded block with both trailing names set to `name`
    fn block(payload: &[u8], pad_len: u32, name: &str) -> Vec<u8> {
        let mut out = COMBINED_MARKER.to_vec();
        out.extend_from_slice(&[0u8; 21]);
        out.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0x80]);
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&pad_len.to_le_bytes());
        out.extend(std::iter::repeat(0u8).take(pad_len as usize));
        out.extend_from_slice(payload);
        for _ in 0..2 {
            out.extend_from_slice(&[1, 0, 0, 0]);
            out.extend_from_slice(&(name.len() as u32).to_le_bytes());
            out.extend_from_slice(name.as_bytes());
        }
        out
    }

    fn cli_for(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("rtfd-guns-parse").chain(args.iter().copied()))
    }

    #[test]
    fn test_registry_deduplication() {
        let mut registry = ExtractRegistry::new();
        let temp_dir = TempDir::new().unwrap();
        let hash = ExtractRegistry::content_hash(b"payload");

        let first = registry.register(
            "a.bin",
            &hash,
            temp_dir.path(),
            None,
            ConflictStrategy::HashSuffix,
            false,
        );
        assert_eq!(first, Ok("a.bin".to_string()));

        let second = registry.register(
            "a.bin",
            &hash,
            temp_dir.path(),
            None,
            ConflictStrategy::HashSuffix,
            false,
        );
        assert_eq!(second, Err(temp_dir.path().join("a.bin")));
        assert_eq!(registry.stats.duplicates_skipped, 1);
    }

    #[test]
    fn test_registry_conflict_strategies() {
        let mut registry = ExtractRegistry::new();
        let temp_dir = TempDir::new().unwrap();
        let hash1 = ExtractRegistry::content_hash(b"one");
        let hash2 = ExtractRegistry::content_hash(b"two");
        let hash3 = ExtractRegistry::content_hash(b"three");
        let source = Path::new("/samples/invoice.rtfd");

        registry
            .register("doc.pdf", &hash1, temp_dir.path(), None, ConflictStrategy::HashSuffix, false)
            .unwrap();

        let renamed = registry
            .register("doc.pdf", &hash2, temp_dir.path(), None, ConflictStrategy::HashSuffix, false)
            .unwrap();
        assert_eq!(renamed, format!("doc~{}.pdf", hash2));

        let renamed = registry
            .register(
                "doc.pdf",
                &hash3,
                temp_dir.path(),
                Some(source),
                ConflictStrategy::SourceSuffix,
                false,
            )
            .unwrap();
        assert_eq!(renamed, "doc~from-invoice.pdf");
        assert_eq!(registry.stats.conflicts_renamed, 2);
    }

    #[test]
    fn test_registry_occupied_name_is_a_conflict() {
        let mut registry = ExtractRegistry::new();
        let temp_dir = TempDir::new().unwrap();
        let hash = ExtractRegistry::content_hash(b"new");

        let renamed = registry
            .register("doc.pdf", &hash, temp_dir.path(), None, ConflictStrategy::HashSuffix, true)
            .unwrap();
        assert_eq!(renamed, format!("doc~{}.pdf", hash));

        let kept = registry
            .register("log.txt", &hash, temp_dir.path(), None, ConflictStrategy::Overwrite, true)
            .unwrap();
        assert_eq!(kept, "log.txt");
    }

    #[test]
    fn test_add_suffix() {
        assert_eq!(ExtractRegistry::add_suffix("test.pdf", "~abc123"), "test~abc123.pdf");
        assert_eq!(ExtractRegistry::add_suffix("archive.tar.gz", "~x"), "archive.tar~x.gz");
        assert_eq!(ExtractRegistry::add_suffix("README", "~x"), "README~x");
        assert_eq!(ExtractRegistry::add_suffix(".hidden", "~x"), ".hidden~x");
    }

    #[test]
    fn test_content_hash() {
        let hash1 = ExtractRegistry::content_hash(b"hello");
        let hash2 = ExtractRegistry::content_hash(b"hello");
        let hash3 = ExtractRegistry::content_hash(b"world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 8);
    }

    #[test]
    fn test_process_container_writes_files() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("sample.rtfd");
        let out_dir = temp_dir.path().join("out");

        let mut data = RTFD_MAGIC.to_vec();
        data.extend_from_slice(&block(b"first", 3, "same.txt"));
        data.extend_from_slice(&block(b"second", 0, "same.txt"));
        fs::write(&input, &data).unwrap();

        let cli = cli_for(&[
            "--file",
            input.to_str().unwrap(),
            "--extract-dir",
            out_dir.to_str().unwrap(),
        ]);
        let mut registry = ExtractRegistry::new();
        let extraction = process_container(&cli, &input, &mut registry).unwrap();

        assert_eq!(extraction.files.len(), 2);
        assert!(extraction.files[0].padding);
        assert!(!extraction.files[1].padding);
        assert_eq!(fs::read(&extraction.files[0].extracted_path).unwrap(), b"first");
        assert_eq!(fs::read(&extraction.files[1].extracted_path).unwrap(), b"second");
        assert_ne!(
            extraction.files[0].extracted_path,
            extraction.files[1].extracted_path
        );
        assert_eq!(registry.stats.written, 2);
        assert_eq!(registry.stats.conflicts_renamed, 1);
    }

    #[test]
    fn test_process_container_rerun_reuses_files() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("sample.rtfd");
        let out_dir = temp_dir.path().join("out");

        let mut data = RTFD_MAGIC.to_vec();
        data.extend_from_slice(&block(b"first", 3, "same.txt"));
        data.extend_from_slice(&block(b"second", 0, "same.txt"));
        fs::write(&input, &data).unwrap();

        let cli = cli_for(&[
            "--file",
            input.to_str().unwrap(),
            "--extract-dir",
            out_dir.to_str().unwrap(),
        ]);
        let first = process_container(&cli, &input, &mut ExtractRegistry::new()).unwrap();
        let second = process_container(&cli, &input, &mut ExtractRegistry::new()).unwrap();

        assert!(second.warning.is_none());
        assert_eq!(first.files, second.files);
        assert_eq!(fs::read_dir(&out_dir).unwrap().count(), 2);
    }

    #[test]
    fn test_process_container_renames_around_stale_file() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("sample.rtfd");
        let out_dir = temp_dir.path().join("out");
        fs::create_dir_all(&out_dir).unwrap();
        fs::write(out_dir.join("a.bin"), b"stale").unwrap();

        let mut data = RTFD_MAGIC.to_vec();
        data.extend_from_slice(&block(b"fresh", 0, "a.bin"));
        fs::write(&input, &data).unwrap();

        let cli = cli_for(&[
            "--file",
            input.to_str().unwrap(),
            "--extract-dir",
            out_dir.to_str().unwrap(),
        ]);
        let extraction = process_container(&cli, &input, &mut ExtractRegistry::new()).unwrap();

        assert!(extraction.warning.is_none());
        assert_eq!(extraction.files.len(), 1);
        let hash = ExtractRegistry::content_hash(b"fresh");
        assert_eq!(
            PathBuf::from(&extraction.files[0].extracted_path),
            out_dir.join(format!("a~{}.bin", hash))
        );
        assert_eq!(fs::read(out_dir.join("a.bin")).unwrap(), b"stale");
    }

    #[test]
    fn test_container_report_drops_payloads() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("sample.rtfd");

        let mut data = RTFD_MAGIC.to_vec();
        data.extend_from_slice(&block(b"payload", 0, "a.bin"));
        fs::write(&input, &data).unwrap();

        let cli = cli_for(&["--file", input.to_str().unwrap(), "--dry-run"]);
        let extraction = process_container(&cli, &input, &mut ExtractRegistry::new()).unwrap();
        assert_eq!(extraction.files[0].data, b"payload");

        let report = container_report(&input, extraction);
        assert_eq!(report.files.len(), 1);
        assert!(report.files[0].data.is_empty());
        assert_eq!(report.files[0].size, 7);
    }

    #[test]
    fn test_process_container_dry_run_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("sample.rtfd");
        let out_dir = temp_dir.path().join("out");

        let mut data = RTFD_MAGIC.to_vec();
        data.extend_from_slice(&block(b"payload", 0, "a.bin"));
        fs::write(&input, &data).unwrap();

        let cli = cli_for(&[
            "--file",
            input.to_str().unwrap(),
            "--extract-dir",
            out_dir.to_str().unwrap(),
            "--dry-run",
        ]);
        let extraction = process_container(&cli, &input, &mut ExtractRegistry::new()).unwrap();

        assert_eq!(extraction.files.len(), 1);
        assert!(!out_dir.exists());
    }

    #[test]
    fn test_empty_input_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("empty.rtfd");
        fs::write(&input, b"").unwrap();

        let cli = cli_for(&["--file", input.to_str().unwrap()]);
        let err = process_container(&cli, &input, &mut ExtractRegistry::new()).unwrap_err();
        assert!(format!("{:#}", err).contains("is empty"));
    }

    #[test]
    fn test_is_likely_container() {
        let temp_dir = TempDir::new().unwrap();
        let yes = temp_dir.path().join("a");
        let no = temp_dir.path().join("b");
        fs::write(&yes, b"rtfd\x00\x00").unwrap();
        fs::write(&no, b"{\\rtf1").unwrap();

        assert!(is_likely_container(&yes));
        assert!(!is_likely_container(&no));
        assert!(!is_likely_container(&temp_dir.path().join("missing")));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
