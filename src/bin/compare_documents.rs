use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Instant;

use env_logger::Builder;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, LevelFilter};
use parking_lot::Mutex;

use pagematch::{
    ColorSpace, Document, DocumentComparer, DocumentId, Error, NoopProgress, Page, PagematchConfig,
    PageRenderer, ProgressReporter, RasterImage, Result,
};

/// Command line options for the comparison run.
struct RunConfig {
    base_dir: Option<PathBuf>,
    compare_dir: Option<PathBuf>,
    output: Option<PathBuf>,
    comparison_id: Option<String>,
    config_file: Option<String>,
    quiet: bool,
    verbose: bool,
}

impl RunConfig {
    fn from_args() -> Self {
        let args: Vec<String> = std::env::args().collect();

        let mut config = RunConfig {
            base_dir: None,
            compare_dir: None,
            output: None,
            comparison_id: None,
            config_file: None,
            quiet: false,
            verbose: false,
        };

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--base" => {
                    if i + 1 < args.len() {
                        config.base_dir = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                },
                "--compare" => {
                    if i + 1 < args.len() {
                        config.compare_dir = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                },
                "--output" => {
                    if i + 1 < args.len() {
                        config.output = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                },
                "--id" => {
                    if i + 1 < args.len() {
                        config.comparison_id = Some(args[i + 1].clone());
                        i += 1;
                    }
                },
                "--quiet" => {
                    config.quiet = true;
                },
                "--verbose" => {
                    config.verbose = true;
                },
                "--help" | "-h" => {
                    Self::print_help();
                    process::exit(0);
                },
                arg if arg.ends_with(".ini") => {
                    config.config_file = Some(arg.to_string());
                },
                _ => {
                    // Unrecognized argument, just ignore
                }
            }
            i += 1;
        }

        config
    }

    fn print_help() {
        println!("Pagematch Document Comparison - Command Line Options:");
        println!("  --base <dir>       Directory of base document pages (PGM/PPM, sorted by name)");
        println!("  --compare <dir>    Directory of compare document pages");
        println!("  --output <path>    Write the comparison result as JSON (default: stdout)");
        println!("  --id <string>      Explicit comparison id for the result");
        println!("  --quiet            Suppress the progress bar");
        println!("  --verbose          Debug-level logging");
        println!("  <file>.ini         Configuration file");
    }
}

/// Page renderer over a directory of binary PGM (P5) or PPM (P6) files.
/// Page order follows the sorted file names; pages are read on demand so
/// the image cache decides what stays in memory.
struct PnmDirRenderer {
    pages: Mutex<ahash::AHashMap<(DocumentId, u32), PathBuf>>,
}

impl PnmDirRenderer {
    fn new() -> Self {
        Self { pages: Mutex::new(ahash::AHashMap::new()) }
    }

    /// Scans a directory and registers its page files under the given
    /// document id. Returns the document the engine will work with.
    fn load_document(&self, id: &str, dir: &Path) -> Result<Document> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("pgm") | Some("ppm") | Some("pnm")
                )
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(Error::invalid_input(format!(
                "No PGM/PPM page files found in {}", dir.display()
            )));
        }

        let doc_id = DocumentId::from(id);
        let mut pages = Vec::with_capacity(files.len());
        let mut registry = self.pages.lock();

        for (index, path) in files.into_iter().enumerate() {
            let number = index as u32 + 1;
            let (width, height) = read_pnm_dimensions(&path)?;
            registry.insert((doc_id.clone(), number), path);
            pages.push(Page { number, width, height });
        }

        Ok(Document { id: doc_id, pages })
    }
}

impl PageRenderer for PnmDirRenderer {
    fn render_page(&self, document: &Document, page_number: u32, _dpi: Option<u32>) -> Result<RasterImage> {
        let path = self
            .pages
            .lock()
            .get(&(document.id.clone(), page_number))
            .cloned()
            .ok_or_else(|| Error::render(format!(
                "No page file registered for {} page {}", document.id, page_number
            )))?;
        read_pnm(&path)
    }
}

/// Parses the header of a binary PNM file without reading the pixel data.
fn read_pnm_dimensions(path: &Path) -> Result<(u32, u32)> {
    let mut bytes = Vec::new();
    File::open(path)?.take(512).read_to_end(&mut bytes)?;
    let (_, width, height, _, _) = parse_pnm_header(&bytes, path)?;
    Ok((width, height))
}

fn read_pnm(path: &Path) -> Result<RasterImage> {
    let bytes = fs::read(path)?;
    let (colorspace, width, height, maxval, offset) = parse_pnm_header(&bytes, path)?;

    if maxval != 255 {
        return Err(Error::invalid_input(format!(
            "{}: only maxval 255 is supported (got {})", path.display(), maxval
        )));
    }

    let expected = width as usize * height as usize * colorspace.channels();
    let data = bytes
        .get(offset..offset + expected)
        .ok_or_else(|| Error::invalid_input(format!(
            "{}: truncated pixel data", path.display()
        )))?
        .to_vec();

    RasterImage::new(width, height, colorspace, data)
}

/// Returns (colorspace, width, height, maxval, pixel data offset).
fn parse_pnm_header(bytes: &[u8], path: &Path) -> Result<(ColorSpace, u32, u32, u32, usize)> {
    let colorspace = match bytes.get(0..2) {
        Some(b"P5") => ColorSpace::Gray,
        Some(b"P6") => ColorSpace::Rgb,
        _ => {
            return Err(Error::invalid_input(format!(
                "{}: not a binary PGM/PPM file", path.display()
            )));
        }
    };

    // Three whitespace-separated header fields after the magic, with
    // '#' comment lines allowed between them
    let mut fields = [0u32; 3];
    let mut field = 0;
    let mut pos = 2;
    while field < 3 {
        while pos < bytes.len() && (bytes[pos].is_ascii_whitespace() || bytes[pos] == b'#') {
            if bytes[pos] == b'#' {
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
            } else {
                pos += 1;
            }
        }
        let start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        if start == pos {
            return Err(Error::invalid_input(format!(
                "{}: malformed PNM header", path.display()
            )));
        }
        let text = std::str::from_utf8(&bytes[start..pos])
            .map_err(|_| Error::invalid_input(format!("{}: malformed PNM header", path.display())))?;
        fields[field] = text
            .parse()
            .map_err(|_| Error::invalid_input(format!("{}: malformed PNM header", path.display())))?;
        field += 1;
    }

    // Exactly one whitespace byte separates the header from the pixels
    pos += 1;
    Ok((colorspace, fields[0], fields[1], fields[2], pos))
}

/// Progress bar bridge. Phase changes reset the bar; scoring updates move it.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(1);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg:12} [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self { bar }
    }
}

impl ProgressReporter for BarProgress {
    fn report_progress(&self, _comparison_id: &str, completed: usize, total: usize, phase: &str) {
        self.bar.set_message(phase.to_string());
        self.bar.set_length(total.max(1) as u64);
        self.bar.set_position(completed as u64);
        if phase == "done" {
            self.bar.finish_and_clear();
        }
    }
}

fn run(config: RunConfig) -> Result<()> {
    let base_dir = config
        .base_dir
        .ok_or_else(|| Error::invalid_input("--base <dir> is required"))?;
    let compare_dir = config
        .compare_dir
        .ok_or_else(|| Error::invalid_input("--compare <dir> is required"))?;

    let engine_config = match &config.config_file {
        Some(path) => {
            info!("Loading configuration from {}", path);
            PagematchConfig::from_ini(path)?
        }
        None => PagematchConfig::default(),
    };

    let renderer = Arc::new(PnmDirRenderer::new());
    let base = renderer.load_document("base", &base_dir)?;
    let compare = renderer.load_document("compare", &compare_dir)?;
    info!(
        "Loaded {} base pages from {}, {} compare pages from {}",
        base.page_count(), base_dir.display(), compare.page_count(), compare_dir.display()
    );

    let progress: Arc<dyn ProgressReporter> = if config.quiet {
        Arc::new(NoopProgress)
    } else {
        Arc::new(BarProgress::new())
    };

    let comparer = DocumentComparer::with_collaborators(
        engine_config,
        renderer,
        None,
        None,
        progress,
    )?;

    let started = Instant::now();
    let result = comparer.compare(&base, &compare, config.comparison_id.as_deref())?;
    info!("Comparison finished in {:?}", started.elapsed());

    println!(
        "Matched {}/{} pages (strategy: {}, confidence {:.2}, overall similarity {:.2})",
        result.summary.matched_pages,
        result.summary.base_page_count.max(result.summary.compare_page_count),
        result.strategy.as_str(),
        result.confidence,
        result.summary.overall_similarity,
    );

    match &config.output {
        Some(path) => {
            let file = File::create(path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, result.as_ref())?;
            writer.flush()?;
            println!("Result written to {}", path.display());
        }
        None => {
            let json = serde_json::to_string_pretty(result.as_ref())?;
            println!("{}", json);
        }
    }

    Ok(())
}

fn main() {
    let config = RunConfig::from_args();

    let mut builder = Builder::new();
    builder.filter_level(if config.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
    builder.format_timestamp_millis();
    builder.init();

    if let Err(e) = run(config) {
        error!("Comparison failed: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
