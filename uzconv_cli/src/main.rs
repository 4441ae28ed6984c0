use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{ArgAction, Parser};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use uzconv_codecs::{codec_for, codec_with_level};
use uzconv_core::{transcode, ContainerKind, Reader, TranscodeOptions, Writer};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "uzconv",
    about = "Transcode a block-indexed compressed image to another block codec, keeping it seekable",
    version
)]
struct Cli {
    /// Source container (uzip, ulzma or uzstd; detected from its header)
    source: PathBuf,
    /// Destination container, replaced atomically on success
    dest: PathBuf,
    /// Destination format: uzip (zlib) | ulzma (xz) | uzstd (zstd)
    #[arg(short, long, default_value = "ulzma")]
    format: String,
    /// Worker threads (default: number of available CPUs)
    #[arg(short = 'j', long)]
    threads: Option<usize>,
    /// Blocks queued ahead of the workers (default: 2 × threads)
    #[arg(long)]
    queue_depth: Option<usize>,
    /// Destination compression level (zlib 0–9, xz preset 0–9, zstd 1–22)
    #[arg(short, long)]
    level: Option<i32>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn transcode_options(threads: Option<usize>, queue_depth: Option<usize>) -> TranscodeOptions {
    let mut opts = match threads {
        Some(n) => TranscodeOptions::with_workers(n),
        None => TranscodeOptions::default(),
    };
    if let Some(depth) = queue_depth {
        opts.queue_depth = depth.max(1);
    }
    opts
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────

fn run_convert(cli: &Cli) -> anyhow::Result<()> {
    let target = ContainerKind::from_name(&cli.format).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown format '{}'. Valid options: uzip, ulzma, uzstd",
            cli.format
        )
    })?;
    let opts = transcode_options(cli.threads, cli.queue_depth);

    let source = File::open(&cli.source).with_context(|| format!("opening source {:?}", cli.source))?;
    let mut reader =
        Reader::open(BufReader::new(source)).with_context(|| format!("reading header of {:?}", cli.source))?;

    let decoder = codec_for(reader.kind());
    let encoder = match cli.level {
        Some(level) => codec_with_level(target, level),
        None => codec_for(target),
    };

    // Write next to the destination so the final rename stays on one
    // filesystem; the temporary is deleted if anything below fails.
    let dir = cli
        .dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let tmp = NamedTempFile::new_in(dir).with_context(|| format!("creating temporary file in {:?}", dir))?;
    debug!(path = ?tmp.path(), "writing to temporary file");

    let t0 = Instant::now();
    let summary = {
        let mut writer = Writer::create(
            BufWriter::new(tmp.as_file()),
            target,
            reader.block_size(),
            reader.block_count(),
        )?;
        let summary = transcode(&mut reader, &mut writer, decoder.as_ref(), encoder.as_ref(), &opts)
            .with_context(|| format!("transcoding {:?}", cli.source))?;
        writer
            .into_inner()
            .into_inner()
            .map_err(|e| e.into_error())
            .context("flushing destination")?;
        summary
    };
    tmp.as_file().sync_all().context("syncing destination")?;
    tmp.persist(&cli.dest)
        .with_context(|| format!("renaming into place at {:?}", cli.dest))?;
    let elapsed = t0.elapsed();
    info!(dest = ?cli.dest, "destination renamed into place");

    let file_size = std::fs::metadata(&cli.dest)?.len();
    let ratio = if summary.dest_bytes == 0 {
        1.0
    } else {
        summary.source_bytes as f64 / summary.dest_bytes as f64
    };

    eprintln!("  codecs      : {} -> {}", decoder.name(), encoder.name());
    eprintln!("  format      : {} -> {}", reader.kind(), target);
    eprintln!("  block size  : {}", human_bytes(reader.block_size() as u64));
    eprintln!("  blocks      : {}", summary.blocks);
    eprintln!("  workers     : {}", opts.workers);
    eprintln!("  source data : {}", human_bytes(summary.source_bytes));
    eprintln!("  dest data   : {}", human_bytes(summary.dest_bytes));
    eprintln!("  file on disk: {}", human_bytes(file_size));
    eprintln!("  ratio       : {:.2}x", ratio);
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run_convert(&cli)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positional_paths_and_flags() {
        let cli = Cli::try_parse_from(["uzconv", "-j", "3", "-vv", "--format", "uzstd", "in.uzip", "out.uzst"]).unwrap();
        assert_eq!(cli.source, PathBuf::from("in.uzip"));
        assert_eq!(cli.dest, PathBuf::from("out.uzst"));
        assert_eq!(cli.threads, Some(3));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.format, "uzstd");
    }

    #[test]
    fn requires_both_paths() {
        assert!(Cli::try_parse_from(["uzconv", "only-one"]).is_err());
    }

    #[test]
    fn options_from_flags() {
        let opts = transcode_options(Some(4), None);
        assert_eq!(opts, TranscodeOptions { workers: 4, queue_depth: 8 });
        assert_eq!(transcode_options(Some(0), Some(0)).workers, 1);
        assert_eq!(transcode_options(Some(2), Some(0)).queue_depth, 1);
    }

    #[test]
    fn human_bytes_units() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(1536), "1.50 KB");
    }
}
