/*!
 * respack - RESP command log compactor
 *
 * Reads a recorded command log (plain or gzip-compressed), collapses
 * repeated ZINCRBY and SADD commands per key, and writes a semantically
 * equivalent minimal log. Everything else passes through unchanged.
 *
 * Output is a tab-separated stats line unless --quiet:
 *   infile [outfile] total-commands aggregated-commands ratio seconds
 */

use anyhow::{bail, Context, Result};
use clap::Parser;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, warn};
use respack::{Aggregator, Decoder, CHUNK_SIZE};
use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "respack", version, about = "Compact a RESP command log by aggregating ZINCRBY and SADD commands")]
struct Cli {
    /// Input command log (plain or gzip-compressed RESP)
    infile: PathBuf,

    /// Compacted output log (required unless --stat)
    outfile: Option<PathBuf>,

    /// Display statistics but don't write anything
    #[arg(long, short = 's')]
    stat: bool,

    /// Compress the output file with gzip
    #[arg(long = "gzip", short = 'z')]
    gzip: bool,

    /// Don't output information about the compaction
    #[arg(long, short = 'q', conflicts_with = "stat")]
    quiet: bool,
}

fn main() -> Result<()> {
    // Respects RUST_LOG, e.g. RUST_LOG=debug respack in.aof out.aof
    env_logger::init();

    let cli = Cli::parse();
    if !cli.stat && cli.outfile.is_none() {
        bail!("an output file is required unless --stat is given");
    }

    let start = Instant::now();

    let mut input = open_input(&cli.infile)?;
    let mut decoder = Decoder::new();
    let mut agg = Aggregator::new()?;

    // Small chunks keep the decoder's tail compaction cheap when a command
    // straddles a read boundary
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = input
            .read(&mut chunk)
            .with_context(|| format!("reading {}", cli.infile.display()))?;
        if n == 0 {
            break;
        }
        decoder.feed(&chunk[..n]);
        while let Some(cmd) = decoder.next_command()? {
            agg.ingest(&cmd)?;
        }
    }

    if decoder.buffered() > 0 {
        warn!(
            "{}: {} trailing bytes do not form a complete command, ignored",
            cli.infile.display(),
            decoder.buffered()
        );
    }

    let seen = agg.seen();
    let aggregated = agg.aggregated_count();

    let outfile = if cli.stat {
        // Stats only: counts are enough, skip building the final buffer
        None
    } else {
        let buf = agg.finish()?;
        let path = output_path(cli.outfile.as_deref().unwrap(), cli.gzip);
        write_output(&path, buf.as_slice(), cli.gzip)?;
        debug!("wrote {} bytes ({} commands) to {}", buf.len(), buf.commands(), path.display());
        Some(path)
    };

    let elapsed = start.elapsed().as_secs_f64();

    if !cli.quiet {
        let ratio = if seen > 0 {
            1.0 - aggregated as f64 / seen as f64
        } else {
            0.0
        };
        print!("{}\t", cli.infile.display());
        if let Some(path) = &outfile {
            print!("{}\t", path.display());
        }
        println!("{seen}\t{aggregated}\t{ratio:.2}\t{elapsed:.6}");
    }

    Ok(())
}

/// Open the input, transparently decompressing gzip.
///
/// Detection is by the 0x1f 0x8b magic rather than file extension, so a
/// plain log with a .gz name (or the reverse) still reads correctly.
fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let head = reader.fill_buf().context("reading input header")?;
    if is_gzip(head) {
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

#[inline]
fn is_gzip(head: &[u8]) -> bool {
    head.len() >= 2 && head[0] == 0x1f && head[1] == 0x8b
}

/// Output path, with a .gz extension appended when compressing and the
/// name doesn't already carry one.
fn output_path(requested: &Path, gzip: bool) -> PathBuf {
    if !gzip || requested.extension() == Some(OsStr::new("gz")) {
        return requested.to_path_buf();
    }
    let mut name = requested.as_os_str().to_os_string();
    name.push(".gz");
    PathBuf::from(name)
}

fn write_output(path: &Path, data: &[u8], gzip: bool) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    if gzip {
        let mut enc = GzEncoder::new(file, Compression::default());
        enc.write_all(data)?;
        enc.finish().context("finishing gzip stream")?;
    } else {
        let mut out = BufWriter::new(file);
        out.write_all(data)?;
        out.flush()?;
    }
    Ok(())
}
