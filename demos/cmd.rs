use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

const CHUNK: usize = 16384;

/// Maintain an index for random (seekable) access to a gzip file
#[derive(Parser, Debug)]
struct Cli {
    /// Build the index file "<FILE>.idx" instead of extracting
    #[arg(short = 'b', long)]
    build: bool,

    /// Gzip (or zlib) compressed file
    input: PathBuf,

    /// Range to extract: "BEGIN-END" (half-open), "-END", "BEGIN-", or a
    /// single offset
    range: Option<String>,
}

/// Returns `(begin, end)`, where `end == None` means read to end of stream
fn parse_range(arg: &str) -> Option<(i64, Option<i64>)> {
    match arg.split_once('-') {
        None => {
            let begin: i64 = arg.parse().ok()?;
            Some((begin, Some(begin + 1)))
        }
        Some(("", end)) => Some((0, Some(end.parse().ok()?))),
        Some((begin, "")) => Some((begin.parse().ok()?, None)),
        Some((begin, end)) => Some((begin.parse().ok()?, Some(end.parse().ok()?))),
    }
}

fn extract(input: &Path, begin: i64, end: Option<i64>) -> gzseek::Result<()> {
    let mut reader = gzseek::Reader::open(input)?;
    reader.seek(begin);

    let stdout = std::io::stdout();
    let mut stdout = stdout.lock();
    let mut buf = vec![0; CHUNK];
    loop {
        let want = match end {
            Some(end) if end - reader.tell() <= 0 => break,
            Some(end) => CHUNK.min((end - reader.tell()) as usize),
            None => CHUNK,
        };
        let n = reader.read(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        stdout.write_all(&buf[..n]).map_err(gzseek::Error::Write)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = if cli.build {
        println!(
            "Building an index: {}",
            gzseek::index_path(&cli.input).display()
        );
        gzseek::build(&cli.input)
    } else {
        let Some((begin, end)) = cli.range.as_deref().and_then(parse_range) else {
            eprintln!("ERROR: expected a range such as BEGIN-END, -END, BEGIN- or OFFSET.");
            return ExitCode::FAILURE;
        };
        extract(&cli.input, begin, end)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: {err}.");
            ExitCode::FAILURE
        }
    }
}
