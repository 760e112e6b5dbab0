use clap::Parser;
use clap::error::ErrorKind;
use log::{debug, info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use thiserror::Error;

pub const BYTES_PER_KB: u64 = 1024;
pub const BYTES_PER_MB: u64 = 1024 * BYTES_PER_KB;

const UNIT_SUFFIXES: &[(char, u64)] = &[
    ('k', BYTES_PER_KB),
    ('K', BYTES_PER_KB),
    ('m', BYTES_PER_MB),
    ('M', BYTES_PER_MB),
];

pub const USAGE: &str = "usage: ncopy <destination file> <source file> \
<start copying at byte n> \
<number of bytes to copy. Either raw number or followed by 'k' or 'm'>";

const WRONG_ARGUMENTS: &str = "Wrong number of arguments";

/// Process exit code for every fatal error.
pub const FAILURE_RC: u8 = 1;

#[derive(Parser, Debug)]
#[command(name = "ncopy", version, about, long_about = None)]
pub struct Args {
    /// Destination file path
    pub destination: PathBuf,

    /// Source file path
    pub source: PathBuf,

    /// Byte offset in the source file where copying starts
    #[arg(allow_negative_numbers = true)]
    pub start_offset: String,

    /// Number of bytes to copy. Raw number or followed by 'k'/'K' or 'm'/'M'.
    #[arg(allow_negative_numbers = true)]
    pub byte_count: String,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Error, Debug)]
pub enum CopyError {
    #[error("{}\n{}", USAGE, .detail)]
    Usage { detail: String },

    #[error(
        "Number of bytes to copy invalid ('{value}'). \
         Must be given as raw number or number followed by 'k' or 'm'."
    )]
    InvalidByteCount { value: String },

    #[error("Start offset invalid ('{value}'). Must be a non-negative number.")]
    InvalidStartOffset { value: String },

    #[error("could not open source file {}: {source}", .path.display())]
    OpenSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not create destination file {}: {source}", .path.display())]
    CreateDestination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not go to desired position {offset}: {source}")]
    Seek {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read source file: {source}")]
    Read {
        #[source]
        source: std::io::Error,
    },

    #[error("could not write destination file: {source}")]
    Write {
        #[source]
        source: std::io::Error,
    },
}

/// A validated copy: `byte_count` bytes from `source` starting at
/// `start_offset`, written to a fresh `destination`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    pub destination: PathBuf,
    pub source: PathBuf,
    pub start_offset: u64,
    pub byte_count: u64,
}

impl CopyRequest {
    pub fn from_args(args: &Args) -> Result<Self, CopyError> {
        let byte_count = parse_byte_count(&args.byte_count)?;
        let start_offset = parse_start_offset(&args.start_offset)?;
        Ok(CopyRequest {
            destination: args.destination.clone(),
            source: args.source.clone(),
            start_offset,
            byte_count,
        })
    }
}

// Leading whitespace, optional sign, then 0x/0X hex, leading 0 octal, else
// decimal. The rest of the string must be consumed.
fn parse_integer(text: &str) -> Option<i128> {
    let text = text.trim_start();
    let (negative, unsigned) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, digits) = if let Some(hex) = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        (16, hex)
    } else if unsigned.len() > 1 && unsigned.starts_with('0') {
        (8, &unsigned[1..])
    } else {
        (10, unsigned)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let magnitude = i128::from_str_radix(digits, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Parses a byte count such as `512`, `0x200`, `4k` or `2M`.
///
/// Suffixes are tried in `k`, `K`, `m`, `M` order. The first one present cuts
/// the string; the part before it is the number and anything after it is
/// ignored. The scaled result must be positive and fit in a `u64`.
pub fn parse_byte_count(text: &str) -> Result<u64, CopyError> {
    let invalid = || CopyError::InvalidByteCount {
        value: text.to_string(),
    };
    let (digits, multiplier) = UNIT_SUFFIXES
        .iter()
        .find_map(|&(suffix, multiplier)| {
            text.find(suffix).map(|pos| (&text[..pos], multiplier))
        })
        .unwrap_or((text, 1));
    let count = parse_integer(digits)
        .and_then(|n| u64::try_from(n).ok())
        .filter(|&n| n > 0)
        .ok_or_else(invalid)?;
    count.checked_mul(multiplier).ok_or_else(invalid)
}

/// Parses the start offset as a plain decimal number. Leading whitespace and
/// a `+` sign are accepted, so `010` is byte 10. Zero is allowed.
pub fn parse_start_offset(text: &str) -> Result<u64, CopyError> {
    let trimmed = text.trim_start();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CopyError::InvalidStartOffset {
            value: text.to_string(),
        });
    }
    digits
        .parse::<u64>()
        .map_err(|_| CopyError::InvalidStartOffset {
            value: text.to_string(),
        })
}

/// Copies the requested range and returns the number of bytes written.
///
/// Stops early without error when the source runs out. The source is opened
/// before the destination is created, so a missing source leaves no
/// destination behind.
pub fn execute_copy(request: &CopyRequest) -> Result<u64, CopyError> {
    debug!("opening source {}", request.source.display());
    let ifile = File::open(&request.source).map_err(|source| CopyError::OpenSource {
        path: request.source.clone(),
        source,
    })?;

    debug!("creating destination {}", request.destination.display());
    let ofile = File::create(&request.destination).map_err(|source| {
        CopyError::CreateDestination {
            path: request.destination.clone(),
            source,
        }
    })?;

    let mut reader = BufReader::new(ifile);
    debug!("seeking source to {}", request.start_offset);
    reader
        .seek(SeekFrom::Start(request.start_offset))
        .map_err(|source| CopyError::Seek {
            offset: request.start_offset,
            source,
        })?;

    let mut writer = BufWriter::new(ofile);
    let mut bytes_copied: u64 = 0;
    for byte in reader.take(request.byte_count).bytes() {
        let byte = byte.map_err(|source| CopyError::Read { source })?;
        writer
            .write_all(&[byte])
            .map_err(|source| CopyError::Write { source })?;
        bytes_copied += 1;
    }
    writer.flush().map_err(|source| CopyError::Write { source })?;

    if bytes_copied < request.byte_count {
        info!(
            "source ended after {} of {} requested bytes",
            bytes_copied, request.byte_count
        );
    }
    Ok(bytes_copied)
}

pub fn arg_parse(argv: &[OsString]) -> Result<Args, CopyError> {
    match Args::try_parse_from(argv) {
        Ok(args) => Ok(args),
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => Err(CopyError::Usage {
                detail: e.render().to_string().trim_end().to_string(),
            }),
            ErrorKind::MissingRequiredArgument
            | ErrorKind::UnknownArgument
            | ErrorKind::TooManyValues => Err(CopyError::Usage {
                detail: WRONG_ARGUMENTS.to_string(),
            }),
            _ => Err(CopyError::Usage {
                detail: e.kind().as_str().unwrap_or(WRONG_ARGUMENTS).to_string(),
            }),
        },
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto).is_err()
    {
        debug!("logger already installed");
    }
}

fn echo_arguments(argv: &[OsString]) {
    println!("Arguments:");
    for (i, arg) in argv.iter().enumerate() {
        println!("{}: {}", i, arg.to_string_lossy());
    }
}

/// Runs one invocation over a full argv (program name first).
pub fn run<I, T>(args: I) -> Result<u64, CopyError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let argv: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let args = arg_parse(&argv)?;
    init_logging(args.verbose);
    echo_arguments(&argv);

    let request = CopyRequest::from_args(&args)?;
    info!(
        "copying {} bytes from {} at offset {} to {}",
        request.byte_count,
        request.source.display(),
        request.start_offset,
        request.destination.display()
    );
    let bytes_copied = execute_copy(&request)?;
    info!("copied {} bytes", bytes_copied);
    Ok(bytes_copied)
}
