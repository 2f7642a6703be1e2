mod backup;

use anyhow::{Context, Result, bail};
use backup::BackupManager;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use jkr_core::ecd::{self, HeaderTemplate};
use jkr_core::exf::{self, ExfHeader, ExfOutput};
use jkr_core::{
    AssetFormat, CompressionDescriptor, CompressionType, ContainerHeader, DEFAULT_KEY_INDEX,
    DEFAULT_LEVEL, Layer, compress, decompress_with_header, unpack,
};
use rayon::prelude::*;
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Level, debug, error, info, warn};

#[derive(Parser)]
#[command(name = "jkr-cli")]
#[command(about = "JKR asset (de|en)crypt and (de)compress – CLI tool", long_about = None)]
#[command(version)]
struct Cli {
    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decrypt an ECD or EXF file, writing the header to <output>.meta
    Decrypt {
        /// Path to the encrypted file
        input: PathBuf,

        /// Path to write the decrypted payload
        output: PathBuf,

        /// Copy an existing output into backup/ first
        #[arg(long)]
        backup: bool,
    },

    /// Encrypt a payload as ECD or EXF
    Encrypt {
        /// Path to the plaintext payload
        input: PathBuf,

        /// Path to write the encrypted file
        output: PathBuf,

        #[arg(long, value_enum, default_value_t = CipherFormat::Ecd)]
        format: CipherFormat,

        /// Header saved by `decrypt` to reuse
        #[arg(long)]
        meta: Option<PathBuf>,

        #[arg(long)]
        key_index: Option<u16>,

        /// EXF seed, used when no meta file is given
        #[arg(long)]
        seed: Option<u32>,

        #[arg(long)]
        backup: bool,
    },

    /// Wrap a file in a JKR container
    Compress {
        input: PathBuf,

        output: PathBuf,

        #[arg(long, value_enum, default_value_t = KindArg::HuffmanLz)]
        kind: KindArg,

        /// Match search effort; also caps match length and distance
        #[arg(long, default_value_t = DEFAULT_LEVEL)]
        level: u32,

        #[arg(long)]
        backup: bool,
    },

    /// Extract the payload of a JKR container
    Decompress {
        input: PathBuf,

        output: PathBuf,

        #[arg(long)]
        backup: bool,
    },

    /// Strip every cipher and container layer from many files in parallel
    Unpack {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(long, default_value = "unpacked")]
        out_dir: PathBuf,

        /// Worker threads (default: one per core)
        #[arg(long)]
        jobs: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CipherFormat {
    Ecd,
    Exf,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Raw,
    Huffman,
    Lz,
    HuffmanLz,
}

impl From<KindArg> for CompressionType {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Raw => CompressionType::Raw,
            KindArg::Huffman => CompressionType::HuffmanOnly,
            KindArg::Lz => CompressionType::Lz,
            KindArg::HuffmanLz => CompressionType::HuffmanLz,
        }
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Decrypt {
            input,
            output,
            backup,
        } => cmd_decrypt(&input, &output, backup),
        Commands::Encrypt {
            input,
            output,
            format,
            meta,
            key_index,
            seed,
            backup,
        } => cmd_encrypt(
            &input,
            &output,
            format,
            meta.as_deref(),
            key_index,
            seed,
            backup,
        ),
        Commands::Compress {
            input,
            output,
            kind,
            level,
            backup,
        } => cmd_compress(&input, &output, kind.into(), level, backup),
        Commands::Decompress {
            input,
            output,
            backup,
        } => cmd_decompress(&input, &output, backup),
        Commands::Unpack {
            inputs,
            out_dir,
            jobs,
        } => cmd_unpack(&inputs, &out_dir, jobs),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))
}

fn write_output(path: &Path, data: &[u8], backup: bool) -> Result<()> {
    if backup {
        if let Some(saved) = BackupManager::for_output(path).backup_existing(path)? {
            info!("backed up {} -> {}", path.display(), saved.display());
        }
    }
    fs::write(path, data)
        .with_context(|| format!("Failed to write output file: {}", path.display()))
}

/// `<output>.meta`
fn meta_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".meta");
    PathBuf::from(name)
}

fn cmd_decrypt(input: &Path, output: &Path, backup: bool) -> Result<()> {
    let enc = read_input(input)?;
    debug!(len = enc.len(), "read encrypted file");

    let (header, payload) = match AssetFormat::detect(&enc) {
        AssetFormat::Ecd => {
            let block = ecd::decrypt(&enc)
                .with_context(|| format!("Failed to decrypt ECD file: {}", input.display()))?;
            info!(
                "ECD key_index={} len={} crc=0x{:08x}",
                block.header.key_index, block.header.payload_len, block.header.crc32
            );
            (block.header.to_bytes(), block.payload)
        }
        AssetFormat::Exf => match exf::decrypt(&enc)
            .with_context(|| format!("Failed to decrypt EXF file: {}", input.display()))?
        {
            ExfOutput::Decrypted { header, payload } => {
                info!("EXF key_index={} seed=0x{:08x}", header.key_index, header.seed);
                (header.to_bytes(), payload)
            }
            ExfOutput::Passthrough(_) => bail!("Not an EXF file: {}", input.display()),
        },
        _ => bail!("Not an ECD or EXF file: {}", input.display()),
    };

    write_output(output, &payload, backup)?;
    let meta = meta_path(output);
    write_output(&meta, &header, backup)?;

    info!("wrote payload -> {}", output.display());
    info!("wrote header -> {}", meta.display());
    Ok(())
}

fn cmd_encrypt(
    input: &Path,
    output: &Path,
    format: CipherFormat,
    meta: Option<&Path>,
    key_index: Option<u16>,
    seed: Option<u32>,
    backup: bool,
) -> Result<()> {
    let payload = read_input(input)?;
    let meta = meta
        .map(|path| {
            fs::read(path).with_context(|| format!("Failed to read meta file: {}", path.display()))
        })
        .transpose()?;

    let enc = match format {
        CipherFormat::Ecd => match (&meta, key_index) {
            (Some(meta), _) => ecd::encrypt(&payload, HeaderTemplate::Meta(meta))?,
            (None, Some(index)) => ecd::encrypt(&payload, HeaderTemplate::KeyIndex(index))?,
            (None, None) => ecd::encrypt_with_default_key(&payload)?,
        },
        CipherFormat::Exf => {
            let header = match (&meta, seed) {
                (Some(meta), _) => ExfHeader::parse(meta)?
                    .context("Meta file does not hold an EXF header")?,
                (None, Some(seed)) => {
                    ExfHeader::new(key_index.unwrap_or(DEFAULT_KEY_INDEX), seed)
                }
                (None, None) => bail!("EXF encryption needs --meta or --seed"),
            };
            exf::encrypt(&payload, &header)?
        }
    };

    write_output(output, &enc, backup)?;
    info!("wrote encrypted block -> {}", output.display());
    Ok(())
}

fn cmd_compress(
    input: &Path,
    output: &Path,
    kind: CompressionType,
    level: u32,
    backup: bool,
) -> Result<()> {
    let data = read_input(input)?;
    let descriptor = CompressionDescriptor::new(kind, level);
    let packed = compress(&descriptor, &data)
        .with_context(|| format!("Failed to compress {}", input.display()))?;

    info!(
        "{:?} level={} {} -> {} bytes",
        descriptor.kind(),
        descriptor.level(),
        data.len(),
        packed.len()
    );
    write_output(output, &packed, backup)?;
    info!("wrote container -> {}", output.display());
    Ok(())
}

fn cmd_decompress(input: &Path, output: &Path, backup: bool) -> Result<()> {
    let data = read_input(input)?;
    let header = ContainerHeader::parse(&data)
        .with_context(|| format!("Failed to parse JKR header: {}", input.display()))?;
    debug!(?header, "container header");

    let plain = decompress_with_header(&header, &data)
        .with_context(|| format!("Failed to decompress {}", input.display()))?;

    write_output(output, &plain, backup)?;
    info!("wrote {} bytes -> {}", plain.len(), output.display());
    Ok(())
}

fn cmd_unpack(inputs: &[PathBuf], out_dir: &Path, jobs: Option<usize>) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;
    let outputs = output_paths(inputs, out_dir)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.unwrap_or(0))
        .build()
        .context("Failed to start worker pool")?;

    let failed = pool.install(|| {
        inputs
            .par_iter()
            .zip(outputs.par_iter())
            .filter(|(input, output)| match unpack_one(input, output) {
                Ok(()) => false,
                Err(e) => {
                    error!("{}: {:?}", input.display(), e);
                    true
                }
            })
            .count()
    });

    if failed > 0 {
        bail!("{} of {} files failed to unpack", failed, inputs.len());
    }
    info!("unpacked {} files -> {}", inputs.len(), out_dir.display());
    Ok(())
}

/// One distinct output path per input. A repeated file name gets a `.2`,
/// `.3`, ... suffix that no other input uses.
fn output_paths(inputs: &[PathBuf], out_dir: &Path) -> Result<Vec<PathBuf>> {
    let names = inputs
        .iter()
        .map(|input| {
            input
                .file_name()
                .map(OsStr::to_owned)
                .with_context(|| format!("Input has no file name: {}", input.display()))
        })
        .collect::<Result<Vec<OsString>>>()?;

    let reserved: HashSet<&OsString> = names.iter().collect();
    let mut taken: HashSet<OsString> = HashSet::with_capacity(names.len());
    let mut outputs = Vec::with_capacity(names.len());

    for (input, name) in inputs.iter().zip(&names) {
        let mut chosen = name.clone();
        let mut n = 2;
        while taken.contains(&chosen) || (chosen != *name && reserved.contains(&chosen)) {
            chosen = name.clone();
            chosen.push(format!(".{}", n));
            n += 1;
        }
        if chosen != *name {
            warn!(
                "{}: name already used in this batch, writing {:?}",
                input.display(),
                chosen
            );
        }
        outputs.push(out_dir.join(&chosen));
        taken.insert(chosen);
    }

    Ok(outputs)
}

fn unpack_one(input: &Path, output: &Path) -> Result<()> {
    let data = read_input(input)?;
    let unpacked = unpack(&data)?;

    fs::write(output, &unpacked.data)
        .with_context(|| format!("Failed to write output file: {}", output.display()))?;

    let layers: Vec<&str> = unpacked.layers.iter().map(layer_name).collect();
    info!(
        "{} [{}] -> {}",
        input.display(),
        layers.join(" > "),
        output.display()
    );
    Ok(())
}

fn layer_name(layer: &Layer) -> &'static str {
    match layer {
        Layer::Ecd(_) => "ecd",
        Layer::Exf(_) => "exf",
        Layer::Jkr(_) => "jkr",
    }
}
