use clap::{Parser, Subcommand};
use resbin::container::ResourceFile;
use resbin::io_stream::WriterOptions;
use resbin::{ObjectValue, ResourceValue};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "resbin", about = "Binary resource container CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack files into a resource container (entry name = file name)
    Pack {
        #[arg(short, long)]
        output: PathBuf,
        /// Store as String entries (must be UTF-8)
        #[arg(long)]
        text: Vec<PathBuf>,
        /// Store as ByteArray entries
        #[arg(long)]
        blob: Vec<PathBuf>,
        /// Store as Object entries (JSON documents)
        #[arg(long)]
        json: Vec<PathBuf>,
    },
    /// List container entries
    List {
        input: PathBuf,
    },
    /// Show header fields and the offset table
    Info {
        input: PathBuf,
    },
    /// Print one entry's value
    Cat {
        input: PathBuf,
        name:  String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { output, text, blob, json } => {
            let mut rf = ResourceFile::create(&output, WriterOptions::default())?;
            for path in &text {
                rf.add_string(&entry_name(path)?, &std::fs::read_to_string(path)?)?;
                println!("  text    {}", path.display());
            }
            for path in &blob {
                rf.add_bytes(&entry_name(path)?, &std::fs::read(path)?)?;
                println!("  blob    {}", path.display());
            }
            for path in &json {
                let value: serde_json::Value = serde_json::from_slice(&std::fs::read(path)?)?;
                rf.add_object(&entry_name(path)?, &ObjectValue::new("json", value))?;
                println!("  object  {}", path.display());
            }
            rf.close()?;
            println!("Created: {}", output.display());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input } => {
            let mut rf = ResourceFile::open(&input)?;
            println!("Container: {}", input.display());
            println!("{:>5}  {:<32} {:<10} {:>10}  Declared type", "#", "Name", "Type", "Size");
            for e in rf.list()? {
                println!("{:>5}  {:<32} {:<10} {:>10}  {}",
                    e.index, e.name, e.type_tag.name(), e.size, e.declared_type_name);
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let rf = ResourceFile::open(&input)?;
            let header = rf.header().ok_or("container opened for writing")?;
            println!("── Resource container ───────────────────────────────────");
            println!("  Path              {}", input.display());
            println!("  Format version    {}", header.format_version);
            println!("  Type support      {}", header.type_support_mask.name());
            println!("  Header version    {}", header.supported_header_version);
            println!("  Offset alignment  {}", header.offset_alignment);
            println!("  Header length     {} B", header.header_byte_length);
            println!("  Records           {}", header.record_count());
            for (i, offset) in header.offsets.iter().enumerate() {
                println!("    [{i:>4}] +{offset}");
            }
        }

        // ── Cat ──────────────────────────────────────────────────────────────
        Commands::Cat { input, name } => {
            let mut rf = ResourceFile::open(&input)?;
            match rf.get(&name)? {
                Some(ResourceValue::String(s))    => println!("{s}"),
                Some(ResourceValue::ByteArray(b)) => println!("{}", hex::encode(b)),
                Some(ResourceValue::Object(o))    => println!("{}", serde_json::to_string_pretty(&o.value)?),
                None => return Err(format!("no entry named {name:?}").into()),
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn entry_name(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| format!("{} has no file name", path.display()).into())
}
