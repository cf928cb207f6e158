use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use lexivol::dict::compiler;
use lexivol::dict::text::clamped_tags;
use lexivol::dict::CollectionOptions;
use lexivol::{
    Codec, Collator, Collection, FormatVersion, OpenOptions, Result, Strength, Volume,
    VolumeBuilder,
};

/// Inspect, query and build dictionary volumes
#[derive(Parser, Debug)]
#[command(name = "lexivol")]
#[command(version, about, long_about = None)]
struct Cli {
    /// More log output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory for short-index caches
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// DUCET-style collation table replacing the built-in collator
    #[arg(long, global = true)]
    collation: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print volume metadata
    Info {
        path: PathBuf,
    },

    /// List headwords starting with WORD across one or more volumes
    Lookup {
        word: String,
        #[arg(required = true)]
        volumes: Vec<PathBuf>,
        /// Matches taken from each volume
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        #[arg(short, long, value_enum, default_value_t = StrengthArg::Primary)]
        strength: StrengthArg,
    },

    /// Print the article for WORD, following redirects
    Article {
        path: PathBuf,
        word: String,
        /// Stop at the first article instead of following redirects
        #[arg(long)]
        no_redirects: bool,
    },

    /// Check every index record and article bound
    Verify {
        path: PathBuf,
    },

    /// Build a volume from source text (headword, lines, `</>`)
    Compile {
        source: PathBuf,
        output: PathBuf,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "1.0")]
        version: String,
        #[arg(long, default_value = "")]
        language: String,
        #[arg(long, value_enum, default_value_t = FormatArg::Fixed)]
        format: FormatArg,
        #[arg(long, value_enum, default_value_t = CodecArg::Zlib)]
        codec: CodecArg,
        /// Number of files to spread articles over
        #[arg(long, default_value_t = 1)]
        files: usize,
        /// Store an eager short-index table of this depth
        #[arg(long)]
        short_depth: Option<usize>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum StrengthArg {
    Primary,
    Secondary,
    Tertiary,
    Quaternary,
}

impl From<StrengthArg> for Strength {
    fn from(arg: StrengthArg) -> Self {
        match arg {
            StrengthArg::Primary => Strength::Primary,
            StrengthArg::Secondary => Strength::Secondary,
            StrengthArg::Tertiary => Strength::Tertiary,
            StrengthArg::Quaternary => Strength::Quaternary,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Linked,
    Positional,
    Fixed,
}

impl From<FormatArg> for FormatVersion {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Linked => FormatVersion::Linked,
            FormatArg::Positional => FormatVersion::Positional,
            FormatArg::Fixed => FormatVersion::FixedRecord,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum CodecArg {
    None,
    Zlib,
    Lzo,
}

impl From<CodecArg> for Codec {
    fn from(arg: CodecArg) -> Self {
        match arg {
            CodecArg::None => Codec::None,
            CodecArg::Zlib => Codec::Zlib,
            CodecArg::Lzo => Codec::Lzo,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Settings shared by every subcommand.
struct Env {
    cache_dir: Option<PathBuf>,
    collator: Arc<Collator>,
}

impl Env {
    fn new(cli: &Cli) -> Result<Self> {
        let collator = match &cli.collation {
            Some(path) => Arc::new(Collator::load_table(path)?),
            None => Collator::shared(),
        };
        Ok(Self {
            cache_dir: cli.cache_dir.clone(),
            collator,
        })
    }

    fn open(&self, path: &Path, strength: Strength) -> Result<Volume> {
        let mut options = OpenOptions::new()
            .strength(strength)
            .collator(self.collator.clone());
        if let Some(dir) = &self.cache_dir {
            options = options.cache_dir(dir);
        }
        Volume::open(path, options)
    }

    fn collection(&self, strength: Strength) -> Collection {
        Collection::new(CollectionOptions {
            strength,
            collator: self.collator.clone(),
            ..CollectionOptions::default()
        })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let env = Env::new(cli)?;
    match &cli.command {
        Command::Info { path } => info(&env, path),
        Command::Lookup {
            word,
            volumes,
            limit,
            strength,
        } => lookup(&env, word, volumes, *limit, (*strength).into()),
        Command::Article {
            path,
            word,
            no_redirects,
        } => article(&env, path, word, *no_redirects),
        Command::Verify { path } => verify(&env, path),
        Command::Compile {
            source,
            output,
            title,
            version,
            language,
            format,
            codec,
            files,
            short_depth,
        } => {
            let text = fs::read_to_string(source)?;
            let entries = compiler::parse_source(&text)?;
            let mut builder = VolumeBuilder::new(title, version)
                .language(language)
                .format((*format).into())
                .codec((*codec).into())
                .files(*files)
                .collator(env.collator.clone())
                .extend(entries);
            if let Some(depth) = short_depth {
                builder = builder.short_index_depth(*depth);
            }
            let report = builder.write(output)?;
            println!("Compiled {} entries into:", report.entries.len());
            for file in &report.files {
                println!("  {}", file.display());
            }
            Ok(())
        }
    }
}

fn info(env: &Env, path: &Path) -> Result<()> {
    let volume = env.open(path, Strength::Primary)?;
    let meta = volume.metadata();
    println!("Volume Information:");
    println!("  Title: {}", meta.title);
    println!("  Version: {}", meta.version);
    println!("  Language: {}", meta.language);
    println!("  Format: {}", volume.format());
    println!("  Entries: {}", volume.len());
    println!("  Files: {}", meta.file_count);
    println!("  Compression: {}", meta.compression.as_deref().unwrap_or("unknown"));
    println!("  Short index: {:?}", volume.short_index_origin());
    if let Some(desc) = &meta.description {
        println!("  Description: {}", desc);
    }
    if let Some(copyright) = &meta.copyright {
        println!("  Copyright: {}", copyright);
    }
    volume.close()
}

fn lookup(env: &Env, word: &str, paths: &[PathBuf], limit: usize, strength: Strength) -> Result<()> {
    let mut collection = env.collection(strength);
    for path in paths {
        collection.add(env.open(path, strength)?);
    }
    let words = collection.lookup(word, limit)?;
    if words.is_empty() {
        println!("No matches for '{}'", word);
    }
    for found in words {
        let sources: Vec<&str> = found
            .entries
            .iter()
            .map(|handle| handle.volume.title.as_str())
            .collect();
        println!("{}  [{}]", found.word, sources.join(", "));
    }
    collection.close()
}

fn article(env: &Env, path: &Path, word: &str, no_redirects: bool) -> Result<()> {
    let volume = env.open(path, Strength::Primary)?;
    let entries = volume.lookup_exact(word)?;
    let Some(entry) = entries.first() else {
        println!("'{}' not found", word);
        return volume.close();
    };
    let handle = volume.handle(entry);
    let article = if no_redirects {
        let article = volume.read_article(&handle)?;
        volume.close()?;
        article
    } else {
        let mut collection = env.collection(Strength::Primary);
        collection.add(volume);
        let article = collection.resolve(&handle)?;
        collection.close()?;
        article
    };
    println!("{}", article.title);
    println!("{}", "=".repeat(60));
    println!("{}", article.text);
    let tags = clamped_tags(&article.text, &article.tags);
    if !tags.is_empty() {
        println!("{}", "-".repeat(60));
        for tag in &tags {
            println!("  {} [{}, {})", tag.name, tag.start, tag.end);
        }
    }
    Ok(())
}

fn verify(env: &Env, path: &Path) -> Result<()> {
    let volume = env.open(path, Strength::Primary)?;
    let mut last_percent = 0;
    for progress in volume.verify()? {
        let fraction = progress?;
        let percent = (fraction * 100.0) as u32;
        if percent >= last_percent + 10 || percent == 100 {
            eprintln!("  {:3}%", percent);
            last_percent = percent;
        }
    }
    println!("OK: {} records verified", volume.len());
    volume.close()
}
