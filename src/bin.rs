use clap::{Parser, Subcommand};
use std::fmt::{Debug, Formatter};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use verse_core::annotation::{BlocklistFilter, ContentFilter, HeuristicAnnotator, NoFilter};
use verse_core::config::{FormFile, GenerationSettings};
use verse_core::corpus::CorpusSource;
use verse_core::corpus_store::SqliteCorpus;
use verse_core::form_config::FormSpec;
use verse_core::form_from_text::form_from_text;
use verse_core::generation::{ErrorPolicy, Generator};
use verse_core::poetic_forms::form_names;

/// verse: Command-line poem generation from a corpus of lines
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log search progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a corpus database from a text file with one line of verse per line
    Make {
        /// Path of the database to create
        corpus: PathBuf,

        /// Text file to read lines from
        lines: PathBuf,

        /// Replace the database if it already exists
        #[arg(long)]
        force: bool,

        /// File of words, one per line; lines containing any of them are left out
        #[arg(long)]
        blocklist: Option<PathBuf>,

        /// Description stored alongside the lines
        #[arg(long)]
        description: Option<String>,
    },

    /// Generate a poem from an existing corpus database
    Poem {
        /// Path of the corpus database
        corpus: PathBuf,

        /// Named form, e.g. "sonnet" or "villanelle"
        #[arg(short, long)]
        form: Option<String>,

        /// Rhyme string, e.g. "aabba"
        #[arg(short, long)]
        rhyme: Option<String>,

        /// Syllable constraint, e.g. "10" or "{1:8,2:8,0:6}"
        #[arg(short, long)]
        syllable: Option<String>,

        /// Regex constraint applied to every line, or a map keyed by line number
        #[arg(short = 'x', long)]
        regex: Option<String>,

        /// Indent string, one digit per line
        #[arg(short, long)]
        indent: Option<String>,

        /// Word whose letters start each line, in order
        #[arg(short, long)]
        acrostic: Option<String>,

        /// Form specification file, as TOML or JSON
        #[arg(long)]
        form_file: Option<PathBuf>,

        /// Take the form from the shape of an existing text
        #[arg(long)]
        from_text: Option<PathBuf>,

        /// Don't require a proper first and last line
        #[arg(long)]
        no_proper: bool,

        /// Seed the randomization, for repeatable output
        #[arg(long)]
        seed: Option<u64>,

        /// Time limit for searching a single rhyme group, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Generation settings file, as TOML or JSON
        #[arg(long)]
        settings: Option<PathBuf>,
    },

    /// List the named forms
    Forms,
}

struct Error(String);

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0) // Print error unquoted
    }
}

fn read_text(path: &PathBuf) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|_| Error(format!("Couldn't read file '{}'", path.display())))
}

fn main() -> Result<(), Error> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Make {
            corpus,
            lines,
            force,
            blocklist,
            description,
        } => {
            let filter: Box<dyn ContentFilter> = match blocklist {
                Some(path) => Box::new(BlocklistFilter::new(
                    read_text(&path)?.lines().map(str::trim).filter(|w| !w.is_empty()),
                )),
                None => Box::new(NoFilter),
            };
            let source = CorpusSource::File {
                path: lines.into_os_string(),
            };
            let description = description.as_deref();
            let made = if force {
                SqliteCorpus::make_new_forced(
                    &corpus,
                    &source,
                    &HeuristicAnnotator,
                    filter.as_ref(),
                    description,
                )
            } else {
                SqliteCorpus::make_new(
                    &corpus,
                    &source,
                    &HeuristicAnnotator,
                    filter.as_ref(),
                    description,
                )
            };
            made.and_then(SqliteCorpus::close)
                .map_err(|error| Error(format!("ERROR: {error}")))?;
        }

        Command::Poem {
            corpus,
            form,
            rhyme,
            syllable,
            regex,
            indent,
            acrostic,
            form_file,
            from_text,
            no_proper,
            seed,
            timeout_ms,
            settings,
        } => {
            // Form files and texts give a starting point, which the other options override.
            let mut spec = match (form_file, from_text) {
                (Some(_), Some(_)) => {
                    return Err(Error(
                        "Only one of --form-file and --from-text can be given".into(),
                    ))
                }
                (Some(path), None) => FormFile::from_path(&path)
                    .map_err(|error| Error(format!("ERROR: {error}")))?
                    .into_form_spec()
                    .map_err(|error| Error(error.console_message()))?,
                (None, Some(path)) => form_from_text(&read_text(&path)?, &HeuristicAnnotator)
                    .map_err(|error| Error(format!("ERROR: {error}")))?,
                (None, None) => FormSpec::default(),
            };
            spec.form = form.or(spec.form);
            spec.rhyme = rhyme.or(spec.rhyme);
            spec.syllable = syllable.or(spec.syllable);
            spec.regex = regex.or(spec.regex);
            spec.indent = indent.or(spec.indent);
            spec.acrostic = acrostic.or(spec.acrostic);
            if no_proper {
                spec.proper = false;
            }

            let mut settings = match settings {
                Some(path) => GenerationSettings::from_path(&path)
                    .map_err(|error| Error(format!("ERROR: {error}")))?,
                None => GenerationSettings::default(),
            };
            settings.seed = seed.or(settings.seed);
            if let Some(timeout_ms) = timeout_ms {
                settings.search_timeout = Duration::from_millis(timeout_ms);
            }

            let corpus = SqliteCorpus::open(&corpus).map_err(|error| Error(format!("ERROR: {error}")))?;
            let generator = Generator::with_settings(corpus, settings);
            if let Ok(Some(poem)) = generator.generate_with_policy(&spec, ErrorPolicy::PrintAndExit) {
                println!("{}", poem.join("\n"));
            }
        }

        Command::Forms => {
            for name in form_names() {
                println!("{name}");
            }
        }
    }

    Ok(())
}
