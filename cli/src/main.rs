//! word2neigh — create dictionary or neighborhood data from a corpus file
//! (raw or CoNLL-U-like format) and query the result interactively.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use word2neigh_core::lexicon::Lexicon;
use word2neigh_core::pipeline::{self, AnalyzeOptions};
use word2neigh_core::query::{Metric, QueryEngine, TOP_K};
use word2neigh_core::util::normalize;
use word2neigh_core::{ColumnSelect, Config, CorpusFormat, NeighborMatrix, SortOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    /// Plain text.
    Raw,
    /// CoNLL-U, LEMMA column.
    ConlluLemma,
    /// CoNLL-U, FORM column.
    ConlluForm,
    /// CoNLL-U, lemma packed with the surface form.
    FormLemma,
    /// CoNLL-U, semantic tag joined to the lemma.
    Sem,
}

impl From<FormatArg> for CorpusFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Raw => CorpusFormat::Raw,
            FormatArg::ConlluLemma => CorpusFormat::Conllu(ColumnSelect::LEMMA),
            FormatArg::ConlluForm => CorpusFormat::Conllu(ColumnSelect::FORM),
            FormatArg::FormLemma => CorpusFormat::Conllu(ColumnSelect::FormLemma),
            FormatArg::Sem => CorpusFormat::Conllu(ColumnSelect::Sem),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SortArg {
    /// Alphabetic.
    Alpha,
    /// TF·IDF descending.
    Tfidf,
}

/// Flags shared by the corpus-reading subcommands.
#[derive(Debug, clap::Args)]
struct CorpusArgs {
    /// Corpus file to analyze.
    #[arg(long, short = 'c', visible_alias = "crp")]
    corpus: PathBuf,

    /// Corpus format.
    #[arg(long, visible_alias = "crpf", value_enum, default_value = "raw")]
    corpus_format: FormatArg,

    /// Dictionary file (defaults to the corpus name with a .lex extension).
    #[arg(long, short = 'd')]
    dict: Option<PathBuf>,

    /// Stopword file (one word per line).
    #[arg(long, short = 's')]
    stopwords: Option<PathBuf>,

    /// Maximum number of documents to read.
    #[arg(long)]
    maxdocs: Option<u64>,

    /// Character-class filter mask (1 = digits, 2 = punctuation).
    #[arg(long)]
    filter: Option<u32>,

    /// UPOS filter mask for CoNLL-U input.
    #[arg(long, visible_alias = "cf")]
    conllufilter: Option<u32>,

    /// Consider/generate bigrams.
    #[arg(long)]
    bigrams: bool,

    /// TOML profile supplying defaults for the flags above.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    name = "word2neigh",
    about = "A simple tool to create dictionary or context data from a corpus file \
             (raw or in CoNLL-U format) using TFxIDF",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a dictionary from a corpus.
    Dict {
        #[command(flatten)]
        corpus: CorpusArgs,

        /// Sort order for the exported dictionary.
        #[arg(long, value_enum)]
        sort: Option<SortArg>,

        /// Extra columns to store (1 = count, 2 = doccount, 4 = tfidf).
        #[arg(long)]
        emit: Option<u32>,
    },
    /// Build a neighborhood matrix from a dictionary and corpus.
    Neighbors {
        #[command(flatten)]
        corpus: CorpusArgs,

        /// Output file; a .txt extension selects the readable format
        /// (defaults to the corpus name with a .neighbors extension).
        #[arg(long, short = 'n')]
        neighbors: Option<PathBuf>,

        /// Window radius for co-occurrence counting.
        #[arg(long)]
        width: Option<usize>,

        /// Neighborhood size cap for text output.
        #[arg(long)]
        area: Option<usize>,

        /// Weight co-occurrences by proximity.
        #[arg(long)]
        weighted: bool,
    },
    /// Query a dictionary and binary neighborhood file interactively.
    Query {
        /// Corpus name the artifact names derive from.
        #[arg(long, short = 'c', visible_alias = "crp")]
        corpus: Option<PathBuf>,

        /// Dictionary file.
        #[arg(long, short = 'd')]
        dict: Option<PathBuf>,

        /// Binary neighborhood file.
        #[arg(long, short = 'n')]
        neighbors: Option<PathBuf>,

        /// Neighbors fetched per row.
        #[arg(long)]
        area: Option<usize>,

        /// TOML profile supplying defaults.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
    println!("Word2Neighborhood");

    match Cli::parse().command {
        Command::Dict { corpus, sort, emit } => {
            let config = load_config(corpus.config.as_deref())?;
            let sort = match sort {
                Some(SortArg::Alpha) => SortOrder::Alpha,
                Some(SortArg::Tfidf) => SortOrder::TfidfDesc,
                None => config.sort,
            };
            let emit = emit.unwrap_or(config.emit);
            create_dictionary(&corpus, &config, sort, emit)
        }
        Command::Neighbors {
            corpus,
            neighbors,
            width,
            area,
            weighted,
        } => {
            let mut config = load_config(corpus.config.as_deref())?;
            if let Some(w) = width {
                config.width = w;
            }
            if let Some(a) = area {
                config.area = a;
            }
            config.distance_weighted |= weighted;
            create_neighbors(&corpus, neighbors, &config)
        }
        Command::Query {
            corpus,
            dict,
            neighbors,
            area,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let dict = dict.unwrap_or_else(|| default_artifact(corpus.as_deref(), "lex"));
            let neighbors =
                neighbors.unwrap_or_else(|| default_artifact(corpus.as_deref(), "neighbors"));
            query_loop(&dict, &neighbors, area.unwrap_or(config.area))
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => Config::load_toml(p).with_context(|| format!("loading profile {}", p.display())),
        None => Ok(Config::default()),
    }
}

/// `<corpus>.<ext>`, or `<name>.txt` style fallback without a corpus.
fn default_artifact(corpus: Option<&Path>, ext: &str) -> PathBuf {
    match corpus {
        Some(c) => c.with_extension(ext),
        None => PathBuf::from(if ext == "lex" {
            "dictionary.txt"
        } else {
            "neighbors.txt"
        }),
    }
}

fn analyze_options(args: &CorpusArgs, config: &Config) -> AnalyzeOptions {
    AnalyzeOptions {
        format: args.corpus_format.into(),
        generating: false,
        bigrams: args.bigrams || config.bigrams,
        distance_weighted: config.distance_weighted,
        width: config.width,
        char_filter: args.filter.unwrap_or(config.filter),
        pos_filter: args.conllufilter.unwrap_or(config.conllu_filter),
        max_docs: args.maxdocs.or(config.max_docs),
    }
}

fn load_stopwords(args: &CorpusArgs, config: &Config) -> Result<Option<Lexicon>> {
    let path = args.stopwords.as_ref().or(config.stopwords.as_ref());
    match path {
        Some(p) => {
            println!("reading stopwords file ({})...", p.display());
            let stop = pipeline::load_stopwords(p)
                .with_context(|| format!("reading stopwords {}", p.display()))?;
            Ok(Some(stop))
        }
        None => Ok(None),
    }
}

fn create_dictionary(args: &CorpusArgs, config: &Config, sort: SortOrder, emit: u32) -> Result<()> {
    let dict = args
        .dict
        .clone()
        .unwrap_or_else(|| default_artifact(Some(&args.corpus), "lex"));
    let stopwords = load_stopwords(args, config)?;
    let opts = analyze_options(args, config);

    println!("opening {}...", args.corpus.display());
    println!("analyzing...");
    let exported =
        pipeline::build_dictionary(&args.corpus, &dict, stopwords.as_ref(), &opts, sort, emit)
            .context("can't read corpus file")?;
    println!("exporting dictionary file ({})...", dict.display());
    println!("Dictionary has {exported} elements (over cut limits)");
    Ok(())
}

fn create_neighbors(args: &CorpusArgs, neighbors: Option<PathBuf>, config: &Config) -> Result<()> {
    let dict = args
        .dict
        .clone()
        .unwrap_or_else(|| default_artifact(Some(&args.corpus), "lex"));
    let neighbors = neighbors.unwrap_or_else(|| default_artifact(Some(&args.corpus), "neighbors"));
    let stopwords = load_stopwords(args, config)?;
    let opts = analyze_options(args, config);

    println!("reading dictionary file ({})...", dict.display());
    println!("opening {}...", args.corpus.display());
    println!("analyzing...");
    let (lexicon, matrix) =
        pipeline::build_neighborhood(&args.corpus, &dict, stopwords.as_ref(), &opts)
            .context("can't read corpus file")?;

    println!("optimizing matrix for output...");
    println!("Writing neighborhoods...");
    let as_text = neighbors
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("txt"));
    if as_text {
        matrix.write_text(&neighbors, &lexicon, config.area)
    } else {
        matrix.write_binary(&neighbors)
    }
    .context("can't write output file")?;
    println!("done.");
    Ok(())
}

fn query_loop(dict_path: &Path, neighbors_path: &Path, area: usize) -> Result<()> {
    let mut dict = Lexicon::with_capacity(256 * 1024);
    println!("reading dictionary ({})...", dict_path.display());
    let entries = dict
        .import(dict_path)
        .context("can't read dictionary file")?;
    if entries == 0 {
        bail!("can't read dictionary file: {} is empty", dict_path.display());
    }

    println!(
        "reading neighborhood binary file ({})...",
        neighbors_path.display()
    );
    let matrix =
        NeighborMatrix::read_binary(neighbors_path).context("can't read neighborhood (binary) file")?;
    let engine = QueryEngine::new(&dict, &matrix, area);

    println!("Insert word(s) to get most similar elements (empty to quit):");
    let stdin = io::stdin();
    let mut out = io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        if let Some(rest) = line.strip_prefix("show ") {
            let words: Vec<String> = rest
                .split(' ')
                .map(normalize)
                .filter(|w| !w.is_empty())
                .collect();
            let refs: Vec<&str> = words.iter().map(String::as_str).collect();
            let result = engine.context(&refs);
            for missing in &result.missing {
                println!("word \"{missing}\" not in dictionary, sorry.");
            }
            for (i, (id, _)) in result.matches.iter().enumerate() {
                if i > 0 {
                    print!(", ");
                }
                print!("{}", dict.text(*id));
            }
            println!();
        } else {
            match engine.similar(&normalize(line), TOP_K, Metric::Share) {
                None => println!("word not in dictionary, sorry."),
                Some(best) => {
                    print!("Similar to: ");
                    for (i, (text, _)) in best.iter().enumerate() {
                        if i > 0 {
                            print!(", ");
                        }
                        print!("{text}");
                    }
                    println!();
                }
            }
        }
        out.flush()?;
    }
    Ok(())
}
