use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use hashchain::core::chain::{Chain, Validation};
use hashchain::core::params::*;
use hashchain::storage::{BlockStore, JsonFileStore, SledStore, StorageError};
use hashchain::Block;

#[derive(Parser)]
#[command(name = "hashchain", version)]
#[command(about = "Hashchain - an append-only, tamper-evident block ledger")]
struct Cli {
    /// Directory holding the chain store
    #[arg(long, global = true, env = "HASHCHAIN_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,
    /// Storage backend
    #[arg(long, global = true, env = "HASHCHAIN_BACKEND", value_enum, default_value_t = Backend::Json)]
    backend: Backend,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Append a block carrying DATA
    Add { data: String },
    /// Print every block in order
    List {
        /// Print the blocks as a JSON array
        #[arg(long)]
        json: bool,
    },
    /// Re-read the store and verify every hash and link
    Validate,
    /// Discard all blocks and start over from a fresh genesis block
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show chain summary
    Info,
    /// Interactive menu (default)
    Shell,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Single JSON file
    Json,
    /// Embedded sled database
    Sled,
}

type DynChain = Chain<Box<dyn BlockStore>>;

fn open_store(backend: Backend, data_dir: &Path) -> Result<Box<dyn BlockStore>, StorageError> {
    std::fs::create_dir_all(data_dir)?;
    Ok(match backend {
        Backend::Json => Box::new(JsonFileStore::new(data_dir.join(STORE_FILE_NAME))),
        Backend::Sled => Box::new(SledStore::open(data_dir.join(SLED_DIR_NAME))?),
    })
}

fn open_chain(backend: Backend, data_dir: &Path) -> DynChain {
    let store = open_store(backend, data_dir).unwrap_or_else(|e| {
        eprintln!("❌ Cannot open store in {}: {}", data_dir.display(), e);
        std::process::exit(1);
    });
    Chain::open(store).unwrap_or_else(|e| { eprintln!("❌ {}", e); std::process::exit(1); })
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hashchain=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut chain = open_chain(cli.backend, &cli.data_dir);
    let stdin = io::stdin();
    let stdout = io::stdout();

    let code = match cli.command.unwrap_or(Commands::Shell) {
        Commands::Add { data } => match chain.append(data) {
            Ok(block) => {
                println!("✅ Block #{} added ({})", block.index(), block.hash());
                0
            }
            Err(e) => { eprintln!("❌ {}", e); 1 }
        },

        Commands::List { json } => {
            if json {
                report(print_json(&mut stdout.lock(), &chain))
            } else {
                report(display_chain(&mut stdout.lock(), &chain))
            }
        }

        Commands::Validate => match chain.validate() {
            Ok(result) => {
                let ok = report(print_validation(&mut stdout.lock(), &result));
                if result.is_valid() { ok } else { 2 }
            }
            Err(e) => { eprintln!("❌ {}", e); 1 }
        },

        Commands::Reset { yes } => {
            let confirmed = yes || confirm_or_report(&mut stdin.lock(), &mut stdout.lock(), RESET_PROMPT);
            match chain.reset(confirmed) {
                Ok(true) => { println!("🔄 Chain reset to genesis."); 0 }
                Ok(false) => { println!("Reset cancelled."); 0 }
                Err(e) => { eprintln!("❌ {}", e); 1 }
            }
        }

        Commands::Info => report(print_info(&mut stdout.lock(), &chain)),

        Commands::Shell => report(run_shell(&mut chain, &mut stdin.lock(), &mut stdout.lock())),
    };
    std::process::exit(code);
}

fn report(result: io::Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => { eprintln!("❌ {}", e); 1 }
    }
}

// ─── Console ────────────────────────────────────────────────────────

const RESET_PROMPT: &str = "Discard every block and start a new chain? [y/N]: ";

fn print_block<W: Write>(out: &mut W, block: &Block) -> io::Result<()> {
    writeln!(out, "\nBlock {}", block.index())?;
    writeln!(out, "Timestamp: {}", block.timestamp())?;
    writeln!(out, "Data: {}", block.data())?;
    writeln!(out, "Hash: {}", block.hash())?;
    writeln!(out, "Previous Hash: {}", block.previous_hash())
}

fn display_chain<S: BlockStore, W: Write>(out: &mut W, chain: &Chain<S>) -> io::Result<()> {
    for block in chain {
        print_block(out, block)?;
    }
    Ok(())
}

fn print_json<S: BlockStore, W: Write>(out: &mut W, chain: &Chain<S>) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, chain.blocks())?;
    writeln!(out)
}

fn print_info<S: BlockStore, W: Write>(out: &mut W, chain: &Chain<S>) -> io::Result<()> {
    writeln!(out, "📊 Hashchain")?;
    writeln!(out, "  Store:   {}", chain.store().location())?;
    writeln!(out, "  Blocks:  {}", chain.len())?;
    writeln!(out, "  Tip:     {}", chain.latest_block().hash())?;
    writeln!(out, "  Genesis: {}", chain.genesis().hash())
}

fn print_validation<W: Write>(out: &mut W, result: &Validation) -> io::Result<()> {
    match result {
        Validation::Valid { .. } => writeln!(out, "Blockchain is valid."),
        Validation::Invalid(violation) => {
            writeln!(out, "Blockchain is invalid!")?;
            writeln!(out, "  {}", violation)
        }
    }
}

/// Read one line. `None` at end of input.
fn read_line<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W, text: &str) -> io::Result<Option<String>> {
    write!(out, "{}", text)?;
    out.flush()?;
    read_line(input)
}

fn confirm<R: BufRead, W: Write>(input: &mut R, out: &mut W, text: &str) -> io::Result<bool> {
    let answer = prompt(input, out, text)?.unwrap_or_default();
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Ask before a destructive action. An unreadable answer is reported and
/// counts as "no".
fn confirm_or_report<R: BufRead, W: Write>(input: &mut R, out: &mut W, text: &str) -> bool {
    match confirm(input, out, text) {
        Ok(confirmed) => confirmed,
        Err(e) => {
            eprintln!("❌ Cannot read confirmation: {}", e);
            false
        }
    }
}

/// The numbered menu loop. Returns when the user exits or input ends.
fn run_shell<S: BlockStore, R: BufRead, W: Write>(
    chain: &mut Chain<S>,
    input: &mut R,
    out: &mut W,
) -> io::Result<()> {
    loop {
        writeln!(out, "\n===== Hashchain Menu =====")?;
        writeln!(out, "1. Add a new block")?;
        writeln!(out, "2. Display blockchain")?;
        writeln!(out, "3. Validate blockchain")?;
        writeln!(out, "4. Reset blockchain")?;
        writeln!(out, "5. Exit")?;
        let Some(choice) = prompt(input, out, "Enter your choice: ")? else { return Ok(()) };

        match choice.trim() {
            "1" => {
                let Some(data) = prompt(input, out, "Enter transaction data: ")? else { return Ok(()) };
                match chain.append(data) {
                    Ok(_) => writeln!(out, "Block added successfully.")?,
                    Err(e) => writeln!(out, "❌ {}", e)?,
                }
            }
            "2" => display_chain(out, chain)?,
            "3" => match chain.validate() {
                Ok(result) => print_validation(out, &result)?,
                Err(e) => writeln!(out, "❌ {}", e)?,
            },
            "4" => {
                let confirmed = confirm(input, out, RESET_PROMPT)?;
                match chain.reset(confirmed) {
                    Ok(true) => writeln!(out, "Blockchain reset to genesis.")?,
                    Ok(false) => writeln!(out, "Reset cancelled.")?,
                    Err(e) => writeln!(out, "❌ {}", e)?,
                }
            }
            "5" => return Ok(()),
            _ => writeln!(out, "Invalid choice. Try again.")?,
        }
    }
}
