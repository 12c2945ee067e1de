use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use tabula::{read_tables, write_tables};
use tabula_calc::{ArithCompiler, IdentifierCounter};

#[derive(Parser)]
#[command(name = "tabula-calc")]
#[command(about = "Arithmetic compiler and identifier counter", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compiles a program and prints the value of every statement
    Eval {
        #[arg(short, long)]
        input: PathBuf,
        /// Tables written by the `tables` command; built-in tables otherwise
        #[arg(short, long)]
        tables: Option<PathBuf>,
        /// Largest error repair tried, in inserted plus deleted tokens
        #[arg(long)]
        max_cost: Option<usize>,
    },
    /// Counts, per identifier, the statements it occurs in
    Count {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Writes the arithmetic compiler's tables
    Tables {
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Commands::Eval {
            input,
            tables,
            max_cost,
        } => {
            let mut compiler = match tables {
                Some(path) => {
                    let file = File::open(&path).with_context(|| format!("cannot open {}", path.display()))?;
                    let (scanner, parser) = read_tables(&mut BufReader::new(file))
                        .with_context(|| format!("cannot read tables from {}", path.display()))?;
                    ArithCompiler::from_tables(scanner, parser)?
                }
                None => ArithCompiler::new()?,
            };
            if let Some(n) = max_cost {
                compiler = compiler.with_max_cost(n);
            }
            let compilation = compiler.compile_file(&input)?;
            for d in &compilation.diagnostics {
                eprintln!("{d}");
            }
            let errors = compilation.diagnostics.error_count();
            let output = compilation
                .into_output()
                .with_context(|| format!("compiling {}", input.display()))?;
            for value in &output {
                match value {
                    Some(n) => println!("{n}"),
                    None => println!("?"),
                }
            }
            if errors > 0 {
                bail!("{}: {errors} error(s)", input.display());
            }
        }
        Commands::Count { input } => {
            let counts = IdentifierCounter::new()?.count_file(&input)?;
            for d in &counts.diagnostics {
                eprintln!("{d}");
            }
            for (name, n) in &counts.counts {
                println!("{name}\t{n}");
            }
        }
        Commands::Tables { output } => {
            let compiler = ArithCompiler::new()?;
            let file = File::create(&output).with_context(|| format!("cannot create {}", output.display()))?;
            let mut w = BufWriter::new(file);
            write_tables(&mut w, compiler.scanner_table(), compiler.parser_table())?;
            w.flush()?;
            log::info!("tables written to {}", output.display());
        }
    }
    Ok(())
}
