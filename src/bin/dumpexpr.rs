//! Command line front end: inspect minidumps and evaluate target expressions.

use bumpalo::Bump;
use clap::{Parser, Subcommand};
use dumpexpr::mc::{GcnSubtarget, McContext, DEFAULT_FOLD_DEPTH};
use dumpexpr::minidump::MinidumpFile;
use object::endian::LittleEndian as LE;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dumpexpr")]
#[command(about = "Minidump inspection and MC expression evaluation.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the header and the stream directory.
    Streams { file: PathBuf },
    /// Print every exception stream.
    Exceptions { file: PathBuf },
    /// Print the memory info regions.
    MemoryInfo { file: PathBuf },
    /// Print the module list.
    Modules { file: PathBuf },
    /// Print the thread list.
    Threads { file: PathBuf },
    /// Decode the string record at an offset.
    #[command(name = "string")]
    ReadString {
        file: PathBuf,
        /// File offset, decimal or 0x-prefixed hex.
        #[arg(value_parser = parse_offset)]
        offset: u64,
    },
    /// Evaluate and fold an expression.
    Eval {
        /// Processor whose tables the target operators use.
        #[arg(long, default_value = "gfx900")]
        cpu: String,
        /// Symbol definition `NAME=EXPR`; may be repeated.
        #[arg(long = "define", short = 'D')]
        defines: Vec<String>,
        /// Known-bits recursion budget for folding.
        #[arg(long, default_value_t = DEFAULT_FOLD_DEPTH)]
        depth: u32,
        expr: String,
    },
}

fn parse_offset(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid offset '{text}': {e}"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Streams { file } => {
            let bytes = fs::read(&file)?;
            let dump = MinidumpFile::create(&bytes)?;
            let header = dump.header();
            println!(
                "version {:#010x}, {} streams, directory at {:#x}",
                header.version.get(LE),
                header.number_of_streams.get(LE),
                header.stream_directory_rva.get(LE)
            );
            for (index, directory) in dump.streams().iter().enumerate() {
                println!(
                    "  [{index:3}] {:<24} rva {:#010x} size {}",
                    directory.stream_type().to_string(),
                    directory.location.rva.get(LE),
                    directory.location.data_size.get(LE)
                );
            }
        }
        Command::Exceptions { file } => {
            let bytes = fs::read(&file)?;
            let dump = MinidumpFile::create(&bytes)?;
            for exception in dump.get_exception_streams()? {
                let record = &exception.exception_record;
                let parameters: Vec<String> =
                    record.parameters().map(|p| format!("{p:#x}")).collect();
                println!(
                    "thread {:#x}: code {:#010x} at {:#x} [{}]",
                    exception.thread_id.get(LE),
                    record.exception_code.get(LE),
                    record.exception_address.get(LE),
                    parameters.join(", ")
                );
            }
        }
        Command::MemoryInfo { file } => {
            let bytes = fs::read(&file)?;
            let dump = MinidumpFile::create(&bytes)?;
            for info in dump.get_memory_info_list()? {
                println!(
                    "{:#018x} {:#12x} state {:#x} protect {:#x} type {:#x}",
                    info.base_address.get(LE),
                    info.region_size.get(LE),
                    info.state.get(LE),
                    info.protect.get(LE),
                    info.memory_type.get(LE)
                );
            }
        }
        Command::Modules { file } => {
            let bytes = fs::read(&file)?;
            let dump = MinidumpFile::create(&bytes)?;
            for module in dump.module_list()? {
                let name = dump.get_string(module.module_name_rva.get(LE).into())?;
                println!(
                    "{:#018x} {:#10x} {name}",
                    module.base_of_image.get(LE),
                    module.size_of_image.get(LE)
                );
            }
        }
        Command::Threads { file } => {
            let bytes = fs::read(&file)?;
            let dump = MinidumpFile::create(&bytes)?;
            for thread in dump.thread_list()? {
                println!(
                    "thread {:#x}: stack {:#018x} ({} bytes)",
                    thread.thread_id.get(LE),
                    thread.stack.start_of_memory_range.get(LE),
                    thread.stack.memory.data_size.get(LE)
                );
            }
        }
        Command::ReadString { file, offset } => {
            let bytes = fs::read(&file)?;
            let dump = MinidumpFile::create(&bytes)?;
            println!("{}", dump.get_string(offset)?);
        }
        Command::Eval {
            cpu,
            defines,
            depth,
            expr,
        } => {
            let subtarget = GcnSubtarget::from_cpu(&cpu).ok_or_else(|| {
                format!(
                    "unknown processor '{cpu}', expected one of: {}",
                    GcnSubtarget::KNOWN_CPUS.join(", ")
                )
            })?;
            let arena = Bump::new();
            let ctx = McContext::with_subtarget(&arena, subtarget);
            for define in &defines {
                ctx.parse_definition(define)?;
            }
            let expr = ctx.parse_expr(&expr)?;
            let folded = ctx.try_fold_with_depth(expr, depth);
            println!("expr:   {expr}");
            match ctx.evaluate_as_absolute(expr) {
                Some(value) => println!("value:  {value}"),
                None => println!("value:  <unresolved>"),
            }
            println!("folded: {folded}");
            log::debug!("{}", ctx.stats());
        }
    }
    Ok(())
}
