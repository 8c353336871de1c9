use clap::Parser;
use cortex_context::{ChunkSpan, chunk_spans, decode_document};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};

/// A CLI tool to chunk a document into overlapping windows and print them as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input document. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Window size in characters.
    #[arg(short, long, default_value_t = 800)]
    size: usize,

    /// Characters shared by adjacent windows.
    #[arg(short, long, default_value_t = 100)]
    overlap: usize,
}

#[derive(Serialize)]
struct ChunkOutput<'a> {
    sequence: usize,
    char_start: usize,
    char_end: usize,
    text: &'a str,
}

impl<'a> From<&'a ChunkSpan> for ChunkOutput<'a> {
    fn from(span: &'a ChunkSpan) -> Self {
        Self {
            sequence: span.sequence,
            char_start: span.char_range.start,
            char_end: span.char_range.end,
            text: &span.text,
        }
    }
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let raw = if let Some(input_path) = args.input {
        fs::read(input_path)?
    } else {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        buffer
    };
    let document = decode_document(&raw);

    let spans = chunk_spans(&document.text, args.size, args.overlap)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let output: Vec<ChunkOutput> = spans.iter().map(ChunkOutput::from).collect();
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
