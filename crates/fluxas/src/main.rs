// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

//! assemble, inspect and replay light machine programs.
//!
//! - `fluxas build strip.fxa -o strip.fxi`
//! - `fluxas dump strip.fxi`
//! - `fluxas render strip.fxi --leds 8 --frames 4`

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use fluxvm_assembler::assemble;
use fluxvm_image::{bytecode_reader::image_to_text, words_from_le_bytes, words_to_le_bytes};
use fluxvm_runtime::{HostDriver, PixelSink};
use fluxvm_types::ProgramWord;

#[derive(Parser)]
#[command(name = "fluxas", about = "light machine assembler and tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// assemble a source file into a program image
    Build {
        source: PathBuf,
        /// output path, defaults to the source with extension "fxi"
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// print the header, the tables and a bytecode listing
    Dump { image: PathBuf },
    /// run the render loop offline and print every pixel
    Render {
        image: PathBuf,
        #[arg(long, default_value_t = 8)]
        leds: u16,
        #[arg(long, default_value_t = 4)]
        frames: u32,
        /// ticks advanced per frame
        #[arg(long, default_value_t = 50)]
        tick_step: u32,
        /// runtime memory size in StackWord cells
        #[arg(long, default_value_t = 4096)]
        memory: usize,
    },
}

struct PrintSink;

impl PixelSink for PrintSink {
    fn set_pixel(&mut self, machine_index: usize, led_index: u16, color: (u8, u8, u8)) {
        println!(
            "machine {} led {:3}: #{:02x}{:02x}{:02x}",
            machine_index, led_index, color.0, color.1, color.2
        );
    }
}

fn load_image_words(path: &Path) -> Result<Vec<ProgramWord>> {
    let file = fs::File::open(path)
        .with_context(|| format!("cannot open image \"{}\"", path.display()))?;
    // the image file is read-only for the whole run
    let mapped = unsafe { memmap2::Mmap::map(&file) }
        .with_context(|| format!("cannot map image \"{}\"", path.display()))?;
    words_from_le_bytes(&mapped)
        .ok_or_else(|| anyhow!("\"{}\" has an odd byte count", path.display()))
}

fn build(source: &Path, output: Option<PathBuf>) -> Result<()> {
    let text = fs::read_to_string(source)
        .with_context(|| format!("cannot read source \"{}\"", source.display()))?;
    let words = assemble(&text)?;

    let output = output.unwrap_or_else(|| source.with_extension("fxi"));
    fs::write(&output, words_to_le_bytes(&words))
        .with_context(|| format!("cannot write image \"{}\"", output.display()))?;
    info!("wrote {} words to \"{}\"", words.len(), output.display());
    Ok(())
}

fn dump(image: &Path) -> Result<()> {
    let words = load_image_words(image)?;
    print!("{}", image_to_text(&words)?);
    Ok(())
}

fn render(image: &Path, leds: u16, frames: u32, tick_step: u32, memory: usize) -> Result<()> {
    let words = load_image_words(image)?;
    let mut buffer = vec![0u32; memory];
    let mut driver = HostDriver::new(&words, &mut buffer)?;
    driver.init_all()?;

    let mut sink = PrintSink;
    for frame in 0..frames {
        println!("--- frame {} ---", frame);
        driver.render_frame(frame * tick_step, leds, &mut sink);
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Build { source, output } => build(&source, output),
        Command::Dump { image } => dump(&image),
        Command::Render {
            image,
            leds,
            frames,
            tick_step,
            memory,
        } => render(&image, leds, frames, tick_step, memory),
    }
}
