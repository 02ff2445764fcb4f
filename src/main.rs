use clap::{Parser, Subcommand};
use miwa::container::MiwaReader;
use miwa::decoder::{DecodeEvent, MiwaDecoder};
use miwa::encoder::{EncoderOptions, MiwaEncoder, DEFAULT_FRAME_RATE, DEFAULT_QUALITY};
use miwa::metadata::{AudioMetadata, FrameMetadata, GlobalMetadata, Metadata};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "miwa", about = "MIWA (Motion Imaging With Audio) container CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a directory of JPEG frames and optional WAV audio into a container
    Pack {
        #[arg(short, long)]
        output: PathBuf,
        /// Directory holding *.jpg / *.jpeg frames, taken in lexical order
        #[arg(short, long)]
        frames: PathBuf,
        /// WAV sources, played back to back
        #[arg(short, long)]
        audio: Vec<PathBuf>,
        /// Frames per second (8-60)
        #[arg(short, long, default_value_t = DEFAULT_FRAME_RATE)]
        rate: u8,
        /// JPEG quality for resized frames (0-100)
        #[arg(short, long, default_value_t = DEFAULT_QUALITY)]
        quality: u8,
        /// Frame width; detected from the first frame when omitted
        #[arg(long)]
        width: Option<u16>,
        /// Frame height; detected from the first frame when omitted
        #[arg(long)]
        height: Option<u16>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        copyright: Option<String>,
        /// In-memory staging limit in MiB before spilling to a temp file
        #[arg(long, default_value = "16")]
        staging_mib: usize,
    },
    /// Show container metadata
    Info {
        input: PathBuf,
        /// Print the metadata records as JSON
        #[arg(long)]
        json: bool,
    },
    /// List every block with a hex preview of its payload
    Blocks {
        input: PathBuf,
        /// Payload bytes to preview per block
        #[arg(long, default_value = "16")]
        preview: usize,
    },
    /// Extract frames as JPEG files and each audio source as a WAV file
    Unpack {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
}

fn main() -> CliResult<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .try_init();

    match Cli::parse().command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack {
            output, frames, audio, rate, quality, width, height, title, copyright, staging_mib,
        } => {
            let paths = frame_paths(&frames)?;
            let frame_data = paths.iter().map(fs::read).collect::<Result<Vec<_>, _>>()?;
            let sources = audio
                .iter()
                .map(|p| File::open(p).map(BufReader::new))
                .collect::<Result<Vec<_>, _>>()?;

            let opts = EncoderOptions {
                width,
                height,
                quality,
                frame_rate: rate,
                title,
                copyright,
                staging_memory_limit: staging_mib * 1024 * 1024,
                ..Default::default()
            };
            let mut enc = MiwaEncoder::new(opts)?;

            // The output only appears once the whole container is written.
            let dir = output.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let mut tmp = NamedTempFile::new_in(dir)?;
            let summary = enc.encode(BufWriter::new(tmp.as_file_mut()), &frame_data, sources)?;
            tmp.persist(&output)?;

            println!("  frames  {} ({}x{} @ {} fps)",
                summary.global.frame_count, summary.frame.width, summary.frame.height, summary.frame.frame_rate);
            if summary.resized_frames > 0 {
                println!("  resized {}", summary.resized_frames);
            }
            println!("  audio   {} block(s) from {} source(s)",
                summary.global.audio_block_count, summary.audio_sources);
            println!("Created: {} ({} B, {} ms)",
                output.display(), summary.bytes_written, summary.global.duration_ms);
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let dec = MiwaDecoder::new(BufReader::new(File::open(&input)?))?;
            if json {
                let report = InfoReport {
                    global:     dec.global_metadata(),
                    frame:      dec.frame_metadata(),
                    audio:      dec.audio_metadata(),
                    created_at: dec.global_metadata().created_at().map(|t| t.to_rfc3339()),
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            let global = dec.global_metadata();
            println!("── MIWA Container ───────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Content id     {}", global.content_id);
            println!("  Codec          {}", global.codec);
            if let Some(t) = global.created_at() {
                println!("  Created        {}", t.to_rfc3339());
            }
            println!("  Attributes:");
            for (id, value) in dec.attributes().iter() {
                let shown = value.map(|v| v.to_string()).unwrap_or_else(|| "—".into());
                println!("    {:<18} {}", id.name(), shown);
            }
        }

        // ── Blocks ───────────────────────────────────────────────────────────
        Commands::Blocks { input, preview } => {
            let mut reader = MiwaReader::new(BufReader::new(File::open(&input)?));
            println!("{:>10}  {:<16} {:>9}  Preview", "Offset", "Type", "Size");
            let mut count = 0u64;
            loop {
                let offset = reader.position()?;
                let Some(header) = reader.next_block_header()? else { break };
                let payload = reader.read_block(&header)?;
                let shown = &payload[..payload.len().min(preview)];
                let ellipsis = if payload.len() > shown.len() { "…" } else { "" };
                println!("{:>10}  {:<16} {:>9}  {}{}",
                    offset, header.block_type.name(), header.size, hex::encode(shown), ellipsis);
                count += 1;
            }
            println!("{count} block(s)");
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, output_dir } => {
            fs::create_dir_all(&output_dir)?;
            let mut dec = MiwaDecoder::new(BufReader::new(File::open(&input)?))?;
            let mut wav: Option<WavSink> = None;
            let mut sources = 0u32;
            let mut frames = 0u64;
            loop {
                match dec.next_event()? {
                    DecodeEvent::Metadata(Metadata::Audio(meta)) => {
                        if let Some(w) = wav.take() {
                            w.finish()?;
                        }
                        let path = output_dir.join(format!("audio_{sources:02}.wav"));
                        wav = Some(WavSink::create(&path, meta)?);
                        sources += 1;
                    }
                    DecodeEvent::Metadata(_) => {}
                    DecodeEvent::Track(track) => {
                        for frame in &track.frames {
                            fs::write(output_dir.join(format!("frame_{frames:06}.jpg")), frame)?;
                            frames += 1;
                        }
                        if let Some(samples) = &track.audio {
                            match wav.as_mut() {
                                Some(w) => w.append(samples)?,
                                None => tracing::warn!(track = track.index, "audio block without audio metadata; dropped"),
                            }
                        }
                    }
                    DecodeEvent::Done => break,
                }
            }
            if let Some(w) = wav.take() {
                w.finish()?;
            }
            println!("Unpacked {frames} frame(s) and {sources} audio source(s) to: {}", output_dir.display());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct InfoReport<'a> {
    global:     &'a GlobalMetadata,
    frame:      &'a FrameMetadata,
    audio:      Option<&'a AudioMetadata>,
    created_at: Option<String>,
}

fn frame_paths(dir: &Path) -> CliResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_jpeg = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
        if is_jpeg && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// A WAV file being reassembled from one source's audio blocks.  The header
/// is rewritten with the real data size on [`finish`](Self::finish).
struct WavSink {
    file:    BufWriter<File>,
    meta:    AudioMetadata,
    written: u64,
}

impl WavSink {
    fn create(path: &Path, meta: AudioMetadata) -> CliResult<Self> {
        let mut file = BufWriter::new(File::create(path)?);
        meta.write_wav_header(&mut file)?;
        Ok(Self { file, meta, written: 0 })
    }

    fn append(&mut self, samples: &[u8]) -> CliResult<()> {
        self.file.write_all(samples)?;
        self.written += samples.len() as u64;
        Ok(())
    }

    fn finish(mut self) -> CliResult<()> {
        let mut header = Vec::new();
        self.meta.write_wav_header(&mut header)?;
        let data_size = u32::try_from(self.written)?;
        self.meta.data_size = data_size;
        self.meta.chunk_size = (header.len() as u32 - 8) + data_size;
        self.file.seek(SeekFrom::Start(0))?;
        self.meta.write_wav_header(&mut self.file)?;
        self.file.flush()?;
        Ok(())
    }
}
