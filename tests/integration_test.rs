use byteorder::{LittleEndian, WriteBytesExt};
use miwa::container::MiwaReader;
use miwa::encoder::{no_audio, EncoderOptions, FixedContentId, MiwaEncoder};
use miwa::stream::ContentReader;
use miwa::{AudioMetadata, BlockType, ContentAttributeId, MiwaDecoder, MiwaError};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom, Write};
use tempfile::NamedTempFile;
use uuid::Uuid;

fn jpeg(width: u16, height: u16, n: u32) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x0B, 0x08];
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&[0x01, 0x01, 0x11, 0x00]);
    out.extend_from_slice(&n.to_be_bytes());
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// A WAV file with a LIST chunk between `fmt ` and `data`, as written by
/// most editors.  `extended` uses the 18-byte format chunk.
fn wav_with_list(channels: u16, rate: u32, samples: &[u8], extended: bool) -> Vec<u8> {
    let mut fmt = Vec::new();
    fmt.write_u16::<LittleEndian>(1).unwrap();
    fmt.write_u16::<LittleEndian>(channels).unwrap();
    fmt.write_u32::<LittleEndian>(rate).unwrap();
    fmt.write_u32::<LittleEndian>(rate * channels as u32 * 2).unwrap();
    fmt.write_u16::<LittleEndian>(channels * 2).unwrap();
    fmt.write_u16::<LittleEndian>(16).unwrap();
    if extended {
        fmt.write_u16::<LittleEndian>(0).unwrap();
    }
    let list = b"INFOISFT\x04\0\0\0test";

    let mut body = Vec::new();
    body.extend_from_slice(b"WAVE");
    body.extend_from_slice(b"fmt ");
    body.write_u32::<LittleEndian>(fmt.len() as u32).unwrap();
    body.extend_from_slice(&fmt);
    body.extend_from_slice(b"LIST");
    body.write_u32::<LittleEndian>(list.len() as u32).unwrap();
    body.extend_from_slice(list);
    body.extend_from_slice(b"data");
    body.write_u32::<LittleEndian>(samples.len() as u32).unwrap();
    body.extend_from_slice(samples);

    let mut out = b"RIFF".to_vec();
    out.write_u32::<LittleEndian>(body.len() as u32).unwrap();
    out.extend_from_slice(&body);
    out
}

fn encoder(rate: u8) -> MiwaEncoder {
    MiwaEncoder::new(EncoderOptions {
        frame_rate:   rate,
        title:        Some("Integration".into()),
        timestamp_ms: Some(1_700_000_000_000),
        ..Default::default()
    })
    .unwrap()
    .with_content_ids(Box::new(FixedContentId(Uuid::from_u128(0xfeed))))
}

#[test]
fn test_file_round_trip() {
    let temp_file = NamedTempFile::new().unwrap();
    let frames: Vec<Vec<u8>> = (0..50).map(|i| jpeg(320, 240, i)).collect();

    let summary = {
        let file = File::create(temp_file.path()).unwrap();
        encoder(12).encode(file, &frames, no_audio()).unwrap()
    };
    assert_eq!(summary.global.duration_ms, 4167);

    let file = File::open(temp_file.path()).unwrap();
    assert_eq!(file.metadata().unwrap().len(), summary.bytes_written);
    let mut dec = MiwaDecoder::new(BufReader::new(file)).unwrap();
    let attrs = dec.attributes();
    assert_eq!(attrs.get(ContentAttributeId::FrameCount).unwrap().to_u32().unwrap(), 50);
    assert_eq!(attrs.get(ContentAttributeId::FrameWidth).unwrap().to_u16().unwrap(), 320);
    assert_eq!(attrs.get(ContentAttributeId::Title).unwrap().as_str().unwrap(), "Integration");
    assert_eq!(dec.global_metadata().content_id, Uuid::from_u128(0xfeed));
    assert!(dec.global_metadata().created_at().is_some());

    let tracks = dec.tracks().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(tracks.len(), 5);
    assert_eq!(tracks[4].frames.len(), 2);
    let decoded: Vec<Vec<u8>> = tracks.into_iter().flat_map(|t| t.frames).collect();
    assert_eq!(decoded, frames);
}

#[test]
fn test_audio_reconstitutes_as_wav() {
    let samples: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 256) as u8).collect();
    for extended in [false, true] {
        let mut source = NamedTempFile::new().unwrap();
        source.write_all(&wav_with_list(1, 2_000, &samples, extended)).unwrap();
        source.flush().unwrap();

        let frames: Vec<Vec<u8>> = (0..24).map(|i| jpeg(16, 16, i)).collect();
        let mut container = Vec::new();
        let summary = encoder(8)
            .encode(&mut container, &frames, [BufReader::new(File::open(source.path()).unwrap())])
            .unwrap();
        // 4000 bytes per second: 4000 + 4000 + 2000.
        assert_eq!(summary.global.audio_block_count, 3);

        let mut dec = MiwaDecoder::new(Cursor::new(container)).unwrap();
        let meta = dec.audio_metadata().unwrap().clone();
        assert_eq!(meta.extra_format.is_some(), extended);
        let audio: Vec<u8> = dec
            .tracks()
            .map(|t| t.unwrap().audio.unwrap_or_default())
            .flatten()
            .collect();
        assert_eq!(audio, samples);

        let mut wav = Vec::new();
        meta.write_wav_header(&mut wav).unwrap();
        wav.extend_from_slice(&audio);
        let mut r = ContentReader::new(Cursor::new(wav));
        let parsed = AudioMetadata::read_wav_header(&mut r).unwrap();
        assert_eq!(parsed.data_size as usize, samples.len());
        assert_eq!((parsed.channels, parsed.sample_rate), (1, 2_000));
        let mut rest = Vec::new();
        r.get_mut().read_to_end(&mut rest).unwrap();
        assert_eq!(rest, samples);
    }
}

#[test]
fn test_corrupt_block_type_keeps_earlier_tracks() {
    let temp_file = NamedTempFile::new().unwrap();
    let frames: Vec<Vec<u8>> = (0..32).map(|i| jpeg(8, 8, i)).collect();
    encoder(8)
        .encode(File::create(temp_file.path()).unwrap(), &frames, no_audio())
        .unwrap();

    // Locate the header of frame 16 and overwrite its type byte.
    let offset = {
        let mut r = MiwaReader::new(BufReader::new(File::open(temp_file.path()).unwrap()));
        let mut seen = 0;
        loop {
            let pos = r.position().unwrap();
            let h = r.next_block_header().unwrap().unwrap();
            if h.block_type == BlockType::Frame {
                if seen == 16 {
                    break pos;
                }
                seen += 1;
            }
            r.skip_block(&h).unwrap();
        }
    };
    {
        let mut f = std::fs::OpenOptions::new().write(true).open(temp_file.path()).unwrap();
        f.seek(SeekFrom::Start(offset + 3)).unwrap();
        f.write_all(&[0x07]).unwrap();
    }

    let mut dec = MiwaDecoder::new(BufReader::new(File::open(temp_file.path()).unwrap())).unwrap();
    let mut delivered = 0;
    let result = dec.decode(|track| {
        assert_eq!(track.frames.len(), 8);
        delivered += 1;
        true
    });
    assert!(matches!(result, Err(MiwaError::InvalidContent(_))));
    assert_eq!(delivered, 2);
}

#[test]
fn test_truncated_container() {
    let frames: Vec<Vec<u8>> = (0..10).map(|i| jpeg(8, 8, i)).collect();
    let mut container = Vec::new();
    encoder(8).encode(&mut container, &frames, no_audio()).unwrap();
    container.truncate(container.len() - 3);

    let mut dec = MiwaDecoder::new(Cursor::new(container)).unwrap();
    assert_eq!(dec.next_track().unwrap().unwrap().frames.len(), 8);
    assert!(matches!(dec.next_track(), Err(MiwaError::EndOfStream)));
}

#[test]
fn test_not_a_container() {
    let err = MiwaDecoder::new(Cursor::new(b"RIFF\0\0\0\0WAVE".to_vec())).err().unwrap();
    assert!(matches!(err, MiwaError::InvalidContent(_) | MiwaError::EndOfStream));
}
