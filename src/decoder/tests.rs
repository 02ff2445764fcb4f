use super::*;
use crate::attribute::ContentAttributeId;
use crate::block::{pack, BlockType};
use crate::container::MiwaWriter;
use crate::metadata::{CodecInfo, SimpleVersion};
use std::io::{Cursor, Seek, SeekFrom};
use uuid::Uuid;

fn global(frames: u32, audio_blocks: u32, rate: u8) -> GlobalMetadata {
    GlobalMetadata {
        content_id:        Uuid::from_bytes([0xAB; 16]),
        codec:             CodecInfo::miwa(),
        frame_count:       frames,
        audio_block_count: audio_blocks,
        duration_ms:       (frames as f64 / rate as f64 * 1000.0).round() as u64,
        title:             Some("clip".into()),
        copyright:         None,
        timestamp_ms:      1_700_000_000_000,
    }
}

/// Frame payload carrying its stream-wide number.
fn frame(i: usize) -> Vec<u8> {
    vec![0xFF, 0xD8, (i >> 8) as u8, i as u8]
}

fn frame_number(f: &[u8]) -> usize {
    ((f[2] as usize) << 8) | f[3] as usize
}

fn video_only(rate: u8, count: usize) -> MiwaWriter<Vec<u8>> {
    let mut w = MiwaWriter::new(Vec::new());
    w.write_global_metadata(&global(count as u32, 0, rate)).unwrap();
    w.write_frame_metadata(&FrameMetadata::jpeg(4, 4, 80, rate)).unwrap();
    for i in 0..count {
        w.write_frame(&frame(i)).unwrap();
    }
    w
}

fn open(bytes: Vec<u8>) -> MiwaDecoder<Cursor<Vec<u8>>> {
    MiwaDecoder::new(Cursor::new(bytes)).unwrap()
}

fn all_tracks(dec: &mut MiwaDecoder<Cursor<Vec<u8>>>) -> Vec<Track> {
    dec.tracks().collect::<Result<Vec<_>>>().unwrap()
}

#[test]
fn track_count_is_ceiling_of_frames_over_rate() {
    for &(count, rate) in &[(90usize, 30u8), (95, 30), (7, 8), (8, 8), (61, 60), (1, 60)] {
        let mut dec = open(video_only(rate, count).into_inner());
        let tracks = all_tracks(&mut dec);
        let r = rate as usize;
        assert_eq!(tracks.len(), count.div_ceil(r), "{count} frames @ {rate}");
        for t in &tracks[..tracks.len() - 1] {
            assert_eq!(t.frames.len(), r);
        }
        let last = if count % r == 0 { r } else { count % r };
        assert_eq!(tracks.last().unwrap().frames.len(), last);
        assert!(tracks.iter().all(|t| t.audio.is_none()));
    }
}

#[test]
fn empty_body_yields_no_tracks() {
    let mut dec = open(video_only(30, 0).into_inner());
    assert!(dec.next_track().unwrap().is_none());
    assert_eq!(dec.state(), DecoderState::Exhausted);
    assert!(matches!(dec.next_event().unwrap(), DecodeEvent::Done));
}

#[test]
fn frames_arrive_in_order_with_positions() {
    let mut dec = open(video_only(10, 25).into_inner());
    let tracks = all_tracks(&mut dec);
    let numbers: Vec<usize> = tracks.iter().flat_map(|t| t.frames.iter().map(|f| frame_number(f))).collect();
    assert_eq!(numbers, (0..25).collect::<Vec<_>>());
    assert_eq!(tracks.iter().map(|t| t.index).collect::<Vec<_>>(), [0, 1, 2]);
    assert_eq!(tracks.iter().map(|t| t.first_frame).collect::<Vec<_>>(), [0, 10, 20]);
}

#[test]
fn initialization_populates_attributes_and_rewinds() {
    let mut dec = open(video_only(30, 90).into_inner());
    let attrs = dec.attributes();
    assert_eq!(attrs.get(ContentAttributeId::FrameCount).unwrap().to_u32().unwrap(), 90);
    assert_eq!(attrs.get(ContentAttributeId::FrameRate).unwrap().to_u8().unwrap(), 30);
    assert_eq!(attrs.get(ContentAttributeId::Duration).unwrap().to_u64().unwrap(), 3000);
    assert_eq!(attrs.get(ContentAttributeId::Title).unwrap().as_str().unwrap(), "clip");
    assert!(attrs.get(ContentAttributeId::AudioSampleRate).is_none());

    // Streaming starts over from the first block and surfaces the metadata.
    assert!(matches!(dec.next_event().unwrap(), DecodeEvent::Metadata(Metadata::Global(_))));
    assert!(matches!(dec.next_event().unwrap(), DecodeEvent::Metadata(Metadata::Frame(_))));
    assert!(matches!(dec.next_event().unwrap(), DecodeEvent::Track(_)));
}

#[test]
fn pause_and_resume_lose_nothing() {
    let mut dec = open(video_only(8, 40).into_inner());
    let mut seen = Vec::new();

    let mut calls = 0;
    let done = dec
        .decode(|t| {
            calls += 1;
            seen.push(t.clone());
            calls < 2
        })
        .unwrap();
    assert!(!done);
    assert_eq!(dec.state(), DecoderState::Paused);
    assert_eq!(seen.len(), 2);

    let done = dec
        .decode(|t| {
            seen.push(t);
            true
        })
        .unwrap();
    assert!(done);
    assert_eq!(seen.len(), 5);
    let numbers: Vec<usize> = seen.iter().flat_map(|t| t.frames.iter().map(|f| frame_number(f))).collect();
    assert_eq!(numbers, (0..40).collect::<Vec<_>>());
    assert_eq!(dec.decode(|_| true).unwrap(), true);
}

#[test]
fn pausing_on_the_final_track_keeps_exhausted() {
    // 8 + 8 + 4: the short track is only emitted once the end is reached.
    let mut dec = open(video_only(8, 20).into_inner());
    let mut sizes = Vec::new();
    let done = dec
        .decode(|t| {
            sizes.push(t.frames.len());
            t.frames.len() == 8
        })
        .unwrap();
    assert!(!done);
    assert_eq!(sizes, [8, 8, 4]);
    assert_eq!(dec.state(), DecoderState::Exhausted);

    let mut extra = 0;
    assert!(dec.decode(|_| { extra += 1; true }).unwrap());
    assert_eq!(extra, 0);
}

#[test]
fn metadata_callback_sees_blocks_verbatim() {
    let mut dec = open(video_only(8, 8).into_inner());
    let mut kinds = Vec::new();
    dec.decode_with(|_| true, |m| kinds.push(m.block_type())).unwrap();
    assert_eq!(kinds, [BlockType::GlobalMetadata, BlockType::FrameMetadata]);
}

#[test]
fn audio_blocks_pair_with_their_tracks() {
    let audio = AudioMetadata::pcm(1, 8, 8, 16);
    let mut w = MiwaWriter::new(Vec::new());
    w.write_global_metadata(&global(16, 2, 8)).unwrap();
    w.write_frame_metadata(&FrameMetadata::jpeg(4, 4, 80, 8)).unwrap();
    w.write_audio_metadata(&audio).unwrap();
    for t in 0..2 {
        w.write_audio(&[t as u8; 8]).unwrap();
        for i in 0..8 {
            w.write_frame(&frame(t * 8 + i)).unwrap();
        }
    }

    let mut dec = open(w.into_inner());
    assert_eq!(dec.audio_metadata(), Some(&audio));
    assert_eq!(
        dec.attributes().get(ContentAttributeId::AudioSampleRate).unwrap().to_u32().unwrap(),
        8
    );
    let tracks = all_tracks(&mut dec);
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].audio.as_deref(), Some(&[0u8; 8][..]));
    assert_eq!(tracks[1].audio.as_deref(), Some(&[1u8; 8][..]));
}

#[test]
fn second_audio_block_flushes_the_partial_track() {
    let mut w = MiwaWriter::new(Vec::new());
    w.write_global_metadata(&global(3, 2, 8)).unwrap();
    w.write_frame_metadata(&FrameMetadata::jpeg(4, 4, 80, 8)).unwrap();
    w.write_audio_metadata(&AudioMetadata::pcm(1, 8, 8, 4)).unwrap();
    w.write_audio(&[1, 1]).unwrap();
    w.write_frame(&frame(0)).unwrap();
    w.write_audio(&[2, 2]).unwrap();
    w.write_frame(&frame(1)).unwrap();
    w.write_frame(&frame(2)).unwrap();

    let tracks = all_tracks(&mut open(w.into_inner()));
    assert_eq!(tracks.len(), 2);
    assert_eq!((tracks[0].frames.len(), tracks[0].audio.clone()), (1, Some(vec![1, 1])));
    assert_eq!((tracks[1].frames.len(), tracks[1].audio.clone()), (2, Some(vec![2, 2])));
}

#[test]
fn trailing_audio_is_delivered_without_frames() {
    let mut w = MiwaWriter::new(Vec::new());
    w.write_global_metadata(&global(0, 1, 8)).unwrap();
    w.write_frame_metadata(&FrameMetadata::jpeg(4, 4, 80, 8)).unwrap();
    w.write_audio_metadata(&AudioMetadata::pcm(1, 8, 8, 2)).unwrap();
    w.write_audio(&[5, 5]).unwrap();
    let tracks = all_tracks(&mut open(w.into_inner()));
    assert_eq!(tracks.len(), 1);
    assert!(tracks[0].frames.is_empty());
    assert_eq!(tracks[0].audio, Some(vec![5, 5]));
}

#[test]
fn frame_rate_update_resizes_the_track_buffer() {
    let mut w = video_only(10, 10);
    w.write_frame_metadata(&FrameMetadata::jpeg(4, 4, 80, 8)).unwrap();
    for i in 10..26 {
        w.write_frame(&frame(i)).unwrap();
    }
    let mut dec = open(w.into_inner());
    let tracks = all_tracks(&mut dec);
    assert_eq!(tracks.iter().map(|t| t.frames.len()).collect::<Vec<_>>(), [10, 8, 8]);
    assert_eq!(dec.frame_metadata().frame_rate, 8);
    assert_eq!(dec.attributes().get(ContentAttributeId::FrameRate).unwrap().to_u8().unwrap(), 8);
}

#[test]
fn frame_rate_decrease_never_overfills_a_track() {
    let mut w = video_only(20, 12);
    w.write_frame_metadata(&FrameMetadata::jpeg(4, 4, 80, 8)).unwrap();
    for i in 12..16 {
        w.write_frame(&frame(i)).unwrap();
    }
    let mut dec = open(w.into_inner());
    let tracks = all_tracks(&mut dec);
    assert_eq!(tracks.iter().map(|t| t.frames.len()).collect::<Vec<_>>(), [8, 8]);
    assert_eq!(tracks.iter().map(|t| t.first_frame).collect::<Vec<_>>(), [0, 8]);
    let numbers: Vec<usize> = tracks.iter().flat_map(|t| t.frames.iter().map(|f| frame_number(f))).collect();
    assert_eq!(numbers, (0..16).collect::<Vec<_>>());

    // Twelve buffered frames with nothing after the update: two tracks at the end.
    let mut w = video_only(20, 12);
    w.write_frame_metadata(&FrameMetadata::jpeg(4, 4, 80, 8)).unwrap();
    let mut dec = open(w.into_inner());
    let sizes: Vec<usize> = all_tracks(&mut dec).iter().map(|t| t.frames.len()).collect();
    assert_eq!(sizes, [8, 4]);
    assert_eq!(dec.state(), DecoderState::Exhausted);
}

#[test]
fn unknown_block_type_fails_after_earlier_tracks() {
    let mut bytes = video_only(8, 16).into_inner();
    bytes.extend_from_slice(&pack(0x07, 2).unwrap().to_be_bytes());
    bytes.extend_from_slice(&[0, 0]);
    bytes.extend_from_slice(&{
        let mut w = MiwaWriter::new(Vec::new());
        w.write_frame(&frame(99)).unwrap();
        w.into_inner()
    });

    let mut dec = open(bytes);
    let mut delivered = Vec::new();
    let err = dec.decode(|t| {
        delivered.push(t);
        true
    });
    assert!(matches!(err, Err(MiwaError::InvalidContent(_))));
    assert_eq!(delivered.len(), 2);
    assert!(delivered.iter().all(|t| t.frames.len() == 8));
    assert_eq!(dec.state(), DecoderState::Failed);
    assert!(dec.next_track().is_err());
}

#[test]
fn data_block_before_metadata_is_rejected() {
    let mut w = MiwaWriter::new(Vec::new());
    w.write_frame(&frame(0)).unwrap();
    let err = MiwaDecoder::new(Cursor::new(w.into_inner())).err().unwrap();
    assert!(matches!(err, MiwaError::InvalidContent(_)));
}

#[test]
fn missing_or_unsupported_header_is_rejected() {
    let mut w = MiwaWriter::new(Vec::new());
    w.write_frame_metadata(&FrameMetadata::jpeg(4, 4, 80, 8)).unwrap();
    assert!(matches!(
        MiwaDecoder::new(Cursor::new(w.into_inner())).err().unwrap(),
        MiwaError::InvalidContent(_)
    ));

    let mut g = global(0, 0, 8);
    g.codec = CodecInfo::new("MIWA", SimpleVersion::new(9, 0));
    let mut w = MiwaWriter::new(Vec::new());
    w.write_global_metadata(&g).unwrap();
    w.write_frame_metadata(&FrameMetadata::jpeg(4, 4, 80, 8)).unwrap();
    assert!(matches!(
        MiwaDecoder::new(Cursor::new(w.into_inner())).err().unwrap(),
        MiwaError::InvalidContent(_)
    ));

    let mut w = MiwaWriter::new(Vec::new());
    w.write_global_metadata(&global(0, 0, 8)).unwrap();
    w.write_frame_metadata(&FrameMetadata::jpeg(4, 4, 80, 0)).unwrap();
    assert!(MiwaDecoder::new(Cursor::new(w.into_inner())).is_err());
}

#[test]
fn truncated_frame_is_end_of_stream() {
    let mut bytes = video_only(8, 3).into_inner();
    bytes.truncate(bytes.len() - 1);
    let mut dec = open(bytes);
    assert!(matches!(dec.next_track(), Err(MiwaError::EndOfStream)));
}

#[test]
fn decoding_starts_from_the_initial_position() {
    let mut bytes = b"junk".to_vec();
    bytes.extend_from_slice(&video_only(8, 8).into_inner());
    let mut cursor = Cursor::new(bytes);
    cursor.seek(SeekFrom::Start(4)).unwrap();

    let mut dec = MiwaDecoder::new(cursor).unwrap();
    assert_eq!(all_tracks(&mut dec).len(), 1);
    dec.rewind().unwrap();
    assert_eq!(all_tracks(&mut dec).len(), 1);
}

#[test]
fn closed_decoder_is_disposed() {
    let mut dec = open(video_only(8, 8).into_inner());
    assert!(dec.close().is_some());
    assert!(matches!(dec.next_track(), Err(MiwaError::Disposed)));
    assert!(matches!(dec.rewind(), Err(MiwaError::Disposed)));
    assert!(dec.close().is_none());
}
