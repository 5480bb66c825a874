use super::VideoReader;
use anyhow::{anyhow, Context, Result};
use ffmpeg_next::ffi;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::Video as VideoFrame;
use image::RgbImage;
use std::path::Path;

/// Video reader backed by FFmpeg via ffmpeg-next, using software decoding.
///
/// Seeking lands on the closest preceding keyframe; frames before the
/// requested index are decoded and discarded so the next `read_frame`
/// returns exactly the frame that was asked for.
pub struct FfmpegReader {
    input_ctx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::codec::decoder::Video,
    video_stream_index: usize,
    /// Lazily created on first frame (source format is only known then).
    scaler: Option<scaling::Context>,
    width: u32,
    height: u32,
    source_fps: f64,
    total_frames: usize,
    time_base: f64,
    start_pts: i64,
    /// Index the next decoded frame is assumed to have when it carries no timestamp.
    next_index: usize,
    /// Frames below this index are dropped after a seek.
    skip_until: Option<usize>,
    /// Persistent packet object to avoid allocations.
    reuse_packet: ffmpeg_next::codec::packet::Packet,
    /// Whether we've sent EOF to the decoder.
    eof_sent: bool,
}

// SAFETY: FfmpegReader is owned by exactly one pipeline worker at a time and is
// never shared; the raw pointers inside ffmpeg-next types do not cross threads
// concurrently.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new(path: &Path) -> Result<Self> {
        ffmpeg_next::init().context("Failed to initialize FFmpeg")?;

        if !path.exists() {
            return Err(anyhow!("Video file not found: {:?}", path));
        }

        let input_ctx = ffmpeg_next::format::input(&path).context("Failed to open video file")?;

        let video_stream = input_ctx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| anyhow!("No video stream found in {:?}", path))?;

        let video_stream_index = video_stream.index();

        let rational_fps = video_stream.avg_frame_rate();
        let source_fps = if rational_fps.denominator() > 0 {
            rational_fps.numerator() as f64 / rational_fps.denominator() as f64
        } else {
            0.0
        };

        let time_base = f64::from(video_stream.time_base());
        let start_pts = match video_stream.start_time() {
            ffi::AV_NOPTS_VALUE => 0,
            pts => pts,
        };

        let stream_frames = video_stream.frames().max(0) as usize;
        let duration_secs = input_ctx.duration().max(0) as f64 / ffi::AV_TIME_BASE as f64;
        let total_frames = if stream_frames == 0 {
            (duration_secs * source_fps).round() as usize
        } else {
            stream_frames
        };

        tracing::info!(
            "FfmpegReader: opened {:?}, duration={:.2}s, fps={:.2}, stream_frames={}, estimated_total={}",
            path,
            duration_secs,
            source_fps,
            stream_frames,
            total_frames
        );

        let decoder_ctx =
            ffmpeg_next::codec::context::Context::from_parameters(video_stream.parameters())
                .context("Failed to create decoder context")?;
        let decoder = decoder_ctx
            .decoder()
            .video()
            .context("Failed to open video decoder")?;

        let width = decoder.width();
        let height = decoder.height();
        tracing::debug!("FfmpegReader: software decoding ({}x{})", width, height);

        Ok(Self {
            input_ctx,
            decoder,
            video_stream_index,
            scaler: None,
            width,
            height,
            source_fps,
            total_frames,
            time_base,
            start_pts,
            next_index: 0,
            skip_until: None,
            reuse_packet: ffmpeg_next::codec::packet::Packet::empty(),
            eof_sent: false,
        })
    }

    /// Receive the next decoded frame into `target`.
    /// Returns `Ok(false)` once the stream is exhausted.
    fn decode_loop(&mut self, target: &mut VideoFrame) -> Result<bool> {
        loop {
            match self.decoder.receive_frame(target) {
                Ok(()) => return Ok(true),
                Err(ffmpeg_next::Error::Other { errno: ffi::EAGAIN }) => {
                    if self.eof_sent {
                        return Ok(false);
                    }
                }
                Err(ffmpeg_next::Error::Eof) => return Ok(false),
                Err(e) => return Err(anyhow!("Decoder error: {}", e)),
            }

            // Feed packets until we find a video packet or reach EOF
            let mut found_packet = false;
            while self.reuse_packet.read(&mut self.input_ctx).is_ok() {
                if self.reuse_packet.stream() == self.video_stream_index {
                    self.decoder
                        .send_packet(&self.reuse_packet)
                        .context("Failed to send packet to decoder")?;
                    found_packet = true;
                    break;
                }
            }

            if !found_packet {
                self.decoder
                    .send_eof()
                    .context("Failed to send EOF to decoder")?;
                self.eof_sent = true;
            }
        }
    }

    fn frame_index_of(&self, frame: &VideoFrame) -> usize {
        match frame.timestamp() {
            Some(pts) if self.time_base > 0.0 => {
                let secs = (pts - self.start_pts) as f64 * self.time_base;
                (secs * self.source_fps).round().max(0.0) as usize
            }
            _ => self.next_index,
        }
    }

    fn to_rgb_image(&mut self, frame: &VideoFrame) -> Result<RgbImage> {
        if self.scaler.is_none() {
            let scaler = scaling::Context::get(
                frame.format(),
                self.width,
                self.height,
                Pixel::RGB24,
                self.width,
                self.height,
                scaling::Flags::BILINEAR,
            )
            .context("Failed to create scaler")?;
            self.scaler = Some(scaler);
        }
        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| anyhow!("Scaler unavailable"))?;

        let mut rgb_frame = VideoFrame::empty();
        scaler
            .run(frame, &mut rgb_frame)
            .context("Scaler failed")?;

        // Rows are padded to `stride`; copy only the pixel bytes.
        let width = rgb_frame.width() as usize;
        let height = rgb_frame.height() as usize;
        let stride = rgb_frame.stride(0);
        let data = rgb_frame.data(0);
        let mut buffer = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            let offset = y * stride;
            buffer.extend_from_slice(&data[offset..offset + width * 3]);
        }

        RgbImage::from_raw(width as u32, height as u32, buffer)
            .ok_or_else(|| anyhow!("Failed to create RgbImage from decoded frame"))
    }
}

impl VideoReader for FfmpegReader {
    fn frame_count(&self) -> Result<usize> {
        Ok(self.total_frames)
    }

    fn source_fps(&self) -> Result<f64> {
        Ok(self.source_fps)
    }

    fn seek_to_frame(&mut self, frame_num: usize) -> Result<()> {
        if self.source_fps <= 0.0 {
            return Err(anyhow!("Cannot seek without a valid frame rate"));
        }
        let time_secs = frame_num as f64 / self.source_fps;
        let timestamp = (time_secs * ffi::AV_TIME_BASE as f64) as i64;
        self.input_ctx
            .seek(timestamp, ..timestamp)
            .context("Failed to seek")?;
        self.decoder.flush();
        self.eof_sent = false;
        self.next_index = frame_num;
        self.skip_until = Some(frame_num);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        loop {
            let mut raw = VideoFrame::empty();
            if !self.decode_loop(&mut raw)? {
                return Ok(None);
            }

            let index = self.frame_index_of(&raw);
            self.next_index = index + 1;
            if let Some(target) = self.skip_until {
                if index < target {
                    continue;
                }
                self.skip_until = None;
            }

            return self.to_rgb_image(&raw).map(Some);
        }
    }
}
