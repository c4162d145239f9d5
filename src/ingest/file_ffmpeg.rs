//! FFmpeg-backed local video decoding and MPEG-4 encoding.
//!
//! Decoded frames are converted to packed RGB24 in memory. Encoded output keeps the
//! dimensions and rate reported by the source.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use std::path::{Path, PathBuf};

use super::file::FileConfig;
use crate::frame::{Frame, StreamInfo};

pub(crate) struct FfmpegFileSource {
    config: FileConfig,
    decoding: Option<Decoding>,
    frame_count: u64,
}

struct Decoding {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    eof_sent: bool,
}

impl FfmpegFileSource {
    pub(crate) fn new(config: FileConfig) -> Self {
        Self {
            config,
            decoding: None,
            frame_count: 0,
        }
    }

    pub(crate) fn path(&self) -> &str {
        &self.config.path
    }

    pub(crate) fn frames_read(&self) -> u64 {
        self.frame_count
    }

    pub(crate) fn open(&mut self) -> Result<StreamInfo> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&self.config.path)
            .with_context(|| format!("failed to open file input '{}' with ffmpeg", self.config.path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let rate = input_stream.avg_frame_rate();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        let frame_rate = if rate.numerator() > 0 && rate.denominator() > 0 {
            f64::from(rate)
        } else {
            log::warn!(
                "FileSource: {} has no frame rate, assuming {}",
                self.config.path,
                self.config.fallback_fps
            );
            self.config.fallback_fps
        };
        let info = StreamInfo::new(decoder.width(), decoder.height(), frame_rate);

        self.decoding = Some(Decoding {
            input,
            stream_index,
            decoder,
            scaler,
            eof_sent: false,
        });
        self.frame_count = 0;
        log::info!(
            "FileSource: opened {} ({}x{} @ {:.2} fps, ffmpeg)",
            self.config.path,
            info.width,
            info.height,
            info.frame_rate
        );
        Ok(info)
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let decoding = self
            .decoding
            .as_mut()
            .ok_or_else(|| anyhow!("file source {} is not open", self.config.path))?;

        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if decoding.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb_frame = ffmpeg::frame::Video::empty();
                decoding
                    .scaler
                    .run(&decoded, &mut rgb_frame)
                    .context("scale frame to RGB")?;
                let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
                let frame = Frame::from_rgb(pixels, width, height, self.frame_count)?;
                self.frame_count += 1;
                return Ok(Some(frame));
            }
            if decoding.eof_sent {
                return Ok(None);
            }

            let next = decoding
                .input
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));
            match next {
                Some((index, packet)) if index == decoding.stream_index => {
                    decoding
                        .decoder
                        .send_packet(&packet)
                        .context("send packet to ffmpeg decoder")?;
                }
                Some(_) => {}
                None => {
                    decoding
                        .decoder
                        .send_eof()
                        .context("flush ffmpeg decoder")?;
                    decoding.eof_sent = true;
                }
            }
        }
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        if self.decoding.take().is_some() {
            log::info!(
                "FileSource: closed {} after {} frames",
                self.config.path,
                self.frame_count
            );
        }
        Ok(())
    }
}

/// Writes frames to an MPEG-4 video at the source's rate.
pub(crate) struct FfmpegFileSink {
    path: PathBuf,
    encoding: Option<Encoding>,
}

struct Encoding {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::codec::encoder::video::Encoder,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    width: u32,
    height: u32,
    next_pts: i64,
}

impl FfmpegFileSink {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            encoding: None,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn open(&mut self, info: &StreamInfo) -> Result<()> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let mut output = ffmpeg::format::output(&self.path)
            .with_context(|| format!("failed to create video output {}", self.path.display()))?;
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
            .ok_or_else(|| anyhow!("ffmpeg build has no MPEG-4 encoder"))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let mut stream = output.add_stream(codec).context("add video stream")?;
        let stream_index = stream.index();
        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("create MPEG-4 encoder")?;

        let fps = frame_rate_rational(info.frame_rate);
        let time_base = fps.invert();
        encoder.set_width(info.width);
        encoder.set_height(info.height);
        encoder.set_format(ffmpeg::format::Pixel::YUV420P);
        encoder.set_time_base(time_base);
        encoder.set_frame_rate(Some(fps));
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder.open_as(codec).context("open MPEG-4 encoder")?;
        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);

        output
            .write_header()
            .with_context(|| format!("write header for {}", self.path.display()))?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|s| s.time_base())
            .unwrap_or(time_base);

        let scaler = ffmpeg::software::scaling::context::Context::get(
            ffmpeg::format::Pixel::RGB24,
            info.width,
            info.height,
            ffmpeg::format::Pixel::YUV420P,
            info.width,
            info.height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        self.encoding = Some(Encoding {
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base: time_base,
            stream_time_base,
            width: info.width,
            height: info.height,
            next_pts: 0,
        });
        log::info!(
            "FileSink: writing {}x{} @ {}/{} fps to {}",
            info.width,
            info.height,
            fps.numerator(),
            fps.denominator(),
            self.path.display()
        );
        Ok(())
    }

    pub(crate) fn write(&mut self, frame: &Frame) -> Result<()> {
        let encoding = self
            .encoding
            .as_mut()
            .ok_or_else(|| anyhow!("video sink {} is not open", self.path.display()))?;
        if frame.width() != encoding.width || frame.height() != encoding.height {
            return Err(anyhow!(
                "frame size {}x{} does not match video {}x{}",
                frame.width(),
                frame.height(),
                encoding.width,
                encoding.height
            ));
        }

        let mut rgb = ffmpeg::frame::Video::new(
            ffmpeg::format::Pixel::RGB24,
            encoding.width,
            encoding.height,
        );
        pixels_to_frame(frame.pixels(), encoding.width, &mut rgb)?;
        let mut yuv = ffmpeg::frame::Video::empty();
        encoding
            .scaler
            .run(&rgb, &mut yuv)
            .context("convert frame to YUV")?;
        yuv.set_pts(Some(encoding.next_pts));
        encoding.next_pts += 1;

        encoding
            .encoder
            .send_frame(&yuv)
            .context("send frame to encoder")?;
        encoding.drain_packets()
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        let Some(mut encoding) = self.encoding.take() else {
            return Ok(());
        };
        encoding.encoder.send_eof().context("flush encoder")?;
        encoding.drain_packets()?;
        encoding
            .output
            .write_trailer()
            .with_context(|| format!("finalize {}", self.path.display()))?;
        log::info!(
            "FileSink: closed {} after {} frames",
            self.path.display(),
            encoding.next_pts
        );
        Ok(())
    }
}

/// Exact rational for common rates (25, 12.5, 30000/1001); falls back to
/// ffmpeg's approximation otherwise.
fn frame_rate_rational(fps: f64) -> ffmpeg::Rational {
    if !fps.is_finite() || fps <= 0.0 {
        return ffmpeg::Rational::new(1, 1);
    }
    for den in [1, 1001, 100, 1000] {
        let num = (fps * den as f64).round();
        if num >= 1.0 && num <= i32::MAX as f64 && (num / den as f64 - fps).abs() < 1e-6 {
            return ffmpeg::Rational::new(num as i32, den).reduce();
        }
    }
    ffmpeg::Rational::from(fps)
}

impl Encoding {
    fn drain_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .context("write encoded packet")?;
        }
        Ok(())
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data
            .get(..len)
            .context("ffmpeg frame is shorter than expected")?;
        return Ok((pixels.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}

fn pixels_to_frame(pixels: &[u8], width: u32, frame: &mut ffmpeg::frame::Video) -> Result<()> {
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data_mut(0);
    for (row, src) in pixels.chunks_exact(row_bytes).enumerate() {
        let start = row * stride;
        data.get_mut(start..start + row_bytes)
            .context("ffmpeg frame row is out of bounds")?
            .copy_from_slice(src);
    }
    Ok(())
}
