use std::io::{ErrorKind, Read};

use tracing::debug;

use super::{FrameSource, RawFrame};
use crate::error::{PipelineError, Result};
use crate::probe::StreamDescriptor;

/// 从任意字节流中按固定帧长切出原始帧
pub struct ReaderFrameSource<R> {
    reader: Option<R>,
    descriptor: StreamDescriptor,
    frames_read: u64,
}

impl<R: Read + Send> ReaderFrameSource<R> {
    pub fn new(reader: R, descriptor: StreamDescriptor) -> Self {
        Self {
            reader: Some(reader),
            descriptor,
            frames_read: 0,
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

/// 尽量读满 `buffer`，返回实际读到的字节数；只有 0 表示对端已关闭
fn fill_buffer(reader: &mut impl Read, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

impl<R: Read + Send> FrameSource for ReaderFrameSource<R> {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let frame_len = self.descriptor.frame_len();
        if frame_len == 0 {
            return Err(PipelineError::Decode(format!(
                "zero-sized frame geometry {}x{}",
                self.descriptor.width, self.descriptor.height
            )));
        }

        let mut buffer = vec![0u8; frame_len];
        let filled = fill_buffer(reader, &mut buffer)
            .map_err(|err| PipelineError::Decode(err.to_string()))?;

        if filled < buffer.len() {
            if filled > 0 {
                debug!(
                    filled,
                    expected = buffer.len(),
                    frames_read = self.frames_read,
                    "truncated trailing frame, treating as end of stream"
                );
            }
            self.reader = None;
            return Ok(None);
        }

        self.frames_read += 1;
        RawFrame::new(buffer, &self.descriptor).map(Some)
    }

    fn shutdown(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}
