//! 保留帧的编码与落盘，以及输出目录的清理。

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{ImageOutputFormat, RgbImage};
use tracing::{debug, info, warn};

use crate::decoders::RawFrame;
use crate::error::{PipelineError, Result};
use crate::probe::StreamDescriptor;

/// 四位补零的文件名最多容纳的序号
pub const MAX_NAMED_ORDINALS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg { quality: u8 },
    Png,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg { .. } => "jpg",
            ImageFormat::Png => "png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg { .. } => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

impl Default for ImageFormat {
    fn default() -> Self {
        ImageFormat::Jpeg { quality: 90 }
    }
}

/// `frame0000.jpg` 形式的产物文件名
pub fn artifact_file_name(ordinal: u32, format: ImageFormat) -> String {
    format!("frame{ordinal:04}.{}", format.extension())
}

/// 已写入输出目录的一帧图像
#[derive(Debug, Clone)]
pub struct ImageArtifact {
    pub ordinal: u32,
    pub frame_index: u64,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl ImageArtifact {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactWriter {
    format: ImageFormat,
}

impl ArtifactWriter {
    pub fn new(format: ImageFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn encode(&self, ordinal: u32, frame: &RawFrame, descriptor: &StreamDescriptor) -> Result<Vec<u8>> {
        let encode_error = |message: String| PipelineError::Encode { ordinal, message };

        let image = RgbImage::from_raw(descriptor.width, descriptor.height, frame.as_bytes().to_vec())
            .ok_or_else(|| {
                encode_error(format!(
                    "{} bytes do not form a {}x{} rgb image",
                    frame.len(),
                    descriptor.width,
                    descriptor.height
                ))
            })?;

        let mut bytes = Vec::new();
        match self.format {
            ImageFormat::Jpeg { quality } => {
                JpegEncoder::new_with_quality(&mut bytes, quality)
                    .encode_image(&image)
                    .map_err(|err| encode_error(err.to_string()))?;
            }
            ImageFormat::Png => {
                image
                    .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
                    .map_err(|err| encode_error(err.to_string()))?;
            }
        }
        Ok(bytes)
    }

    pub fn write(
        &self,
        output_dir: &Path,
        ordinal: u32,
        frame_index: u64,
        frame: &RawFrame,
        descriptor: &StreamDescriptor,
    ) -> Result<ImageArtifact> {
        if ordinal == MAX_NAMED_ORDINALS {
            warn!(ordinal, "kept frame count exceeds four-digit naming, file names widen");
        }

        let bytes = self.encode(ordinal, frame, descriptor)?;
        let path = output_dir.join(artifact_file_name(ordinal, self.format));
        fs::write(&path, &bytes).map_err(|err| PipelineError::io(&path, err))?;
        debug!(ordinal, frame_index, path = %path.display(), size = bytes.len(), "wrote frame");

        Ok(ImageArtifact {
            ordinal,
            frame_index,
            path,
            bytes,
        })
    }
}

/// 清理过程中跳过或删除失败的条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeIssue {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct PurgeReport {
    pub created: bool,
    pub removed: usize,
    pub issues: Vec<PurgeIssue>,
}

/// 清空输出目录中的文件，不存在时创建。
///
/// 子目录不会被删除，删除失败的条目只记录不终止；只有目录本身无法创建或读取时才报错。
pub fn purge_output_directory(dir: &Path) -> Result<PurgeReport> {
    let mut report = PurgeReport::default();

    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|err| PipelineError::io(dir, err))?;
        info!(dir = %dir.display(), "created output directory");
        report.created = true;
        return Ok(report);
    }

    let entries = fs::read_dir(dir).map_err(|err| PipelineError::io(dir, err))?;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                report.issues.push(PurgeIssue {
                    path: dir.to_path_buf(),
                    reason: err.to_string(),
                });
                continue;
            }
        };
        let path = entry.path();

        let is_dir = entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false);
        if is_dir {
            warn!(path = %path.display(), "skipping subdirectory during purge");
            report.issues.push(PurgeIssue {
                path,
                reason: "not a file".to_string(),
            });
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => report.removed += 1,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to delete");
                report.issues.push(PurgeIssue {
                    path,
                    reason: err.to_string(),
                });
            }
        }
    }

    info!(dir = %dir.display(), removed = report.removed, skipped = report.issues.len(), "purged output directory");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::FrameRate;

    fn descriptor() -> StreamDescriptor {
        StreamDescriptor {
            width: 4,
            height: 4,
            frame_rate: FrameRate::new(30, 1),
        }
    }

    fn gradient() -> RawFrame {
        let data = (0..48u8).map(|v| v * 5).collect();
        RawFrame::new(data, &descriptor()).unwrap()
    }

    #[test]
    fn names_are_zero_padded() {
        assert_eq!(artifact_file_name(0, ImageFormat::default()), "frame0000.jpg");
        assert_eq!(artifact_file_name(42, ImageFormat::Png), "frame0042.png");
        assert_eq!(artifact_file_name(9999, ImageFormat::Png), "frame9999.png");
    }

    #[test]
    fn writes_decodable_png() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(ImageFormat::Png);
        let artifact = writer.write(dir.path(), 3, 90, &gradient(), &descriptor()).unwrap();

        assert_eq!(artifact.file_name(), "frame0003.png");
        assert_eq!(artifact.frame_index, 90);
        let decoded = image::open(&artifact.path).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (4, 4));
        assert_eq!(decoded.into_raw(), gradient().into_bytes());
    }

    #[test]
    fn writes_jpeg_with_magic_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::default();
        let artifact = writer.write(dir.path(), 0, 0, &gradient(), &descriptor()).unwrap();
        assert_eq!(&artifact.bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(fs::read(&artifact.path).unwrap(), artifact.bytes);
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        let result = ArtifactWriter::default().write(&missing, 0, 0, &gradient(), &descriptor());
        assert!(matches!(result, Err(PipelineError::Io { .. })));
    }

    #[test]
    fn purge_removes_files_and_skips_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("frame0000.jpg"), b"old").unwrap();
        fs::write(dir.path().join("notes.txt"), b"old").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let report = purge_output_directory(dir.path()).unwrap();
        assert!(!report.created);
        assert_eq!(report.removed, 2);
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].path.ends_with("nested"));
        assert!(dir.path().join("nested").is_dir());
        assert!(!dir.path().join("notes.txt").exists());
    }

    #[test]
    fn purge_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("frames");
        let report = purge_output_directory(&output).unwrap();
        assert!(report.created);
        assert!(output.is_dir());
    }

    #[test]
    fn purge_fails_when_directory_cannot_be_created() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        assert!(matches!(
            purge_output_directory(&blocker.join("frames")),
            Err(PipelineError::Io { .. })
        ));
    }
}
