//! Atomic TFRecord file output.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use prost::Message;
use scenario_proto::RecordWriter;

/// Writes records into `<final>.tmp` and renames over `final_path` on
/// [`finish`](Self::finish). Dropping an unfinished writer removes the temp file.
pub struct RecordFileWriter {
    writer: Option<RecordWriter<BufWriter<File>>>,
    tmp_path: PathBuf,
    final_path: PathBuf,
}

impl RecordFileWriter {
    /// Fails if `final_path` exists and `overwrite` is false.
    pub fn create(final_path: &Path, overwrite: bool) -> Result<Self> {
        if final_path.exists() && !overwrite {
            bail!("{} already exists (use --overwrite)", final_path.display());
        }
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let tmp_path = tmp_path_for(final_path);
        let file = File::create(&tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;
        Ok(Self {
            writer: Some(RecordWriter::new(BufWriter::new(file))),
            tmp_path,
            final_path: final_path.to_path_buf(),
        })
    }

    pub fn write_record(&mut self, payload: &[u8]) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            bail!("writer for {} already finished", self.final_path.display());
        };
        writer
            .write_record(payload)
            .with_context(|| format!("failed to write {}", self.tmp_path.display()))
    }

    pub fn write_message<M: Message>(&mut self, message: &M) -> Result<()> {
        self.write_record(&message.encode_to_vec())
    }

    /// Flush, move into place, and return the number of records written.
    pub fn finish(mut self) -> Result<usize> {
        let Some(writer) = self.writer.take() else {
            bail!("writer for {} already finished", self.final_path.display());
        };
        let records = writer.records_written();
        writer
            .finish()
            .with_context(|| format!("failed to flush {}", self.tmp_path.display()))?;
        fs::rename(&self.tmp_path, &self.final_path).with_context(|| {
            format!(
                "failed to rename {} -> {}",
                self.tmp_path.display(),
                self.final_path.display()
            )
        })?;
        Ok(records)
    }
}

impl Drop for RecordFileWriter {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenario_proto::RecordReader;
    use std::io::BufReader;
    use tempfile::tempdir;

    fn read_all(path: &Path) -> Vec<Vec<u8>> {
        let reader = RecordReader::new(BufReader::new(File::open(path).unwrap()));
        reader.collect::<Result<Vec<_>, _>>().unwrap()
    }

    #[test]
    fn output_appears_only_after_finish() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("nested/one.tfrecord");
        let mut writer = RecordFileWriter::create(&out, false).unwrap();
        writer.write_record(b"abc").unwrap();
        writer.write_record(b"").unwrap();
        assert!(!out.exists());
        assert!(dir.path().join("nested/one.tfrecord.tmp").exists());
        assert_eq!(writer.finish().unwrap(), 2);
        assert_eq!(read_all(&out), vec![b"abc".to_vec(), Vec::new()]);
        assert!(!dir.path().join("nested/one.tfrecord.tmp").exists());
    }

    #[test]
    fn dropped_writer_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("gone.tfrecord");
        {
            let mut writer = RecordFileWriter::create(&out, false).unwrap();
            writer.write_record(b"partial").unwrap();
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn existing_output_requires_overwrite() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("x.tfrecord");
        fs::write(&out, b"old").unwrap();
        let err = RecordFileWriter::create(&out, false).err().unwrap();
        assert!(err.to_string().contains("--overwrite"));

        let mut writer = RecordFileWriter::create(&out, true).unwrap();
        writer.write_record(b"new").unwrap();
        writer.finish().unwrap();
        assert_eq!(read_all(&out), vec![b"new".to_vec()]);
    }
}
