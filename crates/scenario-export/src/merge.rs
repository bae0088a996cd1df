use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use log::{error, info};
use scenario_proto::{RecordError, RecordReader};

use crate::pipeline::{RECORD_EXTENSION, discover_inputs, progress_bar};
use crate::writer::RecordFileWriter;

/// Options controlling record merges.
#[derive(Clone, Debug)]
pub struct MergeOptions {
    /// Directory holding the per-unit `.tfrecord` files.
    pub input_dir: PathBuf,
    /// Consolidated output file.
    pub output_file: PathBuf,
    /// Replace an existing output file when true.
    pub overwrite: bool,
    pub show_progress: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Files whose records were copied.
    pub files: usize,
    pub records: usize,
    /// Files that could not be read; none of their records were copied.
    pub skipped: Vec<PathBuf>,
}

/// Concatenate every record of every `*.tfrecord` in `input_dir`, in sorted
/// file-name order, into `output_file`.
///
/// Each source file is read completely before anything is copied, so a
/// corrupt or truncated file contributes no records. Such files are logged
/// and listed in [`MergeSummary::skipped`].
pub fn merge_records(opts: &MergeOptions) -> Result<MergeSummary> {
    if !opts.input_dir.is_dir() {
        bail!(
            "merge input directory '{}' does not exist",
            opts.input_dir.display()
        );
    }
    let sources: Vec<PathBuf> =
        discover_inputs(&opts.input_dir, &format!("*.{RECORD_EXTENSION}"))?
            .into_iter()
            .filter(|path| path != &opts.output_file)
            .collect();
    info!(
        "Found {} TFRecord files in {}",
        sources.len(),
        opts.input_dir.display()
    );

    let mut writer = RecordFileWriter::create(&opts.output_file, opts.overwrite)?;
    let mut summary = MergeSummary::default();
    let pb = progress_bar(sources.len() as u64, opts.show_progress);
    for source in sources {
        match read_all_records(&source) {
            Ok(records) => {
                for record in &records {
                    writer.write_record(record)?;
                }
                summary.files += 1;
                summary.records += records.len();
            }
            Err(err) => {
                error!("Error reading {}: {err}", source.display());
                summary.skipped.push(source);
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("records merged");
    writer.finish()?;

    info!(
        "Merged {} records from {} files into {}",
        summary.records,
        summary.files,
        opts.output_file.display()
    );
    Ok(summary)
}

/// Every record payload in `path`, in file order.
pub fn read_all_records(path: &Path) -> Result<Vec<Vec<u8>>, RecordError> {
    let file = File::open(path)?;
    RecordReader::new(BufReader::new(file)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenario_proto::RecordWriter;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_records(path: &Path, payloads: &[&[u8]]) {
        let mut writer = RecordWriter::new(File::create(path).unwrap());
        for p in payloads {
            writer.write_record(p).unwrap();
        }
        writer.finish().unwrap();
    }

    fn opts(dir: &Path, out: PathBuf) -> MergeOptions {
        MergeOptions {
            input_dir: dir.to_path_buf(),
            output_file: out,
            overwrite: false,
            show_progress: false,
        }
    }

    #[test]
    fn merges_in_file_name_order() {
        let dir = tempdir().unwrap();
        write_records(&dir.path().join("b.tfrecord"), &[b"b1", b"b2"]);
        write_records(&dir.path().join("a.tfrecord"), &[b"a1"]);
        write_records(&dir.path().join("c.tfrecord"), &[]);
        fs::write(dir.path().join("ignored.txt"), b"x").unwrap();

        let out = dir.path().join("merged").join("all.tfrecord");
        let summary = merge_records(&opts(dir.path(), out.clone())).unwrap();
        assert_eq!(summary.files, 3);
        assert_eq!(summary.records, 3);
        assert!(summary.skipped.is_empty());
        assert_eq!(
            read_all_records(&out).unwrap(),
            vec![b"a1".to_vec(), b"b1".to_vec(), b"b2".to_vec()]
        );
    }

    #[test]
    fn corrupt_file_is_skipped_entirely() {
        let dir = tempdir().unwrap();
        write_records(&dir.path().join("a.tfrecord"), &[b"good"]);
        let bad = dir.path().join("b.tfrecord");
        write_records(&bad, &[b"first", b"second"]);
        // Chop the tail so the second record is truncated.
        let bytes = fs::read(&bad).unwrap();
        File::create(&bad)
            .unwrap()
            .write_all(&bytes[..bytes.len() - 3])
            .unwrap();

        let out = dir.path().join("out.bin");
        let summary = merge_records(&opts(dir.path(), out.clone())).unwrap();
        assert_eq!(summary.skipped, vec![bad]);
        assert_eq!(read_all_records(&out).unwrap(), vec![b"good".to_vec()]);
    }

    #[test]
    fn output_inside_input_dir_is_not_re_read() {
        let dir = tempdir().unwrap();
        write_records(&dir.path().join("a.tfrecord"), &[b"a"]);
        let out = dir.path().join("z.tfrecord");
        write_records(&out, &[b"stale"]);

        let mut o = opts(dir.path(), out.clone());
        assert!(merge_records(&o).is_err());
        o.overwrite = true;
        let summary = merge_records(&o).unwrap();
        assert_eq!(summary.records, 1);
        assert_eq!(read_all_records(&out).unwrap(), vec![b"a".to_vec()]);
    }
}
