use crate::error::{ErrorKind, StepError, StepResult};
use crate::orchestration::{ConversionStats, StepContext, StepExecutor, StepOutput};
use crate::state_machine::StepKind;
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use async_trait::async_trait;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Bytes inspected for NUL characters before parsing
const SNIFF_BYTES: usize = 8 * 1024;
/// Records used for schema inference
const SCHEMA_INFERENCE_RECORDS: usize = 1_000;
const BATCH_SIZE: usize = 8 * 1024;

/// Converts the downloaded CSV into a Snappy-compressed Parquet file.
///
/// Parsing is CPU bound, so it runs on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConvertExecutor;

impl ConvertExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StepExecutor for ConvertExecutor {
    fn step_kind(&self) -> StepKind {
        StepKind::Convert
    }

    #[instrument(skip(self, ctx), fields(partition = %ctx.partition.name()))]
    async fn execute(&self, ctx: &StepContext) -> StepResult<StepOutput> {
        if ctx.is_cancelled() {
            return Err(StepError::cancelled());
        }

        let input = ctx.partition.local_input().to_path_buf();
        let output = ctx.partition.local_output().to_path_buf();
        let stats = tokio::task::spawn_blocking(move || convert(&input, &output))
            .await
            .map_err(|e| StepError::new(ErrorKind::Internal, format!("conversion task failed: {e}")))??;

        debug!(rows = stats.rows, bytes = stats.bytes_written, "Converted to parquet");
        Ok(StepOutput::Converted(stats))
    }
}

/// Convert a headed CSV file into Parquet at `output`.
///
/// The file is written to `<output>.tmp` and renamed on success; nothing is
/// left behind on failure.
pub fn convert(input: &Path, output: &Path) -> StepResult<ConversionStats> {
    let is_csv = input
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return Err(StepError::format(format!(
            "{} is not a .csv file",
            input.display()
        )));
    }

    let mut file = File::open(input)
        .map_err(|e| StepError::local_io(&format!("open {}", input.display()), e))?;
    sniff(&mut file, input)?;

    let staging = tmp_path(output);
    match write_parquet(file, input, &staging) {
        Ok(rows) => {
            std::fs::rename(&staging, output).map_err(|e| {
                let _ = std::fs::remove_file(&staging);
                StepError::local_io(&format!("rename into {}", output.display()), e)
            })?;
            let bytes_written = std::fs::metadata(output)
                .map_err(|e| StepError::local_io(&format!("stat {}", output.display()), e))?
                .len();
            Ok(ConversionStats {
                rows,
                bytes_written,
            })
        }
        Err(error) => {
            let _ = std::fs::remove_file(&staging);
            Err(error)
        }
    }
}

/// Reject empty and binary input, then rewind
fn sniff(file: &mut File, input: &Path) -> StepResult<()> {
    let mut head = Vec::with_capacity(SNIFF_BYTES);
    file.by_ref()
        .take(SNIFF_BYTES as u64)
        .read_to_end(&mut head)
        .map_err(|e| StepError::local_io(&format!("read {}", input.display()), e))?;

    if head.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(StepError::format(format!("{} is empty", input.display())));
    }
    if head.contains(&0) {
        return Err(StepError::format(format!(
            "{} looks binary, not CSV",
            input.display()
        )));
    }

    file.seek(SeekFrom::Start(0))
        .map_err(|e| StepError::local_io(&format!("rewind {}", input.display()), e))?;
    Ok(())
}

fn write_parquet(mut file: File, input: &Path, staging: &Path) -> StepResult<u64> {
    let parse_error = |e: arrow::error::ArrowError| {
        StepError::format(format!("{} failed to parse: {e}", input.display()))
    };

    let format = Format::default().with_header(true);
    let (schema, _) = format
        .infer_schema(&mut file, Some(SCHEMA_INFERENCE_RECORDS))
        .map_err(parse_error)?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| StepError::local_io(&format!("rewind {}", input.display()), e))?;

    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_batch_size(BATCH_SIZE)
        .build(file)
        .map_err(parse_error)?;

    let sink = File::create(staging)
        .map_err(|e| StepError::local_io(&format!("create {}", staging.display()), e))?;
    let properties = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let write_error = |e: parquet::errors::ParquetError| {
        StepError::new(
            ErrorKind::LocalIo,
            format!("write {}: {e}", staging.display()),
        )
    };
    let mut writer = ArrowWriter::try_new(sink, schema, Some(properties)).map_err(write_error)?;

    let mut rows: u64 = 0;
    for batch in reader {
        let batch = batch.map_err(parse_error)?;
        rows += batch.num_rows() as u64;
        writer.write(&batch).map_err(write_error)?;
    }
    writer.close().map_err(write_error)?;
    Ok(rows)
}

fn tmp_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
