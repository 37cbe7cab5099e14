use anyhow::{Context, Result, bail};
use std::io::Write;

/// One reported point of a trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Simulation time.
    pub time: f64,
    /// Population size of every cell type.
    pub counts: Vec<u64>,
    /// Birth rate of the first cell type at `time`.
    pub rate: f64,
}

/// Destination for reported rows.
pub trait Sink {
    fn record(&mut self, row: &Row) -> Result<()>;
}

impl Sink for Vec<Row> {
    fn record(&mut self, row: &Row) -> Result<()> {
        self.push(row.clone());
        Ok(())
    }
}

/// Keeps only the most recent row, i.e. the end state once a run finishes.
#[derive(Default)]
pub struct FinalRow {
    row: Option<Row>,
}

impl FinalRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_row(self) -> Option<Row> {
        self.row
    }
}

impl Sink for FinalRow {
    fn record(&mut self, row: &Row) -> Result<()> {
        self.row = Some(row.clone());
        Ok(())
    }
}

/// Tab-separated table writer.
pub struct TsvWriter<W: Write> {
    writer: csv::Writer<W>,
    prefix: Option<String>,
    n_extra: usize,
}

impl<W: Write> TsvWriter<W> {
    /// Create a writer for trajectories of `n_types` cell types and write the header.
    pub fn new(writer: W, n_types: usize) -> Result<Self> {
        Self::build(writer, n_types, None, &[])
    }

    /// Like [`TsvWriter::new`], but every row starts with an extra `run` column
    /// and ends with one column per name in `extra`.
    pub fn with_run_column(writer: W, n_types: usize, extra: &[&str]) -> Result<Self> {
        Self::build(writer, n_types, Some("run"), extra)
    }

    fn build(
        writer: W,
        n_types: usize,
        prefix_name: Option<&str>,
        extra: &[&str],
    ) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(writer);

        let mut header = Vec::with_capacity(n_types + extra.len() + 3);
        header.extend(prefix_name.map(str::to_string));
        header.push("time".to_string());
        if n_types == 1 {
            header.push("size".to_string());
        } else {
            header.extend((0..n_types).map(|i_type| format!("size_{i_type}")));
        }
        header.push("rate".to_string());
        header.extend(extra.iter().map(|name| name.to_string()));
        writer
            .write_record(&header)
            .context("failed to write header")?;

        Ok(Self {
            writer,
            prefix: prefix_name.map(|_| String::new()),
            n_extra: extra.len(),
        })
    }

    /// Set the value of the `run` column for the following rows.
    pub fn set_run(&mut self, run_idx: u64) {
        if let Some(prefix) = &mut self.prefix {
            *prefix = run_idx.to_string();
        }
    }

    /// Write a row followed by the values of the extra columns.
    pub fn record_with(&mut self, row: &Row, extra: &[f64]) -> Result<()> {
        if extra.len() != self.n_extra {
            bail!(
                "row must have {} extra values, but has {}",
                self.n_extra,
                extra.len()
            );
        }
        let mut record = Vec::with_capacity(row.counts.len() + extra.len() + 3);
        record.extend(self.prefix.clone());
        record.push(row.time.to_string());
        record.extend(row.counts.iter().map(u64::to_string));
        record.push(row.rate.to_string());
        record.extend(extra.iter().map(f64::to_string));
        self.writer
            .write_record(&record)
            .context("failed to write row")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("failed to flush writer stream")
    }
}

impl<W: Write> Sink for TsvWriter<W> {
    fn record(&mut self, row: &Row) -> Result<()> {
        self.record_with(row, &[])
    }
}
