use crate::permutation::GeneRecord;
use anyhow::{bail, Context, Error};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Header of the results table: `gene, mi, p, mi_null_1 .. mi_null_{null_count}`
pub fn header(null_count: usize) -> Vec<String> {
    let mut columns = vec!["gene".to_string(), "mi".to_string(), "p".to_string()];
    columns.extend((1..=null_count).map(|i| format!("mi_null_{i}")));
    columns
}

/// Output file locations for one chunk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkOutput {
    pub dir: PathBuf,
    pub chunk: usize,
}

impl ChunkOutput {
    pub fn new(dir: impl AsRef<Path>, chunk: usize) -> ChunkOutput {
        ChunkOutput {
            dir: dir.as_ref().to_path_buf(),
            chunk,
        }
    }

    /// `mi_NNN.csv`
    pub fn results_path(&self) -> PathBuf {
        self.dir.join(format!("mi_{:03}.csv", self.chunk))
    }

    /// `chunk_NNN.txt`
    pub fn genes_path(&self) -> PathBuf {
        self.dir.join(format!("chunk_{:03}.txt", self.chunk))
    }

    /// Write the results table and the gene list, creating the directory if needed.
    pub fn write(&self, null_count: usize, records: &[GeneRecord], genes: &[String]) -> Result<(), Error> {
        create_dir_all(&self.dir).with_context(|| self.dir.display().to_string())?;
        write_results(self.results_path(), null_count, records)?;
        write_gene_list(self.genes_path(), genes)?;
        Ok(())
    }
}

pub fn write_results(path: impl AsRef<Path>, null_count: usize, records: &[GeneRecord]) -> Result<(), Error> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path).with_context(|| path.display().to_string())?;
    writer.write_record(header(null_count))?;

    for record in records {
        if record.null.len() != null_count {
            bail!(
                "gene {} has {} null values, expected {}",
                record.gene,
                record.null.len(),
                null_count
            );
        }
        let stats = [record.mi, record.p].into_iter().chain(record.null.iter().copied());
        let row = std::iter::once(record.gene.clone()).chain(stats.map(|v| v.to_string()));
        writer.write_record(row)?;
    }

    writer.flush().with_context(|| path.display().to_string())?;
    Ok(())
}

/// One identifier per line, in the given order
pub fn write_gene_list(path: impl AsRef<Path>, genes: &[String]) -> Result<(), Error> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path).with_context(|| path.display().to_string())?);
    for gene in genes {
        writeln!(writer, "{gene}")?;
    }
    writer.flush().with_context(|| path.display().to_string())?;
    Ok(())
}
