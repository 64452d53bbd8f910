//! Store builder
//!
//! One sequential pass over the input. Lines are gathered into batches; each
//! batch is decoded, keyed and described on a rayon pool, then appended to
//! every artifact in input order under consecutive row ordinals. All artifacts
//! flush together at each batch boundary, so memory stays proportional to the
//! batch size.
//!
//! ```text
//! input ─▶ batch ─▶ par_iter(prepare) ─▶ ordered append ─▶ flush_batch
//!                                                │
//!          descriptors.col  entities.bin/.off  names.idx  structures.idx
//! ```
//!
//! Everything is written into a staging directory; the manifest is written
//! last and the directory is renamed onto the target as the commit step.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use molvault_core::table::Duplicate;
use molvault_core::{ArchiveWriter, ColumnWriter, NameIndexWriter, StructureIndexWriter};

use crate::config::BuildOptions;
use crate::entity::{encode_record, EntityCodec};
use crate::error::{MolvaultError, Result, RowError};
use crate::generators::{GeneratorRegistry, GeneratorSet};
use crate::input::RawLine;
use crate::layout::{self, StagingDir, StoreLayout};
use crate::manifest::{self, ArtifactEntry, StoreManifest, MANIFEST_VERSION};

/// Most skipped rows and duplicate names kept verbatim in a report
pub const MAX_REPORT_SAMPLES: usize = 32;

/// A row left out of the store
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRow {
    pub line_no: u64,
    pub reason: RowError,
}

/// Outcome of a successful build
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub rows: u64,
    pub skipped: u64,
    pub skipped_samples: Vec<SkippedRow>,
    pub duplicate_names: u64,
    pub duplicate_samples: Vec<Duplicate>,
    pub distinct_names: u64,
    pub distinct_structures: Option<u64>,
    pub width: usize,
    pub elapsed: Duration,
}

impl BuildReport {
    fn skip(&mut self, line_no: u64, reason: RowError) {
        tracing::warn!("row_skipped line={} reason={}", line_no, reason);
        self.skipped += 1;
        if self.skipped_samples.len() < MAX_REPORT_SAMPLES {
            self.skipped_samples.push(SkippedRow { line_no, reason });
        }
    }

    fn duplicate(&mut self, dup: Duplicate) {
        tracing::warn!(
            "duplicate_name name={:?} kept={} dropped={}",
            dup.key,
            dup.kept,
            dup.dropped
        );
        self.duplicate_names += 1;
        if self.duplicate_samples.len() < MAX_REPORT_SAMPLES {
            self.duplicate_samples.push(dup);
        }
    }
}

/// One row ready to append, before its ordinal is known
struct PreparedRow {
    name: Option<String>,
    structural_key: Option<String>,
    values: Vec<f64>,
    payload: Vec<u8>,
}

/// Writers for every artifact of one store
struct ArtifactWriters {
    columns: ColumnWriter,
    archive: ArchiveWriter,
    names: NameIndexWriter,
    structures: Option<StructureIndexWriter>,
    next_ordinal: u64,
}

impl ArtifactWriters {
    fn create(layout: &StoreLayout, width: usize, index_structures: bool) -> Result<Self> {
        let structures = if index_structures {
            Some(StructureIndexWriter::new(layout.spill_dir("structures"))?)
        } else {
            None
        };
        Ok(Self {
            columns: ColumnWriter::new(layout.descriptors(), width)?,
            archive: ArchiveWriter::create(layout.entities(), layout.offsets())?,
            names: NameIndexWriter::new(layout.spill_dir("names"))?,
            structures,
            next_ordinal: 0,
        })
    }

    fn append(&mut self, row: PreparedRow) -> Result<u64> {
        let ordinal = self.next_ordinal;
        let name = row.name.unwrap_or_else(|| ordinal.to_string());

        self.columns.write_row(&row.values)?;
        self.archive.append(&encode_record(&name, &row.payload))?;
        self.names.put(name, ordinal);
        if let (Some(index), Some(key)) = (self.structures.as_mut(), row.structural_key) {
            index.put(key, ordinal);
        }

        self.next_ordinal += 1;
        Ok(ordinal)
    }

    fn flush_batch(&mut self) -> Result<()> {
        self.columns.flush_batch()?;
        self.archive.flush_batch()?;
        self.names.flush_batch()?;
        if let Some(index) = self.structures.as_mut() {
            index.flush_batch()?;
        }
        Ok(())
    }

    /// Finish every writer and check they all agree on the row count
    fn finish(self, layout: &StoreLayout, report: &mut BuildReport) -> Result<u64> {
        let rows = self.next_ordinal;
        let columns = self.columns.finish()?;
        let entities = self.archive.finish()?;
        let names = self.names.finish(layout.names(), rows, |dup| report.duplicate(dup))?;
        report.distinct_names = names.keys;
        tracing::debug!(
            "name_index_merged keys={} duplicates={} runs={}",
            names.keys,
            names.duplicates,
            names.runs
        );

        if let Some(index) = self.structures {
            let summary = index.finish(layout.structures(), rows)?;
            report.distinct_structures = Some(summary.keys);
            tracing::debug!(
                "structure_index_merged keys={} postings={} runs={}",
                summary.keys,
                summary.postings,
                summary.runs
            );
            if summary.postings != rows {
                return Err(MolvaultError::corrupt(format!(
                    "structure index holds {} postings for {} rows",
                    summary.postings, rows
                )));
            }
        }

        if columns != rows || entities != rows {
            return Err(MolvaultError::corrupt(format!(
                "artifact counts diverged: {} rows, {} columns, {} entities",
                rows, columns, entities
            )));
        }
        Ok(rows)
    }
}

/// Builds a store from delimited entity text
pub struct StoreBuilder<C: EntityCodec> {
    options: BuildOptions,
    codec: C,
    registry: GeneratorRegistry<C::Entity>,
}

impl<C> StoreBuilder<C>
where
    C: EntityCodec,
    C::Entity: 'static,
{
    pub fn new(options: BuildOptions, codec: C, registry: GeneratorRegistry<C::Entity>) -> Self {
        Self {
            options,
            codec,
            registry,
        }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Build the store at `store_path` from the file at `input_path`
    pub fn build<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        store_path: Q,
    ) -> Result<BuildReport> {
        let input_path = input_path.as_ref();
        let generators = self.validate(store_path.as_ref())?;
        let file = File::open(input_path).map_err(|e| {
            MolvaultError::config(format!("cannot open input {:?}: {}", input_path, e))
        })?;
        tracing::info!("build_input path={:?}", input_path);
        self.run(BufReader::new(file), store_path.as_ref(), generators)
    }

    /// Build the store at `store_path` from any byte stream
    pub fn build_from_reader<R: Read>(&self, reader: R, store_path: impl AsRef<Path>) -> Result<BuildReport> {
        let generators = self.validate(store_path.as_ref())?;
        self.run(BufReader::new(reader), store_path.as_ref(), generators)
    }

    /// Everything that can fail before a single file is created
    fn validate(&self, store_path: &Path) -> Result<GeneratorSet<C::Entity>> {
        self.options.validate()?;
        let generators = self.registry.resolve(&self.options.descriptors)?;
        if store_path.exists() && !self.options.overwrite {
            return Err(MolvaultError::config(format!(
                "store {:?} already exists (use overwrite to replace it)",
                store_path
            )));
        }
        Ok(generators)
    }

    fn thread_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.threads.unwrap_or(0))
            .thread_name(|idx| format!("molvault-build-{idx}"))
            .build()
            .map_err(|e| MolvaultError::config(format!("building descriptor pool: {}", e)))
    }

    fn run<R: BufRead>(
        &self,
        reader: R,
        store_path: &Path,
        generators: GeneratorSet<C::Entity>,
    ) -> Result<BuildReport> {
        let start = Instant::now();
        let width = generators.width();
        let pool = self.thread_pool()?;
        tracing::info!(
            "build_start store={:?} generators={} width={} batch_size={} structure_index={} threads={}",
            store_path,
            generators.schema().generator_names().join(","),
            width,
            self.options.batch_size,
            self.options.index_structures,
            pool.current_num_threads()
        );

        let staging = StagingDir::create(store_path)?;
        let layout = StoreLayout::new(staging.path());
        let mut writers = ArtifactWriters::create(&layout, width, self.options.index_structures)?;
        let mut report = BuildReport {
            width,
            ..Default::default()
        };

        let mut batch = Vec::with_capacity(self.options.batch_size);
        for line in self.options.input.lines(reader) {
            batch.push(line?);
            if batch.len() == self.options.batch_size {
                self.process_batch(&pool, &generators, &mut batch, &mut writers, &mut report)?;
            }
        }
        if !batch.is_empty() {
            self.process_batch(&pool, &generators, &mut batch, &mut writers, &mut report)?;
        }

        report.rows = writers.finish(&layout, &mut report)?;

        let mut artifacts = Vec::new();
        let manifest_stub = StoreManifest {
            format_version: MANIFEST_VERSION,
            created_at: manifest::now_unix_ts(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            schema: generators.schema().clone(),
            width,
            row_count: report.rows,
            structure_index: self.options.index_structures,
            distinct_structures: report.distinct_structures,
            distinct_names: report.distinct_names,
            skipped_rows: report.skipped,
            duplicate_names: report.duplicate_names,
            options: self.options.clone(),
            artifacts: Vec::new(),
        };
        for file in manifest_stub.expected_files() {
            let path = layout.root().join(file);
            layout::sync_file(&path)?;
            artifacts.push(ArtifactEntry::describe(layout.root(), file)?);
        }
        let manifest = StoreManifest {
            artifacts,
            ..manifest_stub
        };
        manifest.write(&layout)?;

        staging.commit(store_path, self.options.overwrite)?;

        report.elapsed = start.elapsed();
        tracing::info!(
            "build_complete store={:?} rows={} skipped={} duplicate_names={} elapsed_ms={}",
            store_path,
            report.rows,
            report.skipped,
            report.duplicate_names,
            report.elapsed.as_millis()
        );
        Ok(report)
    }

    /// Compute a batch in parallel, then append it in input order
    fn process_batch(
        &self,
        pool: &rayon::ThreadPool,
        generators: &GeneratorSet<C::Entity>,
        batch: &mut Vec<RawLine>,
        writers: &mut ArtifactWriters,
        report: &mut BuildReport,
    ) -> Result<()> {
        let prepared: Vec<std::result::Result<PreparedRow, RowError>> = pool.install(|| {
            batch
                .par_iter()
                .map(|line| self.prepare(generators, &line.text))
                .collect()
        });

        let skipped_before = report.skipped;
        for (line, row) in batch.drain(..).zip(prepared) {
            match row {
                Ok(row) => {
                    writers.append(row)?;
                }
                Err(reason) => report.skip(line.line_no, reason),
            }
        }
        writers.flush_batch()?;
        tracing::debug!(
            "batch_flushed rows_total={} skipped_in_batch={}",
            writers.next_ordinal,
            report.skipped - skipped_before
        );
        Ok(())
    }

    fn prepare(
        &self,
        generators: &GeneratorSet<C::Entity>,
        text: &str,
    ) -> std::result::Result<PreparedRow, RowError> {
        let fields = self.options.input.extract(text)?;
        let entity = self.codec.decode(fields.entity)?;
        let structural_key = if self.options.index_structures {
            Some(self.codec.structural_key(&entity)?)
        } else {
            None
        };
        let values = generators.compute_row(&entity)?;
        let payload = self.codec.serialize(&entity)?;
        Ok(PreparedRow {
            name: fields.name.map(str::to_string),
            structural_key,
            values,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::{standard_registry, SmilesCodec};
    use tempfile::tempdir;

    fn builder(options: BuildOptions) -> StoreBuilder<SmilesCodec> {
        StoreBuilder::new(options, SmilesCodec, standard_registry().unwrap())
    }

    #[test]
    fn test_build_counts_and_skips() {
        let dir = tempdir().unwrap();
        let store = dir.path().join("store");
        let input = "CCO ethanol\nC1CC broken\n\nc1ccccc1 benzene\nCCO\n";
        let report = builder(BuildOptions::default().with_batch_size(2))
            .build_from_reader(input.as_bytes(), &store)
            .unwrap();

        assert_eq!(report.rows, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.skipped_samples[0].line_no, 2);
        assert!(matches!(report.skipped_samples[0].reason, RowError::Decode(_)));
        assert!(matches!(
            report.skipped_samples[1].reason,
            RowError::MissingField { .. }
        ));
        assert_eq!(report.width, 8);
        assert_eq!(report.distinct_structures, Some(2));

        let mut files: Vec<_> = std::fs::read_dir(&store)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        files.sort();
        assert_eq!(
            files,
            vec![
                "descriptors.col",
                "entities.bin",
                "entities.off",
                "manifest.json",
                "names.idx",
                "structures.idx"
            ]
        );
    }

    #[test]
    fn test_out_of_range_bracket_atoms_are_skipped() {
        let dir = tempdir().unwrap();
        let store = dir.path().join("store");
        let input = "CCO a\n[C+2147483647+1] b\n[CH300] c\nCC d\n";
        let options = BuildOptions {
            threads: Some(2),
            ..BuildOptions::default()
        };
        let report = builder(options)
            .build_from_reader(input.as_bytes(), &store)
            .unwrap();

        assert_eq!(report.rows, 2);
        assert_eq!(report.skipped, 2);
        let lines: Vec<u64> = report.skipped_samples.iter().map(|s| s.line_no).collect();
        assert_eq!(lines, vec![2, 3]);
        assert!(report
            .skipped_samples
            .iter()
            .all(|s| matches!(s.reason, RowError::Decode(_))));

        let handle = crate::MolStore::open(&store).unwrap();
        assert_eq!(handle.lookup_name("d").unwrap(), 1);
        assert!(handle.lookup_name("b").is_err());
    }

    #[test]
    fn test_unknown_generator_creates_nothing() {
        let dir = tempdir().unwrap();
        let store = dir.path().join("store");
        let err = builder(BuildOptions::default().with_descriptors("Basic2D,Nope"))
            .build_from_reader("CCO a\n".as_bytes(), &store)
            .unwrap_err();
        assert!(matches!(err, MolvaultError::Configuration(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_report_samples_are_capped() {
        let dir = tempdir().unwrap();
        let input: String = (0..50).map(|i| format!("Xx bad{}\nC dup\n", i)).collect();
        let report = builder(BuildOptions::default())
            .build_from_reader(input.as_bytes(), dir.path().join("store"))
            .unwrap();
        assert_eq!(report.skipped, 50);
        assert_eq!(report.skipped_samples.len(), MAX_REPORT_SAMPLES);
        assert_eq!(report.duplicate_names, 49);
        assert_eq!(report.duplicate_samples.len(), MAX_REPORT_SAMPLES);
        assert_eq!(report.duplicate_samples[0].kept, 0);
        assert_eq!(report.duplicate_samples[0].dropped, 1);
    }
}
